//! A minimal forward-only cursor over an in-memory snapshot buffer. Kept
//! deliberately tiny: every `read_*` call either advances `pos` and returns
//! the bytes it consumed, or returns a `SnapshotError` without touching
//! `pos`, so callers can always slice `input[start..cursor.pos]` to recover
//! exactly the bytes a record occupied for verbatim re-emission.

use crate::errors::ProxyError;

pub struct Cursor<'a> {
    pub input: &'a [u8],
    pub pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(input: &'a [u8]) -> Self {
        Cursor { input, pos: 0 }
    }

    pub fn read_u8(&mut self) -> Result<u8, ProxyError> {
        let b = *self
            .input
            .get(self.pos)
            .ok_or_else(|| ProxyError::snapshot("truncated: expected a byte, found EOF"))?;
        self.pos += 1;
        Ok(b)
    }

    pub fn read_exact(&mut self, n: usize) -> Result<&'a [u8], ProxyError> {
        let end = self
            .pos
            .checked_add(n)
            .ok_or_else(|| ProxyError::snapshot("length overflow"))?;
        let slice = self
            .input
            .get(self.pos..end)
            .ok_or_else(|| ProxyError::snapshot("truncated: not enough bytes remaining"))?;
        self.pos = end;
        Ok(slice)
    }
}
