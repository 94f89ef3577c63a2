use crate::cursor::ByteCursor;
use crate::errors::DecodeError;
use byteorder::LE;

/// On-disk byte range `[start, end)` of one compression block.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Block {
    pub start: u64,
    pub end: u64,
}

impl Block {
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub(crate) fn read_block(reader: &mut ByteCursor<'_>) -> Result<Block, DecodeError> {
    let start = reader.read_u64::<LE>()?;
    let end = reader.read_u64::<LE>()?;
    Ok(Block { start, end })
}
