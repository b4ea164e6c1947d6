//! Little-endian field reader over byte slices
//!
//! Shared by the module image and debug-section parsers. Every read is bounds
//! checked and reports the offset that ran past the end.

use thiserror::Error;

/// A read ran past the end of the buffer
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("buffer too short at offset {0}")]
pub struct ShortRead(pub usize);

pub(crate) trait ByteReader {
    fn read8(&self, index: usize) -> Result<u8, ShortRead>;
    fn read16(&self, index: usize) -> Result<u16, ShortRead>;
    fn read32(&self, index: usize) -> Result<u32, ShortRead>;
    fn read8_with(&self, index: &mut usize) -> Result<u8, ShortRead>;
    fn read16_with(&self, index: &mut usize) -> Result<u16, ShortRead>;
    fn read32_with(&self, index: &mut usize) -> Result<u32, ShortRead>;
    /// NUL-terminated byte string starting at `index`, without the terminator
    fn cstr(&self, index: usize) -> Result<&[u8], ShortRead>;
    fn cstr_with(&self, index: &mut usize) -> Result<&[u8], ShortRead>;
}

impl ByteReader for [u8] {
    fn read8(&self, index: usize) -> Result<u8, ShortRead> {
        self.get(index).copied().ok_or(ShortRead(index))
    }

    fn read16(&self, index: usize) -> Result<u16, ShortRead> {
        let bytes = self.get(index..index + 2).ok_or(ShortRead(index))?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn read32(&self, index: usize) -> Result<u32, ShortRead> {
        let bytes = self.get(index..index + 4).ok_or(ShortRead(index))?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read8_with(&self, index: &mut usize) -> Result<u8, ShortRead> {
        let value = self.read8(*index)?;
        *index += 1;
        Ok(value)
    }

    fn read16_with(&self, index: &mut usize) -> Result<u16, ShortRead> {
        let value = self.read16(*index)?;
        *index += 2;
        Ok(value)
    }

    fn read32_with(&self, index: &mut usize) -> Result<u32, ShortRead> {
        let value = self.read32(*index)?;
        *index += 4;
        Ok(value)
    }

    fn cstr(&self, index: usize) -> Result<&[u8], ShortRead> {
        let tail = self.get(index..).ok_or(ShortRead(index))?;
        let len = tail.iter().position(|&b| b == 0).ok_or(ShortRead(self.len()))?;
        Ok(&tail[..len])
    }

    fn cstr_with(&self, index: &mut usize) -> Result<&[u8], ShortRead> {
        let s = self.cstr(*index)?;
        *index += s.len() + 1;
        Ok(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_fixed_width() {
        let buffer = [0x12, 0x34, 0x56, 0x78];
        assert_eq!(buffer.read8(3).unwrap(), 0x78);
        assert_eq!(buffer.read16(2).unwrap(), 0x7856);
        assert_eq!(buffer.read32(0).unwrap(), 0x78563412);
        assert_eq!(buffer.read32(1).unwrap_err(), ShortRead(1));
        assert_eq!(buffer.read8(4).unwrap_err(), ShortRead(4));
    }

    #[test]
    fn test_cursor_advances_only_on_success() {
        let buffer = [0x01, 0x00, 0x02];
        let mut index = 0;
        assert_eq!(buffer.read16_with(&mut index).unwrap(), 1);
        assert_eq!(index, 2);
        assert!(buffer.read16_with(&mut index).is_err());
        assert_eq!(index, 2);
    }

    #[test]
    fn test_cstr() {
        let buffer = b"main\0foo\0bar";
        let mut index = 0;
        assert_eq!(buffer.cstr_with(&mut index).unwrap(), b"main");
        assert_eq!(buffer.cstr_with(&mut index).unwrap(), b"foo");
        assert_eq!(index, 9);
        // Unterminated
        assert!(buffer.cstr_with(&mut index).is_err());
    }
}
