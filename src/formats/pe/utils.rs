//! Bounds-checked little-endian reads over image bytes

use crate::formats::pe::types::{PeError, Result};

/// Extension trait for reading primitive types from byte slices.
///
/// Every read is bounds checked and reports the failing offset.
pub trait ReadExt {
    fn u8_at(&self, offset: usize) -> Result<u8>;
    fn u16_at(&self, offset: usize) -> Result<u16>;
    fn u32_at(&self, offset: usize) -> Result<u32>;
    fn u64_at(&self, offset: usize) -> Result<u64>;
    /// Pointer-sized read: 4 bytes for 32-bit images, 8 otherwise.
    fn ptr_at(&self, offset: usize, bitness: u32) -> Result<u64>;
    fn cstr_at(&self, offset: usize, max_len: usize) -> Result<&str>;
}

fn fixed<const N: usize>(data: &[u8], offset: usize) -> Result<[u8; N]> {
    offset
        .checked_add(N)
        .and_then(|end| data.get(offset..end))
        .and_then(|b| b.try_into().ok())
        .ok_or(PeError::InvalidOffset { offset })
}

impl ReadExt for [u8] {
    #[inline]
    fn u8_at(&self, offset: usize) -> Result<u8> {
        self.get(offset)
            .copied()
            .ok_or(PeError::InvalidOffset { offset })
    }

    #[inline]
    fn u16_at(&self, offset: usize) -> Result<u16> {
        fixed(self, offset).map(u16::from_le_bytes)
    }

    #[inline]
    fn u32_at(&self, offset: usize) -> Result<u32> {
        fixed(self, offset).map(u32::from_le_bytes)
    }

    #[inline]
    fn u64_at(&self, offset: usize) -> Result<u64> {
        fixed(self, offset).map(u64::from_le_bytes)
    }

    #[inline]
    fn ptr_at(&self, offset: usize, bitness: u32) -> Result<u64> {
        if bitness == 64 {
            self.u64_at(offset)
        } else {
            self.u32_at(offset).map(u64::from)
        }
    }

    fn cstr_at(&self, offset: usize, max_len: usize) -> Result<&str> {
        let end = offset.saturating_add(max_len).min(self.len());
        let slice = self
            .get(offset..end)
            .ok_or(PeError::InvalidOffset { offset })?;
        let len = slice
            .iter()
            .position(|&b| b == 0)
            .ok_or(PeError::InvalidString)?;
        std::str::from_utf8(&slice[..len]).map_err(|_| PeError::InvalidString)
    }
}

/// Little-endian encoding of a pointer value at the image's width.
pub fn encode_ptr(value: u64, bitness: u32) -> Vec<u8> {
    if bitness == 64 {
        value.to_le_bytes().to_vec()
    } else {
        (value as u32).to_le_bytes().to_vec()
    }
}
