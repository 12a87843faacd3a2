//! Named byte ranges of a loaded image.

use std::fmt;

use bytes::Bytes;

use crate::error::{FatalError, Result};
use crate::formats::pe::SectionHeader;
use crate::formats::pe::utils::ReadExt;

/// Access rights of a segment, as the section header grants them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Perms {
    read: bool,
    write: bool,
    execute: bool,
}

impl Perms {
    pub fn new(read: bool, write: bool, execute: bool) -> Self {
        Self {
            read,
            write,
            execute,
        }
    }

    /// `CNT_CODE` sections count as executable even without `MEM_EXECUTE`.
    pub fn from_section(header: &SectionHeader) -> Self {
        Self {
            read: header.is_readable(),
            write: header.is_writable(),
            execute: header.is_executable() || header.contains_code(),
        }
    }

    pub fn has_read(&self) -> bool {
        self.read
    }

    pub fn has_write(&self) -> bool {
        self.write
    }

    pub fn has_execute(&self) -> bool {
        self.execute
    }
}

impl fmt::Display for Perms {
    /// `rwx` with `-` for each missing right.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flag = |granted: bool, c: char| if granted { c } else { '-' };
        write!(
            f,
            "{}{}{}",
            flag(self.has_read(), 'r'),
            flag(self.has_write(), 'w'),
            flag(self.has_execute(), 'x')
        )
    }
}

/// A named contiguous range of a loaded image.
///
/// `length` is the in-memory size; `defined_length` is the part backed by
/// raw section data (never larger than `length`, the remainder reads as
/// zero). Membership is strictly interior: neither `base` nor `base + length`
/// is contained, so adjacent segments never both claim a boundary address.
#[derive(Debug, Clone)]
pub struct Segment {
    name: String,
    base: u64,
    length: u64,
    defined_length: u64,
    perms: Perms,
    bitness: u32,
    data: Bytes,
}

impl Segment {
    /// Segment covering exactly `data`, mapped at `base`.
    pub fn new(name: impl Into<String>, base: u64, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let length = data.len() as u64;
        Self {
            name: name.into(),
            base,
            length,
            defined_length: length,
            perms: Perms::new(true, false, false),
            bitness: 32,
            data,
        }
    }

    pub fn with_perms(mut self, perms: Perms) -> Self {
        self.perms = perms;
        self
    }

    pub fn with_bitness(mut self, bitness: u32) -> Self {
        self.bitness = bitness;
        self
    }

    /// Limit the raw-data-backed prefix; clamped to the segment length.
    pub fn with_defined_length(mut self, defined_length: u64) -> Self {
        self.defined_length = defined_length.min(self.length);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    /// In-memory length.
    pub fn len(&self) -> u64 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn defined_len(&self) -> u64 {
        self.defined_length
    }

    /// First address past the segment.
    pub fn end(&self) -> u64 {
        self.base + self.length
    }

    pub fn perms(&self) -> Perms {
        self.perms
    }

    /// Address width of the owning image.
    pub fn bitness(&self) -> u32 {
        self.bitness
    }

    /// Pointer width in bytes.
    pub fn pointer_size(&self) -> usize {
        if self.bitness == 64 {
            8
        } else {
            4
        }
    }

    /// Whole in-memory contents.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Raw-data-backed prefix, the part worth searching.
    pub fn defined_data(&self) -> &[u8] {
        &self.data[..self.defined_length as usize]
    }

    pub fn contains_address(&self, address: u64) -> bool {
        address > self.base && address - self.base < self.length
    }

    /// Fails when `address` is not strictly inside the segment.
    pub fn bounds_check(&self, address: u64) -> Result<()> {
        if self.contains_address(address) {
            Ok(())
        } else {
            Err(FatalError::AddressOutOfBounds {
                scope: format!("segment {}", self.name),
                address,
            })
        }
    }

    /// Offset of `address` from the base, for any address in `[base, end)`.
    pub fn offset_of(&self, address: u64) -> Option<usize> {
        if address >= self.base && address < self.end() {
            Some((address - self.base) as usize)
        } else {
            None
        }
    }

    /// Bytes from `address` to the end of the segment.
    pub fn bytes_from(&self, address: u64) -> Option<&[u8]> {
        self.offset_of(address).map(|off| &self.data[off..])
    }

    /// Pointer-width little-endian value stored at `address`.
    pub fn read_pointer(&self, address: u64) -> Option<u64> {
        let off = self.offset_of(address)?;
        self.data.as_ref().ptr_at(off, self.bitness).ok()
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{:#x}..{:#x}) {}",
            self.name,
            self.base,
            self.end(),
            self.perms
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_interior_containment() {
        let seg = Segment::new(".text", 0x1000, vec![0u8; 0x100]);
        assert!(!seg.contains_address(0x1000));
        assert!(seg.contains_address(0x1001));
        assert!(seg.contains_address(0x10ff));
        assert!(!seg.contains_address(0x1100));
        assert!(!seg.contains_address(0));
        assert!(seg.bounds_check(0x1080).is_ok());
        assert!(matches!(
            seg.bounds_check(0x1000),
            Err(FatalError::AddressOutOfBounds { address: 0x1000, .. })
        ));
    }

    #[test]
    fn test_defined_length_clamped() {
        let seg = Segment::new(".data", 0x2000, vec![7u8; 0x40]).with_defined_length(0x1000);
        assert_eq!(seg.defined_len(), 0x40);
        let seg = seg.with_defined_length(0x10);
        assert_eq!(seg.defined_data().len(), 0x10);
        assert_eq!(seg.data().len(), 0x40);
    }

    #[test]
    fn test_read_pointer_width() {
        let mut data = vec![0u8; 16];
        data[4..12].copy_from_slice(&0x1122_3344_5566_7788u64.to_le_bytes());
        let seg32 = Segment::new(".rdata", 0x3000, data.clone());
        let seg64 = Segment::new(".rdata", 0x3000, data).with_bitness(64);
        assert_eq!(seg32.read_pointer(0x3004), Some(0x5566_7788));
        assert_eq!(seg64.read_pointer(0x3004), Some(0x1122_3344_5566_7788));
        assert_eq!(seg64.read_pointer(0x300c), None);
        assert_eq!(seg64.pointer_size(), 8);
    }

    #[test]
    fn test_display() {
        let seg = Segment::new(".text", 0x1000, vec![0u8; 0x10])
            .with_perms(Perms::new(true, false, true));
        assert_eq!(seg.to_string(), ".text [0x1000..0x1010) r-x");
        assert!(seg.perms().has_execute() && !seg.perms().has_write());
    }
}
