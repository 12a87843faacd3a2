//! Byte view over a mapped executable image.

use bytes::Bytes;

use crate::error::{FatalError, Result};
use crate::formats::pe::headers::parse_optional_header;
use crate::formats::pe::utils::ReadExt;
use crate::formats::pe::{COFF_HEADER_SIZE, PE_SIGNATURE};

/// Size of the header page that is always mapped at a module base.
const HEADER_PAGE: usize = 0x1000;

/// Immutable bytes of an image in its loaded layout, plus the virtual
/// address they are mapped at. Offsets into the view are RVAs.
///
/// Clones share the underlying storage.
#[derive(Debug, Clone)]
pub struct ImageView {
    base: u64,
    bytes: Bytes,
}

impl ImageView {
    pub fn new(base: u64, bytes: impl Into<Bytes>) -> Self {
        Self {
            base,
            bytes: bytes.into(),
        }
    }

    /// View a module that is mapped into the current process.
    ///
    /// Only the header page is read to learn `SizeOfImage`; the returned view
    /// then borrows the whole mapping.
    ///
    /// # Safety
    ///
    /// `base` must be the base address of a PE image mapped in this process
    /// that stays mapped, and whose pages stay readable, for the rest of the
    /// process lifetime.
    pub unsafe fn from_loaded(base: *const u8) -> Result<Self> {
        let header: &'static [u8] = std::slice::from_raw_parts(base, HEADER_PAGE);
        let size = Self::size_of_image(header)?;
        let bytes: &'static [u8] = std::slice::from_raw_parts(base, size);
        Ok(Self::new(base as usize as u64, Bytes::from_static(bytes)))
    }

    fn size_of_image(header: &[u8]) -> Result<usize> {
        let malformed = |reason: String| FatalError::NoHostImage(reason);

        let lfanew = header
            .u32_at(60)
            .map_err(|e| malformed(e.to_string()))? as usize;
        if header.get(lfanew..lfanew + 4) != Some(&PE_SIGNATURE[..]) {
            return Err(malformed(format!(
                "no PE signature at header offset {:#x}",
                lfanew
            )));
        }
        let size_of_optional = header
            .u16_at(lfanew + 4 + 16)
            .map_err(|e| malformed(e.to_string()))?;
        let optional = parse_optional_header(header, lfanew + 4 + COFF_HEADER_SIZE, size_of_optional)
            .map_err(|e| malformed(e.to_string()))?;
        Ok((optional.size_of_image as usize).max(HEADER_PAGE))
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// First address past the mapped image.
    pub fn end(&self) -> u64 {
        self.base + self.bytes.len() as u64
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// Shared sub-view of `len` bytes at `rva`.
    pub fn slice(&self, rva: usize, len: usize) -> Option<Bytes> {
        let end = rva.checked_add(len)?;
        if end > self.bytes.len() {
            return None;
        }
        Some(self.bytes.slice(rva..end))
    }
}
