//! PE parsing for images in their loaded (mapped) layout.
//!
//! Only what the address-space model needs is parsed: the DOS and NT headers,
//! the section table and the export directory.

pub mod exports;
pub mod headers;
pub mod sections;
pub mod types;
pub mod utils;

pub use exports::ExportTable;
pub use types::*;

use headers::{parse_dos_header, parse_nt_headers};
use sections::parse_section_headers;

/// Parsed headers of a mapped PE image
#[derive(Debug, Clone)]
pub struct LoadedPe {
    pub dos_header: DosHeader,
    pub nt_headers: NtHeaders,
    pub sections: Vec<SectionHeader>,
}

impl LoadedPe {
    /// Read just the DOS header, so callers can vet `e_lfanew` first.
    pub fn dos_header(data: &[u8]) -> Result<DosHeader> {
        parse_dos_header(data)
    }

    /// Parse NT headers and the section table following `dos_header`.
    pub fn parse(data: &[u8], dos_header: DosHeader) -> Result<Self> {
        let nt_headers = parse_nt_headers(data, dos_header.e_lfanew as usize)?;
        let sections = parse_section_headers(
            data,
            nt_headers.section_table_offset,
            nt_headers.file_header.number_of_sections,
        )?;

        Ok(Self {
            dos_header,
            nt_headers,
            sections,
        })
    }

    pub fn bitness(&self) -> u32 {
        self.nt_headers.optional_header.bitness()
    }

    pub fn size_of_image(&self) -> u32 {
        self.nt_headers.optional_header.size_of_image
    }

    /// Parse the export directory, if present.
    pub fn exports(&self, data: &[u8], max_exports: usize) -> Result<ExportTable> {
        let dir = self.nt_headers.directory(IMAGE_DIRECTORY_ENTRY_EXPORT);
        exports::parse_exports(data, &dir, max_exports)
    }
}
