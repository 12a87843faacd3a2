//! Header records of a mapped PE image.
//!
//! Only the fields a loaded image needs are kept: enough to walk the section
//! table and the export directory.

use thiserror::Error;

/// `MZ`
pub const DOS_SIGNATURE: u16 = 0x5A4D;
pub const PE_SIGNATURE: [u8; 4] = [b'P', b'E', 0, 0];
pub const PE32_MAGIC: u16 = 0x010B;
pub const PE32PLUS_MAGIC: u16 = 0x020B;

pub const DOS_HEADER_SIZE: usize = 0x40;
pub const COFF_HEADER_SIZE: usize = 0x14;
pub const SECTION_HEADER_SIZE: usize = 0x28;
pub const EXPORT_DIRECTORY_SIZE: usize = 0x28;

pub const IMAGE_DIRECTORY_ENTRY_EXPORT: usize = 0;
pub const IMAGE_NUMBEROF_DIRECTORY_ENTRIES: usize = 16;

pub const IMAGE_SCN_CNT_CODE: u32 = 0x0000_0020;
pub const IMAGE_SCN_CNT_INITIALIZED_DATA: u32 = 0x0000_0040;
pub const IMAGE_SCN_MEM_EXECUTE: u32 = 0x2000_0000;
pub const IMAGE_SCN_MEM_READ: u32 = 0x4000_0000;
pub const IMAGE_SCN_MEM_WRITE: u32 = 0x8000_0000;

/// Why a header or directory of the image could not be read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeError {
    #[error("missing MZ signature")]
    InvalidDosSignature,
    #[error("missing PE\\0\\0 signature")]
    InvalidPeSignature,
    #[error("unknown optional header magic {0:#06x}")]
    InvalidMagic(u16),
    #[error("header needs {expected} bytes but only {actual} are mapped")]
    TruncatedHeader { expected: usize, actual: usize },
    #[error("rva {rva:#010x} is outside the image")]
    InvalidRva { rva: u32 },
    #[error("read at offset {offset:#x} runs past the image")]
    InvalidOffset { offset: usize },
    #[error("export directory is inconsistent")]
    MalformedExportTable,
    #[error("name is not NUL-terminated UTF-8")]
    InvalidString,
}

pub type Result<T> = std::result::Result<T, PeError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Machine {
    I386,
    X86_64,
    Other(u16),
}

impl From<u16> for Machine {
    fn from(raw: u16) -> Self {
        const I386: u16 = 0x014C;
        const AMD64: u16 = 0x8664;
        match raw {
            I386 => Machine::I386,
            AMD64 => Machine::X86_64,
            unknown => Machine::Other(unknown),
        }
    }
}

/// `e_magic` and `e_lfanew`; nothing else in the DOS stub matters here.
#[derive(Debug, Clone, Copy)]
pub struct DosHeader {
    pub e_magic: u16,
    pub e_lfanew: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct CoffHeader {
    pub machine: Machine,
    pub number_of_sections: u16,
    pub time_date_stamp: u32,
    pub size_of_optional_header: u16,
    pub characteristics: u16,
}

/// One `(rva, size)` slot of the data directory array.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DataDirectory {
    pub virtual_address: u32,
    pub size: u32,
}

impl DataDirectory {
    pub fn is_present(&self) -> bool {
        self.size > 0 && self.virtual_address > 0
    }

    pub fn contains_rva(&self, rva: u32) -> bool {
        rva.checked_sub(self.virtual_address)
            .is_some_and(|delta| delta < self.size)
    }
}

/// The subset of the optional header common to PE32 and PE32+.
#[derive(Debug, Clone)]
pub struct OptionalHeader {
    pub magic: u16,
    pub address_of_entry_point: u32,
    pub image_base: u64,
    pub section_alignment: u32,
    pub size_of_image: u32,
    pub size_of_headers: u32,
    pub number_of_rva_and_sizes: u32,
}

impl OptionalHeader {
    pub fn is_64bit(&self) -> bool {
        self.magic == PE32PLUS_MAGIC
    }

    pub fn bitness(&self) -> u32 {
        match self.is_64bit() {
            true => 64,
            false => 32,
        }
    }

    /// Where the data directories start, counted from the optional header.
    pub fn data_directory_offset(&self) -> usize {
        // PE32+ widens ImageBase and the four stack/heap sizes to 8 bytes.
        const PE32_FIXED_PART: usize = 96;
        match self.is_64bit() {
            true => PE32_FIXED_PART + 16,
            false => PE32_FIXED_PART,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NtHeaders {
    pub file_header: CoffHeader,
    pub optional_header: OptionalHeader,
    pub data_directories: Vec<DataDirectory>,
    /// Image offset of the first section header.
    pub section_table_offset: usize,
}

impl NtHeaders {
    /// The directory at `index`, or an empty one if the header declares fewer.
    pub fn directory(&self, index: usize) -> DataDirectory {
        match self.data_directories.get(index) {
            Some(dir) => *dir,
            None => DataDirectory::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SectionHeader {
    pub name: [u8; 8],
    pub virtual_size: u32,
    pub virtual_address: u32,
    pub size_of_raw_data: u32,
    pub characteristics: u32,
}

impl SectionHeader {
    /// Section name up to the first NUL.
    pub fn name(&self) -> String {
        let len = self.name.iter().take_while(|&&b| b != 0).count();
        String::from_utf8_lossy(&self.name[..len]).into_owned()
    }

    /// Bytes the loader reserved for this section. Linkers that leave
    /// `VirtualSize` at zero mean the raw size.
    pub fn mapped_size(&self) -> u32 {
        match self.virtual_size {
            0 => self.size_of_raw_data,
            size => size,
        }
    }

    fn has(&self, flag: u32) -> bool {
        self.characteristics & flag == flag
    }

    pub fn is_executable(&self) -> bool {
        self.has(IMAGE_SCN_MEM_EXECUTE)
    }

    pub fn is_readable(&self) -> bool {
        self.has(IMAGE_SCN_MEM_READ)
    }

    pub fn is_writable(&self) -> bool {
        self.has(IMAGE_SCN_MEM_WRITE)
    }

    pub fn contains_code(&self) -> bool {
        self.has(IMAGE_SCN_CNT_CODE)
    }
}

/// A named or ordinal-only export. Forwarded exports carry the
/// `DLL.Symbol` string instead of code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportEntry {
    pub name: Option<String>,
    pub ordinal: u32,
    pub rva: u32,
    pub forwarder: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_header(virtual_size: u32) -> SectionHeader {
        SectionHeader {
            name: *b".text\0\0\0",
            virtual_size,
            virtual_address: 0x1000,
            size_of_raw_data: 0x200,
            characteristics: IMAGE_SCN_CNT_CODE | IMAGE_SCN_MEM_EXECUTE | IMAGE_SCN_MEM_READ,
        }
    }

    #[test]
    fn test_section_flags_and_name() {
        let header = text_header(0);
        assert_eq!(header.name(), ".text");
        assert!(header.contains_code());
        assert!(header.is_executable());
        assert!(header.is_readable());
        assert!(!header.is_writable());
    }

    #[test]
    fn test_mapped_size_prefers_virtual_size() {
        assert_eq!(text_header(0).mapped_size(), 0x200);
        assert_eq!(text_header(0x1234).mapped_size(), 0x1234);
    }

    #[test]
    fn test_data_directory_bounds() {
        let dir = DataDirectory {
            virtual_address: 0x400,
            size: 0x100,
        };
        assert!(dir.is_present());
        assert!(!dir.contains_rva(0x3ff));
        assert!(dir.contains_rva(0x400));
        assert!(dir.contains_rva(0x4ff));
        assert!(!dir.contains_rva(0x500));
        assert!(!DataDirectory::default().is_present());
    }

    #[test]
    fn test_machine_from_raw() {
        assert_eq!(Machine::from(0x014c), Machine::I386);
        assert_eq!(Machine::from(0x8664), Machine::X86_64);
        assert_eq!(Machine::from(0xaa64), Machine::Other(0xaa64));
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(PeError::InvalidMagic(0x107).to_string(), "unknown optional header magic 0x0107");
        assert_eq!(
            PeError::InvalidRva { rva: 0x1000 }.to_string(),
            "rva 0x00001000 is outside the image"
        );
    }
}
