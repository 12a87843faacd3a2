//! DOS, COFF and optional header readers.
//!
//! All offsets are image offsets. In a mapped image the headers occupy the
//! first page exactly as they do in the file, so the same readers serve both.

use crate::formats::pe::types::*;
use crate::formats::pe::utils::ReadExt;

/// Field offsets within the COFF file header.
mod coff {
    pub const MACHINE: usize = 0;
    pub const NUMBER_OF_SECTIONS: usize = 2;
    pub const TIME_DATE_STAMP: usize = 4;
    pub const SIZE_OF_OPTIONAL_HEADER: usize = 16;
    pub const CHARACTERISTICS: usize = 18;
}

/// Field offsets within the optional header. Up to `SIZE_OF_HEADERS` both
/// layouts agree, except `ImageBase` which PE32+ widens over `BaseOfData`.
mod optional {
    pub const ADDRESS_OF_ENTRY_POINT: usize = 16;
    pub const IMAGE_BASE_PE32PLUS: usize = 24;
    pub const IMAGE_BASE_PE32: usize = 28;
    pub const SECTION_ALIGNMENT: usize = 32;
    pub const SIZE_OF_IMAGE: usize = 56;
    pub const SIZE_OF_HEADERS: usize = 60;
}

const E_LFANEW: usize = 0x3C;

fn require(data: &[u8], end: usize) -> Result<()> {
    match end <= data.len() {
        true => Ok(()),
        false => Err(PeError::TruncatedHeader {
            expected: end,
            actual: data.len(),
        }),
    }
}

pub fn parse_dos_header(data: &[u8]) -> Result<DosHeader> {
    require(data, DOS_HEADER_SIZE)?;
    let e_magic = data.u16_at(0)?;
    if e_magic != DOS_SIGNATURE {
        return Err(PeError::InvalidDosSignature);
    }
    let e_lfanew = data.u32_at(E_LFANEW)?;
    Ok(DosHeader { e_magic, e_lfanew })
}

pub fn parse_coff_header(data: &[u8], offset: usize) -> Result<CoffHeader> {
    require(data, offset + COFF_HEADER_SIZE)?;
    let field = |rel: usize| offset + rel;
    Ok(CoffHeader {
        machine: data.u16_at(field(coff::MACHINE))?.into(),
        number_of_sections: data.u16_at(field(coff::NUMBER_OF_SECTIONS))?,
        time_date_stamp: data.u32_at(field(coff::TIME_DATE_STAMP))?,
        size_of_optional_header: data.u16_at(field(coff::SIZE_OF_OPTIONAL_HEADER))?,
        characteristics: data.u16_at(field(coff::CHARACTERISTICS))?,
    })
}

/// Read a PE32 or PE32+ optional header of `size` bytes at `offset`.
pub fn parse_optional_header(data: &[u8], offset: usize, size: u16) -> Result<OptionalHeader> {
    let size = usize::from(size);
    require(data, offset + size)?;
    if size < 2 {
        return Err(PeError::TruncatedHeader {
            expected: 2,
            actual: size,
        });
    }

    let magic = data.u16_at(offset)?;
    let directories_at = match magic {
        PE32_MAGIC => 96,
        PE32PLUS_MAGIC => 112,
        other => return Err(PeError::InvalidMagic(other)),
    };
    if size < directories_at {
        return Err(PeError::TruncatedHeader {
            expected: directories_at,
            actual: size,
        });
    }

    let image_base = if magic == PE32PLUS_MAGIC {
        data.u64_at(offset + optional::IMAGE_BASE_PE32PLUS)?
    } else {
        u64::from(data.u32_at(offset + optional::IMAGE_BASE_PE32)?)
    };

    Ok(OptionalHeader {
        magic,
        address_of_entry_point: data.u32_at(offset + optional::ADDRESS_OF_ENTRY_POINT)?,
        image_base,
        section_alignment: data.u32_at(offset + optional::SECTION_ALIGNMENT)?,
        size_of_image: data.u32_at(offset + optional::SIZE_OF_IMAGE)?,
        size_of_headers: data.u32_at(offset + optional::SIZE_OF_HEADERS)?,
        // NumberOfRvaAndSizes is the last field before the directory array.
        number_of_rva_and_sizes: data.u32_at(offset + directories_at - 4)?,
    })
}

/// Read `count` directory slots, capped at 16, and pad the result to 16.
pub fn parse_data_directories(
    data: &[u8],
    offset: usize,
    count: u32,
) -> Result<Vec<DataDirectory>> {
    let declared = IMAGE_NUMBEROF_DIRECTORY_ENTRIES.min(count as usize);
    let mut directories = (0..declared)
        .map(|slot| {
            let at = offset + slot * 8;
            Ok(DataDirectory {
                virtual_address: data.u32_at(at)?,
                size: data.u32_at(at + 4)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    directories.resize(IMAGE_NUMBEROF_DIRECTORY_ENTRIES, DataDirectory::default());
    Ok(directories)
}

/// Read the NT headers that `e_lfanew` points at.
pub fn parse_nt_headers(data: &[u8], offset: usize) -> Result<NtHeaders> {
    require(data, offset + PE_SIGNATURE.len())?;
    if data[offset..offset + PE_SIGNATURE.len()] != PE_SIGNATURE {
        return Err(PeError::InvalidPeSignature);
    }

    let coff_at = offset + PE_SIGNATURE.len();
    let file_header = parse_coff_header(data, coff_at)?;
    let optional_at = coff_at + COFF_HEADER_SIZE;
    let optional_size = file_header.size_of_optional_header;
    let optional_header = parse_optional_header(data, optional_at, optional_size)?;
    let data_directories = parse_data_directories(
        data,
        optional_at + optional_header.data_directory_offset(),
        optional_header.number_of_rva_and_sizes,
    )?;

    Ok(NtHeaders {
        file_header,
        optional_header,
        data_directories,
        section_table_offset: optional_at + usize::from(optional_size),
    })
}
