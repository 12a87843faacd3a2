//! Section table parsing

use crate::formats::pe::types::*;
use crate::formats::pe::utils::ReadExt;

/// Parse `count` section headers starting at `offset`
pub fn parse_section_headers(
    data: &[u8],
    offset: usize,
    count: u16,
) -> Result<Vec<SectionHeader>> {
    let table_end = offset + count as usize * SECTION_HEADER_SIZE;
    if table_end > data.len() {
        return Err(PeError::TruncatedHeader {
            expected: table_end,
            actual: data.len(),
        });
    }

    let mut sections = Vec::with_capacity(count as usize);
    for i in 0..count as usize {
        let base = offset + i * SECTION_HEADER_SIZE;
        let mut name = [0u8; 8];
        name.copy_from_slice(&data[base..base + 8]);

        sections.push(SectionHeader {
            name,
            virtual_size: data.u32_at(base + 8)?,
            virtual_address: data.u32_at(base + 12)?,
            size_of_raw_data: data.u32_at(base + 16)?,
            characteristics: data.u32_at(base + 36)?,
        });
    }

    Ok(sections)
}
