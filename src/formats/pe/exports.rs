//! Export table parsing
//!
//! The image is in its loaded layout, so every RVA is directly an offset into
//! the image bytes.

use std::collections::HashMap;

use crate::formats::pe::types::*;
use crate::formats::pe::utils::ReadExt;

/// Export table containing all exports
#[derive(Debug, Clone, Default)]
pub struct ExportTable {
    pub dll_name: Option<String>,
    pub ordinal_base: u32,
    pub exports: Vec<ExportEntry>,
    by_name: HashMap<String, usize>,
}

impl ExportTable {
    pub fn new(dll_name: Option<String>, ordinal_base: u32, exports: Vec<ExportEntry>) -> Self {
        let by_name = exports
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.name.clone().map(|n| (n, i)))
            .collect();
        Self {
            dll_name,
            ordinal_base,
            exports,
            by_name,
        }
    }

    /// Get export by name
    pub fn get_by_name(&self, name: &str) -> Option<&ExportEntry> {
        self.by_name
            .get(name)
            .and_then(|&idx| self.exports.get(idx))
    }

    /// Count of exports
    pub fn count(&self) -> usize {
        self.exports.len()
    }
}

/// Parse the export directory of a loaded image
pub fn parse_exports(
    data: &[u8],
    export_dir: &DataDirectory,
    max_exports: usize,
) -> Result<ExportTable> {
    if !export_dir.is_present() {
        return Ok(ExportTable::default());
    }

    let dir = export_dir.virtual_address as usize;
    if dir + EXPORT_DIRECTORY_SIZE > data.len() {
        return Err(PeError::InvalidRva {
            rva: export_dir.virtual_address,
        });
    }

    let name_rva = data.u32_at(dir + 12)?;
    let ordinal_base = data.u32_at(dir + 16)?;
    let number_of_functions = (data.u32_at(dir + 20)? as usize).min(max_exports);
    let number_of_names = (data.u32_at(dir + 24)? as usize).min(max_exports);
    let address_table = data.u32_at(dir + 28)? as usize;
    let name_table = data.u32_at(dir + 32)? as usize;
    let ordinal_table = data.u32_at(dir + 36)? as usize;

    let dll_name = if name_rva != 0 {
        Some(data.cstr_at(name_rva as usize, 256)?.to_string())
    } else {
        None
    };

    let mut names: HashMap<usize, String> = HashMap::new();
    if number_of_names > 0 && (name_table == 0 || ordinal_table == 0) {
        return Err(PeError::MalformedExportTable);
    }
    for i in 0..number_of_names {
        let name_rva = data.u32_at(name_table + i * 4)?;
        let index = data.u16_at(ordinal_table + i * 2)? as usize;
        if name_rva == 0 {
            continue;
        }
        let name = data.cstr_at(name_rva as usize, 512)?;
        names.insert(index, name.to_string());
    }

    let mut exports = Vec::with_capacity(number_of_functions);
    for i in 0..number_of_functions {
        let rva = data.u32_at(address_table + i * 4)?;
        if rva == 0 {
            continue; // Unused slot
        }

        // RVA inside the export directory = forwarder string
        let forwarder = if export_dir.contains_rva(rva) {
            data.cstr_at(rva as usize, 256).ok().map(str::to_string)
        } else {
            None
        };

        let ordinal = u32::try_from(i)
            .ok()
            .and_then(|i| ordinal_base.checked_add(i))
            .ok_or(PeError::MalformedExportTable)?;
        exports.push(ExportEntry {
            name: names.remove(&i),
            ordinal,
            rva,
            forwarder,
        });
    }

    Ok(ExportTable::new(dll_name, ordinal_base, exports))
}
