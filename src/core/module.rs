//! Address-space model of one loaded image.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::analysis::cfg::parse_function;
use crate::config::ModuleConfig;
use crate::core::function::ParsedFunction;
use crate::core::image::ImageView;
use crate::core::segment::{Perms, Segment};
use crate::disasm::IcedDisassembler;
use crate::error::{FatalError, Result};
use crate::formats::pe::{ExportTable, LoadedPe};

/// A loaded image: its segments sorted by base address, looked up by name,
/// plus the export table.
///
/// Construction validates the headers and rejects duplicate or overlapping
/// sections; afterwards the module is immutable.
#[derive(Debug, Clone)]
pub struct Module {
    name: String,
    image: ImageView,
    bitness: u32,
    segments: Vec<Segment>,
    by_name: HashMap<String, usize>,
    exports: ExportTable,
}

impl Module {
    /// Build the module model from a mapped image.
    pub fn open(name: impl Into<String>, image: ImageView, config: &ModuleConfig) -> Result<Self> {
        let name = name.into();
        let data = image.as_slice();
        let malformed = |source| FatalError::MalformedHeader {
            module: name.clone(),
            source,
        };

        let dos = LoadedPe::dos_header(data).map_err(malformed)?;
        if dos.e_lfanew > config.max_header_offset {
            return Err(FatalError::ExcessiveHeaderOffset {
                module: name.clone(),
                offset: dos.e_lfanew,
                max: config.max_header_offset,
            });
        }
        let pe = LoadedPe::parse(data, dos).map_err(malformed)?;
        let bitness = pe.bitness();

        let mut segments = Vec::with_capacity(pe.sections.len());
        for header in &pe.sections {
            let seg_name = header.name();
            if segments.iter().any(|s: &Segment| s.name() == seg_name) {
                return Err(FatalError::DuplicateSegment {
                    module: name.clone(),
                    name: seg_name,
                });
            }

            let rva = header.virtual_address as usize;
            let length = header.mapped_size() as usize;
            let bytes = image
                .slice(rva, length)
                .ok_or_else(|| FatalError::SegmentOutsideImage {
                    module: name.clone(),
                    name: seg_name.clone(),
                    end: image.base() + rva as u64 + length as u64,
                    image_end: image.end(),
                })?;

            segments.push(
                Segment::new(seg_name, image.base() + rva as u64, bytes)
                    .with_defined_length(header.size_of_raw_data as u64)
                    .with_perms(Perms::from_section(header))
                    .with_bitness(bitness),
            );
        }

        segments.sort_by_key(|s| s.base());
        for pair in segments.windows(2) {
            if pair[0].end() > pair[1].base() {
                return Err(FatalError::SegmentOverlap {
                    module: name.clone(),
                    first: pair[0].name().to_string(),
                    second: pair[1].name().to_string(),
                });
            }
        }

        let by_name = segments
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name().to_string(), i))
            .collect();

        let exports = pe.exports(data, config.max_exports).map_err(malformed)?;

        debug!(
            module = %name,
            base = format_args!("{:#x}", image.base()),
            bitness,
            segments = segments.len(),
            exports = exports.count(),
            "module opened"
        );

        Ok(Self {
            name,
            image,
            bitness,
            segments,
            by_name,
            exports,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base(&self) -> u64 {
        self.image.base()
    }

    pub fn bitness(&self) -> u32 {
        self.bitness
    }

    pub fn image(&self) -> &ImageView {
        &self.image
    }

    /// Segments in ascending base order.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn segment(&self, name: &str) -> Option<&Segment> {
        self.by_name.get(name).map(|&i| &self.segments[i])
    }

    pub fn has_segment(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Like [`Module::segment`], but a missing segment is fatal.
    pub fn require_segment(&self, name: &str) -> Result<&Segment> {
        self.segment(name).ok_or_else(|| FatalError::MissingSegment {
            module: self.name.clone(),
            name: name.to_string(),
        })
    }

    /// Segment strictly containing `address`.
    pub fn segment_for_address(&self, address: u64) -> Option<&Segment> {
        // First segment whose base is not below the address; membership is
        // strictly interior, so the preceding segment is the usual owner.
        let idx = self.segments.partition_point(|s| s.base() < address);
        if let Some(seg) = self.segments.get(idx) {
            if seg.contains_address(address) {
                return Some(seg);
            }
        }
        idx.checked_sub(1)
            .and_then(|prev| self.segments.get(prev))
            .filter(|seg| seg.contains_address(address))
    }

    pub fn contains_address(&self, address: u64) -> bool {
        self.segment_for_address(address).is_some()
    }

    /// Fails when `address` lies outside every segment.
    pub fn bounds_check(&self, address: u64) -> Result<()> {
        if self.contains_address(address) {
            Ok(())
        } else {
            Err(FatalError::AddressOutOfBounds {
                scope: format!("module {}", self.name),
                address,
            })
        }
    }

    /// Address of a named, non-forwarded export.
    pub fn export(&self, name: &str) -> Option<u64> {
        let entry = self.exports.get_by_name(name)?;
        if entry.forwarder.is_some() {
            return None;
        }
        Some(self.base() + entry.rva as u64)
    }

    pub fn exports(&self) -> &ExportTable {
        &self.exports
    }

    /// Export address, bounds checked against the segments.
    ///
    /// A missing export is `None`; one that points outside every segment is a
    /// structural error.
    pub fn function_by_name(&self, name: &str) -> Result<Option<u64>> {
        match self.export(name) {
            Some(address) => {
                self.bounds_check(address)?;
                Ok(Some(address))
            }
            None => {
                debug!(module = %self.name, export = name, "export not found");
                Ok(None)
            }
        }
    }

    /// Reconstruct the function starting at `address`.
    ///
    /// The address must lie inside the module; a parse that fails is `None`.
    pub fn parse_function_at(
        &self,
        address: u64,
        max_instructions: usize,
    ) -> Result<Option<ParsedFunction>> {
        self.bounds_check(address)?;
        let segment = self
            .segment_for_address(address)
            .ok_or_else(|| FatalError::AddressOutOfBounds {
                scope: format!("module {}", self.name),
                address,
            })?;

        let disasm = IcedDisassembler::new(self.bitness);
        match parse_function(segment, &disasm, address, max_instructions) {
            Ok(function) => Ok(Some(function)),
            Err(failure) => {
                debug!(
                    module = %self.name,
                    entry = format_args!("{:#x}", address),
                    %failure,
                    "function parse failed"
                );
                Ok(None)
            }
        }
    }

    /// Reconstruct an exported function.
    pub fn parse_function_by_name(
        &self,
        name: &str,
        max_instructions: usize,
    ) -> Result<Option<ParsedFunction>> {
        match self.function_by_name(name)? {
            Some(address) => self.parse_function_at(address, max_instructions),
            None => {
                warn!(module = %self.name, export = name, "cannot parse missing export");
                Ok(None)
            }
        }
    }
}
