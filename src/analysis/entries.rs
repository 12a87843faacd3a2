//! Candidate function entries from alignment and padding conventions.
//!
//! Compilers align function starts and fill the space between functions with
//! a padding byte. Walking backwards from an address inside a function, every
//! aligned boundary preceded by padding (or sitting at the segment base) is a
//! possible entry. The heuristic over-generates; pipelines cross-check.

use tracing::debug;

use crate::config::EntryConvention;
use crate::core::segment::Segment;
use crate::error::{FatalError, Result};

impl Segment {
    /// Candidate entries at or below `near`, nearest first, at most `window`
    /// bytes back from the aligned-down address.
    ///
    /// `near` must lie strictly inside the segment and `window` must be a
    /// multiple of the alignment.
    pub fn potential_function_entries(
        &self,
        near: u64,
        window: u64,
        convention: &EntryConvention,
    ) -> Result<Vec<u64>> {
        self.bounds_check(near)?;
        convention.validate()?;
        if window % convention.alignment != 0 {
            return Err(FatalError::InvalidConfig(format!(
                "entry window {:#x} is not a multiple of the alignment {:#x}",
                window, convention.alignment
            )));
        }

        let top = convention.align_down(near);
        let floor = top.saturating_sub(window).max(self.base());

        let mut entries = Vec::new();
        let mut candidate = top;
        while candidate >= floor {
            if candidate == self.base() || self.byte_before(candidate) == Some(convention.padding)
            {
                entries.push(candidate);
            }
            match candidate.checked_sub(convention.alignment) {
                Some(next) => candidate = next,
                None => break,
            }
        }
        Ok(entries)
    }

    fn byte_before(&self, address: u64) -> Option<u8> {
        let off = self.offset_of(address.checked_sub(1)?)?;
        self.data().get(off).copied()
    }

    /// Candidate entries around every pointer-width reference to `target`
    /// in this segment.
    pub fn potential_entries_referencing(
        &self,
        target: u64,
        window: u64,
        convention: &EntryConvention,
    ) -> Result<Vec<u64>> {
        self.entries_around(&self.find_address_references(target), window, convention)
    }

    /// Candidate entries around every occurrence of `needle` in this segment.
    pub fn potential_entries_referencing_bytes(
        &self,
        needle: &[u8],
        window: u64,
        convention: &EntryConvention,
    ) -> Result<Vec<u64>> {
        self.entries_around(&self.find_all(needle), window, convention)
    }

    fn entries_around(
        &self,
        sites: &[u64],
        window: u64,
        convention: &EntryConvention,
    ) -> Result<Vec<u64>> {
        let mut entries = Vec::new();
        for &site in sites {
            // A hit at the very base is not strictly inside; nothing precedes it.
            if !self.contains_address(site) {
                continue;
            }
            for entry in self.potential_function_entries(site, window, convention)? {
                if !entries.contains(&entry) {
                    entries.push(entry);
                }
            }
        }
        debug!(
            segment = self.name(),
            sites = sites.len(),
            candidates = entries.len(),
            "potential function entries"
        );
        Ok(entries)
    }
}
