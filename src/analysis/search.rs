//! Byte-pattern search over a segment.
//!
//! All searches cover the raw-data-backed part of the segment and report
//! virtual addresses. Matches never overlap: after a hit the scan resumes past
//! its last byte, so `"aa"` occurs once in `"aaa"`. Uniqueness queries treat
//! more than one hit as ambiguous and report nothing.

use memchr::memmem;
use tracing::{debug, trace};

use crate::core::segment::Segment;
use crate::formats::pe::utils::encode_ptr;

/// `call rel32`
const CALL_REL32: u8 = 0xE8;
/// `cmp dword ptr [abs32], imm8`
const CMP_MEM_IMM8: [u8; 2] = [0x83, 0x3D];

impl Segment {
    /// Every non-overlapping occurrence of `needle`, in ascending order.
    pub fn find_all(&self, needle: &[u8]) -> Vec<u64> {
        if needle.is_empty() {
            return Vec::new();
        }
        let haystack = self.defined_data();
        let mut found = Vec::new();
        let mut pos = 0usize;
        let finder = memmem::Finder::new(needle);
        while let Some(hit) = finder.find(&haystack[pos..]) {
            let at = pos + hit;
            found.push(self.base() + at as u64);
            pos = at + needle.len();
        }
        found
    }

    /// The single occurrence of `needle`, if there is exactly one.
    pub fn find_only(&self, needle: &[u8]) -> Option<u64> {
        let found = self.find_all(needle);
        match found.as_slice() {
            [only] => Some(*only),
            _ => {
                debug!(
                    segment = self.name(),
                    needle_len = needle.len(),
                    matches = found.len(),
                    "needle is not unique"
                );
                None
            }
        }
    }

    /// Locations holding `target` as a pointer-width little-endian value.
    pub fn find_address_references(&self, target: u64) -> Vec<u64> {
        self.find_all(&encode_ptr(target, self.bitness()))
    }

    pub fn find_only_address_reference(&self, target: u64) -> Option<u64> {
        self.find_only(&encode_ptr(target, self.bitness()))
    }

    /// Targets of every `E8 rel32` byte pattern in `[from, from + window)`.
    ///
    /// This is a byte scan rather than a disassembly, so it also works from
    /// addresses that are not instruction boundaries. Patterns whose operand
    /// would run past the segment are ignored.
    pub fn raw_call_targets(&self, from: u64, window: u64) -> Vec<u64> {
        let Some(bytes) = self.bytes_from(from) else {
            return Vec::new();
        };
        let window = (window as usize).min(bytes.len());

        let mut targets = Vec::new();
        for i in memchr::memchr_iter(CALL_REL32, &bytes[..window]) {
            let Some(operand) = bytes.get(i + 1..i + 5) else {
                continue;
            };
            let rel = i32::from_le_bytes([operand[0], operand[1], operand[2], operand[3]]);
            let next = from + i as u64 + 5;
            targets.push(next.wrapping_add(rel as i64 as u64));
        }
        trace!(
            segment = self.name(),
            from = format_args!("{:#x}", from),
            calls = targets.len(),
            "raw call scan"
        );
        targets
    }

    /// Operand of the single `cmp dword ptr [abs32], 0` in `[from, from + window)`.
    pub fn find_only_cmp_mem_zero(&self, from: u64, window: u64) -> Option<u64> {
        let bytes = self.bytes_from(from)?;
        let window = (window as usize).min(bytes.len());

        let mut operands = Vec::new();
        for i in memmem::find_iter(&bytes[..window], &CMP_MEM_IMM8) {
            let Some(insn) = bytes.get(i..i + 7) else {
                continue;
            };
            if insn[6] != 0 {
                continue;
            }
            operands.push(u32::from_le_bytes([insn[2], insn[3], insn[4], insn[5]]) as u64);
        }

        match operands.as_slice() {
            [only] => Some(*only),
            _ => {
                debug!(
                    from = format_args!("{:#x}", from),
                    found = operands.len(),
                    "wrong number of cmp [mem], 0 instructions"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_all_non_overlapping() {
        let seg = Segment::new(".rdata", 0x2000, b"xaaax".to_vec());
        assert_eq!(seg.find_all(b"aa"), vec![0x2001]);
        assert_eq!(seg.find_all(b"a"), vec![0x2001, 0x2002, 0x2003]);
        assert!(seg.find_all(b"").is_empty());
        assert!(seg.find_all(b"zz").is_empty());
    }

    #[test]
    fn test_find_only() {
        let seg = Segment::new(".rdata", 0x2000, b"one two one".to_vec());
        assert_eq!(seg.find_only(b"two"), Some(0x2004));
        assert_eq!(seg.find_only(b"one"), None);
        assert_eq!(seg.find_only(b"three"), None);
    }

    #[test]
    fn test_search_ignores_undefined_tail() {
        let mut data = b"abc".to_vec();
        data.extend_from_slice(&[0u8; 13]);
        data.extend_from_slice(b"abc");
        let seg = Segment::new(".data", 0x3000, data).with_defined_length(8);
        assert_eq!(seg.find_all(b"abc"), vec![0x3000]);
    }

    #[test]
    fn test_address_references() {
        let mut data = vec![0u8; 32];
        data[4..8].copy_from_slice(&0x0040_2010u32.to_le_bytes());
        data[20..24].copy_from_slice(&0x0040_2010u32.to_le_bytes());
        let seg = Segment::new(".text", 0x401000, data);
        assert_eq!(seg.find_address_references(0x402010), vec![0x401004, 0x401014]);
        assert_eq!(seg.find_only_address_reference(0x402010), None);
    }

    #[test]
    fn test_raw_call_targets() {
        // push imm32 ; call +0x10 ; call -0x20
        let mut data = vec![0x68, 0, 0, 0, 0];
        data.extend_from_slice(&[0xE8, 0x10, 0, 0, 0]);
        data.extend_from_slice(&[0xE8]);
        data.extend_from_slice(&(-0x20i32).to_le_bytes());
        let seg = Segment::new(".text", 0x401000, data);
        assert_eq!(
            seg.raw_call_targets(0x401000, 0x40),
            vec![0x401000 + 10 + 0x10, 0x401000 + 15 - 0x20]
        );
        // window stops before the second call
        assert_eq!(seg.raw_call_targets(0x401000, 10), vec![0x40101A]);
    }

    #[test]
    fn test_cmp_mem_zero() {
        let mut data = vec![0x90; 4];
        data.extend_from_slice(&[0x83, 0x3D, 0x44, 0x33, 0x22, 0x11, 0x00]);
        data.extend_from_slice(&[0x83, 0x3D, 0x00, 0x00, 0x50, 0x00, 0x01]); // cmp .., 1
        let seg = Segment::new(".text", 0x401000, data.clone());
        assert_eq!(seg.find_only_cmp_mem_zero(0x401000, 0x40), Some(0x11223344));

        data.extend_from_slice(&[0x83, 0x3D, 0x00, 0x00, 0x50, 0x00, 0x00]);
        let seg = Segment::new(".text", 0x401000, data);
        assert_eq!(seg.find_only_cmp_mem_zero(0x401000, 0x40), None);
    }
}
