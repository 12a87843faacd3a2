//! A function reconstructed by following control flow from its entry.

use std::fmt::Write as _;

use iced_x86::Instruction;
use tracing::debug;

use crate::core::instruction::DecodedInstruction;
use crate::core::segment::Segment;
use crate::disasm::{Disassembler, IcedDisassembler};

/// Instructions reachable from `entry`, ordered by address.
///
/// Instructions are unique by address and never overlap; gaps between them
/// (data, padding, unreachable code) are allowed.
#[derive(Debug, Clone)]
pub struct ParsedFunction {
    entry: u64,
    segment: Segment,
    disasm: IcedDisassembler,
    instructions: Vec<DecodedInstruction>,
    gaps: usize,
}

impl ParsedFunction {
    /// `instructions` must already be sorted and non-overlapping.
    pub(crate) fn new(
        entry: u64,
        segment: Segment,
        disasm: IcedDisassembler,
        instructions: Vec<DecodedInstruction>,
        gaps: usize,
    ) -> Self {
        Self {
            entry,
            segment,
            disasm,
            instructions,
            gaps,
        }
    }

    pub fn entry(&self) -> u64 {
        self.entry
    }

    pub fn segment(&self) -> &Segment {
        &self.segment
    }

    pub fn instructions(&self) -> &[DecodedInstruction] {
        &self.instructions
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Number of holes between consecutive instructions.
    pub fn gap_count(&self) -> usize {
        self.gaps
    }

    /// Lowest instruction address.
    pub fn start(&self) -> u64 {
        self.instructions.first().map_or(self.entry, |i| i.address)
    }

    /// First address past the highest instruction.
    pub fn end(&self) -> u64 {
        self.instructions.last().map_or(self.entry, |i| i.end())
    }

    /// True when `address` falls on a byte of one of the instructions.
    pub fn contains_address(&self, address: u64) -> bool {
        let idx = self.instructions.partition_point(|i| i.address <= address);
        idx.checked_sub(1)
            .map(|i| self.instructions[i].covers(address))
            .unwrap_or(false)
    }

    /// Instructions at or after `address`.
    pub fn instructions_after(&self, address: u64) -> &[DecodedInstruction] {
        let idx = self.instructions.partition_point(|i| i.address < address);
        &self.instructions[idx..]
    }

    fn tail(&self, after: Option<u64>) -> &[DecodedInstruction] {
        match after {
            Some(address) => self.instructions_after(address),
            None => &self.instructions,
        }
    }

    fn bytes_of(&self, ins: &DecodedInstruction) -> &[u8] {
        self.segment.bytes_from(ins.address).unwrap_or(&[])
    }

    /// Full decoded form of a recorded instruction.
    pub fn decode_full(&self, ins: &DecodedInstruction) -> Option<Instruction> {
        self.disasm.decode_full(ins.address, self.bytes_of(ins)).ok()
    }

    /// Direct branch or call target of a recorded instruction.
    pub fn branch_target(&self, ins: &DecodedInstruction) -> Option<u64> {
        self.disasm.branch_target(ins.address, self.bytes_of(ins))
    }

    /// Targets of every call from `after` (or the start) onward, in address
    /// order. Indirect calls are skipped.
    pub fn call_targets(&self, after: Option<u64>) -> Vec<u64> {
        let mut targets = Vec::new();
        for ins in self.tail(after).iter().filter(|i| i.is_call()) {
            match self.branch_target(ins) {
                Some(target) => targets.push(target),
                None => debug!(
                    function = format_args!("{:#x}", self.entry),
                    call = format_args!("{:#x}", ins.address),
                    "skipping indirect call"
                ),
            }
        }
        targets
    }

    /// Addresses of instructions from `after` onward whose full decoded
    /// form satisfies `predicate`.
    pub fn find_instructions<F>(&self, after: Option<u64>, predicate: F) -> Vec<u64>
    where
        F: Fn(&Instruction) -> bool,
    {
        self.tail(after)
            .iter()
            .filter(|ins| self.decode_full(ins).is_some_and(|full| predicate(&full)))
            .map(|ins| ins.address)
            .collect()
    }

    /// Like [`ParsedFunction::find_instructions`], but only a single match
    /// counts.
    pub fn find_only_instruction<F>(&self, after: Option<u64>, predicate: F) -> Option<u64>
    where
        F: Fn(&Instruction) -> bool,
    {
        let found = self.find_instructions(after, predicate);
        match found.as_slice() {
            [only] => Some(*only),
            _ => {
                debug!(
                    function = format_args!("{:#x}", self.entry),
                    matches = found.len(),
                    "expected exactly one matching instruction"
                );
                None
            }
        }
    }

    /// Intel-syntax listing, one instruction per line.
    pub fn disassembly(&self) -> String {
        let mut out = String::new();
        for ins in &self.instructions {
            let text = self
                .disasm
                .render(ins.address, self.bytes_of(ins))
                .unwrap_or_else(|e| e.to_string());
            let _ = writeln!(out, "{:#010x}  {}", ins.address, text);
        }
        out
    }
}
