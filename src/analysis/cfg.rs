//! Work-list reconstruction of a function from its entry address.
//!
//! Decoding follows control flow: conditional branches queue their target and
//! fall through, unconditional branches queue their target and end the run,
//! returns and traps end the run. Every address is decoded at most once, so
//! loops terminate. The traversal never leaves the owning segment and gives up
//! past an instruction ceiling; after it drains, instructions are checked for
//! overlap, which would mean two decodings disagree about the same bytes.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::{debug, trace};

use crate::core::function::ParsedFunction;
use crate::core::instruction::{DecodedInstruction, FlowCategory};
use crate::core::segment::Segment;
use crate::disasm::{Disassembler, DisassemblerError, IcedDisassembler};

/// Why a function could not be reconstructed. Never fatal: callers move on
/// to the next candidate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseFailure {
    #[error("control flow reaches {address:#x}, outside segment {segment}")]
    OutsideSegment { address: u64, segment: String },
    #[error("undecodable bytes: {0}")]
    Undecodable(#[from] DisassemblerError),
    #[error("more than {limit} instructions")]
    TooManyInstructions { limit: usize },
    #[error("instruction at {second:#x} overlaps instruction at {first:#x}")]
    Overlap { first: u64, second: u64 },
}

/// Reconstruct the function at `entry` inside `segment`.
pub fn parse_function(
    segment: &Segment,
    disasm: &IcedDisassembler,
    entry: u64,
    max_instructions: usize,
) -> Result<ParsedFunction, ParseFailure> {
    let visited = discover(segment, disasm, entry, max_instructions)?;
    let instructions: Vec<DecodedInstruction> = visited.into_values().collect();

    let mut gaps = 0usize;
    let mut max_gap = 0u64;
    for pair in instructions.windows(2) {
        let (first, second) = (&pair[0], &pair[1]);
        if second.address < first.end() {
            return Err(ParseFailure::Overlap {
                first: first.address,
                second: second.address,
            });
        }
        let gap = second.address - first.end();
        if gap > 0 {
            gaps += 1;
            max_gap = max_gap.max(gap);
        }
    }

    debug!(
        entry = format_args!("{:#x}", entry),
        instructions = instructions.len(),
        gaps,
        max_gap,
        "function parsed"
    );

    Ok(ParsedFunction::new(
        entry,
        segment.clone(),
        *disasm,
        instructions,
        gaps,
    ))
}

/// Control-flow traversal; returns every decoded instruction keyed by address.
pub fn discover<D: Disassembler>(
    segment: &Segment,
    disasm: &D,
    entry: u64,
    max_instructions: usize,
) -> Result<BTreeMap<u64, DecodedInstruction>, ParseFailure> {
    let mut visited: BTreeMap<u64, DecodedInstruction> = BTreeMap::new();
    let mut pending = vec![entry];

    while let Some(start) = pending.pop() {
        let mut address = start;
        loop {
            if visited.contains_key(&address) {
                break;
            }
            let bytes = match segment.bytes_from(address) {
                Some(bytes) if segment.contains_address(address) => bytes,
                _ => {
                    return Err(ParseFailure::OutsideSegment {
                        address,
                        segment: segment.name().to_string(),
                    })
                }
            };
            let bytes = &bytes[..bytes.len().min(disasm.max_instruction_length())];

            let ins = disasm.decode(address, bytes)?;
            if visited.len() >= max_instructions {
                return Err(ParseFailure::TooManyInstructions {
                    limit: max_instructions,
                });
            }
            visited.insert(address, ins);

            if matches!(
                ins.category,
                FlowCategory::ConditionalBranch | FlowCategory::UnconditionalBranch
            ) {
                match disasm.branch_target(address, bytes) {
                    Some(target) => pending.push(target),
                    None => trace!(at = format_args!("{:#x}", address), "branch without direct target"),
                }
            }
            if !ins.category.falls_through() {
                break;
            }
            address = ins.end();
        }
    }

    Ok(visited)
}
