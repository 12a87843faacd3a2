//! Instruction decoding.
//!
//! The [`Disassembler`] trait is the seam the function parser decodes
//! through; [`IcedDisassembler`] implements it for x86 and x86-64.

pub mod iced;

pub use iced::IcedDisassembler;

use thiserror::Error;

use crate::core::instruction::DecodedInstruction;

/// Errors that can occur while decoding a single instruction
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DisassemblerError {
    /// Bytes do not form a valid instruction
    #[error("invalid instruction at {address:#x}")]
    InvalidInstruction { address: u64 },
    /// The byte stream ends inside the instruction
    #[error("insufficient bytes at {address:#x}")]
    InsufficientBytes { address: u64 },
    /// Only 16, 32 and 64 bit modes exist
    #[error("unsupported bitness {0}")]
    UnsupportedBitness(u32),
}

/// Result type for disassembly operations
pub type DisassemblerResult<T> = Result<T, DisassemblerError>;

/// Single-instruction decoder.
pub trait Disassembler {
    /// Decode the instruction at the start of `bytes`, located at `address`.
    fn decode(&self, address: u64, bytes: &[u8]) -> DisassemblerResult<DecodedInstruction>;

    /// Target of a direct branch or call; `None` for indirect forms and for
    /// instructions that do not branch.
    fn branch_target(&self, address: u64, bytes: &[u8]) -> Option<u64>;

    /// Human-readable rendering for diagnostics.
    fn render(&self, address: u64, bytes: &[u8]) -> DisassemblerResult<String>;

    fn bitness(&self) -> u32;

    /// Most bytes a single instruction can span; the parser hands at most
    /// this many to [`Disassembler::decode`].
    fn max_instruction_length(&self) -> usize {
        15
    }
}
