//! Compact record of one decoded instruction.
//!
//! Only the address, length, mnemonic and control-flow category are kept;
//! operand-level questions are answered by re-decoding the bytes from the
//! owning segment (see [`crate::core::function::ParsedFunction`]).

use std::fmt;

use iced_x86::{FlowControl, Mnemonic};

/// How an instruction affects control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowCategory {
    /// Falls through to the next instruction
    Sequential,
    /// Jcc, loop and friends: target or fall-through
    ConditionalBranch,
    /// Direct or indirect jump: never falls through
    UnconditionalBranch,
    /// Direct or indirect call
    Call,
    /// ret/iret
    Return,
    /// int3, int n, ud2 and other traps
    Interrupt,
}

impl FlowCategory {
    /// True when decoding continues at the next instruction.
    pub fn falls_through(&self) -> bool {
        matches!(
            self,
            FlowCategory::Sequential | FlowCategory::ConditionalBranch | FlowCategory::Call
        )
    }
}

impl From<FlowControl> for FlowCategory {
    fn from(flow: FlowControl) -> Self {
        match flow {
            FlowControl::Next | FlowControl::XbeginXabortXend => FlowCategory::Sequential,
            FlowControl::ConditionalBranch => FlowCategory::ConditionalBranch,
            FlowControl::UnconditionalBranch | FlowControl::IndirectBranch => {
                FlowCategory::UnconditionalBranch
            }
            FlowControl::Call | FlowControl::IndirectCall => FlowCategory::Call,
            FlowControl::Return => FlowCategory::Return,
            FlowControl::Interrupt | FlowControl::Exception => FlowCategory::Interrupt,
            #[allow(unreachable_patterns)]
            _ => FlowCategory::Interrupt,
        }
    }
}

impl fmt::Display for FlowCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FlowCategory::Sequential => "sequential",
            FlowCategory::ConditionalBranch => "conditional",
            FlowCategory::UnconditionalBranch => "unconditional",
            FlowCategory::Call => "call",
            FlowCategory::Return => "return",
            FlowCategory::Interrupt => "interrupt",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedInstruction {
    pub address: u64,
    pub length: u8,
    pub mnemonic: Mnemonic,
    pub category: FlowCategory,
}

impl DecodedInstruction {
    /// First address after the instruction.
    pub fn end(&self) -> u64 {
        self.address + self.length as u64
    }

    /// True when `address` falls on one of the instruction's bytes.
    pub fn covers(&self, address: u64) -> bool {
        address >= self.address && address < self.end()
    }

    pub fn is_call(&self) -> bool {
        self.category == FlowCategory::Call
    }
}

impl fmt::Display for DecodedInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:#x}: {:?} ({} bytes, {})",
            self.address, self.mnemonic, self.length, self.category
        )
    }
}
