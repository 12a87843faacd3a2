use iced_x86::{Decoder, DecoderError, DecoderOptions, Formatter, Instruction, IntelFormatter, OpKind};

use crate::core::instruction::{DecodedInstruction, FlowCategory};
use crate::disasm::{Disassembler, DisassemblerError, DisassemblerResult};

/// iced-x86 backed decoder for 32-bit and 64-bit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IcedDisassembler {
    bits: u32,
}

impl IcedDisassembler {
    pub fn new(bits: u32) -> Self {
        Self { bits }
    }

    /// Full iced decoding of the instruction at the start of `bytes`.
    pub fn decode_full(&self, address: u64, bytes: &[u8]) -> DisassemblerResult<Instruction> {
        if !matches!(self.bits, 16 | 32 | 64) {
            return Err(DisassemblerError::UnsupportedBitness(self.bits));
        }
        let mut decoder = Decoder::with_ip(self.bits, bytes, address, DecoderOptions::NONE);
        let instr = decoder.decode();
        if instr.is_invalid() {
            return Err(match decoder.last_error() {
                DecoderError::NoMoreBytes => DisassemblerError::InsufficientBytes { address },
                _ => DisassemblerError::InvalidInstruction { address },
            });
        }
        Ok(instr)
    }

    /// Direct near-branch target of an already decoded instruction.
    pub fn near_target(instr: &Instruction) -> Option<u64> {
        match instr.op0_kind() {
            OpKind::NearBranch16 | OpKind::NearBranch32 | OpKind::NearBranch64 => {
                Some(instr.near_branch_target())
            }
            _ => None,
        }
    }
}

impl Disassembler for IcedDisassembler {
    fn decode(&self, address: u64, bytes: &[u8]) -> DisassemblerResult<DecodedInstruction> {
        let instr = self.decode_full(address, bytes)?;
        Ok(DecodedInstruction {
            address,
            length: instr.len() as u8,
            mnemonic: instr.mnemonic(),
            category: FlowCategory::from(instr.flow_control()),
        })
    }

    fn branch_target(&self, address: u64, bytes: &[u8]) -> Option<u64> {
        let instr = self.decode_full(address, bytes).ok()?;
        Self::near_target(&instr)
    }

    fn render(&self, address: u64, bytes: &[u8]) -> DisassemblerResult<String> {
        let instr = self.decode_full(address, bytes)?;
        let mut fmt = IntelFormatter::new();
        let mut out = String::new();
        fmt.format(&instr, &mut out);
        Ok(out)
    }

    fn bitness(&self) -> u32 {
        self.bits
    }
}
