use std::fmt;

use serde::{Deserialize, Serialize};

use crate::bytecode::op::{Definition, Opcode};

// =============================================================================
// CODE - Instruction encoding and decoding
// =============================================================================

/// A flat buffer of encoded instructions.
///
/// The `Display` impl renders the canonical disassembly: one line per
/// instruction, `<offset> <NAME> <operands...>` with four-digit offsets.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Instructions(pub Vec<u8>);

impl Instructions {
    pub fn new() -> Self {
        Instructions(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Append an encoded instruction, returning the offset it starts at.
    pub fn append(&mut self, ins: &[u8]) -> usize {
        let pos = self.0.len();
        self.0.extend_from_slice(ins);
        pos
    }

    /// Overwrite bytes in place starting at `pos`. Used for jump patching;
    /// the replacement must have the same width as what it replaces.
    pub fn overwrite(&mut self, pos: usize, ins: &[u8]) {
        self.0[pos..pos + ins.len()].copy_from_slice(ins);
    }

    /// Truncate the buffer to `len` bytes, discarding the tail.
    pub fn truncate(&mut self, len: usize) {
        self.0.truncate(len);
    }
}

/// Encode one instruction: the opcode byte followed by each operand in the
/// width its definition declares, big-endian. Operands are truncated to
/// their declared width.
pub fn make(op: Opcode, operands: &[usize]) -> Vec<u8> {
    let def = op.definition();
    let mut ins = Vec::with_capacity(1 + def.operand_widths.iter().sum::<usize>());
    ins.push(op as u8);
    for (operand, width) in operands.iter().zip(def.operand_widths) {
        match width {
            2 => ins.extend_from_slice(&(*operand as u16).to_be_bytes()),
            1 => ins.push(*operand as u8),
            _ => unreachable!("unhandled operand width {width}"),
        }
    }
    ins
}

/// Decode the operands that follow an opcode byte. Returns the operand
/// values and the number of bytes consumed.
pub fn read_operands(def: &Definition, ins: &[u8]) -> (Vec<usize>, usize) {
    let mut operands = Vec::with_capacity(def.operand_widths.len());
    let mut offset = 0;
    for width in def.operand_widths {
        match width {
            2 => operands.push(read_u16(ins, offset) as usize),
            1 => operands.push(read_u8(ins, offset) as usize),
            _ => unreachable!("unhandled operand width {width}"),
        }
        offset += width;
    }
    (operands, offset)
}

pub fn read_u16(ins: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([ins[offset], ins[offset + 1]])
}

pub fn read_u8(ins: &[u8], offset: usize) -> u8 {
    ins[offset]
}

impl fmt::Display for Instructions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut offset = 0;
        while offset < self.0.len() {
            let Ok(op) = Opcode::try_from(self.0[offset]) else {
                writeln!(f, "{:04} ERROR: unknown opcode {}", offset, self.0[offset])?;
                offset += 1;
                continue;
            };
            let def = op.definition();
            let width: usize = def.operand_widths.iter().sum();
            let Some(operand_bytes) = self.0.get(offset + 1..offset + 1 + width) else {
                writeln!(f, "{:04} ERROR: truncated operand for {}", offset, def.name)?;
                break;
            };
            let (operands, read) = read_operands(&def, operand_bytes);
            write!(f, "{:04} {}", offset, def.name)?;
            for operand in &operands {
                write!(f, " {operand}")?;
            }
            writeln!(f)?;
            offset += 1 + read;
        }
        Ok(())
    }
}
