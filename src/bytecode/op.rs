use serde::{Deserialize, Serialize};

// =============================================================================
// OP - Instruction set
// =============================================================================

/// One-byte instruction tags.
///
/// Every instruction is one opcode byte followed by zero or more fixed-width
/// big-endian operands; widths are declared in [`Opcode::definition`].
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Opcode {
    /// Push `constants[operand]`. Operand: 2-byte constant index.
    Constant = 0,

    // arithmetic: pop two, push the result
    Add,
    Sub,
    Mul,
    Div,

    /// Discard the top of the stack (emitted after each expression statement).
    Pop,

    // singleton literals
    True,
    False,
    Null,

    // comparison: pop two, push a boolean. Ordering exists only as
    // `GreaterThan`; the compiler swaps operands to express `<`.
    Equal,
    NotEqual,
    GreaterThan,

    // unary: pop one, push the result
    Minus,
    Bang,

    /// Unconditional jump. Operand: 2-byte absolute byte offset.
    Jump,
    /// Pop one value; jump when it is not truthy. Operand: 2-byte offset.
    JumpNotTruthy,

    // global bindings. Operand: 2-byte slot index.
    GetGlobal,
    SetGlobal,

    // frame-local bindings. Operand: 1-byte slot index relative to the
    // current frame's base pointer.
    GetLocal,
    SetLocal,

    /// Load a captured variable. Operand: 1-byte index into the current
    /// closure's capture list.
    GetFree,

    /// Pop N values, push an array. Operand: 2-byte element count.
    Array,
    /// Pop N values (alternating key/value), push a hash. Operand: 2-byte
    /// slot count (twice the pair count).
    Hash,
    /// Pop index then collection, push the element or null.
    Index,

    /// Invoke the callee found argc slots below the stack top. Operand:
    /// 1-byte argument count.
    Call,
    /// Pop the frame, restore the caller's stack, push the popped value.
    ReturnValue,
    /// Pop the frame and push null (function body produced no value).
    Return,

    /// Build a closure. Operands: 2-byte constant index of the compiled
    /// function, 1-byte count of free variables to capture off the stack.
    Closure,
}

/// Static operand layout of one opcode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Definition {
    pub name: &'static str,
    pub operand_widths: &'static [usize],
}

impl Opcode {
    pub fn definition(self) -> Definition {
        match self {
            Opcode::Constant => Definition {
                name: "CONSTANT",
                operand_widths: &[2],
            },
            Opcode::Add => Definition {
                name: "ADD",
                operand_widths: &[],
            },
            Opcode::Sub => Definition {
                name: "SUB",
                operand_widths: &[],
            },
            Opcode::Mul => Definition {
                name: "MUL",
                operand_widths: &[],
            },
            Opcode::Div => Definition {
                name: "DIV",
                operand_widths: &[],
            },
            Opcode::Pop => Definition {
                name: "POP",
                operand_widths: &[],
            },
            Opcode::True => Definition {
                name: "TRUE",
                operand_widths: &[],
            },
            Opcode::False => Definition {
                name: "FALSE",
                operand_widths: &[],
            },
            Opcode::Null => Definition {
                name: "NULL",
                operand_widths: &[],
            },
            Opcode::Equal => Definition {
                name: "EQ",
                operand_widths: &[],
            },
            Opcode::NotEqual => Definition {
                name: "NE",
                operand_widths: &[],
            },
            Opcode::GreaterThan => Definition {
                name: "GT",
                operand_widths: &[],
            },
            Opcode::Minus => Definition {
                name: "MINUS",
                operand_widths: &[],
            },
            Opcode::Bang => Definition {
                name: "BANG",
                operand_widths: &[],
            },
            Opcode::Jump => Definition {
                name: "JUMP",
                operand_widths: &[2],
            },
            Opcode::JumpNotTruthy => Definition {
                name: "JUMP_NOT_TRUTHY",
                operand_widths: &[2],
            },
            Opcode::GetGlobal => Definition {
                name: "GET_GLOBAL",
                operand_widths: &[2],
            },
            Opcode::SetGlobal => Definition {
                name: "SET_GLOBAL",
                operand_widths: &[2],
            },
            Opcode::GetLocal => Definition {
                name: "GET_LOCAL",
                operand_widths: &[1],
            },
            Opcode::SetLocal => Definition {
                name: "SET_LOCAL",
                operand_widths: &[1],
            },
            Opcode::GetFree => Definition {
                name: "GET_FREE",
                operand_widths: &[1],
            },
            Opcode::Array => Definition {
                name: "ARRAY",
                operand_widths: &[2],
            },
            Opcode::Hash => Definition {
                name: "HASH",
                operand_widths: &[2],
            },
            Opcode::Index => Definition {
                name: "INDEX",
                operand_widths: &[],
            },
            Opcode::Call => Definition {
                name: "CALL",
                operand_widths: &[1],
            },
            Opcode::ReturnValue => Definition {
                name: "RETURN_VALUE",
                operand_widths: &[],
            },
            Opcode::Return => Definition {
                name: "RETURN",
                operand_widths: &[],
            },
            Opcode::Closure => Definition {
                name: "CLOSURE",
                operand_widths: &[2, 1],
            },
        }
    }

    /// All opcodes, ordered by discriminant.
    pub const ALL: &'static [Opcode] = &[
        Opcode::Constant,
        Opcode::Add,
        Opcode::Sub,
        Opcode::Mul,
        Opcode::Div,
        Opcode::Pop,
        Opcode::True,
        Opcode::False,
        Opcode::Null,
        Opcode::Equal,
        Opcode::NotEqual,
        Opcode::GreaterThan,
        Opcode::Minus,
        Opcode::Bang,
        Opcode::Jump,
        Opcode::JumpNotTruthy,
        Opcode::GetGlobal,
        Opcode::SetGlobal,
        Opcode::GetLocal,
        Opcode::SetLocal,
        Opcode::GetFree,
        Opcode::Array,
        Opcode::Hash,
        Opcode::Index,
        Opcode::Call,
        Opcode::ReturnValue,
        Opcode::Return,
        Opcode::Closure,
    ];
}

impl TryFrom<u8> for Opcode {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, u8> {
        // ALL is ordered by discriminant, so the byte doubles as the index.
        Opcode::ALL.get(byte as usize).copied().ok_or(byte)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_round_trip_all_opcodes() {
        for &op in Opcode::ALL {
            assert_eq!(Opcode::try_from(op as u8), Ok(op));
        }
    }

    #[test]
    fn test_unknown_byte_rejected() {
        let past_end = Opcode::ALL.len() as u8;
        assert_eq!(Opcode::try_from(past_end), Err(past_end));
        assert_eq!(Opcode::try_from(0xff), Err(0xff));
    }

    #[test]
    fn test_definitions() {
        assert_eq!(Opcode::Constant.definition().operand_widths, &[2]);
        assert_eq!(Opcode::Add.definition().operand_widths, &[] as &[usize]);
        assert_eq!(Opcode::GetLocal.definition().operand_widths, &[1]);
        assert_eq!(Opcode::Closure.definition().operand_widths, &[2, 1]);
    }
}
