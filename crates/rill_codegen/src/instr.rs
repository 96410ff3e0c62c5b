//! The instruction encoding.
//!
//! An instruction is an operation over up to three operands, each tagged
//! with its storage kind, plus an operand width. Selection picks the
//! operand kinds, never a per-combination opcode, so the operation set
//! stays small while the executor dispatches on (op, kinds, width).
//!
//! The disassembly mnemonic spells the operand kinds out, `DiviRLR` is a
//! divide into a register with a local left and register right hand. When
//! the destination doubles as the left hand the mnemonic collapses to the
//! two-operand form, `AddiRC r1 5` adds 5 into r1 in place.

use std::fmt;

/// Operand width in bytes. `Word` moves 4 bytes, `Byte` moves one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Width {
    Byte,
    Word,
}

impl Width {
    pub fn bytes(self) -> i32 {
        match self {
            Width::Byte => 1,
            Width::Word => 4,
        }
    }

    fn letter(self) -> char {
        match self {
            Width::Byte => 'b',
            Width::Word => 'i',
        }
    }
}

/// A storage-tagged operand. Addresses are byte offsets relative to the
/// activation record's local or parameter buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operand {
    None,
    Reg(i32),
    Local(i32),
    Param(i32),
    Const(i32),
    Func(u32),
}

impl Operand {
    fn kind_letter(self) -> Option<char> {
        match self {
            Operand::None => None,
            Operand::Reg(_) => Some('R'),
            Operand::Local(_) => Some('L'),
            Operand::Param(_) => Some('P'),
            Operand::Const(_) => Some('C'),
            Operand::Func(_) => Some('F'),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::None => Ok(()),
            Operand::Reg(r) => write!(f, "r{}", r),
            Operand::Local(a) => write!(f, "l{}", a),
            Operand::Param(a) => write!(f, "p{}", a),
            Operand::Const(v) => write!(f, "{}", v),
            Operand::Func(i) => write!(f, "f{}", i),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    Nop,
    /// Allocate the frame: a = local bytes, b = highest register number,
    /// c = return value bytes.
    AllocFrame,
    /// Free the frame buffers before returning.
    FreeFrame,
    BlockStart,
    BlockEnd,
    /// Zero the register in a.
    ResetReg,
    /// Relative jump by a.
    Jump,
    /// Conditional jump: a = condition register, b = distance when true,
    /// c = distance when false. The register is zeroed after the test.
    Branch,
    /// Allocate an argument buffer: a = staging register, b = byte size.
    CallPrep,
    /// Store an argument: a = staging register, b = byte offset, c = source
    /// register, moving `width` bytes.
    StoreArg,
    /// Invoke a = function, return value lands in register b, arguments
    /// come from the staging register c.
    Call,
    /// Store the register in a into the caller's return slot.
    StoreRet,
    Return,
    /// a = b, moving `width` bytes.
    Copy,
    /// Boolean not: a = !b.
    Not,
    Add,
    Sub,
    Mul,
    Div,
    /// a = (b == c), writing a single byte.
    CmpEq,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Instruction {
    pub op: Op,
    pub a: Operand,
    pub b: Operand,
    pub c: Operand,
    pub width: Width,
}

impl Instruction {
    pub fn new(op: Op, a: Operand, b: Operand, c: Operand, width: Width) -> Self {
        Self { op, a, b, c, width }
    }

    pub fn plain(op: Op) -> Self {
        Self::new(op, Operand::None, Operand::None, Operand::None, Width::Word)
    }

    pub fn unary(op: Op, a: Operand) -> Self {
        Self::new(op, a, Operand::None, Operand::None, Width::Word)
    }

    pub fn pair(op: Op, a: Operand, b: Operand) -> Self {
        Self::new(op, a, b, Operand::None, Width::Word)
    }

    pub fn copy(width: Width, a: Operand, b: Operand) -> Self {
        Self::new(Op::Copy, a, b, Operand::None, width)
    }

    pub fn binary(op: Op, width: Width, a: Operand, b: Operand, c: Operand) -> Self {
        Self::new(op, a, b, c, width)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut operands: Vec<Operand> = Vec::with_capacity(3);
        let mut mnemonic = String::new();

        match self.op {
            Op::Nop => mnemonic.push_str("NoOp"),
            Op::AllocFrame => {
                mnemonic.push_str("AllocL");
                operands.extend([self.a, self.b, self.c]);
            }
            Op::FreeFrame => mnemonic.push_str("DAllocL"),
            Op::BlockStart => mnemonic.push_str("BStart"),
            Op::BlockEnd => mnemonic.push_str("BEnd"),
            Op::ResetReg => {
                mnemonic.push_str("ResetR");
                operands.push(self.a);
            }
            Op::Jump => {
                mnemonic.push_str("Jump");
                operands.push(self.a);
            }
            Op::Branch => {
                mnemonic.push_str("JumpbR");
                operands.extend([self.a, self.b, self.c]);
            }
            Op::CallPrep => {
                mnemonic.push_str("CallPrep");
                operands.extend([self.a, self.b]);
            }
            Op::StoreArg => {
                mnemonic.push_str(match self.width {
                    Width::Word => "CopyData4ROR",
                    Width::Byte => "CopyData1ROR",
                });
                operands.extend([self.a, self.b, self.c]);
            }
            Op::Call => {
                mnemonic.push_str("Call");
                operands.push(self.a);
                operands.push(self.b);
                if self.c != Operand::None {
                    operands.push(self.c);
                }
            }
            Op::StoreRet => {
                mnemonic.push_str("CopyiXR");
                operands.push(self.a);
            }
            Op::Return => mnemonic.push_str("Return"),
            Op::Copy => {
                mnemonic.push_str("Copy");
                mnemonic.push(self.width.letter());
                push_kinds(&mut mnemonic, &[self.a, self.b]);
                operands.extend([self.a, self.b]);
            }
            Op::Not => {
                mnemonic.push_str("NotbRR");
                operands.extend([self.a, self.b]);
            }
            Op::Add | Op::Sub | Op::Mul | Op::Div | Op::CmpEq => {
                mnemonic.push_str(match self.op {
                    Op::Add => "Add",
                    Op::Sub => "Sub",
                    Op::Mul => "Mul",
                    Op::Div => "Div",
                    _ => "Cmp",
                });
                mnemonic.push(self.width.letter());
                if self.a == self.b {
                    // in-place form, the destination is the left hand
                    push_kinds(&mut mnemonic, &[self.a, self.c]);
                    operands.extend([self.a, self.c]);
                } else {
                    push_kinds(&mut mnemonic, &[self.a, self.b, self.c]);
                    operands.extend([self.a, self.b, self.c]);
                }
            }
        }

        f.write_str(&mnemonic)?;
        for operand in operands {
            if operand != Operand::None {
                write!(f, " {}", operand)?;
            }
        }
        Ok(())
    }
}

fn push_kinds(mnemonic: &mut String, operands: &[Operand]) {
    for operand in operands {
        if let Some(letter) = operand.kind_letter() {
            mnemonic.push(letter);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_place_add_collapses_the_mnemonic() {
        let i = Instruction::binary(
            Op::Add,
            Width::Word,
            Operand::Reg(1),
            Operand::Reg(1),
            Operand::Const(5),
        );
        assert_eq!(i.to_string(), "AddiRC r1 5");
    }

    #[test]
    fn three_address_divide_spells_every_kind() {
        let i = Instruction::binary(
            Op::Div,
            Width::Word,
            Operand::Reg(2),
            Operand::Local(4),
            Operand::Reg(2),
        );
        assert_eq!(i.to_string(), "DiviRLR r2 l4 r2");
    }

    #[test]
    fn byte_compare_uses_the_bool_prefix() {
        let i = Instruction::binary(
            Op::CmpEq,
            Width::Byte,
            Operand::Reg(0),
            Operand::Param(4),
            Operand::Const(1),
        );
        assert_eq!(i.to_string(), "CmpbRPC r0 p4 1");
    }

    #[test]
    fn local_increment_prints_as_in_place_add() {
        let i = Instruction::binary(
            Op::Add,
            Width::Word,
            Operand::Local(0),
            Operand::Local(0),
            Operand::Const(1),
        );
        assert_eq!(i.to_string(), "AddiLC l0 1");
    }

    #[test]
    fn store_arg_width_picks_the_mnemonic() {
        let word = Instruction::binary(
            Op::StoreArg,
            Width::Word,
            Operand::Reg(1),
            Operand::Const(0),
            Operand::Reg(2),
        );
        assert_eq!(word.to_string(), "CopyData4ROR r1 0 r2");
        let byte = Instruction { width: Width::Byte, ..word };
        assert_eq!(byte.to_string(), "CopyData1ROR r1 0 r2");
    }

    #[test]
    fn call_without_arguments_omits_the_staging_register() {
        let i = Instruction::pair(Op::Call, Operand::Func(1), Operand::Reg(0));
        assert_eq!(i.to_string(), "Call f1 r0");
    }
}
