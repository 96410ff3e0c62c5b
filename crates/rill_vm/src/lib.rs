//! The Rill bytecode executor.
//!
//! Each function invocation runs in its own activation record: a zeroed
//! locals buffer, an `i32` register file sized by the frame prologue, the
//! parameter bytes the caller staged, and a return slot. Calls execute
//! synchronously in a fresh child context and the callee's return bytes
//! land in the caller's chosen register.
//!
//! Arithmetic wraps. Division by zero writes zero and continues; the
//! generator already reported the statically visible cases.

pub mod buffer;

pub use buffer::ByteBuf;

use rill_codegen::{Bytecode, Op, Operand, Width};
use rill_compiler::FuncId;
use thiserror::Error;
use tracing::trace;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExecError {
    #[error("no function named '{0}'")]
    UnknownFunction(String),
    #[error("call to unknown function id {0}")]
    UnknownFunctionId(u32),
    #[error("memory access out of bounds")]
    OutOfBounds,
    #[error("malformed instruction operand: {0}")]
    BadOperand(&'static str),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    NotPrepared,
    Executing,
    Returned,
}

/// Run the named function with raw parameter bytes, laid out the way the
/// resolver laid out the function's parameter list. The result is the
/// function's raw return bytes.
pub fn execute(bytecode: &Bytecode, name: &str, params: &[u8]) -> Result<Vec<u8>, ExecError> {
    let id = bytecode
        .id_by_name(name)
        .ok_or_else(|| ExecError::UnknownFunction(name.to_string()))?;
    ExecutionContext::new(bytecode).run(id, ByteBuf::from_slice(params))
}

/// One activation. Nested calls get a context of their own.
pub struct ExecutionContext<'a> {
    bytecode: &'a Bytecode,
    status: Status,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(bytecode: &'a Bytecode) -> Self {
        Self {
            bytecode,
            status: Status::NotPrepared,
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn run(&mut self, id: FuncId, params: ByteBuf) -> Result<Vec<u8>, ExecError> {
        let function = self
            .bytecode
            .function(id)
            .ok_or(ExecError::UnknownFunctionId(id.0))?;
        self.status = Status::Executing;
        trace!(function = id.0, "executing");

        let mut frame = Frame {
            locals: ByteBuf::default(),
            params,
            registers: Vec::new(),
            staging: Vec::new(),
            ret: ByteBuf::zeroed(4),
        };

        let instructions = &function.instructions;
        let mut ip: i64 = 0;
        while (ip as usize) < instructions.len() {
            let instruction = instructions[ip as usize];
            match instruction.op {
                Op::Nop | Op::BlockStart | Op::BlockEnd => {}
                Op::AllocFrame => {
                    let locals = const_value(instruction.a)?;
                    let top_register = const_value(instruction.b)?;
                    let ret = const_value(instruction.c)?;
                    frame.locals = ByteBuf::zeroed(locals);
                    frame.registers = vec![0; top_register.max(0) as usize + 1];
                    frame.staging = (0..frame.registers.len()).map(|_| None).collect();
                    frame.ret = ByteBuf::zeroed(ret);
                }
                Op::FreeFrame => {
                    frame.locals = ByteBuf::default();
                    frame.registers.clear();
                    frame.staging.clear();
                }
                Op::ResetReg => {
                    let r = frame.reg(instruction.a)?;
                    frame.registers[r] = 0;
                    frame.staging[r] = None;
                }
                Op::Jump => {
                    ip += const_value(instruction.a)? as i64;
                }
                Op::Branch => {
                    let r = frame.reg(instruction.a)?;
                    let distance = if frame.registers[r] as u8 == 1 {
                        const_value(instruction.b)?
                    } else {
                        const_value(instruction.c)?
                    };
                    frame.registers[r] = 0;
                    ip += distance as i64;
                }
                Op::CallPrep => {
                    let r = frame.reg(instruction.a)?;
                    let size = const_value(instruction.b)?;
                    frame.staging[r] = Some(ByteBuf::zeroed(size));
                }
                Op::StoreArg => {
                    let source = frame.reg(instruction.c)?;
                    let value = frame.registers[source];
                    let offset = const_value(instruction.b)?;
                    let r = frame.reg(instruction.a)?;
                    let Some(buffer) = frame.staging[r].as_mut() else {
                        return Err(ExecError::BadOperand("argument store without CallPrep"));
                    };
                    match instruction.width {
                        Width::Word => buffer.write_i32(offset, value)?,
                        Width::Byte => buffer.write_u8(offset, value as u8)?,
                    }
                }
                Op::Call => {
                    let Operand::Func(callee) = instruction.a else {
                        return Err(ExecError::BadOperand("call target"));
                    };
                    let args = match instruction.c {
                        Operand::Reg(_) => {
                            let r = frame.reg(instruction.c)?;
                            frame.staging[r]
                                .take()
                                .ok_or(ExecError::BadOperand("call without staged arguments"))?
                        }
                        Operand::None => ByteBuf::default(),
                        _ => return Err(ExecError::BadOperand("call argument source")),
                    };
                    let returned =
                        ExecutionContext::new(self.bytecode).run(FuncId(callee), args)?;
                    let value = i32::from_le_bytes(
                        returned
                            .get(0..4)
                            .ok_or(ExecError::OutOfBounds)?
                            .try_into()
                            .map_err(|_| ExecError::OutOfBounds)?,
                    );
                    let dst = frame.reg(instruction.b)?;
                    frame.registers[dst] = value;
                }
                Op::StoreRet => {
                    let r = frame.reg(instruction.a)?;
                    let value = frame.registers[r];
                    frame.ret.write_i32(0, value)?;
                }
                Op::Return => {
                    self.status = Status::Returned;
                    return Ok(frame.ret.into_vec());
                }
                Op::Copy => match instruction.width {
                    Width::Word => {
                        let value = frame.load_word(instruction.b)?;
                        frame.store_word(instruction.a, value)?;
                    }
                    Width::Byte => {
                        let value = frame.load_byte(instruction.b)?;
                        frame.store_byte(instruction.a, value)?;
                    }
                },
                Op::Not => {
                    let value = frame.load_byte(instruction.b)?;
                    frame.store_byte(instruction.a, (value == 0) as u8)?;
                }
                Op::Add | Op::Sub | Op::Mul | Op::Div => {
                    let left = frame.load_word(instruction.b)?;
                    let right = frame.load_word(instruction.c)?;
                    let value = match instruction.op {
                        Op::Add => left.wrapping_add(right),
                        Op::Sub => left.wrapping_sub(right),
                        Op::Mul => left.wrapping_mul(right),
                        _ if right == 0 => 0,
                        _ => left.wrapping_div(right),
                    };
                    frame.store_word(instruction.a, value)?;
                }
                Op::CmpEq => {
                    let equal = match instruction.width {
                        Width::Word => {
                            frame.load_word(instruction.b)? == frame.load_word(instruction.c)?
                        }
                        Width::Byte => {
                            frame.load_byte(instruction.b)? == frame.load_byte(instruction.c)?
                        }
                    };
                    frame.store_byte(instruction.a, equal as u8)?;
                }
            }
            ip += 1;
        }

        self.status = Status::Returned;
        Ok(frame.ret.into_vec())
    }
}

struct Frame {
    locals: ByteBuf,
    params: ByteBuf,
    registers: Vec<i32>,
    /// Argument buffers being assembled, one slot per register.
    staging: Vec<Option<ByteBuf>>,
    ret: ByteBuf,
}

impl Frame {
    fn reg(&self, operand: Operand) -> Result<usize, ExecError> {
        let Operand::Reg(r) = operand else {
            return Err(ExecError::BadOperand("expected a register"));
        };
        if r < 0 || r as usize >= self.registers.len() {
            return Err(ExecError::BadOperand("register out of range"));
        }
        Ok(r as usize)
    }

    fn load_word(&self, operand: Operand) -> Result<i32, ExecError> {
        match operand {
            Operand::Reg(_) => Ok(self.registers[self.reg(operand)?]),
            Operand::Local(offset) => self.locals.read_i32(offset),
            Operand::Param(offset) => self.params.read_i32(offset),
            Operand::Const(value) => Ok(value),
            _ => Err(ExecError::BadOperand("unreadable operand")),
        }
    }

    fn load_byte(&self, operand: Operand) -> Result<u8, ExecError> {
        match operand {
            Operand::Reg(_) => Ok(self.registers[self.reg(operand)?] as u8),
            Operand::Local(offset) => self.locals.read_u8(offset),
            Operand::Param(offset) => self.params.read_u8(offset),
            Operand::Const(value) => Ok(value as u8),
            _ => Err(ExecError::BadOperand("unreadable operand")),
        }
    }

    fn store_word(&mut self, operand: Operand, value: i32) -> Result<(), ExecError> {
        match operand {
            Operand::Reg(_) => {
                let r = self.reg(operand)?;
                self.registers[r] = value;
                Ok(())
            }
            Operand::Local(offset) => self.locals.write_i32(offset, value),
            Operand::Param(offset) => self.params.write_i32(offset, value),
            _ => Err(ExecError::BadOperand("unwritable operand")),
        }
    }

    /// Byte stores into a register replace the whole register so stale
    /// upper bytes never leak into later word reads.
    fn store_byte(&mut self, operand: Operand, value: u8) -> Result<(), ExecError> {
        match operand {
            Operand::Reg(_) => {
                let r = self.reg(operand)?;
                self.registers[r] = value as i32;
                Ok(())
            }
            Operand::Local(offset) => self.locals.write_u8(offset, value),
            Operand::Param(offset) => self.params.write_u8(offset, value),
            _ => Err(ExecError::BadOperand("unwritable operand")),
        }
    }
}

fn const_value(operand: Operand) -> Result<i32, ExecError> {
    match operand {
        Operand::Const(value) => Ok(value),
        _ => Err(ExecError::BadOperand("expected a constant")),
    }
}
