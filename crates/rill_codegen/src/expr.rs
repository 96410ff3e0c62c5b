//! Expression lowering.
//!
//! A resolved expression is already a postfix value sequence, so lowering
//! runs it over a small value stack. Constant pairs fold at this stage;
//! everything else selects an instruction from the storage kinds of the
//! two hands. Destination choice follows one rule: reuse the left hand's
//! register, else the right hand's, else take a fresh one. The caller of
//! [`Generator::generate_expression`] always receives the result in a
//! register of its own.

use rill_compiler::{builtin, DesigId, ExprId, ExprValue, StorageKind};
use rill_syntax::{Diagnostic, TokenSpan};

use crate::instr::{Instruction, Op, Operand, Width};
use crate::{GenError, Generator};

/// One slot of the lowering stack.
#[derive(Clone, Copy, Debug)]
enum Value {
    ConstInt(i32),
    ConstBool(bool),
    Desig(DesigId),
    RegInt(i32),
    RegBool(i32),
}

impl Value {
    fn reg(self) -> Option<i32> {
        match self {
            Value::RegInt(r) | Value::RegBool(r) => Some(r),
            _ => None,
        }
    }
}

impl Generator<'_> {
    /// Lower an expression, returning the register holding its value.
    pub(crate) fn generate_expression(
        &mut self,
        out: &mut Vec<Instruction>,
        eid: ExprId,
    ) -> Result<i32, GenError> {
        let expr = self.program.expr(eid);
        let span = expr.span;
        let values = expr.values.clone();

        let mut stack: Vec<Value> = Vec::new();
        for value in values {
            match value {
                ExprValue::ConstInt(v) => stack.push(Value::ConstInt(v)),
                ExprValue::ConstBool(b) => stack.push(Value::ConstBool(b)),
                ExprValue::Designator(d) => {
                    if self.program.designator(d).kind == StorageKind::Call {
                        let reg = self.generate_call(out, d)?;
                        if self.program.designator(d).type_id == builtin::BOOL {
                            stack.push(Value::RegBool(reg));
                        } else {
                            stack.push(Value::RegInt(reg));
                        }
                    } else {
                        stack.push(Value::Desig(d));
                    }
                }
                ExprValue::Add => self.arith(out, &mut stack, Op::Add, span)?,
                ExprValue::Sub => self.arith(out, &mut stack, Op::Sub, span)?,
                ExprValue::Mul => self.arith(out, &mut stack, Op::Mul, span)?,
                ExprValue::Div => self.arith(out, &mut stack, Op::Div, span)?,
                ExprValue::Eq => self.compare(out, &mut stack)?,
                ExprValue::Ne => {
                    self.compare(out, &mut stack)?;
                    self.negate_bool(out, &mut stack)?;
                }
                ExprValue::Neg => self.negate(out, &mut stack)?,
            }
        }

        let result = self.registers.take()?;
        let Some(value) = stack.pop() else {
            return Err(GenError::Internal("empty expression"));
        };
        if !stack.is_empty() {
            return Err(GenError::Internal("unconsumed expression values"));
        }

        match value {
            Value::ConstInt(v) => {
                out.push(Instruction::copy(Width::Word, Operand::Reg(result), Operand::Const(v)));
            }
            Value::ConstBool(b) => {
                out.push(Instruction::copy(
                    Width::Byte,
                    Operand::Reg(result),
                    Operand::Const(b as i32),
                ));
            }
            Value::Desig(d) => {
                let width = self.value_width(d)?;
                let source = self.storage_operand(d)?;
                out.push(Instruction::copy(width, Operand::Reg(result), source));
            }
            Value::RegInt(r) => {
                out.push(Instruction::copy(Width::Word, Operand::Reg(result), Operand::Reg(r)));
                self.free_register(out, r);
            }
            Value::RegBool(r) => {
                out.push(Instruction::copy(Width::Byte, Operand::Reg(result), Operand::Reg(r)));
                self.free_register(out, r);
            }
        }
        Ok(result)
    }

    fn arith(
        &mut self,
        out: &mut Vec<Instruction>,
        stack: &mut Vec<Value>,
        op: Op,
        span: TokenSpan,
    ) -> Result<(), GenError> {
        let (left, right) = pop_pair(stack)?;

        if op == Op::Div {
            if let Value::ConstInt(0) = right {
                self.diagnostics
                    .push(Diagnostic::error("division by zero", Some(span)));
            }
        }

        if let (Value::ConstInt(l), Value::ConstInt(r)) = (left, right) {
            let folded = match op {
                Op::Add => l.wrapping_add(r),
                Op::Sub => l.wrapping_sub(r),
                Op::Mul => l.wrapping_mul(r),
                Op::Div if r == 0 => 0,
                Op::Div => l.wrapping_div(r),
                _ => return Err(GenError::Internal("non-arithmetic fold")),
            };
            stack.push(Value::ConstInt(folded));
            return Ok(());
        }

        if let Some(l) = left.reg() {
            let rhs = self.value_operand(&right)?;
            out.push(Instruction::binary(
                op,
                Width::Word,
                Operand::Reg(l),
                Operand::Reg(l),
                rhs,
            ));
            if let Some(r) = right.reg() {
                self.free_register(out, r);
            }
            stack.push(Value::RegInt(l));
        } else if let Some(r) = right.reg() {
            let lhs = self.value_operand(&left)?;
            let instruction = match op {
                // commutative, the right register doubles as the left hand
                Op::Add | Op::Mul => Instruction::binary(
                    op,
                    Width::Word,
                    Operand::Reg(r),
                    Operand::Reg(r),
                    lhs,
                ),
                _ => Instruction::binary(op, Width::Word, Operand::Reg(r), lhs, Operand::Reg(r)),
            };
            out.push(instruction);
            stack.push(Value::RegInt(r));
        } else {
            let dst = self.registers.take()?;
            let lhs = self.value_operand(&left)?;
            let rhs = self.value_operand(&right)?;
            out.push(Instruction::binary(op, Width::Word, Operand::Reg(dst), lhs, rhs));
            stack.push(Value::RegInt(dst));
        }
        Ok(())
    }

    fn compare(
        &mut self,
        out: &mut Vec<Instruction>,
        stack: &mut Vec<Value>,
    ) -> Result<(), GenError> {
        let (left, right) = pop_pair(stack)?;

        match (left, right) {
            (Value::ConstInt(l), Value::ConstInt(r)) => {
                stack.push(Value::ConstBool(l == r));
                return Ok(());
            }
            (Value::ConstBool(l), Value::ConstBool(r)) => {
                stack.push(Value::ConstBool(l == r));
                return Ok(());
            }
            _ => {}
        }

        let width = if self.is_bool(&left) || self.is_bool(&right) {
            Width::Byte
        } else {
            Width::Word
        };

        if let Some(l) = left.reg() {
            if let Some(r) = right.reg() {
                out.push(Instruction::binary(
                    Op::CmpEq,
                    width,
                    Operand::Reg(l),
                    Operand::Reg(l),
                    Operand::Reg(r),
                ));
                self.free_register(out, r);
            } else {
                let rhs = self.value_operand(&right)?;
                out.push(Instruction::binary(
                    Op::CmpEq,
                    width,
                    Operand::Reg(l),
                    rhs,
                    Operand::Reg(l),
                ));
            }
            stack.push(Value::RegBool(l));
        } else if let Some(r) = right.reg() {
            let lhs = self.value_operand(&left)?;
            out.push(Instruction::binary(
                Op::CmpEq,
                width,
                Operand::Reg(r),
                lhs,
                Operand::Reg(r),
            ));
            stack.push(Value::RegBool(r));
        } else {
            let dst = self.registers.take()?;
            let lhs = self.value_operand(&left)?;
            let rhs = self.value_operand(&right)?;
            out.push(Instruction::binary(Op::CmpEq, width, Operand::Reg(dst), lhs, rhs));
            stack.push(Value::RegBool(dst));
        }
        Ok(())
    }

    fn negate_bool(
        &mut self,
        out: &mut Vec<Instruction>,
        stack: &mut Vec<Value>,
    ) -> Result<(), GenError> {
        match stack.pop() {
            Some(Value::ConstBool(b)) => stack.push(Value::ConstBool(!b)),
            Some(Value::RegBool(r)) => {
                out.push(Instruction::pair(Op::Not, Operand::Reg(r), Operand::Reg(r)));
                stack.push(Value::RegBool(r));
            }
            _ => return Err(GenError::Internal("negation of a non-bool comparison")),
        }
        Ok(())
    }

    fn negate(
        &mut self,
        out: &mut Vec<Instruction>,
        stack: &mut Vec<Value>,
    ) -> Result<(), GenError> {
        match stack.pop() {
            Some(Value::ConstInt(v)) => stack.push(Value::ConstInt(v.wrapping_neg())),
            Some(Value::RegInt(r)) => {
                out.push(Instruction::binary(
                    Op::Mul,
                    Width::Word,
                    Operand::Reg(r),
                    Operand::Reg(r),
                    Operand::Const(-1),
                ));
                stack.push(Value::RegInt(r));
            }
            Some(Value::Desig(d)) => {
                let dst = self.registers.take()?;
                let source = self.storage_operand(d)?;
                out.push(Instruction::binary(
                    Op::Mul,
                    Width::Word,
                    Operand::Reg(dst),
                    source,
                    Operand::Const(-1),
                ));
                stack.push(Value::RegInt(dst));
            }
            _ => return Err(GenError::Internal("negation of a non-int value")),
        }
        Ok(())
    }

    /// Lower a call designator, returning the register holding the return
    /// value. Argument result registers stay live until the frame ends.
    pub(crate) fn generate_call(
        &mut self,
        out: &mut Vec<Instruction>,
        d: DesigId,
    ) -> Result<i32, GenError> {
        let desig = self.program.designator(d);
        let Some(callee) = desig.callee else {
            return Err(GenError::Internal("call without a resolved callee"));
        };
        let args = desig.args.clone().unwrap_or_default();

        let return_register = self.registers.take()?;
        if args.is_empty() {
            out.push(Instruction::pair(
                Op::Call,
                Operand::Func(callee.0),
                Operand::Reg(return_register),
            ));
            return Ok(return_register);
        }

        let param_size = self.program.function(callee).param_size;
        let staging = self.registers.take()?;
        out.push(Instruction::pair(
            Op::CallPrep,
            Operand::Reg(staging),
            Operand::Const(param_size),
        ));

        let mut offset = 0;
        for arg in args {
            let reg = self.generate_expression(out, arg)?;
            let result_type = self.program.expr(arg).result_type;
            let width = match result_type {
                builtin::INT => Width::Word,
                builtin::BOOL => Width::Byte,
                _ => return Err(GenError::Internal("unsized argument type")),
            };
            out.push(Instruction::binary(
                Op::StoreArg,
                width,
                Operand::Reg(staging),
                Operand::Const(offset),
                Operand::Reg(reg),
            ));
            offset += self.program.size_of(result_type);
        }

        out.push(Instruction::binary(
            Op::Call,
            Width::Word,
            Operand::Func(callee.0),
            Operand::Reg(return_register),
            Operand::Reg(staging),
        ));
        self.free_register(out, staging);
        Ok(return_register)
    }

    fn is_bool(&self, value: &Value) -> bool {
        match value {
            Value::ConstBool(_) | Value::RegBool(_) => true,
            Value::Desig(d) => self.program.designator(*d).type_id == builtin::BOOL,
            _ => false,
        }
    }

    fn value_operand(&self, value: &Value) -> Result<Operand, GenError> {
        match value {
            Value::ConstInt(v) => Ok(Operand::Const(*v)),
            Value::ConstBool(b) => Ok(Operand::Const(*b as i32)),
            Value::RegInt(r) | Value::RegBool(r) => Ok(Operand::Reg(*r)),
            Value::Desig(d) => self.storage_operand(*d),
        }
    }

    pub(crate) fn storage_operand(&self, d: DesigId) -> Result<Operand, GenError> {
        let desig = self.program.designator(d);
        match desig.kind {
            StorageKind::Local => Ok(Operand::Local(desig.address)),
            StorageKind::Param => Ok(Operand::Param(desig.address)),
            _ => Err(GenError::Internal("designator without storage")),
        }
    }

    pub(crate) fn value_width(&self, d: DesigId) -> Result<Width, GenError> {
        match self.program.designator(d).type_id {
            builtin::INT => Ok(Width::Word),
            builtin::BOOL => Ok(Width::Byte),
            _ => Err(GenError::Internal("unsized value type")),
        }
    }
}

fn pop_pair(stack: &mut Vec<Value>) -> Result<(Value, Value), GenError> {
    let right = stack.pop();
    let left = stack.pop();
    match (left, right) {
        (Some(l), Some(r)) => Ok((l, r)),
        _ => Err(GenError::Internal("expression stack underflow")),
    }
}
