//! Rill bytecode generation.
//!
//! [`generate`] lowers every complete function of a resolved program into
//! register bytecode. Functions get a frame-allocating prologue whose
//! register watermark is patched in after lowering, expressions run over
//! a value stack with constant folding, and control flow uses relative
//! jump distances patched once the body length is known.
//!
//! Registers come from a lowest-first pool. A register freed with
//! [`Op::ResetReg`] is zeroed at runtime before reuse; branch condition
//! registers skip the reset because the branch zeroes them itself.

pub mod bytecode;
mod expr;
pub mod instr;

pub use bytecode::{Bytecode, FunctionBytecode};
pub use instr::{Instruction, Op, Operand, Width};

use rill_compiler::{builtin, Function, Program, StmtId, StmtKind};
use rill_syntax::Diagnostic;
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::debug;

/// Registers available to one function body.
const REGISTER_COUNT: i32 = 256;

/// Byte size of the return slot every frame reserves.
const RETURN_SLOT_BYTES: i32 = 4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GenError {
    #[error("expression too complex, register pool exhausted")]
    RegistersExhausted,
    #[error("internal generator error: {0}")]
    Internal(&'static str),
}

/// Output of a successful generation run. Diagnostics carry recoverable
/// findings such as a static division by zero; the bytecode is complete
/// and executable either way.
pub struct Generated {
    pub bytecode: Bytecode,
    pub diagnostics: Vec<Diagnostic>,
}

/// Lower every complete function of the program.
pub fn generate(program: &Program) -> Result<Generated, GenError> {
    let mut generator = Generator {
        program,
        registers: RegisterPool::new(),
        diagnostics: Vec::new(),
    };
    let mut bytecode = Bytecode::default();
    for function in program.functions().filter(|f| f.complete) {
        let lowered = generator.generate_function(function)?;
        bytecode.insert(function.name.clone(), function.id, lowered);
    }
    Ok(Generated {
        bytecode,
        diagnostics: generator.diagnostics,
    })
}

pub(crate) struct Generator<'a> {
    pub(crate) program: &'a Program,
    pub(crate) registers: RegisterPool,
    pub(crate) diagnostics: Vec<Diagnostic>,
}

impl Generator<'_> {
    fn generate_function(&mut self, function: &Function) -> Result<FunctionBytecode, GenError> {
        self.registers = RegisterPool::new();
        let mut out = Vec::new();
        out.push(Instruction::binary(
            Op::AllocFrame,
            Width::Word,
            Operand::Const(function.stack_size),
            Operand::Const(0),
            Operand::Const(RETURN_SLOT_BYTES),
        ));

        let body = self.program.block(function.body);
        for &stmt in &body.stmts {
            self.generate_statement(&mut out, stmt)?;
        }

        // a body without a trailing return still frees its frame
        if !matches!(out.last(), Some(i) if i.op == Op::Return) {
            out.push(Instruction::plain(Op::FreeFrame));
            out.push(Instruction::plain(Op::Return));
        }

        out[0].b = Operand::Const(self.registers.max_used);
        debug!(
            function = %function.name,
            instructions = out.len(),
            registers = self.registers.max_used + 1,
            "lowered function"
        );
        Ok(FunctionBytecode {
            instructions: out.into_boxed_slice(),
        })
    }

    fn generate_statement(
        &mut self,
        out: &mut Vec<Instruction>,
        sid: StmtId,
    ) -> Result<(), GenError> {
        let kind = self.program.stmt(sid).kind.clone();
        match kind {
            StmtKind::VarDecl { .. } => {}
            StmtKind::Assign { target, value } => {
                let reg = self.generate_expression(out, value)?;
                let dst = self.storage_operand(target)?;
                let width = match self.program.expr(value).result_type {
                    builtin::BOOL => Width::Byte,
                    builtin::INT => Width::Word,
                    _ => return Err(GenError::Internal("assignment of an unsized value")),
                };
                out.push(Instruction::copy(width, dst, Operand::Reg(reg)));
                self.free_register(out, reg);
            }
            StmtKind::Increment { target } => {
                let dst = self.storage_operand(target)?;
                out.push(Instruction::binary(Op::Add, Width::Word, dst, dst, Operand::Const(1)));
            }
            StmtKind::Decrement { target } => {
                let dst = self.storage_operand(target)?;
                out.push(Instruction::binary(Op::Add, Width::Word, dst, dst, Operand::Const(-1)));
            }
            StmtKind::Invoke { value } => {
                let reg = self.generate_expression(out, value)?;
                self.free_register(out, reg);
            }
            StmtKind::Return { value } => {
                if let Some(value) = value {
                    let reg = self.generate_expression(out, value)?;
                    out.push(Instruction::unary(Op::StoreRet, Operand::Reg(reg)));
                    self.free_register(out, reg);
                }
                out.push(Instruction::plain(Op::FreeFrame));
                out.push(Instruction::plain(Op::Return));
            }
            StmtKind::If { cond, body } => {
                let reg = self.generate_expression(out, cond)?;
                let branch = out.len();
                out.push(Instruction::binary(
                    Op::Branch,
                    Width::Byte,
                    Operand::Reg(reg),
                    Operand::Const(0),
                    Operand::Const(0),
                ));
                // the branch zeroes the register at runtime, no reset needed
                self.registers.release(reg);
                self.generate_statement(out, body)?;
                out[branch].c = Operand::Const((out.len() - branch - 1) as i32);
            }
            StmtKind::While { cond, body } => {
                let cond_position = out.len();
                let reg = self.generate_expression(out, cond)?;
                let branch = out.len();
                out.push(Instruction::binary(
                    Op::Branch,
                    Width::Byte,
                    Operand::Reg(reg),
                    Operand::Const(0),
                    Operand::Const(0),
                ));
                self.registers.release(reg);
                self.generate_statement(out, body)?;
                let distance = cond_position as i32 - out.len() as i32 - 1;
                out.push(Instruction::unary(Op::Jump, Operand::Const(distance)));
                out[branch].c = Operand::Const((out.len() - branch - 1) as i32);
            }
            StmtKind::Block { block } => {
                out.push(Instruction::plain(Op::BlockStart));
                let stmts = self.program.block(block).stmts.clone();
                for stmt in stmts {
                    self.generate_statement(out, stmt)?;
                }
            }
            StmtKind::BlockEnd => out.push(Instruction::plain(Op::BlockEnd)),
        }
        Ok(())
    }

    /// Emit a reset and hand the register back to the pool.
    pub(crate) fn free_register(&mut self, out: &mut Vec<Instruction>, register: i32) {
        out.push(Instruction::unary(Op::ResetReg, Operand::Reg(register)));
        self.registers.release(register);
    }
}

/// Lowest-first free list over the register file, tracking the highest
/// register a function ever touched for its frame prologue.
pub(crate) struct RegisterPool {
    free: BTreeSet<i32>,
    max_used: i32,
}

impl RegisterPool {
    fn new() -> Self {
        Self {
            free: (0..REGISTER_COUNT).collect(),
            max_used: 0,
        }
    }

    pub(crate) fn take(&mut self) -> Result<i32, GenError> {
        let Some(&register) = self.free.iter().next() else {
            return Err(GenError::RegistersExhausted);
        };
        self.free.remove(&register);
        if register > self.max_used {
            self.max_used = register;
        }
        Ok(register)
    }

    pub(crate) fn release(&mut self, register: i32) {
        debug_assert!(!self.free.contains(&register));
        self.free.insert(register);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rill_compiler::resolve;
    use rill_syntax::{NodeKind, SyntaxTree, TreeBuilder};

    fn lower(tree: &SyntaxTree) -> Generated {
        let resolved = resolve(tree).unwrap();
        generate(&resolved.program).unwrap()
    }

    #[test]
    fn constant_expressions_fold_to_one_copy() {
        let mut b = TreeBuilder::new();
        let two = b.const_int(2);
        let three = b.const_int(3);
        let four = b.const_int(4);
        let mul = b.op(NodeKind::Multiply);
        let plus = b.op(NodeKind::Plus);
        let e = b.expr(vec![two, three, four, mul, plus]);
        let r = b.ret(Some(e));
        let body = b.block(vec![r]);
        let f = b.function("main", &[], body);
        let tree = b.finish(vec![f]);

        let generated = lower(&tree);
        assert!(generated.diagnostics.is_empty());
        let main = generated.bytecode.function_by_name("main").unwrap();
        // prologue, copy, store, reset, free, return
        assert_eq!(main.instructions.len(), 6);
        assert_eq!(main.instructions[1].to_string(), "CopyiRC r0 14");
        assert_eq!(main.instructions[2].op, Op::StoreRet);
    }

    #[test]
    fn static_division_by_zero_reports_and_still_generates() {
        let mut b = TreeBuilder::new();
        let one = b.const_int(1);
        let zero = b.const_int(0);
        let div = b.op(NodeKind::Divide);
        let e = b.expr(vec![one, zero, div]);
        let r = b.ret(Some(e));
        let body = b.block(vec![r]);
        let f = b.function("main", &[], body);
        let tree = b.finish(vec![f]);

        let generated = lower(&tree);
        assert!(generated
            .diagnostics
            .iter()
            .any(|d| d.message.contains("division by zero")));
        let main = generated.bytecode.function_by_name("main").unwrap();
        assert_eq!(main.instructions[1].to_string(), "CopyiRC r0 0");
    }

    #[test]
    fn while_loop_patches_both_distances() {
        let mut b = TreeBuilder::new();
        let decl = b.var_decl("x", "int");
        let x = b.designator(&["x"]);
        let one = b.const_int(1);
        let eq = b.op(NodeKind::Equals);
        let cond = b.expr(vec![x, one, eq]);
        let x2 = b.designator(&["x"]);
        let inc = b.node(NodeKind::Increment, vec![x2]);
        let w = b.node(NodeKind::While, vec![cond, inc]);
        let r = b.ret(None);
        let body = b.block(vec![decl, w, r]);
        let f = b.function("main", &[], body);
        let tree = b.finish(vec![f]);

        let generated = lower(&tree);
        let main = generated.bytecode.function_by_name("main").unwrap();
        // 0 AllocL, 1 CmpiRLC, 2 CopybRR, 3 ResetR, 4 JumpbR, 5 AddiLC, 6 Jump
        assert_eq!(main.instructions[1].to_string(), "CmpiRLC r0 l0 1");
        assert_eq!(main.instructions[4].op, Op::Branch);
        assert_eq!(main.instructions[4].b, Operand::Const(0));
        assert_eq!(main.instructions[4].c, Operand::Const(2));
        assert_eq!(main.instructions[5].to_string(), "AddiLC l0 1");
        assert_eq!(main.instructions[6].to_string(), "Jump -6");
        // prologue carries the register watermark
        assert_eq!(main.instructions[0].b, Operand::Const(1));
    }

    #[test]
    fn if_over_a_block_jumps_past_the_body() {
        let mut b = TreeBuilder::new();
        let decl = b.var_decl("flag", "bool");
        let flag = b.designator(&["flag"]);
        let cond = b.expr(vec![flag]);
        let one = b.const_int(1);
        let e1 = b.expr(vec![one]);
        let r1 = b.ret(Some(e1));
        let then = b.block(vec![r1]);
        let ifs = b.node(NodeKind::If, vec![cond, then]);
        let two = b.const_int(2);
        let e2 = b.expr(vec![two]);
        let r2 = b.ret(Some(e2));
        let body = b.block(vec![decl, ifs, r2]);
        let f = b.function("main", &[], body);
        let tree = b.finish(vec![f]);

        let generated = lower(&tree);
        let main = generated.bytecode.function_by_name("main").unwrap();
        let branch = main
            .instructions
            .iter()
            .position(|i| i.op == Op::Branch)
            .unwrap();
        assert_eq!(branch, 2);
        assert_eq!(main.instructions[1].to_string(), "CopybRL r0 l0");
        // BStart, CopyiRC, CopyiXR, ResetR, DAllocL, Return, BEnd
        assert_eq!(main.instructions[branch].c, Operand::Const(7));
        assert_eq!(main.instructions[branch + 7].op, Op::BlockEnd);
        assert_eq!(main.instructions[branch + 8].to_string(), "CopyiRC r0 2");
    }

    #[test]
    fn calls_stage_arguments_in_declaration_order() {
        let mut b = TreeBuilder::new();
        let x = b.designator(&["x"]);
        let y = b.designator(&["y"]);
        let plus = b.op(NodeKind::Plus);
        let sum = b.expr(vec![x, y, plus]);
        let ra = b.ret(Some(sum));
        let abody = b.block(vec![ra]);
        let add = b.function("add", &[("x", "int"), ("y", "int")], abody);

        let three = b.const_int(3);
        let a1 = b.expr(vec![three]);
        let four = b.const_int(4);
        let a2 = b.expr(vec![four]);
        let call = b.call("add", vec![a1, a2]);
        let e = b.expr(vec![call]);
        let r = b.ret(Some(e));
        let mbody = b.block(vec![r]);
        let main = b.function("main", &[], mbody);
        let tree = b.finish(vec![add, main]);

        let generated = lower(&tree);
        let listing = generated.bytecode.disassemble(false);
        assert!(listing.contains("CallPrep r1 8"));
        assert!(listing.contains("CopyData4ROR r1 0 r2"));
        assert!(listing.contains("CopyData4ROR r1 4 r3"));
        assert!(listing.contains("Call f0 r0 r1"));
        // the argument registers r2 and r3 stay live until the frame ends
        let main_code = generated.bytecode.function_by_name("main").unwrap();
        let reset: Vec<Operand> = main_code
            .instructions
            .iter()
            .filter(|i| i.op == Op::ResetReg)
            .map(|i| i.a)
            .collect();
        assert_eq!(reset, vec![Operand::Reg(1), Operand::Reg(0), Operand::Reg(1)]);
    }

    #[test]
    fn zero_argument_calls_skip_the_staging_buffer() {
        let mut b = TreeBuilder::new();
        let seven = b.const_int(7);
        let e = b.expr(vec![seven]);
        let r = b.ret(Some(e));
        let hbody = b.block(vec![r]);
        let helper = b.function("helper", &[], hbody);

        let call = b.call("helper", vec![]);
        let e = b.expr(vec![call]);
        let r = b.ret(Some(e));
        let mbody = b.block(vec![r]);
        let main = b.function("main", &[], mbody);
        let tree = b.finish(vec![helper, main]);

        let generated = lower(&tree);
        let main_code = generated.bytecode.function_by_name("main").unwrap();
        assert!(main_code
            .instructions
            .iter()
            .all(|i| i.op != Op::CallPrep && i.op != Op::StoreArg));
        assert!(main_code
            .instructions
            .iter()
            .any(|i| i.op == Op::Call && i.a == Operand::Func(0)));
    }

    #[test]
    fn disassembly_indents_nested_blocks() {
        let mut b = TreeBuilder::new();
        let decl = b.var_decl("x", "int");
        let inner = b.block(vec![decl]);
        let r = b.ret(None);
        let body = b.block(vec![inner, r]);
        let f = b.function("main", &[], body);
        let tree = b.finish(vec![f]);

        let generated = lower(&tree);
        let listing = generated.bytecode.disassemble(true);
        assert!(listing.contains("main:"));
        assert!(listing.contains("BStart"));
        assert!(listing.contains("BEnd"));
        assert!(listing.contains("0   AllocL"));
    }
}
