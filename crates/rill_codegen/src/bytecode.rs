//! The generated program: one instruction sequence per function, reachable
//! by function id or by name.

use indexmap::IndexMap;
use rill_compiler::FuncId;
use std::fmt::Write;

use crate::instr::{Instruction, Op};

pub struct FunctionBytecode {
    pub instructions: Box<[Instruction]>,
}

/// Function lookup is by id during execution (calls carry ids) and by
/// name at the entry point. Names iterate in registration order so the
/// disassembly is stable.
#[derive(Default)]
pub struct Bytecode {
    names: IndexMap<String, FuncId>,
    functions: Vec<Option<FunctionBytecode>>,
}

impl Bytecode {
    pub(crate) fn insert(&mut self, name: String, id: FuncId, function: FunctionBytecode) {
        let index = id.0 as usize;
        if self.functions.len() <= index {
            self.functions.resize_with(index + 1, || None);
        }
        self.functions[index] = Some(function);
        self.names.insert(name, id);
    }

    pub fn function(&self, id: FuncId) -> Option<&FunctionBytecode> {
        self.functions.get(id.0 as usize)?.as_ref()
    }

    pub fn function_by_name(&self, name: &str) -> Option<&FunctionBytecode> {
        self.function(*self.names.get(name)?)
    }

    pub fn id_by_name(&self, name: &str) -> Option<FuncId> {
        self.names.get(name).copied()
    }

    pub fn names(&self) -> impl Iterator<Item = (&str, FuncId)> {
        self.names.iter().map(|(n, &id)| (n.as_str(), id))
    }

    /// Human-readable listing, blocks indented, one function after the
    /// other in registration order.
    pub fn disassemble(&self, line_numbers: bool) -> String {
        let mut text = String::new();
        for (name, id) in self.names.iter() {
            let Some(function) = self.function(*id) else {
                continue;
            };
            let _ = writeln!(text, "\n{}:", name);
            let mut depth: usize = 0;
            for (i, instruction) in function.instructions.iter().enumerate() {
                if line_numbers {
                    let _ = write!(text, "{:<4}", i);
                }
                for _ in 0..depth {
                    text.push_str("  ");
                }
                match instruction.op {
                    Op::BlockStart => {
                        let _ = writeln!(text, "  {}", instruction);
                        depth += 1;
                    }
                    Op::BlockEnd => {
                        let _ = writeln!(text, "{}", instruction);
                        depth = depth.saturating_sub(1);
                    }
                    _ => {
                        let _ = writeln!(text, "{}", instruction);
                    }
                }
            }
        }
        text
    }
}
