//! Incremental semantic resolution.
//!
//! Construction is a single pass over the syntax tree in source order;
//! everything that can complete immediately does. Entities blocked on a
//! forward reference land on pending worklists, and the fixpoint loop
//! re-attempts them round by round. Completion is monotonic: once an
//! entity is complete its addresses and type ids are final. A round that
//! completes nothing means the remaining references can never resolve;
//! one diagnostic is reported and resolution stops.

mod address;
mod build;
mod typecheck;

use crate::model::{
    builtin, BlockId, DesigId, ExprId, FuncId, Program, StmtId, StmtKind, TypeId,
};
use rill_syntax::{Diagnostic, SyntaxTree, TokenSpan};
use tracing::debug;

/// Output of a successful resolve: the program plus any recoverable
/// diagnostics collected along the way.
pub struct Resolved {
    pub program: Program,
    pub diagnostics: Vec<Diagnostic>,
}

/// Resolve a syntax tree into a program model. `Err` only when a critical
/// diagnostic was raised; recoverable errors ride along in [`Resolved`].
pub fn resolve(tree: &SyntaxTree) -> Result<Resolved, Vec<Diagnostic>> {
    Resolver::new(tree).run()
}

pub(crate) struct Resolver<'a> {
    pub(crate) tree: &'a SyntaxTree,
    pub(crate) program: Program,
    pub(crate) diagnostics: Vec<Diagnostic>,
    pub(crate) fatal: bool,
    pub(crate) pending_types: Vec<TypeId>,
    pub(crate) pending_functions: Vec<FuncId>,
}

impl<'a> Resolver<'a> {
    fn new(tree: &'a SyntaxTree) -> Self {
        Self {
            tree,
            program: Program::new(),
            diagnostics: Vec::new(),
            fatal: false,
            pending_types: Vec::new(),
            pending_functions: Vec::new(),
        }
    }

    fn run(mut self) -> Result<Resolved, Vec<Diagnostic>> {
        let tree = self.tree;
        for &decl in tree.children(tree.root()) {
            match tree.kind(decl) {
                rill_syntax::NodeKind::FunctionDeclaration => self.declare_function(decl),
                rill_syntax::NodeKind::TypeDefinition => self.declare_type(decl),
                _ => self.critical(
                    "only function and type declarations may appear at the top level",
                    Some(tree.node(decl).span()),
                ),
            }
            if self.fatal {
                return Err(self.diagnostics);
            }
        }

        self.fixpoint();

        if self.fatal {
            Err(self.diagnostics)
        } else {
            Ok(Resolved {
                program: self.program,
                diagnostics: self.diagnostics,
            })
        }
    }

    fn fixpoint(&mut self) {
        let mut round = 0u32;
        while !self.pending_types.is_empty() || !self.pending_functions.is_empty() {
            round += 1;
            let mut progress = false;

            let types = std::mem::take(&mut self.pending_types);
            for id in types {
                if !self.try_complete_type(id, &mut progress) {
                    self.pending_types.push(id);
                }
            }

            let functions = std::mem::take(&mut self.pending_functions);
            for id in functions {
                if !self.try_complete_function(id, &mut progress) {
                    self.pending_functions.push(id);
                }
            }

            debug!(
                round,
                progress,
                pending_types = self.pending_types.len(),
                pending_functions = self.pending_functions.len(),
                "resolution round"
            );

            if !progress {
                self.error(
                    "unresolved forward references remain, resolution cannot make progress",
                    None,
                );
                break;
            }
        }
    }

    pub(crate) fn error(&mut self, message: impl Into<String>, span: Option<TokenSpan>) {
        self.diagnostics.push(Diagnostic::error(message, span));
    }

    pub(crate) fn critical(&mut self, message: impl Into<String>, span: Option<TokenSpan>) {
        self.fatal = true;
        self.diagnostics.push(Diagnostic::critical(message, span));
    }

    /// Resolve outstanding field types; when all are known, lay the record
    /// out in declaration order and register the type.
    pub(crate) fn try_complete_type(&mut self, id: TypeId, progress: &mut bool) -> bool {
        let unresolved: Vec<(String, String)> = self
            .program
            .type_ref(id)
            .fields
            .iter()
            .filter(|(_, f)| f.type_id == builtin::UNKNOWN)
            .map(|(n, f)| (n.clone(), f.declared_type.clone()))
            .collect();

        let mut all = true;
        for (field, declared) in unresolved {
            match self.program.sized_type_id(&declared) {
                Some(t) => {
                    if let Some(f) = self.program.type_mut(id).fields.get_mut(&field) {
                        f.type_id = t;
                    }
                    *progress = true;
                }
                None => all = false,
            }
        }
        if !all {
            return false;
        }

        let sizes: Vec<i32> = self
            .program
            .type_ref(id)
            .fields
            .values()
            .map(|f| self.program.size_of(f.type_id))
            .collect();
        let ty = self.program.type_mut(id);
        let mut offset = 0;
        for (field, size) in ty.fields.values_mut().zip(sizes) {
            field.offset = offset;
            offset += size;
        }
        ty.size = offset;
        ty.complete = true;
        let name = ty.name.clone();
        self.program.promote_type(&name, id);
        *progress = true;
        true
    }

    pub(crate) fn try_complete_function(&mut self, id: FuncId, progress: &mut bool) -> bool {
        self.try_complete_params(id, progress);
        let body = self.program.function_ref(id).body;
        self.try_complete_block(body, progress);

        if self.program.function_ref(id).params.complete && self.program.block(body).complete {
            self.finish_function(id);
            *progress = true;
            true
        } else {
            false
        }
    }

    pub(crate) fn finish_function(&mut self, id: FuncId) {
        let f = self.program.function_mut(id);
        if f.return_type == builtin::UNKNOWN {
            f.return_type = builtin::VOID;
        }
        f.complete = true;
        self.program.register_function(id);
    }

    /// Resolve outstanding parameter types; when all are known, lay the
    /// parameter buffer out in declaration order.
    pub(crate) fn try_complete_params(&mut self, id: FuncId, progress: &mut bool) {
        if self.program.function_ref(id).params.complete {
            return;
        }

        let unresolved: Vec<(String, String)> = self
            .program
            .function_ref(id)
            .params
            .params
            .iter()
            .filter(|(_, p)| !p.complete)
            .map(|(n, p)| (n.clone(), p.declared_type.clone()))
            .collect();
        for (param, declared) in unresolved {
            if let Some(t) = self.program.sized_type_id(&declared) {
                if let Some(p) = self.program.function_mut(id).params.params.get_mut(&param) {
                    p.type_id = t;
                    p.complete = true;
                }
                *progress = true;
            }
        }

        let all = self
            .program
            .function_ref(id)
            .params
            .params
            .values()
            .all(|p| p.complete);
        if all {
            let sizes: Vec<i32> = self
                .program
                .function_ref(id)
                .params
                .params
                .values()
                .map(|p| self.program.size_of(p.type_id))
                .collect();
            let f = self.program.function_mut(id);
            let mut offset = 0;
            for (p, size) in f.params.params.values_mut().zip(sizes) {
                p.offset = offset;
                offset += size;
            }
            f.param_size = offset;
            f.params.complete = true;
        }
    }

    pub(crate) fn try_complete_block(&mut self, id: BlockId, progress: &mut bool) -> bool {
        if self.program.block(id).complete {
            return true;
        }

        let decls = std::mem::take(&mut self.program.block_mut(id).pending_decls);
        for sid in decls {
            if !self.try_complete_decl(sid, id, progress) {
                self.program.block_mut(id).pending_decls.push(sid);
            }
        }

        let stmts = std::mem::take(&mut self.program.block_mut(id).pending_stmts);
        for sid in stmts {
            if !self.try_complete_stmt(sid, progress) {
                self.program.block_mut(id).pending_stmts.push(sid);
            }
        }

        let block = self.program.block_mut(id);
        if block.pending_decls.is_empty() && block.pending_stmts.is_empty() {
            block.complete = true;
        }
        self.program.block(id).complete
    }

    /// Complete a local declaration: its offset is the owning function's
    /// running stack size at the moment the type resolves, never reused.
    pub(crate) fn try_complete_decl(
        &mut self,
        sid: StmtId,
        block: BlockId,
        progress: &mut bool,
    ) -> bool {
        let (name, declared) = match &self.program.stmt(sid).kind {
            StmtKind::VarDecl {
                name,
                declared_type,
                ..
            } => (name.clone(), declared_type.clone()),
            _ => return true,
        };

        let Some(t) = self.program.sized_type_id(&declared) else {
            return false;
        };
        let size = self.program.size_of(t);
        let function = self.program.block(block).function;
        let position = self.program.function_ref(function).stack_size;
        self.program.function_mut(function).stack_size = position + size;

        let stmt = self.program.stmt_mut(sid);
        if let StmtKind::VarDecl {
            type_id, offset, ..
        } = &mut stmt.kind
        {
            *type_id = t;
            *offset = position;
        }
        stmt.complete = true;
        self.program.block_mut(block).vars.insert(name, sid);
        *progress = true;
        true
    }

    pub(crate) fn try_complete_stmt(&mut self, sid: StmtId, progress: &mut bool) -> bool {
        if self.program.stmt(sid).complete {
            return true;
        }
        let block = self.program.stmt(sid).block;
        let kind = self.program.stmt(sid).kind.clone();

        let done = match kind {
            StmtKind::Assign { target, value } => {
                let t = self.calc_address(target, block, progress);
                let v = self.try_complete_expression(value, progress);
                t && v
            }
            StmtKind::Increment { target } | StmtKind::Decrement { target } => {
                let done = self.calc_address(target, block, progress);
                // runs exactly once, the statement completes right after
                if done {
                    let t = self.program.designator(target).type_id;
                    if t != builtin::INT && t != builtin::UNKNOWN {
                        let span = self.program.designator(target).span;
                        self.error(
                            "increment and decrement require an int variable",
                            Some(span),
                        );
                    }
                }
                done
            }
            StmtKind::Invoke { value } => self.try_complete_expression(value, progress),
            StmtKind::Return { value: None } => true,
            StmtKind::Return { value: Some(e) } => {
                let done = self.try_complete_expression(e, progress);
                // runs exactly once, the statement completes right after
                if done {
                    let t = self.program.expr(e).result_type;
                    let span = self.program.expr(e).span;
                    let function = self.program.block(block).function;
                    self.set_return_type(function, t, Some(span));
                }
                done
            }
            StmtKind::If { cond, body } | StmtKind::While { cond, body } => {
                let c = self.try_complete_expression(cond, progress);
                let b = self.try_complete_stmt(body, progress);
                if c && b {
                    let result = self.program.expr(cond).result_type;
                    if result != builtin::BOOL && result != builtin::UNKNOWN {
                        let span = self.program.expr(cond).span;
                        self.error(
                            "only bool expressions are accepted as conditions",
                            Some(span),
                        );
                    }
                }
                c && b
            }
            StmtKind::Block { block: inner } => self.try_complete_block(inner, progress),
            StmtKind::VarDecl { .. } => self.program.stmt(sid).complete,
            StmtKind::BlockEnd => true,
        };

        if done {
            self.program.stmt_mut(sid).complete = true;
        }
        done
    }

    pub(crate) fn try_complete_expression(&mut self, eid: ExprId, progress: &mut bool) -> bool {
        if self.program.expr(eid).complete {
            return true;
        }
        let block = self.program.expr(eid).block;
        let designators: Vec<DesigId> = self
            .program
            .expr(eid)
            .values
            .iter()
            .filter_map(|v| match v {
                crate::model::ExprValue::Designator(d) => Some(*d),
                _ => None,
            })
            .collect();

        let mut all = true;
        for d in designators {
            if !self.calc_address(d, block, progress) {
                all = false;
            }
        }
        if all {
            self.program.expr_mut(eid).complete = true;
            let t = typecheck::check_expression(self, eid);
            self.program.expr_mut(eid).result_type = t;
            *progress = true;
        }
        all
    }

    /// Record a function's return type the first time a return statement
    /// completes; later returns must agree.
    pub(crate) fn set_return_type(&mut self, id: FuncId, t: TypeId, span: Option<TokenSpan>) {
        let f = self.program.function_mut(id);
        if f.return_type == builtin::UNKNOWN {
            f.return_type = t;
        } else if f.return_type != t {
            let name = f.name.clone();
            self.error(
                format!("function '{}' returns incompatible types", name),
                span,
            );
        }
    }
}
