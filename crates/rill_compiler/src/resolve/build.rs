//! Construction pass: one walk over the syntax tree in source order.
//!
//! Every entity is created here and completion is attempted on the spot,
//! so programs without forward references finish in this single pass.
//! Anything blocked on a name that has not resolved yet lands on the
//! pending worklists for the fixpoint loop.

use crate::model::{builtin, BlockId, DesigId, ExprId, Param, StmtId, StmtKind, ExprValue, FuncId};
use rill_syntax::{NodeId, NodeKind};
use tracing::trace;

use super::Resolver;

impl Resolver<'_> {
    pub(crate) fn declare_type(&mut self, node: NodeId) {
        let tree = self.tree;
        let children = tree.children(node);
        let Some(&name_node) = children.first() else {
            self.critical("type definition without a name", Some(tree.node(node).span()));
            return;
        };
        let name = tree.text(name_node).to_string();
        if self.program.is_type_name_taken(&name) {
            self.error(
                format!("type '{}' is already defined", name),
                Some(tree.node(name_node).span()),
            );
            return;
        }

        let id = self.program.new_type(&name);
        trace!(name, id = id.0, "declared type");
        for &member in &children[1..] {
            match tree.kind(member) {
                NodeKind::TypeLegends => {
                    let legends: Vec<String> = tree
                        .children(member)
                        .iter()
                        .map(|&l| tree.text(l).to_string())
                        .collect();
                    self.program.type_mut(id).legends = legends;
                }
                NodeKind::VariableDeclaration => {
                    let parts = tree.children(member);
                    if parts.len() < 2 {
                        self.error(
                            "record members require a type",
                            Some(tree.node(member).span()),
                        );
                        continue;
                    }
                    let field = tree.text(parts[0]).to_string();
                    let declared = tree.text(parts[1]).to_string();
                    let ty = self.program.type_mut(id);
                    if ty.fields.contains_key(&field) {
                        let message = format!("member '{}' is already defined", field);
                        self.error(message, Some(tree.node(member).span()));
                        continue;
                    }
                    ty.fields.insert(
                        field,
                        crate::model::Field {
                            declared_type: declared,
                            type_id: builtin::UNKNOWN,
                            offset: 0,
                        },
                    );
                }
                NodeKind::FunctionDeclaration => {
                    // method bodies are not compiled yet, the name is recorded
                    if let Some(&mname) = tree.children(member).first() {
                        let mname = tree.text(mname).to_string();
                        self.program.type_mut(id).methods.push(mname);
                    }
                }
                _ => self.error(
                    "unexpected member in type definition",
                    Some(tree.node(member).span()),
                ),
            }
        }

        let mut progress = false;
        if !self.try_complete_type(id, &mut progress) {
            self.pending_types.push(id);
        }
    }

    pub(crate) fn declare_function(&mut self, node: NodeId) {
        let tree = self.tree;
        let children = tree.children(node);
        if children.len() != 3 {
            self.critical(
                "function declarations require a name, a parameter list and a body",
                Some(tree.node(node).span()),
            );
            return;
        }
        let name = tree.text(children[0]).to_string();
        if self.program.is_function_name_taken(&name) {
            self.error(
                format!("function '{}' is already defined", name),
                Some(tree.node(children[0]).span()),
            );
            return;
        }

        let id = self.program.new_function(&name);
        trace!(name, id = id.0, "declared function");
        for &param in tree.children(children[1]) {
            let parts = tree.children(param);
            if parts.len() != 2 {
                self.error("parameters require a type", Some(tree.node(param).span()));
                continue;
            }
            let pname = tree.text(parts[0]).to_string();
            let declared = tree.text(parts[1]).to_string();
            let f = self.program.function_mut(id);
            if f.params.params.contains_key(&pname) {
                let message = format!("parameter '{}' is already defined", pname);
                self.error(message, Some(tree.node(param).span()));
                continue;
            }
            f.params.params.insert(
                pname,
                Param {
                    declared_type: declared,
                    type_id: builtin::UNKNOWN,
                    offset: 0,
                    complete: false,
                },
            );
        }

        // parameters first so body designators can resolve against them
        let mut progress = false;
        self.try_complete_params(id, &mut progress);

        let body = self.build_body(children[2], id);
        self.program.function_mut(id).body = body;

        if !self.try_complete_function(id, &mut progress) {
            self.pending_functions.push(id);
        }
    }

    fn build_body(&mut self, node: NodeId, function: FuncId) -> BlockId {
        self.build_block(node, function, None)
    }

    /// Nested blocks end in a synthetic [`StmtKind::BlockEnd`] marker; the
    /// function body block does not, the generator frames it itself.
    pub(crate) fn build_block(
        &mut self,
        node: NodeId,
        function: FuncId,
        parent: Option<BlockId>,
    ) -> BlockId {
        let tree = self.tree;
        let id = self.program.new_block(function, parent);
        for &stmt in tree.children(node) {
            self.build_block_statement(stmt, id);
        }
        if parent.is_some() {
            let end = self.program.new_stmt(StmtKind::BlockEnd, id, true);
            self.program.block_mut(id).stmts.push(end);
        }
        let block = self.program.block_mut(id);
        block.complete = block.pending_decls.is_empty() && block.pending_stmts.is_empty();
        id
    }

    fn build_block_statement(&mut self, node: NodeId, block: BlockId) {
        match self.tree.kind(node) {
            NodeKind::VariableDeclaration => self.build_var_decl(node, block),
            NodeKind::Break | NodeKind::Continue => {
                let span = self.tree.node(node).span();
                self.error("'break' and 'continue' are not supported yet", Some(span));
            }
            NodeKind::ElseIf | NodeKind::Else => {
                let span = self.tree.node(node).span();
                self.error("'else' branches are not supported yet", Some(span));
            }
            _ => {
                if let Some(sid) = self.build_statement(node, block) {
                    self.add_statement(sid, block);
                }
            }
        }
    }

    fn build_var_decl(&mut self, node: NodeId, block: BlockId) {
        let tree = self.tree;
        let children = tree.children(node);
        let name = tree.text(children[0]).to_string();
        if self.is_var_declared(&name, block) {
            self.error(
                format!("'{}' is already defined in this scope", name),
                Some(tree.node(children[0]).span()),
            );
            return;
        }
        let declared = match children.get(1) {
            Some(&t) if tree.kind(t) == NodeKind::TypeName => tree.text(t).to_string(),
            _ => {
                self.error(
                    "variable declarations require a type",
                    Some(tree.node(node).span()),
                );
                return;
            }
        };

        let sid = self.program.new_stmt(
            StmtKind::VarDecl {
                name: name.clone(),
                declared_type: declared,
                type_id: builtin::UNKNOWN,
                offset: 0,
            },
            block,
            false,
        );
        self.program.block_mut(block).stmts.push(sid);
        let mut progress = false;
        if !self.try_complete_decl(sid, block, &mut progress) {
            self.program.block_mut(block).pending_decls.push(sid);
        }

        // an initializer lowers to an ordinary assignment right after
        if let Some(&init) = children.get(2) {
            let span = tree.node(children[0]).span();
            let target = self.program.new_designator(name, None, None, span);
            let value = self.build_expression(init, block);
            let assign = self
                .program
                .new_stmt(StmtKind::Assign { target, value }, block, false);
            self.add_statement(assign, block);
        }
    }

    /// Build a statement without adding it to the block's statement list;
    /// `if` and `while` bodies hang off their owning statement instead.
    fn build_statement(&mut self, node: NodeId, block: BlockId) -> Option<StmtId> {
        let tree = self.tree;
        let children = tree.children(node);
        let kind = match tree.kind(node) {
            NodeKind::Assignment => {
                let target = self.build_designator(children[0], block);
                let value = self.build_expression(children[1], block);
                StmtKind::Assign { target, value }
            }
            NodeKind::Increment => {
                let target = self.build_designator(children[0], block);
                StmtKind::Increment { target }
            }
            NodeKind::Decrement => {
                let target = self.build_designator(children[0], block);
                StmtKind::Decrement { target }
            }
            NodeKind::Invoke => {
                let value = self.build_value_expression(children[0], block);
                StmtKind::Invoke { value }
            }
            NodeKind::Return => {
                let value = children.first().map(|&e| self.build_expression(e, block));
                StmtKind::Return { value }
            }
            NodeKind::If => {
                let cond = self.build_expression(children[0], block);
                let body = self.build_statement_or_block(children[1], block)?;
                StmtKind::If { cond, body }
            }
            NodeKind::While => {
                let cond = self.build_expression(children[0], block);
                let body = self.build_statement_or_block(children[1], block)?;
                StmtKind::While { cond, body }
            }
            NodeKind::Block => {
                let function = self.program.block(block).function;
                let inner = self.build_block(node, function, Some(block));
                StmtKind::Block { block: inner }
            }
            _ => {
                self.error(
                    "unexpected statement",
                    Some(tree.node(node).span()),
                );
                return None;
            }
        };
        Some(self.program.new_stmt(kind, block, false))
    }

    fn build_statement_or_block(&mut self, node: NodeId, block: BlockId) -> Option<StmtId> {
        if self.tree.kind(node) == NodeKind::Block {
            let function = self.program.block(block).function;
            let inner = self.build_block(node, function, Some(block));
            Some(self.program.new_stmt(StmtKind::Block { block: inner }, block, false))
        } else {
            self.build_statement(node, block)
        }
    }

    /// Append a built statement to its block and attempt completion.
    fn add_statement(&mut self, sid: StmtId, block: BlockId) {
        self.program.block_mut(block).stmts.push(sid);
        let mut progress = false;
        if !self.try_complete_stmt(sid, &mut progress) {
            self.program.block_mut(block).pending_stmts.push(sid);
        }
    }

    /// The child of an `invoke` is either an expression node or a bare
    /// call designator; either way an expression comes out.
    fn build_value_expression(&mut self, node: NodeId, block: BlockId) -> ExprId {
        if self.tree.kind(node) == NodeKind::Expression {
            return self.build_expression(node, block);
        }
        let span = self.tree.node(node).span();
        let d = self.build_designator(node, block);
        let eid = self
            .program
            .new_expr(vec![ExprValue::Designator(d)], block, span);
        let mut progress = false;
        self.try_complete_expression(eid, &mut progress);
        eid
    }

    pub(crate) fn build_expression(&mut self, node: NodeId, block: BlockId) -> ExprId {
        let tree = self.tree;
        let mut values = Vec::new();
        for &child in tree.children(node) {
            let value = match tree.kind(child) {
                NodeKind::ConstInt => {
                    ExprValue::ConstInt(tree.token_int(tree.node(child).start_token))
                }
                NodeKind::ConstBool => ExprValue::ConstBool(tree.text(child) == "true"),
                NodeKind::Designator => {
                    ExprValue::Designator(self.build_designator(child, block))
                }
                NodeKind::Plus => ExprValue::Add,
                NodeKind::Minus => ExprValue::Sub,
                NodeKind::Multiply => ExprValue::Mul,
                NodeKind::Divide => ExprValue::Div,
                NodeKind::Equals => ExprValue::Eq,
                NodeKind::NotEqual => ExprValue::Ne,
                NodeKind::Negate => ExprValue::Neg,
                _ => {
                    self.error(
                        "unsupported value in expression",
                        Some(tree.node(child).span()),
                    );
                    continue;
                }
            };
            values.push(value);
        }
        let span = tree.node(node).span();
        let eid = self.program.new_expr(values, block, span);
        let mut progress = false;
        self.try_complete_expression(eid, &mut progress);
        eid
    }

    /// Build a designator chain; the returned id is the last segment, each
    /// segment points back at the one before it.
    pub(crate) fn build_designator(&mut self, node: NodeId, block: BlockId) -> DesigId {
        let tree = self.tree;
        let mut parent: Option<DesigId> = None;
        for &seg in tree.children(node) {
            let span = tree.node(seg).span();
            let id = match tree.kind(seg) {
                NodeKind::Identifier => {
                    self.program
                        .new_designator(tree.text(seg).to_string(), parent, None, span)
                }
                NodeKind::FunctionCall => {
                    let arg_nodes: Vec<NodeId> = tree.children(seg).to_vec();
                    let args: Vec<ExprId> = arg_nodes
                        .into_iter()
                        .map(|a| self.build_expression(a, block))
                        .collect();
                    self.program
                        .new_designator(tree.text(seg).to_string(), parent, Some(args), span)
                }
                _ => {
                    self.error("malformed designator segment", Some(span));
                    continue;
                }
            };
            parent = Some(id);
        }
        match parent {
            Some(d) => d,
            None => {
                let span = tree.node(node).span();
                self.critical("empty designator", Some(span));
                self.program
                    .new_designator(String::new(), None, None, span)
            }
        }
    }

    /// A name counts as declared if it is a parameter of the owning
    /// function or any block on the lexical chain has a declaration for
    /// it, completed or still pending.
    fn is_var_declared(&self, name: &str, block: BlockId) -> bool {
        let function = self.program.block(block).function;
        if self.program.function_ref(function).params.get(name).is_some() {
            return true;
        }
        let mut current = Some(block);
        while let Some(id) = current {
            let b = self.program.block(id);
            if b.vars.contains_key(name) {
                return true;
            }
            let pending = b.pending_decls.iter().any(|&sid| {
                matches!(
                    &self.program.stmt(sid).kind,
                    StmtKind::VarDecl { name: n, .. } if n == name
                )
            });
            if pending {
                return true;
            }
            current = b.parent;
        }
        false
    }
}
