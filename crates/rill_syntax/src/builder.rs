//! Programmatic construction of syntax trees.
//!
//! Parser front ends (and the test suites in this workspace) assemble
//! trees through [`TreeBuilder`] instead of depending on the arena
//! representation directly. The convenience constructors mirror the child
//! conventions documented in [`crate::tree`].

use crate::tree::{Node, NodeId, NodeKind, SyntaxTree, Token};

#[derive(Default)]
pub struct TreeBuilder {
    nodes: Vec<Node>,
    tokens: Vec<Token>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(&mut self, text: &str) -> u32 {
        self.tokens.push(Token {
            text: text.to_string(),
            int_value: 0,
        });
        (self.tokens.len() - 1) as u32
    }

    pub fn int_token(&mut self, value: i32) -> u32 {
        self.tokens.push(Token {
            text: value.to_string(),
            int_value: value,
        });
        (self.tokens.len() - 1) as u32
    }

    /// A node whose name or value is a single token.
    pub fn leaf(&mut self, kind: NodeKind, token: u32) -> NodeId {
        self.push(Node {
            kind,
            start_token: token,
            end_token: token,
            children: Vec::new(),
        })
    }

    /// An interior node; its token range is derived from the children.
    pub fn node(&mut self, kind: NodeKind, children: Vec<NodeId>) -> NodeId {
        let start = children
            .iter()
            .map(|&c| self.nodes[c.0 as usize].start_token)
            .min()
            .unwrap_or(0);
        let end = children
            .iter()
            .map(|&c| self.nodes[c.0 as usize].end_token)
            .max()
            .unwrap_or(0);
        self.push(Node {
            kind,
            start_token: start,
            end_token: end,
            children,
        })
    }

    pub fn ident(&mut self, name: &str) -> NodeId {
        let t = self.token(name);
        self.leaf(NodeKind::Identifier, t)
    }

    pub fn type_name(&mut self, name: &str) -> NodeId {
        let t = self.token(name);
        self.leaf(NodeKind::TypeName, t)
    }

    pub fn const_int(&mut self, value: i32) -> NodeId {
        let t = self.int_token(value);
        self.leaf(NodeKind::ConstInt, t)
    }

    pub fn const_bool(&mut self, value: bool) -> NodeId {
        let t = self.token(if value { "true" } else { "false" });
        self.leaf(NodeKind::ConstBool, t)
    }

    /// An operator leaf for use inside a postfix expression.
    pub fn op(&mut self, kind: NodeKind) -> NodeId {
        let text = match kind {
            NodeKind::Plus => "+",
            NodeKind::Minus => "-",
            NodeKind::Multiply => "*",
            NodeKind::Divide => "/",
            NodeKind::Equals => "==",
            NodeKind::NotEqual => "!=",
            NodeKind::Negate => "-",
            _ => "?",
        };
        let t = self.token(text);
        self.leaf(kind, t)
    }

    /// A designator chain of plain identifier segments, e.g. `p.x`.
    pub fn designator(&mut self, path: &[&str]) -> NodeId {
        let segments: Vec<NodeId> = path.iter().map(|name| self.ident(name)).collect();
        self.node(NodeKind::Designator, segments)
    }

    /// A designator whose single segment is a function call.
    pub fn call(&mut self, name: &str, args: Vec<NodeId>) -> NodeId {
        let t = self.token(name);
        let call = self.push(Node {
            kind: NodeKind::FunctionCall,
            start_token: t,
            end_token: t,
            children: args,
        });
        self.node(NodeKind::Designator, vec![call])
    }

    /// An expression node over an already-postfix value sequence.
    pub fn expr(&mut self, postfix: Vec<NodeId>) -> NodeId {
        self.node(NodeKind::Expression, postfix)
    }

    pub fn assign(&mut self, designator: NodeId, value: NodeId) -> NodeId {
        self.node(NodeKind::Assignment, vec![designator, value])
    }

    pub fn var_decl(&mut self, name: &str, type_name: &str) -> NodeId {
        let n = self.ident(name);
        let t = self.type_name(type_name);
        self.node(NodeKind::VariableDeclaration, vec![n, t])
    }

    pub fn var_decl_init(&mut self, name: &str, type_name: &str, init: NodeId) -> NodeId {
        let n = self.ident(name);
        let t = self.type_name(type_name);
        self.node(NodeKind::VariableDeclaration, vec![n, t, init])
    }

    pub fn block(&mut self, stmts: Vec<NodeId>) -> NodeId {
        self.node(NodeKind::Block, stmts)
    }

    pub fn ret(&mut self, value: Option<NodeId>) -> NodeId {
        self.node(NodeKind::Return, value.into_iter().collect())
    }

    pub fn function(&mut self, name: &str, params: &[(&str, &str)], body: NodeId) -> NodeId {
        let n = self.ident(name);
        let params: Vec<NodeId> = params
            .iter()
            .map(|(pname, ptype)| {
                let pn = self.ident(pname);
                let pt = self.type_name(ptype);
                self.node(NodeKind::Parameter, vec![pn, pt])
            })
            .collect();
        let list = self.node(NodeKind::ParameterList, params);
        self.node(NodeKind::FunctionDeclaration, vec![n, list, body])
    }

    pub fn type_def(&mut self, name: &str, fields: &[(&str, &str)]) -> NodeId {
        let n = self.ident(name);
        let mut children = vec![n];
        for (fname, ftype) in fields {
            children.push(self.var_decl(fname, ftype));
        }
        self.node(NodeKind::TypeDefinition, children)
    }

    /// Close the tree with the given top-level declarations.
    pub fn finish(mut self, declarations: Vec<NodeId>) -> SyntaxTree {
        let root = self.node(NodeKind::Root, declarations);
        SyntaxTree::new(self.nodes, self.tokens, root)
    }

    fn push(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId((self.nodes.len() - 1) as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_a_function_with_tokens() {
        let mut b = TreeBuilder::new();
        let one = b.const_int(1);
        let e = b.expr(vec![one]);
        let r = b.ret(Some(e));
        let body = b.block(vec![r]);
        let f = b.function("main", &[], body);
        let tree = b.finish(vec![f]);

        let root = tree.root();
        assert_eq!(tree.kind(root), NodeKind::Root);
        assert_eq!(tree.children(root), &[f]);
        let name = tree.children(f)[0];
        assert_eq!(tree.text(name), "main");
    }

    #[test]
    fn int_tokens_carry_their_value() {
        let mut b = TreeBuilder::new();
        let n = b.const_int(42);
        let tree = b.finish(vec![n]);
        let node = tree.node(n);
        assert_eq!(tree.token_int(node.start_token), 42);
        assert_eq!(tree.token_text(node.start_token), "42");
    }

    #[test]
    fn designator_chains_keep_segment_order() {
        let mut b = TreeBuilder::new();
        let d = b.designator(&["p", "x"]);
        let tree = b.finish(vec![d]);
        let segments = tree.children(d);
        assert_eq!(segments.len(), 2);
        assert_eq!(tree.text(segments[0]), "p");
        assert_eq!(tree.text(segments[1]), "x");
    }
}
