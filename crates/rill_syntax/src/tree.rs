//! The syntax tree a parser front end hands to the resolver.
//!
//! Nodes live in a flat arena and are addressed by [`NodeId`]. Each node
//! carries the inclusive token range it covers; identifiers, type names,
//! constants and function calls name themselves through their start token.
//!
//! Child conventions the resolver relies on:
//!
//! - root: function declarations and type definitions in source order
//! - function declaration: `[identifier, parameter list, block]`
//! - parameter: `[identifier, type name]`
//! - type definition: `[identifier, type legends?, member declarations...]`
//! - variable declaration: `[identifier, type name?, initializer expression?]`
//! - assignment: `[designator, expression]`
//! - if / while: `[condition expression, block or single statement]`
//! - return: `[expression?]`; invoke / increment / decrement: one child
//! - expression: children are the flattened postfix value sequence
//! - designator: chain segments in access order; call segments carry their
//!   argument expressions as children

use crate::span::TokenSpan;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Root,
    Designator,
    Identifier,
    TypeName,
    TypeDefinition,
    TypeLegends,
    Expression,
    FunctionCall,
    ConstInt,
    ConstBool,
    Plus,
    Minus,
    Equals,
    NotEqual,
    Negate,
    Multiply,
    Divide,
    Parameter,
    ParameterList,
    FunctionDeclaration,
    Block,
    If,
    ElseIf,
    Else,
    While,
    VariableDeclaration,
    Return,
    Invoke,
    Increment,
    Decrement,
    Assignment,
    Break,
    Continue,
}

#[derive(Clone, Debug)]
pub struct Node {
    pub kind: NodeKind,
    pub start_token: u32,
    pub end_token: u32,
    pub children: Vec<NodeId>,
}

impl Node {
    pub fn span(&self) -> TokenSpan {
        TokenSpan::new(self.start_token, self.end_token)
    }
}

/// One token as the front end lexed it. `int_value` is only meaningful for
/// integer literals.
#[derive(Clone, Debug)]
pub struct Token {
    pub text: String,
    pub int_value: i32,
}

#[derive(Clone, Debug)]
pub struct SyntaxTree {
    nodes: Vec<Node>,
    tokens: Vec<Token>,
    root: NodeId,
}

impl SyntaxTree {
    pub(crate) fn new(nodes: Vec<Node>, tokens: Vec<Token>, root: NodeId) -> Self {
        Self { nodes, tokens, root }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    pub fn kind(&self, id: NodeId) -> NodeKind {
        self.node(id).kind
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    pub fn token_text(&self, token: u32) -> &str {
        &self.tokens[token as usize].text
    }

    pub fn token_int(&self, token: u32) -> i32 {
        self.tokens[token as usize].int_value
    }

    /// Text of the node's start token; how named nodes carry their name.
    pub fn text(&self, id: NodeId) -> &str {
        self.token_text(self.node(id).start_token)
    }
}
