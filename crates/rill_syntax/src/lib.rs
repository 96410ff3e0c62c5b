//! Rill syntax: tree nodes, tokens, spans, diagnostics, and the tree builder.

pub mod builder;
pub mod diagnostics;
pub mod span;
pub mod tree;

pub use builder::*;
pub use diagnostics::*;
pub use span::*;
pub use tree::*;
