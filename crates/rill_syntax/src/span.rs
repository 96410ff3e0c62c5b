//! Token index spans attached to nodes and diagnostics.

/// Inclusive range of token indices covered by a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TokenSpan {
    pub start: u32,
    pub end: u32,
}

impl TokenSpan {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// Span covering a single token.
    pub fn point(token: u32) -> Self {
        Self {
            start: token,
            end: token,
        }
    }
}
