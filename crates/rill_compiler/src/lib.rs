//! Rill semantic analysis: the program model and the incremental resolver.
//!
//! [`resolve`] turns a syntax tree into a [`model::Program`]. Declarations
//! may reference functions, types and variables that appear later in the
//! source; the resolver completes them over multiple rounds instead of
//! requiring declaration-before-use.

pub mod model;
pub mod resolve;

pub use model::*;
pub use resolve::{resolve, Resolved};
