pub mod ast;
pub mod directive;
pub mod parser;

use crate::ast::Node;

/// A parsed stencil template.
#[derive(Debug, Clone)]
pub struct Template {
    /// Top-level body nodes, in source order.
    pub nodes: Vec<Node>,
    /// The source file ID (for error reporting with codespan-reporting).
    pub source_id: usize,
}
