use std::ops::Range;

/// One node of a template body.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Literal output text.
    Text(String),
    /// A `$name` value reference.
    Reference(Reference),
    /// A `#name(...)` directive, with a body when the directive is a block.
    Directive(Directive),
}

/// A `$name`, `${name}`, `$!name` or `$!{name}` reference.
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    pub name: String,
    /// Quiet references render as empty text when the name is unbound.
    pub quiet: bool,
    /// The reference exactly as written; unbound plain references echo this.
    pub raw: String,
    pub span: Range<usize>,
}

/// A directive invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Directive {
    pub name: String,
    pub args: Vec<Arg>,
    /// Body nodes up to the matching `#end`; empty for line directives.
    pub body: Vec<Node>,
    /// Span of the directive header (`#name(...)`), not the body.
    pub span: Range<usize>,
}

/// A directive argument with its source location.
#[derive(Debug, Clone, PartialEq)]
pub struct Arg {
    pub kind: ArgKind,
    pub span: Range<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArgKind {
    Str(String),
    Number(f64),
    Bool(bool),
    Reference(Reference),
    /// `$target = value`, accepted only where the signature asks for one.
    Assignment { target: Reference, value: Box<Arg> },
}
