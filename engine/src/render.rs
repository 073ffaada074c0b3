use std::io::Write;

use stencil::ast::{Arg, ArgKind, Node, Reference};
use stencil::parser::Parser;

use crate::context::Context;
use crate::directives;
use crate::error::RenderError;
use crate::loader::FileLoader;
use crate::value::Value;

/// Engine-wide configuration, passed explicitly at construction.
#[derive(Debug, Clone)]
pub struct Settings {
    /// false (default): `#block` override bodies are rendered at capture
    /// time, binding against the override scope. true: bodies are kept as
    /// nodes and rendered when the base template emits the block, binding
    /// against the base-template scope.
    pub late_rendering: bool,
    /// Maximum depth of the template-name stack before `#import` refuses to
    /// recurse further.
    pub max_depth: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            late_rendering: false,
            max_depth: 20,
        }
    }
}

/// Whether directives render for output or capture block overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Normal rendering into the output writer.
    Base,
    /// Under an `#apply` override body: `#block` / `#prepend` / `#append`
    /// populate the active registry instead of producing output.
    Capture,
}

pub struct Engine {
    loader: FileLoader,
    settings: Settings,
}

impl Engine {
    pub fn new(loader: FileLoader, settings: Settings) -> Self {
        Engine { loader, settings }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub(crate) fn loader(&self) -> &FileLoader {
        &self.loader
    }

    /// Render a named template into `output`.
    ///
    /// `Ok(true)` is a clean render; `Ok(false)` means soft failures
    /// occurred (already logged); `Err` is a hard failure.
    pub fn render(
        &self,
        name: &str,
        context: &mut Context,
        output: &mut dyn Write,
    ) -> Result<bool, RenderError> {
        let template = self.loader.load(name)?;
        context.push_template(name);
        let result = self.render_nodes(&template.nodes, context, output, RenderMode::Base);
        context.pop_template();
        result
    }

    /// Parse and render an in-memory source under a logical template name.
    /// Relative `#import` references inside the source resolve against the
    /// logical name's directory.
    pub fn render_str(
        &self,
        source: &str,
        name: &str,
        context: &mut Context,
        output: &mut dyn Write,
    ) -> Result<bool, RenderError> {
        let template = Parser::new(source.to_string(), 0).parse().map_err(|errors| {
            let messages: Vec<String> = errors.iter().map(|e| e.message.clone()).collect();
            RenderError::Parse {
                template: name.to_string(),
                detail: messages.join(", "),
            }
        })?;
        context.push_template(name);
        let result = self.render_nodes(&template.nodes, context, output, RenderMode::Base);
        context.pop_template();
        result
    }

    /// Render a node list. The cooperative rendering flag is re-checked
    /// before every node, so an earlier `#stop` suppresses the rest.
    pub(crate) fn render_nodes(
        &self,
        nodes: &[Node],
        context: &mut Context,
        output: &mut dyn Write,
        mode: RenderMode,
    ) -> Result<bool, RenderError> {
        let mut ok = true;
        for node in nodes {
            if !context.allow_render() {
                break;
            }
            match node {
                Node::Text(text) => output.write_all(text.as_bytes())?,
                Node::Reference(reference) => {
                    self.render_reference(reference, context, output)?;
                }
                Node::Directive(directive) => {
                    ok &= directives::render(self, directive, context, output, mode)?;
                }
            }
        }
        Ok(ok)
    }

    /// Unbound plain references echo their source text; quiet references
    /// render as nothing.
    fn render_reference(
        &self,
        reference: &Reference,
        context: &Context,
        output: &mut dyn Write,
    ) -> Result<(), RenderError> {
        match context.get(&reference.name) {
            Some(value) => write!(output, "{}", value)?,
            None if reference.quiet => {}
            None => output.write_all(reference.raw.as_bytes())?,
        }
        Ok(())
    }

    /// Evaluate an argument against the current context. An unbound
    /// reference evaluates to `None`.
    pub(crate) fn evaluate(&self, arg: &Arg, context: &Context) -> Option<Value> {
        match &arg.kind {
            ArgKind::Str(s) => Some(Value::String(s.clone())),
            ArgKind::Number(n) => Some(Value::Number(*n)),
            ArgKind::Bool(b) => Some(Value::Boolean(*b)),
            ArgKind::Reference(reference) => context.get(&reference.name).cloned(),
            ArgKind::Assignment { .. } => None,
        }
    }

    /// String view of a name-valued argument.
    pub(crate) fn string_arg(&self, arg: Option<&Arg>, context: &Context) -> Option<String> {
        self.evaluate(arg?, context).map(|value| value.to_string())
    }

    /// Boolean view of an optional flag argument; absent or unbound is false.
    pub(crate) fn bool_arg(&self, arg: Option<&Arg>, context: &Context) -> bool {
        arg.and_then(|a| self.evaluate(a, context))
            .map(|value| value.is_true())
            .unwrap_or(false)
    }
}
