use std::io::{self, Write};

use stencil::ast::{ArgKind, Directive};

use crate::chain::Fragment;
use crate::context::Context;
use crate::error::RenderError;
use crate::loader;
use crate::render::{Engine, RenderMode};

/// Render one directive. `Ok(false)` is a soft failure, already logged.
pub(crate) fn render(
    engine: &Engine,
    directive: &Directive,
    context: &mut Context,
    output: &mut dyn Write,
    mode: RenderMode,
) -> Result<bool, RenderError> {
    match directive.name.as_str() {
        "set" => set(engine, directive, context),
        "stop" => {
            context.stop_rendering();
            Ok(true)
        }
        "nop" => Ok(true),
        "nil" => nil(engine, directive, context),
        "defvar" => define(engine, directive, context, false),
        "defconst" => define(engine, directive, context, true),
        "unset" => unset(engine, directive, context),
        "block" => block(engine, directive, context, output, mode),
        "prepend" => insert(engine, directive, context, mode, Insert::BeforeMarker),
        "append" => insert(engine, directive, context, mode, Insert::AfterMarker),
        "apply" => apply(engine, directive, context, output),
        "import" => import(engine, directive, context, output, mode),
        "displace" => displace(engine, directive, context, output, mode),
        _ => Ok(soft_error(directive, context, "unknown directive")),
    }
}

/// Log a recoverable resolution failure with the directive name and calling
/// template. Evaluates to false so callers can `return Ok(soft_error(..))`.
fn soft_error(directive: &Directive, context: &Context, message: &str) -> bool {
    tracing::error!(
        directive = %directive.name,
        template = %context.current_template(),
        "{message}"
    );
    false
}

fn soft_warn(directive: &Directive, context: &Context, message: &str) -> bool {
    tracing::warn!(
        directive = %directive.name,
        template = %context.current_template(),
        "{message}"
    );
    false
}

// ---------------------------------------------------------------------------
// Definitions and assignment
// ---------------------------------------------------------------------------

fn set(engine: &Engine, directive: &Directive, context: &mut Context) -> Result<bool, RenderError> {
    let Some(ArgKind::Assignment { target, value }) =
        directive.args.first().map(|arg| &arg.kind)
    else {
        return Ok(soft_error(directive, context, "argument must be an assignment"));
    };
    match engine.evaluate(value, context) {
        Some(value) => {
            context.set(&target.name, value);
        }
        None => {
            tracing::debug!(
                reference = %target.name,
                "right-hand side is unbound, leaving target unchanged"
            );
        }
    }
    Ok(true)
}

fn define(
    engine: &Engine,
    directive: &Directive,
    context: &mut Context,
    constant: bool,
) -> Result<bool, RenderError> {
    let Some(ArgKind::Reference(target)) = directive.args.first().map(|arg| &arg.kind) else {
        return Ok(soft_error(directive, context, "first argument must be a reference"));
    };
    let Some(value) = directive
        .args
        .get(1)
        .and_then(|arg| engine.evaluate(arg, context))
    else {
        return Ok(true);
    };
    if constant {
        context.define_constant(&target.name, value);
    } else {
        context.define(&target.name, value);
    }
    Ok(true)
}

fn unset(
    engine: &Engine,
    directive: &Directive,
    context: &mut Context,
) -> Result<bool, RenderError> {
    let Some(ArgKind::Reference(target)) = directive.args.first().map(|arg| &arg.kind) else {
        return Ok(soft_error(directive, context, "first argument must be a reference"));
    };
    let deep = engine.bool_arg(directive.args.get(1), context);
    context.unset(&target.name, deep);
    Ok(true)
}

// ---------------------------------------------------------------------------
// Output suppression
// ---------------------------------------------------------------------------

/// `#nil`: the body is fully rendered for its side effects, output discarded.
/// The mode resets to Base, so a `#block` under `#nil` never captures.
fn nil(engine: &Engine, directive: &Directive, context: &mut Context) -> Result<bool, RenderError> {
    engine.render_nodes(&directive.body, context, &mut io::sink(), RenderMode::Base)
}

// ---------------------------------------------------------------------------
// Block-override resolution
// ---------------------------------------------------------------------------

fn block(
    engine: &Engine,
    directive: &Directive,
    context: &mut Context,
    output: &mut dyn Write,
    mode: RenderMode,
) -> Result<bool, RenderError> {
    let Some(name) = engine.string_arg(directive.args.first(), context) else {
        return Ok(soft_error(directive, context, "block name must not be null"));
    };
    tracing::debug!(block = %name, ?mode, "resolving block chain");

    match mode {
        RenderMode::Capture => {
            let has_marker = context
                .registry_mut()
                .map(|registry| registry.resolve(&name).has_marker());
            let Some(has_marker) = has_marker else {
                return Ok(soft_error(directive, context, "no active apply scope"));
            };
            if !has_marker {
                // An earlier override in this apply already claimed the chain.
                return Ok(true);
            }
            let Some(fragment) = capture(engine, directive, context)? else {
                return Ok(false);
            };
            if let Some(registry) = context.registry_mut() {
                registry.resolve(&name).replace_marker(fragment);
            }
            Ok(true)
        }
        RenderMode::Base => {
            let fragments = context
                .registry_mut()
                .map(|registry| registry.resolve(&name).fragments().to_vec());
            let Some(fragments) = fragments else {
                // No enclosing apply: the block renders its own body.
                return engine.render_nodes(&directive.body, context, output, RenderMode::Base);
            };
            let mut ok = true;
            for fragment in fragments {
                match fragment {
                    Fragment::Marker => {
                        ok &= engine.render_nodes(
                            &directive.body,
                            context,
                            output,
                            RenderMode::Base,
                        )?;
                    }
                    Fragment::Nodes(nodes) => {
                        ok &= engine.render_nodes(&nodes, context, output, RenderMode::Base)?;
                    }
                    Fragment::Text(text) => output.write_all(text.as_bytes())?,
                }
                if !context.allow_render() {
                    break;
                }
            }
            Ok(ok)
        }
    }
}

/// Evaluate an override body per the binding setting. Late binding stores
/// the body nodes unevaluated; early binding renders them now, against the
/// capture-time scope. `Ok(None)` is a soft capture failure and the chain
/// must stay untouched; hard errors propagate.
fn capture(
    engine: &Engine,
    directive: &Directive,
    context: &mut Context,
) -> Result<Option<Fragment>, RenderError> {
    if engine.settings().late_rendering {
        return Ok(Some(Fragment::Nodes(directive.body.clone())));
    }
    let mut buffer = Vec::new();
    if !engine.render_nodes(&directive.body, context, &mut buffer, RenderMode::Base)? {
        return Ok(None);
    }
    let text = String::from_utf8(buffer).map_err(|error| RenderError::Io(error.to_string()))?;
    Ok(Some(Fragment::Text(text)))
}

enum Insert {
    BeforeMarker,
    AfterMarker,
}

fn insert(
    engine: &Engine,
    directive: &Directive,
    context: &mut Context,
    mode: RenderMode,
    position: Insert,
) -> Result<bool, RenderError> {
    let Some(name) = engine.string_arg(directive.args.first(), context) else {
        return Ok(soft_error(directive, context, "block name must not be null"));
    };
    if mode != RenderMode::Capture {
        return Ok(soft_warn(directive, context, "found outside of #apply"));
    }

    let has_marker = context
        .registry_mut()
        .map(|registry| registry.resolve(&name).has_marker());
    let Some(has_marker) = has_marker else {
        return Ok(soft_error(directive, context, "no active apply scope"));
    };
    if !has_marker {
        // The chain was already overridden; nothing left to wrap.
        return Ok(true);
    }
    let Some(fragment) = capture(engine, directive, context)? else {
        return Ok(false);
    };
    if let Some(registry) = context.registry_mut() {
        let chain = registry.resolve(&name);
        match position {
            Insert::BeforeMarker => chain.insert_before_marker(fragment),
            Insert::AfterMarker => chain.insert_after_marker(fragment),
        };
    }
    Ok(true)
}

// ---------------------------------------------------------------------------
// Template inclusion
// ---------------------------------------------------------------------------

/// `#apply`: render the override body into a discarding sink under Capture
/// mode against a fresh registry, then import the target in Base mode while
/// that registry is still on top. The registry is popped on every path, so
/// nested applies never see each other's chains.
fn apply(
    engine: &Engine,
    directive: &Directive,
    context: &mut Context,
    output: &mut dyn Write,
) -> Result<bool, RenderError> {
    if !context.allow_render() {
        return Ok(true);
    }
    context.push_registry();
    let captured = engine.render_nodes(
        &directive.body,
        context,
        &mut io::sink(),
        RenderMode::Capture,
    );
    let result = match captured {
        Ok(ok) => import(engine, directive, context, output, RenderMode::Base)
            .map(|imported| ok && imported),
        Err(error) => Err(error),
    };
    context.pop_registry();
    result
}

/// `#import`: resolve relative to the current template, enforce the
/// recursion limit, then render the target in the caller's mode (so an
/// override body may import a file of shared `#block` overrides).
fn import(
    engine: &Engine,
    directive: &Directive,
    context: &mut Context,
    output: &mut dyn Write,
    mode: RenderMode,
) -> Result<bool, RenderError> {
    if !context.allow_render() {
        return Ok(true);
    }
    if context.template_depth() >= engine.settings().max_depth {
        let message = format!(
            "max recursion depth reached: {:?}",
            context.template_stack()
        );
        return Ok(soft_error(directive, context, &message));
    }
    let Some(target) = engine.string_arg(directive.args.first(), context) else {
        return Ok(soft_error(directive, context, "argument must not be null"));
    };
    let name = loader::resolve(context.current_template(), &target);
    tracing::debug!(directive = %directive.name, template = %name, "importing");

    let template = match engine.loader().load(&name) {
        Ok(template) => template,
        Err(error) => {
            tracing::error!(
                directive = %directive.name,
                template = %name,
                "rendering failure: {error}"
            );
            return Err(error);
        }
    };
    context.push_template(&name);
    let result = engine.render_nodes(&template.nodes, context, output, mode);
    context.pop_template();
    if let Err(error) = &result {
        tracing::error!(
            directive = %directive.name,
            template = %name,
            "rendering failure: {error}"
        );
    }
    result
}

/// `#displace`: import the target when the loader can find it, otherwise
/// render the fallback body verbatim. A null target also falls back.
fn displace(
    engine: &Engine,
    directive: &Directive,
    context: &mut Context,
    output: &mut dyn Write,
    mode: RenderMode,
) -> Result<bool, RenderError> {
    if let Some(target) = engine.string_arg(directive.args.first(), context) {
        let name = loader::resolve(context.current_template(), &target);
        if engine.loader().exists(&name) {
            return import(engine, directive, context, output, mode);
        }
    }
    engine.render_nodes(&directive.body, context, output, mode)
}
