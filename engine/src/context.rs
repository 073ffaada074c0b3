use std::collections::HashMap;

use crate::chain::BlockRegistry;
use crate::value::Value;

/// How a name is bound in a scope.
#[derive(Debug, Clone)]
enum Slot {
    Variable(Value),
    /// Write-once binding created by `#defconst`.
    Constant(Value),
}

/// One level of the value scope chain.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    slots: HashMap<String, Slot>,
}

/// Per-render state: the value scope chain, the template-name stack, the
/// cooperative rendering flag and the block-registry stack.
///
/// A context belongs to exactly one top-level render at a time; it is never
/// shared across threads.
#[derive(Debug)]
pub struct Context {
    /// Scope chain, innermost last. Always holds at least one scope.
    scopes: Vec<Scope>,
    template_stack: Vec<String>,
    allow_render: bool,
    registries: Vec<BlockRegistry>,
}

impl Context {
    pub fn new() -> Self {
        Context {
            scopes: vec![Scope::default()],
            template_stack: Vec::new(),
            allow_render: true,
            registries: Vec::new(),
        }
    }

    // -- value scopes -------------------------------------------------------

    /// Push a nested value scope. Lookups search innermost-out; writes land
    /// in the innermost scope.
    pub fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    pub fn pop_scope(&mut self) -> Option<Scope> {
        if self.scopes.len() > 1 {
            self.scopes.pop()
        } else {
            None
        }
    }

    /// Look up a name, innermost scope first. Constants read as their value.
    pub fn get(&self, name: &str) -> Option<&Value> {
        for scope in self.scopes.iter().rev() {
            if let Some(slot) = scope.slots.get(name) {
                return Some(match slot {
                    Slot::Variable(value) | Slot::Constant(value) => value,
                });
            }
        }
        None
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Bind in the innermost scope. Writes against a visible constant are
    /// rejected with a debug log line.
    pub fn set(&mut self, name: &str, value: Value) -> bool {
        if self.visible_constant(name) {
            tracing::debug!("cannot overwrite constant value: {name}");
            return false;
        }
        let scope = self.scopes.last_mut().expect("scope chain is empty");
        scope.slots.insert(name.to_string(), Slot::Variable(value));
        true
    }

    /// Bind only if the name is not already visible anywhere in the chain.
    pub fn define(&mut self, name: &str, value: Value) {
        if !self.is_defined(name) {
            self.set(name, value);
        }
    }

    /// Like [`define`](Self::define), but the binding is write-once.
    pub fn define_constant(&mut self, name: &str, value: Value) {
        if !self.is_defined(name) {
            let scope = self.scopes.last_mut().expect("scope chain is empty");
            scope.slots.insert(name.to_string(), Slot::Constant(value));
        }
    }

    /// Remove a binding. Shallow removal targets the innermost scope that
    /// binds the name (an outer binding becomes visible again); deep removal
    /// walks the entire chain. Constants survive both.
    pub fn unset(&mut self, name: &str, deep: bool) {
        if deep {
            for scope in self.scopes.iter_mut() {
                match scope.slots.get(name) {
                    Some(Slot::Constant(_)) => {
                        tracing::debug!("cannot remove constant value: {name}");
                    }
                    Some(Slot::Variable(_)) => {
                        scope.slots.remove(name);
                    }
                    None => {}
                }
            }
        } else {
            for scope in self.scopes.iter_mut().rev() {
                match scope.slots.get(name) {
                    Some(Slot::Constant(_)) => {
                        tracing::debug!("cannot remove constant value: {name}");
                        return;
                    }
                    Some(Slot::Variable(_)) => {
                        scope.slots.remove(name);
                        return;
                    }
                    None => {}
                }
            }
        }
    }

    /// True when the binding the name resolves to is a constant.
    fn visible_constant(&self, name: &str) -> bool {
        for scope in self.scopes.iter().rev() {
            match scope.slots.get(name) {
                Some(Slot::Constant(_)) => return true,
                Some(Slot::Variable(_)) => return false,
                None => {}
            }
        }
        false
    }

    // -- cooperative rendering flag ----------------------------------------

    /// Checked between nodes and chain fragments, and at entry of
    /// `#import` / `#apply`.
    pub fn allow_render(&self) -> bool {
        self.allow_render
    }

    pub fn stop_rendering(&mut self) {
        self.allow_render = false;
    }

    // -- template-name stack -----------------------------------------------

    pub fn push_template(&mut self, name: &str) {
        self.template_stack.push(name.to_string());
    }

    pub fn pop_template(&mut self) {
        self.template_stack.pop();
    }

    /// The template currently being rendered; relative imports resolve
    /// against its directory.
    pub fn current_template(&self) -> &str {
        self.template_stack.last().map(String::as_str).unwrap_or("")
    }

    pub fn template_depth(&self) -> usize {
        self.template_stack.len()
    }

    pub fn template_stack(&self) -> &[String] {
        &self.template_stack
    }

    // -- block registries ---------------------------------------------------

    /// Open a fresh registry for one `#apply` invocation.
    pub(crate) fn push_registry(&mut self) {
        self.registries.push(BlockRegistry::new());
    }

    pub(crate) fn pop_registry(&mut self) {
        self.registries.pop();
    }

    /// The registry of the innermost active `#apply`, if any.
    pub(crate) fn registry_mut(&mut self) -> Option<&mut BlockRegistry> {
        self.registries.last_mut()
    }
}

impl Default for Context {
    fn default() -> Self {
        Context::new()
    }
}
