use std::collections::HashMap;

use stencil::ast::Node;

/// One entry in a block chain.
#[derive(Debug, Clone)]
pub enum Fragment {
    /// Placeholder for the base block body, rendered with whatever scope is
    /// current when the chain is consumed.
    Marker,
    /// An unevaluated body, rendered at consume time (late binding).
    Nodes(Vec<Node>),
    /// Text already rendered at capture time (early binding).
    Text(String),
}

impl Fragment {
    fn is_marker(&self) -> bool {
        matches!(self, Fragment::Marker)
    }
}

/// The ordered composition for one block name: prepended fragments, then the
/// override (or the marker while no override has been captured), then
/// appended fragments.
#[derive(Debug, Clone)]
pub struct BlockChain {
    fragments: Vec<Fragment>,
}

impl BlockChain {
    fn new() -> Self {
        BlockChain {
            fragments: vec![Fragment::Marker],
        }
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    pub fn has_marker(&self) -> bool {
        self.marker_index().is_some()
    }

    fn marker_index(&self) -> Option<usize> {
        self.fragments.iter().position(Fragment::is_marker)
    }

    /// Replace the marker with an override. Returns false when the marker is
    /// already gone: the first captured override wins.
    pub fn replace_marker(&mut self, fragment: Fragment) -> bool {
        match self.marker_index() {
            Some(index) => {
                self.fragments[index] = fragment;
                true
            }
            None => false,
        }
    }

    /// Insert directly before the marker, so the latest prepend renders
    /// nearest the override position.
    pub fn insert_before_marker(&mut self, fragment: Fragment) -> bool {
        match self.marker_index() {
            Some(index) => {
                self.fragments.insert(index, fragment);
                true
            }
            None => false,
        }
    }

    /// Insert after the marker and all previously appended fragments.
    pub fn insert_after_marker(&mut self, fragment: Fragment) -> bool {
        if self.has_marker() {
            self.fragments.push(fragment);
            true
        } else {
            false
        }
    }
}

/// Block chains for one `#apply` invocation, keyed by block name.
#[derive(Debug, Default)]
pub struct BlockRegistry {
    chains: HashMap<String, BlockChain>,
}

impl BlockRegistry {
    pub fn new() -> Self {
        BlockRegistry::default()
    }

    /// Idempotent per name: returns the existing chain, or seeds and
    /// registers a new one holding a single marker.
    pub fn resolve(&mut self, name: &str) -> &mut BlockChain {
        self.chains
            .entry(name.to_string())
            .or_insert_with(BlockChain::new)
    }
}
