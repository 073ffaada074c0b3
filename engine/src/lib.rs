pub mod chain;
pub mod context;
mod directives;
pub mod error;
pub mod loader;
pub mod render;
pub mod value;

pub use chain::{BlockChain, BlockRegistry, Fragment};
pub use context::Context;
pub use error::RenderError;
pub use loader::FileLoader;
pub use render::{Engine, RenderMode, Settings};
pub use value::Value;
