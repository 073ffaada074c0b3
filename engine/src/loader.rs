use std::cell::RefCell;
use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;

use stencil::Template;
use stencil::parser::Parser;

use crate::error::RenderError;

/// Loads and caches templates below a base directory.
///
/// Template names use `/` separators; a leading `/` anchors the name at the
/// base directory. Relative references are resolved against the referring
/// template first (see [`resolve`]), so the loader only ever sees full names.
#[derive(Debug)]
pub struct FileLoader {
    base_dir: PathBuf,
    cache: RefCell<HashMap<String, Rc<Template>>>,
}

impl FileLoader {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        FileLoader {
            base_dir: base_dir.into(),
            cache: RefCell::new(HashMap::new()),
        }
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.base_dir.join(name.trim_start_matches('/'))
    }

    /// Existence probe used by `#displace`: no read, no parse, no render.
    pub fn exists(&self, name: &str) -> bool {
        self.cache.borrow().contains_key(name) || self.path_for(name).is_file()
    }

    /// Load and parse a template, caching the parsed form per name.
    pub fn load(&self, name: &str) -> Result<Rc<Template>, RenderError> {
        if let Some(template) = self.cache.borrow().get(name) {
            return Ok(Rc::clone(template));
        }

        let source = std::fs::read_to_string(self.path_for(name))
            .map_err(|_| RenderError::ResourceNotFound(name.to_string()))?;
        let template = Parser::new(source, 0).parse().map_err(|errors| {
            let messages: Vec<String> = errors.iter().map(|e| e.message.clone()).collect();
            RenderError::Parse {
                template: name.to_string(),
                detail: messages.join(", "),
            }
        })?;

        let template = Rc::new(template);
        self.cache
            .borrow_mut()
            .insert(name.to_string(), Rc::clone(&template));
        Ok(template)
    }
}

/// Resolve a template reference against the template that mentions it:
/// absolute references (leading `/`) are taken as-is, relative ones against
/// the current template's directory.
pub fn resolve(current: &str, target: &str) -> String {
    if target.starts_with('/') {
        return target.to_string();
    }
    match current.rfind('/') {
        Some(index) => format!("{}/{}", &current[..index], target),
        None => target.to_string(),
    }
}
