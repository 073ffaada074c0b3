use std::fmt;

/// A hard rendering failure.
///
/// Soft failures (null name arguments, prepend/append outside `#apply`,
/// recursion depth reached) are logged and reported through the boolean
/// render result instead; they never abort the surrounding template.
#[derive(Debug)]
pub enum RenderError {
    /// The loader could not find the named template.
    ResourceNotFound(String),
    /// A loaded template failed to parse.
    Parse { template: String, detail: String },
    /// The output writer failed.
    Io(String),
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::ResourceNotFound(name) => {
                write!(f, "template not found: {}", name)
            }
            RenderError::Parse { template, detail } => {
                write!(f, "parse errors in '{}': {}", template, detail)
            }
            RenderError::Io(message) => write!(f, "I/O error: {}", message),
        }
    }
}

impl std::error::Error for RenderError {}

impl From<std::io::Error> for RenderError {
    fn from(error: std::io::Error) -> Self {
        RenderError::Io(error.to_string())
    }
}
