use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TypeParseError {
    #[error("Invalid sequence type '{input}': {message}")]
    Syntax { input: String, message: String },

    #[error("Unknown atomic type 'xs:{0}'")]
    UnknownAtomicType(String),
}

impl TypeParseError {
    pub fn syntax(input: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Syntax {
            input: input.into(),
            message: message.into(),
        }
    }
}
