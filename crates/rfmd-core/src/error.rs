use thiserror::Error;

/// Return code for a command that completed normally.
pub const CODE_OK: i32 = 0;
/// Return code for an OS-level failure.
pub const CODE_RUNTIME: i32 = -1;
/// Return code for a malformed command line.
pub const CODE_SYNTAX: i32 = -2;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("System call failed: {0}")]
    Sys(#[from] nix::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Syntax error: {0}")]
    Syntax(String),

    #[error("Path too long: {len} bytes (maximum {max})")]
    PathTooLong { len: usize, max: usize },

    #[error("Path too deep: more than {max} segments")]
    PathTooDeep { max: usize },

    #[error("Frame too large: {size} bytes (maximum {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("{0} is a directory (use -r to copy recursively)")]
    IsDirectory(String),

    #[error("{0} is not executable or does not exist")]
    NotExecutable(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn syntax(message: impl Into<String>) -> Self {
        Error::Syntax(message.into())
    }

    /// Numeric result reported to the operator for this failure.
    pub fn code(&self) -> i32 {
        match self {
            Error::Syntax(_) | Error::PathTooLong { .. } | Error::PathTooDeep { .. } => {
                CODE_SYNTAX
            }
            _ => CODE_RUNTIME,
        }
    }

    pub fn is_syntax(&self) -> bool {
        self.code() == CODE_SYNTAX
    }
}

pub type Result<T> = std::result::Result<T, Error>;
