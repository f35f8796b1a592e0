use thiserror::Error;

/// Errors produced by model building, grounding and the analysis layers.
/// Structural errors carry the line of the offending AST node; semantic
/// errors refer to constructs that survived parsing but are rejected by the
/// pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("line {line}: {msg}")]
    Structural { line: u32, msg: String },

    #[error("{msg}")]
    Semantic { msg: String },

    /// An optional capability (LP solver, external landmark generator) that
    /// is not linked into this build.
    #[error("{msg}")]
    Unsupported { msg: String },
}

impl Error {
    pub fn structural(line: u32, msg: impl Into<String>) -> Self {
        Self::Structural {
            line,
            msg: msg.into(),
        }
    }

    pub fn semantic(msg: impl Into<String>) -> Self {
        Self::Semantic { msg: msg.into() }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported { msg: msg.into() }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
