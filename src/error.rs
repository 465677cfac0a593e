// ═══════════════════════════════════════════════════════════
// Errors: every failure a load or save can end in
// ═══════════════════════════════════════════════════════════

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::ast::Kind;
use crate::file::Version;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A primitive read ran past the end of the stream, or the stream was
    /// already marked bad by an earlier failed read.
    #[error("unexpected end of bytecode stream")]
    StreamExhausted,

    #[error("not a bytecode file (bad magic header)")]
    BadMagic,

    #[error("unsupported bytecode version {found} (this build reads {expected})")]
    VersionMismatch { found: Version, expected: Version },

    #[error("unknown {what} tag {tag}")]
    UnknownKind { what: &'static str, tag: u8 },

    #[error("placeholder {0} found in stream, check the compilation of the module")]
    Placeholder(Kind),

    #[error("invalid {0} node")]
    InvalidNode(Kind),

    #[error("malformed string in bytecode stream")]
    InvalidString,

    #[error("broken symbol reference: {0}")]
    BrokenReference(String),

    #[error("namespace stack mismatch: {0}")]
    StackMismatch(String),

    #[error("module '{0}' not found")]
    ModuleNotFound(String),

    #[error("'{0}' is not a module")]
    NotAModule(String),

    #[error("cyclic import of module '{0}'")]
    CyclicImport(String),

    #[error("cannot access '{}': {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io { path: path.into(), source }
    }
}
