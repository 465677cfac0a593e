// ═══════════════════════════════════════════════════════════
// ycp-bytecode: compiled YCP trees on disk, and module linking
// ═══════════════════════════════════════════════════════════
//
// Layers, bottom up:
//
//   stream    primitive codec (bool, tagged int32, strings, byte blocks)
//   types     type descriptors
//   value     constant values
//   codec     code tree nodes
//   resolve   symbol references as (namespace id, position)
//   stack     namespace stack with tare floors
//   loader    module lookup, cache and the session owning all state
//   file      header, version gate and file I/O
//
// ═══════════════════════════════════════════════════════════

pub mod ast;
pub mod codec;
pub mod config;
pub mod dump;
pub mod error;
pub mod file;
pub mod loader;
pub mod resolve;
pub mod stack;
pub mod stream;
pub mod symbols;
pub mod types;
pub mod value;

pub use ast::{Kind, Node};
pub use config::Config;
pub use error::{Error, Result};
pub use file::{read_bytes, read_file, write_bytes, write_file, Version, VERSION};
pub use loader::{ModuleResolver, SearchPath, Session};
pub use stack::NamespaceStack;
