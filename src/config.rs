// ═══════════════════════════════════════════════════════════
// Configuration: where modules are looked up
// ═══════════════════════════════════════════════════════════

use std::env;
use std::path::PathBuf;

use tracing::debug;

use crate::loader::SearchPath;

/// Environment variable holding the module search path, in the platform's
/// path-list syntax.
pub const MODULE_PATH_VAR: &str = "YCP_MODULE_PATH";

/// Extension of compiled module files.
pub const EXTENSION: &str = "ybc";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub module_path: Vec<PathBuf>,
    pub extension: String,
}

impl Default for Config {
    fn default() -> Self {
        Config { module_path: Vec::new(), extension: EXTENSION.to_string() }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Config::default();
        if let Some(paths) = env::var_os(MODULE_PATH_VAR) {
            config.module_path = env::split_paths(&paths).filter(|p| !p.as_os_str().is_empty()).collect();
            debug!("{} = {:?}", MODULE_PATH_VAR, config.module_path);
        }
        config
    }

    /// Directories given on the command line are searched before the ones
    /// from the environment.
    pub fn with_dirs(mut self, dirs: impl IntoIterator<Item = PathBuf>) -> Self {
        let mut path: Vec<PathBuf> = dirs.into_iter().collect();
        path.append(&mut self.module_path);
        self.module_path = path;
        self
    }

    pub fn resolver(&self) -> SearchPath {
        SearchPath::new(self.module_path.clone(), &self.extension)
    }
}
