// ═══════════════════════════════════════════════════════════
// Module loader: name to path to tree, at most once per session
// ═══════════════════════════════════════════════════════════
//
// A session owns everything a load touches: the namespace stack, the module
// cache and the resolver mapping module names to files. Imports found while
// reading a module recurse into the same session.
//
// The cache is authoritative for the lifetime of the session: nothing is
// evicted, nothing is reloaded when its file changes, and a second request
// for a name returns the very same tree.
//
// ═══════════════════════════════════════════════════════════

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::{debug, error, warn};

use crate::ast::Node;
use crate::config::{Config, EXTENSION};
use crate::error::{Error, Result};
use crate::file;
use crate::stack::NamespaceStack;

// ── Resolving names ───────────────────────────────────────────────────────────

pub trait ModuleResolver {
    fn find_module(&self, name: &str) -> Option<PathBuf>;
}

impl<F> ModuleResolver for F
where
    F: Fn(&str) -> Option<PathBuf>,
{
    fn find_module(&self, name: &str) -> Option<PathBuf> { self(name) }
}

/// Looks for `<dir>/<Name>.<ext>`, then `<dir>/modules/<Name>.<ext>`, in
/// each directory in turn.
#[derive(Debug, Clone)]
pub struct SearchPath {
    dirs: Vec<PathBuf>,
    extension: String,
}

impl Default for SearchPath {
    fn default() -> Self { SearchPath::new(Vec::new(), EXTENSION) }
}

impl SearchPath {
    pub fn new(dirs: Vec<PathBuf>, extension: &str) -> Self {
        SearchPath { dirs, extension: extension.to_string() }
    }

    pub fn dirs(&self) -> &[PathBuf] { &self.dirs }
}

impl ModuleResolver for SearchPath {
    fn find_module(&self, name: &str) -> Option<PathBuf> {
        let file = format!("{}.{}", name, self.extension);
        for dir in &self.dirs {
            for candidate in [dir.join(&file), dir.join("modules").join(&file)] {
                if candidate.is_file() {
                    debug!("module '{}' found at {}", name, candidate.display());
                    return Some(candidate);
                }
            }
        }
        None
    }
}

// ── Cache ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct ModuleCache {
    modules: HashMap<String, Rc<Node>>,
}

impl ModuleCache {
    pub fn get(&self, name: &str) -> Option<Rc<Node>> { self.modules.get(name).cloned() }

    pub fn contains(&self, name: &str) -> bool { self.modules.contains_key(name) }

    pub fn len(&self) -> usize { self.modules.len() }

    pub fn is_empty(&self) -> bool { self.modules.is_empty() }

    /// Loaded module names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.modules.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn insert(&mut self, name: &str, root: Rc<Node>) {
        self.modules.insert(name.to_string(), root);
    }
}

// ── Session ───────────────────────────────────────────────────────────────────

pub struct Session {
    stack: NamespaceStack,
    cache: ModuleCache,
    resolver: Box<dyn ModuleResolver>,
    // names currently being read, innermost last
    loading: Vec<String>,
}

impl Default for Session {
    fn default() -> Self { Session::new(SearchPath::default()) }
}

impl Session {
    pub fn new(resolver: impl ModuleResolver + 'static) -> Self {
        Session {
            stack: NamespaceStack::new(),
            cache: ModuleCache::default(),
            resolver: Box::new(resolver),
            loading: Vec::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self { Session::new(config.resolver()) }

    pub fn stack(&self) -> &NamespaceStack { &self.stack }

    pub fn stack_mut(&mut self) -> &mut NamespaceStack { &mut self.stack }

    pub fn cache(&self) -> &ModuleCache { &self.cache }

    /// Load a module by name, reading its file on the first request only.
    pub fn load_module(&mut self, name: &str) -> Result<Rc<Node>> {
        let Some(path) = self.resolver.find_module(name) else {
            error!("module '{}' not found", name);
            return Err(Error::ModuleNotFound(name.to_string()));
        };
        if let Some(root) = self.cache.get(name) {
            debug!("module '{}' served from cache", name);
            return Ok(root);
        }
        if self.loading.iter().any(|n| n == name) {
            error!("module '{}' imports itself (via {})", name, self.loading.join(" -> "));
            return Err(Error::CyclicImport(name.to_string()));
        }

        debug!("loading module '{}' from {}", name, path.display());
        self.loading.push(name.to_string());
        let root = self.read_isolated(&path);
        self.loading.pop();
        let root = root?;

        if !root.is_module() {
            error!("'{}' is not a module", path.display());
            return Err(Error::NotAModule(path.display().to_string()));
        }
        let root = Rc::new(root);
        self.cache.insert(name, root.clone());
        Ok(root)
    }

    /// Read a file with the stack tared, so its namespaces are numbered from
    /// zero whatever the caller has pushed.
    fn read_isolated(&mut self, path: &Path) -> Result<Node> {
        let depth = self.stack.depth();
        let tare = self.stack.tare();
        let result = file::read_file(self, path);
        let dropped = self.stack.unwind_to(depth);
        if dropped > 0 {
            warn!("{} namespace(s) left on the stack by {}", dropped, path.display());
        }
        self.stack.untare(tare);
        result
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Block, Import, StmtKind};
    use crate::symbols::{Category, Namespace, NamespaceKind};
    use crate::types::Type;
    use crate::value::Value;
    use std::fs;
    use tempfile::TempDir;

    fn module(name: &str, globals: &[&str]) -> Node {
        let ns = Namespace::new(name, NamespaceKind::Module);
        let mut statements = Vec::new();
        for (line, g) in globals.iter().enumerate() {
            let entry = ns.declare_global(g, Category::Variable, Type::Integer.rc());
            statements.push(Node::stmt(line as u32 + 1, StmtKind::Variable {
                entry,
                value: Box::new(Node::Const(Value::Integer(line as i64))),
            }));
        }
        Node::Block(Block { namespace: ns, statements })
    }

    fn save(dir: &Path, name: &str, root: &Node) {
        let mut stack = NamespaceStack::new();
        file::write_file(&mut stack, root, &dir.join(format!("{}.ybc", name))).unwrap();
    }

    fn session_in(dir: &TempDir) -> Session {
        Session::new(SearchPath::new(vec![dir.path().to_path_buf()], "ybc"))
    }

    #[test]
    fn test_search_path_probes_modules_subdir() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("modules")).unwrap();
        fs::write(dir.path().join("modules").join("Deep.ybc"), b"").unwrap();
        fs::write(dir.path().join("Flat.ybc"), b"").unwrap();
        let search = SearchPath::new(vec![dir.path().to_path_buf()], "ybc");
        assert_eq!(search.find_module("Flat"), Some(dir.path().join("Flat.ybc")));
        assert_eq!(search.find_module("Deep"), Some(dir.path().join("modules").join("Deep.ybc")));
        assert_eq!(search.find_module("Missing"), None);
    }

    #[test]
    fn test_cache_returns_same_instance() {
        let dir = TempDir::new().unwrap();
        save(dir.path(), "foo", &module("foo", &["a"]));
        save(dir.path(), "bar", &module("bar", &["b", "c"]));
        let mut session = session_in(&dir);

        let first = session.load_module("foo").unwrap();
        let second = session.load_module("foo").unwrap();
        assert!(Rc::ptr_eq(&first, &second));

        let bar = session.load_module("bar").unwrap();
        assert!(!Rc::ptr_eq(&first, &bar));
        assert!(Rc::ptr_eq(&session.cache().get("foo").unwrap(), &first));
        assert_eq!(session.cache().names(), vec!["bar", "foo"]);
        assert_eq!(session.stack().depth(), 0);
        assert_eq!(session.stack().floor(), 0);
    }

    #[test]
    fn test_cache_ignores_file_changes() {
        let dir = TempDir::new().unwrap();
        save(dir.path(), "foo", &module("foo", &["a"]));
        let mut session = session_in(&dir);
        let first = session.load_module("foo").unwrap();
        save(dir.path(), "foo", &module("foo", &["a", "b"]));
        let again = session.load_module("foo").unwrap();
        assert!(Rc::ptr_eq(&first, &again));
        assert_eq!(again.as_block().unwrap().namespace.symbol_count(), 1);
    }

    #[test]
    fn test_module_not_found() {
        let dir = TempDir::new().unwrap();
        let mut session = session_in(&dir);
        assert!(matches!(session.load_module("nope"), Err(Error::ModuleNotFound(n)) if n == "nope"));
        assert!(session.cache().is_empty());
    }

    #[test]
    fn test_script_is_not_a_module() {
        let dir = TempDir::new().unwrap();
        let script = Node::Block(Block { namespace: Namespace::new("", NamespaceKind::File), statements: vec![] });
        save(dir.path(), "script", &script);
        let mut session = session_in(&dir);
        assert!(matches!(session.load_module("script"), Err(Error::NotAModule(_))));
        assert!(!session.cache().contains("script"));
    }

    #[test]
    fn test_corrupt_file_fails_and_restores_stack() {
        let dir = TempDir::new().unwrap();
        save(dir.path(), "foo", &module("foo", &["a", "b"]));
        let path = dir.path().join("foo.ybc");
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() - 4]).unwrap();

        let mut session = session_in(&dir);
        let outer = Namespace::new("outer", NamespaceKind::File);
        session.stack_mut().push(&outer, false);
        assert!(matches!(session.load_module("foo"), Err(Error::StreamExhausted)));
        assert_eq!(session.stack().depth(), 1);
        assert_eq!(session.stack().floor(), 0);
        assert!(session.cache().is_empty());
    }

    #[test]
    fn test_closure_resolver() {
        let dir = TempDir::new().unwrap();
        save(dir.path(), "foo", &module("foo", &["a"]));
        let path = dir.path().join("foo.ybc");
        let mut session = Session::new(move |name: &str| (name == "Alias").then(|| path.clone()));
        assert!(session.load_module("Alias").unwrap().is_module());
    }

    /// Lib declares `f` and `n`; App imports Lib and assigns `n` to its own
    /// global. Reading App must load Lib and link the reference to Lib's entry.
    fn lib_and_app(dir: &Path) -> (Rc<Node>, Node) {
        let lib_ns = Namespace::new("Lib", NamespaceKind::Module);
        lib_ns.declare_global("f", Category::Function, Type::function(Type::Void, vec![]));
        let n = lib_ns.declare_global("n", Category::Variable, Type::Integer.rc());
        let lib = Rc::new(Node::Block(Block { namespace: lib_ns, statements: vec![] }));
        save(dir, "Lib", &lib);

        let app_ns = Namespace::new("App", NamespaceKind::Module);
        let own = app_ns.declare_global("copy", Category::Variable, Type::Integer.rc());
        let app = Node::Block(Block {
            namespace: app_ns,
            statements: vec![
                Node::stmt(1, StmtKind::Import(Import { name: "Lib".into(), module: lib.clone(), xrefs: vec![n.clone()] })),
                Node::stmt(2, StmtKind::Variable { entry: own, value: Box::new(Node::variable(&n)) }),
            ],
        });
        (lib, app)
    }

    #[test]
    fn test_import_links_across_modules() {
        let dir = TempDir::new().unwrap();
        let (_, app) = lib_and_app(dir.path());
        save(dir.path(), "App", &app);

        let mut session = session_in(&dir);
        let app = session.load_module("App").unwrap();
        let lib = session.cache().get("Lib").unwrap();
        let lib_n = lib.as_block().unwrap().namespace.find_symbol("n").unwrap();

        let statements = &app.as_block().unwrap().statements;
        let Node::Stmt(crate::ast::Stmt { kind: StmtKind::Import(import), .. }) = &statements[0] else {
            panic!("expected import");
        };
        assert!(Rc::ptr_eq(&import.module, &lib));
        let Node::Stmt(crate::ast::Stmt { kind: StmtKind::Variable { value, .. }, .. }) = &statements[1] else {
            panic!("expected variable definition");
        };
        assert!(matches!(value.as_ref(), Node::Variable(Some(e)) if Rc::ptr_eq(e, &lib_n)));
        assert_eq!(session.stack().depth(), 0);
        assert_eq!(lib.as_block().unwrap().namespace.xref_depth(), 0);
    }

    #[test]
    fn test_stale_import_is_broken() {
        let dir = TempDir::new().unwrap();
        let (_, app) = lib_and_app(dir.path());
        save(dir.path(), "App", &app);
        // Lib recompiled: n is now a string
        let lib_ns = Namespace::new("Lib", NamespaceKind::Module);
        lib_ns.declare_global("n", Category::Variable, Type::String.rc());
        save(dir.path(), "Lib", &Node::Block(Block { namespace: lib_ns, statements: vec![] }));

        let mut session = session_in(&dir);
        assert!(matches!(session.load_module("App"), Err(Error::BrokenReference(_))));
        assert!(session.cache().contains("Lib"));
        assert!(!session.cache().contains("App"));
    }

    #[test]
    fn test_cyclic_import_is_reported() {
        let dir = TempDir::new().unwrap();
        // a module "Loop" that imports itself
        let ns = Namespace::new("Loop", NamespaceKind::Module);
        let me = Rc::new(Node::Block(Block { namespace: ns.clone(), statements: vec![] }));
        let looping = Node::Block(Block {
            namespace: ns,
            statements: vec![Node::stmt(1, StmtKind::Import(Import { name: "Loop".into(), module: me, xrefs: vec![] }))],
        });
        save(dir.path(), "Loop", &looping);

        let mut session = session_in(&dir);
        assert!(matches!(session.load_module("Loop"), Err(Error::CyclicImport(n)) if n == "Loop"));
        assert!(session.cache().is_empty());
        assert_eq!(session.stack().depth(), 0);
    }
}
