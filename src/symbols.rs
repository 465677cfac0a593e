// ═══════════════════════════════════════════════════════════
// Namespaces and symbol entries
// ═══════════════════════════════════════════════════════════
//
// A namespace owns the entries declared directly in it; an entry's position
// is its index in declaration order. Everything else (nodes, cross-reference
// tables of importers) holds shared handles and finds its way back to the
// owner through the entry's weak back-pointer.
//
// Cross-reference (xref) frames: while a namespace sits on the namespace
// stack as an import, the importer's references into it go through the top
// xref frame instead of the declaration array.
//
// ═══════════════════════════════════════════════════════════

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::types::TypeRef;

// ── Symbol categories ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Unspec,
    Global,
    Module,
    Variable,
    Reference,
    Function,
    Builtin,
    Typedef,
    Const,
    Namespace,
    SelfRef,
    Predefined,
    Filename,
}

impl Category {
    pub fn to_u8(self) -> u8 {
        match self {
            Category::Unspec     => 0,
            Category::Global     => 1,
            Category::Module     => 2,
            Category::Variable   => 3,
            Category::Reference  => 4,
            Category::Function   => 5,
            Category::Builtin    => 6,
            Category::Typedef    => 7,
            Category::Const      => 8,
            Category::Namespace  => 9,
            Category::SelfRef    => 10,
            Category::Predefined => 11,
            Category::Filename   => 12,
        }
    }

    pub fn from_u8(tag: u8) -> Option<Self> {
        Some(match tag {
            0  => Category::Unspec,
            1  => Category::Global,
            2  => Category::Module,
            3  => Category::Variable,
            4  => Category::Reference,
            5  => Category::Function,
            6  => Category::Builtin,
            7  => Category::Typedef,
            8  => Category::Const,
            9  => Category::Namespace,
            10 => Category::SelfRef,
            11 => Category::Predefined,
            12 => Category::Filename,
            _  => return None,
        })
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Category::Unspec     => "unspec",
            Category::Global     => "global",
            Category::Module     => "module",
            Category::Variable   => "variable",
            Category::Reference  => "reference",
            Category::Function   => "function",
            Category::Builtin    => "builtin",
            Category::Typedef    => "typedef",
            Category::Const      => "const",
            Category::Namespace  => "namespace",
            Category::SelfRef    => "self",
            Category::Predefined => "predefined",
            Category::Filename   => "filename",
        };
        f.write_str(s)
    }
}

// ── Namespace kinds ───────────────────────────────────────────────────────────

/// What a block is used as. Only `Module` roots can be loaded by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamespaceKind {
    Unknown,
    Module,
    File,
    Statement,
    Definition,
    Value,
    Namespace,
    Using,
}

impl NamespaceKind {
    pub fn to_u8(self) -> u8 {
        match self {
            NamespaceKind::Unknown    => 0,
            NamespaceKind::Module     => 1,
            NamespaceKind::File       => 2,
            NamespaceKind::Statement  => 3,
            NamespaceKind::Definition => 4,
            NamespaceKind::Value      => 5,
            NamespaceKind::Namespace  => 6,
            NamespaceKind::Using      => 7,
        }
    }

    pub fn from_u8(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => NamespaceKind::Unknown,
            1 => NamespaceKind::Module,
            2 => NamespaceKind::File,
            3 => NamespaceKind::Statement,
            4 => NamespaceKind::Definition,
            5 => NamespaceKind::Value,
            6 => NamespaceKind::Namespace,
            7 => NamespaceKind::Using,
            _ => return None,
        })
    }
}

// ── Symbol entries ────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct SymbolEntry {
    pub name: String,
    pub category: Category,
    pub ty: TypeRef,
    pub global: bool,
    position: u32,
    // None for anonymous binders (loop variables of builtins) that are never
    // written as positional references.
    owner: Option<Weak<Namespace>>,
}

impl SymbolEntry {
    /// An entry that belongs to no namespace. References to it are written
    /// with namespace id -1 and read back as "no entry".
    pub fn anonymous(name: &str, category: Category, ty: TypeRef) -> Rc<Self> {
        Rc::new(SymbolEntry {
            name: name.to_string(),
            category,
            ty,
            global: false,
            position: 0,
            owner: None,
        })
    }

    pub fn position(&self) -> u32 { self.position }

    pub fn is_anonymous(&self) -> bool { self.owner.is_none() }

    /// `None` for anonymous entries; `Some(None)` when the owner is gone.
    pub fn owner(&self) -> Option<Option<Rc<Namespace>>> {
        self.owner.as_ref().map(Weak::upgrade)
    }
}

impl fmt::Display for SymbolEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.global { write!(f, "global ")?; }
        write!(f, "{} {} {}", self.category, self.ty, self.name)
    }
}

// ── Namespaces ────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct Namespace {
    pub name: String,
    pub kind: NamespaceKind,
    symbols: RefCell<Vec<Rc<SymbolEntry>>>,
    xrefs: RefCell<Vec<Vec<Rc<SymbolEntry>>>>,
}

impl Namespace {
    pub fn new(name: &str, kind: NamespaceKind) -> Rc<Self> {
        Rc::new(Namespace {
            name: name.to_string(),
            kind,
            symbols: RefCell::new(Vec::new()),
            xrefs: RefCell::new(Vec::new()),
        })
    }

    pub fn is_module(&self) -> bool { self.kind == NamespaceKind::Module }

    /// Append a declaration; its position is the current symbol count.
    pub fn declare(self: &Rc<Self>, name: &str, category: Category, ty: TypeRef) -> Rc<SymbolEntry> {
        self.declare_with(name, category, ty, false)
    }

    pub fn declare_global(self: &Rc<Self>, name: &str, category: Category, ty: TypeRef) -> Rc<SymbolEntry> {
        self.declare_with(name, category, ty, true)
    }

    fn declare_with(self: &Rc<Self>, name: &str, category: Category, ty: TypeRef, global: bool) -> Rc<SymbolEntry> {
        let mut symbols = self.symbols.borrow_mut();
        let entry = Rc::new(SymbolEntry {
            name: name.to_string(),
            category,
            ty,
            global,
            position: symbols.len() as u32,
            owner: Some(Rc::downgrade(self)),
        });
        symbols.push(entry.clone());
        entry
    }

    pub fn symbol_count(&self) -> usize { self.symbols.borrow().len() }

    pub fn symbol_entry(&self, position: usize) -> Option<Rc<SymbolEntry>> {
        self.symbols.borrow().get(position).cloned()
    }

    pub fn symbols(&self) -> Vec<Rc<SymbolEntry>> {
        self.symbols.borrow().clone()
    }

    pub fn find_symbol(&self, name: &str) -> Option<Rc<SymbolEntry>> {
        self.symbols.borrow().iter().find(|e| e.name == name).cloned()
    }

    pub fn owns(self: &Rc<Self>, entry: &SymbolEntry) -> bool {
        matches!(&entry.owner, Some(w) if w.ptr_eq(&Rc::downgrade(self)))
    }

    // ── Cross references ──────────────────────────────────────────────────

    pub fn open_xrefs(&self) {
        self.xrefs.borrow_mut().push(Vec::new());
    }

    pub fn close_xrefs(&self) {
        self.xrefs.borrow_mut().pop();
    }

    pub fn xref_depth(&self) -> usize { self.xrefs.borrow().len() }

    /// Record a reference in the open frame and return its slot, reusing the
    /// slot if the entry is already there. `None` if no frame is open.
    pub fn add_xref(&self, entry: &Rc<SymbolEntry>) -> Option<usize> {
        let mut frames = self.xrefs.borrow_mut();
        let frame = frames.last_mut()?;
        if let Some(slot) = frame.iter().position(|e| Rc::ptr_eq(e, entry)) {
            return Some(slot);
        }
        frame.push(entry.clone());
        Some(frame.len() - 1)
    }

    pub fn xref(&self, slot: usize) -> Option<Rc<SymbolEntry>> {
        self.xrefs.borrow().last()?.get(slot).cloned()
    }

    pub fn xref_slot(&self, entry: &Rc<SymbolEntry>) -> Option<usize> {
        self.xrefs.borrow().last()?.iter().position(|e| Rc::ptr_eq(e, entry))
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Type;

    #[test]
    fn test_positions_follow_declaration_order() {
        let ns = Namespace::new("M", NamespaceKind::Module);
        let a = ns.declare("a", Category::Variable, Type::Integer.rc());
        let b = ns.declare_global("b", Category::Function, Type::function(Type::Void, vec![]));
        assert_eq!(a.position(), 0);
        assert_eq!(b.position(), 1);
        assert!(b.global);
        assert_eq!(ns.symbol_count(), 2);
        assert!(Rc::ptr_eq(&ns.symbol_entry(1).unwrap(), &b));
        assert!(ns.symbol_entry(2).is_none());
        assert!(Rc::ptr_eq(&ns.find_symbol("a").unwrap(), &a));
    }

    #[test]
    fn test_owner_backpointer() {
        let ns = Namespace::new("M", NamespaceKind::Module);
        let other = Namespace::new("N", NamespaceKind::Module);
        let a = ns.declare("a", Category::Variable, Type::Integer.rc());
        assert!(ns.owns(&a));
        assert!(!other.owns(&a));
        assert!(Rc::ptr_eq(&a.owner().unwrap().unwrap(), &ns));

        let loose = SymbolEntry::anonymous("v", Category::Variable, Type::Any.rc());
        assert!(loose.is_anonymous());
        assert!(loose.owner().is_none());
    }

    #[test]
    fn test_dropped_owner_is_visible() {
        let a = {
            let ns = Namespace::new("gone", NamespaceKind::Module);
            ns.declare("a", Category::Variable, Type::Integer.rc())
        };
        assert!(matches!(a.owner(), Some(None)));
    }

    #[test]
    fn test_xref_frames_nest() {
        let ns = Namespace::new("Lib", NamespaceKind::Module);
        let f = ns.declare("f", Category::Function, Type::function(Type::Void, vec![]));
        let g = ns.declare("g", Category::Variable, Type::Integer.rc());

        assert_eq!(ns.add_xref(&f), None);
        ns.open_xrefs();
        assert_eq!(ns.add_xref(&g), Some(0));
        assert_eq!(ns.add_xref(&f), Some(1));
        assert_eq!(ns.add_xref(&g), Some(0));

        ns.open_xrefs();
        assert!(ns.xref(0).is_none());
        assert_eq!(ns.add_xref(&f), Some(0));
        ns.close_xrefs();

        assert!(Rc::ptr_eq(&ns.xref(1).unwrap(), &f));
        assert_eq!(ns.xref_slot(&g), Some(0));
        ns.close_xrefs();
        assert_eq!(ns.xref_depth(), 0);
    }
}
