// ═══════════════════════════════════════════════════════════
// Code tree: constants, expressions and statements
// ═══════════════════════════════════════════════════════════
//
// Every node is written as its kind byte followed by a kind-specific payload.
// The kind numbers are part of the file format and must never be reordered:
//
//   0          error            (never valid in a stream)
//   1 ..= 11   constants        payload is the bare value of that kind
//   12 ..= 15  entry constant, placeholder, locale, function
//   16 ..= 33  expressions
//   34         expression placeholder
//   35 ..= 53  statements       payload starts with the source line
//   54         statement placeholder
//
// ═══════════════════════════════════════════════════════════

use std::fmt;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::symbols::{Category, Namespace, SymbolEntry};
use crate::types::TypeRef;
use crate::value::{Value, ValueKind};

// ── Node kinds ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Kind {
    Error            = 0,
    ConstVoid        = 1,
    ConstBoolean     = 2,
    ConstInteger     = 3,
    ConstFloat       = 4,
    ConstString      = 5,
    ConstByteblock   = 6,
    ConstPath        = 7,
    ConstSymbol      = 8,
    ConstList        = 9,
    ConstMap         = 10,
    ConstTerm        = 11,
    ConstEntry       = 12,
    ConstPlaceholder = 13,
    Locale           = 14,
    Function         = 15,
    Propagate        = 16,
    Unary            = 17,
    Binary           = 18,
    Triple           = 19,
    Compare          = 20,
    LocaleExpr       = 21,
    List             = 22,
    Map              = 23,
    Term             = 24,
    Is               = 25,
    Bracket          = 26,
    Block            = 27,
    ReturnExpr       = 28,
    Variable         = 29,
    Builtin          = 30,
    Call             = 31,
    Reference        = 32,
    FunctionPointer  = 33,
    ExprPlaceholder  = 34,
    Typedef          = 35,
    VarDef           = 36,
    FunDef           = 37,
    Assign           = 38,
    BracketAssign    = 39,
    If               = 40,
    While            = 41,
    Do               = 42,
    Repeat           = 43,
    ExprStmt         = 44,
    Return           = 45,
    Break            = 46,
    Continue         = 47,
    Textdomain       = 48,
    Include          = 49,
    Filename         = 50,
    Import           = 51,
    BlockStmt        = 52,
    Switch           = 53,
    StmtPlaceholder  = 54,
}

/// Kinds below this share the constant decode path.
pub const CONSTANT_LIMIT: u8 = Kind::ConstPlaceholder as u8;

impl Kind {
    pub fn from_u8(tag: u8) -> Option<Self> {
        const TABLE: [Kind; 55] = [
            Kind::Error, Kind::ConstVoid, Kind::ConstBoolean, Kind::ConstInteger,
            Kind::ConstFloat, Kind::ConstString, Kind::ConstByteblock, Kind::ConstPath,
            Kind::ConstSymbol, Kind::ConstList, Kind::ConstMap, Kind::ConstTerm,
            Kind::ConstEntry, Kind::ConstPlaceholder, Kind::Locale, Kind::Function,
            Kind::Propagate, Kind::Unary, Kind::Binary, Kind::Triple, Kind::Compare,
            Kind::LocaleExpr, Kind::List, Kind::Map, Kind::Term, Kind::Is, Kind::Bracket,
            Kind::Block, Kind::ReturnExpr, Kind::Variable, Kind::Builtin, Kind::Call,
            Kind::Reference, Kind::FunctionPointer, Kind::ExprPlaceholder, Kind::Typedef,
            Kind::VarDef, Kind::FunDef, Kind::Assign, Kind::BracketAssign, Kind::If,
            Kind::While, Kind::Do, Kind::Repeat, Kind::ExprStmt, Kind::Return, Kind::Break,
            Kind::Continue, Kind::Textdomain, Kind::Include, Kind::Filename, Kind::Import,
            Kind::BlockStmt, Kind::Switch, Kind::StmtPlaceholder,
        ];
        TABLE.get(tag as usize).copied()
    }

    pub fn is_constant(self) -> bool { (self as u8) < CONSTANT_LIMIT }

    pub fn is_statement(self) -> bool {
        (Kind::Typedef as u8..Kind::StmtPlaceholder as u8).contains(&(self as u8))
    }

    /// The value kind a constant node of this kind carries.
    pub fn value_kind(self) -> Option<ValueKind> {
        Some(match self {
            Kind::ConstVoid      => ValueKind::Void,
            Kind::ConstBoolean   => ValueKind::Boolean,
            Kind::ConstInteger   => ValueKind::Integer,
            Kind::ConstFloat     => ValueKind::Float,
            Kind::ConstString    => ValueKind::String,
            Kind::ConstByteblock => ValueKind::Byteblock,
            Kind::ConstPath      => ValueKind::Path,
            Kind::ConstSymbol    => ValueKind::Symbol,
            Kind::ConstList      => ValueKind::List,
            Kind::ConstMap       => ValueKind::Map,
            Kind::ConstTerm      => ValueKind::Term,
            _                    => return None,
        })
    }

    /// Inverse of [`Kind::value_kind`]. Code values have no constant kind.
    pub fn for_value(kind: ValueKind) -> Kind {
        match kind {
            ValueKind::Void      => Kind::ConstVoid,
            ValueKind::Boolean   => Kind::ConstBoolean,
            ValueKind::Integer   => Kind::ConstInteger,
            ValueKind::Float     => Kind::ConstFloat,
            ValueKind::String    => Kind::ConstString,
            ValueKind::Byteblock => Kind::ConstByteblock,
            ValueKind::Path      => Kind::ConstPath,
            ValueKind::Symbol    => Kind::ConstSymbol,
            ValueKind::List      => Kind::ConstList,
            ValueKind::Map       => Kind::ConstMap,
            ValueKind::Term      => Kind::ConstTerm,
            ValueKind::Code      => Kind::ConstPlaceholder,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Kind::Error            => "error",
            Kind::ConstVoid        => "void constant",
            Kind::ConstBoolean     => "boolean constant",
            Kind::ConstInteger     => "integer constant",
            Kind::ConstFloat       => "float constant",
            Kind::ConstString      => "string constant",
            Kind::ConstByteblock   => "byteblock constant",
            Kind::ConstPath        => "path constant",
            Kind::ConstSymbol      => "symbol constant",
            Kind::ConstList        => "list constant",
            Kind::ConstMap         => "map constant",
            Kind::ConstTerm        => "term constant",
            Kind::ConstEntry       => "entry constant",
            Kind::ConstPlaceholder => "constant placeholder",
            Kind::Locale           => "locale",
            Kind::Function         => "function",
            Kind::Propagate        => "propagate",
            Kind::Unary            => "unary",
            Kind::Binary           => "binary",
            Kind::Triple           => "triple",
            Kind::Compare          => "compare",
            Kind::LocaleExpr       => "locale expression",
            Kind::List             => "list expression",
            Kind::Map              => "map expression",
            Kind::Term             => "term expression",
            Kind::Is               => "is",
            Kind::Bracket          => "bracket",
            Kind::Block            => "block",
            Kind::ReturnExpr       => "return expression",
            Kind::Variable         => "variable",
            Kind::Builtin          => "builtin",
            Kind::Call             => "function call",
            Kind::Reference        => "reference",
            Kind::FunctionPointer  => "function pointer",
            Kind::ExprPlaceholder  => "expression placeholder",
            Kind::Typedef          => "typedef",
            Kind::VarDef           => "variable definition",
            Kind::FunDef           => "function definition",
            Kind::Assign           => "assignment",
            Kind::BracketAssign    => "bracket assignment",
            Kind::If               => "if",
            Kind::While            => "while",
            Kind::Do               => "do",
            Kind::Repeat           => "repeat",
            Kind::ExprStmt         => "expression statement",
            Kind::Return           => "return",
            Kind::Break            => "break",
            Kind::Continue         => "continue",
            Kind::Textdomain       => "textdomain",
            Kind::Include          => "include",
            Kind::Filename         => "filename",
            Kind::Import           => "import",
            Kind::BlockStmt        => "block statement",
            Kind::Switch           => "switch",
            Kind::StmtPlaceholder  => "statement placeholder",
        };
        f.write_str(s)
    }
}

// ── Comparison operators ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Neq,
    Lt,
    Ge,
    Le,
    Gt,
}

impl CompareOp {
    pub fn to_u8(self) -> u8 {
        match self {
            CompareOp::Eq  => 0,
            CompareOp::Neq => 1,
            CompareOp::Lt  => 2,
            CompareOp::Ge  => 3,
            CompareOp::Le  => 4,
            CompareOp::Gt  => 5,
        }
    }

    pub fn from_u8(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => CompareOp::Eq,
            1 => CompareOp::Neq,
            2 => CompareOp::Lt,
            3 => CompareOp::Ge,
            4 => CompareOp::Le,
            5 => CompareOp::Gt,
            _ => return None,
        })
    }

    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq  => "==",
            CompareOp::Neq => "!=",
            CompareOp::Lt  => "<",
            CompareOp::Ge  => ">=",
            CompareOp::Le  => "<=",
            CompareOp::Gt  => ">",
        }
    }
}

// ── Tree ──────────────────────────────────────────────────────────────────────

/// A scope: the namespace holding its declarations, then its statements.
#[derive(Debug, Clone)]
pub struct Block {
    pub namespace: Rc<Namespace>,
    pub statements: Vec<Node>,
}

/// Parameters live in their own namespace; the body, if any, is a block
/// nested inside it.
#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub params: Rc<Namespace>,
    pub body: Option<Block>,
}

#[derive(Debug, Clone)]
pub struct Import {
    pub name: String,
    /// Root of the imported module, shared with the module cache.
    pub module: Rc<Node>,
    /// Entries of the module referenced by the importing tree, in slot order.
    pub xrefs: Vec<Rc<SymbolEntry>>,
}

#[derive(Debug, Clone)]
pub struct Switch {
    pub cond: Box<Node>,
    /// Case label and the index of the body statement it jumps to.
    pub cases: Vec<(Value, u32)>,
    pub default: Option<u32>,
    pub body: Block,
}

#[derive(Debug, Clone)]
pub enum Node {
    Const(Value),
    Locale { text: String, domain: String },
    Function(FunctionDef),

    Propagate { from: TypeRef, to: TypeRef, value: Box<Node> },
    Unary { op: String, arg: Box<Node> },
    Binary { op: String, lhs: Box<Node>, rhs: Box<Node> },
    Triple { cond: Box<Node>, then: Box<Node>, otherwise: Box<Node> },
    Compare { op: CompareOp, lhs: Box<Node>, rhs: Box<Node> },
    LocaleExpr { singular: String, plural: String, domain: String, count: Box<Node> },
    List(Vec<Node>),
    Map(Vec<(Node, Node)>),
    Term { name: String, args: Vec<Node> },
    Is { value: Box<Node>, ty: TypeRef },
    Bracket { value: Box<Node>, indices: Box<Node>, default: Box<Node> },
    Block(Block),
    Return(Box<Node>),
    /// `None` when the variable is an anonymous binder.
    Variable(Option<Rc<SymbolEntry>>),
    /// Binders are anonymous entries local to the call, e.g. the loop
    /// variables of `foreach`.
    Builtin { name: String, ty: TypeRef, binders: Vec<Rc<SymbolEntry>>, args: Vec<Node> },
    Call { entry: Rc<SymbolEntry>, args: Vec<Node> },
    Reference(Rc<SymbolEntry>),
    FunctionPointer { entry: Rc<SymbolEntry>, args: Vec<Node> },

    Stmt(Stmt),
}

#[derive(Debug, Clone)]
pub struct Stmt {
    pub line: u32,
    pub kind: StmtKind,
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    Typedef(Rc<SymbolEntry>),
    Variable { entry: Rc<SymbolEntry>, value: Box<Node> },
    Function { entry: Rc<SymbolEntry>, def: FunctionDef },
    Assign { entry: Rc<SymbolEntry>, value: Box<Node> },
    BracketAssign { entry: Rc<SymbolEntry>, indices: Box<Node>, value: Box<Node> },
    If { cond: Box<Node>, then: Option<Box<Node>>, otherwise: Option<Box<Node>> },
    While { cond: Box<Node>, body: Option<Box<Node>> },
    Do { body: Box<Node>, cond: Box<Node> },
    Repeat { body: Box<Node>, cond: Box<Node> },
    Expression(Box<Node>),
    Return(Option<Box<Node>>),
    Break,
    Continue,
    Textdomain(String),
    Include { filename: String, skipped: bool },
    Filename(String),
    Import(Import),
    Block(Block),
    Switch(Switch),
}

impl StmtKind {
    pub fn kind(&self) -> Kind {
        match self {
            StmtKind::Typedef(_)          => Kind::Typedef,
            StmtKind::Variable { .. }     => Kind::VarDef,
            StmtKind::Function { .. }     => Kind::FunDef,
            StmtKind::Assign { .. }       => Kind::Assign,
            StmtKind::BracketAssign { .. } => Kind::BracketAssign,
            StmtKind::If { .. }           => Kind::If,
            StmtKind::While { .. }        => Kind::While,
            StmtKind::Do { .. }           => Kind::Do,
            StmtKind::Repeat { .. }       => Kind::Repeat,
            StmtKind::Expression(_)       => Kind::ExprStmt,
            StmtKind::Return(_)           => Kind::Return,
            StmtKind::Break               => Kind::Break,
            StmtKind::Continue            => Kind::Continue,
            StmtKind::Textdomain(_)       => Kind::Textdomain,
            StmtKind::Include { .. }      => Kind::Include,
            StmtKind::Filename(_)         => Kind::Filename,
            StmtKind::Import(_)           => Kind::Import,
            StmtKind::Block(_)            => Kind::BlockStmt,
            StmtKind::Switch(_)           => Kind::Switch,
        }
    }
}

impl Node {
    pub fn kind(&self) -> Kind {
        match self {
            Node::Const(v)              => Kind::for_value(v.kind()),
            Node::Locale { .. }         => Kind::Locale,
            Node::Function(_)           => Kind::Function,
            Node::Propagate { .. }      => Kind::Propagate,
            Node::Unary { .. }          => Kind::Unary,
            Node::Binary { .. }         => Kind::Binary,
            Node::Triple { .. }         => Kind::Triple,
            Node::Compare { .. }        => Kind::Compare,
            Node::LocaleExpr { .. }     => Kind::LocaleExpr,
            Node::List(_)               => Kind::List,
            Node::Map(_)                => Kind::Map,
            Node::Term { .. }           => Kind::Term,
            Node::Is { .. }             => Kind::Is,
            Node::Bracket { .. }        => Kind::Bracket,
            Node::Block(_)              => Kind::Block,
            Node::Return(_)             => Kind::ReturnExpr,
            Node::Variable(_)           => Kind::Variable,
            Node::Builtin { .. }        => Kind::Builtin,
            Node::Call { .. }           => Kind::Call,
            Node::Reference(_)          => Kind::Reference,
            Node::FunctionPointer { .. } => Kind::FunctionPointer,
            Node::Stmt(s)               => s.kind.kind(),
        }
    }

    pub fn is_statement(&self) -> bool { matches!(self, Node::Stmt(_)) }

    /// True for a block whose namespace is a module, the only kind of root
    /// the loader accepts.
    pub fn is_module(&self) -> bool {
        matches!(self, Node::Block(b) if b.namespace.is_module())
    }

    pub fn as_block(&self) -> Option<&Block> {
        match self {
            Node::Block(b) => Some(b),
            _ => None,
        }
    }

    pub fn stmt(line: u32, kind: StmtKind) -> Node { Node::Stmt(Stmt { line, kind }) }

    pub fn binary(op: &str, lhs: Node, rhs: Node) -> Node {
        Node::Binary { op: op.to_string(), lhs: Box::new(lhs), rhs: Box::new(rhs) }
    }

    pub fn variable(entry: &Rc<SymbolEntry>) -> Node { Node::Variable(Some(entry.clone())) }

    /// Structural checks a freshly decoded node must pass before it is
    /// handed out. Children have been checked when they were built.
    pub fn validate(&self) -> Result<()> {
        let ok = match self {
            Node::Const(v)    => v.kind() != ValueKind::Code,
            Node::Block(b)    => b.statements.iter().all(Node::is_statement),
            Node::Function(d) => d.body.as_ref().map_or(true, |b| b.statements.iter().all(Node::is_statement)),
            Node::Call { entry, .. } => entry.category == Category::Function,
            Node::Stmt(s)     => s.kind.is_valid(),
            _                 => true,
        };
        if ok { Ok(()) } else { Err(Error::InvalidNode(self.kind())) }
    }
}

fn is_stmt(node: &Node) -> bool { node.is_statement() }

impl StmtKind {
    fn is_valid(&self) -> bool {
        match self {
            StmtKind::Typedef(entry)           => entry.category == Category::Typedef,
            StmtKind::Function { entry, def }  => {
                entry.category == Category::Function
                    && def.body.as_ref().map_or(true, |b| b.statements.iter().all(is_stmt))
            }
            StmtKind::If { then, otherwise, .. } => {
                then.as_deref().map_or(true, is_stmt) && otherwise.as_deref().map_or(true, is_stmt)
            }
            StmtKind::While { body, .. }       => body.as_deref().map_or(true, is_stmt),
            StmtKind::Do { body, .. }
            | StmtKind::Repeat { body, .. }    => is_stmt(body),
            StmtKind::Block(b)                 => b.statements.iter().all(is_stmt),
            StmtKind::Import(import)           => {
                match import.module.as_block() {
                    Some(root) if root.namespace.is_module() => {
                        import.xrefs.iter().all(|e| root.namespace.owns(e))
                    }
                    _ => false,
                }
            }
            StmtKind::Switch(sw)               => {
                let len = sw.body.statements.len() as u32;
                sw.body.statements.iter().all(is_stmt)
                    && sw.cases.iter().all(|(v, i)| *i <= len && v.kind() != ValueKind::Code)
                    && sw.default.map_or(true, |i| i <= len)
            }
            _ => true,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
