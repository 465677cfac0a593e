// ═══════════════════════════════════════════════════════════
// Node codec: the code tree to and from bytes
// ═══════════════════════════════════════════════════════════
//
// Payloads by node family:
//
//   constant        value payload (no value kind byte)
//   locale          [string text] [string domain]
//   function        namespace [bool has_body] block?
//   expression      operands in field order, nodes written recursively
//   node list       [int32 count] node*
//   entry ref       [int32 namespace id] [int32 position]
//   statement       [int32 line] payload
//
// A block is its namespace followed by its statement list:
//
//   namespace       [u8 kind] [string name] [int32 count] symbol*
//   symbol          [string name] [u8 category] [bool global] type
//   block           namespace [int32 count] statement*
//
// While a block's statements are written or read its namespace is on the
// namespace stack; entry references inside it are positions relative to the
// stack. Imports push the imported module with a cross-reference frame and
// stay pushed until the enclosing block ends.
//
//   import          [string name] [int32 count] ([string symbol] type)*
//
// ═══════════════════════════════════════════════════════════

use std::rc::Rc;

use tracing::{debug, error};

use crate::ast::{Block, CompareOp, FunctionDef, Import, Kind, Node, Stmt, StmtKind, Switch};
use crate::error::{Error, Result};
use crate::loader::Session;
use crate::stack::NamespaceStack;
use crate::stream::{Decoder, Encoder};
use crate::symbols::{Category, Namespace, NamespaceKind, SymbolEntry};

// ── Writer ────────────────────────────────────────────────────────────────────

pub struct CodeWriter<'s> {
    enc: Encoder,
    stack: &'s mut NamespaceStack,
}

impl<'s> CodeWriter<'s> {
    pub fn new(stack: &'s mut NamespaceStack) -> Self {
        CodeWriter::with_encoder(Encoder::new(), stack)
    }

    /// Continue writing after whatever `enc` already holds (the file header).
    pub fn with_encoder(enc: Encoder, stack: &'s mut NamespaceStack) -> Self {
        CodeWriter { enc, stack }
    }

    pub fn encoder(&mut self) -> &mut Encoder { &mut self.enc }

    pub(crate) fn stack(&self) -> &NamespaceStack { &*self.stack }

    pub fn finish(self) -> Vec<u8> { self.enc.finish() }

    pub fn write_code(&mut self, node: &Node) -> Result<()> {
        node.validate()?;
        self.enc.write_u8(node.kind() as u8);
        match node {
            Node::Const(v)                => self.write_value_payload(v)?,
            Node::Locale { text, domain } => {
                self.enc.write_string(text);
                self.enc.write_string(domain);
            }
            Node::Function(def)           => self.write_function(def)?,
            Node::Propagate { from, to, value } => {
                self.enc.write_type(from);
                self.enc.write_type(to);
                self.write_code(value)?;
            }
            Node::Unary { op, arg }       => {
                self.enc.write_string(op);
                self.write_code(arg)?;
            }
            Node::Binary { op, lhs, rhs } => {
                self.enc.write_string(op);
                self.write_code(lhs)?;
                self.write_code(rhs)?;
            }
            Node::Triple { cond, then, otherwise } => {
                self.write_code(cond)?;
                self.write_code(then)?;
                self.write_code(otherwise)?;
            }
            Node::Compare { op, lhs, rhs } => {
                self.enc.write_u8(op.to_u8());
                self.write_code(lhs)?;
                self.write_code(rhs)?;
            }
            Node::LocaleExpr { singular, plural, domain, count } => {
                self.enc.write_string(singular);
                self.enc.write_string(plural);
                self.enc.write_string(domain);
                self.write_code(count)?;
            }
            Node::List(items)             => self.write_code_list(items)?,
            Node::Map(pairs)              => {
                self.enc.write_int32(pairs.len() as u32);
                for (k, v) in pairs {
                    self.write_code(k)?;
                    self.write_code(v)?;
                }
            }
            Node::Term { name, args }     => {
                self.enc.write_string(name);
                self.write_code_list(args)?;
            }
            Node::Is { value, ty }        => {
                self.write_code(value)?;
                self.enc.write_type(ty);
            }
            Node::Bracket { value, indices, default } => {
                self.write_code(value)?;
                self.write_code(indices)?;
                self.write_code(default)?;
            }
            Node::Block(block)            => self.write_block(block)?,
            Node::Return(value)           => self.write_code(value)?,
            Node::Variable(entry)         => self.write_entry(entry.as_ref())?,
            Node::Builtin { name, ty, binders, args } => {
                self.enc.write_string(name);
                self.enc.write_type(ty);
                self.enc.write_int32(binders.len() as u32);
                for b in binders {
                    self.enc.write_string(&b.name);
                    self.enc.write_type(&b.ty);
                }
                self.write_code_list(args)?;
            }
            Node::Call { entry, args }
            | Node::FunctionPointer { entry, args } => {
                self.write_required_entry(node.kind(), entry)?;
                self.write_code_list(args)?;
            }
            Node::Reference(entry)        => self.write_required_entry(Kind::Reference, entry)?,
            Node::Stmt(stmt)              => self.write_stmt(stmt)?,
        }
        Ok(())
    }

    pub fn write_code_list(&mut self, nodes: &[Node]) -> Result<()> {
        self.enc.write_int32(nodes.len() as u32);
        for node in nodes {
            self.write_code(node)?;
        }
        Ok(())
    }

    fn write_opt_code(&mut self, node: Option<&Node>) -> Result<()> {
        self.enc.write_bool(node.is_some());
        match node {
            Some(node) => self.write_code(node),
            None => Ok(()),
        }
    }

    fn write_namespace(&mut self, ns: &Namespace) {
        self.enc.write_u8(ns.kind.to_u8());
        self.enc.write_string(&ns.name);
        let symbols = ns.symbols();
        self.enc.write_int32(symbols.len() as u32);
        for entry in &symbols {
            self.enc.write_string(&entry.name);
            self.enc.write_u8(entry.category.to_u8());
            self.enc.write_bool(entry.global);
            self.enc.write_type(&entry.ty);
        }
    }

    fn write_block(&mut self, block: &Block) -> Result<()> {
        self.write_namespace(&block.namespace);
        self.stack.push(&block.namespace, false);
        let result = self.write_code_list(&block.statements);
        result.and(self.stack.pop_up_to(&block.namespace))
    }

    fn write_function(&mut self, def: &FunctionDef) -> Result<()> {
        self.write_namespace(&def.params);
        self.stack.push(&def.params, false);
        self.enc.write_bool(def.body.is_some());
        let result = match &def.body {
            Some(body) => self.write_block(body),
            None => Ok(()),
        };
        result.and(self.stack.pop_up_to(&def.params))
    }

    fn write_import(&mut self, import: &Import) -> Result<()> {
        let Some(root) = import.module.as_block() else {
            return Err(Error::InvalidNode(Kind::Import));
        };
        self.enc.write_string(&import.name);
        self.enc.write_int32(import.xrefs.len() as u32);
        for entry in &import.xrefs {
            self.enc.write_string(&entry.name);
            self.enc.write_type(&entry.ty);
        }
        self.stack.push(&root.namespace, true);
        for entry in &import.xrefs {
            root.namespace.add_xref(entry);
        }
        Ok(())
    }

    fn write_switch(&mut self, sw: &Switch) -> Result<()> {
        self.write_code(&sw.cond)?;
        self.enc.write_int32(sw.cases.len() as u32);
        for (label, index) in &sw.cases {
            self.write_value(label)?;
            self.enc.write_int32(*index);
        }
        self.enc.write_bool(sw.default.is_some());
        if let Some(index) = sw.default {
            self.enc.write_int32(index);
        }
        self.write_block(&sw.body)
    }

    fn write_stmt(&mut self, stmt: &Stmt) -> Result<()> {
        self.enc.write_int32(stmt.line);
        match &stmt.kind {
            StmtKind::Typedef(entry)        => self.write_required_entry(Kind::Typedef, entry)?,
            StmtKind::Variable { entry, value }
            | StmtKind::Assign { entry, value } => {
                self.write_required_entry(stmt.kind.kind(), entry)?;
                self.write_code(value)?;
            }
            StmtKind::Function { entry, def } => {
                self.write_required_entry(Kind::FunDef, entry)?;
                self.write_function(def)?;
            }
            StmtKind::BracketAssign { entry, indices, value } => {
                self.write_required_entry(Kind::BracketAssign, entry)?;
                self.write_code(indices)?;
                self.write_code(value)?;
            }
            StmtKind::If { cond, then, otherwise } => {
                self.write_code(cond)?;
                self.write_opt_code(then.as_deref())?;
                self.write_opt_code(otherwise.as_deref())?;
            }
            StmtKind::While { cond, body }  => {
                self.write_code(cond)?;
                self.write_opt_code(body.as_deref())?;
            }
            StmtKind::Do { body, cond }
            | StmtKind::Repeat { body, cond } => {
                self.write_code(body)?;
                self.write_code(cond)?;
            }
            StmtKind::Expression(expr)      => self.write_code(expr)?,
            StmtKind::Return(value)         => self.write_opt_code(value.as_deref())?,
            StmtKind::Break
            | StmtKind::Continue            => {}
            StmtKind::Textdomain(text)
            | StmtKind::Filename(text)      => self.enc.write_string(text),
            StmtKind::Include { filename, skipped } => {
                self.enc.write_string(filename);
                self.enc.write_bool(*skipped);
            }
            StmtKind::Import(import)        => self.write_import(import)?,
            StmtKind::Block(block)          => self.write_block(block)?,
            StmtKind::Switch(sw)            => self.write_switch(sw)?,
        }
        Ok(())
    }
}

// ── Reader ────────────────────────────────────────────────────────────────────

pub struct CodeReader<'a, 's> {
    dec: Decoder<'a>,
    session: &'s mut Session,
}

impl<'a, 's> CodeReader<'a, 's> {
    pub fn new(data: &'a [u8], session: &'s mut Session) -> Self {
        CodeReader::from_decoder(Decoder::new(data), session)
    }

    /// Continue reading where `dec` stopped (after the file header).
    pub fn from_decoder(dec: Decoder<'a>, session: &'s mut Session) -> Self {
        CodeReader { dec, session }
    }

    pub fn decoder(&mut self) -> &mut Decoder<'a> { &mut self.dec }

    pub(crate) fn session(&mut self) -> &mut Session { &mut *self.session }

    pub fn take_deferred(&mut self) -> Option<Error> { self.dec.take_deferred() }

    /// Read `[int32 count]` items. The first failing item fails the whole
    /// sequence and the items read so far are dropped.
    pub fn read_many<T>(&mut self, mut f: impl FnMut(&mut Self) -> Result<T>) -> Result<Vec<T>> {
        let count = self.dec.read_int32()? as usize;
        let mut items = Vec::with_capacity(count.min(self.dec.remaining()));
        for i in 0..count {
            match f(self) {
                Ok(item) => items.push(item),
                Err(err) => {
                    debug!("sequence read failed at item {} of {}: {}", i, count, err);
                    return Err(err);
                }
            }
        }
        Ok(items)
    }

    pub fn read_code_list(&mut self) -> Result<Vec<Node>> {
        self.read_many(|r| r.read_code())
    }

    pub fn read_code(&mut self) -> Result<Node> {
        let offset = self.dec.position();
        let tag = self.dec.read_u8()?;
        let Some(kind) = Kind::from_u8(tag) else {
            error!("unknown code kind {} at offset {}", tag, offset);
            return Err(Error::UnknownKind { what: "code", tag });
        };
        let node = match kind {
            _ if kind.is_constant()  => self.read_constant(kind)?,
            Kind::Locale             => Node::Locale { text: self.read_text()?, domain: self.read_text()? },
            Kind::Function           => Node::Function(self.read_function()?),
            Kind::Propagate          => Node::Propagate {
                from: self.dec.read_type()?,
                to: self.dec.read_type()?,
                value: self.read_boxed()?,
            },
            Kind::Unary              => Node::Unary { op: self.read_text()?, arg: self.read_boxed()? },
            Kind::Binary             => Node::Binary {
                op: self.read_text()?,
                lhs: self.read_boxed()?,
                rhs: self.read_boxed()?,
            },
            Kind::Triple             => Node::Triple {
                cond: self.read_boxed()?,
                then: self.read_boxed()?,
                otherwise: self.read_boxed()?,
            },
            Kind::Compare            => {
                let tag = self.dec.read_u8()?;
                let op = CompareOp::from_u8(tag).ok_or_else(|| {
                    error!("unknown compare operator {}", tag);
                    Error::UnknownKind { what: "compare operator", tag }
                })?;
                Node::Compare { op, lhs: self.read_boxed()?, rhs: self.read_boxed()? }
            }
            Kind::LocaleExpr         => Node::LocaleExpr {
                singular: self.read_text()?,
                plural: self.read_text()?,
                domain: self.read_text()?,
                count: self.read_boxed()?,
            },
            Kind::List               => Node::List(self.read_code_list()?),
            Kind::Map                => Node::Map(self.read_many(|r| {
                let k = r.read_code()?;
                let v = r.read_code()?;
                Ok((k, v))
            })?),
            Kind::Term               => Node::Term { name: self.read_text()?, args: self.read_code_list()? },
            Kind::Is                 => Node::Is { value: self.read_boxed()?, ty: self.dec.read_type()? },
            Kind::Bracket            => Node::Bracket {
                value: self.read_boxed()?,
                indices: self.read_boxed()?,
                default: self.read_boxed()?,
            },
            Kind::Block              => Node::Block(self.read_block()?),
            Kind::ReturnExpr         => Node::Return(self.read_boxed()?),
            Kind::Variable           => Node::Variable(self.read_entry()?),
            Kind::Builtin            => {
                let name = self.read_text()?;
                let ty = self.dec.read_type()?;
                let binders = self.read_many(|r| {
                    let name = r.read_text()?;
                    let ty = r.dec.read_type()?;
                    Ok(SymbolEntry::anonymous(&name, Category::Variable, ty))
                })?;
                Node::Builtin { name, ty, binders, args: self.read_code_list()? }
            }
            Kind::Call               => Node::Call { entry: self.require_entry(kind)?, args: self.read_code_list()? },
            Kind::Reference          => Node::Reference(self.require_entry(kind)?),
            Kind::FunctionPointer    => Node::FunctionPointer {
                entry: self.require_entry(kind)?,
                args: self.read_code_list()?,
            },
            Kind::Typedef
            | Kind::VarDef
            | Kind::FunDef
            | Kind::Assign
            | Kind::BracketAssign
            | Kind::If
            | Kind::While
            | Kind::Do
            | Kind::Repeat
            | Kind::ExprStmt
            | Kind::Return
            | Kind::Break
            | Kind::Continue
            | Kind::Textdomain
            | Kind::Include
            | Kind::Filename
            | Kind::Import
            | Kind::BlockStmt
            | Kind::Switch           => Node::Stmt(self.read_stmt(kind)?),
            // placeholders
            _                        => {
                error!("{} in bytecode, check the compilation of the module", kind);
                return Err(Error::Placeholder(kind));
            }
        };
        if let Err(err) = node.validate() {
            error!("invalid {} node read at offset {}", kind, offset);
            return Err(err);
        }
        Ok(node)
    }

    fn read_constant(&mut self, kind: Kind) -> Result<Node> {
        match kind.value_kind() {
            Some(value_kind) => Ok(Node::Const(self.read_value_payload(value_kind)?)),
            None => {
                error!("{} in bytecode, check the compilation of the module", kind);
                Err(Error::Placeholder(kind))
            }
        }
    }

    fn read_text(&mut self) -> Result<String> {
        Ok(self.dec.read_string()?.unwrap_or_default())
    }

    fn read_boxed(&mut self) -> Result<Box<Node>> {
        Ok(Box::new(self.read_code()?))
    }

    fn read_opt_code(&mut self) -> Result<Option<Box<Node>>> {
        if self.dec.read_bool()? { Ok(Some(self.read_boxed()?)) } else { Ok(None) }
    }

    fn require_entry(&mut self, kind: Kind) -> Result<Rc<SymbolEntry>> {
        self.read_entry()?.ok_or_else(|| {
            error!("{} without symbol entry", kind);
            Error::InvalidNode(kind)
        })
    }

    fn read_namespace(&mut self) -> Result<Rc<Namespace>> {
        let tag = self.dec.read_u8()?;
        let kind = NamespaceKind::from_u8(tag).ok_or_else(|| {
            error!("unknown namespace kind {}", tag);
            Error::UnknownKind { what: "namespace kind", tag }
        })?;
        let name = self.read_text()?;
        let namespace = Namespace::new(&name, kind);
        let count = self.dec.read_int32()?;
        for _ in 0..count {
            let name = self.read_text()?;
            let tag = self.dec.read_u8()?;
            let category = Category::from_u8(tag).ok_or_else(|| {
                error!("unknown symbol category {} in '{}'", tag, namespace.name);
                Error::UnknownKind { what: "symbol category", tag }
            })?;
            let global = self.dec.read_bool()?;
            let ty = self.dec.read_type()?;
            if global {
                namespace.declare_global(&name, category, ty);
            } else {
                namespace.declare(&name, category, ty);
            }
        }
        Ok(namespace)
    }

    fn read_block(&mut self) -> Result<Block> {
        let namespace = self.read_namespace()?;
        self.session.stack_mut().push(&namespace, false);
        let statements = self.read_code_list();
        let popped = self.session.stack_mut().pop_up_to(&namespace);
        let statements = statements?;
        popped?;
        Ok(Block { namespace, statements })
    }

    fn read_function(&mut self) -> Result<FunctionDef> {
        let params = self.read_namespace()?;
        self.session.stack_mut().push(&params, false);
        let body = match self.dec.read_bool() {
            Ok(true) => self.read_block().map(Some),
            Ok(false) => Ok(None),
            Err(err) => Err(err),
        };
        let popped = self.session.stack_mut().pop_up_to(&params);
        let body = body?;
        popped?;
        Ok(FunctionDef { params, body })
    }

    fn read_import(&mut self) -> Result<Import> {
        let name = self.read_text()?;
        let wanted = self.read_many(|r| {
            let symbol = r.read_text()?;
            let ty = r.dec.read_type()?;
            Ok((symbol, ty))
        })?;
        let module = self.session.load_module(&name)?;
        let namespace = match module.as_block() {
            Some(root) => root.namespace.clone(),
            None => return Err(Error::NotAModule(name)),
        };
        self.session.stack_mut().push(&namespace, true);
        let mut xrefs = Vec::with_capacity(wanted.len());
        for (symbol, ty) in wanted {
            let entry = namespace
                .find_symbol(&symbol)
                .filter(|e| *e.ty == *ty)
                .ok_or_else(|| {
                    error!("import of '{}': no symbol '{}' of type {}", name, symbol, ty);
                    Error::BrokenReference(format!("'{}::{}' is missing or changed its type", name, symbol))
                })?;
            namespace.add_xref(&entry);
            xrefs.push(entry);
        }
        debug!("imported '{}' with {} cross references", name, xrefs.len());
        Ok(Import { name, module, xrefs })
    }

    fn read_switch(&mut self) -> Result<Switch> {
        let cond = self.read_boxed()?;
        let cases = self.read_many(|r| {
            let label = r.read_value()?;
            let index = r.dec.read_int32()?;
            Ok((label, index))
        })?;
        let default = if self.dec.read_bool()? { Some(self.dec.read_int32()?) } else { None };
        let body = self.read_block()?;
        Ok(Switch { cond, cases, default, body })
    }

    fn read_stmt(&mut self, kind: Kind) -> Result<Stmt> {
        let line = self.dec.read_int32()?;
        let stmt = match kind {
            Kind::Typedef       => StmtKind::Typedef(self.require_entry(kind)?),
            Kind::VarDef        => StmtKind::Variable { entry: self.require_entry(kind)?, value: self.read_boxed()? },
            Kind::FunDef        => StmtKind::Function { entry: self.require_entry(kind)?, def: self.read_function()? },
            Kind::Assign        => StmtKind::Assign { entry: self.require_entry(kind)?, value: self.read_boxed()? },
            Kind::BracketAssign => StmtKind::BracketAssign {
                entry: self.require_entry(kind)?,
                indices: self.read_boxed()?,
                value: self.read_boxed()?,
            },
            Kind::If            => StmtKind::If {
                cond: self.read_boxed()?,
                then: self.read_opt_code()?,
                otherwise: self.read_opt_code()?,
            },
            Kind::While         => StmtKind::While { cond: self.read_boxed()?, body: self.read_opt_code()? },
            Kind::Do            => StmtKind::Do { body: self.read_boxed()?, cond: self.read_boxed()? },
            Kind::Repeat        => StmtKind::Repeat { body: self.read_boxed()?, cond: self.read_boxed()? },
            Kind::ExprStmt      => StmtKind::Expression(self.read_boxed()?),
            Kind::Return        => StmtKind::Return(self.read_opt_code()?),
            Kind::Break         => StmtKind::Break,
            Kind::Continue      => StmtKind::Continue,
            Kind::Textdomain    => StmtKind::Textdomain(self.read_text()?),
            Kind::Include       => StmtKind::Include { filename: self.read_text()?, skipped: self.dec.read_bool()? },
            Kind::Filename      => StmtKind::Filename(self.read_text()?),
            Kind::Import        => StmtKind::Import(self.read_import()?),
            Kind::BlockStmt     => StmtKind::Block(self.read_block()?),
            Kind::Switch        => StmtKind::Switch(self.read_switch()?),
            other               => {
                error!("{} is not a statement kind", other);
                return Err(Error::UnknownKind { what: "statement", tag: other as u8 });
            }
        };
        Ok(Stmt { line, kind: stmt })
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dump::dump;
    use crate::types::Type;
    use crate::value::Value;

    fn encode(node: &Node) -> Vec<u8> {
        let mut stack = NamespaceStack::new();
        let mut w = CodeWriter::new(&mut stack);
        w.write_code(node).unwrap();
        assert_eq!(w.stack().depth(), 0);
        w.finish()
    }

    fn decode(bytes: &[u8]) -> (Result<Node>, Session) {
        let mut session = Session::default();
        let node = CodeReader::new(bytes, &mut session).read_code();
        (node, session)
    }

    fn int(n: i64) -> Node { Node::Const(Value::Integer(n)) }

    fn boxed(node: Node) -> Box<Node> { Box::new(node) }

    fn stmt_block(statements: Vec<Node>) -> Block {
        Block { namespace: Namespace::new("", NamespaceKind::Statement), statements }
    }

    /// A module touching every node kind that needs no import.
    fn sample_module() -> Node {
        let ns = Namespace::new("Sample", NamespaceKind::Module);
        let x = ns.declare_global("x", Category::Variable, Type::Integer.rc());
        let t = ns.declare("size_t", Category::Typedef, Type::Integer.rc());
        let f = ns.declare_global("f", Category::Function, Type::function(Type::Integer, vec![Type::Integer]));
        let m = ns.declare("m", Category::Variable, Type::map(Type::String, Type::Any));

        let params = Namespace::new("f", NamespaceKind::Definition);
        let a = params.declare("a", Category::Variable, Type::Integer.rc());
        let body = stmt_block(vec![Node::stmt(4, StmtKind::Return(Some(boxed(Node::binary(
            "*",
            Node::variable(&a),
            Node::variable(&x),
        )))))]);

        let loop_var = SymbolEntry::anonymous("e", Category::Variable, Type::Any.rc());
        let statements = vec![
            Node::stmt(1, StmtKind::Typedef(t)),
            Node::stmt(2, StmtKind::Variable { entry: x.clone(), value: boxed(int(1)) }),
            Node::stmt(3, StmtKind::Function {
                entry: f.clone(),
                def: FunctionDef { params, body: Some(body) },
            }),
            Node::stmt(5, StmtKind::Variable {
                entry: m.clone(),
                value: boxed(Node::Map(vec![
                    (Node::Const(Value::string("k")), Node::Locale { text: "Yes".into(), domain: "base".into() }),
                    (Node::Const(Value::string("l")), Node::LocaleExpr {
                        singular: "file".into(),
                        plural: "files".into(),
                        domain: "base".into(),
                        count: boxed(Node::variable(&x)),
                    }),
                ])),
            }),
            Node::stmt(6, StmtKind::Assign {
                entry: x.clone(),
                value: boxed(Node::Triple {
                    cond: boxed(Node::Compare { op: CompareOp::Ge, lhs: boxed(Node::variable(&x)), rhs: boxed(int(3)) }),
                    then: boxed(Node::Call { entry: f.clone(), args: vec![Node::variable(&x)] }),
                    otherwise: boxed(Node::Unary { op: "-".into(), arg: boxed(int(2)) }),
                }),
            }),
            Node::stmt(7, StmtKind::BracketAssign {
                entry: m.clone(),
                indices: boxed(Node::List(vec![Node::Const(Value::string("k"))])),
                value: boxed(Node::Propagate {
                    from: Type::Integer.rc(),
                    to: Type::Any.rc(),
                    value: boxed(Node::variable(&x)),
                }),
            }),
            Node::stmt(8, StmtKind::If {
                cond: boxed(Node::Is { value: boxed(Node::variable(&m)), ty: Type::map(Type::String, Type::Any) }),
                then: Some(boxed(Node::stmt(9, StmtKind::Expression(boxed(Node::Builtin {
                    name: "foreach".into(),
                    ty: Type::function(Type::Void, vec![Type::List(Type::Any.rc())]),
                    binders: vec![loop_var],
                    args: vec![
                        Node::Const(Value::List(vec![Value::Integer(1), Value::Symbol("a".into())])),
                        Node::Variable(None),
                    ],
                }))))),
                otherwise: None,
            }),
            Node::stmt(10, StmtKind::While {
                cond: boxed(Node::Const(Value::Boolean(false))),
                body: Some(boxed(Node::stmt(11, StmtKind::Block(stmt_block(vec![
                    Node::stmt(12, StmtKind::Break),
                    Node::stmt(13, StmtKind::Continue),
                ]))))),
            }),
            Node::stmt(14, StmtKind::Do {
                body: boxed(Node::stmt(15, StmtKind::Expression(boxed(Node::Reference(x.clone()))))),
                cond: boxed(Node::Const(Value::Boolean(false))),
            }),
            Node::stmt(16, StmtKind::Repeat {
                body: boxed(Node::stmt(17, StmtKind::Expression(boxed(Node::FunctionPointer {
                    entry: f.clone(),
                    args: vec![int(0)],
                })))),
                cond: boxed(Node::Const(Value::Boolean(true))),
            }),
            Node::stmt(18, StmtKind::Textdomain("base".into())),
            Node::stmt(19, StmtKind::Include { filename: "helpers.ycp".into(), skipped: true }),
            Node::stmt(20, StmtKind::Filename("sample.ycp".into())),
            Node::stmt(21, StmtKind::Switch(Switch {
                cond: boxed(Node::variable(&x)),
                cases: vec![(Value::Integer(1), 0), (Value::Integer(2), 1)],
                default: Some(1),
                body: stmt_block(vec![
                    Node::stmt(22, StmtKind::Expression(boxed(Node::Term {
                        name: "Id".into(),
                        args: vec![Node::Const(Value::Symbol("ok".into()))],
                    }))),
                    Node::stmt(23, StmtKind::Break),
                ]),
            })),
            Node::stmt(24, StmtKind::Expression(boxed(Node::Bracket {
                value: boxed(Node::variable(&m)),
                indices: boxed(Node::List(vec![Node::Const(Value::string("k"))])),
                default: boxed(Node::Const(Value::Void)),
            }))),
            Node::stmt(25, StmtKind::Return(Some(boxed(Node::Return(boxed(Node::Const(Value::Path(".x.y".into())))))))),
        ];
        Node::Block(Block { namespace: ns, statements })
    }

    #[test]
    fn test_every_node_family_roundtrips() {
        let module = sample_module();
        let bytes = encode(&module);
        let (decoded, session) = decode(&bytes);
        let decoded = decoded.unwrap();
        assert_eq!(dump(&decoded), dump(&module));
        assert!(decoded.is_module());
        assert_eq!(session.stack().depth(), 0);
    }

    #[test]
    fn test_references_resolve_to_declarations() {
        let (decoded, _) = decode(&encode(&sample_module()));
        let decoded = decoded.unwrap();
        let block = decoded.as_block().unwrap();
        let x = block.namespace.find_symbol("x").unwrap();
        match &block.statements[4] {
            Node::Stmt(Stmt { kind: StmtKind::Assign { entry, .. }, line: 6 }) => assert!(Rc::ptr_eq(entry, &x)),
            other => panic!("expected assignment, got {:?}", other.kind()),
        }
    }

    #[test]
    fn test_function_body_sees_parameters() {
        let (decoded, _) = decode(&encode(&sample_module()));
        let decoded = decoded.unwrap();
        let Node::Stmt(Stmt { kind: StmtKind::Function { def, .. }, .. }) = &decoded.as_block().unwrap().statements[2] else {
            panic!("expected function definition");
        };
        let a = def.params.find_symbol("a").unwrap();
        let body = def.body.as_ref().unwrap();
        let Node::Stmt(Stmt { kind: StmtKind::Return(Some(value)), .. }) = &body.statements[0] else {
            panic!("expected return");
        };
        let Node::Binary { lhs, .. } = value.as_ref() else { panic!("expected binary") };
        assert!(matches!(lhs.as_ref(), Node::Variable(Some(e)) if Rc::ptr_eq(e, &a)));
    }

    #[test]
    fn test_placeholders_are_rejected() {
        for (tag, kind) in [(0u8, Kind::Error), (12, Kind::ConstEntry), (13, Kind::ConstPlaceholder), (34, Kind::ExprPlaceholder), (54, Kind::StmtPlaceholder)] {
            let (result, _) = decode(&[tag]);
            match result {
                Err(Error::Placeholder(k)) => assert_eq!(k, kind),
                other => panic!("tag {}: expected placeholder error, got {:?}", tag, other.map(|n| n.kind())),
            }
        }
    }

    #[test]
    fn test_unknown_kind_is_fatal() {
        let (result, _) = decode(&[200]);
        assert!(matches!(result, Err(Error::UnknownKind { what: "code", tag: 200 })));
    }

    #[test]
    fn test_list_failure_discards_whole_list() {
        let mut enc = Encoder::new();
        enc.write_u8(Kind::List as u8);
        enc.write_int32(2);
        enc.write_u8(Kind::ConstInteger as u8);
        enc.write_int32(5);
        enc.write_int32(0);
        enc.write_u8(Kind::ExprPlaceholder as u8);
        let (result, _) = decode(&enc.finish());
        assert!(matches!(result, Err(Error::Placeholder(Kind::ExprPlaceholder))));
    }

    #[test]
    fn test_block_of_expressions_fails_validation() {
        let mut enc = Encoder::new();
        enc.write_u8(Kind::Block as u8);
        enc.write_u8(NamespaceKind::Statement.to_u8());
        enc.write_string("");
        enc.write_int32(0);
        enc.write_int32(1);
        enc.write_u8(Kind::ConstVoid as u8);
        let (result, session) = decode(&enc.finish());
        assert!(matches!(result, Err(Error::InvalidNode(Kind::Block))));
        assert_eq!(session.stack().depth(), 0);
    }

    #[test]
    fn test_truncated_stream_unwinds_stack() {
        let bytes = encode(&sample_module());
        for cut in [bytes.len() / 4, bytes.len() / 2, bytes.len() - 1] {
            let (result, session) = decode(&bytes[..cut]);
            assert!(matches!(result, Err(Error::StreamExhausted)), "cut at {}", cut);
            assert_eq!(session.stack().depth(), 0);
        }
    }

    #[test]
    fn test_statement_without_entry_is_invalid() {
        let mut enc = Encoder::new();
        enc.write_u8(Kind::Assign as u8);
        enc.write_int32(1);
        enc.write_i32(-1);
        enc.write_i32(0);
        enc.write_u8(Kind::ConstVoid as u8);
        let (result, _) = decode(&enc.finish());
        assert!(matches!(result, Err(Error::InvalidNode(Kind::Assign))));
    }

    #[test]
    fn test_writer_rejects_invalid_tree() {
        let bad = Node::Block(stmt_block(vec![int(1)]));
        let mut stack = NamespaceStack::new();
        let mut w = CodeWriter::new(&mut stack);
        assert!(matches!(w.write_code(&bad), Err(Error::InvalidNode(Kind::Block))));
    }

    #[test]
    fn test_writer_rejects_anonymous_required_entry() {
        let loose = SymbolEntry::anonymous("e", Category::Variable, Type::Any.rc());
        let assign = Node::Block(stmt_block(vec![Node::stmt(1, StmtKind::Assign {
            entry: loose.clone(),
            value: boxed(int(1)),
        })]));
        let reference = Node::Reference(loose);

        let mut stack = NamespaceStack::new();
        let mut w = CodeWriter::new(&mut stack);
        assert!(matches!(w.write_code(&assign), Err(Error::InvalidNode(Kind::Assign))));
        assert_eq!(w.stack().depth(), 0);
        assert!(matches!(w.write_code(&reference), Err(Error::InvalidNode(Kind::Reference))));
    }

    #[test]
    fn test_function_value_links_body_to_parameters() {
        let params = Namespace::new("", NamespaceKind::Definition);
        let a = params.declare("a", Category::Variable, Type::Integer.rc());
        let body = stmt_block(vec![Node::stmt(2, StmtKind::Return(Some(boxed(Node::variable(&a)))))]);
        let lambda = Node::Function(FunctionDef { params, body: Some(body) });

        let (decoded, session) = decode(&encode(&lambda));
        let decoded = decoded.unwrap();
        assert_eq!(session.stack().depth(), 0);
        assert_eq!(dump(&decoded), dump(&lambda));

        let Node::Function(def) = &decoded else { panic!("expected function") };
        let a = def.params.find_symbol("a").unwrap();
        let body = def.body.as_ref().unwrap();
        let Node::Stmt(Stmt { kind: StmtKind::Return(Some(value)), .. }) = &body.statements[0] else {
            panic!("expected return");
        };
        assert!(matches!(value.as_ref(), Node::Variable(Some(e)) if Rc::ptr_eq(e, &a)));
    }
}
