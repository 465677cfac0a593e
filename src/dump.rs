// ═══════════════════════════════════════════════════════════
// Tree dump: indented text rendering of a code tree
// ═══════════════════════════════════════════════════════════

use crate::ast::{Block, FunctionDef, Node, Stmt, StmtKind};
use crate::symbols::SymbolEntry;

pub fn dump(node: &Node) -> String {
    let mut p = Printer::default();
    p.node(node);
    p.out
}

#[derive(Default)]
struct Printer {
    out: String,
    depth: usize,
}

fn entry_name(entry: &SymbolEntry) -> &str {
    if entry.name.is_empty() { "<unnamed>" } else { &entry.name }
}

impl Printer {
    fn line(&mut self, text: &str) {
        for _ in 0..self.depth {
            self.out.push_str("  ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn nested(&mut self, f: impl FnOnce(&mut Self)) {
        self.depth += 1;
        f(self);
        self.depth -= 1;
    }

    fn children(&mut self, nodes: &[Node]) {
        self.nested(|p| nodes.iter().for_each(|n| p.node(n)));
    }

    fn labeled(&mut self, label: &str, node: &Node) {
        self.line(label);
        self.nested(|p| p.node(node));
    }

    fn block(&mut self, label: &str, block: &Block) {
        let ns = &block.namespace;
        self.line(&format!("{} {:?} '{}'", label, ns.kind, ns.name));
        self.nested(|p| {
            for entry in ns.symbols() {
                p.line(&format!("declare {}", entry));
            }
            for stmt in &block.statements {
                p.node(stmt);
            }
        });
    }

    fn function(&mut self, label: &str, def: &FunctionDef) {
        let params: Vec<String> = def.params.symbols().iter().map(|e| format!("{} {}", e.ty, e.name)).collect();
        self.line(&format!("{} ({})", label, params.join(", ")));
        if let Some(body) = &def.body {
            self.nested(|p| p.block("body", body));
        }
    }

    fn node(&mut self, node: &Node) {
        match node {
            Node::Const(v)                 => self.line(&format!("const {}", v)),
            Node::Locale { text, domain }  => self.line(&format!("locale {:?} in {}", text, domain)),
            Node::Function(def)            => self.function("function", def),
            Node::Propagate { from, to, value } => self.labeled(&format!("propagate {} -> {}", from, to), value),
            Node::Unary { op, arg }        => self.labeled(&format!("unary {}", op), arg),
            Node::Binary { op, lhs, rhs }  => {
                self.line(&format!("binary {}", op));
                self.nested(|p| { p.node(lhs); p.node(rhs); });
            }
            Node::Triple { cond, then, otherwise } => {
                self.line("triple");
                self.nested(|p| { p.node(cond); p.node(then); p.node(otherwise); });
            }
            Node::Compare { op, lhs, rhs } => {
                self.line(&format!("compare {}", op.symbol()));
                self.nested(|p| { p.node(lhs); p.node(rhs); });
            }
            Node::LocaleExpr { singular, plural, domain, count } => {
                self.labeled(&format!("locale {:?} / {:?} in {}", singular, plural, domain), count)
            }
            Node::List(items)              => {
                self.line(&format!("list [{}]", items.len()));
                self.children(items);
            }
            Node::Map(pairs)               => {
                self.line(&format!("map [{}]", pairs.len()));
                self.nested(|p| {
                    for (k, v) in pairs {
                        p.labeled("key", k);
                        p.labeled("value", v);
                    }
                });
            }
            Node::Term { name, args }      => {
                self.line(&format!("term `{}", name));
                self.children(args);
            }
            Node::Is { value, ty }         => self.labeled(&format!("is {}", ty), value),
            Node::Bracket { value, indices, default } => {
                self.line("bracket");
                self.nested(|p| { p.node(value); p.node(indices); p.labeled("default", default); });
            }
            Node::Block(block)             => self.block("block", block),
            Node::Return(value)            => self.labeled("return", value),
            Node::Variable(Some(entry))    => self.line(&format!("variable {}", entry_name(entry))),
            Node::Variable(None)           => self.line("variable <binder>"),
            Node::Builtin { name, ty, binders, args } => {
                let names: Vec<&str> = binders.iter().map(|b| entry_name(b)).collect();
                self.line(&format!("builtin {} : {} [{}]", name, ty, names.join(", ")));
                self.children(args);
            }
            Node::Call { entry, args }     => {
                self.line(&format!("call {}", entry_name(entry)));
                self.children(args);
            }
            Node::Reference(entry)         => self.line(&format!("reference {}", entry_name(entry))),
            Node::FunctionPointer { entry, args } => {
                self.line(&format!("call pointer {}", entry_name(entry)));
                self.children(args);
            }
            Node::Stmt(stmt)               => self.stmt(stmt),
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        let head = format!("{}: ", stmt.line);
        match &stmt.kind {
            StmtKind::Typedef(entry)        => self.line(&format!("{}typedef {} = {}", head, entry_name(entry), entry.ty)),
            StmtKind::Variable { entry, value } => {
                self.labeled(&format!("{}define {} {}", head, entry.ty, entry_name(entry)), value)
            }
            StmtKind::Function { entry, def } => self.function(&format!("{}function {}", head, entry_name(entry)), def),
            StmtKind::Assign { entry, value } => self.labeled(&format!("{}assign {}", head, entry_name(entry)), value),
            StmtKind::BracketAssign { entry, indices, value } => {
                self.line(&format!("{}assign {}[]", head, entry_name(entry)));
                self.nested(|p| { p.node(indices); p.node(value); });
            }
            StmtKind::If { cond, then, otherwise } => {
                self.labeled(&format!("{}if", head), cond);
                if let Some(then) = then { self.labeled("then", then); }
                if let Some(otherwise) = otherwise { self.labeled("else", otherwise); }
            }
            StmtKind::While { cond, body }  => {
                self.labeled(&format!("{}while", head), cond);
                if let Some(body) = body { self.labeled("do", body); }
            }
            StmtKind::Do { body, cond }     => {
                self.labeled(&format!("{}do", head), body);
                self.labeled("while", cond);
            }
            StmtKind::Repeat { body, cond } => {
                self.labeled(&format!("{}repeat", head), body);
                self.labeled("until", cond);
            }
            StmtKind::Expression(expr)      => self.labeled(&format!("{}expression", head), expr),
            StmtKind::Return(Some(value))   => self.labeled(&format!("{}return", head), value),
            StmtKind::Return(None)          => self.line(&format!("{}return", head)),
            StmtKind::Break                 => self.line(&format!("{}break", head)),
            StmtKind::Continue              => self.line(&format!("{}continue", head)),
            StmtKind::Textdomain(domain)    => self.line(&format!("{}textdomain {:?}", head, domain)),
            StmtKind::Include { filename, skipped } => {
                let note = if *skipped { " (skipped)" } else { "" };
                self.line(&format!("{}include {:?}{}", head, filename, note))
            }
            StmtKind::Filename(name)        => self.line(&format!("{}filename {:?}", head, name)),
            StmtKind::Import(import)        => {
                let names: Vec<&str> = import.xrefs.iter().map(|e| entry_name(e)).collect();
                self.line(&format!("{}import {} [{}]", head, import.name, names.join(", ")))
            }
            StmtKind::Block(block)          => self.block(&format!("{}block", head), block),
            StmtKind::Switch(sw)            => {
                self.labeled(&format!("{}switch", head), &sw.cond);
                self.nested(|p| {
                    for (label, index) in &sw.cases {
                        p.line(&format!("case {} -> {}", label, index));
                    }
                    if let Some(index) = sw.default {
                        p.line(&format!("default -> {}", index));
                    }
                });
                self.block("body", &sw.body);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::{Category, Namespace, NamespaceKind};
    use crate::types::Type;
    use crate::value::Value;

    #[test]
    fn test_dump_shape() {
        let ns = Namespace::new("M", NamespaceKind::Module);
        let x = ns.declare_global("x", Category::Variable, Type::Integer.rc());
        let root = Node::Block(Block {
            namespace: ns,
            statements: vec![Node::stmt(3, StmtKind::Assign {
                entry: x.clone(),
                value: Box::new(Node::binary("+", Node::variable(&x), Node::Const(Value::Integer(1)))),
            })],
        });
        let expected = "\
block Module 'M'
  declare global variable integer x
  3: assign x
    binary +
      variable x
      const 1
";
        assert_eq!(dump(&root), expected);
    }
}
