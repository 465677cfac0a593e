// ═══════════════════════════════════════════════════════════
// Symbol references: entries to and from (namespace id, position)
// ═══════════════════════════════════════════════════════════
//
//   [int32 id] [int32 position]
//
//   id == -1         no namespace: an anonymous binder, read back as no entry
//   position >= 0    index into the namespace's declarations
//   position <  0    cross-reference slot  -position - 1  of an import
//
// Ids are relative to the tare floor of the namespace stack, so the stack
// must be in the same tare-relative state when reading as it was when
// writing.
//
// ═══════════════════════════════════════════════════════════

use std::rc::Rc;

use tracing::{debug, error};

use crate::ast::Kind;
use crate::codec::{CodeReader, CodeWriter};
use crate::error::{Error, Result};
use crate::symbols::SymbolEntry;

const NO_NAMESPACE: i32 = -1;

impl CodeWriter<'_> {
    /// Fails if the entry's namespace is not on the stack, or if it sits
    /// there as an import whose cross-reference table lacks the entry.
    pub fn write_entry(&mut self, entry: Option<&Rc<SymbolEntry>>) -> Result<()> {
        let (id, position) = match entry {
            None => (NO_NAMESPACE, 0),
            Some(entry) => self.locate(entry)?,
        };
        self.encoder().write_i32(id);
        self.encoder().write_i32(position);
        Ok(())
    }

    /// For nodes that cannot exist without their entry. An anonymous entry
    /// has no namespace to point into and would read back as no entry.
    pub fn write_required_entry(&mut self, kind: Kind, entry: &Rc<SymbolEntry>) -> Result<()> {
        if entry.is_anonymous() {
            error!("{} refers to anonymous entry '{}'", kind, entry.name);
            return Err(Error::InvalidNode(kind));
        }
        self.write_entry(Some(entry))
    }

    fn locate(&self, entry: &Rc<SymbolEntry>) -> Result<(i32, i32)> {
        let namespace = match entry.owner() {
            None => {
                debug!("anonymous entry '{}' written without namespace", entry.name);
                return Ok((NO_NAMESPACE, entry.position() as i32));
            }
            Some(Some(ns)) => ns,
            Some(None) => {
                error!("namespace of entry '{}' no longer exists", entry.name);
                return Err(Error::BrokenReference(format!("owner of '{}' is gone", entry.name)));
            }
        };
        let Some(id) = self.stack().lookup_id(&namespace) else {
            error!("can't find namespace '{}' of entry '{}' on the stack", namespace.name, entry.name);
            return Err(Error::BrokenReference(format!(
                "namespace '{}' of '{}' is not on the stack",
                namespace.name, entry.name
            )));
        };
        if !self.stack().has_xrefs(id) {
            return Ok((id as i32, entry.position() as i32));
        }
        match namespace.xref_slot(entry) {
            Some(slot) => Ok((id as i32, -(slot as i32) - 1)),
            None => {
                error!("'{}' is not in the imports of '{}'", entry.name, namespace.name);
                Err(Error::BrokenReference(format!(
                    "'{}::{}' used without cross reference",
                    namespace.name, entry.name
                )))
            }
        }
    }
}

impl CodeReader<'_, '_> {
    pub fn read_entry(&mut self) -> Result<Option<Rc<SymbolEntry>>> {
        let id = self.decoder().read_i32()?;
        let position = self.decoder().read_i32()?;
        if id == NO_NAMESPACE {
            debug!("entry without namespace");
            return Ok(None);
        }
        let namespace = usize::try_from(id)
            .ok()
            .and_then(|id| self.session().stack().lookup_namespace(id))
            .ok_or_else(|| Error::BrokenReference(format!("no namespace with id {}", id)))?;
        let entry = if position < 0 {
            let slot = (-(position as i64) - 1) as usize;
            namespace.xref(slot)
        } else {
            namespace.symbol_entry(position as usize)
        };
        match entry {
            Some(entry) => Ok(Some(entry)),
            None => {
                error!("no entry at position {} of namespace '{}'", position, namespace.name);
                Err(Error::BrokenReference(format!(
                    "position {} not in namespace '{}'",
                    position, namespace.name
                )))
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::Session;
    use crate::stack::NamespaceStack;
    use crate::symbols::{Category, Namespace, NamespaceKind};
    use crate::types::Type;

    fn four_entries() -> Rc<Namespace> {
        let ns = Namespace::new("M", NamespaceKind::Module);
        for name in ["a", "b", "c", "d"] {
            ns.declare(name, Category::Variable, Type::Integer.rc());
        }
        ns
    }

    fn write(stack: &mut NamespaceStack, entry: Option<&Rc<SymbolEntry>>) -> Result<Vec<u8>> {
        let mut w = CodeWriter::new(stack);
        w.write_entry(entry)?;
        Ok(w.finish())
    }

    #[test]
    fn test_position_roundtrip() {
        let ns = four_entries();
        let c = ns.symbol_entry(2).unwrap();

        let mut stack = NamespaceStack::new();
        stack.push(&ns, false);
        let bytes = write(&mut stack, Some(&c)).unwrap();

        let mut session = Session::default();
        session.stack_mut().push(&ns, false);
        let back = CodeReader::new(&bytes, &mut session).read_entry().unwrap().unwrap();
        assert_eq!(back.name, "c");
        assert!(Rc::ptr_eq(&back, &c));
    }

    #[test]
    fn test_ids_are_tare_relative() {
        let ns = four_entries();
        let outer = Namespace::new("outer", NamespaceKind::File);
        let b = ns.symbol_entry(1).unwrap();

        let mut stack = NamespaceStack::new();
        stack.push(&ns, false);
        let bytes = write(&mut stack, Some(&b)).unwrap();

        let mut session = Session::default();
        session.stack_mut().push(&outer, false);
        let tare = session.stack_mut().tare();
        session.stack_mut().push(&ns, false);
        let back = CodeReader::new(&bytes, &mut session).read_entry().unwrap().unwrap();
        assert!(Rc::ptr_eq(&back, &b));
        session.stack_mut().untare(tare);
    }

    #[test]
    fn test_anonymous_reads_as_none() {
        let loose = SymbolEntry::anonymous("e", Category::Variable, Type::Any.rc());
        let mut stack = NamespaceStack::new();
        let bytes = write(&mut stack, Some(&loose)).unwrap();
        let mut session = Session::default();
        assert!(CodeReader::new(&bytes, &mut session).read_entry().unwrap().is_none());
    }

    #[test]
    fn test_namespace_off_stack_is_an_encoding_error() {
        let ns = four_entries();
        let a = ns.symbol_entry(0).unwrap();
        let mut stack = NamespaceStack::new();
        assert!(matches!(write(&mut stack, Some(&a)), Err(Error::BrokenReference(_))));
    }

    #[test]
    fn test_xref_roundtrip() {
        let lib = four_entries();
        let d = lib.symbol_entry(3).unwrap();
        let b = lib.symbol_entry(1).unwrap();

        let mut stack = NamespaceStack::new();
        stack.push(&lib, true);
        lib.add_xref(&d);
        lib.add_xref(&b);
        let bytes = write(&mut stack, Some(&b)).unwrap();
        stack.pop(&lib).unwrap();

        // slot 1 is written as position -2
        let mut dec = crate::stream::Decoder::new(&bytes);
        assert_eq!(dec.read_i32().unwrap(), 0);
        assert_eq!(dec.read_i32().unwrap(), -2);

        let mut session = Session::default();
        session.stack_mut().push(&lib, true);
        lib.add_xref(&d);
        lib.add_xref(&b);
        let back = CodeReader::new(&bytes, &mut session).read_entry().unwrap().unwrap();
        assert!(Rc::ptr_eq(&back, &b));
    }

    #[test]
    fn test_missing_xref_is_an_encoding_error() {
        let lib = four_entries();
        let a = lib.symbol_entry(0).unwrap();
        let mut stack = NamespaceStack::new();
        stack.push(&lib, true);
        assert!(matches!(write(&mut stack, Some(&a)), Err(Error::BrokenReference(_))));
    }

    #[test]
    fn test_out_of_range_reads_are_broken() {
        let ns = four_entries();
        let mut session = Session::default();
        session.stack_mut().push(&ns, false);

        let mut enc = crate::stream::Encoder::new();
        enc.write_i32(0);
        enc.write_i32(9);
        enc.write_i32(3);
        enc.write_i32(0);
        let bytes = enc.finish();
        let mut r = CodeReader::new(&bytes, &mut session);
        assert!(matches!(r.read_entry(), Err(Error::BrokenReference(_))));
        assert!(matches!(r.read_entry(), Err(Error::BrokenReference(_))));
    }
}
