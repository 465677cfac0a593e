// ═══════════════════════════════════════════════════════════
// Namespace stack: positional ids for the namespaces in scope
// ═══════════════════════════════════════════════════════════
//
// While a tree is written or read, every block pushes its namespace for the
// duration of its body. A namespace's id is its index counted from the tare
// floor, so a module loaded halfway through reading another one numbers its
// own namespaces from 0 no matter how deep the loader is nested.
//
//   frames:  [ A  B  C | D  E ]
//                      ^ floor (tare)
//   ids:                 0  1      A..C are invisible until untare
//
// ═══════════════════════════════════════════════════════════

use std::rc::Rc;

use tracing::{debug, error};

use crate::error::{Error, Result};
use crate::symbols::Namespace;

#[derive(Debug)]
struct Frame {
    namespace: Rc<Namespace>,
    with_xrefs: bool,
}

/// Token returned by [`NamespaceStack::tare`]: the number of frames that sat
/// above the previous floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct Tare(usize);

#[derive(Debug, Default)]
pub struct NamespaceStack {
    frames: Vec<Frame>,
    floor: usize,
}

impl NamespaceStack {
    pub fn new() -> Self { NamespaceStack::default() }

    /// Total number of frames, including those below the floor.
    pub fn depth(&self) -> usize { self.frames.len() }

    pub fn floor(&self) -> usize { self.floor }

    /// Frames visible above the floor.
    pub fn visible(&self) -> usize { self.frames.len() - self.floor }

    pub fn top(&self) -> Option<&Rc<Namespace>> {
        self.frames[self.floor..].last().map(|f| &f.namespace)
    }

    /// Push a namespace and return its floor-relative id. With `with_xrefs`
    /// a fresh cross-reference frame is opened on the namespace until the
    /// matching pop.
    pub fn push(&mut self, namespace: &Rc<Namespace>, with_xrefs: bool) -> usize {
        if with_xrefs {
            namespace.open_xrefs();
        }
        self.frames.push(Frame { namespace: namespace.clone(), with_xrefs });
        let id = self.visible() - 1;
        debug!("push namespace '{}' as id {} (depth {}, floor {})", namespace.name, id, self.depth(), self.floor);
        id
    }

    /// Pop `namespace`, which must be the top of the stack. Anything else is
    /// reported and leaves the stack untouched.
    pub fn pop(&mut self, namespace: &Rc<Namespace>) -> Result<()> {
        let Some(top) = self.frames[self.floor..].last() else {
            error!("pop of namespace '{}' on empty stack", namespace.name);
            return Err(Error::StackMismatch(format!("pop of '{}' on empty stack", namespace.name)));
        };
        if !Rc::ptr_eq(&top.namespace, namespace) {
            error!("pop of namespace '{}' but top of stack is '{}'", namespace.name, top.namespace.name);
            return Err(Error::StackMismatch(format!(
                "'{}' is not top of stack ('{}' is)",
                namespace.name, top.namespace.name
            )));
        }
        self.pop_frame();
        Ok(())
    }

    /// Pop frames until `namespace` has been popped as well. Used to unwind
    /// after errors and to drop the imports a block pushed. Never goes below
    /// the floor; if `namespace` is not found the visible part ends up empty.
    pub fn pop_up_to(&mut self, namespace: &Rc<Namespace>) -> Result<()> {
        debug!("pop up to namespace '{}' (depth {}, floor {})", namespace.name, self.depth(), self.floor);
        while self.frames.len() > self.floor {
            match self.pop_frame() {
                Some(popped) if Rc::ptr_eq(&popped, namespace) => return Ok(()),
                Some(_) => {}
                None => break,
            }
        }
        error!("pop up to namespace '{}' emptied the stack", namespace.name);
        Err(Error::StackMismatch(format!("'{}' not on stack", namespace.name)))
    }

    /// Drop frames until only `depth` remain, never going below the floor.
    /// Returns how many frames were dropped.
    pub fn unwind_to(&mut self, depth: usize) -> usize {
        let target = depth.max(self.floor);
        let mut dropped = 0;
        while self.frames.len() > target && self.pop_frame().is_some() {
            dropped += 1;
        }
        dropped
    }

    fn pop_frame(&mut self) -> Option<Rc<Namespace>> {
        let frame = self.frames.pop()?;
        if frame.with_xrefs {
            frame.namespace.close_xrefs();
        }
        Some(frame.namespace)
    }

    /// Make the current top the new floor.
    pub fn tare(&mut self) -> Tare {
        let token = Tare(self.frames.len() - self.floor);
        self.floor = self.frames.len();
        debug!("tare stack at {} (token {})", self.floor, token.0);
        token
    }

    pub fn untare(&mut self, tare: Tare) {
        self.floor -= tare.0;
        debug!("untare stack back to {}", self.floor);
    }

    /// Floor-relative id of `namespace`, scanning upward from the floor.
    pub fn lookup_id(&self, namespace: &Rc<Namespace>) -> Option<usize> {
        let id = self.frames[self.floor..]
            .iter()
            .position(|f| Rc::ptr_eq(&f.namespace, namespace));
        if id.is_none() {
            debug!("no id for namespace '{}' (depth {}, floor {})", namespace.name, self.depth(), self.floor);
        }
        id
    }

    /// Whether the frame for `id` was pushed with cross references.
    pub fn has_xrefs(&self, id: usize) -> bool {
        self.frames.get(self.floor + id).map_or(false, |f| f.with_xrefs)
    }

    pub fn lookup_namespace(&self, id: usize) -> Option<Rc<Namespace>> {
        match self.frames.get(self.floor + id) {
            Some(frame) => Some(frame.namespace.clone()),
            None => {
                error!("namespace id {} out of range ({} visible)", id, self.visible());
                None
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
