// ═══════════════════════════════════════════════════════════
// Type descriptors and the type codec
// ═══════════════════════════════════════════════════════════
//
// A type is written as its tag byte followed by the nested types of
// composite kinds:
//
//   atomic     [tag]
//   list       [tag] elem
//   map        [tag] key value
//   block      [tag] inner
//   variable   [tag] inner
//   tuple      [tag] [int32 count] elem*
//   function   [tag] return [int32 count] param*
//
// ═══════════════════════════════════════════════════════════

use std::fmt;
use std::rc::Rc;

use tracing::error;

use crate::error::Error;
use crate::error::Result;
use crate::stream::{Decoder, Encoder};

pub type TypeRef = Rc<Type>;

// ── Tag bytes ─────────────────────────────────────────────────────────────────

const TAG_UNSPEC: u8    = 0;
const TAG_ERROR: u8     = 1;
const TAG_ANY: u8       = 2;
const TAG_BOOLEAN: u8   = 3;
const TAG_BYTEBLOCK: u8 = 4;
const TAG_FLOAT: u8     = 5;
const TAG_INTEGER: u8   = 6;
const TAG_LOCALE: u8    = 7;
const TAG_PATH: u8      = 8;
const TAG_STRING: u8    = 9;
const TAG_SYMBOL: u8    = 10;
const TAG_TERM: u8      = 11;
const TAG_VOID: u8      = 12;
const TAG_WILDCARD: u8  = 13;
const TAG_FLEX: u8      = 14;
const TAG_NIL: u8       = 15;
const TAG_VARIABLE: u8  = 16;
const TAG_BLOCK: u8     = 17;
const TAG_LIST: u8      = 18;
const TAG_MAP: u8       = 19;
const TAG_TUPLE: u8     = 20;
const TAG_FUNCTION: u8  = 21;

/// Never mutated once built; nodes and symbol entries share them through
/// [`TypeRef`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    Unspec,
    Error,
    Any,
    Boolean,
    Byteblock,
    Float,
    Integer,
    Locale,
    Path,
    String,
    Symbol,
    Term,
    Void,
    Wildcard,
    Flex,
    Nil,
    Variable(TypeRef),
    Block(TypeRef),
    List(TypeRef),
    Map(TypeRef, TypeRef),
    Tuple(Vec<TypeRef>),
    Function(TypeRef, Vec<TypeRef>),
}

impl Type {
    pub fn rc(self) -> TypeRef { Rc::new(self) }

    pub fn list(elem: Type) -> TypeRef { Type::List(elem.rc()).rc() }

    pub fn map(key: Type, value: Type) -> TypeRef { Type::Map(key.rc(), value.rc()).rc() }

    pub fn function(ret: Type, params: Vec<Type>) -> TypeRef {
        Type::Function(ret.rc(), params.into_iter().map(Type::rc).collect()).rc()
    }

    pub fn tag(&self) -> u8 {
        match self {
            Type::Unspec        => TAG_UNSPEC,
            Type::Error         => TAG_ERROR,
            Type::Any           => TAG_ANY,
            Type::Boolean       => TAG_BOOLEAN,
            Type::Byteblock     => TAG_BYTEBLOCK,
            Type::Float         => TAG_FLOAT,
            Type::Integer       => TAG_INTEGER,
            Type::Locale        => TAG_LOCALE,
            Type::Path          => TAG_PATH,
            Type::String        => TAG_STRING,
            Type::Symbol        => TAG_SYMBOL,
            Type::Term          => TAG_TERM,
            Type::Void          => TAG_VOID,
            Type::Wildcard      => TAG_WILDCARD,
            Type::Flex          => TAG_FLEX,
            Type::Nil           => TAG_NIL,
            Type::Variable(_)   => TAG_VARIABLE,
            Type::Block(_)      => TAG_BLOCK,
            Type::List(_)       => TAG_LIST,
            Type::Map(..)       => TAG_MAP,
            Type::Tuple(_)      => TAG_TUPLE,
            Type::Function(..)  => TAG_FUNCTION,
        }
    }

    pub fn is_error(&self) -> bool { matches!(self, Type::Error) }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Unspec      => write!(f, "<unspec>"),
            Type::Error       => write!(f, "<error>"),
            Type::Any         => write!(f, "any"),
            Type::Boolean     => write!(f, "boolean"),
            Type::Byteblock   => write!(f, "byteblock"),
            Type::Float       => write!(f, "float"),
            Type::Integer     => write!(f, "integer"),
            Type::Locale      => write!(f, "locale"),
            Type::Path        => write!(f, "path"),
            Type::String      => write!(f, "string"),
            Type::Symbol      => write!(f, "symbol"),
            Type::Term        => write!(f, "term"),
            Type::Void        => write!(f, "void"),
            Type::Wildcard    => write!(f, "..."),
            Type::Flex        => write!(f, "<flex>"),
            Type::Nil         => write!(f, "<nil>"),
            Type::Variable(t) => write!(f, "variable <{}>", t),
            Type::Block(t)    => write!(f, "block <{}>", t),
            Type::List(t)     => write!(f, "list <{}>", t),
            Type::Map(k, v)   => write!(f, "map <{}, {}>", k, v),
            Type::Tuple(ts)   => {
                write!(f, "tuple <")?;
                for (i, t) in ts.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{}", t)?;
                }
                write!(f, ">")
            }
            Type::Function(ret, params) => {
                write!(f, "{} (", ret)?;
                for (i, t) in params.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{}", t)?;
                }
                write!(f, ")")
            }
        }
    }
}

// ── Encoding ──────────────────────────────────────────────────────────────────

impl Encoder {
    pub fn write_type(&mut self, ty: &Type) {
        self.write_u8(ty.tag());
        match ty {
            Type::Variable(t) | Type::Block(t) | Type::List(t) => self.write_type(t),
            Type::Map(k, v) => { self.write_type(k); self.write_type(v); }
            Type::Tuple(ts) => self.write_vec(ts, |e, t| e.write_type(t)),
            Type::Function(ret, params) => {
                self.write_type(ret);
                self.write_vec(params, |e, t| e.write_type(t));
            }
            _ => {}
        }
    }
}

// ── Decoding ──────────────────────────────────────────────────────────────────

impl Decoder<'_> {
    /// An unknown tag does not stop decoding: it is logged, the error type
    /// stands in for it, and the failure is deferred to the end of the read.
    pub fn read_type(&mut self) -> Result<TypeRef> {
        let ty = match self.read_u8()? {
            TAG_UNSPEC    => Type::Unspec,
            TAG_ERROR     => Type::Error,
            TAG_ANY       => Type::Any,
            TAG_BOOLEAN   => Type::Boolean,
            TAG_BYTEBLOCK => Type::Byteblock,
            TAG_FLOAT     => Type::Float,
            TAG_INTEGER   => Type::Integer,
            TAG_LOCALE    => Type::Locale,
            TAG_PATH      => Type::Path,
            TAG_STRING    => Type::String,
            TAG_SYMBOL    => Type::Symbol,
            TAG_TERM      => Type::Term,
            TAG_VOID      => Type::Void,
            TAG_WILDCARD  => Type::Wildcard,
            TAG_FLEX      => Type::Flex,
            TAG_NIL       => Type::Nil,
            TAG_VARIABLE  => Type::Variable(self.read_type()?),
            TAG_BLOCK     => Type::Block(self.read_type()?),
            TAG_LIST      => Type::List(self.read_type()?),
            TAG_MAP       => {
                let k = self.read_type()?;
                let v = self.read_type()?;
                Type::Map(k, v)
            }
            TAG_TUPLE     => Type::Tuple(self.read_vec(|d| d.read_type())?),
            TAG_FUNCTION  => {
                let ret = self.read_type()?;
                let params = self.read_vec(|d| d.read_type())?;
                Type::Function(ret, params)
            }
            tag => {
                error!("unhandled type kind {}", tag);
                self.defer(Error::UnknownKind { what: "type", tag });
                Type::Error
            }
        };
        Ok(ty.rc())
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
