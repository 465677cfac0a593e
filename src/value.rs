// ═══════════════════════════════════════════════════════════
// Runtime constant values and the value codec
// ═══════════════════════════════════════════════════════════
//
//   value     [kind byte] payload
//
// Payload per kind:
//
//   void       (nothing)
//   boolean    [bool]
//   integer    [int32 low] [int32 high]
//   float      [string]  shortest decimal text that reads back exactly
//   string     [string]
//   byteblock  [bytes]
//   path       [string]
//   symbol     [string]
//   list       [int32 count] value*
//   map        [int32 count] (key value)*
//   term       [string name] [int32 count] value*
//   code       node
//
// Constant nodes store only the payload; their node kind already says which
// value kind follows.
//
// ═══════════════════════════════════════════════════════════

use std::fmt;
use std::rc::Rc;

use tracing::error;

use crate::ast::Node;
use crate::codec::{CodeReader, CodeWriter};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Void,
    Boolean,
    Integer,
    Float,
    String,
    Byteblock,
    Path,
    Symbol,
    List,
    Map,
    Term,
    Code,
}

impl ValueKind {
    pub fn to_u8(self) -> u8 {
        match self {
            ValueKind::Void      => 0,
            ValueKind::Boolean   => 1,
            ValueKind::Integer   => 2,
            ValueKind::Float     => 3,
            ValueKind::String    => 4,
            ValueKind::Byteblock => 5,
            ValueKind::Path      => 6,
            ValueKind::Symbol    => 7,
            ValueKind::List      => 8,
            ValueKind::Map       => 9,
            ValueKind::Term      => 10,
            ValueKind::Code      => 11,
        }
    }

    pub fn from_u8(tag: u8) -> Option<Self> {
        Some(match tag {
            0  => ValueKind::Void,
            1  => ValueKind::Boolean,
            2  => ValueKind::Integer,
            3  => ValueKind::Float,
            4  => ValueKind::String,
            5  => ValueKind::Byteblock,
            6  => ValueKind::Path,
            7  => ValueKind::Symbol,
            8  => ValueKind::List,
            9  => ValueKind::Map,
            10 => ValueKind::Term,
            11 => ValueKind::Code,
            _  => return None,
        })
    }
}

#[derive(Debug, Clone)]
pub enum Value {
    Void,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Byteblock(Vec<u8>),
    /// Path text including its leading dot, e.g. `.target.size`.
    Path(String),
    Symbol(String),
    List(Vec<Value>),
    /// Entries keep their stored order.
    Map(Vec<(Value, Value)>),
    Term(String, Vec<Value>),
    /// A quoted expression, evaluated later.
    Code(Rc<Node>),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Void         => ValueKind::Void,
            Value::Boolean(_)   => ValueKind::Boolean,
            Value::Integer(_)   => ValueKind::Integer,
            Value::Float(_)     => ValueKind::Float,
            Value::String(_)    => ValueKind::String,
            Value::Byteblock(_) => ValueKind::Byteblock,
            Value::Path(_)      => ValueKind::Path,
            Value::Symbol(_)    => ValueKind::Symbol,
            Value::List(_)      => ValueKind::List,
            Value::Map(_)       => ValueKind::Map,
            Value::Term(..)     => ValueKind::Term,
            Value::Code(_)      => ValueKind::Code,
        }
    }

    pub fn string(s: &str) -> Self { Value::String(s.to_string()) }
}

impl PartialEq for Value {
    /// Code values compare by identity; everything else structurally.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Void, Value::Void)                 => true,
            (Value::Boolean(a), Value::Boolean(b))     => a == b,
            (Value::Integer(a), Value::Integer(b))     => a == b,
            (Value::Float(a), Value::Float(b))         => a == b,
            (Value::String(a), Value::String(b))       => a == b,
            (Value::Byteblock(a), Value::Byteblock(b)) => a == b,
            (Value::Path(a), Value::Path(b))           => a == b,
            (Value::Symbol(a), Value::Symbol(b))       => a == b,
            (Value::List(a), Value::List(b))           => a == b,
            (Value::Map(a), Value::Map(b))             => a == b,
            (Value::Term(n, a), Value::Term(m, b))     => n == m && a == b,
            (Value::Code(a), Value::Code(b))           => Rc::ptr_eq(a, b),
            _                                          => false,
        }
    }
}

fn write_seq(f: &mut fmt::Formatter<'_>, values: &[Value]) -> fmt::Result {
    for (i, v) in values.iter().enumerate() {
        if i > 0 { write!(f, ", ")?; }
        write!(f, "{}", v)?;
    }
    Ok(())
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void         => write!(f, "nil"),
            Value::Boolean(b)   => write!(f, "{}", b),
            Value::Integer(n)   => write!(f, "{}", n),
            Value::Float(x)     => {
                if x.fract() == 0.0 && x.is_finite() { write!(f, "{:.1}", x) } else { write!(f, "{}", x) }
            }
            Value::String(s)    => write!(f, "{:?}", s),
            Value::Byteblock(b) => {
                write!(f, "#[")?;
                for byte in b { write!(f, "{:02x}", byte)?; }
                write!(f, "]")
            }
            Value::Path(p)      => write!(f, "{}", p),
            Value::Symbol(s)    => write!(f, "`{}", s),
            Value::List(vs)     => {
                write!(f, "[")?;
                write_seq(f, vs)?;
                write!(f, "]")
            }
            Value::Map(pairs)   => {
                write!(f, "$[")?;
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{}:{}", k, v)?;
                }
                write!(f, "]")
            }
            Value::Term(name, args) => {
                write!(f, "`{}(", name)?;
                write_seq(f, args)?;
                write!(f, ")")
            }
            Value::Code(_)      => write!(f, "<code>"),
        }
    }
}

// ── Encoding ──────────────────────────────────────────────────────────────────

impl CodeWriter<'_> {
    pub fn write_value(&mut self, value: &Value) -> Result<()> {
        self.encoder().write_u8(value.kind().to_u8());
        self.write_value_payload(value)
    }

    pub(crate) fn write_value_payload(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::Void         => {}
            Value::Boolean(b)   => self.encoder().write_bool(*b),
            Value::Integer(n)   => {
                let bits = *n as u64;
                self.encoder().write_int32(bits as u32);
                self.encoder().write_int32((bits >> 32) as u32);
            }
            Value::Float(x)     => self.encoder().write_string(&x.to_string()),
            Value::String(s)    => self.encoder().write_string(s),
            Value::Byteblock(b) => self.encoder().write_bytes(b),
            Value::Path(p)      => self.encoder().write_string(p),
            Value::Symbol(s)    => self.encoder().write_string(s),
            Value::List(vs)     => {
                self.encoder().write_int32(vs.len() as u32);
                for v in vs { self.write_value(v)?; }
            }
            Value::Map(pairs)   => {
                self.encoder().write_int32(pairs.len() as u32);
                for (k, v) in pairs {
                    self.write_value(k)?;
                    self.write_value(v)?;
                }
            }
            Value::Term(name, args) => {
                self.encoder().write_string(name);
                self.encoder().write_int32(args.len() as u32);
                for v in args { self.write_value(v)?; }
            }
            Value::Code(node)   => self.write_code(node)?,
        }
        Ok(())
    }
}

// ── Decoding ──────────────────────────────────────────────────────────────────

impl CodeReader<'_, '_> {
    /// An unknown kind byte fails this value without marking the stream bad.
    pub fn read_value(&mut self) -> Result<Value> {
        let tag = self.decoder().read_u8()?;
        match ValueKind::from_u8(tag) {
            Some(kind) => self.read_value_payload(kind),
            None => {
                error!("readValue stream code {}", tag);
                Err(Error::UnknownKind { what: "value", tag })
            }
        }
    }

    pub(crate) fn read_value_payload(&mut self, kind: ValueKind) -> Result<Value> {
        Ok(match kind {
            ValueKind::Void      => Value::Void,
            ValueKind::Boolean   => Value::Boolean(self.decoder().read_bool()?),
            ValueKind::Integer   => {
                let low = self.decoder().read_int32()? as u64;
                let high = self.decoder().read_int32()? as u64;
                Value::Integer((high << 32 | low) as i64)
            }
            ValueKind::Float     => {
                let text = self.decoder().read_string()?.unwrap_or_default();
                let x = text.parse::<f64>().map_err(|_| Error::InvalidString)?;
                Value::Float(x)
            }
            ValueKind::String    => Value::String(self.decoder().read_string()?.unwrap_or_default()),
            ValueKind::Byteblock => Value::Byteblock(self.decoder().read_bytes()?),
            ValueKind::Path      => Value::Path(self.decoder().read_string()?.unwrap_or_default()),
            ValueKind::Symbol    => Value::Symbol(self.decoder().read_string()?.unwrap_or_default()),
            ValueKind::List      => Value::List(self.read_many(|r| r.read_value())?),
            ValueKind::Map       => Value::Map(self.read_many(|r| {
                let k = r.read_value()?;
                let v = r.read_value()?;
                Ok((k, v))
            })?),
            ValueKind::Term      => {
                let name = self.decoder().read_string()?.unwrap_or_default();
                let args = self.read_many(|r| r.read_value())?;
                Value::Term(name, args)
            }
            ValueKind::Code      => Value::Code(Rc::new(self.read_code()?)),
        })
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
