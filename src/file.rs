// ═══════════════════════════════════════════════════════════
// Bytecode files: header, version gate, atomic save
// ═══════════════════════════════════════════════════════════
//
// File layout:
//
//   [14 bytes]  magic "YaST bytecode "
//   [ASCII]     version "major.minor.release"
//   [1 byte]    0x00
//   node        root of the tree
//
// Each version number is a run of ASCII digits; reading a number consumes
// the byte that ends it, so the 0x00 after the release is eaten by the
// release. A file is readable when major and minor equal ours and its release
// is not newer than ours.
//
// ═══════════════════════════════════════════════════════════

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, error, warn};

use crate::ast::Node;
use crate::codec::{CodeReader, CodeWriter};
use crate::error::{Error, Result};
use crate::loader::Session;
use crate::stack::NamespaceStack;
use crate::stream::{Decoder, Encoder};

pub const MAGIC: &[u8] = b"YaST bytecode ";

/// Version written by this build, and the newest it reads.
pub const VERSION: Version = Version { major: 1, minor: 3, release: 2 };

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub release: u32,
}

impl Version {
    pub fn is_readable_by(&self, reader: &Version) -> bool {
        self.major == reader.major && self.minor == reader.minor && self.release <= reader.release
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.release)
    }
}

// ── Header ────────────────────────────────────────────────────────────────────

fn read_number(dec: &mut Decoder<'_>) -> u32 {
    let mut n: u32 = 0;
    while let Ok(c) = dec.read_u8() {
        if !c.is_ascii_digit() {
            break;
        }
        n = n.saturating_mul(10).saturating_add(u32::from(c - b'0'));
    }
    n
}

/// Check the magic and parse the version that follows it. The version is
/// not judged here.
pub fn read_header(dec: &mut Decoder<'_>) -> Result<Version> {
    match dec.read_raw(MAGIC.len()) {
        Ok(magic) if magic == MAGIC => {}
        _ => {
            error!("not a bytecode file");
            return Err(Error::BadMagic);
        }
    }
    let major = read_number(dec);
    let minor = read_number(dec);
    let release = read_number(dec);
    Ok(Version { major, minor, release })
}

/// Header check without reading the tree.
pub fn check_header(data: &[u8]) -> Result<Version> {
    let found = read_header(&mut Decoder::new(data))?;
    accept(found)?;
    Ok(found)
}

fn accept(found: Version) -> Result<()> {
    if found.is_readable_by(&VERSION) {
        return Ok(());
    }
    error!("bytecode version {} does not match {}", found, VERSION);
    Err(Error::VersionMismatch { found, expected: VERSION })
}

// ── Bytes ─────────────────────────────────────────────────────────────────────

/// Encode `root` behind a header. The stack is tared for the duration, so
/// the tree's namespaces are numbered from zero.
pub fn write_bytes(stack: &mut NamespaceStack, root: &Node) -> Result<Vec<u8>> {
    let mut enc = Encoder::new();
    enc.write_raw(MAGIC);
    enc.write_raw(VERSION.to_string().as_bytes());
    enc.write_u8(0);

    let depth = stack.depth();
    let tare = stack.tare();
    let mut writer = CodeWriter::with_encoder(enc, stack);
    let result = writer.write_code(root);
    let bytes = writer.finish();
    let dropped = stack.unwind_to(depth);
    if dropped > 0 {
        debug!("{} import namespace(s) dropped after writing", dropped);
    }
    stack.untare(tare);
    result.map(|()| bytes)
}

/// Decode a whole file image. Nothing of the tree is returned unless every
/// part of it decoded.
pub fn read_bytes(session: &mut Session, data: &[u8]) -> Result<Node> {
    let mut dec = Decoder::new(data);
    let found = read_header(&mut dec)?;
    accept(found)?;

    let mut reader = CodeReader::from_decoder(dec, session);
    let root = reader.read_code()?;
    if let Some(err) = reader.take_deferred() {
        error!("bytecode decoded with errors: {}", err);
        return Err(err);
    }
    Ok(root)
}

// ── Files ─────────────────────────────────────────────────────────────────────

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write through a sibling temporary file renamed into place, so a failed
/// save leaves any previous file intact.
pub fn write_file(stack: &mut NamespaceStack, root: &Node, path: &Path) -> Result<()> {
    let bytes = write_bytes(stack, root)?;
    let tmp = temp_path(path);
    let written = fs::File::create(&tmp).and_then(|mut f| {
        f.write_all(&bytes)?;
        f.flush()
    });
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(Error::io(&tmp, e));
    }
    fs::rename(&tmp, path).map_err(|e| Error::io(path, e))?;
    debug!("wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

pub fn read_file(session: &mut Session, path: &Path) -> Result<Node> {
    let data = fs::read(path).map_err(|e| Error::io(path, e))?;
    read_bytes(session, &data).map_err(|e| {
        warn!("reading {} failed", path.display());
        e
    })
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
