//! stackathon-stklib : format binaire des bibliothèques `.stk.lib`
//!
//! Format (little-endian) :
//! ```text
//! Header : "STKLIB\0" (7 bytes) + version u16
//! [Section*]
//!   section = TAG[4] + len u32 + payload
//!   "DECL"  : count u32, puis par entrée :
//!               name (len u32 + UTF-8), span (start u32, end u32),
//!               kind u8 (0x01 = Tag, 0x02 = Function) [+ séquence si Function]
//! Trailer: "CRCC" + u32 (CRC32 sur tout ce qui suit le header)
//!
//! séquence = count u32, puis par instruction :
//!   opcode u8 + opérande + span (start u32, end u32)
//!   0x01 Int i64 | 0x02 Float f64 | 0x03 Str | 0x04 Bool u8 | 0x05 Block (séquence) | 0x06 Word
//!   0x10.. opérateurs (ordre de `Op::ALL`) | 0x30.. mots intégrés (ordre de `Builtin::ALL`)
//! ```
//!
//! API :
//! - `encode(&[Declaration]) -> Vec<u8>`
//! - `decode(&[u8], SourceId) -> Result<Vec<Declaration>, LibraryFormatError>`
//!
//! Loi : `decode(encode(d), s) == d` dès que les spans de `d` portent la source `s`.

#![deny(missing_docs)]

use stackathon_ast::{Builtin, DeclKind, Declaration, Instr, InstrKind, Literal, Op};
use stackathon_core::{
    crc32, ByteReader, ByteWriter, CoreError, Pos, SectionTag, SourceId, Span, MAGIC_STKLIB, STKLIB_VERSION,
};
use thiserror::Error;
use tracing::debug;

/* ─────────────────────────── Constantes ─────────────────────────── */

const HEADER_LEN: usize = MAGIC_STKLIB.len() + 2;

const KIND_TAG: u8 = 0x01;
const KIND_FUNCTION: u8 = 0x02;

const OP_INT: u8 = 0x01;
const OP_FLOAT: u8 = 0x02;
const OP_STR: u8 = 0x03;
const OP_BOOL: u8 = 0x04;
const OP_BLOCK: u8 = 0x05;
const OP_WORD: u8 = 0x06;
const OP_OPERATOR_BASE: u8 = 0x10;
const OP_BUILTIN_BASE: u8 = 0x30;

pub use stackathon_core::MAX_NESTING;

/* ─────────────────────────── Erreurs ─────────────────────────── */

/// Artefact `.stk.lib` illisible.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LibraryFormatError {
    /// Pas un `.stk.lib`.
    #[error("bad magic: not a .stk.lib file")]
    BadMagic,
    /// Version de format non supportée.
    #[error("unsupported .stk.lib version {found} (expected {expected})")]
    VersionMismatch {
        /// Version lue.
        found: u16,
        /// Version attendue.
        expected: u16,
    },
    /// Fin de données prématurée.
    #[error("truncated library: need {needed} bytes at offset {at}")]
    Truncated {
        /// Octets manquants.
        needed: u64,
        /// Offset de lecture.
        at: u64,
    },
    /// Tag de section inconnu.
    #[error("unknown section tag 0x{0:08X}")]
    UnknownSection(u32),
    /// Genre de déclaration inconnu.
    #[error("unknown declaration kind 0x{0:02X}")]
    UnknownKind(u8),
    /// Opcode inconnu.
    #[error("unknown opcode 0x{0:02X}")]
    UnknownOpcode(u8),
    /// Octet booléen autre que 0/1.
    #[error("invalid bool byte 0x{0:02X}")]
    InvalidBool(u8),
    /// Chaîne non UTF-8.
    #[error("invalid utf-8 in string")]
    InvalidUtf8,
    /// CRC32 du contenu différent du trailer.
    #[error("crc mismatch: stored 0x{stored:08X}, computed 0x{computed:08X}")]
    CrcMismatch {
        /// CRC du trailer.
        stored: u32,
        /// CRC recalculé.
        computed: u32,
    },
    /// Octets après le trailer ou en fin de payload.
    #[error("{0} trailing bytes")]
    TrailingBytes(usize),
    /// Blocs imbriqués au-delà de `MAX_NESTING`.
    #[error("blocks nested deeper than {MAX_NESTING}")]
    NestingTooDeep,
    /// Aucun trailer `CRCC`.
    #[error("missing CRCC trailer")]
    MissingChecksum,
    /// Autre incohérence de format.
    #[error("malformed library: {0}")]
    Malformed(String),
}

impl From<CoreError> for LibraryFormatError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::UnexpectedEof { needed, at } => Self::Truncated { needed, at },
            CoreError::InvalidSectionTag { raw } => Self::UnknownSection(raw),
            CoreError::InvalidUtf8 => Self::InvalidUtf8,
            CoreError::Corrupted(msg) => Self::Malformed(msg.into_owned()),
        }
    }
}

type LResult<T> = Result<T, LibraryFormatError>;

/* ─────────────────────────── Écriture ─────────────────────────── */

/// Sérialise une table de déclarations (avec CRC32).
pub fn encode(decls: &[Declaration]) -> Vec<u8> {
    let mut w = ByteWriter::new();

    // Magic + version
    w.write_bytes(MAGIC_STKLIB);
    w.write_u16_le(STKLIB_VERSION);

    // DECL
    let mut buf = ByteWriter::new();
    buf.write_len(decls.len());
    for d in decls {
        buf.write_str(&d.name);
        write_span(&mut buf, d.span);
        match &d.kind {
            DeclKind::Tag => buf.write_u8(KIND_TAG),
            DeclKind::Function(body) => {
                buf.write_u8(KIND_FUNCTION);
                write_seq(&mut buf, body);
            }
        }
    }
    w.write_tag(SectionTag::DECL);
    w.write_len(buf.len());
    w.write_bytes(buf.as_slice());

    // CRC32 sur tout sauf magic/version
    let crc = crc32(&w.as_slice()[HEADER_LEN..]);
    w.write_tag(SectionTag::CRCC);
    w.write_u32_le(crc);

    let out = w.into_vec();
    debug!(declarations = decls.len(), bytes = out.len(), crc, "encoded library");
    out
}

fn write_span(w: &mut ByteWriter, span: Span) {
    w.write_u32_le(span.start.0);
    w.write_u32_le(span.end.0);
}

fn write_seq(w: &mut ByteWriter, body: &[Instr]) {
    w.write_len(body.len());
    for i in body {
        match &i.kind {
            InstrKind::Push(Literal::Int(v)) => {
                w.write_u8(OP_INT);
                w.write_i64_le(*v);
            }
            InstrKind::Push(Literal::Float(v)) => {
                w.write_u8(OP_FLOAT);
                w.write_f64_le(*v);
            }
            InstrKind::Push(Literal::Str(s)) => {
                w.write_u8(OP_STR);
                w.write_str(s);
            }
            InstrKind::Push(Literal::Bool(b)) => {
                w.write_u8(OP_BOOL);
                w.write_u8(u8::from(*b));
            }
            InstrKind::Block(inner) => {
                w.write_u8(OP_BLOCK);
                write_seq(w, inner);
            }
            InstrKind::Word(name) => {
                w.write_u8(OP_WORD);
                w.write_str(name);
            }
            InstrKind::Op(op) => w.write_u8(OP_OPERATOR_BASE + op_code(*op)),
            InstrKind::Builtin(b) => w.write_u8(OP_BUILTIN_BASE + builtin_code(*b)),
        }
        write_span(w, i.span);
    }
}

fn op_code(op: Op) -> u8 {
    Op::ALL.iter().position(|o| *o == op).and_then(|p| u8::try_from(p).ok()).unwrap_or(u8::MAX)
}

fn builtin_code(b: Builtin) -> u8 {
    Builtin::ALL.iter().position(|x| *x == b).and_then(|p| u8::try_from(p).ok()).unwrap_or(u8::MAX)
}

/* ─────────────────────────── Lecture ─────────────────────────── */

/// Reconstruit la table de déclarations ; les spans reçoivent `source`.
pub fn decode(data: &[u8], source: SourceId) -> Result<Vec<Declaration>, LibraryFormatError> {
    let mut r = ByteReader::new(data);
    let magic = r.read_bytes(MAGIC_STKLIB.len()).map_err(|_| LibraryFormatError::BadMagic)?;
    if magic != MAGIC_STKLIB {
        return Err(LibraryFormatError::BadMagic);
    }
    let version = r.read_u16_le()?;
    if version != STKLIB_VERSION {
        return Err(LibraryFormatError::VersionMismatch { found: version, expected: STKLIB_VERSION });
    }

    // Passe 1 : structure + CRC, avant d’interpréter quoi que ce soit.
    let mut payloads = Vec::new();
    loop {
        if r.remaining() == 0 {
            return Err(LibraryFormatError::MissingChecksum);
        }
        let tag_at = r.offset();
        match r.read_tag()? {
            SectionTag::CRCC => {
                let stored = r.read_u32_le()?;
                let computed = crc32(&data[HEADER_LEN..tag_at]);
                if stored != computed {
                    return Err(LibraryFormatError::CrcMismatch { stored, computed });
                }
                if r.remaining() > 0 {
                    return Err(LibraryFormatError::TrailingBytes(r.remaining()));
                }
                break;
            }
            SectionTag::DECL => {
                let len = r.read_u32_le()? as usize;
                payloads.push(r.read_bytes(len)?);
            }
        }
    }

    // Passe 2 : déclarations.
    let mut out = Vec::new();
    for payload in payloads {
        let mut pr = ByteReader::new(payload);
        let count = pr.read_u32_le()? as usize;
        out.reserve(count.min(pr.remaining()));
        for _ in 0..count {
            out.push(read_decl(&mut pr, source)?);
        }
        if pr.remaining() > 0 {
            return Err(LibraryFormatError::TrailingBytes(pr.remaining()));
        }
    }
    debug!(declarations = out.len(), bytes = data.len(), "decoded library");
    Ok(out)
}

fn read_span(r: &mut ByteReader<'_>, source: SourceId) -> LResult<Span> {
    let start = r.read_u32_le()?;
    let end = r.read_u32_le()?;
    Ok(Span::new(source, Pos(start), Pos(end)))
}

fn read_decl(r: &mut ByteReader<'_>, source: SourceId) -> LResult<Declaration> {
    let name = r.read_str()?;
    let span = read_span(r, source)?;
    match r.read_u8()? {
        KIND_TAG => Ok(Declaration::tag(name, span)),
        KIND_FUNCTION => {
            let body = read_seq(r, source, 0)?;
            Ok(Declaration::function(name, body, span))
        }
        other => Err(LibraryFormatError::UnknownKind(other)),
    }
}

fn read_seq(r: &mut ByteReader<'_>, source: SourceId, depth: usize) -> LResult<Vec<Instr>> {
    if depth > MAX_NESTING {
        return Err(LibraryFormatError::NestingTooDeep);
    }
    let count = r.read_u32_le()? as usize;
    // chaque instruction occupe au moins 9 octets (opcode + span)
    let mut body = Vec::with_capacity(count.min(r.remaining() / 9));
    for _ in 0..count {
        let kind = match r.read_u8()? {
            OP_INT => InstrKind::Push(Literal::Int(r.read_i64_le()?)),
            OP_FLOAT => InstrKind::Push(Literal::Float(r.read_f64_le()?)),
            OP_STR => InstrKind::Push(Literal::Str(r.read_str()?)),
            OP_BOOL => match r.read_u8()? {
                0 => InstrKind::Push(Literal::Bool(false)),
                1 => InstrKind::Push(Literal::Bool(true)),
                other => return Err(LibraryFormatError::InvalidBool(other)),
            },
            OP_BLOCK => InstrKind::Block(read_seq(r, source, depth + 1)?),
            OP_WORD => InstrKind::Word(r.read_str()?),
            code => decode_opcode(code).ok_or(LibraryFormatError::UnknownOpcode(code))?,
        };
        let span = read_span(r, source)?;
        body.push(Instr::new(kind, span));
    }
    Ok(body)
}

fn decode_opcode(code: u8) -> Option<InstrKind> {
    if let Some(i) = code.checked_sub(OP_BUILTIN_BASE) {
        return Builtin::ALL.get(i as usize).copied().map(InstrKind::Builtin);
    }
    let i = code.checked_sub(OP_OPERATOR_BASE)?;
    Op::ALL.get(i as usize).copied().map(InstrKind::Op)
}

/* ─────────────────────────── Tests ─────────────────────────── */
