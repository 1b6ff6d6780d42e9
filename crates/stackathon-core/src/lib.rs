//! stackathon-core : primitives partagées
//!
//! Fournit :
//! - `SourceId`, `Pos`, `Span`, `Spanned<T>`
//! - Constantes `.stk.lib` (`MAGIC_STKLIB`, `STKLIB_VERSION`) + `SectionTag` (fourcc)
//! - IO mémoire (little-endian, via `byteorder`) : `ByteWriter`, `ByteReader`
//! - `crc32` (IEEE, via `crc32fast`)
//! - Erreurs `CoreError` + alias `CoreResult<T>`
//!
//! Features :
//! - `serde` : derive (dé)sérialisation sur les spans

#![deny(missing_docs)]

/* ─────────────────────────── Imports ─────────────────────────── */

use std::borrow::Cow;

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/* ─────────────────────────── Résultat commun ─────────────────────────── */

/// Alias résultat commun au core.
pub type CoreResult<T> = Result<T, CoreError>;

/* ─────────────────────────── Spans / Positions ─────────────────────────── */

/// Identifiant de source (fichier, bibliothèque chargée, buffer…).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SourceId(pub u32);

/// Position (offset byte) depuis le début de la source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Pos(pub u32);

impl Pos {
    /// Position nulle.
    pub const ZERO: Self = Self(0);
    /// Addition saturée.
    #[must_use]
    pub const fn saturating_add(self, v: u32) -> Self { Self(self.0.saturating_add(v)) }
}

/// Plage (demi-ouverte) `[start, end)` dans une source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Span {
    /// Source d’où provient l’item.
    pub source: SourceId,
    /// Début inclus.
    pub start: Pos,
    /// Fin exclue.
    pub end: Pos,
}

impl Span {
    /// Crée un span.
    pub const fn new(source: SourceId, start: Pos, end: Pos) -> Self { Self { source, start, end } }
    /// Longueur en bytes.
    pub const fn len(&self) -> u32 { self.end.0.saturating_sub(self.start.0) }
    /// Vrai si le span est vide.
    pub const fn is_empty(&self) -> bool { self.start.0 >= self.end.0 }
    /// Span couvrant `self` jusqu’à la fin de `other` (même source supposée).
    #[must_use]
    pub const fn to(self, other: Self) -> Self { Self { source: self.source, start: self.start, end: other.end } }
    /// Même plage, rattachée à une autre source.
    #[must_use]
    pub const fn with_source(self, source: SourceId) -> Self { Self { source, ..self } }
}

/// Wrapper utilitaire « valeur + span ».
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Spanned<T> {
    /// La valeur.
    pub value: T,
    /// La localisation.
    pub span: Span,
}

impl<T> Spanned<T> {
    /// Construit un `Spanned<T>`.
    pub const fn new(value: T, span: Span) -> Self { Self { value, span } }
    /// Applique une fonction à la valeur et conserve le span.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Spanned<U> { Spanned { value: f(self.value), span: self.span } }
}

/* ─────────────────────────── STKLIB : Constantes & Tags ─────────────────────────── */

/// Magic d’un artefact de bibliothèque : `b"STKLIB\0"`.
pub const MAGIC_STKLIB: &[u8; 7] = b"STKLIB\0";

/// Version actuelle du format `.stk.lib`.
pub const STKLIB_VERSION: u16 = 1;

/// Imbrication maximale de blocs `{ }` : bornée au parsing comme au décodage.
pub const MAX_NESTING: usize = 256;

/// Tags de section (fourcc) : exactement 4 octets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum SectionTag {
    /// DECL : table des déclarations
    DECL = u32::from_be_bytes(*b"DECL"),
    /// CRCC : CRC32 trailer (u32 LE)
    CRCC = u32::from_be_bytes(*b"CRCC"),
}

impl SectionTag {
    /// Renvoie le fourcc sous forme de 4 octets big-endian.
    pub const fn to_be_bytes(self) -> [u8; 4] { (self as u32).to_be_bytes() }
    /// Lit un tag depuis 4 octets big-endian.
    pub const fn from_be_bytes(b: [u8; 4]) -> Option<Self> {
        match u32::from_be_bytes(b) {
            x if x == Self::DECL as u32 => Some(Self::DECL),
            x if x == Self::CRCC as u32 => Some(Self::CRCC),
            _ => None,
        }
    }
}

/* ─────────────────────────── CRC32 IEEE ─────────────────────────── */

/// CRC32 (IEEE 802.3).
pub fn crc32(data: &[u8]) -> u32 { crc32fast::hash(data) }

/* ─────────────────────────── Byte Writer (LE) ─────────────────────────── */

/// Buffer d’écriture (croît automatiquement).
#[derive(Debug, Default, Clone)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    /// Crée un writer vide.
    pub const fn new() -> Self { Self { buf: Vec::new() } }
    /// Accès en lecture au contenu.
    pub fn as_slice(&self) -> &[u8] { &self.buf }
    /// Nombre d’octets écrits.
    pub fn len(&self) -> usize { self.buf.len() }
    /// Vrai si rien n’a été écrit.
    pub fn is_empty(&self) -> bool { self.buf.is_empty() }
    /// Récupère le buffer (consomme).
    pub fn into_vec(self) -> Vec<u8> { self.buf }
    /// Ajoute des octets bruts.
    pub fn write_bytes(&mut self, bytes: &[u8]) { self.buf.extend_from_slice(bytes); }
    /// Écrit un tag (fourcc big-endian).
    pub fn write_tag(&mut self, tag: SectionTag) { self.write_bytes(&tag.to_be_bytes()); }
    /// Écrit un u8.
    pub fn write_u8(&mut self, v: u8) { self.buf.push(v); }
    /// Écrit un u16 little-endian.
    pub fn write_u16_le(&mut self, v: u16) {
        let mut b = [0u8; 2];
        LittleEndian::write_u16(&mut b, v);
        self.write_bytes(&b);
    }
    /// Écrit un u32 little-endian.
    pub fn write_u32_le(&mut self, v: u32) {
        let mut b = [0u8; 4];
        LittleEndian::write_u32(&mut b, v);
        self.write_bytes(&b);
    }
    /// Écrit un i64 little-endian.
    pub fn write_i64_le(&mut self, v: i64) {
        let mut b = [0u8; 8];
        LittleEndian::write_i64(&mut b, v);
        self.write_bytes(&b);
    }
    /// Écrit un f64 little-endian (bits IEEE).
    pub fn write_f64_le(&mut self, v: f64) {
        let mut b = [0u8; 8];
        LittleEndian::write_f64(&mut b, v);
        self.write_bytes(&b);
    }
    /// Écrit une chaîne préfixée par sa longueur (u32 + UTF-8).
    pub fn write_str(&mut self, s: &str) {
        self.write_len(s.len());
        self.write_bytes(s.as_bytes());
    }
    /// Écrit une longueur en u32 (saturée : un artefact > 4 Gio n’a pas de sens ici).
    pub fn write_len(&mut self, len: usize) { self.write_u32_le(u32::try_from(len).unwrap_or(u32::MAX)); }
}

/* ─────────────────────────── Byte Reader (LE) ─────────────────────────── */

/// Lecteur séquentiel sur un slice d’octets (helpers LE).
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    off: usize,
}

impl<'a> ByteReader<'a> {
    /// Construit un lecteur.
    pub const fn new(data: &'a [u8]) -> Self { Self { data, off: 0 } }
    /// Offset courant.
    pub const fn offset(&self) -> usize { self.off }
    /// Taille restante.
    pub const fn remaining(&self) -> usize { self.data.len().saturating_sub(self.off) }

    /// Lit `n` octets (ou erreur si EOF).
    pub fn read_bytes(&mut self, n: usize) -> CoreResult<&'a [u8]> {
        if self.remaining() < n {
            return Err(CoreError::UnexpectedEof { needed: n as u64, at: self.off as u64 });
        }
        let start = self.off;
        self.off += n;
        Ok(&self.data[start..self.off])
    }

    /// Lit un tag (fourcc big-endian).
    pub fn read_tag(&mut self) -> CoreResult<SectionTag> {
        let b = self.read_bytes(4)?;
        let arr = [b[0], b[1], b[2], b[3]];
        SectionTag::from_be_bytes(arr).ok_or(CoreError::InvalidSectionTag { raw: u32::from_be_bytes(arr) })
    }

    /// Lit un u8.
    pub fn read_u8(&mut self) -> CoreResult<u8> { Ok(self.read_bytes(1)?[0]) }

    /// Lit un u16 LE.
    pub fn read_u16_le(&mut self) -> CoreResult<u16> { Ok(LittleEndian::read_u16(self.read_bytes(2)?)) }

    /// Lit un u32 LE.
    pub fn read_u32_le(&mut self) -> CoreResult<u32> { Ok(LittleEndian::read_u32(self.read_bytes(4)?)) }

    /// Lit un i64 LE.
    pub fn read_i64_le(&mut self) -> CoreResult<i64> { Ok(LittleEndian::read_i64(self.read_bytes(8)?)) }

    /// Lit un f64 LE.
    pub fn read_f64_le(&mut self) -> CoreResult<f64> { Ok(LittleEndian::read_f64(self.read_bytes(8)?)) }

    /// Lit une chaîne préfixée par sa longueur (u32 + UTF-8).
    pub fn read_str(&mut self) -> CoreResult<String> {
        let len = self.read_u32_le()? as usize;
        let bytes = self.read_bytes(len)?;
        std::str::from_utf8(bytes).map(str::to_owned).map_err(|_| CoreError::InvalidUtf8)
    }
}

/* ─────────────────────────── Erreurs ─────────────────────────── */

/// Erreurs de bas niveau communes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Tag de section inconnu.
    #[error("invalid section tag: 0x{raw:08X}")]
    InvalidSectionTag {
        /// Valeur brute du tag.
        raw: u32,
    },
    /// Fin de buffer inattendue.
    #[error("unexpected EOF: need {needed} bytes at {at}")]
    UnexpectedEof {
        /// Nombre d’octets manquants.
        needed: u64,
        /// Offset où l’erreur s’est produite.
        at: u64,
    },
    /// UTF-8 invalide.
    #[error("invalid utf-8")]
    InvalidUtf8,
    /// Données corrompues (CRC / format).
    #[error("corrupted: {0}")]
    Corrupted(Cow<'static, str>),
}

impl CoreError {
    /// Construit une erreur « corrompu ».
    pub fn corrupted(msg: impl Into<Cow<'static, str>>) -> Self { Self::Corrupted(msg.into()) }
}

/* ─────────────────────────── Prélude (reexports utiles) ─────────────────────────── */

/// Prélude pratique pour importer les types/funcs clés du crate.
pub mod prelude {
    pub use super::{
        crc32, ByteReader, ByteWriter, CoreError, CoreResult, Pos, SectionTag, SourceId, Span,
        Spanned, MAGIC_STKLIB, MAX_NESTING, STKLIB_VERSION,
    };
}

/* ─────────────────────────── Tests ─────────────────────────── */

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn crc32_matches_ieee_check_value() {
        // valeur de contrôle standard pour "123456789"
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn tags_roundtrip() {
        let t = SectionTag::DECL;
        assert_eq!(SectionTag::from_be_bytes(t.to_be_bytes()), Some(t));
        assert_eq!(SectionTag::from_be_bytes(*b"NOPE"), None);
    }

    #[test]
    fn writer_reader_le() -> CoreResult<()> {
        let mut w = ByteWriter::new();
        w.write_u16_le(0xBEEF);
        w.write_u32_le(0xDEAD_BEEF);
        w.write_i64_le(-42);
        w.write_f64_le(3.5);
        w.write_str("héllo");
        w.write_tag(SectionTag::CRCC);

        let mut r = ByteReader::new(w.as_slice());
        assert_eq!(r.read_u16_le()?, 0xBEEF);
        assert_eq!(r.read_u32_le()?, 0xDEAD_BEEF);
        assert_eq!(r.read_i64_le()?, -42);
        assert_eq!(r.read_f64_le()?, 3.5);
        assert_eq!(r.read_str()?, "héllo");
        assert_eq!(r.read_tag()?, SectionTag::CRCC);
        assert_eq!(r.remaining(), 0);
        Ok(())
    }

    #[test]
    fn reader_reports_eof() {
        let mut r = ByteReader::new(&[1, 2]);
        assert_eq!(r.read_u32_le(), Err(CoreError::UnexpectedEof { needed: 4, at: 0 }));
    }

    #[test]
    fn span_join() {
        let a = Span::new(SourceId(1), Pos(2), Pos(4));
        let b = Span::new(SourceId(1), Pos(7), Pos(9));
        assert_eq!(a.to(b), Span::new(SourceId(1), Pos(2), Pos(9)));
        assert_eq!(a.to(b).len(), 7);
    }
}
