//! stackathon-lexer : analyse lexicale pour Stackathon
//!
//! Faits saillants :
//! - `Lexer` + `LexerOptions` : commentaires `; … ;` (multi-lignes), identifiants/mots-clés,
//!   entiers et flottants signés (`-7`, `.5`, `3.`), **chaînes** avec échappements
//! - opérateurs `+ - * / ! = != < <= > >= & |` et ponctuation `@ $ { }`
//! - `Span`/`Spanned`/`SourceId` + **LineMap** pour `(ligne, colonne)`
//! - Erreurs `thiserror` + spans précis ; aucun caractère n’est ignoré en silence
//!
//! Exemple éclair :
//! ```
//! use stackathon_core::SourceId;
//! use stackathon_lexer::{tokenize, TokenKind};
//!
//! let toks = tokenize("2 3 * print ; commentaire ;", SourceId(0)).unwrap();
//! assert!(matches!(toks[0].value, TokenKind::Int(2)));
//! assert!(matches!(toks.last().unwrap().value, TokenKind::Eof));
//! ```

#![deny(missing_docs)]

use std::fmt;

use log::{debug, trace};
use thiserror::Error;

use stackathon_core::{Pos, SourceId, Span, Spanned};

/* ─────────────────────────── Options & LineMap ─────────────────────────── */

/// Options du lexer.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexerOptions {
    /// Rejeter les échappements inconnus (`"\q"`) au lieu de les garder tels quels.
    pub strict_escapes: bool,
}

/// Table des lignes pour (byte offset) → (ligne, colonne).
#[derive(Debug, Clone)]
pub struct LineMap {
    /// Offsets des débuts de lignes (toujours contient 0).
    pub line_starts: Vec<u32>,
}

impl LineMap {
    /// Construit la table à partir d’un `&str`.
    pub fn new(src: &str) -> Self {
        let mut ls = Vec::with_capacity(64);
        ls.push(0);
        for (i, b) in src.bytes().enumerate() {
            if b == b'\n' {
                ls.push(to_u32(i + 1));
            }
        }
        Self { line_starts: ls }
    }

    /// Convertit un `Pos` en (ligne, colonne), 1-based. Colonne en octets.
    pub fn line_col(&self, pos: Pos) -> (u32, u32) {
        let off = pos.0;
        let idx = match self.line_starts.binary_search(&off) {
            Ok(i) => i,
            Err(i) => i.saturating_sub(1),
        };
        let line_start = self.line_starts[idx];
        let col = off.saturating_sub(line_start) + 1;
        (to_u32(idx) + 1, col)
    }

    /// Plage d’octets `[début, fin)` de la ligne `line` (1-based), sans le `\n`.
    pub fn line_range(&self, line: u32, src_len: usize) -> Option<(usize, usize)> {
        let idx = (line as usize).checked_sub(1)?;
        let start = *self.line_starts.get(idx)? as usize;
        let end = self.line_starts.get(idx + 1).map_or(src_len, |&n| (n as usize).saturating_sub(1));
        Some((start, end.max(start)))
    }
}

/* ─────────────────────────── Tokens ─────────────────────────── */

/// Mots-clés reconnus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    /// `true`
    True,
    /// `false`
    False,
    /// `use`
    Use,
    /// `print`
    Print,
    /// `exit`
    Exit,
    /// `loop`
    Loop,
    /// `gate`
    Gate,
    /// `dup`
    Dup,
    /// `drop`
    Drop,
    /// `swap`
    Swap,
    /// `depth`
    Depth,
    /// `rot`
    Rot,
    /// `nrot`
    Nrot,
    /// `over`
    Over,
    /// `tuck`
    Tuck,
    /// `pick`
    Pick,
    /// `roll`
    Roll,
    /// `clear`
    Clear,
    /// `type`
    Type,
    /// `input`
    Input,
    /// `strlen`
    Strlen,
}

impl Keyword {
    /// Texte source du mot-clé.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::True => "true",
            Self::False => "false",
            Self::Use => "use",
            Self::Print => "print",
            Self::Exit => "exit",
            Self::Loop => "loop",
            Self::Gate => "gate",
            Self::Dup => "dup",
            Self::Drop => "drop",
            Self::Swap => "swap",
            Self::Depth => "depth",
            Self::Rot => "rot",
            Self::Nrot => "nrot",
            Self::Over => "over",
            Self::Tuck => "tuck",
            Self::Pick => "pick",
            Self::Roll => "roll",
            Self::Clear => "clear",
            Self::Type => "type",
            Self::Input => "input",
            Self::Strlen => "strlen",
        }
    }
}

/// Genre de jeton lexical.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind<'a> {
    /// Fin de fichier.
    Eof,
    /// Identifiant (hors mots-clés).
    Ident(&'a str),
    /// Mot-clé.
    Kw(Keyword),
    /// Littéral entier (i64).
    Int(i64),
    /// Littéral flottant (f64).
    Float(f64),
    /// Littéral chaîne (décodée).
    Str(String),
    /// `@`
    At,
    /// `$`
    Dollar,
    /// `{`
    LBrace,
    /// `}`
    RBrace,
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Star,
    /// `/`
    Slash,
    /// `!`
    Bang,
    /// `=`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `&`
    Amp,
    /// `|`
    Pipe,
}

impl fmt::Display for TokenKind<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use TokenKind::*;
        match self {
            Eof => f.write_str("end of input"),
            Ident(s) => write!(f, "identifier `{s}`"),
            Kw(k) => write!(f, "keyword `{}`", k.as_str()),
            Int(i) => write!(f, "integer `{i}`"),
            Float(x) => write!(f, "float `{x:?}`"),
            Str(s) => write!(f, "string {s:?}"),
            At => f.write_str("`@`"),
            Dollar => f.write_str("`$`"),
            LBrace => f.write_str("`{`"),
            RBrace => f.write_str("`}`"),
            Plus => f.write_str("`+`"),
            Minus => f.write_str("`-`"),
            Star => f.write_str("`*`"),
            Slash => f.write_str("`/`"),
            Bang => f.write_str("`!`"),
            Eq => f.write_str("`=`"),
            Ne => f.write_str("`!=`"),
            Lt => f.write_str("`<`"),
            Le => f.write_str("`<=`"),
            Gt => f.write_str("`>`"),
            Ge => f.write_str("`>=`"),
            Amp => f.write_str("`&`"),
            Pipe => f.write_str("`|`"),
        }
    }
}

/// Jeton avec span.
pub type Token<'a> = Spanned<TokenKind<'a>>;

/* ─────────────────────────── Erreurs ─────────────────────────── */

/// Genre d’erreur lexicale.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexErrorKind {
    /// Caractère inattendu.
    #[error("unexpected character: {0:?}")]
    UnexpectedChar(char),
    /// `;` ouvrant sans `;` fermant.
    #[error("unterminated comment")]
    UnterminatedComment,
    /// Chaîne non terminée.
    #[error("unterminated string literal")]
    UnterminatedString,
    /// Séquence d’échappement invalide (mode strict).
    #[error("invalid escape sequence: \\{0}")]
    InvalidEscape(char),
    /// Littéral numérique invalide.
    #[error("invalid number literal")]
    InvalidNumber,
    /// Dépassement entier i64.
    #[error("integer literal overflows i64")]
    IntOverflow,
}

/// Erreur lexicale avec localisation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}")]
pub struct LexError {
    /// Localisation.
    pub span: Span,
    /// Genre d’erreur.
    pub kind: LexErrorKind,
}

/* ─────────────────────────── Lexer ─────────────────────────── */

/// Analyseur lexical (itératif).
pub struct Lexer<'a> {
    src: &'a str,
    /// Position courante en bytes.
    off: usize,
    /// Id de la source.
    source: SourceId,
    /// Options.
    opts: LexerOptions,
    /// Table des lignes (exposée pour diagnostics).
    pub lines: LineMap,
}

impl<'a> Lexer<'a> {
    /// Crée un lexer avec options par défaut.
    pub fn new(src: &'a str, source: SourceId) -> Self {
        Self::with_options(src, source, LexerOptions::default())
    }

    /// Crée un lexer avec `LexerOptions`.
    pub fn with_options(src: &'a str, source: SourceId, opts: LexerOptions) -> Self {
        Self { src, off: 0, source, opts, lines: LineMap::new(src) }
    }

    /// Prochain jeton ; émet `Eof` une fois la source épuisée.
    pub fn next(&mut self) -> Result<Token<'a>, LexError> {
        self.skip_ws_and_comments()?;
        let start = self.off;
        let Some(c) = self.bump() else {
            return Ok(Spanned::new(TokenKind::Eof, self.span_from(start)));
        };

        let kind = match c {
            ch if is_ident_start(ch) => {
                self.consume_while(is_ident_continue);
                let s = &self.src[start..self.off];
                keyword_of(s).map_or(TokenKind::Ident(s), TokenKind::Kw)
            }
            ch if ch.is_ascii_digit() => self.lex_number(start)?,
            '.' if self.peek().is_some_and(|d| d.is_ascii_digit()) => self.lex_number(start)?,
            '-' if self.starts_number() => self.lex_number(start)?,
            '"' => TokenKind::Str(self.lex_string(start)?),

            '!' => if self.eat('=') { TokenKind::Ne } else { TokenKind::Bang },
            '<' => if self.eat('=') { TokenKind::Le } else { TokenKind::Lt },
            '>' => if self.eat('=') { TokenKind::Ge } else { TokenKind::Gt },

            '@' => TokenKind::At,
            '$' => TokenKind::Dollar,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '=' => TokenKind::Eq,
            '&' => TokenKind::Amp,
            '|' => TokenKind::Pipe,

            other => return Err(self.err_from(start, LexErrorKind::UnexpectedChar(other))),
        };

        let tok = Spanned::new(kind, self.span_from(start));
        trace!("token {:?} @ {}..{}", tok.value, tok.span.start.0, tok.span.end.0);
        Ok(tok)
    }

    /// Tokenise toute la source (ajoute `Eof` final).
    pub fn tokenize(mut self) -> Result<Vec<Token<'a>>, LexError> {
        let mut out = Vec::new();
        loop {
            let t = self.next()?;
            let is_eof = matches!(t.value, TokenKind::Eof);
            out.push(t);
            if is_eof {
                break;
            }
        }
        debug!("lexed {} tokens from source {}", out.len(), self.source.0);
        Ok(out)
    }

    /* ────────── Primitives internes ────────── */

    #[inline] fn peek(&self) -> Option<char> { self.src[self.off..].chars().next() }
    #[inline] fn peek2(&self) -> Option<char> { self.src[self.off..].chars().nth(1) }
    #[inline] fn bump(&mut self) -> Option<char> { let c = self.peek()?; self.off += c.len_utf8(); Some(c) }
    #[inline] fn eat(&mut self, ch: char) -> bool { if self.peek() == Some(ch) { self.off += ch.len_utf8(); true } else { false } }

    fn consume_while(&mut self, mut p: impl FnMut(char) -> bool) {
        while let Some(c) = self.peek() {
            if p(c) { self.off += c.len_utf8(); } else { break; }
        }
    }

    /// `-` déjà consommé : vrai si la suite forme un littéral (`-7`, `-.5`).
    fn starts_number(&self) -> bool {
        match self.peek() {
            Some(d) if d.is_ascii_digit() => true,
            Some('.') => self.peek2().is_some_and(|d| d.is_ascii_digit()),
            _ => false,
        }
    }

    fn skip_ws_and_comments(&mut self) -> Result<(), LexError> {
        loop {
            self.consume_while(char::is_whitespace);
            if self.peek() != Some(';') {
                return Ok(());
            }
            let start = self.off;
            self.off += 1;
            match self.src[self.off..].find(';') {
                Some(rel) => self.off += rel + 1,
                None => {
                    self.off = self.src.len();
                    return Err(LexError {
                        span: Span::new(self.source, Pos(to_u32(start)), Pos(to_u32(start + 1))),
                        kind: LexErrorKind::UnterminatedComment,
                    });
                }
            }
        }
    }

    fn lex_string(&mut self, start_quote: usize) -> Result<String, LexError> {
        let mut out = String::new();
        loop {
            let c = self.bump().ok_or_else(|| self.err_from(start_quote, LexErrorKind::UnterminatedString))?;
            match c {
                '"' => break,
                '\\' => {
                    let esc_start = self.off - 1;
                    let esc = self.bump().ok_or_else(|| self.err_from(start_quote, LexErrorKind::UnterminatedString))?;
                    match esc {
                        '"' => out.push('"'),
                        '\\' => out.push('\\'),
                        'n' => out.push('\n'),
                        'r' => out.push('\r'),
                        't' => out.push('\t'),
                        '0' => out.push('\0'),
                        other if self.opts.strict_escapes => {
                            return Err(self.err_from(esc_start, LexErrorKind::InvalidEscape(other)));
                        }
                        other => {
                            out.push('\\');
                            out.push(other);
                        }
                    }
                }
                other => out.push(other),
            }
        }
        Ok(out)
    }

    /// Le premier caractère (chiffre, `.` ou `-`) est déjà consommé.
    fn lex_number(&mut self, start: usize) -> Result<TokenKind<'a>, LexError> {
        self.consume_while(|c| c.is_ascii_digit());
        let mut saw_dot = self.src[start..self.off].contains('.');
        if !saw_dot && self.eat('.') {
            saw_dot = true;
            self.consume_while(|c| c.is_ascii_digit());
        }
        if self.peek().is_some_and(|c| is_ident_continue(c) || c == '.' || c == '"') {
            self.consume_while(|c| is_ident_continue(c) || c == '.');
            return Err(self.err_from(start, LexErrorKind::InvalidNumber));
        }

        let raw = &self.src[start..self.off];
        if saw_dot {
            raw.parse::<f64>()
                .map(TokenKind::Float)
                .map_err(|_| self.err_from(start, LexErrorKind::InvalidNumber))
        } else {
            raw.parse::<i64>()
                .map(TokenKind::Int)
                .map_err(|_| self.err_from(start, LexErrorKind::IntOverflow))
        }
    }

    /* ────────── Spans / erreurs ────────── */

    #[inline] fn span_from(&self, start: usize) -> Span {
        Span::new(self.source, Pos(to_u32(start)), Pos(to_u32(self.off)))
    }
    #[inline] fn err_from(&self, start: usize, kind: LexErrorKind) -> LexError { LexError { span: self.span_from(start), kind } }
}

/* ─────────────────────────── API simple ─────────────────────────── */

/// Tokenise `src` avec les options par défaut.
pub fn tokenize(src: &str, source: SourceId) -> Result<Vec<Token<'_>>, LexError> {
    Lexer::new(src, source).tokenize()
}

/// Tokenise `src` avec des options explicites.
pub fn tokenize_with(src: &str, source: SourceId, opts: LexerOptions) -> Result<Vec<Token<'_>>, LexError> {
    Lexer::with_options(src, source, opts).tokenize()
}

/* ─────────────────────────── Helpers ─────────────────────────── */

#[inline]
fn is_ident_start(c: char) -> bool { c == '_' || c.is_ascii_alphabetic() }

#[inline]
fn is_ident_continue(c: char) -> bool { c == '_' || c.is_ascii_alphanumeric() }

#[inline]
fn to_u32(n: usize) -> u32 { u32::try_from(n).unwrap_or(u32::MAX) }

#[inline]
fn keyword_of(s: &str) -> Option<Keyword> {
    use Keyword::*;
    Some(match s {
        "true" => True,
        "false" => False,
        "use" => Use,
        "print" => Print,
        "exit" => Exit,
        "loop" => Loop,
        "gate" => Gate,
        "dup" => Dup,
        "drop" => Drop,
        "swap" => Swap,
        "depth" => Depth,
        "rot" => Rot,
        "nrot" => Nrot,
        "over" => Over,
        "tuck" => Tuck,
        "pick" => Pick,
        "roll" => Roll,
        "clear" => Clear,
        "type" => Type,
        "input" => Input,
        "strlen" => Strlen,
        _ => return None,
    })
}

/* ─────────────────────────── Tests ─────────────────────────── */
