// src/lib.rs
//! Stackathon AST
//!
//! Ce crate définit la forme d’un programme Stackathon après parsing :
//! un flux d’instructions top-level, une table de déclarations et la liste
//! des directives `use`.
//!
//! - Chaque `Instr` porte son `Span` (`stackathon-core`)
//! - `Display` rend une instruction sous sa forme source (`{ 2 + }`, `"a\n"`, …)
//!
//! # Features
//! - `serde` : permet la sérialisation/désérialisation de l’arbre
//!
//! # Exemple
//! ```rust
//! use stackathon_ast::{Instr, InstrKind, Literal, Op};
//! use stackathon_core::Span;
//!
//! let body = vec![
//!     Instr::new(InstrKind::Push(Literal::Int(2)), Span::default()),
//!     Instr::new(InstrKind::Op(Op::Add), Span::default()),
//! ];
//! let block = Instr::new(InstrKind::Block(body), Span::default());
//! assert_eq!(block.to_string(), "{ 2 + }");
//! ```

#![deny(missing_docs)]

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use stackathon_core::{Span, Spanned};

/* ─────────────────────────── Programme ─────────────────────────── */

/// Un programme Stackathon complet.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Program {
    /// Instructions top-level, dans l’ordre source.
    pub body: Vec<Instr>,
    /// Déclarations (hissées), dans l’ordre source ; les doublons sont conservés.
    pub declarations: Vec<Declaration>,
    /// Directives `use <nom>`.
    pub uses: Vec<Spanned<String>>,
}

/// Déclaration top-level `@nom` ou `@nom { ... }`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Declaration {
    /// Nom déclaré.
    pub name: String,
    /// Genre (tag ou fonction).
    pub kind: DeclKind,
    /// Localisation de la déclaration.
    pub span: Span,
}

/// Genre de déclaration.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DeclKind {
    /// `@nom` : marqueur de type.
    Tag,
    /// `@nom { ... }` : fonction nommée (corps = bloc).
    Function(Vec<Instr>),
}

impl Declaration {
    /// Déclare un tag.
    pub fn tag(name: impl Into<String>, span: Span) -> Self {
        Self { name: name.into(), kind: DeclKind::Tag, span }
    }

    /// Déclare une fonction.
    pub fn function(name: impl Into<String>, body: Vec<Instr>, span: Span) -> Self {
        Self { name: name.into(), kind: DeclKind::Function(body), span }
    }
}

/* ─────────────────────────── Instructions ─────────────────────────── */

/// Instruction localisée.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Instr {
    /// Ce que fait l’instruction.
    pub kind: InstrKind,
    /// Où elle a été écrite.
    pub span: Span,
}

impl Instr {
    /// Construit une instruction.
    pub const fn new(kind: InstrKind, span: Span) -> Self { Self { kind, span } }
}

/// Genre d’instruction.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum InstrKind {
    /// Empile un littéral.
    Push(Literal),
    /// Bloc littéral `{ ... }` (séquence capturée au parsing).
    Block(Vec<Instr>),
    /// Identifiant nu : tag ou fonction, résolu à l’exécution.
    Word(String),
    /// Opérateur.
    Op(Op),
    /// Mot intégré.
    Builtin(Builtin),
}

/// Littéraux scalaires.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Literal {
    /// Entier signé 64 bits.
    Int(i64),
    /// Flottant 64 bits.
    Float(f64),
    /// Chaîne (déjà décodée).
    Str(String),
    /// Booléen.
    Bool(bool),
}

/// Opérateurs ponctuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Op {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
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
    /// `!`
    Not,
    /// `&`
    And,
    /// `|`
    Or,
    /// `$` : invoque le bloc au sommet.
    Call,
}

impl Op {
    /// Tous les opérateurs, dans l’ordre de leur code.
    pub const ALL: [Self; 14] = [
        Self::Add, Self::Sub, Self::Mul, Self::Div, Self::Eq, Self::Ne, Self::Lt,
        Self::Le, Self::Gt, Self::Ge, Self::Not, Self::And, Self::Or, Self::Call,
    ];

    /// Symbole source.
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Not => "!",
            Self::And => "&",
            Self::Or => "|",
            Self::Call => "$",
        }
    }
}

/// Mots intégrés (mots-clés hors `true`, `false`, `use`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Builtin {
    /// `print` : affiche le sommet (sans le consommer).
    Print,
    /// `exit` : quitte le bloc courant.
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

impl Builtin {
    /// Tous les mots intégrés, dans l’ordre de leur code.
    pub const ALL: [Self; 18] = [
        Self::Print, Self::Exit, Self::Loop, Self::Gate, Self::Dup, Self::Drop,
        Self::Swap, Self::Depth, Self::Rot, Self::Nrot, Self::Over, Self::Tuck,
        Self::Pick, Self::Roll, Self::Clear, Self::Type, Self::Input, Self::Strlen,
    ];

    /// Nom source.
    pub const fn name(self) -> &'static str {
        match self {
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

    /// Retrouve un mot intégré par son nom source.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.name() == name)
    }
}

/* ─────────────────────────── Rendu forme source ─────────────────────────── */

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            // `{:?}` garde toujours un point décimal (`3.0`), donc re-lexe en Float
            Self::Float(x) => write!(f, "{x:?}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Str(s) => {
                f.write_str("\"")?;
                for c in s.chars() {
                    match c {
                        '\n' => f.write_str("\\n")?,
                        '\t' => f.write_str("\\t")?,
                        '\r' => f.write_str("\\r")?,
                        '\0' => f.write_str("\\0")?,
                        '\\' => f.write_str("\\\\")?,
                        '"' => f.write_str("\\\"")?,
                        c => write!(f, "{c}")?,
                    }
                }
                f.write_str("\"")
            }
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.symbol()) }
}

impl fmt::Display for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.name()) }
}

impl fmt::Display for InstrKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Push(lit) => write!(f, "{lit}"),
            Self::Block(body) => write_block(f, body),
            Self::Word(w) => f.write_str(w),
            Self::Op(op) => write!(f, "{op}"),
            Self::Builtin(b) => write!(f, "{b}"),
        }
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { self.kind.fmt(f) }
}

impl fmt::Display for Declaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.name)?;
        if let DeclKind::Function(body) = &self.kind {
            f.write_str(" ")?;
            write_block(f, body)?;
        }
        Ok(())
    }
}

/// Écrit `{ i1 i2 … }` (ou `{ }` si vide).
pub fn write_block(f: &mut impl fmt::Write, body: &[Instr]) -> fmt::Result {
    f.write_str("{")?;
    for i in body {
        write!(f, " {i}")?;
    }
    f.write_str(" }")
}

/* ─────────────────────────── Tests ─────────────────────────── */
