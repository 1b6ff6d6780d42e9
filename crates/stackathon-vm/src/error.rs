//! Erreurs d’exécution.

use std::error::Error as StdError;
use std::io;

use stackathon_core::Span;

use crate::value::BlockId;
use thiserror::Error;

/// Genre d’erreur d’exécution.
#[derive(Debug, Error)]
pub enum RuntimeErrorKind {
    /// Pas assez de valeurs sur la pile.
    #[error("stack underflow: `{word}` needs more values than the stack holds")]
    StackUnderflow {
        /// Mot ou opérateur fautif.
        word: &'static str,
    },

    /// Types d’opérandes non supportés.
    #[error("type mismatch: `{word}` cannot operate on {found}")]
    TypeMismatch {
        /// Mot ou opérateur fautif.
        word: &'static str,
        /// Types effectivement trouvés (ex. `string and bool`).
        found: String,
    },

    /// Index hors bornes (indexation de chaîne, `pick`, `roll`).
    #[error("index out of range: {index} (length {len})")]
    IndexOutOfRange {
        /// Index demandé.
        index: i64,
        /// Longueur disponible.
        len: usize,
    },

    /// Division entière par zéro.
    #[error("division by zero")]
    DivisionByZero,

    /// Identifiant nu sans définition.
    #[error("undefined name: `{0}`")]
    UndefinedName(String),

    /// Imbrication d’appels trop profonde.
    #[error("call depth exceeded (limit {0})")]
    CallDepthExceeded(usize),

    /// `BlockId` absent de l’arène (handle venu d’une autre VM).
    #[error("unknown block handle {0:?}")]
    UnknownBlock(BlockId),

    /// I/O hôte (`print`, `input`).
    #[error("io: {0}")]
    Io(#[from] io::Error),

    /// Bibliothèque `use` introuvable ou illisible.
    #[error("cannot load library `{name}`: {source}")]
    Link {
        /// Nom demandé par `use`.
        name: String,
        /// Cause remontée par le chargeur.
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

/// Erreur d’exécution localisée (si une instruction est en cause).
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct RuntimeError {
    /// Genre d’erreur.
    pub kind: RuntimeErrorKind,
    /// Instruction fautive (la plus interne).
    pub span: Option<Span>,
}

impl RuntimeError {
    /// Attache `span` si l’erreur n’est pas encore localisée.
    #[must_use]
    pub fn at(mut self, span: Span) -> Self {
        self.span.get_or_insert(span);
        self
    }
}

impl From<RuntimeErrorKind> for RuntimeError {
    fn from(kind: RuntimeErrorKind) -> Self { Self { kind, span: None } }
}

impl From<io::Error> for RuntimeError {
    fn from(e: io::Error) -> Self { RuntimeErrorKind::Io(e).into() }
}

/// Résultat de la VM.
pub type VmResult<T> = Result<T, RuntimeError>;
