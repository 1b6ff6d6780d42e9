//! Environnement : nom → définition.

use std::collections::HashMap;

use tracing::debug;

use crate::value::{BlockId, Interner, Symbol};

/// Ce qu’un nom désigne.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Definition {
    /// Fonction nommée (son corps est un bloc de l’arène).
    Function(BlockId),
    /// Marqueur de type.
    Tag(Symbol),
}

/// Tags intégrés, un par variant de `Value`.
pub const BUILTIN_TAGS: [&str; 6] = ["int", "float", "string", "bool", "block", "tag"];

/// Table des définitions visibles. La dernière définition d’un nom gagne.
#[derive(Debug, Default)]
pub struct Environment {
    defs: HashMap<Symbol, Definition>,
}

impl Environment {
    /// Environnement pré-rempli avec les tags intégrés.
    pub fn with_builtins(interner: &mut Interner) -> Self {
        let mut env = Self::default();
        for name in BUILTIN_TAGS {
            let sym = interner.intern(name);
            env.defs.insert(sym, Definition::Tag(sym));
        }
        env
    }

    /// Définit `name` ; renvoie l’ancienne définition si elle existait.
    pub fn define(&mut self, name: Symbol, def: Definition, interner: &Interner) -> Option<Definition> {
        let old = self.defs.insert(name, def);
        if let Some(prev) = old {
            debug!(name = interner.resolve(name), ?prev, new = ?def, "declaration overrides previous definition");
        }
        old
    }

    /// Résout un nom.
    pub fn lookup(&self, name: Symbol) -> Option<Definition> { self.defs.get(&name).copied() }

    /// Nombre de noms définis.
    pub fn len(&self) -> usize { self.defs.len() }

    /// Vrai si rien n’est défini.
    pub fn is_empty(&self) -> bool { self.defs.is_empty() }
}
