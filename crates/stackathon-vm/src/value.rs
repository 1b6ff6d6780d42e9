//! Valeurs, symboles internés et arène de blocs.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use stackathon_ast::{Builtin, Instr, InstrKind, Literal, Op};
use stackathon_core::Span;

/* --------------------------- Symboles --------------------------- */

/// Nom interné (tags, mots).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(u32);

/// Table d’internement nom ⇄ `Symbol`.
#[derive(Debug, Default)]
pub struct Interner {
    names: Vec<Rc<str>>,
    index: HashMap<Rc<str>, Symbol>,
}

impl Interner {
    /// Interne `name` (idempotent).
    pub fn intern(&mut self, name: &str) -> Symbol {
        if let Some(&sym) = self.index.get(name) {
            return sym;
        }
        let sym = Symbol(u32::try_from(self.names.len()).unwrap_or(u32::MAX));
        let name: Rc<str> = Rc::from(name);
        self.names.push(Rc::clone(&name));
        self.index.insert(name, sym);
        sym
    }

    /// Symbole déjà interné, sans en créer.
    pub fn get(&self, name: &str) -> Option<Symbol> { self.index.get(name).copied() }

    /// Nom d’un symbole.
    pub fn resolve(&self, sym: Symbol) -> &str {
        self.names.get(sym.0 as usize).map_or("<?>", |s| s.as_ref())
    }
}

/* --------------------------- Valeurs --------------------------- */

/// Handle vers un bloc de l’arène.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(u32);

/// Valeur dynamique de la pile. Immuable une fois construite.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Entier 64 bits signé.
    Int(i64),
    /// Flottant 64 bits.
    Float(f64),
    /// Chaîne (partagée, immuable).
    Str(Rc<str>),
    /// Booléen.
    Bool(bool),
    /// Bloc de code (identité = handle d’arène).
    Block(BlockId),
    /// Marqueur de type (nom interné).
    Tag(Symbol),
}

impl Value {
    /// Nom du variant tel que renvoyé par `type`.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::Bool(_) => "bool",
            Self::Block(_) => "block",
            Self::Tag(_) => "tag",
        }
    }

    /// Construit une chaîne.
    pub fn str(s: impl AsRef<str>) -> Self { Self::Str(Rc::from(s.as_ref())) }
}

impl From<&Literal> for Value {
    fn from(lit: &Literal) -> Self {
        match lit {
            Literal::Int(i) => Self::Int(*i),
            Literal::Float(x) => Self::Float(*x),
            Literal::Str(s) => Self::str(s),
            Literal::Bool(b) => Self::Bool(*b),
        }
    }
}

/* --------------------------- Code abaissé --------------------------- */

/// Instruction prête à exécuter : les blocs littéraux sont déjà des handles,
/// les mots déjà internés.
#[derive(Debug, Clone)]
pub(crate) enum Code {
    Push(Value),
    Word(Symbol),
    Op(Op),
    Builtin(Builtin),
}

#[derive(Debug, Clone)]
pub(crate) struct Step {
    pub(crate) code: Code,
    pub(crate) span: Span,
}

/// Corps d’un bloc dans l’arène.
#[derive(Debug, Clone)]
pub struct BlockBody {
    pub(crate) steps: Rc<[Step]>,
    /// Instructions source (pour le rendu).
    pub source: Rc<[Instr]>,
    /// Nom de la fonction si le bloc vient d’une déclaration.
    pub name: Option<String>,
}

/// Arène des blocs ; un handle par bloc littéral, alloué au chargement.
#[derive(Debug, Default)]
pub struct BlockArena {
    blocks: Vec<BlockBody>,
}

impl BlockArena {
    /// Nombre de blocs alloués.
    pub fn len(&self) -> usize { self.blocks.len() }

    /// Vrai si aucun bloc n’est alloué.
    pub fn is_empty(&self) -> bool { self.blocks.is_empty() }

    /// Accès à un bloc.
    pub fn get(&self, id: BlockId) -> Option<&BlockBody> { self.blocks.get(id.0 as usize) }

    /// Abaisse `body` (et récursivement ses blocs littéraux) dans l’arène.
    pub(crate) fn lower(&mut self, body: &[Instr], name: Option<String>, interner: &mut Interner) -> BlockId {
        let steps: Vec<Step> = body
            .iter()
            .map(|instr| {
                let code = match &instr.kind {
                    InstrKind::Push(lit) => Code::Push(Value::from(lit)),
                    InstrKind::Block(inner) => Code::Push(Value::Block(self.lower(inner, None, interner))),
                    InstrKind::Word(w) => Code::Word(interner.intern(w)),
                    InstrKind::Op(op) => Code::Op(*op),
                    InstrKind::Builtin(b) => Code::Builtin(*b),
                };
                Step { code, span: instr.span }
            })
            .collect();
        let id = BlockId(u32::try_from(self.blocks.len()).unwrap_or(u32::MAX));
        self.blocks.push(BlockBody { steps: steps.into(), source: body.into(), name });
        id
    }
}

/* --------------------------- Rendu --------------------------- */

/// Adaptateur d’affichage d’une valeur (résout tags et blocs).
pub struct Render<'a> {
    pub(crate) value: &'a Value,
    pub(crate) interner: &'a Interner,
    pub(crate) arena: &'a BlockArena,
}

impl fmt::Display for Render<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => f.write_str(s),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Tag(sym) => f.write_str(self.interner.resolve(*sym)),
            Value::Block(id) => match self.arena.get(*id) {
                Some(body) => stackathon_ast::write_block(f, &body.source),
                None => f.write_str("{ ? }"),
            },
        }
    }
}
