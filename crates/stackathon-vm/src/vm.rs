//! Évaluateur : exécute les blocs de l’arène sur la pile partagée.

use std::cmp::Ordering;
use std::error::Error as StdError;
use std::rc::Rc;

use stackathon_ast::{Builtin, DeclKind, Declaration, Op, Program};
use stackathon_core::Spanned;
use tracing::{debug, info, trace};

use crate::env::{Definition, Environment};
use crate::error::{RuntimeError, RuntimeErrorKind, VmResult};
use crate::host::{Host, StdHost};
use crate::value::{BlockArena, BlockId, Code, Interner, Render, Step, Value};

/* --------------------------- Configuration --------------------------- */

/// Profondeur d’appel par défaut : tient sur la pile native d’un thread
/// ordinaire (2 MiB). Au-delà, il faut exécuter la VM sur un thread plus grand.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 512;

/// Réglages de la VM.
#[derive(Debug, Clone, Copy)]
pub struct VmConfig {
    /// Profondeur maximale d’imbrication de blocs (`$`, corps de `loop`, branches de `gate`).
    pub max_call_depth: usize,
}

impl Default for VmConfig {
    fn default() -> Self { Self { max_call_depth: DEFAULT_MAX_CALL_DEPTH } }
}

/// Issue de l’exécution d’un bloc.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Fin normale.
    Normal,
    /// `exit` rencontré : le bloc courant s’arrête.
    Exited,
}

/* --------------------------- Bibliothèques --------------------------- */

/// Source des déclarations demandées par `use <nom>`.
pub trait LibraryLoader {
    /// Charge la bibliothèque `name`.
    fn load(&mut self, name: &str) -> Result<Vec<Declaration>, Box<dyn StdError + Send + Sync>>;
}

impl<F> LibraryLoader for F
where
    F: FnMut(&str) -> Result<Vec<Declaration>, Box<dyn StdError + Send + Sync>>,
{
    fn load(&mut self, name: &str) -> Result<Vec<Declaration>, Box<dyn StdError + Send + Sync>> { self(name) }
}

/// Chargeur vide : toute directive `use` échoue.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLibraries;

impl LibraryLoader for NoLibraries {
    fn load(&mut self, name: &str) -> Result<Vec<Declaration>, Box<dyn StdError + Send + Sync>> {
        Err(format!("no library loader configured for `{name}`").into())
    }
}

/* --------------------------- VM --------------------------- */

/// Machine : pile, environnement, arène, interner et hôte. Rien n’est global.
pub struct Vm {
    config: VmConfig,
    stack: Vec<Value>,
    env: Environment,
    arena: BlockArena,
    interner: Interner,
    host: Box<dyn Host>,
    depth: usize,
}

impl Vm {
    /// Crée une VM avec un hôte donné.
    pub fn new(config: VmConfig, host: impl Host + 'static) -> Self {
        let mut interner = Interner::default();
        let env = Environment::with_builtins(&mut interner);
        Self { config, stack: Vec::new(), env, arena: BlockArena::default(), interner, host: Box::new(host), depth: 0 }
    }

    /// VM branchée sur stdin/stdout.
    pub fn with_std_host(config: VmConfig) -> Self { Self::new(config, StdHost) }

    /// Pile courante (sommet en dernier).
    pub fn stack(&self) -> &[Value] { &self.stack }

    /// Table des symboles.
    pub const fn interner(&self) -> &Interner { &self.interner }

    /// Arène des blocs.
    pub const fn arena(&self) -> &BlockArena { &self.arena }

    /// Environnement courant.
    pub const fn environment(&self) -> &Environment { &self.env }

    /// Adaptateur `Display` d’une valeur (même rendu que `print`).
    pub const fn render<'a>(&'a self, value: &'a Value) -> Render<'a> {
        Render { value, interner: &self.interner, arena: &self.arena }
    }

    /// Valeur `Tag` pour `name` (interné au besoin).
    pub fn tag(&mut self, name: &str) -> Value { Value::Tag(self.interner.intern(name)) }

    /* ---------- Chargement ---------- */

    /// Fusionne des déclarations dans l’environnement, dans l’ordre ; la dernière gagne.
    pub fn merge(&mut self, decls: &[Declaration]) {
        for decl in decls {
            let name = self.interner.intern(&decl.name);
            let def = match &decl.kind {
                DeclKind::Tag => Definition::Tag(name),
                DeclKind::Function(body) => {
                    Definition::Function(self.arena.lower(body, Some(decl.name.clone()), &mut self.interner))
                }
            };
            self.env.define(name, def, &self.interner);
        }
    }

    /// Abaisse le flux d’instructions du programme ; renvoie le bloc d’entrée.
    /// Les déclarations ne sont pas fusionnées ici (voir `merge`).
    pub fn load(&mut self, program: &Program) -> BlockId {
        self.arena.lower(&program.body, None, &mut self.interner)
    }

    /// Résout les `use` via `loader` et fusionne leurs déclarations.
    pub fn link(&mut self, uses: &[Spanned<String>], loader: &mut dyn LibraryLoader) -> VmResult<()> {
        for u in uses {
            let decls = loader.load(&u.value).map_err(|source| {
                RuntimeError::from(RuntimeErrorKind::Link { name: u.value.clone(), source }).at(u.span)
            })?;
            info!(library = %u.value, declarations = decls.len(), "library merged");
            self.merge(&decls);
        }
        Ok(())
    }

    /// Exécute le bloc d’entrée. Un `exit` top-level termine avec succès.
    pub fn run(&mut self, entry: BlockId) -> VmResult<()> {
        debug!(blocks = self.arena.len(), "run start");
        let flow = self.exec(entry)?;
        debug!(?flow, depth = self.stack.len(), "run end");
        Ok(())
    }

    /// Chemin complet : bibliothèques, puis déclarations locales, puis exécution.
    pub fn run_program(&mut self, program: &Program, loader: &mut dyn LibraryLoader) -> VmResult<()> {
        self.link(&program.uses, loader)?;
        self.merge(&program.declarations);
        let entry = self.load(program);
        self.run(entry)
    }

    /* ---------- Exécution ---------- */

    fn exec(&mut self, id: BlockId) -> VmResult<Flow> {
        // un handle d'une autre VM n'a rien à faire ici
        let Some(body) = self.arena.get(id) else { return Err(RuntimeErrorKind::UnknownBlock(id).into()) };
        let steps: Rc<[Step]> = Rc::clone(&body.steps);
        for step in steps.iter() {
            trace!(code = ?step.code, depth = self.stack.len(), "step");
            if self.step(step).map_err(|e| e.at(step.span))? == Flow::Exited {
                return Ok(Flow::Exited);
            }
        }
        Ok(Flow::Normal)
    }

    /// Exécute un bloc imbriqué ; le `Flow` est rendu à l’appelant qui l’absorbe.
    fn call_block(&mut self, id: BlockId) -> VmResult<Flow> {
        if self.depth >= self.config.max_call_depth {
            return Err(RuntimeErrorKind::CallDepthExceeded(self.config.max_call_depth).into());
        }
        self.depth += 1;
        let res = self.exec(id);
        self.depth -= 1;
        res
    }

    fn step(&mut self, step: &Step) -> VmResult<Flow> {
        match &step.code {
            Code::Push(v) => self.stack.push(v.clone()),
            Code::Word(sym) => match self.env.lookup(*sym) {
                Some(Definition::Function(id)) => self.stack.push(Value::Block(id)),
                Some(Definition::Tag(tag)) => self.stack.push(Value::Tag(tag)),
                None => {
                    return Err(RuntimeErrorKind::UndefinedName(self.interner.resolve(*sym).to_owned()).into());
                }
            },
            // les mots qui rappellent la VM évitent les grosses trames de `op`/`builtin`
            Code::Op(Op::Call) => return self.call_top(),
            Code::Builtin(Builtin::Loop) => return self.run_loop(),
            Code::Builtin(Builtin::Gate) => return self.gate(),
            Code::Op(op) => return self.op(*op),
            Code::Builtin(b) => return self.builtin(*b),
        }
        Ok(Flow::Normal)
    }

    /// `$` : le `Flow` du bloc appelé est absorbé.
    fn call_top(&mut self) -> VmResult<Flow> {
        let id = self.pop_block(Op::Call.symbol())?;
        self.call_block(id)?;
        Ok(Flow::Normal)
    }

    fn run_loop(&mut self) -> VmResult<Flow> {
        let word = Builtin::Loop.name();
        let body = self.pop_block(word)?;
        let mut cond = self.pop_bool(word)?;
        while cond {
            if self.call_block(body)? == Flow::Exited {
                break;
            }
            cond = self.pop_bool(word)?;
        }
        Ok(Flow::Normal)
    }

    fn gate(&mut self) -> VmResult<Flow> {
        let word = Builtin::Gate.name();
        let on_true = self.pop_block(word)?;
        let on_false = if matches!(self.stack.last(), Some(Value::Block(_))) {
            Some(self.pop_block(word)?)
        } else {
            None
        };
        let cond = self.pop_bool(word)?;
        let branch = if cond { Some(on_true) } else { on_false };
        if let Some(branch) = branch {
            self.call_block(branch)?;
        }
        Ok(Flow::Normal)
    }

    fn op(&mut self, op: Op) -> VmResult<Flow> {
        let word = op.symbol();
        match op {
            Op::Add | Op::Sub | Op::Mul | Op::Div => {
                let (l, r) = self.pop2(word)?;
                let v = arith(op, &l, &r)?;
                self.stack.push(v);
            }
            Op::Eq | Op::Ne => {
                let (l, r) = self.pop2(word)?;
                let eq = equals(&l, &r);
                self.stack.push(Value::Bool(if op == Op::Eq { eq } else { !eq }));
            }
            Op::Lt | Op::Le | Op::Gt | Op::Ge => {
                let (l, r) = self.pop2(word)?;
                let ord = compare(word, &l, &r)?;
                let res = ord.is_some_and(|o| match op {
                    Op::Lt => o.is_lt(),
                    Op::Le => o.is_le(),
                    Op::Gt => o.is_gt(),
                    _ => o.is_ge(),
                });
                self.stack.push(Value::Bool(res));
            }
            Op::Not => {
                let b = self.pop_bool(word)?;
                self.stack.push(Value::Bool(!b));
            }
            Op::And | Op::Or => {
                let (l, r) = self.pop2(word)?;
                match (&l, &r) {
                    (Value::Bool(a), Value::Bool(b)) => {
                        self.stack.push(Value::Bool(if op == Op::And { *a && *b } else { *a || *b }));
                    }
                    _ => return Err(mismatch(word, &[&l, &r]).into()),
                }
            }
            Op::Call => return self.call_top(),
        }
        Ok(Flow::Normal)
    }

    fn builtin(&mut self, b: Builtin) -> VmResult<Flow> {
        let word = b.name();
        match b {
            Builtin::Exit => return Ok(Flow::Exited),
            Builtin::Print => {
                let top = self.stack.last().ok_or(RuntimeErrorKind::StackUnderflow { word })?;
                let line = self.render(top).to_string();
                self.host.write_line(&line)?;
            }
            Builtin::Input => {
                let line = self.host.read_line()?.unwrap_or_default();
                self.stack.push(Value::str(line));
            }
            Builtin::Strlen => {
                let s = self.pop_str(word)?;
                self.stack.push(Value::Int(count_chars(&s)));
            }
            Builtin::Type => {
                let v = self.pop(word)?;
                let tag = self.tag(v.type_name());
                self.stack.push(tag);
            }
            Builtin::Loop => return self.run_loop(),
            Builtin::Gate => return self.gate(),
            Builtin::Dup => {
                let top = self.peek(word, 0)?.clone();
                self.stack.push(top);
            }
            Builtin::Drop => {
                self.pop(word)?;
            }
            Builtin::Swap => {
                self.need(word, 2)?;
                let n = self.stack.len();
                self.stack.swap(n - 1, n - 2);
            }
            Builtin::Depth => {
                let n = i64::try_from(self.stack.len()).unwrap_or(i64::MAX);
                self.stack.push(Value::Int(n));
            }
            Builtin::Rot => {
                // a b c -- b c a
                self.need(word, 3)?;
                let a = self.stack.remove(self.stack.len() - 3);
                self.stack.push(a);
            }
            Builtin::Nrot => {
                // a b c -- c a b
                self.need(word, 3)?;
                let c = self.pop(word)?;
                let at = self.stack.len() - 2;
                self.stack.insert(at, c);
            }
            Builtin::Over => {
                let a = self.peek(word, 1)?.clone();
                self.stack.push(a);
            }
            Builtin::Tuck => {
                // a b -- b a b
                self.need(word, 2)?;
                let b = self.pop(word)?;
                let at = self.stack.len() - 1;
                self.stack.insert(at, b.clone());
                self.stack.push(b);
            }
            Builtin::Pick => {
                let n = self.pop_index(word)?;
                let v = self.stack[self.stack.len() - 1 - n].clone();
                self.stack.push(v);
            }
            Builtin::Roll => {
                let n = self.pop_index(word)?;
                let v = self.stack.remove(self.stack.len() - 1 - n);
                self.stack.push(v);
            }
            Builtin::Clear => self.stack.clear(),
        }
        Ok(Flow::Normal)
    }

    /* ---------- Accès pile ---------- */

    fn need(&self, word: &'static str, n: usize) -> VmResult<()> {
        if self.stack.len() < n {
            return Err(RuntimeErrorKind::StackUnderflow { word }.into());
        }
        Ok(())
    }

    fn peek(&self, word: &'static str, from_top: usize) -> VmResult<&Value> {
        self.need(word, from_top + 1)?;
        Ok(&self.stack[self.stack.len() - 1 - from_top])
    }

    fn pop(&mut self, word: &'static str) -> VmResult<Value> {
        self.stack.pop().ok_or_else(|| RuntimeErrorKind::StackUnderflow { word }.into())
    }

    /// Dépile (gauche, droite) ; la droite est le sommet.
    fn pop2(&mut self, word: &'static str) -> VmResult<(Value, Value)> {
        self.need(word, 2)?;
        let r = self.pop(word)?;
        let l = self.pop(word)?;
        Ok((l, r))
    }

    fn pop_bool(&mut self, word: &'static str) -> VmResult<bool> {
        match self.pop(word)? {
            Value::Bool(b) => Ok(b),
            other => Err(mismatch(word, &[&other]).into()),
        }
    }

    fn pop_block(&mut self, word: &'static str) -> VmResult<BlockId> {
        match self.pop(word)? {
            Value::Block(id) => Ok(id),
            other => Err(mismatch(word, &[&other]).into()),
        }
    }

    fn pop_str(&mut self, word: &'static str) -> VmResult<Rc<str>> {
        match self.pop(word)? {
            Value::Str(s) => Ok(s),
            other => Err(mismatch(word, &[&other]).into()),
        }
    }

    /// `n` de `pick`/`roll` : Int dans `0..depth` (profondeur après l’avoir dépilé).
    fn pop_index(&mut self, word: &'static str) -> VmResult<usize> {
        let n = match self.pop(word)? {
            Value::Int(n) => n,
            other => return Err(mismatch(word, &[&other]).into()),
        };
        let len = self.stack.len();
        match usize::try_from(n) {
            Ok(i) if i < len => Ok(i),
            _ => Err(RuntimeErrorKind::IndexOutOfRange { index: n, len }.into()),
        }
    }
}

/* --------------------------- Sémantique des opérateurs --------------------------- */

fn mismatch(word: &'static str, found: &[&Value]) -> RuntimeErrorKind {
    let found = found.iter().map(|v| v.type_name()).collect::<Vec<_>>().join(" and ");
    RuntimeErrorKind::TypeMismatch { word, found }
}

#[allow(clippy::cast_precision_loss)]
fn as_float(v: &Value) -> Option<f64> {
    match v {
        Value::Int(i) => Some(*i as f64),
        Value::Float(x) => Some(*x),
        _ => None,
    }
}

fn count_chars(s: &str) -> i64 { i64::try_from(s.chars().count()).unwrap_or(i64::MAX) }

/// `+ - * /` : Int⊕Int enveloppant, Float dès qu’un opérande l’est,
/// concaténation `+` de chaînes, indexation `/` chaîne-entier.
fn arith(op: Op, l: &Value, r: &Value) -> Result<Value, RuntimeErrorKind> {
    let word = op.symbol();
    match (op, l, r) {
        (Op::Add, Value::Str(a), Value::Str(b)) => Ok(Value::str(format!("{a}{b}"))),
        (Op::Div, Value::Str(s), Value::Int(i)) | (Op::Div, Value::Int(i), Value::Str(s)) => index_str(s, *i),
        (Op::Div, Value::Int(_), Value::Int(0)) => Err(RuntimeErrorKind::DivisionByZero),
        (_, Value::Int(a), Value::Int(b)) => Ok(Value::Int(match op {
            Op::Add => a.wrapping_add(*b),
            Op::Sub => a.wrapping_sub(*b),
            Op::Mul => a.wrapping_mul(*b),
            _ => a.wrapping_div(*b),
        })),
        _ => match (as_float(l), as_float(r)) {
            (Some(a), Some(b)) => Ok(Value::Float(match op {
                Op::Add => a + b,
                Op::Sub => a - b,
                Op::Mul => a * b,
                _ => a / b,
            })),
            _ => Err(mismatch(word, &[l, r])),
        },
    }
}

fn index_str(s: &str, index: i64) -> Result<Value, RuntimeErrorKind> {
    let out_of_range = || RuntimeErrorKind::IndexOutOfRange { index, len: s.chars().count() };
    let i = usize::try_from(index).map_err(|_| out_of_range())?;
    s.chars().nth(i).map(|c| Value::str(c.to_string())).ok_or_else(out_of_range)
}

/// `=` : numérique entre Int/Float, par valeur sinon ; variants différents → faux.
#[allow(clippy::float_cmp, clippy::cast_precision_loss)]
fn equals(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::Int(a), Value::Int(b)) => a == b,
        (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => (*a as f64) == *b,
        (Value::Float(a), Value::Float(b)) => a == b,
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Block(a), Value::Block(b)) => a == b,
        (Value::Tag(a), Value::Tag(b)) => a == b,
        _ => false,
    }
}

/// `< <= > >=` : paires numériques ou paires de chaînes. `None` si incomparable (NaN).
fn compare(word: &'static str, l: &Value, r: &Value) -> Result<Option<Ordering>, RuntimeErrorKind> {
    match (l, r) {
        (Value::Int(a), Value::Int(b)) => Ok(Some(a.cmp(b))),
        (Value::Str(a), Value::Str(b)) => Ok(Some(a.cmp(b))),
        _ => match (as_float(l), as_float(r)) {
            (Some(a), Some(b)) => Ok(a.partial_cmp(&b)),
            _ => Err(mismatch(word, &[l, r])),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn int_arith_wraps_and_truncates() {
        assert_eq!(arith(Op::Add, &Value::Int(i64::MAX), &Value::Int(1)).unwrap(), Value::Int(i64::MIN));
        assert_eq!(arith(Op::Div, &Value::Int(7), &Value::Int(-2)).unwrap(), Value::Int(-3));
        assert_eq!(arith(Op::Div, &Value::Int(i64::MIN), &Value::Int(-1)).unwrap(), Value::Int(i64::MIN));
    }

    #[test]
    fn float_promotion_and_ieee_division() {
        assert_eq!(arith(Op::Mul, &Value::Int(2), &Value::Float(1.5)).unwrap(), Value::Float(3.0));
        assert_eq!(arith(Op::Div, &Value::Float(1.0), &Value::Int(0)).unwrap(), Value::Float(f64::INFINITY));
    }

    #[test]
    fn string_indexing_both_orders() {
        assert_eq!(arith(Op::Div, &Value::str("héllo"), &Value::Int(1)).unwrap(), Value::str("é"));
        assert_eq!(arith(Op::Div, &Value::Int(0), &Value::str("abc")).unwrap(), Value::str("a"));
        assert!(matches!(
            arith(Op::Div, &Value::str("abc"), &Value::Int(3)),
            Err(RuntimeErrorKind::IndexOutOfRange { index: 3, len: 3 })
        ));
        assert!(matches!(
            arith(Op::Div, &Value::str("abc"), &Value::Int(-1)),
            Err(RuntimeErrorKind::IndexOutOfRange { index: -1, len: 3 })
        ));
    }

    #[test]
    fn mismatches() {
        assert!(matches!(
            arith(Op::Sub, &Value::str("a"), &Value::str("b")),
            Err(RuntimeErrorKind::TypeMismatch { word: "-", .. })
        ));
        assert!(matches!(compare("<", &Value::Bool(true), &Value::Int(1)), Err(RuntimeErrorKind::TypeMismatch { .. })));
    }

    #[test]
    fn equality_rules() {
        assert!(equals(&Value::Int(2), &Value::Float(2.0)));
        assert!(!equals(&Value::Int(1), &Value::Bool(true)));
        assert!(!equals(&Value::str("1"), &Value::Int(1)));
        assert!(equals(&Value::str("x"), &Value::str("x")));
    }

    #[test]
    fn ordering_rules() {
        assert_eq!(compare("<", &Value::str("abc"), &Value::str("abd")).unwrap(), Some(Ordering::Less));
        assert_eq!(compare("<", &Value::Int(3), &Value::Float(2.5)).unwrap(), Some(Ordering::Greater));
        assert_eq!(compare("<", &Value::Float(f64::NAN), &Value::Int(1)).unwrap(), None);
    }
}
