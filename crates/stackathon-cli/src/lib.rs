//! stackathon-cli : bibliothèque interne du binaire `stackathon`
//!
//! Tout ce qui touche au système de fichiers et au processus vit ici ;
//! `main.rs` ne fait que parser les arguments et initialiser logger/couleur.
//!
//! Points clés :
//! - `run_file` : source → parse → liaison des `use` → exécution (thread à grande pile)
//! - `compile_library` : déclarations d'une source → `<stem>.stk.lib`
//! - `inspect_library` : `.stk.lib` → listing des déclarations en forme source
//! - `FsLoader` : résolution des `use` (dossier source, `-L`, `STACKATHON_PATH`, cwd)
//! - `Diagnostic` : message + extrait de source avec caret (couleur optionnelle)

#![deny(unused_must_use)]
#![forbid(unsafe_code)]

use std::{
    env,
    error::Error as StdError,
    fmt::{self, Write as _},
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    thread,
    time::Instant,
};

use anyhow::{anyhow, Context, Result};
use log::{debug, info, warn};
use stackathon_ast::Declaration;
use stackathon_core::{SourceId, Span};
use stackathon_lexer::LineMap;
use stackathon_parser::parse_source;
use stackathon_vm::{Host, LibraryLoader, StdHost, Vm, VmConfig};

#[cfg(feature = "color")]
use owo_colors::{OwoColorize, Style};

/// Variable d'environnement listant des dossiers de bibliothèques.
pub const PATH_ENV: &str = "STACKATHON_PATH";

/// Extension des bibliothèques compilées.
pub const LIB_EXTENSION: &str = "stk.lib";

/// Source du programme principal ; les bibliothèques suivent (1, 2, …).
pub const MAIN_SOURCE: SourceId = SourceId(0);

/// Profondeur d'appel du binaire : `run_file` dimensionne son thread en conséquence.
pub const CLI_MAX_CALL_DEPTH: usize = 10_000;

// Pile native réservée par niveau d'appel de la VM.
const STACK_PER_CALL: usize = 16 * 1024;
const MIN_VM_STACK: usize = 16 * 1024 * 1024;

// ───────────────────────────── Options ─────────────────────────────

/// Réglages d'une exécution.
#[derive(Clone, Debug)]
pub struct RunOptions {
    /// Voir `VmConfig::max_call_depth`. Par défaut, la limite sûre sur un thread ordinaire.
    pub max_call_depth: usize,
    /// Dossiers `-L`, consultés après le dossier de la source.
    pub lib_dirs: Vec<PathBuf>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self { max_call_depth: VmConfig::default().max_call_depth, lib_dirs: Vec::new() }
    }
}

// ───────────────────────────── Initialisation ─────────────────────────────

/// Initialise le logger ; `RUST_LOG` l'emporte sur `level`.
pub fn init_logger(level: &str) {
    #[cfg(feature = "trace")]
    {
        let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
            .format_timestamp_secs()
            .try_init();
    }
    #[cfg(not(feature = "trace"))]
    let _ = level;
}

// ───────────────────────────── Exécution ─────────────────────────────

/// Exécute un programme `.stk` avec la console du processus.
///
/// L'interprète tourne sur un thread dédié dont la pile suit `max_call_depth`.
pub fn run_file(path: &Path, opts: &RunOptions) -> Result<()> {
    let src = read_source(path)?;
    let path = path.to_path_buf();
    let opts = opts.clone();
    thread::Builder::new()
        .name("stackathon-vm".into())
        .stack_size(vm_stack_bytes(opts.max_call_depth))
        .spawn(move || run_source(&path, &src, &opts, StdHost))
        .context("cannot spawn interpreter thread")?
        .join()
        .map_err(|_| anyhow!("interpreter thread panicked"))?
}

/// Exécute `src` (lu depuis `path`) avec l'hôte fourni.
///
/// Les erreurs de parse et d'exécution remontent en `Diagnostic`. Tourne sur
/// le thread appelant : `max_call_depth` doit tenir dans sa pile.
pub fn run_source(path: &Path, src: &str, opts: &RunOptions, host: impl Host + 'static) -> Result<()> {
    let file = display(path);
    let program = parse_source(src, MAIN_SOURCE)
        .map_err(|e| Sources { file: &file, text: src, libraries: &[] }.diagnose(Some(e.span), e.to_string()))?;

    let mut loader = FsLoader::for_source(path, &opts.lib_dirs);
    let mut vm = Vm::new(VmConfig { max_call_depth: opts.max_call_depth }, host);

    let start = Instant::now();
    let outcome = vm.run_program(&program, &mut loader);
    info!("{file}: ran in {} ms", start.elapsed().as_millis());

    outcome.map_err(|e| {
        let sources = Sources { file: &file, text: src, libraries: loader.loaded() };
        sources.diagnose(e.span, e.to_string())
    })?;
    Ok(())
}

fn vm_stack_bytes(max_call_depth: usize) -> usize {
    max_call_depth.saturating_mul(STACK_PER_CALL).max(MIN_VM_STACK)
}

// ───────────────────────────── Bibliothèques ─────────────────────────────

/// Compile les déclarations de `path` ; renvoie le chemin écrit.
///
/// Sans `output`, l'artefact est `<stem>.stk.lib` à côté de la source.
pub fn compile_library(path: &Path, output: Option<&Path>) -> Result<PathBuf> {
    let src = read_source(path)?;
    let file = display(path);
    let program = parse_source(&src, MAIN_SOURCE)
        .map_err(|e| Sources { file: &file, text: &src, libraries: &[] }.diagnose(Some(e.span), e.to_string()))?;

    if !program.body.is_empty() {
        warn!("{file}: top-level instructions are not stored in a library");
    }
    if !program.uses.is_empty() {
        warn!("{file}: `use` directives are not carried into the library");
    }

    let bytes = stackathon_stklib::encode(&program.declarations);
    let out = output.map_or_else(|| default_library_path(path), Path::to_path_buf);
    write_bytes_atomic(&out, &bytes).with_context(|| format!("cannot write {}", display(&out)))?;
    info!("{}: {} declarations, {} bytes", display(&out), program.declarations.len(), bytes.len());
    Ok(out)
}

/// Liste les déclarations d'une `.stk.lib`, une par ligne, en forme source.
pub fn inspect_library(path: &Path) -> Result<String> {
    let bytes = fs::read(path).with_context(|| format!("cannot read {}", display(path)))?;
    let decls = stackathon_stklib::decode(&bytes, SourceId(1))
        .with_context(|| format!("invalid library {}", display(path)))?;

    let name = path.file_name().map_or_else(|| display(path), |n| n.to_string_lossy().into_owned());
    let mut out = format!("; {name}: {} declarations ;\n", decls.len());
    for d in &decls {
        writeln!(out, "{d}")?;
    }
    Ok(out)
}

/// `dir/math.stk` → `dir/math.stk.lib`.
pub fn default_library_path(src: &Path) -> PathBuf {
    let stem = src.file_stem().and_then(|s| s.to_str()).unwrap_or("out");
    src.with_file_name(format!("{stem}.{LIB_EXTENSION}"))
}

/// Résout `use <nom>` vers `<nom>.stk.lib` dans une liste de dossiers.
#[derive(Clone, Debug, Default)]
pub struct FsLoader {
    search_dirs: Vec<PathBuf>,
    loaded: Vec<PathBuf>,
}

impl FsLoader {
    /// Chargeur sur une liste explicite de dossiers (ordre = priorité).
    pub const fn new(search_dirs: Vec<PathBuf>) -> Self { Self { search_dirs, loaded: Vec::new() } }

    /// Ordre de recherche : dossier de la source, `lib_dirs`, `STACKATHON_PATH`, cwd.
    pub fn for_source(source: &Path, lib_dirs: &[PathBuf]) -> Self {
        let mut dirs = Vec::with_capacity(lib_dirs.len() + 2);
        match source.parent() {
            Some(p) if !p.as_os_str().is_empty() => dirs.push(p.to_path_buf()),
            _ => dirs.push(PathBuf::from(".")),
        }
        dirs.extend(lib_dirs.iter().cloned());
        if let Some(paths) = env::var_os(PATH_ENV) {
            dirs.extend(env::split_paths(&paths).filter(|p| !p.as_os_str().is_empty()));
        }
        if let Ok(cwd) = env::current_dir() {
            dirs.push(cwd);
        }
        Self::new(dirs)
    }

    /// Dossiers consultés, dans l'ordre.
    pub fn search_dirs(&self) -> &[PathBuf] { &self.search_dirs }

    /// Bibliothèques chargées ; la n-ième porte `SourceId(n + 1)`.
    pub fn loaded(&self) -> &[PathBuf] { &self.loaded }

    /// Premier `<nom>.stk.lib` existant.
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        let file = format!("{name}.{LIB_EXTENSION}");
        self.search_dirs.iter().map(|d| d.join(&file)).find(|p| p.is_file())
    }
}

impl LibraryLoader for FsLoader {
    fn load(&mut self, name: &str) -> Result<Vec<Declaration>, Box<dyn StdError + Send + Sync>> {
        let Some(path) = self.resolve(name) else {
            let dirs: Vec<String> = self.search_dirs.iter().map(|d| display(d)).collect();
            return Err(format!("`{name}.{LIB_EXTENSION}` not found (searched: {})", dirs.join(", ")).into());
        };
        let bytes = fs::read(&path).map_err(|e| format!("{}: {e}", display(&path)))?;
        let id = SourceId(u32::try_from(self.loaded.len() + 1).unwrap_or(u32::MAX));
        let decls = stackathon_stklib::decode(&bytes, id).map_err(|e| format!("{}: {e}", display(&path)))?;
        debug!("use {name} -> {} ({} declarations)", display(&path), decls.len());
        self.loaded.push(path);
        Ok(decls)
    }
}

// ───────────────────────────── Diagnostics ─────────────────────────────

/// Erreur rapportée à l'utilisateur, avec sa position si connue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    /// Message principal.
    pub message: String,
    /// Où l'erreur s'est produite.
    pub location: Option<Location>,
}

/// Position d'une erreur.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Location {
    /// Dans une source dont on a le texte.
    Source {
        /// Nom du fichier.
        file: String,
        /// Ligne, 1-based.
        line: u32,
        /// Colonne en caractères, 1-based.
        col: u32,
        /// Texte de la ligne.
        text: String,
        /// Largeur du soulignement, en caractères.
        width: usize,
    },
    /// Dans une bibliothèque compilée (offset dans sa source d'origine).
    Library {
        /// Chemin de la `.stk.lib`.
        file: String,
        /// Offset d'octet.
        offset: u32,
    },
}

impl Diagnostic {
    /// Rendu multi-ligne, coloré si `color`.
    pub fn render(&self, color: bool) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}: {}", paint("error", Paint::Error, color), self.message);
        match &self.location {
            None => {}
            Some(Location::Library { file, offset }) => {
                let _ = writeln!(out, " {} {file}@{offset}", paint("-->", Paint::Gutter, color));
            }
            Some(Location::Source { file, line, col, text, width }) => {
                let gutter = line.to_string();
                let pad = " ".repeat(gutter.len());
                let bar = paint("|", Paint::Gutter, color);
                let _ = writeln!(out, "{pad}{} {file}:{line}:{col}", paint("-->", Paint::Gutter, color));
                let _ = writeln!(out, "{pad} {bar}");
                let _ = writeln!(out, "{} {bar} {text}", paint(&gutter, Paint::Gutter, color));
                let indent = " ".repeat((*col as usize).saturating_sub(1));
                let _ = writeln!(out, "{pad} {bar} {indent}{}", paint(&"^".repeat(*width), Paint::Error, color));
            }
        }
        out
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        match &self.location {
            Some(Location::Source { file, line, col, .. }) => write!(f, " at {file}:{line}:{col}"),
            Some(Location::Library { file, offset }) => write!(f, " at {file}@{offset}"),
            None => Ok(()),
        }
    }
}

impl StdError for Diagnostic {}

/// Rendu final d'une erreur pour stderr.
pub fn render_error(err: &anyhow::Error, color: bool) -> String {
    match err.downcast_ref::<Diagnostic>() {
        Some(d) => d.render(color),
        None => Diagnostic { message: format!("{err:#}"), location: None }.render(color),
    }
}

/// Textes connus pour situer un `Span`.
struct Sources<'a> {
    file: &'a str,
    text: &'a str,
    libraries: &'a [PathBuf],
}

impl Sources<'_> {
    fn diagnose(&self, span: Option<Span>, message: String) -> Diagnostic {
        Diagnostic { message, location: span.and_then(|s| self.locate(s)) }
    }

    fn locate(&self, span: Span) -> Option<Location> {
        if span.source != MAIN_SOURCE {
            let lib = self.libraries.get((span.source.0 as usize).checked_sub(1)?)?;
            return Some(Location::Library { file: display(lib), offset: span.start.0 });
        }
        let map = LineMap::new(self.text);
        let (line, _) = map.line_col(span.start);
        let (ls, le) = map.line_range(line, self.text.len())?;
        let start = (span.start.0 as usize).clamp(ls, le);
        let end = (span.end.0 as usize).clamp(start, le);
        let before = self.text.get(ls..start).unwrap_or_default();
        let col = u32::try_from(before.chars().count() + 1).unwrap_or(u32::MAX);
        let width = self.text.get(start..end).map_or(0, |s| s.chars().count()).max(1);
        let text = self.text.get(ls..le).unwrap_or_default().trim_end_matches('\r').to_owned();
        Some(Location::Source { file: self.file.to_owned(), line, col, text, width })
    }
}

// ───────────────────────────── Sorties jolies ─────────────────────────────

#[derive(Clone, Copy)]
enum Paint {
    Error,
    Gutter,
}

#[cfg(feature = "color")]
fn paint(s: &str, p: Paint, color: bool) -> String {
    if !color {
        return s.to_owned();
    }
    let style = match p {
        Paint::Error => Style::new().red().bold(),
        Paint::Gutter => Style::new().blue().bold(),
    };
    s.style(style).to_string()
}

#[cfg(not(feature = "color"))]
fn paint(s: &str, _p: Paint, _color: bool) -> String { s.to_owned() }

// ───────────────────────────── Utilitaires E/S ─────────────────────────────

fn read_source(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("cannot read {}", display(path)))
}

fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let base = path.file_name().ok_or_else(|| anyhow!("output path has no file name: {}", display(path)))?;
    let tmp = unique_tmp_path(&parent, base);
    {
        let mut w = BufWriter::new(File::create(&tmp)?);
        w.write_all(bytes)?;
        w.flush()?;
    }
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

fn unique_tmp_path(dir: &Path, base: &std::ffi::OsStr) -> PathBuf {
    let mut i = 0u32;
    loop {
        let candidate = dir.join(format!("{}.tmp{i}", base.to_string_lossy()));
        if !candidate.exists() {
            return candidate;
        }
        i = i.wrapping_add(1);
    }
}

fn display(p: &Path) -> String { p.to_string_lossy().into_owned() }

// ───────────────────────────── Tests ─────────────────────────────
