//! `stackathon` : CLI du langage Stackathon
//!
//! Ici on fait uniquement : parsing d'arguments, initialisation (logger,
//! couleur), et délégation à `stackathon_cli` (lib).

#![forbid(unsafe_code)]

use std::{
    io::{self, IsTerminal},
    path::PathBuf,
    process::ExitCode,
};

use anyhow::Result;
use clap::{ArgAction, Parser, ValueEnum};
use stackathon_cli as cli;

// ──────────────────────────── CLI (clap) ────────────────────────────

#[derive(Debug, Parser)]
#[command(
    name = "stackathon",
    version,
    about = "Stackathon : exécuter un programme .stk, compiler ou inspecter une bibliothèque .stk.lib",
    long_about = None
)]
struct Opt {
    /// Programme source (.stk), ou bibliothèque (.stk.lib) avec --inspect
    path: PathBuf,

    /// Compiler les déclarations vers `<stem>.stk.lib` au lieu d'exécuter
    #[arg(long = "lib", conflicts_with = "inspect")]
    lib: bool,

    /// Fichier de sortie pour --lib
    #[arg(short, long, requires = "lib")]
    output: Option<PathBuf>,

    /// Dossier de bibliothèques supplémentaire (répétable)
    #[arg(short = 'L', long = "lib-dir", value_name = "DIR")]
    lib_dirs: Vec<PathBuf>,

    /// Lister les déclarations d'une bibliothèque .stk.lib
    #[arg(long)]
    inspect: bool,

    /// Profondeur d'appel maximale de la VM
    #[arg(long = "max-depth", value_name = "N", default_value_t = cli::CLI_MAX_CALL_DEPTH)]
    max_depth: usize,

    /// Augmente la verbosité (-v, -vv, -vvv)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,

    /// Mode silencieux (casse la verbosité)
    #[arg(short = 'q', long = "quiet", action = ArgAction::SetTrue)]
    quiet: bool,

    /// Couleur des rapports d'erreur
    #[arg(long = "color", value_enum, default_value_t = ColorChoice::Auto)]
    color: ColorChoice,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ColorChoice {
    Auto,
    Always,
    Never,
}

// ──────────────────────────── Logger / Couleur ────────────────────────────

fn init_telemetry(verbose: u8, quiet: bool) {
    let level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    cli::init_logger(level);
}

fn use_color(choice: ColorChoice) -> bool {
    match choice {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => io::stderr().is_terminal() && std::env::var_os("NO_COLOR").is_none(),
    }
}

// ──────────────────────────── main ────────────────────────────

fn main() -> ExitCode {
    let opt = Opt::parse();
    let color = use_color(opt.color);
    init_telemetry(opt.verbose, opt.quiet);

    if let Err(e) = real_main(opt) {
        eprint!("{}", cli::render_error(&e, color));
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn real_main(opt: Opt) -> Result<()> {
    if opt.inspect {
        print!("{}", cli::inspect_library(&opt.path)?);
        return Ok(());
    }
    if opt.lib {
        let out = cli::compile_library(&opt.path, opt.output.as_deref())?;
        log::info!("wrote {}", out.display());
        return Ok(());
    }
    let run = cli::RunOptions { max_call_depth: opt.max_depth, lib_dirs: opt.lib_dirs };
    cli::run_file(&opt.path, &run)
}
