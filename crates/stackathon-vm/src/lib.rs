//! stackathon-vm : évaluateur du langage Stackathon
//!
//! - `Value`       : union fermée (Int/Float/Str/Bool/Block/Tag)
//! - `BlockArena`  : un handle (`BlockId`) par bloc littéral, alloué au chargement
//! - `Environment` : nom → `Definition` (fonction ou tag), la dernière déclaration gagne
//! - `Vm`          : pile partagée, exécution, `exit` modélisé par `Flow`
//! - `Host`        : console vue par `print`/`input` (`StdHost`, `BufferHost` capturable)
//! - `LibraryLoader` : rappel utilisé pour résoudre `use <nom>`
//!
//! ```
//! use stackathon_vm::{BufferHost, NoLibraries, Vm, VmConfig};
//! use stackathon_ast::{Instr, InstrKind, Literal, Builtin, Program};
//! use stackathon_core::Span;
//!
//! let (host, out) = BufferHost::new();
//! let mut vm = Vm::new(VmConfig::default(), host);
//! let program = Program {
//!     body: vec![
//!         Instr::new(InstrKind::Push(Literal::Int(6)), Span::default()),
//!         Instr::new(InstrKind::Builtin(Builtin::Print), Span::default()),
//!     ],
//!     ..Program::default()
//! };
//! vm.run_program(&program, &mut NoLibraries).unwrap();
//! assert_eq!(out.get(), "6\n");
//! ```

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms, unused_must_use)]
#![cfg_attr(not(debug_assertions), warn(missing_docs))]

mod env;
mod error;
mod host;
mod value;
mod vm;

pub use env::{Definition, Environment, BUILTIN_TAGS};
pub use error::{RuntimeError, RuntimeErrorKind, VmResult};
pub use host::{BufferHost, Captured, Host, StdHost};
pub use value::{BlockArena, BlockBody, BlockId, Interner, Render, Symbol, Value};
pub use vm::{Flow, LibraryLoader, NoLibraries, Vm, VmConfig, DEFAULT_MAX_CALL_DEPTH};

/* -------------------------------- Prelude -------------------------------- */

/// Prelude pratique pour importer d’un coup.
pub mod prelude {
    pub use crate::{
        BufferHost, Captured, Host, LibraryLoader, NoLibraries, RuntimeError, RuntimeErrorKind,
        StdHost, Value, Vm, VmConfig, VmResult,
    };
}

/* --------------------------------- Tests --------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use stackathon_ast::Declaration;
    use stackathon_core::SourceId;
    use stackathon_parser::parse_source;

    fn vm_with_input(input: &[&str]) -> (Vm, Captured) {
        let (host, out) = BufferHost::new();
        let host = host.with_input(input.iter().copied());
        (Vm::new(VmConfig::default(), host), out)
    }

    /// Exécute `src` ; renvoie la VM (pile inspectable) et la sortie.
    fn run(src: &str) -> (Vm, String) {
        let (mut vm, out) = vm_with_input(&[]);
        let prog = parse_source(src, SourceId(0)).unwrap();
        vm.run_program(&prog, &mut NoLibraries).unwrap();
        (vm, out.get())
    }

    fn run_err(src: &str) -> RuntimeErrorKind {
        let (mut vm, _) = vm_with_input(&[]);
        let prog = parse_source(src, SourceId(0)).unwrap();
        vm.run_program(&prog, &mut NoLibraries).unwrap_err().kind
    }

    fn rendered_stack(vm: &Vm) -> Vec<String> {
        vm.stack().iter().map(|v| vm.render(v).to_string()).collect()
    }

    #[test]
    fn reference_examples() {
        assert_eq!(run("2 3 * print").1, "6\n");
        assert_eq!(run("\"Hello\" 2 / print").1, "e\n");
        assert_eq!(run("@foo { 2 + } 100 foo $ print").1, "102\n");
    }

    #[test]
    fn iterative_factorial() {
        let (vm, out) = run("@fact { 1 swap true { dup rot * swap 1 - dup 1 > } loop drop } 5 fact $ print");
        assert_eq!(out, "120\n");
        assert_eq!(vm.stack(), &[Value::Int(120)]);
    }

    #[test]
    fn print_peeks() {
        let (vm, out) = run("7 print print");
        assert_eq!(out, "7\n7\n");
        assert_eq!(vm.stack(), &[Value::Int(7)]);
        assert!(matches!(run_err("print"), RuntimeErrorKind::StackUnderflow { word: "print" }));
    }

    #[test]
    fn print_renderings() {
        let out = run("1.5 print drop 3.0 print drop true print drop \"s\" print drop int print drop { 1 { \"x\" } + } print").1;
        assert_eq!(out, "1.5\n3\ntrue\ns\nint\n{ 1 { \"x\" } + }\n");
    }

    #[test]
    fn arithmetic_and_strings() {
        let (vm, _) = run("10 4 - 2.5 * \"ab\" \"cd\" + 7 2 / 1 2 +");
        assert_eq!(rendered_stack(&vm), vec!["15", "abcd", "3", "3"]);
        assert!(matches!(run_err("1 0 /"), RuntimeErrorKind::DivisionByZero));
        assert!(matches!(run_err("\"a\" 1 +"), RuntimeErrorKind::TypeMismatch { word: "+", .. }));
        assert!(matches!(run_err("\"abc\" 5 /"), RuntimeErrorKind::IndexOutOfRange { index: 5, len: 3 }));
        assert!(matches!(run_err("1 +"), RuntimeErrorKind::StackUnderflow { word: "+" }));
    }

    #[test]
    fn comparisons_and_logic() {
        let (vm, _) = run("1 1.0 = 1 \"1\" = 2 3 < \"b\" \"a\" >= 3 3 <= 1 2 != true false & true false | true !");
        let expected: Vec<Value> = [true, false, true, true, true, true, false, true, false]
            .into_iter()
            .map(Value::Bool)
            .collect();
        assert_eq!(vm.stack(), expected.as_slice());
        assert!(matches!(run_err("1 true <"), RuntimeErrorKind::TypeMismatch { .. }));
        assert!(matches!(run_err("1 !"), RuntimeErrorKind::TypeMismatch { word: "!", .. }));
    }

    #[test]
    fn stack_words() {
        let cases = [
            ("1 2 dup", vec!["1", "2", "2"]),
            ("1 2 drop", vec!["1"]),
            ("1 2 swap", vec!["2", "1"]),
            ("1 2 depth", vec!["1", "2", "2"]),
            ("1 2 3 rot", vec!["2", "3", "1"]),
            ("1 2 3 nrot", vec!["3", "1", "2"]),
            ("1 2 over", vec!["1", "2", "1"]),
            ("1 2 tuck", vec!["2", "1", "2"]),
            ("10 20 30 2 pick", vec!["10", "20", "30", "10"]),
            ("10 20 30 0 pick", vec!["10", "20", "30", "30"]),
            ("10 20 30 2 roll", vec!["20", "30", "10"]),
            ("10 20 30 1 roll", vec!["10", "30", "20"]),
            ("1 2 3 clear", vec![]),
        ];
        for (src, want) in cases {
            let (vm, _) = run(src);
            assert_eq!(rendered_stack(&vm), want, "program: {src}");
        }
        assert!(matches!(run_err("1 2 3 pick"), RuntimeErrorKind::IndexOutOfRange { index: 3, len: 2 }));
        assert!(matches!(run_err("1 -1 roll"), RuntimeErrorKind::IndexOutOfRange { index: -1, .. }));
        assert!(matches!(run_err("1 \"x\" pick"), RuntimeErrorKind::TypeMismatch { word: "pick", .. }));
        assert!(matches!(run_err("1 rot"), RuntimeErrorKind::StackUnderflow { word: "rot" }));
    }

    #[test]
    fn type_tags_per_variant() {
        let (vm, _) = run(
            "@point 1 type int = 1.5 type float = \"s\" type string = true type bool = { } type block = point type tag = point point =",
        );
        assert_eq!(vm.stack(), vec![Value::Bool(true); 7].as_slice());
    }

    #[test]
    fn strlen_and_input() {
        let (mut vm, out) = vm_with_input(&["héllo"]);
        let prog = parse_source("input dup strlen print drop print input strlen print", SourceId(0)).unwrap();
        vm.run_program(&prog, &mut NoLibraries).unwrap();
        // seconde lecture : fin d’entrée → chaîne vide
        assert_eq!(out.get(), "5\nhéllo\n0\n");
    }

    #[test]
    fn loop_runs_exactly_five_times() {
        let (vm, out) = run("0 5 true { swap 1 + swap 1 - dup 0 > } loop drop print");
        assert_eq!(out, "5\n");
        assert_eq!(vm.stack(), &[Value::Int(5)]);
        let (vm, _) = run("5 true { 1 - dup 0 > } loop");
        assert_eq!(vm.stack(), &[Value::Int(0)]);
        let (vm, _) = run("false { 1 } loop");
        assert!(vm.stack().is_empty());
        assert!(matches!(run_err("true { 1 } loop"), RuntimeErrorKind::TypeMismatch { word: "loop", .. }));
        assert!(matches!(run_err("true { } loop"), RuntimeErrorKind::StackUnderflow { word: "loop" }));
    }

    #[test]
    fn gate_selects_branch() {
        assert_eq!(run("true { \"no\" } { \"yes\" } gate print").1, "yes\n");
        assert_eq!(run("false { \"no\" } { \"yes\" } gate print").1, "no\n");
        let (vm, _) = run("1 false { 2 } gate");
        assert_eq!(vm.stack(), &[Value::Int(1)]);
        let (vm, _) = run("true { 2 } gate");
        assert_eq!(vm.stack(), &[Value::Int(2)]);
    }

    #[test]
    fn exit_is_absorbed_by_one_boundary() {
        // `$` : le reste du bloc est sauté, l’appelant continue
        assert_eq!(run("{ 1 print exit 2 print } $ 3 print").1, "1\n3\n");
        // loop : exit termine la boucle sans dépiler de condition
        let (vm, _) = run("true { 9 exit } loop 4");
        assert_eq!(vm.stack(), &[Value::Int(9), Value::Int(4)]);
        // gate : seule la branche s’arrête
        assert_eq!(run("true { exit 1 print } gate 2 print").1, "2\n");
        // top-level : fin du programme, succès
        assert_eq!(run("1 print exit 2 print").1, "1\n");
        // un exit dans une fonction ne remonte pas au-delà de son `$`
        assert_eq!(run("@f { exit } { f $ 5 print } $ 6 print").1, "5\n6\n");
    }

    #[test]
    fn words_push_without_invoking() {
        let (vm, out) = run("@f { \"called\" print } f");
        assert_eq!(out, "");
        assert!(matches!(vm.stack(), [Value::Block(_)]));
        assert!(matches!(run_err("nope"), RuntimeErrorKind::UndefinedName(n) if n == "nope"));
    }

    #[test]
    fn block_identity() {
        let (vm, _) = run("{ 1 } dup = { 1 } { 1 } =");
        assert_eq!(vm.stack(), &[Value::Bool(true), Value::Bool(false)]);
        let (vm, _) = run("@f { } f f =");
        assert_eq!(vm.stack(), &[Value::Bool(true)]);
        // chaque passage sur un littéral rend le même handle
        let (vm, _) = run("2 true { { } swap 1 - dup 0 > } loop drop =");
        assert_eq!(vm.stack(), &[Value::Bool(true)]);
    }

    #[test]
    fn redeclaration_last_wins() {
        assert_eq!(run("@f { 1 } @f { 2 } f $ print").1, "2\n");
        // un tag peut remplacer une fonction et inversement
        let (vm, _) = run("@f { 1 } @f f type tag =");
        assert_eq!(vm.stack(), &[Value::Bool(true)]);
    }

    #[test]
    fn recursion_hits_depth_limit() {
        let (host, _) = BufferHost::new();
        let mut vm = Vm::new(VmConfig { max_call_depth: 64 }, host);
        let prog = parse_source("@r { r $ } r $", SourceId(0)).unwrap();
        let err = vm.run_program(&prog, &mut NoLibraries).unwrap_err();
        assert!(matches!(err.kind, RuntimeErrorKind::CallDepthExceeded(64)));
        assert!(err.span.is_some());
    }

    #[test]
    fn default_depth_limit_fits_a_plain_thread() {
        // thread de test ordinaire : l’erreur doit arriver avant la pile native
        let err = run_err("@r { r $ } r $");
        assert!(matches!(err, RuntimeErrorKind::CallDepthExceeded(DEFAULT_MAX_CALL_DEPTH)));
        // idem à travers loop/gate, qui empilent aussi des appels
        let err = run_err("@g { true { g $ } gate } g $");
        assert!(matches!(err, RuntimeErrorKind::CallDepthExceeded(DEFAULT_MAX_CALL_DEPTH)));
    }

    #[test]
    fn foreign_block_handles_are_rejected() {
        let (mut a, _) = vm_with_input(&[]);
        let (mut b, _) = vm_with_input(&[]);
        let prog = parse_source("{ 1 } { 2 } 3 print", SourceId(0)).unwrap();
        let entry = a.load(&prog);
        assert!(matches!(b.run(entry).unwrap_err().kind, RuntimeErrorKind::UnknownBlock(id) if id == entry));
        a.run(entry).unwrap();
    }

    #[test]
    fn errors_carry_innermost_span() {
        let src = "@f { 1 \"x\" - } f $";
        let (mut vm, _) = vm_with_input(&[]);
        let prog = parse_source(src, SourceId(0)).unwrap();
        let err = vm.run_program(&prog, &mut NoLibraries).unwrap_err();
        let span = err.span.unwrap();
        assert_eq!(&src[span.start.0 as usize..span.end.0 as usize], "-");
    }

    #[test]
    fn libraries_merge_before_local_declarations() {
        let lib = parse_source("@greet { \"lib\" print } @only { \"only\" print }", SourceId(1)).unwrap().declarations;
        let mut loader = |name: &str| -> Result<Vec<Declaration>, Box<dyn std::error::Error + Send + Sync>> {
            if name == "greetings" { Ok(lib.clone()) } else { Err(format!("no library named {name}").into()) }
        };
        let (mut vm, out) = vm_with_input(&[]);
        let prog = parse_source("use greetings greet $ only $ @greet { \"local\" print }", SourceId(0)).unwrap();
        vm.run_program(&prog, &mut loader).unwrap();
        assert_eq!(out.get(), "local\nonly\n");

        let (mut vm, _) = vm_with_input(&[]);
        let prog = parse_source("use missing", SourceId(0)).unwrap();
        let err = vm.run_program(&prog, &mut loader).unwrap_err();
        assert!(matches!(err.kind, RuntimeErrorKind::Link { ref name, .. } if name == "missing"));
    }

    #[test]
    fn use_is_never_executed() {
        let (mut vm, _) = vm_with_input(&[]);
        let prog = parse_source("use anything 1", SourceId(0)).unwrap();
        // NoLibraries refuse : l’erreur vient de la liaison, pas de l’exécution
        let err = vm.run_program(&prog, &mut NoLibraries).unwrap_err();
        assert!(matches!(err.kind, RuntimeErrorKind::Link { .. }));
        assert!(vm.stack().is_empty());
    }

    proptest! {
        #[test]
        fn dup_drop_is_identity(xs in proptest::collection::vec(any::<i64>(), 1..8)) {
            let src: Vec<String> = xs.iter().map(ToString::to_string).collect();
            let (vm, _) = run(&format!("{} dup drop", src.join(" ")));
            let want: Vec<Value> = xs.iter().copied().map(Value::Int).collect();
            prop_assert_eq!(vm.stack(), want.as_slice());
        }

        #[test]
        fn swap_swap_is_identity(a in any::<i64>(), b in any::<i64>()) {
            let (vm, _) = run(&format!("{a} {b} swap swap"));
            prop_assert_eq!(vm.stack(), &[Value::Int(a), Value::Int(b)][..]);
        }

        #[test]
        fn arithmetic_nets_one_down(a in any::<i64>(), b in 1i64..1000, op in prop::sample::select(vec!["+", "-", "*", "/"])) {
            let (vm, _) = run(&format!("{a} {b} {op}"));
            prop_assert_eq!(vm.stack().len(), 1);
        }

        #[test]
        fn string_index_in_bounds(s in "[a-z]{1,12}", seed in any::<usize>()) {
            let i = seed % s.len();
            let (vm, _) = run(&format!("\"{s}\" {i} /"));
            let want = s[i..=i].to_string();
            prop_assert_eq!(vm.stack(), &[Value::str(want)][..]);
        }
    }
}
