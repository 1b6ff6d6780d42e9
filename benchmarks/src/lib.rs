//! Corpus partagés par les benches Criterion.

use std::fmt::Write as _;

/// Snippets embarqués : (nom, source).
pub const MICRO: &[(&str, &str)] = &[
    ("arith", "1 2 + 3 * 4 - 5 / drop 1.5 2 * 0.5 + drop"),
    ("countdown", "100000 true { 1 - dup 0 > } loop drop"),
    ("strings", "0 true { \"stackathon\" 3 / \"-\" + strlen + dup 40000 < } loop drop"),
    ("calls", "@inc { 1 + } 0 true { inc $ dup 20000 < } loop drop"),
    ("gate", "0 true { dup 2 / 2 * over = { 1 + } { 3 + } gate dup 50000 < } loop drop"),
    (
        "stack_words",
        "0 true { 1 2 3 rot nrot over drop tuck drop swap 2 pick drop drop drop drop 1 + dup 20000 < } loop drop",
    ),
];

/// Source synthétique d'environ `kib` KiB (déclarations, blocs, chaînes, commentaires).
pub fn synthetic(kib: usize) -> String {
    let mut s = String::with_capacity(kib * 1024 + 128);
    let mut i = 0usize;
    while s.len() < kib * 1024 {
        let _ = writeln!(
            s,
            "; bloc {i} ;\n@f{i} {{ {i} + dup 2 * \"s{i}\\n\" strlen drop {{ 1.25 * }} drop }}\n{i} f{i} $ drop"
        );
        i += 1;
    }
    s
}

/// Déclarations seules (pour le codec), `n` fonctions.
pub fn library_source(n: usize) -> String {
    let mut s = String::new();
    for i in 0..n {
        let _ = writeln!(s, "@t{i}\n@f{i} {{ {i} + \"name{i}\" {{ dup * }} $ 2.5 / 3 pick swap drop }}");
    }
    s
}
