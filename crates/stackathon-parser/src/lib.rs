//! stackathon-parser : parseur du langage Stackathon
//!
//! Branches :
//! - `stackathon-lexer` pour la tokenisation
//! - `stackathon-core` pour `Span/Spanned`
//! - `stackathon-ast` pour l’arbre cible
//!
//! Grammaire :
//! ```text
//! program     := top_item* EOF
//! top_item    := declaration | use_item | instr
//! declaration := "@" IDENT block?          (IDENT collé au "@")
//! use_item    := "use" IDENT
//! instr       := literal | block | IDENT | operator | builtin
//! block       := "{" instr* "}"
//! literal     := INT | FLOAT | STRING | "true" | "false"
//! operator    := "+" | "-" | "*" | "/" | "!" | "=" | "!=" | "<" | "<="
//!              | ">" | ">=" | "&" | "|" | "$"
//! ```
//!
//! Les déclarations sont hissées : elles sortent du flux d’instructions et
//! sont visibles depuis tout le programme.

#![deny(missing_docs)]

/* ─────────────────────────── Imports ─────────────────────────── */

use log::debug;
use thiserror::Error;

use stackathon_ast::{Builtin, Declaration, Instr, InstrKind, Literal, Op, Program};
use stackathon_core::{SourceId, Span, Spanned, MAX_NESTING};
use stackathon_lexer::{tokenize_with, Keyword, LexError, LexerOptions, Token, TokenKind};

/* ─────────────────────────── Erreurs ─────────────────────────── */

/// Genre d’erreur de parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    /// `{` sans `}` correspondant.
    #[error("unclosed block: `{{` has no matching `}}`")]
    UnclosedBlock,
    /// `}` sans `{` ouvrant.
    #[error("unmatched `}}`")]
    UnmatchedBrace,
    /// `@` non suivi (immédiatement) d’un identifiant.
    #[error("malformed declaration: `@` must be immediately followed by a name that is not a keyword")]
    MalformedDeclaration,
    /// `@nom` à l’intérieur d’un bloc.
    #[error("declarations are only allowed at top level")]
    NestedDeclaration,
    /// `use` à l’intérieur d’un bloc.
    #[error("`use` is only allowed at top level")]
    NestedUse,
    /// `use` sans nom de bibliothèque.
    #[error("malformed `use`: expected a library name")]
    MalformedUse,
    /// Plus de `MAX_NESTING` blocs ouverts à la fois.
    #[error("blocks nested deeper than {MAX_NESTING}")]
    NestingTooDeep,
    /// Erreur lexicale remontée par `parse_source`.
    #[error(transparent)]
    Lex(LexError),
}

/// Erreur de parsing avec span.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}")]
pub struct ParseError {
    /// Localisation.
    pub span: Span,
    /// Genre d’erreur.
    pub kind: ParseErrorKind,
}

impl From<LexError> for ParseError {
    fn from(e: LexError) -> Self { Self { span: e.span, kind: ParseErrorKind::Lex(e) } }
}

type PResult<T> = Result<T, ParseError>;

/* ─────────────────────────── Parser ─────────────────────────── */

/// Parser Stackathon (descente récursive sur un tampon de jetons).
pub struct Parser<'a> {
    toks: Vec<Token<'a>>,
    idx: usize,
    /// Span utilisé quand le tampon est épuisé (pas d’`Eof` explicite).
    end: Span,
    /// `{` encore ouverts, du plus externe au plus interne.
    open: Vec<Span>,
}

impl<'a> Parser<'a> {
    /// Crée un parser sur une suite de jetons (normalement terminée par `Eof`).
    pub fn new(toks: Vec<Token<'a>>) -> Self {
        let end = toks.last().map(|t| Span { start: t.span.end, ..t.span }).unwrap_or_default();
        Self { toks, idx: 0, end, open: Vec::new() }
    }

    /// Parse un programme complet.
    pub fn parse_program(&mut self) -> PResult<Program> {
        let mut prog = Program::default();
        loop {
            let tok = self.peek();
            match tok.value {
                TokenKind::Eof => break,
                TokenKind::At => {
                    let decl = self.parse_declaration()?;
                    prog.declarations.push(decl);
                }
                TokenKind::Kw(Keyword::Use) => {
                    let name = self.parse_use()?;
                    prog.uses.push(name);
                }
                _ => {
                    let instr = self.parse_instr()?;
                    prog.body.push(instr);
                }
            }
        }
        debug!(
            "parsed program: {} instrs, {} declarations, {} uses",
            prog.body.len(),
            prog.declarations.len(),
            prog.uses.len()
        );
        Ok(prog)
    }

    /* ─────────── Items top-level ─────────── */

    fn parse_declaration(&mut self) -> PResult<Declaration> {
        let at = self.bump();
        let name_tok = self.peek();
        let name = match name_tok.value {
            TokenKind::Ident(name) if name_tok.span.start == at.span.end => name,
            _ => return Err(err_at(at.span.to(name_tok.span), ParseErrorKind::MalformedDeclaration)),
        };
        self.bump();

        if matches!(self.peek().value, TokenKind::LBrace) {
            let (body, span) = self.parse_block()?;
            Ok(Declaration::function(name, body, at.span.to(span)))
        } else {
            Ok(Declaration::tag(name, at.span.to(name_tok.span)))
        }
    }

    fn parse_use(&mut self) -> PResult<Spanned<String>> {
        let kw = self.bump();
        let name_tok = self.peek();
        match name_tok.value {
            TokenKind::Ident(name) => {
                self.bump();
                Ok(Spanned::new(name.to_owned(), kw.span.to(name_tok.span)))
            }
            _ => Err(err_at(kw.span, ParseErrorKind::MalformedUse)),
        }
    }

    /* ─────────── Instructions ─────────── */

    /// Parse `{ instr* }` ; renvoie le corps et le span accolades comprises.
    ///
    /// Récursion bornée par `MAX_NESTING`, la même limite que le décodeur `.stk.lib`.
    fn parse_block(&mut self) -> PResult<(Vec<Instr>, Span)> {
        let open = self.bump();
        if self.open.len() >= MAX_NESTING {
            return Err(err_at(open.span, ParseErrorKind::NestingTooDeep));
        }
        self.open.push(open.span);
        let mut body = Vec::new();
        loop {
            let tok = self.peek();
            if matches!(tok.value, TokenKind::RBrace) {
                self.bump();
                self.open.pop();
                return Ok((body, open.span.to(tok.span)));
            }
            body.push(self.parse_instr()?);
        }
    }

    /// Une instruction. Au top-level, `parse_program` a déjà traité `@`,
    /// `use` et la fin d'entrée ; ici ils ne peuvent venir que d'un bloc.
    fn parse_instr(&mut self) -> PResult<Instr> {
        let tok = self.peek();
        let kind = match tok.value {
            TokenKind::LBrace => {
                let (body, span) = self.parse_block()?;
                return Ok(Instr::new(InstrKind::Block(body), span));
            }
            TokenKind::Eof => {
                let at = self.open.last().copied().unwrap_or(tok.span);
                return Err(err_at(at, ParseErrorKind::UnclosedBlock));
            }
            TokenKind::RBrace => return Err(err_at(tok.span, ParseErrorKind::UnmatchedBrace)),
            TokenKind::At => return Err(err_at(tok.span, ParseErrorKind::NestedDeclaration)),
            TokenKind::Kw(kw) => match keyword_instr(kw) {
                Some(k) => k,
                None => return Err(err_at(tok.span, ParseErrorKind::NestedUse)),
            },
            TokenKind::Int(i) => InstrKind::Push(Literal::Int(i)),
            TokenKind::Float(x) => InstrKind::Push(Literal::Float(x)),
            TokenKind::Str(s) => InstrKind::Push(Literal::Str(s)),
            TokenKind::Ident(w) => InstrKind::Word(w.to_owned()),
            TokenKind::Plus => InstrKind::Op(Op::Add),
            TokenKind::Minus => InstrKind::Op(Op::Sub),
            TokenKind::Star => InstrKind::Op(Op::Mul),
            TokenKind::Slash => InstrKind::Op(Op::Div),
            TokenKind::Bang => InstrKind::Op(Op::Not),
            TokenKind::Eq => InstrKind::Op(Op::Eq),
            TokenKind::Ne => InstrKind::Op(Op::Ne),
            TokenKind::Lt => InstrKind::Op(Op::Lt),
            TokenKind::Le => InstrKind::Op(Op::Le),
            TokenKind::Gt => InstrKind::Op(Op::Gt),
            TokenKind::Ge => InstrKind::Op(Op::Ge),
            TokenKind::Amp => InstrKind::Op(Op::And),
            TokenKind::Pipe => InstrKind::Op(Op::Or),
            TokenKind::Dollar => InstrKind::Op(Op::Call),
        };
        self.bump();
        Ok(Instr::new(kind, tok.span))
    }

    /* ─────────── Primitives ─────────── */

    fn peek(&self) -> Token<'a> {
        self.toks.get(self.idx).cloned().unwrap_or_else(|| Spanned::new(TokenKind::Eof, self.end))
    }

    fn bump(&mut self) -> Token<'a> {
        let t = self.peek();
        if self.idx < self.toks.len() {
            self.idx += 1;
        }
        t
    }
}

/* ─────────────────────────── API simple ─────────────────────────── */

/// Parse une suite de jetons.
pub fn parse(toks: Vec<Token<'_>>) -> Result<Program, ParseError> {
    Parser::new(toks).parse_program()
}

/// Tokenise puis parse `src`.
pub fn parse_source(src: &str, source: SourceId) -> Result<Program, ParseError> {
    parse_source_with(src, source, LexerOptions::default())
}

/// Tokenise (avec options) puis parse `src`.
pub fn parse_source_with(src: &str, source: SourceId, opts: LexerOptions) -> Result<Program, ParseError> {
    let toks = tokenize_with(src, source, opts)?;
    parse(toks)
}

/* ─────────────────────────── Helpers ─────────────────────────── */

const fn err_at(span: Span, kind: ParseErrorKind) -> ParseError { ParseError { span, kind } }

/// `None` pour `use`, seul mot-clé qui n'est pas une instruction.
fn keyword_instr(kw: Keyword) -> Option<InstrKind> {
    let b = match kw {
        Keyword::True => return Some(InstrKind::Push(Literal::Bool(true))),
        Keyword::False => return Some(InstrKind::Push(Literal::Bool(false))),
        Keyword::Use => return None,
        Keyword::Print => Builtin::Print,
        Keyword::Exit => Builtin::Exit,
        Keyword::Loop => Builtin::Loop,
        Keyword::Gate => Builtin::Gate,
        Keyword::Dup => Builtin::Dup,
        Keyword::Drop => Builtin::Drop,
        Keyword::Swap => Builtin::Swap,
        Keyword::Depth => Builtin::Depth,
        Keyword::Rot => Builtin::Rot,
        Keyword::Nrot => Builtin::Nrot,
        Keyword::Over => Builtin::Over,
        Keyword::Tuck => Builtin::Tuck,
        Keyword::Pick => Builtin::Pick,
        Keyword::Roll => Builtin::Roll,
        Keyword::Clear => Builtin::Clear,
        Keyword::Type => Builtin::Type,
        Keyword::Input => Builtin::Input,
        Keyword::Strlen => Builtin::Strlen,
    };
    Some(InstrKind::Builtin(b))
}

/* ─────────────────────────── Tests ─────────────────────────── */

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use stackathon_ast::DeclKind;

    fn parse_ok(src: &str) -> Program {
        parse_source(src, SourceId(0)).unwrap()
    }

    fn parse_err(src: &str) -> ParseErrorKind {
        parse_source(src, SourceId(0)).unwrap_err().kind
    }

    fn kinds(body: &[Instr]) -> Vec<String> {
        body.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn instruction_stream() {
        let p = parse_ok("2 3 * print \"hi\" 1.5 true false foo $ != >= & |");
        assert_eq!(kinds(&p.body), vec!["2", "3", "*", "print", "\"hi\"", "1.5", "true", "false", "foo", "$", "!=", ">=", "&", "|"]);
        assert!(p.declarations.is_empty());
        assert!(p.uses.is_empty());
    }

    #[test]
    fn nested_blocks() {
        let p = parse_ok("{ 1 { 2 } dup } $");
        assert_eq!(p.body.len(), 2);
        match &p.body[0].kind {
            InstrKind::Block(b) => {
                assert_eq!(b.len(), 3);
                assert!(matches!(&b[1].kind, InstrKind::Block(inner) if inner.len() == 1));
            }
            other => panic!("expected block, got {other:?}"),
        }
        assert_eq!(p.body[0].to_string(), "{ 1 { 2 } dup }");
    }

    #[test]
    fn declarations_are_hoisted() {
        let p = parse_ok("100 foo $ print @foo { 2 + } @point @foo { 3 + }");
        assert_eq!(kinds(&p.body), vec!["100", "foo", "$", "print"]);
        assert_eq!(p.declarations.len(), 3);
        assert_eq!(p.declarations[0].to_string(), "@foo { 2 + }");
        assert_eq!(p.declarations[1].kind, DeclKind::Tag);
        assert_eq!(p.declarations[1].name, "point");
        // les doublons restent dans la table
        assert_eq!(p.declarations[2].to_string(), "@foo { 3 + }");
    }

    #[test]
    fn use_directives() {
        let p = parse_ok("use math use strings 1 print");
        let names: Vec<_> = p.uses.iter().map(|u| u.value.as_str()).collect();
        assert_eq!(names, vec!["math", "strings"]);
        assert_eq!(p.body.len(), 2);
    }

    #[test]
    fn declaration_spans_cover_body() {
        let src = "@inc { 1 + }";
        let p = parse_ok(src);
        let sp = p.declarations[0].span;
        assert_eq!((sp.start.0, sp.end.0), (0, src.len() as u32));
    }

    #[test]
    fn errors() {
        assert_eq!(parse_err("{ 1 2"), ParseErrorKind::UnclosedBlock);
        assert_eq!(parse_err("1 }"), ParseErrorKind::UnmatchedBrace);
        assert_eq!(parse_err("@ foo"), ParseErrorKind::MalformedDeclaration);
        assert_eq!(parse_err("@print"), ParseErrorKind::MalformedDeclaration);
        assert_eq!(parse_err("@1"), ParseErrorKind::MalformedDeclaration);
        assert_eq!(parse_err("{ @foo }"), ParseErrorKind::NestedDeclaration);
        assert_eq!(parse_err("{ use math }"), ParseErrorKind::NestedUse);
        assert_eq!(parse_err("use"), ParseErrorKind::MalformedUse);
        assert_eq!(parse_err("use 3"), ParseErrorKind::MalformedUse);
        assert!(matches!(parse_err("\"open"), ParseErrorKind::Lex(_)));
        assert_eq!(parse_err("1 use"), ParseErrorKind::MalformedUse);
        assert_eq!(parse_err("{ 1 }}"), ParseErrorKind::UnmatchedBrace);
        assert_eq!(parse_err(&"{ ".repeat(MAX_NESTING + 1)), ParseErrorKind::NestingTooDeep);
    }

    fn nested(n: usize) -> String { format!("{}{}", "{ ".repeat(n), "} ".repeat(n)) }

    #[test]
    fn nesting_is_bounded() {
        let p = parse_ok(&nested(MAX_NESTING));
        assert_eq!(p.body.len(), 1);

        let e = parse_source(&nested(MAX_NESTING + 1), SourceId(0)).unwrap_err();
        assert_eq!(e.kind, ParseErrorKind::NestingTooDeep);
        let at = (2 * MAX_NESTING) as u32;
        assert_eq!((e.span.start.0, e.span.end.0), (at, at + 1));

        // pas de débordement de pile natif, même très profond
        assert_eq!(parse_err(&nested(100_000)), ParseErrorKind::NestingTooDeep);
        assert_eq!(parse_err(&format!("@deep {}", nested(300))), ParseErrorKind::NestingTooDeep);
    }

    #[test]
    fn unclosed_block_points_at_open_brace() {
        let e = parse_source("1 { 2 { 3 }", SourceId(0)).unwrap_err();
        assert_eq!(e.kind, ParseErrorKind::UnclosedBlock);
        assert_eq!((e.span.start.0, e.span.end.0), (2, 3));
    }
}
