//! Services hôte : sortie de `print`, entrée de `input`.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, BufRead, Write};
use std::rc::Rc;

/// Console vue par la VM.
pub trait Host {
    /// Écrit une ligne (le `\n` est ajouté par l’hôte).
    fn write_line(&mut self, line: &str) -> io::Result<()>;
    /// Lit une ligne sans son terminateur ; `None` en fin d’entrée.
    fn read_line(&mut self) -> io::Result<Option<String>>;
}

/// Hôte réel : stdout / stdin du processus.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdHost;

impl Host for StdHost {
    fn write_line(&mut self, line: &str) -> io::Result<()> {
        let mut out = io::stdout().lock();
        out.write_all(line.as_bytes())?;
        out.write_all(b"\n")?;
        out.flush()
    }

    fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut buf = String::new();
        if io::stdin().lock().read_line(&mut buf)? == 0 {
            return Ok(None);
        }
        Ok(Some(strip_newline(buf)))
    }
}

fn strip_newline(mut s: String) -> String {
    if s.ends_with('\n') {
        s.pop();
        if s.ends_with('\r') {
            s.pop();
        }
    }
    s
}

/// Petit buffer partagé qui **capture** la sortie (tests, outils).
#[derive(Debug, Default, Clone)]
pub struct Captured(Rc<RefCell<String>>);

impl Captured {
    /// Récupère le buffer (copie).
    pub fn get(&self) -> String { self.0.borrow().clone() }
    /// Réinitialise le buffer.
    pub fn clear(&self) { self.0.borrow_mut().clear(); }
}

/// Hôte en mémoire : entrée scriptée, sortie capturée.
#[derive(Debug, Default)]
pub struct BufferHost {
    input: VecDeque<String>,
    output: Captured,
}

impl BufferHost {
    /// Crée un hôte et renvoie la poignée de capture de sa sortie.
    pub fn new() -> (Self, Captured) {
        let host = Self::default();
        let cap = host.output.clone();
        (host, cap)
    }

    /// Fournit les lignes que `input` lira, dans l’ordre.
    #[must_use]
    pub fn with_input<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.input.extend(lines.into_iter().map(Into::into));
        self
    }
}

impl Host for BufferHost {
    fn write_line(&mut self, line: &str) -> io::Result<()> {
        let mut out = self.output.0.borrow_mut();
        out.push_str(line);
        out.push('\n');
        Ok(())
    }

    fn read_line(&mut self) -> io::Result<Option<String>> { Ok(self.input.pop_front()) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn strips_line_terminators() {
        assert_eq!(strip_newline("abc\r\n".into()), "abc");
        assert_eq!(strip_newline("abc\n".into()), "abc");
        assert_eq!(strip_newline("abc".into()), "abc");
    }

    #[test]
    fn buffer_host_roundtrip() {
        let (host, cap) = BufferHost::new();
        let mut host = host.with_input(["one"]);
        host.write_line("hello").unwrap();
        assert_eq!(host.read_line().unwrap(), Some("one".to_string()));
        assert_eq!(host.read_line().unwrap(), None);
        assert_eq!(cap.get(), "hello\n");
    }
}
