//! The console capability: everything a script does to the outside world.

use std::collections::VecDeque;
use std::io::{self, BufRead, StdinLock, Stdout, Write};
use std::thread;
use std::time::Duration;

use cmdl_parser::ast::ColorSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermColor {
    /// An SGR foreground code such as 31 for red.
    Ansi(u8),
    Rgb(u8, u8, u8),
    Reset,
}

impl TermColor {
    /// Unknown names reset the colour rather than failing the run.
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "black" => TermColor::Ansi(30),
            "red" => TermColor::Ansi(31),
            "green" => TermColor::Ansi(32),
            "yellow" | "brown" | "orange" => TermColor::Ansi(33),
            "blue" => TermColor::Ansi(34),
            "purple" | "magenta" => TermColor::Ansi(35),
            "cyan" => TermColor::Ansi(36),
            "white" => TermColor::Ansi(37),
            "pink" => TermColor::Ansi(95),
            _ => TermColor::Reset,
        }
    }

    pub fn from_spec(color: &ColorSpec) -> Self {
        match color {
            ColorSpec::Named(name) => Self::from_name(name),
            ColorSpec::Rgb(r, g, b) => TermColor::Rgb(*r, *g, *b),
        }
    }

    pub fn escape(self) -> String {
        match self {
            TermColor::Ansi(code) => format!("\x1b[{code}m"),
            TermColor::Rgb(r, g, b) => format!("\x1b[38;2;{r};{g};{b}m"),
            TermColor::Reset => "\x1b[0m".to_string(),
        }
    }
}

pub trait Console {
    fn write_line(&mut self, text: &str) -> io::Result<()>;

    fn clear_screen(&mut self) -> io::Result<()>;

    /// One line of input without its line terminator, or `None` at end of input.
    fn read_line(&mut self) -> io::Result<Option<String>>;

    fn set_color(&mut self, _color: TermColor) -> io::Result<()> {
        Ok(())
    }

    fn sleep(&mut self, duration: Duration) {
        thread::sleep(duration);
    }
}

impl<C: Console + ?Sized> Console for &mut C {
    fn write_line(&mut self, text: &str) -> io::Result<()> {
        (**self).write_line(text)
    }

    fn clear_screen(&mut self) -> io::Result<()> {
        (**self).clear_screen()
    }

    fn read_line(&mut self) -> io::Result<Option<String>> {
        (**self).read_line()
    }

    fn set_color(&mut self, color: TermColor) -> io::Result<()> {
        (**self).set_color(color)
    }

    fn sleep(&mut self, duration: Duration) {
        (**self).sleep(duration)
    }
}

/// A real terminal, speaking ANSI escapes.
pub struct Terminal<R, W> {
    input: R,
    output: W,
}

impl Terminal<StdinLock<'static>, Stdout> {
    pub fn stdio() -> Self {
        Terminal::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> Terminal<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn into_output(self) -> W {
        self.output
    }
}

impl<R: BufRead, W: Write> Console for Terminal<R, W> {
    fn write_line(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.output, "{text}")?;
        self.output.flush()
    }

    fn clear_screen(&mut self) -> io::Result<()> {
        write!(self.output, "\x1b[2J\x1b[H")?;
        self.output.flush()
    }

    fn read_line(&mut self) -> io::Result<Option<String>> {
        self.output.flush()?;
        let mut buf = String::new();
        if self.input.read_line(&mut buf)? == 0 {
            return Ok(None);
        }
        let trimmed = buf.trim_end_matches(['\n', '\r']).len();
        buf.truncate(trimmed);
        Ok(Some(buf))
    }

    fn set_color(&mut self, color: TermColor) -> io::Result<()> {
        write!(self.output, "{}", color.escape())?;
        self.output.flush()
    }
}

/// An in-memory console: queued input lines, captured effects, no real sleeping.
#[derive(Debug, Clone, Default)]
pub struct ScriptedConsole {
    input: VecDeque<String>,
    output: Vec<String>,
    clears: usize,
    colors: Vec<TermColor>,
    sleeps: Vec<Duration>,
    reads: usize,
}

impl ScriptedConsole {
    pub fn new<I, S>(input: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            input: input.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn output(&self) -> &[String] {
        &self.output
    }

    /// Captured output joined with newlines.
    pub fn transcript(&self) -> String {
        self.output.join("\n")
    }

    pub fn clears(&self) -> usize {
        self.clears
    }

    pub fn colors(&self) -> &[TermColor] {
        &self.colors
    }

    pub fn sleeps(&self) -> &[Duration] {
        &self.sleeps
    }

    /// Number of read attempts, including ones that hit end of input.
    pub fn reads(&self) -> usize {
        self.reads
    }

    pub fn remaining_input(&self) -> usize {
        self.input.len()
    }
}

impl Console for ScriptedConsole {
    fn write_line(&mut self, text: &str) -> io::Result<()> {
        self.output.push(text.to_string());
        Ok(())
    }

    fn clear_screen(&mut self) -> io::Result<()> {
        self.clears += 1;
        Ok(())
    }

    fn read_line(&mut self) -> io::Result<Option<String>> {
        self.reads += 1;
        Ok(self.input.pop_front())
    }

    fn set_color(&mut self, color: TermColor) -> io::Result<()> {
        self.colors.push(color);
        Ok(())
    }

    fn sleep(&mut self, duration: Duration) {
        self.sleeps.push(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_color_names() {
        assert_eq!(TermColor::from_name("red"), TermColor::Ansi(31));
        assert_eq!(TermColor::from_name("Purple"), TermColor::Ansi(35));
        assert_eq!(TermColor::from_name("chartreuse"), TermColor::Reset);
        assert_eq!(
            TermColor::from_spec(&ColorSpec::Rgb(1, 2, 3)).escape(),
            "\x1b[38;2;1;2;3m"
        );
    }

    #[test]
    fn test_terminal_reads_lines_without_terminators() {
        let mut term = Terminal::new(Cursor::new("one\r\ntwo\n"), Vec::new());
        assert_eq!(term.read_line().unwrap(), Some("one".to_string()));
        assert_eq!(term.read_line().unwrap(), Some("two".to_string()));
        assert_eq!(term.read_line().unwrap(), None);
    }

    #[test]
    fn test_terminal_writes() {
        let mut term = Terminal::new(Cursor::new(""), Vec::new());
        term.write_line("hi").unwrap();
        term.clear_screen().unwrap();
        term.set_color(TermColor::Ansi(32)).unwrap();
        let out = String::from_utf8(term.into_output()).unwrap();
        assert_eq!(out, "hi\n\x1b[2J\x1b[H\x1b[32m");
    }

    #[test]
    fn test_scripted_console_records_effects() {
        let mut console = ScriptedConsole::new(["a"]);
        console.write_line("x").unwrap();
        console.clear_screen().unwrap();
        console.sleep(Duration::from_secs(2));
        assert_eq!(console.read_line().unwrap(), Some("a".to_string()));
        assert_eq!(console.read_line().unwrap(), None);
        assert_eq!(console.output(), ["x"]);
        assert_eq!(console.clears(), 1);
        assert_eq!(console.sleeps(), [Duration::from_secs(2)]);
        assert_eq!(console.reads(), 2);
    }
}
