//! Handles all user-facing output for the test runner.
//!
//! The core never writes to a terminal directly. Every report is rendered
//! into a line of text plus an optional [`Color`] tag and handed to a
//! [`LineSink`]. Lines may carry an inline `%c` emphasis marker: the sink
//! applies the color from the marker to the end of the line, so a header
//! like `in file: %cpath/to/spec.rs` keeps its label plain while the
//! interesting part is highlighted.

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use termcolor::{ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Position in a line where emphasis (and color) begins.
const EMPHASIS: &str = "%c";

// ============================================================================
// COLOR TAGS
// ============================================================================

/// Console color tags used by the reporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Black,
    Red,
    Green,
    Yellow,
    Blue,
    Purple,
    Cyan,
    White,
    BoldBlack,
    BoldRed,
    BoldGreen,
    BoldYellow,
    BoldBlue,
    BoldPurple,
    BoldCyan,
    BoldWhite,
}

impl Color {
    fn spec(self) -> ColorSpec {
        use termcolor::Color as Tc;
        let (color, bold) = match self {
            Color::Black => (Tc::Black, false),
            Color::Red => (Tc::Red, false),
            Color::Green => (Tc::Green, false),
            Color::Yellow => (Tc::Yellow, false),
            Color::Blue => (Tc::Blue, false),
            Color::Purple => (Tc::Magenta, false),
            Color::Cyan => (Tc::Cyan, false),
            Color::White => (Tc::White, false),
            Color::BoldBlack => (Tc::Black, true),
            Color::BoldRed => (Tc::Red, true),
            Color::BoldGreen => (Tc::Green, true),
            Color::BoldYellow => (Tc::Yellow, true),
            Color::BoldBlue => (Tc::Blue, true),
            Color::BoldPurple => (Tc::Magenta, true),
            Color::BoldCyan => (Tc::Cyan, true),
            Color::BoldWhite => (Tc::White, true),
        };
        let mut spec = ColorSpec::new();
        spec.set_fg(Some(color)).set_bold(bold);
        spec
    }
}

// ============================================================================
// OUTPUT SINKS: ConsoleSink and OutputBuffer implementations
// ============================================================================

/// Receives fully rendered report lines, one call per line.
pub trait LineSink {
    fn line(&mut self, text: &str, color: Option<Color>);
}

/// ConsoleSink: writes lines to stdout, colorizing from the emphasis
/// marker onward.
pub struct ConsoleSink {
    stream: StandardStream,
}

impl ConsoleSink {
    /// Stdout sink with color auto-detection.
    pub fn auto() -> Self {
        let choice = if atty::is(atty::Stream::Stdout) {
            ColorChoice::Auto
        } else {
            ColorChoice::Never
        };
        Self {
            stream: StandardStream::stdout(choice),
        }
    }
}

impl LineSink for ConsoleSink {
    fn line(&mut self, text: &str, color: Option<Color>) {
        match (text.split_once(EMPHASIS), color) {
            (Some((head, tail)), Some(color)) => {
                let _ = write!(self.stream, "{}", head);
                let _ = self.stream.set_color(&color.spec());
                // A line can carry more than one marker; color starts at
                // the first, the rest are dropped.
                let _ = write!(self.stream, "{}", tail.replace(EMPHASIS, ""));
                let _ = self.stream.reset();
                let _ = writeln!(self.stream);
            }
            (Some((head, tail)), None) => {
                let _ = writeln!(self.stream, "{}{}", head, tail.replace(EMPHASIS, ""));
            }
            (None, _) => {
                let _ = writeln!(self.stream, "{}", text);
            }
        }
    }
}

/// OutputBuffer: collects lines for testing or programmatic capture.
///
/// Cloning yields a handle onto the same underlying buffer, so a test can
/// keep one clone and hand the other to the runner.
#[derive(Clone, Default)]
pub struct OutputBuffer {
    lines: Rc<RefCell<Vec<String>>>,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.borrow().clone()
    }

    pub fn text(&self) -> String {
        self.lines.borrow().join("\n")
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines.borrow().iter().any(|l| l.contains(needle))
    }
}

impl LineSink for OutputBuffer {
    fn line(&mut self, text: &str, _color: Option<Color>) {
        self.lines.borrow_mut().push(text.replace(EMPHASIS, ""));
    }
}

// ============================================================================
// LINE RENDERING
// ============================================================================

/// Renders report text and feeds it to the sink line by line.
///
/// Rendering handles two inline directives plus continuation indentation:
/// `%n` becomes a blank line when padding is on (dropped otherwise), and
/// every embedded newline is followed by `indent` spaces so multi-line
/// failure details align under the first line of the message.
pub struct Output {
    sink: Box<dyn LineSink>,
    pub padding: bool,
    pub indent: usize,
}

impl Output {
    pub fn new(sink: Box<dyn LineSink>, padding: bool) -> Self {
        Self {
            sink,
            padding,
            indent: 0,
        }
    }

    pub fn print(&mut self, text: &str, color: Option<Color>) {
        let rendered = self.render(text);
        for segment in rendered.split('\n') {
            self.sink.line(segment, color);
        }
    }

    pub fn blank(&mut self) {
        self.sink.line("", None);
    }

    fn render(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len() + self.indent);
        let mut chars = text.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '%' if chars.peek() == Some(&'n') => {
                    chars.next();
                    if self.padding {
                        out.push('\n');
                    }
                }
                '\n' => {
                    out.push('\n');
                    for _ in 0..self.indent {
                        out.push(' ');
                    }
                }
                c => out.push(c),
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capture() -> (Output, OutputBuffer) {
        let buffer = OutputBuffer::new();
        (Output::new(Box::new(buffer.clone()), false), buffer)
    }

    #[test]
    fn strips_emphasis_marker_in_buffer() {
        let (mut out, buffer) = capture();
        out.print("in file: %ctests.rs", Some(Color::BoldPurple));
        assert_eq!(buffer.lines(), vec!["in file: tests.rs"]);
    }

    #[test]
    fn strips_every_emphasis_marker_in_buffer() {
        // Warnings prepend a marked line prefix to messages that already
        // carry a marker of their own.
        let (mut out, buffer) = capture();
        out.print("line 9:%c context error:%c too deep", Some(Color::BoldYellow));
        assert_eq!(buffer.lines(), vec!["line 9: context error: too deep"]);
    }

    #[test]
    fn drops_padding_break_when_padding_is_off() {
        let (mut out, buffer) = capture();
        out.print("expected x%n\nreceived y", None);
        assert_eq!(buffer.lines(), vec!["expected x", "received y"]);
    }

    #[test]
    fn expands_padding_break_to_blank_line() {
        let (mut out, buffer) = capture();
        out.padding = true;
        out.print("expected x%n\nreceived y", None);
        assert_eq!(buffer.lines(), vec!["expected x", "", "received y"]);
    }

    #[test]
    fn indents_continuation_lines() {
        let (mut out, buffer) = capture();
        out.indent = 4;
        out.print("first\nsecond", None);
        assert_eq!(buffer.lines(), vec!["first", "    second"]);
    }
}
