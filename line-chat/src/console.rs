//! Terminal output for the interactive peer.
//!
//! Everything the peer prints (received messages and log lines) goes through
//! [`Console`], which wipes the `> ` prompt, prints the text above it, and
//! draws the prompt again with whatever the user had typed so far.

use std::{
    io::{self, Write},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crossterm::{
    cursor::{MoveToColumn, MoveUp},
    queue,
    terminal::{self, Clear, ClearType},
};
use tracing_subscriber::fmt::MakeWriter;

const PROMPT: &str = "> ";
const FALLBACK_COLUMNS: usize = 80;

#[derive(Debug, Clone)]
pub struct Console {
    state: Arc<Mutex<ConsoleState>>,
}

#[derive(Debug)]
struct ConsoleState {
    input: String,
    interactive: bool,
}

impl Console {
    /// A non-interactive console never draws a prompt and ends lines with a
    /// plain `\n`.
    pub fn new(interactive: bool) -> Self {
        Self {
            state: Arc::new(Mutex::new(ConsoleState {
                input: String::new(),
                interactive,
            })),
        }
    }

    pub fn is_interactive(&self) -> bool {
        self.lock().interactive
    }

    /// Prints `text` above the prompt.
    pub fn print(&self, text: &str) {
        let state = self.lock();
        let _ = state.print(&mut io::stdout().lock(), text);
    }

    /// Redraws the prompt with a new pending input line.
    pub fn set_input(&self, input: &str) {
        let mut state = self.lock();
        let mut out = io::stdout().lock();
        let _ = state.clear_prompt(&mut out);
        state.input.clear();
        state.input.push_str(input);
        let _ = state.draw_prompt(&mut out);
    }

    /// Removes the prompt before the process exits.
    pub fn finish(&self) {
        let state = self.lock();
        let mut out = io::stdout().lock();
        let _ = state.clear_prompt(&mut out).and_then(|()| out.flush());
    }

    fn lock(&self) -> MutexGuard<'_, ConsoleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ConsoleState {
    fn print<W: Write>(&self, out: &mut W, text: &str) -> io::Result<()> {
        self.clear_prompt(out)?;
        // Raw mode does not turn `\n` into a carriage return.
        let newline = if self.interactive { "\r\n" } else { "\n" };
        // An empty message is still one (blank) line.
        for line in text.lines().chain(text.is_empty().then_some("")) {
            write!(out, "{line}{newline}")?;
        }
        self.draw_prompt(out)
    }

    fn clear_prompt<W: Write>(&self, out: &mut W) -> io::Result<()> {
        if !self.interactive {
            return Ok(());
        }
        let columns = terminal::size()
            .map(|(columns, _)| usize::from(columns))
            .unwrap_or(FALLBACK_COLUMNS)
            .max(1);
        let rows = (PROMPT.len() + self.input.chars().count()).div_ceil(columns);

        queue!(out, Clear(ClearType::CurrentLine), MoveToColumn(0))?;
        for _ in 1..rows {
            queue!(out, MoveUp(1), Clear(ClearType::CurrentLine))?;
        }
        Ok(())
    }

    fn draw_prompt<W: Write>(&self, out: &mut W) -> io::Result<()> {
        if self.interactive {
            write!(out, "{PROMPT}{}", self.input)?;
        }
        out.flush()
    }
}

/// Buffers one formatted log event and prints it through the console when
/// dropped.
pub struct ConsoleWriter {
    console: Console,
    buf: Vec<u8>,
}

impl Write for ConsoleWriter {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for ConsoleWriter {
    fn drop(&mut self) {
        if !self.buf.is_empty() {
            self.console.print(&String::from_utf8_lossy(&self.buf));
        }
    }
}

impl<'a> MakeWriter<'a> for Console {
    type Writer = ConsoleWriter;

    fn make_writer(&'a self) -> Self::Writer {
        ConsoleWriter {
            console: self.clone(),
            buf: Vec::new(),
        }
    }
}
