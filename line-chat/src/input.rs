//! Line editing for the interactive peer.
//!
//! [`LineEditor`] turns crossterm key events into editing events. It knows
//! nothing about sockets; the front end decides what a submitted line means.
//! Piped input skips the editor and goes through [`parse_line`] directly.

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use tracing::trace;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorEvent {
    /// A non-blank line was entered, trimmed of surrounding whitespace.
    Submit(String),
    /// The line being typed changed.
    Edited,
    /// `/debug [on|off]`; `None` toggles.
    Debug(Option<bool>),
    /// Ctrl-C, Ctrl-D or `/exit`.
    Exit,
}

#[derive(Debug, Default)]
pub struct LineEditor {
    buffer: String,
}

impl LineEditor {
    pub fn new() -> Self {
        Self::default()
    }

    /// The line typed so far.
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Option<EditorEvent> {
        if key.kind == KeyEventKind::Release {
            return None;
        }
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

        match key.code {
            KeyCode::Char('c' | 'C' | 'd' | 'D') if ctrl => Some(EditorEvent::Exit),
            // Raw mode reports 0x08 and a bare line feed as Ctrl-H and Ctrl-J.
            KeyCode::Char('h') if ctrl => self.backspace(),
            KeyCode::Char('j') if ctrl => self.enter(),
            KeyCode::Backspace => self.backspace(),
            KeyCode::Enter => self.enter(),
            // Ctrl-Z, Ctrl-S, Ctrl-Q and the rest.
            KeyCode::Char(_) if ctrl => {
                trace!(key = ?key.code, "ignoring control key");
                None
            }
            KeyCode::Char(c) => {
                self.buffer.push(c);
                Some(EditorEvent::Edited)
            }
            other => {
                trace!(key = ?other, "ignoring key");
                None
            }
        }
    }

    fn backspace(&mut self) -> Option<EditorEvent> {
        self.buffer.pop();
        Some(EditorEvent::Edited)
    }

    fn enter(&mut self) -> Option<EditorEvent> {
        let event = parse_line(&self.buffer)?;
        self.buffer.clear();
        Some(event)
    }
}

/// Interprets one entered line. Blank lines yield `None`; unknown slash
/// commands are ordinary messages.
pub fn parse_line(line: &str) -> Option<EditorEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let mut words = line.split_whitespace();
    let event = match words.next() {
        Some("/exit") => EditorEvent::Exit,
        Some("/debug") => EditorEvent::Debug(match words.next() {
            Some("on") => Some(true),
            Some("off") => Some(false),
            _ => None,
        }),
        _ => EditorEvent::Submit(line.to_string()),
    };
    Some(event)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    fn type_text(editor: &mut LineEditor, text: &str) -> Vec<EditorEvent> {
        text.chars()
            .filter_map(|c| editor.handle_key(key(KeyCode::Char(c))))
            .collect()
    }

    #[test]
    fn enter_submits_trimmed_line() {
        let mut editor = LineEditor::new();
        type_text(&mut editor, " hi ");

        assert_eq!(
            editor.handle_key(key(KeyCode::Enter)),
            Some(EditorEvent::Submit("hi".into()))
        );
        assert_eq!(editor.buffer(), "");
    }

    #[test]
    fn backspace_removes_last_character() {
        let mut editor = LineEditor::new();
        type_text(&mut editor, "abc");
        editor.handle_key(key(KeyCode::Backspace));
        editor.handle_key(ctrl('h'));
        assert_eq!(editor.buffer(), "a");

        editor.handle_key(key(KeyCode::Backspace));
        assert_eq!(
            editor.handle_key(key(KeyCode::Backspace)),
            Some(EditorEvent::Edited)
        );
        assert_eq!(editor.buffer(), "");
    }

    #[test]
    fn blank_lines_are_not_submitted() {
        let mut editor = LineEditor::new();
        assert_eq!(editor.handle_key(key(KeyCode::Enter)), None);

        type_text(&mut editor, "   ");
        assert_eq!(editor.handle_key(ctrl('j')), None);
        assert_eq!(editor.buffer(), "   ");
    }

    #[test]
    fn arrow_keys_after_text_do_not_reach_the_buffer() {
        let mut editor = LineEditor::new();
        type_text(&mut editor, "a");

        for code in [KeyCode::Up, KeyCode::Left, KeyCode::Esc, KeyCode::Tab] {
            assert_eq!(editor.handle_key(key(code)), None, "{code:?}");
        }
        for c in ['z', 's', 'q'] {
            assert_eq!(editor.handle_key(ctrl(c)), None, "ctrl-{c}");
        }
        type_text(&mut editor, "b");

        assert_eq!(editor.buffer(), "ab");
    }

    #[test]
    fn key_releases_are_ignored() {
        let mut editor = LineEditor::new();
        let mut release = key(KeyCode::Char('x'));
        release.kind = KeyEventKind::Release;

        assert_eq!(editor.handle_key(release), None);
        assert_eq!(editor.buffer(), "");
    }

    #[test]
    fn interrupt_and_eof_exit() {
        let mut editor = LineEditor::new();
        type_text(&mut editor, "unsent");
        assert_eq!(editor.handle_key(ctrl('c')), Some(EditorEvent::Exit));
        assert_eq!(editor.handle_key(ctrl('d')), Some(EditorEvent::Exit));
    }

    #[test]
    fn slash_commands() {
        assert_eq!(parse_line("/debug on"), Some(EditorEvent::Debug(Some(true))));
        assert_eq!(parse_line(" /debug off "), Some(EditorEvent::Debug(Some(false))));
        assert_eq!(parse_line("/debug"), Some(EditorEvent::Debug(None)));
        assert_eq!(parse_line("/exit"), Some(EditorEvent::Exit));
        assert_eq!(
            parse_line("/shrug ok"),
            Some(EditorEvent::Submit("/shrug ok".into()))
        );
        assert_eq!(parse_line(" \t "), None);
    }

    #[test]
    fn typed_command_runs_on_enter() {
        let mut editor = LineEditor::new();
        assert_eq!(type_text(&mut editor, "/exit").len(), 5);
        assert_eq!(editor.handle_key(key(KeyCode::Enter)), Some(EditorEvent::Exit));
    }
}
