//! Line editing for the interactive shell.
//!
//! On a terminal the console runs a small raw-mode editor with history,
//! Tab completion and `?` help. Otherwise lines are read from stdin as they
//! come.

use std::env;
use std::fs;
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;

use crossterm::cursor::MoveToColumn;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::style::Print;
use crossterm::terminal::{self, Clear, ClearType};
use crossterm::queue;
use opscli_core::command::Replacement;
use tracing::{debug, warn};

use crate::session::CompletionResponse;

pub const HISTORY_FILE: &str = ".opscli_history";
pub const HISTORY_SIZE: usize = 1000;
const SUGGESTION_SEPARATOR: &str = "    ";

/// Callbacks the editor uses while a line is being typed.
pub trait LineHelper {
    fn prompt(&self) -> String;
    /// Completion for the text left of the cursor.
    fn complete(&mut self, prefix: &str) -> CompletionResponse;
    /// `?` listing for the text left of the cursor.
    fn help(&mut self, prefix: &str) -> Vec<String>;
}

#[derive(Debug, PartialEq, Eq)]
pub enum ReadLine {
    Line(String),
    /// Ctrl-C discarded the line.
    Interrupted,
    Eof,
}

/// `~/.opscli_history`, when the home directory is known.
pub fn default_history_path() -> Option<PathBuf> {
    env::var_os("HOME").map(|home| PathBuf::from(home).join(HISTORY_FILE))
}

/// Previously entered lines, oldest first.
#[derive(Debug, Default)]
pub struct History {
    entries: Vec<String>,
    path: Option<PathBuf>,
}

impl History {
    /// Loads the last [`HISTORY_SIZE`] lines of `path`. A missing file starts
    /// an empty history.
    pub fn load(path: Option<PathBuf>) -> Self {
        let mut history = History {
            entries: Vec::new(),
            path,
        };
        let Some(path) = &history.path else {
            return history;
        };
        match fs::read_to_string(path) {
            Ok(text) => {
                history.entries = text.lines().map(str::to_owned).collect();
                history.truncate();
                debug!(path = %path.display(), entries = history.entries.len(), "loaded history");
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => warn!(path = %path.display(), error = %err, "cannot read history"),
        }
        history
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Appends `line` unless it is blank or repeats the previous entry.
    pub fn push(&mut self, line: &str) {
        if line.trim().is_empty() || self.entries.last().is_some_and(|last| last == line) {
            return;
        }
        self.entries.push(line.to_owned());
        self.truncate();
    }

    pub fn save(&self) -> io::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let mut text = self.entries.join("\n");
        text.push('\n');
        fs::write(path, text)
    }

    fn truncate(&mut self) {
        let excess = self.entries.len().saturating_sub(HISTORY_SIZE);
        self.entries.drain(..excess);
    }
}

/// Editable line with a cursor counted in characters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LineBuffer {
    chars: Vec<char>,
    cursor: usize,
}

impl LineBuffer {
    pub fn text(&self) -> String {
        self.chars.iter().collect()
    }

    pub fn before_cursor(&self) -> String {
        self.chars[..self.cursor].iter().collect()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    pub fn set(&mut self, text: &str) {
        self.chars = text.chars().collect();
        self.cursor = self.chars.len();
    }

    pub fn insert(&mut self, c: char) {
        self.chars.insert(self.cursor, c);
        self.cursor += 1;
    }

    /// Removes the character left of the cursor.
    pub fn backspace(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        self.cursor -= 1;
        self.chars.remove(self.cursor);
        true
    }

    /// Removes the character under the cursor.
    pub fn delete(&mut self) -> bool {
        if self.cursor == self.chars.len() {
            return false;
        }
        self.chars.remove(self.cursor);
        true
    }

    pub fn left(&mut self) -> bool {
        let moved = self.cursor > 0;
        self.cursor = self.cursor.saturating_sub(1);
        moved
    }

    pub fn right(&mut self) -> bool {
        let moved = self.cursor < self.chars.len();
        self.cursor = (self.cursor + 1).min(self.chars.len());
        moved
    }

    /// Whether the text left of the cursor ends inside an unterminated
    /// quoted word.
    pub fn in_quote(&self) -> bool {
        let mut open: Option<char> = None;
        let mut word_start = true;
        let mut chars = self.chars[..self.cursor].iter();
        while let Some(&c) = chars.next() {
            match open {
                Some(_) if c == '\\' => {
                    chars.next();
                }
                Some(quote) if c == quote => open = None,
                Some(_) => {}
                None if word_start && (c == '\'' || c == '"') => open = Some(c),
                None => {}
            }
            word_start = open.is_none() && matches!(c, ' ' | '\t' | '|');
        }
        open.is_some()
    }

    pub fn home(&mut self) {
        self.cursor = 0;
    }

    pub fn end(&mut self) {
        self.cursor = self.chars.len();
    }

    /// Splices a completion into the text left of the cursor. Offsets are
    /// byte positions within that text.
    pub fn apply(&mut self, replacement: &Replacement) -> bool {
        let before = self.before_cursor();
        let (Some(head), Some(tail)) = (before.get(..replacement.start), before.get(replacement.end..)) else {
            return false;
        };
        let mut spliced = format!("{head}{}{tail}", replacement.value);
        if replacement.append_space {
            spliced.push(' ');
        }
        let rest: Vec<char> = self.chars.split_off(self.cursor);
        self.chars = spliced.chars().collect();
        self.cursor = self.chars.len();
        self.chars.extend(rest);
        true
    }
}

/// What the terminal should do after a key press.
#[derive(Debug, PartialEq, Eq)]
enum KeyAction {
    Continue,
    Redraw,
    /// Print lines below the input, then redraw it.
    Print(Vec<String>),
    Bell,
    Submit(String),
    Interrupt,
    Eof,
}

struct Editor<'h> {
    buffer: LineBuffer,
    history: &'h [String],
    position: Option<usize>,
    draft: String,
}

impl<'h> Editor<'h> {
    fn new(history: &'h [String]) -> Self {
        Editor {
            buffer: LineBuffer::default(),
            history,
            position: None,
            draft: String::new(),
        }
    }

    fn handle_key(&mut self, key: KeyEvent, helper: &mut dyn LineHelper) -> KeyAction {
        let control = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Char('c') if control => KeyAction::Interrupt,
            KeyCode::Char('d') if control => {
                if self.buffer.is_empty() {
                    KeyAction::Eof
                } else {
                    redraw_if(self.buffer.delete())
                }
            }
            KeyCode::Char('a') if control => {
                self.buffer.home();
                KeyAction::Redraw
            }
            KeyCode::Char('e') if control => {
                self.buffer.end();
                KeyAction::Redraw
            }
            KeyCode::Char(_) if control => KeyAction::Continue,
            KeyCode::Char('?') if !self.buffer.in_quote() => {
                KeyAction::Print(helper.help(&self.buffer.before_cursor()))
            }
            KeyCode::Char(c) => {
                self.buffer.insert(c);
                KeyAction::Redraw
            }
            KeyCode::Tab => match helper.complete(&self.buffer.before_cursor()) {
                CompletionResponse::Applied { replacement } => {
                    redraw_if(self.buffer.apply(&replacement))
                }
                CompletionResponse::Suggestions { options } => {
                    KeyAction::Print(vec![options.join(SUGGESTION_SEPARATOR)])
                }
                CompletionResponse::Pending | CompletionResponse::NoMatches => KeyAction::Bell,
            },
            KeyCode::Enter => KeyAction::Submit(self.buffer.text()),
            KeyCode::Backspace => redraw_if(self.buffer.backspace()),
            KeyCode::Delete => redraw_if(self.buffer.delete()),
            KeyCode::Left => redraw_if(self.buffer.left()),
            KeyCode::Right => redraw_if(self.buffer.right()),
            KeyCode::Home => {
                self.buffer.home();
                KeyAction::Redraw
            }
            KeyCode::End => {
                self.buffer.end();
                KeyAction::Redraw
            }
            KeyCode::Up => self.older(),
            KeyCode::Down => self.newer(),
            _ => KeyAction::Continue,
        }
    }

    fn older(&mut self) -> KeyAction {
        let position = match self.position {
            None if self.history.is_empty() => return KeyAction::Bell,
            None => {
                self.draft = self.buffer.text();
                self.history.len() - 1
            }
            Some(0) => return KeyAction::Bell,
            Some(position) => position - 1,
        };
        self.position = Some(position);
        self.buffer.set(&self.history[position]);
        KeyAction::Redraw
    }

    fn newer(&mut self) -> KeyAction {
        match self.position {
            None => KeyAction::Bell,
            Some(position) if position + 1 < self.history.len() => {
                self.position = Some(position + 1);
                self.buffer.set(&self.history[position + 1]);
                KeyAction::Redraw
            }
            Some(_) => {
                self.position = None;
                self.buffer.set(&self.draft);
                KeyAction::Redraw
            }
        }
    }
}

fn redraw_if(changed: bool) -> KeyAction {
    if changed {
        KeyAction::Redraw
    } else {
        KeyAction::Bell
    }
}

/// Leaves raw mode when dropped.
struct RawMode;

impl RawMode {
    fn enable() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(RawMode)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        if let Err(err) = terminal::disable_raw_mode() {
            warn!(error = %err, "cannot restore terminal mode");
        }
    }
}

fn redraw(out: &mut impl Write, prompt: &str, buffer: &LineBuffer) -> io::Result<()> {
    let column = prompt.chars().count() + buffer.cursor();
    queue!(
        out,
        MoveToColumn(0),
        Clear(ClearType::CurrentLine),
        Print(prompt),
        Print(buffer.text()),
        MoveToColumn(u16::try_from(column).unwrap_or(u16::MAX)),
    )?;
    out.flush()
}

pub struct Console {
    history: History,
    interactive: bool,
}

impl Console {
    /// Uses the line editor when stdin is a terminal.
    pub fn new(history_path: Option<PathBuf>) -> Self {
        let interactive = io::stdin().is_terminal();
        debug!(interactive, "opening console");
        Console {
            history: History::load(history_path),
            interactive,
        }
    }

    pub fn read_line(&mut self, helper: &mut dyn LineHelper) -> io::Result<ReadLine> {
        if self.interactive {
            self.read_terminal(helper)
        } else {
            read_plain(helper)
        }
    }

    /// Writes the history file.
    pub fn close(&self) -> io::Result<()> {
        if self.interactive {
            self.history.save()
        } else {
            Ok(())
        }
    }

    fn read_terminal(&mut self, helper: &mut dyn LineHelper) -> io::Result<ReadLine> {
        let mut out = io::stdout();
        let prompt = helper.prompt();
        let line = {
            let _raw = RawMode::enable()?;
            let mut editor = Editor::new(self.history.entries());
            redraw(&mut out, &prompt, &editor.buffer)?;
            loop {
                let Event::Key(key) = event::read()? else {
                    continue;
                };
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                match editor.handle_key(key, helper) {
                    KeyAction::Continue => {}
                    KeyAction::Redraw => redraw(&mut out, &prompt, &editor.buffer)?,
                    KeyAction::Print(lines) => {
                        queue!(out, Print("\r\n"))?;
                        for line in lines {
                            queue!(out, Print(line), Print("\r\n"))?;
                        }
                        redraw(&mut out, &prompt, &editor.buffer)?;
                    }
                    KeyAction::Bell => {
                        queue!(out, Print('\x07'))?;
                        out.flush()?;
                    }
                    KeyAction::Submit(line) => {
                        queue!(out, Print("\r\n"))?;
                        out.flush()?;
                        break ReadLine::Line(line);
                    }
                    KeyAction::Interrupt => {
                        queue!(out, Print("^C\r\n"))?;
                        out.flush()?;
                        break ReadLine::Interrupted;
                    }
                    KeyAction::Eof => {
                        queue!(out, Print("\r\n"))?;
                        out.flush()?;
                        break ReadLine::Eof;
                    }
                }
            }
        };
        if let ReadLine::Line(text) = &line {
            self.history.push(text);
        }
        Ok(line)
    }
}

fn read_plain(helper: &dyn LineHelper) -> io::Result<ReadLine> {
    let mut out = io::stdout();
    write!(out, "{}", helper.prompt())?;
    out.flush()?;

    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        writeln!(out)?;
        return Ok(ReadLine::Eof);
    }
    Ok(ReadLine::Line(line.trim_end_matches(['\r', '\n']).to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process;

    #[derive(Default)]
    struct ScriptedHelper {
        completion: Option<CompletionResponse>,
        requests: Vec<String>,
    }

    impl LineHelper for ScriptedHelper {
        fn prompt(&self) -> String {
            "switch# ".into()
        }

        fn complete(&mut self, prefix: &str) -> CompletionResponse {
            self.requests.push(prefix.to_owned());
            self.completion.take().unwrap_or(CompletionResponse::NoMatches)
        }

        fn help(&mut self, prefix: &str) -> Vec<String> {
            self.requests.push(prefix.to_owned());
            vec![format!("help for `{prefix}`")]
        }
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    fn type_text(editor: &mut Editor<'_>, helper: &mut ScriptedHelper, text: &str) {
        for c in text.chars() {
            editor.handle_key(key(KeyCode::Char(c)), helper);
        }
    }

    fn temp_path(name: &str) -> PathBuf {
        env::temp_dir().join(format!("opscli-{name}-{}", process::id()))
    }

    #[test]
    fn edits_in_the_middle_of_the_line() {
        let mut helper = ScriptedHelper::default();
        let mut editor = Editor::new(&[]);
        type_text(&mut editor, &mut helper, "shw run");
        for _ in 0..5 {
            editor.handle_key(key(KeyCode::Left), &mut helper);
        }
        editor.handle_key(key(KeyCode::Char('o')), &mut helper);
        assert_eq!(
            editor.handle_key(key(KeyCode::Enter), &mut helper),
            KeyAction::Submit("show run".into())
        );
    }

    #[test]
    fn control_keys() {
        let mut helper = ScriptedHelper::default();
        let mut editor = Editor::new(&[]);
        assert_eq!(editor.handle_key(ctrl('d'), &mut helper), KeyAction::Eof);
        type_text(&mut editor, &mut helper, "conf");
        assert_eq!(editor.handle_key(ctrl('d'), &mut helper), KeyAction::Bell);
        assert_eq!(editor.handle_key(ctrl('c'), &mut helper), KeyAction::Interrupt);
        assert_eq!(editor.handle_key(key(KeyCode::Backspace), &mut helper), KeyAction::Redraw);
        assert_eq!(editor.buffer.text(), "con");
    }

    #[test]
    fn question_mark_asks_for_help_without_inserting() {
        let mut helper = ScriptedHelper::default();
        let mut editor = Editor::new(&[]);
        type_text(&mut editor, &mut helper, "show ");
        assert_eq!(
            editor.handle_key(key(KeyCode::Char('?')), &mut helper),
            KeyAction::Print(vec!["help for `show `".into()])
        );
        assert_eq!(editor.buffer.text(), "show ");
    }

    #[test]
    fn question_mark_inside_quotes_is_text() {
        let mut helper = ScriptedHelper::default();
        let mut editor = Editor::new(&[]);
        type_text(&mut editor, &mut helper, "description \"why?");
        assert_eq!(editor.buffer.text(), "description \"why?");
        assert!(helper.requests.is_empty());

        type_text(&mut editor, &mut helper, "\" ?");
        assert_eq!(editor.buffer.text(), "description \"why?\" ");
        assert_eq!(helper.requests, ["description \"why?\" "]);
    }

    #[test]
    fn quote_state_follows_escapes_and_word_starts() {
        let mut buffer = LineBuffer::default();
        buffer.set(r"description 'it\'s");
        assert!(buffer.in_quote());
        buffer.set("description it's");
        assert!(!buffer.in_quote());
        buffer.set("show 'a' | desc \"b");
        assert!(buffer.in_quote());
        buffer.home();
        assert!(!buffer.in_quote());
    }

    #[test]
    fn tab_applies_replacement_before_the_cursor() {
        let mut helper = ScriptedHelper {
            completion: Some(CompletionResponse::Applied {
                replacement: Replacement {
                    start: 5,
                    end: 8,
                    value: "running-config".into(),
                    append_space: true,
                },
            }),
            ..ScriptedHelper::default()
        };
        let mut editor = Editor::new(&[]);
        type_text(&mut editor, &mut helper, "show run");
        assert_eq!(editor.handle_key(key(KeyCode::Tab), &mut helper), KeyAction::Redraw);
        assert_eq!(editor.buffer.text(), "show running-config ");
        assert_eq!(helper.requests, ["show run"]);
    }

    #[test]
    fn tab_lists_suggestions() {
        let mut helper = ScriptedHelper {
            completion: Some(CompletionResponse::Suggestions {
                options: vec!["shutdown".into(), "description".into()],
            }),
            ..ScriptedHelper::default()
        };
        let mut editor = Editor::new(&[]);
        assert_eq!(
            editor.handle_key(key(KeyCode::Tab), &mut helper),
            KeyAction::Print(vec!["shutdown    description".into()])
        );
        assert_eq!(editor.handle_key(key(KeyCode::Tab), &mut helper), KeyAction::Bell);
    }

    #[test]
    fn history_navigation_restores_the_draft() {
        let history = vec!["configure".to_owned(), "vlan 10".to_owned()];
        let mut helper = ScriptedHelper::default();
        let mut editor = Editor::new(&history);
        type_text(&mut editor, &mut helper, "sh");

        editor.handle_key(key(KeyCode::Up), &mut helper);
        assert_eq!(editor.buffer.text(), "vlan 10");
        editor.handle_key(key(KeyCode::Up), &mut helper);
        assert_eq!(editor.buffer.text(), "configure");
        assert_eq!(editor.handle_key(key(KeyCode::Up), &mut helper), KeyAction::Bell);

        editor.handle_key(key(KeyCode::Down), &mut helper);
        editor.handle_key(key(KeyCode::Down), &mut helper);
        assert_eq!(editor.buffer.text(), "sh");
        assert_eq!(editor.handle_key(key(KeyCode::Down), &mut helper), KeyAction::Bell);
    }

    #[test]
    fn history_skips_blank_and_repeated_lines() {
        let mut history = History::default();
        history.push("configure");
        history.push("configure");
        history.push("  ");
        history.push("end");
        assert_eq!(history.entries(), ["configure", "end"]);
    }

    #[test]
    fn history_keeps_the_most_recent_lines() {
        let path = temp_path("history");
        let mut history = History::load(Some(path.clone()));
        for n in 0..=HISTORY_SIZE {
            history.push(&format!("vlan {n}"));
        }
        history.save().expect("save");

        let reloaded = History::load(Some(path.clone()));
        assert_eq!(reloaded.entries().len(), HISTORY_SIZE);
        assert_eq!(reloaded.entries()[0], "vlan 1");
        assert_eq!(reloaded.entries()[HISTORY_SIZE - 1], format!("vlan {HISTORY_SIZE}"));
        fs::remove_file(path).expect("cleanup");
    }

    #[test]
    fn missing_history_file_is_empty() {
        let history = History::load(Some(temp_path("missing")));
        assert!(history.entries().is_empty());
    }

    #[test]
    fn replacement_outside_the_prefix_is_rejected() {
        let mut buffer = LineBuffer::default();
        buffer.set("sh");
        let replacement = Replacement {
            start: 4,
            end: 6,
            value: "show".into(),
            append_space: false,
        };
        assert!(!buffer.apply(&replacement));
        assert_eq!(buffer.text(), "sh");
    }
}
