//! Where command lines come from: an interactive editor or a plain byte stream.

use anyhow::Result;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::io::BufRead;

/// One read from a [`LineSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    Text(String),
    /// Ctrl-C at the prompt.
    Interrupted,
    Eof,
}

pub trait LineSource {
    fn read_line(&mut self, prompt: &str) -> Result<Line>;

    /// Whether the source shows prompts and wants expanded history lines echoed.
    fn is_interactive(&self) -> bool;
}

/// Interactive source backed by rustyline, with in-memory line recall.
pub struct EditorInput {
    editor: DefaultEditor,
}

impl EditorInput {
    pub fn new() -> Result<Self> {
        Ok(Self {
            editor: DefaultEditor::new()?,
        })
    }
}

impl LineSource for EditorInput {
    fn read_line(&mut self, prompt: &str) -> Result<Line> {
        match self.editor.readline(prompt) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    self.editor.add_history_entry(line.as_str())?;
                }
                Ok(Line::Text(line))
            }
            Err(ReadlineError::Interrupted) => Ok(Line::Interrupted),
            Err(ReadlineError::Eof) => Ok(Line::Eof),
            Err(err) => Err(err.into()),
        }
    }

    fn is_interactive(&self) -> bool {
        true
    }
}

/// Non-interactive source reading newline-separated commands, e.g. from a pipe.
pub struct PlainInput<R> {
    reader: R,
}

impl<R: BufRead> PlainInput<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R: BufRead> LineSource for PlainInput<R> {
    fn read_line(&mut self, _prompt: &str) -> Result<Line> {
        let mut buf = String::new();
        if self.reader.read_line(&mut buf)? == 0 {
            return Ok(Line::Eof);
        }
        let trimmed = buf.trim_end_matches(['\n', '\r']).len();
        buf.truncate(trimmed);
        Ok(Line::Text(buf))
    }

    fn is_interactive(&self) -> bool {
        false
    }
}
