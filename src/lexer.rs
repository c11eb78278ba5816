//! Lexical analysis of a command line into words and operator tokens.

use crate::command::{ArgVector, Operator, Token};

/// Errors that can occur during the lexical analysis process.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LexError {
    /// A closing quote (single or double) was not found.
    #[error("unterminated {0} quote")]
    UnfinishedQuote(char),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexingState {
    Start,
    ReadingWord,
    ReadingSingleQuote,
    ReadingDoubleQuote,
}

struct LexingFSM {
    input: Vec<char>,
    pos: usize,
    state: LexingState,
    buffer: String,
    /// Set once the current word has content, even if that content is an empty quote.
    has_word: bool,
}

impl LexingFSM {
    fn new(line: &str) -> Self {
        LexingFSM {
            input: line.chars().collect(),
            pos: 0,
            state: LexingState::Start,
            buffer: String::new(),
            has_word: false,
        }
    }

    /// Runs the state machine over the whole input.
    ///
    /// Blanks separate words, the operator characters `| < > &` always form a token of
    /// their own, and quotes group literal text (an operator inside quotes is a word).
    fn make_tokens(&mut self) -> Result<Vec<Token>, LexError> {
        let mut out = Vec::new();

        while let Some(ch) = self.read_char() {
            match self.state {
                LexingState::Start | LexingState::ReadingWord => self.handle_word(ch, &mut out),
                LexingState::ReadingSingleQuote => self.handle_single_quote(ch),
                LexingState::ReadingDoubleQuote => self.handle_double_quote(ch),
            }
        }

        match self.state {
            LexingState::ReadingSingleQuote => return Err(LexError::UnfinishedQuote('\'')),
            LexingState::ReadingDoubleQuote => return Err(LexError::UnfinishedQuote('"')),
            _ => {}
        }

        self.finish_word(&mut out);
        Ok(out)
    }

    fn read_char(&mut self) -> Option<char> {
        let ch = self.input.get(self.pos).copied();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn handle_word(&mut self, ch: char, out: &mut Vec<Token>) {
        match ch {
            ' ' | '\t' | '\n' | '\r' => {
                self.finish_word(out);
                self.state = LexingState::Start;
            }
            '\'' => {
                self.has_word = true;
                self.state = LexingState::ReadingSingleQuote;
            }
            '"' => {
                self.has_word = true;
                self.state = LexingState::ReadingDoubleQuote;
            }
            c => match Operator::from_symbol(c) {
                Some(op) => {
                    self.finish_word(out);
                    out.push(Token::Op(op));
                    self.state = LexingState::Start;
                }
                None => {
                    self.buffer.push(c);
                    self.has_word = true;
                    self.state = LexingState::ReadingWord;
                }
            },
        }
    }

    fn handle_single_quote(&mut self, ch: char) {
        match ch {
            '\'' => self.state = LexingState::ReadingWord,
            c => self.buffer.push(c),
        }
    }

    fn handle_double_quote(&mut self, ch: char) {
        match ch {
            '"' => self.state = LexingState::ReadingWord,
            '\\' if matches!(self.input.get(self.pos), Some('"' | '\\')) => {
                if let Some(escaped) = self.read_char() {
                    self.buffer.push(escaped);
                }
            }
            c => self.buffer.push(c),
        }
    }

    fn finish_word(&mut self, out: &mut Vec<Token>) {
        if self.has_word {
            out.push(Token::Word(std::mem::take(&mut self.buffer)));
            self.has_word = false;
        }
    }
}

/// The main entry point function to perform lexical analysis.
///
/// Returns an empty [`ArgVector`] for a blank line; callers treat that as "nothing to do".
pub fn split_into_tokens(line: &str) -> Result<ArgVector, LexError> {
    let mut lexer = LexingFSM::new(line);
    lexer.make_tokens().map(ArgVector::new)
}
