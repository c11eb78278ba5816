use crate::interpreter::Session;
use anyhow::Result;
use std::fmt;
use std::io::Write;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
/// This mirrors the convention used by POSIX shells and many command-line tools.
pub type ExitCode = i32;

/// One of the single-character operators understood by the execution engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `|`
    Pipe,
    /// `<`
    RedirectIn,
    /// `>`
    RedirectOut,
    /// `&`
    Background,
}

impl Operator {
    pub fn symbol(self) -> char {
        match self {
            Operator::Pipe => '|',
            Operator::RedirectIn => '<',
            Operator::RedirectOut => '>',
            Operator::Background => '&',
        }
    }

    pub fn from_symbol(c: char) -> Option<Operator> {
        match c {
            '|' => Some(Operator::Pipe),
            '<' => Some(Operator::RedirectIn),
            '>' => Some(Operator::RedirectOut),
            '&' => Some(Operator::Background),
            _ => None,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// A single element of an [`ArgVector`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Word(String),
    Op(Operator),
}

impl Token {
    pub fn as_word(&self) -> Option<&str> {
        match self {
            Token::Word(w) => Some(w),
            Token::Op(_) => None,
        }
    }

    pub fn is_op(&self, op: Operator) -> bool {
        matches!(self, Token::Op(o) if *o == op)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Word(w) => f.write_str(w),
            Token::Op(op) => op.fmt(f),
        }
    }
}

/// The parsed form of one command line: words and operators in input order.
///
/// Produced by [`crate::lexer::split_into_tokens`] or built from plain strings with
/// [`ArgVector::from_words`], then classified by [`crate::plan::build_plan`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgVector {
    tokens: Vec<Token>,
}

impl ArgVector {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens }
    }

    /// Build a vector from plain strings; a bare `|`, `<`, `>` or `&` becomes an operator.
    pub fn from_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tokens = words
            .into_iter()
            .map(|w| {
                let w = w.as_ref();
                let mut chars = w.chars();
                match (chars.next().and_then(Operator::from_symbol), chars.next()) {
                    (Some(op), None) => Token::Op(op),
                    _ => Token::Word(w.to_string()),
                }
            })
            .collect();
        Self { tokens }
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// The command word, if the vector starts with one.
    pub fn program(&self) -> Option<&str> {
        self.tokens.first().and_then(Token::as_word)
    }

    pub fn has_operators(&self) -> bool {
        self.tokens.iter().any(|t| matches!(t, Token::Op(_)))
    }

    /// Every token rendered as a string, operators included.
    pub fn to_strings(&self) -> Vec<String> {
        self.tokens.iter().map(Token::to_string).collect()
    }
}

impl fmt::Display for ArgVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, token) in self.tokens.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            token.fmt(f)?;
        }
        Ok(())
    }
}

/// Object-safe trait for a builtin that was created from its arguments and is ready to run.
///
/// Implemented for every [`crate::builtin`] command via a blanket impl.
pub trait ExecutableBuiltin {
    /// Runs the builtin against the interpreter session, writing its output to `stdout`.
    fn execute(self: Box<Self>, stdout: &mut dyn Write, session: &mut Session)
    -> Result<ExitCode>;
}

/// Factory that tries to create a builtin from a name and its arguments.
///
/// Returns `None` when the factory doesn't recognize the `name`.
pub trait BuiltinFactory {
    fn try_create(&self, name: &str, args: &[&str]) -> Option<Box<dyn ExecutableBuiltin>>;
}
