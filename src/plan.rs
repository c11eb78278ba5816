//! Classification of an [`ArgVector`] into an [`ExecutionPlan`].
//!
//! The order of the checks is part of the contract: a trailing `&` is stripped first,
//! then a `|` splits the command into two stages, and only a command without a pipe is
//! inspected for `<` and `>`.

use crate::command::{ArgVector, Operator, Token};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    #[error("syntax error: missing command")]
    EmptyCommand,
    #[error("syntax error: `&` is only allowed at the end of a command")]
    MisplacedBackground,
    #[error("only a single pipe stage is supported")]
    MultiplePipes,
    #[error("syntax error: missing command {0} `|`")]
    EmptyPipeStage(&'static str),
    #[error("redirection cannot be combined with a pipe")]
    RedirectInPipeline,
    #[error("syntax error: missing file name after `{0}`")]
    MissingRedirectTarget(Operator),
    #[error("syntax error: more than one `{0}` redirection")]
    DuplicateRedirect(Operator),
}

/// How the processes of a plan are wired together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Topology {
    Simple {
        argv: Vec<String>,
    },
    Piped {
        left: Vec<String>,
        right: Vec<String>,
    },
    Redirected {
        argv: Vec<String>,
        input: Option<PathBuf>,
        output: Option<PathBuf>,
    },
}

impl Topology {
    /// Number of processes the spawner creates for this topology.
    pub fn stage_count(&self) -> usize {
        match self {
            Topology::Piped { .. } => 2,
            Topology::Simple { .. } | Topology::Redirected { .. } => 1,
        }
    }
}

/// A classified command, ready to be handed to the spawner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    pub topology: Topology,
    /// The command ended with `&`.
    pub background: bool,
    /// Command text reconstructed from the tokens, without the trailing `&`.
    pub display: String,
}

struct PlanBuilder<'a> {
    tokens: &'a [Token],
}

impl<'a> PlanBuilder<'a> {
    fn build(self) -> Result<ExecutionPlan, PlanError> {
        let (tokens, background) = match self.tokens.split_last() {
            Some((last, rest)) if last.is_op(Operator::Background) => (rest, true),
            _ => (self.tokens, false),
        };
        if tokens.iter().any(|t| t.is_op(Operator::Background)) {
            return Err(PlanError::MisplacedBackground);
        }
        if tokens.is_empty() {
            return Err(PlanError::EmptyCommand);
        }

        let display = ArgVector::new(tokens.to_vec()).to_string();
        let topology = match tokens.iter().position(|t| t.is_op(Operator::Pipe)) {
            Some(pos) => Self::piped(&tokens[..pos], &tokens[pos + 1..])?,
            None if tokens.iter().any(is_redirect) => Self::redirected(tokens)?,
            None => Topology::Simple {
                argv: Self::words(tokens),
            },
        };

        Ok(ExecutionPlan {
            topology,
            background,
            display,
        })
    }

    fn piped(left: &[Token], right: &[Token]) -> Result<Topology, PlanError> {
        if right.iter().any(|t| t.is_op(Operator::Pipe)) {
            return Err(PlanError::MultiplePipes);
        }
        if left.iter().chain(right).any(is_redirect) {
            return Err(PlanError::RedirectInPipeline);
        }
        if left.is_empty() {
            return Err(PlanError::EmptyPipeStage("before"));
        }
        if right.is_empty() {
            return Err(PlanError::EmptyPipeStage("after"));
        }
        Ok(Topology::Piped {
            left: Self::words(left),
            right: Self::words(right),
        })
    }

    fn redirected(tokens: &[Token]) -> Result<Topology, PlanError> {
        let mut argv = Vec::new();
        let mut input = None;
        let mut output = None;

        let mut iter = tokens.iter();
        while let Some(token) = iter.next() {
            let (op, slot) = match token {
                Token::Word(w) => {
                    argv.push(w.clone());
                    continue;
                }
                Token::Op(Operator::RedirectIn) => (Operator::RedirectIn, &mut input),
                Token::Op(Operator::RedirectOut) => (Operator::RedirectOut, &mut output),
                // Pipes and `&` were handled before this point.
                Token::Op(_) => continue,
            };
            let target = match iter.next() {
                Some(Token::Word(w)) if !w.is_empty() => PathBuf::from(w),
                _ => return Err(PlanError::MissingRedirectTarget(op)),
            };
            if slot.replace(target).is_some() {
                return Err(PlanError::DuplicateRedirect(op));
            }
        }

        if argv.is_empty() {
            return Err(PlanError::EmptyCommand);
        }
        Ok(Topology::Redirected {
            argv,
            input,
            output,
        })
    }

    fn words(tokens: &[Token]) -> Vec<String> {
        tokens.iter().map(Token::to_string).collect()
    }
}

fn is_redirect(token: &Token) -> bool {
    token.is_op(Operator::RedirectIn) || token.is_op(Operator::RedirectOut)
}

/// Classify an argument vector. Pure: nothing is spawned or opened here.
pub fn build_plan(args: &ArgVector) -> Result<ExecutionPlan, PlanError> {
    PlanBuilder {
        tokens: args.tokens(),
    }
    .build()
}
