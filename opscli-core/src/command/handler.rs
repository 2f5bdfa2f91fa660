//! Command handlers and their invocation.
//!
//! A [`Handler`] is either a `Feature`, with separate activate and deactivate
//! actions selected by the `no` prefix, or a `Utility` with one action that
//! ignores the prefix. Each [`Action`] declares how many option values it
//! consumes; the dispatcher uses that arity to decide how many matched option
//! words to convert.

use core::fmt;
use std::any::Any;
use std::borrow::Cow;
use std::rc::Rc;

use thiserror::Error;

use super::context::{BoundContext, Context, ContextError, Entry};
use super::grammar::Expression;
use super::token::Value;

type Run = dyn Fn(&Invocation<'_>) -> Result<Outcome, HandlerError>;

/// One invocable action with its declared option arity.
#[derive(Clone)]
pub struct Action {
    arity: usize,
    run: Rc<Run>,
}

impl Action {
    pub fn new<F>(arity: usize, run: F) -> Self
    where
        F: Fn(&Invocation<'_>) -> Result<Outcome, HandlerError> + 'static,
    {
        Action {
            arity,
            run: Rc::new(run),
        }
    }

    #[must_use]
    pub const fn arity(&self) -> usize {
        self.arity
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug)]
pub enum HandlerKind {
    Feature { activate: Action, deactivate: Action },
    Utility { run: Action },
}

/// A registered command: help text, option grammar and actions.
#[derive(Clone, Debug)]
pub struct Handler {
    help: Cow<'static, str>,
    options: Expression,
    kind: HandlerKind,
}

impl Handler {
    pub fn utility(help: impl Into<Cow<'static, str>>, run: Action) -> Self {
        Handler {
            help: help.into(),
            options: Expression::empty(),
            kind: HandlerKind::Utility { run },
        }
    }

    pub fn feature(
        help: impl Into<Cow<'static, str>>,
        activate: Action,
        deactivate: Action,
    ) -> Self {
        Handler {
            help: help.into(),
            options: Expression::empty(),
            kind: HandlerKind::Feature {
                activate,
                deactivate,
            },
        }
    }

    /// Sets the option grammar accepted after the command's keywords.
    #[must_use]
    pub fn with_options(mut self, options: impl Into<Expression>) -> Self {
        self.options = Expression::construct(options);
        self
    }

    pub fn help(&self) -> &str {
        &self.help
    }

    pub fn options(&self) -> &Expression {
        &self.options
    }

    pub fn kind(&self) -> &HandlerKind {
        &self.kind
    }

    pub fn is_feature(&self) -> bool {
        matches!(self.kind, HandlerKind::Feature { .. })
    }

    /// Selects the action for the given negation state.
    pub fn route(&self, negated: bool) -> &Action {
        match &self.kind {
            HandlerKind::Feature { activate, .. } if !negated => activate,
            HandlerKind::Feature { deactivate, .. } => deactivate,
            HandlerKind::Utility { run } => run,
        }
    }

    pub fn bind(&self, negated: bool) -> BoundHandler<'_> {
        BoundHandler {
            handler: self,
            action: self.route(negated),
            negated,
        }
    }
}

/// A handler with its action selected.
#[derive(Clone, Copy, Debug)]
pub struct BoundHandler<'a> {
    handler: &'a Handler,
    action: &'a Action,
    negated: bool,
}

impl BoundHandler<'_> {
    pub fn handler(&self) -> &Handler {
        self.handler
    }

    pub fn arity(&self) -> usize {
        self.action.arity()
    }

    pub fn is_negated(&self) -> bool {
        self.negated
    }

    /// Runs the selected action at `site` with exactly `arity` option values.
    pub fn invoke(&self, site: &BoundContext, options: &[Value]) -> Result<Outcome, InvokeError> {
        if options.len() != self.arity() {
            return Err(InvokeError::Arity {
                expected: self.arity(),
                found: options.len(),
            });
        }
        let invocation = Invocation {
            site,
            options,
            negated: self.negated,
        };
        Ok((self.action.run)(&invocation)?)
    }
}

/// What an action asks the dispatcher to do next.
#[derive(Debug)]
pub enum Outcome {
    /// Nothing to report.
    Done,
    Output(String),
    /// Make the given context active.
    Enter(BoundContext),
    /// Return to the previous context.
    Exit,
    /// Return to the root context.
    End,
    /// Leave the shell.
    Quit,
}

/// Arguments of one action call.
pub struct Invocation<'a> {
    site: &'a BoundContext,
    options: &'a [Value],
    negated: bool,
}

impl Invocation<'_> {
    /// The live context the command runs in.
    pub fn context(&self) -> &Rc<Context> {
        self.site.context()
    }

    /// The handler's schema node viewed through the live context.
    pub fn site(&self) -> &BoundContext {
        self.site
    }

    pub fn options(&self) -> &[Value] {
        self.options
    }

    pub fn is_negated(&self) -> bool {
        self.negated
    }

    pub fn option(&self, index: usize) -> Result<&Value, HandlerError> {
        self.options
            .get(index)
            .ok_or(HandlerError::MissingOption { index })
    }

    pub fn text(&self, index: usize) -> Result<&str, HandlerError> {
        self.option(index)?
            .as_str()
            .ok_or(HandlerError::OptionType {
                index,
                expected: "text",
            })
    }

    pub fn integer(&self, index: usize) -> Result<i64, HandlerError> {
        self.option(index)?
            .as_integer()
            .ok_or(HandlerError::OptionType {
                index,
                expected: "integer",
            })
    }

    /// Innermost payload of type `T` along the context chain.
    pub fn find<T: Any>(&self) -> Option<&T> {
        self.site.context().find::<T>()
    }

    /// Enters the family registered at this command's node.
    pub fn enter(&self, entry: Entry) -> Outcome {
        Outcome::Enter(self.site.bind(entry))
    }
}

/// Failure reported by an action.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum HandlerError {
    #[error("missing option {index}")]
    MissingOption { index: usize },
    #[error("option {index} is not {expected}")]
    OptionType { index: usize, expected: &'static str },
    #[error("{0}")]
    Failed(String),
}

impl HandlerError {
    pub fn failed(message: impl fmt::Display) -> Self {
        HandlerError::Failed(message.to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum InvokeError {
    #[error("command takes {expected} option values, got {found}")]
    Arity { expected: usize, found: usize },
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error(transparent)]
    Handler(#[from] HandlerError),
}
