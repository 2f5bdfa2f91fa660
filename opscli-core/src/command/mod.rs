//! Grammar, matching, context and dispatch for shell command lines.
//!
//! The pipeline reads left to right: [`parse`] splits a line into words,
//! [`dispatch`] matches them against a [`matcher::MatchTree`] built from the
//! active [`context`] and the global command tree, converts option words with
//! their [`token::Token`]s and invokes the registered [`handler`].
//! [`completion`] answers the same questions for partial input.

pub mod completion;
pub mod context;
pub mod dispatch;
pub mod grammar;
pub mod handler;
pub mod matcher;
pub mod parse;
pub mod token;

pub use completion::{CompletionEngine, CompletionResult, HelpItem, Replacement};
pub use context::{BoundContext, Context, ContextError, ContextTree, Entry, Family, NodeId};
pub use dispatch::{CommandResult, DispatchError, Dispatcher, Resolution, Transition};
pub use grammar::Expression;
pub use handler::{Action, Handler, HandlerError, InvokeError, Invocation, Outcome};
pub use matcher::{MatchError, MatchGroup, MatchTree};
pub use parse::{CommandLine, ParseError, ParseErrorKind, SubCommand, Word};
pub use token::{ConvertError, Token, Value};
