//! Resolution and execution of command lines.
//!
//! The [`Dispatcher`] owns the mode schema, the always-available global
//! schema and the stack of active contexts. For each sub-command it strips a
//! leading `no`, matches the remaining words against the command tree of the
//! active mode, converts option words with the matched tokens and invokes
//! the handler. Command trees are built on first use per mode node and
//! reused afterwards.

use std::collections::HashMap;
use std::mem;
use std::rc::Rc;

use thiserror::Error;
use tracing::{debug, trace};

use super::context::{BoundContext, ContextTree, Entry, NodeId};
use super::handler::{BoundHandler, Handler, InvokeError, Outcome};
use super::matcher::{MatchError, MatchGroup, MatchTree};
use super::parse::{ParseError, parse};
use super::token::{ConvertError, Token, Value};

/// Word that routes a feature command to its deactivate action.
pub const NEGATION: &str = "no";

/// Which schema a command was registered in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Scope {
    Mode,
    Global,
}

/// Match-tree payload identifying a registered handler.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandRef {
    pub scope: Scope,
    pub node: NodeId,
    pub help: String,
}

pub type CommandTree = MatchTree<CommandRef>;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("unknown command `{command}`")]
    NotFound { command: String },
    #[error("incomplete command `{command}`")]
    Incomplete { command: String },
    #[error("ambiguous command `{command}`: {}", .candidates.join(", "))]
    Ambiguous {
        command: String,
        candidates: Vec<String>,
    },
    #[error(transparent)]
    Convert(#[from] ConvertError),
    #[error(transparent)]
    Registration(#[from] MatchError),
    #[error(transparent)]
    Invoke(#[from] InvokeError),
}

/// A sub-command resolved to a handler and converted options.
#[derive(Clone, Debug)]
pub struct Resolution {
    handler: Handler,
    command: CommandRef,
    negated: bool,
    words: Vec<String>,
    options: Vec<Value>,
}

impl Resolution {
    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    pub fn bound(&self) -> BoundHandler<'_> {
        self.handler.bind(self.negated)
    }

    pub fn scope(&self) -> Scope {
        self.command.scope
    }

    pub fn is_negated(&self) -> bool {
        self.negated
    }

    /// Input words after the negation prefix.
    pub fn words(&self) -> &[String] {
        &self.words
    }

    pub fn options(&self) -> &[Value] {
        &self.options
    }
}

/// Effect of an invocation on the context stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    Stay,
    Enter,
    Exit,
    Quit,
}

/// Normalized invocation result.
#[derive(Debug)]
pub struct CommandResult {
    /// Active context after the invocation.
    pub context: BoundContext,
    pub output: Option<String>,
    pub transition: Transition,
}

pub struct Dispatcher {
    modes: Rc<ContextTree>,
    global: Rc<ContextTree>,
    active: BoundContext,
    stack: Vec<BoundContext>,
    trees: HashMap<NodeId, Rc<CommandTree>>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(modes: ContextTree, global: ContextTree) -> Self {
        Self::with_root(modes, global, Entry::new())
    }

    /// Starts in the root of `modes`, bound with `root` as its arguments.
    #[must_use]
    pub fn with_root(modes: ContextTree, global: ContextTree, root: Entry) -> Self {
        let modes = Rc::new(modes);
        let active = BoundContext::root(Rc::clone(&modes), root);
        Dispatcher {
            modes,
            global: Rc::new(global),
            active,
            stack: Vec::new(),
            trees: HashMap::new(),
        }
    }

    pub fn active(&self) -> &BoundContext {
        &self.active
    }

    /// Number of contexts entered above the root.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn prompt(&self) -> String {
        self.active.context().prompt()
    }

    fn schema(&self, scope: Scope) -> &Rc<ContextTree> {
        match scope {
            Scope::Mode => &self.modes,
            Scope::Global => &self.global,
        }
    }

    fn global_view(&self) -> BoundContext {
        BoundContext::view(
            Rc::clone(&self.global),
            self.global.root(),
            Rc::clone(self.active.context()),
        )
    }

    /// Command tree for the active mode plus global commands.
    pub fn command_tree(&mut self) -> Result<Rc<CommandTree>, DispatchError> {
        let key = self.active.node();
        if let Some(tree) = self.trees.get(&key) {
            return Ok(Rc::clone(tree));
        }

        let tree = Rc::new(self.build_tree()?);
        debug!(
            mode = self.active.context().name(),
            groups = tree.len(),
            "built command tree"
        );
        self.trees.insert(key, Rc::clone(&tree));
        Ok(tree)
    }

    fn build_tree(&self) -> Result<CommandTree, MatchError> {
        let mut tree = CommandTree::new();
        for (scope, view) in [
            (Scope::Mode, self.active.clone()),
            (Scope::Global, self.global_view()),
        ] {
            for entry in view.commands() {
                let primary: Vec<Token> = entry
                    .path
                    .iter()
                    .map(|name| Token::literal((*name).to_owned()))
                    .collect();
                for combination in entry.handler.options().combinations() {
                    tree.insert(MatchGroup::new(
                        primary.clone(),
                        combination,
                        CommandRef {
                            scope,
                            node: entry.node,
                            help: entry.handler.help().to_owned(),
                        },
                    ))?;
                }
            }
        }
        Ok(tree)
    }

    /// Resolves every sub-command of `line` against the active mode without
    /// invoking anything.
    pub fn resolve(
        &mut self,
        line: &str,
    ) -> Result<Vec<Result<Resolution, DispatchError>>, DispatchError> {
        let command_line = parse(line)?;
        Ok(command_line
            .stages
            .into_iter()
            .map(|stage| self.resolve_words(&stage.into_texts()))
            .collect())
    }

    /// Resolves one sub-command's words.
    pub fn resolve_words<S: AsRef<str>>(
        &mut self,
        words: &[S],
    ) -> Result<Resolution, DispatchError> {
        let (negated, words) = strip_negation(words);
        let command = join(words);
        if words.is_empty() {
            return Err(DispatchError::NotFound {
                command: NEGATION.to_owned(),
            });
        }

        let tree = self.command_tree()?;
        let matches = tree.match_exact(words);
        let Some(first) = matches.first() else {
            return Err(if tree.match_prefix(words).is_empty() {
                DispatchError::NotFound { command }
            } else {
                DispatchError::Incomplete { command }
            });
        };
        if matches.iter().any(|group| group.value != first.value) {
            return Err(DispatchError::Ambiguous {
                command,
                candidates: matches.iter().map(|group| group.describe()).collect(),
            });
        }

        let handler = self
            .schema(first.value.scope)
            .handler(first.value.node)
            .ok_or_else(|| DispatchError::NotFound {
                command: command.clone(),
            })?
            .clone();
        let arity = handler.route(negated).arity();

        // Alternatives of one command (e.g. `A.B.C.D | X:X::X:X`) all match
        // while placeholders accept any word; the first that converts wins.
        let mut failure = None;
        for group in &matches {
            match convert_options(group, words, arity) {
                Ok(options) => {
                    debug!(
                        command = %command,
                        negated,
                        options = options.len(),
                        "resolved command"
                    );
                    return Ok(Resolution {
                        handler,
                        command: group.value.clone(),
                        negated,
                        words: words.iter().map(|word| word.as_ref().to_owned()).collect(),
                        options,
                    });
                }
                Err(err) => {
                    trace!(path = %group.describe(), error = %err, "conversion failed");
                    failure.get_or_insert(err);
                }
            }
        }
        Err(failure.map_or(DispatchError::NotFound { command }, DispatchError::Convert))
    }

    /// Invokes a resolution in the active context and applies the outcome.
    pub fn invoke(&mut self, resolution: &Resolution) -> Result<CommandResult, DispatchError> {
        let site = BoundContext::view(
            Rc::clone(self.schema(resolution.command.scope)),
            resolution.command.node,
            Rc::clone(self.active.context()),
        );
        let outcome = resolution.bound().invoke(&site, &resolution.options)?;
        Ok(self.apply(outcome))
    }

    /// Parses, resolves and invokes each sub-command of `line` in turn. A
    /// parse failure rejects the whole line; later failures are reported per
    /// sub-command.
    pub fn execute(
        &mut self,
        line: &str,
    ) -> Result<Vec<Result<CommandResult, DispatchError>>, DispatchError> {
        let command_line = parse(line)?;
        let mut results = Vec::with_capacity(command_line.stages.len());
        for stage in command_line.stages {
            let result = self
                .resolve_words(&stage.into_texts())
                .and_then(|resolution| self.invoke(&resolution));
            let quit = matches!(
                &result,
                Ok(CommandResult {
                    transition: Transition::Quit,
                    ..
                })
            );
            results.push(result);
            if quit {
                break;
            }
        }
        Ok(results)
    }

    /// Returns to the previous context; false at the root.
    pub fn exit(&mut self) -> bool {
        match self.stack.pop() {
            Some(previous) => {
                debug!(to = previous.context().name(), "leaving context");
                self.active = previous;
                true
            }
            None => false,
        }
    }

    /// Returns to the root context.
    pub fn end(&mut self) {
        if !self.stack.is_empty() {
            let root = self.stack.swap_remove(0);
            self.stack.clear();
            debug!("returning to root context");
            self.active = root;
        }
    }

    fn apply(&mut self, outcome: Outcome) -> CommandResult {
        let (output, transition) = match outcome {
            Outcome::Done => (None, Transition::Stay),
            Outcome::Output(text) => (Some(text), Transition::Stay),
            Outcome::Enter(next) => {
                debug!(to = next.context().name(), "entered context");
                let previous = mem::replace(&mut self.active, next);
                self.stack.push(previous);
                (None, Transition::Enter)
            }
            Outcome::Exit => {
                let transition = if self.exit() {
                    Transition::Exit
                } else {
                    Transition::Stay
                };
                (None, transition)
            }
            Outcome::End => {
                let transition = if self.stack.is_empty() {
                    Transition::Stay
                } else {
                    self.end();
                    Transition::Exit
                };
                (None, transition)
            }
            Outcome::Quit => (None, Transition::Quit),
        };
        CommandResult {
            context: self.active.clone(),
            output,
            transition,
        }
    }
}

/// Splits off a leading negation word.
pub fn strip_negation<S: AsRef<str>>(words: &[S]) -> (bool, &[S]) {
    match words.split_first() {
        Some((first, rest)) if first.as_ref().eq_ignore_ascii_case(NEGATION) => (true, rest),
        _ => (false, words),
    }
}

fn convert_options<S: AsRef<str>>(
    group: &MatchGroup<CommandRef>,
    words: &[S],
    arity: usize,
) -> Result<Vec<Value>, ConvertError> {
    words
        .iter()
        .skip(group.primary.len())
        .zip(group.secondary.iter().take(arity))
        .map(|(word, token)| token.convert(word.as_ref()))
        .collect()
}

fn join<S: AsRef<str>>(words: &[S]) -> String {
    words
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<&str>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::context::Family;
    use crate::command::grammar::Expression;
    use crate::command::handler::Action;
    use std::cell::Cell;

    fn echo(help: &'static str, arity: usize) -> Handler {
        Handler::utility(
            help,
            Action::new(arity, |invocation| {
                let words: Vec<String> = invocation.options().iter().map(ToString::to_string).collect();
                Ok(Outcome::Output(words.join(",")))
            }),
        )
    }

    fn dispatcher() -> Dispatcher {
        let mut modes = ContextTree::new(Family::new("root"));
        modes.set_handler(["show"], echo("Show information", 0));
        modes.set_handler(["ship"], echo("Ship it", 0));
        modes.set_handler(
            ["ping"],
            echo("Ping a host", 1).with_options(Expression::one_of([Token::Ipv4, Token::Ipv6])),
        );
        modes.set_handler(
            ["trace"],
            echo("Trace a route", 1).with_options(Expression::in_order([
                Expression::from(Token::Ipv4),
                Expression::optional(Token::literal("verbose")),
            ])),
        );

        let mut global = ContextTree::new(Family::new("global"));
        global.set_handler(
            ["exit"],
            Handler::utility("Leave mode", Action::new(0, |_| Ok(Outcome::Exit))),
        );
        Dispatcher::new(modes, global)
    }

    fn counting(invoked: &Rc<Cell<usize>>, arity: usize) -> Action {
        let invoked = Rc::clone(invoked);
        Action::new(arity, move |_| {
            invoked.set(invoked.get() + 1);
            Ok(Outcome::Done)
        })
    }

    fn single(dispatcher: &mut Dispatcher, line: &str) -> Result<CommandResult, DispatchError> {
        let mut results = dispatcher.execute(line).expect("line parses");
        assert_eq!(results.len(), 1);
        results.remove(0)
    }

    #[test]
    fn reports_ambiguous_prefix() {
        let mut dispatcher = dispatcher();
        match single(&mut dispatcher, "sh") {
            Err(DispatchError::Ambiguous { candidates, .. }) => {
                assert_eq!(candidates, ["show", "ship"]);
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(single(&mut dispatcher, "shi").is_ok());
    }

    #[test]
    fn distinguishes_unknown_from_incomplete() {
        let mut dispatcher = dispatcher();
        assert!(matches!(
            single(&mut dispatcher, "reload"),
            Err(DispatchError::NotFound { .. })
        ));
        assert!(matches!(
            single(&mut dispatcher, "ping"),
            Err(DispatchError::Incomplete { .. })
        ));
        assert!(matches!(
            single(&mut dispatcher, "show extra"),
            Err(DispatchError::NotFound { .. })
        ));
    }

    #[test]
    fn alternatives_of_one_command_pick_the_converting_token() {
        let mut dispatcher = dispatcher();
        let result = single(&mut dispatcher, "ping fe80::1").expect("converts as IPv6");
        assert_eq!(result.output.as_deref(), Some("fe80::1"));

        match single(&mut dispatcher, "ping nowhere") {
            Err(DispatchError::Convert(err)) => assert_eq!(err.expected, "A.B.C.D"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn options_beyond_arity_are_discarded() {
        let mut dispatcher = dispatcher();
        let resolution = dispatcher
            .resolve_words(&["trace", "10.0.0.1", "verb"])
            .expect("resolves");
        assert_eq!(resolution.options(), [Value::Ipv4([10, 0, 0, 1].into())]);
    }

    #[test]
    fn exit_at_root_is_a_no_op() {
        let mut dispatcher = dispatcher();
        let root = dispatcher.active().clone();
        let result = single(&mut dispatcher, "exit").expect("exit runs");
        assert_eq!(result.transition, Transition::Stay);
        assert!(result.context.same_context(&root));
    }

    #[test]
    fn pipeline_stages_resolve_independently() {
        let mut dispatcher = dispatcher();
        let results = dispatcher.execute("show | nothing | ship").expect("line parses");
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(DispatchError::NotFound { .. })));
        assert!(results[2].is_ok());
    }

    #[test]
    fn parse_errors_reject_the_whole_line() {
        let mut dispatcher = dispatcher();
        assert!(matches!(
            dispatcher.execute("show |"),
            Err(DispatchError::Parse(_))
        ));
    }

    #[test]
    fn command_tree_is_cached_per_mode() {
        let mut dispatcher = dispatcher();
        let first = dispatcher.command_tree().expect("tree builds");
        let second = dispatcher.command_tree().expect("tree builds");
        assert!(Rc::ptr_eq(&first, &second));
    }

    #[test]
    fn resolve_reports_each_stage_without_invoking() {
        let invoked = Rc::new(Cell::new(0));
        let mut modes = ContextTree::new(Family::new("root"));
        modes.set_handler(
            ["shutdown"],
            Handler::feature(
                "Disable",
                counting(&invoked, 0),
                counting(&invoked, 0),
            ),
        );
        modes.set_handler(
            ["ping"],
            Handler::utility("Ping a host", counting(&invoked, 1))
                .with_options(Expression::one_of([Token::Ipv4, Token::Ipv6])),
        );
        let mut global = ContextTree::new(Family::new("global"));
        global.set_handler(["exit"], Handler::utility("Leave mode", counting(&invoked, 0)));
        let mut dispatcher = Dispatcher::new(modes, global);
        let root = dispatcher.active().clone();

        let stages = dispatcher
            .resolve("no shut | bogus | ping 10.0.0.1 | exit")
            .expect("line parses");
        assert_eq!(stages.len(), 4);

        let shutdown = stages[0].as_ref().expect("shutdown resolves");
        assert!(shutdown.is_negated());
        assert!(shutdown.bound().is_negated());
        assert_eq!(shutdown.bound().arity(), 0);
        assert_eq!(shutdown.scope(), Scope::Mode);
        assert_eq!(shutdown.words(), ["shut"]);
        assert!(shutdown.options().is_empty());

        assert!(matches!(
            &stages[1],
            Err(DispatchError::NotFound { command }) if command == "bogus"
        ));

        let ping = stages[2].as_ref().expect("ping resolves");
        assert!(!ping.is_negated());
        assert_eq!(ping.bound().arity(), 1);
        assert_eq!(ping.handler().help(), "Ping a host");
        assert_eq!(ping.options(), [Value::Ipv4([10, 0, 0, 1].into())]);

        let exit = stages[3].as_ref().expect("exit resolves");
        assert_eq!(exit.scope(), Scope::Global);

        assert_eq!(invoked.get(), 0);
        assert_eq!(dispatcher.depth(), 0);
        assert!(dispatcher.active().same_context(&root));

        let result = dispatcher.invoke(ping).expect("ping runs");
        assert_eq!(result.transition, Transition::Stay);
        assert_eq!(invoked.get(), 1);
    }

    #[test]
    fn bare_negation_is_unknown() {
        let mut dispatcher = dispatcher();
        assert_eq!(
            dispatcher.resolve_words(&["no"]).map(|_| ()),
            Err(DispatchError::NotFound {
                command: "no".into()
            })
        );
    }

    #[test]
    fn duplicate_grammar_is_a_registration_error() {
        let mut modes = ContextTree::new(Family::new("root"));
        modes.set_handler(
            ["show"],
            echo("Show", 0).with_options(Expression::one_of([
                Token::literal("detail"),
                Token::literal("detail"),
            ])),
        );
        let mut dispatcher = Dispatcher::new(modes, ContextTree::new(Family::new("global")));
        assert!(matches!(
            dispatcher.command_tree(),
            Err(DispatchError::Registration(MatchError::Duplicate { .. }))
        ));
    }
}
