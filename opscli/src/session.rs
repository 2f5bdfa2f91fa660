use opscli_core::command::{
    CompletionEngine, DispatchError, Dispatcher, HelpItem, Replacement, Transition,
};
use tracing::debug;

use crate::console::LineHelper;

const HELP_COMMAND: &str = "help";

#[derive(Debug, PartialEq, Eq)]
pub enum CompletionResponse {
    NoMatches,
    Applied { replacement: Replacement },
    /// Several candidates share no longer prefix; they are listed on the
    /// next Tab at the same position.
    Pending,
    Suggestions { options: Vec<String> },
}

/// Printable result of one input line.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Reply {
    pub lines: Vec<String>,
    pub quit: bool,
}

pub struct Session {
    dispatcher: Dispatcher,
    completion: CompletionEngine,
    hostname: String,
    last_completion: Option<String>,
}

impl Session {
    pub fn new(dispatcher: Dispatcher, hostname: impl Into<String>) -> Self {
        Self {
            dispatcher,
            completion: CompletionEngine::new(),
            hostname: hostname.into(),
            last_completion: None,
        }
    }

    pub fn prompt(&self) -> String {
        format!("{}{}# ", self.hostname, self.dispatcher.prompt())
    }

    pub fn handle_line(&mut self, line: &str) -> Reply {
        self.last_completion = None;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Reply::default();
        }

        if let Some(rest) = help_request(trimmed) {
            let mut request = rest.to_owned();
            if !request.is_empty() {
                request.push(' ');
            }
            return Reply {
                lines: self.handle_help(&request),
                quit: false,
            };
        }

        let results = match self.dispatcher.execute(trimmed) {
            Ok(results) => results,
            Err(err) => {
                return Reply {
                    lines: vec![error_line(&err)],
                    quit: false,
                };
            }
        };

        let mut reply = Reply::default();
        for result in results {
            match result {
                Ok(result) => {
                    if let Some(output) = result.output {
                        reply.lines.extend(output.lines().map(str::to_owned));
                    }
                    if result.transition == Transition::Quit {
                        reply.quit = true;
                    }
                }
                Err(err) => {
                    debug!(error = %err, "command failed");
                    reply.lines.push(error_line(&err));
                }
            }
        }
        reply
    }

    /// Completes the word ending at the end of `prefix`. Repeating the request
    /// for the same text lists the candidates.
    pub fn handle_completion(&mut self, prefix: &str) -> CompletionResponse {
        let tree = match self.dispatcher.command_tree() {
            Ok(tree) => tree,
            Err(err) => {
                debug!(error = %err, "no command tree");
                return CompletionResponse::NoMatches;
            }
        };
        let result = self.completion.complete(&tree, prefix);
        if result.options.is_empty() {
            self.last_completion = None;
            return CompletionResponse::NoMatches;
        }
        if let Some(replacement) = result.replacement {
            self.last_completion = None;
            return CompletionResponse::Applied { replacement };
        }

        let repeated = self.last_completion.as_deref() == Some(prefix);
        self.last_completion = Some(prefix.to_owned());
        if repeated {
            CompletionResponse::Suggestions {
                options: result.options,
            }
        } else {
            CompletionResponse::Pending
        }
    }

    /// `?` listing for `prefix`, one aligned line per item.
    pub fn handle_help(&mut self, prefix: &str) -> Vec<String> {
        let tree = match self.dispatcher.command_tree() {
            Ok(tree) => tree,
            Err(err) => return vec![error_line(&err)],
        };
        let items = self.completion.help(&tree, prefix);
        if items.is_empty() {
            return vec!["% Unrecognized command".to_owned()];
        }
        format_help(&items)
    }
}

impl LineHelper for Session {
    fn prompt(&self) -> String {
        Session::prompt(self)
    }

    fn complete(&mut self, prefix: &str) -> CompletionResponse {
        self.handle_completion(prefix)
    }

    fn help(&mut self, prefix: &str) -> Vec<String> {
        self.handle_help(prefix)
    }
}

fn help_request(line: &str) -> Option<&str> {
    let (first, rest) = line.split_once([' ', '\t']).unwrap_or((line, ""));
    first
        .eq_ignore_ascii_case(HELP_COMMAND)
        .then(|| rest.trim())
}

fn error_line(err: &DispatchError) -> String {
    format!("% {err}")
}

fn format_help(items: &[HelpItem]) -> Vec<String> {
    let width = items.iter().map(|item| item.word.len()).max().unwrap_or(0);
    items
        .iter()
        .map(|item| format!("  {:width$}  {}", item.word, item.help))
        .collect()
}
