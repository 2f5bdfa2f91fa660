//! Tab completion and inline help over the active command tree.
//!
//! Both queries split off the last sub-command of the partial line, drop a
//! leading `no`, and run a prefix match. When the line ends in whitespace
//! they describe the next word; otherwise they describe the word being
//! typed.

use super::dispatch::{CommandRef, CommandTree, NEGATION};
use super::matcher::MatchGroup;
use super::parse::{Word, parse};
use super::token::Token;

/// Help entry shown for a command that is already complete.
pub const END_OF_COMMAND: &str = "<cr>";

/// Completion result returned to the caller.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompletionResult {
    /// Text to splice into the buffer, when one candidate matches or the
    /// candidates share a longer prefix than what was typed.
    pub replacement: Option<Replacement>,
    /// Full keywords possible at the cursor, in registration order.
    pub options: Vec<String>,
}

/// Replacement metadata describing which portion of the buffer should be
/// substituted by the completion string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Replacement {
    pub start: usize,
    pub end: usize,
    pub value: String,
    pub append_space: bool,
}

/// One line of `?` output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HelpItem {
    pub word: String,
    pub help: String,
}

struct Request {
    words: Vec<Word>,
    trailing_space: bool,
    offset: usize,
}

impl Request {
    fn new(line: &str) -> Option<Self> {
        let trimmed = line.trim();
        let offset = line.len() - line.trim_start().len();
        let mut trailing_space = trimmed.is_empty() || line.ends_with([' ', '\t']);
        let mut words = if trimmed.is_empty() {
            Vec::new()
        } else if trimmed.ends_with('|') {
            trailing_space = true;
            Vec::new()
        } else {
            parse(trimmed).ok()?.stages.pop()?.words
        };

        let negated = words
            .first()
            .is_some_and(|word| word.text.eq_ignore_ascii_case(NEGATION));
        if negated && (words.len() > 1 || trailing_space) {
            words.remove(0);
        }

        Some(Request {
            words,
            trailing_space,
            offset,
        })
    }

    fn texts(&self) -> Vec<&str> {
        self.words.iter().map(|word| word.text.as_str()).collect()
    }

    /// Position in each group's qualified path being asked about.
    fn position(&self) -> Option<usize> {
        if self.trailing_space {
            Some(self.words.len())
        } else {
            self.words.len().checked_sub(1)
        }
    }

    fn partial(&self) -> Option<&Word> {
        if self.trailing_space {
            None
        } else {
            self.words.last()
        }
    }
}

/// Stateless completion engine over a [`CommandTree`].
#[derive(Clone, Copy, Debug, Default)]
pub struct CompletionEngine;

impl CompletionEngine {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Candidate words at the end of `line`. After whitespace these are the
    /// next keywords and placeholder notations such as `<1-4094>`; otherwise
    /// the untyped remainder of each keyword the last word abbreviates.
    pub fn candidates(&self, tree: &CommandTree, line: &str) -> Vec<String> {
        let Some(request) = Request::new(line) else {
            return Vec::new();
        };
        match request.partial() {
            None => next_words(tree, &request),
            Some(partial) => {
                let typed = partial.text.len();
                let mut remainders: Vec<String> = Vec::new();
                for keyword in keywords(tree, &request) {
                    if let Some(rest) = keyword.get(typed..) {
                        push_unique(&mut remainders, rest.to_owned());
                    }
                }
                remainders
            }
        }
    }

    /// Computes the buffer edit for a completion request at the end of
    /// `line`.
    pub fn complete(&self, tree: &CommandTree, line: &str) -> CompletionResult {
        let Some(request) = Request::new(line) else {
            return CompletionResult::default();
        };
        let options = keywords(tree, &request);
        if options.is_empty() {
            return CompletionResult::default();
        }

        let (start, typed) = match request.partial() {
            Some(word) if !word.quoted => (request.offset + word.span.start, word.text.as_str()),
            Some(_) => return CompletionResult::default(),
            None => (line.len(), ""),
        };

        let replacement = if let [only] = options.as_slice() {
            Some(Replacement {
                start,
                end: line.len(),
                value: only.clone(),
                append_space: true,
            })
        } else {
            let lcp = longest_common_prefix(&options);
            (lcp.len() > common_prefix_len_ignore_case(typed, lcp)).then(|| Replacement {
                start,
                end: line.len(),
                value: lcp.to_owned(),
                append_space: false,
            })
        };

        CompletionResult {
            replacement,
            options,
        }
    }

    /// `?` listing for the end of `line`, sorted by word.
    pub fn help(&self, tree: &CommandTree, line: &str) -> Vec<HelpItem> {
        let Some(request) = Request::new(line) else {
            return Vec::new();
        };
        let Some(position) = request.position() else {
            return Vec::new();
        };

        let mut items: Vec<HelpItem> = Vec::new();
        for group in tree.match_prefix(&request.texts()) {
            let item = match group.tokens().nth(position) {
                Some(token) => HelpItem {
                    word: token.to_string(),
                    help: describe(group, token, position),
                },
                None if request.trailing_space => HelpItem {
                    word: END_OF_COMMAND.to_owned(),
                    help: group.value.help.clone(),
                },
                None => continue,
            };
            if !items.iter().any(|existing| existing.word == item.word) {
                items.push(item);
            }
        }
        items.sort_by(|lhs, rhs| lhs.word.cmp(&rhs.word));
        items
    }
}

fn keywords(tree: &CommandTree, request: &Request) -> Vec<String> {
    let Some(position) = request.position() else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for group in tree.match_prefix(&request.texts()) {
        if let Some(keyword) = group.tokens().nth(position).and_then(Token::keyword) {
            push_unique(&mut out, keyword.to_owned());
        }
    }
    out
}

fn next_words(tree: &CommandTree, request: &Request) -> Vec<String> {
    let Some(position) = request.position() else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for group in tree.match_prefix(&request.texts()) {
        if let Some(token) = group.tokens().nth(position) {
            push_unique(&mut out, token.to_string());
        }
    }
    out
}

fn describe(group: &MatchGroup<CommandRef>, token: &Token, position: usize) -> String {
    if position < group.primary.len() || token.is_literal() {
        group.value.help.clone()
    } else {
        token.describe().to_owned()
    }
}

fn push_unique(out: &mut Vec<String>, candidate: String) {
    if !out.contains(&candidate) {
        out.push(candidate);
    }
}

fn common_prefix_len_ignore_case(lhs: &str, rhs: &str) -> usize {
    lhs.as_bytes()
        .iter()
        .zip(rhs.as_bytes())
        .take_while(|(l, r)| l.eq_ignore_ascii_case(r))
        .count()
}

fn longest_common_prefix(candidates: &[String]) -> &str {
    if let Some((first, rest)) = candidates.split_first() {
        let mut prefix = first.as_str();
        for candidate in rest {
            let len = common_prefix_len_ignore_case(prefix, candidate);
            prefix = prefix.get(..len).unwrap_or("");
            if prefix.is_empty() {
                break;
            }
        }
        prefix
    } else {
        ""
    }
}
