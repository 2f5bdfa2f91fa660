//! Prefix-matching trie over registered command grammars.
//!
//! Every registered command contributes one [`MatchGroup`] per enumerated
//! option combination. Edges are keyed by [`Token`] and kept in insertion
//! order, so query results come back in registration order. A word may
//! satisfy several sibling edges at once (`sh` matches both `show` and
//! `ship`); queries follow all of them and leave ambiguity to the caller.

use thiserror::Error;

use super::token::Token;

/// A command's keywords plus one concrete option combination.
#[derive(Clone, Debug, PartialEq)]
pub struct MatchGroup<V> {
    /// Fixed keywords naming the command.
    pub primary: Vec<Token>,
    /// One enumerated option combination.
    pub secondary: Vec<Token>,
    pub value: V,
}

impl<V> MatchGroup<V> {
    pub fn new(primary: Vec<Token>, secondary: Vec<Token>, value: V) -> Self {
        MatchGroup {
            primary,
            secondary,
            value,
        }
    }

    /// The full qualified token path, keywords first.
    pub fn tokens(&self) -> impl Iterator<Item = &Token> {
        self.primary.iter().chain(&self.secondary)
    }

    pub fn len(&self) -> usize {
        self.primary.len() + self.secondary.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Space-separated rendering of the qualified path.
    pub fn describe(&self) -> String {
        self.tokens()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum MatchError {
    /// Two registrations enumerate to the same token path.
    #[error("duplicate command grammar `{path}`")]
    Duplicate { path: String },
}

#[derive(Debug)]
struct Branch<V> {
    group: Option<MatchGroup<V>>,
    edges: Vec<(Token, Branch<V>)>,
}

impl<V> Branch<V> {
    const fn new() -> Self {
        Branch {
            group: None,
            edges: Vec::new(),
        }
    }

    fn collect<'a, S: AsRef<str>>(
        &'a self,
        words: &[S],
        prefix: bool,
        out: &mut Vec<&'a MatchGroup<V>>,
    ) {
        match words.split_first() {
            None => {
                if let Some(group) = &self.group {
                    out.push(group);
                }
                if prefix {
                    for (_, branch) in &self.edges {
                        branch.collect::<S>(&[], true, out);
                    }
                }
            }
            Some((word, rest)) => {
                for (token, branch) in &self.edges {
                    if token.matches(word.as_ref()) {
                        branch.collect(rest, prefix, out);
                    }
                }
            }
        }
    }

    fn count(&self) -> usize {
        usize::from(self.group.is_some())
            + self
                .edges
                .iter()
                .map(|(_, branch)| branch.count())
                .sum::<usize>()
    }
}

/// Ordered trie of [`MatchGroup`]s.
#[derive(Debug)]
pub struct MatchTree<V> {
    root: Branch<V>,
}

impl<V> Default for MatchTree<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> MatchTree<V> {
    #[must_use]
    pub const fn new() -> Self {
        MatchTree {
            root: Branch::new(),
        }
    }

    /// Adds a group under its qualified token path.
    pub fn insert(&mut self, group: MatchGroup<V>) -> Result<(), MatchError> {
        let mut branch = &mut self.root;
        for token in group.primary.iter().chain(&group.secondary) {
            let index = if let Some(index) = branch.edges.iter().position(|(edge, _)| edge == token)
            {
                index
            } else {
                branch.edges.push((token.clone(), Branch::new()));
                branch.edges.len() - 1
            };
            branch = &mut branch.edges[index].1;
        }

        if branch.group.is_some() {
            return Err(MatchError::Duplicate {
                path: group.describe(),
            });
        }
        branch.group = Some(group);
        Ok(())
    }

    /// Groups whose full path is consumed exactly by `words`.
    pub fn match_exact<S: AsRef<str>>(&self, words: &[S]) -> Vec<&MatchGroup<V>> {
        let mut out = Vec::new();
        self.root.collect(words, false, &mut out);
        out
    }

    /// Groups whose path starts with `words`, including every group below the
    /// point where the words run out.
    pub fn match_prefix<S: AsRef<str>>(&self, words: &[S]) -> Vec<&MatchGroup<V>> {
        let mut out = Vec::new();
        self.root.collect(words, true, &mut out);
        out
    }

    /// Every group in trie order.
    pub fn groups(&self) -> Vec<&MatchGroup<V>> {
        self.match_prefix::<&str>(&[])
    }

    pub fn len(&self) -> usize {
        self.root.count()
    }

    pub fn is_empty(&self) -> bool {
        self.root.group.is_none() && self.root.edges.is_empty()
    }
}
