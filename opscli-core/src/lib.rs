//! Command engine for a mode-based network device shell.
//!
//! Commands declare their option syntax as grammar expressions, register
//! into a context tree, and are resolved from typed input lines through a
//! prefix-matching trie. The crate performs no terminal or socket I/O.

pub mod command;
