//! Command registration for the shell.
//!
//! Each submodule adds its handlers to either the mode schema, rooted at the
//! top-level context, or the global schema whose commands are available in
//! every mode.

pub mod builtin;
pub mod configure;
pub mod show;
pub mod vlan;

use std::rc::Rc;

use opscli_core::command::{ContextTree, Family};

use crate::ovsdb::Database;

/// Shared handle to the configuration database.
pub type Db = Rc<dyn Database>;

/// Family of the top-level context.
pub const ROOT: Family = Family::new("root");
const GLOBAL: Family = Family::new("global");

/// Builds the mode schema and the global schema.
pub fn register(db: &Db) -> (ContextTree, ContextTree) {
    let mut modes = ContextTree::new(ROOT);
    let mut global = ContextTree::new(GLOBAL);

    builtin::register(&mut global);
    configure::register(&mut modes, db);
    vlan::register(&mut modes, db);
    show::register(&mut modes, db);

    (modes, global)
}
