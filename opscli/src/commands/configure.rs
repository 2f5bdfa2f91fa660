//! `configure [terminal]` and the system-wide settings of config mode.

use std::rc::Rc;

use opscli_core::command::{Action, ContextTree, Entry, Expression, Family, Handler, Outcome, Token};
use serde_json::json;
use tracing::info;

use super::Db;

pub const CONFIGURE: [&str; 1] = ["configure"];
pub const CONFIG: Family = Family::new("config");
const SYSTEM: &str = "System";

pub fn register(modes: &mut ContextTree, db: &Db) {
    modes.set_family(CONFIGURE, CONFIG);
    modes.set_handler(
        CONFIGURE,
        Handler::utility(
            "Configuration from CLI",
            Action::new(0, |invocation| Ok(invocation.enter(Entry::new()))),
        )
        .with_options(Expression::optional(Token::literal("terminal"))),
    );

    modes.set_handler(
        ["configure", "hostname"],
        Handler::feature("Set the system hostname", set_hostname(db), clear_hostname(db))
            .with_options(Expression::optional(Token::Text)),
    );
}

fn set_hostname(db: &Db) -> Action {
    let db = Rc::clone(db);
    Action::new(1, move |invocation| {
        let hostname = invocation.text(0)?;
        info!(hostname, "setting hostname");
        db.update(SYSTEM, json!({ "hostname": hostname }), &[])?;
        Ok(Outcome::Done)
    })
}

fn clear_hostname(db: &Db) -> Action {
    let db = Rc::clone(db);
    Action::new(0, move |_| {
        info!("clearing hostname");
        db.update(SYSTEM, json!({ "hostname": "" }), &[])?;
        Ok(Outcome::Done)
    })
}

#[cfg(test)]
mod tests {
    use opscli_core::command::{DispatchError, InvokeError, Transition};
    use rstest::rstest;
    use serde_json::json;

    use crate::commands::testing::{MemoryDb, dispatcher, run};
    use crate::ovsdb::OvsdbError;

    #[rstest]
    #[case("configure")]
    #[case("configure terminal")]
    #[case("conf t")]
    fn enters_config_mode(#[case] line: &str) {
        let db = MemoryDb::empty();
        let mut dispatcher = dispatcher(&db);
        let result = run(&mut dispatcher, line).expect("configure");
        assert_eq!(result.transition, Transition::Enter);
        assert_eq!(dispatcher.prompt(), "(config)");
    }

    #[test]
    fn configure_is_not_available_inside_config_mode() {
        let db = MemoryDb::empty();
        let mut dispatcher = dispatcher(&db);
        run(&mut dispatcher, "configure").expect("configure");
        assert!(matches!(
            run(&mut dispatcher, "configure"),
            Err(DispatchError::NotFound { .. })
        ));
    }

    #[test]
    fn hostname_updates_the_system_row() {
        let db = MemoryDb::empty();
        let mut dispatcher = dispatcher(&db);
        run(&mut dispatcher, "configure").expect("configure");
        run(&mut dispatcher, "hostname leaf1").expect("hostname");
        run(&mut dispatcher, "no hostname").expect("no hostname");

        let ops = db.ops();
        assert_eq!(ops[0]["op"], "update");
        assert_eq!(ops[0]["table"], "System");
        assert_eq!(ops[0]["row"], json!({"hostname": "leaf1"}));
        assert_eq!(ops[1]["row"], json!({"hostname": ""}));
    }

    #[test]
    fn database_failures_become_handler_errors() {
        let db = MemoryDb::new(|_| Err(OvsdbError::Server("read-only".into())));
        let mut dispatcher = dispatcher(&db);
        run(&mut dispatcher, "configure").expect("configure");
        let err = run(&mut dispatcher, "hostname leaf1").expect_err("server error");
        assert!(matches!(err, DispatchError::Invoke(InvokeError::Handler(_))));
        assert_eq!(err.to_string(), "server error: read-only");
    }
}
