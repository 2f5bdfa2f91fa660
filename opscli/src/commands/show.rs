//! `show running-config`.

use std::rc::Rc;

use opscli_core::command::{Action, ContextTree, Handler, Outcome};
use serde_json::Value;

use super::Db;
use super::vlan;
use crate::ovsdb::{Database, OvsdbError, atom, decode_map};

pub fn register(modes: &mut ContextTree, db: &Db) {
    let db = Rc::clone(db);
    modes.set_handler(
        ["show", "running-config"],
        Handler::utility(
            "Current running configuration",
            Action::new(0, move |_| Ok(Outcome::Output(running_config(&*db)?))),
        ),
    );
}

/// Renders the configuration stored in the database as CLI commands.
pub fn running_config(db: &dyn Database) -> Result<String, OvsdbError> {
    let mut lines = vec!["!".to_owned()];

    let system = db.get("System", &["hostname"], &[])?;
    let hostname = system
        .first()
        .and_then(|row| row["hostname"].as_str())
        .filter(|name| !name.is_empty());
    if let Some(hostname) = hostname {
        lines.push(format!("hostname {hostname}"));
        lines.push("!".to_owned());
    }

    let mut vlans = db.get(vlan::TABLE, &["id", "admin", "other_config"], &[])?;
    vlans.sort_by_key(|row| row["id"].as_i64());
    for row in &vlans {
        lines.extend(render_vlan(row));
        lines.push("!".to_owned());
    }

    Ok(lines.join("\n"))
}

fn render_vlan(row: &Value) -> Vec<String> {
    let mut lines = vec![format!("vlan {}", atom(&row["id"]))];
    let other_config = decode_map(&row["other_config"]).unwrap_or_default();
    if let Some(description) = other_config.get("description") {
        lines.push(format!("    description {description}"));
    }
    if row["admin"] == "down" {
        lines.push("    shutdown".to_owned());
    }
    lines
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::commands::testing::{MemoryDb, dispatcher, run};

    fn populated() -> Rc<MemoryDb> {
        MemoryDb::new(|operation| {
            Ok(match operation["table"].as_str() {
                Some("System") => json!({"rows": [{"hostname": "leaf1"}]}),
                Some("VLAN") => json!({"rows": [
                    {"id": 20, "admin": "up", "other_config": ["map", []]},
                    {"id": 10, "admin": "down", "other_config": ["map", [["description", "uplink"]]]},
                ]}),
                _ => json!({"rows": []}),
            })
        })
    }

    #[test]
    fn renders_hostname_and_sorted_vlans() {
        let db = populated();
        let mut dispatcher = dispatcher(&db);
        let result = run(&mut dispatcher, "show running-config").expect("show");
        assert_eq!(
            result.output.as_deref(),
            Some(
                "!\nhostname leaf1\n!\nvlan 10\n    description uplink\n    shutdown\n!\nvlan 20\n!"
            )
        );
    }

    #[test]
    fn empty_database_renders_separator_only() {
        let db = MemoryDb::empty();
        assert_eq!(running_config(&*db).expect("render"), "!");
    }

    #[test]
    fn abbreviated_keywords_resolve() {
        let db = populated();
        let mut dispatcher = dispatcher(&db);
        let result = run(&mut dispatcher, "sh run").expect("show");
        assert!(result.output.is_some_and(|text| text.contains("vlan 20")));
    }
}
