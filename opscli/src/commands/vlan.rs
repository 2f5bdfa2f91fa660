//! `vlan <1-4094>` and the commands of VLAN mode.

use std::rc::Rc;

use opscli_core::command::{
    Action, ContextTree, Entry, Expression, Family, Handler, HandlerError, Invocation, Outcome,
    Token,
};
use serde_json::{Value, json};
use tracing::info;

use super::Db;
use crate::ovsdb::equals;

pub const VLAN: Family = Family::new("vlan");
pub const TABLE: &str = "VLAN";
pub const MIN_ID: i64 = 1;
pub const MAX_ID: i64 = 4094;

/// Payload of a VLAN-mode context.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VlanId(pub i64);

impl VlanId {
    fn condition(self) -> Vec<Value> {
        vec![equals("id", self.0)]
    }
}

pub fn register(modes: &mut ContextTree, db: &Db) {
    modes.set_family(["configure", "vlan"], VLAN.with_prompt("config-vlan"));
    modes.set_handler(
        ["configure", "vlan"],
        Handler::utility("VLAN configuration", enter_vlan(db))
            .with_options(Token::integer(MIN_ID, MAX_ID)),
    );

    modes.set_handler(
        ["configure", "vlan", "shutdown"],
        Handler::feature(
            "Disable the VLAN",
            set_admin(db, "down"),
            set_admin(db, "up"),
        ),
    );
    modes.set_handler(
        ["configure", "vlan", "description"],
        Handler::feature("VLAN description", set_description(db), clear_description(db))
            .with_options(Expression::optional(Token::Text)),
    );
}

fn current(invocation: &Invocation<'_>) -> Result<VlanId, HandlerError> {
    invocation
        .find::<VlanId>()
        .copied()
        .ok_or_else(|| HandlerError::failed("not in VLAN mode"))
}

fn enter_vlan(db: &Db) -> Action {
    let db = Rc::clone(db);
    Action::new(1, move |invocation| {
        let vlan = VlanId(invocation.integer(0)?);
        if db.get(TABLE, &["id"], &vlan.condition())?.is_empty() {
            info!(id = vlan.0, "creating vlan");
            db.insert(
                TABLE,
                json!({
                    "id": vlan.0,
                    "name": format!("VLAN{}", vlan.0),
                    "admin": "up",
                }),
            )?;
        }
        Ok(invocation.enter(
            Entry::new()
                .with_payload(vlan)
                .with_detail(format!("vlan {}", vlan.0)),
        ))
    })
}

fn set_admin(db: &Db, state: &'static str) -> Action {
    let db = Rc::clone(db);
    Action::new(0, move |invocation| {
        let vlan = current(invocation)?;
        info!(id = vlan.0, state, "setting admin state");
        db.update(TABLE, json!({ "admin": state }), &vlan.condition())?;
        Ok(Outcome::Done)
    })
}

fn set_description(db: &Db) -> Action {
    let db = Rc::clone(db);
    Action::new(1, move |invocation| {
        let vlan = current(invocation)?;
        let description = invocation.text(0)?;
        db.map_set_key(TABLE, "other_config", "description", description, &vlan.condition())?;
        Ok(Outcome::Done)
    })
}

fn clear_description(db: &Db) -> Action {
    let db = Rc::clone(db);
    Action::new(0, move |invocation| {
        let vlan = current(invocation)?;
        db.map_delete_key(TABLE, "other_config", "description", &vlan.condition())?;
        Ok(Outcome::Done)
    })
}
