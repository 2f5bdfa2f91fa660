use std::cell::RefCell;
use std::rc::Rc;

use opscli_core::command::context::{BoundContext, ContextTree, Entry, Family};
use opscli_core::command::dispatch::{CommandResult, DispatchError, Dispatcher, Transition};
use opscli_core::command::grammar::Expression;
use opscli_core::command::handler::{Action, Handler, HandlerError, Outcome};
use opscli_core::command::token::Token;

#[derive(Debug, PartialEq, Eq)]
struct VlanId(i64);

type Log = Rc<RefCell<Vec<String>>>;

fn record(log: &Log, event: &'static str) -> Action {
    let log = Rc::clone(log);
    Action::new(0, move |invocation| {
        let vlan = invocation
            .find::<VlanId>()
            .ok_or_else(|| HandlerError::failed("not in a vlan"))?;
        log.borrow_mut().push(format!("{event} {}", vlan.0));
        Ok(Outcome::Done)
    })
}

fn registry(log: &Log) -> (ContextTree, ContextTree) {
    let mut modes = ContextTree::new(Family::new("root"));
    modes.set_family(["configure"], Family::new("config"));
    modes.set_handler(
        ["configure"],
        Handler::utility(
            "Enter configuration mode",
            Action::new(0, |invocation| Ok(invocation.enter(Entry::new()))),
        )
        .with_options(Expression::optional(Token::literal("terminal"))),
    );
    modes.set_family(["configure", "vlan"], Family::new("vlan"));
    modes.set_handler(
        ["configure", "vlan"],
        Handler::utility(
            "Configure a VLAN",
            Action::new(1, |invocation| {
                let id = invocation.integer(0)?;
                Ok(invocation.enter(
                    Entry::new()
                        .with_payload(VlanId(id))
                        .with_detail(format!("vlan {id}")),
                ))
            }),
        )
        .with_options(Token::integer(1, 4094)),
    );
    modes.set_handler(
        ["configure", "vlan", "shutdown"],
        Handler::feature(
            "Disable the VLAN",
            record(log, "shutdown"),
            record(log, "no shutdown"),
        ),
    );

    let mut global = ContextTree::new(Family::new("global"));
    global.set_handler(
        ["exit"],
        Handler::utility("Leave the current mode", Action::new(0, |_| Ok(Outcome::Exit))),
    );
    global.set_handler(
        ["end"],
        Handler::utility("Return to the top level", Action::new(0, |_| Ok(Outcome::End))),
    );
    global.set_handler(
        ["quit"],
        Handler::utility("Leave the shell", Action::new(0, |_| Ok(Outcome::Quit))),
    );
    (modes, global)
}

fn dispatcher(log: &Log) -> Dispatcher {
    let (modes, global) = registry(log);
    Dispatcher::new(modes, global)
}

fn run(dispatcher: &mut Dispatcher, line: &str) -> CommandResult {
    let mut results = dispatcher.execute(line).expect("line parses");
    assert_eq!(results.len(), 1, "single stage");
    match results.remove(0) {
        Ok(result) => result,
        Err(err) => panic!("`{line}` failed: {err}"),
    }
}

fn command_paths(bound: &BoundContext) -> Vec<String> {
    bound
        .commands()
        .iter()
        .map(|entry| entry.path.join(" "))
        .collect()
}

#[test]
fn border_command_enters_child_mode() {
    let log = Log::default();
    let mut dispatcher = dispatcher(&log);
    let root = dispatcher.active().clone();

    let result = run(&mut dispatcher, "conf t");
    assert_eq!(result.transition, Transition::Enter);
    assert_eq!(result.context.context().name(), "config");
    assert!(
        result
            .context
            .context()
            .chain()
            .any(|ancestor| std::ptr::eq(ancestor, &**root.context()))
    );
    assert_eq!(dispatcher.prompt(), "(config)");
}

#[test]
fn exit_restores_the_previous_context_instance() {
    let log = Log::default();
    let mut dispatcher = dispatcher(&log);
    run(&mut dispatcher, "configure");
    let config = dispatcher.active().clone();

    run(&mut dispatcher, "vlan 10");
    assert_eq!(dispatcher.depth(), 2);
    assert_eq!(dispatcher.prompt(), "(config)(vlan)");

    let result = run(&mut dispatcher, "exit");
    assert_eq!(result.transition, Transition::Exit);
    assert!(result.context.same_context(&config));
}

#[test]
fn reentering_a_mode_carries_fresh_arguments() {
    let log = Log::default();
    let mut dispatcher = dispatcher(&log);
    run(&mut dispatcher, "configure");
    run(&mut dispatcher, "vlan 10");
    run(&mut dispatcher, "shutdown");
    run(&mut dispatcher, "exit");
    run(&mut dispatcher, "vlan 20");
    run(&mut dispatcher, "no shutdown");

    assert_eq!(*log.borrow(), ["shutdown 10", "no shutdown 20"]);
    assert_eq!(
        dispatcher.active().context().detail(),
        Some("vlan 20")
    );
}

#[test]
fn negation_routes_feature_actions() {
    let log = Log::default();
    let mut dispatcher = dispatcher(&log);
    run(&mut dispatcher, "configure");
    run(&mut dispatcher, "vlan 30");
    run(&mut dispatcher, "shut");
    run(&mut dispatcher, "NO shut");

    assert_eq!(*log.borrow(), ["shutdown 30", "no shutdown 30"]);
}

#[test]
fn child_commands_stay_hidden_until_entered() {
    let log = Log::default();
    let mut dispatcher = dispatcher(&log);
    assert_eq!(command_paths(dispatcher.active()), ["configure"]);

    run(&mut dispatcher, "configure");
    assert_eq!(command_paths(dispatcher.active()), ["vlan"]);
    assert!(matches!(
        dispatcher.execute("shutdown").expect("line parses")[0],
        Err(DispatchError::NotFound { .. })
    ));

    run(&mut dispatcher, "vlan 5");
    assert_eq!(command_paths(dispatcher.active()), ["shutdown"]);
}

#[test]
fn out_of_range_option_fails_without_transition() {
    let log = Log::default();
    let mut dispatcher = dispatcher(&log);
    run(&mut dispatcher, "configure");

    let results = dispatcher.execute("vlan 5000").expect("line parses");
    assert!(matches!(results[0], Err(DispatchError::Convert(_))));
    assert_eq!(dispatcher.active().context().name(), "config");
}

#[test]
fn end_returns_to_root_from_any_depth() {
    let log = Log::default();
    let mut dispatcher = dispatcher(&log);
    let root = dispatcher.active().clone();
    run(&mut dispatcher, "configure");
    run(&mut dispatcher, "vlan 7");

    let result = run(&mut dispatcher, "end");
    assert_eq!(result.transition, Transition::Exit);
    assert!(result.context.same_context(&root));
    assert_eq!(dispatcher.depth(), 0);
}

#[test]
fn quit_stops_the_pipeline() {
    let log = Log::default();
    let mut dispatcher = dispatcher(&log);
    let results = dispatcher.execute("quit | configure").expect("line parses");
    assert_eq!(results.len(), 1);
    assert!(matches!(
        results[0],
        Ok(CommandResult {
            transition: Transition::Quit,
            ..
        })
    ));
}

#[test]
fn handler_failures_leave_the_shell_usable() {
    let log = Log::default();
    let (modes, global) = registry(&log);
    let mut dispatcher = Dispatcher::new(modes, global);
    run(&mut dispatcher, "configure");

    // `shutdown` is only registered under vlan; invoke it directly from the
    // config context so the payload lookup fails.
    let shutdown = dispatcher
        .active()
        .descend(["vlan", "shutdown"])
        .expect("registered");
    let err = shutdown.call(false, &[]).expect_err("no vlan payload");
    assert_eq!(err.to_string(), "not in a vlan");

    run(&mut dispatcher, "vlan 2");
    assert_eq!(dispatcher.depth(), 2);
}
