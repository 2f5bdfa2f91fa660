//! Commands available in every mode.

use opscli_core::command::{Action, Context, ContextTree, Handler, HandlerError, Invocation, Outcome};

pub fn register(global: &mut ContextTree) {
    global.set_handler(
        ["exit"],
        Handler::utility("Exit current mode", Action::new(0, |_| Ok(Outcome::Exit))),
    );
    global.set_handler(
        ["quit"],
        Handler::utility("Quit the shell", Action::new(0, |_| Ok(Outcome::Quit))),
    );
    global.set_handler(
        ["end"],
        Handler::utility("Return to the top level", Action::new(0, |_| Ok(Outcome::End))),
    );
    global.set_handler(
        ["pwc"],
        Handler::utility("Print the current context chain", Action::new(0, pwc)),
    );
}

fn pwc(invocation: &Invocation<'_>) -> Result<Outcome, HandlerError> {
    let mut chain: Vec<&Context> = invocation.context().chain().collect();
    chain.reverse();
    let lines: Vec<String> = chain
        .iter()
        .enumerate()
        .map(|(depth, context)| format!("{:indent$}{}", "", context.describe(), indent = depth * 2))
        .collect();
    Ok(Outcome::Output(lines.join("\n")))
}
