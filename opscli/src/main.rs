mod commands;
mod console;
mod ovsdb;
mod session;

use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{Context as _, Result};
use clap::Parser;
use opscli_core::command::Dispatcher;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use commands::Db;
use console::{Console, ReadLine};
use ovsdb::{Database, Endpoint, Ovsdb};
use session::Session;

const LOG_ENV: &str = "OPSCLI_LOG";
const DEFAULT_SERVER: &str = "unix:/var/run/openvswitch/db.sock";
const FALLBACK_HOSTNAME: &str = "switch";
const MOTD: &str = "OpenSwitch command line. Press ? for help, Tab to complete.";

#[derive(Parser, Debug)]
#[command(name = "opscli", version, about = "Interactive OpenSwitch configuration shell")]
struct Cli {
    /// Database endpoint, `tcp:<ipv4>:<port>` or `unix:<path>`
    #[arg(long, default_value = DEFAULT_SERVER)]
    server: String,

    /// History file (default: ~/.opscli_history)
    #[arg(long)]
    history: Option<PathBuf>,

    /// Do not print the message of the day
    #[arg(long)]
    no_banner: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| "warn".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let endpoint: Endpoint = cli
        .server
        .parse()
        .with_context(|| format!("invalid --server `{}`", cli.server))?;
    info!(%endpoint, "starting");

    let db: Db = Rc::new(Ovsdb::new(endpoint));
    let hostname = hostname(&*db);
    let (modes, global) = commands::register(&db);
    let mut session = Session::new(Dispatcher::new(modes, global), hostname);
    let mut console = Console::new(cli.history.or_else(console::default_history_path));

    if !cli.no_banner {
        println!("{MOTD}");
    }

    loop {
        match console.read_line(&mut session).context("reading input")? {
            ReadLine::Line(line) => {
                let reply = session.handle_line(&line);
                for line in &reply.lines {
                    println!("{line}");
                }
                if reply.quit {
                    break;
                }
            }
            ReadLine::Interrupted => {}
            ReadLine::Eof => break,
        }
    }

    console.close().context("saving history")?;
    Ok(())
}

/// Hostname reported by the management interface, or a fixed fallback when
/// the database cannot be reached.
fn hostname(db: &dyn Database) -> String {
    match db.get_map("System", "mgmt_intf_status", &[]) {
        Ok(status) => status
            .get("hostname")
            .filter(|name| !name.is_empty())
            .cloned()
            .unwrap_or_else(|| FALLBACK_HOSTNAME.to_owned()),
        Err(err) => {
            warn!(error = %err, "unable to read hostname");
            FALLBACK_HOSTNAME.to_owned()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::MemoryDb;
    use crate::ovsdb::OvsdbError;
    use serde_json::json;

    #[test]
    fn flags_have_defaults() {
        let cli = Cli::parse_from(["opscli"]);
        assert_eq!(cli.server, DEFAULT_SERVER);
        assert!(cli.history.is_none());
        assert!(!cli.no_banner);

        let cli = Cli::parse_from(["opscli", "--server", "tcp:127.0.0.1:6640", "--no-banner"]);
        assert_eq!(cli.server, "tcp:127.0.0.1:6640");
        assert!(cli.no_banner);
    }

    #[test]
    fn hostname_comes_from_the_management_status() {
        let db = MemoryDb::new(|_| {
            Ok(json!({"rows": [{"mgmt_intf_status": ["map", [["hostname", "spine2"]]]}]}))
        });
        assert_eq!(hostname(&*db), "spine2");
    }

    #[test]
    fn hostname_falls_back_when_unreachable() {
        let db = MemoryDb::new(|_| Err(OvsdbError::Server("down".into())));
        assert_eq!(hostname(&*db), FALLBACK_HOSTNAME);

        let db = MemoryDb::new(|_| Ok(json!({"rows": [{"mgmt_intf_status": ["map", []]}]})));
        assert_eq!(hostname(&*db), FALLBACK_HOSTNAME);
    }
}
