//! Library side of the `pld` binary
//!
//! Subcommands:
//! - `audit <FILE>`: validate and apply a JSON-lines transcript, then run the
//!   sequence rules per session
//! - `failover --session ID`: dry-run the configured failover orchestration

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod audit;
pub mod failover;
pub mod logging;

pub use audit::{audit_lines, load_config, run_audit, AuditReport, RejectedLine};
pub use failover::{render_steps, run_failover};
pub use logging::init_logging;

use clap::{value_parser, Arg, ArgAction, Command};
use std::path::PathBuf;

/// Command definition
#[must_use]
pub fn cli() -> Command {
    Command::new("pld")
        .version(pld_core::VERSION)
        .about("Lifecycle protocol enforcement for conversational agents")
        .subcommand_required(true)
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON on stderr"),
        )
        .subcommand(
            Command::new("audit")
                .about("Validate, apply and audit a JSON-lines transcript")
                .arg(
                    Arg::new("file")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Transcript, one event per line"),
                )
                .arg(
                    Arg::new("mode")
                        .long("mode")
                        .value_parser(["strict", "warn", "normalize"])
                        .help("Validation mode (overrides the configuration)"),
                )
                .arg(config_arg())
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        )
        .subcommand(
            Command::new("failover")
                .about("Dry-run failover orchestration without sleeping")
                .arg(
                    Arg::new("session")
                        .long("session")
                        .required(true)
                        .help("Session id to orchestrate"),
                )
                .arg(config_arg())
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        )
}

fn config_arg() -> Arg {
    Arg::new("config")
        .long("config")
        .value_parser(value_parser!(PathBuf))
        .help("TOML or YAML runtime configuration")
}
