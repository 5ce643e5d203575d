use anyhow::{Context, Result};
use pld_cli::{cli, init_logging, load_config, render_steps, run_audit, run_failover};
use pld_enforcement::ValidationMode;
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    match run() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(2)
        }
    }
}

fn run() -> Result<bool> {
    let matches = cli().get_matches();
    init_logging(matches.get_flag("log-json"));

    match matches.subcommand() {
        Some(("audit", args)) => {
            let file = args
                .get_one::<PathBuf>("file")
                .context("missing transcript path")?;
            let config = load_config(args.get_one::<PathBuf>("config").map(PathBuf::as_path))?;
            let mode = args
                .get_one::<String>("mode")
                .map(|m| m.parse::<ValidationMode>())
                .transpose()?;

            let report = run_audit(file, config, mode)?;
            if args.get_flag("json") {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", report.render_text());
            }
            Ok(report.passed())
        }
        Some(("failover", args)) => {
            let session = args
                .get_one::<String>("session")
                .context("missing session id")?;
            let config = load_config(args.get_one::<PathBuf>("config").map(PathBuf::as_path))?;

            let steps = run_failover(session, &config)?;
            if args.get_flag("json") {
                println!("{}", serde_json::to_string_pretty(&steps)?);
            } else {
                print!("{}", render_steps(session, &steps));
            }
            Ok(true)
        }
        _ => Ok(false),
    }
}
