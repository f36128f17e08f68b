mod alerts;
mod anchor;
mod atomic;
mod canon;
mod capture;
mod cli;
mod config;
mod consent;
mod crypto;
mod doctor;
mod error;
mod facade;
mod gates;
mod ingest;
mod journal;
mod keyring;
mod layout;
mod ledger;
mod lexical_index;
mod linker;
mod logging;
mod logstore;
mod models;
mod ocr;
mod output;
mod pipeline;
mod plugins;
mod query;
mod redaction;
mod retention;
mod spool;
mod store;
mod timebase;

use anyhow::Result;
use std::path::PathBuf;

fn main() -> Result<()> {
    let raw_args: Vec<String> = std::env::args().skip(1).collect();

    if raw_args.iter().any(|a| a == "--no-color") {
        output::disable_color();
    }
    let args: Vec<String> = raw_args.into_iter().filter(|a| a != "--no-color").collect();

    if args.iter().any(|a| a == "--help" || a == "-h") || args.first().map(|s| s.as_str()) == Some("help") {
        cli::print_help();
        return Ok(());
    }
    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("autocapture {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let code = dispatch(&args)?;
    std::process::exit(code);
}

fn data_dir_from_flags(args: &[String]) -> PathBuf {
    cli::get_flag(args, "--data-dir")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(".autocapture"))
}

fn dispatch(args: &[String]) -> Result<i32> {
    match (args.first().map(|s| s.as_str()), args.get(1).map(|s| s.as_str())) {
        (Some("run"), _) => {
            let data_dir = data_dir_from_flags(&args[1..]);
            let config = config::Config::load(&config::Config::default_path(&data_dir))?;
            let f = facade::Facade::open(&data_dir, &config.runtime.run_id, &config.runtime.timezone)?;
            let state = f.run()?;
            println!("{}", serde_json::to_string(&state)?);
            Ok(cli::EXIT_PASS)
        }
        (Some("pause"), _) => {
            let data_dir = data_dir_from_flags(&args[1..]);
            let config = config::Config::load(&config::Config::default_path(&data_dir))?;
            let f = facade::Facade::open(&data_dir, &config.runtime.run_id, &config.runtime.timezone)?;
            let state = f.pause()?;
            println!("{}", serde_json::to_string(&state)?);
            Ok(cli::EXIT_PASS)
        }
        (Some("doctor"), _) => cli::run_doctor(&args[1..]),
        (Some("verify"), Some("ledger")) => cli::verify_ledger(&args[2..]),
        (Some("verify"), Some("anchors")) => cli::verify_anchors(&args[2..]),
        (Some("verify"), Some("evidence")) => cli::verify_evidence(&args[2..]),
        (Some("storage"), Some("migrate")) => cli::storage_migrate(&args[2..]),
        (Some("storage"), Some("forecast")) => cli::storage_forecast(&args[2..]),
        (Some("plugins"), Some("list")) => cli::plugins_list(&args[2..], args[2..].iter().any(|a| a == "--json")),
        (Some("plugins"), Some("verify-defaults")) => cli::plugins_verify_defaults(&args[2..]),
        (Some("codex"), Some("validate")) => cli::codex_validate(&args[2..]),
        (Some("research"), Some("run")) => cli::research_run(&args[2..]),
        (Some("query"), Some(text)) => cli::run_query(text, &args[2..]),
        (Some(other), _) => {
            eprintln!("autocapture: unknown command '{other}'\n");
            eprintln!("Run 'autocapture help' for usage.");
            Ok(cli::EXIT_FATAL)
        }
        (None, _) => {
            cli::print_help();
            Ok(cli::EXIT_PASS)
        }
    }
}
