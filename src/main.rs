use anti_imp::bridge::StaticOracle;
use anti_imp::config::{EngineSettings, FilterConfig};
use anti_imp::dom::Document;
use anti_imp::engine::FilterEngine;
use anti_imp::policy::Visibility;
use anti_imp::runtime::FilterRuntime;
use anyhow::Context;
use clap::{Arg, ArgMatches, Command};
use log::LevelFilter;
use std::process;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let matches = Command::new("anti-imp")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Hides verified-badge replies in conversation views")
        .long_about(
            "Runs the verified-reply filter against a saved page snapshot and reports\n\
             which replies would stay visible, which are hidden and which are still\n\
             waiting on trust data.",
        )
        .arg(
            Arg::new("snapshot")
                .long("snapshot")
                .value_name("FILE")
                .help("JSON element tree of the page")
                .required_unless_present("generate-config")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("path")
                .long("path")
                .value_name("PATH")
                .help("Navigation path or URL of the page")
                .default_value("/home"),
        )
        .arg(
            Arg::new("user-info")
                .long("user-info")
                .value_name("FILE")
                .help("JSON map of screen name to trust record served as the lookup oracle")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("anti-imp.yaml"),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .value_name("FILE")
                .help("Generate a default configuration file")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("settle-ms")
                .long("settle-ms")
                .value_name("MILLIS")
                .help("How long the filter may reconcile before results are reported")
                .value_parser(clap::value_parser!(u64))
                .default_value("3000"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging of scans and lookups")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let log_level = if matches.get_flag("verbose") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if let Some(generate_path) = matches.get_one::<String>("generate-config") {
        generate_default_config(generate_path);
        return;
    }

    if let Err(e) = run_snapshot(&matches).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run_snapshot(matches: &ArgMatches) -> anyhow::Result<()> {
    let snapshot = matches
        .get_one::<String>("snapshot")
        .context("--snapshot is required")?;
    let path = matches.get_one::<String>("path").unwrap();
    let config_path = matches.get_one::<String>("config").unwrap();
    let settle = Duration::from_millis(*matches.get_one::<u64>("settle-ms").unwrap());

    let config = FilterConfig::load_or_default(config_path);
    let document = Document::from_json_file(snapshot)?;
    let oracle = match matches.get_one::<String>("user-info") {
        Some(file) => StaticOracle::from_json_file(file)?,
        None => StaticOracle::default(),
    };

    let mut engine = FilterEngine::new(config, EngineSettings::default());
    engine.navigate(path);

    let dom = Arc::new(Mutex::new(document));
    let (runtime, handle, port) = FilterRuntime::new(engine, dom);
    let oracle_task = oracle.clone().spawn(port);
    let runtime_task = tokio::spawn(runtime.run());

    tokio::time::sleep(settle).await;
    handle.shutdown();

    let engine = runtime_task.await.context("Filter runtime failed")?;
    oracle_task.await.context("Lookup oracle failed")?;

    print_report(&engine, oracle.served());
    Ok(())
}

fn print_report(engine: &FilterEngine, served: usize) {
    let Some(report) = engine.last_report() else {
        println!("No scan ran");
        return;
    };

    if !report.active {
        println!(
            "Filtering inactive on {} ({} hidden posts revealed)",
            engine.location().path(),
            report.revealed
        );
        return;
    }

    println!("Page: {}", engine.location().path());
    if let Some(root) = &report.root_author {
        println!("Thread author: @{root}");
    }
    println!();
    println!("{:>4}  {:<18} {:<9} VISIBILITY", "POS", "AUTHOR", "BADGE");
    for decision in &report.decisions {
        let author = decision
            .author_id
            .as_deref()
            .map(|a| format!("@{a}"))
            .unwrap_or_else(|| "-".to_string());
        let badge = if decision.is_verified { "verified" } else { "" };
        let visibility = match decision.visibility {
            Visibility::Show => "shown",
            Visibility::Defer => "deferred",
            Visibility::Hide => "hidden",
        };
        println!(
            "{:>4}  {:<18} {:<9} {}",
            decision.position, author, badge, visibility
        );
    }

    let stats = engine.stats();
    println!();
    println!(
        "{} candidates: {} shown, {} deferred, {} hidden",
        report.candidates, report.shown, report.deferred, report.hidden
    );
    println!(
        "{} scans, {} lookups issued, {} resolved, {} expired, {} answered by oracle",
        stats.scans, stats.lookups_issued, stats.lookups_resolved, stats.lookups_expired, served
    );
}

fn generate_default_config(path: &str) {
    let config = FilterConfig::default();
    match config.to_file(path) {
        Ok(()) => {
            println!("Default configuration written to: {path}");
            println!("Please edit the configuration file to suit your needs.");
        }
        Err(e) => {
            eprintln!("Error writing configuration file: {e}");
            process::exit(1);
        }
    }
}
