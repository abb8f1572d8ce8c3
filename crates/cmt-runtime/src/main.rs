use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, Command};
use cmt_runtime::config::CommentsConfig;
use cmt_runtime::simulator::{run_simulator, SimulatorConfig};
use cmt_runtime::telemetry::init_tracing;
use std::path::PathBuf;

fn cli() -> Command {
    Command::new("cmt-sim")
        .version(cmt_runtime::VERSION)
        .about("Page comment lifecycle simulator")
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Path to a comments TOML config"),
        )
        .subcommand(
            Command::new("simulate")
                .about("Run a seeded create/update/delete workload")
                .arg(
                    Arg::new("operations")
                        .long("operations")
                        .default_value("500")
                        .value_parser(value_parser!(u64))
                        .help("Number of lifecycle calls to issue"),
                )
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .default_value("42")
                        .value_parser(value_parser!(u64))
                        .help("Random seed for reproducibility"),
                )
                .arg(
                    Arg::new("pages")
                        .long("pages")
                        .default_value("8")
                        .value_parser(value_parser!(usize))
                        .help("Number of pages to comment on"),
                )
                .arg(
                    Arg::new("users")
                        .long("users")
                        .default_value("12")
                        .value_parser(value_parser!(usize))
                        .help("Number of registered users"),
                )
                .arg(
                    Arg::new("concurrency")
                        .long("concurrency")
                        .default_value("1")
                        .value_parser(value_parser!(usize))
                        .help("Effect worker concurrency"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output the report as JSON"),
                ),
        )
        .subcommand(Command::new("check-config").about("Validate and print the effective config"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();

    let config = match matches.get_one::<PathBuf>("config") {
        Some(path) => CommentsConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => CommentsConfig::default(),
    };
    init_tracing(&config.logging);

    match matches.subcommand() {
        Some(("simulate", args)) => {
            let sim = SimulatorConfig {
                seed: args.get_one::<u64>("seed").copied().unwrap_or(42),
                operations: args.get_one::<u64>("operations").copied().unwrap_or(500),
                pages: args.get_one::<usize>("pages").copied().unwrap_or(8),
                users: args.get_one::<usize>("users").copied().unwrap_or(12),
                concurrency: args.get_one::<usize>("concurrency").copied().unwrap_or(1),
            };

            let report = run_simulator(sim).await.context("starting comment service")?;
            if args.get_flag("json") {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report.generate_text());
            }
            if !report.passed() {
                std::process::exit(1);
            }
        }
        Some(("check-config", _)) => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
        _ => {
            cli().print_help()?;
        }
    }
    Ok(())
}
