use harvester::{config, logging, runner};
use harvester::filter::{Prefilter, Verdict};
use harvester::runner::count::{Cloc, LineCounter};

use anyhow::Context;
use clap::{arg, ArgMatches, Command};
use log::info;
use std::path::PathBuf;

fn cli() -> Command {
    Command::new("harvester")
        .about("Collect repositories matching size and activity criteria")
        // Configuration
        .arg_required_else_help(true)
        .arg(arg!(config: <CONFIG>)
             .value_parser(clap::value_parser!(PathBuf))
        )
        .subcommand_required(true)
        // Start the crawler
        .subcommand(
            Command::new("crawl")
                .about("Collect all matching repositories until interrupted")
        )
        // Search for repositories
        .subcommand(
            Command::new("search")
                .about("Only list the candidates of one search pass")
        )
        // Measure a local directory
        .subcommand(
            Command::new("check")
                .about("Count the lines of the configured language in a directory")
                .arg_required_else_help(true)
                .arg(arg!(path: <PATH>)
                     .value_parser(clap::value_parser!(PathBuf)))
        )
}

fn get_path(args: &ArgMatches, name: &str) -> anyhow::Result<PathBuf> {
    args.get_one::<PathBuf>(name)
        .cloned()
        .with_context(|| format!("missing argument {}", name))
}

fn main() -> anyhow::Result<()> {
    // Parse arguments
    let matches = cli().get_matches();

    // Load the configuration file
    let config_path = get_path(&matches, "config")?;
    let config = config::read_config(&config_path)?;

    match matches.subcommand() {
        Some(("crawl", _sub)) => {
            let log_file = logging::init(&config.runner)?;
            info!("Logging to {:?}", log_file);

            let interrupt = runner::register_interrupt()?;
            let totals = runner::crawl(&config, interrupt)?;
            println!("{} found.", totals.accepted);
            println!("{}", totals);
        },
        Some(("search", _sub)) => {
            logging::init(&config.runner)?;
            let interrupt = runner::register_interrupt()?;
            let totals = runner::search(&config, interrupt)?;
            info!("{}", totals);
        },
        Some(("check", sub)) => {
            logging::init(&config.runner)?;
            let path = get_path(sub, "path")?;
            let cloc = Cloc::new(&config.runner.cloc);
            let language = &config.search.language;
            let lines = cloc.measure(&path, language);
            match Prefilter::new(&config.filter, language).check_size(lines) {
                Verdict::Pass => println!("{} {} lines: passes", lines, language),
                Verdict::Reject(reason) => println!("rejected: {}", reason),
            }
        },
        _ => unreachable!(),
    }

    return Ok(());
}
