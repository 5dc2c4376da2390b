use crate::config::Runner;
use crate::error::{Error, Result};

use std::path::PathBuf;
use std::str::FromStr;

use log::LevelFilter;
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::append::file::FileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

const PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S)} {h({l:<5})} {m}{n}";
const FILE_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S)} {l:<5} {M} - {m}{n}";

pub const LOG_FILE: &str = "harvester.log";

/// Log to stderr and to a file in the run's log directory.
///
/// Returns the path of the log file.
pub fn init(runner: &Runner) -> Result<PathBuf> {
    let level = LevelFilter::from_str(&runner.log_level)
        .map_err(|_| Error::Config(format!("Invalid log level: {:?}", runner.log_level)))?;

    let path = runner.log_dir.join(LOG_FILE);
    let config = build(level, &path)?;
    log4rs::init_config(config).map_err(|e| Error::Logging(e.to_string()))?;

    return Ok(path);
}

/// Build the log4rs configuration. Creates the log directory.
fn build(level: LevelFilter, path: &PathBuf) -> Result<Config> {
    // Keep stdout free for command output
    let console = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new(PATTERN)))
        .build();

    let file = FileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(FILE_PATTERN)))
        .build(path)
        .map_err(|e| Error::io(path, e))?;

    let config = Config::builder()
        .appender(Appender::builder().build("console", Box::new(console)))
        .appender(Appender::builder().build("file", Box::new(file)))
        .build(Root::builder().appender("console").appender("file").build(level))
        .map_err(|e| Error::Logging(e.to_string()))?;

    return Ok(config);
}
