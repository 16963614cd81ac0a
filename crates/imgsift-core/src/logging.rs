use log::{error, info, warn, LevelFilter};
use std::path::Path;

use log4rs::append::rolling_file::policy::compound::roll::fixed_window::FixedWindowRoller;
use log4rs::append::rolling_file::policy::compound::trigger::size::SizeTrigger;
use log4rs::append::rolling_file::policy::compound::CompoundPolicy;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

use crate::error::{Error, Result};

/// Environment variable that overrides the configured log level
pub const LOG_ENV_VAR: &str = "IMGSIFT_LOG";

const LOG_FILE_NAME: &str = "imgsift.log";
const ROTATE_AT_BYTES: u64 = 10 * 1024 * 1024;
const ARCHIVED_LOGS: u32 = 5;

/// Send all log output to a size-rotated file in `log_dir`.
///
/// Nothing goes to the console so log lines never tear a progress bar.
/// `IMGSIFT_LOG` (e.g. `debug`) takes precedence over `level`.
pub fn init_logger(log_dir: &Path, level: LevelFilter) -> Result<()> {
    std::fs::create_dir_all(log_dir)?;

    let log_file_path = log_dir.join(LOG_FILE_NAME);
    let archived_logs_pattern = format!("{}/imgsift.{{}}.log", log_dir.display());

    let file_roller = FixedWindowRoller::builder()
        .build(&archived_logs_pattern, ARCHIVED_LOGS)
        .map_err(|e| Error::Configuration(format!("Failed to create log roller: {}", e)))?;
    let compound_policy = CompoundPolicy::new(
        Box::new(SizeTrigger::new(ROTATE_AT_BYTES)),
        Box::new(file_roller),
    );

    let rolling_file = RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(
            "{d(%Y-%m-%d %H:%M:%S)} [{l}] [{M}:{L}] - {m}{n}",
        )))
        .build(&log_file_path, Box::new(compound_policy))?;

    let level = std::env::var(LOG_ENV_VAR)
        .ok()
        .and_then(|value| value.parse::<LevelFilter>().ok())
        .unwrap_or(level);

    let config = Config::builder()
        .appender(Appender::builder().build("file", Box::new(rolling_file)))
        .build(Root::builder().appender("file").build(level))
        .map_err(|e| Error::Configuration(format!("Failed to build log config: {}", e)))?;

    log4rs::init_config(config)
        .map_err(|e| Error::Configuration(format!("Failed to initialize log4rs: {}", e)))?;

    info!("imgsift started, logging to {}", log_file_path.display());
    Ok(())
}

/// Log an image that could not be fingerprinted
pub fn log_hash_error(path: &Path, error: &dyn std::error::Error) {
    error!(
        "Hash computation failed - Path: {}, Error: {}",
        path.display(),
        error
    );
}

/// Log a file or directory the collector had to skip
pub fn log_skipped_path(path: &Path, reason: &dyn std::fmt::Display) {
    warn!("Skipping {} - {}", path.display(), reason);
}
