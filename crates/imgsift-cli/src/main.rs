use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use imgsift_core::config::LogLevel;
use imgsift_core::logging::{init_logger, LOG_ENV_VAR};
use imgsift_core::{
    best_of, CancelToken, Config, DedupReport, ImageGrouper, LogProgress, ProgressBarSink,
    ProgressSink, ReferenceReport,
};
use log::{info, warn};
use serde_json::json;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "imgsift")]
#[command(about = "Find groups of near-duplicate images")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare every image under the given directories and group near-duplicates
    Scan {
        /// Directories to scan
        #[arg(required = true)]
        directories: Vec<PathBuf>,

        #[command(flatten)]
        options: RunOptions,
    },

    /// Find images similar to one reference image
    Match {
        /// Image to compare against
        reference: PathBuf,

        /// Directories to search
        #[arg(required = true)]
        directories: Vec<PathBuf>,

        #[command(flatten)]
        options: RunOptions,
    },

    /// Generate default configuration file
    GenerateConfig {
        /// Path to save configuration file
        #[arg(default_value = "imgsift.json")]
        path: PathBuf,
    },
}

#[derive(Args)]
struct RunOptions {
    /// Similarity percentage (0-100) at which images count as near-duplicates
    #[arg(short, long)]
    threshold: Option<f64>,

    /// Fingerprint grid size (each hash has hash-size² bits)
    #[arg(long)]
    hash_size: Option<u32>,

    /// Worker threads (0 = one per core)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,

    /// Write logs to a rotating file in this directory instead of stderr
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl RunOptions {
    /// Load the config file (if any) and apply command line overrides
    fn load_config(&self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };

        if let Some(threshold) = self.threshold {
            config.threshold = threshold;
        }
        if let Some(hash_size) = self.hash_size {
            config.hash_size = hash_size;
        }
        if let Some(workers) = self.workers {
            config.max_workers = workers;
        }
        match self.verbose {
            0 => {}
            1 => config.log_level = LogLevel::Debug,
            _ => config.log_level = LogLevel::Trace,
        }

        config.validate()?;
        Ok(config)
    }

    fn init_logging(&self, config: &Config) -> anyhow::Result<()> {
        let level = config.log_level.to_level_filter();
        match &self.log_dir {
            Some(dir) => init_logger(dir, level)?,
            None => env_logger::Builder::new()
                .filter_level(level)
                .parse_env(LOG_ENV_VAR)
                .init(),
        }
        Ok(())
    }

    /// JSON output keeps stdout clean, so progress goes to the log instead of a bar
    fn progress(&self) -> Box<dyn ProgressSink> {
        if self.json {
            Box::new(LogProgress)
        } else {
            Box::new(ProgressBarSink::new())
        }
    }
}

/// Cancel the token on Ctrl-C so a long run stops cleanly with partial results
fn cancel_on_interrupt() -> anyhow::Result<CancelToken> {
    let token = CancelToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || {
        warn!("Interrupted, stopping after in-flight work");
        handler_token.cancel();
    })
    .context("Failed to install Ctrl-C handler")?;
    Ok(token)
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Scan {
            directories,
            options,
        } => {
            let config = options.load_config()?;
            options.init_logging(&config)?;
            let params = config.match_params();

            let grouper = ImageGrouper::new(config)?;
            let cancel = cancel_on_interrupt()?;
            let progress = options.progress();

            info!("Scanning {} directories", directories.len());
            let images = grouper.collect_candidates(&directories, progress.as_ref())?;
            let report = grouper.run_all_pairs(&images, &params, progress.as_ref(), &cancel)?;

            if options.json {
                print_scan_json(&report)?;
            } else {
                print_scan(&report);
            }
            Ok(())
        }

        Commands::Match {
            reference,
            directories,
            options,
        } => {
            let config = options.load_config()?;
            options.init_logging(&config)?;
            let params = config.match_params();

            let grouper = ImageGrouper::new(config)?;
            let cancel = cancel_on_interrupt()?;
            let progress = options.progress();

            let images = grouper.collect_candidates(&directories, progress.as_ref())?;
            let report = grouper.run_reference_match(
                &reference,
                &images,
                &params,
                progress.as_ref(),
                &cancel,
            )?;

            if options.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_matches(&report);
            }
            Ok(())
        }

        Commands::GenerateConfig { path } => {
            let config = Config::default();
            config.save_to_file(&path)?;
            println!("Configuration file generated at: {}", path.display());
            Ok(())
        }
    }
}

fn print_scan(report: &DedupReport) {
    if report.groups.is_empty() {
        println!("No near-duplicate images found.");
    }

    for (i, group) in report.groups.iter().enumerate() {
        let keep = best_of(&group.members);
        println!(
            "Group {} ({} images, average similarity {:.2}%)",
            i + 1,
            group.len(),
            group.average_similarity
        );
        for member in &group.members {
            let marker = if keep.as_deref() == Some(member.as_path()) {
                "* "
            } else {
                "  "
            };
            println!("  {}{}", marker, member.display());
        }
    }

    println!();
    println!(
        "{} images hashed, {} comparisons ({} skipped by pre-filter), {} groups",
        report.images_hashed,
        report.comparisons,
        report.comparisons_skipped,
        report.groups.len()
    );
    print_failures(report.failures.iter().map(|f| (f.path.as_path(), f.cause.as_str())));
    if report.cancelled {
        println!("Run was cancelled; results are partial.");
    }
}

fn print_scan_json(report: &DedupReport) -> anyhow::Result<()> {
    let groups: Vec<_> = report
        .groups
        .iter()
        .map(|group| {
            json!({
                "members": group.members,
                "average_similarity": group.average_similarity,
                "keep": best_of(&group.members),
            })
        })
        .collect();

    let output = json!({
        "groups": groups,
        "failures": report.failures,
        "images_hashed": report.images_hashed,
        "comparisons": report.comparisons,
        "comparisons_skipped": report.comparisons_skipped,
        "cancelled": report.cancelled,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn print_matches(report: &ReferenceReport) {
    if report.matches.is_empty() {
        println!("No images similar to {}", report.reference.display());
    }
    for m in &report.matches {
        println!("{:>7.2}%  {}", m.similarity, m.path.display());
    }
    print_failures(report.failures.iter().map(|f| (f.path.as_path(), f.cause.as_str())));
    if report.cancelled {
        println!("Run was cancelled; results are partial.");
    }
}

fn print_failures<'a>(failures: impl Iterator<Item = (&'a Path, &'a str)>) {
    let failures: Vec<_> = failures.collect();
    if failures.is_empty() {
        return;
    }
    println!("{} images could not be read:", failures.len());
    for (path, cause) in failures {
        println!("  {}: {}", path.display(), cause);
    }
}
