#![doc = include_str!("../README.md")]
#![deny(missing_docs)]
#![deny(clippy::all)]
//#![deny(clippy::cargo)]

use clap::ValueHint;
use samplefetch::config::{load_hashes, prepare_output_dir, FetchConfiguration};
use samplefetch::results::FetchResult;
use samplefetch::{SampleFetcher, VERSION};

use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;
use constcat::concat;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{filter, fmt, EnvFilter, Layer, Registry};

const CONFIG_FILE: &str = "/etc/samplefetch/keys.toml";

const ERROR_LOG: &str = "samplefetch-error.log";

/// Download malware samples by MD5, SHA-1, or SHA-256 hash. Endpoints are tried in order:
/// Triage, MalwareBazaar, MalShare, VirusShare, VirusTotal, Koodous.
#[derive(Parser)]
#[command(author, about, name = "samplefetch", version = VERSION)]
pub struct FetchArgs {
    /// Directory to write the samples to, created if it doesn't exist
    #[arg(value_hint = ValueHint::DirPath)]
    pub output_dir: PathBuf,

    /// Hashes of the samples to download
    pub hashes: Vec<String>,

    /// File with one hash per line
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub hash_file: Option<PathBuf>,

    /// Load API keys and settings from a file (toml, json, or txt with name=value lines)
    #[arg(long, env = "SAMPLEFETCH_CONFIG", value_hint = ValueHint::FilePath)]
    pub config_file: Option<PathBuf>,

    /// Number of concurrent downloads, overrides the configuration file
    #[arg(long)]
    pub threads: Option<i64>,

    /// Also write the results as JSON to this file
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub report_file: Option<PathBuf>,
}

impl FetchArgs {
    /// Load the configuration and hashes, then download all samples
    pub async fn run(self) -> Result<()> {
        let mut config = if let Some(path) = &self.config_file {
            FetchConfiguration::from_file(path)?
        } else if fs::exists(CONFIG_FILE)? {
            FetchConfiguration::from_file(CONFIG_FILE.as_ref())?
        } else {
            bail!(concat!(
                "No configuration provided! Provide a config file with --config-file or have one at ",
                CONFIG_FILE
            ));
        };
        if let Some(threads) = self.threads {
            config.threads = threads;
        }

        let hashes = load_hashes(&self.hashes, self.hash_file.as_deref())?;
        let output_dir = prepare_output_dir(&self.output_dir)?;
        let fetcher = SampleFetcher::new(output_dir, config.endpoints()?, config.threads);

        println!("The available platforms are:");
        for platform in fetcher.platforms() {
            println!("\t{platform}");
        }
        println!();
        println!("Read {} hashes", hashes.len());
        println!("Downloading will be done using {} thread(s)", fetcher.threads);
        println!("Output will be written to: {:?}", fetcher.output_dir);
        println!();

        let result = fetcher.run(&hashes).await?;
        print_report(&result);

        if let Some(report_file) = &self.report_file {
            let json = serde_json::to_string_pretty(&result).context("failed to convert to json")?;
            fs::write(report_file, json.as_bytes())
                .context(format!("failed to write report to {report_file:?}"))?;
        }

        Ok(())
    }
}

fn print_report(result: &FetchResult) {
    println!();
    println!("All downloads finished! The sample numbers are not always logged in ascending order, as the workers log them as they finish.");

    if !result.missing.is_empty() {
        println!("\n\nMissing {} hashes:", result.missing.len());
        for hash in &result.missing {
            println!("{hash}");
        }
    }

    println!(
        "\nDownloaded {} samples in {}!",
        result.downloaded.len(),
        result.elapsed_display()
    );
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let err_file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(ERROR_LOG)
        .context(format!("failed to open {ERROR_LOG}"))?;

    let subscriber = Registry::default()
        .with(
            // stdout layer, to view progress in the console
            fmt::layer().compact().with_ansi(true).with_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            ),
        )
        .with(
            // error log file, to keep the failures that arise
            fmt::layer()
                .json()
                .with_writer(err_file)
                .with_filter(filter::LevelFilter::from_level(Level::ERROR)),
        );

    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    let args = FetchArgs::parse();
    args.run().await?;

    Ok(ExitCode::SUCCESS)
}

#[test]
fn verify_cli() {
    use clap::CommandFactory;

    FetchArgs::command().debug_assert();
}
