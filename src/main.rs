use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use novel_harvest::config::default_output_root;
use novel_harvest::fetch::FetchSettings;
use novel_harvest::{ExportFormat, HarvestConfig, HarvestError, Harvester, ReadLightNovelClient};

/// Download a novel from a given link from https://www.readlightnovel.me
#[derive(Debug, Parser)]
#[command(
    version,
    about,
    long_about = "Download a novel from a given link, cache every chapter and export it as books of a fixed number of chapters"
)]
pub struct Args {
    /// The link to the novel to download
    #[arg(short, long, env = "NOVEL_HARVEST_LINK")]
    pub link: String,

    /// The output directory (default: <downloads>/novel-harvest)
    #[arg(short, long, env = "NOVEL_HARVEST_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Number of chapters requested concurrently
    #[arg(short, long, env = "NOVEL_HARVEST_BATCH_SIZE", default_value = "25")]
    pub batch_size: usize,

    /// Number of chapters per exported book
    #[arg(short, long, env = "NOVEL_HARVEST_WINDOW_SIZE", default_value = "100")]
    pub window_size: u32,

    /// Book formats to generate
    #[arg(
        short,
        long,
        env = "NOVEL_HARVEST_FORMATS",
        value_enum,
        value_delimiter = ',',
        default_values_t = vec![ExportFormat::Epub, ExportFormat::Word]
    )]
    pub formats: Vec<ExportFormat>,

    /// Attempts per request before a chapter is given up
    #[arg(long, env = "NOVEL_HARVEST_RETRIES", default_value = "3")]
    pub retries: u32,

    /// Request timeout in seconds
    #[arg(long, env = "NOVEL_HARVEST_TIMEOUT", default_value = "60")]
    pub timeout: u64,

    /// TrueType font used for PDF output
    #[arg(long, env = "NOVEL_HARVEST_PDF_FONT")]
    pub pdf_font: Option<PathBuf>,
}

impl Args {
    fn into_config(self) -> HarvestConfig {
        HarvestConfig {
            output_root: self.output_dir.unwrap_or_else(default_output_root),
            batch_size: self.batch_size,
            window_size: self.window_size,
            formats: self.formats,
            pdf_font: self.pdf_font,
            fetch: FetchSettings {
                attempts: self.retries,
                request_timeout: Duration::from_secs(self.timeout),
                ..FetchSettings::default()
            },
        }
    }
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    match ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chapters {msg}") {
        Ok(style) => bar.set_style(style.progress_chars("#>-")),
        Err(e) => tracing::debug!(error = %e, "falling back to default progress style"),
    }
    bar
}

async fn run(args: Args) -> Result<(), HarvestError> {
    let link = args.link.clone();
    let config = args.into_config();
    let client = Arc::new(ReadLightNovelClient::new(config.fetch.clone()).map_err(HarvestError::MetadataFetch)?);

    let harvester = Harvester::new(config, client.clone(), client).with_progress(progress_bar());
    let summary = harvester.run(&link).await?;

    println!("Novel: {}", summary.title);
    println!(
        "Chapters: {} listed, {} from cache, {} downloaded, {} in project",
        summary.chapters_listed, summary.cache_hits, summary.fetched, summary.chapters_in_project
    );
    if !summary.failed_chapters.is_empty() {
        eprintln!(
            "✗ {} chapters failed and will be retried on the next run: {:?}",
            summary.failed_chapters.len(),
            summary.failed_chapters
        );
    }
    for path in &summary.exports_rendered {
        println!("✓ {}", path.display());
    }
    if summary.export_failures > 0 {
        eprintln!("✗ {} exports failed", summary.export_failures);
    }
    println!("{}", summary.detail);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "harvest failed");
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
