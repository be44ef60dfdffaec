use anyhow::{bail, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use segmask_core::{
    config::Config,
    image_processing::ImageProcessor,
    init, HeadlessOptions, Rectangle, Segmask,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Image to open (required for --region)
    #[arg(short, long)]
    image: Option<PathBuf>,

    /// Override the segmentation service base URL
    #[arg(long)]
    api_url: Option<String>,

    /// Segment without the UI: region as X,Y,WIDTH,HEIGHT in image pixels
    #[arg(long, value_parser = parse_region)]
    region: Option<Rectangle>,

    /// Mask opacity for the exported composite (0.0 - 1.0)
    #[arg(long, default_value_t = 0.6)]
    opacity: f32,

    /// Where to write the composite in headless mode
    #[arg(short, long, default_value = "segmented.png")]
    output: PathBuf,

    /// Seconds to wait for the service in headless mode
    #[arg(long, default_value_t = 300)]
    timeout: u64,

    /// Check that the segmentation service is reachable and exit
    #[arg(long)]
    check: bool,
}

fn parse_region(value: &str) -> std::result::Result<Rectangle, String> {
    let parts: Vec<f32> = value
        .split(',')
        .map(|p| p.trim().parse::<f32>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| format!("invalid number in region: {e}"))?;

    match parts.as_slice() {
        [x, y, w, h] => Ok(Rectangle::new(*x, *y, *w, *h)),
        _ => Err(format!("expected X,Y,WIDTH,HEIGHT, got {} values", parts.len())),
    }
}

fn main() -> Result<()> {
    // Setup
    init();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();
    let args = Args::parse();

    // Load config and override the service URL if specified via CLI
    let config = match &args.api_url {
        Some(url) => Config::builder().with_api_base_url(url).build(),
        None => Config::load(),
    }
    .context("Failed to load configuration")?;
    info!(api = %config.api_base_url, "using segmentation service");

    let app = Segmask::with_config(config).context("Failed to initialize")?;

    // Handle --check
    if args.check {
        app.check_service()
            .with_context(|| format!("Service at {} is not reachable", app.config().api_base_url))?;
        println!("Service at {} is up", app.config().api_base_url);
        return Ok(());
    }

    match args.region {
        Some(region) => {
            let Some(image) = args.image.as_deref() else {
                bail!("--region requires --image");
            };

            let spinner = ProgressBar::new_spinner();
            spinner.set_style(
                ProgressStyle::default_spinner()
                    .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
                    .template("{spinner:.green} {msg}")?,
            );
            spinner.set_message(format!("Segmenting {}...", image.display()));
            spinner.enable_steady_tick(Duration::from_millis(100));

            let options = HeadlessOptions {
                opacity: args.opacity,
                timeout: Duration::from_secs(args.timeout),
            };
            let result = app.segment_file(image, region, &options);
            spinner.finish_and_clear();

            let composite = result.context("Segmentation failed")?;
            ImageProcessor::save_rgba(&composite, &args.output)
                .context("Failed to write composite")?;
            println!("Wrote {}", args.output.display());
        }
        None => {
            app.run_interactive(args.image.as_deref())
                .context("Viewer exited with an error")?;
        }
    }

    Ok(())
}
