use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use newsgauge_common::{Config, TimeWindow};
use newsgauge_pipeline::Pipeline;

#[derive(Parser)]
#[command(
    name = "newsgauge",
    about = "Financial news sentiment and due-diligence analysis for a company"
)]
struct Args {
    /// Company name to analyze
    company: String,

    /// Look-back period, e.g. "30d"
    #[arg(long, default_value = "30d")]
    period: TimeWindow,

    /// Write the rendered HTML report to this path
    #[arg(long)]
    report: Option<PathBuf>,
}

/// Default filter: info for the workspace crates, with `RUST_LOG` directives
/// layered on top. Directives name module paths, not the binary.
fn log_filter() -> Result<EnvFilter> {
    let mut filter = EnvFilter::from_default_env();
    for directive in [
        "newsgauge_pipeline=info",
        "newsgauge_common=info",
        "gnews_client=info",
        "gemini_client=info",
        "headless_client=info",
    ] {
        filter = filter.add_directive(directive.parse()?);
    }
    Ok(filter)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt().with_env_filter(log_filter()?).init();

    let args = Args::parse();
    info!(company = args.company.as_str(), period = %args.period, "Newsgauge starting");

    let config = Config::from_env();
    let pipeline = Pipeline::from_config(&config);

    let articles = pipeline.run(&args.company, args.period).await?;
    println!("{}", serde_json::to_string_pretty(&articles)?);

    if let Some(path) = args.report {
        let html = pipeline.generate_report(&args.company, &articles).await?;
        std::fs::write(&path, html)?;
        info!(path = %path.display(), "Report written");
    }

    Ok(())
}
