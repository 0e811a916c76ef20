//! Interactive front end: one prediction per invocation, printed as JSON.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use pageview_cache_advisor::config::AppConfig;
use pageview_cache_advisor::{Pipeline, PredictionRequest};

#[derive(Parser, Debug)]
#[command(name = "predict-cli", about = "Predict page views and apply the cache recommendation")]
struct Cli {
    /// Page identifier, e.g. 2015_in_film_en. Prompted for when omitted.
    #[arg(short, long)]
    page: Option<String>,

    /// Prediction date (YYYY-MM-DD). Prompted for when omitted.
    #[arg(short, long)]
    date: Option<String>,

    /// Config file; defaults to $APP_CONFIG_PATH or config/app.toml.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn prompt(label: &str) -> io::Result<String> {
    print!("{label}: ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

async fn run(cli: Cli) -> anyhow::Result<String> {
    let page = match cli.page {
        Some(p) => p,
        None => prompt("Enter page_name")?,
    };
    let date = match cli.date {
        Some(d) => d,
        None => prompt("Enter prediction_date (YYYY-MM-DD)")?,
    };

    // reject bad input before loading data or opening connections
    let request = PredictionRequest::new(page, date);
    request.validate()?;

    let cfg = match cli.config {
        Some(path) => AppConfig::load_from(&path)?,
        None => AppConfig::load()?,
    };
    let pipeline = Pipeline::from_config(&cfg).await?;
    let outcome = pipeline.run(&request).await?;
    let body = serde_json::json!({ "response": outcome.prediction });
    Ok(serde_json::to_string_pretty(&body)?)
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    pageview_cache_advisor::telemetry::init_tracing();

    match run(Cli::parse()).await {
        Ok(out) => {
            println!("{out}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
