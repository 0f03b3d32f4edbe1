//! CLI for running the site-signals pipeline against a single URL.
//!
//! Prints JSON on stdout; logs go to stderr.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use site_signals::{Analyzer, Pipeline, RobotsDecision, TargetPolicy};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "site-signals")]
#[command(about = "Safely fetch a URL and extract structured business signals")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline and print the report
    Analyze {
        url: String,

        /// Question to pass to the inference provider (repeatable)
        #[arg(long = "question", short = 'q')]
        questions: Vec<String>,

        /// Enable the headless rendering fallback
        #[arg(long)]
        render: bool,

        /// Treat an unreachable robots.txt as a refusal
        #[arg(long)]
        no_robots_fail_open: bool,
    },

    /// Run only the URL guard and the robots check
    Check { url: String },
}

#[derive(Serialize)]
struct CheckResponse {
    url: String,
    resolved_ip: String,
    robots: RobotsDecision,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,site_signals=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_line_number(true),
        )
        .init();

    let cli = Cli::parse();
    let policy = TargetPolicy::from_env().context("Failed to load configuration")?;

    match cli.command {
        Commands::Analyze {
            url,
            questions,
            render,
            no_robots_fail_open,
        } => {
            let mut policy = policy;
            if render {
                policy = policy.with_rendering(true);
            }
            if no_robots_fail_open {
                policy = policy.with_robots_fail_open(false);
            }

            let analyzer = Analyzer::new(build_pipeline(policy));
            let report = analyzer
                .analyze(&url, &questions)
                .await
                .with_context(|| format!("Rejected target {url}"))?;

            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Check { url } => {
            let (target, robots) = Pipeline::new(policy)
                .check(&url)
                .await
                .with_context(|| format!("Rejected target {url}"))?;

            let response = CheckResponse {
                url: target.to_string(),
                resolved_ip: target.resolved_ip().to_string(),
                robots,
            };
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
    }

    Ok(())
}

#[cfg(feature = "headless")]
fn build_pipeline(policy: TargetPolicy) -> Pipeline {
    use site_signals::{ChromiumEngine, FallbackRenderer};
    use std::sync::Arc;

    let render = policy.render_enabled;
    let pipeline = Pipeline::new(policy);
    if render {
        pipeline.with_renderer(FallbackRenderer::new(Arc::new(ChromiumEngine::new())))
    } else {
        pipeline
    }
}

#[cfg(not(feature = "headless"))]
fn build_pipeline(policy: TargetPolicy) -> Pipeline {
    if policy.render_enabled {
        tracing::warn!("rendering requested but this build has no browser engine (enable the `headless` feature)");
    }
    Pipeline::new(policy)
}
