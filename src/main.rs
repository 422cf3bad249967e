//! # Cloudflare IP Collector
//!
//! A scheduled collection pipeline that pulls candidate Cloudflare edge
//! addresses from public IP lists and pages, validates them, annotates each
//! address with a best-effort location, and writes partitioned address list
//! artifacts for downstream consumers.
//!
//! ## Features
//!
//! - Fetches 17 public IP lists concurrently, with bounded retries per source
//! - Extracts and validates IPv4/IPv6 addresses, dropping private, loopback,
//!   and multicast ranges
//! - Annotates addresses via a public location-lookup API (best effort,
//!   `unknown` on any failure)
//! - Partitions US vs non-US entries by case-insensitive keyword matching
//! - Writes stable per-family lists plus per-run timestamped non-US files
//!   picked up by a separate daily merge routine
//!
//! ## Usage
//!
//! ```sh
//! cf_ip_collector
//! cf_ip_collector -c collector.yaml -o ./lists
//! ```
//!
//! ## Architecture
//!
//! The application follows a pipeline architecture:
//! 1. **Fetching**: Download every configured source (5 in flight at a time)
//! 2. **Extraction**: Scan the bodies for addresses and validate them
//! 3. **Classification**: Look up a location label per address (10 at a time)
//! 4. **Partitioning**: Mark each entry US or non-US by keyword
//! 5. **Output**: Sort, render, and write the text artifacts

use clap::Parser;
use std::error::Error;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{fmt as tfmt, EnvFilter};

mod cli;
mod extract;
mod fetch;
mod geo;
mod models;
mod outputs;
mod partition;
mod pipeline;
mod settings;

use cli::Cli;
use outputs::text::ensure_writable_dir;
use settings::Settings;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("cf_ip_collector starting up");

    // Parse CLI
    let args = Cli::parse();
    debug!(?args.config, ?args.output_dir, "Parsed CLI arguments");

    // --- Effective settings ---
    let mut settings = Settings::load(args.config.as_deref())?;
    if let Some(dir) = args.output_dir {
        settings.output_dir = dir;
    }
    info!(
        sources = settings.sources.len(),
        output_dir = %settings.output_dir.display(),
        port = settings.port,
        "Settings loaded"
    );

    info!(
        event_kind = "application.started",
        version = env!("CARGO_PKG_VERSION"),
        "Collection run starting"
    );

    // Early check: ensure the output dir is writable before spending time
    // on network calls.
    if let Err(e) = ensure_writable_dir(&settings.output_dir).await {
        error!(
            path = %settings.output_dir.display(),
            error = %e,
            "Output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    match pipeline::run(&settings).await {
        Ok(summary) => {
            let elapsed = start_time.elapsed();
            info!(
                sources_retrieved = summary.sources_retrieved,
                sources_total = summary.sources_total,
                v4_total = summary.v4_total,
                v6_total = summary.v6_total,
                v4_non_us = summary.v4_non_us,
                v6_non_us = summary.v6_non_us,
                lookups_attempted = summary.lookups.attempted,
                lookups_resolved = summary.lookups.resolved,
                lookup_success_rate = summary.lookups.success_rate(),
                used_fallback = summary.used_fallback,
                run_secs = summary.elapsed.as_secs(),
                "Run summary"
            );
            info!(
                non_us_v4 = %summary.artifacts.non_us_v4_stamped.display(),
                non_us_v6 = %summary.artifacts.non_us_v6_stamped.display(),
                "Per-run artifacts deposited for the merge routine"
            );
            info!(
                event_kind = "application.completed",
                duration_secs = elapsed.as_secs(),
                duration_millis = elapsed.subsec_millis(),
                "Collection run completed"
            );
            Ok(())
        }
        Err(e) => {
            error!(
                event_kind = "application.failed",
                error = %e,
                "Collection run failed"
            );
            Err(e)
        }
    }
}
