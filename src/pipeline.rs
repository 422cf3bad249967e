//! End-to-end orchestration of one collection pass.
//!
//! [`run`] drives the stages strictly in order: fetch sources, extract
//! addresses, classify locations, partition US/non-US, write artifacts.
//! Each stage consumes the previous stage's output; nothing flows backwards.
//!
//! When extraction yields fewer addresses than the viability threshold, the
//! run substitutes the configured seed lists and skips straight to writing.
//! Seeds carry no location label, so they land in the non-US views. A run
//! fails only when it cannot produce output at all: nothing collected with
//! no seeds configured, or a filesystem error while writing.

use crate::extract::{self, ExtractedAddresses};
use crate::fetch;
use crate::geo::{self, GeoClient, LookupStats};
use crate::models::{ClassifiedAddress, GeoLabel};
use crate::outputs::text::{self, RunArtifacts};
use crate::partition::UsMatcher;
use crate::settings::Settings;
use std::collections::BTreeSet;
use std::error::Error;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};

/// What one pipeline run accomplished, for the closing summary log.
#[derive(Debug)]
pub struct RunSummary {
    /// Sources configured for the run.
    pub sources_total: usize,
    /// Sources that answered with a body.
    pub sources_retrieved: usize,
    /// IPv4 entries written to the full list.
    pub v4_total: usize,
    /// IPv6 entries written to the full list.
    pub v6_total: usize,
    /// IPv4 entries in the non-US view.
    pub v4_non_us: usize,
    /// IPv6 entries in the non-US view.
    pub v6_non_us: usize,
    /// Location lookup counts (zero when the seed fallback was used).
    pub lookups: LookupStats,
    /// Whether the seed lists were substituted for collected addresses.
    pub used_fallback: bool,
    /// Paths of the written artifacts.
    pub artifacts: RunArtifacts,
    /// Wall time the pass took.
    pub elapsed: Duration,
}

/// Execute one full collection pass.
///
/// # Arguments
///
/// * `settings` - The effective settings for this run
///
/// # Returns
///
/// A [`RunSummary`] when artifacts were written, or an error when the run
/// could not produce output.
#[instrument(level = "info", skip_all)]
pub async fn run(settings: &Settings) -> Result<RunSummary, Box<dyn Error>> {
    let run_t0 = Instant::now();
    info!(
        event_kind = "fetching.started",
        sources = settings.sources.len(),
        "Source fetching starting"
    );
    let client = fetch::build_client(settings)?;
    let reports = fetch::fetch_sources(settings, &client).await;
    let sources_retrieved = reports.iter().filter(|r| r.outcome.is_retrieved()).count();
    info!(
        event_kind = "fetching.completed",
        retrieved = sources_retrieved,
        total = reports.len(),
        "Source fetching completed"
    );

    info!(event_kind = "extraction.started", "Address extraction starting");
    let mut extracted = ExtractedAddresses::default();
    for report in &reports {
        if let Some(body) = report.outcome.body() {
            let found = extract::extract_addresses(body);
            info!(
                url = %report.url,
                v4 = found.v4.len(),
                v6 = found.v6.len(),
                "source extracted"
            );
            extracted.merge(found);
        }
    }
    info!(
        event_kind = "extraction.completed",
        v4 = extracted.v4.len(),
        v6 = extracted.v6.len(),
        "Address extraction completed"
    );

    let (v4_entries, v6_entries, lookups, used_fallback) =
        if extracted.total() < settings.min_viable_addresses {
            warn!(
                found = extracted.total(),
                needed = settings.min_viable_addresses,
                "too few addresses collected; substituting seed lists"
            );
            let v4 = seed_entries(&settings.seed_ipv4);
            let v6 = seed_entries(&settings.seed_ipv6);
            if v4.is_empty() && v6.is_empty() {
                return Err("no addresses collected and no seed addresses configured".into());
            }
            (v4, v6, LookupStats::default(), true)
        } else {
            info!(
                event_kind = "classification.started",
                total = extracted.total(),
                "Location classification starting"
            );
            let geo = GeoClient::new(settings)?;
            let v4_addrs: Vec<Ipv4Addr> = extracted.v4.iter().copied().collect();
            let v6_addrs: Vec<Ipv6Addr> = extracted.v6.iter().copied().collect();
            let (v4_labeled, v4_stats) = geo::annotate_addresses(&geo, &v4_addrs, settings).await;
            let (v6_labeled, v6_stats) = geo::annotate_addresses(&geo, &v6_addrs, settings).await;
            let lookups = LookupStats {
                attempted: v4_stats.attempted + v6_stats.attempted,
                resolved: v4_stats.resolved + v6_stats.resolved,
            };
            info!(
                event_kind = "classification.completed",
                attempted = lookups.attempted,
                resolved = lookups.resolved,
                success_rate = lookups.success_rate(),
                "Location classification completed"
            );

            info!(event_kind = "partitioning.started", "US partitioning starting");
            let matcher = UsMatcher::new(&settings.us_keywords);
            let v4_entries: Vec<ClassifiedAddress<Ipv4Addr>> = v4_labeled
                .into_iter()
                .map(|(addr, label)| classify(&matcher, addr, label))
                .collect();
            let v6_entries: Vec<ClassifiedAddress<Ipv6Addr>> = v6_labeled
                .into_iter()
                .map(|(addr, label)| classify(&matcher, addr, label))
                .collect();
            let us_count = v4_entries.iter().filter(|e| e.is_us).count()
                + v6_entries.iter().filter(|e| e.is_us).count();
            info!(
                event_kind = "partitioning.completed",
                us = us_count,
                non_us = v4_entries.len() + v6_entries.len() - us_count,
                "US partitioning completed"
            );
            (v4_entries, v6_entries, lookups, false)
        };

    let v4_total = v4_entries.len();
    let v6_total = v6_entries.len();
    let v4_non_us = v4_entries.iter().filter(|e| !e.is_us).count();
    let v6_non_us = v6_entries.iter().filter(|e| !e.is_us).count();

    info!(event_kind = "output.started", "Artifact writing starting");
    let artifacts = text::write_artifacts(
        &settings.output_dir,
        settings.port,
        settings.sources.len(),
        v4_entries,
        v6_entries,
    )
    .await?;
    info!(event_kind = "output.completed", "Artifact writing completed");

    Ok(RunSummary {
        sources_total: reports.len(),
        sources_retrieved,
        v4_total,
        v6_total,
        v4_non_us,
        v6_non_us,
        lookups,
        used_fallback,
        artifacts,
        elapsed: run_t0.elapsed(),
    })
}

fn classify<A>(matcher: &UsMatcher, addr: A, label: GeoLabel) -> ClassifiedAddress<A> {
    let is_us = matcher.is_us(&label);
    ClassifiedAddress { addr, label, is_us }
}

/// Turn a seed list into unlabeled entries, dropping duplicates.
fn seed_entries<A: Copy + Ord>(seeds: &[A]) -> Vec<ClassifiedAddress<A>> {
    seeds
        .iter()
        .copied()
        .collect::<BTreeSet<A>>()
        .into_iter()
        .map(|addr| ClassifiedAddress {
            addr,
            label: GeoLabel::Unresolved,
            is_us: false,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn test_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("cf_ip_collector_run_{}_{}", tag, std::process::id()))
    }

    fn offline_settings(tag: &str) -> Settings {
        let mut s = Settings::default();
        s.sources = Vec::new();
        s.output_dir = test_dir(tag);
        s
    }

    #[tokio::test]
    async fn test_nothing_collected_and_no_seeds_is_an_error() {
        let mut settings = offline_settings("no_seeds");
        settings.seed_ipv4 = Vec::new();
        settings.seed_ipv6 = Vec::new();

        let result = run(&settings).await;
        assert!(result.is_err());
        // The run must fail before touching the filesystem.
        assert!(!settings.output_dir.join("ip.txt").exists());

        let _ = std::fs::remove_dir_all(&settings.output_dir);
    }

    #[tokio::test]
    async fn test_seed_fallback_writes_unlabeled_entries() {
        let settings = offline_settings("fallback");

        let summary = run(&settings).await.unwrap();
        assert!(summary.used_fallback);
        assert_eq!(summary.v4_total, settings.seed_ipv4.len());
        assert_eq!(summary.v6_total, settings.seed_ipv6.len());
        // Seeds are never classified, so all of them count as non-US.
        assert_eq!(summary.v4_non_us, summary.v4_total);
        assert_eq!(summary.v6_non_us, summary.v6_total);
        assert_eq!(summary.lookups, LookupStats::default());

        let content = std::fs::read_to_string(&summary.artifacts.all_v4).unwrap();
        assert!(content.contains("1.1.1.1:8443#unknown\n"));

        let _ = std::fs::remove_dir_all(&settings.output_dir);
    }

    #[test]
    fn test_seed_entries_deduplicate() {
        let seeds = [
            Ipv4Addr::new(1, 1, 1, 1),
            Ipv4Addr::new(1, 0, 0, 1),
            Ipv4Addr::new(1, 1, 1, 1),
        ];
        let entries = seed_entries(&seeds);
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| !e.is_us));
        assert!(entries.iter().all(|e| !e.label.is_resolved()));
    }
}
