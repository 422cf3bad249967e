//! Text artifact generation for address lists.
//!
//! Serializes the classified, deduplicated address sets into readable text
//! files. Each file starts with a `#`-prefixed header block (generation
//! time, counts, line format), then one entry per line:
//!
//! ```text
//! # Cloudflare IPv4 address list
//! # Generated: 2026-08-22 14:03:55
//! # Total: 2
//! # Sources: 17
//! # Format: IP:port#location
//!
//! 1.1.1.1:8443#美国-Cloudflare
//! 104.16.0.1:8443#unknown
//! ```
//!
//! IPv6 entries wrap the address in brackets: `[2606:4700:4700::1111]:8443#...`.
//!
//! Sorting happens here and nowhere else: IPv4 ascending by numeric octet
//! value, IPv6 by its canonical string form. The non-US views keep the order
//! of the full lists they are filtered from.

use crate::models::ClassifiedAddress;
use chrono::Local;
use std::error::Error;
use std::fs as stdfs;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument};

/// Paths of the artifacts produced by one run.
#[derive(Debug, Clone)]
pub struct RunArtifacts {
    /// All IPv4 addresses (`ip.txt`).
    pub all_v4: PathBuf,
    /// All IPv6 addresses (`ipv6.txt`).
    pub all_v6: PathBuf,
    /// Non-US IPv4 addresses (`non_us_ip.txt`).
    pub non_us_v4: PathBuf,
    /// Non-US IPv6 addresses (`non_us_ipv6.txt`).
    pub non_us_v6: PathBuf,
    /// Per-run timestamped copy of the non-US IPv4 list.
    pub non_us_v4_stamped: PathBuf,
    /// Per-run timestamped copy of the non-US IPv6 list.
    pub non_us_v6_stamped: PathBuf,
}

/// Write all six artifacts for one run.
///
/// Takes ownership of the entry lists, sorts them, derives the non-US views,
/// and writes the stable files plus the timestamped non-US copies the daily
/// merge routine picks up. Filesystem errors are returned to the caller;
/// a run that cannot persist its results has failed.
///
/// # Arguments
///
/// * `output_dir` - Directory the artifacts land in (created if missing)
/// * `port` - Port number rendered into every entry line
/// * `source_count` - Number of configured sources, for the header block
/// * `v4` - Classified IPv4 entries, any order
/// * `v6` - Classified IPv6 entries, any order
///
/// # Returns
///
/// The paths written, or the first filesystem error encountered.
#[instrument(level = "info", skip_all, fields(output_dir = %output_dir.display()))]
pub async fn write_artifacts(
    output_dir: &Path,
    port: u16,
    source_count: usize,
    mut v4: Vec<ClassifiedAddress<Ipv4Addr>>,
    mut v6: Vec<ClassifiedAddress<Ipv6Addr>>,
) -> Result<RunArtifacts, Box<dyn Error>> {
    ensure_writable_dir(output_dir).await?;

    v4.sort_by_key(|e| u32::from(e.addr));
    v6.sort_by_cached_key(|e| e.addr.to_string());

    let now = Local::now();
    let generated = now.format("%Y-%m-%d %H:%M:%S").to_string();
    let run_tag = now.format("%Y%m%d_%H%M%S").to_string();

    let v4_lines: Vec<String> = v4.iter().map(|e| v4_line(e, port)).collect();
    let v6_lines: Vec<String> = v6.iter().map(|e| v6_line(e, port)).collect();
    let non_us_v4_lines: Vec<String> = v4
        .iter()
        .filter(|e| !e.is_us)
        .map(|e| v4_line(e, port))
        .collect();
    let non_us_v6_lines: Vec<String> = v6
        .iter()
        .filter(|e| !e.is_us)
        .map(|e| v6_line(e, port))
        .collect();

    let all_v4_content = render_file(
        "Cloudflare IPv4 address list",
        &generated,
        Some(source_count),
        "IP:port#location",
        &v4_lines,
    );
    let all_v6_content = render_file(
        "Cloudflare IPv6 address list",
        &generated,
        Some(source_count),
        "[IP]:port#location",
        &v6_lines,
    );
    let non_us_v4_content = render_file(
        "Non-US Cloudflare IPv4 address list",
        &generated,
        None,
        "IP:port#location",
        &non_us_v4_lines,
    );
    let non_us_v6_content = render_file(
        "Non-US Cloudflare IPv6 address list",
        &generated,
        None,
        "[IP]:port#location",
        &non_us_v6_lines,
    );

    let artifacts = RunArtifacts {
        all_v4: output_dir.join("ip.txt"),
        all_v6: output_dir.join("ipv6.txt"),
        non_us_v4: output_dir.join("non_us_ip.txt"),
        non_us_v6: output_dir.join("non_us_ipv6.txt"),
        non_us_v4_stamped: output_dir.join(format!("non_us_ips_{run_tag}.txt")),
        non_us_v6_stamped: output_dir.join(format!("non_us_ipv6_{run_tag}.txt")),
    };

    write_file(&artifacts.all_v4, &all_v4_content, v4_lines.len()).await?;
    write_file(&artifacts.all_v6, &all_v6_content, v6_lines.len()).await?;
    write_file(&artifacts.non_us_v4, &non_us_v4_content, non_us_v4_lines.len()).await?;
    write_file(&artifacts.non_us_v6, &non_us_v6_content, non_us_v6_lines.len()).await?;
    write_file(
        &artifacts.non_us_v4_stamped,
        &non_us_v4_content,
        non_us_v4_lines.len(),
    )
    .await?;
    write_file(
        &artifacts.non_us_v6_stamped,
        &non_us_v6_content,
        non_us_v6_lines.len(),
    )
    .await?;

    info!(
        all_v4 = v4_lines.len(),
        all_v6 = v6_lines.len(),
        non_us_v4 = non_us_v4_lines.len(),
        non_us_v6 = non_us_v6_lines.len(),
        "artifacts written"
    );
    Ok(artifacts)
}

fn v4_line(entry: &ClassifiedAddress<Ipv4Addr>, port: u16) -> String {
    format!("{}:{}#{}", entry.addr, port, entry.label.as_text())
}

fn v6_line(entry: &ClassifiedAddress<Ipv6Addr>, port: u16) -> String {
    format!("[{}]:{}#{}", entry.addr, port, entry.label.as_text())
}

/// Assemble one artifact: header block, blank separator, entry lines.
///
/// The source count line appears only in the full per-family lists; the
/// filtered views carry the shorter header.
fn render_file(
    title: &str,
    generated: &str,
    source_count: Option<usize>,
    format_note: &str,
    lines: &[String],
) -> String {
    let mut out = String::new();
    out.push_str(&format!("# {title}\n"));
    out.push_str(&format!("# Generated: {generated}\n"));
    out.push_str(&format!("# Total: {}\n", lines.len()));
    if let Some(sources) = source_count {
        out.push_str(&format!("# Sources: {sources}\n"));
    }
    out.push_str(&format!("# Format: {format_note}\n\n"));
    for line in lines {
        out.push_str(line);
        out.push('\n');
    }
    out
}

async fn write_file(path: &Path, content: &str, entries: usize) -> Result<(), Box<dyn Error>> {
    fs::write(path, content).await?;
    info!(path = %path.display(), entries, "wrote artifact");
    Ok(())
}

/// Ensure the output directory exists and is writable.
///
/// Creates the directory if needed, then probes writability by creating and
/// removing a scratch file. Failing early here beats failing after the
/// lookup stage has already spent minutes of API calls.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<(), Box<dyn Error>> {
    if let Err(e) = fs::create_dir_all(path).await {
        error!(path = %path.display(), error = %e, "failed to create output directory");
        return Err(e.into());
    }
    let probe = path.join("..__probe_write__");
    match stdfs::File::create(&probe) {
        Ok(_) => {
            let _ = stdfs::remove_file(&probe);
            Ok(())
        }
        Err(e) => {
            error!(path = %path.display(), error = %e, "output directory is not writable");
            Err(Box::new(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GeoLabel;
    use std::collections::BTreeSet;

    fn test_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("cf_ip_collector_{}_{}", tag, std::process::id()))
    }

    fn v4_entry(addr: [u8; 4], label: &str, is_us: bool) -> ClassifiedAddress<Ipv4Addr> {
        ClassifiedAddress {
            addr: Ipv4Addr::new(addr[0], addr[1], addr[2], addr[3]),
            label: GeoLabel::Resolved(label.to_string()),
            is_us,
        }
    }

    fn entry_lines(content: &str) -> Vec<&str> {
        content
            .lines()
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .collect()
    }

    /// Strip an entry line back to its bare address.
    fn parse_addr(line: &str) -> String {
        match line.strip_prefix('[') {
            Some(rest) => rest.split(']').next().unwrap().to_string(),
            None => line.split(':').next().unwrap().to_string(),
        }
    }

    #[tokio::test]
    async fn test_v4_output_sorted_by_numeric_octets() {
        let dir = test_dir("v4_sort");
        let entries = vec![
            v4_entry([104, 16, 0, 1], "美国-Cloudflare", true),
            v4_entry([1, 1, 1, 1], "Australia", false),
            v4_entry([9, 9, 9, 9], "Schweiz", false),
        ];
        let artifacts = write_artifacts(&dir, 8443, 17, entries, Vec::new())
            .await
            .unwrap();

        let content = std::fs::read_to_string(&artifacts.all_v4).unwrap();
        let addrs: Vec<String> = entry_lines(&content).iter().map(|l| parse_addr(l)).collect();
        // Lexicographic order would put 104.16.0.1 before 9.9.9.9.
        assert_eq!(addrs, vec!["1.1.1.1", "9.9.9.9", "104.16.0.1"]);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_non_us_view_filters_and_matches_stamped_copy() {
        let dir = test_dir("non_us");
        let entries = vec![
            v4_entry([1, 1, 1, 1], "美国-加州", true),
            v4_entry([9, 9, 9, 9], "Schweiz-Zürich", false),
        ];
        let artifacts = write_artifacts(&dir, 8443, 17, entries, Vec::new())
            .await
            .unwrap();

        let non_us = std::fs::read_to_string(&artifacts.non_us_v4).unwrap();
        let lines = entry_lines(&non_us);
        assert_eq!(lines, vec!["9.9.9.9:8443#Schweiz-Zürich"]);
        assert!(non_us.contains("# Total: 1\n"));
        // Filtered views do not repeat the source count.
        assert!(!non_us.contains("# Sources:"));

        let stamped = std::fs::read_to_string(&artifacts.non_us_v4_stamped).unwrap();
        assert_eq!(stamped, non_us);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_v6_entries_bracketed_and_sorted() {
        let dir = test_dir("v6");
        let entries = vec![
            ClassifiedAddress {
                addr: "2a06:98c0::1".parse::<Ipv6Addr>().unwrap(),
                label: GeoLabel::Unresolved,
                is_us: false,
            },
            ClassifiedAddress {
                addr: "2606:4700:4700::1111".parse::<Ipv6Addr>().unwrap(),
                label: GeoLabel::Resolved("美国".to_string()),
                is_us: true,
            },
        ];
        let artifacts = write_artifacts(&dir, 443, 17, Vec::new(), entries)
            .await
            .unwrap();

        let content = std::fs::read_to_string(&artifacts.all_v6).unwrap();
        let lines = entry_lines(&content);
        assert_eq!(
            lines,
            vec![
                "[2606:4700:4700::1111]:443#美国",
                "[2a06:98c0::1]:443#unknown",
            ]
        );

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_round_trip_preserves_address_sets() {
        let dir = test_dir("round_trip");
        let v4 = vec![
            v4_entry([188, 114, 96, 1], "Nederland", false),
            v4_entry([1, 0, 0, 1], "美国-Cloudflare", true),
            v4_entry([162, 159, 36, 1], "Deutschland-Berlin", false),
        ];
        let v6 = vec![
            ClassifiedAddress {
                addr: "2606:4700:4700::1001".parse::<Ipv6Addr>().unwrap(),
                label: GeoLabel::Unresolved,
                is_us: false,
            },
            ClassifiedAddress {
                addr: "2a06:98c1::2".parse::<Ipv6Addr>().unwrap(),
                label: GeoLabel::Resolved("Singapore".to_string()),
                is_us: false,
            },
        ];
        let want_v4: BTreeSet<String> = v4.iter().map(|e| e.addr.to_string()).collect();
        let want_v6: BTreeSet<String> = v6.iter().map(|e| e.addr.to_string()).collect();

        let artifacts = write_artifacts(&dir, 8443, 17, v4, v6).await.unwrap();

        let got_v4: BTreeSet<String> = entry_lines(&std::fs::read_to_string(&artifacts.all_v4).unwrap())
            .iter()
            .map(|l| parse_addr(l))
            .collect();
        let got_v6: BTreeSet<String> = entry_lines(&std::fs::read_to_string(&artifacts.all_v6).unwrap())
            .iter()
            .map(|l| parse_addr(l))
            .collect();

        assert_eq!(got_v4, want_v4);
        assert_eq!(got_v6, want_v6);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_empty_run_still_writes_headers() {
        let dir = test_dir("empty");
        let artifacts = write_artifacts(&dir, 8443, 0, Vec::new(), Vec::new())
            .await
            .unwrap();

        let content = std::fs::read_to_string(&artifacts.all_v4).unwrap();
        assert!(content.starts_with("# Cloudflare IPv4 address list\n"));
        assert!(content.contains("# Total: 0\n"));
        assert!(entry_lines(&content).is_empty());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_header_layout() {
        let rendered = render_file(
            "Cloudflare IPv4 address list",
            "2026-08-22 14:03:55",
            Some(17),
            "IP:port#location",
            &["1.1.1.1:8443#unknown".to_string()],
        );
        let want = "# Cloudflare IPv4 address list\n\
                    # Generated: 2026-08-22 14:03:55\n\
                    # Total: 1\n\
                    # Sources: 17\n\
                    # Format: IP:port#location\n\
                    \n\
                    1.1.1.1:8443#unknown\n";
        assert_eq!(rendered, want);
    }
}
