//! Address extraction from raw source text.
//!
//! Sources publish addresses in wildly different shapes: bare per-line lists,
//! HTML tables, CIDR dumps, inline prose. Extraction is therefore a two-step
//! sieve:
//!
//! 1. **Candidate scan**: regexes find spans that look like dotted-quad or
//!    colon-hex syntax. The scan is deliberately permissive for IPv6; the
//!    `std::net` parsers are the arbiters of validity.
//! 2. **Semantic filter**: parsed addresses that are not globally routable
//!    (private, loopback, multicast, link-local, unspecified, broadcast,
//!    unique-local) are rejected.
//!
//! Malformed or non-global candidates are dropped silently; extraction is
//! lossy by design and an empty result is not an error. The whole module is
//! pure: no I/O, no shared state.
//!
//! Bodies that look like HTML documents are additionally flattened to their
//! text content (entities decoded, tags removed) and scanned a second time,
//! with both scans unioned. Flattened chunks are joined with spaces so text
//! from adjacent cells can never glue into a fake candidate.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;
use std::collections::BTreeSet;
use std::net::{Ipv4Addr, Ipv6Addr};

/// Dotted-quad candidates with each octet constrained to 0-255.
static IPV4_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\.(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\.(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\.(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\b",
    )
    .unwrap()
});

/// Colon-hex spans covering full and `::`-compressed IPv6 forms. Anything the
/// span grammar over-matches (timestamps, MAC addresses, too many groups) is
/// rejected by `Ipv6Addr::from_str`; spans clipped out of longer tokens are
/// discarded by the scanner before parsing.
static IPV6_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[0-9A-Fa-f]{0,4}(?::[0-9A-Fa-f]{0,4}){2,8}").unwrap());

/// The unique, validated global addresses found in one or more text blocks,
/// kept per family so the families can never mix downstream.
///
/// `BTreeSet` gives deduplication on the typed address; for IPv6 that is
/// exactly deduplication on the canonical compressed lowercase form, since
/// distinct textual spellings of one address parse to the same `Ipv6Addr`.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ExtractedAddresses {
    /// Unique global IPv4 addresses.
    pub v4: BTreeSet<Ipv4Addr>,
    /// Unique global IPv6 addresses.
    pub v6: BTreeSet<Ipv6Addr>,
}

impl ExtractedAddresses {
    /// Fold another extraction result into this one.
    pub fn merge(&mut self, other: ExtractedAddresses) {
        self.v4.extend(other.v4);
        self.v6.extend(other.v6);
    }

    /// Total unique addresses across both families.
    pub fn total(&self) -> usize {
        self.v4.len() + self.v6.len()
    }
}

/// Extract all unique global addresses from a block of source text.
///
/// HTML-looking bodies are scanned twice, raw and flattened, and the two
/// passes are unioned.
///
/// # Arguments
///
/// * `text` - The raw body retrieved from a source
///
/// # Returns
///
/// The set of valid global addresses per family; empty sets when the text
/// contains none.
pub fn extract_addresses(text: &str) -> ExtractedAddresses {
    let mut found = scan_text(text);
    if looks_like_html(text) {
        found.merge(scan_text(&flatten_html(text)));
    }
    found
}

/// Run both candidate regexes over one text block and keep what validates.
fn scan_text(text: &str) -> ExtractedAddresses {
    let mut found = ExtractedAddresses::default();

    for candidate in IPV4_RE.find_iter(text) {
        if let Ok(addr) = candidate.as_str().parse::<Ipv4Addr>() {
            if is_global_v4(addr) {
                found.v4.insert(addr);
            }
        }
    }

    for candidate in IPV6_RE.find_iter(text) {
        // Spans clipped out of a longer token (leading hex digit, trailing
        // dot of an embedded-IPv4 form) are fragments, not addresses.
        if text[..candidate.start()].ends_with(|c: char| c.is_ascii_hexdigit())
            || text[candidate.end()..].starts_with('.')
        {
            continue;
        }
        if let Ok(addr) = candidate.as_str().parse::<Ipv6Addr>() {
            if is_global_v6(addr) {
                found.v6.insert(addr);
            }
        }
    }

    found
}

/// Whether an IPv4 address is a plausible globally-routable candidate.
fn is_global_v4(addr: Ipv4Addr) -> bool {
    !(addr.is_private()
        || addr.is_loopback()
        || addr.is_multicast()
        || addr.is_link_local()
        || addr.is_broadcast()
        || addr.is_unspecified())
}

/// Whether an IPv6 address is a plausible globally-routable candidate.
fn is_global_v6(addr: Ipv6Addr) -> bool {
    !(addr.is_loopback()
        || addr.is_multicast()
        || addr.is_unspecified()
        || addr.is_unique_local()
        || addr.is_unicast_link_local())
}

/// Cheap sniff for HTML documents; only the leading chunk is inspected.
fn looks_like_html(text: &str) -> bool {
    let head: String = text.chars().take(512).collect::<String>().to_lowercase();
    head.contains("<!doctype") || head.contains("<html") || head.contains("<body")
}

/// Flatten an HTML document to its text content, entities decoded.
fn flatten_html(text: &str) -> String {
    let document = Html::parse_document(text);
    document.root_element().text().collect::<Vec<_>>().join(" ")
}
