//! Data models shared across the collection pipeline.
//!
//! This module defines the core data structures used throughout the application:
//! - [`SourceReport`] / [`FetchOutcome`]: the per-source result of the fetch stage
//! - [`GeoLabel`]: a best-effort geographic location attached to an address
//! - [`ClassifiedAddress`]: an address together with its location and US/non-US verdict
//!
//! Addresses themselves are carried as `std::net::Ipv4Addr` / `std::net::Ipv6Addr`
//! rather than strings: parsing through the std types is what enforces syntactic
//! validity, and the `Display` impl of `Ipv6Addr` yields the canonical compressed
//! lowercase form that serves as the deduplication key.

/// The result of fetching one configured source.
///
/// A source either yielded a text body or it did not; failures are absorbed at
/// the fetch boundary and never propagate as errors. A source that exhausted
/// its retry budget simply reports [`FetchOutcome::Unavailable`] and
/// contributes nothing to the run.
#[derive(Debug)]
pub struct SourceReport {
    /// The source URL as configured.
    pub url: String,
    /// What the fetch produced.
    pub outcome: FetchOutcome,
}

/// What fetching a single source produced.
#[derive(Debug)]
pub enum FetchOutcome {
    /// The response body, as text.
    Retrieved(String),
    /// All attempts failed; the source contributes nothing this run.
    Unavailable,
}

impl FetchOutcome {
    /// The retrieved body, if any.
    pub fn body(&self) -> Option<&str> {
        match self {
            FetchOutcome::Retrieved(text) => Some(text),
            FetchOutcome::Unavailable => None,
        }
    }

    /// Whether the fetch produced a body.
    pub fn is_retrieved(&self) -> bool {
        matches!(self, FetchOutcome::Retrieved(_))
    }
}

/// A best-effort geographic location for one address.
///
/// Lookups are non-authoritative and frequently fail; a failed lookup is a
/// normal data-level outcome, not an error. The two cases are kept distinct
/// so callers can never confuse "the service said `unknown`" with "the lookup
/// itself failed"; the latter is [`GeoLabel::Unresolved`] and is rendered as
/// `unknown` only at the output boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeoLabel {
    /// A free-text location label returned by the lookup service,
    /// e.g. `美国-加利福尼亚-洛杉矶` or `United States-California`.
    Resolved(String),
    /// The lookup failed or returned an unusable body.
    Unresolved,
}

impl GeoLabel {
    /// The text rendered into output artifacts: the resolved label, or
    /// `unknown` when the lookup did not resolve.
    pub fn as_text(&self) -> &str {
        match self {
            GeoLabel::Resolved(label) => label,
            GeoLabel::Unresolved => "unknown",
        }
    }

    /// Whether the lookup produced a usable label.
    pub fn is_resolved(&self) -> bool {
        matches!(self, GeoLabel::Resolved(_))
    }
}

/// An address annotated with its location lookup and partition verdict.
///
/// Generic over the address family (`Ipv4Addr` or `Ipv6Addr`) so the two
/// families can never mix inside one collection. Derived fresh each run;
/// persistence lives entirely in the output files.
#[derive(Debug, Clone)]
pub struct ClassifiedAddress<A> {
    /// The validated global address.
    pub addr: A,
    /// Best-effort location for the address.
    pub label: GeoLabel,
    /// Whether the label matched a US keyword. Always `false` when the
    /// label is [`GeoLabel::Unresolved`].
    pub is_us: bool,
}
