//! Runtime settings with typed fields and documented defaults.
//!
//! Every tunable of the pipeline lives here as a named, typed field with a
//! compiled-in default, so a bare invocation needs no configuration at all.
//! An optional YAML file (passed via `--config`) overlays individual fields;
//! unknown keys are rejected rather than ignored.
//!
//! The defaults (source list, US keyword list, seed addresses, output port)
//! are the long-serving production values for collecting Cloudflare edge
//! addresses.

use serde::Deserialize;
use std::error::Error;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::{Path, PathBuf};

/// All tunables for one pipeline run.
///
/// Construct with [`Settings::default`] or [`Settings::load`]. Field defaults
/// are noted per field; any subset can be overridden from the YAML file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Source URLs to fetch candidate addresses from.
    /// Default: 17 public Cloudflare IP lists and pages.
    pub sources: Vec<String>,

    /// Directory the output artifacts are written into. Default: `.`
    pub output_dir: PathBuf,

    /// Port number rendered into every output line. Default: 8443.
    pub port: u16,

    /// User-Agent header sent with every request. Default: a desktop
    /// Chrome identifier; several sources reject obvious bot agents.
    pub user_agent: String,

    /// Concurrent source fetches. Default: 5.
    pub fetch_workers: usize,

    /// Total attempts per source, including the first. Default: 2.
    pub fetch_attempts: usize,

    /// Per-attempt fetch timeout, seconds. Default: 10.
    pub fetch_timeout_secs: u64,

    /// Base delay before the first retry, milliseconds; doubles per retry
    /// with a little jitter on top. Default: 1000.
    pub retry_base_delay_ms: u64,

    /// Location lookup endpoint; the address is appended as a path segment.
    /// Default: `http://ip-api.com/json`.
    pub geo_api: String,

    /// Language requested from the lookup service. Default: `zh-CN`,
    /// matching the keyword list below.
    pub geo_lang: String,

    /// Per-lookup timeout, seconds. Default: 10.
    pub geo_timeout_secs: u64,

    /// Concurrent location lookups. Default: 10.
    pub lookup_workers: usize,

    /// Addresses looked up per batch before pausing. Default: 500.
    pub lookup_batch_size: usize,

    /// Pause between lookup batches, milliseconds. Default: 1000.
    pub lookup_batch_pause_ms: u64,

    /// Minimum extracted addresses (both families combined) for a run to be
    /// considered viable; below this the seed lists are substituted.
    /// Default: 10.
    pub min_viable_addresses: usize,

    /// Keywords marking a location label as US. Matched case-insensitively
    /// as substrings. Default: country names/codes and major US cities, in
    /// English and Chinese.
    pub us_keywords: Vec<String>,

    /// Fallback IPv4 addresses written when collection is not viable.
    /// Default: 13 well-known Cloudflare anycast addresses.
    pub seed_ipv4: Vec<Ipv4Addr>,

    /// Fallback IPv6 addresses written when collection is not viable.
    /// Default: 10 well-known Cloudflare anycast addresses.
    pub seed_ipv6: Vec<Ipv6Addr>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sources: default_sources(),
            output_dir: PathBuf::from("."),
            port: 8443,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
            fetch_workers: 5,
            fetch_attempts: 2,
            fetch_timeout_secs: 10,
            retry_base_delay_ms: 1000,
            geo_api: "http://ip-api.com/json".to_string(),
            geo_lang: "zh-CN".to_string(),
            geo_timeout_secs: 10,
            lookup_workers: 10,
            lookup_batch_size: 500,
            lookup_batch_pause_ms: 1000,
            min_viable_addresses: 10,
            us_keywords: default_us_keywords(),
            seed_ipv4: default_seed_ipv4(),
            seed_ipv6: default_seed_ipv6(),
        }
    }
}

impl Settings {
    /// Load settings, overlaying a YAML file over the defaults when a path
    /// is given.
    ///
    /// # Arguments
    ///
    /// * `path` - Optional settings file; `None` yields the defaults
    ///
    /// # Returns
    ///
    /// The effective settings, or an error if the file cannot be read,
    /// parsed, or fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self, Box<dyn Error>> {
        let settings = match path {
            Some(p) => {
                let text = std::fs::read_to_string(p)?;
                serde_yaml::from_str::<Settings>(&text)?
            }
            None => Settings::default(),
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings no run could make progress with.
    fn validate(&self) -> Result<(), Box<dyn Error>> {
        if self.fetch_workers == 0 {
            return Err("fetch_workers must be at least 1".into());
        }
        if self.fetch_attempts == 0 {
            return Err("fetch_attempts must be at least 1".into());
        }
        if self.lookup_workers == 0 {
            return Err("lookup_workers must be at least 1".into());
        }
        if self.lookup_batch_size == 0 {
            return Err("lookup_batch_size must be at least 1".into());
        }
        if self.geo_api.is_empty() {
            return Err("geo_api must not be empty".into());
        }
        Ok(())
    }
}

/// The public lists and pages addresses are collected from.
fn default_sources() -> Vec<String> {
    [
        "https://ip.164746.xyz",
        "https://api.uouin.com/cloudflare.html",
        "https://ipdb.api.030101.xyz/?type=bestcf&country=true",
        "https://addressesapi.090227.xyz/CloudFlareYes",
        "https://raw.githubusercontent.com/ymyuuu/IPDB/main/BestCF/bestcfv4.txt",
        "https://www.wetest.vip/page/cloudflare/address_v6.html",
        "https://www.wetest.vip/page/cloudflare/address_v4.html",
        "https://raw.githubusercontent.com/crow1874/CF-DNS-Clone/main/030101-bestcf.txt",
        "https://raw.githubusercontent.com/crow1874/CF-DNS-Clone/main/wetest-cloudflare-v4.txt",
        "https://raw.githubusercontent.com/ZhiXuanWang/cf-speed-dns/main/ipTop10.html",
        "https://raw.githubusercontent.com/gslege/CloudflareIP/main/result.txt",
        "https://raw.githubusercontent.com/camel52zhang/yxip/main/ip.txt",
        "https://raw.githubusercontent.com/Senflare/Senflare-IP/main/IPlist.txt",
        "https://raw.githubusercontent.com/hubbylei/bestcf/main/bestcf.txt",
        "https://raw.githubusercontent.com/XIU2/CloudflareSpeedTest/master/ip.txt",
        "https://www.cloudflare.com/ips-v4",
        "https://www.cloudflare.com/ips-v6",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

/// Keywords that mark a location label as US.
pub(crate) fn default_us_keywords() -> Vec<String> {
    [
        "美国",
        "United States",
        "US",
        "USA",
        "加州",
        "加利福尼亚",
        "洛杉矶",
        "San Jose",
        "Chicago",
        "New York",
        "NY",
        "Seattle",
        "Dallas",
        "Miami",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

fn default_seed_ipv4() -> Vec<Ipv4Addr> {
    vec![
        Ipv4Addr::new(1, 1, 1, 1),
        Ipv4Addr::new(1, 0, 0, 1),
        Ipv4Addr::new(104, 16, 0, 1),
        Ipv4Addr::new(104, 16, 1, 1),
        Ipv4Addr::new(104, 17, 0, 1),
        Ipv4Addr::new(172, 64, 0, 1),
        Ipv4Addr::new(172, 65, 0, 1),
        Ipv4Addr::new(162, 159, 36, 1),
        Ipv4Addr::new(162, 159, 46, 1),
        Ipv4Addr::new(188, 114, 96, 1),
        Ipv4Addr::new(188, 114, 97, 1),
        Ipv4Addr::new(198, 41, 128, 1),
        Ipv4Addr::new(198, 41, 129, 1),
    ]
}

fn default_seed_ipv6() -> Vec<Ipv6Addr> {
    vec![
        Ipv6Addr::new(0x2606, 0x4700, 0x4700, 0, 0, 0, 0, 0x1111),
        Ipv6Addr::new(0x2606, 0x4700, 0x4700, 0, 0, 0, 0, 0x1001),
        Ipv6Addr::new(0x2606, 0x4700, 0x4700, 0, 0, 0, 0, 0x1112),
        Ipv6Addr::new(0x2606, 0x4700, 0x4700, 0, 0, 0, 0, 0x1002),
        Ipv6Addr::new(0x2606, 0x4700, 0x4700, 0, 0, 0, 0, 0x1113),
        Ipv6Addr::new(0x2606, 0x4700, 0x4700, 0, 0, 0, 0, 0x1003),
        Ipv6Addr::new(0x2a06, 0x98c0, 0, 0, 0, 0, 0, 0x1),
        Ipv6Addr::new(0x2a06, 0x98c0, 0, 0, 0, 0, 0, 0x2),
        Ipv6Addr::new(0x2a06, 0x98c1, 0, 0, 0, 0, 0, 0x1),
        Ipv6Addr::new(0x2a06, 0x98c1, 0, 0, 0, 0, 0, 0x2),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let s = Settings::default();
        assert_eq!(s.sources.len(), 17);
        assert_eq!(s.port, 8443);
        assert!((5..=8).contains(&s.fetch_workers));
        assert!((2..=3).contains(&s.fetch_attempts));
        assert!((8..=15).contains(&s.lookup_workers));
        assert_eq!(s.seed_ipv4.len(), 13);
        assert_eq!(s.seed_ipv6.len(), 10);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_overlays_defaults() {
        let yaml = "port: 443\nfetch_workers: 8\nsources:\n  - https://example.com/ips.txt\n";
        let s: Settings = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(s.port, 443);
        assert_eq!(s.fetch_workers, 8);
        assert_eq!(s.sources, vec!["https://example.com/ips.txt".to_string()]);
        // Untouched fields keep their defaults.
        assert_eq!(s.lookup_batch_size, 500);
        assert_eq!(s.geo_api, "http://ip-api.com/json");
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let yaml = "port: 443\nmax_workerz: 9\n";
        assert!(serde_yaml::from_str::<Settings>(yaml).is_err());
    }

    #[test]
    fn test_seed_addresses_deserialize_from_strings() {
        let yaml = "seed_ipv4:\n  - 1.1.1.1\nseed_ipv6:\n  - '2606:4700:4700::1111'\n";
        let s: Settings = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(s.seed_ipv4, vec![Ipv4Addr::new(1, 1, 1, 1)]);
        assert_eq!(
            s.seed_ipv6,
            vec![Ipv6Addr::new(0x2606, 0x4700, 0x4700, 0, 0, 0, 0, 0x1111)]
        );
    }

    #[test]
    fn test_zero_workers_fail_validation() {
        let mut s = Settings::default();
        s.fetch_workers = 0;
        assert!(s.validate().is_err());
    }
}
