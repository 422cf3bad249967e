//! Output generation for classified address lists.
//!
//! # Submodules
//!
//! - [`text`]: Writes the per-family address list artifacts, stable and
//!   per-run timestamped
//!
//! # Output Structure
//!
//! ```text
//! output_dir/
//! ├── ip.txt                          # all IPv4, replaced each run
//! ├── ipv6.txt                        # all IPv6, replaced each run
//! ├── non_us_ip.txt                   # non-US IPv4, replaced each run
//! ├── non_us_ipv6.txt                 # non-US IPv6, replaced each run
//! ├── non_us_ips_20260822_140355.txt  # non-US IPv4, one per run
//! └── non_us_ipv6_20260822_140355.txt # non-US IPv6, one per run
//! ```
//!
//! The timestamped files feed a separate daily merge routine; the stable
//! files are for direct consumption.

pub mod text;
