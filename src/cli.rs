//! Command-line interface definitions for the collector.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Every argument is optional: a bare invocation runs with the compiled-in
//! defaults, which is how the scheduler invokes it.

use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for the collector.
///
/// # Examples
///
/// ```sh
/// # Scheduled invocation, all defaults
/// cf_ip_collector
///
/// # Override the output directory
/// cf_ip_collector -o ./lists
///
/// # Run with a settings file
/// cf_ip_collector -c ./collector.yaml
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a YAML settings file
    #[arg(short, long, env = "CF_COLLECTOR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output directory for the address list artifacts (overrides settings)
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_with_no_arguments() {
        let cli = Cli::parse_from(["cf_ip_collector"]);
        assert!(cli.config.is_none());
        assert!(cli.output_dir.is_none());
    }

    #[test]
    fn test_cli_long_flags() {
        let cli = Cli::parse_from([
            "cf_ip_collector",
            "--config",
            "./collector.yaml",
            "--output-dir",
            "./lists",
        ]);

        assert_eq!(cli.config, Some(PathBuf::from("./collector.yaml")));
        assert_eq!(cli.output_dir, Some(PathBuf::from("./lists")));
    }

    #[test]
    fn test_cli_short_flags() {
        let cli = Cli::parse_from(["cf_ip_collector", "-c", "/etc/collector.yaml", "-o", "/tmp"]);

        assert_eq!(cli.config, Some(PathBuf::from("/etc/collector.yaml")));
        assert_eq!(cli.output_dir, Some(PathBuf::from("/tmp")));
    }
}
