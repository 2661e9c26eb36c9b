//! Command-line argument parsing

use crate::config::{DEFAULT_WATCHDOG_STALL, RetryExhaustion, RunConfig};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(name = "repliquay")]
#[command(about = "Replicate Quay organizations, robots, teams, repositories and permissions")]
#[command(version)]
#[command(after_help = "Settings are applied in order: command-line flags, then the environment \
(REPLIQUAY_SLEEP_MS, REPLIQUAY_RETRIES, REPLIQUAY_DEBUG, REPLIQUAY_SKIP_VERIFY, REPLIQUAY_DRY_RUN), \
then the --conf file. A set environment variable overrides the matching flag.")]
pub struct Args {
    /// Organization description file (repeatable)
    #[arg(long = "repo", help = "Quay organization file name, may be repeated")]
    pub repo: Vec<PathBuf>,

    /// Hosts file
    #[arg(long = "quaysfile", help = "Quay hosts and tokens file name")]
    pub quays_file: Option<PathBuf>,

    /// Run-config file
    #[arg(
        long = "conf",
        default_value = "/repos/repliquay.conf",
        help = "Run configuration file, overrides command-line options"
    )]
    pub conf: PathBuf,

    #[arg(
        long = "sleep",
        default_value = "100",
        help = "Sleep length in ms when reaching max connections"
    )]
    pub sleep: u64,

    #[arg(
        long = "retries",
        default_value = "3",
        help = "Max retries on API call server failure"
    )]
    pub retries: u32,

    #[arg(long = "debug", help = "Print debug messages")]
    pub debug: bool,

    #[arg(long = "insecure", help = "Use plain HTTP instead of TLS")]
    pub insecure: bool,

    #[arg(long = "ldapsync", help = "Bind teams to their LDAP group after creation")]
    pub ldap_sync: bool,

    #[arg(long = "dryrun", help = "Log the action plan without calling the hosts")]
    pub dry_run: bool,

    #[arg(long = "skip-verify", help = "Skip TLS certificate verification")]
    pub skip_verify: bool,

    #[arg(
        long = "clone",
        help = "Clone the first quay configuration to the others, requires at least 2 quays"
    )]
    pub clone: bool,

    #[arg(
        long = "continue-on-exhausted-retries",
        help = "Skip an action that keeps failing instead of stopping the run"
    )]
    pub continue_on_exhausted_retries: bool,

    #[arg(
        long = "admission-watchdog",
        help = "Reset a host's connection counter when no call completes for 30s"
    )]
    pub admission_watchdog: bool,
}

impl Args {
    pub fn parse_args() -> Self {
        Args::parse()
    }

    pub fn validate(&self) -> Result<(), String> {
        for path in &self.repo {
            if !path.exists() {
                return Err(format!("file does not exist: {}", path.display()));
            }
        }
        if self.sleep == 0 {
            return Err("Sleep must be greater than 0".to_string());
        }
        Ok(())
    }

    pub fn run_config(&self) -> RunConfig {
        RunConfig {
            debug: self.debug,
            skip_verify: self.skip_verify,
            dry_run: self.dry_run,
            insecure: self.insecure,
            ldap_sync: self.ldap_sync,
            clone: self.clone,
            sleep_period: Duration::from_millis(self.sleep),
            retries: self.retries,
            retry_exhaustion: if self.continue_on_exhausted_retries {
                RetryExhaustion::SkipAction
            } else {
                RetryExhaustion::Abort
            },
            admission_watchdog: self.admission_watchdog.then_some(DEFAULT_WATCHDOG_STALL),
            ..RunConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["repliquay"]);
        assert_eq!(args.sleep, 100);
        assert_eq!(args.retries, 3);
        assert_eq!(args.conf, PathBuf::from("/repos/repliquay.conf"));
        assert!(!args.clone);

        let config = args.run_config();
        assert_eq!(config.sleep_period, Duration::from_millis(100));
        assert_eq!(config.retry_exhaustion, RetryExhaustion::Abort);
        assert_eq!(config.admission_watchdog, None);
    }

    #[test]
    fn test_repeated_repo_flags() {
        let args = Args::parse_from([
            "repliquay",
            "--repo",
            "a.yaml",
            "--repo",
            "b.yaml",
            "--quaysfile",
            "quays.yaml",
            "--dryrun",
            "--continue-on-exhausted-retries",
            "--admission-watchdog",
        ]);
        assert_eq!(args.repo.len(), 2);
        assert_eq!(args.quays_file, Some(PathBuf::from("quays.yaml")));

        let config = args.run_config();
        assert!(config.dry_run);
        assert_eq!(config.retry_exhaustion, RetryExhaustion::SkipAction);
        assert_eq!(config.admission_watchdog, Some(DEFAULT_WATCHDOG_STALL));
    }

    #[test]
    fn test_help_states_environment_precedence() {
        use clap::CommandFactory;

        let help = Args::command().render_long_help().to_string();
        assert!(help.contains("REPLIQUAY_RETRIES"));
        assert!(help.contains("environment"));
    }

    #[test]
    fn test_validate_rejects_missing_repo_file() {
        let args = Args::parse_from(["repliquay", "--repo", "/nonexistent/org.yaml"]);
        assert!(args.validate().is_err());
    }
}
