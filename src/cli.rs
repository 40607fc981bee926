use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use wscleaner_core::{AppConfig, LogfilePolicy};

#[derive(Debug, Parser)]
#[command(name = "wscleaner")]
#[command(about = "Delete local runfolders once they are safely archived", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Configuration file. Defaults to an optional Config.toml in the working directory
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory containing runfolders
    #[arg(long, global = true)]
    pub runfolders_dir: Option<PathBuf>,

    /// Minimum runfolder age in days before deletion
    #[arg(long, global = true)]
    pub min_age: Option<u64>,

    /// Expected number of logfiles in the remote project
    #[arg(long, global = true)]
    pub logfile_count: Option<usize>,

    /// How the remote logfile count is compared with --logfile-count
    #[arg(long, global = true, value_enum)]
    pub logfile_policy: Option<PolicyArg>,

    /// Directory holding the upload tool's per-runfolder logs
    #[arg(long, global = true)]
    pub upload_log_dir: Option<PathBuf>,

    /// Number of runfolders verified in parallel
    #[arg(long, global = true)]
    pub concurrency: Option<usize>,

    /// Append one CSV row per processed runfolder to this file
    #[arg(long, global = true)]
    pub audit_csv: Option<PathBuf>,

    /// Log actions without deleting anything
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// File containing the archive API token on its first line
    #[arg(long, global = true)]
    pub auth: Option<PathBuf>,

    /// Archive API token. Takes precedence over --auth
    #[arg(long, global = true, env = "DX_AUTH_TOKEN", hide_env_values = true)]
    pub auth_token: Option<String>,

    /// Log file path
    #[arg(long, global = true, env = "LOG_FILE_PATH")]
    pub logfile: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Commands {
    /// Scan the runfolder directory and delete verified runfolders
    Run,
    /// Verify a single runfolder and print the verdict without deleting it
    Check {
        /// Runfolder name, relative to the runfolder directory
        runfolder: String,
    },
    /// Print the effective configuration
    PrintConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PolicyArg {
    Exact,
    AtLeast,
}

impl From<PolicyArg> for LogfilePolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Exact => LogfilePolicy::Exact,
            PolicyArg::AtLeast => LogfilePolicy::AtLeast,
        }
    }
}

impl Cli {
    /// Command-line values win over the config file and environment.
    pub fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(dir) = &self.runfolders_dir {
            config.runfolders_dir = dir.clone();
        }
        if let Some(days) = self.min_age {
            config.min_age_days = days;
        }
        if let Some(count) = self.logfile_count {
            config.logfile_count = count;
        }
        if let Some(policy) = self.logfile_policy {
            config.logfile_policy = policy.into();
        }
        if let Some(dir) = &self.upload_log_dir {
            config.upload_log_dir = dir.clone();
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        if let Some(path) = &self.audit_csv {
            config.audit_csv = Some(path.clone());
        }
        if let Some(path) = &self.auth {
            config.archive.auth_token_file = Some(path.clone());
        }
        if self.dry_run {
            config.dry_run = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_overrides_replace_config_values() {
        let cli = Cli::try_parse_from([
            "wscleaner",
            "--runfolders-dir",
            "/data/runs",
            "--min-age",
            "30",
            "--logfile-policy",
            "at-least",
            "--dry-run",
            "--auth",
            "/etc/dx_token",
            "run",
        ])
        .unwrap();
        assert_eq!(cli.command, Some(Commands::Run));

        let mut config = AppConfig::default();
        cli.apply_overrides(&mut config);
        assert_eq!(config.runfolders_dir, PathBuf::from("/data/runs"));
        assert_eq!(config.min_age_days, 30);
        assert_eq!(config.logfile_policy, LogfilePolicy::AtLeast);
        assert_eq!(config.logfile_count, 5);
        assert!(config.dry_run);
        assert_eq!(
            config.archive.auth_token_file,
            Some(PathBuf::from("/etc/dx_token"))
        );
    }

    #[test]
    fn test_check_takes_runfolder_after_global_flags() {
        let cli =
            Cli::try_parse_from(["wscleaner", "check", "250101_X_0001", "--min-age", "7"]).unwrap();
        assert_eq!(
            cli.command,
            Some(Commands::Check {
                runfolder: "250101_X_0001".to_string()
            })
        );
        assert_eq!(cli.min_age, Some(7));
    }
}
