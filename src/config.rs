//! Configuration types for dc-import
//!
//! This module defines:
//! - The worker-pool sizing policy shared by the wrap and apply phases
//! - CLI argument parsing using clap derive macros
//! - Runtime configuration with validation

use crate::error::ConfigError;
use clap::Parser;
use regex::Regex;
use std::collections::HashSet;
use std::path::PathBuf;

/// Maximum reasonable worker count
pub const MAX_WORKERS: usize = 512;

/// Units of parallelism left for the host UI thread and the import driver
pub const RESERVED_THREADS: usize = 2;

/// Default size limit for a single finalized payload (256 MiB)
const DEFAULT_MAX_PAYLOAD: u64 = 256 * 1024 * 1024;

/// Worker-pool configuration for the import pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportConfig {
    /// Workers used for both the wrap and the apply phase
    pub worker_count: usize,
}

impl ImportConfig {
    /// Size the pool from the machine's available parallelism
    pub fn auto() -> Self {
        Self::from_parallelism(num_cpus::get())
    }

    /// `max(1, parallelism - RESERVED_THREADS)`
    pub fn from_parallelism(parallelism: usize) -> Self {
        Self {
            worker_count: parallelism.saturating_sub(RESERVED_THREADS).max(1),
        }
    }

    /// Use an explicit worker count
    pub fn with_workers(count: usize) -> Result<Self, ConfigError> {
        if count == 0 || count > MAX_WORKERS {
            return Err(ConfigError::InvalidWorkerCount {
                count,
                max: MAX_WORKERS,
            });
        }
        Ok(Self {
            worker_count: count,
        })
    }
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self::auto()
    }
}

/// Concurrent importer for directories of data files
#[derive(Parser, Debug, Clone)]
#[command(
    name = "dc-import",
    version,
    about = "Concurrent two-phase importer for data containers",
    long_about = "Imports each directory as a data container: every file inside it is wrapped \
                  on a worker pool, attached to a filter tree, and finalized once all \
                  containers have been wrapped.",
    after_help = "EXAMPLES:\n    \
        dc-import tiles/row_0 tiles/row_1\n    \
        dc-import scans/ -w 4 --exclude '\\.tmp$'\n    \
        dc-import tiles/row_0 --reload --tree-json tree.json"
)]
pub struct CliArgs {
    /// Container directories to import, in order
    #[arg(value_name = "DIR", required = true, num_args = 1..)]
    pub sources: Vec<PathBuf>,

    /// After importing, reload the same containers in place
    #[arg(long)]
    pub reload: bool,

    /// Number of worker threads (default: available parallelism minus 2)
    #[arg(short = 'w', long, value_name = "NUM")]
    pub workers: Option<usize>,

    /// Quiet mode - suppress progress output
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Skip files whose path matches pattern (can be repeated)
    #[arg(long = "exclude", value_name = "PATTERN", action = clap::ArgAction::Append)]
    pub exclude_patterns: Vec<String>,

    /// Write a JSON snapshot of the resulting filter tree
    #[arg(long, value_name = "FILE")]
    pub tree_json: Option<PathBuf>,

    /// Largest payload, in bytes, a finalize will accept
    #[arg(long, default_value_t = DEFAULT_MAX_PAYLOAD, value_name = "BYTES")]
    pub max_payload: u64,
}

/// Validated runtime configuration for the CLI
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Pool sizing
    pub import: ImportConfig,

    /// Container directories in submission order
    pub sources: Vec<PathBuf>,

    /// Run a reload pass after the import pass
    pub reload: bool,

    /// Show progress indicator
    pub show_progress: bool,

    /// Verbose logging
    pub verbose: bool,

    /// Compiled exclude patterns
    pub exclude_patterns: Vec<Regex>,

    /// Tree snapshot destination
    pub tree_json: Option<PathBuf>,

    /// Payload size limit for finalize
    pub max_payload: u64,
}

impl AppConfig {
    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        if args.sources.is_empty() {
            return Err(ConfigError::NoSources);
        }

        let mut seen = HashSet::new();
        for source in &args.sources {
            if !seen.insert(source.clone()) {
                return Err(ConfigError::DuplicateSource {
                    path: source.clone(),
                });
            }
        }

        let import = match args.workers {
            Some(count) => ImportConfig::with_workers(count)?,
            None => ImportConfig::auto(),
        };

        let exclude_patterns = args
            .exclude_patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| ConfigError::InvalidExcludePattern {
                    pattern: p.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        if let Some(ref out) = args.tree_json {
            if let Some(parent) = out.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    return Err(ConfigError::InvalidOutputPath {
                        path: out.clone(),
                        reason: format!("Parent directory '{}' does not exist", parent.display()),
                    });
                }
            }
        }

        Ok(Self {
            import,
            sources: args.sources,
            reload: args.reload,
            show_progress: !args.quiet,
            verbose: args.verbose,
            exclude_patterns,
            tree_json: args.tree_json,
            max_payload: args.max_payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(sources: &[&str]) -> CliArgs {
        CliArgs {
            sources: sources.iter().map(PathBuf::from).collect(),
            reload: false,
            workers: None,
            quiet: false,
            verbose: false,
            exclude_patterns: Vec::new(),
            tree_json: None,
            max_payload: DEFAULT_MAX_PAYLOAD,
        }
    }

    #[test]
    fn test_pool_size_reserves_two_threads() {
        assert_eq!(ImportConfig::from_parallelism(8).worker_count, 6);
        assert_eq!(ImportConfig::from_parallelism(3).worker_count, 1);
        assert_eq!(ImportConfig::from_parallelism(2).worker_count, 1);
        assert_eq!(ImportConfig::from_parallelism(1).worker_count, 1);
        assert_eq!(ImportConfig::from_parallelism(0).worker_count, 1);
        assert!(ImportConfig::auto().worker_count >= 1);
    }

    #[test]
    fn test_explicit_worker_count() {
        assert_eq!(ImportConfig::with_workers(4).unwrap().worker_count, 4);
        assert!(matches!(
            ImportConfig::with_workers(0),
            Err(ConfigError::InvalidWorkerCount { count: 0, .. })
        ));
        assert!(ImportConfig::with_workers(MAX_WORKERS + 1).is_err());
    }

    #[test]
    fn test_from_args() {
        let mut a = args(&["a", "b"]);
        a.workers = Some(3);
        a.quiet = true;
        let config = AppConfig::from_args(a).unwrap();
        assert_eq!(config.import.worker_count, 3);
        assert_eq!(config.sources.len(), 2);
        assert!(!config.show_progress);
    }

    #[test]
    fn test_duplicate_source_rejected() {
        let err = AppConfig::from_args(args(&["a", "a"])).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateSource { .. }));
    }

    #[test]
    fn test_exclude_pattern() {
        let mut a = args(&["a"]);
        a.exclude_patterns = vec![r"\.tmp$".into()];
        let config = AppConfig::from_args(a).unwrap();
        assert_eq!(config.exclude_patterns.len(), 1);
        assert!(config.exclude_patterns[0].is_match("/data/tile_0.tmp"));
        assert!(!config.exclude_patterns[0].is_match("/data/tile_0.h5"));

        let mut bad = args(&["a"]);
        bad.exclude_patterns = vec!["(".into()];
        assert!(matches!(
            AppConfig::from_args(bad),
            Err(ConfigError::InvalidExcludePattern { .. })
        ));
    }
}
