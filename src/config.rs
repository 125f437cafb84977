//! Run configuration: threshold rules, artifact root and scheduling knobs.
//!
//! A [`QcConfig`] is built once at process start (defaults, then an optional
//! JSON file, then CLI overrides) and shared read-only afterwards.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::model::FlagKey;

/// Default per-unit time budget.
pub const DEFAULT_UNIT_TIMEOUT: Duration = Duration::from_secs(120);

/// Default number of worker threads.
pub const DEFAULT_WORKERS: usize = 4;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("failed to read config {path}: {source}")]
    Io {
        /// File that was being read.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// Configuration file is not valid JSON for this schema.
    #[error("invalid config {path}: {source}")]
    Parse {
        /// File that was being parsed.
        path: PathBuf,
        /// Underlying JSON failure.
        #[source]
        source: serde_json::Error,
    },

    /// A rule has an empty or inverted range.
    #[error("invalid rule for {flag}: {reason}")]
    InvalidRule {
        /// Flag the rule belongs to.
        flag: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// Threshold rule for one metric.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    /// Warn when the value is strictly greater than the limit.
    Above(f64),
    /// Warn when the value is strictly less than the limit.
    Below(f64),
    /// Warn when the value is outside the closed range `[min, max]`.
    Outside {
        /// Lowest accepted value.
        min: f64,
        /// Highest accepted value.
        max: f64,
    },
}

impl Rule {
    /// Whether `value` violates this rule.
    pub fn warns(&self, value: f64) -> bool {
        match *self {
            Rule::Above(limit) => value > limit,
            Rule::Below(limit) => value < limit,
            Rule::Outside { min, max } => !(min..=max).contains(&value),
        }
    }

    /// Short description of the accepted values, used in warning messages.
    pub fn describe(&self) -> String {
        match *self {
            Rule::Above(limit) => format!("exceeds {limit}"),
            Rule::Below(limit) => format!("is below {limit}"),
            Rule::Outside { min, max } => format!("is outside the acceptable range ({min}-{max})"),
        }
    }

    fn validate(&self, flag: FlagKey) -> Result<(), ConfigError> {
        let finite = match *self {
            Rule::Above(limit) | Rule::Below(limit) => limit.is_finite(),
            Rule::Outside { min, max } => min.is_finite() && max.is_finite(),
        };
        if !finite {
            return Err(ConfigError::InvalidRule {
                flag: flag.as_str(),
                reason: "limits must be finite".to_string(),
            });
        }
        if let Rule::Outside { min, max } = *self {
            if min > max {
                return Err(ConfigError::InvalidRule {
                    flag: flag.as_str(),
                    reason: format!("min {min} is greater than max {max}"),
                });
            }
        }
        Ok(())
    }
}

/// Named, overridable threshold set.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Thresholds {
    /// Percentage of unaligned reads.
    pub unaligned: Rule,
    /// Percentage of reads with mapping quality <= 29.
    pub mapq: Rule,
    /// Percentage of duplicate reads (BAM/CRAM and FASTQ).
    pub duplicate_reads: Rule,
    /// GC content (BAM/CRAM weighted mean, FASTQ in-range share).
    pub gc_content: Rule,
    /// Percentage of reads with mean quality below 20.
    pub low_quality: Rule,
    /// Ts/Tv ratio.
    pub tstv_ratio: Rule,
    /// Average variant quality.
    pub avg_qual: Rule,
    /// Minimum one-hit percentage for a human call to be trusted.
    pub species_min_one_hit_percent: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            unaligned: Rule::Above(40.0),
            mapq: Rule::Above(20.0),
            duplicate_reads: Rule::Above(20.0),
            gc_content: Rule::Outside {
                min: 35.0,
                max: 55.0,
            },
            low_quality: Rule::Above(20.0),
            tstv_ratio: Rule::Outside { min: 1.9, max: 3.3 },
            avg_qual: Rule::Below(30.0),
            species_min_one_hit_percent: 5.0,
        }
    }
}

impl Thresholds {
    /// Rule governing `flag`, or `None` for informational metrics.
    pub fn rule(&self, flag: FlagKey) -> Option<Rule> {
        match flag {
            FlagKey::Unaligned => Some(self.unaligned),
            FlagKey::Mapq => Some(self.mapq),
            FlagKey::DuplicateReads => Some(self.duplicate_reads),
            FlagKey::GcContent => Some(self.gc_content),
            FlagKey::LowQuality => Some(self.low_quality),
            FlagKey::TsTvRatio => Some(self.tstv_ratio),
            FlagKey::AvgQual => Some(self.avg_qual),
            _ => None,
        }
    }

    /// The rule `value` breaks, if `flag` has one and it warns.
    pub fn violated(&self, flag: FlagKey, value: f64) -> Option<Rule> {
        self.rule(flag).filter(|rule| rule.warns(value))
    }

    /// Whether `value` measured for `flag` should raise a warning.
    pub fn warns(&self, flag: FlagKey, value: f64) -> bool {
        self.violated(flag, value).is_some()
    }

    /// Reject non-finite limits and inverted ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        const RULED: [FlagKey; 7] = [
            FlagKey::Unaligned,
            FlagKey::Mapq,
            FlagKey::DuplicateReads,
            FlagKey::GcContent,
            FlagKey::LowQuality,
            FlagKey::TsTvRatio,
            FlagKey::AvgQual,
        ];
        for flag in RULED {
            if let Some(rule) = self.rule(flag) {
                rule.validate(flag)?;
            }
        }
        Ok(())
    }
}

/// Parallelism and time budget for a batch run.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    /// Worker threads; `0` runs every unit on the calling thread.
    pub workers: usize,
    /// Capacity of the bounded work queue; `None` sizes it at twice the
    /// worker count.
    pub queue_capacity: Option<usize>,
    /// Time budget per unit; `None` disables the timeout.
    pub unit_timeout: Option<Duration>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::with_workers(DEFAULT_WORKERS)
    }
}

impl SchedulerConfig {
    /// Configuration with `workers` threads and a queue of twice that size.
    pub fn with_workers(workers: usize) -> Self {
        Self {
            workers,
            queue_capacity: None,
            unit_timeout: Some(DEFAULT_UNIT_TIMEOUT),
        }
    }

    /// Change the worker count, keeping any explicit queue capacity and timeout.
    pub fn with_worker_count(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Override the work queue capacity (at least one slot).
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity.max(1));
        self
    }

    /// Slots in the bounded work queue.
    pub fn capacity(&self) -> usize {
        self.queue_capacity.unwrap_or(self.workers * 2).max(1)
    }

    /// Override the per-unit time budget.
    pub fn with_unit_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.unit_timeout = timeout;
        self
    }
}

/// Complete run configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct QcConfig {
    /// Threshold rules.
    pub thresholds: Thresholds,
    /// Warn when the species-screening report is absent.
    pub warn_missing_species: bool,
    /// Decrypt the stats file to compute BAM/CRAM GC content.
    pub include_crypt: bool,
    /// Root of the artifact archive, if resolving from disk.
    pub archive_root: Option<PathBuf>,
    /// Batch scheduling.
    pub scheduler: SchedulerConfig,
}

impl Default for QcConfig {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            warn_missing_species: true,
            include_crypt: true,
            archive_root: None,
            scheduler: SchedulerConfig::default(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    thresholds: Option<Thresholds>,
    warn_missing_species: Option<bool>,
    include_crypt: Option<bool>,
    archive_root: Option<PathBuf>,
    workers: Option<usize>,
    queue_capacity: Option<usize>,
    unit_timeout_secs: Option<u64>,
}

impl QcConfig {
    /// Load configuration from a JSON file; absent fields keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text).map_err(|err| match err {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    /// Parse configuration from JSON text; absent fields keep their defaults.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = serde_json::from_str(text).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })?;

        let mut config = Self::default();
        if let Some(thresholds) = file.thresholds {
            thresholds.validate()?;
            config.thresholds = thresholds;
        }
        if let Some(flag) = file.warn_missing_species {
            config.warn_missing_species = flag;
        }
        if let Some(flag) = file.include_crypt {
            config.include_crypt = flag;
        }
        config.archive_root = file.archive_root;
        if let Some(workers) = file.workers {
            config.scheduler = config.scheduler.with_worker_count(workers);
        }
        if let Some(capacity) = file.queue_capacity {
            config.scheduler = config.scheduler.with_queue_capacity(capacity);
        }
        if let Some(secs) = file.unit_timeout_secs {
            let timeout = (secs > 0).then(|| Duration::from_secs(secs));
            config.scheduler = config.scheduler.with_unit_timeout(timeout);
        }
        Ok(config)
    }

    /// Replace the threshold set.
    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Toggle the missing-species warning.
    pub fn with_warn_missing_species(mut self, enabled: bool) -> Self {
        self.warn_missing_species = enabled;
        self
    }

    /// Toggle decryption of the stats file.
    pub fn with_include_crypt(mut self, enabled: bool) -> Self {
        self.include_crypt = enabled;
        self
    }

    /// Set the artifact archive root.
    pub fn with_archive_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.archive_root = Some(root.into());
        self
    }

    /// Replace the scheduling configuration.
    pub fn with_scheduler(mut self, scheduler: SchedulerConfig) -> Self {
        self.scheduler = scheduler;
        self
    }
}
