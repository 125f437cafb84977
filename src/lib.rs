//! # Archive QC
//!
//! Metric extraction and warning triage for the quality-control artifacts
//! stored next to archived sequencing submissions.
//!
//! ## Pipeline
//!
//! 1. **Resolution**: an [`ArtifactSource`] maps an identifier to the raw
//!    bytes of its artifacts ([`ArtifactSet`]).
//! 2. **Dispatch**: the JSON summary (if any) decides between BAM/CRAM and
//!    VCF; otherwise a FastQC archive makes it FASTQ.
//! 3. **Analysis**: one analyzer turns the artifact into [`Metric`]s and
//!    [`WarningRecord`]s, checked against the configured [`Thresholds`].
//! 4. **Aggregation**: each [`UnitReport`] is folded into a [`RunSummary`].
//!
//! The [`BatchScheduler`] drives this per identifier across a bounded worker
//! pool. A failure in one identifier never aborts the batch.
//!
//! ## Usage Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use archive_qc::{ArchiveLayout, BatchScheduler, QcConfig};
//!
//! let config = QcConfig::default().with_archive_root("/archive");
//! let source = Arc::new(ArchiveLayout::new("/archive"));
//! let ids = vec!["EGAF00001234567".to_string()];
//! let outcome = BatchScheduler::new(config).run(source, ids);
//! println!("{}", archive_qc::report::render_summary(&outcome.summary));
//! ```

#![warn(missing_docs, missing_debug_implementations)]

pub mod aggregate; // Run-level warning counts
pub mod bamcram; // BAM/CRAM summary metrics
pub mod config; // Thresholds and run settings
pub mod crypto; // OpenSSL-compatible stats decryption
pub mod dispatch; // Artifact classification and per-unit analysis
pub mod fastqc; // FastQC report parsing
pub mod model; // Shared records
pub mod report; // CSV rows and diagnostic text
pub mod resolve; // Identifier to artifact mapping
pub mod scheduler; // Parallel batch driver
pub mod species; // Species screening
pub mod stats; // GC histogram from decrypted stats
pub mod vcf; // VCF summary metrics

pub use aggregate::{AggregationEngine, RunSummary};
pub use config::{ConfigError, QcConfig, Rule, SchedulerConfig, Thresholds};
pub use crypto::DecryptionError;
pub use dispatch::{Classification, QcEngine};
pub use model::{
    ArtifactKind, ArtifactSet, Category, FlagKey, Metric, UnitReport, WarningKind, WarningRecord,
};
pub use resolve::{ArchiveLayout, ArtifactSource, MemorySource};
pub use scheduler::{BatchOutcome, BatchScheduler};

use std::time::Duration;

use thiserror::Error;

use crate::species::SpeciesError;

/// Failures that end or degrade the processing of one identifier.
///
/// None of these escape a unit: each is converted into a [`WarningRecord`]
/// with [`QcError::to_warning`].
#[derive(Error, Debug)]
pub enum QcError {
    /// Expected artifact could not be located
    #[error("missing artifact: {0}")]
    MissingArtifact(String),

    /// JSON, zip or text content does not parse
    #[error("malformed {what}: {reason}")]
    MalformedFormat {
        /// Artifact that failed to parse
        what: &'static str,
        /// Parser message
        reason: String,
    },

    /// Encrypted stats could not be decrypted
    #[error("stats decryption failed: {0}")]
    Decryption(#[from] DecryptionError),

    /// Field present but the metric is undefined
    #[error("{flag} unavailable: {reason}")]
    MetricUnavailable {
        /// Metric that could not be computed
        flag: FlagKey,
        /// Why it could not be computed
        reason: String,
    },

    /// Species screening report unusable
    #[error("species screening report unusable: {0}")]
    SpeciesReport(#[from] SpeciesError),

    /// Unexpected failure inside a worker
    #[error("unexpected failure while processing unit: {0}")]
    Worker(String),

    /// Unit exceeded its time budget
    #[error("unit did not finish within {}s", .0.as_secs_f64())]
    Timeout(Duration),
}

impl QcError {
    /// Flag key the error is reported under.
    pub fn flag(&self) -> FlagKey {
        match self {
            QcError::MissingArtifact(_) => FlagKey::ArtifactMissing,
            QcError::MalformedFormat { .. } => FlagKey::MalformedReport,
            QcError::Decryption(_) => FlagKey::DecryptionFailed,
            QcError::MetricUnavailable { flag, .. } => *flag,
            QcError::SpeciesReport(_) => FlagKey::SpeciesError,
            QcError::Worker(_) => FlagKey::WorkerException,
            QcError::Timeout(_) => FlagKey::Timeout,
        }
    }

    /// Convert into a warning for `identifier`.
    ///
    /// Metric and species errors keep the analyzer's `category`; everything
    /// else is reported under [`Category::Error`].
    pub fn to_warning(&self, identifier: &str, category: Category) -> WarningRecord {
        let (category, kind) = match self {
            QcError::MetricUnavailable { .. } => (category, WarningKind::Unavailable),
            QcError::SpeciesReport(_) => (category, WarningKind::Failure),
            _ => (Category::Error, WarningKind::Failure),
        };
        WarningRecord::new(identifier, category, self.flag(), kind, self.to_string())
    }
}
