//! Records exchanged between the analyzers, the aggregation step and the
//! output writers.
//!
//! Every value here is created and consumed while a single identifier is
//! being processed; only the [`crate::aggregate::RunSummary`] outlives a unit.

use std::fmt;

use crate::config::Thresholds;
use crate::QcError;

/// Analyzer family a metric or warning belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    /// Aligned-read JSON summary (BAM/CRAM).
    BamCram,
    /// FastQC report bundled in a zip archive.
    Fastq,
    /// Variant-call JSON summary.
    Vcf,
    /// Structural failures unrelated to thresholds.
    Error,
}

impl Category {
    /// Stable lowercase name used in CSV output and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::BamCram => "bamcram",
            Category::Fastq => "fastq",
            Category::Vcf => "vcf",
            Category::Error => "error",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Artifact type chosen by the dispatcher for one identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ArtifactKind {
    /// JSON summary without a version marker.
    BamCram,
    /// FastQC archive only.
    Fastq,
    /// JSON summary carrying the VCF version marker.
    Vcf,
    /// Nothing usable was found, or the summary could not be parsed.
    Unknown,
}

impl ArtifactKind {
    /// Category analyzers of this kind report under.
    pub fn category(&self) -> Category {
        match self {
            ArtifactKind::BamCram => Category::BamCram,
            ArtifactKind::Fastq => Category::Fastq,
            ArtifactKind::Vcf => Category::Vcf,
            ArtifactKind::Unknown => Category::Error,
        }
    }

    /// Label used in the per-identifier diagnostic header.
    pub fn label(&self) -> &'static str {
        match self {
            ArtifactKind::BamCram => "BAM/CRAM",
            ArtifactKind::Fastq => "FASTQ",
            ArtifactKind::Vcf => "VCF",
            ArtifactKind::Unknown => "unknown",
        }
    }
}

/// Name of what was measured or checked. Not a verdict on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FlagKey {
    /// Percentage of unaligned reads.
    Unaligned,
    /// Percentage of reads with mapping quality <= 29.
    Mapq,
    /// Percentage of duplicate reads.
    DuplicateReads,
    /// GC content (weighted mean for BAM/CRAM, in-range share for FASTQ).
    GcContent,
    /// Percentage of reads with mean quality below 20.
    LowQuality,
    /// Transition/transversion ratio.
    TsTvRatio,
    /// Average variant quality.
    AvgQual,
    /// Mean insert size (informational).
    InsertSize,
    /// Total reads reported by the summary (informational).
    TotalReads,
    /// `%GC` from FastQC basic statistics (informational).
    BasicGc,
    /// `Total Sequences` from FastQC basic statistics (informational).
    TotalSequences,
    /// Dominant screened genome is not human.
    SpNotHuman,
    /// Human dominates but with too few one-hit reads.
    SpeciesUnknown,
    /// Species-screening report is absent.
    SpeciesFileMissing,
    /// Species-screening report could not be interpreted.
    SpeciesError,
    /// Encrypted stats file is absent.
    StatsMissing,
    /// Password file for the encrypted stats is absent.
    KeyMissing,
    /// Encrypted stats could not be decrypted.
    DecryptionFailed,
    /// FastQC archive lacks its data file.
    FastqcDataMissing,
    /// Summary or report could not be parsed.
    MalformedReport,
    /// No QC artifact at all.
    NoQc,
    /// Identifier could not be resolved to artifacts.
    ArtifactMissing,
    /// Unexpected failure while processing the unit.
    WorkerException,
    /// Unit did not finish within its time budget.
    Timeout,
}

impl FlagKey {
    /// Stable snake_case name used in CSV output and configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            FlagKey::Unaligned => "unaligned",
            FlagKey::Mapq => "mapq",
            FlagKey::DuplicateReads => "duplicate_reads",
            FlagKey::GcContent => "gc_content",
            FlagKey::LowQuality => "low_quality",
            FlagKey::TsTvRatio => "tstv_ratio",
            FlagKey::AvgQual => "avg_qual",
            FlagKey::InsertSize => "insert_size",
            FlagKey::TotalReads => "total_reads",
            FlagKey::BasicGc => "basic_gc",
            FlagKey::TotalSequences => "total_sequences",
            FlagKey::SpNotHuman => "sp_not_human",
            FlagKey::SpeciesUnknown => "species_unknown",
            FlagKey::SpeciesFileMissing => "species_file_missing",
            FlagKey::SpeciesError => "species_error",
            FlagKey::StatsMissing => "stats_missing",
            FlagKey::KeyMissing => "key_missing",
            FlagKey::DecryptionFailed => "decryption_failed",
            FlagKey::FastqcDataMissing => "fastqc_data_missing",
            FlagKey::MalformedReport => "malformed_report",
            FlagKey::NoQc => "no_qc",
            FlagKey::ArtifactMissing => "artifact_missing",
            FlagKey::WorkerException => "worker_exception",
            FlagKey::Timeout => "timeout",
        }
    }

    /// Phrase naming the measured quantity in warning messages.
    pub fn label(&self) -> &'static str {
        match self {
            FlagKey::Unaligned => "reads unaligned",
            FlagKey::Mapq => "map quality <30",
            FlagKey::DuplicateReads => "duplicate reads",
            FlagKey::GcContent => "GC content",
            FlagKey::LowQuality => "reads with quality score <20",
            FlagKey::TsTvRatio => "Ts/Tv ratio",
            FlagKey::AvgQual => "average variant quality",
            FlagKey::InsertSize => "insert size",
            FlagKey::TotalReads => "total reads",
            FlagKey::BasicGc => "%GC",
            FlagKey::TotalSequences => "total sequences",
            other => other.as_str(),
        }
    }

    fn is_percentage(&self) -> bool {
        matches!(
            self,
            FlagKey::Unaligned
                | FlagKey::Mapq
                | FlagKey::DuplicateReads
                | FlagKey::GcContent
                | FlagKey::LowQuality
                | FlagKey::BasicGc
        )
    }

    /// Value rendered with two decimals and a `%` suffix for percentages.
    pub fn format_value(&self, value: f64) -> String {
        if self.is_percentage() {
            format!("{value:.2}%")
        } else {
            format!("{value:.2}")
        }
    }
}

impl fmt::Display for FlagKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a warning was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WarningKind {
    /// A metric crossed its configured threshold.
    Threshold,
    /// The field the metric is computed from is absent.
    Missing,
    /// The field is present but the metric is undefined (e.g. zero total).
    Unavailable,
    /// The unit could not be processed as expected.
    Failure,
}

/// A measured value.
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    /// Analyzer family.
    pub category: Category,
    /// What was measured.
    pub flag: FlagKey,
    /// Measured value.
    pub value: f64,
}

impl Metric {
    /// Construct a new metric.
    pub fn new(category: Category, flag: FlagKey, value: f64) -> Self {
        Self {
            category,
            flag,
            value,
        }
    }
}

/// A failed threshold or structural check for one identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct WarningRecord {
    /// Identifier the warning belongs to.
    pub identifier: String,
    /// Analyzer family, or [`Category::Error`] for structural failures.
    pub category: Category,
    /// Check that failed.
    pub flag: FlagKey,
    /// Reason the check failed.
    pub kind: WarningKind,
    /// Human-readable explanation.
    pub message: String,
}

impl WarningRecord {
    /// Construct a new warning record.
    pub fn new(
        identifier: impl Into<String>,
        category: Category,
        flag: FlagKey,
        kind: WarningKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            category,
            flag,
            kind,
            message: message.into(),
        }
    }

    /// Whether this is a structural error rather than a QC finding.
    pub fn is_error(&self) -> bool {
        self.category == Category::Error
    }
}

/// Raw artifacts resolved for one identifier.
#[derive(Debug, Clone, Default)]
pub struct ArtifactSet {
    /// Gzip-compressed JSON summary.
    pub summary_json: Option<Vec<u8>>,
    /// Zip archive holding `stdin_fastqc/fastqc_data.txt`.
    pub fastq_archive: Option<Vec<u8>>,
    /// Gzip + base64 + salted AES-256-CBC encrypted stats.
    pub stats_cipher: Option<Vec<u8>>,
    /// Password bytes for `stats_cipher`.
    pub cipher_key: Option<Vec<u8>>,
    /// Tab-separated species-screening report.
    pub species_report: Option<Vec<u8>>,
}

impl ArtifactSet {
    /// Whether no artifact at all was found.
    pub fn is_empty(&self) -> bool {
        self.summary_json.is_none()
            && self.fastq_archive.is_none()
            && self.stats_cipher.is_none()
            && self.cipher_key.is_none()
            && self.species_report.is_none()
    }
}

/// Everything produced for one identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitReport {
    /// Identifier the report belongs to.
    pub identifier: String,
    /// Artifact type chosen by the dispatcher.
    pub kind: ArtifactKind,
    /// Extracted metrics, in extraction order.
    pub metrics: Vec<Metric>,
    /// Raised warnings, in extraction order.
    pub warnings: Vec<WarningRecord>,
}

impl UnitReport {
    /// Start an empty report.
    pub fn new(identifier: impl Into<String>, kind: ArtifactKind) -> Self {
        Self {
            identifier: identifier.into(),
            kind,
            metrics: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Report of a unit that failed before any analyzer ran.
    pub fn failed(identifier: impl Into<String>, err: &QcError) -> Self {
        let mut report = Self::new(identifier, ArtifactKind::Unknown);
        report.push_error(err, Category::Error);
        report
    }

    /// Store a metric and raise a threshold warning if its rule is violated.
    ///
    /// Returns whether a warning was raised.
    pub fn record(
        &mut self,
        thresholds: &Thresholds,
        category: Category,
        flag: FlagKey,
        value: f64,
    ) -> bool {
        self.metrics.push(Metric::new(category, flag, value));
        match thresholds.violated(flag, value) {
            Some(rule) => {
                let message = format!(
                    "{} ({}) {}",
                    flag.label(),
                    flag.format_value(value),
                    rule.describe()
                );
                self.warn(category, flag, WarningKind::Threshold, message);
                true
            }
            None => false,
        }
    }

    /// Add a warning for this report's identifier.
    pub fn warn(
        &mut self,
        category: Category,
        flag: FlagKey,
        kind: WarningKind,
        message: impl Into<String>,
    ) {
        self.warnings.push(WarningRecord::new(
            self.identifier.clone(),
            category,
            flag,
            kind,
            message,
        ));
    }

    /// Convert `err` into a warning under `category` (see [`QcError::to_warning`]).
    pub fn push_error(&mut self, err: &QcError, category: Category) {
        self.warnings.push(err.to_warning(&self.identifier, category));
    }

    /// Add a structural error for this report's identifier.
    pub fn fail(&mut self, flag: FlagKey, message: impl Into<String>) {
        self.warn(Category::Error, flag, WarningKind::Failure, message);
    }

    /// Whether any warning was raised.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Whether the unit had a QC artifact that could be analyzed to completion.
    pub fn has_usable_qc(&self) -> bool {
        !self.warnings.iter().any(|w| {
            w.category == Category::Error
                && matches!(
                    w.flag,
                    FlagKey::NoQc
                        | FlagKey::MalformedReport
                        | FlagKey::ArtifactMissing
                        | FlagKey::FastqcDataMissing
                        | FlagKey::WorkerException
                        | FlagKey::Timeout
                )
        })
    }

    /// Value of the first metric with the given flag, if extracted.
    pub fn metric(&self, flag: FlagKey) -> Option<f64> {
        self.metrics.iter().find(|m| m.flag == flag).map(|m| m.value)
    }

    /// First warning with the given category and flag.
    pub fn warning(&self, category: Category, flag: FlagKey) -> Option<&WarningRecord> {
        self.warnings
            .iter()
            .find(|w| w.category == category && w.flag == flag)
    }
}
