//! Artifact classification and single-unit analysis.

use std::io::Read;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use flate2::read::MultiGzDecoder;
use serde_json::Value;
use tracing::{debug, warn};

use crate::bamcram::BamCramAnalyzer;
use crate::config::QcConfig;
use crate::fastqc::FastqAnalyzer;
use crate::model::{ArtifactKind, ArtifactSet, FlagKey, UnitReport};
use crate::resolve::ArtifactSource;
use crate::vcf::{VcfAnalyzer, VERSION_MARKER};
use crate::QcError;

/// Outcome of format dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    /// Parsed summary without the VCF version marker.
    BamCram(Value),
    /// Parsed summary carrying the VCF version marker.
    Vcf(Value),
    /// No summary, but a FastQC archive.
    Fastq,
    /// Neither a summary nor a FastQC archive.
    NoQc,
}

impl Classification {
    /// Artifact kind reported for this classification.
    pub fn kind(&self) -> ArtifactKind {
        match self {
            Classification::BamCram(_) => ArtifactKind::BamCram,
            Classification::Vcf(_) => ArtifactKind::Vcf,
            Classification::Fastq => ArtifactKind::Fastq,
            Classification::NoQc => ArtifactKind::Unknown,
        }
    }
}

/// Pick the analyzer for an artifact set. A summary always wins over a
/// FastQC archive, and an unparsable summary never falls back to one.
pub fn classify(artifacts: &ArtifactSet) -> Result<Classification, QcError> {
    if let Some(compressed) = &artifacts.summary_json {
        let summary = parse_summary(compressed)?;
        return Ok(if summary.get(VERSION_MARKER).is_some() {
            Classification::Vcf(summary)
        } else {
            Classification::BamCram(summary)
        });
    }
    if artifacts.fastq_archive.is_some() {
        return Ok(Classification::Fastq);
    }
    Ok(Classification::NoQc)
}

/// Decompress and parse a gzip-compressed JSON summary object.
pub fn parse_summary(compressed: &[u8]) -> Result<Value, QcError> {
    let malformed = |reason: String| QcError::MalformedFormat {
        what: "QC summary",
        reason,
    };

    let mut text = Vec::new();
    MultiGzDecoder::new(compressed)
        .read_to_end(&mut text)
        .map_err(|err| malformed(format!("gzip: {err}")))?;
    let summary: Value =
        serde_json::from_slice(&text).map_err(|err| malformed(format!("json: {err}")))?;
    if !summary.is_object() {
        return Err(malformed("top-level value is not an object".to_string()));
    }
    Ok(summary)
}

/// Runs one identifier through dispatch and its analyzer.
///
/// The configuration is set once and shared read-only between workers.
#[derive(Debug, Clone)]
pub struct QcEngine {
    config: Arc<QcConfig>,
}

impl QcEngine {
    /// Create an engine.
    pub fn new(config: QcConfig) -> Self {
        Self::from_shared(Arc::new(config))
    }

    /// Create an engine over an already shared configuration.
    pub fn from_shared(config: Arc<QcConfig>) -> Self {
        Self { config }
    }

    /// Active configuration.
    pub fn config(&self) -> &QcConfig {
        &self.config
    }

    /// Resolve and analyze one identifier. Never panics and never fails.
    pub fn process(&self, source: &dyn ArtifactSource, identifier: &str) -> UnitReport {
        isolate(identifier, || match source.resolve(identifier) {
            Ok(artifacts) => self.analyze_unchecked(identifier, &artifacts),
            Err(err) => UnitReport::failed(identifier, &err),
        })
    }

    /// Analyze one resolved artifact set. Never panics and never fails.
    pub fn analyze(&self, identifier: &str, artifacts: &ArtifactSet) -> UnitReport {
        isolate(identifier, || self.analyze_unchecked(identifier, artifacts))
    }

    fn analyze_unchecked(&self, identifier: &str, artifacts: &ArtifactSet) -> UnitReport {
        let classification = match classify(artifacts) {
            Ok(classification) => classification,
            Err(err) => {
                warn!(identifier, error = %err, "unusable QC summary");
                return UnitReport::failed(identifier, &err);
            }
        };
        let kind = classification.kind();
        debug!(identifier, ?kind, "classified");

        let thresholds = &self.config.thresholds;
        let mut report = UnitReport::new(identifier, kind);
        match &classification {
            Classification::BamCram(summary) => {
                BamCramAnalyzer::new(thresholds, self.config.include_crypt).analyze(
                    summary,
                    artifacts.stats_cipher.as_deref(),
                    artifacts.cipher_key.as_deref(),
                    &mut report,
                );
            }
            Classification::Vcf(summary) => VcfAnalyzer::new(thresholds).analyze(summary, &mut report),
            Classification::Fastq => {
                if let Some(archive) = &artifacts.fastq_archive {
                    FastqAnalyzer::new(thresholds, self.config.warn_missing_species).analyze(
                        archive,
                        artifacts.species_report.as_deref(),
                        &mut report,
                    );
                }
            }
            Classification::NoQc => report.fail(FlagKey::NoQc, "no valid QC report found"),
        }
        debug!(
            identifier,
            metrics = report.metrics.len(),
            warnings = report.warnings.len(),
            "analyzed"
        );
        report
    }
}

/// Run `unit`, turning a panic into a `worker_exception` report.
pub(crate) fn isolate(identifier: &str, unit: impl FnOnce() -> UnitReport) -> UnitReport {
    match catch_unwind(AssertUnwindSafe(unit)) {
        Ok(report) => report,
        Err(payload) => {
            let message = if let Some(s) = payload.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic".to_string()
            };
            warn!(identifier, panic = %message, "unit panicked");
            UnitReport::failed(identifier, &QcError::Worker(message))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Category;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn gz(text: &str) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(text.as_bytes()).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn summary_takes_precedence_over_archive() {
        let artifacts = ArtifactSet {
            summary_json: Some(gz(r#"{"Data": {}}"#)),
            fastq_archive: Some(b"zip".to_vec()),
            ..ArtifactSet::default()
        };
        assert_eq!(classify(&artifacts).unwrap().kind(), ArtifactKind::BamCram);
    }

    #[test]
    fn version_marker_selects_vcf() {
        let artifacts = ArtifactSet {
            summary_json: Some(gz(r#"{"VCFVersion": "4.2"}"#)),
            ..ArtifactSet::default()
        };
        assert_eq!(classify(&artifacts).unwrap().kind(), ArtifactKind::Vcf);
    }

    #[test]
    fn malformed_summary_stops_the_unit() {
        let artifacts = ArtifactSet {
            summary_json: Some(gz("{not json")),
            fastq_archive: Some(b"zip".to_vec()),
            ..ArtifactSet::default()
        };
        let report = QcEngine::new(QcConfig::default()).analyze("EGAF1", &artifacts);
        assert_eq!(report.kind, ArtifactKind::Unknown);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].category, Category::Error);
        assert_eq!(report.warnings[0].flag, FlagKey::MalformedReport);
        assert!(!report.has_usable_qc());
    }

    #[test]
    fn empty_set_is_no_qc() {
        let report = QcEngine::new(QcConfig::default()).analyze("EGAF1", &ArtifactSet::default());
        assert_eq!(report.warnings[0].flag, FlagKey::NoQc);
        assert_eq!(report.warnings[0].category, Category::Error);
    }

    #[test]
    fn panics_become_worker_exceptions() {
        let report = isolate("EGAF1", || panic!("boom"));
        assert_eq!(report.warnings[0].flag, FlagKey::WorkerException);
        assert!(report.warnings[0].message.contains("boom"));
    }
}
