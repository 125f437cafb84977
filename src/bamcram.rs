//! Alignment-quality metrics from a BAM/CRAM JSON summary, optionally
//! enriched with GC content from the encrypted `samtools stats` output.

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::Thresholds;
use crate::crypto::decrypt_stats;
use crate::model::{Category, FlagKey, UnitReport, WarningKind};
use crate::stats::GcHistogram;
use crate::QcError;

/// Highest mapping quality counted as low.
pub const LOW_MAPQ_MAX: f64 = 29.0;

const CATEGORY: Category = Category::BamCram;

/// BAM/CRAM summary analyzer.
#[derive(Debug, Clone)]
pub struct BamCramAnalyzer<'a> {
    thresholds: &'a Thresholds,
    include_crypt: bool,
}

impl<'a> BamCramAnalyzer<'a> {
    /// Create an analyzer; `include_crypt` enables the stats GC metric.
    pub fn new(thresholds: &'a Thresholds, include_crypt: bool) -> Self {
        Self {
            thresholds,
            include_crypt,
        }
    }

    /// Extract every metric the summary and stats provide.
    pub fn analyze(
        &self,
        summary: &Value,
        stats_cipher: Option<&[u8]>,
        cipher_key: Option<&[u8]>,
        report: &mut UnitReport,
    ) {
        self.analyze_summary(summary, report);
        if self.include_crypt {
            self.analyze_stats(stats_cipher, cipher_key, report);
        }
    }

    /// Metrics taken from the JSON summary alone.
    pub fn analyze_summary(&self, summary: &Value, report: &mut UnitReport) {
        if let Some(total) = summary.get("TotalReads").and_then(Value::as_f64) {
            report.record(self.thresholds, CATEGORY, FlagKey::TotalReads, total);
        }
        if let Some(insert) = summary.get("InsertSize").and_then(Value::as_f64) {
            report.record(self.thresholds, CATEGORY, FlagKey::InsertSize, insert);
        }

        let data = summary.get("Data");
        let field = |name: &str| data.and_then(|d| d.get(name));

        match field("MappedReads").map(first_number) {
            Some(Some(ratio)) => {
                report.record(self.thresholds, CATEGORY, FlagKey::Unaligned, 100.0 - ratio * 100.0);
            }
            found => missing(report, FlagKey::Unaligned, "MappedReads", found.is_some()),
        }

        match field("MappingQualityDistribution").map(low_mapq_percentage) {
            Some(Some(low)) => {
                report.record(self.thresholds, CATEGORY, FlagKey::Mapq, low);
            }
            found => missing(
                report,
                FlagKey::Mapq,
                "MappingQualityDistribution",
                found.is_some(),
            ),
        }

        match field("Duplicates").map(first_number) {
            Some(Some(ratio)) => {
                report.record(self.thresholds, CATEGORY, FlagKey::DuplicateReads, ratio * 100.0);
            }
            found => missing(report, FlagKey::DuplicateReads, "Duplicates", found.is_some()),
        }
    }

    /// GC content from the encrypted stats; failures never abort the unit.
    pub fn analyze_stats(
        &self,
        stats_cipher: Option<&[u8]>,
        cipher_key: Option<&[u8]>,
        report: &mut UnitReport,
    ) {
        let (cipher, key) = match (stats_cipher, cipher_key) {
            (Some(cipher), Some(key)) => (cipher, key),
            (None, _) => {
                report.warn(
                    CATEGORY,
                    FlagKey::StatsMissing,
                    WarningKind::Missing,
                    "stats.txt.openssl.gz not found",
                );
                return;
            }
            (Some(_), None) => {
                report.warn(
                    CATEGORY,
                    FlagKey::KeyMissing,
                    WarningKind::Missing,
                    "encryption key file not found",
                );
                return;
            }
        };

        let text = match decrypt_stats(cipher, key) {
            Ok(text) => text,
            Err(err) => {
                warn!(identifier = %report.identifier, error = %err, "stats decryption failed");
                report.push_error(&QcError::Decryption(err), CATEGORY);
                return;
            }
        };

        let histogram = GcHistogram::from_stats_text(&text);
        debug!(
            identifier = %report.identifier,
            lines = histogram.lines,
            total = histogram.total_count,
            "gc histogram"
        );
        match histogram.mean() {
            Some(mean) => {
                report.record(self.thresholds, CATEGORY, FlagKey::GcContent, mean);
            }
            None => report.push_error(
                &QcError::MetricUnavailable {
                    flag: FlagKey::GcContent,
                    reason: "total base count is zero".to_string(),
                },
                CATEGORY,
            ),
        }
    }
}

fn missing(report: &mut UnitReport, flag: FlagKey, field: &str, present: bool) {
    let message = if present {
        format!("'{field}' has no usable value in QC report")
    } else {
        format!("'{field}' not found in QC report")
    };
    report.warn(CATEGORY, flag, WarningKind::Missing, message);
}

fn first_number(value: &Value) -> Option<f64> {
    value.as_array()?.first()?.as_f64()
}

/// `100 * Σcount(q ≤ 29) / Σcount`, or 0 when the distribution is empty.
fn low_mapq_percentage(value: &Value) -> Option<f64> {
    let mut total = 0.0;
    let mut low = 0.0;
    for entry in value.as_array()? {
        let pair = entry.as_array()?;
        let (quality, count) = match pair.as_slice() {
            [quality, count] => (quality.as_f64()?, count.as_f64()?),
            _ => return None,
        };
        total += count;
        if quality <= LOW_MAPQ_MAX {
            low += count;
        }
    }
    Some(if total > 0.0 { low / total * 100.0 } else { 0.0 })
}
