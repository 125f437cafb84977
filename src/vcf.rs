//! Variant-calling metrics from a VCF JSON summary.

use serde_json::Value;

use crate::config::Thresholds;
use crate::model::{Category, FlagKey, UnitReport, WarningKind};

/// Key whose presence marks a summary as VCF.
pub const VERSION_MARKER: &str = "VCFVersion";

const CATEGORY: Category = Category::Vcf;

/// VCF summary analyzer.
#[derive(Debug, Clone)]
pub struct VcfAnalyzer<'a> {
    thresholds: &'a Thresholds,
}

impl<'a> VcfAnalyzer<'a> {
    /// Create an analyzer.
    pub fn new(thresholds: &'a Thresholds) -> Self {
        Self { thresholds }
    }

    /// Extract `tstv_ratio` and `avg_qual`.
    pub fn analyze(&self, summary: &Value, report: &mut UnitReport) {
        for (field, flag) in [("TsTvRatio", FlagKey::TsTvRatio), ("AvgQuality", FlagKey::AvgQual)] {
            match lookup(summary, field) {
                Some(value) => {
                    report.record(self.thresholds, CATEGORY, flag, value);
                }
                None => report.warn(CATEGORY, flag, WarningKind::Missing, format!("{field} missing")),
            }
        }
    }
}

/// Numeric field at the top level, falling back to the `Data` object.
fn lookup(summary: &Value, field: &str) -> Option<f64> {
    summary
        .get(field)
        .or_else(|| summary.get("Data").and_then(|data| data.get(field)))
        .and_then(Value::as_f64)
}
