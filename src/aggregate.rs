//! Run-level aggregation of unit reports.
//!
//! Counts are per identifier, not per occurrence: a unit raising the same
//! `(category, flag)` twice still contributes one. Folding is commutative
//! and associative, so worker completion order never changes the result.

use std::collections::{BTreeMap, BTreeSet};

use crate::model::{ArtifactKind, Category, FlagKey, UnitReport};

/// Counts accumulated over a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Identifiers processed.
    pub processed: usize,
    /// Identifiers per artifact kind.
    pub per_kind: BTreeMap<ArtifactKind, usize>,
    /// Identifiers with at least one warning.
    pub with_warnings: usize,
    /// Identifiers without a usable QC artifact.
    pub no_qc: usize,
    /// Identifiers with a usable QC artifact and at least one warning.
    pub with_warnings_and_qc: usize,
    /// Identifiers that raised each `(category, flag)`.
    pub flag_counts: BTreeMap<(Category, FlagKey), usize>,
}

impl RunSummary {
    /// Identifiers that raised `flag` in `category`.
    pub fn count(&self, category: Category, flag: FlagKey) -> usize {
        self.flag_counts.get(&(category, flag)).copied().unwrap_or(0)
    }

    /// Identifiers classified as `kind`.
    pub fn kind_count(&self, kind: ArtifactKind) -> usize {
        self.per_kind.get(&kind).copied().unwrap_or(0)
    }

    /// Identifiers with a usable QC artifact.
    pub fn with_qc(&self) -> usize {
        self.processed - self.no_qc
    }

    /// Share of identifiers without usable QC, in percent.
    pub fn missing_qc_percent(&self) -> f64 {
        percent(self.no_qc, self.processed)
    }

    /// Share of identifiers with usable QC that raised a warning, in percent.
    pub fn warning_percent(&self) -> f64 {
        percent(self.with_warnings_and_qc, self.with_qc())
    }

    /// Counts of one category, in flag order.
    pub fn category_counts(&self, category: Category) -> impl Iterator<Item = (FlagKey, usize)> + '_ {
        self.flag_counts
            .iter()
            .filter(move |((c, _), _)| *c == category)
            .map(|((_, flag), count)| (*flag, *count))
    }

    /// Add another summary's counts to this one.
    pub fn merge(&mut self, other: &RunSummary) {
        self.processed += other.processed;
        self.with_warnings += other.with_warnings;
        self.no_qc += other.no_qc;
        self.with_warnings_and_qc += other.with_warnings_and_qc;
        for (kind, count) in &other.per_kind {
            *self.per_kind.entry(*kind).or_insert(0) += count;
        }
        for (key, count) in &other.flag_counts {
            *self.flag_counts.entry(*key).or_insert(0) += count;
        }
    }
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// Single-writer fold of unit reports into a [`RunSummary`].
#[derive(Debug, Clone, Default)]
pub struct AggregationEngine {
    summary: RunSummary,
}

impl AggregationEngine {
    /// Start with empty counts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a whole stream of reports.
    pub fn fold<'a>(reports: impl IntoIterator<Item = &'a UnitReport>) -> RunSummary {
        let mut engine = Self::new();
        for report in reports {
            engine.absorb(report);
        }
        engine.into_summary()
    }

    /// Count one completed unit.
    pub fn absorb(&mut self, report: &UnitReport) {
        let summary = &mut self.summary;
        summary.processed += 1;
        *summary.per_kind.entry(report.kind).or_insert(0) += 1;

        let usable = report.has_usable_qc();
        if !usable {
            summary.no_qc += 1;
        }
        if report.has_warnings() {
            summary.with_warnings += 1;
            if usable {
                summary.with_warnings_and_qc += 1;
            }
        }

        let distinct: BTreeSet<(Category, FlagKey)> =
            report.warnings.iter().map(|w| (w.category, w.flag)).collect();
        for key in distinct {
            *summary.flag_counts.entry(key).or_insert(0) += 1;
        }
    }

    /// Combine with a partial fold from elsewhere.
    pub fn merge(&mut self, other: AggregationEngine) {
        self.summary.merge(&other.summary);
    }

    /// Counts so far.
    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    /// Finish and return the counts.
    pub fn into_summary(self) -> RunSummary {
        self.summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::WarningKind;

    fn unit(id: &str, kind: ArtifactKind, flags: &[(Category, FlagKey)]) -> UnitReport {
        let mut report = UnitReport::new(id, kind);
        for (category, flag) in flags {
            report.warn(*category, *flag, WarningKind::Threshold, "x");
        }
        report
    }

    #[test]
    fn repeated_flag_counts_once_per_identifier() {
        let report = unit(
            "EGAF1",
            ArtifactKind::Fastq,
            &[
                (Category::Fastq, FlagKey::GcContent),
                (Category::Fastq, FlagKey::GcContent),
            ],
        );
        let summary = AggregationEngine::fold([&report]);
        assert_eq!(summary.count(Category::Fastq, FlagKey::GcContent), 1);
        assert_eq!(summary.with_warnings, 1);
        assert_eq!(summary.with_warnings_and_qc, 1);
    }

    #[test]
    fn no_qc_units_are_counted_apart() {
        let mut missing = UnitReport::new("EGAF1", ArtifactKind::Unknown);
        missing.fail(FlagKey::NoQc, "no valid QC report found");
        let clean = unit("EGAF2", ArtifactKind::BamCram, &[]);
        let summary = AggregationEngine::fold([&missing, &clean]);
        assert_eq!(summary.processed, 2);
        assert_eq!(summary.no_qc, 1);
        assert_eq!(summary.with_qc(), 1);
        assert_eq!(summary.with_warnings, 1);
        assert_eq!(summary.with_warnings_and_qc, 0);
        assert_eq!(summary.kind_count(ArtifactKind::Unknown), 1);
        assert_eq!(summary.missing_qc_percent(), 50.0);
        assert_eq!(summary.warning_percent(), 0.0);
    }

    #[test]
    fn archive_without_report_text_counts_as_no_qc() {
        let mut empty_archive = UnitReport::new("EGAF1", ArtifactKind::Fastq);
        empty_archive.fail(FlagKey::FastqcDataMissing, "fastqc_data.txt not found in FastQC archive");
        let flagged = unit("EGAF2", ArtifactKind::Fastq, &[(Category::Fastq, FlagKey::GcContent)]);

        let summary = AggregationEngine::fold([&empty_archive, &flagged]);
        assert_eq!(summary.no_qc, 1);
        assert_eq!(summary.with_qc(), 1);
        assert_eq!(summary.with_warnings_and_qc, 1);
        assert_eq!(summary.warning_percent(), 100.0);
    }

    #[test]
    fn merge_matches_single_fold() {
        let a = unit("A", ArtifactKind::Vcf, &[(Category::Vcf, FlagKey::AvgQual)]);
        let b = unit("B", ArtifactKind::Vcf, &[(Category::Vcf, FlagKey::AvgQual)]);

        let mut left = AggregationEngine::new();
        left.absorb(&a);
        let mut right = AggregationEngine::new();
        right.absorb(&b);
        left.merge(right);

        assert_eq!(left.into_summary(), AggregationEngine::fold([&b, &a]));
    }
}
