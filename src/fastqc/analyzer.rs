use std::io::{Cursor, Read};

use tracing::debug;
use zip::result::ZipError;
use zip::ZipArchive;

use crate::config::Thresholds;
use crate::fastqc::{FastqcParser, FastqcReport};
use crate::model::{Category, FlagKey, UnitReport};
use crate::species::SpeciesClassifier;
use crate::QcError;

/// Location of the report inside the FastQC archive.
pub const FASTQC_DATA_PATH: &str = "stdin_fastqc/fastqc_data.txt";

/// Lowest GC value counted as in range.
pub const GC_BAND_MIN: f64 = 35.0;
/// Highest GC value counted as in range.
pub const GC_BAND_MAX: f64 = 55.0;
/// Mean read quality below which a read counts as low quality.
pub const LOW_QUALITY_CUTOFF: f64 = 20.0;

const CATEGORY: Category = Category::Fastq;

/// FastQC-derived metrics plus the species screen.
#[derive(Debug, Clone)]
pub struct FastqAnalyzer<'a> {
    thresholds: &'a Thresholds,
    species: SpeciesClassifier,
}

impl<'a> FastqAnalyzer<'a> {
    /// Create an analyzer.
    pub fn new(thresholds: &'a Thresholds, warn_missing_species: bool) -> Self {
        Self {
            thresholds,
            species: SpeciesClassifier::new(
                warn_missing_species,
                thresholds.species_min_one_hit_percent,
            ),
        }
    }

    /// Read the archive in memory, scan the report, then screen species.
    pub fn analyze(&self, archive: &[u8], species_report: Option<&[u8]>, report: &mut UnitReport) {
        let text = match read_fastqc_data(archive) {
            Ok(text) => text,
            Err(ZipError::FileNotFound) => {
                report.fail(
                    FlagKey::FastqcDataMissing,
                    format!("{FASTQC_DATA_PATH} not found in FastQC archive"),
                );
                return;
            }
            Err(err) => {
                let err = QcError::MalformedFormat {
                    what: "FastQC archive",
                    reason: err.to_string(),
                };
                report.push_error(&err, CATEGORY);
                return;
            }
        };

        match FastqcParser::parse_str(&text) {
            Ok(fastqc) => self.evaluate(&fastqc, report),
            Err(err) => {
                let err = QcError::MalformedFormat {
                    what: "FastQC report",
                    reason: err.to_string(),
                };
                report.push_error(&err, CATEGORY);
                return;
            }
        }

        if let Some(warning) = self.species.evaluate(&report.identifier, species_report) {
            report.warnings.push(warning);
        }
    }

    /// Derive metrics and warnings from a parsed report.
    pub fn evaluate(&self, fastqc: &FastqcReport, report: &mut UnitReport) {
        if let Some(basic) = &fastqc.basic {
            if let Some(total) = basic.total_sequences {
                report.record(self.thresholds, CATEGORY, FlagKey::TotalSequences, total);
            }
            if let Some(gc) = basic.gc_percent {
                report.record(self.thresholds, CATEGORY, FlagKey::BasicGc, gc);
            }
        }

        match &fastqc.gc_distribution {
            Some(rows) => match share(rows, |gc| (GC_BAND_MIN..=GC_BAND_MAX).contains(&gc)) {
                Some(in_range) => {
                    report.record(self.thresholds, CATEGORY, FlagKey::GcContent, in_range);
                }
                None => report.push_error(
                    &QcError::MetricUnavailable {
                        flag: FlagKey::GcContent,
                        reason: "total GC count is zero".to_string(),
                    },
                    CATEGORY,
                ),
            },
            None => debug!(identifier = %report.identifier, "no per sequence GC content module"),
        }

        match fastqc.dedup_percentage {
            Some(dedup) => {
                report.record(self.thresholds, CATEGORY, FlagKey::DuplicateReads, 100.0 - dedup);
            }
            None => debug!(identifier = %report.identifier, "no total deduplicated percentage"),
        }

        match &fastqc.quality_distribution {
            Some(rows) => match share(rows, |quality| quality < LOW_QUALITY_CUTOFF) {
                Some(low) => {
                    report.record(self.thresholds, CATEGORY, FlagKey::LowQuality, low);
                }
                None => report.push_error(
                    &QcError::MetricUnavailable {
                        flag: FlagKey::LowQuality,
                        reason: "total quality score count is zero".to_string(),
                    },
                    CATEGORY,
                ),
            },
            None => debug!(identifier = %report.identifier, "no per sequence quality module"),
        }
    }
}

/// Percentage of the total count whose key satisfies `selected`.
fn share(rows: &[(f64, f64)], selected: impl Fn(f64) -> bool) -> Option<f64> {
    let total: f64 = rows.iter().map(|(_, count)| count).sum();
    if total <= 0.0 {
        return None;
    }
    let matching: f64 = rows
        .iter()
        .filter(|(key, _)| selected(*key))
        .map(|(_, count)| count)
        .sum();
    Some(matching / total * 100.0)
}

fn read_fastqc_data(archive: &[u8]) -> Result<String, ZipError> {
    let mut zip = ZipArchive::new(Cursor::new(archive))?;
    let mut entry = zip.by_name(FASTQC_DATA_PATH)?;
    let mut text = String::new();
    entry.read_to_string(&mut text)?;
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ArtifactKind, WarningKind};
    use std::io::Write;
    use zip::write::FileOptions;

    fn archive(path: &str, text: &str) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer.start_file(path, FileOptions::default()).unwrap();
        writer.write_all(text.as_bytes()).unwrap();
        writer.finish().unwrap().into_inner()
    }

    fn run(text: &str) -> UnitReport {
        let thresholds = Thresholds::default();
        let analyzer = FastqAnalyzer::new(&thresholds, false);
        let mut report = UnitReport::new("EGAF1", ArtifactKind::Fastq);
        analyzer.analyze(&archive(FASTQC_DATA_PATH, text), None, &mut report);
        report
    }

    #[test]
    fn zero_gc_total_is_structural_not_threshold() {
        let report = run(">>Per sequence GC content\tpass\n#GC Content\tCount\n40\t0.0\n>>END_MODULE\n");
        assert_eq!(report.metric(FlagKey::GcContent), None);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].flag, FlagKey::GcContent);
        assert_eq!(report.warnings[0].kind, WarningKind::Unavailable);
        assert_eq!(report.warnings[0].category, Category::Fastq);
        assert_eq!(report.warnings[0].message, "gc_content unavailable: total GC count is zero");
    }

    #[test]
    fn low_quality_share_uses_strict_cutoff() {
        let report = run(
            ">>Per sequence quality scores\tpass\n#Quality\tCount\n19\t21\n20\t79\n>>END_MODULE\n",
        );
        assert_eq!(report.metric(FlagKey::LowQuality), Some(21.0));
        assert!(report.warning(Category::Fastq, FlagKey::LowQuality).is_some());
    }

    #[test]
    fn missing_data_file_is_reported() {
        let thresholds = Thresholds::default();
        let analyzer = FastqAnalyzer::new(&thresholds, true);
        let mut report = UnitReport::new("EGAF1", ArtifactKind::Fastq);
        analyzer.analyze(&archive("other/fastqc_data.txt", ""), None, &mut report);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].flag, FlagKey::FastqcDataMissing);
    }

    #[test]
    fn corrupt_archive_is_malformed() {
        let thresholds = Thresholds::default();
        let analyzer = FastqAnalyzer::new(&thresholds, true);
        let mut report = UnitReport::new("EGAF1", ArtifactKind::Fastq);
        analyzer.analyze(b"not a zip", None, &mut report);
        assert_eq!(report.warnings[0].flag, FlagKey::MalformedReport);
        assert_eq!(report.warnings[0].category, Category::Error);
        assert!(report.warnings[0].message.starts_with("malformed FastQC archive: "));
    }
}
