//! Dominant-organism call from a FastQ Screen style report.
//!
//! The report is tab separated. A header row names the columns; every row
//! after it describes one reference genome. The genome with the most reads
//! hitting only that genome wins.

use thiserror::Error;

use crate::model::{Category, FlagKey, WarningKind, WarningRecord};
use crate::QcError;

/// Column holding the reference genome name.
pub const GENOME_COLUMN: &str = "Genome";
/// Column holding the count of reads hitting only this genome.
pub const ONE_HIT_COLUMN: &str = "#One_hit_one_genome";
/// Column holding the percentage of reads hitting only this genome.
pub const ONE_HIT_PERCENT_COLUMN: &str = "%One_hit_one_genome";

const HUMAN: &str = "Human";

/// Reasons a species report cannot be interpreted.
#[derive(Debug, Error, PartialEq)]
pub enum SpeciesError {
    /// Header row lacks required columns.
    #[error("required columns not found: {}", .0.join(", "))]
    MissingColumns(Vec<&'static str>),

    /// No data row could be parsed.
    #[error("no genome rows with hit counts")]
    NoGenomeRows,

    /// Report is not UTF-8 text.
    #[error("report is not UTF-8 text")]
    NotText,
}

/// Winning row of a species report.
#[derive(Debug, Clone, PartialEq)]
pub struct GenomeHit {
    /// Reference genome name.
    pub genome: String,
    /// Reads hitting only this genome.
    pub one_hit_reads: u64,
    /// Percentage of reads hitting only this genome.
    pub one_hit_percent: f64,
}

/// Classifier settings.
#[derive(Debug, Clone)]
pub struct SpeciesClassifier {
    warn_missing: bool,
    min_one_hit_percent: f64,
}

impl SpeciesClassifier {
    /// Create a classifier.
    pub fn new(warn_missing: bool, min_one_hit_percent: f64) -> Self {
        Self {
            warn_missing,
            min_one_hit_percent,
        }
    }

    /// Row with the highest one-hit read count; ties keep the first row seen.
    pub fn dominant(&self, text: &str) -> Result<GenomeHit, SpeciesError> {
        let mut lines = text.lines();

        let header = lines
            .by_ref()
            .map(|line| line.trim_end().split('\t').collect::<Vec<_>>())
            .find(|cells| cells.contains(&GENOME_COLUMN));
        let header = match header {
            Some(header) => header,
            None => {
                return Err(SpeciesError::MissingColumns(vec![
                    GENOME_COLUMN,
                    ONE_HIT_COLUMN,
                    ONE_HIT_PERCENT_COLUMN,
                ]))
            }
        };

        let column = |name: &str| header.iter().position(|cell| *cell == name);
        let (genome_idx, hit_idx, percent_idx) = match (
            column(GENOME_COLUMN),
            column(ONE_HIT_COLUMN),
            column(ONE_HIT_PERCENT_COLUMN),
        ) {
            (Some(g), Some(h), Some(p)) => (g, h, p),
            (g, h, p) => {
                let missing = [
                    (g, GENOME_COLUMN),
                    (h, ONE_HIT_COLUMN),
                    (p, ONE_HIT_PERCENT_COLUMN),
                ]
                .into_iter()
                .filter_map(|(idx, name)| idx.is_none().then_some(name))
                .collect();
                return Err(SpeciesError::MissingColumns(missing));
            }
        };
        let widest = genome_idx.max(hit_idx).max(percent_idx);

        let mut best: Option<GenomeHit> = None;
        for line in lines {
            let cells: Vec<&str> = line.trim_end().split('\t').collect();
            if cells.len() <= widest {
                continue;
            }
            let (Ok(reads), Ok(percent)) = (
                cells[hit_idx].trim().parse::<u64>(),
                cells[percent_idx].trim().parse::<f64>(),
            ) else {
                continue;
            };
            if best.as_ref().map_or(true, |hit| reads > hit.one_hit_reads) {
                best = Some(GenomeHit {
                    genome: cells[genome_idx].trim().to_string(),
                    one_hit_reads: reads,
                    one_hit_percent: percent,
                });
            }
        }
        best.ok_or(SpeciesError::NoGenomeRows)
    }

    /// Warning raised for the report, if any.
    pub fn evaluate(&self, identifier: &str, report: Option<&[u8]>) -> Option<WarningRecord> {
        let warning = |flag, kind, message: String| {
            Some(WarningRecord::new(
                identifier,
                Category::Fastq,
                flag,
                kind,
                message,
            ))
        };

        let Some(bytes) = report else {
            return if self.warn_missing {
                warning(
                    FlagKey::SpeciesFileMissing,
                    WarningKind::Missing,
                    "species screening report not found".to_string(),
                )
            } else {
                None
            };
        };

        let hit = std::str::from_utf8(bytes)
            .map_err(|_| SpeciesError::NotText)
            .and_then(|text| self.dominant(text));

        match hit {
            Err(err) => Some(QcError::from(err).to_warning(identifier, Category::Fastq)),
            Ok(hit) if hit.genome != HUMAN => warning(
                FlagKey::SpNotHuman,
                WarningKind::Threshold,
                format!(
                    "most reads mapped to {} ({} reads)",
                    hit.genome, hit.one_hit_reads
                ),
            ),
            Ok(hit) if hit.one_hit_percent < self.min_one_hit_percent => warning(
                FlagKey::SpeciesUnknown,
                WarningKind::Threshold,
                format!(
                    "species is unknown ({:.2}% reads mapped to Human)",
                    hit.one_hit_percent
                ),
            ),
            Ok(_) => None,
        }
    }
}
