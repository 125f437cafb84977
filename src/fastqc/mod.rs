//! FastQC report handling.
//!
//! The report is a flat sequence of `>>Name ... >>END_MODULE` sections. The
//! parser makes one forward pass and the analyzer turns the extracted
//! distributions into metrics.

mod analyzer;
mod parser;

pub use analyzer::{
    FastqAnalyzer, FASTQC_DATA_PATH, GC_BAND_MAX, GC_BAND_MIN, LOW_QUALITY_CUTOFF,
};
pub use parser::{BasicStatistics, FastqcParseError, FastqcParser, FastqcReport, ModuleKind};
