use thiserror::Error;

const END_MODULE: &str = ">>END_MODULE";
const DEDUP_ROW: &str = "#Total Deduplicated Percentage";

/// FastQC modules the parser extracts data from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    /// `>>Basic Statistics`
    BasicStatistics,
    /// `>>Per sequence GC content`
    PerSequenceGcContent,
    /// `>>Sequence Duplication Levels`
    SequenceDuplicationLevels,
    /// `>>Per sequence quality scores`
    PerSequenceQualityScores,
}

impl ModuleKind {
    const ALL: [ModuleKind; 4] = [
        ModuleKind::BasicStatistics,
        ModuleKind::PerSequenceGcContent,
        ModuleKind::SequenceDuplicationLevels,
        ModuleKind::PerSequenceQualityScores,
    ];

    /// Module name as written after `>>`.
    pub fn name(&self) -> &'static str {
        match self {
            ModuleKind::BasicStatistics => "Basic Statistics",
            ModuleKind::PerSequenceGcContent => "Per sequence GC content",
            ModuleKind::SequenceDuplicationLevels => "Sequence Duplication Levels",
            ModuleKind::PerSequenceQualityScores => "Per sequence quality scores",
        }
    }

    fn from_marker(marker: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| marker.starts_with(kind.name()))
    }
}

/// Errors raised while scanning a FastQC report.
#[derive(Debug, Error, PartialEq)]
pub enum FastqcParseError {
    /// A two-column data row did not hold numbers.
    #[error("line {line}: non-numeric row in '{module}': {content}")]
    InvalidRow {
        /// 1-based line number.
        line: usize,
        /// Module being read.
        module: &'static str,
        /// Offending line.
        content: String,
    },

    /// A module was not closed by `>>END_MODULE` before the next one or EOF.
    #[error("module '{0}' is not terminated by >>END_MODULE")]
    UnterminatedModule(String),
}

/// `Basic Statistics` rows of interest.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BasicStatistics {
    /// `Total Sequences`
    pub total_sequences: Option<f64>,
    /// `%GC`
    pub gc_percent: Option<f64>,
}

/// Data extracted from one FastQC report.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FastqcReport {
    /// `Basic Statistics`, if the module was present.
    pub basic: Option<BasicStatistics>,
    /// `(gc_value, count)` rows of `Per sequence GC content`.
    pub gc_distribution: Option<Vec<(f64, f64)>>,
    /// `#Total Deduplicated Percentage` of `Sequence Duplication Levels`.
    pub dedup_percentage: Option<f64>,
    /// `(quality, count)` rows of `Per sequence quality scores`.
    pub quality_distribution: Option<Vec<(f64, f64)>>,
}

#[derive(Debug)]
enum ScanState {
    Outside,
    Skipping(String),
    Reading(ModuleKind),
}

/// Single forward pass over FastQC text.
///
/// Lines can be pushed in any chunking; the scanner keeps its position
/// between calls and never looks back. Rows are only consumed strictly
/// between a recognised `>>Name` marker and its `>>END_MODULE`.
#[derive(Debug)]
pub struct FastqcParser {
    state: ScanState,
    line_no: usize,
    report: FastqcReport,
    rows: Vec<(f64, f64)>,
    basic: BasicStatistics,
    dedup: Option<f64>,
}

impl Default for FastqcParser {
    fn default() -> Self {
        Self::new()
    }
}

impl FastqcParser {
    /// Create a scanner positioned before the first line.
    pub fn new() -> Self {
        Self {
            state: ScanState::Outside,
            line_no: 0,
            report: FastqcReport::default(),
            rows: Vec::new(),
            basic: BasicStatistics::default(),
            dedup: None,
        }
    }

    /// Parse a whole report.
    pub fn parse_str(text: &str) -> Result<FastqcReport, FastqcParseError> {
        let mut parser = Self::new();
        for line in text.lines() {
            parser.push_line(line)?;
        }
        parser.finish()
    }

    /// Feed the next line.
    pub fn push_line(&mut self, raw: &str) -> Result<(), FastqcParseError> {
        self.line_no += 1;
        let line = raw.trim_end_matches(['\r', '\n']);

        match std::mem::replace(&mut self.state, ScanState::Outside) {
            ScanState::Outside => {
                if let Some(marker) = line.strip_prefix(">>") {
                    if line.starts_with(END_MODULE) {
                        return Ok(());
                    }
                    self.state = match ModuleKind::from_marker(marker) {
                        Some(kind) => {
                            self.begin(kind);
                            ScanState::Reading(kind)
                        }
                        None => ScanState::Skipping(module_name(marker)),
                    };
                }
            }
            ScanState::Skipping(name) => {
                if line.starts_with(END_MODULE) {
                    return Ok(());
                }
                if line.starts_with(">>") {
                    return Err(FastqcParseError::UnterminatedModule(name));
                }
                self.state = ScanState::Skipping(name);
            }
            ScanState::Reading(kind) => {
                if line.starts_with(END_MODULE) {
                    self.complete(kind);
                    return Ok(());
                }
                if line.starts_with(">>") {
                    return Err(FastqcParseError::UnterminatedModule(kind.name().to_string()));
                }
                self.read_row(kind, line)?;
                self.state = ScanState::Reading(kind);
            }
        }
        Ok(())
    }

    /// Finish the scan and return everything extracted.
    pub fn finish(self) -> Result<FastqcReport, FastqcParseError> {
        match self.state {
            ScanState::Outside => Ok(self.report),
            ScanState::Skipping(name) => Err(FastqcParseError::UnterminatedModule(name)),
            ScanState::Reading(kind) => {
                Err(FastqcParseError::UnterminatedModule(kind.name().to_string()))
            }
        }
    }

    fn begin(&mut self, kind: ModuleKind) {
        self.rows.clear();
        match kind {
            ModuleKind::BasicStatistics => self.basic = BasicStatistics::default(),
            ModuleKind::SequenceDuplicationLevels => self.dedup = None,
            _ => {}
        }
    }

    fn complete(&mut self, kind: ModuleKind) {
        match kind {
            ModuleKind::BasicStatistics => {
                self.report.basic = Some(std::mem::take(&mut self.basic));
            }
            ModuleKind::PerSequenceGcContent => {
                self.report.gc_distribution = Some(std::mem::take(&mut self.rows));
            }
            ModuleKind::SequenceDuplicationLevels => {
                self.report.dedup_percentage = self.dedup.take();
            }
            ModuleKind::PerSequenceQualityScores => {
                self.report.quality_distribution = Some(std::mem::take(&mut self.rows));
            }
        }
    }

    fn read_row(&mut self, kind: ModuleKind, line: &str) -> Result<(), FastqcParseError> {
        let fields: Vec<&str> = line.split('\t').map(str::trim).collect();

        match kind {
            ModuleKind::BasicStatistics => {
                if let [label, value] = fields.as_slice() {
                    match *label {
                        "Total Sequences" => {
                            self.basic.total_sequences = Some(self.number(kind, line, value)?)
                        }
                        "%GC" => self.basic.gc_percent = Some(self.number(kind, line, value)?),
                        _ => {}
                    }
                }
            }
            ModuleKind::SequenceDuplicationLevels => {
                if let [label, value] = fields.as_slice() {
                    if *label == DEDUP_ROW {
                        self.dedup = Some(self.number(kind, line, value)?);
                    }
                }
            }
            ModuleKind::PerSequenceGcContent | ModuleKind::PerSequenceQualityScores => {
                if line.starts_with('#') {
                    return Ok(());
                }
                if let [key, count] = fields.as_slice() {
                    let key = self.number(kind, line, key)?;
                    let count = self.number(kind, line, count)?;
                    self.rows.push((key, count));
                }
            }
        }
        Ok(())
    }

    fn number(&self, kind: ModuleKind, line: &str, field: &str) -> Result<f64, FastqcParseError> {
        field
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .ok_or_else(|| FastqcParseError::InvalidRow {
                line: self.line_no,
                module: kind.name(),
                content: line.to_string(),
            })
    }
}

fn module_name(marker: &str) -> String {
    marker.split('\t').next().unwrap_or(marker).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = "##FastQC\t0.11.9\n\
>>Basic Statistics\tpass\n\
#Measure\tValue\n\
Filename\tstdin\n\
Total Sequences\t1000\n\
%GC\t48\n\
>>END_MODULE\n\
>>Per base sequence quality\tpass\n\
#Base\tMean\tMedian\n\
1\t32.0\t33.0\n\
>>END_MODULE\n\
>>Per sequence quality scores\tpass\n\
#Quality\tCount\n\
12\t100.0\n\
30\t900.0\n\
>>END_MODULE\n\
>>Per sequence GC content\twarn\n\
#GC Content\tCount\n\
30\t400.0\n\
45\t600.0\n\
>>END_MODULE\n\
>>Sequence Duplication Levels\tpass\n\
#Total Deduplicated Percentage\t70.0\n\
#Duplication Level\tPercentage of deduplicated\tPercentage of total\n\
1\t90.0\t70.0\n\
>>END_MODULE\n";

    #[test]
    fn extracts_all_known_modules() {
        let report = FastqcParser::parse_str(REPORT).expect("parses");
        let basic = report.basic.expect("basic statistics");
        assert_eq!(basic.total_sequences, Some(1000.0));
        assert_eq!(basic.gc_percent, Some(48.0));
        assert_eq!(
            report.gc_distribution,
            Some(vec![(30.0, 400.0), (45.0, 600.0)])
        );
        assert_eq!(report.dedup_percentage, Some(70.0));
        assert_eq!(
            report.quality_distribution,
            Some(vec![(12.0, 100.0), (30.0, 900.0)])
        );
    }

    #[test]
    fn chunked_feeding_matches_whole_parse() {
        let mut parser = FastqcParser::new();
        let lines: Vec<&str> = REPORT.lines().collect();
        for chunk in lines.chunks(3) {
            for line in chunk {
                parser.push_line(line).unwrap();
            }
        }
        assert_eq!(parser.finish().unwrap(), FastqcParser::parse_str(REPORT).unwrap());
    }

    #[test]
    fn rows_outside_modules_are_ignored() {
        let text = "30\t500\n>>Per sequence GC content\tpass\n40\t10\n>>END_MODULE\n50\t999\n";
        let report = FastqcParser::parse_str(text).unwrap();
        assert_eq!(report.gc_distribution, Some(vec![(40.0, 10.0)]));
    }

    #[test]
    fn absent_modules_stay_none() {
        let report = FastqcParser::parse_str("##FastQC\t0.11.9\n").unwrap();
        assert_eq!(report, FastqcReport::default());
    }

    #[test]
    fn unterminated_module_is_an_error() {
        let err = FastqcParser::parse_str(">>Per sequence GC content\tpass\n40\t10\n").unwrap_err();
        assert_eq!(
            err,
            FastqcParseError::UnterminatedModule("Per sequence GC content".to_string())
        );

        let err = FastqcParser::parse_str(">>Adapter Content\tpass\n>>Kmer Content\tpass\n")
            .unwrap_err();
        assert_eq!(err, FastqcParseError::UnterminatedModule("Adapter Content".to_string()));
    }

    #[test]
    fn non_numeric_row_reports_line() {
        let err = FastqcParser::parse_str(
            ">>Per sequence quality scores\tpass\n#Quality\tCount\nhigh\t3\n>>END_MODULE\n",
        )
        .unwrap_err();
        assert!(matches!(err, FastqcParseError::InvalidRow { line: 3, .. }));
    }
}
