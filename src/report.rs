//! Output writers: CSV metric rows, per-identifier diagnostic text and the
//! end-of-run digest.

use std::fmt::Write as _;
use std::io::Write;

use anyhow::{anyhow, Result};

use crate::aggregate::RunSummary;
use crate::model::{ArtifactKind, Category, UnitReport};

/// Column header of the CSV output.
pub const CSV_HEADER: [&str; 5] = ["identifier", "category", "flag_key", "value", "message"];

const KINDS: [ArtifactKind; 4] = [
    ArtifactKind::BamCram,
    ArtifactKind::Fastq,
    ArtifactKind::Vcf,
    ArtifactKind::Unknown,
];

const CATEGORIES: [Category; 4] = [Category::BamCram, Category::Fastq, Category::Vcf, Category::Error];

/// Write one row per metric (empty message) and one per warning (empty value).
pub fn write_rows<W: Write>(writer: &mut W, reports: &[UnitReport]) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(CSV_HEADER)?;

    for report in reports {
        for metric in &report.metrics {
            let value = format!("{:.4}", metric.value);
            csv.write_record([
                report.identifier.as_str(),
                metric.category.as_str(),
                metric.flag.as_str(),
                value.as_str(),
                "",
            ])?;
        }
        for warning in &report.warnings {
            csv.write_record([
                warning.identifier.as_str(),
                warning.category.as_str(),
                warning.flag.as_str(),
                "",
                warning.message.as_str(),
            ])?;
        }
    }

    csv.flush()?;
    Ok(())
}

/// Render rows into a CSV string (useful for tests and snapshots).
pub fn render_rows(reports: &[UnitReport]) -> Result<String> {
    let mut buffer = Vec::new();
    write_rows(&mut buffer, reports)?;
    String::from_utf8(buffer).map_err(|_| anyhow!("rendered CSV is not valid UTF-8"))
}

/// Diagnostic block for one identifier; empty when nothing was raised.
pub fn render_unit(report: &UnitReport) -> String {
    if !report.has_warnings() {
        return String::new();
    }
    let mut out = format!(">> {} | {}\n", report.identifier, report.kind.label());
    for warning in &report.warnings {
        let prefix = if warning.is_error() { "Error" } else { "Warning" };
        let _ = writeln!(out, "{prefix}: {}", warning.message);
    }
    out
}

/// Write the diagnostic blocks of every report.
pub fn write_diagnostics<W: Write>(writer: &mut W, reports: &[UnitReport]) -> Result<()> {
    for report in reports {
        writer.write_all(render_unit(report).as_bytes())?;
    }
    writer.flush()?;
    Ok(())
}

/// Human-readable digest of a run.
pub fn render_summary(summary: &RunSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Finished checking {} identifiers.", summary.processed);
    if summary.processed == 0 {
        out.push_str("No identifiers were checked.\n");
        return out;
    }

    let _ = writeln!(
        out,
        "{} of {} identifiers with a QC report ({:.1}%) have shown some warning.",
        summary.with_warnings_and_qc,
        summary.with_qc(),
        summary.warning_percent()
    );
    if summary.no_qc > 0 {
        let _ = writeln!(
            out,
            "{} identifiers ({:.1}%) have a missing or unusable QC report.",
            summary.no_qc,
            summary.missing_qc_percent()
        );
    }

    out.push_str("\nIdentifiers by artifact type:\n");
    for kind in KINDS {
        let count = summary.kind_count(kind);
        if count > 0 {
            let _ = writeln!(out, "  {}: {count}", kind.label());
        }
    }

    out.push_str("\nSummary of warnings:\n");
    for category in CATEGORIES {
        let mut counts = summary.category_counts(category).peekable();
        if counts.peek().is_none() {
            continue;
        }
        let _ = writeln!(out, "- {category}:");
        for (flag, count) in counts {
            let _ = writeln!(out, "  {count} {flag}");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FlagKey, WarningKind};

    fn sample() -> UnitReport {
        let mut report = UnitReport::new("EGAF1", ArtifactKind::BamCram);
        report.metrics.push(crate::model::Metric::new(Category::BamCram, FlagKey::Unaligned, 45.0));
        report.warn(
            Category::BamCram,
            FlagKey::Unaligned,
            WarningKind::Threshold,
            "reads unaligned (45.00%) exceeds 40",
        );
        report.fail(FlagKey::DecryptionFailed, "stats decryption failed: bad padding");
        report
    }

    #[test]
    fn csv_rows_split_values_and_messages() {
        let csv = render_rows(&[sample()]).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "identifier,category,flag_key,value,message");
        assert_eq!(lines[1], "EGAF1,bamcram,unaligned,45.0000,");
        assert_eq!(lines[2], "EGAF1,bamcram,unaligned,,reads unaligned (45.00%) exceeds 40");
        assert_eq!(
            lines[3],
            "EGAF1,error,decryption_failed,,stats decryption failed: bad padding"
        );
    }

    #[test]
    fn unit_block_labels_errors() {
        let text = render_unit(&sample());
        assert_eq!(
            text,
            ">> EGAF1 | BAM/CRAM\n\
             Warning: reads unaligned (45.00%) exceeds 40\n\
             Error: stats decryption failed: bad padding\n"
        );
        assert!(render_unit(&UnitReport::new("EGAF2", ArtifactKind::Vcf)).is_empty());
    }

    #[test]
    fn empty_summary_says_so() {
        let text = render_summary(&RunSummary::default());
        assert!(text.contains("No identifiers were checked."));
    }
}
