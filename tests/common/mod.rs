#![allow(dead_code)]

use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use archive_qc::crypto::encrypt_stats;
use archive_qc::fastqc::FASTQC_DATA_PATH;
use archive_qc::ArtifactSet;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::{json, Value};

fn snapshot_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("snapshots")
}

pub fn assert_snapshot(name: &str, actual: &str) {
    let path = snapshot_root().join(name);
    if std::env::var("ARCHIVE_QC_UPDATE_SNAPSHOTS").is_ok() {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create snapshot directory");
        }
        fs::write(&path, actual).expect("write snapshot");
        return;
    }

    let expected =
        fs::read_to_string(&path).unwrap_or_else(|_| panic!("snapshot {:?} not found", path));
    if normalize(&expected) != normalize(actual) {
        panic!(
            "Snapshot mismatch for {:?}. Set ARCHIVE_QC_UPDATE_SNAPSHOTS=1 to regenerate.\nExpected:\n{}\nActual:\n{}",
            path,
            expected,
            actual
        );
    }
}

fn normalize(input: &str) -> String {
    input.replace("\r\n", "\n")
}

pub fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).expect("gzip write");
    encoder.finish().expect("gzip finish")
}

pub fn gz_json(value: &Value) -> Vec<u8> {
    gzip(value.to_string().as_bytes())
}

/// BAM/CRAM summary with `total` reads of which `low_mapq` have MAPQ <= 29.
pub fn bamcram_summary(mapped_ratio: f64, total: u64, low_mapq: u64, duplicate_ratio: f64) -> Value {
    json!({
        "TotalReads": total,
        "InsertSize": 350.0,
        "Data": {
            "MappedReads": [mapped_ratio],
            "MappingQualityDistribution": [[10, low_mapq], [60, total - low_mapq]],
            "Duplicates": [duplicate_ratio],
        }
    })
}

pub fn vcf_summary(tstv: f64, avg_quality: f64) -> Value {
    json!({
        "VCFVersion": "VCFv4.2",
        "TsTvRatio": tstv,
        "AvgQuality": avg_quality,
    })
}

/// FastQC text with the three scored modules plus basic statistics.
pub fn fastqc_text(gc_rows: &[(u32, f64)], dedup_percent: f64, quality_rows: &[(u32, f64)]) -> String {
    let total: f64 = gc_rows.iter().map(|(_, count)| count).sum();
    let mut text = String::from("##FastQC\t0.11.9\n");
    text.push_str(">>Basic Statistics\tpass\n#Measure\tValue\nFilename\tstdin\n");
    text.push_str(&format!("Total Sequences\t{total}\n%GC\t47\n>>END_MODULE\n"));
    text.push_str(">>Per base sequence quality\tpass\n#Base\tMean\n1\t32.0\n>>END_MODULE\n");

    text.push_str(">>Per sequence quality scores\tpass\n#Quality\tCount\n");
    for (quality, count) in quality_rows {
        text.push_str(&format!("{quality}\t{count}\n"));
    }
    text.push_str(">>END_MODULE\n");

    text.push_str(">>Per sequence GC content\twarn\n#GC Content\tCount\n");
    for (gc, count) in gc_rows {
        text.push_str(&format!("{gc}\t{count}\n"));
    }
    text.push_str(">>END_MODULE\n");

    text.push_str(">>Sequence Duplication Levels\tpass\n");
    text.push_str(&format!("#Total Deduplicated Percentage\t{dedup_percent}\n"));
    text.push_str("#Duplication Level\tPercentage of deduplicated\tPercentage of total\n");
    text.push_str("1\t90.0\t80.0\n>>END_MODULE\n");
    text
}

pub fn fastqc_zip(text: &str) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    writer
        .start_file(FASTQC_DATA_PATH, zip::write::FileOptions::default())
        .expect("start zip entry");
    writer.write_all(text.as_bytes()).expect("write zip entry");
    writer.finish().expect("finish zip").into_inner()
}

/// Species screening report with `(genome, one_hit_reads, one_hit_percent)` rows.
pub fn species_text(rows: &[(&str, u64, f64)]) -> String {
    let mut text = String::from(
        "#Fastq_screen version: 0.14.0\t#Aligner: bowtie2\t#Reads in subset: 100000\n\
         Genome\t#Reads_processed\t#Unmapped\t%Unmapped\t#One_hit_one_genome\t%One_hit_one_genome\t#Multiple_hits_one_genome\n",
    );
    for (genome, hits, percent) in rows {
        text.push_str(&format!("{genome}\t100000\t500\t0.50\t{hits}\t{percent:.2}\t10\n"));
    }
    text.push_str("\n%Hit_no_genomes: 0.50\n");
    text
}

/// Encrypted `samtools stats` text holding the given GC lines.
pub fn sealed_stats(gc_lines: &[(f64, f64)], password: &[u8]) -> Vec<u8> {
    let mut text = String::from("# This file was produced by samtools stats\nSN\traw total sequences:\t1000\n");
    for (gc, count) in gc_lines {
        text.push_str(&format!("GCF\t{gc}\t{count}\n"));
    }
    encrypt_stats(&text, password, *b"\x01\x02\x03\x04\x05\x06\x07\x08").expect("fixture encrypts")
}

pub fn fastq_set(text: &str, species: Option<&str>) -> ArtifactSet {
    ArtifactSet {
        fastq_archive: Some(fastqc_zip(text)),
        species_report: species.map(|s| s.as_bytes().to_vec()),
        ..ArtifactSet::default()
    }
}

pub fn summary_set(summary: &Value) -> ArtifactSet {
    ArtifactSet {
        summary_json: Some(gz_json(summary)),
        ..ArtifactSet::default()
    }
}
