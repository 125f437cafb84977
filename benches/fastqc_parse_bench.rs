//! FastQC parsing and species screening throughput

use archive_qc::fastqc::FastqcParser;
use archive_qc::species::SpeciesClassifier;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn synthetic_report(rows: usize) -> String {
    let mut text = String::from(">>Basic Statistics\tpass\n#Measure\tValue\nTotal Sequences\t1000000\n%GC\t46\n>>END_MODULE\n");
    text.push_str(">>Per sequence quality scores\tpass\n#Quality\tCount\n");
    for q in 0..rows {
        text.push_str(&format!("{}\t{}.0\n", q % 42, q * 7));
    }
    text.push_str(">>END_MODULE\n>>Per sequence GC content\tpass\n#GC Content\tCount\n");
    for gc in 0..rows {
        text.push_str(&format!("{}\t{}.5\n", gc % 101, gc * 3));
    }
    text.push_str(">>END_MODULE\n>>Sequence Duplication Levels\tpass\n#Total Deduplicated Percentage\t81.2\n>>END_MODULE\n");
    text
}

fn benchmark_fastqc(c: &mut Criterion) {
    let report = synthetic_report(10_000);
    c.bench_function("fastqc_parse_10k_rows", |b| {
        b.iter(|| FastqcParser::parse_str(black_box(&report)).expect("report parses"));
    });

    let mut screen = String::from("Genome\t#Reads_processed\t#One_hit_one_genome\t%One_hit_one_genome\n");
    for i in 0..500 {
        screen.push_str(&format!("genome{i}\t100000\t{}\t{:.2}\n", i * 13, i as f64 / 10.0));
    }
    let classifier = SpeciesClassifier::new(true, 5.0);
    c.bench_function("species_dominant_500_rows", |b| {
        b.iter(|| classifier.dominant(black_box(&screen)).expect("dominant genome"));
    });
}

criterion_group!(benches, benchmark_fastqc);
criterion_main!(benches);
