//! GC-content aggregation over decrypted `samtools stats` text.

/// Count-weighted GC content accumulated from `GCF`/`GCL` histogram lines.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GcHistogram {
    /// Σ gc_percent × count.
    pub weighted_sum: f64,
    /// Σ count.
    pub total_count: f64,
    /// Number of histogram lines consumed.
    pub lines: usize,
}

impl GcHistogram {
    /// Scan `text` for GC histogram lines.
    ///
    /// Accepted shapes are the three-column `GCF\t<gc>\t<count>` produced by
    /// `samtools stats` (any `GC`-prefixed tag with exactly two values) and
    /// the two-column `GCF<gc>\t<count>` variant. Unparseable lines are skipped.
    pub fn from_stats_text(text: &str) -> Self {
        let mut histogram = Self::default();
        for line in text.lines() {
            if let Some((gc, count)) = parse_gc_line(line.trim()) {
                histogram.weighted_sum += gc * count;
                histogram.total_count += count;
                histogram.lines += 1;
            }
        }
        histogram
    }

    /// Weighted mean GC percentage, or `None` when the total count is zero.
    pub fn mean(&self) -> Option<f64> {
        (self.total_count > 0.0).then(|| self.weighted_sum / self.total_count)
    }
}

fn parse_gc_line(line: &str) -> Option<(f64, f64)> {
    if !line.starts_with("GC") {
        return None;
    }
    let fields: Vec<&str> = line.split('\t').collect();
    match fields.as_slice() {
        [_tag, gc, count] => Some((gc.trim().parse().ok()?, parse_count(count)?)),
        [tagged_gc, count] if tagged_gc.starts_with("GCF") || tagged_gc.starts_with("GCL") => {
            Some((tagged_gc[3..].trim().parse().ok()?, parse_count(count)?))
        }
        _ => None,
    }
}

fn parse_count(field: &str) -> Option<f64> {
    let count: f64 = field.trim().parse().ok()?;
    (count.is_finite() && count >= 0.0).then_some(count)
}
