//! Core interval type for genomic region representation.

use std::cmp::Ordering;
use std::fmt;

/// A genomic interval with contig, start, and end positions.
/// Uses 0-based, half-open coordinates (BED format).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Interval {
    pub chrom: String,
    pub start: u64,
    pub end: u64,
}

impl Interval {
    /// Create a new interval.
    #[inline]
    pub fn new(chrom: impl Into<String>, start: u64, end: u64) -> Self {
        Self {
            chrom: chrom.into(),
            start,
            end,
        }
    }

    /// Returns the length of the interval.
    #[inline]
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    /// Returns true if the interval has zero length.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Check if `pos` lies inside the interval.
    #[inline]
    pub fn contains(&self, pos: u64) -> bool {
        self.start <= pos && pos < self.end
    }

    /// Check if this interval overlaps or touches another on the same contig.
    #[inline]
    pub fn touches(&self, other: &Interval) -> bool {
        self.chrom == other.chrom && self.start <= other.end && other.start <= self.end
    }

    /// Extend both sides by `radius`, saturating at 0 and clamping the end
    /// to `chrom_size` when one is given.
    #[inline]
    pub fn widen(&mut self, radius: u64, chrom_size: Option<u64>) {
        self.start = self.start.saturating_sub(radius);
        self.end = self.end.saturating_add(radius);
        if let Some(size) = chrom_size {
            self.end = self.end.min(size);
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}\t{}", self.chrom, self.start, self.end)
    }
}

impl Ord for Interval {
    fn cmp(&self, other: &Self) -> Ordering {
        self.chrom
            .cmp(&other.chrom)
            .then(self.start.cmp(&other.start))
            .then(self.end.cmp(&other.end))
    }
}

impl PartialOrd for Interval {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
