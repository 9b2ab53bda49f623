//! Widen-then-merge pass over closed intervals.
//!
//! Runs after the [`IntervalAccumulator`](crate::accumulator::IntervalAccumulator)
//! has closed its intervals, never interleaved with it:
//! 1. Widen each interval by the policy radius, clamped to `[0, contig_size]`
//! 2. If the widened interval touches the current span, extend the span
//! 3. If not, output the current span and start a new one
//!
//! Input intervals must be ordered by start within each contig, which is
//! what the accumulator produces. Widening keeps that order.

use crate::error::Result;
use crate::genome::Genome;
use crate::interval::Interval;

/// How closed intervals are post-processed before output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpanPolicy {
    /// Bases added on both sides of every interval.
    pub radius: u64,
    /// Join intervals that overlap or touch after widening.
    pub merge: bool,
}

impl SpanPolicy {
    /// Emit intervals exactly as closed.
    pub fn raw() -> Self {
        Self::default()
    }

    /// Widen by `radius`, then merge overlapping or adjacent intervals.
    pub fn widen_and_merge(radius: u64) -> Self {
        Self {
            radius,
            merge: true,
        }
    }
}

/// Streaming widen/merge over an ordered interval sequence.
///
/// Memory usage: O(1) - only the current merge span is kept.
#[derive(Debug)]
pub struct SpanMerger<'g> {
    policy: SpanPolicy,
    genome: Option<&'g Genome>,
    current: Option<Interval>,
    intervals_read: usize,
    intervals_written: usize,
}

impl<'g> SpanMerger<'g> {
    /// Create a merger. Without a genome interval ends are not clamped;
    /// with one, contigs missing from it are an error.
    pub fn new(policy: SpanPolicy, genome: Option<&'g Genome>) -> Self {
        Self {
            policy,
            genome,
            current: None,
            intervals_read: 0,
            intervals_written: 0,
        }
    }

    /// Add the next closed interval. Returns a finished span, if any.
    pub fn push(&mut self, mut interval: Interval) -> Result<Option<Interval>> {
        self.intervals_read += 1;

        let chrom_size = match self.genome {
            Some(genome) => Some(genome.require(&interval.chrom)?),
            None => None,
        };
        interval.widen(self.policy.radius, chrom_size);

        if !self.policy.merge {
            return Ok(self.emit(interval));
        }

        match self.current.as_mut() {
            Some(span) if span.touches(&interval) => {
                span.end = span.end.max(interval.end);
                Ok(None)
            }
            _ => {
                let finished = self.current.replace(interval);
                Ok(finished.and_then(|span| self.emit(span)))
            }
        }
    }

    /// Emit the last open span.
    pub fn finish(&mut self) -> Option<Interval> {
        self.current.take().and_then(|span| self.emit(span))
    }

    /// Number of intervals pushed.
    pub fn intervals_read(&self) -> usize {
        self.intervals_read
    }

    /// Number of spans emitted.
    pub fn intervals_written(&self) -> usize {
        self.intervals_written
    }

    #[inline]
    fn emit(&mut self, span: Interval) -> Option<Interval> {
        // A contig shorter than the interval start can clamp it to nothing.
        if span.is_empty() {
            return None;
        }
        self.intervals_written += 1;
        Some(span)
    }
}

/// Apply `policy` to a whole ordered interval list.
pub fn merge_intervals<I>(
    intervals: I,
    policy: SpanPolicy,
    genome: Option<&Genome>,
) -> Result<Vec<Interval>>
where
    I: IntoIterator<Item = Interval>,
{
    let mut merger = SpanMerger::new(policy, genome);
    let mut out = Vec::new();
    for interval in intervals {
        out.extend(merger.push(interval)?);
    }
    out.extend(merger.finish());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn genome(entries: &[(&str, u64)]) -> Genome {
        let mut g = Genome::new();
        for &(c, s) in entries {
            g.insert(c.to_string(), s);
        }
        g
    }

    #[test]
    fn test_raw_policy_passes_through() {
        let input = vec![Interval::new("chr1", 0, 1), Interval::new("chr1", 2, 3)];
        let out = merge_intervals(input.clone(), SpanPolicy::raw(), None).unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn test_radius_one_collapses_neighbours() {
        let g = genome(&[("chr1", 3)]);
        let input = vec![Interval::new("chr1", 0, 1), Interval::new("chr1", 2, 3)];

        let out = merge_intervals(input.clone(), SpanPolicy::widen_and_merge(1), Some(&g)).unwrap();
        assert_eq!(out, vec![Interval::new("chr1", 0, 3)]);

        let out = merge_intervals(input, SpanPolicy::widen_and_merge(1), None).unwrap();
        assert_eq!(out, vec![Interval::new("chr1", 0, 4)]);
    }

    #[test]
    fn test_touching_intervals_merge_at_radius_zero() {
        let input = vec![Interval::new("chr1", 10, 20), Interval::new("chr1", 20, 30)];
        let out = merge_intervals(input, SpanPolicy::widen_and_merge(0), None).unwrap();
        assert_eq!(out, vec![Interval::new("chr1", 10, 30)]);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let merged = vec![
            Interval::new("chr1", 0, 5),
            Interval::new("chr1", 7, 9),
            Interval::new("chr2", 0, 5),
        ];
        let out = merge_intervals(merged.clone(), SpanPolicy::widen_and_merge(0), None).unwrap();
        assert_eq!(out, merged);
    }

    #[test]
    fn test_contigs_never_merge() {
        let input = vec![Interval::new("chr1", 0, 10), Interval::new("chr2", 0, 10)];
        let out = merge_intervals(input, SpanPolicy::widen_and_merge(5), None).unwrap();
        assert_eq!(
            out,
            vec![Interval::new("chr1", 0, 15), Interval::new("chr2", 0, 15)]
        );
    }

    #[test]
    fn test_contained_span_keeps_larger_end() {
        let input = vec![Interval::new("chr1", 0, 100), Interval::new("chr1", 10, 20)];
        let out = merge_intervals(input, SpanPolicy::widen_and_merge(0), None).unwrap();
        assert_eq!(out, vec![Interval::new("chr1", 0, 100)]);
    }

    #[test]
    fn test_unknown_contig_with_genome() {
        let g = genome(&[("chr1", 100)]);
        let result = merge_intervals(
            vec![Interval::new("chrUn", 0, 1)],
            SpanPolicy::widen_and_merge(2),
            Some(&g),
        );
        assert!(matches!(result, Err(Error::UnknownContig(_))));
    }

    #[test]
    fn test_counters() {
        let mut merger = SpanMerger::new(SpanPolicy::widen_and_merge(2), None);
        assert!(merger.push(Interval::new("chr1", 10, 11)).unwrap().is_none());
        assert!(merger.push(Interval::new("chr1", 14, 15)).unwrap().is_none());
        assert_eq!(
            merger.push(Interval::new("chr1", 30, 31)).unwrap(),
            Some(Interval::new("chr1", 8, 17))
        );
        assert_eq!(merger.finish(), Some(Interval::new("chr1", 28, 33)));
        assert_eq!(merger.intervals_read(), 3);
        assert_eq!(merger.intervals_written(), 2);
    }
}
