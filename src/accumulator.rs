//! Streaming conversion of per-site exclusion decisions into BED intervals.
//!
//! # Algorithm
//!
//! Sites arrive ordered by position within each contig:
//! 1. Track the current contig and the last position seen on it
//! 2. An excluded site opens a run, or extends the open one by one base
//! 3. A kept site, or a contig change, closes the open run and emits it
//! 4. `flush` emits a run that reaches the end of the input
//!
//! # Memory Complexity
//!
//! O(1) per site - only the current contig and the start of the open run are
//! kept. The last position of every finished contig is remembered, so memory
//! grows with the number of contigs, never with the number of sites.
//!
//! # Requirements
//!
//! Positions within a contig must be consecutive and all sites of a contig
//! must be contiguous in the stream. A missing position is a
//! [`AccumulatorError::Gap`]; a repeated or decreasing position, or a contig
//! that comes back after another one, is an [`AccumulatorError::Order`].

use crate::interval::Interval;
use rustc_hash::FxHashMap;
use thiserror::Error;

/// Errors raised while feeding sites into an [`IntervalAccumulator`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccumulatorError {
    #[error(
        "Gap in per-site input on {contig}: position {position} follows {previous} \
         (the input is malformed or was produced by an obsolete tool version)"
    )]
    Gap {
        contig: String,
        previous: u64,
        position: u64,
    },

    #[error("Input not sorted: position {position} on {contig} comes after {previous}")]
    Order {
        contig: String,
        previous: u64,
        position: u64,
    },

    #[error("Internal error: empty interval at {contig}:{position}")]
    EmptyInterval { contig: String, position: u64 },
}

/// One position on one contig with its exclusion decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Site {
    pub contig: String,
    /// 0-based position
    pub position: u64,
    pub excluded: bool,
}

impl Site {
    pub fn new(contig: impl Into<String>, position: u64, excluded: bool) -> Self {
        Self {
            contig: contig.into(),
            position,
            excluded,
        }
    }
}

/// Merges runs of consecutive excluded sites into half-open intervals.
///
/// Create one per output run, feed it with [`observe`](Self::observe) or
/// [`observe_span`](Self::observe_span) and call [`flush`](Self::flush)
/// after the last site.
#[derive(Debug, Default)]
pub struct IntervalAccumulator {
    contig: Option<String>,
    last_position: Option<u64>,
    /// Start of the open run; its end is always `last_position + 1`.
    open_start: Option<u64>,
    /// Last position of every contig left behind
    finished: FxHashMap<String, u64>,
    excluded_sites: u64,
    emitted: usize,
}

impl IntervalAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe one site. Returns the interval closed by this site, if any.
    pub fn observe(
        &mut self,
        contig: &str,
        position: u64,
        excluded: bool,
    ) -> Result<Option<Interval>, AccumulatorError> {
        let closed = self.enter(contig, position)?;
        let closed = self.apply(closed, position, excluded)?;
        if excluded {
            self.excluded_sites += 1;
        }
        self.last_position = Some(position);
        Ok(closed)
    }

    /// Observe every position of `[start, end)` with the same decision.
    ///
    /// Equivalent to calling [`observe`](Self::observe) once per position,
    /// so at most one interval can be closed. Empty spans are ignored.
    pub fn observe_span(
        &mut self,
        contig: &str,
        start: u64,
        end: u64,
        excluded: bool,
    ) -> Result<Option<Interval>, AccumulatorError> {
        if end <= start {
            return Ok(None);
        }
        let closed = self.enter(contig, start)?;
        let closed = self.apply(closed, start, excluded)?;
        if excluded {
            self.excluded_sites += end - start;
        }
        self.last_position = Some(end - 1);
        Ok(closed)
    }

    /// Observe a site from a sparse source such as a VCF file.
    ///
    /// Positions skipped since the last site on the same contig are first
    /// observed as one kept span, so a missing position is never a gap.
    /// Repeated or decreasing positions are still an
    /// [`AccumulatorError::Order`].
    pub fn observe_sparse(
        &mut self,
        contig: &str,
        position: u64,
        excluded: bool,
    ) -> Result<Option<Interval>, AccumulatorError> {
        if let (Some(current), Some(previous)) = (self.contig.as_deref(), self.last_position) {
            if current == contig && position > previous + 1 {
                let closed = self.observe_span(contig, previous + 1, position, false)?;
                // The kept span left no run open, so this cannot close another.
                let next = self.observe(contig, position, excluded)?;
                return Ok(closed.or(next));
            }
        }
        self.observe(contig, position, excluded)
    }

    /// Observe a [`Site`] value.
    pub fn observe_site(&mut self, site: &Site) -> Result<Option<Interval>, AccumulatorError> {
        self.observe(&site.contig, site.position, site.excluded)
    }

    /// Emit the interval still open at the end of the input, if any.
    ///
    /// Calling it again is a no-op. Contig tracking is kept, so sites fed
    /// after a flush are still checked against the last position.
    pub fn flush(&mut self) -> Result<Option<Interval>, AccumulatorError> {
        self.close()
    }

    /// Contig of the last observed site.
    pub fn current_contig(&self) -> Option<&str> {
        self.contig.as_deref()
    }

    /// Number of excluded positions observed so far.
    pub fn excluded_sites(&self) -> u64 {
        self.excluded_sites
    }

    /// Number of intervals emitted so far.
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// Check ordering of `position` and handle a contig change.
    fn enter(&mut self, contig: &str, position: u64) -> Result<Option<Interval>, AccumulatorError> {
        if let (Some(current), Some(previous)) = (self.contig.as_deref(), self.last_position) {
            if current == contig {
                if position <= previous {
                    return Err(AccumulatorError::Order {
                        contig: contig.to_string(),
                        previous,
                        position,
                    });
                }
                if position != previous + 1 {
                    return Err(AccumulatorError::Gap {
                        contig: contig.to_string(),
                        previous,
                        position,
                    });
                }
                return Ok(None);
            }
        }

        if let Some(&previous) = self.finished.get(contig) {
            return Err(AccumulatorError::Order {
                contig: contig.to_string(),
                previous,
                position,
            });
        }

        let closed = self.close()?;
        if let (Some(done), Some(last)) = (self.contig.take(), self.last_position) {
            self.finished.insert(done, last);
        }
        self.contig = Some(contig.to_string());
        self.last_position = None;
        Ok(closed)
    }

    /// Open, extend or close the run for a decision starting at `position`.
    /// `closed` is the interval already closed by a contig change.
    fn apply(
        &mut self,
        closed: Option<Interval>,
        position: u64,
        excluded: bool,
    ) -> Result<Option<Interval>, AccumulatorError> {
        if excluded {
            if self.open_start.is_none() {
                self.open_start = Some(position);
            }
            Ok(closed)
        } else if self.open_start.is_some() {
            self.close()
        } else {
            Ok(closed)
        }
    }

    fn close(&mut self) -> Result<Option<Interval>, AccumulatorError> {
        let Some(start) = self.open_start.take() else {
            return Ok(None);
        };
        let contig = self.contig.clone().unwrap_or_default();
        let end = self.last_position.map_or(start, |p| p + 1);
        if end <= start {
            return Err(AccumulatorError::EmptyInterval {
                contig,
                position: start,
            });
        }
        self.emitted += 1;
        Ok(Some(Interval::new(contig, start, end)))
    }
}

/// Run a whole site stream through a fresh accumulator.
pub fn collect_intervals<I>(sites: I) -> Result<Vec<Interval>, AccumulatorError>
where
    I: IntoIterator<Item = Site>,
{
    let mut acc = IntervalAccumulator::new();
    let mut out = Vec::new();
    for site in sites {
        out.extend(acc.observe_site(&site)?);
    }
    out.extend(acc.flush()?);
    Ok(out)
}
