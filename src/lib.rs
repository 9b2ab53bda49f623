//! popmask: site-mask and interval tools for population-genomics pipelines
//!
//! This library turns per-site decisions (coverage outliers, suspected
//! paralogs, variant-dense windows) into BED masks, filters VCF files and
//! computes a few per-sample summaries (pairwise pi, misorientation rate,
//! FASTQ consensus).
//!
//! # Features
//!
//! - **Streaming I/O**: inputs are read record by record, intervals are closed
//!   as soon as a run of excluded sites ends
//! - **O(1) accumulator**: [`IntervalAccumulator`] keeps only the open run
//! - **Widen and merge**: [`SpanMerger`] pads intervals and joins neighbours,
//!   clamped to contig sizes
//!
//! # Example
//!
//! ```rust,no_run
//! use popmask::accumulator::IntervalAccumulator;
//!
//! let mut acc = IntervalAccumulator::new();
//! let mut intervals = Vec::new();
//! for (pos, excluded) in [(0, false), (1, true), (2, true), (3, false)] {
//!     intervals.extend(acc.observe("chr1", pos, excluded).unwrap());
//! }
//! intervals.extend(acc.flush().unwrap());
//! assert_eq!(intervals[0].to_string(), "chr1\t1\t3");
//! ```

pub mod accumulator;
pub mod bed;
pub mod commands;
pub mod coverage;
pub mod error;
pub mod genome;
pub mod gff;
pub mod interval;
pub mod log_utils;
pub mod merge;
pub mod parsing;
pub mod stats;
pub mod vcf;

// Re-export commonly used types
pub use accumulator::{AccumulatorError, IntervalAccumulator, Site};
pub use bed::{read_intervals, read_regions, BedMask, BedReader, BedRegion, BedWriter};
pub use error::{Error, Result};
pub use genome::Genome;
pub use interval::Interval;
pub use merge::{merge_intervals, SpanMerger, SpanPolicy};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::accumulator::{collect_intervals, IntervalAccumulator, Site};
    pub use crate::bed::{read_intervals, BedMask, BedWriter};
    pub use crate::commands::{
        AlleleCountCommand, CoverageOutlierCommand, GffToBedCommand, ParalogAreaCommand,
        PimaticCommand, PmEstimaticCommand, VariantDensityCommand, VcfToFastqCommand,
    };
    pub use crate::genome::Genome;
    pub use crate::interval::Interval;
    pub use crate::merge::{merge_intervals, SpanPolicy};
}
