//! Command implementations for popmask.

pub mod allele_count;
pub mod coverage_outliers;
pub mod gff_to_bed;
pub mod paralog_areas;
pub mod pimatic;
pub mod pm_estimatic;
pub mod variant_density;
pub mod vcf_to_fastq;

pub use allele_count::{AlleleCountCommand, AlleleCountStats};
pub use coverage_outliers::{CoverageOutlierCommand, CoverageOutlierStats};
pub use gff_to_bed::{read_id_list, FeatureTally, GffStats, GffToBedCommand};
pub use paralog_areas::{ParalogAreaCommand, ParalogAreaStats};
pub use pimatic::{PimaticCommand, PimaticStats};
pub use pm_estimatic::{AncestralTable, PmEstimaticCommand, PmReport};
pub use variant_density::{filter_records, DensityReport, VariantDensityCommand};
pub use vcf_to_fastq::{FastqStats, VcfToFastqCommand};
