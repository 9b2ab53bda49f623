//! Misorientation probability (Pm) estimation.
//!
//! Estimates the average probability that a site's ancestral state is
//! misoriented (Baudry & Depaulis 2003, equation 3), used to correct an
//! unfolded site frequency spectrum.
//!
//! The ancestral base of a site is the REF allele unless an ancestral table
//! is given, in which case only the sites listed in the table are used. Each
//! site is classified by the set of bases called in its samples (any ploidy):
//!
//! - monomorphic: one base, equal to the ancestral one
//! - diverged: one base differing from the ancestral one (fixed difference),
//!   or two bases one of which is ancestral (polymorphism); the differing
//!   pair is a transition or a transversion
//! - double mutation: two bases, neither ancestral; each base counts as half
//!   a transition or transversion
//! - three or more bases: omitted
//!
//! Sites whose called alleles are not single A, C, G or T bases are omitted.

use crate::error::{Error, Result};
use crate::vcf::{allele_index, contig_name, for_each_genotype, open_reader, position};
use log::{debug, info, warn};
use rust_htslib::bcf::{self, Read as _, Record};
use rustc_hash::FxHashMap;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

const PROGRESS_INTERVAL: usize = 1_000_000;

/// Ancestral bases keyed by contig and 1-based position.
#[derive(Debug, Clone, Default)]
pub struct AncestralTable {
    bases: FxHashMap<String, FxHashMap<u64, u8>>,
    len: usize,
}

impl AncestralTable {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_reader(File::open(path)?)
    }

    /// Read a `contig<TAB>position<TAB>base` table. The first line is a
    /// header. Bases other than A, C, G and T are skipped with a warning.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut table = Self::default();
        for (line_num, line_result) in BufReader::new(reader).lines().enumerate().skip(1) {
            let line = line_result?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < 3 {
                return Err(Error::parse(
                    line_num + 1,
                    "Ancestral table requires three columns: contig, position and base",
                ));
            }
            let pos: u64 = fields[1].parse().map_err(|_| {
                Error::parse(line_num + 1, format!("Invalid position: {}", fields[1]))
            })?;
            let Some(base) = single_base(fields[2].as_bytes()) else {
                warn!(
                    "Ancestral base at {} {} is {}, not one of A, C, G, T; omitting",
                    fields[0], fields[1], fields[2]
                );
                continue;
            };
            table.insert(fields[0], pos, base);
        }

        if table.is_empty() {
            return Err(Error::InvalidFormat(
                "No ancestral bases found in the ancestral table".to_string(),
            ));
        }
        info!("Read {} ancestral bases", table.len());
        Ok(table)
    }

    pub fn insert(&mut self, contig: &str, pos: u64, base: u8) {
        let previous = self
            .bases
            .entry(contig.to_string())
            .or_default()
            .insert(pos, base.to_ascii_uppercase());
        if previous.is_none() {
            self.len += 1;
        }
    }

    /// Ancestral base at a 1-based position.
    pub fn get(&self, contig: &str, pos: u64) -> Option<u8> {
        self.bases.get(contig)?.get(&pos).copied()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Pm estimation command configuration.
#[derive(Debug, Clone, Default)]
pub struct PmEstimaticCommand {
    /// Ancestral bases; the REF allele is ancestral when unset
    pub ancestral: Option<AncestralTable>,
}

impl PmEstimaticCommand {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ancestral(mut self, table: AncestralTable) -> Self {
        self.ancestral = Some(table);
        self
    }

    /// Count site classes in a VCF or BCF file; `None` reads stdin.
    pub fn run(&self, input: Option<&Path>) -> Result<PmReport> {
        self.run_reader(open_reader(input)?)
    }

    pub fn run_reader(&self, mut reader: bcf::Reader) -> Result<PmReport> {
        let mut counts = SiteCounts::default();

        for record in reader.records() {
            let record = record?;
            counts.records_read += 1;
            if counts.records_read % PROGRESS_INTERVAL == 0 {
                debug!("{} M records read", counts.records_read / PROGRESS_INTERVAL);
            }
            self.count_site(&record, &mut counts)?;
        }

        let report = PmReport::new(counts);
        info!("\n{}", report);
        Ok(report)
    }

    fn count_site(&self, record: &Record, counts: &mut SiteCounts) -> Result<()> {
        let alleles = record.alleles();
        let ancestral = match &self.ancestral {
            Some(table) => {
                let contig = contig_name(record)?;
                match table.get(contig, position(record)? + 1) {
                    Some(base) => base,
                    None => {
                        counts.not_in_table += 1;
                        return Ok(());
                    }
                }
            }
            None => match alleles.first().and_then(|a| single_base(a)) {
                Some(base) => base,
                None => {
                    counts.non_snp_omitted += 1;
                    return Ok(());
                }
            },
        };

        // Bit set of called bases; samples with a missing allele are skipped
        let mut called = 0u8;
        let mut snp = true;
        for_each_genotype(record, |_, genotype| {
            if genotype.iter().any(|allele| allele_index(allele).is_none()) {
                return;
            }
            for idx in genotype.iter().filter_map(allele_index) {
                match alleles.get(idx as usize).and_then(|a| single_base(a)) {
                    Some(base) => called |= base_bit(base),
                    None => snp = false,
                }
            }
        })?;

        if !snp {
            counts.non_snp_omitted += 1;
            return Ok(());
        }
        if called == 0 {
            return Err(Error::InvalidFormat(format!(
                "No called genotypes at {}:{}, filter the VCF for missing data first",
                contig_name(record)?,
                position(record)? + 1
            )));
        }
        counts.classify(called, base_bit(ancestral));
        Ok(())
    }
}

fn single_base(seq: &[u8]) -> Option<u8> {
    match seq {
        [base] if matches!(base.to_ascii_uppercase(), b'A' | b'C' | b'G' | b'T') => {
            Some(base.to_ascii_uppercase())
        }
        _ => None,
    }
}

fn base_bit(base: u8) -> u8 {
    match base {
        b'A' => 1,
        b'C' => 2,
        b'G' => 4,
        _ => 8,
    }
}

/// True for a purine or pyrimidine pair: A/G or C/T.
fn is_transition(pair: u8) -> bool {
    pair == (1 | 4) || pair == (2 | 8)
}

/// Site class counts.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct SiteCounts {
    pub records_read: usize,
    /// Sites missing from the ancestral table
    pub not_in_table: usize,
    pub non_snp_omitted: usize,
    pub multiallelic_omitted: usize,
    pub monomorphic: usize,
    /// Sites with two called bases, double mutations included
    pub polymorphic: usize,
    /// Polymorphic sites and fixed differences, double mutations excluded
    pub diverged: usize,
    pub transitions: usize,
    pub transversions: usize,
    pub double_mutations: usize,
    pub double_mutation_transitions: f64,
    pub double_mutation_transversions: f64,
}

impl SiteCounts {
    /// Classify one site from its called-base and ancestral-base bit sets.
    pub fn classify(&mut self, called: u8, ancestral: u8) {
        let count = called.count_ones();
        if count > 2 {
            self.multiallelic_omitted += 1;
            return;
        }
        if count == 2 {
            self.polymorphic += 1;
        }

        let has_ancestral = (called & ancestral) != 0;
        if count == 1 && has_ancestral {
            self.monomorphic += 1;
        } else if count == 1 || has_ancestral {
            self.diverged += 1;
            if is_transition(called | ancestral) {
                self.transitions += 1;
            } else {
                self.transversions += 1;
            }
        } else {
            self.double_mutations += 1;
            for bit in [1u8, 2, 4, 8] {
                if called & bit == 0 {
                    continue;
                }
                if is_transition(bit | ancestral) {
                    self.double_mutation_transitions += 0.5;
                } else {
                    self.double_mutation_transversions += 0.5;
                }
            }
        }
    }

    /// Sites that entered the estimate.
    pub fn included(&self) -> usize {
        self.monomorphic + self.diverged + self.double_mutations
    }
}

/// Transition and transversion rates and the Pm estimates built on them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimates {
    pub alpha: Option<f64>,
    pub beta: Option<f64>,
    pub kappa: Option<f64>,
    pub pm: Option<f64>,
    pub pm_kappa: Option<f64>,
}

impl Estimates {
    fn new(alpha: Option<f64>, beta: Option<f64>, pd: Option<f64>) -> Self {
        let finite = |v: f64| v.is_finite().then_some(v);
        let kappa = alpha.zip(beta).and_then(|(a, b)| finite(2.0 * a / b));
        let pm = alpha
            .zip(beta)
            .zip(pd)
            .and_then(|((a, b), pd)| finite((a * a + 2.0 * b * b) / (2.0 * b * (2.0 * a + b)) * pd));
        let pm_kappa = kappa
            .zip(pd)
            .and_then(|(k, pd)| finite((k * k + 2.0) / (4.0 * k + 2.0) * pd));
        Self {
            alpha,
            beta,
            kappa,
            pm,
            pm_kappa,
        }
    }
}

fn ratio(numerator: f64, denominator: f64) -> Option<f64> {
    (denominator != 0.0).then(|| numerator / denominator)
}

/// Counts and estimates of a Pm run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PmReport {
    pub counts: SiteCounts,
    /// Share of polymorphic sites that are double mutations
    pub pd: Option<f64>,
    /// Rates from diverged sites only
    pub estimates: Estimates,
    /// Rates with double mutations included
    pub double_mutation_estimates: Estimates,
}

impl PmReport {
    pub fn new(counts: SiteCounts) -> Self {
        let pd = ratio(counts.double_mutations as f64, counts.polymorphic as f64);
        let diverged = counts.diverged as f64;
        let estimates = Estimates::new(
            ratio(counts.transitions as f64, diverged),
            ratio(counts.transversions as f64, diverged),
            pd,
        );
        let with_dm = diverged + counts.double_mutations as f64;
        let double_mutation_estimates = Estimates::new(
            ratio(
                counts.transitions as f64 + counts.double_mutation_transitions,
                with_dm,
            ),
            ratio(
                counts.transversions as f64 + counts.double_mutation_transversions,
                with_dm,
            ),
            pd,
        );
        Self {
            counts,
            pd,
            estimates,
            double_mutation_estimates,
        }
    }
}

struct Value(Option<f64>);

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(v) => write!(f, "{}", v),
            None => f.write_str("NA"),
        }
    }
}

fn write_estimates(f: &mut fmt::Formatter<'_>, e: &Estimates) -> fmt::Result {
    writeln!(f, "Alpha\t{}", Value(e.alpha))?;
    writeln!(f, "Beta\t{}", Value(e.beta))?;
    writeln!(f, "Kappa (2 * alpha / beta)\t{}", Value(e.kappa))?;
    writeln!(
        f,
        "Pm ((alpha^2 + 2 * beta^2) / (2 * beta * (2 * alpha + beta)) * Pd)\t{}",
        Value(e.pm)
    )?;
    write!(
        f,
        "Pm from kappa ((kappa^2 + 2) / (4 * kappa + 2) * Pd)\t{}",
        Value(e.pm_kappa)
    )
}

impl fmt::Display for PmReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = &self.counts;
        writeln!(f, "Sites included in analysis\t{}", c.included())?;
        writeln!(
            f,
            "Sites included in analysis (excluding double mutations)\t{}",
            c.monomorphic + c.diverged
        )?;
        writeln!(f, "Tri- and tetra-allelic sites omitted\t{}", c.multiallelic_omitted)?;
        writeln!(f, "Non-SNP sites omitted\t{}", c.non_snp_omitted)?;
        writeln!(f, "Monomorphic sites\t{}", c.monomorphic)?;
        writeln!(f, "Polymorphic sites\t{}", c.polymorphic)?;
        writeln!(
            f,
            "Polymorphic sites & fixed differences (omitting double mutations)\t{}",
            c.diverged
        )?;
        writeln!(f, "Transitions\t{}", c.transitions)?;
        writeln!(f, "Transversions\t{}", c.transversions)?;
        writeln!(f, "Polymorphic double mutation sites\t{}", c.double_mutations)?;
        writeln!(
            f,
            "Double mutation transitions (x0.5)\t{}",
            c.double_mutation_transitions
        )?;
        writeln!(
            f,
            "Double mutation transversions (x0.5)\t{}",
            c.double_mutation_transversions
        )?;
        writeln!(f)?;
        writeln!(f, "Pd (double mutations / polymorphic sites)\t{}", Value(self.pd))?;
        writeln!(f)?;
        write_estimates(f, &self.estimates)?;
        writeln!(f)?;
        writeln!(f)?;
        writeln!(f, "# With double mutations included in alpha and beta")?;
        write_estimates(f, &self.double_mutation_estimates)
    }
}
