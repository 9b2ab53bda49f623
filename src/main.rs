//! popmask: site-mask and interval tools for population-genomics pipelines
//!
//! Usage: popmask <COMMAND> [OPTIONS]

use clap::{ArgAction, Parser, Subcommand};
use log::info;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;

use popmask::bed::{read_regions, BedMask};
use popmask::commands::{
    read_id_list, AlleleCountCommand, AncestralTable, CoverageOutlierCommand, GffToBedCommand,
    ParalogAreaCommand, PimaticCommand, PmEstimaticCommand, VariantDensityCommand,
    VcfToFastqCommand,
};
use popmask::error::Result;
use popmask::genome::Genome;
use popmask::log_utils::{init_log, LogLevel};

#[derive(Parser)]
#[command(name = "popmask")]
#[command(version)]
#[command(about = "popmask: site-mask and interval tools for population-genomics pipelines", long_about = None)]
struct Cli {
    /// Minimum level of log messages written to stderr
    #[arg(long, value_enum, global = true, default_value_t = LogLevel::Info)]
    loglevel: LogLevel,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mark areas whose depth is more than k MADs away from the median
    CoverageOutliers {
        /// Per-base depth table (bedtools genomecov -d output)
        #[arg(short, long)]
        input: PathBuf,

        /// Output BED file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Allowed distance from the median depth, in MADs
        #[arg(short = 'm', long = "mad", default_value = "3.0")]
        mad_multiplier: f64,

        /// Count zero-depth sites in the depth statistics
        #[arg(short = 'z', long, default_value_t = true, action = ArgAction::Set)]
        include_zeros: bool,

        /// BED file of sites to leave out of the analysis
        #[arg(short = 'b', long)]
        omit_bed: Option<PathBuf>,
    },

    /// Mark areas where too many samples are heterozygous
    ParalogAreas {
        /// Input VCF file
        #[arg(short, long)]
        input: PathBuf,

        /// Output BED file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Genome file (contig<TAB>size)
        #[arg(short = 'g', long)]
        genome: PathBuf,

        /// Highest tolerated number of heterozygous samples per site
        #[arg(short = 'M', long, default_value = "0")]
        max_heterozygotes: usize,

        /// Bases added on both sides of every area
        #[arg(short = 'r', long, default_value = "0")]
        remove_range: u64,
    },

    /// Remove VCF records in areas with too many variants
    VariantDensity {
        /// Input VCF file
        #[arg(short, long)]
        input: PathBuf,

        /// Output VCF file; a summary is written to <OUTPUT>.log
        #[arg(short, long)]
        output: PathBuf,

        /// Sliding window size in bases
        #[arg(short = 's', long)]
        window_size: u64,

        /// Highest tolerated number of variants in one window
        #[arg(short = 'm', long)]
        max_variants: usize,

        /// Bases removed on both sides of a dense area
        #[arg(short = 'r', long, default_value = "0")]
        remove_range: u64,

        /// Genome file used to clamp removed areas to contig ends
        #[arg(short = 'g', long)]
        genome: Option<PathBuf>,

        /// Also write the removed areas as BED
        #[arg(long)]
        bed: Option<PathBuf>,
    },

    /// Keep VCF sites by the number of alleles observed in the samples
    AlleleCount {
        /// Input VCF file (use - for stdin, default: stdin)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Output VCF file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Fewest distinct alleles a kept site may have
        #[arg(short = 'm', long)]
        min_alleles: Option<usize>,

        /// Most distinct alleles a kept site may have
        #[arg(short = 'x', long)]
        max_alleles: Option<usize>,
    },

    /// Convert GFF3 features to BED
    GffToBed {
        /// Input GFF3 file
        #[arg(short, long)]
        input: PathBuf,

        /// Output BED file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Comma-separated feature types to keep (default: all)
        #[arg(short = 'f', long)]
        feature_types: Option<String>,

        /// File listing the feature IDs to keep, one per line
        #[arg(short = 'I', long)]
        id_list: Option<PathBuf>,

        /// Add a GENE_NAME column with the matched ID (needs --id-list)
        #[arg(short = 'g', long)]
        gene_name: bool,
    },

    /// Convert a single-sample VCF to FASTQ, one entry per contig
    Vcf2fastq {
        /// Input VCF file (use - for stdin, default: stdin)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Output FASTQ file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Pairwise nucleotide diversity of haploid samples per BED region
    Pimatic {
        /// Input VCF file (use - for stdin, default: stdin)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Output table (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// BED file of the regions to analyse
        #[arg(short = 'b', long)]
        bed: PathBuf,

        /// The BED fourth column holds gene IDs; regions sharing one are pooled
        #[arg(short = 'g', long)]
        gene_ids: bool,

        /// Fewest called samples a site needs to be used
        #[arg(short = 'm', long, default_value = "0")]
        min_genotypes: usize,

        /// Fewest compared sites a pair needs in a region, else NA
        #[arg(short = 's', long, default_value = "0")]
        min_sites: u64,
    },

    /// Estimate the probability of ancestral misorientation (Pm)
    PmEstimatic {
        /// Input VCF file (use - for stdin, default: stdin)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Output report (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Table of ancestral bases (contig, position, base; one header line)
        #[arg(short = 'a', long)]
        ancestral: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_log(cli.loglevel) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }

    let result = match cli.command {
        Commands::CoverageOutliers {
            input,
            output,
            mad_multiplier,
            include_zeros,
            omit_bed,
        } => run_coverage_outliers(input, output, mad_multiplier, include_zeros, omit_bed),

        Commands::ParalogAreas {
            input,
            output,
            genome,
            max_heterozygotes,
            remove_range,
        } => run_paralog_areas(input, output, genome, max_heterozygotes, remove_range),

        Commands::VariantDensity {
            input,
            output,
            window_size,
            max_variants,
            remove_range,
            genome,
            bed,
        } => run_variant_density(
            input,
            output,
            window_size,
            max_variants,
            remove_range,
            genome,
            bed,
        ),

        Commands::AlleleCount {
            input,
            output,
            min_alleles,
            max_alleles,
        } => run_allele_count(input, output, min_alleles, max_alleles),

        Commands::GffToBed {
            input,
            output,
            feature_types,
            id_list,
            gene_name,
        } => run_gff_to_bed(input, output, feature_types, id_list, gene_name),

        Commands::Vcf2fastq { input, output } => run_vcf2fastq(input, output),

        Commands::Pimatic {
            input,
            output,
            bed,
            gene_ids,
            min_genotypes,
            min_sites,
        } => run_pimatic(input, output, bed, gene_ids, min_genotypes, min_sites),

        Commands::PmEstimatic {
            input,
            output,
            ancestral,
        } => run_pm_estimatic(input, output, ancestral),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Open the output file, or stdout when no path is given.
fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    Ok(match path {
        Some(path) => Box::new(File::create(path)?),
        None => Box::new(io::stdout().lock()),
    })
}

fn run_coverage_outliers(
    input: PathBuf,
    output: Option<PathBuf>,
    mad_multiplier: f64,
    include_zeros: bool,
    omit_bed: Option<PathBuf>,
) -> Result<()> {
    let mut cmd = CoverageOutlierCommand::new()
        .with_mad_multiplier(mad_multiplier)
        .with_include_zeros(include_zeros);
    if let Some(path) = omit_bed {
        let mask = BedMask::from_path(&path)?;
        info!("{} bases omitted from the analysis", mask.total_len());
        cmd = cmd.with_omit(mask);
    }

    let mut out = open_output(output.as_deref())?;
    let stats = cmd.run(&input, &mut out)?;
    info!("\n{}", stats);
    Ok(())
}

fn run_paralog_areas(
    input: PathBuf,
    output: Option<PathBuf>,
    genome_path: PathBuf,
    max_heterozygotes: usize,
    remove_range: u64,
) -> Result<()> {
    let genome = Genome::from_file(&genome_path)?;
    let cmd = ParalogAreaCommand::new()
        .with_max_heterozygotes(max_heterozygotes)
        .with_remove_range(remove_range);

    let mut out = open_output(output.as_deref())?;
    cmd.run(&input, &genome, &mut out)?;
    Ok(())
}

fn run_variant_density(
    input: PathBuf,
    output: PathBuf,
    window_size: u64,
    max_variants: usize,
    remove_range: u64,
    genome_path: Option<PathBuf>,
    bed: Option<PathBuf>,
) -> Result<()> {
    let genome = genome_path.map(Genome::from_file).transpose()?;
    let cmd = VariantDensityCommand::new(window_size, max_variants).with_remove_range(remove_range);

    let mut out = File::create(&output)?;
    let report = cmd.run(&input, genome.as_ref(), &mut out)?;

    let mut log_path = output.into_os_string();
    log_path.push(".log");
    report.write_log(&log_path)?;
    if let Some(path) = bed {
        report.write_bed(File::create(path)?)?;
    }
    Ok(())
}

fn run_allele_count(
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    min_alleles: Option<usize>,
    max_alleles: Option<usize>,
) -> Result<()> {
    let cmd = AlleleCountCommand {
        min_alleles,
        max_alleles,
    };
    cmd.run(input.as_deref(), output.as_deref())?;
    Ok(())
}

fn run_gff_to_bed(
    input: PathBuf,
    output: Option<PathBuf>,
    feature_types: Option<String>,
    id_list: Option<PathBuf>,
    gene_name: bool,
) -> Result<()> {
    let mut cmd = GffToBedCommand::new()
        .with_feature_types(feature_types.as_deref().unwrap_or("all"))
        .with_gene_name_column(gene_name);
    if let Some(path) = id_list {
        cmd = cmd.with_ids(read_id_list(&path)?);
    }

    let mut out = open_output(output.as_deref())?;
    let stats = cmd.run(&input, &mut out)?;
    info!("\n{}", stats);
    Ok(())
}

fn run_vcf2fastq(input: Option<PathBuf>, output: Option<PathBuf>) -> Result<()> {
    let mut out = open_output(output.as_deref())?;
    VcfToFastqCommand::new().run(input.as_deref(), &mut out)?;
    Ok(())
}

fn run_pimatic(
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    bed: PathBuf,
    gene_ids: bool,
    min_genotypes: usize,
    min_sites: u64,
) -> Result<()> {
    let regions = read_regions(&bed)?;
    info!("Read {} BED regions", regions.len());
    let cmd = PimaticCommand::new()
        .with_gene_ids(gene_ids)
        .with_min_genotypes(min_genotypes)
        .with_min_sites(min_sites);

    let mut out = open_output(output.as_deref())?;
    cmd.run(input.as_deref(), &regions, &mut out)?;
    Ok(())
}

fn run_pm_estimatic(
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    ancestral: Option<PathBuf>,
) -> Result<()> {
    let mut cmd = PmEstimaticCommand::new();
    if let Some(path) = ancestral {
        cmd = cmd.with_ancestral(AncestralTable::from_path(&path)?);
    }

    let report = cmd.run(input.as_deref())?;
    let mut out = open_output(output.as_deref())?;
    writeln!(out, "{}", report)?;
    Ok(())
}
