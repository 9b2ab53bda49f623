//! GFF3 to BED conversion.
//!
//! Writes the features of a GFF3 file as BED intervals, optionally limited to
//! some feature types and to a list of feature IDs.

use crate::bed::BedWriter;
use crate::error::{Error, Result};
use crate::gff::GffFeature;
use log::{debug, info};
use rustc_hash::FxHashSet;
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;

/// GFF to BED command configuration.
#[derive(Debug, Clone, Default)]
pub struct GffToBedCommand {
    /// Lowercase feature types to keep; empty keeps every type
    pub feature_types: FxHashSet<String>,
    /// Feature IDs to keep; `None` keeps every feature
    pub ids: Option<FxHashSet<String>>,
    /// Add a GENE_NAME column holding the matched ID
    pub gene_name_column: bool,
}

impl GffToBedCommand {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the feature types from a comma-separated list.
    ///
    /// Matching is case-insensitive; an empty list or `all` keeps every type.
    pub fn with_feature_types(mut self, list: &str) -> Self {
        let list = list.trim().to_lowercase();
        self.feature_types = if list.is_empty() || list == "all" {
            FxHashSet::default()
        } else {
            list.split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect()
        };
        self
    }

    pub fn with_ids(mut self, ids: FxHashSet<String>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn with_gene_name_column(mut self, enabled: bool) -> Self {
        self.gene_name_column = enabled;
        self
    }

    /// Convert a GFF3 file.
    pub fn run<P: AsRef<Path>, W: Write>(&self, input: P, output: &mut W) -> Result<GffStats> {
        let file = File::open(input.as_ref())?;
        let stats = self.run_streaming(BufReader::with_capacity(64 * 1024, file), output)?;
        info!(
            "{}/{} features kept",
            stats.features_written, stats.features_found
        );
        Ok(stats)
    }

    /// Core conversion loop.
    pub fn run_streaming<R: BufRead, W: Write>(
        &self,
        mut reader: R,
        output: &mut W,
    ) -> Result<GffStats> {
        if self.gene_name_column && self.ids.is_none() {
            return Err(Error::InvalidFormat(
                "The gene name column needs an ID list".to_string(),
            ));
        }

        let mut writer = BedWriter::new(output);
        if self.gene_name_column {
            writer.write_header("#CHR\tSTART\tEND\tGENE_NAME")?;
        } else {
            writer.write_header("#CHR\tSTART\tEND")?;
        }

        let mut stats = GffStats::default();
        let mut buffer = String::new();
        let mut line_number = 0;
        loop {
            buffer.clear();
            if reader.read_line(&mut buffer)? == 0 {
                break;
            }
            line_number += 1;

            let line = buffer.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some(feature) = GffFeature::parse(line, line_number)? else {
                continue;
            };
            stats.features_found += 1;

            let id = match &self.ids {
                Some(ids) => match feature.id().filter(|id| ids.contains(*id)) {
                    Some(id) => Some(id),
                    None => continue,
                },
                None => None,
            };

            let feature_type = feature.feature_type.to_lowercase();
            if !self.feature_types.is_empty() && !self.feature_types.contains(&feature_type) {
                continue;
            }

            let start = feature.bed_start();
            match id {
                Some(id) if self.gene_name_column => {
                    writer.write_bed4_line(feature.seqid, start, feature.end, id)?
                }
                _ => writer.write_bed3_line(feature.seqid, start, feature.end)?,
            }
            stats.record(feature_type, feature.end - start);
        }
        writer.flush()?;
        Ok(stats)
    }
}

/// Read a feature ID list, one ID per line.
pub fn read_id_list<P: AsRef<Path>>(path: P) -> Result<FxHashSet<String>> {
    parse_id_list(File::open(path)?)
}

/// Parse a feature ID list from any reader. Blank lines are ignored.
pub fn parse_id_list<R: Read>(reader: R) -> Result<FxHashSet<String>> {
    let mut ids = FxHashSet::default();
    for line in BufReader::new(reader).lines() {
        let line = line?;
        let line = line.trim();
        if !line.is_empty() {
            ids.insert(line.to_string());
        }
    }
    debug!("{} IDs found", ids.len());
    Ok(ids)
}

/// Number and total length of written features of one type.
///
/// Lengths are those of the written BED intervals, `end - (start - 1)` in
/// GFF coordinates. GFF ranges include both ends, so a one-base feature
/// (`start == end`) counts as 1 rather than 0.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FeatureTally {
    pub count: usize,
    pub length: u64,
}

/// Statistics from a GFF conversion.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GffStats {
    pub features_found: usize,
    pub features_written: usize,
    /// Per lowercase feature type
    pub by_type: BTreeMap<String, FeatureTally>,
}

impl GffStats {
    fn record(&mut self, feature_type: String, length: u64) {
        self.features_written += 1;
        let tally = self.by_type.entry(feature_type).or_default();
        tally.count += 1;
        tally.length += length;
    }
}

impl fmt::Display for GffStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "feature\tnumber_included\tlength_of_sequence_included")?;
        for (feature_type, tally) in &self.by_type {
            write!(f, "\n{}\t{}\t{}", feature_type, tally.count, tally.length)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GFF: &str = "##gff-version 3\n\
scaf1\tmaker\tgene\t1\t1000\t.\t+\t.\tID=gene1;Name=a\n\
scaf1\tmaker\tmRNA\t1\t1000\t.\t+\t.\tID=gene1-RA;Parent=gene1\n\
scaf1\tmaker\texon\t101\t200\t.\t+\t.\tID=gene1:exon:1;Parent=gene1-RA\n\
scaf1\tmaker\tEXON\t301\t350\t.\t+\t.\tID=gene1:exon:2;Parent=gene1-RA\n\
scaf2\tmaker\texon\t11\t20\t.\t-\t.\tID=gene2:exon:1;Parent=gene2-RA\n\
broken line\n";

    fn convert(cmd: &GffToBedCommand) -> Result<(String, GffStats)> {
        let mut output = Vec::new();
        let stats = cmd.run_streaming(GFF.as_bytes(), &mut output)?;
        Ok((String::from_utf8(output).unwrap(), stats))
    }

    #[test]
    fn test_all_features() {
        let (bed, stats) = convert(&GffToBedCommand::new().with_feature_types("all")).unwrap();
        assert_eq!(
            bed,
            "#CHR\tSTART\tEND\n\
scaf1\t0\t1000\nscaf1\t0\t1000\nscaf1\t100\t200\nscaf1\t300\t350\nscaf2\t10\t20\n"
        );
        assert_eq!(stats.features_found, 5);
        assert_eq!(stats.features_written, 5);
        assert_eq!(
            stats.by_type["exon"],
            FeatureTally {
                count: 3,
                length: 160
            }
        );
    }

    #[test]
    fn test_feature_type_filter_is_case_insensitive() {
        let cmd = GffToBedCommand::new().with_feature_types("Exon, gene");
        let (bed, stats) = convert(&cmd).unwrap();
        assert_eq!(stats.features_written, 4);
        assert!(!bed.contains("scaf1\t0\t1000\nscaf1\t0\t1000"));
        assert_eq!(stats.by_type.len(), 2);
    }

    #[test]
    fn test_id_list_with_gene_name() {
        let ids = parse_id_list("gene2\n\n  gene1  \n".as_bytes()).unwrap();
        let cmd = GffToBedCommand::new()
            .with_feature_types("exon")
            .with_ids(ids)
            .with_gene_name_column(true);
        let (bed, _) = convert(&cmd).unwrap();
        assert_eq!(
            bed,
            "#CHR\tSTART\tEND\tGENE_NAME\n\
scaf1\t100\t200\tgene1\nscaf1\t300\t350\tgene1\nscaf2\t10\t20\tgene2\n"
        );
    }

    #[test]
    fn test_id_list_filters_features() {
        let ids = parse_id_list("gene2\n".as_bytes()).unwrap();
        let (bed, stats) = convert(&GffToBedCommand::new().with_ids(ids)).unwrap();
        assert_eq!(bed, "#CHR\tSTART\tEND\nscaf2\t10\t20\n");
        assert_eq!(stats.features_found, 5);
    }

    #[test]
    fn test_gene_name_needs_ids() {
        let cmd = GffToBedCommand::new().with_gene_name_column(true);
        assert!(matches!(convert(&cmd), Err(Error::InvalidFormat(_))));
    }

    #[test]
    fn test_single_base_feature_has_length_one() {
        let gff = "ctg\tsrc\tSNP\t42\t42\t.\t+\t.\tID=s1\n";
        let mut output = Vec::new();
        let stats = GffToBedCommand::new()
            .run_streaming(gff.as_bytes(), &mut output)
            .unwrap();
        assert_eq!(String::from_utf8(output).unwrap(), "#CHR\tSTART\tEND\nctg\t41\t42\n");
        assert_eq!(
            stats.by_type["snp"],
            FeatureTally {
                count: 1,
                length: 1
            }
        );
    }

    #[test]
    fn test_stats_display() {
        let (_, stats) = convert(&GffToBedCommand::new()).unwrap();
        let table = stats.to_string();
        assert!(table.starts_with("feature\tnumber_included"));
        assert!(table.contains("\ngene\t1\t1000"));
        assert!(table.contains("\nmrna\t1\t1000"));
    }
}
