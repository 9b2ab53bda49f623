//! BED3 reading and writing.
//!
//! Masks are read with [`BedReader`] and turned into a [`BedMask`] for
//! position lookups; tool output goes through [`BedWriter`].

use crate::error::{Error, Result};
use crate::interval::Interval;
use crate::parsing::tab_fields;
use rustc_hash::FxHashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

/// A streaming BED3 reader. Extra columns are ignored.
pub struct BedReader<R: Read> {
    reader: BufReader<R>,
    line_number: usize,
    buffer: String,
}

impl BedReader<File> {
    /// Open a BED file from a path.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(file))
    }
}

impl<R: Read> BedReader<R> {
    /// Create a new BED reader from any readable source.
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            line_number: 0,
            buffer: String::with_capacity(1024),
        }
    }

    /// Move to the next data line; `false` at end of input.
    fn next_data_line(&mut self) -> Result<bool> {
        loop {
            self.buffer.clear();
            let bytes_read = self.reader.read_line(&mut self.buffer)?;
            if bytes_read == 0 {
                return Ok(false);
            }
            self.line_number += 1;

            // Skip empty lines and comments
            let line = self.buffer.trim();
            if line.is_empty()
                || line.starts_with('#')
                || line.starts_with("track")
                || line.starts_with("browser")
            {
                continue;
            }
            return Ok(true);
        }
    }

    /// Read the next interval.
    pub fn read_interval(&mut self) -> Result<Option<Interval>> {
        if !self.next_data_line()? {
            return Ok(None);
        }
        self.parse_line(self.buffer.trim()).map(Some)
    }

    /// Read the next interval along with its fourth (name) column.
    pub fn read_region(&mut self) -> Result<Option<BedRegion>> {
        if !self.next_data_line()? {
            return Ok(None);
        }
        let line = self.buffer.trim();
        let interval = self.parse_line(line)?;
        let name = tab_fields(line).nth(3).map(str::to_string);
        Ok(Some(BedRegion { interval, name }))
    }

    fn parse_line(&self, line: &str) -> Result<Interval> {
        let mut fields = tab_fields(line);
        let (Some(chrom), Some(start), Some(end)) = (fields.next(), fields.next(), fields.next())
        else {
            return Err(Error::parse(self.line_number, "Expected at least 3 fields"));
        };

        let start = self.parse_position(start, "start")?;
        let end = self.parse_position(end, "end")?;
        if start > end {
            return Err(Error::parse(
                self.line_number,
                format!("Start ({}) > end ({})", start, end),
            ));
        }

        Ok(Interval::new(chrom, start, end))
    }

    fn parse_position(&self, s: &str, field_name: &str) -> Result<u64> {
        s.parse().map_err(|_| {
            Error::parse(
                self.line_number,
                format!("Invalid {} position: '{}'", field_name, s),
            )
        })
    }

    /// Get an iterator over all intervals.
    pub fn intervals(self) -> BedIntervalIter<R> {
        BedIntervalIter { reader: self }
    }
}

/// Iterator over BED intervals.
pub struct BedIntervalIter<R: Read> {
    reader: BedReader<R>,
}

impl<R: Read> Iterator for BedIntervalIter<R> {
    type Item = Result<Interval>;

    fn next(&mut self) -> Option<Self::Item> {
        self.reader.read_interval().transpose()
    }
}

/// Read all intervals from a BED file.
pub fn read_intervals<P: AsRef<Path>>(path: P) -> Result<Vec<Interval>> {
    BedReader::from_path(path)?.intervals().collect()
}

/// Parse intervals from a string (useful for testing).
pub fn parse_intervals(content: &str) -> Result<Vec<Interval>> {
    BedReader::new(content.as_bytes()).intervals().collect()
}

/// A BED interval with its optional name column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BedRegion {
    pub interval: Interval,
    pub name: Option<String>,
}

/// Read every region of a BED file, keeping name columns.
pub fn read_regions<P: AsRef<Path>>(path: P) -> Result<Vec<BedRegion>> {
    collect_regions(BedReader::from_path(path)?)
}

/// Parse regions from a string.
pub fn parse_regions(content: &str) -> Result<Vec<BedRegion>> {
    collect_regions(BedReader::new(content.as_bytes()))
}

fn collect_regions<R: Read>(mut reader: BedReader<R>) -> Result<Vec<BedRegion>> {
    let mut regions = Vec::new();
    while let Some(region) = reader.read_region()? {
        regions.push(region);
    }
    Ok(regions)
}

/// Position lookup over a set of BED intervals, in any order.
///
/// Intervals are sorted and merged per contig on construction, so a
/// lookup is a binary search.
#[derive(Debug, Clone, Default)]
pub struct BedMask {
    spans: FxHashMap<String, Vec<(u64, u64)>>,
}

impl BedMask {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a mask from a BED file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::from_intervals(read_intervals(path)?))
    }

    /// Build a mask from intervals.
    pub fn from_intervals<I: IntoIterator<Item = Interval>>(intervals: I) -> Self {
        let mut spans: FxHashMap<String, Vec<(u64, u64)>> = FxHashMap::default();
        for iv in intervals {
            if !iv.is_empty() {
                spans.entry(iv.chrom).or_default().push((iv.start, iv.end));
            }
        }
        for list in spans.values_mut() {
            list.sort_unstable();
            let mut merged: Vec<(u64, u64)> = Vec::with_capacity(list.len());
            for &(start, end) in list.iter() {
                match merged.last_mut() {
                    Some(last) if start <= last.1 => last.1 = last.1.max(end),
                    _ => merged.push((start, end)),
                }
            }
            *list = merged;
        }
        Self { spans }
    }

    /// Check whether the 0-based `pos` on `chrom` is masked.
    #[inline]
    pub fn contains(&self, chrom: &str, pos: u64) -> bool {
        let Some(list) = self.spans.get(chrom) else {
            return false;
        };
        let idx = list.partition_point(|&(start, _)| start <= pos);
        idx > 0 && pos < list[idx - 1].1
    }

    /// Total number of masked bases.
    pub fn total_len(&self) -> u64 {
        self.spans
            .values()
            .flat_map(|list| list.iter().map(|&(s, e)| e - s))
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }
}

/// Buffer size for BedWriter.
const DEFAULT_BUFFER_SIZE: usize = 256 * 1024;

/// Buffered BED output writer.
///
/// Uses itoa for coordinate formatting to avoid allocation per line.
pub struct BedWriter<W: Write> {
    writer: BufWriter<W>,
    itoa_buf: itoa::Buffer,
    lines_written: usize,
}

impl<W: Write> BedWriter<W> {
    pub fn new(output: W) -> Self {
        Self::with_capacity(DEFAULT_BUFFER_SIZE, output)
    }

    pub fn with_capacity(capacity: usize, output: W) -> Self {
        Self {
            writer: BufWriter::with_capacity(capacity, output),
            itoa_buf: itoa::Buffer::new(),
            lines_written: 0,
        }
    }

    /// Write a raw header line (a trailing newline is added).
    pub fn write_header(&mut self, header: &str) -> io::Result<()> {
        self.writer.write_all(header.as_bytes())?;
        self.writer.write_all(b"\n")
    }

    /// Write a BED3 line.
    #[inline]
    pub fn write_bed3_line(&mut self, chrom: &str, start: u64, end: u64) -> io::Result<()> {
        self.writer.write_all(chrom.as_bytes())?;
        self.writer.write_all(b"\t")?;
        self.writer
            .write_all(self.itoa_buf.format(start).as_bytes())?;
        self.writer.write_all(b"\t")?;
        self.writer.write_all(self.itoa_buf.format(end).as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.lines_written += 1;
        Ok(())
    }

    /// Write a BED3 line with one extra name column.
    #[inline]
    pub fn write_bed4_line(
        &mut self,
        chrom: &str,
        start: u64,
        end: u64,
        name: &str,
    ) -> io::Result<()> {
        self.writer.write_all(chrom.as_bytes())?;
        self.writer.write_all(b"\t")?;
        self.writer
            .write_all(self.itoa_buf.format(start).as_bytes())?;
        self.writer.write_all(b"\t")?;
        self.writer.write_all(self.itoa_buf.format(end).as_bytes())?;
        self.writer.write_all(b"\t")?;
        self.writer.write_all(name.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.lines_written += 1;
        Ok(())
    }

    /// Write an interval as a BED3 line.
    #[inline]
    pub fn write_interval(&mut self, interval: &Interval) -> io::Result<()> {
        self.write_bed3_line(&interval.chrom, interval.start, interval.end)
    }

    /// Number of data lines written (headers excluded).
    pub fn lines_written(&self) -> usize {
        self.lines_written
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bed3() {
        let content = "chr1\t100\t200\nchr1\t300\t400\tname\n";
        let intervals = parse_intervals(content).unwrap();

        assert_eq!(intervals.len(), 2);
        assert_eq!(intervals[0], Interval::new("chr1", 100, 200));
        assert_eq!(intervals[1], Interval::new("chr1", 300, 400));
    }

    #[test]
    fn test_skip_comments_and_track_lines() {
        let content = "#CHR\tSTART\tEND\ntrack name=test\nbrowser position chr1:1-1000\nchr1\t100\t200\n";
        let intervals = parse_intervals(content).unwrap();

        assert_eq!(intervals.len(), 1);
    }

    #[test]
    fn test_invalid_bed() {
        assert!(parse_intervals("chr1\t100\n").is_err());
        assert!(parse_intervals("chr1\t200\t100\n").is_err());
        assert!(matches!(
            parse_intervals("chr1\tx\t100\n"),
            Err(Error::Parse { line: 1, .. })
        ));
    }

    #[test]
    fn test_regions_keep_name_column() {
        let regions = parse_regions("#CHR\tSTART\tEND\tGENE_NAME\nctg\t4\t9\tg2\nctg\t20\t30\n").unwrap();

        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].interval, Interval::new("ctg", 4, 9));
        assert_eq!(regions[0].name.as_deref(), Some("g2"));
        assert_eq!(regions[1].name, None);
        assert!(matches!(
            parse_regions("ctg\t9\t4\tg1\n"),
            Err(Error::Parse { line: 1, .. })
        ));
    }

    #[test]
    fn test_mask_lookup() {
        let mask = BedMask::from_intervals(parse_intervals("chr1\t50\t60\nchr1\t10\t20\nchr1\t15\t30\nchr2\t0\t1\n").unwrap());

        assert!(!mask.contains("chr1", 9));
        assert!(mask.contains("chr1", 10));
        assert!(mask.contains("chr1", 29));
        assert!(!mask.contains("chr1", 30));
        assert!(mask.contains("chr1", 55));
        assert!(!mask.contains("chr1", 60));
        assert!(mask.contains("chr2", 0));
        assert!(!mask.contains("chr3", 0));
        assert_eq!(mask.total_len(), 20 + 10 + 1);
    }

    #[test]
    fn test_writer() {
        let mut out = Vec::new();
        {
            let mut writer = BedWriter::new(&mut out);
            writer.write_header("#CHR\tSTART\tEND").unwrap();
            writer.write_interval(&Interval::new("chr1", 0, 10)).unwrap();
            writer.write_bed4_line("chr2", 5, 6, "gene1").unwrap();
            assert_eq!(writer.lines_written(), 2);
            writer.flush().unwrap();
        }
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "#CHR\tSTART\tEND\nchr1\t0\t10\nchr2\t5\t6\tgene1\n"
        );
    }
}
