//! Per-base depth table reader (`bedtools genomecov -d` output).
//!
//! Each data line has exactly three tab-separated columns: contig, 1-based
//! position and depth. Records are lent from an internal line buffer.

use crate::error::{Error, Result};
use crate::parsing::{parse_u64_fast, tab_fields};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

/// One line of a depth table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthRecord<'a> {
    pub chrom: &'a str,
    /// 0-based position
    pub position: u64,
    pub depth: u64,
}

/// Streaming reader for per-base depth tables.
pub struct DepthReader<R: Read> {
    reader: BufReader<R>,
    line_number: usize,
    buffer: String,
}

impl DepthReader<File> {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(file))
    }
}

impl<R: Read> DepthReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::with_capacity(64 * 1024, reader),
            line_number: 0,
            buffer: String::with_capacity(256),
        }
    }

    /// Line number of the last record returned.
    pub fn line_number(&self) -> usize {
        self.line_number
    }

    /// Read the next depth record.
    ///
    /// Blank lines, comments and lines with fewer than three columns are
    /// skipped. More than three columns, position 0 or a non-numeric value
    /// is a parse error.
    pub fn read_record(&mut self) -> Result<Option<DepthRecord<'_>>> {
        loop {
            self.buffer.clear();
            if self.reader.read_line(&mut self.buffer)? == 0 {
                return Ok(None);
            }
            self.line_number += 1;

            let line = self.buffer.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let field_count = tab_fields(line).count();
            if field_count < 3 {
                continue;
            }
            if field_count > 3 {
                return Err(Error::parse(
                    self.line_number,
                    format!("Coverage table should have 3 columns, found {}", field_count),
                ));
            }
            break;
        }

        let line_number = self.line_number;
        let mut fields = tab_fields(self.buffer.trim());
        let (Some(chrom), Some(position), Some(depth)) = (fields.next(), fields.next(), fields.next())
        else {
            return Err(Error::parse(line_number, "Expected 3 fields"));
        };

        let position = parse_u64_fast(position.as_bytes()).ok_or_else(|| {
            Error::parse(line_number, format!("Invalid position: '{}'", position))
        })?;
        if position == 0 {
            return Err(Error::parse(
                line_number,
                "Positions should start from 1, not 0 (use genomecov -d output)",
            ));
        }
        let depth = parse_u64_fast(depth.as_bytes())
            .ok_or_else(|| Error::parse(line_number, format!("Invalid depth: '{}'", depth)))?;

        Ok(Some(DepthRecord {
            chrom,
            position: position - 1,
            depth,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_depth_table() {
        let content = "chr1\t1\t10\n\nchr1\t2\t0\nshort\tline\nchr2\t1\t7\n";
        let mut reader = DepthReader::new(content.as_bytes());

        let rec = reader.read_record().unwrap().unwrap();
        assert_eq!((rec.chrom, rec.position, rec.depth), ("chr1", 0, 10));
        let rec = reader.read_record().unwrap().unwrap();
        assert_eq!((rec.chrom, rec.position, rec.depth), ("chr1", 1, 0));
        let rec = reader.read_record().unwrap().unwrap();
        assert_eq!((rec.chrom, rec.position, rec.depth), ("chr2", 0, 7));
        assert_eq!(reader.line_number(), 5);
        assert!(reader.read_record().unwrap().is_none());
    }

    #[test]
    fn test_extra_column_is_error() {
        let mut reader = DepthReader::new("chr1\t1\t10\textra\n".as_bytes());
        assert!(matches!(
            reader.read_record(),
            Err(Error::Parse { line: 1, .. })
        ));
    }

    #[test]
    fn test_zero_position_is_error() {
        let mut reader = DepthReader::new("chr1\t0\t10\n".as_bytes());
        let err = reader.read_record().unwrap_err();
        assert!(err.to_string().contains("start from 1"));
    }

    #[test]
    fn test_bad_depth_is_error() {
        let mut reader = DepthReader::new("chr1\t1\tlots\n".as_bytes());
        assert!(reader.read_record().is_err());
    }
}
