//! GFF3 feature line parsing.

use crate::error::{Error, Result};
use crate::parsing::{parse_u64_fast, tab_fields};

/// A GFF3 feature with 1-based, closed coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GffFeature<'a> {
    pub seqid: &'a str,
    pub feature_type: &'a str,
    pub start: u64,
    pub end: u64,
    pub attributes: &'a str,
}

impl<'a> GffFeature<'a> {
    /// Parse a trimmed, non-comment line.
    ///
    /// Returns `Ok(None)` for lines that do not have exactly nine columns.
    pub fn parse(line: &'a str, line_number: usize) -> Result<Option<Self>> {
        let mut cols = [""; 9];
        let mut count = 0;
        for field in tab_fields(line) {
            if count == cols.len() {
                return Ok(None);
            }
            cols[count] = field;
            count += 1;
        }
        if count != cols.len() {
            return Ok(None);
        }

        let coord = |s: &str, name: &str| {
            parse_u64_fast(s.as_bytes())
                .ok_or_else(|| Error::parse(line_number, format!("Invalid {} '{}'", name, s)))
        };
        let start = coord(cols[3], "start")?;
        let end = coord(cols[4], "end")?;
        if start == 0 || start > end {
            return Err(Error::parse(
                line_number,
                format!("Invalid feature coordinates {}..{}", start, end),
            ));
        }

        Ok(Some(Self {
            seqid: cols[0],
            feature_type: cols[2],
            start,
            end,
            attributes: cols[8],
        }))
    }

    /// 0-based start of the feature in BED coordinates.
    #[inline]
    pub fn bed_start(&self) -> u64 {
        self.start - 1
    }

    /// The `ID` attribute, cut at the first `;` or `:`.
    pub fn id(&self) -> Option<&'a str> {
        self.attributes
            .split([';', ':'])
            .find_map(|attr| attr.strip_prefix("ID="))
    }
}
