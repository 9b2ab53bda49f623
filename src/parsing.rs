//! Zero-allocation field splitting for tab-separated inputs.

use memchr::memchr;

/// Fast u64 parsing - no allocation, no error formatting.
///
/// Returns None if the input is empty or contains non-digit characters.
#[inline(always)]
pub fn parse_u64_fast(bytes: &[u8]) -> Option<u64> {
    if bytes.is_empty() || bytes.len() > 20 {
        return None;
    }
    let mut n: u64 = 0;
    for &b in bytes {
        let d = b.wrapping_sub(b'0');
        if d > 9 {
            return None;
        }
        n = n.checked_mul(10)?.checked_add(d as u64)?;
    }
    Some(n)
}

/// Iterator over the tab-separated fields of one line.
///
/// Uses memchr for SIMD-accelerated tab searching, avoiding the
/// intermediate Vec of `str::split`.
#[derive(Debug, Clone)]
pub struct TabFields<'a> {
    rest: Option<&'a str>,
}

impl<'a> TabFields<'a> {
    #[inline]
    pub fn new(line: &'a str) -> Self {
        Self { rest: Some(line) }
    }
}

impl<'a> Iterator for TabFields<'a> {
    type Item = &'a str;

    #[inline]
    fn next(&mut self) -> Option<&'a str> {
        let rest = self.rest?;
        match memchr(b'\t', rest.as_bytes()) {
            Some(idx) => {
                self.rest = Some(&rest[idx + 1..]);
                Some(&rest[..idx])
            }
            None => {
                self.rest = None;
                Some(rest)
            }
        }
    }
}

/// Split a line into tab-separated fields.
#[inline]
pub fn tab_fields(line: &str) -> TabFields<'_> {
    TabFields::new(line)
}

/// Strip a trailing `\n` or `\r\n`.
#[inline]
pub fn trim_newline(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_u64_fast() {
        assert_eq!(parse_u64_fast(b"12345"), Some(12345));
        assert_eq!(parse_u64_fast(b"0"), Some(0));
        assert_eq!(parse_u64_fast(b""), None);
        assert_eq!(parse_u64_fast(b"abc"), None);
        assert_eq!(parse_u64_fast(b"-3"), None);
        assert_eq!(parse_u64_fast(b"18446744073709551615"), Some(u64::MAX));
        assert_eq!(parse_u64_fast(b"18446744073709551616"), None);
    }

    #[test]
    fn test_tab_fields() {
        let fields: Vec<_> = tab_fields("chr1\t100\t\t7").collect();
        assert_eq!(fields, ["chr1", "100", "", "7"]);

        let single: Vec<_> = tab_fields("chr1").collect();
        assert_eq!(single, ["chr1"]);
    }

    #[test]
    fn test_trim_newline() {
        assert_eq!(trim_newline("a\tb\r\n"), "a\tb");
        assert_eq!(trim_newline("a\tb\n"), "a\tb");
        assert_eq!(trim_newline("a\tb"), "a\tb");
    }
}
