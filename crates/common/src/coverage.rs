//! Byte-range coverage accounting
//!
//! Coverage arrives from the browser as per-file lists of byte ranges into
//! the file's source text. This module filters out dependency and test
//! sources, converts nested JS block counts into disjoint used ranges, and
//! sums used versus total bytes.

use serde::{Deserialize, Serialize};

/// Half-open byte range `[start, end)` into a source text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageRange {
    pub start: u64,
    pub end: u64,
}

impl CoverageRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A block range with its execution count, as reported for JS functions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountedRange {
    pub start: u64,
    pub end: u64,
    pub count: u64,
}

/// Used ranges of one source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageEntry {
    pub url: String,
    pub text: String,
    pub ranges: Vec<CoverageRange>,
}

impl CoverageEntry {
    /// Source length in the UTF-16 units DevTools offsets are expressed in
    pub fn total_bytes(&self) -> u64 {
        self.text.encode_utf16().count() as u64
    }

    pub fn used_bytes(&self) -> u64 {
        self.ranges.iter().map(CoverageRange::len).sum()
    }

    /// Fold another entry for the same source into this one
    pub fn absorb(&mut self, other: CoverageEntry) {
        let mut ranges = std::mem::take(&mut self.ranges);
        ranges.extend(other.ranges);
        self.ranges = merge_ranges(ranges);
    }
}

/// Sort ranges and merge the ones that touch or overlap
pub fn merge_ranges(mut ranges: Vec<CoverageRange>) -> Vec<CoverageRange> {
    ranges.sort_by_key(|r| (r.start, r.end));
    let mut out: Vec<CoverageRange> = Vec::with_capacity(ranges.len());
    for r in ranges {
        match out.last_mut() {
            Some(prev) if r.start <= prev.end => prev.end = prev.end.max(r.end),
            _ => out.push(r),
        }
    }
    out
}

/// Which coverage entries count towards the summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverageFilter {
    /// URL suffixes that make an entry eligible
    pub include_extensions: Vec<String>,

    /// URL fragments marking dependency sources
    pub exclude_fragments: Vec<String>,

    /// URL suffixes marking test files
    pub exclude_suffixes: Vec<String>,
}

impl Default for CoverageFilter {
    fn default() -> Self {
        Self {
            include_extensions: vec![".js".to_string(), ".css".to_string()],
            exclude_fragments: vec!["/node_modules/".to_string()],
            exclude_suffixes: vec![".test.js".to_string()],
        }
    }
}

impl CoverageFilter {
    pub fn accepts(&self, url: &str) -> bool {
        let url = url.split(['?', '#']).next().unwrap_or(url);
        self.include_extensions.iter().any(|ext| url.ends_with(ext.as_str()))
            && !self.exclude_fragments.iter().any(|f| url.contains(f.as_str()))
            && !self.exclude_suffixes.iter().any(|s| url.ends_with(s.as_str()))
    }

    /// Keep only the entries this filter accepts
    pub fn apply<'a, I>(&self, entries: I) -> Vec<CoverageEntry>
    where
        I: IntoIterator<Item = &'a CoverageEntry>,
    {
        entries
            .into_iter()
            .filter(|e| self.accepts(&e.url))
            .cloned()
            .collect()
    }
}

/// Per-file line of a coverage summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileCoverage {
    pub url: String,
    pub total_bytes: u64,
    pub used_bytes: u64,
}

/// Aggregate byte coverage across all accepted files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageSummary {
    pub files: Vec<FileCoverage>,
    pub total_bytes: u64,
    pub used_bytes: u64,
    /// `None` when no instrumented bytes matched the filter
    pub percent: Option<f64>,
}

impl CoverageSummary {
    /// Sum entries that are already filtered
    pub fn from_entries(entries: &[CoverageEntry]) -> Self {
        let files: Vec<FileCoverage> = entries
            .iter()
            .map(|e| FileCoverage {
                url: e.url.clone(),
                total_bytes: e.total_bytes(),
                used_bytes: e.used_bytes(),
            })
            .collect();

        let total_bytes = files.iter().map(|f| f.total_bytes).sum();
        let used_bytes = files.iter().map(|f| f.used_bytes).sum();
        let percent = if total_bytes == 0 {
            None
        } else {
            Some(used_bytes as f64 * 100.0 / total_bytes as f64)
        };

        Self {
            files,
            total_bytes,
            used_bytes,
            percent,
        }
    }

    pub fn describe(&self) -> String {
        match self.percent {
            Some(p) => format!(
                "Code coverage in bytes: {p:.1}% ({} of {} bytes in {} files)",
                self.used_bytes,
                self.total_bytes,
                self.files.len()
            ),
            None => "Code coverage in bytes: no instrumented files".to_string(),
        }
    }
}

/// Flatten nested block counts into disjoint ranges that executed at least once.
///
/// Inner ranges override their enclosing range, so a never-taken branch
/// inside an executed function is carved out of the function's range.
pub fn disjoint_used_ranges(nested: &[CountedRange]) -> Vec<CoverageRange> {
    #[derive(Clone, Copy)]
    struct Point {
        offset: u64,
        is_end: bool,
        len: u64,
        count: u64,
    }

    let mut points: Vec<Point> = nested
        .iter()
        .flat_map(|r| {
            let len = r.end.saturating_sub(r.start);
            [
                Point { offset: r.start, is_end: false, len, count: r.count },
                Point { offset: r.end, is_end: true, len, count: r.count },
            ]
        })
        .collect();

    // Valid parenthesis order: ends before starts at the same offset, longer
    // ranges open first and close last.
    points.sort_by(|a, b| {
        a.offset
            .cmp(&b.offset)
            .then_with(|| b.is_end.cmp(&a.is_end))
            .then_with(|| {
                if a.is_end {
                    a.len.cmp(&b.len)
                } else {
                    b.len.cmp(&a.len)
                }
            })
    });

    let mut stack: Vec<u64> = Vec::new();
    let mut out: Vec<CoverageRange> = Vec::new();
    let mut last = 0u64;

    for p in points {
        if let Some(&top) = stack.last() {
            if top > 0 && last < p.offset {
                match out.last_mut() {
                    Some(prev) if prev.end == last => prev.end = p.offset,
                    _ => out.push(CoverageRange::new(last, p.offset)),
                }
            }
        }
        last = p.offset;
        if p.is_end {
            stack.pop();
        } else {
            stack.push(p.count);
        }
    }

    out.retain(|r| !r.is_empty());
    out
}

/// Path under which a file is reported, optionally keeping the URL host
pub fn report_path(url: &str, include_hostname: bool) -> String {
    let Ok(parsed) = url::Url::parse(url) else {
        return url.to_string();
    };
    let path = parsed.path().trim_start_matches('/');
    match (include_hostname, parsed.host_str()) {
        (true, Some(host)) => match parsed.port() {
            Some(port) => format!("{host}:{port}/{path}"),
            None => format!("{host}/{path}"),
        },
        _ => path.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(url: &str, total: usize, used: &[(u64, u64)]) -> CoverageEntry {
        CoverageEntry {
            url: url.to_string(),
            text: "x".repeat(total),
            ranges: used.iter().map(|&(s, e)| CoverageRange::new(s, e)).collect(),
        }
    }

    #[test]
    fn percentage_over_accepted_files() {
        let all = vec![
            entry("http://127.0.0.1:8081/app/calc.js", 100, &[(0, 30), (50, 70)]),
            entry("http://127.0.0.1:8081/app/style.css", 50, &[(0, 50)]),
            entry("http://127.0.0.1:8081/node_modules/mocha/mocha.js", 1000, &[(0, 10)]),
            entry("http://127.0.0.1:8081/src/calc.test.js", 200, &[(0, 200)]),
        ];

        let accepted = CoverageFilter::default().apply(&all);
        let summary = CoverageSummary::from_entries(&accepted);

        assert_eq!(summary.files.len(), 2);
        assert_eq!(summary.total_bytes, 150);
        assert_eq!(summary.used_bytes, 100);
        let percent = summary.percent.unwrap();
        assert!((percent - 66.666).abs() < 0.01, "got {percent}");
    }

    #[test]
    fn no_matching_files_has_no_percentage() {
        let all = vec![entry("http://localhost/node_modules/chai/chai.js", 10, &[(0, 10)])];
        let summary = CoverageSummary::from_entries(&CoverageFilter::default().apply(&all));
        assert_eq!(summary.total_bytes, 0);
        assert_eq!(summary.percent, None);
        assert!(summary.describe().contains("no instrumented files"));
    }

    #[test]
    fn filter_ignores_query_strings() {
        let filter = CoverageFilter::default();
        assert!(filter.accepts("http://localhost/app/calc.js?v=3"));
        assert!(!filter.accepts("http://localhost/dev/mocha-runner.html"));
        assert!(!filter.accepts("http://localhost/src/calc.test.js#x"));
    }

    #[test]
    fn nested_zero_count_block_is_carved_out() {
        let ranges = disjoint_used_ranges(&[
            CountedRange { start: 0, end: 100, count: 1 },
            CountedRange { start: 20, end: 40, count: 0 },
            CountedRange { start: 60, end: 70, count: 3 },
        ]);
        assert_eq!(ranges, vec![CoverageRange::new(0, 20), CoverageRange::new(40, 100)]);
    }

    #[test]
    fn uncalled_function_contributes_nothing() {
        let ranges = disjoint_used_ranges(&[
            CountedRange { start: 0, end: 50, count: 1 },
            CountedRange { start: 50, end: 80, count: 0 },
            CountedRange { start: 80, end: 90, count: 2 },
        ]);
        assert_eq!(ranges, vec![CoverageRange::new(0, 50), CoverageRange::new(80, 90)]);
    }

    #[test]
    fn absorbing_a_duplicate_unions_ranges() {
        let mut first = entry("http://localhost/app/calc.js", 100, &[(0, 50)]);
        first.absorb(entry("http://localhost/app/calc.js", 100, &[(40, 80), (90, 95)]));
        assert_eq!(
            first.ranges,
            vec![CoverageRange::new(0, 80), CoverageRange::new(90, 95)]
        );
        assert_eq!(first.used_bytes(), 85);
    }

    #[test]
    fn touching_ranges_merge() {
        let merged = merge_ranges(vec![
            CoverageRange::new(30, 40),
            CoverageRange::new(10, 20),
            CoverageRange::new(0, 10),
            CoverageRange::new(15, 18),
        ]);
        assert_eq!(merged, vec![CoverageRange::new(0, 20), CoverageRange::new(30, 40)]);
    }

    #[test]
    fn report_path_with_and_without_host() {
        let url = "http://127.0.0.1:8081/app/calc.js";
        assert_eq!(report_path(url, true), "127.0.0.1:8081/app/calc.js");
        assert_eq!(report_path(url, false), "app/calc.js");
        assert_eq!(report_path("not a url", true), "not a url");
    }
}
