//! Deterministic names for the files a query produces.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{Local, NaiveDateTime};
use regex::Regex;

/// The directory sentiment reports are written to by default.
pub const DEFAULT_REPORT_DIR: &str = "./sentiment_reports";

/// The directory transcripts are written to by default.
pub const DEFAULT_TRANSCRIPT_DIR: &str = "./llm_outputs";

/// The keyword used when none can be extracted from a query.
pub const FALLBACK_KEYWORD: &str = "分析对象";

const TRANSCRIPT_PREFIX_CHARS: usize = 50;
const FORBIDDEN_FILENAME_CHARS: &[char] =
    &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

static KEYWORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:关于|分析|查询|搜索|查看)([^\s的、.。?s]+)").unwrap()
});
static UNSAFE_KEYWORD_CHARS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s]").unwrap());

/// A source of wall-clock readings.
pub trait Clock: Send + Sync {
    /// Returns the current local time.
    fn now(&self) -> NaiveDateTime;
}

/// The local system clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// A clock that always reads the same time.
#[derive(Clone, Copy, Debug)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    #[inline]
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

/// The artifacts derived from one query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArtifactNames {
    /// The sanitized subject keyword.
    pub keyword: String,
    /// File name of the sentiment report.
    pub report_filename: String,
    /// `report_filename` joined onto the report directory.
    pub report_path: PathBuf,
    /// Path of the transcript file.
    pub transcript_path: PathBuf,
}

impl ArtifactNames {
    /// Derives the artifact names for `query` at time `now`.
    ///
    /// This is a pure function, nothing is created on disk.
    pub fn derive(
        query: &str,
        now: NaiveDateTime,
        report_dir: &Path,
        transcript_dir: &Path,
    ) -> Self {
        let keyword = extract_keyword(query);
        let report_filename = format!(
            "sentiment_{keyword}_{}.md",
            now.format("%Y-%m-%d %H:%M:%S")
        );
        let report_path = report_dir.join(&report_filename);
        let transcript_filename = format!(
            "{}_{}.txt",
            transcript_prefix(query),
            now.format("%Y%m%d_%H%M%S")
        );
        Self {
            keyword,
            report_filename,
            report_path,
            transcript_path: transcript_dir.join(transcript_filename),
        }
    }

    /// Returns `query` with the report name and path appended as
    /// `[md_filename=..][md_path=..]` annotations.
    pub fn annotate(&self, query: &str) -> String {
        format!(
            "{}[md_filename={}][md_path={}]",
            query.trim(),
            self.report_filename,
            self.report_path.display()
        )
    }
}

/// Extracts the subject keyword that follows a trigger word such as `分析`.
///
/// Characters other than word characters and whitespace are stripped. If
/// nothing usable remains, [`FALLBACK_KEYWORD`] is returned.
pub fn extract_keyword(query: &str) -> String {
    let keyword = KEYWORD_RE
        .captures(query)
        .and_then(|caps| caps.get(1))
        .map(|m| UNSAFE_KEYWORD_CHARS_RE.replace_all(m.as_str(), ""))
        .unwrap_or_default();
    if keyword.is_empty() {
        FALLBACK_KEYWORD.to_owned()
    } else {
        keyword.into_owned()
    }
}

fn transcript_prefix(query: &str) -> String {
    query
        .trim()
        .chars()
        .filter(|c| !FORBIDDEN_FILENAME_CHARS.contains(c))
        .take(TRANSCRIPT_PREFIX_CHARS)
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 14)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn derive(query: &str, now: NaiveDateTime) -> ArtifactNames {
        ArtifactNames::derive(
            query,
            now,
            Path::new(DEFAULT_REPORT_DIR),
            Path::new(DEFAULT_TRANSCRIPT_DIR),
        )
    }

    #[test]
    fn test_keyword_extraction() {
        assert_eq!(extract_keyword("分析流感趋势"), "流感趋势");
        assert_eq!(extract_keyword("请帮我搜索新能源汽车的口碑"), "新能源汽车");
        assert_eq!(extract_keyword("查看 天气"), FALLBACK_KEYWORD);
        assert_eq!(extract_keyword("关于AI's future"), "AI");
        assert_eq!(extract_keyword("关于「春晚」。"), "春晚");
        assert_eq!(extract_keyword("hello world"), FALLBACK_KEYWORD);
        assert_eq!(extract_keyword("分析!!!"), FALLBACK_KEYWORD);
    }

    #[test]
    fn test_report_names() {
        let names = derive("分析流感趋势", at(9, 5, 7));
        assert_eq!(names.keyword, "流感趋势");
        assert_eq!(
            names.report_filename,
            "sentiment_流感趋势_2025-03-14 09:05:07.md"
        );
        assert_eq!(
            names.report_path,
            Path::new(DEFAULT_REPORT_DIR).join(&names.report_filename)
        );

        // Same input within the same second gives the same names.
        assert_eq!(names, derive("分析流感趋势", at(9, 5, 7)));
        assert_ne!(names, derive("分析流感趋势", at(9, 5, 8)));
    }

    #[test]
    fn test_transcript_names() {
        let names = derive("  a/b:c*d?e\"f<g>h|i\\j  ", at(23, 0, 1));
        assert_eq!(
            names.transcript_path,
            Path::new(DEFAULT_TRANSCRIPT_DIR).join("abcdefghij_20250314_230001.txt")
        );

        let long_query = "流".repeat(80);
        let names = derive(&long_query, at(0, 0, 0));
        let file_name = names
            .transcript_path
            .file_name()
            .unwrap()
            .to_str()
            .unwrap()
            .to_owned();
        assert_eq!(file_name, format!("{}_20250314_000000.txt", "流".repeat(50)));
    }

    #[test]
    fn test_annotate() {
        let names = ArtifactNames::derive(
            "分析流感趋势",
            at(9, 5, 7),
            Path::new("reports"),
            Path::new("outputs"),
        );
        let expected_path = Path::new("reports")
            .join("sentiment_流感趋势_2025-03-14 09:05:07.md");
        assert_eq!(
            names.annotate(" 分析流感趋势 \n"),
            format!(
                "分析流感趋势[md_filename=sentiment_流感趋势_2025-03-14 09:05:07.md][md_path={}]",
                expected_path.display()
            )
        );
    }
}
