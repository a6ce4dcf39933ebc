pub mod fields;
pub mod markers;
pub mod names;

pub use fields::{Fields, split_tags};
pub use markers::{
    COMMON_NOISE_TOKENS, ElevationMarkerScope, ManagerMarkers, ProgressMarker, VerdictRule,
    markers_for,
};
pub use names::format_package_id_as_name;

use crate::execution::line_reader::final_lines;
use crate::models::ManagerId;

/// How a row is split into fields.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Delimiter {
    Whitespace,
    Char(char),
}

/// Where data rows begin.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ScanStart {
    /// After the first line containing `---`.
    AfterSeparator,
    /// After the first line containing the given word.
    AfterHeader(&'static str),
    Immediately,
}

/// Stateless description of a tabular CLI output; `rows` runs one scan.
#[derive(Clone, Debug)]
pub struct TableScanner {
    manager: ManagerId,
    start: ScanStart,
    delimiter: Delimiter,
    min_fields: usize,
}

impl TableScanner {
    pub fn new(manager: ManagerId) -> Self {
        Self {
            manager,
            start: ScanStart::AfterSeparator,
            delimiter: Delimiter::Whitespace,
            min_fields: 2,
        }
    }

    pub fn start(mut self, start: ScanStart) -> Self {
        self.start = start;
        self
    }

    pub fn delimiter(mut self, delimiter: Delimiter) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn min_fields(mut self, min_fields: usize) -> Self {
        self.min_fields = min_fields;
        self
    }

    pub fn rows<'a>(&self, lines: impl IntoIterator<Item = &'a str>) -> Vec<Vec<String>> {
        let mut started = self.start == ScanStart::Immediately;
        let mut rows = Vec::new();

        for line in lines {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if !started {
                started = match self.start {
                    ScanStart::AfterSeparator => line.contains("---"),
                    ScanStart::AfterHeader(word) => line.contains(word),
                    ScanStart::Immediately => true,
                };
                continue;
            }

            if is_separator(line) {
                continue;
            }

            let fields = split_fields(line, self.delimiter);
            if fields.len() < self.min_fields {
                tracing::debug!(
                    manager = ?self.manager,
                    line = %line,
                    fields = fields.len(),
                    "dropping malformed row"
                );
                continue;
            }
            rows.push(fields);
        }

        rows
    }

    pub fn rows_from_output(&self, raw: &str) -> Vec<Vec<String>> {
        let lines = final_lines(raw);
        self.rows(lines.iter().map(String::as_str))
    }
}

fn is_separator(line: &str) -> bool {
    line.chars().all(|c| matches!(c, '-' | ' ' | '|' | '─' | '+'))
}

pub(crate) fn split_fields(line: &str, delimiter: Delimiter) -> Vec<String> {
    match delimiter {
        Delimiter::Whitespace => line.split_whitespace().map(str::to_string).collect(),
        Delimiter::Char(separator) => {
            let mut fields: Vec<String> = line
                .split(separator)
                .map(|field| field.trim().to_string())
                .collect();
            while fields.first().is_some_and(String::is_empty) {
                fields.remove(0);
            }
            while fields.last().is_some_and(String::is_empty) {
                fields.pop();
            }
            fields
        }
    }
}

/// Column offsets taken from a fixed-width header such as
/// `Name   Id   Version   Available   Source`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ColumnLayout {
    starts: Vec<(String, usize)>,
}

impl ColumnLayout {
    /// Builds a layout from `header`, in character offsets, for the given
    /// column titles. Titles missing from the header are skipped.
    pub fn from_header(header: &str, titles: &[&str]) -> Option<Self> {
        let chars: Vec<char> = header.chars().collect();
        let mut starts = Vec::new();
        for title in titles {
            if let Some(offset) = find_word(&chars, title) {
                starts.push((title.to_string(), offset));
            }
        }
        if starts.is_empty() {
            return None;
        }
        starts.sort_by_key(|(_, offset)| *offset);
        Some(Self { starts })
    }

    pub fn has(&self, title: &str) -> bool {
        self.starts.iter().any(|(name, _)| name == title)
    }

    pub fn offset(&self, title: &str) -> Option<usize> {
        self.starts
            .iter()
            .find(|(name, _)| name == title)
            .map(|(_, offset)| *offset)
    }

    /// Text of the column `title` within `line`, trimmed.
    pub fn field(&self, line: &str, title: &str) -> Option<String> {
        let index = self.starts.iter().position(|(name, _)| name == title)?;
        let start = self.starts[index].1;
        let end = self.starts.get(index + 1).map(|(_, offset)| *offset);
        let chars: Vec<char> = line.chars().collect();
        if start >= chars.len() {
            return Some(String::new());
        }
        let end = end.unwrap_or(chars.len()).min(chars.len());
        Some(chars[start..end].iter().collect::<String>().trim().to_string())
    }
}

fn find_word(chars: &[char], word: &str) -> Option<usize> {
    let needle: Vec<char> = word.chars().collect();
    if needle.is_empty() || needle.len() > chars.len() {
        return None;
    }
    (0..=chars.len() - needle.len()).find(|&start| {
        chars[start..start + needle.len()] == needle[..]
            && (start == 0 || chars[start - 1] == ' ')
            && chars
                .get(start + needle.len())
                .is_none_or(|next| *next == ' ')
    })
}
