//! Source map: every loaded file and its text, for error reporting.

use std::path::PathBuf;
use tally_parser::Span;

/// One loaded source file.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Stable id of this file within the map.
    pub id: usize,
    /// Path the file was loaded from.
    pub path: PathBuf,
    /// File contents.
    pub source: String,
    /// Byte offsets at which each line starts.
    line_starts: Vec<usize>,
}

impl SourceFile {
    fn new(id: usize, path: PathBuf, source: String) -> Self {
        let line_starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self {
            id,
            path,
            source,
            line_starts,
        }
    }

    /// 1-based line and column of a byte offset.
    #[must_use]
    pub fn line_col(&self, offset: usize) -> (usize, usize) {
        let line = self
            .line_starts
            .iter()
            .rposition(|&start| start <= offset)
            .unwrap_or(0);
        (line + 1, offset - self.line_starts[line] + 1)
    }

    /// The source text of a span.
    #[must_use]
    pub fn span_text(&self, span: &Span) -> &str {
        &self.source[span.start..span.end.min(self.source.len())]
    }

    /// A single line (1-based).
    #[must_use]
    pub fn line(&self, line_num: usize) -> Option<&str> {
        if line_num == 0 || line_num > self.line_starts.len() {
            return None;
        }
        let start = self.line_starts[line_num - 1];
        let end = if line_num < self.line_starts.len() {
            self.line_starts[line_num] - 1
        } else {
            self.source.len()
        };
        Some(&self.source[start..end])
    }

    /// Number of lines in this file.
    #[must_use]
    pub fn num_lines(&self) -> usize {
        self.line_starts.len()
    }
}

/// All loaded files, keyed by id.
#[derive(Debug, Default)]
pub struct SourceMap {
    files: Vec<SourceFile>,
}

impl SourceMap {
    /// Create an empty source map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file; returns its id.
    pub fn add_file(&mut self, path: PathBuf, source: String) -> usize {
        let id = self.files.len();
        self.files.push(SourceFile::new(id, path, source));
        id
    }

    /// Get a file by id.
    #[must_use]
    pub fn get(&self, id: usize) -> Option<&SourceFile> {
        self.files.get(id)
    }

    /// Get a file by path.
    #[must_use]
    pub fn get_by_path(&self, path: &std::path::Path) -> Option<&SourceFile> {
        self.files.iter().find(|f| f.path == path)
    }

    /// All loaded files.
    #[must_use]
    pub fn files(&self) -> &[SourceFile] {
        &self.files
    }

    /// Render a span as `path:line:col`.
    #[must_use]
    pub fn format_span(&self, file_id: usize, span: &Span) -> String {
        match self.get(file_id) {
            Some(file) => {
                let (line, col) = file.line_col(span.start);
                format!("{}:{line}:{col}", file.path.display())
            }
            None => format!("?:{span}"),
        }
    }
}
