use std::ops::Range;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    pub source_id: SourceId,
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(source_id: SourceId, start: usize, end: usize) -> Self {
        Self {
            source_id,
            start,
            end,
        }
    }

    pub fn as_range(&self) -> Range<usize> {
        self.start..self.end
    }

    /// Smallest span covering both `self` and `other` (same source).
    pub fn to(self, other: Span) -> Span {
        Span {
            source_id: self.source_id,
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spanned<T> {
    pub node: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(node: T, span: Span) -> Self {
        Self { node, span }
    }

    pub fn map<U>(self, mapper: impl FnOnce(T) -> U) -> Spanned<U> {
        Spanned {
            node: mapper(self.node),
            span: self.span,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub text: String,
    line_starts: Vec<usize>,
}

impl SourceFile {
    fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        let mut line_starts = vec![0];
        for (offset, ch) in text.char_indices() {
            if ch == '\n' {
                line_starts.push(offset + 1);
            }
        }

        Self {
            name: name.into(),
            text,
            line_starts,
        }
    }

    pub fn line_col(&self, offset: usize) -> (usize, usize) {
        let line_idx = self
            .line_starts
            .partition_point(|line_start| *line_start <= offset)
            .saturating_sub(1);
        let line_start = self.line_starts[line_idx];
        (line_idx + 1, offset.saturating_sub(line_start) + 1)
    }

    /// Text of a 1-based line, without its terminator.
    pub fn line_text(&self, line: usize) -> &str {
        let Some(start) = line.checked_sub(1).and_then(|idx| self.line_starts.get(idx)) else {
            return "";
        };
        let end = self
            .line_starts
            .get(line)
            .map_or(self.text.len(), |next| next.saturating_sub(1));
        self.text[*start..end.max(*start)].trim_end_matches('\r')
    }
}

#[derive(Debug, Clone, Default)]
pub struct SourceMap {
    files: Vec<SourceFile>,
}

impl SourceMap {
    pub fn add_source(&mut self, name: impl Into<String>, text: impl Into<String>) -> SourceId {
        let id = SourceId(self.files.len() as u32);
        self.files.push(SourceFile::new(name, text));
        id
    }

    pub fn get(&self, source_id: SourceId) -> Option<&SourceFile> {
        self.files.get(source_id.0 as usize)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// `file:line:col` for the start of `span`.
    pub fn location(&self, span: Span) -> String {
        match self.get(span.source_id) {
            Some(file) => {
                let (line, col) = file.line_col(span.start);
                format!("{}:{line}:{col}", file.name)
            }
            None => format!("<unknown>:{}", span.start),
        }
    }

    /// Resolves `path` against the directory of the file `from` was read
    /// from. Absolute paths are returned unchanged.
    pub fn resolve_relative(&self, from: SourceId, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            return path.to_path_buf();
        }
        self.get(from)
            .and_then(|file| Path::new(&file.name).parent())
            .map_or_else(|| path.to_path_buf(), |dir| dir.join(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_line_and_column() {
        let mut map = SourceMap::default();
        let source_id = map.add_source("test", "first\nsecond\nthird");
        let file = map.get(source_id).expect("source");
        assert_eq!(file.line_col(0), (1, 1));
        assert_eq!(file.line_col(7), (2, 2));
        assert_eq!(file.line_col(14), (3, 2));
        assert_eq!(file.line_text(2), "second");
        assert_eq!(map.location(Span::new(source_id, 14, 15)), "test:3:2");
    }

    #[test]
    fn resolves_paths_next_to_including_file() {
        let mut map = SourceMap::default();
        let root = map.add_source("src/main.s", "");
        let bare = map.add_source("main.s", "");
        assert_eq!(
            map.resolve_relative(root, "lib/macros.s"),
            PathBuf::from("src/lib/macros.s")
        );
        assert_eq!(map.resolve_relative(bare, "gfx.bin"), PathBuf::from("gfx.bin"));
    }
}
