use std::collections::{HashMap, hash_map::Entry};
use std::fmt;

use ariadne::{Cache, Color, ColorGenerator, Config, IndexType, Label, Report, ReportKind, Source};

use crate::span::{SourceId, SourceMap, Span};

#[derive(Debug, Clone)]
pub struct LabelledSpan {
    pub span: Span,
    pub message: String,
}

#[derive(Debug, Clone)]
pub enum Supplemental {
    Help(String),
    Note(String),
}

/// A fatal assembly error anchored at a source span. Warnings never become
/// diagnostics; they are logged as they happen.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub message: String,
    pub primary: Span,
    pub labels: Vec<LabelledSpan>,
    pub supplements: Vec<Supplemental>,
}

impl Diagnostic {
    pub fn error(primary: Span, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            primary,
            labels: Vec::new(),
            supplements: Vec::new(),
        }
    }

    pub fn with_label(mut self, span: Span, message: impl Into<String>) -> Self {
        self.labels.push(LabelledSpan {
            span,
            message: message.into(),
        });
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.supplements.push(Supplemental::Help(help.into()));
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.supplements.push(Supplemental::Note(note.into()));
        self
    }

    pub fn help(&self) -> Option<&str> {
        self.supplements.iter().find_map(|supplement| match supplement {
            Supplemental::Help(help) => Some(help.as_str()),
            Supplemental::Note(_) => None,
        })
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

#[derive(Debug)]
struct SourceMapCache<'a> {
    source_map: &'a SourceMap,
    sources: HashMap<SourceId, Source<&'a str>>,
}

impl<'a> SourceMapCache<'a> {
    fn new(source_map: &'a SourceMap) -> Self {
        Self {
            source_map,
            sources: HashMap::new(),
        }
    }
}

impl<'a> Cache<SourceId> for SourceMapCache<'a> {
    type Storage = &'a str;

    fn fetch(&mut self, id: &SourceId) -> Result<&Source<Self::Storage>, impl fmt::Debug> {
        match self.sources.entry(*id) {
            Entry::Occupied(entry) => Ok::<_, String>(entry.into_mut()),
            Entry::Vacant(entry) => {
                let file = self
                    .source_map
                    .get(*id)
                    .ok_or_else(|| format!("missing source for id {id:?}"))?;
                Ok::<_, String>(entry.insert(Source::from(file.text.as_str())))
            }
        }
    }

    fn display<'b>(&self, id: &'b SourceId) -> Option<impl fmt::Display + 'b> {
        self.source_map.get(*id).map(|file| file.name.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderOptions {
    pub color: bool,
}

impl RenderOptions {
    pub const fn plain() -> Self {
        Self { color: false }
    }
}

pub fn render_diagnostic(source_map: &SourceMap, diagnostic: &Diagnostic) -> String {
    render_diagnostic_with_options(source_map, diagnostic, RenderOptions::plain())
}

pub fn render_diagnostic_with_options(
    source_map: &SourceMap,
    diagnostic: &Diagnostic,
    options: RenderOptions,
) -> String {
    if source_map.get(diagnostic.primary.source_id).is_none() {
        return render_plain(source_map, diagnostic);
    }

    let primary_span = (diagnostic.primary.source_id, diagnostic.primary.as_range());
    let mut report = Report::build(ReportKind::Error, primary_span.clone())
        .with_config(
            Config::default()
                .with_index_type(IndexType::Byte)
                .with_color(options.color),
        )
        .with_message(diagnostic.message.clone())
        .with_label(
            Label::new(primary_span)
                .with_color(Color::Red)
                .with_priority(100)
                .with_order(0)
                .with_message("here"),
        );

    let mut colors = ColorGenerator::new();
    for (index, label) in diagnostic.labels.iter().enumerate() {
        report = report.with_label(
            Label::new((label.span.source_id, label.span.as_range()))
                .with_color(colors.next())
                .with_order((index + 1) as i32)
                .with_message(label.message.clone()),
        );
    }

    for supplement in &diagnostic.supplements {
        report = match supplement {
            Supplemental::Help(help) => report.with_help(help.clone()),
            Supplemental::Note(note) => report.with_note(note.clone()),
        };
    }

    let mut output = Vec::new();
    let mut cache = SourceMapCache::new(source_map);
    if report.finish().write(&mut cache, &mut output).is_ok() {
        return String::from_utf8_lossy(&output).into_owned();
    }
    render_plain(source_map, diagnostic)
}

// Caret rendering used when ariadne cannot produce a report.
fn render_plain(source_map: &SourceMap, diagnostic: &Diagnostic) -> String {
    let mut out = format!(
        "error: {}\n --> {}",
        diagnostic.message,
        source_map.location(diagnostic.primary)
    );
    if let Some(file) = source_map.get(diagnostic.primary.source_id) {
        let (line, col) = file.line_col(diagnostic.primary.start);
        let width = diagnostic.primary.end.saturating_sub(diagnostic.primary.start).max(1);
        out.push_str(&format!(
            "\n  | {}\n  | {}{}",
            file.line_text(line),
            " ".repeat(col - 1),
            "^".repeat(width)
        ));
    }
    for supplement in &diagnostic.supplements {
        match supplement {
            Supplemental::Help(help) => out.push_str(&format!("\nHelp: {help}")),
            Supplemental::Note(note) => out.push_str(&format!("\nNote: {note}")),
        }
    }
    out
}

pub fn render_diagnostics_with_options(
    source_map: &SourceMap,
    diagnostics: &[Diagnostic],
    options: RenderOptions,
) -> String {
    diagnostics
        .iter()
        .map(|diag| render_diagnostic_with_options(source_map, diag, options))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_message_and_location() {
        let mut map = SourceMap::default();
        let id = map.add_source("main.s", "lda #1\nnop #0x00\n");
        let diagnostic = Diagnostic::error(Span::new(id, 7, 10), "addressing mode is not defined")
            .with_help("remove the operand");
        let rendered = render_diagnostic(&map, &diagnostic);
        assert!(rendered.contains("addressing mode is not defined"));
        assert!(rendered.contains("main.s"));
        assert!(rendered.contains("remove the operand"));
    }

    #[test]
    fn plain_fallback_points_at_the_span() {
        let mut map = SourceMap::default();
        let id = map.add_source("main.s", "lda #1\nnop #0x00\n");
        let rendered = render_plain(&map, &Diagnostic::error(Span::new(id, 11, 15), "bad"));
        assert!(rendered.contains("main.s:2:5"));
        assert!(rendered.contains("nop #0x00\n  |     ^^^^"));
    }
}
