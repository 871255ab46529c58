//! Markdown to styled terminal lines
//!
//! Assistant replies are parsed with `pulldown-cmark` (CommonMark plus GFM
//! tables, strikethrough and task lists) and turned into ratatui [`Line`]s.
//! Each node kind maps to a style through [`MarkdownTheme::style`]; fenced code
//! is highlighted with `syntect` using the fence's language tag.
//!
//! Rendering is a pure function of its input. Raw HTML is shown as literal text.

use once_cell::sync::Lazy;
use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd};
use ratatui::{
    style::{Color, Modifier, Style},
    text::{Line, Span},
};
use syntect::easy::HighlightLines;
use syntect::highlighting::{FontStyle, ThemeSet};
use syntect::parsing::SyntaxSet;
use syntect::util::LinesWithEndings;
use unicode_width::UnicodeWidthStr;

static SYNTAXES: Lazy<SyntaxSet> = Lazy::new(SyntaxSet::load_defaults_newlines);
static THEMES: Lazy<ThemeSet> = Lazy::new(ThemeSet::load_defaults);

const RULE_WIDTH: usize = 40;

/// Node kinds that receive their own styling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Element {
    Text,
    Heading(u8),
    Emphasis,
    Strong,
    Strikethrough,
    InlineCode,
    CodeBlock,
    CodeLanguage,
    Link,
    LinkTarget,
    ListMarker,
    BlockQuote,
    TableHeader,
    TableBorder,
    Rule,
    Html,
}

/// Per-element styles plus the syntax highlighting theme
#[derive(Debug, Clone)]
pub struct MarkdownTheme {
    code_theme: String,
}

impl Default for MarkdownTheme {
    fn default() -> Self {
        Self::new("base16-ocean.dark")
    }
}

impl MarkdownTheme {
    pub fn new(code_theme: impl Into<String>) -> Self {
        Self {
            code_theme: code_theme.into(),
        }
    }

    pub fn code_theme(&self) -> &str {
        &self.code_theme
    }

    pub fn style(&self, element: Element) -> Style {
        match element {
            Element::Text => Style::default(),
            Element::Heading(1) => Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
            Element::Heading(2) => Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
            Element::Heading(_) => Style::default()
                .fg(Color::Gray)
                .add_modifier(Modifier::BOLD),
            Element::Emphasis => Style::default().add_modifier(Modifier::ITALIC),
            Element::Strong => Style::default().add_modifier(Modifier::BOLD),
            Element::Strikethrough => Style::default().add_modifier(Modifier::CROSSED_OUT),
            Element::InlineCode => Style::default()
                .fg(Color::LightYellow)
                .bg(Color::Rgb(55, 65, 81)),
            Element::CodeBlock => Style::default()
                .fg(Color::Rgb(248, 248, 242))
                .bg(Color::Rgb(40, 42, 54)),
            Element::CodeLanguage => Style::default()
                .fg(Color::DarkGray)
                .add_modifier(Modifier::ITALIC),
            Element::Link => Style::default()
                .fg(Color::LightBlue)
                .add_modifier(Modifier::UNDERLINED),
            Element::LinkTarget => Style::default().fg(Color::Blue),
            Element::ListMarker => Style::default().fg(Color::Cyan),
            Element::BlockQuote => Style::default()
                .fg(Color::Gray)
                .add_modifier(Modifier::ITALIC),
            Element::TableHeader => Style::default().add_modifier(Modifier::BOLD),
            Element::TableBorder | Element::Rule | Element::Html => {
                Style::default().fg(Color::DarkGray)
            }
        }
    }
}

/// Render markdown into unwrapped lines
pub fn render_markdown(text: &str, theme: &MarkdownTheme) -> Vec<Line<'static>> {
    let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS;
    let mut renderer = Renderer::new(theme);
    for event in Parser::new_ext(text, options) {
        renderer.handle(event);
    }
    renderer.finish()
}

/// The `\w+` prefix of a fence info string (`rust,ignore` -> `rust`)
pub fn language_tag(info: &str) -> Option<String> {
    let tag: String = info
        .trim()
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    (!tag.is_empty()).then_some(tag)
}

/// Highlight a code block, one span list per source line
pub fn highlight_code(code: &str, language: Option<&str>, theme: &MarkdownTheme) -> Vec<Vec<Span<'static>>> {
    let fallback = theme.style(Element::CodeBlock);
    let plain = || {
        code.lines()
            .map(|line| vec![Span::styled(line.to_string(), fallback)])
            .collect::<Vec<_>>()
    };

    let Some(code_theme) = THEMES.themes.get(theme.code_theme()) else {
        tracing::debug!(theme = %theme.code_theme(), "Unknown code theme, rendering plain");
        return plain();
    };
    let syntax = language
        .and_then(|lang| SYNTAXES.find_syntax_by_token(lang))
        .unwrap_or_else(|| SYNTAXES.find_syntax_plain_text());

    let mut highlighter = HighlightLines::new(syntax, code_theme);
    let mut lines = Vec::new();
    for source_line in LinesWithEndings::from(code) {
        let ranges = match highlighter.highlight_line(source_line, &SYNTAXES) {
            Ok(ranges) => ranges,
            Err(e) => {
                tracing::debug!(error = %e, "Syntax highlighting failed, rendering plain");
                return plain();
            }
        };

        let spans = ranges
            .into_iter()
            .filter_map(|(style, piece)| {
                let piece = piece.trim_end_matches(['\n', '\r']);
                if piece.is_empty() {
                    return None;
                }
                Some(Span::styled(piece.to_string(), convert_style(style, fallback)))
            })
            .collect();
        lines.push(spans);
    }
    lines
}

fn convert_style(style: syntect::highlighting::Style, base: Style) -> Style {
    let fg = style.foreground;
    let mut converted = base.fg(Color::Rgb(fg.r, fg.g, fg.b));
    if style.font_style.contains(FontStyle::BOLD) {
        converted = converted.add_modifier(Modifier::BOLD);
    }
    if style.font_style.contains(FontStyle::ITALIC) {
        converted = converted.add_modifier(Modifier::ITALIC);
    }
    if style.font_style.contains(FontStyle::UNDERLINE) {
        converted = converted.add_modifier(Modifier::UNDERLINED);
    }
    converted
}

struct CodeBlockState {
    language: Option<String>,
    source: String,
}

#[derive(Default)]
struct TableState {
    rows: Vec<(bool, Vec<Vec<Span<'static>>>)>,
    row: Vec<Vec<Span<'static>>>,
    cell: Vec<Span<'static>>,
    in_head: bool,
}

struct LinkState {
    target: String,
    text_start: usize,
}

struct Renderer<'a> {
    theme: &'a MarkdownTheme,
    lines: Vec<Line<'static>>,
    current: Vec<Span<'static>>,
    styles: Vec<Style>,
    lists: Vec<Option<u64>>,
    quote_depth: usize,
    links: Vec<LinkState>,
    code_block: Option<CodeBlockState>,
    table: Option<TableState>,
}

impl<'a> Renderer<'a> {
    fn new(theme: &'a MarkdownTheme) -> Self {
        Self {
            theme,
            lines: Vec::new(),
            current: Vec::new(),
            styles: Vec::new(),
            lists: Vec::new(),
            quote_depth: 0,
            links: Vec::new(),
            code_block: None,
            table: None,
        }
    }

    fn handle(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(tag) => self.end(tag),
            Event::Text(text) => {
                if let Some(block) = self.code_block.as_mut() {
                    block.source.push_str(&text);
                } else {
                    self.push_text(&text, self.current_style());
                }
            }
            Event::Code(code) => {
                let style = self.current_style().patch(self.theme.style(Element::InlineCode));
                self.push_span(Span::styled(code.to_string(), style));
            }
            Event::Html(html) | Event::InlineHtml(html) => {
                let style = self.theme.style(Element::Html);
                self.push_text(&html, style);
            }
            Event::SoftBreak => self.push_span(Span::raw(" ")),
            Event::HardBreak => self.flush_line(),
            Event::Rule => {
                self.flush_line();
                let rule = "─".repeat(RULE_WIDTH);
                self.push_line(vec![Span::styled(rule, self.theme.style(Element::Rule))]);
                self.blank_line();
            }
            Event::TaskListMarker(checked) => {
                let marker = if checked { "[x] " } else { "[ ] " };
                self.push_span(Span::styled(marker, self.theme.style(Element::ListMarker)));
            }
            Event::FootnoteReference(label) => {
                self.push_span(Span::raw(format!("[^{}]", label)));
            }
            _ => {}
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Heading { level, .. } => {
                self.flush_line();
                let level = level as u8;
                let style = self.theme.style(Element::Heading(level));
                self.styles.push(style);
                self.push_span(Span::styled(format!("{} ", "#".repeat(level as usize)), style));
            }
            Tag::BlockQuote { .. } => {
                self.flush_line();
                self.quote_depth += 1;
                self.styles.push(self.theme.style(Element::BlockQuote));
            }
            Tag::CodeBlock(kind) => {
                self.flush_line();
                let language = match kind {
                    CodeBlockKind::Fenced(info) => language_tag(&info),
                    CodeBlockKind::Indented => None,
                };
                self.code_block = Some(CodeBlockState {
                    language,
                    source: String::new(),
                });
            }
            Tag::List(start) => {
                self.flush_line();
                self.lists.push(start);
            }
            Tag::Item => {
                self.flush_line();
                let depth = self.lists.len().saturating_sub(1);
                let marker = match self.lists.last_mut() {
                    Some(Some(number)) => {
                        let marker = format!("{}. ", number);
                        *number += 1;
                        marker
                    }
                    _ => "• ".to_string(),
                };
                let indent = "  ".repeat(depth);
                self.push_span(Span::styled(
                    format!("{}{}", indent, marker),
                    self.theme.style(Element::ListMarker),
                ));
            }
            Tag::Emphasis => self.styles.push(self.theme.style(Element::Emphasis)),
            Tag::Strong => self.styles.push(self.theme.style(Element::Strong)),
            Tag::Strikethrough => self.styles.push(self.theme.style(Element::Strikethrough)),
            Tag::Link { dest_url, .. } | Tag::Image { dest_url, .. } => {
                self.styles.push(self.theme.style(Element::Link));
                let text_start = self.current_target().len();
                self.links.push(LinkState {
                    target: dest_url.to_string(),
                    text_start,
                });
            }
            Tag::Table(_) => {
                self.flush_line();
                self.table = Some(TableState::default());
            }
            Tag::TableHead => {
                if let Some(table) = self.table.as_mut() {
                    table.in_head = true;
                    table.row.clear();
                }
            }
            Tag::TableRow => {
                if let Some(table) = self.table.as_mut() {
                    table.row.clear();
                }
            }
            Tag::TableCell => {
                if let Some(table) = self.table.as_mut() {
                    table.cell.clear();
                }
            }
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph => {
                self.flush_line();
                if self.lists.is_empty() {
                    self.blank_line();
                }
            }
            TagEnd::Heading { .. } => {
                self.styles.pop();
                self.flush_line();
                self.blank_line();
            }
            TagEnd::BlockQuote { .. } => {
                self.flush_line();
                self.styles.pop();
                self.quote_depth = self.quote_depth.saturating_sub(1);
                self.blank_line();
            }
            TagEnd::CodeBlock => {
                if let Some(block) = self.code_block.take() {
                    self.emit_code_block(block);
                }
            }
            TagEnd::List { .. } => {
                self.flush_line();
                self.lists.pop();
                if self.lists.is_empty() {
                    self.blank_line();
                }
            }
            TagEnd::Item => self.flush_line(),
            TagEnd::Emphasis | TagEnd::Strong | TagEnd::Strikethrough => {
                self.styles.pop();
            }
            TagEnd::Link | TagEnd::Image => {
                self.styles.pop();
                if let Some(link) = self.links.pop() {
                    self.close_link(link);
                }
            }
            TagEnd::TableCell => {
                if let Some(table) = self.table.as_mut() {
                    let cell = std::mem::take(&mut table.cell);
                    table.row.push(cell);
                }
            }
            TagEnd::TableHead | TagEnd::TableRow => {
                if let Some(table) = self.table.as_mut() {
                    let row = std::mem::take(&mut table.row);
                    table.rows.push((table.in_head, row));
                    table.in_head = false;
                }
            }
            TagEnd::Table => {
                if let Some(table) = self.table.take() {
                    self.emit_table(table);
                }
            }
            _ => {}
        }
    }

    fn finish(mut self) -> Vec<Line<'static>> {
        self.flush_line();
        while self.lines.last().is_some_and(|line| line.spans.is_empty()) {
            self.lines.pop();
        }
        self.lines
    }

    fn current_style(&self) -> Style {
        self.styles
            .iter()
            .fold(Style::default(), |acc, style| acc.patch(*style))
    }

    /// Spans currently being built: the open table cell, or the open line
    fn current_target(&mut self) -> &mut Vec<Span<'static>> {
        match self.table.as_mut() {
            Some(table) => &mut table.cell,
            None => &mut self.current,
        }
    }

    fn push_span(&mut self, span: Span<'static>) {
        self.current_target().push(span);
    }

    /// Push text that may contain newlines (HTML blocks, hard-wrapped text)
    fn push_text(&mut self, text: &str, style: Style) {
        let mut pieces = text.split('\n').peekable();
        while let Some(piece) = pieces.next() {
            if !piece.is_empty() {
                self.push_span(Span::styled(piece.to_string(), style));
            }
            if pieces.peek().is_some() && self.table.is_none() {
                self.flush_line();
            }
        }
    }

    fn close_link(&mut self, link: LinkState) {
        let spans = self.current_target();
        let start = link.text_start.min(spans.len());
        let text: String = spans[start..]
            .iter()
            .map(|span| span.content.as_ref())
            .collect();
        if link.target.is_empty() || text == link.target {
            return;
        }
        let style = self.theme.style(Element::LinkTarget);
        self.push_span(Span::styled(format!(" ({})", link.target), style));
    }

    fn quote_prefix(&self) -> Option<Span<'static>> {
        (self.quote_depth > 0).then(|| {
            Span::styled(
                "│ ".repeat(self.quote_depth),
                self.theme.style(Element::TableBorder),
            )
        })
    }

    fn push_line(&mut self, spans: Vec<Span<'static>>) {
        let mut line = Vec::with_capacity(spans.len() + 1);
        if let Some(prefix) = self.quote_prefix() {
            line.push(prefix);
        }
        line.extend(spans);
        self.lines.push(Line::from(line));
    }

    fn flush_line(&mut self) {
        if self.current.is_empty() {
            return;
        }
        let spans = std::mem::take(&mut self.current);
        self.push_line(spans);
    }

    fn blank_line(&mut self) {
        if self.lines.last().is_some_and(|line| !line.spans.is_empty()) {
            self.lines.push(Line::default());
        }
    }

    fn emit_code_block(&mut self, block: CodeBlockState) {
        let source = block.source.strip_suffix('\n').unwrap_or(&block.source);
        let border = self.theme.style(Element::CodeLanguage);

        let label = block.language.as_deref().unwrap_or("code");
        self.push_line(vec![Span::styled(format!("╭─ {}", label), border)]);

        let background = self.theme.style(Element::CodeBlock);
        for spans in highlight_code(source, block.language.as_deref(), self.theme) {
            let mut line = vec![Span::styled("│ ", border)];
            if spans.is_empty() {
                line.push(Span::styled(" ", background));
            }
            line.extend(spans);
            self.push_line(line);
        }

        self.push_line(vec![Span::styled("╰─", border)]);
        self.blank_line();
    }

    fn emit_table(&mut self, table: TableState) {
        let columns = table.rows.iter().map(|(_, row)| row.len()).max().unwrap_or(0);
        if columns == 0 {
            return;
        }

        let cell_width = |cell: &[Span<'static>]| -> usize {
            cell.iter().map(|span| span.content.width()).sum()
        };
        let mut widths = vec![0usize; columns];
        for (_, row) in &table.rows {
            for (index, cell) in row.iter().enumerate() {
                widths[index] = widths[index].max(cell_width(cell));
            }
        }

        let border = self.theme.style(Element::TableBorder);
        let header = self.theme.style(Element::TableHeader);

        for (is_head, row) in table.rows {
            let mut line = vec![Span::styled("│ ", border)];
            for (index, width) in widths.iter().enumerate() {
                let cell = row.get(index).cloned().unwrap_or_default();
                let used = cell_width(&cell);
                for span in cell {
                    if is_head {
                        let style = span.style.patch(header);
                        line.push(Span::styled(span.content, style));
                    } else {
                        line.push(span);
                    }
                }
                line.push(Span::raw(" ".repeat(width - used)));
                line.push(Span::styled(" │ ", border));
            }
            if let Some(last) = line.last_mut() {
                *last = Span::styled(" │", border);
            }
            self.push_line(line);

            if is_head {
                let separator: Vec<String> = widths.iter().map(|w| "─".repeat(w + 2)).collect();
                let separator = format!("├{}┤", separator.join("┼"));
                self.push_line(vec![Span::styled(separator, border)]);
            }
        }

        self.blank_line();
    }
}
