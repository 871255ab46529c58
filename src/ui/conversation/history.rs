//! Conversation transcript display component

use crate::events::{ChatMessage, ConversationRole};
use crate::markdown::{render_markdown, MarkdownTheme};
use crate::session::{SessionState, SAMPLE_PROMPT};
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState, StatefulWidget, Widget},
};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};
use uuid::Uuid;

/// What the transcript looked like when the scroll position was last reset.
/// Any change jumps the view back to the newest content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ScrollAnchor {
    conversation_id: Uuid,
    message_count: usize,
    awaiting_reply: bool,
}

/// Conversation transcript display component
#[derive(Debug, Clone, Default)]
pub struct ConversationHistory {
    theme: MarkdownTheme,
    /// Lines scrolled up from the bottom; zero means pinned to the newest line
    offset_from_bottom: usize,
    anchor: Option<ScrollAnchor>,
}

impl ConversationHistory {
    pub fn new(theme: MarkdownTheme) -> Self {
        Self {
            theme,
            offset_from_bottom: 0,
            anchor: None,
        }
    }

    /// Reset to the bottom when the active conversation, its message count or
    /// the awaiting-reply flag changed. Returns whether a reset happened.
    pub fn sync_scroll(&mut self, session: &SessionState) -> bool {
        let anchor = ScrollAnchor {
            conversation_id: session.active_id(),
            message_count: session.active().messages.len(),
            awaiting_reply: session.is_awaiting_reply(),
        };

        if self.anchor == Some(anchor) {
            return false;
        }
        self.anchor = Some(anchor);
        self.offset_from_bottom = 0;
        true
    }

    pub fn scroll_up(&mut self, lines: usize) {
        self.offset_from_bottom = self.offset_from_bottom.saturating_add(lines);
    }

    pub fn scroll_down(&mut self, lines: usize) {
        self.offset_from_bottom = self.offset_from_bottom.saturating_sub(lines);
    }

    pub fn scroll_to_bottom(&mut self) {
        self.offset_from_bottom = 0;
    }

    pub fn offset_from_bottom(&self) -> usize {
        self.offset_from_bottom
    }

    /// Every transcript line, wrapped to `width`
    pub fn build_lines(&self, session: &SessionState, width: u16, tick: u64) -> Vec<Line<'static>> {
        let width = width as usize;
        let conversation = session.active();

        if conversation.messages.is_empty() && !session.is_awaiting_reply() {
            let mut lines = welcome_lines();
            if let Some(error) = session.last_error() {
                lines.push(Line::default());
                lines.push(error_line(error));
            }
            return lines
                .iter()
                .flat_map(|line| wrap_line(line, width))
                .collect();
        }

        let mut lines: Vec<Line<'static>> = Vec::new();
        for message in &conversation.messages {
            lines.extend(self.render_message(message, width));
            lines.push(Line::default());
        }

        if session.is_awaiting_reply() {
            lines.push(role_header(ConversationRole::Assistant));
            lines.push(loading_line(tick));
        } else if let Some(error) = session.last_error() {
            lines.extend(wrap_line(&error_line(error), width));
        }

        while lines.last().is_some_and(|line| line.spans.is_empty()) {
            lines.pop();
        }
        lines
    }

    /// Render a single message into wrapped lines
    fn render_message(&self, message: &ChatMessage, width: usize) -> Vec<Line<'static>> {
        let mut lines = vec![role_header(message.role)];
        let body_width = width.saturating_sub(2);

        let body: Vec<Line<'static>> = match message.role {
            ConversationRole::Assistant => render_markdown(&message.content, &self.theme),
            ConversationRole::User | ConversationRole::System => message
                .content
                .split('\n')
                .map(|text| Line::from(Span::styled(text.to_string(), content_style(message.role))))
                .collect(),
        };

        for line in &body {
            for wrapped in wrap_line(line, body_width) {
                let mut spans = vec![Span::raw("  ")];
                spans.extend(wrapped.spans);
                lines.push(Line::from(spans));
            }
        }
        lines
    }

    /// Draw the transcript for the active conversation
    pub fn render(&mut self, session: &SessionState, tick: u64, area: Rect, buf: &mut Buffer) {
        self.sync_scroll(session);

        let block = Block::default()
            .borders(Borders::ALL)
            .title(format!(" {} ", session.active().name.replace('\n', " ")));
        let inner = block.inner(area);
        block.render(area, buf);
        if inner.width == 0 || inner.height == 0 {
            return;
        }

        // Leave a column for the scrollbar
        let text_width = inner.width.saturating_sub(1);
        let lines = self.build_lines(session, text_width, tick);

        let height = inner.height as usize;
        let max_offset = lines.len().saturating_sub(height);
        self.offset_from_bottom = self.offset_from_bottom.min(max_offset);
        let top = max_offset - self.offset_from_bottom;
        let visible: Vec<Line<'static>> = lines.iter().skip(top).take(height).cloned().collect();

        Paragraph::new(visible).render(
            Rect {
                width: text_width,
                ..inner
            },
            buf,
        );

        if max_offset > 0 {
            let mut state = ScrollbarState::new(max_offset).position(top);
            Scrollbar::default()
                .orientation(ScrollbarOrientation::VerticalRight)
                .begin_symbol(Some("↑"))
                .end_symbol(Some("↓"))
                .render(inner, buf, &mut state);
        }
    }
}

fn welcome_lines() -> Vec<Line<'static>> {
    vec![
        Line::from(Span::styled(
            "Welcome to Ullama",
            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        )),
        Line::default(),
        Line::from(Span::styled(
            "Chat with the models running on your local Ollama.",
            Style::default().fg(Color::Gray),
        )),
        Line::default(),
        Line::from(vec![
            Span::styled("Try: ", Style::default().fg(Color::DarkGray)),
            Span::styled(
                format!("\"{}\"", SAMPLE_PROMPT),
                Style::default().fg(Color::Cyan),
            ),
            Span::styled(" (Ctrl+E)", Style::default().fg(Color::DarkGray)),
        ]),
        Line::default(),
        Line::from(Span::styled(
            "Enter to send, Shift+Enter for a new line, /help for more.",
            Style::default().fg(Color::DarkGray),
        )),
    ]
}

fn role_header(role: ConversationRole) -> Line<'static> {
    let (label, color) = match role {
        ConversationRole::User => ("You", Color::Blue),
        ConversationRole::Assistant => ("Assistant", Color::Green),
        ConversationRole::System => ("System", Color::Yellow),
    };
    Line::from(Span::styled(
        label,
        Style::default().fg(color).add_modifier(Modifier::BOLD),
    ))
}

fn content_style(role: ConversationRole) -> Style {
    match role {
        ConversationRole::User => Style::default().fg(Color::LightBlue),
        ConversationRole::Assistant => Style::default(),
        ConversationRole::System => Style::default().fg(Color::Yellow),
    }
}

/// Three dots, one of them lit, cycling with the tick counter
fn loading_line(tick: u64) -> Line<'static> {
    let lit = (tick % 3) as usize;
    let mut spans = vec![Span::raw("  ")];
    for dot in 0..3 {
        let style = if dot == lit {
            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        spans.push(Span::styled("● ", style));
    }
    Line::from(spans)
}

fn error_line(error: &str) -> Line<'static> {
    Line::from(Span::styled(
        format!("⚠ Failed to get a reply: {}", error),
        Style::default().fg(Color::Red),
    ))
}

/// Split text into alternating runs of whitespace and non-whitespace
fn tokens(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut previous: Option<bool> = None;

    for (index, c) in text.char_indices() {
        let is_space = c.is_whitespace();
        if previous.is_some_and(|p| p != is_space) {
            out.push(&text[start..index]);
            start = index;
        }
        previous = Some(is_space);
    }
    if start < text.len() {
        out.push(&text[start..]);
    }
    out
}

/// Split off the longest prefix of `text` that fits in `columns` cells
fn split_at_width(text: &str, columns: usize) -> (&str, &str) {
    let mut used = 0;
    for (index, c) in text.char_indices() {
        let width = c.width().unwrap_or(0);
        if used + width > columns {
            return text.split_at(index);
        }
        used += width;
    }
    (text, "")
}

/// Greedy word wrap that keeps span styles, measured in terminal columns.
/// Words wider than `width` are split; whitespace at a wrap point is dropped.
pub fn wrap_line(line: &Line<'static>, width: usize) -> Vec<Line<'static>> {
    if width == 0 {
        return vec![line.clone()];
    }

    let mut rows: Vec<Vec<Span<'static>>> = vec![Vec::new()];
    let mut used = 0;

    for span in &line.spans {
        for mut token in tokens(&span.content) {
            let mut len = token.width();
            let is_space = token.chars().all(char::is_whitespace);

            if used > 0 && used + len > width {
                if is_space {
                    continue;
                }
                if len <= width {
                    rows.push(Vec::new());
                    used = 0;
                }
            }

            while len > width.saturating_sub(used) {
                let (mut head, mut tail) = split_at_width(token, width.saturating_sub(used));
                if head.is_empty() && used == 0 {
                    // One character wider than the whole row
                    let end = token.chars().next().map_or(token.len(), char::len_utf8);
                    (head, tail) = token.split_at(end);
                }

                let head_width = head.width();
                if !head.is_empty() {
                    if let Some(row) = rows.last_mut() {
                        row.push(Span::styled(head.to_string(), span.style));
                    }
                }
                token = tail;
                len = token.width();
                if token.is_empty() {
                    used += head_width;
                    break;
                }
                rows.push(Vec::new());
                used = 0;
            }

            if !token.is_empty() {
                if let Some(row) = rows.last_mut() {
                    row.push(Span::styled(token.to_string(), span.style));
                }
                used += len;
            }
        }
    }

    rows.into_iter()
        .map(|spans| {
            let mut wrapped = Line::from(spans);
            wrapped.style = line.style;
            wrapped.alignment = line.alignment;
            wrapped
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::AppEvent;

    fn text_of(line: &Line) -> String {
        line.spans.iter().map(|span| span.content.as_ref()).collect()
    }

    fn all_text(lines: &[Line]) -> Vec<String> {
        lines.iter().map(text_of).collect()
    }

    #[test]
    fn test_wrap_breaks_on_words() {
        let line = Line::from("the quick brown fox");
        let wrapped = wrap_line(&line, 10);
        assert_eq!(all_text(&wrapped), vec!["the quick", "brown fox"]);
    }

    #[test]
    fn test_wrap_splits_long_words() {
        let line = Line::from("abcdefghij");
        let wrapped = wrap_line(&line, 4);
        assert_eq!(all_text(&wrapped), vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_wrap_measures_wide_characters_in_columns() {
        let line = Line::from("你".repeat(30));
        let wrapped = wrap_line(&line, 30);

        assert_eq!(wrapped.len(), 2);
        for row in &wrapped {
            assert_eq!(text_of(row).width(), 30);
        }
    }

    #[test]
    fn test_wrap_mixed_width_words() {
        let line = Line::from("hello 世界 again");
        let wrapped = wrap_line(&line, 10);
        assert_eq!(all_text(&wrapped), vec!["hello 世界", "again"]);

        // A wide character never lands half inside a row
        let wrapped = wrap_line(&Line::from("ab🙂cd"), 3);
        assert_eq!(all_text(&wrapped), vec!["ab", "🙂c", "d"]);
        assert!(wrapped.iter().all(|row| text_of(row).width() <= 3));
    }

    #[test]
    fn test_wrap_keeps_span_styles() {
        let bold = Style::default().add_modifier(Modifier::BOLD);
        let line = Line::from(vec![Span::raw("plain "), Span::styled("bold words", bold)]);
        let wrapped = wrap_line(&line, 11);

        assert_eq!(all_text(&wrapped), vec!["plain bold", "words"]);
        assert_eq!(wrapped[1].spans[0].style, bold);
    }

    #[test]
    fn test_wrap_keeps_leading_indent() {
        let line = Line::from("    indented");
        assert_eq!(all_text(&wrap_line(&line, 20)), vec!["    indented"]);
        assert_eq!(wrap_line(&Line::default(), 5).len(), 1);
    }

    #[test]
    fn test_welcome_for_empty_conversation() {
        let history = ConversationHistory::default();
        let session = SessionState::new("phi3");
        let text = all_text(&history.build_lines(&session, 80, 0)).join("\n");

        assert!(text.contains("Welcome to Ullama"));
        assert!(text.contains(SAMPLE_PROMPT));
    }

    #[test]
    fn test_transcript_shows_messages_and_loading() {
        let history = ConversationHistory::default();
        let mut session = SessionState::new("phi3");
        session.begin_send("Hello there").unwrap();

        let text = all_text(&history.build_lines(&session, 80, 0));
        assert!(text.contains(&"You".to_string()));
        assert!(text.contains(&"  Hello there".to_string()));
        assert!(text.last().unwrap().contains('●'));
    }

    #[test]
    fn test_assistant_reply_is_markdown() {
        let history = ConversationHistory::default();
        let mut session = SessionState::new("phi3");
        let pending = session.begin_send("hi").unwrap();
        session.complete_send(AppEvent::ReplyReceived {
            conversation_id: pending.conversation_id,
            content: "Some **bold** text".to_string(),
        });

        let lines = history.build_lines(&session, 80, 0);
        let reply = lines
            .iter()
            .find(|line| text_of(line).contains("bold"))
            .unwrap();
        assert!(reply
            .spans
            .iter()
            .any(|span| span.content == "bold" && span.style.add_modifier.contains(Modifier::BOLD)));
    }

    #[test]
    fn test_error_is_shown_after_failure() {
        let history = ConversationHistory::default();
        let mut session = SessionState::new("phi3");
        let pending = session.begin_send("hi").unwrap();
        session.complete_send(AppEvent::ReplyFailed {
            conversation_id: pending.conversation_id,
            error: "connection refused".to_string(),
        });

        let text = all_text(&history.build_lines(&session, 80, 0)).join("\n");
        assert!(text.contains("connection refused"));
    }

    #[test]
    fn test_scroll_resets_when_transcript_changes() {
        let mut history = ConversationHistory::default();
        let mut session = SessionState::new("phi3");

        assert!(history.sync_scroll(&session));
        history.scroll_up(5);
        assert!(!history.sync_scroll(&session));
        assert_eq!(history.offset_from_bottom(), 5);

        session.begin_send("hi").unwrap();
        assert!(history.sync_scroll(&session));
        assert_eq!(history.offset_from_bottom(), 0);

        history.scroll_up(3);
        session.create_conversation();
        assert!(history.sync_scroll(&session));
        assert_eq!(history.offset_from_bottom(), 0);
    }

    #[test]
    fn test_render_clamps_offset() {
        let mut history = ConversationHistory::default();
        let mut session = SessionState::new("phi3");
        session.begin_send("hi").unwrap();
        let area = Rect::new(0, 0, 40, 20);
        let mut buf = Buffer::empty(area);

        history.render(&session, 0, area, &mut buf);
        history.scroll_up(100);
        history.render(&session, 0, area, &mut buf);
        assert_eq!(history.offset_from_bottom(), 0);
    }
}
