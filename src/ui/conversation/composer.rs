use crate::ui::conversation::commands::{
    command_entries, parse_slash_command, CommandEntry, ParsedCommand,
};
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Widget},
};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// Minimum composer height: one text row plus the borders
const MIN_HEIGHT: u16 = 3;

/// Result returned when the user interacts with the conversation composer
#[derive(Debug, PartialEq)]
pub enum ConversationResult {
    Submitted(String),
    Command(ParsedCommand),
    None,
}

/// State for the text area within the composer.
///
/// `cursor_position` is a byte offset into `content` and always sits on a
/// char boundary.
#[derive(Debug, Clone, Default)]
pub struct TextAreaState {
    pub content: String,
    pub cursor_position: usize,
    pub scroll_offset: usize,
}

impl TextAreaState {
    fn insert_char(&mut self, c: char) {
        self.content.insert(self.cursor_position, c);
        self.cursor_position += c.len_utf8();
    }

    fn insert_str(&mut self, text: &str) {
        self.content.insert_str(self.cursor_position, text);
        self.cursor_position += text.len();
    }

    fn previous_boundary(&self) -> Option<usize> {
        self.content[..self.cursor_position]
            .chars()
            .next_back()
            .map(|c| self.cursor_position - c.len_utf8())
    }

    fn next_boundary(&self) -> Option<usize> {
        self.content[self.cursor_position..]
            .chars()
            .next()
            .map(|c| self.cursor_position + c.len_utf8())
    }

    /// Delete character before cursor
    fn backspace(&mut self) -> bool {
        match self.previous_boundary() {
            Some(start) => {
                self.content.replace_range(start..self.cursor_position, "");
                self.cursor_position = start;
                true
            }
            None => false,
        }
    }

    /// Delete character at cursor
    fn delete(&mut self) -> bool {
        match self.next_boundary() {
            Some(end) => {
                self.content.replace_range(self.cursor_position..end, "");
                true
            }
            None => false,
        }
    }

    /// Rows the content occupies when hard-wrapped at `width` columns.
    ///
    /// A row that is exactly full is followed by an empty row so the cursor
    /// always has a cell to sit in.
    pub fn visual_rows(&self, width: usize) -> Vec<String> {
        let width = width.max(1);
        self.content
            .split('\n')
            .flat_map(|line| wrap_columns(line, width))
            .map(str::to_string)
            .collect()
    }

    /// (row, display column) of the cursor within `visual_rows(width)`
    pub fn cursor_visual_position(&self, width: usize) -> (usize, usize) {
        let width = width.max(1);
        let before = &self.content[..self.cursor_position];
        let (row, current) = match before.rsplit_once('\n') {
            Some((finished, current)) => {
                let rows: usize = finished
                    .split('\n')
                    .map(|line| wrap_columns(line, width).len())
                    .sum();
                (rows, current)
            }
            None => (0, before),
        };

        // Greedy wrapping means the prefix wraps the way the full line does
        let rows = wrap_columns(current, width);
        let column = rows.last().map_or(0, |last| last.width());
        (row + rows.len() - 1, column)
    }
}

/// Hard-wrap one logical line by display width, adding an empty row after a
/// full one
fn wrap_columns(line: &str, width: usize) -> Vec<&str> {
    let mut rows = Vec::new();
    let mut start = 0;
    let mut used = 0;
    for (index, c) in line.char_indices() {
        let cells = c.width().unwrap_or(0);
        if used > 0 && used + cells > width {
            rows.push(&line[start..index]);
            start = index;
            used = 0;
        }
        used += cells;
    }
    rows.push(&line[start..]);
    if used >= width {
        rows.push("");
    }
    rows
}

/// Conversation composer for user input
pub struct ConversationComposer {
    state: TextAreaState,
    placeholder: String,
    has_focus: bool,
    model_label: String,
    command_entries: Vec<CommandEntry>,
    filtered_commands: Vec<CommandEntry>,
    show_command_palette: bool,
    selected_command: Option<usize>,
}

impl ConversationComposer {
    pub fn new(placeholder: impl Into<String>) -> Self {
        Self {
            state: TextAreaState::default(),
            placeholder: placeholder.into(),
            has_focus: true,
            model_label: String::new(),
            command_entries: command_entries(),
            filtered_commands: Vec::new(),
            show_command_palette: false,
            selected_command: None,
        }
    }

    /// Handle key input.
    ///
    /// Submitting does not clear the input; the caller clears it once the
    /// message has actually been accepted.
    pub fn handle_key(&mut self, key: KeyEvent) -> ConversationResult {
        if key.kind != KeyEventKind::Press {
            return ConversationResult::None;
        }

        match key.code {
            KeyCode::Enter => {
                if key
                    .modifiers
                    .intersects(KeyModifiers::SHIFT | KeyModifiers::ALT)
                {
                    self.state.insert_char('\n');
                } else if !self.state.content.trim().is_empty() {
                    if let Some(command) = parse_slash_command(&self.state.content) {
                        self.clear();
                        return ConversationResult::Command(command);
                    }
                    // A partial keyword completes instead of sending
                    if self.show_command_palette && self.apply_selected_command() {
                        return ConversationResult::None;
                    }
                    return ConversationResult::Submitted(self.state.content.clone());
                }
            }
            KeyCode::Up if self.show_command_palette => self.move_command_selection(-1),
            KeyCode::Down if self.show_command_palette => self.move_command_selection(1),
            KeyCode::Esc if self.show_command_palette => self.close_command_palette(),
            KeyCode::Tab if self.show_command_palette => {
                self.apply_selected_command();
            }
            KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.state.insert_char(c);
                self.sync_command_palette();
            }
            KeyCode::Backspace => {
                if self.state.backspace() {
                    self.sync_command_palette();
                }
            }
            KeyCode::Delete => {
                if self.state.delete() {
                    self.sync_command_palette();
                }
            }
            KeyCode::Left => {
                if let Some(position) = self.state.previous_boundary() {
                    self.state.cursor_position = position;
                }
            }
            KeyCode::Right => {
                if let Some(position) = self.state.next_boundary() {
                    self.state.cursor_position = position;
                }
            }
            KeyCode::Home => {
                self.state.cursor_position = 0;
            }
            KeyCode::End => {
                self.state.cursor_position = self.state.content.len();
            }
            _ => {}
        }

        ConversationResult::None
    }

    /// Insert pasted text at the cursor, normalizing line endings
    pub fn handle_paste(&mut self, text: &str) {
        let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
        self.state.insert_str(&normalized);
        self.sync_command_palette();
    }

    /// The palette is open while the input is a bare `/keyword` prefix
    fn sync_command_palette(&mut self) {
        let content = &self.state.content;
        let is_command_prefix = content.starts_with('/') && !content.contains(char::is_whitespace);
        if !is_command_prefix {
            self.close_command_palette();
            return;
        }

        if !self.show_command_palette {
            self.show_command_palette = true;
            self.selected_command = Some(0);
        }
        self.refresh_command_palette();
    }

    fn close_command_palette(&mut self) {
        self.show_command_palette = false;
        self.filtered_commands.clear();
        self.selected_command = None;
    }

    fn refresh_command_palette(&mut self) {
        let query = self.state.content.trim_start_matches('/').to_lowercase();
        self.filtered_commands = self
            .command_entries
            .iter()
            .filter(|entry| query.is_empty() || entry.keyword.starts_with(&query))
            .copied()
            .collect();

        if self.filtered_commands.is_empty() {
            self.selected_command = None;
        } else {
            let index = self.selected_command.unwrap_or(0);
            self.selected_command = Some(index.min(self.filtered_commands.len() - 1));
        }
    }

    fn move_command_selection(&mut self, delta: isize) {
        if self.filtered_commands.is_empty() {
            self.selected_command = None;
            return;
        }

        let len = self.filtered_commands.len() as isize;
        let current = self.selected_command.unwrap_or(0) as isize;
        self.selected_command = Some((current + delta).rem_euclid(len) as usize);
    }

    fn apply_selected_command(&mut self) -> bool {
        let Some(entry) = self
            .selected_command
            .and_then(|index| self.filtered_commands.get(index))
            .copied()
        else {
            return false;
        };

        self.state.content = format!("/{} ", entry.keyword);
        self.state.cursor_position = self.state.content.len();
        self.close_command_palette();
        true
    }

    pub fn is_command_palette_open(&self) -> bool {
        self.show_command_palette
    }

    pub fn selected_command(&self) -> Option<CommandEntry> {
        self.selected_command
            .and_then(|index| self.filtered_commands.get(index))
            .copied()
    }

    /// Set focus state
    pub fn set_focus(&mut self, has_focus: bool) {
        self.has_focus = has_focus;
    }

    /// Shown in the border title so the active model is always visible
    pub fn set_model_label(&mut self, label: impl Into<String>) {
        self.model_label = label.into();
    }

    /// Get current content
    pub fn content(&self) -> &str {
        &self.state.content
    }

    /// Replace the content and move the cursor to the end
    pub fn set_content(&mut self, content: impl Into<String>) {
        self.state.content = content.into();
        self.state.cursor_position = self.state.content.len();
        self.state.scroll_offset = 0;
        self.sync_command_palette();
    }

    /// Clear content
    pub fn clear(&mut self) {
        self.state = TextAreaState::default();
        self.close_command_palette();
    }

    /// Height the composer wants for `width` columns, clamped to
    /// `[MIN_HEIGHT, max_height]`
    pub fn desired_height(&self, width: u16, max_height: u16) -> u16 {
        let inner_width = width.saturating_sub(2) as usize;
        let rows = self.state.visual_rows(inner_width).len() as u16;
        rows.saturating_add(2)
            .clamp(MIN_HEIGHT, max_height.max(MIN_HEIGHT))
    }

    /// Screen position of the text cursor, if the composer has focus
    pub fn cursor_screen_position(&self, area: Rect) -> Option<(u16, u16)> {
        if !self.has_focus {
            return None;
        }
        let inner = Block::default().borders(Borders::ALL).inner(area);
        if inner.width == 0 || inner.height == 0 {
            return None;
        }
        let (row, column) = self.state.cursor_visual_position(inner.width as usize);
        let visible_row = row.checked_sub(self.state.scroll_offset)?;
        if visible_row >= inner.height as usize {
            return None;
        }
        Some((inner.x + column as u16, inner.y + visible_row as u16))
    }

    /// Keep the cursor row inside the visible window
    fn update_scroll(&mut self, inner: Rect) {
        let height = inner.height.max(1) as usize;
        let (row, _) = self.state.cursor_visual_position(inner.width as usize);
        if row < self.state.scroll_offset {
            self.state.scroll_offset = row;
        } else if row >= self.state.scroll_offset + height {
            self.state.scroll_offset = row + 1 - height;
        }
    }

    fn title(&self) -> String {
        if self.model_label.is_empty() {
            " Message ".to_string()
        } else {
            format!(" Message · {} ", self.model_label)
        }
    }

    fn render_command_palette(&self, area: Rect, buf: &mut Buffer) {
        let palette_height = (self.filtered_commands.len().min(5) + 2) as u16;
        let palette_area = Rect {
            x: area.x,
            y: area.y.saturating_sub(palette_height),
            width: area.width,
            height: palette_height.min(area.y),
        };
        if palette_area.height < 3 {
            return;
        }

        Clear.render(palette_area, buf);
        let block = Block::default()
            .borders(Borders::ALL)
            .title(" Commands ")
            .style(Style::default().fg(Color::Blue));
        let inner = block.inner(palette_area);
        block.render(palette_area, buf);

        for (index, entry) in self.filtered_commands.iter().enumerate() {
            if index >= inner.height as usize {
                break;
            }

            let style = if self.selected_command == Some(index) {
                Style::default()
                    .fg(Color::Black)
                    .bg(Color::Cyan)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::White)
            };

            let line = Line::from(vec![
                Span::styled(format!("/{}", entry.keyword), style),
                Span::styled("  ", Style::default()),
                Span::styled(entry.description, Style::default().fg(Color::Gray)),
            ]);
            buf.set_line(inner.x, inner.y + index as u16, &line, inner.width);
        }
    }
}

impl Widget for &mut ConversationComposer {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = Block::default()
            .borders(Borders::ALL)
            .title(self.title())
            .style(if self.has_focus {
                Style::default().fg(Color::Green)
            } else {
                Style::default().fg(Color::Gray)
            });

        let inner = block.inner(area);
        block.render(area, buf);
        if inner.width == 0 || inner.height == 0 {
            return;
        }

        if self.state.content.is_empty() {
            let placeholder = Line::from(Span::styled(
                self.placeholder.as_str(),
                Style::default().fg(Color::DarkGray),
            ));
            buf.set_line(inner.x, inner.y, &placeholder, inner.width);
        } else {
            self.update_scroll(inner);
            let rows = self.state.visual_rows(inner.width as usize);
            for (i, row) in rows
                .iter()
                .skip(self.state.scroll_offset)
                .take(inner.height as usize)
                .enumerate()
            {
                let line = Line::from(Span::styled(row.as_str(), Style::default().fg(Color::White)));
                buf.set_line(inner.x, inner.y + i as u16, &line, inner.width);
            }
        }

        if self.show_command_palette {
            self.render_command_palette(area, buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::conversation::commands::SlashCommand;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn type_text(composer: &mut ConversationComposer, text: &str) {
        for c in text.chars() {
            composer.handle_key(key(KeyCode::Char(c)));
        }
    }

    #[test]
    fn test_enter_submits_without_clearing() {
        let mut composer = ConversationComposer::new("Type a message");
        type_text(&mut composer, "hello");

        let result = composer.handle_key(key(KeyCode::Enter));
        assert_eq!(result, ConversationResult::Submitted("hello".to_string()));
        assert_eq!(composer.content(), "hello");
    }

    #[test]
    fn test_shift_enter_inserts_newline() {
        let mut composer = ConversationComposer::new("");
        type_text(&mut composer, "line one");
        let result = composer.handle_key(KeyEvent::new(KeyCode::Enter, KeyModifiers::SHIFT));
        type_text(&mut composer, "line two");

        assert_eq!(result, ConversationResult::None);
        assert_eq!(composer.content(), "line one\nline two");

        composer.handle_key(KeyEvent::new(KeyCode::Enter, KeyModifiers::ALT));
        assert_eq!(composer.content(), "line one\nline two\n");
    }

    #[test]
    fn test_blank_input_does_not_submit() {
        let mut composer = ConversationComposer::new("");
        assert_eq!(composer.handle_key(key(KeyCode::Enter)), ConversationResult::None);

        type_text(&mut composer, "   ");
        assert_eq!(composer.handle_key(key(KeyCode::Enter)), ConversationResult::None);
        assert_eq!(composer.content(), "   ");
    }

    #[test]
    fn test_slash_command_is_parsed_and_cleared() {
        let mut composer = ConversationComposer::new("");
        composer.set_content("/model phi3");

        match composer.handle_key(key(KeyCode::Enter)) {
            ConversationResult::Command(parsed) => {
                assert_eq!(parsed.command, SlashCommand::Model);
                assert_eq!(parsed.argument(), Some("phi3"));
            }
            other => panic!("expected a command, got {:?}", other),
        }
        assert!(composer.content().is_empty());
    }

    #[test]
    fn test_palette_filters_and_completes() {
        let mut composer = ConversationComposer::new("");
        type_text(&mut composer, "/");
        assert!(composer.is_command_palette_open());

        type_text(&mut composer, "mo");
        assert_eq!(
            composer.selected_command().map(|entry| entry.command),
            Some(SlashCommand::Model)
        );

        composer.handle_key(key(KeyCode::Tab));
        assert_eq!(composer.content(), "/model ");
        assert!(!composer.is_command_palette_open());
    }

    #[test]
    fn test_multibyte_editing() {
        let mut composer = ConversationComposer::new("");
        type_text(&mut composer, "héllo");
        composer.handle_key(key(KeyCode::Left));
        composer.handle_key(key(KeyCode::Left));
        composer.handle_key(key(KeyCode::Left));
        composer.handle_key(key(KeyCode::Backspace));
        assert_eq!(composer.content(), "hllo");

        composer.handle_key(key(KeyCode::Home));
        composer.handle_key(key(KeyCode::Delete));
        assert_eq!(composer.content(), "llo");
    }

    #[test]
    fn test_paste_normalizes_line_endings() {
        let mut composer = ConversationComposer::new("");
        composer.handle_paste("a\r\nb\rc");
        assert_eq!(composer.content(), "a\nb\nc");
    }

    #[test]
    fn test_height_grows_with_content_and_caps() {
        let mut composer = ConversationComposer::new("");
        assert_eq!(composer.desired_height(22, 10), 3);

        composer.set_content("one\ntwo\nthree");
        assert_eq!(composer.desired_height(22, 10), 5);

        composer.set_content("x\n".repeat(30));
        assert_eq!(composer.desired_height(22, 10), 10);
    }

    #[test]
    fn test_cursor_follows_wrapping() {
        let mut state = TextAreaState::default();
        state.insert_str("abcdefgh\nxy");
        assert_eq!(state.visual_rows(4), vec!["abcd", "efgh", "", "xy"]);
        assert_eq!(state.cursor_visual_position(4), (3, 2));

        state.cursor_position = 8;
        assert_eq!(state.cursor_visual_position(4), (2, 0));
    }

    #[test]
    fn test_wide_characters_wrap_by_columns() {
        let mut state = TextAreaState::default();
        state.insert_str("你好世界");
        assert_eq!(state.visual_rows(6), vec!["你好世", "界"]);
        assert_eq!(state.cursor_visual_position(6), (1, 2));

        // A wide character that would straddle the edge moves to the next row
        let mut state = TextAreaState::default();
        state.insert_str("ab你好");
        assert_eq!(state.visual_rows(5), vec!["ab你", "好"]);
        assert_eq!(state.visual_rows(4), vec!["ab你", "好"]);
        assert_eq!(state.visual_rows(3), vec!["ab", "你", "好"]);
        assert_eq!(state.cursor_visual_position(3), (2, 2));

        state.cursor_position = "ab你".len();
        assert_eq!(state.cursor_visual_position(3), (1, 2));
    }

    #[test]
    fn test_scroll_keeps_cursor_visible() {
        let mut composer = ConversationComposer::new("");
        composer.set_content("1\n2\n3\n4\n5\n6");
        let area = Rect::new(0, 10, 20, 5);
        let mut buf = Buffer::empty(Rect::new(0, 0, 20, 20));
        (&mut composer).render(area, &mut buf);

        let (_, y) = composer.cursor_screen_position(area).unwrap();
        assert_eq!(y, area.y + 3);
    }
}
