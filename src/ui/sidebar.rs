//! Conversation list

use crate::session::SessionState;
use chrono::Local;
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind};
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Widget},
};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};
use uuid::Uuid;

/// What a key press in the sidebar asks the manager to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SidebarAction {
    Select(Uuid),
    Delete(Uuid),
    New,
    None,
}

#[derive(Debug, Clone, Default)]
pub struct Sidebar {
    cursor: usize,
    has_focus: bool,
}

impl Sidebar {
    pub fn set_focus(&mut self, has_focus: bool) {
        self.has_focus = has_focus;
    }

    #[cfg(test)]
    fn cursor(&self) -> usize {
        self.cursor
    }

    /// Put the cursor on the active conversation
    pub fn follow_active(&mut self, session: &SessionState) {
        let active = session.active_id();
        self.cursor = session
            .conversations()
            .iter()
            .position(|c| c.id == active)
            .unwrap_or(0);
    }

    pub fn handle_key(&mut self, key: KeyEvent, session: &SessionState) -> SidebarAction {
        if key.kind != KeyEventKind::Press {
            return SidebarAction::None;
        }

        let conversations = session.conversations();
        self.cursor = self.cursor.min(conversations.len().saturating_sub(1));

        match key.code {
            KeyCode::Up | KeyCode::Char('k') => {
                self.cursor = self.cursor.saturating_sub(1);
                SidebarAction::None
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if self.cursor + 1 < conversations.len() {
                    self.cursor += 1;
                }
                SidebarAction::None
            }
            KeyCode::Home => {
                self.cursor = 0;
                SidebarAction::None
            }
            KeyCode::End => {
                self.cursor = conversations.len().saturating_sub(1);
                SidebarAction::None
            }
            KeyCode::Enter => conversations
                .get(self.cursor)
                .map_or(SidebarAction::None, |c| SidebarAction::Select(c.id)),
            KeyCode::Delete | KeyCode::Char('d') => conversations
                .get(self.cursor)
                .map_or(SidebarAction::None, |c| SidebarAction::Delete(c.id)),
            KeyCode::Char('n') => SidebarAction::New,
            _ => SidebarAction::None,
        }
    }

    pub fn render(&self, session: &SessionState, model_label: &str, area: Rect, buf: &mut Buffer) {
        let block = Block::default()
            .borders(Borders::ALL)
            .title(" Conversations ")
            .border_style(if self.has_focus {
                Style::default().fg(Color::Green)
            } else {
                Style::default().fg(Color::Gray)
            });
        let inner = block.inner(area);
        block.render(area, buf);
        if inner.width == 0 || inner.height < 3 {
            return;
        }

        let model_line = Line::from(vec![
            Span::styled("Model ", Style::default().fg(Color::DarkGray)),
            Span::styled(model_label.to_string(), Style::default().fg(Color::Cyan)),
        ]);
        buf.set_line(inner.x, inner.y, &model_line, inner.width);

        let list_area = Rect {
            y: inner.y + 2,
            height: inner.height - 2,
            ..inner
        };

        let active = session.active_id();
        let conversations = session.conversations();
        let height = list_area.height as usize;
        let first = (self.cursor + 1).saturating_sub(height);

        for (row, (index, conversation)) in conversations
            .iter()
            .enumerate()
            .skip(first)
            .take(height)
            .enumerate()
        {
            let is_active = conversation.id == active;
            let is_cursor = self.has_focus && index == self.cursor;

            let marker = if is_active { "● " } else { "  " };
            let time = conversation
                .created_at
                .with_timezone(&Local)
                .format("%H:%M")
                .to_string();
            let name_width = (list_area.width as usize).saturating_sub(marker.width() + time.len() + 1);
            let name = truncate(&conversation.name.replace('\n', " "), name_width);
            let padding = name_width.saturating_sub(name.width());

            let mut name_style = if is_active {
                Style::default().fg(Color::White).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::Gray)
            };
            if is_cursor {
                name_style = name_style.bg(Color::DarkGray);
            }

            let line = Line::from(vec![
                Span::styled(marker, Style::default().fg(Color::Green)),
                Span::styled(format!("{}{}", name, " ".repeat(padding)), name_style),
                Span::raw(" "),
                Span::styled(time, Style::default().fg(Color::DarkGray)),
            ]);
            buf.set_line(list_area.x, list_area.y + row as u16, &line, list_area.width);
        }
    }
}

/// Cut to `width` columns, marking the cut with an ellipsis
fn truncate(text: &str, width: usize) -> String {
    if text.width() <= width {
        return text.to_string();
    }
    if width == 0 {
        return String::new();
    }
    let mut cut = String::new();
    let mut used = 0;
    for c in text.chars() {
        let cells = c.width().unwrap_or(0);
        if used + cells > width - 1 {
            break;
        }
        cut.push(c);
        used += cells;
    }
    cut.push('…');
    cut
}
