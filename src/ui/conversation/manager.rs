use crate::client::ProxyClient;
use crate::config::Config;
use crate::events::{AppEvent, TuiEvent};
use crate::markdown::MarkdownTheme;
use crate::session::{PendingSend, SessionState, SAMPLE_PROMPT};
use crate::ui::conversation::composer::ConversationResult;
use crate::ui::conversation::{
    get_help_text, ConversationComposer, ConversationHistory, ParsedCommand, SlashCommand,
};
use crate::ui::sidebar::{Sidebar, SidebarAction};
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame,
};
use tokio::sync::mpsc;

const SIDEBAR_WIDTH: u16 = 32;

/// Actions that can be requested by the conversation manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationAction {
    None,
    Exit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Sidebar,
    Composer,
}

/// Owns the session state and every chat UI component
pub struct ConversationManager {
    config: Config,
    session: SessionState,
    history: ConversationHistory,
    composer: ConversationComposer,
    sidebar: Sidebar,
    client: ProxyClient,
    focus: Focus,
    events_tx: mpsc::UnboundedSender<AppEvent>,
    events_rx: mpsc::UnboundedReceiver<AppEvent>,
    notice: Option<String>,
    show_help: bool,
    tick: u64,
    transcript_height: u16,
}

impl ConversationManager {
    pub fn new(config: Config) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let session = SessionState::new(config.client.default_model.clone());
        let mut composer = ConversationComposer::new("Type your message...");
        composer.set_focus(true);

        Self {
            client: ProxyClient::new(&config.client.proxy_url),
            history: ConversationHistory::new(MarkdownTheme::new(config.ui.theme.clone())),
            session,
            composer,
            sidebar: Sidebar::default(),
            focus: Focus::Composer,
            events_tx,
            events_rx,
            notice: None,
            show_help: false,
            tick: 0,
            transcript_height: 10,
            config,
        }
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn composer(&self) -> &ConversationComposer {
        &self.composer
    }

    pub fn focus(&self) -> Focus {
        self.focus
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn is_help_visible(&self) -> bool {
        self.show_help
    }

    pub fn handle_event(&mut self, event: TuiEvent) -> ConversationAction {
        match event {
            TuiEvent::Key(key) => return self.handle_key(key),
            TuiEvent::Paste(text) => {
                if self.focus == Focus::Composer && !self.show_help {
                    self.composer.handle_paste(&text);
                }
            }
            TuiEvent::Resize(_, _) => {}
            TuiEvent::Tick => self.tick = self.tick.wrapping_add(1),
        }
        ConversationAction::None
    }

    /// Handle key input
    pub fn handle_key(&mut self, key: KeyEvent) -> ConversationAction {
        if key.kind != KeyEventKind::Press {
            return ConversationAction::None;
        }

        if self.show_help {
            self.show_help = false;
            return ConversationAction::None;
        }
        self.notice = None;

        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Char('c') if ctrl => return ConversationAction::Exit,
            KeyCode::Esc if !self.composer.is_command_palette_open() => {
                return ConversationAction::Exit;
            }
            KeyCode::Char('n') if ctrl => {
                self.new_conversation();
                return ConversationAction::None;
            }
            KeyCode::Char('l') if ctrl => {
                self.cycle_model();
                return ConversationAction::None;
            }
            KeyCode::Char('e') if ctrl => {
                self.send_sample_prompt();
                return ConversationAction::None;
            }
            KeyCode::PageUp => {
                self.history.scroll_up(self.page_size());
                return ConversationAction::None;
            }
            KeyCode::PageDown => {
                self.history.scroll_down(self.page_size());
                return ConversationAction::None;
            }
            KeyCode::Tab | KeyCode::BackTab if !self.composer.is_command_palette_open() => {
                self.toggle_focus();
                return ConversationAction::None;
            }
            _ => {}
        }

        match self.focus {
            Focus::Sidebar => self.handle_sidebar_key(key),
            Focus::Composer => match self.composer.handle_key(key) {
                ConversationResult::Submitted(input) => {
                    if self.send(&input) {
                        self.composer.clear();
                    }
                    ConversationAction::None
                }
                ConversationResult::Command(command) => self.handle_slash_command(command),
                ConversationResult::None => ConversationAction::None,
            },
        }
    }

    fn handle_sidebar_key(&mut self, key: KeyEvent) -> ConversationAction {
        match self.sidebar.handle_key(key, &self.session) {
            SidebarAction::Select(id) => {
                self.session.select_conversation(id);
                self.set_focus(Focus::Composer);
            }
            SidebarAction::Delete(id) => {
                self.session.delete_conversation(id);
                self.sidebar.follow_active(&self.session);
            }
            SidebarAction::New => self.new_conversation(),
            SidebarAction::None => {}
        }
        ConversationAction::None
    }

    /// Handle slash commands
    fn handle_slash_command(&mut self, command: ParsedCommand) -> ConversationAction {
        match command.command {
            SlashCommand::New => self.new_conversation(),
            SlashCommand::Delete => {
                let id = self.session.active_id();
                self.session.delete_conversation(id);
                self.sidebar.follow_active(&self.session);
            }
            SlashCommand::Model => match command.argument() {
                Some(model) => self.set_model(model),
                None => self.cycle_model(),
            },
            SlashCommand::Help => self.show_help = true,
            SlashCommand::Quit => return ConversationAction::Exit,
        }
        ConversationAction::None
    }

    /// Start a send for `input` on the active conversation.
    ///
    /// Returns false when the session rejected it (blank input, or a reply
    /// is still pending).
    pub fn send(&mut self, input: &str) -> bool {
        let Some(pending) = self.session.begin_send(input) else {
            return false;
        };
        self.dispatch(pending);
        true
    }

    /// Send the sample prompt, only from the welcome screen
    pub fn send_sample_prompt(&mut self) -> bool {
        if !self.session.active().messages.is_empty() {
            return false;
        }
        self.send(SAMPLE_PROMPT)
    }

    fn dispatch(&self, pending: PendingSend) {
        tracing::info!(
            conversation = %pending.conversation_id,
            model = %pending.model,
            messages = pending.messages.len(),
            "Sending chat request"
        );

        let client = self.client.clone();
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let conversation_id = pending.conversation_id;
            let event = match client.chat(pending.messages, pending.model).await {
                Ok(content) => AppEvent::ReplyReceived {
                    conversation_id,
                    content,
                },
                Err(e) => AppEvent::ReplyFailed {
                    conversation_id,
                    error: e.to_string(),
                },
            };
            if events.send(event).is_err() {
                tracing::debug!("UI closed before the reply arrived");
            }
        });
    }

    /// Apply finished sends (called from main loop)
    pub fn process_events(&mut self) -> bool {
        let mut changed = false;
        while let Ok(event) = self.events_rx.try_recv() {
            self.session.complete_send(event);
            changed = true;
        }
        changed
    }

    pub fn new_conversation(&mut self) {
        self.session.create_conversation();
        self.sidebar.follow_active(&self.session);
        self.set_focus(Focus::Composer);
    }

    fn set_model(&mut self, model: &str) {
        if self.session.change_model(model) {
            let label = self.config.model_label(self.session.active().model.as_str()).to_string();
            self.notice = Some(format!("Model set to {}", label));
        }
    }

    /// Move the active conversation to the next suggested model
    pub fn cycle_model(&mut self) {
        let next = self
            .config
            .next_model(&self.session.active().model)
            .map(str::to_string);
        if let Some(model) = next {
            self.set_model(&model);
        }
    }

    fn toggle_focus(&mut self) {
        let next = match self.focus {
            Focus::Sidebar => Focus::Composer,
            Focus::Composer => Focus::Sidebar,
        };
        self.set_focus(next);
    }

    fn set_focus(&mut self, focus: Focus) {
        self.focus = focus;
        self.composer.set_focus(focus == Focus::Composer);
        self.sidebar.set_focus(focus == Focus::Sidebar);
        if focus == Focus::Sidebar {
            self.sidebar.follow_active(&self.session);
        }
    }

    fn page_size(&self) -> usize {
        self.transcript_height.saturating_sub(2).max(1) as usize
    }

    /// Render the whole chat screen
    pub fn render(&mut self, frame: &mut Frame) {
        let area = frame.size();
        let sidebar_width = SIDEBAR_WIDTH.min(area.width / 3);
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(sidebar_width), Constraint::Min(20)])
            .split(area);

        let model_label = self
            .config
            .model_label(self.session.active().model.as_str())
            .to_string();
        self.sidebar
            .render(&self.session, &model_label, columns[0], frame.buffer_mut());

        let main = columns[1];
        let composer_height = self
            .composer
            .desired_height(main.width, self.config.ui.composer_max_height);
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(3),
                Constraint::Length(composer_height),
                Constraint::Length(1),
            ])
            .split(main);

        self.transcript_height = rows[0].height;
        self.history
            .render(&self.session, self.tick, rows[0], frame.buffer_mut());

        self.composer.set_model_label(model_label.as_str());
        frame.render_widget(&mut self.composer, rows[1]);

        frame.render_widget(Paragraph::new(self.status_line(&model_label)), rows[2]);

        if self.show_help {
            render_help(frame, area);
        } else if let Some((x, y)) = self.composer.cursor_screen_position(rows[1]) {
            frame.set_cursor(x, y);
        }
    }

    fn status_line(&self, model_label: &str) -> Line<'static> {
        if let Some(notice) = &self.notice {
            return Line::from(Span::styled(notice.clone(), Style::default().fg(Color::Yellow)));
        }
        if self.session.is_awaiting_reply() {
            return Line::from(Span::styled(
                format!("Waiting for {}...", model_label),
                Style::default().fg(Color::Green),
            ));
        }
        Line::from(Span::styled(
            "Enter send · Shift+Enter newline · Tab focus · Ctrl+N new · Ctrl+L model · /help",
            Style::default().fg(Color::DarkGray),
        ))
    }
}

fn render_help(frame: &mut Frame, area: Rect) {
    let text = get_help_text();
    let width = 64.min(area.width);
    let height = (text.lines().count() as u16 + 2).min(area.height);
    let popup = Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    };

    frame.render_widget(Clear, popup);
    frame.render_widget(
        Paragraph::new(text).block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Help (any key to close) ")
                .border_style(Style::default().fg(Color::Cyan)),
        ),
        popup,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ConversationRole;
    use ratatui::{backend::TestBackend, Terminal};
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    fn type_text(manager: &mut ConversationManager, text: &str) {
        for c in text.chars() {
            manager.handle_key(key(KeyCode::Char(c)));
        }
    }

    fn manager_for(proxy_url: &str) -> ConversationManager {
        let mut config = Config::default();
        config.client.proxy_url = proxy_url.to_string();
        ConversationManager::new(config)
    }

    async fn wait_for_reply(manager: &mut ConversationManager) {
        for _ in 0..200 {
            manager.process_events();
            if !manager.session().is_awaiting_reply() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("no reply arrived");
    }

    #[tokio::test]
    async fn test_enter_sends_and_reply_is_appended() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/ollama"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": { "role": "assistant", "content": "Hello back" },
                "done": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut manager = manager_for(&server.uri());
        type_text(&mut manager, "Hello");
        manager.handle_key(key(KeyCode::Enter));

        assert!(manager.session().is_awaiting_reply());
        assert!(manager.composer().content().is_empty());
        assert_eq!(manager.session().active().name, "Hello");

        wait_for_reply(&mut manager).await;
        let messages = &manager.session().active().messages;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].role, ConversationRole::Assistant);
        assert_eq!(messages[1].content, "Hello back");
    }

    #[tokio::test]
    async fn test_second_send_while_awaiting_keeps_input() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "message": { "content": "ok" } }))
                    .set_delay(Duration::from_millis(200)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mut manager = manager_for(&server.uri());
        type_text(&mut manager, "first");
        manager.handle_key(key(KeyCode::Enter));
        type_text(&mut manager, "second");
        manager.handle_key(key(KeyCode::Enter));

        assert_eq!(manager.composer().content(), "second");
        assert_eq!(manager.session().active().messages.len(), 1);

        wait_for_reply(&mut manager).await;
        assert_eq!(manager.session().active().messages.len(), 2);
        // Only the first message ever reached the proxy
        server.verify().await;
    }

    #[tokio::test]
    async fn test_failed_send_sets_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(500)
                    .set_body_json(json!({ "error": "Failed to process the chat request" })),
            )
            .mount(&server)
            .await;

        let mut manager = manager_for(&server.uri());
        assert!(manager.send("hi"));
        wait_for_reply(&mut manager).await;

        assert_eq!(manager.session().active().messages.len(), 1);
        assert!(manager.session().last_error().unwrap().contains("500"));
    }

    #[tokio::test]
    async fn test_sample_prompt_only_from_welcome_screen() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "message": { "content": "AI is..." } })))
            .mount(&server)
            .await;

        let mut manager = manager_for(&server.uri());
        manager.handle_key(ctrl('e'));
        assert_eq!(manager.session().active().messages[0].content, SAMPLE_PROMPT);

        wait_for_reply(&mut manager).await;
        assert!(!manager.send_sample_prompt());
    }

    #[test]
    fn test_blank_enter_does_nothing() {
        let mut manager = manager_for("http://127.0.0.1:9");
        type_text(&mut manager, "  ");
        manager.handle_key(key(KeyCode::Enter));

        assert!(!manager.session().is_awaiting_reply());
        assert!(manager.session().active().messages.is_empty());
    }

    #[test]
    fn test_ctrl_n_and_slash_commands() {
        let mut manager = manager_for("http://127.0.0.1:9");
        manager.handle_key(ctrl('n'));
        assert_eq!(manager.session().conversations().len(), 2);
        assert_eq!(manager.session().active().name, "Conversation 2");

        type_text(&mut manager, "/delete");
        manager.handle_key(key(KeyCode::Enter));
        assert_eq!(manager.session().conversations().len(), 1);

        type_text(&mut manager, "/model mistral");
        manager.handle_key(key(KeyCode::Enter));
        assert_eq!(manager.session().active().model, "mistral");
        assert_eq!(manager.notice(), Some("Model set to Mistral"));

        type_text(&mut manager, "/quit");
        assert_eq!(manager.handle_key(key(KeyCode::Enter)), ConversationAction::Exit);
    }

    #[test]
    fn test_esc_closes_palette_before_quitting() {
        let mut manager = manager_for("http://127.0.0.1:9");
        type_text(&mut manager, "/");
        assert_eq!(manager.handle_key(key(KeyCode::Esc)), ConversationAction::None);
        assert_eq!(manager.handle_key(key(KeyCode::Esc)), ConversationAction::Exit);
        assert_eq!(manager.handle_key(ctrl('c')), ConversationAction::Exit);
    }

    #[test]
    fn test_ctrl_l_cycles_models() {
        let mut manager = manager_for("http://127.0.0.1:9");
        let first = manager.session().active().model.clone();
        manager.handle_key(ctrl('l'));
        assert_ne!(manager.session().active().model, first);
        assert_eq!(manager.session().last_chosen_model(), manager.session().active().model);
    }

    #[test]
    fn test_sidebar_navigation() {
        let mut manager = manager_for("http://127.0.0.1:9");
        let first = manager.session().active_id();
        manager.handle_key(ctrl('n'));

        manager.handle_key(key(KeyCode::Tab));
        assert_eq!(manager.focus(), Focus::Sidebar);

        manager.handle_key(key(KeyCode::Down));
        manager.handle_key(key(KeyCode::Enter));
        assert_eq!(manager.session().active_id(), first);
        assert_eq!(manager.focus(), Focus::Composer);
    }

    #[test]
    fn test_help_popup_closes_on_any_key() {
        let mut manager = manager_for("http://127.0.0.1:9");
        type_text(&mut manager, "/help");
        manager.handle_key(key(KeyCode::Enter));
        assert!(manager.is_help_visible());

        manager.handle_key(key(KeyCode::Char('x')));
        assert!(!manager.is_help_visible());
        assert!(manager.composer().content().is_empty());
    }

    #[test]
    fn test_render_draws_welcome_and_sidebar() {
        let mut manager = manager_for("http://127.0.0.1:9");
        let mut terminal = Terminal::new(TestBackend::new(100, 30)).unwrap();
        terminal.draw(|frame| manager.render(frame)).unwrap();

        let buffer = terminal.backend().buffer().clone();
        let screen: String = buffer
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect();
        assert!(screen.contains("Welcome to Ullama"));
        assert!(screen.contains("Conversations"));
        assert!(screen.contains("New Conversation"));
    }
}
