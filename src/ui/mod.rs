//! Terminal chat interface

pub mod conversation;
pub mod sidebar;

use crate::config::Config;
use crate::events::TuiEvent;
use crate::ui::conversation::{ConversationAction, ConversationManager};
use anyhow::Result;
use crossterm::{
    event::{
        self, DisableBracketedPaste, EnableBracketedPaste, Event, KeyEventKind,
        KeyboardEnhancementFlags, PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
    },
    execute,
    terminal::{self, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io::{self, Stdout};
use std::time::Duration;

const TICK_RATE: Duration = Duration::from_millis(150);

/// Restores the terminal when dropped, including on early returns
struct TerminalGuard {
    keyboard_enhanced: bool,
}

impl TerminalGuard {
    fn enter() -> Result<Self> {
        terminal::enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableBracketedPaste)?;

        // Lets the terminal report Shift+Enter distinctly from Enter
        let keyboard_enhanced = matches!(terminal::supports_keyboard_enhancement(), Ok(true));
        if keyboard_enhanced {
            execute!(
                stdout,
                PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES)
            )?;
        }
        Ok(Self { keyboard_enhanced })
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let mut stdout = io::stdout();
        if self.keyboard_enhanced {
            let _ = execute!(stdout, PopKeyboardEnhancementFlags);
        }
        let _ = execute!(stdout, DisableBracketedPaste, LeaveAlternateScreen);
        let _ = terminal::disable_raw_mode();
    }
}

/// Translate one crossterm event, or `Tick` if none arrived in time
fn next_event() -> Result<TuiEvent> {
    if !event::poll(TICK_RATE)? {
        return Ok(TuiEvent::Tick);
    }

    Ok(match event::read()? {
        Event::Key(key) if key.kind == KeyEventKind::Press => TuiEvent::Key(key),
        Event::Paste(text) => TuiEvent::Paste(text),
        Event::Resize(width, height) => TuiEvent::Resize(width, height),
        _ => TuiEvent::Tick,
    })
}

/// Run the chat UI until the user quits
pub async fn run(config: Config) -> Result<()> {
    let _guard = TerminalGuard::enter()?;
    let mut terminal: Terminal<CrosstermBackend<Stdout>> =
        Terminal::new(CrosstermBackend::new(io::stdout()))?;
    terminal.clear()?;

    tracing::info!(proxy = %config.client.proxy_url, "Starting chat UI");
    let mut manager = ConversationManager::new(config);

    loop {
        manager.process_events();
        terminal.draw(|frame| manager.render(frame))?;

        let event = tokio::task::block_in_place(next_event)?;
        if manager.handle_event(event) == ConversationAction::Exit {
            break;
        }
    }

    terminal.show_cursor()?;
    tracing::info!("Chat UI closed");
    Ok(())
}
