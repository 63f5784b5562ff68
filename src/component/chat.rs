use crossterm::event::{Event, KeyCode, KeyModifiers, MouseEvent, MouseEventKind};
use ratatui::style::{Color, Style, Stylize};
use ratatui::{
    layout::{Constraint, Layout, Rect},
    text::{Line, Text},
    widgets::{Block, Paragraph},
    Frame,
};
use tui_textarea::TextArea;

use crate::session::{Role, Session};

pub struct MessagesComponent {
    cursor: (u16, u16),
    lock_on_bottom: bool,
}

impl MessagesComponent {
    pub fn new() -> Self {
        Self {
            cursor: (0, 0),
            lock_on_bottom: true,
        }
    }

    pub fn render(&mut self, session: &Session, frame: &mut Frame, area: Rect) {
        let max_len = (area.width.max(4) - 2) as usize;

        let mut text = Text::default();
        for message in session.messages() {
            let style = match message.role {
                Role::Assistant => Style::new().bg(Color::Cyan),
                Role::User => Style::new().bg(Color::Yellow),
            };
            text.extend([Line::styled(
                format!("{}:", message.role.to_string().to_uppercase()),
                style,
            )]);
            if message.image.is_some() {
                text.extend([Line::styled("[photo attached]", style.italic())]);
            }
            push_wrapped(&mut text, &message.text, style, max_len);
            for citation in &message.citations {
                text.extend([Line::styled(
                    format!("  [{}] {}", citation.title(), citation.uri()),
                    Style::new().fg(Color::DarkGray),
                )]);
            }
        }
        if session.is_awaiting() {
            text.extend([Line::styled(
                "Processing...",
                Style::new().fg(Color::DarkGray).italic(),
            )]);
        }

        let line_n = text.lines.len();
        let max_line = (area.height.max(4) - 3) as usize;
        if line_n > max_line {
            let max_cursor = line_n - max_line;
            if self.cursor.0 >= max_cursor as u16 {
                self.lock_on_bottom = true;
            }
            if self.lock_on_bottom {
                self.cursor.0 = max_cursor as u16;
            }
        } else {
            self.cursor.0 = 0;
        }

        let paragraph = Paragraph::new(text)
            .block(Block::bordered().title("Chat").gray())
            .scroll(self.cursor);
        frame.render_widget(paragraph, area);
    }

    pub fn scroll_to_bottom(&mut self) {
        self.lock_on_bottom = true;
    }

    pub fn handle_mouse(&mut self, event: MouseEvent) {
        match event.kind {
            MouseEventKind::ScrollDown => {
                if event.modifiers.contains(KeyModifiers::CONTROL) {
                    self.cursor.1 += 6;
                } else {
                    self.cursor.0 += 3;
                }
            }
            MouseEventKind::ScrollUp => {
                if event.modifiers.contains(KeyModifiers::CONTROL) {
                    self.cursor.1 = self.cursor.1.max(6) - 6;
                } else {
                    self.cursor.0 = self.cursor.0.max(3) - 3;
                    self.lock_on_bottom = false;
                }
            }
            _ => {}
        }
    }
}

fn push_wrapped(text: &mut Text<'_>, message: &str, style: Style, max_len: usize) {
    let mut s = String::with_capacity(max_len);
    let mut len = 0;
    for c in message.chars() {
        if c != '\n' {
            s.push(c);
            len += if c.is_ascii() { 1 } else { 2 };
        }
        if len >= max_len || c == '\n' {
            text.extend([Line::styled(std::mem::take(&mut s), style)]);
            len = 0;
        }
    }
    text.extend([Line::styled(s, style)]);
}

#[derive(Debug)]
pub enum Output {
    Submit(String),
    Locate,
    SwitchTab,
    Exit,
    Normal,
}

pub struct ChatComponent {
    pub messages: MessagesComponent,
    input: TextArea<'static>,
    exit_n: u8,
}

impl ChatComponent {
    pub fn new() -> Self {
        Self {
            messages: MessagesComponent::new(),
            input: TextArea::default(),
            exit_n: 0,
        }
    }

    pub fn render(&mut self, session: &Session, frame: &mut Frame, area: Rect) {
        let vertical = Layout::vertical([Constraint::Min(5), Constraint::Max(8)]);
        let [messages_area, input_area] = vertical.areas(area);

        self.messages.render(session, frame, messages_area);

        let title = if session.pending_image().is_some() {
            "Input (photo attached)"
        } else {
            "Input"
        };
        self.input.set_block(Block::bordered().title(title).gray());
        frame.render_widget(self.input.widget(), input_area);
    }

    fn input_text(&self) -> String {
        self.input.lines().join("\n")
    }

    /// Cleared by the app only once a submission is accepted, so a rejected
    /// turn keeps the typed text.
    pub fn clear_input(&mut self) {
        self.input = TextArea::default();
        self.messages.scroll_to_bottom();
    }

    pub fn handler_input(&mut self, event: Event) -> Output {
        let output = match event {
            Event::Key(key)
                if key.code == KeyCode::Char('j')
                    && key.modifiers.contains(KeyModifiers::CONTROL) =>
            {
                Output::Submit(self.input_text())
            }
            Event::Key(key)
                if key.code == KeyCode::Char('l')
                    && key.modifiers.contains(KeyModifiers::CONTROL) =>
            {
                Output::Locate
            }
            Event::Key(key)
                if key.code == KeyCode::Char('t')
                    && key.modifiers.contains(KeyModifiers::CONTROL) =>
            {
                Output::SwitchTab
            }
            Event::Key(key) if key.code == KeyCode::Esc => {
                self.exit_n += 2;
                if self.exit_n >= 3 {
                    return Output::Exit;
                }
                Output::Normal
            }
            Event::Key(key) => {
                self.input.input(key);
                Output::Normal
            }
            Event::Mouse(mouse) => {
                self.messages.handle_mouse(mouse);
                Output::Normal
            }
            _ => Output::Normal,
        };

        self.exit_n = self.exit_n.max(1) - 1;
        output
    }
}
