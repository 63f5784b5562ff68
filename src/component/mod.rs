use std::path::Path;

use chat::Output;
use crossbeam::channel::{Receiver, Sender};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Layout},
    widgets::{Block, Paragraph, Tabs},
    Frame, Terminal,
};

use crate::gateway::{GuideReply, TurnRequest};
use crate::geo::{LocateRequest, LocateResult};
use crate::session::{ImageAttachment, LocationUpdate, Session};

pub mod chat;
pub mod map;

/// Terminals at least this wide show chat and map side by side; narrower
/// ones show only the active tab.
pub const SPLIT_BREAKPOINT: u16 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    Chat,
    Map,
}

pub fn visible_panels(width: u16, active: Tab) -> (bool, bool) {
    if width >= SPLIT_BREAKPOINT {
        (true, true)
    } else {
        (active == Tab::Chat, active == Tab::Map)
    }
}

pub struct App {
    title: String,
    session: Session,
    chat: chat::ChatComponent,
    map: map::MapComponent,
    active_tab: Tab,
    status: String,
    last_width: u16,
    turn_tx: Sender<TurnRequest>,
    reply_rx: Receiver<GuideReply>,
    geo_tx: Sender<LocateRequest>,
    geo_rx: Receiver<LocateResult>,
}

impl App {
    pub fn new(
        title: String,
        session: Session,
        turn_tx: Sender<TurnRequest>,
        reply_rx: Receiver<GuideReply>,
        geo_tx: Sender<LocateRequest>,
        geo_rx: Receiver<LocateResult>,
    ) -> Self {
        Self {
            title,
            session,
            chat: chat::ChatComponent::new(),
            map: map::MapComponent::new(),
            active_tab: Tab::Chat,
            status: String::new(),
            last_width: 0,
            turn_tx,
            reply_rx,
            geo_tx,
            geo_rx,
        }
    }

    pub fn render(&mut self, f: &mut Frame) {
        self.last_width = f.size().width;

        let vertical = Layout::vertical([
            Constraint::Length(3),
            Constraint::Min(3),
            Constraint::Length(1),
            Constraint::Length(1),
        ]);
        let [tabs_area, main_area, help_area, status_area] = vertical.areas(f.size());

        let tabs = Tabs::new(vec!["Chat", "Map"])
            .select(match self.active_tab {
                Tab::Chat => 0,
                Tab::Map => 1,
            })
            .padding("[", "]")
            .block(Block::bordered().title(self.title.clone()));
        f.render_widget(tabs, tabs_area);

        match visible_panels(main_area.width, self.active_tab) {
            (true, true) => {
                let horizontal =
                    Layout::horizontal([Constraint::Percentage(40), Constraint::Percentage(60)]);
                let [chat_area, map_area] = horizontal.areas(main_area);
                self.chat.render(&self.session, f, chat_area);
                self.map.render(&self.session, f, map_area);
            }
            (true, false) => self.chat.render(&self.session, f, main_area),
            _ => self.map.render(&self.session, f, main_area),
        }

        let help_message = Paragraph::new(
            "help: [Ctrl+J send] [Ctrl+L locate] [Ctrl+T chat/map] [/image <path> attach] [Esc+Esc quit]",
        );
        f.render_widget(help_message, help_area);
        f.render_widget(Paragraph::new(self.status.clone()), status_area);
    }

    fn handle_terminal(&mut self, event: Event) -> bool {
        match self.chat.handler_input(event) {
            Output::Submit(text) => self.handle_submit(text),
            Output::Locate => self.handle_locate(),
            Output::SwitchTab => {
                self.active_tab = match self.active_tab {
                    Tab::Chat => Tab::Map,
                    Tab::Map => Tab::Chat,
                };
            }
            Output::Exit => return false,
            Output::Normal => {}
        }
        true
    }

    fn handle_submit(&mut self, text: String) {
        if let Some(path) = text.trim().strip_prefix("/image ") {
            match ImageAttachment::from_path(Path::new(path.trim())) {
                Ok(image) => {
                    self.session.attach_image(image);
                    self.status = format!("photo attached: {}", path.trim());
                    self.chat.clear_input();
                }
                Err(err) => {
                    log::warn!("{err}");
                    self.status = err.to_string();
                }
            }
            return;
        }

        if let Some(request) = self.session.submit_turn(text) {
            self.chat.clear_input();
            self.status.clear();
            if self.turn_tx.send(request).is_err() {
                self.session.fail_turn("model worker unavailable");
                self.status = "model worker unavailable".to_string();
            }
        }
    }

    fn handle_locate(&mut self) {
        let generation = self.session.request_location();
        self.status = "locating...".to_string();
        if self.geo_tx.send(LocateRequest { generation }).is_err() {
            self.session
                .apply_location(generation, Err("location worker unavailable".to_string()));
            self.status = "location unavailable".to_string();
        }
    }

    fn handle_reply(&mut self, reply: GuideReply) {
        let prefer_map = self.session.complete_turn(reply);
        self.chat.messages.scroll_to_bottom();
        if prefer_map && self.last_width < SPLIT_BREAKPOINT {
            self.active_tab = Tab::Map;
        }
    }

    fn handle_location(&mut self, result: LocateResult) {
        let outcome = result.outcome.map_err(|e| e.to_string());
        match self.session.apply_location(result.generation, outcome) {
            LocationUpdate::Replaced(_) => {
                self.status = "GPS active".to_string();
                if self.last_width < SPLIT_BREAKPOINT {
                    self.active_tab = Tab::Map;
                }
            }
            LocationUpdate::Denied => {
                self.status = "Unable to retrieve your location".to_string();
            }
            LocationUpdate::Superseded => {}
        }
    }

    pub fn run_loop(mut self) -> anyhow::Result<()> {
        // setup terminal
        enable_raw_mode()?;
        let mut stdout = std::io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        let (event_tx, event_rx) = crossbeam::channel::unbounded();
        std::thread::spawn(move || listen_terminal_events(event_tx));

        let reply_rx = self.reply_rx.clone();
        let geo_rx = self.geo_rx.clone();

        let mut main_loop = || -> anyhow::Result<()> {
            loop {
                terminal.draw(|f| self.render(f))?;

                crossbeam::select! {
                    recv(event_rx) -> event => match event {
                        Ok(event) => {
                            if !self.handle_terminal(event) {
                                break;
                            }
                        }
                        Err(_) => break,
                    },
                    recv(reply_rx) -> reply => match reply {
                        Ok(reply) => self.handle_reply(reply),
                        Err(_) => {
                            self.session.fail_turn("model worker disconnected");
                            break;
                        }
                    },
                    recv(geo_rx) -> result => match result {
                        Ok(result) => self.handle_location(result),
                        Err(_) => {
                            log::error!("location worker disconnected");
                            break;
                        }
                    },
                }
            }
            Ok(())
        };

        let r = main_loop();

        // restore terminal
        disable_raw_mode()?;
        execute!(
            terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableMouseCapture
        )?;
        terminal.show_cursor()?;
        r
    }
}

fn listen_terminal_events(tx: Sender<Event>) {
    loop {
        match event::read() {
            Ok(event) => {
                if tx.send(event).is_err() {
                    break;
                }
            }
            Err(err) => {
                log::error!("terminal event read failed: {err}");
                break;
            }
        }
    }
}
