//! Console rendering.
//!
//! Server lines are printed as they arrive, colored by the sender id found
//! after the second `#`. The welcome line (id 0) carries this client's own
//! id. Terminator frames are not printed, and a line whose id the cursor has
//! already passed is a repeat from an overlapping sync and is dropped.

use std::{
    io::{self, Write},
    sync::atomic::{AtomicU32, Ordering},
};

use crossterm::{
    queue,
    style::{Attribute, Color, Print, ResetColor, SetAttribute, SetForegroundColor},
};
use sixchan_proto::{ClientId, Response, WELCOME_MESSAGE_ID};

use crate::session::SyncCursor;

/// Accent for one printed line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accent {
    /// Client-side notices and server replies without a sender.
    Plain,
    /// Line about this client.
    Own(ClientId),
    /// Line about another client.
    Peer(ClientId),
}

/// Where rendered lines go.
pub trait Output: Send + Sync {
    /// Print one line.
    fn line(&self, accent: Accent, text: &str);
}

/// Colors cycled through by sender id.
const PALETTE: [Color; 6] = [
    Color::Cyan,
    Color::Green,
    Color::Yellow,
    Color::Magenta,
    Color::Blue,
    Color::Red,
];

/// Standard output, optionally colored.
#[derive(Debug, Clone, Copy)]
pub struct Console {
    color: bool,
}

impl Console {
    /// Console writer; `color` enables accents.
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    fn write(&self, accent: Accent, text: &str) -> io::Result<()> {
        let mut out = io::stdout().lock();
        match (self.color, accent) {
            (false, _) | (true, Accent::Plain) => queue!(out, Print(text), Print("\r\n"))?,
            (true, Accent::Own(id)) => queue!(
                out,
                SetForegroundColor(accent_color(id)),
                SetAttribute(Attribute::Bold),
                Print(text),
                SetAttribute(Attribute::Reset),
                ResetColor,
                Print("\r\n")
            )?,
            (true, Accent::Peer(id)) => queue!(
                out,
                SetForegroundColor(accent_color(id)),
                Print(text),
                ResetColor,
                Print("\r\n")
            )?,
        }
        out.flush()
    }
}

impl Output for Console {
    fn line(&self, accent: Accent, text: &str) {
        if let Err(e) = self.write(accent, text) {
            tracing::debug!("console write failed: {}", e);
        }
    }
}

fn accent_color(id: ClientId) -> Color {
    PALETTE[id as usize % PALETTE.len()]
}

/// Turns response frames into console lines.
pub struct Renderer {
    output: Box<dyn Output>,
    own_id: AtomicU32,
}

impl Renderer {
    /// Renderer printing to `output`.
    pub fn new(output: impl Output + 'static) -> Self {
        Self { output: Box::new(output), own_id: AtomicU32::new(0) }
    }

    /// This client's id, once the welcome line has been seen.
    pub fn own_id(&self) -> Option<ClientId> {
        let id = self.own_id.load(Ordering::Acquire);
        (id != 0).then_some(id)
    }

    /// Render one response frame, advancing `cursor` past message lines.
    pub fn frame(&self, frame: &[u8], cursor: &SyncCursor) {
        match Response::parse(frame) {
            Response::Terminator => {},
            Response::Notice(text) => self.output.line(Accent::Plain, &text),
            Response::Message { id, sender, text } => {
                if !cursor.advance(id) {
                    tracing::trace!(message_id = id, "dropping repeated line");
                    return;
                }
                if id == WELCOME_MESSAGE_ID {
                    if let Some(own) = sender {
                        self.own_id.store(own, Ordering::Release);
                    }
                    self.output.line(Accent::Plain, &text);
                    return;
                }
                self.output.line(self.accent(sender), &text);
            },
        }
    }

    /// Print a client-side notice.
    pub fn notice(&self, text: &str) {
        self.output.line(Accent::Plain, text);
    }

    fn accent(&self, sender: Option<ClientId>) -> Accent {
        match sender {
            None => Accent::Plain,
            Some(id) if Some(id) == self.own_id() => Accent::Own(id),
            Some(id) => Accent::Peer(id),
        }
    }
}
