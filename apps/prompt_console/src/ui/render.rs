use std::io::{self, Write};

use shared::{
    domain::{Availability, Capability},
    protocol::WorkerMessage,
};
use worker_core::HostError;

use crate::controller::{events::UiError, reducer::ViewState};

const PROGRESS_BAR_WIDTH: usize = 20;

pub fn progress_bar(percent: u8, width: usize) -> String {
    let filled = (usize::from(percent.min(100)) * width + 50) / 100;
    format!("[{}{}]", "#".repeat(filled), ".".repeat(width - filled))
}

pub struct ConsoleRenderer<W> {
    out: W,
    /// `> ` was written and no input line has ended it yet.
    prompt_pending: bool,
}

impl<W: Write> ConsoleRenderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            prompt_pending: false,
        }
    }

    /// The user finished a line, so the cursor is already at a line start.
    pub fn input_received(&mut self) {
        self.prompt_pending = false;
    }

    fn start_line(&mut self) -> io::Result<()> {
        if self.prompt_pending {
            self.prompt_pending = false;
            writeln!(self.out)?;
        }
        Ok(())
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn render_transition(
        &mut self,
        previous: &ViewState,
        current: &ViewState,
        message: &WorkerMessage,
    ) -> io::Result<()> {
        if current.status != previous.status {
            self.start_line()?;
            if current.progress_visible {
                writeln!(
                    self.out,
                    "status: {} {}",
                    current.status,
                    progress_bar(current.progress_percent, PROGRESS_BAR_WIDTH)
                )?;
            } else {
                writeln!(self.out, "status: {}", current.status)?;
            }
        }

        if let (WorkerMessage::ResponseReady(_), Some(text)) = (message, &current.output) {
            self.start_line()?;
            writeln!(self.out, "{text}")?;
        }
        if let Some(notice) = UiError::for_worker_message(message) {
            self.notice(&notice)?;
        }
        if current.trigger_enabled && !previous.trigger_enabled && !self.prompt_pending {
            write!(self.out, "> ")?;
            self.prompt_pending = true;
        }
        self.out.flush()
    }

    pub fn notice(&mut self, error: &UiError) -> io::Result<()> {
        self.start_line()?;
        writeln!(self.out, "! {}", error.message())?;
        self.out.flush()
    }

    pub fn render_token_count(&mut self, tokens: u64) -> io::Result<()> {
        self.start_line()?;
        writeln!(self.out, "tokens: {tokens}")?;
        self.out.flush()
    }

    pub fn render_probe(
        &mut self,
        results: &[(Capability, Result<Availability, HostError>)],
    ) -> io::Result<()> {
        for (capability, outcome) in results {
            match outcome {
                Ok(availability) => writeln!(self.out, "{capability:<18} {availability}")?,
                Err(err) => writeln!(self.out, "{capability:<18} error: {err}")?,
            }
        }
        self.out.flush()
    }
}
