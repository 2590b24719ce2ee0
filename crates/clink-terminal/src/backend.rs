//! Raw-mode / alternate-screen lifecycle for the host console.

use anyhow::Result;
use crossterm::{
    cursor::{Hide, Show},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, SetTitle, disable_raw_mode, enable_raw_mode},
};
use std::io::stdout;

pub trait TerminalBackend {
    fn enter(&mut self) -> Result<()>;
    fn leave(&mut self) -> Result<()>;
    fn set_title(&mut self, title: &str) -> Result<()>;
}

pub struct CrosstermBackend {
    entered: bool,
}

impl Default for CrosstermBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CrosstermBackend {
    pub fn new() -> Self {
        Self { entered: false }
    }
}

impl TerminalBackend for CrosstermBackend {
    fn enter(&mut self) -> Result<()> {
        if self.entered {
            return Ok(());
        }
        enable_raw_mode()?;
        execute!(stdout(), EnterAlternateScreen, Hide)?;
        self.entered = true;
        Ok(())
    }

    fn leave(&mut self) -> Result<()> {
        if !self.entered {
            return Ok(());
        }
        execute!(stdout(), Show, LeaveAlternateScreen)?;
        disable_raw_mode()?;
        self.entered = false;
        Ok(())
    }

    fn set_title(&mut self, title: &str) -> Result<()> {
        execute!(stdout(), SetTitle(title))?;
        Ok(())
    }
}

impl Drop for CrosstermBackend {
    fn drop(&mut self) {
        let _ = self.leave();
    }
}

/// RAII guard that enters the backend on construction and leaves it on
/// drop, so an early return or panic during an edit session can't strand
/// the host console in raw mode.
pub struct TerminalGuard<'a, B: TerminalBackend> {
    backend: &'a mut B,
}

impl<'a, B: TerminalBackend> TerminalGuard<'a, B> {
    pub fn new(backend: &'a mut B) -> Result<Self> {
        backend.enter()?;
        Ok(Self { backend })
    }
}

impl<B: TerminalBackend> Drop for TerminalGuard<'_, B> {
    fn drop(&mut self) {
        let _ = self.backend.leave();
    }
}
