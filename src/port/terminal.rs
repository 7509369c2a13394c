//! Host keyboard feed for mock mode
//!
//! Puts the terminal into raw mode and forwards key presses and releases to
//! the mock source. Release events need the kitty keyboard protocol; on
//! terminals without it a pressed key is never released.

use crate::mock::KeyboardHandle;
use crossterm::event::{
    self, Event, KeyCode, KeyEvent as TermKeyEvent, KeyEventKind, KeyModifiers,
    KeyboardEnhancementFlags, ModifierKeyCode, PopKeyboardEnhancementFlags,
    PushKeyboardEnhancementFlags,
};
use crossterm::{execute, terminal};
use std::io::{self, Write};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Log writer for a terminal in raw mode, where `\n` no longer returns the cursor
#[derive(Debug)]
pub struct CrlfWriter<W: Write> {
    inner: W,
}

impl<W: Write> CrlfWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for CrlfWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut start = 0;
        for (i, &byte) in buf.iter().enumerate() {
            if byte == b'\n' && (i == 0 || buf[i - 1] != b'\r') {
                self.inner.write_all(&buf[start..i])?;
                self.inner.write_all(b"\r\n")?;
                start = i + 1;
            }
        }
        self.inner.write_all(&buf[start..])?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Key name for a terminal key code, using DOM `KeyboardEvent.key` names
pub fn key_name(code: KeyCode) -> Option<String> {
    let name = match code {
        KeyCode::Char(c) => return Some(c.to_string()),
        KeyCode::F(n) => return Some(format!("F{n}")),
        KeyCode::Enter => "Enter",
        KeyCode::Tab => "Tab",
        KeyCode::Backspace => "Backspace",
        KeyCode::Esc => "Escape",
        KeyCode::Home => "Home",
        KeyCode::End => "End",
        KeyCode::Left => "ArrowLeft",
        KeyCode::Right => "ArrowRight",
        KeyCode::Up => "ArrowUp",
        KeyCode::Down => "ArrowDown",
        KeyCode::Modifier(ModifierKeyCode::LeftControl | ModifierKeyCode::RightControl) => {
            "Control"
        }
        KeyCode::Modifier(ModifierKeyCode::LeftAlt | ModifierKeyCode::RightAlt) => "Alt",
        KeyCode::Modifier(ModifierKeyCode::LeftShift | ModifierKeyCode::RightShift) => "Shift",
        _ => return None,
    };
    Some(name.to_string())
}

fn is_quit(key: &TermKeyEvent) -> bool {
    key.kind == KeyEventKind::Press
        && (key.code == KeyCode::Esc
            || (key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL)))
}

/// Reads terminal keys on a dedicated thread until `quit` is cancelled
pub struct TerminalKeyFeed {
    quit: CancellationToken,
    enhanced: bool,
    thread: Option<JoinHandle<()>>,
}

impl TerminalKeyFeed {
    pub fn spawn(keyboard: KeyboardHandle, quit: CancellationToken) -> io::Result<Self> {
        terminal::enable_raw_mode()?;

        let enhanced = matches!(terminal::supports_keyboard_enhancement(), Ok(true));
        if enhanced {
            execute!(
                io::stderr(),
                PushKeyboardEnhancementFlags(
                    KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES
                        | KeyboardEnhancementFlags::REPORT_EVENT_TYPES
                        | KeyboardEnhancementFlags::REPORT_ALL_KEYS_AS_ESCAPE_CODES
                )
            )?;
            info!("Terminal reports key releases");
        } else {
            warn!("Terminal does not report key releases, mock keys will not let go");
        }

        let thread_quit = quit.clone();
        let thread = thread::Builder::new()
            .name("padbridge-keys".to_string())
            .spawn(move || run_key_loop(keyboard, thread_quit))?;

        Ok(Self {
            quit,
            enhanced,
            thread: Some(thread),
        })
    }

    /// Stops the key thread and restores the terminal
    pub fn shutdown(&mut self) {
        self.quit.cancel();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Key thread panicked");
            }
        }

        if self.enhanced {
            if let Err(e) = execute!(io::stderr(), PopKeyboardEnhancementFlags) {
                warn!("Failed to restore keyboard flags: {}", e);
            }
            self.enhanced = false;
        }
        if let Err(e) = terminal::disable_raw_mode() {
            warn!("Failed to leave raw mode: {}", e);
        }
    }
}

impl Drop for TerminalKeyFeed {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.shutdown();
        }
    }
}

fn run_key_loop(keyboard: KeyboardHandle, quit: CancellationToken) {
    while !quit.is_cancelled() {
        match event::poll(POLL_TIMEOUT) {
            Ok(true) => match event::read() {
                Ok(Event::Key(key)) => forward_key(&keyboard, &quit, key),
                Ok(_) => {}
                Err(e) => warn!("Failed to read terminal event: {}", e),
            },
            Ok(false) => continue,
            Err(e) => {
                error!("Terminal input failed: {}", e);
                quit.cancel();
                break;
            }
        }
    }
    debug!("Key thread exiting");
}

fn forward_key(keyboard: &KeyboardHandle, quit: &CancellationToken, key: TermKeyEvent) {
    if is_quit(&key) {
        info!("Quit requested from keyboard");
        quit.cancel();
        return;
    }

    let Some(name) = key_name(key.code) else {
        return;
    };
    match key.kind {
        KeyEventKind::Press => keyboard.key_down(&name),
        KeyEventKind::Release => keyboard.key_up(&name),
        KeyEventKind::Repeat => {}
    }
}
