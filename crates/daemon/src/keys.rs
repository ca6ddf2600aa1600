//! Keyboard event source
//!
//! Polls terminal key events with crossterm in a background task and hands
//! printable characters to the event loop. Only key-down (`Press`) events are
//! meaningful; releases and repeats never reach the passphrase matcher.
//!
//! Raw mode is enabled while the reader lives so passphrase characters are
//! neither echoed nor line-buffered, and restored on drop.

use crossterm::event::{self, Event as CrosstermEvent, KeyCode, KeyEventKind};
use crossterm::terminal;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// Background key poller
pub struct KeyReader {
    rx: mpsc::UnboundedReceiver<char>,
    raw_mode: bool,
}

impl KeyReader {
    /// Create a reader and spawn the polling task
    ///
    /// Returns None when no terminal is attached (service mode under
    /// systemd); the daemon then runs without the passphrase override.
    pub fn new() -> Option<Self> {
        let raw_mode = match terminal::enable_raw_mode() {
            Ok(()) => true,
            Err(e) => {
                debug!("No terminal for key input: {}", e);
                return None;
            }
        };

        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            loop {
                if tx.is_closed() {
                    break;
                }

                // Poll with a timeout so the task notices a dropped receiver.
                if event::poll(Duration::from_millis(200)).unwrap_or(false) {
                    match event::read() {
                        Ok(CrosstermEvent::Key(key)) => {
                            if key.kind == KeyEventKind::Press
                                && let KeyCode::Char(c) = key.code
                                && tx.send(c).is_err()
                            {
                                break;
                            }
                        }
                        Ok(_) => {} // Ignore resize, mouse, focus, paste
                        Err(_) => break,
                    }
                }
            }
        });

        Some(Self { rx, raw_mode })
    }

    /// Receive the next pressed character
    ///
    /// Returns None if the polling task has stopped.
    pub async fn next(&mut self) -> Option<char> {
        self.rx.recv().await
    }
}

impl Drop for KeyReader {
    fn drop(&mut self) {
        if self.raw_mode {
            let _ = terminal::disable_raw_mode();
        }
    }
}
