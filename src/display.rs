//! Where a display puts what it receives.

use std::io::Write;

pub trait TextRenderer: Send + Sync {
    /// Shows a received text payload.
    fn render_text(&mut self, text: &str);
    /// Shows connection and typing status next to the text.
    fn render_status(&mut self, status: &str);
}

/// Prints each text payload as its own block on stdout and status lines on
/// stderr.
#[derive(Debug, Default)]
pub struct ConsoleRenderer {
    received: usize,
}

impl ConsoleRenderer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TextRenderer for ConsoleRenderer {
    fn render_text(&mut self, text: &str) {
        self.received += 1;
        let mut stdout = std::io::stdout().lock();
        let written = writeln!(stdout, "--- #{} ---\n{}", self.received, text);
        if written.and_then(|_| stdout.flush()).is_err() {
            tracing::warn!("Failed to write received text to stdout");
        }
    }

    fn render_status(&mut self, status: &str) {
        eprintln!("[{status}]");
    }
}

#[cfg(test)]
pub(crate) mod recording {
    use std::sync::{Arc, Mutex};

    use super::TextRenderer;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Rendered {
        Text(String),
        Status(String),
    }

    /// Keeps everything it is asked to render.
    #[derive(Debug, Clone, Default)]
    pub struct RecordingRenderer {
        pub rendered: Arc<Mutex<Vec<Rendered>>>,
    }

    impl RecordingRenderer {
        pub fn texts(&self) -> Vec<String> {
            self.rendered
                .lock()
                .unwrap()
                .iter()
                .filter_map(|r| match r {
                    Rendered::Text(text) => Some(text.clone()),
                    Rendered::Status(_) => None,
                })
                .collect()
        }

        pub fn statuses(&self) -> Vec<String> {
            self.rendered
                .lock()
                .unwrap()
                .iter()
                .filter_map(|r| match r {
                    Rendered::Status(status) => Some(status.clone()),
                    Rendered::Text(_) => None,
                })
                .collect()
        }
    }

    impl TextRenderer for RecordingRenderer {
        fn render_text(&mut self, text: &str) {
            self.rendered.lock().unwrap().push(Rendered::Text(text.to_owned()));
        }

        fn render_status(&mut self, status: &str) {
            self.rendered.lock().unwrap().push(Rendered::Status(status.to_owned()));
        }
    }
}
