//! Announcements and alerts - operator-provided notice files.
//!
//! Both files are optional. They are read at startup and re-read when the
//! process receives SIGHUP, so operators can edit notices without a
//! restart. An unreadable file logs a warning and reads as empty; only the
//! card-data file is load-bearing enough to abort startup.

use std::path::PathBuf;

use tracing::{info, warn};

#[derive(Debug, Default)]
pub struct Notices {
    announcements_path: Option<PathBuf>,
    alerts_path: Option<PathBuf>,
    announcements: String,
    alerts: String,
}

impl Notices {
    pub fn load(announcements_path: Option<PathBuf>, alerts_path: Option<PathBuf>) -> Self {
        let mut notices = Self {
            announcements_path,
            alerts_path,
            announcements: String::new(),
            alerts: String::new(),
        };
        notices.reload();
        notices
    }

    /// Current announcements text; empty when no file is configured.
    pub fn announcements(&self) -> &str {
        &self.announcements
    }

    /// Current alerts text. An empty alert means "no active alert" and is
    /// broadcast as such so clients clear anything they're showing.
    pub fn alerts(&self) -> &str {
        &self.alerts
    }

    /// Re-read both files. Returns (announcements_changed, alerts_changed).
    pub fn reload(&mut self) -> (bool, bool) {
        let announcements = read_or_empty(&self.announcements_path);
        let alerts = read_or_empty(&self.alerts_path);

        let announcements_changed = announcements != self.announcements;
        let alerts_changed = alerts != self.alerts;
        if announcements_changed {
            info!(len = announcements.len(), "announcements updated");
            self.announcements = announcements;
        }
        if alerts_changed {
            info!(len = alerts.len(), "alerts updated");
            self.alerts = alerts;
        }
        (announcements_changed, alerts_changed)
    }
}

fn read_or_empty(path: &Option<PathBuf>) -> String {
    match path {
        Some(path) => match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read notice file");
                String::new()
            }
        },
        None => String::new(),
    }
}
