//! Colored terminal output for startup and errors.

use std::fmt::Display;

use console::{Style, Term};

/// Terminal output formatter writing to stderr.
pub(crate) struct Output {
    term: Term,
    label: Style,
    url: Style,
    red: Style,
}

impl Output {
    pub(crate) fn new() -> Self {
        Self {
            term: Term::stderr(),
            label: Style::new().dim(),
            url: Style::new().cyan().bold(),
            red: Style::new().red(),
        }
    }

    /// Print a `label: value` startup line.
    pub(crate) fn field(&self, label: &str, value: impl Display) {
        let _ = self
            .term
            .write_line(&format!("{} {value}", self.label.apply_to(format!("{label}:"))));
    }

    /// Print a `label: url` line with the URL highlighted.
    pub(crate) fn url(&self, label: &str, url: &str) {
        let _ = self.term.write_line(&format!(
            "{} {}",
            self.label.apply_to(format!("{label}:")),
            self.url.apply_to(url)
        ));
    }

    /// Print an error message (red).
    pub(crate) fn error(&self, msg: &str) {
        let _ = self.term.write_line(&self.red.apply_to(msg).to_string());
    }
}
