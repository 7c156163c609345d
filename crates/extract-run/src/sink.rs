//! Row sink contract (spec §4.15): the run manager streams rendered cells to
//! whatever the caller plugs in — a CSV writer over stdout/a file, in the
//! CLI's case. Kept as a trait so tests can capture rows in memory.

use thiserror::Error;

use extract_core::Settings;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink write failed: {0}")]
    Write(String),
}

/// Output formatting knobs, threaded through per-row rather than bound into
/// the sink itself, since [`extract_core::Settings`] carries them per-run.
#[derive(Debug, Clone)]
pub struct RowFormat {
    pub delimiter: u8,
    pub enclosure: u8,
    pub escape: u8,
    pub strip_characters: String,
}

impl RowFormat {
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            delimiter: settings.delimiter.as_bytes().first().copied().unwrap_or(b','),
            enclosure: settings.enclosure.as_bytes().first().copied().unwrap_or(b'"'),
            escape: settings.escape.as_bytes().first().copied().unwrap_or(b'"'),
            strip_characters: settings.strip_characters.clone(),
        }
    }

    /// Removes every character in `strip_characters` from `cell`. The `csv`
    /// crate has no notion of stripped characters, so sinks apply this
    /// themselves before handing cells to the writer.
    #[must_use]
    pub fn strip(&self, cell: &str) -> String {
        if self.strip_characters.is_empty() {
            return cell.to_string();
        }
        cell.chars().filter(|c| !self.strip_characters.contains(*c)).collect()
    }
}

/// A destination for rendered output rows (header row included).
pub trait RowSink {
    /// # Errors
    ///
    /// Returns [`SinkError`] if the underlying writer fails.
    fn write_row(&mut self, cells: &[String], opts: &RowFormat) -> Result<(), SinkError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn from_settings_reads_first_byte_of_each_knob() {
        let mut opts = HashMap::new();
        opts.insert("shop_name".to_string(), "acme".to_string());
        opts.insert("oauth_token".to_string(), "tok".to_string());
        opts.insert("delimiter".to_string(), ";".to_string());
        let settings = Settings::parse(&opts, "1").unwrap();
        let format = RowFormat::from_settings(&settings);
        assert_eq!(format.delimiter, b';');
        assert_eq!(format.enclosure, b'"');
    }

    #[test]
    fn strip_removes_configured_characters() {
        let mut opts = HashMap::new();
        opts.insert("shop_name".to_string(), "acme".to_string());
        opts.insert("oauth_token".to_string(), "tok".to_string());
        opts.insert("strip_characters".to_string(), "\r\n".to_string());
        let settings = Settings::parse(&opts, "1").unwrap();
        let format = RowFormat::from_settings(&settings);
        assert_eq!(format.strip("a\r\nb"), "ab");
        assert_eq!(format.strip("plain"), "plain");
    }
}
