//! User-facing output of a scan
//!
//! The [`Reporter`] receives one event per file from any number of worker
//! threads and writes each event as a whole while holding a lock, so lines
//! from different files never interleave.
//!
//! ## Text format
//!
//! ```text
//! <new> /data/a.jpg
//! <ok> /data/b.jpg
//! <outdated> /data/c.jpg
//!  stored: 9f86d0...  1600000000.000000000
//!  actual: 60303a...  1600000010.000000000
//! <corrupt> /data/d.jpg
//!  stored: 559aea...  1600000000.123456789
//!  actual: df7e70...  1600000000.123456789
//! <error> File not found: "/data/e.jpg"
//! ```
//!
//! With `quiet`, only `<corrupt>` entries and errors are printed.
//!
//! ## JSON format
//!
//! One JSON object per line, with an `"event"` field of `"file"`, `"error"`
//! or `"summary"`.

use crate::error::{ErrorKind, RotcheckError};
use crate::types::{Classification, FileOutcome, FileRecord, ScanSummary};
use colored::Colorize;
use indicatif::ProgressBar;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::fmt::Write as _;
use std::io::{self, Write};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Output format of a [`Reporter`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Serialized event sink shared by all workers
pub struct Reporter {
    sink: Mutex<Box<dyn Write + Send>>,
    format: ReportFormat,
    quiet: bool,
    color: bool,
    progress: Option<ProgressBar>,
}

impl std::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter")
            .field("format", &self.format)
            .field("quiet", &self.quiet)
            .field("color", &self.color)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

#[derive(Serialize)]
struct FileEvent<'a> {
    event: &'static str,
    path: &'a Path,
    classification: Classification,
    #[serde(skip_serializing_if = "Option::is_none")]
    stored: Option<FileRecord>,
    actual: FileRecord,
    written: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    write_error: Option<String>,
}

#[derive(Serialize)]
struct ErrorEvent<'a> {
    event: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<&'a Path>,
    kind: ErrorKind,
    message: String,
}

impl Reporter {
    /// Reporter writing to standard output
    pub fn stdout(format: ReportFormat) -> Self {
        Self::new(Box::new(io::stdout()), format)
    }

    /// Reporter writing to an arbitrary sink
    pub fn new(sink: Box<dyn Write + Send>, format: ReportFormat) -> Self {
        Self {
            sink: Mutex::new(sink),
            format,
            quiet: false,
            color: true,
            progress: None,
        }
    }

    /// Only report corrupt files and errors
    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Enable or disable ANSI colors in text output
    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    /// Tick `progress` once per event, suspending it while writing
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Report a classified file
    pub fn file(&self, outcome: &FileOutcome) {
        let text = match self.format {
            ReportFormat::Text => self.render_file(outcome),
            ReportFormat::Json => {
                let event = FileEvent {
                    event: "file",
                    path: &outcome.path,
                    classification: outcome.classification,
                    stored: outcome.stored,
                    actual: outcome.actual,
                    written: outcome.written,
                    write_error: outcome.write_error.as_ref().map(|e| e.to_string()),
                };
                Some(to_json_line(&event))
            }
        };
        self.emit(text);
    }

    /// Report a file that could not be classified
    pub fn error(&self, err: &RotcheckError) {
        let text = match self.format {
            ReportFormat::Text => Some(format!("{} {}\n", self.error_tag(err), err.user_message())),
            ReportFormat::Json => {
                let event = ErrorEvent {
                    event: "error",
                    path: err.path(),
                    kind: err.kind(),
                    message: err.to_string(),
                };
                Some(to_json_line(&event))
            }
        };
        self.emit(text);
    }

    /// Report end-of-run totals
    pub fn summary(&self, summary: &ScanSummary, elapsed: Duration) {
        if let Some(progress) = &self.progress {
            progress.finish_and_clear();
        }
        let text = match self.format {
            ReportFormat::Text => self.render_summary(summary, elapsed),
            ReportFormat::Json => {
                let mut classifications = Map::new();
                for c in Classification::ALL {
                    classifications.insert(c.label().to_string(), json!(summary.count(c)));
                }
                let mut errors = Map::new();
                for kind in ErrorKind::ALL {
                    let count = summary.error_count(kind);
                    if count > 0 {
                        errors.insert(
                            serde_json::to_value(kind)
                                .ok()
                                .and_then(|v| v.as_str().map(str::to_string))
                                .unwrap_or_else(|| kind.label().to_string()),
                            json!(count),
                        );
                    }
                }
                let event = json!({
                    "event": "summary",
                    "files_checked": summary.files_checked(),
                    "classifications": Value::Object(classifications),
                    "errors": Value::Object(errors),
                    "corrupt_files": summary.corrupt_files,
                    "records_written": summary.records_written,
                    "bytes_hashed": summary.bytes_hashed,
                    "elapsed_ms": elapsed.as_millis() as u64,
                });
                Some(to_json_line(&event))
            }
        };
        if let Some(text) = text {
            self.write_raw(&text);
        }
    }

    fn emit(&self, text: Option<String>) {
        if let Some(progress) = &self.progress {
            progress.inc(1);
        }
        if let Some(text) = text {
            self.write_raw(&text);
        }
    }

    fn write_raw(&self, text: &str) {
        let mut guard = self.sink.lock();
        let sink: &mut (dyn Write + Send) = &mut **guard;
        let mut write = || sink.write_all(text.as_bytes()).and_then(|_| sink.flush());
        let result = match &self.progress {
            Some(progress) => progress.suspend(write),
            None => write(),
        };
        if let Err(e) = result {
            debug!("Failed to write report output: {}", e);
        }
    }

    fn render_file(&self, outcome: &FileOutcome) -> Option<String> {
        let c = outcome.classification;
        if self.quiet && c != Classification::Corrupt && outcome.write_error.is_none() {
            return None;
        }

        let mut out = format!("{} {}\n", self.classification_tag(c), outcome.path.display());
        if matches!(c, Classification::Updated | Classification::Corrupt) {
            if let Some(stored) = outcome.stored {
                let _ = writeln!(out, " stored: {}  {}", stored.digest, stored.timestamp);
            }
            let _ = writeln!(
                out,
                " actual: {}  {}",
                outcome.actual.digest, outcome.actual.timestamp
            );
        }
        if let Some(err) = &outcome.write_error {
            let _ = writeln!(
                out,
                "{} could not write record: {}",
                self.error_tag(err),
                err.user_message()
            );
        }
        Some(out)
    }

    fn render_summary(&self, summary: &ScanSummary, elapsed: Duration) -> Option<String> {
        let mut out = String::new();
        let corrupt = summary.count(Classification::Corrupt);

        if corrupt > 0 {
            let header = format!("{} corrupt file(s):", corrupt);
            let _ = writeln!(out, "\n{}", self.paint(&header, |s| s.red().bold().to_string()));
            for path in &summary.corrupt_files {
                let _ = writeln!(out, "  {}", path.display());
            }
        }

        let elapsed = Duration::from_millis(elapsed.as_millis() as u64);
        let _ = writeln!(
            out,
            "\n{} {} files checked in {}, {} hashed, {} records written",
            self.paint("Summary:", |s| s.bold().to_string()),
            summary.files_checked(),
            humantime::format_duration(elapsed),
            crate::utils::format_bytes(summary.bytes_hashed),
            summary.records_written
        );
        let counts: Vec<String> = Classification::ALL
            .iter()
            .map(|c| format!("{}: {}", c.label(), summary.count(*c)))
            .collect();
        let _ = writeln!(out, "  {}", counts.join("  "));

        if summary.total_errors() > 0 {
            let errors: Vec<String> = ErrorKind::ALL
                .iter()
                .filter(|k| summary.error_count(**k) > 0)
                .map(|k| format!("{}: {}", k.label(), summary.error_count(*k)))
                .collect();
            let _ = writeln!(out, "  errors: {}", errors.join("  "));
        }
        Some(out)
    }

    fn classification_tag(&self, c: Classification) -> String {
        let tag = format!("<{}>", c.label());
        match c {
            Classification::Untagged => self.paint(&tag, |s| s.cyan().to_string()),
            Classification::Unchanged => self.paint(&tag, |s| s.green().to_string()),
            Classification::Updated => self.paint(&tag, |s| s.yellow().to_string()),
            Classification::Corrupt => self.paint(&tag, |s| s.red().bold().to_string()),
        }
    }

    fn error_tag(&self, err: &RotcheckError) -> String {
        if err.is_exclusion() {
            self.paint("<excluded>", |s| s.dimmed().to_string())
        } else {
            self.paint("<error>", |s| s.red().to_string())
        }
    }

    fn paint(&self, text: &str, style: impl Fn(&str) -> String) -> String {
        if self.color {
            style(text)
        } else {
            text.to_string()
        }
    }
}

fn to_json_line<T: Serialize>(value: &T) -> String {
    match serde_json::to_string(value) {
        Ok(mut line) => {
            line.push('\n');
            line
        }
        Err(e) => format!("{{\"event\":\"error\",\"message\":{:?}}}\n", e.to_string()),
    }
}
