//! Ingest progress reporting.
//!
//! Progress is emitted on **stderr** so stdout remains parseable for
//! scripts. Workers report after every completed item; the projector
//! reports after every document written.

use std::io::Write;

/// A single progress event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Walking the source tree; totals are not known yet.
    Discovering { root: String },
    /// `n` items fully processed out of `enqueued` discovered so far.
    Processing { n: u64, enqueued: u64 },
    /// `n` of `total` documents written to the graph.
    Projecting { n: u64, total: u64 },
}

impl ProgressEvent {
    fn human_line(&self) -> String {
        match self {
            ProgressEvent::Discovering { root } => format!("scan {}  discovering...", root),
            ProgressEvent::Processing { n, enqueued } => format!(
                "processing  {} / {} files",
                format_number(*n),
                format_number(*enqueued)
            ),
            ProgressEvent::Projecting { n, total } => format!(
                "graph  {} / {} documents",
                format_number(*n),
                format_number(*total)
            ),
        }
    }

    fn to_json(&self) -> serde_json::Value {
        let (phase, mut fields) = match self {
            ProgressEvent::Discovering { root } => {
                ("discovering", serde_json::json!({ "root": root }))
            }
            ProgressEvent::Processing { n, enqueued } => {
                ("processing", serde_json::json!({ "n": n, "enqueued": enqueued }))
            }
            ProgressEvent::Projecting { n, total } => {
                ("projecting", serde_json::json!({ "n": n, "total": total }))
            }
        };
        fields["event"] = "progress".into();
        fields["phase"] = phase.into();
        fields
    }
}

/// Receives progress events. Called concurrently from worker tasks.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

fn emit(line: &str) {
    let mut stderr = std::io::stderr().lock();
    let _ = writeln!(stderr, "{}", line);
    let _ = stderr.flush();
}

/// "processing  1,234 / 5,000 files"
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        emit(&event.human_line());
    }
}

/// One JSON object per line.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        if let Ok(line) = serde_json::to_string(&event.to_json()) {
            emit(&line);
        }
    }
}

pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Decimal with thousands separators.
fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let head = digits.len() % 3;
    let mut groups: Vec<&str> = Vec::new();
    if head > 0 {
        groups.push(&digits[..head]);
    }
    let mut i = head;
    while i < digits.len() {
        groups.push(&digits[i..i + 3]);
        i += 3;
    }
    groups.join(",")
}

/// `--progress` values.
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// `Human` on an interactive stderr, `Off` when piped or redirected.
    pub fn default_for_tty() -> Self {
        match atty::is(atty::Stream::Stderr) {
            true => ProgressMode::Human,
            false => ProgressMode::Off,
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_get_separators() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(12_345), "12,345");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn json_events_carry_phase_and_counts() {
        let v = ProgressEvent::Processing { n: 3, enqueued: 10 }.to_json();
        assert_eq!(v["event"], "progress");
        assert_eq!(v["phase"], "processing");
        assert_eq!(v["n"], 3);
        assert_eq!(v["enqueued"], 10);

        let v = ProgressEvent::Discovering { root: "/km".into() }.to_json();
        assert_eq!(v["phase"], "discovering");
        assert_eq!(v["root"], "/km");
    }

    #[test]
    fn human_lines() {
        let line = ProgressEvent::Projecting { n: 1200, total: 5000 }.human_line();
        assert_eq!(line, "graph  1,200 / 5,000 documents");
    }
}
