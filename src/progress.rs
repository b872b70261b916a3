//! Pipeline progress reporting.
//!
//! Reports observable progress during `kd digest` and `kd upload` so users
//! see which stage is running and how much is left. Progress is emitted on
//! **stderr** so stdout remains parseable for scripts.

use std::io::Write;

/// A single progress event.
#[derive(Clone, Debug, PartialEq)]
pub enum ProgressEvent {
    /// Reading and splitting the input file.
    Parsing { source: String },
    /// Stage 2: screening batch `n` of `total`.
    Screening { n: u64, total: u64 },
    /// Stage 3: clustering surviving messages into topics.
    Clustering { messages: u64 },
    /// Writing topic `n` of `total` into the knowledge base.
    Merging { n: u64, total: u64 },
}

impl ProgressEvent {
    fn phase(&self) -> &'static str {
        match self {
            ProgressEvent::Parsing { .. } => "parsing",
            ProgressEvent::Screening { .. } => "screening",
            ProgressEvent::Clustering { .. } => "clustering",
            ProgressEvent::Merging { .. } => "merging",
        }
    }
}

/// Reports pipeline progress. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Human-friendly progress: "screening  3 / 12 batches".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let line = match &event {
            ProgressEvent::Parsing { source } => format!("parsing  {}\n", source),
            ProgressEvent::Screening { n, total } => format!(
                "screening  {} / {} batches\n",
                format_number(*n),
                format_number(*total)
            ),
            ProgressEvent::Clustering { messages } => {
                format!("clustering  {} messages\n", format_number(*messages))
            }
            ProgressEvent::Merging { n, total } => format!(
                "merging  {} / {} topics\n",
                format_number(*n),
                format_number(*total)
            ),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl JsonProgress {
    fn to_json(event: &ProgressEvent) -> serde_json::Value {
        let mut obj = serde_json::json!({
            "event": "progress",
            "phase": event.phase(),
        });
        match event {
            ProgressEvent::Parsing { source } => obj["source"] = source.clone().into(),
            ProgressEvent::Screening { n, total } | ProgressEvent::Merging { n, total } => {
                obj["n"] = (*n).into();
                obj["total"] = (*total).into();
            }
            ProgressEvent::Clustering { messages } => obj["messages"] = (*messages).into(),
        }
        obj
    }
}

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        if let Ok(line) = serde_json::to_string(&Self::to_json(&event)) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
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
    fn test_format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn test_json_shape() {
        let v = JsonProgress::to_json(&ProgressEvent::Screening { n: 2, total: 5 });
        assert_eq!(v["phase"], "screening");
        assert_eq!(v["n"], 2);
        assert_eq!(v["total"], 5);

        let v = JsonProgress::to_json(&ProgressEvent::Parsing {
            source: "chat.txt".to_string(),
        });
        assert_eq!(v["phase"], "parsing");
        assert_eq!(v["source"], "chat.txt");
    }
}
