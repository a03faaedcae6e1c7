//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use notesync_core::sync::CollectionReport;
use notesync_core::{PassReport, SyncEvent};
use serde_json::json;

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Check if output is in quiet mode
    pub fn is_quiet(&self) -> bool {
        matches!(self.format, OutputFormat::Quiet)
    }

    pub fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    /// Print the outcome of a sync pass
    pub fn print_report(&self, report: &PassReport) {
        match self.format {
            OutputFormat::Human => {
                for collection in &report.collections {
                    println!("{}", collection_line(collection));
                }
                let failures = report.failures();
                if failures.is_empty() {
                    println!("✓ Sync complete");
                } else {
                    println!();
                    println!("Failed to push (retried next pass):");
                    for (collection, id) in failures {
                        println!("  {}/{}", collection, id);
                    }
                }
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(report).unwrap_or_default()
                );
            }
            OutputFormat::Quiet => {
                println!("{} {}", report.pulled(), report.pushed());
            }
        }
    }

    /// Print one engine event
    pub fn print_event(&self, event: &SyncEvent) {
        match self.format {
            OutputFormat::Human => {
                let now = chrono::Local::now().format("%H:%M:%S");
                println!("[{}] {}", now, describe_event(event));
            }
            OutputFormat::Json => println!("{}", event_json(event)),
            OutputFormat::Quiet => {
                if let SyncEvent::Error(detail) = event {
                    eprintln!("{}", detail.message);
                }
            }
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!("{}", json!({"status": "success", "message": message}));
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

fn collection_line(report: &CollectionReport) -> String {
    let mut line = format!(
        "{:<10} pulled {:>3}, pushed {:>3}",
        report.collection, report.pulled, report.pushed
    );
    if !report.failed.is_empty() {
        line.push_str(&format!(", failed {}", report.failed.len()));
    }
    line
}

fn describe_event(event: &SyncEvent) -> String {
    match event {
        SyncEvent::Authenticated => "Authenticated".to_string(),
        SyncEvent::Started => "Sync started".to_string(),
        SyncEvent::Completed(report) => format!(
            "Sync finished: {} pulled, {} pushed",
            report.pulled(),
            report.pushed()
        ),
        SyncEvent::Stopped => "Sync stopped".to_string(),
        SyncEvent::Error(detail) => format!("⚠ {}", detail.message),
        SyncEvent::RecordPushed { collection, id } => format!("Pushed {}/{}", collection, id),
    }
}

fn event_json(event: &SyncEvent) -> serde_json::Value {
    match event {
        SyncEvent::Authenticated => json!({"event": "authenticated"}),
        SyncEvent::Started => json!({"event": "started"}),
        SyncEvent::Completed(report) => json!({"event": "completed", "report": report}),
        SyncEvent::Stopped => json!({"event": "stopped"}),
        SyncEvent::Error(detail) => {
            json!({"event": "error", "kind": detail.kind, "message": detail.message})
        }
        SyncEvent::RecordPushed { collection, id } => {
            json!({"event": "record_pushed", "collection": collection, "id": id})
        }
    }
}
