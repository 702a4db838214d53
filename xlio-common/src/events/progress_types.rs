//! Progress-event wire model
//!
//! Inbound notification channel messages look like:
//!
//! ```json
//! {"type": "progress", "task_id": "abc", "current": 3, "total": 10,
//!  "percent": 30, "status": "processing"}
//! ```
//!
//! The same channel also carries unrelated broadcasts (login, register,
//! preview). Only task-scoped progress and completion messages become a
//! [`ProgressEvent`]; anything without `type` or `task_id` is malformed.

use serde::{Deserialize, Serialize};

/// Kind of progress event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressKind {
    /// Fractional progress report
    Progress,
    /// Task finished successfully
    Completed,
    /// Task failed on the server
    Failed,
}

/// Row skipped by the server during a queued import
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRow {
    #[serde(default)]
    pub row: u64,
    #[serde(default)]
    pub sheet: String,
    #[serde(default)]
    pub reason: String,
}

/// Progress report for one server-side task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub kind: ProgressKind,
    pub task_id: String,
    pub current: u64,
    pub total: u64,
    /// Always within 0..=100
    pub percent: u8,
    pub error_detail: Option<String>,
    /// Rows committed (completion messages only)
    pub inserted: Option<u64>,
    /// Rows skipped (completion messages only)
    pub skipped: Vec<SkippedRow>,
}

/// Raw inbound message, before classification
#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(rename = "type")]
    kind: String,
    task_id: String,
    #[serde(default)]
    current: Option<u64>,
    #[serde(default)]
    total: Option<u64>,
    #[serde(default)]
    percent: Option<f64>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    inserted: Option<u64>,
    #[serde(default)]
    skipped: Option<Vec<SkippedRow>>,
}

/// Outcome of decoding one inbound text frame
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Task-scoped progress or completion
    Progress(ProgressEvent),
    /// Well-formed but not a progress message (e.g. `preview`)
    Ignored { kind: String, task_id: String },
}

impl InboundMessage {
    /// Decode one text frame.
    ///
    /// Fails on non-JSON input and on JSON missing `type` or `task_id`.
    pub fn decode(text: &str) -> crate::Result<Self> {
        let wire: WireMessage = serde_json::from_str(text)?;
        Ok(wire.classify())
    }
}

impl WireMessage {
    fn classify(self) -> InboundMessage {
        let status = self.status.as_deref().map(str::to_ascii_lowercase);
        let kind = match (self.kind.as_str(), status.as_deref()) {
            (_, Some("failed")) => Some(ProgressKind::Failed),
            ("failed", _) => Some(ProgressKind::Failed),
            ("completed", _) | (_, Some("completed")) => Some(ProgressKind::Completed),
            ("progress", _) => Some(ProgressKind::Progress),
            _ => None,
        };

        let Some(kind) = kind else {
            return InboundMessage::Ignored {
                kind: self.kind,
                task_id: self.task_id,
            };
        };

        let current = self.current.unwrap_or(0);
        let total = self.total.unwrap_or(0);
        let percent = match (kind, self.percent) {
            (ProgressKind::Completed, _) => 100,
            (_, Some(p)) => clamp_percent(p),
            (_, None) if total > 0 => clamp_percent(current as f64 * 100.0 / total as f64),
            _ => 0,
        };

        InboundMessage::Progress(ProgressEvent {
            kind,
            task_id: self.task_id,
            current,
            total,
            percent,
            error_detail: self.error,
            inserted: self.inserted,
            skipped: self.skipped.unwrap_or_default(),
        })
    }
}

/// Clamp an arbitrary numeric percentage into 0..=100
pub fn clamp_percent(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(text: &str) -> ProgressEvent {
        match InboundMessage::decode(text).unwrap() {
            InboundMessage::Progress(event) => event,
            other => panic!("expected progress event, got {:?}", other),
        }
    }

    #[test]
    fn test_progress_message() {
        let event = progress(
            r#"{"type":"progress","task_id":"t1","current":3,"total":10,"percent":30,"status":"processing"}"#,
        );
        assert_eq!(event.kind, ProgressKind::Progress);
        assert_eq!(event.task_id, "t1");
        assert_eq!(event.percent, 30);
        assert_eq!(event.current, 3);
    }

    #[test]
    fn test_failed_status_on_progress_type() {
        let event = progress(
            r#"{"type":"progress","task_id":"t1","current":0,"total":4,"percent":0,"status":"failed","error":"bad sheet"}"#,
        );
        assert_eq!(event.kind, ProgressKind::Failed);
        assert_eq!(event.error_detail.as_deref(), Some("bad sheet"));
    }

    #[test]
    fn test_completed_forces_full_percent_and_summary() {
        let event = progress(
            r#"{"type":"completed","task_id":"t9","inserted":7,"skipped":[{"row":2,"sheet":"Users","reason":"Duplicado"}],"status":"completed"}"#,
        );
        assert_eq!(event.kind, ProgressKind::Completed);
        assert_eq!(event.percent, 100);
        assert_eq!(event.inserted, Some(7));
        assert_eq!(event.skipped.len(), 1);
        assert_eq!(event.skipped[0].sheet, "Users");
    }

    #[test]
    fn test_percent_derived_and_clamped() {
        let derived = progress(r#"{"type":"progress","task_id":"t","current":1,"total":4}"#);
        assert_eq!(derived.percent, 25);

        let clamped = progress(r#"{"type":"progress","task_id":"t","percent":250}"#);
        assert_eq!(clamped.percent, 100);

        let negative = progress(r#"{"type":"progress","task_id":"t","percent":-5}"#);
        assert_eq!(negative.percent, 0);
    }

    #[test]
    fn test_malformed_messages_rejected() {
        assert!(InboundMessage::decode("not json").is_err());
        assert!(InboundMessage::decode(r#"{"task_id":"t1"}"#).is_err());
        assert!(InboundMessage::decode(r#"{"type":"login","user":"a@b.c"}"#).is_err());
        assert!(InboundMessage::decode(r#"{"type":"progress","task_id":42}"#).is_err());
    }

    #[test]
    fn test_unrelated_task_message_ignored() {
        let decoded =
            InboundMessage::decode(r#"{"type":"preview","task_id":"p1","status":"ready"}"#).unwrap();
        assert_eq!(
            decoded,
            InboundMessage::Ignored {
                kind: "preview".to_string(),
                task_id: "p1".to_string()
            }
        );
    }
}
