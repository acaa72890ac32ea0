//! Model lifecycle status shared between the worker and the UI.
//!
//! The worker emits immutable `ModelStatus` snapshots; the UI mirrors the
//! latest one. `ready` and `interruptable` are derived from the phase, so a
//! snapshot can never claim to be ready while generating.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle phase of the single model instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Phase {
    Initializing,
    /// Weights are being fetched; the value is a whole percentage.
    Downloading(u8),
    Ready,
    Generating,
    Error,
}

impl Phase {
    /// Whether the lifecycle allows moving from `self` to `next`.
    ///
    /// `Ready -> Ready` is legal: a stop request is acknowledged with an
    /// optimistic `Ready` and the unwound generation reports `Ready` again.
    pub fn can_transition_to(&self, next: Phase) -> bool {
        use Phase::*;
        match (self, next) {
            (Initializing, Downloading(_) | Ready | Error) => true,
            (Downloading(_), Downloading(_) | Ready | Error) => true,
            (Ready, Generating | Ready) => true,
            (Generating, Ready) => true,
            _ => false,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Phase::Initializing | Phase::Downloading(_))
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Initializing => write!(f, "INITIALIZING"),
            Phase::Downloading(pct) => write!(f, "DOWNLOADING {}%", pct),
            Phase::Ready => write!(f, "READY"),
            Phase::Generating => write!(f, "GENERATING"),
            Phase::Error => write!(f, "ERROR"),
        }
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INITIALIZING" => Ok(Phase::Initializing),
            "READY" => Ok(Phase::Ready),
            "GENERATING" => Ok(Phase::Generating),
            "ERROR" => Ok(Phase::Error),
            other => {
                let pct = other
                    .strip_prefix("DOWNLOADING ")
                    .and_then(|rest| rest.strip_suffix('%'))
                    .and_then(|n| n.trim().parse::<u8>().ok())
                    .filter(|n| *n <= 100)
                    .ok_or_else(|| format!("unknown status label: {other}"))?;
                Ok(Phase::Downloading(pct))
            }
        }
    }
}

impl From<Phase> for String {
    fn from(phase: Phase) -> Self {
        phase.to_string()
    }
}

impl TryFrom<String> for Phase {
    type Error = String;

    fn try_from(value: String) -> Result<Self, String> {
        value.parse()
    }
}

/// Snapshot of the model's lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ModelStatusWire")]
pub struct ModelStatus {
    model_name: String,
    status: Phase,
    ready: bool,
    interruptable: bool,
}

impl ModelStatus {
    pub fn new(model_name: impl Into<String>, status: Phase) -> Self {
        Self {
            model_name: model_name.into(),
            status,
            ready: status == Phase::Ready,
            interruptable: status == Phase::Generating,
        }
    }

    pub fn initializing(model_name: impl Into<String>) -> Self {
        Self::new(model_name, Phase::Initializing)
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn phase(&self) -> Phase {
        self.status
    }

    pub fn ready(&self) -> bool {
        self.ready
    }

    pub fn interruptable(&self) -> bool {
        self.interruptable
    }

    /// Status-line label, e.g. `DOWNLOADING 67%`.
    pub fn label(&self) -> String {
        self.status.to_string()
    }
}

#[derive(Deserialize)]
struct ModelStatusWire {
    model_name: String,
    status: Phase,
    ready: bool,
    interruptable: bool,
}

impl TryFrom<ModelStatusWire> for ModelStatus {
    type Error = String;

    fn try_from(wire: ModelStatusWire) -> Result<Self, Self::Error> {
        let status = ModelStatus::new(wire.model_name, wire.status);
        if status.ready != wire.ready || status.interruptable != wire.interruptable {
            return Err(format!(
                "inconsistent flags for {}: ready={} interruptable={}",
                status.status, wire.ready, wire.interruptable
            ));
        }
        Ok(status)
    }
}

/// Keeps reported download progress monotonic.
///
/// Progress callbacks may arrive duplicated or out of order; only values
/// strictly above the last accepted one are let through.
#[derive(Debug, Default, Clone)]
pub struct ProgressTracker {
    last: Option<u8>,
}

impl ProgressTracker {
    /// Accept `percent` if it moves progress forward, returning the whole
    /// percentage to display.
    pub fn advance(&mut self, percent: f32) -> Option<u8> {
        let pct = whole_percent(percent);
        match self.last {
            Some(last) if pct <= last => None,
            _ => {
                self.last = Some(pct);
                Some(pct)
            }
        }
    }

    pub fn last(&self) -> Option<u8> {
        self.last
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

fn whole_percent(percent: f32) -> u8 {
    if !percent.is_finite() {
        return 0;
    }
    percent.clamp(0.0, 100.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_follow_phase() {
        let ready = ModelStatus::new("m", Phase::Ready);
        assert!(ready.ready());
        assert!(!ready.interruptable());

        let generating = ModelStatus::new("m", Phase::Generating);
        assert!(!generating.ready());
        assert!(generating.interruptable());

        for phase in [Phase::Initializing, Phase::Downloading(40), Phase::Error] {
            let status = ModelStatus::new("m", phase);
            assert!(!status.ready());
            assert!(!status.interruptable());
        }
    }

    #[test]
    fn test_labels() {
        assert_eq!(Phase::Downloading(67).to_string(), "DOWNLOADING 67%");
        assert_eq!("DOWNLOADING 10%".parse::<Phase>(), Ok(Phase::Downloading(10)));
        assert_eq!("READY".parse::<Phase>(), Ok(Phase::Ready));
        assert!("DOWNLOADING 101%".parse::<Phase>().is_err());
        assert!("LOADING".parse::<Phase>().is_err());
    }

    #[test]
    fn test_status_json_shape() {
        let json = serde_json::to_value(ModelStatus::new("qwen", Phase::Generating)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "model_name": "qwen",
                "status": "GENERATING",
                "ready": false,
                "interruptable": true
            })
        );
    }

    #[test]
    fn test_deserialize_rejects_inconsistent_flags() {
        let bad = r#"{"model_name":"m","status":"READY","ready":false,"interruptable":false}"#;
        assert!(serde_json::from_str::<ModelStatus>(bad).is_err());

        let good = r#"{"model_name":"m","status":"DOWNLOADING 5%","ready":false,"interruptable":false}"#;
        let status: ModelStatus = serde_json::from_str(good).unwrap();
        assert_eq!(status.phase(), Phase::Downloading(5));
    }

    #[test]
    fn test_transitions() {
        assert!(Phase::Initializing.can_transition_to(Phase::Downloading(1)));
        assert!(Phase::Downloading(1).can_transition_to(Phase::Error));
        assert!(Phase::Ready.can_transition_to(Phase::Generating));
        assert!(Phase::Generating.can_transition_to(Phase::Ready));
        assert!(Phase::Ready.can_transition_to(Phase::Ready));
        assert!(!Phase::Generating.can_transition_to(Phase::Error));
        assert!(!Phase::Ready.can_transition_to(Phase::Error));
        assert!(!Phase::Error.can_transition_to(Phase::Ready));
        assert!(!Phase::Initializing.can_transition_to(Phase::Generating));
    }

    #[test]
    fn test_progress_never_regresses() {
        let mut tracker = ProgressTracker::default();
        assert_eq!(tracker.advance(10.0), Some(10));
        assert_eq!(tracker.advance(67.0), Some(67));
        assert_eq!(tracker.advance(50.0), None);
        assert_eq!(tracker.advance(67.0), None);
        assert_eq!(tracker.advance(f32::NAN), None);
        assert_eq!(tracker.advance(250.0), Some(100));
        assert_eq!(tracker.last(), Some(100));
    }
}
