//! Jobs, verdicts, detection events and the detection predicate.

use std::path::PathBuf;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::core::VerifierError;
use crate::util::{now_ms, SlotId};

/// Final outcome of one slot verification run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    /// Slot the verdict is about.
    pub slot_id: SlotId,
    /// Whether the detector confirmed a vehicle.
    pub success: bool,
    /// Detection attempts made during the run.
    pub attempts: u32,
}

impl Verdict {
    /// Build a verdict.
    pub fn new(slot_id: SlotId, success: bool, attempts: u32) -> Self {
        Self {
            slot_id,
            success,
            attempts,
        }
    }

    /// Negative verdict after `attempts` detection attempts.
    pub fn failed(slot_id: SlotId, attempts: u32) -> Self {
        Self::new(slot_id, false, attempts)
    }
}

/// One single-shot detection request. Consumed exactly once.
#[derive(Debug)]
pub struct Job {
    /// Unique job identifier for log correlation.
    pub id: Uuid,
    /// Slot the capture belongs to.
    pub slot_id: SlotId,
    /// Path of the captured frame handed to the backend.
    pub capture: PathBuf,
    reply: oneshot::Sender<Verdict>,
}

impl Job {
    /// Create a job and the receiver on which its verdict arrives.
    ///
    /// Dropping the job unanswered (e.g. evicted as stale) closes the receiver.
    pub fn new(slot_id: SlotId, capture: impl Into<PathBuf>) -> (Self, oneshot::Receiver<Verdict>) {
        let (reply, rx) = oneshot::channel();
        (
            Self {
                id: Uuid::new_v4(),
                slot_id,
                capture: capture.into(),
                reply,
            },
            rx,
        )
    }

    /// Answer the job. Returns false if the requesting worker stopped waiting.
    pub fn respond(self, success: bool) -> bool {
        self.reply
            .send(Verdict::new(self.slot_id, success, 1))
            .is_ok()
    }
}

/// One timestamped line of streaming backend output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionEvent {
    /// Raw text line as emitted by the backend.
    pub raw: String,
    /// Milliseconds since epoch when the line was read.
    pub timestamp_ms: u128,
}

impl DetectionEvent {
    /// Timestamp `raw` with the current time.
    pub fn now(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            timestamp_ms: now_ms(),
        }
    }
}

/// Decides whether backend output reports a target object.
///
/// Output is positive when some line carries `<count> <label>` for one of
/// the target labels (plural suffix allowed) with a count above zero. Lines
/// that report no detections never count.
#[derive(Debug, Clone)]
pub struct DetectionMatcher {
    counted: Regex,
    empty: Regex,
}

impl DetectionMatcher {
    /// Build a matcher for the given labels.
    ///
    /// # Errors
    ///
    /// Returns `VerifierError::Config` if no non-blank label is given.
    pub fn new<S: AsRef<str>>(labels: &[S]) -> Result<Self, VerifierError> {
        // A blank alternative would match any `<count> <word>`.
        let labels: Vec<_> = labels
            .iter()
            .map(|l| l.as_ref().trim())
            .filter(|l| !l.is_empty())
            .map(regex::escape)
            .collect();
        if labels.is_empty() {
            return Err(VerifierError::Config(
                "at least one target label is required".into(),
            ));
        }
        let alternatives = labels.join("|");
        let counted = Regex::new(&format!(r"(?i)\b(\d+)\s+(?:{alternatives})(?:es|s)?\b"))
            .map_err(|e| VerifierError::Config(format!("bad label pattern: {e}")))?;
        let empty = Regex::new(r"(?i)\bno (?:objects|detections)\b")
            .map_err(|e| VerifierError::Config(format!("bad pattern: {e}")))?;
        Ok(Self { counted, empty })
    }

    fn counts<'a>(&'a self, output: &'a str) -> impl Iterator<Item = u64> + 'a {
        output
            .lines()
            .filter(|line| !self.empty.is_match(line))
            .flat_map(|line| self.counted.captures_iter(line))
            .filter_map(|caps| caps.get(1)?.as_str().parse::<u64>().ok())
    }

    /// Total number of target objects reported across all lines.
    ///
    /// Saturates at `u64::MAX`. Counts too long for a `u64` are skipped.
    pub fn count(&self, output: &str) -> u64 {
        self.counts(output).fold(0, u64::saturating_add)
    }

    /// Whether `output` reports at least one target object.
    pub fn is_positive(&self, output: &str) -> bool {
        self.counts(output).any(|n| n > 0)
    }
}

impl Default for DetectionMatcher {
    fn default() -> Self {
        Self::new(&["car", "carro"]).expect("default labels are valid")
    }
}
