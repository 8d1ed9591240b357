//! Detection gating: at most one submission in flight, no consecutive repeats

use attend_common::events::IgnoreReason;

/// Last text seen by the scan loop
///
/// Only the single most recent value is kept. A code is accepted again as
/// soon as any different code has been seen in between.
#[derive(Debug, Default, Clone)]
pub struct DedupWindow {
    last: Option<String>,
}

impl DedupWindow {
    pub fn is_repeat(&self, text: &str) -> bool {
        self.last.as_deref() == Some(text.trim())
    }

    pub fn record(&mut self, text: &str) {
        self.last = Some(text.trim().to_string());
    }

    pub fn last(&self) -> Option<&str> {
        self.last.as_deref()
    }
}

/// Per-lifecycle admission state of the scan loop
#[derive(Debug, Default)]
pub struct DetectionGate {
    window: DedupWindow,
    in_flight: bool,
}

impl DetectionGate {
    /// Decide whether a detection may proceed to parsing
    ///
    /// Detections arriving while a submission is outstanding are dropped
    /// without touching the window, so they are neither queued nor
    /// remembered.
    pub fn admit(&mut self, text: &str) -> Result<(), IgnoreReason> {
        if self.in_flight {
            return Err(IgnoreReason::SubmissionInFlight);
        }
        if self.window.is_repeat(text) {
            return Err(IgnoreReason::Duplicate);
        }
        self.window.record(text);
        Ok(())
    }

    pub fn begin_submission(&mut self) {
        self.in_flight = true;
    }

    pub fn finish_submission(&mut self) {
        self.in_flight = false;
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn window(&self) -> &DedupWindow {
        &self.window
    }
}
