//! Frame-ordered evaluation pipeline.
//!
//! A `Session` owns all mutable state for one camera/session stream. The
//! registry is shared read-only (`Arc`); concurrent streams each own an
//! independent session and never share aggregator state. Frames must be fed
//! in arrival order; out-of-order or stale frames are rejected as caller
//! contract violations rather than silently corrupting aggregation.

mod aggregator;
mod evaluator;

pub use aggregator::{EvidenceRecord, FrameStamp, TemporalAggregator, Violation};
pub use evaluator::{evaluate_frame, CandidateTrigger};

use std::sync::Arc;

use thiserror::Error;

use crate::config::EngineConfig;
use crate::detect::{normalize_frame, FrameDetections};
use crate::report::Report;
use crate::rules::RuleRegistry;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame {got} out of order: already processed frame {last}")]
    OutOfOrder { got: u64, last: u64 },
    #[error("frame {frame_id} is stale: {lag_ms}ms behind newest accepted frame (limit {limit_ms}ms)")]
    Stale {
        frame_id: u64,
        lag_ms: u64,
        limit_ms: u64,
    },
}

pub struct Session {
    registry: Arc<RuleRegistry>,
    config: EngineConfig,
    aggregator: TemporalAggregator,
    last_frame_id: Option<u64>,
    newest_timestamp_ms: u64,
    violations: Vec<Violation>,
}

impl Session {
    pub fn new(registry: Arc<RuleRegistry>, config: EngineConfig) -> Self {
        let aggregator = TemporalAggregator::new(config.grace_frames, config.match_radius_px);
        Self {
            registry,
            config,
            aggregator,
            last_frame_id: None,
            newest_timestamp_ms: 0,
            violations: Vec::new(),
        }
    }

    /// Process one frame of raw detector output. Returns the violations
    /// newly confirmed on this frame (usually empty). Rejected frames leave
    /// session state untouched and the session usable.
    pub fn process_frame(&mut self, raw: &FrameDetections) -> Result<Vec<Violation>, FrameError> {
        if let Some(last) = self.last_frame_id {
            if raw.frame_id <= last {
                return Err(FrameError::OutOfOrder {
                    got: raw.frame_id,
                    last,
                });
            }
        }
        if let Some(limit_ms) = self.config.max_frame_lag_ms {
            let lag_ms = self.newest_timestamp_ms.saturating_sub(raw.timestamp_ms);
            if lag_ms > limit_ms {
                return Err(FrameError::Stale {
                    frame_id: raw.frame_id,
                    lag_ms,
                    limit_ms,
                });
            }
        }
        self.last_frame_id = Some(raw.frame_id);
        self.newest_timestamp_ms = self.newest_timestamp_ms.max(raw.timestamp_ms);

        let normalized = normalize_frame(raw, self.config.confidence_floor);
        let triggers = evaluate_frame(&self.registry, &normalized.detections);
        let confirmed = self.aggregator.observe_frame(&self.registry, &triggers);
        self.violations.extend(confirmed.iter().cloned());
        Ok(confirmed)
    }

    /// All violations confirmed so far, in confirmation order.
    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    pub fn open_entries(&self) -> usize {
        self.aggregator.open_entries()
    }

    /// Tear down the session: open candidate/confirmed state is discarded
    /// (everything reportable was already emitted at confirmation time) and
    /// the accumulated violations become the final report.
    pub fn finish(self) -> Report {
        Report::new(self.violations)
    }
}
