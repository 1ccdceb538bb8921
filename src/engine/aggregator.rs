//! Cross-frame violation tracking.
//!
//! The detector gives no persistent track IDs, so open entries are keyed by
//! (rule, last known anchor centroid) and candidate triggers are matched to
//! them by spatial proximity. This is an approximation: two qualifying
//! detections crossing paths between frames can merge or swap tracks.
//!
//! Lifecycle per entry: Candidate -> Confirmed (one Violation emitted at the
//! transition, never again) -> removed after `grace_frames` without a match.
//! A later re-trigger in the same spot is a new independent instance.

use serde::Serialize;

use crate::detect::{BoundingBox, Detection};
use crate::rules::{RuleRegistry, Severity, Standard};

use super::evaluator::CandidateTrigger;

/// Frame id + timestamp pair marking one end of a violation's time span.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct FrameStamp {
    pub frame_id: u64,
    pub timestamp_ms: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EvidenceRecord {
    pub frame_id: u64,
    pub class_label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl From<&Detection> for EvidenceRecord {
    fn from(det: &Detection) -> Self {
        Self {
            frame_id: det.frame_id,
            class_label: det.class_label.clone(),
            confidence: det.confidence,
            bbox: det.bbox,
        }
    }
}

/// Confirmed, reportable violation. Terminal: emitted exactly once per open
/// entry's lifecycle.
#[derive(Clone, Debug, Serialize)]
pub struct Violation {
    pub rule_id: String,
    pub standard: Standard,
    pub citation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    pub confidence: f32,
    pub first_seen: FrameStamp,
    pub last_seen: FrameStamp,
    pub evidence: Vec<EvidenceRecord>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TrackState {
    Candidate,
    Confirmed,
}

#[derive(Debug)]
struct OpenViolation {
    rule_index: usize,
    state: TrackState,
    first_seen: FrameStamp,
    last_seen: FrameStamp,
    /// Aggregator frame sequence number of the last match, for grace expiry.
    last_seen_seq: u64,
    /// Matched-frame count; gaps within the grace period do not reset it.
    frame_count: u32,
    centroid: (f32, f32),
    best_confidence: f32,
    best_evidence: Vec<EvidenceRecord>,
    /// Creation order, tie-breaker for deterministic matching.
    entry_seq: u64,
}

/// Per-session temporal state. Single-writer; frames must arrive in order.
#[derive(Debug)]
pub struct TemporalAggregator {
    grace_frames: u32,
    match_radius_px: f32,
    open: Vec<OpenViolation>,
    frame_seq: u64,
    next_entry_seq: u64,
}

impl TemporalAggregator {
    pub fn new(grace_frames: u32, match_radius_px: f32) -> Self {
        Self {
            grace_frames,
            match_radius_px,
            open: Vec::new(),
            frame_seq: 0,
            next_entry_seq: 0,
        }
    }

    /// Number of open (candidate or confirmed) entries.
    pub fn open_entries(&self) -> usize {
        self.open.len()
    }

    /// Feed one frame's candidate triggers; returns the violations confirmed
    /// on this frame. Must be called once per processed frame, including
    /// frames with no triggers, so grace expiry advances.
    pub fn observe_frame(
        &mut self,
        registry: &RuleRegistry,
        triggers: &[CandidateTrigger],
    ) -> Vec<Violation> {
        self.frame_seq += 1;
        let seq = self.frame_seq;

        // Sort for order independence within the frame.
        let mut order: Vec<usize> = (0..triggers.len()).collect();
        order.sort_by(|&a, &b| {
            let (ta, tb) = (&triggers[a], &triggers[b]);
            ta.rule_index
                .cmp(&tb.rule_index)
                .then(ta.centroid().0.total_cmp(&tb.centroid().0))
                .then(ta.centroid().1.total_cmp(&tb.centroid().1))
                .then(tb.confidence.total_cmp(&ta.confidence))
        });

        let mut claimed = vec![false; self.open.len()];
        let mut confirmed = Vec::new();
        for &trigger_index in &order {
            let trigger = &triggers[trigger_index];
            let centroid = trigger.centroid();
            let matched = self.nearest_open_entry(trigger.rule_index, centroid, &claimed);
            let entry_index = match matched {
                Some(entry_index) => {
                    claimed[entry_index] = true;
                    let entry = &mut self.open[entry_index];
                    entry.frame_count += 1;
                    entry.last_seen = FrameStamp {
                        frame_id: trigger.frame_id,
                        timestamp_ms: trigger.timestamp_ms,
                    };
                    entry.last_seen_seq = seq;
                    entry.centroid = centroid;
                    if trigger.confidence > entry.best_confidence {
                        entry.best_confidence = trigger.confidence;
                        entry.best_evidence =
                            trigger.evidence.iter().map(EvidenceRecord::from).collect();
                    }
                    entry_index
                }
                None => {
                    let stamp = FrameStamp {
                        frame_id: trigger.frame_id,
                        timestamp_ms: trigger.timestamp_ms,
                    };
                    self.open.push(OpenViolation {
                        rule_index: trigger.rule_index,
                        state: TrackState::Candidate,
                        first_seen: stamp,
                        last_seen: stamp,
                        last_seen_seq: seq,
                        frame_count: 1,
                        centroid,
                        best_confidence: trigger.confidence,
                        best_evidence: trigger.evidence.iter().map(EvidenceRecord::from).collect(),
                        entry_seq: self.next_entry_seq,
                    });
                    self.next_entry_seq += 1;
                    claimed.push(true);
                    self.open.len() - 1
                }
            };

            let entry = &mut self.open[entry_index];
            let window = registry.get(entry.rule_index).rule.confirmation_window;
            if entry.state == TrackState::Candidate && entry.frame_count >= window {
                entry.state = TrackState::Confirmed;
                let loaded = registry.get(entry.rule_index);
                log::info!(
                    "violation confirmed: {} ({} {}) after {} frame(s)",
                    loaded.rule.id,
                    loaded.standard,
                    loaded.rule.citation,
                    entry.frame_count
                );
                confirmed.push(Violation {
                    rule_id: loaded.rule.id.clone(),
                    standard: loaded.standard,
                    citation: loaded.rule.citation.clone(),
                    description: loaded.rule.description.clone(),
                    severity: loaded.rule.severity,
                    confidence: entry.best_confidence,
                    first_seen: entry.first_seen,
                    last_seen: entry.last_seen,
                    evidence: entry.best_evidence.clone(),
                });
            }
        }

        let grace = self.grace_frames as u64;
        self.open.retain(|entry| {
            let keep = seq - entry.last_seen_seq <= grace;
            if !keep {
                log::debug!(
                    "expiring {:?} entry for rule index {} (last seen frame {})",
                    entry.state,
                    entry.rule_index,
                    entry.last_seen.frame_id
                );
            }
            keep
        });

        confirmed
    }

    fn nearest_open_entry(
        &self,
        rule_index: usize,
        centroid: (f32, f32),
        claimed: &[bool],
    ) -> Option<usize> {
        let mut best: Option<(f32, u64, usize)> = None;
        for (entry_index, entry) in self.open.iter().enumerate() {
            if claimed[entry_index] || entry.rule_index != rule_index {
                continue;
            }
            let distance = ((entry.centroid.0 - centroid.0).powi(2)
                + (entry.centroid.1 - centroid.1).powi(2))
            .sqrt();
            if distance > self.match_radius_px {
                continue;
            }
            let key = (distance, entry.entry_seq, entry_index);
            let better = match &best {
                Some((d, s, _)) => {
                    distance.total_cmp(d).then(key.1.cmp(s)) == std::cmp::Ordering::Less
                }
                None => true,
            };
            if better {
                best = Some(key);
            }
        }
        best.map(|(_, _, entry_index)| entry_index)
    }
}
