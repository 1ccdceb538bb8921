//! Per-frame condition evaluation.
//!
//! Conditions are evaluated bottom-up against one frame's detections. A rule
//! fires once per distinct anchor detection, so two people each missing a
//! hardhat produce two candidate triggers in the same frame. Evaluation is a
//! pure function of (registry, detections) and is deterministic: rules are
//! visited in registry order, anchors in detection order.

use std::collections::{BTreeSet, HashMap};

use crate::detect::Detection;
use crate::rules::{Condition, RuleRegistry, SpatialRelationKind};

/// A rule's condition satisfied on a single frame, before temporal
/// confirmation.
#[derive(Clone, Debug)]
pub struct CandidateTrigger {
    pub rule_index: usize,
    pub rule_id: String,
    /// The anchor detection the rule fired on.
    pub anchor: Detection,
    /// Minimum confidence across the matched detections. Conservative by
    /// choice: a compound match is only as credible as its weakest part.
    pub confidence: f32,
    pub evidence: Vec<Detection>,
    pub frame_id: u64,
    pub timestamp_ms: u64,
}

impl CandidateTrigger {
    /// Centroid of the anchor detection, the aggregator's spatial identity
    /// proxy for this trigger.
    pub fn centroid(&self) -> (f32, f32) {
        self.anchor.bbox.center()
    }
}

struct FrameIndex<'a> {
    by_label: HashMap<&'a str, Vec<&'a Detection>>,
}

impl<'a> FrameIndex<'a> {
    fn new(detections: &'a [Detection]) -> Self {
        let mut by_label: HashMap<&str, Vec<&Detection>> = HashMap::new();
        for det in detections {
            by_label.entry(det.class_label.as_str()).or_default().push(det);
        }
        Self { by_label }
    }

    fn with_label(&self, label: &str) -> &[&'a Detection] {
        self.by_label.get(label).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Evaluate every relevant rule against one frame's normalized detections.
pub fn evaluate_frame(registry: &RuleRegistry, detections: &[Detection]) -> Vec<CandidateTrigger> {
    let index = FrameIndex::new(detections);
    let labels: BTreeSet<&str> = detections.iter().map(|d| d.class_label.as_str()).collect();
    let mut triggers = Vec::new();

    for rule_index in registry.candidate_rules(labels.iter().copied()) {
        let loaded = registry.get(rule_index);
        let Some(anchor_label) = loaded.rule.condition.anchor_label() else {
            continue; // unreachable for a validated registry
        };
        for anchor in index.with_label(anchor_label) {
            let Some(matched) = eval(&loaded.rule.condition, &index, anchor) else {
                continue;
            };
            let mut evidence: Vec<&Detection> = vec![anchor];
            for det in matched {
                if !evidence.iter().any(|kept| std::ptr::eq(*kept, det)) {
                    evidence.push(det);
                }
            }
            let confidence = evidence
                .iter()
                .map(|d| d.confidence)
                .fold(f32::INFINITY, f32::min);
            triggers.push(CandidateTrigger {
                rule_index,
                rule_id: loaded.rule.id.clone(),
                anchor: (*anchor).clone(),
                confidence,
                evidence: evidence.into_iter().cloned().collect(),
                frame_id: anchor.frame_id,
                timestamp_ms: anchor.timestamp_ms,
            });
        }
    }
    if !triggers.is_empty() {
        log::debug!(
            "frame {}: {} candidate trigger(s)",
            triggers[0].frame_id,
            triggers.len()
        );
    }
    triggers
}

/// Evaluate a condition with `anchor` bound. Returns the matched detections
/// (evidence) on success, `None` when unsatisfied. Where a node names the
/// anchor's own class, it refers to the bound anchor detection itself.
fn eval<'a>(
    condition: &Condition,
    index: &FrameIndex<'a>,
    anchor: &'a Detection,
) -> Option<Vec<&'a Detection>> {
    match condition {
        Condition::ClassPresent {
            label,
            min_confidence,
        } => {
            if label == &anchor.class_label {
                return (anchor.confidence >= *min_confidence).then(|| vec![anchor]);
            }
            let matched: Vec<&Detection> = index
                .with_label(label)
                .iter()
                .copied()
                .filter(|d| d.confidence >= *min_confidence)
                .collect();
            (!matched.is_empty()).then_some(matched)
        }
        Condition::ClassAbsent {
            label,
            anchor: anchor_label,
            within_px,
        } => {
            let holds = match (anchor_label, within_px) {
                (Some(anchor_label), Some(within_px)) => {
                    let reference: Vec<&Detection> = if anchor_label == &anchor.class_label {
                        vec![anchor]
                    } else {
                        index.with_label(anchor_label).to_vec()
                    };
                    reference.iter().all(|refer| {
                        !index.with_label(label).iter().any(|candidate| {
                            refer.bbox.center_distance(&candidate.bbox) <= *within_px
                        })
                    })
                }
                _ => index.with_label(label).is_empty(),
            };
            holds.then(Vec::new)
        }
        Condition::SpatialRelation {
            anchor: anchor_label,
            target,
            relation,
            threshold_px,
            min_iou,
        } => {
            let anchors: Vec<&Detection> = if anchor_label == &anchor.class_label {
                vec![anchor]
            } else {
                index.with_label(anchor_label).to_vec()
            };
            let targets = index.with_label(target);
            for a in &anchors {
                for t in targets {
                    if std::ptr::eq(*a, *t) {
                        continue;
                    }
                    let related = match relation {
                        SpatialRelationKind::WithinDistance => {
                            a.bbox.center_distance(&t.bbox) <= threshold_px.unwrap_or(0.0)
                        }
                        SpatialRelationKind::Overlapping => {
                            a.bbox.iou(&t.bbox) >= min_iou.unwrap_or(f32::INFINITY)
                        }
                        SpatialRelationKind::Disjoint => a.bbox.iou(&t.bbox) == 0.0,
                    };
                    if related {
                        return Some(vec![*a, *t]);
                    }
                }
            }
            None
        }
        Condition::And(children) => {
            let mut evidence = Vec::new();
            for child in children {
                evidence.extend(eval(child, index, anchor)?);
            }
            Some(evidence)
        }
        Condition::Or(children) => children.iter().find_map(|child| eval(child, index, anchor)),
        Condition::Not(child) => match eval(child, index, anchor) {
            Some(_) => None,
            None => Some(Vec::new()),
        },
    }
}
