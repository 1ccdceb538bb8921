//! Declarative condition grammar for compliance rules.
//!
//! Conditions are data, not code: a tagged tree validated at registry load
//! time and evaluated per frame. The serde form matches the rule-file JSON
//! directly, e.g. `{"class_present": {"label": "person", "min_confidence": 0.5}}`
//! or `{"and": [..]}`.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Geometric relation tested between anchor and target detections.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpatialRelationKind {
    /// Center distance below `threshold_px`.
    WithinDistance,
    /// IoU at or above `min_iou`.
    Overlapping,
    /// No overlap at all between the boxes.
    Disjoint,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    ClassPresent {
        label: String,
        min_confidence: f32,
    },
    /// No detection of `label` in the frame, or (when `anchor`/`within_px`
    /// are set) none within `within_px` of each anchor detection.
    ClassAbsent {
        label: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        anchor: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        within_px: Option<f32>,
    },
    SpatialRelation {
        anchor: String,
        target: String,
        relation: SpatialRelationKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        threshold_px: Option<f32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_iou: Option<f32>,
    },
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
}

impl Condition {
    /// Structural well-formedness check. Returns a human-readable reason on
    /// failure; the registry wraps it into a schema error with file context.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Condition::ClassPresent {
                label,
                min_confidence,
            } => {
                if label.is_empty() {
                    return Err("class_present label must be non-empty".into());
                }
                if !(0.0..=1.0).contains(min_confidence) {
                    return Err(format!(
                        "class_present '{}' min_confidence {} outside [0,1]",
                        label, min_confidence
                    ));
                }
                Ok(())
            }
            Condition::ClassAbsent {
                label,
                anchor,
                within_px,
            } => {
                if label.is_empty() {
                    return Err("class_absent label must be non-empty".into());
                }
                match (anchor, within_px) {
                    (Some(_), Some(px)) if *px > 0.0 => Ok(()),
                    (Some(_), Some(px)) => Err(format!(
                        "class_absent '{}' within_px {} must be positive",
                        label, px
                    )),
                    (None, None) => Ok(()),
                    _ => Err(format!(
                        "class_absent '{}' requires anchor and within_px together",
                        label
                    )),
                }
            }
            Condition::SpatialRelation {
                anchor,
                target,
                relation,
                threshold_px,
                min_iou,
            } => {
                if anchor.is_empty() || target.is_empty() {
                    return Err("spatial_relation anchor/target must be non-empty".into());
                }
                match relation {
                    SpatialRelationKind::WithinDistance | SpatialRelationKind::Disjoint => {
                        if min_iou.is_some() {
                            return Err(format!(
                                "spatial_relation {}/{}: min_iou is only valid for 'overlapping'",
                                anchor, target
                            ));
                        }
                        match threshold_px {
                            Some(px) if *px > 0.0 => Ok(()),
                            _ => Err(format!(
                                "spatial_relation {}/{} requires positive threshold_px",
                                anchor, target
                            )),
                        }
                    }
                    SpatialRelationKind::Overlapping => {
                        if threshold_px.is_some() {
                            return Err(format!(
                                "spatial_relation {}/{}: threshold_px is not valid for 'overlapping'",
                                anchor, target
                            ));
                        }
                        match min_iou {
                            Some(iou) if *iou > 0.0 && *iou <= 1.0 => Ok(()),
                            _ => Err(format!(
                                "spatial_relation {}/{} requires min_iou in (0,1]",
                                anchor, target
                            )),
                        }
                    }
                }
            }
            Condition::And(children) | Condition::Or(children) => {
                if children.is_empty() {
                    return Err("and/or requires at least one child condition".into());
                }
                for child in children {
                    child.validate()?;
                }
                Ok(())
            }
            Condition::Not(child) => child.validate(),
        }
    }

    /// Every class label the condition references, for vocabulary checks.
    pub fn collect_labels<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Condition::ClassPresent { label, .. } => {
                out.insert(label);
            }
            Condition::ClassAbsent { label, anchor, .. } => {
                out.insert(label);
                if let Some(anchor) = anchor {
                    out.insert(anchor);
                }
            }
            Condition::SpatialRelation { anchor, target, .. } => {
                out.insert(anchor);
                out.insert(target);
            }
            Condition::And(children) | Condition::Or(children) => {
                for child in children {
                    child.collect_labels(out);
                }
            }
            Condition::Not(child) => child.collect_labels(out),
        }
    }

    /// Labels whose presence in a frame can enable this condition, used to
    /// build the registry's class index. `None` means the condition may hold
    /// without any particular class present (the rule must always be
    /// considered).
    pub fn trigger_labels(&self) -> Option<BTreeSet<&str>> {
        match self {
            Condition::ClassPresent { label, .. } => Some(BTreeSet::from([label.as_str()])),
            Condition::ClassAbsent { anchor, .. } => anchor
                .as_deref()
                .map(|anchor| BTreeSet::from([anchor])),
            Condition::SpatialRelation { anchor, target, .. } => {
                Some(BTreeSet::from([anchor.as_str(), target.as_str()]))
            }
            Condition::Not(_) => None,
            Condition::And(children) => {
                // Every child must hold, so any child's definite requirement
                // is a requirement of the whole conjunction.
                let mut union = BTreeSet::new();
                for child in children {
                    if let Some(labels) = child.trigger_labels() {
                        union.extend(labels);
                    }
                }
                if union.is_empty() {
                    None
                } else {
                    Some(union)
                }
            }
            Condition::Or(children) => {
                // A single satisfiable-without-presence child makes the whole
                // disjunction unindexable.
                let mut union = BTreeSet::new();
                for child in children {
                    union.extend(child.trigger_labels()?);
                }
                Some(union)
            }
        }
    }

    /// The label the rule fires per-detection on: the first non-negated
    /// `class_present` in depth-first order, falling back to the first
    /// non-negated `spatial_relation` anchor, then to an anchored
    /// `class_absent` anchor.
    pub fn anchor_label(&self) -> Option<&str> {
        self.find_positive(&|c| match c {
            Condition::ClassPresent { label, .. } => Some(label.as_str()),
            _ => None,
        })
        .or_else(|| {
            self.find_positive(&|c| match c {
                Condition::SpatialRelation { anchor, .. } => Some(anchor.as_str()),
                _ => None,
            })
        })
        .or_else(|| {
            self.find_positive(&|c| match c {
                Condition::ClassAbsent { anchor, .. } => anchor.as_deref(),
                _ => None,
            })
        })
    }

    /// Depth-first search skipping negated subtrees.
    fn find_positive<'a>(
        &'a self,
        pick: &dyn Fn(&'a Condition) -> Option<&'a str>,
    ) -> Option<&'a str> {
        if let Some(found) = pick(self) {
            return Some(found);
        }
        match self {
            Condition::And(children) | Condition::Or(children) => {
                children.iter().find_map(|child| child.find_positive(pick))
            }
            Condition::Not(_) => None,
            _ => None,
        }
    }
}
