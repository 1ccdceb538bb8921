//! Rule registry: loads one declarative rule set per regulatory standard,
//! validates everything up front, and indexes rules by the detection classes
//! that can trigger them.
//!
//! The load is all-or-nothing: a single malformed rule in any file fails the
//! whole registry, so evaluation never runs against a partial rule set. Once
//! built the registry is read-only and safe to share across sessions.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::condition::Condition;

/// Regulatory bodies a rule set may cite.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Standard {
    Osha,
    Epa,
    Nfpa,
    Ansi,
}

impl fmt::Display for Standard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Standard::Osha => "OSHA",
            Standard::Epa => "EPA",
            Standard::Nfpa => "NFPA",
            Standard::Ansi => "ANSI",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

fn default_confirmation_window() -> u32 {
    1
}

/// One compliance rule. Immutable once loaded.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub citation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    /// Minimum matched-frame count before the rule confirms as a Violation.
    #[serde(default = "default_confirmation_window")]
    pub confirmation_window: u32,
    pub condition: Condition,
}

/// Wire form of one rule file (one file per standard).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StandardRuleSet {
    pub standard: Standard,
    pub rules: Vec<Rule>,
}

#[derive(Debug, Error)]
pub enum RuleLoadError {
    #[error("failed to read rule file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid rule file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("rule schema error in {context}: {reason}")]
    Schema { context: String, reason: String },
    #[error("rule '{rule_id}' references unknown class '{label}'")]
    UnknownClassReference { rule_id: String, label: String },
    #[error("duplicate rule id '{rule_id}'")]
    DuplicateRuleId { rule_id: String },
}

/// Known detector class labels. Rule conditions may only reference labels in
/// the vocabulary; unknown references fail at load time, not at evaluation.
#[derive(Clone, Debug)]
pub struct ClassVocabulary {
    labels: BTreeSet<String>,
}

/// Classes the stock detector models are trained on, plus the PPE
/// counterparts used by proximity rules.
const DEFAULT_CLASS_LABELS: [&str; 15] = [
    "person",
    "forklift",
    "hardhat",
    "hardhat_missing",
    "hi_vis_vest",
    "hi_vis_missing",
    "safety_glasses",
    "safety_glasses_missing",
    "unguarded_machine",
    "blocked_exit",
    "exit_sign",
    "ladder_unsafe",
    "spill",
    "guardrail",
    "no_guardrail",
];

impl Default for ClassVocabulary {
    fn default() -> Self {
        Self::from_labels(DEFAULT_CLASS_LABELS.iter().copied())
    }
}

impl ClassVocabulary {
    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
        }
    }

    pub fn extend<I, S>(&mut self, labels: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels.extend(labels.into_iter().map(Into::into));
    }

    pub fn contains(&self, label: &str) -> bool {
        self.labels.contains(label)
    }
}

/// A rule together with the standard whose file declared it.
#[derive(Clone, Debug)]
pub struct LoadedRule {
    pub standard: Standard,
    pub rule: Rule,
}

/// Validated, indexed rule set. Built once; read-only afterwards.
#[derive(Debug)]
pub struct RuleRegistry {
    rules: Vec<LoadedRule>,
    by_id: HashMap<String, usize>,
    class_index: HashMap<String, Vec<usize>>,
    /// Rules whose condition may hold without any particular class present.
    always_considered: Vec<usize>,
}

impl RuleRegistry {
    /// Load every `*.json` rule file in `dir`. Files are read in sorted
    /// order so registry (and therefore evaluation) order is deterministic.
    pub fn load_dir(dir: &Path, vocabulary: &ClassVocabulary) -> Result<Self, RuleLoadError> {
        let entries = std::fs::read_dir(dir).map_err(|source| RuleLoadError::Io {
            path: dir.display().to_string(),
            source,
        })?;
        let mut paths: Vec<_> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        let mut sets = Vec::with_capacity(paths.len());
        for path in &paths {
            let display = path.display().to_string();
            let raw = std::fs::read_to_string(path).map_err(|source| RuleLoadError::Io {
                path: display.clone(),
                source,
            })?;
            let set: StandardRuleSet =
                serde_json::from_str(&raw).map_err(|source| RuleLoadError::Parse {
                    path: display,
                    source,
                })?;
            sets.push(set);
        }
        let registry = Self::from_sets(sets, vocabulary)?;
        log::info!(
            "rule registry loaded: {} rules from {} files under {}",
            registry.len(),
            paths.len(),
            dir.display()
        );
        Ok(registry)
    }

    /// Build a registry from already-parsed rule sets. Every rule in every
    /// set is validated before any indexing happens.
    pub fn from_sets(
        sets: Vec<StandardRuleSet>,
        vocabulary: &ClassVocabulary,
    ) -> Result<Self, RuleLoadError> {
        let mut seen_ids: BTreeSet<&str> = BTreeSet::new();
        for set in &sets {
            for rule in &set.rules {
                validate_rule(set.standard, rule, vocabulary)?;
                if !seen_ids.insert(&rule.id) {
                    return Err(RuleLoadError::DuplicateRuleId {
                        rule_id: rule.id.clone(),
                    });
                }
            }
        }

        let mut rules = Vec::new();
        let mut by_id = HashMap::new();
        let mut class_index: HashMap<String, Vec<usize>> = HashMap::new();
        let mut always_considered = Vec::new();
        for set in sets {
            for rule in set.rules {
                let index = rules.len();
                match rule.condition.trigger_labels() {
                    Some(labels) => {
                        for label in labels {
                            class_index.entry(label.to_string()).or_default().push(index);
                        }
                    }
                    None => always_considered.push(index),
                }
                by_id.insert(rule.id.clone(), index);
                rules.push(LoadedRule {
                    standard: set.standard,
                    rule,
                });
            }
        }
        Ok(Self {
            rules,
            by_id,
            class_index,
            always_considered,
        })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn get(&self, index: usize) -> &LoadedRule {
        &self.rules[index]
    }

    pub fn by_id(&self, rule_id: &str) -> Option<&LoadedRule> {
        self.by_id.get(rule_id).map(|&index| &self.rules[index])
    }

    /// Rule indices worth evaluating for a frame containing the given class
    /// labels, in registry order with duplicates removed.
    pub fn candidate_rules<'a, I>(&self, labels: I) -> Vec<usize>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut candidates: BTreeSet<usize> = self.always_considered.iter().copied().collect();
        for label in labels {
            if let Some(indices) = self.class_index.get(label) {
                candidates.extend(indices.iter().copied());
            }
        }
        candidates.into_iter().collect()
    }
}

fn validate_rule(
    standard: Standard,
    rule: &Rule,
    vocabulary: &ClassVocabulary,
) -> Result<(), RuleLoadError> {
    let context = format!("{} rule '{}'", standard, rule.id);
    if rule.id.is_empty() {
        return Err(RuleLoadError::Schema {
            context: standard.to_string(),
            reason: "rule id must be non-empty".into(),
        });
    }
    if rule.citation.is_empty() {
        return Err(RuleLoadError::Schema {
            context,
            reason: "citation must be non-empty".into(),
        });
    }
    if rule.confirmation_window == 0 {
        return Err(RuleLoadError::Schema {
            context,
            reason: "confirmation_window must be at least 1".into(),
        });
    }
    rule.condition
        .validate()
        .map_err(|reason| RuleLoadError::Schema {
            context: context.clone(),
            reason,
        })?;
    // Every trigger must carry detection evidence, so a rule needs at least
    // one non-negated presence requirement to anchor on.
    if rule.condition.anchor_label().is_none() {
        return Err(RuleLoadError::Schema {
            context,
            reason: "condition has no non-negated class presence to anchor on".into(),
        });
    }
    let mut labels = BTreeSet::new();
    rule.condition.collect_labels(&mut labels);
    for label in labels {
        if !vocabulary.contains(label) {
            return Err(RuleLoadError::UnknownClassReference {
                rule_id: rule.id.clone(),
                label: label.to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hardhat_rule() -> Rule {
        serde_json::from_str(
            r#"{
                "id": "hardhat_missing_near_person",
                "citation": "29 CFR 1926.100",
                "confirmation_window": 3,
                "condition": {"and": [
                    {"class_present": {"label": "person", "min_confidence": 0.5}},
                    {"not": {"spatial_relation": {"anchor": "person", "target": "hardhat",
                        "relation": "within_distance", "threshold_px": 80.0}}}
                ]}
            }"#,
        )
        .unwrap()
    }

    fn spill_rule() -> Rule {
        serde_json::from_str(
            r#"{
                "id": "spill_uncontained",
                "citation": "40 CFR 112.7",
                "condition": {"class_present": {"label": "spill", "min_confidence": 0.4}}
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn builds_class_index_from_trigger_labels() {
        let registry = RuleRegistry::from_sets(
            vec![
                StandardRuleSet {
                    standard: Standard::Osha,
                    rules: vec![hardhat_rule()],
                },
                StandardRuleSet {
                    standard: Standard::Epa,
                    rules: vec![spill_rule()],
                },
            ],
            &ClassVocabulary::default(),
        )
        .unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.candidate_rules(["person"]), vec![0]);
        assert_eq!(registry.candidate_rules(["spill"]), vec![1]);
        assert_eq!(registry.candidate_rules(["person", "spill"]), vec![0, 1]);
        assert!(registry.candidate_rules(["forklift"]).is_empty());
        assert!(registry.by_id("spill_uncontained").is_some());
    }

    #[test]
    fn default_confirmation_window_is_one() {
        assert_eq!(spill_rule().confirmation_window, 1);
    }

    #[test]
    fn rejects_unknown_class_reference() {
        let mut rule = spill_rule();
        rule.condition = serde_json::from_str(
            r#"{"class_present": {"label": "jetpack", "min_confidence": 0.4}}"#,
        )
        .unwrap();
        let err = RuleRegistry::from_sets(
            vec![StandardRuleSet {
                standard: Standard::Epa,
                rules: vec![rule],
            }],
            &ClassVocabulary::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            RuleLoadError::UnknownClassReference { ref label, .. } if label == "jetpack"
        ));
    }

    #[test]
    fn rejects_duplicate_rule_ids_across_sets() {
        let err = RuleRegistry::from_sets(
            vec![
                StandardRuleSet {
                    standard: Standard::Osha,
                    rules: vec![spill_rule()],
                },
                StandardRuleSet {
                    standard: Standard::Epa,
                    rules: vec![spill_rule()],
                },
            ],
            &ClassVocabulary::default(),
        )
        .unwrap_err();
        assert!(matches!(err, RuleLoadError::DuplicateRuleId { .. }));
    }

    #[test]
    fn rejects_rule_without_presence_anchor() {
        let mut rule = spill_rule();
        rule.condition =
            serde_json::from_str(r#"{"class_absent": {"label": "guardrail"}}"#).unwrap();
        let err = RuleRegistry::from_sets(
            vec![StandardRuleSet {
                standard: Standard::Osha,
                rules: vec![rule],
            }],
            &ClassVocabulary::default(),
        )
        .unwrap_err();
        assert!(matches!(err, RuleLoadError::Schema { .. }));
    }

    #[test]
    fn zero_confirmation_window_is_a_schema_error() {
        let mut rule = spill_rule();
        rule.confirmation_window = 0;
        let err = RuleRegistry::from_sets(
            vec![StandardRuleSet {
                standard: Standard::Epa,
                rules: vec![rule],
            }],
            &ClassVocabulary::default(),
        )
        .unwrap_err();
        assert!(matches!(err, RuleLoadError::Schema { .. }));
    }
}
