mod condition;
mod registry;

pub use condition::{Condition, SpatialRelationKind};
pub use registry::{
    ClassVocabulary, LoadedRule, Rule, RuleLoadError, RuleRegistry, Severity, Standard,
    StandardRuleSet,
};
