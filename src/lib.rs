//! Compliance Vision Kernel
//!
//! Turns raw, noisy per-frame object detections into a small, stable set of
//! cited regulatory violations.
//!
//! # Architecture
//!
//! - `detect`: wire types and the Detection Normalizer (validate, clamp,
//!   apply the confidence floor).
//! - `rules`: declarative condition grammar and the Rule Registry (one JSON
//!   file per standard, all-or-nothing load, class-indexed).
//! - `engine`: per-frame Condition Evaluator, the Temporal Aggregator
//!   (Candidate -> Confirmed -> expired, cross-frame spatial matching), and
//!   the frame-ordered `Session`.
//! - `report`: confirmed violations with citations as a JSON document.
//!
//! # Invariants
//!
//! 1. The registry is fully validated before any evaluation; there is no
//!    partially loaded rule set.
//! 2. Every Violation carries at least one evidence detection that met its
//!    rule's confidence bound.
//! 3. An open entry confirms exactly once (monotonic, no un-confirming) and
//!    an ongoing hazard is never re-reported within one lifecycle.
//! 4. The registry is immutable and shared; all mutable state lives in
//!    per-session aggregators fed frames in arrival order.

pub mod config;
pub mod detect;
pub mod engine;
pub mod report;
pub mod rules;

pub use config::EngineConfig;
pub use detect::{BoundingBox, Detection, FrameDetections, RawDetection};
pub use engine::{CandidateTrigger, FrameError, Session, Violation};
pub use report::Report;
pub use rules::{ClassVocabulary, Rule, RuleLoadError, RuleRegistry, Standard, StandardRuleSet};
