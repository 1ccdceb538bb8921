use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::rules::ClassVocabulary;

const DEFAULT_CONFIDENCE_FLOOR: f32 = 0.25;
const DEFAULT_GRACE_FRAMES: u32 = 2;
const DEFAULT_MATCH_RADIUS_PX: f32 = 60.0;
const DEFAULT_STANDARDS_DIR: &str = "standards";

#[derive(Debug, Deserialize, Default)]
struct EngineConfigFile {
    confidence_floor: Option<f32>,
    grace_frames: Option<u32>,
    match_radius_px: Option<f32>,
    standards_dir: Option<PathBuf>,
    max_frame_lag_ms: Option<u64>,
    extra_classes: Option<Vec<String>>,
}

/// Engine tuning knobs, loaded from an optional JSON config file named by
/// `COMPLIANCE_CONFIG` with per-field env overrides.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Global detection-confidence floor applied by the normalizer.
    pub confidence_floor: f32,
    /// Frames an open entry may go unmatched before it expires.
    pub grace_frames: u32,
    /// Cross-frame identity radius: a trigger matches an open entry whose
    /// last centroid lies within this distance.
    pub match_radius_px: f32,
    /// Directory of per-standard rule files.
    pub standards_dir: PathBuf,
    /// Reject frames whose timestamp lags the newest accepted frame by more
    /// than this. `None` disables the staleness check.
    pub max_frame_lag_ms: Option<u64>,
    /// Extra detector class labels beyond the stock vocabulary.
    pub extra_classes: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            confidence_floor: DEFAULT_CONFIDENCE_FLOOR,
            grace_frames: DEFAULT_GRACE_FRAMES,
            match_radius_px: DEFAULT_MATCH_RADIUS_PX,
            standards_dir: PathBuf::from(DEFAULT_STANDARDS_DIR),
            max_frame_lag_ms: None,
            extra_classes: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("COMPLIANCE_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: EngineConfigFile) -> Self {
        let defaults = Self::default();
        Self {
            confidence_floor: file.confidence_floor.unwrap_or(defaults.confidence_floor),
            grace_frames: file.grace_frames.unwrap_or(defaults.grace_frames),
            match_radius_px: file.match_radius_px.unwrap_or(defaults.match_radius_px),
            standards_dir: file.standards_dir.unwrap_or(defaults.standards_dir),
            max_frame_lag_ms: file.max_frame_lag_ms,
            extra_classes: file.extra_classes.unwrap_or_default(),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(raw) = std::env::var("COMPLIANCE_CONFIDENCE_FLOOR") {
            self.confidence_floor = raw
                .parse()
                .map_err(|_| anyhow!("COMPLIANCE_CONFIDENCE_FLOOR must be a number"))?;
        }
        if let Ok(raw) = std::env::var("COMPLIANCE_GRACE_FRAMES") {
            self.grace_frames = raw
                .parse()
                .map_err(|_| anyhow!("COMPLIANCE_GRACE_FRAMES must be an integer"))?;
        }
        if let Ok(raw) = std::env::var("COMPLIANCE_MATCH_RADIUS_PX") {
            self.match_radius_px = raw
                .parse()
                .map_err(|_| anyhow!("COMPLIANCE_MATCH_RADIUS_PX must be a number"))?;
        }
        if let Ok(raw) = std::env::var("COMPLIANCE_STANDARDS_DIR") {
            self.standards_dir = PathBuf::from(raw);
        }
        if let Ok(raw) = std::env::var("COMPLIANCE_MAX_FRAME_LAG_MS") {
            self.max_frame_lag_ms = Some(
                raw.parse()
                    .map_err(|_| anyhow!("COMPLIANCE_MAX_FRAME_LAG_MS must be an integer"))?,
            );
        }
        if let Ok(raw) = std::env::var("COMPLIANCE_EXTRA_CLASSES") {
            self.extra_classes = split_csv(&raw);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence_floor) {
            return Err(anyhow!(
                "confidence_floor {} outside [0,1]",
                self.confidence_floor
            ));
        }
        if self.match_radius_px <= 0.0 {
            return Err(anyhow!(
                "match_radius_px {} must be positive",
                self.match_radius_px
            ));
        }
        Ok(())
    }

    /// Stock class vocabulary extended with the configured extra labels.
    pub fn vocabulary(&self) -> ClassVocabulary {
        let mut vocabulary = ClassVocabulary::default();
        vocabulary.extend(self.extra_classes.iter().cloned());
        vocabulary
    }
}

fn read_config_file(path: &Path) -> Result<EngineConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}
