use std::sync::Mutex;

use compliance_kernel::EngineConfig;
use tempfile::NamedTempFile;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "COMPLIANCE_CONFIG",
        "COMPLIANCE_CONFIDENCE_FLOOR",
        "COMPLIANCE_GRACE_FRAMES",
        "COMPLIANCE_MATCH_RADIUS_PX",
        "COMPLIANCE_STANDARDS_DIR",
        "COMPLIANCE_MAX_FRAME_LAG_MS",
        "COMPLIANCE_EXTRA_CLASSES",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn defaults_apply_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = EngineConfig::load().expect("load config");
    assert_eq!(cfg.confidence_floor, 0.25);
    assert_eq!(cfg.grace_frames, 2);
    assert_eq!(cfg.match_radius_px, 60.0);
    assert_eq!(cfg.standards_dir.to_str(), Some("standards"));
    assert_eq!(cfg.max_frame_lag_ms, None);
    assert!(cfg.extra_classes.is_empty());

    clear_env();
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "confidence_floor": 0.4,
        "grace_frames": 5,
        "match_radius_px": 90.0,
        "standards_dir": "site_rules",
        "max_frame_lag_ms": 500,
        "extra_classes": ["crane"]
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("COMPLIANCE_CONFIG", file.path());
    std::env::set_var("COMPLIANCE_GRACE_FRAMES", "7");
    std::env::set_var("COMPLIANCE_EXTRA_CLASSES", "crane, scaffold");

    let cfg = EngineConfig::load().expect("load config");
    assert_eq!(cfg.confidence_floor, 0.4);
    assert_eq!(cfg.grace_frames, 7);
    assert_eq!(cfg.match_radius_px, 90.0);
    assert_eq!(cfg.standards_dir.to_str(), Some("site_rules"));
    assert_eq!(cfg.max_frame_lag_ms, Some(500));
    assert_eq!(cfg.extra_classes, vec!["crane", "scaffold"]);

    let vocabulary = cfg.vocabulary();
    assert!(vocabulary.contains("scaffold"));
    assert!(vocabulary.contains("person"));

    clear_env();
}

#[test]
fn rejects_out_of_range_confidence_floor() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("COMPLIANCE_CONFIDENCE_FLOOR", "1.5");
    let err = EngineConfig::load().unwrap_err();
    assert!(err.to_string().contains("confidence_floor"));

    clear_env();
}
