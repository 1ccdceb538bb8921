use std::sync::Arc;

use compliance_kernel::{
    ClassVocabulary, EngineConfig, FrameDetections, RawDetection, RuleRegistry, Session,
    StandardRuleSet,
};

fn hardhat_registry() -> Arc<RuleRegistry> {
    let set: StandardRuleSet = serde_json::from_str(
        r#"{"standard": "OSHA", "rules": [{
            "id": "hardhat_missing_near_person",
            "citation": "29 CFR 1926.100",
            "description": "Head protection required",
            "severity": "high",
            "confirmation_window": 3,
            "condition": {"and": [
                {"class_present": {"label": "person", "min_confidence": 0.5}},
                {"not": {"spatial_relation": {"anchor": "person", "target": "hardhat",
                    "relation": "within_distance", "threshold_px": 80.0}}}
            ]}
        }]}"#,
    )
    .expect("rule set");
    Arc::new(RuleRegistry::from_sets(vec![set], &ClassVocabulary::default()).expect("registry"))
}

fn frame(frame_id: u64, entries: &[(&str, f32, f32, f32)]) -> FrameDetections {
    FrameDetections {
        frame_id,
        timestamp_ms: frame_id * 100,
        detections: entries
            .iter()
            .map(|&(label, confidence, x, y)| RawDetection {
                class_label: label.to_string(),
                confidence,
                bbox: [x, y, 40.0, 90.0].into(),
            })
            .collect(),
    }
}

fn session() -> Session {
    Session::new(hardhat_registry(), EngineConfig::default())
}

#[test]
fn scenario_a_three_frames_confirm_exactly_one_violation() {
    let mut session = session();
    for frame_id in 1..=2 {
        let confirmed = session
            .process_frame(&frame(frame_id, &[("person", 0.9, 100.0, 50.0)]))
            .unwrap();
        assert!(confirmed.is_empty(), "frame {} confirmed early", frame_id);
    }
    let confirmed = session
        .process_frame(&frame(3, &[("person", 0.9, 100.0, 50.0)]))
        .unwrap();
    assert_eq!(confirmed.len(), 1);
    assert_eq!(confirmed[0].citation, "29 CFR 1926.100");
    assert_eq!(confirmed[0].confidence, 0.9);
    assert_eq!(confirmed[0].first_seen.frame_id, 1);
    assert!(!confirmed[0].evidence.is_empty());
}

#[test]
fn scenario_b_persisting_hazard_reports_once() {
    let mut session = session();
    for frame_id in 1..=10 {
        session
            .process_frame(&frame(frame_id, &[("person", 0.9, 100.0, 50.0)]))
            .unwrap();
    }
    assert_eq!(session.violations().len(), 1);
}

#[test]
fn scenario_c_hardhat_appearing_cancels_candidate() {
    let mut session = session();
    session
        .process_frame(&frame(1, &[("person", 0.9, 100.0, 50.0)]))
        .unwrap();
    // Hardhat shows up within range from frame 2 on; candidate goes
    // unmatched and expires after the grace period without confirming.
    for frame_id in 2..=6 {
        session
            .process_frame(&frame(
                frame_id,
                &[("person", 0.9, 100.0, 50.0), ("hardhat", 0.8, 110.0, 30.0)],
            ))
            .unwrap();
    }
    assert!(session.violations().is_empty());
    assert_eq!(session.open_entries(), 0);
}

#[test]
fn scenario_d_low_confidence_detection_never_triggers() {
    let mut session = session();
    for frame_id in 1..=5 {
        session
            .process_frame(&frame(frame_id, &[("person", 0.3, 100.0, 50.0)]))
            .unwrap();
    }
    assert!(session.violations().is_empty());
    assert_eq!(session.open_entries(), 0);
}

#[test]
fn two_anchors_yield_two_independent_violations() {
    let mut session = session();
    for frame_id in 1..=3 {
        session
            .process_frame(&frame(
                frame_id,
                &[("person", 0.9, 100.0, 50.0), ("person", 0.8, 500.0, 50.0)],
            ))
            .unwrap();
    }
    assert_eq!(session.violations().len(), 2);
}

#[test]
fn moving_anchor_within_radius_keeps_identity() {
    let mut session = session();
    // Drifts ~15 px per frame, well inside the 60 px match radius.
    for (frame_id, x) in [(1u64, 100.0f32), (2, 115.0), (3, 130.0)] {
        session
            .process_frame(&frame(frame_id, &[("person", 0.9, x, 50.0)]))
            .unwrap();
    }
    assert_eq!(session.violations().len(), 1);
}

#[test]
fn expiry_then_reappearance_is_a_new_violation_instance() {
    let mut session = session();
    for frame_id in 1..=3 {
        session
            .process_frame(&frame(frame_id, &[("person", 0.9, 100.0, 50.0)]))
            .unwrap();
    }
    assert_eq!(session.violations().len(), 1);
    // Absent long past the grace period (default 2 frames).
    for frame_id in 4..=8 {
        session.process_frame(&frame(frame_id, &[])).unwrap();
    }
    assert_eq!(session.open_entries(), 0);
    for frame_id in 9..=11 {
        session
            .process_frame(&frame(frame_id, &[("person", 0.9, 100.0, 50.0)]))
            .unwrap();
    }
    assert_eq!(session.violations().len(), 2);
}

#[test]
fn processing_is_deterministic_across_sessions() {
    let frames: Vec<FrameDetections> = (1..=6)
        .map(|frame_id| {
            frame(
                frame_id,
                &[("person", 0.9, 100.0, 50.0), ("person", 0.7, 400.0, 80.0)],
            )
        })
        .collect();
    let run = || {
        let mut session = session();
        for f in &frames {
            session.process_frame(f).unwrap();
        }
        serde_json::to_string(&session.finish()).unwrap()
    };
    assert_eq!(run(), run());
}

#[test]
fn out_of_order_frame_is_rejected_and_session_stays_usable() {
    let mut session = session();
    session
        .process_frame(&frame(5, &[("person", 0.9, 100.0, 50.0)]))
        .unwrap();
    let err = session
        .process_frame(&frame(4, &[("person", 0.9, 100.0, 50.0)]))
        .unwrap_err();
    assert!(err.to_string().contains("out of order"));
    // The rejected frame did not advance aggregator state.
    session
        .process_frame(&frame(6, &[("person", 0.9, 100.0, 50.0)]))
        .unwrap();
    let confirmed = session
        .process_frame(&frame(7, &[("person", 0.9, 100.0, 50.0)]))
        .unwrap();
    assert_eq!(confirmed.len(), 1);
}

#[test]
fn stale_frame_is_rejected_when_lag_limit_set() {
    let config = EngineConfig {
        max_frame_lag_ms: Some(250),
        ..EngineConfig::default()
    };
    let mut session = Session::new(hardhat_registry(), config);
    session
        .process_frame(&frame(10, &[("person", 0.9, 100.0, 50.0)]))
        .unwrap();
    // frame 11 but with a timestamp 900ms behind frame 10's.
    let mut stale = frame(11, &[("person", 0.9, 100.0, 50.0)]);
    stale.timestamp_ms = 100;
    let err = session.process_frame(&stale).unwrap_err();
    assert!(err.to_string().contains("stale"));
}

#[test]
fn malformed_detection_entry_does_not_fail_the_frame() {
    let mut session = session();
    for frame_id in 1..=3 {
        let mut f = frame(frame_id, &[("person", 0.9, 100.0, 50.0)]);
        f.detections.push(RawDetection {
            class_label: "person".to_string(),
            confidence: 1.7,
            bbox: [0.0, 0.0, 10.0, 10.0].into(),
        });
        f.detections.push(RawDetection {
            class_label: "forklift".to_string(),
            confidence: 0.8,
            bbox: [0.0, 0.0, -5.0, 10.0].into(),
        });
        session.process_frame(&f).unwrap();
    }
    assert_eq!(session.violations().len(), 1);
}

#[test]
fn finish_produces_report_with_all_confirmed_violations() {
    let mut session = session();
    for frame_id in 1..=3 {
        session
            .process_frame(&frame(frame_id, &[("person", 0.91, 100.0, 50.0)]))
            .unwrap();
    }
    let report = session.finish();
    assert_eq!(report.violations.len(), 1);
    let summary = report.summary();
    assert!(summary.contains("OSHA 29 CFR 1926.100"));
    assert!(summary.contains("0.91"));
}
