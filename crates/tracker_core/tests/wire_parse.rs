use std::sync::Once;

use pretty_assertions::assert_eq;
use tracker_core::{
    encode_snapshot, parse_message, MessageKind, OutboundMessage, ParseError, QualityIssue,
    StepStatus,
};

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(tracker_logging::initialize_for_tests);
}

const FULL_MESSAGE: &str = r#"{
    "type": "progress_update",
    "task_id": "task-42",
    "sequence": 7,
    "overall_progress": 40.5,
    "current_step": "parse",
    "elapsed_time_ms": 1200,
    "steps": [
        { "id": "upload", "name": "Upload", "status": "completed", "progress": 100,
          "start_time": 1000, "end_time": 1800 },
        { "id": "parse", "name": "Parse", "status": "running", "progress": 20,
          "substeps": [
            { "id": "parse.pages", "name": "Pages", "status": "running", "progress": 35 },
            { "id": "parse.tables", "name": "Tables", "status": "pending", "progress": 0 }
          ] },
        { "id": "analyze", "name": "Analyze", "status": "pending", "progress": 0 }
    ],
    "unexpected_field": true
}"#;

#[test]
fn parses_full_progress_message() {
    init_logging();
    let model = parse_message(FULL_MESSAGE).expect("valid message");

    assert_eq!(model.task_id, "task-42");
    assert_eq!(model.kind, Some(MessageKind::ProgressUpdate));
    assert_eq!(model.sequence, 7.0);
    assert_eq!(model.overall_progress, 40.5);
    assert_eq!(model.current_step.as_deref(), Some("parse"));
    assert_eq!(model.elapsed_time_ms, 1200.0);

    let ids: Vec<_> = model.steps.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["upload", "parse", "analyze"]);

    let upload = model.step("upload").unwrap();
    assert_eq!(upload.status, StepStatus::Completed);
    assert_eq!(upload.start_time, Some(1000.0));
    assert_eq!(upload.end_time, Some(1800.0));

    let parse = model.running_step().unwrap();
    assert_eq!(parse.id, "parse");
    assert_eq!(parse.substeps.len(), 2);
    assert_eq!(parse.substeps[0].progress, 35.0);
    assert!(model.quality_issues().is_empty());
}

#[test]
fn accepts_fractional_timestamps() {
    init_logging();
    let raw = r#"{"type":"progress_update","task_id":"t","sequence":1700000000.25,
        "overall_progress":12.5,"elapsed_time_ms":1500.5,"steps":[
            {"id":"a","name":"A","status":"running","progress":12.5,
             "start_time":1700000000.5,
             "substeps":[{"id":"a.1","name":"A1","status":"completed","progress":100,
                          "start_time":1700000000.5,"end_time":1700000001.75,"duration_ms":1250.0}]}]}"#;
    let model = parse_message(raw).expect("fractional numbers are valid");

    assert_eq!(model.sequence, 1_700_000_000.25);
    assert_eq!(model.elapsed_time_ms, 1500.5);
    assert_eq!(model.steps[0].start_time, Some(1_700_000_000.5));
    assert_eq!(model.steps[0].substeps[0].end_time, Some(1_700_000_001.75));
    assert_eq!(model.steps[0].substeps[0].duration_ms, Some(1250.0));
}

#[test]
fn rejects_negative_sequence_and_times() {
    init_logging();
    let negative_sequence = r#"{"type":"progress_update","task_id":"t","sequence":-1,"overall_progress":1,"elapsed_time_ms":0}"#;
    assert!(matches!(parse_message(negative_sequence), Err(ParseError::Invalid(_))));

    let negative_elapsed = r#"{"type":"progress_update","task_id":"t","sequence":1,"overall_progress":1,"elapsed_time_ms":-0.5}"#;
    assert!(matches!(parse_message(negative_elapsed), Err(ParseError::Invalid(_))));

    let negative_start = r#"{"type":"progress_update","task_id":"t","sequence":1,"overall_progress":1,
        "elapsed_time_ms":0,"steps":[{"id":"a","name":"A","status":"running","progress":1,"start_time":-3}]}"#;
    assert!(matches!(parse_message(negative_start), Err(ParseError::Invalid(_))));
}

#[test]
fn error_message_carries_task_failure() {
    init_logging();
    let raw = r#"{"type":"error","task_id":"t","sequence":3,"overall_progress":10,
        "elapsed_time_ms":50,"error":"parser crashed",
        "steps":[{"id":"parse","name":"Parse","status":"error","progress":10}]}"#;
    let model = parse_message(raw).unwrap();

    assert_eq!(model.kind, Some(MessageKind::Error));
    assert_eq!(model.error.as_deref(), Some("parser crashed"));
    assert!(model.is_failed());
    assert!(!model.is_complete());
}

#[test]
fn rejects_malformed_json() {
    init_logging();
    let err = parse_message("{not json").unwrap_err();
    assert!(matches!(err, ParseError::Json(_)));
}

#[test]
fn rejects_schema_mismatch() {
    init_logging();
    let missing_sequence = r#"{"type":"progress_update","task_id":"t","overall_progress":1,"elapsed_time_ms":0,"steps":[]}"#;
    assert!(matches!(
        parse_message(missing_sequence),
        Err(ParseError::Json(_))
    ));

    let unknown_type = r#"{"type":"bogus","task_id":"t","sequence":1,"overall_progress":1,"elapsed_time_ms":0,"steps":[]}"#;
    assert!(parse_message(unknown_type).is_err());

    let bad_status = r#"{"type":"progress_update","task_id":"t","sequence":1,"overall_progress":1,
        "elapsed_time_ms":0,"steps":[{"id":"a","name":"A","status":"paused","progress":0}]}"#;
    assert!(parse_message(bad_status).is_err());

    let bad_substep_status = r#"{"type":"progress_update","task_id":"t","sequence":1,"overall_progress":1,
        "elapsed_time_ms":0,"steps":[{"id":"a","name":"A","status":"running","progress":0,
        "substeps":[{"id":"a.1","name":"A1","status":"skipped","progress":0}]}]}"#;
    assert!(matches!(parse_message(bad_substep_status), Err(ParseError::Json(_))));
}

#[test]
fn rejects_out_of_range_and_duplicate_steps() {
    init_logging();
    let over = r#"{"type":"progress_update","task_id":"t","sequence":1,"overall_progress":101,"elapsed_time_ms":0,"steps":[]}"#;
    assert!(matches!(parse_message(over), Err(ParseError::Invalid(_))));

    let negative_step = r#"{"type":"progress_update","task_id":"t","sequence":1,"overall_progress":1,
        "elapsed_time_ms":0,"steps":[{"id":"a","name":"A","status":"running","progress":-5}]}"#;
    assert!(matches!(parse_message(negative_step), Err(ParseError::Invalid(_))));

    let duplicate = r#"{"type":"progress_update","task_id":"t","sequence":1,"overall_progress":1,
        "elapsed_time_ms":0,"steps":[
            {"id":"a","name":"A","status":"running","progress":5},
            {"id":"a","name":"A again","status":"pending","progress":0}]}"#;
    assert!(matches!(parse_message(duplicate), Err(ParseError::Invalid(_))));

    let blank_task = r#"{"type":"progress_update","task_id":" ","sequence":1,"overall_progress":1,"elapsed_time_ms":0}"#;
    assert!(matches!(parse_message(blank_task), Err(ParseError::Invalid(_))));
}

#[test]
fn inconsistent_statuses_are_reported_not_rejected() {
    init_logging();
    let raw = r#"{"type":"progress_update","task_id":"t","sequence":1,"overall_progress":30,
        "current_step":"ghost","elapsed_time_ms":0,"steps":[
            {"id":"a","name":"A","status":"completed","progress":90},
            {"id":"b","name":"B","status":"running","progress":10},
            {"id":"c","name":"C","status":"running","progress":10},
            {"id":"d","name":"D","status":"pending","progress":5}]}"#;
    let model = parse_message(raw).expect("quality problems are not parse errors");

    assert_eq!(model.steps[0].progress, 90.0);
    assert_eq!(
        model.quality_issues(),
        vec![
            QualityIssue::MultipleRunning {
                step_ids: vec!["b".to_string(), "c".to_string()]
            },
            QualityIssue::CompletedBelowFull {
                step_id: "a".to_string(),
                progress: 90.0
            },
            QualityIssue::PendingWithProgress {
                step_id: "d".to_string(),
                progress: 5.0
            },
            QualityIssue::UnknownCurrentStep {
                step_id: "ghost".to_string()
            },
        ]
    );
}

#[test]
fn encoded_snapshot_parses_back() {
    init_logging();
    let model = parse_message(FULL_MESSAGE).unwrap();
    let encoded = encode_snapshot(&model).unwrap();
    assert_eq!(parse_message(&encoded).unwrap(), model);

    assert!(encode_snapshot(&tracker_core::ProgressModel::empty("t")).is_err());
}

#[test]
fn request_status_wire_shape() {
    init_logging();
    let json = OutboundMessage::request_status("task-9").to_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(
        value,
        serde_json::json!({ "type": "request_status", "task_id": "task-9" })
    );
}
