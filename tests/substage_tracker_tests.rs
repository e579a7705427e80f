//! Integration tests for substage queries and the event-driven tracker

use std::sync::Arc;

use adw_progress::substages::machine;
use adw_progress::{
    Stage, SubstageCatalog, SubstageEvent, SubstageStatus, SubstageTracker, TrackerPhase,
};
use statig::prelude::*;

#[test]
fn test_documented_substage_answers() {
    assert!(machine::is_valid_transition("plan", "analyze", "breakdown"));
    assert!(!machine::is_valid_transition("plan", "breakdown", "analyze"));
    assert!(!machine::is_valid_transition("plan", "analyze", "analyze"));
    assert_eq!(machine::stage_progress("build", "setup"), 33);
    assert!(machine::next_substage("plan", "breakdown").is_none());
    assert_eq!(
        machine::log_event("build", "implement", SubstageStatus::Completed, None).progress,
        100
    );
}

#[test]
fn test_unknown_inputs_degrade_to_neutral_values() {
    assert!(machine::substages_of("deploy").is_empty());
    assert!(machine::substage("plan", "ship").is_none());
    assert!(machine::next_substage("deploy", "analyze").is_none());
    assert!(!machine::can_skip("plan", "ship"));
    assert_eq!(machine::stage_progress("deploy", "analyze"), 0);
    assert!(!machine::is_valid_transition("deploy", "a", "b"));
}

#[test]
fn test_every_stage_walks_its_default_path_to_completion() {
    let catalog = Arc::new(SubstageCatalog::default_tables());

    for stage in Stage::all() {
        let mut sm = SubstageTracker::with_catalog(stage.as_str(), Arc::clone(&catalog))
            .state_machine();
        let mut current = catalog.substages_of(stage.as_str()).first().cloned();
        let mut last_progress = 0;

        while let Some(substage) = current {
            sm.handle(&SubstageEvent::start(&substage.id));
            assert!(sm.inner().progress() > last_progress);
            last_progress = sm.inner().progress();
            sm.handle(&SubstageEvent::complete(&substage.id));
            current = catalog.next_substage(stage.as_str(), &substage.id).cloned();
        }

        assert_eq!(sm.inner().phase(), TrackerPhase::StageComplete, "{stage}");
        assert_eq!(sm.inner().progress(), 100);
        assert!(sm
            .inner()
            .log()
            .iter()
            .all(|entry| entry.stage.as_str() == stage.as_str()));
    }
}

#[test]
fn test_tracker_log_entries_carry_status_progress() {
    let mut sm = SubstageTracker::new("test").state_machine();
    sm.handle(&SubstageEvent::skip("setup"));
    sm.handle(&SubstageEvent::start("unit"));
    sm.handle(&SubstageEvent::complete("unit"));

    let log = sm.inner().log();
    let summary: Vec<_> = log
        .iter()
        .map(|entry| (entry.status, entry.progress, entry.message.as_str()))
        .collect();
    assert_eq!(
        summary,
        vec![
            (SubstageStatus::Skipped, 0, "Skipped Test Setup"),
            (SubstageStatus::Started, 10, "Started Unit Tests"),
            (SubstageStatus::Completed, 100, "Completed Unit Tests"),
        ]
    );
}

#[test]
fn test_tracker_never_regresses() {
    let mut sm = SubstageTracker::new("review").state_machine();
    sm.handle(&SubstageEvent::start("analyze"));
    sm.handle(&SubstageEvent::complete("analyze"));
    sm.handle(&SubstageEvent::start("feedback"));
    sm.handle(&SubstageEvent::complete("feedback"));
    assert!(sm.inner().is_stage_complete());

    let before = sm.inner().log().len();
    sm.handle(&SubstageEvent::start("quality"));
    assert_eq!(sm.inner().log().len(), before);
    assert!(sm.inner().last_rejection().is_some());
    assert!(sm.inner().is_stage_complete());
}

#[test]
fn test_log_entry_serializes_for_persistence_layer() {
    let entry = machine::log_event("pr", "create", SubstageStatus::Started, None);
    let json = serde_json::to_value(&entry).unwrap();
    assert_eq!(json["stage"], "pr");
    assert_eq!(json["substageId"], "create");
    assert_eq!(json["substageName"], "Create Pull Request");
    assert_eq!(json["status"], "started");
    assert_eq!(json["progress"], 10);
    assert!(json["timestamp"].is_string());
}
