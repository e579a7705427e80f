use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::{json, Value};
use statig::prelude::*;

use adw_progress::substages::machine;
use adw_progress::{
    catalog, config, create_progress_span, generate_correlation_id, init_config, init_telemetry,
    ProgressSnapshot, StageKey, SubstageCatalog, SubstageEvent, SubstageStatus, SubstageTracker,
    WorkflowIdentifier,
};

#[derive(Parser)]
#[command(name = "adw-progress")]
#[command(about = "Decode ADW workflow names and report stage and substage progress")]
#[command(long_about = "adw-progress turns workflow identifiers such as adw_plan_build_test_iso \
                       into ordered stages, reports how far a task has progressed through them, \
                       and walks the substeps inside each stage. All output is JSON on stdout.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a workflow identifier into its stages
    Decode {
        /// Workflow identifier, e.g. adw_plan_build_iso
        identifier: String,
    },
    /// Report stage-level progress for a task
    Progress {
        /// Workflow identifier of the task
        identifier: String,
        /// Stage the task is currently in
        current_stage: String,
    },
    /// List the substages of a stage
    Substages {
        /// Stage name (plan, build, test, review, document, pr, errored)
        stage: String,
        /// Current substage id, to include intra-stage progress
        #[arg(long, help = "Substage id the stage is currently in")]
        current: Option<String>,
    },
    /// Check whether a substage jump is allowed
    Transition {
        stage: String,
        from: String,
        to: String,
    },
    /// Build a substage log entry
    LogEvent {
        stage: String,
        substage: String,
        /// pending, started, completed, failed, or skipped
        status: String,
        #[arg(long, help = "Message to record instead of the generated one")]
        message: Option<String>,
    },
    /// Drive a stage through substage events and print the resulting log
    Replay {
        stage: String,
        /// Events: start:<id>, complete:<id>, skip:<id>, fail:<id>[:reason], reset
        #[arg(required = true)]
        events: Vec<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_telemetry(&config()?.logging)?;
    init_config()?;

    match cli.command {
        Commands::Decode { identifier } => decode_command(&identifier),
        Commands::Progress {
            identifier,
            current_stage,
        } => progress_command(&identifier, &current_stage),
        Commands::Substages { stage, current } => substages_command(&stage, current.as_deref()),
        Commands::Transition { stage, from, to } => transition_command(&stage, &from, &to),
        Commands::LogEvent {
            stage,
            substage,
            status,
            message,
        } => log_event_command(&stage, &substage, &status, message.as_deref()),
        Commands::Replay { stage, events } => replay_command(&stage, &events),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn decode_command(identifier: &str) -> Result<()> {
    let identifier = WorkflowIdentifier::new(identifier);
    let _span = create_progress_span("decode", Some(identifier.as_str()), None, None).entered();

    let stages = identifier.stages();
    if stages.is_empty() {
        tracing::warn!(identifier = %identifier, "Workflow identifier decoded to no stages");
    }

    print_json(&json!({
        "identifier": identifier,
        "stages": stages,
        "valid": identifier.is_valid(),
        "displayName": identifier.display_name(),
    }))
}

fn progress_command(identifier: &str, current_stage: &str) -> Result<()> {
    let identifier = WorkflowIdentifier::new(identifier);
    let _span = create_progress_span(
        "progress",
        Some(identifier.as_str()),
        Some(current_stage),
        None,
    )
    .entered();

    let stages = identifier.stages();
    let snapshot = ProgressSnapshot::evaluate(&stages, current_stage);

    print_json(&json!({
        "identifier": identifier,
        "stages": stages,
        "progress": snapshot,
    }))
}

fn substages_command(stage: &str, current: Option<&str>) -> Result<()> {
    print_json(&substages_report(&catalog(), stage, current))
}

fn substages_report(catalog: &SubstageCatalog, stage: &str, current: Option<&str>) -> Value {
    let substages: Vec<_> = catalog
        .substages_of(stage)
        .iter()
        .map(|substage| {
            json!({
                "substage": substage,
                "next": catalog.next_substage(stage, &substage.id).map(|next| &next.id),
                "canSkip": catalog.can_skip(stage, &substage.id),
            })
        })
        .collect();

    json!({
        "stage": StageKey::new(stage),
        "substages": substages,
        "current": current,
        "stageProgress": current.map(|id| catalog.stage_progress(stage, id)),
    })
}

fn transition_command(stage: &str, from: &str, to: &str) -> Result<()> {
    print_json(&transition_report(&catalog(), stage, from, to))
}

/// Every field is read from the same catalog snapshot
fn transition_report(catalog: &SubstageCatalog, stage: &str, from: &str, to: &str) -> Value {
    let default_next = catalog.next_substage(stage, from).map(|substage| substage.id.as_str());
    let is_default_path = default_next == Some(to);

    json!({
        "stage": StageKey::new(stage),
        "from": from,
        "to": to,
        "valid": catalog.is_valid_transition(stage, from, to),
        "defaultNext": default_next,
        "isDefaultPath": is_default_path,
        "toCanSkip": catalog.can_skip(stage, to),
    })
}

fn log_event_command(stage: &str, substage: &str, status: &str, message: Option<&str>) -> Result<()> {
    let status = SubstageStatus::parse(status)
        .ok_or_else(|| anyhow!("Unknown substage status '{}'", status))?;
    print_json(&machine::log_event(stage, substage, status, message))
}

fn parse_event(raw: &str) -> Result<SubstageEvent> {
    let mut parts = raw.splitn(3, ':');
    let kind = parts.next().unwrap_or_default();
    let id = parts.next();
    let extra = parts.next();

    let event = match (kind, id) {
        ("reset", None) => SubstageEvent::Reset,
        ("start", Some(id)) => SubstageEvent::start(id),
        ("complete", Some(id)) => SubstageEvent::complete(id),
        ("skip", Some(id)) => SubstageEvent::skip(id),
        ("fail", Some(id)) => SubstageEvent::fail(id, extra),
        _ => bail!("Cannot parse substage event '{}'", raw),
    };
    Ok(event)
}

fn replay_command(stage: &str, raw_events: &[String]) -> Result<()> {
    let correlation_id = generate_correlation_id();
    let _span = create_progress_span("replay", None, Some(stage), Some(&correlation_id)).entered();

    let events = raw_events
        .iter()
        .map(|raw| parse_event(raw))
        .collect::<Result<Vec<_>>>()?;

    let mut tracker = SubstageTracker::new(stage).state_machine();
    let mut rejections = Vec::new();
    for (index, event) in events.iter().enumerate() {
        tracker.handle(event);
        if let Some(rejection) = tracker.inner().last_rejection() {
            rejections.push(json!({
                "event": raw_events[index],
                "reason": rejection.to_string(),
            }));
        }
    }

    let context = tracker.inner();
    print_json(&json!({
        "stage": context.stage(),
        "correlationId": correlation_id,
        "phase": context.phase(),
        "progress": context.progress(),
        "activeSubstage": context.active_id(),
        "log": context.log(),
        "rejections": rejections,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_event() {
        assert_eq!(parse_event("start:setup").unwrap(), SubstageEvent::start("setup"));
        assert_eq!(parse_event("reset").unwrap(), SubstageEvent::Reset);
        assert_eq!(
            parse_event("fail:unit:3 tests failed").unwrap(),
            SubstageEvent::fail("unit", Some("3 tests failed"))
        );
        assert_eq!(parse_event("fail:unit").unwrap(), SubstageEvent::fail("unit", None));
        assert!(parse_event("start").is_err());
        assert!(parse_event("launch:setup").is_err());
    }

    #[test]
    fn test_transition_report_normalizes_stage() {
        let catalog = SubstageCatalog::default_tables();
        let report = transition_report(&catalog, "BUILD", "setup", "implement");
        assert_eq!(report["stage"], "build");
        assert_eq!(report["valid"], true);
        assert_eq!(report["defaultNext"], "implement");
        assert_eq!(report["isDefaultPath"], true);
        assert_eq!(report["toCanSkip"], false);

        let backward = transition_report(&catalog, "Build", "verify", "setup");
        assert_eq!(backward["stage"], "build");
        assert_eq!(backward["valid"], false);
        assert_eq!(backward["defaultNext"], Value::Null);
    }

    #[test]
    fn test_substages_report_normalizes_stage() {
        let catalog = SubstageCatalog::default_tables();
        let report = substages_report(&catalog, "Test", Some("unit"));
        assert_eq!(report["stage"], "test");
        assert_eq!(report["substages"].as_array().map(Vec::len), Some(4));
        assert_eq!(report["stageProgress"], 50);
    }
}
