//! Common test data and fixed instants

use caretaker::pipeline::{DeployParams, PipelineDefinition, StageDefinition};
use chrono::{DateTime, Duration, TimeZone, Utc};

pub const TEST_CATEGORY: &str = "logs";
pub const TEST_PIPELINE: &str = "deploy";
pub const TEST_SUBJECT: &str = "example.org";

/// Day 0 of every test timeline
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 2, 0, 0)
        .single()
        .expect("valid test instant")
}

pub fn days(n: i64) -> Duration {
    Duration::days(n)
}

pub fn stage(name: &str, blocking: bool) -> StageDefinition {
    StageDefinition {
        name: name.to_string(),
        command: format!("run-{} {{ref}} {{environment}}", name),
        blocking,
        gated: false,
        timeout_seconds: 60,
    }
}

pub fn gated_stage(name: &str) -> StageDefinition {
    StageDefinition {
        gated: true,
        ..stage(name, true)
    }
}

/// lint (non-blocking), syntax, deploy (gated), notify
pub fn deploy_pipeline() -> PipelineDefinition {
    PipelineDefinition {
        name: TEST_PIPELINE.to_string(),
        stages: vec![
            stage("lint", false),
            stage("syntax", true),
            gated_stage("deploy"),
            stage("notify", true),
        ],
        deploy_branches: vec!["main".to_string(), "release/*".to_string()],
    }
}

pub fn staging_params() -> DeployParams {
    DeployParams {
        environment: "staging".to_string(),
        playbook: "site.yml".to_string(),
        tags: None,
    }
}
