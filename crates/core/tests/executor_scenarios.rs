//! End-to-end executor scenarios against scripted agents.
//!
//! These tests exercise the full phase state machine: dependency
//! gating, file and command extraction, failure bookkeeping, and
//! resume-after-interruption.

mod common;

use common::{answer, failure, make_phase, make_plan, orchestrator_with, ScriptedAgent};
use qf_core::executor::{Executor, ExecutorError};
use qf_protocol::{AgentKind, ExecutionStatus, PhaseStatus};
use std::sync::atomic::Ordering;
use std::sync::Arc;

fn count_dir_entries(dir: &std::path::Path) -> usize {
    std::fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
}

#[tokio::test]
async fn trivial_plan_completes() {
    let dir = tempfile::tempdir().unwrap();
    let agent = Arc::new(ScriptedAgent::new(AgentKind::Code, vec![answer("done")]));
    let orchestrator = orchestrator_with(vec![agent]);

    let mut plan = make_plan("p1", vec![make_phase("phase-1", "echo", AgentKind::Code, &[])]);
    let mut executor = Executor::new(orchestrator).with_workdir(dir.path());

    executor.execute(&mut plan).await.expect("plan should complete");

    assert_eq!(plan.state.status, ExecutionStatus::Completed);
    assert_eq!(plan.state.completed_phases, vec![0]);
    assert!(plan.state.failed_phases.is_empty());
    assert_eq!(plan.state.current_phase, plan.phases.len() as i32);
    assert!(plan.state.started_at.is_some());
    assert!(plan.state.completed_at.is_some());
    assert_eq!(plan.phases[0].status, PhaseStatus::Completed);
    assert!(plan.phases[0].tasks[0].completed);
    assert_eq!(plan.phases[0].tasks[0].result.as_deref(), Some("done"));
    // No fences in the answer, so nothing was written.
    assert_eq!(count_dir_entries(dir.path()), 0);
}

#[tokio::test]
async fn empty_plan_goes_straight_to_completed() {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = orchestrator_with(vec![Arc::new(ScriptedAgent::new(
        AgentKind::Code,
        vec![],
    ))]);

    let mut plan = make_plan("p-empty", vec![]);
    let mut executor = Executor::new(orchestrator).with_workdir(dir.path());

    executor.execute(&mut plan).await.unwrap();

    assert_eq!(plan.state.status, ExecutionStatus::Completed);
    assert!(plan.state.completed_phases.is_empty());
    assert!(plan.state.failed_phases.is_empty());
    assert_eq!(plan.state.current_phase, 0);
}

#[tokio::test]
async fn dependency_satisfied_by_name() {
    let dir = tempfile::tempdir().unwrap();
    let agent = Arc::new(ScriptedAgent::new(AgentKind::Code, vec![]));
    let orchestrator = orchestrator_with(vec![agent]);

    let mut plan = make_plan(
        "p2",
        vec![
            make_phase("a", "alpha", AgentKind::Code, &[]),
            make_phase("b", "beta", AgentKind::Code, &["alpha"]),
        ],
    );
    let mut executor = Executor::new(orchestrator).with_workdir(dir.path());

    executor.execute(&mut plan).await.unwrap();

    assert_eq!(plan.state.completed_phases, vec![0, 1]);
    assert_eq!(plan.state.status, ExecutionStatus::Completed);
}

#[tokio::test]
async fn dependency_satisfied_by_id() {
    let dir = tempfile::tempdir().unwrap();
    let agent = Arc::new(ScriptedAgent::new(AgentKind::Code, vec![]));
    let orchestrator = orchestrator_with(vec![agent]);

    let mut plan = make_plan(
        "p3",
        vec![
            make_phase("a", "alpha", AgentKind::Code, &[]),
            make_phase("b", "beta", AgentKind::Code, &["a"]),
        ],
    );
    let mut executor = Executor::new(orchestrator).with_workdir(dir.path());

    executor.execute(&mut plan).await.unwrap();

    assert_eq!(plan.state.completed_phases, vec![0, 1]);
}

#[tokio::test]
async fn unknown_dependency_is_rejected_before_execution() {
    let dir = tempfile::tempdir().unwrap();
    let agent = Arc::new(ScriptedAgent::new(AgentKind::Code, vec![]));
    let calls = agent.call_counter();
    let orchestrator = orchestrator_with(vec![agent]);

    let mut plan = make_plan(
        "p4",
        vec![make_phase("a", "alpha", AgentKind::Code, &["ghost"])],
    );
    let mut executor = Executor::new(orchestrator).with_workdir(dir.path());

    let err = executor.execute(&mut plan).await.unwrap_err();
    assert!(matches!(err, ExecutorError::UnresolvableDependency(_)));
    // Rejected before anything ran or any state changed.
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(plan.state.status, ExecutionStatus::Pending);
    assert!(plan.state.started_at.is_none());
}

#[tokio::test]
async fn unsafe_path_is_rejected_but_phase_completes() {
    let dir = tempfile::tempdir().unwrap();
    let workdir = dir.path().join("project");
    std::fs::create_dir_all(&workdir).unwrap();

    let escape = "```python ../escape.py\nprint(1)\n```";
    let agent = Arc::new(ScriptedAgent::new(AgentKind::Code, vec![answer(escape)]));
    let orchestrator = orchestrator_with(vec![agent]);

    let mut plan = make_plan("p5", vec![make_phase("a", "alpha", AgentKind::Code, &[])]);
    let mut executor = Executor::new(orchestrator).with_workdir(&workdir);

    executor.execute(&mut plan).await.unwrap();

    assert_eq!(plan.state.status, ExecutionStatus::Completed);
    assert!(!dir.path().join("escape.py").exists());
    assert_eq!(count_dir_entries(&workdir), 0);
    assert!(executor.manifest().unwrap().created_files.is_empty());
}

#[tokio::test]
async fn dangerous_command_is_skipped_without_failing() {
    let dir = tempfile::tempdir().unwrap();
    let bomb = "```bash\nrm -rf /\n```";
    let agent = Arc::new(ScriptedAgent::new(AgentKind::Code, vec![answer(bomb)]));
    let orchestrator = orchestrator_with(vec![agent]);

    let mut plan = make_plan("p6", vec![make_phase("a", "alpha", AgentKind::Code, &[])]);
    let mut executor = Executor::new(orchestrator).with_workdir(dir.path());

    executor.execute(&mut plan).await.unwrap();
    assert_eq!(plan.state.status, ExecutionStatus::Completed);
}

#[tokio::test]
async fn file_fences_are_written_and_never_overwritten() {
    let dir = tempfile::tempdir().unwrap();
    let first = "```python api/main.py\nversion = 1\n```";
    let second = "```python api/main.py\nversion = 2\n```";
    let agent = Arc::new(ScriptedAgent::new(
        AgentKind::Code,
        vec![answer(first), answer(second)],
    ));
    let orchestrator = orchestrator_with(vec![agent]);

    let mut plan = make_plan(
        "p7",
        vec![
            make_phase("a", "alpha", AgentKind::Code, &[]),
            make_phase("b", "beta", AgentKind::Code, &["a"]),
        ],
    );
    let mut executor = Executor::new(orchestrator).with_workdir(dir.path());

    executor.execute(&mut plan).await.unwrap();

    let content = std::fs::read_to_string(dir.path().join("api/main.py")).unwrap();
    assert_eq!(content, "version = 1");

    let manifest = executor.manifest().unwrap();
    assert_eq!(manifest.created_files.len(), 1);
    assert_eq!(manifest.created_files[0].path, "api/main.py");
    assert_eq!(manifest.created_files[0].phase, "alpha");
}

#[tokio::test]
async fn command_fences_run_in_the_workdir() {
    let dir = tempfile::tempdir().unwrap();
    let script = "```bash\ntouch marker.txt\n# a comment\n\necho hello\n```";
    let agent = Arc::new(ScriptedAgent::new(AgentKind::Code, vec![answer(script)]));
    let orchestrator = orchestrator_with(vec![agent]);

    let mut plan = make_plan("p8", vec![make_phase("a", "alpha", AgentKind::Code, &[])]);
    let mut executor = Executor::new(orchestrator).with_workdir(dir.path());

    executor.execute(&mut plan).await.unwrap();
    assert!(dir.path().join("marker.txt").exists());
}

#[tokio::test]
async fn failing_command_fails_the_phase() {
    let dir = tempfile::tempdir().unwrap();
    let script = "```bash\nfalse\n```";
    let agent = Arc::new(ScriptedAgent::new(AgentKind::Code, vec![answer(script)]));
    let orchestrator = orchestrator_with(vec![agent]);

    let mut plan = make_plan("p9", vec![make_phase("a", "alpha", AgentKind::Code, &[])]);
    let mut executor = Executor::new(orchestrator).with_workdir(dir.path());

    let err = executor.execute(&mut plan).await.unwrap_err();
    assert!(matches!(err, ExecutorError::PhaseFailed { index: 0, .. }));
    assert_eq!(plan.state.status, ExecutionStatus::Failed);
    assert_eq!(plan.state.failed_phases, vec![0]);
    assert_eq!(plan.phases[0].status, PhaseStatus::Failed);
}

#[tokio::test]
async fn agent_failure_fails_the_plan_with_the_phase_index() {
    let dir = tempfile::tempdir().unwrap();
    let agent = Arc::new(ScriptedAgent::new(
        AgentKind::Code,
        vec![failure("model exploded")],
    ));
    let orchestrator = orchestrator_with(vec![agent]);

    let mut plan = make_plan("p10", vec![make_phase("a", "alpha", AgentKind::Code, &[])]);
    let mut executor = Executor::new(orchestrator).with_workdir(dir.path());

    let err = executor.execute(&mut plan).await.unwrap_err();
    match err {
        ExecutorError::PhaseFailed { index, name, .. } => {
            assert_eq!(index, 0);
            assert_eq!(name, "alpha");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(plan.state.status, ExecutionStatus::Failed);
}

#[tokio::test]
async fn phase_agent_kind_must_be_registered() {
    let dir = tempfile::tempdir().unwrap();
    // Only a code agent is registered, but the phase wants data.
    let orchestrator = orchestrator_with(vec![Arc::new(ScriptedAgent::new(
        AgentKind::Code,
        vec![],
    ))]);

    let mut plan = make_plan("p11", vec![make_phase("a", "alpha", AgentKind::Data, &[])]);
    let mut executor = Executor::new(orchestrator).with_workdir(dir.path());

    let err = executor.execute(&mut plan).await.unwrap_err();
    assert!(matches!(err, ExecutorError::PhaseFailed { .. }));
    assert_eq!(plan.state.failed_phases, vec![0]);
}

#[tokio::test]
async fn interrupted_plan_resumes_from_the_failed_phase() {
    let dir = tempfile::tempdir().unwrap();

    let mut plan = make_plan(
        "p12",
        vec![
            make_phase("a", "alpha", AgentKind::Code, &[]),
            make_phase("b", "beta", AgentKind::Code, &["a"]),
            make_phase("c", "gamma", AgentKind::Code, &["b"]),
        ],
    );

    // First run: phase 0 succeeds, phase 1 dies mid-plan.
    {
        let agent = Arc::new(ScriptedAgent::new(
            AgentKind::Code,
            vec![answer("alpha done"), failure("interrupted")],
        ));
        let orchestrator = orchestrator_with(vec![agent]);
        let mut executor = Executor::new(orchestrator).with_workdir(dir.path());
        executor.execute(&mut plan).await.unwrap_err();
    }

    assert_eq!(plan.state.status, ExecutionStatus::Failed);
    assert_eq!(plan.state.completed_phases, vec![0]);
    assert_eq!(plan.state.failed_phases, vec![1]);
    assert_eq!(plan.state.current_phase, 1);
    let started_at = plan.state.started_at.expect("started_at set on first run");

    // Round-trip through the snapshot format, as a real resume would.
    let snapshot = serde_json::to_string(&plan).unwrap();
    let mut plan: qf_protocol::ExecutionPlan = serde_json::from_str(&snapshot).unwrap();

    // Second run in a fresh executor: phases 1 and 2 run, phase 0 does not.
    let agent = Arc::new(ScriptedAgent::new(
        AgentKind::Code,
        vec![answer("beta done"), answer("gamma done")],
    ));
    let calls = agent.call_counter();
    let orchestrator = orchestrator_with(vec![agent]);
    let mut executor = Executor::new(orchestrator).with_workdir(dir.path());
    executor.execute(&mut plan).await.expect("resume completes");

    assert_eq!(calls.load(Ordering::SeqCst), 2, "phase 0 must not re-run");
    assert_eq!(plan.state.status, ExecutionStatus::Completed);
    assert_eq!(plan.state.completed_phases, vec![0, 1, 2]);
    assert!(plan.state.failed_phases.is_empty());
    assert_eq!(plan.state.current_phase, 3);
    assert_eq!(plan.state.started_at, Some(started_at), "started_at preserved");
    assert_eq!(
        plan.phases[1].tasks[0].result.as_deref(),
        Some("beta done")
    );
}

#[tokio::test]
async fn header_comment_fences_create_files_too() {
    let dir = tempfile::tempdir().unwrap();
    let answer_text = "```python\n# pkg/util.py\ndef helper():\n    return 42\n```";
    let agent = Arc::new(ScriptedAgent::new(AgentKind::Code, vec![answer(answer_text)]));
    let orchestrator = orchestrator_with(vec![agent]);

    let mut plan = make_plan("p13", vec![make_phase("a", "alpha", AgentKind::Code, &[])]);
    let mut executor = Executor::new(orchestrator).with_workdir(dir.path());

    executor.execute(&mut plan).await.unwrap();

    let content = std::fs::read_to_string(dir.path().join("pkg/util.py")).unwrap();
    assert!(content.contains("def helper()"));
}

#[tokio::test]
async fn declared_structure_directories_are_created_upfront() {
    let dir = tempfile::tempdir().unwrap();
    let agent = Arc::new(ScriptedAgent::new(AgentKind::Code, vec![]));
    let orchestrator = orchestrator_with(vec![agent]);

    let mut plan = make_plan("p14", vec![make_phase("a", "alpha", AgentKind::Code, &[])]);
    plan.file_structure
        .insert("svc/routes/".to_string(), vec!["users.py".to_string()]);

    let mut executor = Executor::new(orchestrator).with_workdir(dir.path());
    executor.execute(&mut plan).await.unwrap();

    assert!(dir.path().join("svc/routes").is_dir());
}
