//! Workflow lifecycle and task progress derivation
//!
//! Workflow status comes from a free-text event name matched against fixed
//! keyword sets. Task counters come from two paths: explicit progress
//! snapshots (authoritative) and loop events (incremental fallback between
//! snapshots).

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::message::{LoopKind, LoopMsg, TaskProgressMsg, WorkflowMsg};

// ═══════════════════════════════════════════════════════════════
// KEYWORDS
// ═══════════════════════════════════════════════════════════════

const FAILED_WORDS: &[&str] = &["failed", "failure", "error", "errored", "aborted", "cancelled", "canceled"];
const COMPLETED_WORDS: &[&str] = &["completed", "complete", "done", "finished", "succeeded", "success"];
const PAUSED_WORDS: &[&str] = &["paused", "pause", "suspended"];
const IDLE_WORDS: &[&str] = &["idle", "created", "pending", "queued"];

// Feed the `paused` flag only; they do not pick the mode.
const PAUSE_WORDS: &[&str] = &["paused", "pause", "suspended", "hold"];
const RESUME_WORDS: &[&str] = &["resumed", "resume", "unpaused", "continued", "continue"];
const STOP_WORDS: &[&str] = &["stopped", "completed", "complete", "failed", "cancelled", "canceled", "aborted"];

fn tokens(event: &str) -> Vec<String> {
    event
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn has_any(tokens: &[String], words: &[&str]) -> bool {
    tokens.iter().any(|t| words.contains(&t.as_str()))
}

// ═══════════════════════════════════════════════════════════════
// WORKFLOWS
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowStatus {
    Idle,
    Running,
    Paused,
    Completed,
    Failed,
}

impl WorkflowStatus {
    /// Unrecognised events count as `Running`.
    pub fn from_event(event: &str) -> Self {
        let tokens = tokens(event);
        if has_any(&tokens, FAILED_WORDS) {
            WorkflowStatus::Failed
        } else if has_any(&tokens, COMPLETED_WORDS) {
            WorkflowStatus::Completed
        } else if has_any(&tokens, PAUSED_WORDS) {
            WorkflowStatus::Paused
        } else if has_any(&tokens, IDLE_WORDS) {
            WorkflowStatus::Idle
        } else {
            WorkflowStatus::Running
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            WorkflowStatus::Idle => "○",
            WorkflowStatus::Running => "▶",
            WorkflowStatus::Paused => "‖",
            WorkflowStatus::Completed => "✓",
            WorkflowStatus::Failed => "✗",
        }
    }
}

/// Overall mode shown in the status strip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkflowMode {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
}

impl WorkflowMode {
    pub fn from_event(event: &str) -> Self {
        let tokens = tokens(event);
        if has_any(&tokens, FAILED_WORDS) {
            WorkflowMode::Failed
        } else if has_any(&tokens, COMPLETED_WORDS) {
            WorkflowMode::Completed
        } else if has_any(&tokens, IDLE_WORDS) {
            WorkflowMode::Idle
        } else {
            WorkflowMode::Running
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            WorkflowMode::Idle => "IDLE",
            WorkflowMode::Running => "RUNNING",
            WorkflowMode::Completed => "COMPLETED",
            WorkflowMode::Failed => "FAILED",
        }
    }
}

/// How an event affects the paused flag, if at all
pub fn paused_from_event(event: &str) -> Option<bool> {
    let tokens = tokens(event);
    if has_any(&tokens, STOP_WORDS) || has_any(&tokens, RESUME_WORDS) {
        Some(false)
    } else if has_any(&tokens, PAUSE_WORDS) {
        Some(true)
    } else {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowEntry {
    pub id: String,
    pub name: String,
    pub status: WorkflowStatus,
    pub step: String,
    pub started_at: DateTime<Utc>,
    pub detail: String,
}

impl WorkflowEntry {
    fn key(&self) -> &str {
        if self.id.is_empty() {
            &self.name
        } else {
            &self.id
        }
    }
}

/// Workflow list plus derived mode.
///
/// The list is a shared snapshot; updates copy-on-write, so a reader holding
/// `snapshot()` never sees it change.
#[derive(Debug, Clone, Default)]
pub struct WorkflowTracker {
    workflows: Arc<Vec<WorkflowEntry>>,
    pub mode: WorkflowMode,
    pub paused: bool,
    pub current_step: String,
}

impl WorkflowTracker {
    pub fn apply(&mut self, msg: &WorkflowMsg) {
        let status = WorkflowStatus::from_event(&msg.event);
        let key = if msg.workflow_id.is_empty() {
            msg.workflow_name.as_str()
        } else {
            msg.workflow_id.as_str()
        };

        let list = Arc::make_mut(&mut self.workflows);
        match list.iter_mut().find(|w| w.key() == key) {
            Some(entry) => {
                entry.status = status;
                if !msg.step.is_empty() {
                    entry.step = msg.step.clone();
                }
                if !msg.workflow_name.is_empty() {
                    entry.name = msg.workflow_name.clone();
                }
                entry.detail = msg.detail.clone();
            }
            None => list.push(WorkflowEntry {
                id: msg.workflow_id.clone(),
                name: if msg.workflow_name.is_empty() {
                    msg.workflow_id.clone()
                } else {
                    msg.workflow_name.clone()
                },
                status,
                step: msg.step.clone(),
                started_at: msg.timestamp,
                detail: msg.detail.clone(),
            }),
        }

        self.mode = WorkflowMode::from_event(&msg.event);
        if let Some(paused) = paused_from_event(&msg.event) {
            self.paused = paused;
        }
        if !msg.step.is_empty() {
            self.current_step = msg.step.clone();
        }
    }

    /// Oldest-first
    pub fn snapshot(&self) -> Arc<Vec<WorkflowEntry>> {
        Arc::clone(&self.workflows)
    }

    pub fn len(&self) -> usize {
        self.workflows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workflows.is_empty()
    }
}

// ═══════════════════════════════════════════════════════════════
// TASK PROGRESS
// ═══════════════════════════════════════════════════════════════

fn clamp_count(v: i64) -> u32 {
    u32::try_from(v.max(0)).unwrap_or(u32::MAX)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskProgress {
    pub total_tasks: u32,
    pub completed_tasks: u32,
    pub current_phase: u32,
    pub total_phases: u32,
    pub phase_tasks: u32,
    pub phase_completed: u32,
    pub task_id: String,
    pub task_title: String,
    pub status: String,
    pub iteration: u32,
    pub max_iter: u32,
}

impl TaskProgress {
    /// Explicit snapshot; overrides anything accumulated incrementally.
    pub fn apply_snapshot(&mut self, msg: &TaskProgressMsg) {
        self.total_tasks = clamp_count(msg.total);
        self.completed_tasks = clamp_count(msg.completed).min(self.total_tasks);

        if msg.phase > 0 || msg.total_phases > 0 || msg.phase_tasks > 0 {
            self.total_phases = clamp_count(msg.total_phases);
            self.current_phase = clamp_count(msg.phase);
            if self.total_phases > 0 {
                self.current_phase = self.current_phase.min(self.total_phases);
            }
            self.phase_tasks = clamp_count(msg.phase_tasks);
            self.phase_completed = clamp_count(msg.phase_completed).min(self.phase_tasks);
        }

        if !msg.task_id.is_empty() {
            self.task_id = msg.task_id.clone();
        }
        if !msg.task_title.is_empty() {
            self.task_title = msg.task_title.clone();
        }
        self.status = msg.status.clone();
    }

    /// Incremental update from a loop event
    pub fn apply_loop(&mut self, msg: &LoopMsg) {
        match msg.kind {
            LoopKind::TaskCompleted => {
                self.phase_completed = self.phase_completed.saturating_add(1);
                if self.phase_tasks > 0 {
                    self.phase_completed = self.phase_completed.min(self.phase_tasks);
                }
                if self.completed_tasks < self.total_tasks {
                    self.completed_tasks += 1;
                }
            }
            LoopKind::PhaseComplete => {
                self.current_phase = self.current_phase.saturating_add(1);
                if self.total_phases > 0 {
                    self.current_phase = self.current_phase.min(self.total_phases);
                }
                self.phase_completed = 0;
            }
            LoopKind::TaskStarted => {
                if !msg.task_id.is_empty() {
                    self.task_id = msg.task_id.clone();
                }
            }
            LoopKind::IterationStarted | LoopKind::IterationCompleted => {
                self.iteration = msg.iteration;
                self.max_iter = msg.max_iter;
            }
            LoopKind::TaskFailed
            | LoopKind::LoopPaused
            | LoopKind::LoopResumed
            | LoopKind::LoopComplete => {}
        }
    }

    /// Overall completion, 0–100
    pub fn percent(&self) -> u16 {
        percent(self.completed_tasks, self.total_tasks)
    }

    pub fn phase_percent(&self) -> u16 {
        percent(self.phase_completed, self.phase_tasks)
    }
}

fn percent(done: u32, total: u32) -> u16 {
    if total == 0 {
        return 0;
    }
    let pct = u64::from(done.min(total)) * 100 / u64::from(total);
    pct.min(100) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wf(id: &str, name: &str, event: &str) -> WorkflowMsg {
        WorkflowMsg {
            workflow_id: id.into(),
            workflow_name: name.into(),
            step: "plan".into(),
            prev_step: String::new(),
            event: event.into(),
            detail: String::new(),
            timestamp: Utc::now(),
        }
    }

    fn loop_msg(kind: LoopKind) -> LoopMsg {
        LoopMsg {
            kind,
            task_id: String::new(),
            iteration: 0,
            max_iter: 0,
            detail: String::new(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_status_keywords() {
        assert_eq!(WorkflowStatus::from_event("workflow_failed"), WorkflowStatus::Failed);
        assert_eq!(WorkflowStatus::from_event("COMPLETED"), WorkflowStatus::Completed);
        assert_eq!(WorkflowStatus::from_event("paused"), WorkflowStatus::Paused);
        assert_eq!(WorkflowStatus::from_event("created"), WorkflowStatus::Idle);
        assert_eq!(WorkflowStatus::from_event("step_changed"), WorkflowStatus::Running);
        assert_eq!(WorkflowStatus::from_event("something custom"), WorkflowStatus::Running);
    }

    #[test]
    fn test_paused_flag_independent_of_mode() {
        let mut t = WorkflowTracker::default();
        t.apply(&wf("1", "build", "started"));
        assert_eq!(t.mode, WorkflowMode::Running);
        assert!(!t.paused);

        t.apply(&wf("1", "build", "paused"));
        assert_eq!(t.mode, WorkflowMode::Running);
        assert!(t.paused);

        t.apply(&wf("1", "build", "step_changed"));
        assert!(t.paused, "unrelated events leave paused alone");

        t.apply(&wf("1", "build", "resumed"));
        assert!(!t.paused);

        t.apply(&wf("1", "build", "paused"));
        t.apply(&wf("1", "build", "completed"));
        assert!(!t.paused);
        assert_eq!(t.mode, WorkflowMode::Completed);
    }

    #[test]
    fn test_workflows_dedupe_preserve_order() {
        let mut t = WorkflowTracker::default();
        t.apply(&wf("a", "alpha", "started"));
        t.apply(&wf("b", "beta", "started"));
        t.apply(&wf("a", "alpha", "completed"));
        t.apply(&wf("", "gamma", "started"));
        t.apply(&wf("", "gamma", "failed"));

        let list = t.snapshot();
        assert_eq!(list.len(), 3);
        assert_eq!(list[0].id, "a");
        assert_eq!(list[0].status, WorkflowStatus::Completed);
        assert_eq!(list[1].id, "b");
        assert_eq!(list[2].name, "gamma");
        assert_eq!(list[2].status, WorkflowStatus::Failed);
    }

    #[test]
    fn test_snapshot_is_not_mutated() {
        let mut t = WorkflowTracker::default();
        t.apply(&wf("a", "alpha", "started"));
        let before = t.snapshot();
        t.apply(&wf("a", "alpha", "failed"));
        t.apply(&wf("b", "beta", "started"));
        assert_eq!(before.len(), 1);
        assert_eq!(before[0].status, WorkflowStatus::Running);
        assert_eq!(t.snapshot().len(), 2);
    }

    #[test]
    fn test_progress_clamp() {
        let mut p = TaskProgress::default();
        p.apply_snapshot(&TaskProgressMsg {
            completed: 100,
            total: 10,
            ..Default::default()
        });
        assert_eq!(p.completed_tasks, 10);
        assert_eq!(p.total_tasks, 10);
        assert_eq!(p.percent(), 100);

        p.apply_snapshot(&TaskProgressMsg {
            completed: -5,
            total: -1,
            ..Default::default()
        });
        assert_eq!(p.completed_tasks, 0);
        assert_eq!(p.total_tasks, 0);
        assert_eq!(p.percent(), 0);
    }

    #[test]
    fn test_incremental_then_snapshot_wins() {
        let mut p = TaskProgress::default();
        p.apply_snapshot(&TaskProgressMsg {
            completed: 1,
            total: 3,
            phase: 1,
            total_phases: 2,
            phase_tasks: 2,
            ..Default::default()
        });
        p.apply_loop(&loop_msg(LoopKind::TaskCompleted));
        assert_eq!(p.completed_tasks, 2);
        assert_eq!(p.phase_completed, 1);

        p.apply_loop(&loop_msg(LoopKind::TaskCompleted));
        p.apply_loop(&loop_msg(LoopKind::TaskCompleted));
        assert_eq!(p.completed_tasks, 3, "never passes total");
        assert_eq!(p.phase_completed, 2, "never passes phase size");

        p.apply_loop(&loop_msg(LoopKind::PhaseComplete));
        assert_eq!(p.current_phase, 2);
        assert_eq!(p.phase_completed, 0);
        p.apply_loop(&loop_msg(LoopKind::PhaseComplete));
        assert_eq!(p.current_phase, 2, "capped at total phases");

        p.apply_snapshot(&TaskProgressMsg {
            completed: 1,
            total: 5,
            ..Default::default()
        });
        assert_eq!(p.completed_tasks, 1);
        assert_eq!(p.total_tasks, 5);
        assert_eq!(p.current_phase, 2, "phase info kept when snapshot omits it");
    }

    #[test]
    fn test_task_completed_without_total_only_counts_phase() {
        let mut p = TaskProgress::default();
        p.apply_loop(&loop_msg(LoopKind::TaskCompleted));
        assert_eq!(p.completed_tasks, 0);
        assert_eq!(p.phase_completed, 1);
    }
}
