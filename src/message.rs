//! Dashboard message vocabulary
//!
//! `Msg` is the only way data enters the reducer. Every payload is an owned
//! value; nothing here borrows from backend memory. `Cmd` is the reverse
//! direction: effects the reducer asks the runtime to perform.

use chrono::{DateTime, Utc};
use crossterm::event::KeyEvent;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ═══════════════════════════════════════════════════════════════
// SOURCES
// ═══════════════════════════════════════════════════════════════

/// Backend channel a message was drained from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    Workflow,
    Loop,
    AgentOutput,
    AgentStatus,
    Progress,
}

impl Source {
    pub const ALL: [Source; 5] = [
        Source::Workflow,
        Source::Loop,
        Source::AgentOutput,
        Source::AgentStatus,
        Source::Progress,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Source::Workflow => "workflow",
            Source::Loop => "loop",
            Source::AgentOutput => "agent-output",
            Source::AgentStatus => "agent-status",
            Source::Progress => "progress",
        }
    }
}

// ═══════════════════════════════════════════════════════════════
// PAYLOADS
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowMsg {
    pub workflow_id: String,
    pub workflow_name: String,
    pub step: String,
    pub prev_step: String,
    pub event: String,
    pub detail: String,
    pub timestamp: DateTime<Utc>,
}

/// Canonical task-loop event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopKind {
    IterationStarted,
    IterationCompleted,
    TaskStarted,
    TaskCompleted,
    TaskFailed,
    PhaseComplete,
    LoopPaused,
    LoopResumed,
    LoopComplete,
}

impl LoopKind {
    pub fn label(&self) -> &'static str {
        match self {
            LoopKind::IterationStarted => "iteration started",
            LoopKind::IterationCompleted => "iteration completed",
            LoopKind::TaskStarted => "task started",
            LoopKind::TaskCompleted => "task completed",
            LoopKind::TaskFailed => "task failed",
            LoopKind::PhaseComplete => "phase complete",
            LoopKind::LoopPaused => "loop paused",
            LoopKind::LoopResumed => "loop resumed",
            LoopKind::LoopComplete => "loop complete",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopMsg {
    pub kind: LoopKind,
    pub task_id: String,
    pub iteration: u32,
    pub max_iter: u32,
    pub detail: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitMsg {
    pub provider: String,
    pub agent: String,
    pub reset_after: Duration,
    pub reset_at: DateTime<Utc>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    #[default]
    Stdout,
    Stderr,
}

/// One line of agent process output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentOutput {
    pub agent: String,
    pub line: String,
    #[serde(default)]
    pub stream: OutputStream,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
    RateLimited,
    Waiting,
}

impl AgentStatus {
    /// Parse a supervisor status string; anything unrecognised is `Idle`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "running" | "active" | "busy" => AgentStatus::Running,
            "completed" | "complete" | "done" => AgentStatus::Completed,
            "failed" | "error" => AgentStatus::Failed,
            "rate_limited" | "ratelimited" | "throttled" => AgentStatus::RateLimited,
            "waiting" | "blocked" => AgentStatus::Waiting,
            _ => AgentStatus::Idle,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            AgentStatus::Idle => "○",
            AgentStatus::Running => "●",
            AgentStatus::Completed => "✓",
            AgentStatus::Failed => "✗",
            AgentStatus::RateLimited => "⏳",
            AgentStatus::Waiting => "…",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AgentStatus::Idle => "idle",
            AgentStatus::Running => "running",
            AgentStatus::Completed => "completed",
            AgentStatus::Failed => "failed",
            AgentStatus::RateLimited => "rate-limited",
            AgentStatus::Waiting => "waiting",
        }
    }
}

impl<'de> Deserialize<'de> for AgentStatus {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(AgentStatus::parse(&raw))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStatusMsg {
    pub agent: String,
    pub status: AgentStatus,
    #[serde(default)]
    pub task: String,
    #[serde(default)]
    pub detail: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

/// Explicit progress snapshot from the task loop.
///
/// Counts are signed because producers are not trusted; the tracker clamps.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskProgressMsg {
    pub task_id: String,
    pub task_title: String,
    pub status: String,
    pub phase: i64,
    pub total_phases: i64,
    pub phase_completed: i64,
    pub phase_tasks: i64,
    pub completed: i64,
    pub total: i64,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

// ═══════════════════════════════════════════════════════════════
// FOCUS
// ═══════════════════════════════════════════════════════════════

/// Focusable panels, in cycle order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FocusPanel {
    #[default]
    Agents,
    Logs,
    Sidebar,
}

impl FocusPanel {
    pub const ALL: [FocusPanel; 3] = [FocusPanel::Agents, FocusPanel::Logs, FocusPanel::Sidebar];

    fn index(&self) -> usize {
        match self {
            FocusPanel::Agents => 0,
            FocusPanel::Logs => 1,
            FocusPanel::Sidebar => 2,
        }
    }

    pub fn next(&self) -> Self {
        let idx = (self.index() + 1) % Self::ALL.len();
        Self::ALL[idx]
    }

    pub fn prev(&self) -> Self {
        let idx = (self.index() + Self::ALL.len() - 1) % Self::ALL.len();
        Self::ALL[idx]
    }

    pub fn name(&self) -> &'static str {
        match self {
            FocusPanel::Agents => "Agents",
            FocusPanel::Logs => "Logs",
            FocusPanel::Sidebar => "Sidebar",
        }
    }
}

// ═══════════════════════════════════════════════════════════════
// MESSAGES & COMMANDS
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    Workflow(WorkflowMsg),
    Loop(LoopMsg),
    RateLimit(RateLimitMsg),
    AgentOutput(AgentOutput),
    AgentStatus(AgentStatusMsg),
    TaskProgress(TaskProgressMsg),
    FocusChanged(FocusPanel),
    Tick(DateTime<Utc>),
    Key(KeyEvent),
    Resize { width: u16, height: u16 },
}

impl Msg {
    /// Backend channel this message was drained from, if any.
    ///
    /// Rate limits are derived from loop events, so they belong to the loop feed.
    pub fn source(&self) -> Option<Source> {
        match self {
            Msg::Workflow(_) => Some(Source::Workflow),
            Msg::Loop(_) | Msg::RateLimit(_) => Some(Source::Loop),
            Msg::AgentOutput(_) => Some(Source::AgentOutput),
            Msg::AgentStatus(_) => Some(Source::AgentStatus),
            Msg::TaskProgress(_) => Some(Source::Progress),
            Msg::FocusChanged(_) | Msg::Tick(_) | Msg::Key(_) | Msg::Resize { .. } => None,
        }
    }
}

/// Requests forwarded to the task loop host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlRequest {
    Pause,
    Resume,
    Skip,
}

/// Effects returned by the reducer for the runtime to carry out
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cmd {
    /// Re-arm the fetch-one for a backend feed
    Fetch(Source),
    /// Deliver a `Msg::Tick` after the delay
    ScheduleTick(Duration),
    Control(ControlRequest),
    Quit,
}
