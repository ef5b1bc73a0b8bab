//! Classified activity log
//!
//! Backend messages are turned into `LogEntry` values and kept in a bounded
//! ring; the oldest entries fall off first.

use chrono::{DateTime, Utc};

use crate::message::{AgentStatus, LoopKind, Msg, OutputStream};
use crate::progress::WorkflowStatus;
use crate::ring::RingBuffer;

pub const DEFAULT_LOG_CAPACITY: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogCategory {
    Info,
    Success,
    Warning,
    Error,
    Debug,
}

impl LogCategory {
    pub fn tag(&self) -> &'static str {
        match self {
            LogCategory::Info => "INFO",
            LogCategory::Success => " OK ",
            LogCategory::Warning => "WARN",
            LogCategory::Error => "ERR ",
            LogCategory::Debug => "DBG ",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub category: LogCategory,
    pub message: String,
}

impl LogEntry {
    pub fn new(timestamp: DateTime<Utc>, category: LogCategory, message: impl Into<String>) -> Self {
        Self {
            timestamp,
            category,
            message: message.into(),
        }
    }

    /// `HH:MM:SS TAG message`
    pub fn render(&self) -> String {
        format!(
            "{} {} {}",
            self.timestamp.format("%H:%M:%S"),
            self.category.tag(),
            self.message
        )
    }
}

/// Turn a domain message into a log entry.
///
/// Stdout agent output, ticks, keys, focus changes and resizes are not logged.
pub fn classify(msg: &Msg) -> Option<LogEntry> {
    match msg {
        Msg::Workflow(w) => {
            let category = match WorkflowStatus::from_event(&w.event) {
                WorkflowStatus::Failed => LogCategory::Error,
                WorkflowStatus::Completed => LogCategory::Success,
                WorkflowStatus::Paused => LogCategory::Warning,
                WorkflowStatus::Idle | WorkflowStatus::Running => LogCategory::Info,
            };
            let name = if w.workflow_name.is_empty() {
                &w.workflow_id
            } else {
                &w.workflow_name
            };
            let mut text = format!("[{}] {}", name, w.event);
            if !w.step.is_empty() {
                if w.prev_step.is_empty() {
                    text.push_str(&format!(" @ {}", w.step));
                } else {
                    text.push_str(&format!(" {} → {}", w.prev_step, w.step));
                }
            }
            if !w.detail.is_empty() {
                text.push_str(&format!(": {}", w.detail));
            }
            Some(LogEntry::new(w.timestamp, category, text))
        }
        Msg::Loop(l) => {
            let category = match l.kind {
                LoopKind::TaskFailed => LogCategory::Error,
                LoopKind::TaskCompleted | LoopKind::PhaseComplete | LoopKind::LoopComplete => {
                    LogCategory::Success
                }
                LoopKind::LoopPaused => LogCategory::Warning,
                LoopKind::IterationStarted | LoopKind::IterationCompleted => LogCategory::Debug,
                LoopKind::TaskStarted | LoopKind::LoopResumed => LogCategory::Info,
            };
            let mut text = l.kind.label().to_string();
            if !l.task_id.is_empty() {
                text.push_str(&format!(" [{}]", l.task_id));
            }
            if l.max_iter > 0 {
                text.push_str(&format!(" ({}/{})", l.iteration, l.max_iter));
            }
            if !l.detail.is_empty() {
                text.push_str(&format!(": {}", l.detail));
            }
            Some(LogEntry::new(l.timestamp, category, text))
        }
        Msg::RateLimit(r) => {
            let who = if r.provider.is_empty() { &r.agent } else { &r.provider };
            Some(LogEntry::new(
                r.timestamp,
                LogCategory::Warning,
                format!("rate limited: {} (resets in {}s)", who, r.reset_after.as_secs()),
            ))
        }
        Msg::AgentStatus(s) => {
            let category = match s.status {
                AgentStatus::Failed => LogCategory::Error,
                AgentStatus::RateLimited => LogCategory::Warning,
                AgentStatus::Completed => LogCategory::Success,
                AgentStatus::Idle | AgentStatus::Running | AgentStatus::Waiting => LogCategory::Info,
            };
            let mut text = format!("{}: {}", s.agent, s.status.name());
            if !s.task.is_empty() {
                text.push_str(&format!(" [{}]", s.task));
            }
            if !s.detail.is_empty() {
                text.push_str(&format!(" - {}", s.detail));
            }
            Some(LogEntry::new(s.timestamp, category, text))
        }
        Msg::TaskProgress(p) => {
            let category = if p.total > 0 && p.completed >= p.total {
                LogCategory::Success
            } else {
                LogCategory::Info
            };
            let title = if p.task_title.is_empty() { &p.task_id } else { &p.task_title };
            Some(LogEntry::new(
                p.timestamp,
                category,
                format!(
                    "progress {}/{} {} {}",
                    p.completed.max(0),
                    p.total.max(0),
                    title,
                    p.status
                )
                .trim_end()
                .to_string(),
            ))
        }
        Msg::AgentOutput(o) if o.stream == OutputStream::Stderr => Some(LogEntry::new(
            o.timestamp,
            LogCategory::Warning,
            format!("{} stderr: {}", o.agent, o.line),
        )),
        Msg::AgentOutput(_)
        | Msg::FocusChanged(_)
        | Msg::Tick(_)
        | Msg::Key(_)
        | Msg::Resize { .. } => None,
    }
}

/// Bounded, classified log
#[derive(Debug, Clone)]
pub struct LogBuffer {
    entries: RingBuffer<LogEntry>,
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RingBuffer::new(capacity),
        }
    }

    /// Classify and append. Returns whether anything was stored.
    pub fn append_msg(&mut self, msg: &Msg) -> bool {
        match classify(msg) {
            Some(entry) => {
                self.entries.push(entry);
                true
            }
            None => false,
        }
    }

    pub fn append(&mut self, entry: LogEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.to_vec()
    }

    pub fn window(&self, start: usize, count: usize) -> Vec<LogEntry> {
        self.entries.window(start, count)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
