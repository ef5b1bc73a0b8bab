//! Fan-in from backend channels to dashboard messages
//!
//! Each backend channel is a feed. A feed has at most one fetch in flight: it
//! waits for the next value or the shared cancellation signal, maps the value
//! to a `Msg`, and then parks until the reducer asks for it to be re-armed.
//! That keeps per-channel order while letting feeds progress independently.
//!
//! A closed channel or a cancelled token ends the feed for good.

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::message::{
    AgentOutput, AgentStatusMsg, LoopKind, LoopMsg, Msg, RateLimitMsg, Source, TaskProgressMsg,
    WorkflowMsg,
};

// ═══════════════════════════════════════════════════════════════
// BACKEND EVENTS
// ═══════════════════════════════════════════════════════════════

/// Event emitted by the workflow engine
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowEvent {
    pub workflow_id: String,
    pub workflow_name: String,
    pub step: String,
    pub prev_step: String,
    pub event: String,
    pub detail: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

/// Event emitted by the task-implementation loop
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopEvent {
    pub kind: String,
    pub task_id: String,
    pub iteration: u32,
    pub max_iter: u32,
    pub detail: String,
    pub agent: String,
    pub provider: String,
    /// Only meaningful for rate-limit waits; seconds on the wire
    #[serde(with = "wait_secs")]
    pub wait: Duration,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

mod wait_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(wait: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(wait.as_secs_f64())
    }

    /// Negative or non-finite waits read as zero
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::try_from_secs_f64(secs).unwrap_or_default())
    }
}

/// Loop event kind that carries a rate-limit wait
pub const RATE_LIMIT_WAIT: &str = "rate_limit_wait";

const LOOP_KINDS: &[(&str, LoopKind)] = &[
    ("iteration_start", LoopKind::IterationStarted),
    ("iteration_started", LoopKind::IterationStarted),
    ("iteration_end", LoopKind::IterationCompleted),
    ("iteration_completed", LoopKind::IterationCompleted),
    ("task_start", LoopKind::TaskStarted),
    ("task_started", LoopKind::TaskStarted),
    ("task_complete", LoopKind::TaskCompleted),
    ("task_completed", LoopKind::TaskCompleted),
    ("task_failed", LoopKind::TaskFailed),
    ("task_error", LoopKind::TaskFailed),
    ("phase_complete", LoopKind::PhaseComplete),
    ("phase_completed", LoopKind::PhaseComplete),
    ("paused", LoopKind::LoopPaused),
    ("loop_paused", LoopKind::LoopPaused),
    ("resumed", LoopKind::LoopResumed),
    ("loop_resumed", LoopKind::LoopResumed),
    ("complete", LoopKind::LoopComplete),
    ("loop_complete", LoopKind::LoopComplete),
    ("loop_completed", LoopKind::LoopComplete),
];

/// Unknown kinds are reported as `IterationStarted`.
pub fn loop_kind(kind: &str) -> LoopKind {
    LOOP_KINDS
        .iter()
        .find(|(name, _)| *name == kind)
        .map(|(_, k)| *k)
        .unwrap_or(LoopKind::IterationStarted)
}

// ═══════════════════════════════════════════════════════════════
// MAPPERS
// ═══════════════════════════════════════════════════════════════

pub fn map_workflow(ev: WorkflowEvent) -> Msg {
    Msg::Workflow(WorkflowMsg {
        workflow_id: ev.workflow_id,
        workflow_name: ev.workflow_name,
        step: ev.step,
        prev_step: ev.prev_step,
        event: ev.event,
        detail: ev.detail,
        timestamp: ev.timestamp,
    })
}

pub fn map_loop(ev: LoopEvent) -> Msg {
    if ev.kind == RATE_LIMIT_WAIT {
        let reset_at = chrono::Duration::from_std(ev.wait)
            .ok()
            .and_then(|wait| ev.timestamp.checked_add_signed(wait))
            .unwrap_or(ev.timestamp);
        return Msg::RateLimit(RateLimitMsg {
            provider: ev.provider,
            agent: ev.agent,
            reset_after: ev.wait,
            reset_at,
            timestamp: ev.timestamp,
        });
    }
    Msg::Loop(LoopMsg {
        kind: loop_kind(&ev.kind),
        task_id: ev.task_id,
        iteration: ev.iteration,
        max_iter: ev.max_iter,
        detail: ev.detail,
        timestamp: ev.timestamp,
    })
}

fn pass_output(out: AgentOutput) -> Msg {
    Msg::AgentOutput(out)
}

fn pass_status(status: AgentStatusMsg) -> Msg {
    Msg::AgentStatus(status)
}

fn pass_progress(progress: TaskProgressMsg) -> Msg {
    Msg::TaskProgress(progress)
}

// ═══════════════════════════════════════════════════════════════
// FETCH-ONE
// ═══════════════════════════════════════════════════════════════

/// Wait for one value or cancellation. `None` means the feed is done.
pub async fn fetch_one<T, F>(
    rx: &mut mpsc::Receiver<T>,
    cancel: &CancellationToken,
    map: F,
) -> Option<Msg>
where
    F: FnOnce(T) -> Msg,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        value = rx.recv() => value.map(map),
    }
}

struct Feed<T> {
    source: Source,
    rx: mpsc::Receiver<T>,
    map: fn(T) -> Msg,
}

/// Type-erased feed so channels of different payloads can share one set
trait Drain: Send {
    fn fetch(self: Box<Self>, cancel: CancellationToken) -> BoxFuture<'static, Fetched>;
}

impl<T: Send + 'static> Drain for Feed<T> {
    fn fetch(mut self: Box<Self>, cancel: CancellationToken) -> BoxFuture<'static, Fetched> {
        async move {
            let map = self.map;
            let source = self.source;
            match fetch_one(&mut self.rx, &cancel, map).await {
                Some(msg) => Fetched {
                    source,
                    msg: Some(msg),
                    feed: Some(self as Box<dyn Drain>),
                },
                None => Fetched {
                    source,
                    msg: None,
                    feed: None,
                },
            }
        }
        .boxed()
    }
}

struct Fetched {
    source: Source,
    msg: Option<Msg>,
    feed: Option<Box<dyn Drain>>,
}

/// What a completed fetch produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Message(Msg),
    /// Channel closed or cancelled; this feed will not produce again
    Done(Source),
}

// ═══════════════════════════════════════════════════════════════
// BRIDGE
// ═══════════════════════════════════════════════════════════════

pub struct Bridge {
    cancel: CancellationToken,
    parked: HashMap<Source, Box<dyn Drain>>,
    in_flight: FuturesUnordered<BoxFuture<'static, Fetched>>,
}

impl Bridge {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            parked: HashMap::new(),
            in_flight: FuturesUnordered::new(),
        }
    }

    fn attach<T: Send + 'static>(mut self, source: Source, rx: mpsc::Receiver<T>, map: fn(T) -> Msg) -> Self {
        self.parked.insert(source, Box::new(Feed { source, rx, map }));
        self
    }

    pub fn with_workflow(self, rx: mpsc::Receiver<WorkflowEvent>) -> Self {
        self.attach(Source::Workflow, rx, map_workflow)
    }

    pub fn with_loop(self, rx: mpsc::Receiver<LoopEvent>) -> Self {
        self.attach(Source::Loop, rx, map_loop)
    }

    pub fn with_agent_output(self, rx: mpsc::Receiver<AgentOutput>) -> Self {
        self.attach(Source::AgentOutput, rx, pass_output)
    }

    pub fn with_agent_status(self, rx: mpsc::Receiver<AgentStatusMsg>) -> Self {
        self.attach(Source::AgentStatus, rx, pass_status)
    }

    pub fn with_progress(self, rx: mpsc::Receiver<TaskProgressMsg>) -> Self {
        self.attach(Source::Progress, rx, pass_progress)
    }

    /// Start a fetch for a parked feed. False if the feed is busy or finished.
    pub fn arm(&mut self, source: Source) -> bool {
        match self.parked.remove(&source) {
            Some(feed) => {
                self.in_flight.push(feed.fetch(self.cancel.clone()));
                true
            }
            None => {
                debug!(feed = source.name(), "re-arm ignored, feed not parked");
                false
            }
        }
    }

    pub fn arm_all(&mut self) {
        for source in Source::ALL {
            if self.parked.contains_key(&source) {
                self.arm(source);
            }
        }
    }

    /// Next completed fetch. `None` when nothing is in flight.
    pub async fn recv(&mut self) -> Option<Outcome> {
        let fetched = self.in_flight.next().await?;
        match (fetched.msg, fetched.feed) {
            (Some(msg), Some(feed)) => {
                self.parked.insert(fetched.source, feed);
                Some(Outcome::Message(msg))
            }
            _ => {
                debug!(feed = fetched.source.name(), "feed finished");
                Some(Outcome::Done(fetched.source))
            }
        }
    }

    pub fn has_in_flight(&self) -> bool {
        !self.in_flight.is_empty()
    }

    /// Feeds that can still produce
    pub fn live(&self) -> usize {
        self.parked.len() + self.in_flight.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::OutputStream;

    fn loop_event(kind: &str) -> LoopEvent {
        LoopEvent {
            kind: kind.into(),
            task_id: "T-1".into(),
            iteration: 1,
            max_iter: 5,
            ..Default::default()
        }
    }

    fn output(line: &str) -> AgentOutput {
        AgentOutput {
            agent: "claude".into(),
            line: line.into(),
            stream: OutputStream::Stdout,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_loop_kind_table_and_fallback() {
        assert_eq!(loop_kind("task_completed"), LoopKind::TaskCompleted);
        assert_eq!(loop_kind("phase_complete"), LoopKind::PhaseComplete);
        assert_eq!(loop_kind("loop_complete"), LoopKind::LoopComplete);
        assert_eq!(loop_kind("something_new"), LoopKind::IterationStarted);
        assert_eq!(loop_kind(""), LoopKind::IterationStarted);
    }

    #[test]
    fn test_rate_limit_wait_maps_to_rate_limit() {
        let ts = Utc::now();
        let ev = LoopEvent {
            kind: RATE_LIMIT_WAIT.into(),
            agent: "claude".into(),
            wait: Duration::from_secs(90),
            timestamp: ts,
            ..Default::default()
        };
        match map_loop(ev) {
            Msg::RateLimit(r) => {
                assert_eq!(r.agent, "claude");
                assert_eq!(r.reset_after, Duration::from_secs(90));
                assert_eq!(r.reset_at, ts + chrono::Duration::seconds(90));
            }
            other => panic!("expected rate limit, got {:?}", other),
        }
    }

    #[test]
    fn test_workflow_copies_fields() {
        let ev = WorkflowEvent {
            workflow_id: "wf".into(),
            workflow_name: "build".into(),
            step: "b".into(),
            prev_step: "a".into(),
            event: "step_changed".into(),
            detail: "d".into(),
            timestamp: Utc::now(),
        };
        match map_workflow(ev.clone()) {
            Msg::Workflow(w) => {
                assert_eq!(w.workflow_id, ev.workflow_id);
                assert_eq!(w.prev_step, "a");
                assert_eq!(w.timestamp, ev.timestamp);
            }
            other => panic!("expected workflow, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_one_closed_and_cancelled() {
        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel::<LoopEvent>(4);
        tx.send(loop_event("task_started")).await.unwrap();
        drop(tx);
        assert!(fetch_one(&mut rx, &cancel, map_loop).await.is_some());
        assert!(fetch_one(&mut rx, &cancel, map_loop).await.is_none());

        let (_tx, mut rx) = mpsc::channel::<LoopEvent>(4);
        cancel.cancel();
        assert!(fetch_one(&mut rx, &cancel, map_loop).await.is_none());
    }

    #[tokio::test]
    async fn test_drains_in_order_with_rearm() {
        let (tx, rx) = mpsc::channel(16);
        let mut bridge = Bridge::new(CancellationToken::new()).with_agent_output(rx);
        for i in 0..5 {
            tx.send(output(&format!("l{}", i))).await.unwrap();
        }
        drop(tx);

        bridge.arm_all();
        let mut seen = Vec::new();
        while let Some(outcome) = bridge.recv().await {
            match outcome {
                Outcome::Message(Msg::AgentOutput(o)) => {
                    seen.push(o.line);
                    assert!(!bridge.has_in_flight(), "one fetch per feed");
                    assert!(bridge.arm(Source::AgentOutput));
                }
                Outcome::Done(source) => {
                    assert_eq!(source, Source::AgentOutput);
                }
                other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(seen, vec!["l0", "l1", "l2", "l3", "l4"]);
        assert_eq!(bridge.live(), 0);
        assert!(!bridge.arm(Source::AgentOutput), "finished feed stays finished");
    }

    #[tokio::test]
    async fn test_without_rearm_nothing_more_arrives() {
        let (tx, rx) = mpsc::channel(16);
        let mut bridge = Bridge::new(CancellationToken::new()).with_loop(rx);
        tx.send(loop_event("task_started")).await.unwrap();
        tx.send(loop_event("task_completed")).await.unwrap();

        bridge.arm(Source::Loop);
        assert!(matches!(bridge.recv().await, Some(Outcome::Message(Msg::Loop(_)))));
        assert!(bridge.recv().await.is_none(), "parked until re-armed");
        assert_eq!(bridge.live(), 1);

        assert!(bridge.arm(Source::Loop));
        match bridge.recv().await {
            Some(Outcome::Message(Msg::Loop(l))) => assert_eq!(l.kind, LoopKind::TaskCompleted),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_silent_feed_does_not_block_others() {
        let (_wf_tx, wf_rx) = mpsc::channel::<WorkflowEvent>(4);
        let (out_tx, out_rx) = mpsc::channel(4);
        let mut bridge = Bridge::new(CancellationToken::new())
            .with_workflow(wf_rx)
            .with_agent_output(out_rx);
        bridge.arm_all();
        out_tx.send(output("hello")).await.unwrap();

        let outcome = tokio::time::timeout(Duration::from_secs(1), bridge.recv())
            .await
            .unwrap();
        assert!(matches!(outcome, Some(Outcome::Message(Msg::AgentOutput(_)))));
    }

    #[tokio::test]
    async fn test_cancel_finishes_every_feed() {
        let cancel = CancellationToken::new();
        let (_a, wf_rx) = mpsc::channel::<WorkflowEvent>(4);
        let (_b, loop_rx) = mpsc::channel::<LoopEvent>(4);
        let mut bridge = Bridge::new(cancel.clone())
            .with_workflow(wf_rx)
            .with_loop(loop_rx);
        bridge.arm_all();
        cancel.cancel();

        let mut done = Vec::new();
        while let Some(outcome) = bridge.recv().await {
            match outcome {
                Outcome::Done(s) => done.push(s),
                Outcome::Message(m) => panic!("message after cancel: {:?}", m),
            }
        }
        assert_eq!(done.len(), 2);
        assert_eq!(bridge.live(), 0);
    }
}
