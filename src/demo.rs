//! Simulated backend for `agentdeck --demo`
//!
//! A scripted run of one workflow driving a task loop over two agents,
//! including a rate-limit wait and a stderr line. It honors pause/resume/skip
//! control requests and stops on the shared cancellation token.

use chrono::Utc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::bridge::{Bridge, LoopEvent, WorkflowEvent, RATE_LIMIT_WAIT};
use crate::message::{
    AgentOutput, AgentStatus, AgentStatusMsg, ControlRequest, OutputStream, TaskProgressMsg,
};

const AGENTS: [&str; 2] = ["claude", "codex"];
const PHASE_SIZE: usize = 3;
const TASKS: [(&str, &str); 6] = [
    ("T-1", "Parse manifest"),
    ("T-2", "Resolve dependencies"),
    ("T-3", "Generate lockfile"),
    ("T-4", "Wire up CLI"),
    ("T-5", "Write integration tests"),
    ("T-6", "Update changelog"),
];
const SCRIPT: [&str; 6] = [
    "reading task description",
    "searching workspace for related code",
    "editing files",
    "running tests",
    "tests passed",
    "committing changes",
];
const CHANNEL_SIZE: usize = 64;

#[derive(Debug, Clone, Copy)]
pub struct DemoOptions {
    /// Delay between script steps
    pub step: Duration,
    /// Rate-limit wait injected on the third task
    pub rate_limit: Duration,
}

impl Default for DemoOptions {
    fn default() -> Self {
        Self {
            step: Duration::from_millis(400),
            rate_limit: Duration::from_secs(8),
        }
    }
}

pub struct Demo {
    pub bridge: Bridge,
    pub control: mpsc::Sender<ControlRequest>,
    pub handle: JoinHandle<()>,
}

/// Spawn the producer task and return a bridge wired to its channels
pub fn start(cancel: CancellationToken, opts: DemoOptions) -> Demo {
    let (workflow_tx, workflow_rx) = mpsc::channel(CHANNEL_SIZE);
    let (loop_tx, loop_rx) = mpsc::channel(CHANNEL_SIZE);
    let (output_tx, output_rx) = mpsc::channel(CHANNEL_SIZE);
    let (status_tx, status_rx) = mpsc::channel(CHANNEL_SIZE);
    let (progress_tx, progress_rx) = mpsc::channel(CHANNEL_SIZE);
    let (control_tx, control_rx) = mpsc::channel(8);

    let bridge = Bridge::new(cancel.clone())
        .with_workflow(workflow_rx)
        .with_loop(loop_rx)
        .with_agent_output(output_rx)
        .with_agent_status(status_rx)
        .with_progress(progress_rx);

    let producer = Producer {
        cancel,
        opts,
        workflow: workflow_tx,
        looper: loop_tx,
        output: output_tx,
        status: status_tx,
        progress: progress_tx,
        control: control_rx,
        paused: false,
        skip: false,
    };
    let handle = tokio::spawn(async move {
        if producer.run().await.is_none() {
            debug!("demo producer stopped early");
        }
    });

    Demo {
        bridge,
        control: control_tx,
        handle,
    }
}

struct Producer {
    cancel: CancellationToken,
    opts: DemoOptions,
    workflow: mpsc::Sender<WorkflowEvent>,
    looper: mpsc::Sender<LoopEvent>,
    output: mpsc::Sender<AgentOutput>,
    status: mpsc::Sender<AgentStatusMsg>,
    progress: mpsc::Sender<TaskProgressMsg>,
    control: mpsc::Receiver<ControlRequest>,
    paused: bool,
    skip: bool,
}

/// `None` means cancelled or the dashboard went away.
type Step = Option<()>;

impl Producer {
    async fn run(mut self) -> Step {
        info!("demo backend started");
        self.workflow_event("started", "implement", "", "").await?;

        let total = TASKS.len();
        for (i, (id, title)) in TASKS.iter().enumerate() {
            let agent = AGENTS[i % AGENTS.len()];
            let iteration = (i + 1) as u32;
            self.loop_event("iteration_started", id, iteration, total as u32, "").await?;
            self.loop_event("task_started", id, iteration, total as u32, title).await?;
            self.agent_status(agent, AgentStatus::Running, id).await?;
            self.task_progress(i, id, title, "in_progress").await?;

            for line in SCRIPT {
                self.wait_step().await?;
                if std::mem::take(&mut self.skip) {
                    self.agent_line(agent, "skipped by operator", OutputStream::Stderr).await?;
                    break;
                }
                self.agent_line(agent, &format!("[{}] {}", id, line), OutputStream::Stdout).await?;
            }

            if i == 2 {
                self.agent_line(agent, "429 Too Many Requests", OutputStream::Stderr).await?;
                self.agent_status(agent, AgentStatus::RateLimited, id).await?;
                self.rate_limit(agent).await?;
                self.sleep(self.opts.rate_limit).await?;
                self.agent_status(agent, AgentStatus::Running, id).await?;
            }

            self.loop_event("task_completed", id, iteration, total as u32, title).await?;
            self.loop_event("iteration_completed", id, iteration, total as u32, "").await?;
            self.agent_status(agent, AgentStatus::Completed, id).await?;
            self.task_progress(i + 1, id, title, "completed").await?;

            if (i + 1) % PHASE_SIZE == 0 {
                let phase = ((i + 1) / PHASE_SIZE) as u32;
                self.loop_event("phase_complete", "", iteration, total as u32, &format!("phase {}", phase)).await?;
                let next = if i + 1 == total { "review" } else { "implement" };
                self.workflow_event("step_changed", next, "implement", &format!("phase {} done", phase))
                    .await?;
            }
        }

        self.loop_event("loop_complete", "", total as u32, total as u32, "").await?;
        self.workflow_event("completed", "done", "review", "all tasks finished").await?;
        info!("demo backend finished");
        Some(())
    }

    async fn sleep(&self, delay: Duration) -> Step {
        tokio::select! {
            _ = self.cancel.cancelled() => None,
            _ = tokio::time::sleep(delay) => Some(()),
        }
    }

    /// One script step, blocking while paused
    async fn wait_step(&mut self) -> Step {
        self.sleep(self.opts.step).await?;
        while let Ok(request) = self.control.try_recv() {
            self.apply_control(request).await?;
        }
        while self.paused {
            let request = tokio::select! {
                _ = self.cancel.cancelled() => return None,
                request = self.control.recv() => request?,
            };
            self.apply_control(request).await?;
        }
        Some(())
    }

    async fn apply_control(&mut self, request: ControlRequest) -> Step {
        debug!(?request, "demo control");
        match request {
            ControlRequest::Pause if !self.paused => {
                self.paused = true;
                self.loop_event("loop_paused", "", 0, 0, "paused by operator").await
            }
            ControlRequest::Resume if self.paused => {
                self.paused = false;
                self.loop_event("loop_resumed", "", 0, 0, "").await
            }
            ControlRequest::Skip => {
                self.skip = true;
                Some(())
            }
            _ => Some(()),
        }
    }

    async fn workflow_event(&self, event: &str, step: &str, prev: &str, detail: &str) -> Step {
        let ev = WorkflowEvent {
            workflow_id: "wf-demo".into(),
            workflow_name: "implement-feature".into(),
            step: step.into(),
            prev_step: prev.into(),
            event: event.into(),
            detail: detail.into(),
            timestamp: Utc::now(),
        };
        self.workflow.send(ev).await.ok()
    }

    async fn loop_event(&self, kind: &str, task: &str, iteration: u32, max_iter: u32, detail: &str) -> Step {
        let ev = LoopEvent {
            kind: kind.into(),
            task_id: task.into(),
            iteration,
            max_iter,
            detail: detail.into(),
            timestamp: Utc::now(),
            ..Default::default()
        };
        self.looper.send(ev).await.ok()
    }

    async fn rate_limit(&self, agent: &str) -> Step {
        let ev = LoopEvent {
            kind: RATE_LIMIT_WAIT.into(),
            agent: agent.into(),
            provider: "anthropic".into(),
            wait: self.opts.rate_limit,
            timestamp: Utc::now(),
            ..Default::default()
        };
        self.looper.send(ev).await.ok()
    }

    async fn agent_line(&self, agent: &str, line: &str, stream: OutputStream) -> Step {
        let out = AgentOutput {
            agent: agent.into(),
            line: line.into(),
            stream,
            timestamp: Utc::now(),
        };
        self.output.send(out).await.ok()
    }

    async fn agent_status(&self, agent: &str, status: AgentStatus, task: &str) -> Step {
        let msg = AgentStatusMsg {
            agent: agent.into(),
            status,
            task: task.into(),
            detail: String::new(),
            timestamp: Utc::now(),
        };
        self.status.send(msg).await.ok()
    }

    async fn task_progress(&self, completed: usize, id: &str, title: &str, status: &str) -> Step {
        self.progress.send(progress_snapshot(completed, id, title, status)).await.ok()
    }
}

/// Snapshot after `completed` tasks. The last phase stays current once all are done.
fn progress_snapshot(completed: usize, id: &str, title: &str, status: &str) -> TaskProgressMsg {
    let phase_index = completed.min(TASKS.len() - 1) / PHASE_SIZE;
    TaskProgressMsg {
        task_id: id.into(),
        task_title: title.into(),
        status: status.into(),
        phase: (phase_index + 1) as i64,
        total_phases: (TASKS.len() / PHASE_SIZE) as i64,
        phase_completed: (completed - phase_index * PHASE_SIZE) as i64,
        phase_tasks: PHASE_SIZE as i64,
        completed: completed as i64,
        total: TASKS.len() as i64,
        timestamp: Utc::now(),
    }
}
