//! Newline-delimited JSON backend events
//!
//! Lets an external workflow engine drive the dashboard by piping events in:
//!
//! ```text
//! {"feed":"loop","kind":"task_started","task_id":"T-1","iteration":1,"max_iter":5}
//! {"feed":"output","agent":"claude","line":"editing src/lib.rs"}
//! {"feed":"loop","kind":"rate_limit_wait","provider":"anthropic","wait":30}
//! ```

use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bridge::{Bridge, LoopEvent, WorkflowEvent};
use crate::message::{AgentOutput, AgentStatusMsg, TaskProgressMsg};

const CHANNEL_SIZE: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "feed", rename_all = "snake_case")]
pub enum Envelope {
    Workflow(WorkflowEvent),
    Loop(LoopEvent),
    Output(AgentOutput),
    Status(AgentStatusMsg),
    Progress(TaskProgressMsg),
}

struct Senders {
    workflow: mpsc::Sender<WorkflowEvent>,
    looper: mpsc::Sender<LoopEvent>,
    output: mpsc::Sender<AgentOutput>,
    status: mpsc::Sender<AgentStatusMsg>,
    progress: mpsc::Sender<TaskProgressMsg>,
}

impl Senders {
    /// False once the dashboard side is gone
    async fn route(&self, envelope: Envelope) -> bool {
        match envelope {
            Envelope::Workflow(ev) => self.workflow.send(ev).await.is_ok(),
            Envelope::Loop(ev) => self.looper.send(ev).await.is_ok(),
            Envelope::Output(ev) => self.output.send(ev).await.is_ok(),
            Envelope::Status(ev) => self.status.send(ev).await.is_ok(),
            Envelope::Progress(ev) => self.progress.send(ev).await.is_ok(),
        }
    }
}

/// Parse one line. Blank lines are skipped.
pub fn parse_line(line: &str) -> Option<Result<Envelope, serde_json::Error>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    Some(serde_json::from_str(line))
}

/// Spawn a reader task; returns a bridge over its feeds and the task handle,
/// which resolves to the number of events accepted.
pub fn start<R>(reader: R, cancel: CancellationToken) -> (Bridge, JoinHandle<usize>)
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    let (workflow, workflow_rx) = mpsc::channel(CHANNEL_SIZE);
    let (looper, loop_rx) = mpsc::channel(CHANNEL_SIZE);
    let (output, output_rx) = mpsc::channel(CHANNEL_SIZE);
    let (status, status_rx) = mpsc::channel(CHANNEL_SIZE);
    let (progress, progress_rx) = mpsc::channel(CHANNEL_SIZE);

    let bridge = Bridge::new(cancel.clone())
        .with_workflow(workflow_rx)
        .with_loop(loop_rx)
        .with_agent_output(output_rx)
        .with_agent_status(status_rx)
        .with_progress(progress_rx);

    let senders = Senders {
        workflow,
        looper,
        output,
        status,
        progress,
    };
    let handle = tokio::spawn(read_lines(reader, senders, cancel));
    (bridge, handle)
}

async fn read_lines<R>(mut reader: R, senders: Senders, cancel: CancellationToken) -> usize
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let mut accepted = 0;
    let mut lineno = 0usize;

    loop {
        buf.clear();
        let read = tokio::select! {
            _ = cancel.cancelled() => break,
            read = reader.read_until(b'\n', &mut buf) => read,
        };
        match read {
            Ok(0) => {
                info!(accepted, "event input closed");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "event input failed");
                break;
            }
        }
        lineno += 1;

        // A bad line costs only that line
        let line = match std::str::from_utf8(&buf) {
            Ok(line) => line,
            Err(e) => {
                warn!(line = lineno, error = %e, "skipping non-UTF-8 event");
                continue;
            }
        };

        match parse_line(line) {
            None => continue,
            Some(Err(e)) => warn!(line = lineno, error = %e, "skipping malformed event"),
            Some(Ok(envelope)) => {
                if !senders.route(envelope).await {
                    debug!("dashboard gone, stopping input");
                    break;
                }
                accepted += 1;
            }
        }
    }
    accepted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::Dashboard;
    use crate::bridge::Outcome;
    use crate::message::{AgentStatus, Cmd, Msg};
    use crate::ratelimit::LimitState;
    use chrono::Utc;
    use std::time::Duration;

    async fn drain(bridge: &mut Bridge, d: &mut Dashboard) {
        bridge.arm_all();
        while let Some(outcome) = bridge.recv().await {
            if let Outcome::Message(msg) = outcome {
                for cmd in d.update(msg) {
                    if let Cmd::Fetch(source) = cmd {
                        bridge.arm(source);
                    }
                }
            }
        }
    }

    #[test]
    fn test_parse_envelopes() {
        let ev = parse_line(r#"{"feed":"loop","kind":"rate_limit_wait","provider":"openai","wait":1.5}"#)
            .unwrap()
            .unwrap();
        match ev {
            Envelope::Loop(l) => {
                assert_eq!(l.provider, "openai");
                assert_eq!(l.wait, Duration::from_millis(1500));
            }
            other => panic!("unexpected {:?}", other),
        }

        let ev = parse_line(r#"{"feed":"status","agent":"codex","status":"busy"}"#)
            .unwrap()
            .unwrap();
        assert!(matches!(ev, Envelope::Status(s) if s.status == AgentStatus::Running));

        assert!(parse_line("   ").is_none());
        assert!(parse_line(r#"{"feed":"bogus"}"#).unwrap().is_err());
    }

    #[test]
    fn test_negative_wait_is_zero() {
        let ev = parse_line(r#"{"feed":"loop","kind":"rate_limit_wait","wait":-3}"#)
            .unwrap()
            .unwrap();
        assert!(matches!(ev, Envelope::Loop(l) if l.wait.is_zero()));
    }

    #[tokio::test]
    async fn test_reader_feeds_dashboard() {
        let input = concat!(
            "{\"feed\":\"output\",\"agent\":\"claude\",\"line\":\"hello\"}\n",
            "not json\n",
            "\n",
            "{\"feed\":\"progress\",\"completed\":2,\"total\":4}\n",
            "{\"feed\":\"workflow\",\"workflow_id\":\"w\",\"workflow_name\":\"ship\",\"event\":\"started\",\"step\":\"plan\"}\n",
        );
        let cancel = CancellationToken::new();
        let (mut bridge, handle) = start(input.as_bytes(), cancel);
        let mut d = Dashboard::default();
        drain(&mut bridge, &mut d).await;

        assert_eq!(handle.await.unwrap(), 3);
        assert_eq!(d.agents.get("claude").unwrap().output.lines(), vec!["hello"]);
        assert_eq!(d.progress.percent(), 50);
        assert_eq!(d.workflows.current_step, "plan");
        assert_eq!(d.logs.len(), 2, "progress and workflow are logged, stdout is not");
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_is_skipped() {
        let input: &[u8] = b"{\"feed\":\"output\",\"agent\":\"claude\",\"line\":\"one\"}\n\xff\xfe garbage\n{\"feed\":\"output\",\"agent\":\"claude\",\"line\":\"two\"}\n";
        let (mut bridge, handle) = start(input, CancellationToken::new());
        let mut d = Dashboard::default();
        drain(&mut bridge, &mut d).await;

        assert_eq!(handle.await.unwrap(), 2);
        assert_eq!(d.agents.get("claude").unwrap().output.lines(), vec!["one", "two"]);
    }

    #[test]
    fn test_missing_timestamp_means_receipt_time() {
        let before = Utc::now();
        let line = r#"{"feed":"loop","kind":"rate_limit_wait","provider":"anthropic","wait":30}"#;
        let Some(Ok(Envelope::Loop(ev))) = parse_line(line) else {
            panic!("rate-limit line did not parse");
        };
        assert!(ev.timestamp >= before);

        let mut d = Dashboard::default();
        d.update(crate::bridge::map_loop(ev));
        d.update(Msg::Tick(Utc::now() + chrono::Duration::seconds(1)));
        assert_eq!(d.rate_limits.state("anthropic"), LimitState::Active);

        for line in [
            r#"{"feed":"workflow","workflow_id":"w","event":"started"}"#,
            r#"{"feed":"progress","completed":1,"total":2}"#,
        ] {
            let stamp = match parse_line(line) {
                Some(Ok(Envelope::Workflow(ev))) => ev.timestamp,
                Some(Ok(Envelope::Progress(ev))) => ev.timestamp,
                other => panic!("unexpected {:?}", other),
            };
            assert!(stamp >= before, "{} stamped at receipt", line);
        }
    }
}
