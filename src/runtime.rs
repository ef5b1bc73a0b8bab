//! Event loop
//!
//! One consumer: terminal events, bridge feeds and the countdown tick all
//! become `Msg`s, go through `Dashboard::update`, and the returned `Cmd`s are
//! carried out here.

use anyhow::{Context, Result};
use chrono::Utc;
use crossterm::event::{Event, EventStream};
use futures::{Stream, StreamExt};
use ratatui::{backend::Backend, Terminal};
use std::io;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::app::Dashboard;
use crate::bridge::{Bridge, Outcome};
use crate::message::{Cmd, ControlRequest, Msg};
use crate::ui;

/// Carries out reducer commands
pub struct Executor {
    cancel: CancellationToken,
    control: Option<mpsc::Sender<ControlRequest>>,
    tick: Option<Pin<Box<Sleep>>>,
}

impl Executor {
    pub fn new(cancel: CancellationToken, control: Option<mpsc::Sender<ControlRequest>>) -> Self {
        Self {
            cancel,
            control,
            tick: None,
        }
    }

    /// Feed one message through the reducer. Returns true once quitting.
    pub fn dispatch(&mut self, dashboard: &mut Dashboard, bridge: &mut Bridge, msg: Msg) -> bool {
        let cmds = dashboard.update(msg);
        self.execute(cmds, bridge)
    }

    pub fn execute(&mut self, cmds: Vec<Cmd>, bridge: &mut Bridge) -> bool {
        let mut quit = false;
        for cmd in cmds {
            match cmd {
                Cmd::Fetch(source) => {
                    bridge.arm(source);
                }
                Cmd::ScheduleTick(delay) => self.schedule_tick(delay),
                Cmd::Control(request) => self.forward(request),
                Cmd::Quit => {
                    self.shutdown();
                    quit = true;
                }
            }
        }
        quit
    }

    fn schedule_tick(&mut self, delay: Duration) {
        self.tick = Some(Box::pin(tokio::time::sleep(delay)));
    }

    pub fn tick_pending(&self) -> bool {
        self.tick.is_some()
    }

    fn forward(&self, request: ControlRequest) {
        info!(?request, "control request");
        if let Some(tx) = &self.control {
            if let Err(e) = tx.try_send(request) {
                warn!(?request, error = %e, "control request dropped");
            }
        }
    }

    /// Signal every feed and producer to stop
    pub fn shutdown(&mut self) {
        if !self.cancel.is_cancelled() {
            info!("shutting down");
            self.cancel.cancel();
        }
        self.tick = None;
    }

    async fn wait_tick(&mut self) {
        match self.tick.as_mut() {
            Some(sleep) => sleep.as_mut().await,
            None => std::future::pending().await,
        }
    }
}

fn event_to_msg(event: Event) -> Option<Msg> {
    match event {
        Event::Key(key) => Some(Msg::Key(key)),
        Event::Resize(width, height) => Some(Msg::Resize { width, height }),
        _ => None,
    }
}

/// Run against the real terminal until quit or cancellation
pub async fn run<B: Backend>(
    terminal: &mut Terminal<B>,
    dashboard: &mut Dashboard,
    bridge: &mut Bridge,
    cancel: CancellationToken,
    control: Option<mpsc::Sender<ControlRequest>>,
) -> Result<()> {
    run_with_events(terminal, dashboard, bridge, cancel, control, EventStream::new()).await
}

/// Same loop with an arbitrary terminal event source
pub async fn run_with_events<B, S>(
    terminal: &mut Terminal<B>,
    dashboard: &mut Dashboard,
    bridge: &mut Bridge,
    cancel: CancellationToken,
    control: Option<mpsc::Sender<ControlRequest>>,
    mut events: S,
) -> Result<()>
where
    B: Backend,
    S: Stream<Item = io::Result<Event>> + Unpin,
{
    let mut exec = Executor::new(cancel.clone(), control);

    let size = terminal.size().context("reading terminal size")?;
    exec.dispatch(
        dashboard,
        bridge,
        Msg::Resize {
            width: size.width,
            height: size.height,
        },
    );
    bridge.arm_all();
    info!(feeds = bridge.live(), "dashboard started");
    terminal
        .draw(|f| ui::render(f, dashboard))
        .context("drawing frame")?;

    loop {
        let quit = tokio::select! {
            _ = cancel.cancelled() => {
                info!("cancelled externally");
                true
            }
            event = events.next() => match event {
                Some(Ok(event)) => match event_to_msg(event) {
                    Some(msg) => exec.dispatch(dashboard, bridge, msg),
                    None => continue,
                },
                Some(Err(e)) => {
                    exec.shutdown();
                    return Err(e).context("reading terminal events");
                }
                None => {
                    info!("terminal event stream ended");
                    exec.shutdown();
                    true
                }
            },
            outcome = bridge.recv(), if bridge.has_in_flight() => match outcome {
                Some(Outcome::Message(msg)) => exec.dispatch(dashboard, bridge, msg),
                Some(Outcome::Done(source)) => {
                    debug!(feed = source.name(), live = bridge.live(), "feed closed");
                    continue;
                }
                None => continue,
            },
            _ = exec.wait_tick(), if exec.tick_pending() => {
                exec.tick = None;
                exec.dispatch(dashboard, bridge, Msg::Tick(Utc::now()))
            }
        };

        terminal
            .draw(|f| ui::render(f, dashboard))
            .context("drawing frame")?;

        if quit {
            break;
        }
    }

    exec.shutdown();
    info!("dashboard stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{AgentOutput, OutputStream, RateLimitMsg, Source};
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
    use ratatui::backend::TestBackend;

    fn key(c: char) -> io::Result<Event> {
        Ok(Event::Key(KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE)))
    }

    #[tokio::test]
    async fn test_quit_cancels_token() {
        let cancel = CancellationToken::new();
        let mut bridge = Bridge::new(cancel.clone());
        let mut d = Dashboard::default();
        let mut exec = Executor::new(cancel.clone(), None);
        assert!(exec.dispatch(&mut d, &mut bridge, Msg::Key(KeyEvent::new(KeyCode::Char('q'), KeyModifiers::NONE))));
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_fetch_rearms_feed() {
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(4);
        let mut bridge = Bridge::new(cancel.clone()).with_agent_output(rx);
        let mut exec = Executor::new(cancel, None);
        let mut d = Dashboard::default();

        bridge.arm_all();
        for line in ["one", "two"] {
            tx.send(AgentOutput {
                agent: "claude".into(),
                line: line.into(),
                stream: OutputStream::Stdout,
                timestamp: Utc::now(),
            })
            .await
            .unwrap();
        }

        let Some(Outcome::Message(msg)) = bridge.recv().await else {
            panic!("expected a message");
        };
        assert!(!bridge.has_in_flight());
        exec.dispatch(&mut d, &mut bridge, msg);
        assert!(bridge.has_in_flight(), "reducer re-armed the feed");

        let Some(Outcome::Message(msg)) = bridge.recv().await else {
            panic!("expected a message");
        };
        exec.dispatch(&mut d, &mut bridge, msg);
        assert_eq!(d.agents.get("claude").unwrap().output.lines(), vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_control_forwarded() {
        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel(4);
        let mut bridge = Bridge::new(cancel.clone());
        let mut exec = Executor::new(cancel, Some(tx));
        exec.execute(
            vec![Cmd::Control(ControlRequest::Pause), Cmd::Control(ControlRequest::Skip)],
            &mut bridge,
        );
        assert_eq!(rx.recv().await, Some(ControlRequest::Pause));
        assert_eq!(rx.recv().await, Some(ControlRequest::Skip));
    }

    #[tokio::test]
    async fn test_rate_limit_schedules_tick() {
        let cancel = CancellationToken::new();
        let mut bridge = Bridge::new(cancel.clone());
        let mut exec = Executor::new(cancel, None);
        let mut d = Dashboard::default();
        let now = Utc::now();
        exec.dispatch(
            &mut d,
            &mut bridge,
            Msg::RateLimit(RateLimitMsg {
                provider: "anthropic".into(),
                agent: String::new(),
                reset_after: Duration::from_secs(5),
                reset_at: now + chrono::Duration::seconds(5),
                timestamp: now,
            }),
        );
        assert!(exec.tick_pending());
        // The loop feed was never attached, so the re-arm is a no-op
        assert!(!bridge.arm(Source::Loop));
    }

    #[tokio::test]
    async fn test_run_until_quit_key() {
        let cancel = CancellationToken::new();
        let mut bridge = Bridge::new(cancel.clone());
        let mut d = Dashboard::default();
        let mut terminal = Terminal::new(TestBackend::new(100, 30)).unwrap();
        let events = futures::stream::iter(vec![key('l'), key('q')]);

        run_with_events(&mut terminal, &mut d, &mut bridge, cancel.clone(), None, events)
            .await
            .unwrap();

        assert!(d.ready);
        assert!(d.quitting);
        assert!(!d.logs.visible);
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_run_stops_when_events_end() {
        let cancel = CancellationToken::new();
        let mut bridge = Bridge::new(cancel.clone());
        let mut d = Dashboard::default();
        let mut terminal = Terminal::new(TestBackend::new(100, 30)).unwrap();

        run_with_events(
            &mut terminal,
            &mut d,
            &mut bridge,
            cancel.clone(),
            None,
            futures::stream::empty(),
        )
        .await
        .unwrap();
        assert!(cancel.is_cancelled());
    }
}
