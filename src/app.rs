//! Dashboard controller
//!
//! `Dashboard::update` is the only place state changes. It never blocks and
//! never does I/O: anything with an effect (re-arming a feed, scheduling a
//! tick, forwarding a control request, quitting) is returned as a `Cmd` for
//! the runtime to carry out.

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::layout::Rect;
use ratatui::Frame;
use std::time::Duration;

use crate::agents::{auto_scroll_after, scroll_for_key, AgentPanel, Handled};
use crate::config::DashboardConfig;
use crate::layout::LayoutEngine;
use crate::logbuf::{LogBuffer, LogEntry};
use crate::message::{Cmd, ControlRequest, FocusPanel, LoopKind, Msg};
use crate::progress::{TaskProgress, WorkflowTracker};
use crate::ratelimit::RateLimitTracker;
use crate::viewport::{Scroll, Viewport};

// ═══════════════════════════════════════════════════════════════
// SETUP WIZARD SEAM
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardStep {
    Continue,
    Completed,
    Cancelled,
}

/// First-run setup form. While installed it receives every key.
pub trait SetupWizard: Send {
    fn handle_key(&mut self, key: KeyEvent) -> WizardStep;
    fn render(&self, frame: &mut Frame, area: Rect);
}

// ═══════════════════════════════════════════════════════════════
// LOG PANEL
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct LogPanel {
    buffer: LogBuffer,
    viewport: Viewport,
    pub auto_scroll: bool,
    pub visible: bool,
}

impl LogPanel {
    pub fn new(capacity: usize, visible: bool) -> Self {
        Self {
            buffer: LogBuffer::new(capacity),
            viewport: Viewport::default(),
            auto_scroll: true,
            visible,
        }
    }

    /// Classify and store; the viewport follows only while the panel is shown.
    pub fn append_msg(&mut self, msg: &Msg) {
        if self.buffer.append_msg(msg) && self.visible {
            self.sync();
        }
    }

    fn sync(&mut self) {
        self.viewport.set_total(self.buffer.len());
        if self.auto_scroll {
            self.viewport.goto_bottom();
        }
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
        if visible {
            self.sync();
        }
    }

    pub fn set_height(&mut self, height: usize) {
        self.viewport.set_height(height);
        self.sync();
    }

    pub fn scroll(&mut self, action: Scroll) {
        self.viewport.scroll(action);
        self.auto_scroll = auto_scroll_after(action, &self.viewport, self.auto_scroll);
    }

    pub fn visible_entries(&self) -> Vec<LogEntry> {
        self.buffer.window(self.viewport.offset(), self.viewport.height())
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

// ═══════════════════════════════════════════════════════════════
// DASHBOARD
// ═══════════════════════════════════════════════════════════════

pub struct Dashboard {
    pub agents: AgentPanel,
    pub logs: LogPanel,
    pub rate_limits: RateLimitTracker,
    pub workflows: WorkflowTracker,
    pub progress: TaskProgress,
    pub layout: LayoutEngine,
    pub focus: FocusPanel,
    /// A usable layout has been computed at least once
    pub ready: bool,
    /// The last resize was below the minimum size
    pub too_small: bool,
    pub quitting: bool,
    pub show_help: bool,
    /// Loop paused, by event or by the user
    pub paused: bool,
    pub sidebar: Viewport,
    wizard: Option<Box<dyn SetupWizard>>,
}

impl Default for Dashboard {
    fn default() -> Self {
        Self::new(&DashboardConfig::default())
    }
}

impl Dashboard {
    pub fn new(config: &DashboardConfig) -> Self {
        Self {
            agents: AgentPanel::new(config.output_capacity),
            logs: LogPanel::new(config.log_capacity, config.show_logs),
            rate_limits: RateLimitTracker::with_interval(Duration::from_millis(config.tick_ms)),
            workflows: WorkflowTracker::default(),
            progress: TaskProgress::default(),
            layout: LayoutEngine::new(config.agent_split),
            focus: FocusPanel::Agents,
            ready: false,
            too_small: false,
            quitting: false,
            show_help: false,
            paused: false,
            sidebar: Viewport::default(),
            wizard: None,
        }
    }

    pub fn with_wizard(mut self, wizard: Box<dyn SetupWizard>) -> Self {
        self.wizard = Some(wizard);
        self
    }

    pub fn wizard(&self) -> Option<&dyn SetupWizard> {
        self.wizard.as_deref()
    }

    /// Either the workflow engine or the loop reports a pause
    pub fn is_paused(&self) -> bool {
        self.paused || self.workflows.paused
    }

    /// Apply one message. Returned commands are for the runtime.
    pub fn update(&mut self, msg: Msg) -> Vec<Cmd> {
        let mut cmds = Vec::new();
        let source = msg.source();

        self.logs.append_msg(&msg);

        match msg {
            Msg::Workflow(w) => self.workflows.apply(&w),
            Msg::Loop(l) => {
                self.progress.apply_loop(&l);
                match l.kind {
                    LoopKind::LoopPaused => self.paused = true,
                    LoopKind::LoopResumed | LoopKind::LoopComplete => self.paused = false,
                    _ => {}
                }
            }
            Msg::RateLimit(r) => {
                if let Some(delay) = self.rate_limits.apply(&r) {
                    cmds.push(Cmd::ScheduleTick(delay));
                }
            }
            Msg::AgentOutput(o) => self.agents.append(&o),
            Msg::AgentStatus(s) => self.agents.set_status(&s),
            Msg::TaskProgress(p) => self.progress.apply_snapshot(&p),
            Msg::FocusChanged(target) => self.set_focus(target),
            Msg::Tick(now) => {
                if let Some(delay) = self.rate_limits.tick(now) {
                    cmds.push(Cmd::ScheduleTick(delay));
                }
            }
            Msg::Key(key) => self.handle_key(key, &mut cmds),
            Msg::Resize { width, height } => self.resize(width, height),
        }

        // Re-arm the feed this came from now that it is fully processed.
        if let Some(source) = source {
            cmds.push(Cmd::Fetch(source));
        }
        cmds
    }

    fn resize(&mut self, width: u16, height: u16) {
        if self.layout.resize(width, height) {
            self.ready = true;
            self.too_small = false;
            self.apply_heights();
        } else {
            self.too_small = true;
        }
    }

    fn apply_heights(&mut self) {
        let dims = self.layout.dims();
        let agent_rows = if self.logs.visible {
            dims.agents.height
        } else {
            dims.sidebar.height
        };
        // Borders top/bottom, plus the tab strip for agents
        self.agents.set_height(usize::from(agent_rows.saturating_sub(3)));
        self.logs.set_height(usize::from(dims.logs.height.saturating_sub(2)));
        self.sidebar.set_height(usize::from(dims.sidebar.height));
    }

    fn set_focus(&mut self, target: FocusPanel) {
        if target == FocusPanel::Logs && !self.logs.visible {
            self.toggle_logs();
        }
        self.focus = target;
    }

    fn toggle_logs(&mut self) {
        let visible = !self.logs.visible;
        self.logs.set_visible(visible);
        if !visible && self.focus == FocusPanel::Logs {
            self.focus = FocusPanel::Agents;
        }
        if self.ready {
            self.apply_heights();
        }
    }

    fn quit(&mut self, cmds: &mut Vec<Cmd>) {
        self.quitting = true;
        cmds.push(Cmd::Quit);
    }

    fn handle_key(&mut self, key: KeyEvent, cmds: &mut Vec<Cmd>) {
        if key.kind != KeyEventKind::Press {
            return;
        }

        // Overlays capture everything
        if let Some(wizard) = self.wizard.as_mut() {
            match wizard.handle_key(key) {
                WizardStep::Continue => {}
                WizardStep::Completed => self.wizard = None,
                WizardStep::Cancelled => {
                    self.wizard = None;
                    self.quit(cmds);
                }
            }
            return;
        }
        if self.show_help {
            if matches!(key.code, KeyCode::Esc | KeyCode::Char('?') | KeyCode::Char('q')) {
                self.show_help = false;
            }
            return;
        }

        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Char('c') | KeyCode::Char('q') if ctrl => self.quit(cmds),
            KeyCode::Char('q') => self.quit(cmds),
            KeyCode::Char('?') => self.show_help = true,
            KeyCode::Char('p') => {
                self.paused = !self.paused;
                let request = if self.paused {
                    ControlRequest::Pause
                } else {
                    ControlRequest::Resume
                };
                cmds.push(Cmd::Control(request));
            }
            KeyCode::Char('s') => cmds.push(Cmd::Control(ControlRequest::Skip)),
            KeyCode::Char('l') => self.toggle_logs(),
            KeyCode::Char(c @ '1'..='3') => {
                let target = match c {
                    '1' => FocusPanel::Agents,
                    '2' => FocusPanel::Logs,
                    _ => FocusPanel::Sidebar,
                };
                cmds.extend(self.update(Msg::FocusChanged(target)));
            }
            _ => self.route_to_focused(key),
        }
    }

    fn route_to_focused(&mut self, key: KeyEvent) {
        let key = match self.focus {
            FocusPanel::Agents => match self.agents.handle_key(key) {
                Handled::Consumed => return,
                Handled::Bubble(key) => key,
            },
            FocusPanel::Logs => match scroll_for_key(&key) {
                Some(action) => {
                    self.logs.scroll(action);
                    return;
                }
                None => key,
            },
            FocusPanel::Sidebar => match scroll_for_key(&key) {
                Some(action) => {
                    self.scroll_sidebar(action);
                    return;
                }
                None => key,
            },
        };

        let step: fn(&FocusPanel) -> FocusPanel = match key.code {
            KeyCode::Tab => FocusPanel::next,
            KeyCode::BackTab => FocusPanel::prev,
            _ => return,
        };
        self.focus = step(&self.focus);
        // A hidden log panel is skipped in the cycle
        if self.focus == FocusPanel::Logs && !self.logs.visible {
            self.focus = step(&self.focus);
        }
    }

    fn scroll_sidebar(&mut self, action: Scroll) {
        let width = usize::from(self.layout.dims().sidebar.width);
        let total = crate::ui::sidebar_lines(self, width).len();
        self.sidebar.set_total(total);
        self.sidebar.scroll(action);
    }
}
