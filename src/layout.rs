//! Panel layout from terminal size
//!
//! ```text
//! ┌──────────────── title ────────────────┐
//! │ sidebar  │ agents (split of content)  │
//! │          ├────────────────────────────┤
//! │          │ logs                       │
//! └──────────────── status ───────────────┘
//! ```

use ratatui::layout::Rect;

pub const MIN_WIDTH: u16 = 80;
pub const MIN_HEIGHT: u16 = 20;
pub const TITLE_ROWS: u16 = 1;
pub const STATUS_ROWS: u16 = 1;
pub const SIDEBAR_WIDTH: u16 = 30;
pub const BORDER_WIDTH: u16 = 1;
pub const DEFAULT_AGENT_SPLIT: f64 = 0.65;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PanelDimensions {
    pub width: u16,
    pub height: u16,
}

impl PanelDimensions {
    pub const fn new(width: u16, height: u16) -> Self {
        Self { width, height }
    }
}

/// All five panels, computed together
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Dimensions {
    pub title: PanelDimensions,
    pub sidebar: PanelDimensions,
    pub agents: PanelDimensions,
    pub logs: PanelDimensions,
    pub status: PanelDimensions,
}

/// Pure layout computation. `None` below the minimum size.
///
/// The agent and log heights are floored at one independently, so at extreme
/// splits they may not add up to the content height.
pub fn compute(width: u16, height: u16, agent_split: f64) -> Option<Dimensions> {
    if width < MIN_WIDTH || height < MIN_HEIGHT {
        return None;
    }

    let content_height = height.saturating_sub(TITLE_ROWS + STATUS_ROWS).max(1);
    let main_width = width.saturating_sub(SIDEBAR_WIDTH + BORDER_WIDTH).max(1);
    let agent_height = ((f64::from(content_height) * agent_split).floor() as u16).max(1);
    let log_height = content_height.saturating_sub(agent_height).max(1);

    Some(Dimensions {
        title: PanelDimensions::new(width, TITLE_ROWS),
        sidebar: PanelDimensions::new(SIDEBAR_WIDTH, content_height),
        agents: PanelDimensions::new(main_width, agent_height),
        logs: PanelDimensions::new(main_width, log_height),
        status: PanelDimensions::new(width, STATUS_ROWS),
    })
}

/// Accept a split fraction only if it leaves room for both panels.
pub fn sanitize_split(split: f64) -> f64 {
    if split.is_finite() && (0.05..=0.95).contains(&split) {
        split
    } else {
        DEFAULT_AGENT_SPLIT
    }
}

/// Holds the last good layout across resizes
#[derive(Debug, Clone)]
pub struct LayoutEngine {
    agent_split: f64,
    dims: Dimensions,
    /// Last size reported, even if too small
    pub actual: PanelDimensions,
}

impl Default for LayoutEngine {
    fn default() -> Self {
        Self::new(DEFAULT_AGENT_SPLIT)
    }
}

impl LayoutEngine {
    pub fn new(agent_split: f64) -> Self {
        Self {
            agent_split: sanitize_split(agent_split),
            dims: Dimensions::default(),
            actual: PanelDimensions::default(),
        }
    }

    /// Returns false if the terminal is too small; the previous layout is kept.
    pub fn resize(&mut self, width: u16, height: u16) -> bool {
        self.actual = PanelDimensions::new(width, height);
        match compute(width, height, self.agent_split) {
            Some(dims) => {
                self.dims = dims;
                true
            }
            None => false,
        }
    }

    pub fn dims(&self) -> Dimensions {
        self.dims
    }
}

/// Screen rectangles for a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelRects {
    pub title: Rect,
    pub sidebar: Rect,
    pub agents: Rect,
    pub logs: Option<Rect>,
    pub status: Rect,
}

/// Place the computed dimensions on screen, clipped to `area`.
///
/// With the log panel hidden the agent panel takes the whole content column.
pub fn place(dims: &Dimensions, area: Rect, show_logs: bool) -> PanelRects {
    let top = area.y + dims.title.height;
    let main_x = area.x + dims.sidebar.width + BORDER_WIDTH;
    let content_height = dims.sidebar.height;

    let agent_height = if show_logs { dims.agents.height } else { content_height };
    let agents = Rect::new(main_x, top, dims.agents.width, agent_height).intersection(area);
    let logs = show_logs.then(|| {
        Rect::new(main_x, top + dims.agents.height, dims.logs.width, dims.logs.height).intersection(area)
    });

    PanelRects {
        title: Rect::new(area.x, area.y, dims.title.width, dims.title.height).intersection(area),
        sidebar: Rect::new(area.x, top, dims.sidebar.width, content_height).intersection(area),
        agents,
        logs,
        status: Rect::new(area.x, top + content_height, dims.status.width, dims.status.height)
            .intersection(area),
    }
}
