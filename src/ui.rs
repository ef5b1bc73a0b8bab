//! Rendering
//!
//! Pure view over a `Dashboard`: nothing here mutates state.

use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Clear, Paragraph, Tabs, Wrap},
};
use std::io;
use unicode_width::UnicodeWidthChar;

use crate::app::Dashboard;
use crate::layout::{self, PanelDimensions, MIN_HEIGHT, MIN_WIDTH};
use crate::logbuf::LogCategory;
use crate::message::{AgentStatus, FocusPanel};
use crate::progress::{WorkflowMode, WorkflowStatus};

const HELP: &[(&str, &str)] = &[
    ("q / Ctrl-C", "quit"),
    ("?", "toggle this help"),
    ("p", "pause / resume the loop"),
    ("s", "skip current task"),
    ("l", "show / hide log panel"),
    ("Tab / S-Tab", "next / prev agent, or focus"),
    ("← / →", "previous / next agent"),
    ("1 2 3", "focus agents / logs / sidebar"),
    ("↑ k / ↓ j", "scroll line"),
    ("PgUp / PgDn", "scroll page"),
    ("Home g / End G", "top / bottom (follow)"),
];

// ═══════════════════════════════════════════════════════════════
// FRAME
// ═══════════════════════════════════════════════════════════════

pub fn render(f: &mut Frame, d: &Dashboard) {
    let area = f.size();

    if let Some(wizard) = d.wizard() {
        wizard.render(f, area);
        return;
    }

    if d.too_small || !d.ready {
        render_too_small(f, area, d.layout.actual);
        return;
    }

    let rects = layout::place(&d.layout.dims(), area, d.logs.visible);

    render_title(f, d, rects.title);
    render_sidebar(f, d, rects.sidebar);
    let border = Rect::new(
        rects.sidebar.x + rects.sidebar.width,
        rects.sidebar.y,
        layout::BORDER_WIDTH,
        rects.sidebar.height,
    )
    .intersection(area);
    f.render_widget(
        Block::default()
            .borders(Borders::LEFT)
            .border_style(Style::default().fg(Color::DarkGray)),
        border,
    );
    render_agents(f, d, rects.agents);
    if let Some(logs) = rects.logs {
        render_logs(f, d, logs);
    }
    render_status(f, d, rects.status);

    if d.show_help {
        render_help(f, area);
    }
}

fn render_too_small(f: &mut Frame, area: Rect, actual: PanelDimensions) {
    let text = format!(
        "Terminal too small: {}x{} (need {}x{})\nPlease resize.",
        actual.width, actual.height, MIN_WIDTH, MIN_HEIGHT
    );
    let para = Paragraph::new(text)
        .alignment(Alignment::Center)
        .style(Style::default().fg(Color::Yellow))
        .wrap(Wrap { trim: true });
    let y = area.y + area.height / 2;
    let rect = Rect::new(area.x, y.saturating_sub(1), area.width, 2u16.min(area.height)).intersection(area);
    f.render_widget(para, rect);
}

// ═══════════════════════════════════════════════════════════════
// PANELS
// ═══════════════════════════════════════════════════════════════

fn render_title(f: &mut Frame, d: &Dashboard, area: Rect) {
    let p = &d.progress;
    let mut title = format!(" agentdeck │ {} agents", d.agents.len());
    if !d.workflows.current_step.is_empty() {
        title.push_str(&format!(" │ step: {}", d.workflows.current_step));
    }
    if p.total_tasks > 0 {
        title.push_str(&format!(" │ tasks {}/{}", p.completed_tasks, p.total_tasks));
    }
    let para = Paragraph::new(title).style(
        Style::default()
            .fg(Color::White)
            .bg(Color::Blue)
            .add_modifier(Modifier::BOLD),
    );
    f.render_widget(para, area);
}

fn focus_style(d: &Dashboard, panel: FocusPanel) -> Style {
    if d.focus == panel {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default().fg(Color::DarkGray)
    }
}

fn workflow_color(status: WorkflowStatus) -> Color {
    match status {
        WorkflowStatus::Idle => Color::DarkGray,
        WorkflowStatus::Running => Color::Cyan,
        WorkflowStatus::Paused => Color::Yellow,
        WorkflowStatus::Completed => Color::Green,
        WorkflowStatus::Failed => Color::Red,
    }
}

fn agent_color(status: AgentStatus) -> Color {
    match status {
        AgentStatus::Idle => Color::DarkGray,
        AgentStatus::Running => Color::Cyan,
        AgentStatus::Completed => Color::Green,
        AgentStatus::Failed => Color::Red,
        AgentStatus::RateLimited => Color::Yellow,
        AgentStatus::Waiting => Color::Magenta,
    }
}

fn bar(percent: u16, width: usize) -> String {
    let filled = (usize::from(percent.min(100)) * width) / 100;
    format!("{}{}", "█".repeat(filled), "░".repeat(width - filled))
}

/// Sidebar content, one entry per row
pub fn sidebar_lines(d: &Dashboard, width: usize) -> Vec<Line<'static>> {
    let header = |s: &str| {
        Line::from(Span::styled(
            format!("── {} ──", s),
            Style::default().fg(Color::Gray).add_modifier(Modifier::BOLD),
        ))
    };
    let mut lines = Vec::new();

    lines.push(header("Workflows"));
    let workflows = d.workflows.snapshot();
    if workflows.is_empty() {
        lines.push(Line::from(Span::styled("  none", Style::default().fg(Color::DarkGray))));
    }
    for w in workflows.iter() {
        let text = truncate(&format!("{} {} {}", w.status.symbol(), w.name, w.step), width);
        lines.push(Line::from(Span::styled(text, Style::default().fg(workflow_color(w.status)))));
    }

    lines.push(Line::from(""));
    lines.push(header("Progress"));
    let p = &d.progress;
    let bar_width = width.saturating_sub(7).min(20);
    lines.push(Line::from(format!(
        "{} {:>3}%",
        bar(p.percent(), bar_width),
        p.percent()
    )));
    lines.push(Line::from(format!("tasks {}/{}", p.completed_tasks, p.total_tasks)));
    if p.total_phases > 0 || p.current_phase > 0 {
        lines.push(Line::from(format!(
            "phase {}/{}  ({}/{})",
            p.current_phase, p.total_phases, p.phase_completed, p.phase_tasks
        )));
    }
    if p.max_iter > 0 {
        lines.push(Line::from(format!("iteration {}/{}", p.iteration, p.max_iter)));
    }
    if !p.task_title.is_empty() || !p.task_id.is_empty() {
        let task = if p.task_title.is_empty() { &p.task_id } else { &p.task_title };
        lines.push(Line::from(truncate(&format!("▸ {}", task), width)));
    }

    lines.push(Line::from(""));
    lines.push(header("Rate limits"));
    let limits = d.rate_limits.snapshot();
    if limits.is_empty() {
        lines.push(Line::from(Span::styled("  none", Style::default().fg(Color::DarkGray))));
    }
    for l in limits.iter() {
        let color = if l.active { Color::Yellow } else { Color::Green };
        let text = truncate(&format!("{:<16} {}", l.provider, l.countdown()), width);
        lines.push(Line::from(Span::styled(text, Style::default().fg(color))));
    }

    lines.push(Line::from(""));
    lines.push(header("Agents"));
    for a in d.agents.agents() {
        let text = truncate(&format!("{} {} {}", a.status.symbol(), a.name, a.status.name()), width);
        lines.push(Line::from(Span::styled(text, Style::default().fg(agent_color(a.status)))));
    }

    lines
}

fn render_sidebar(f: &mut Frame, d: &Dashboard, area: Rect) {
    let lines = sidebar_lines(d, usize::from(area.width));
    let max_scroll = lines.len().saturating_sub(usize::from(area.height));
    let scroll = d.sidebar.offset().min(max_scroll);
    let visible: Vec<Line> = lines.into_iter().skip(scroll).collect();

    let mut para = Paragraph::new(visible);
    if d.focus == FocusPanel::Sidebar {
        para = para.style(Style::default().bg(Color::Rgb(20, 24, 32)));
    }
    f.render_widget(para, area);
}

fn render_agents(f: &mut Frame, d: &Dashboard, area: Rect) {
    let title = match d.agents.active() {
        Some(a) if !a.task.is_empty() => format!("Agents │ {} [{}]", a.name, a.task),
        Some(a) => format!("Agents │ {}", a.name),
        None => "Agents".to_string(),
    };
    let auto = if d.agents.auto_scroll { "" } else { " (scrolled)" };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(focus_style(d, FocusPanel::Agents))
        .title(format!("{}{}", title, auto));
    let inner = block.inner(area);
    f.render_widget(block, area);

    if d.agents.is_empty() {
        let para = Paragraph::new("Waiting for agent output...").style(Style::default().fg(Color::DarkGray));
        f.render_widget(para, inner);
        return;
    }

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(0)])
        .split(inner);

    let titles: Vec<Line> = d
        .agents
        .agents()
        .map(|a| {
            Line::from(Span::styled(
                format!("{} {}", a.status.symbol(), a.name),
                Style::default().fg(agent_color(a.status)),
            ))
        })
        .collect();
    let tabs = Tabs::new(titles)
        .select(d.agents.active_index())
        .highlight_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD | Modifier::REVERSED));
    f.render_widget(tabs, chunks[0]);

    let text: Vec<Line> = d.agents.visible_lines().into_iter().map(Line::from).collect();
    f.render_widget(Paragraph::new(text), chunks[1]);
}

fn category_style(category: LogCategory) -> Style {
    match category {
        LogCategory::Info => Style::default().fg(Color::White),
        LogCategory::Success => Style::default().fg(Color::Green),
        LogCategory::Warning => Style::default().fg(Color::Yellow),
        LogCategory::Error => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        LogCategory::Debug => Style::default().fg(Color::DarkGray),
    }
}

fn render_logs(f: &mut Frame, d: &Dashboard, area: Rect) {
    let auto = if d.logs.auto_scroll { "" } else { " (scrolled)" };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(focus_style(d, FocusPanel::Logs))
        .title(format!("Log ({}){}", d.logs.len(), auto));
    let lines: Vec<Line> = d
        .logs
        .visible_entries()
        .into_iter()
        .map(|e| Line::from(Span::styled(e.render(), category_style(e.category))))
        .collect();
    f.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_status(f: &mut Frame, d: &Dashboard, area: Rect) {
    let mode = d.workflows.mode;
    let mode_style = match mode {
        WorkflowMode::Idle => Style::default().fg(Color::DarkGray),
        WorkflowMode::Running => Style::default().fg(Color::Cyan),
        WorkflowMode::Completed => Style::default().fg(Color::Green),
        WorkflowMode::Failed => Style::default().fg(Color::Red),
    };
    let mut spans = vec![Span::styled(format!(" {} ", mode.name()), mode_style.add_modifier(Modifier::BOLD))];
    if d.is_paused() {
        spans.push(Span::styled(" ‖ PAUSED ", Style::default().fg(Color::Yellow)));
    }
    if d.rate_limits.any_active() {
        spans.push(Span::styled(" ⏳ RATE LIMITED ", Style::default().fg(Color::Yellow)));
    }
    spans.push(Span::styled(
        format!(
            "│ focus: {} │ q:quit ?:help p:pause s:skip l:logs Tab:focus",
            d.focus.name()
        ),
        Style::default().fg(Color::DarkGray),
    ));
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_help(f: &mut Frame, area: Rect) {
    let height = (HELP.len() as u16 + 4).min(area.height);
    let width = 52u16.min(area.width);
    let rect = Rect::new(
        area.x + (area.width - width) / 2,
        area.y + (area.height - height) / 2,
        width,
        height,
    );
    let mut lines = vec![Line::from("")];
    for (keys, what) in HELP {
        lines.push(Line::from(vec![
            Span::styled(format!("  {:<16}", keys), Style::default().fg(Color::Cyan)),
            Span::raw(*what),
        ]));
    }
    let para = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title("Help (Esc to close)"),
    );
    f.render_widget(Clear, rect);
    f.render_widget(para, rect);
}

/// Cut to `width` display columns, marking the cut with `…`
pub fn truncate(s: &str, width: usize) -> String {
    let total: usize = s.chars().map(|c| c.width().unwrap_or(0)).sum();
    if total <= width {
        return s.to_string();
    }
    let mut out = String::new();
    let mut used = 0;
    for c in s.chars() {
        let w = c.width().unwrap_or(0);
        if used + w + 1 > width {
            break;
        }
        out.push(c);
        used += w;
    }
    if width > 0 {
        out.push('…');
    }
    out
}

// ═══════════════════════════════════════════════════════════════
// TERMINAL SETUP
// ═══════════════════════════════════════════════════════════════

pub fn setup_terminal() -> io::Result<Terminal<CrosstermBackend<io::Stdout>>> {
    use crossterm::{execute, terminal::{enable_raw_mode, EnterAlternateScreen}};

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend)
}

pub fn restore_terminal(mut terminal: Terminal<CrosstermBackend<io::Stdout>>) -> io::Result<()> {
    use crossterm::{execute, terminal::{disable_raw_mode, LeaveAlternateScreen}};

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{AgentOutput, Msg, OutputStream};
    use chrono::Utc;
    use ratatui::backend::TestBackend;

    fn screen(d: &Dashboard, width: u16, height: u16) -> String {
        let mut terminal = Terminal::new(TestBackend::new(width, height)).unwrap();
        terminal.draw(|f| render(f, d)).unwrap();
        let buffer = terminal.backend().buffer().clone();
        let mut out = String::new();
        for y in 0..buffer.area.height {
            for x in 0..buffer.area.width {
                out.push_str(buffer.get(x, y).symbol());
            }
            out.push('\n');
        }
        out
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a longer line", 6), "a lon…");
        assert_eq!(truncate("日本語テキスト", 5), "日本…");
    }

    #[test]
    fn test_bar_never_overflows() {
        assert_eq!(bar(100, 4), "████");
        assert_eq!(bar(250, 4), "████");
        assert_eq!(bar(0, 4), "░░░░");
    }

    #[test]
    fn test_too_small_message() {
        let mut d = Dashboard::default();
        d.update(Msg::Resize { width: 50, height: 10 });
        let out = screen(&d, 50, 10);
        assert!(out.contains("Terminal too small: 50x10"));
    }

    #[test]
    fn test_full_layout_renders_panels() {
        let mut d = Dashboard::default();
        d.update(Msg::Resize { width: 100, height: 30 });
        d.update(Msg::AgentOutput(AgentOutput {
            agent: "claude".into(),
            line: "compiling agentdeck".into(),
            stream: OutputStream::Stdout,
            timestamp: Utc::now(),
        }));
        let out = screen(&d, 100, 30);
        assert!(out.contains("agentdeck │ 1 agents"));
        assert!(out.contains("Workflows"));
        assert!(out.contains("Agents │ claude"));
        assert!(out.contains("compiling agentdeck"));
        assert!(out.contains("Log (0)"));
        assert!(out.contains("focus: Agents"));
    }

    #[test]
    fn test_help_overlay() {
        let mut d = Dashboard::default();
        d.update(Msg::Resize { width: 100, height: 30 });
        d.show_help = true;
        let out = screen(&d, 100, 30);
        assert!(out.contains("Help (Esc to close)"));
    }
}
