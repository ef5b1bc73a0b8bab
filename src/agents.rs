//! Agent multiplexer panel
//!
//! One output ring and one viewport per agent, tabs in first-seen order.
//! Only the active agent's viewport is kept in sync with its buffer; a
//! background agent's viewport catches up when it becomes active.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::collections::HashMap;

use crate::message::{AgentOutput, AgentStatus, AgentStatusMsg};
use crate::ring::{OutputBuffer, DEFAULT_OUTPUT_CAPACITY};
use crate::viewport::{Scroll, Viewport};

/// Result of offering a key to a panel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    Consumed,
    /// Not used here; passed back unchanged for the parent to handle
    Bubble(KeyEvent),
}

/// Map the shared scrolling keys to a scroll action
pub fn scroll_for_key(key: &KeyEvent) -> Option<Scroll> {
    match key.code {
        KeyCode::Up | KeyCode::Char('k') => Some(Scroll::LineUp),
        KeyCode::Down | KeyCode::Char('j') => Some(Scroll::LineDown),
        KeyCode::PageUp => Some(Scroll::PageUp),
        KeyCode::PageDown => Some(Scroll::PageDown),
        KeyCode::Home | KeyCode::Char('g') => Some(Scroll::Home),
        KeyCode::End | KeyCode::Char('G') => Some(Scroll::End),
        _ => None,
    }
}

/// Auto-scroll after a scroll action: upward disables, reaching the bottom re-enables.
pub fn auto_scroll_after(action: Scroll, viewport: &Viewport, current: bool) -> bool {
    if action.is_upward() {
        false
    } else if action == Scroll::End || viewport.at_bottom() {
        true
    } else {
        current
    }
}

#[derive(Debug, Clone)]
pub struct AgentEntry {
    pub name: String,
    pub output: OutputBuffer,
    pub viewport: Viewport,
    pub status: AgentStatus,
    pub task: String,
}

impl AgentEntry {
    fn new(name: &str, capacity: usize, height: usize) -> Self {
        Self {
            name: name.to_string(),
            output: OutputBuffer::new(capacity),
            viewport: Viewport::new(height),
            status: AgentStatus::Idle,
            task: String::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AgentPanel {
    agents: HashMap<String, AgentEntry>,
    order: Vec<String>,
    active: usize,
    pub auto_scroll: bool,
    capacity: usize,
    height: usize,
}

impl Default for AgentPanel {
    fn default() -> Self {
        Self::new(DEFAULT_OUTPUT_CAPACITY)
    }
}

impl AgentPanel {
    pub fn new(capacity: usize) -> Self {
        Self {
            agents: HashMap::new(),
            order: Vec::new(),
            active: 0,
            auto_scroll: true,
            capacity,
            height: 0,
        }
    }

    fn entry_mut(&mut self, name: &str) -> &mut AgentEntry {
        let (capacity, height) = (self.capacity, self.height);
        let order = &mut self.order;
        self.agents.entry(name.to_string()).or_insert_with(|| {
            order.push(name.to_string());
            AgentEntry::new(name, capacity, height)
        })
    }

    fn is_active(&self, name: &str) -> bool {
        self.order.get(self.active).is_some_and(|n| n == name)
    }

    pub fn append(&mut self, out: &AgentOutput) {
        let auto_scroll = self.auto_scroll;
        let active = self.order.is_empty() || self.is_active(&out.agent);
        let entry = self.entry_mut(&out.agent);
        entry.output.append(out.line.clone());
        if active {
            entry.viewport.set_total(entry.output.len());
            if auto_scroll {
                entry.viewport.goto_bottom();
            }
        }
    }

    pub fn set_status(&mut self, msg: &AgentStatusMsg) {
        let entry = self.entry_mut(&msg.agent);
        entry.status = msg.status;
        if !msg.task.is_empty() {
            entry.task = msg.task.clone();
        }
    }

    /// Inner text height of the panel
    pub fn set_height(&mut self, height: usize) {
        self.height = height;
        self.sync_active();
    }

    fn sync_active(&mut self) {
        let (height, auto_scroll) = (self.height, self.auto_scroll);
        let Some(name) = self.order.get(self.active) else {
            return;
        };
        if let Some(entry) = self.agents.get_mut(name) {
            entry.viewport.set_height(height);
            entry.viewport.set_total(entry.output.len());
            if auto_scroll {
                entry.viewport.goto_bottom();
            }
        }
    }

    pub fn next_tab(&mut self) {
        if self.order.is_empty() {
            return;
        }
        self.active = (self.active + 1) % self.order.len();
        self.sync_active();
    }

    pub fn prev_tab(&mut self) {
        if self.order.is_empty() {
            return;
        }
        self.active = (self.active + self.order.len() - 1) % self.order.len();
        self.sync_active();
    }

    pub fn scroll(&mut self, action: Scroll) {
        let current = self.auto_scroll;
        let Some(name) = self.order.get(self.active) else {
            return;
        };
        if let Some(entry) = self.agents.get_mut(name) {
            entry.viewport.scroll(action);
            self.auto_scroll = auto_scroll_after(action, &entry.viewport, current);
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Handled {
        match key.code {
            // Tab doubles as focus movement when there is nothing to switch between.
            KeyCode::Tab if self.order.len() > 1 => {
                self.next_tab();
                Handled::Consumed
            }
            KeyCode::BackTab if self.order.len() > 1 => {
                self.prev_tab();
                Handled::Consumed
            }
            KeyCode::Right if key.modifiers == KeyModifiers::NONE => {
                self.next_tab();
                Handled::Consumed
            }
            KeyCode::Left if key.modifiers == KeyModifiers::NONE => {
                self.prev_tab();
                Handled::Consumed
            }
            _ => match scroll_for_key(&key) {
                Some(action) => {
                    self.scroll(action);
                    Handled::Consumed
                }
                None => Handled::Bubble(key),
            },
        }
    }

    pub fn active(&self) -> Option<&AgentEntry> {
        self.order.get(self.active).and_then(|n| self.agents.get(n))
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    /// Lines currently inside the active viewport
    pub fn visible_lines(&self) -> Vec<String> {
        self.active()
            .map(|e| e.output.window(e.viewport.offset(), e.viewport.height()))
            .unwrap_or_default()
    }

    /// Agents in first-seen order
    pub fn agents(&self) -> impl Iterator<Item = &AgentEntry> {
        self.order.iter().filter_map(|n| self.agents.get(n))
    }

    pub fn get(&self, name: &str) -> Option<&AgentEntry> {
        self.agents.get(name)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::OutputStream;
    use chrono::Utc;

    fn out(agent: &str, line: &str) -> AgentOutput {
        AgentOutput {
            agent: agent.into(),
            line: line.into(),
            stream: OutputStream::Stdout,
            timestamp: Utc::now(),
        }
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn panel_with(lines: usize) -> AgentPanel {
        let mut p = AgentPanel::new(100);
        p.set_height(5);
        for i in 0..lines {
            p.append(&out("claude", &format!("line {}", i)));
        }
        p
    }

    #[test]
    fn test_agents_created_on_demand_in_order() {
        let mut p = AgentPanel::new(10);
        p.append(&out("b", "1"));
        p.append(&out("a", "1"));
        p.append(&out("b", "2"));
        let names: Vec<_> = p.agents().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(p.get("b").unwrap().output.len(), 2);
    }

    #[test]
    fn test_tab_bubbles_with_single_agent() {
        let mut p = panel_with(1);
        let tab = key(KeyCode::Tab);
        assert_eq!(p.handle_key(tab), Handled::Bubble(tab));
        let back = key(KeyCode::BackTab);
        assert_eq!(p.handle_key(back), Handled::Bubble(back));

        let mut empty = AgentPanel::new(10);
        assert_eq!(empty.handle_key(tab), Handled::Bubble(tab));
    }

    #[test]
    fn test_tab_cycles_and_wraps() {
        let mut p = AgentPanel::new(10);
        for name in ["a", "b", "c"] {
            p.append(&out(name, "x"));
        }
        assert_eq!(p.handle_key(key(KeyCode::Tab)), Handled::Consumed);
        assert_eq!(p.active().unwrap().name, "b");
        p.handle_key(key(KeyCode::Tab));
        p.handle_key(key(KeyCode::Tab));
        assert_eq!(p.active().unwrap().name, "a");
        p.handle_key(key(KeyCode::BackTab));
        assert_eq!(p.active().unwrap().name, "c");
    }

    #[test]
    fn test_auto_scroll_semantics() {
        let mut p = panel_with(20);
        assert!(p.auto_scroll);
        assert_eq!(p.visible_lines().last().unwrap(), "line 19");

        p.handle_key(key(KeyCode::Char('k')));
        assert!(!p.auto_scroll);
        p.append(&out("claude", "line 20"));
        assert_eq!(p.visible_lines().last().unwrap(), "line 18", "view stays put");

        p.handle_key(key(KeyCode::Char('j')));
        p.handle_key(key(KeyCode::Char('j')));
        assert!(p.auto_scroll, "reaching the bottom re-enables");

        p.handle_key(key(KeyCode::Home));
        assert!(!p.auto_scroll);
        p.handle_key(key(KeyCode::End));
        assert!(p.auto_scroll);
        p.append(&out("claude", "line 21"));
        assert_eq!(p.visible_lines().last().unwrap(), "line 21");
    }

    #[test]
    fn test_upward_scroll_on_short_output_disables() {
        let mut p = panel_with(2);
        p.scroll(Scroll::LineUp);
        assert!(!p.auto_scroll);
        p.scroll(Scroll::LineDown);
        assert!(p.auto_scroll);
    }

    #[test]
    fn test_background_agent_viewport_untouched() {
        let mut p = panel_with(3);
        p.append(&out("codex", "bg 1"));
        p.append(&out("codex", "bg 2"));
        assert_eq!(p.get("codex").unwrap().viewport.total(), 0);

        p.next_tab();
        let codex = p.active().unwrap();
        assert_eq!(codex.name, "codex");
        assert_eq!(codex.viewport.total(), 2);
        assert_eq!(p.visible_lines(), vec!["bg 1", "bg 2"]);
    }

    #[test]
    fn test_status_creates_entry() {
        let mut p = AgentPanel::new(10);
        p.set_status(&AgentStatusMsg {
            agent: "gemini".into(),
            status: AgentStatus::RateLimited,
            task: "T-1".into(),
            detail: String::new(),
            timestamp: Utc::now(),
        });
        let e = p.get("gemini").unwrap();
        assert_eq!(e.status, AgentStatus::RateLimited);
        assert_eq!(e.task, "T-1");
        assert!(e.output.is_empty());
    }
}
