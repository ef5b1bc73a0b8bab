//! Scroll window over a line-indexed text region

/// Visible window of `height` lines starting at `offset` into `total` lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Viewport {
    offset: usize,
    height: usize,
    total: usize,
}

/// Scroll actions understood by panels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scroll {
    LineUp,
    LineDown,
    PageUp,
    PageDown,
    Home,
    End,
}

impl Scroll {
    pub fn is_upward(&self) -> bool {
        matches!(self, Scroll::LineUp | Scroll::PageUp | Scroll::Home)
    }
}

impl Viewport {
    pub fn new(height: usize) -> Self {
        Self {
            offset: 0,
            height,
            total: 0,
        }
    }

    pub fn max_offset(&self) -> usize {
        self.total.saturating_sub(self.height)
    }

    pub fn at_bottom(&self) -> bool {
        self.offset >= self.max_offset()
    }

    pub fn goto_bottom(&mut self) {
        self.offset = self.max_offset();
    }

    /// Update content length; keeps the offset in range.
    pub fn set_total(&mut self, total: usize) {
        self.total = total;
        self.offset = self.offset.min(self.max_offset());
    }

    pub fn set_height(&mut self, height: usize) {
        self.height = height;
        self.offset = self.offset.min(self.max_offset());
    }

    pub fn scroll(&mut self, action: Scroll) {
        let page = self.height.max(1);
        self.offset = match action {
            Scroll::LineUp => self.offset.saturating_sub(1),
            Scroll::LineDown => self.offset.saturating_add(1),
            Scroll::PageUp => self.offset.saturating_sub(page),
            Scroll::PageDown => self.offset.saturating_add(page),
            Scroll::Home => 0,
            Scroll::End => self.max_offset(),
        }
        .min(self.max_offset());
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn total(&self) -> usize {
        self.total
    }
}
