use crate::events::{EngineEvent, EventBus};
use crate::monitor::PerformanceMonitor;
use crate::record::Record;
use crate::resources::ResourceManager;
use crate::source::VirtualDataSource;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum LineStyle {
    #[default]
    Normal,
    Selected,
    Dimmed,
    Header,
    Accent,
    Warning,
    Error,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StyledLine {
    pub text: String,
    pub style: LineStyle,
}

impl StyledLine {
    pub fn new(text: impl Into<String>, style: LineStyle) -> Self {
        Self { text: text.into(), style }
    }

    pub fn plain(text: impl Into<String>) -> Self {
        Self::new(text, LineStyle::Normal)
    }
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("cannot render record {id}: {reason}")]
    Record { id: u64, reason: String },
    #[error("{0}")]
    Other(String),
}

/// Formats one record into one or more lines no wider than `width`.
pub trait ItemRenderer<R>: Send + Sync {
    fn render(&self, record: &R, width: usize) -> Result<Vec<StyledLine>, RenderError>;
}

pub trait RenderBuffer {
    fn width(&self) -> usize;
    fn height(&self) -> usize;
    fn set_line(&mut self, row: usize, line: StyledLine);
    fn clear(&mut self);
}

/// In-memory `RenderBuffer`; rows past `height` are ignored.
#[derive(Debug, Clone)]
pub struct LineBuffer {
    width: usize,
    lines: Vec<StyledLine>,
}

impl LineBuffer {
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, lines: vec![StyledLine::default(); height] }
    }

    pub fn lines(&self) -> &[StyledLine] {
        &self.lines
    }

    pub fn text(&self, row: usize) -> &str {
        self.lines.get(row).map(|l| l.text.as_str()).unwrap_or("")
    }

    pub fn style(&self, row: usize) -> LineStyle {
        self.lines.get(row).map(|l| l.style).unwrap_or_default()
    }
}

impl RenderBuffer for LineBuffer {
    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.lines.len()
    }

    fn set_line(&mut self, row: usize, line: StyledLine) {
        if let Some(slot) = self.lines.get_mut(row) {
            *slot = line;
        }
    }

    fn clear(&mut self) {
        for l in &mut self.lines {
            *l = StyledLine::default();
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub items_rendered: usize,
    pub rows_written: usize,
    pub failures: usize,
}

/// Fixed-size window over a `VirtualDataSource`. Holds a scroll offset in
/// `[0, max_scroll_position()]` and a cursor that always stays on screen.
pub struct VirtualScrollingViewport<R: Record> {
    source: VirtualDataSource<R>,
    width: usize,
    height: usize,
    offset: usize,
    cursor: usize,
    renderer: Option<Arc<dyn ItemRenderer<R>>>,
    bus: Option<Arc<EventBus>>,
    resources: Arc<ResourceManager>,
    monitor: Option<Arc<PerformanceMonitor>>,
}

impl<R: Record> VirtualScrollingViewport<R> {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            source: VirtualDataSource::empty(),
            width: width.max(1),
            height: height.max(1),
            offset: 0,
            cursor: 0,
            renderer: None,
            bus: None,
            resources: Arc::new(ResourceManager::new()),
            monitor: None,
        }
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn with_resources(mut self, resources: Arc<ResourceManager>) -> Self {
        self.resources = resources;
        self
    }

    pub fn with_monitor(mut self, monitor: Arc<PerformanceMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn set_item_renderer(&mut self, renderer: Arc<dyn ItemRenderer<R>>) {
        self.renderer = Some(renderer);
    }

    pub fn set_data_source(&mut self, source: VirtualDataSource<R>) {
        self.source = source;
        self.cursor = 0;
        self.set_offset(0);
    }

    pub fn source(&self) -> &VirtualDataSource<R> {
        &self.source
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn total_count(&self) -> usize {
        self.source.total_count()
    }

    pub fn scroll_position(&self) -> usize {
        self.offset
    }

    pub fn max_scroll_position(&self) -> usize {
        self.source.total_count().saturating_sub(self.height)
    }

    pub fn scroll_to(&mut self, position: usize) {
        let target = position.min(self.max_scroll_position());
        self.set_offset(target);
        // keep the cursor inside the window
        let last_visible = (self.offset + self.height).min(self.total_count()).saturating_sub(1);
        self.cursor = self.cursor.clamp(self.offset, last_visible.max(self.offset));
    }

    pub fn scroll_by(&mut self, delta: isize) {
        self.scroll_to(offset_by(self.offset, delta));
    }

    pub fn visible_items(&self) -> &[Arc<R>] {
        self.source.get_range(self.offset, self.height)
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn selected_item(&self) -> Option<&Arc<R>> {
        self.source.get_item(self.cursor).ok()
    }

    pub fn move_cursor(&mut self, delta: isize) {
        let total = self.total_count();
        if total == 0 {
            self.cursor = 0;
            return;
        }
        self.cursor = offset_by(self.cursor, delta).min(total - 1);
        if self.cursor < self.offset {
            self.scroll_to(self.cursor);
        } else if self.cursor >= self.offset + self.height {
            self.scroll_to(self.cursor + 1 - self.height);
        }
    }

    pub fn page_down(&mut self) {
        self.move_cursor(self.height as isize);
    }

    pub fn page_up(&mut self) {
        self.move_cursor(-(self.height as isize));
    }

    pub fn scroll_to_top(&mut self) {
        self.cursor = 0;
        self.scroll_to(0);
    }

    pub fn scroll_to_bottom(&mut self) {
        self.cursor = self.total_count().saturating_sub(1);
        let max = self.max_scroll_position();
        self.scroll_to(max);
    }

    pub fn resize(&mut self, width: usize, height: usize) {
        self.width = width.max(1);
        self.height = height.max(1);
        let cursor = self.cursor;
        self.scroll_to(self.offset);
        // re-clamping the offset may have dragged the cursor; put it back if possible
        self.cursor = cursor.min(self.total_count().saturating_sub(1));
        self.move_cursor(0);
    }

    /// Packs rendered lines of the visible records into `buffer`. A record
    /// whose renderer errors or panics gets a single placeholder line.
    pub fn render_to_buffer(&self, buffer: &mut dyn RenderBuffer) -> RenderStats {
        let _timing = self.monitor.as_ref().map(|m| m.start("viewport.render"));
        buffer.clear();
        let rows = buffer.height();
        let width = buffer.width().max(1);
        let mut stats = RenderStats::default();
        let mut scratch = self.resources.lines().get();

        for (i, record) in self.visible_items().iter().enumerate() {
            if stats.rows_written >= rows {
                break;
            }
            scratch.clear();
            match &self.renderer {
                Some(renderer) => match catch_unwind(AssertUnwindSafe(|| renderer.render(record, width))) {
                    Ok(Ok(lines)) => scratch.extend(lines),
                    Ok(Err(e)) => {
                        tracing::warn!(record = record.id(), error = %e, "item renderer failed");
                        stats.failures += 1;
                        scratch.push(placeholder(record.id()));
                    }
                    Err(_) => {
                        tracing::warn!(record = record.id(), "item renderer panicked");
                        stats.failures += 1;
                        scratch.push(placeholder(record.id()));
                    }
                },
                None => scratch.push(StyledLine::plain(format!("{:>5} {}", record.id(), record.description()))),
            }
            let selected = self.offset + i == self.cursor;
            for mut line in scratch.drain(..) {
                if stats.rows_written >= rows {
                    break;
                }
                fit_width(&mut line.text, width);
                if selected {
                    line.style = LineStyle::Selected;
                }
                buffer.set_line(stats.rows_written, line);
                stats.rows_written += 1;
            }
            stats.items_rendered += 1;
        }

        self.resources.lines().put(scratch);
        stats
    }

    fn set_offset(&mut self, offset: usize) {
        if offset == self.offset {
            return;
        }
        self.offset = offset;
        if let Some(bus) = &self.bus {
            bus.publish(&EngineEvent::ViewportScrolled { scroll_position: offset });
        }
    }
}

fn offset_by(base: usize, delta: isize) -> usize {
    if delta < 0 {
        base.saturating_sub(delta.unsigned_abs())
    } else {
        base.saturating_add(delta as usize)
    }
}

fn placeholder(id: u64) -> StyledLine {
    StyledLine::new(format!("<unable to render record {id}>"), LineStyle::Error)
}

fn fit_width(text: &mut String, width: usize) {
    if let Some((cut, _)) = text.char_indices().nth(width) {
        text.truncate(cut);
    }
}
