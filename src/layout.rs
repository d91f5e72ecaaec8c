//! Geometry for drawing a report as a zoomable timeline.
//!
//! [`Layout`] holds the zoom-independent metrics of one report (record
//! depths, thread row heights, total height) and answers zoom-dependent
//! queries against a [`Viewport`]: time/pixel scale, scroll clamping, ruler
//! ticks and record rectangles. The report itself is never touched; a new
//! zoom or window size only changes the viewport.
//!
//! Pixel space: x grows with time, `0` is time zero at the current zoom;
//! y grows downwards from the top of the widget, with the ruler on top.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::duration::format_duration;
use crate::report::{RecordId, RecordKind, Report, Thread, ThreadId};

#[derive(Debug, Clone, PartialEq)]
pub struct LayoutConfig {
    /// Pixels per second at the default zoom.
    pub base_pixels_per_second: f64,
    pub default_zoom: f64,
    /// Zoom never drops below this, keeping the scale positive.
    pub min_zoom: f64,
    /// Zoom change for one keyboard step or wheel notch.
    pub zoom_step: f64,
    pub thread_title_height: f64,
    pub record_row_height: f64,
    /// Extra scroll room below the report, as a fraction of its height.
    pub visible_margin: f64,
    pub ruler_height: f64,
    /// Gap between the ruler and the first thread.
    pub ruler_gap: f64,
    /// Pixel distance between ruler ticks.
    pub ruler_step: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            base_pixels_per_second: 128.0,
            default_zoom: 1000.0,
            min_zoom: 10.0,
            zoom_step: 250.0,
            thread_title_height: 32.0,
            record_row_height: 16.0,
            visible_margin: 0.1,
            ruler_height: 24.0,
            ruler_gap: 12.0,
            ruler_step: 24.0,
        }
    }
}

/// Largest viewport width or height, in pixels, that geometry is produced
/// for.
pub const MAX_VIEWPORT_EXTENT: f64 = 100_000.0;

/// The visible window onto the timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
    pub zoom: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

impl Viewport {
    pub fn new(width: f64, height: f64, config: &LayoutConfig) -> Self {
        Self {
            width,
            height,
            zoom: config.default_zoom,
            offset_x: 0.0,
            offset_y: 0.0,
        }
    }

    /// Why this viewport cannot be laid out, if it cannot.
    pub fn check(&self) -> Result<(), String> {
        for (what, value) in [("width", self.width), ("height", self.height)] {
            let usable = value > 0.0 && value <= MAX_VIEWPORT_EXTENT;
            if !usable {
                return Err(format!("{what} {value} outside 0..={MAX_VIEWPORT_EXTENT} pixels"));
            }
        }
        if !self.zoom.is_finite() {
            return Err(format!("zoom {} is not finite", self.zoom));
        }
        for (what, value) in [("offset_x", self.offset_x), ("offset_y", self.offset_y)] {
            if !value.is_finite() {
                return Err(format!("{what} {value} is not finite"));
            }
        }
        Ok(())
    }
}

/// Allowed offset ranges after clamping, and whether scrolling is possible.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollExtent {
    pub x: (f64, f64),
    pub y: (f64, f64),
    pub horizontal: bool,
    pub vertical: bool,
}

/// One ruler mark. Every other tick, starting with the first, is primary
/// and carries a time label.
#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    pub x: f64,
    pub time: f64,
    pub primary: bool,
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThreadRow {
    pub thread: ThreadId,
    pub title: String,
    /// Top of the title strip, in widget pixels.
    pub y: f64,
    pub height: f64,
}

/// Screen rectangle of one record.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordBox {
    pub id: RecordId,
    pub thread: ThreadId,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub label: String,
}

impl RecordBox {
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x && x <= self.x + self.width && y >= self.y && y < self.y + self.height
    }
}

#[derive(Debug, Clone)]
pub struct Layout {
    report: Arc<Report>,
    config: LayoutConfig,
    depths: Vec<u32>,
    thread_heights: BTreeMap<ThreadId, f64>,
    total_height: f64,
}

impl Layout {
    pub fn new(report: Arc<Report>, config: LayoutConfig) -> Self {
        // Children precede parents in the arena, so one forward pass
        // computes every subtree depth.
        let mut depths: Vec<u32> = Vec::with_capacity(report.record_count());
        for record in report.records() {
            let deepest_child = record
                .enclosed
                .iter()
                .map(|c| depths[c.index()])
                .max()
                .unwrap_or(0);
            depths.push(1 + deepest_child);
        }

        let mut thread_heights = BTreeMap::new();
        let mut total_height = 0.0;
        for (&id, thread) in report.threads() {
            let rows = thread
                .records
                .iter()
                .map(|r| depths[r.index()])
                .max()
                .unwrap_or(0);
            let height = config.thread_title_height + f64::from(rows) * config.record_row_height;
            thread_heights.insert(id, height);
            total_height += height;
        }

        Self {
            report,
            config,
            depths,
            thread_heights,
            total_height,
        }
    }

    pub fn report(&self) -> &Arc<Report> {
        &self.report
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    /// Height of the subtree rooted at `id`; a leaf is 1.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not belong to the report this layout was built
    /// from. [`Layout::try_depth_of`] returns `None` instead.
    pub fn depth_of(&self, id: RecordId) -> u32 {
        self.depths[id.index()]
    }

    pub fn try_depth_of(&self, id: RecordId) -> Option<u32> {
        self.depths.get(id.index()).copied()
    }

    /// Title strip plus one row per nesting level of the thread's records.
    pub fn height_of(&self, thread: &Thread) -> f64 {
        self.thread_heights
            .get(&thread.id)
            .copied()
            .unwrap_or(self.config.thread_title_height)
    }

    /// Sum of all thread heights.
    pub fn total_height(&self) -> f64 {
        self.total_height
    }

    pub fn clamp_zoom(&self, zoom: f64) -> f64 {
        if zoom.is_nan() {
            return self.config.default_zoom;
        }
        zoom.max(self.config.min_zoom)
    }

    pub fn pixels_per_second(&self, zoom: f64) -> f64 {
        self.config.base_pixels_per_second * self.clamp_zoom(zoom) / self.config.default_zoom
    }

    pub fn seconds_per_pixel(&self, zoom: f64) -> f64 {
        1.0 / self.pixels_per_second(zoom)
    }

    /// Pixel x of the report's first and last instant at `zoom`.
    pub fn report_extent_px(&self, zoom: f64) -> (f64, f64) {
        let pps = self.pixels_per_second(zoom);
        (self.report.start_time() * pps, self.report.end_time() * pps)
    }

    /// Vertical room beyond the visible area, 0 when everything fits.
    pub fn extra_height(&self, viewport: &Viewport) -> f64 {
        let visible = viewport.height - self.config.ruler_height - self.config.ruler_gap;
        let extra = self.total_height * (1.0 + self.config.visible_margin) - visible;
        extra.max(0.0)
    }

    /// Range for a horizontal scrollbar widget, with a margin on both ends;
    /// `None` when the whole report fits.
    pub fn horizontal_scrollbar_range(&self, viewport: &Viewport) -> Option<(f64, f64)> {
        let (start_px, end_px) = self.report_extent_px(viewport.zoom);
        let extra = end_px - start_px - viewport.width;
        if extra <= 0.0 {
            return None;
        }
        let margin = self.config.visible_margin;
        Some((
            start_px - extra * margin / 2.0,
            start_px + extra * (1.0 + margin / 2.0),
        ))
    }

    /// Pull the viewport's zoom and offsets back into range.
    pub fn clamp(&self, viewport: &mut Viewport) -> ScrollExtent {
        viewport.zoom = self.clamp_zoom(viewport.zoom);

        let (start_px, end_px) = self.report_extent_px(viewport.zoom);
        let horizontal = end_px - start_px > viewport.width;
        viewport.offset_x = if horizontal && !viewport.offset_x.is_nan() {
            viewport.offset_x.clamp(start_px, end_px)
        } else {
            start_px
        };

        let extra = self.extra_height(viewport);
        let vertical = extra > 0.0;
        viewport.offset_y = if vertical && !viewport.offset_y.is_nan() {
            viewport.offset_y.clamp(0.0, extra)
        } else {
            0.0
        };

        ScrollExtent {
            x: (start_px, end_px),
            y: (0.0, extra),
            horizontal,
            vertical,
        }
    }

    pub fn set_zoom(&self, viewport: &mut Viewport, zoom: f64) -> ScrollExtent {
        viewport.zoom = zoom;
        self.clamp(viewport)
    }

    /// Change zoom by `steps` multiples of the configured zoom step.
    pub fn zoom_by(&self, viewport: &mut Viewport, steps: f64) -> ScrollExtent {
        self.set_zoom(viewport, viewport.zoom + steps * self.config.zoom_step)
    }

    pub fn scroll_by(&self, viewport: &mut Viewport, dx: f64, dy: f64) -> ScrollExtent {
        viewport.offset_x += dx;
        viewport.offset_y += dy;
        self.clamp(viewport)
    }

    pub fn resize(&self, viewport: &mut Viewport, width: f64, height: f64) -> ScrollExtent {
        viewport.width = width;
        viewport.height = height;
        self.clamp(viewport)
    }

    /// Ticks across the visible width, one every `ruler_step` pixels.
    ///
    /// Widths past [`MAX_VIEWPORT_EXTENT`] are ruled only up to that bound.
    pub fn ruler_ticks(&self, viewport: &Viewport) -> Vec<Tick> {
        let spp = self.seconds_per_pixel(viewport.zoom);
        let step = self.config.ruler_step;
        let usable = step > 0.0 && viewport.width > 0.0 && !viewport.offset_x.is_nan();
        if !usable {
            return Vec::new();
        }

        // Report origin on screen; ticks start there when it is visible.
        let origin = (-viewport.offset_x).max(0.0);
        let scrolled = viewport.offset_x.max(0.0);

        let count = (viewport.width.min(MAX_VIEWPORT_EXTENT) / step).ceil() as usize;
        (0..count)
            .map(|i| {
                let s = i as f64 * step;
                let time = (s + scrolled) * spp;
                let primary = i % 2 == 0;
                Tick {
                    x: s + origin,
                    time,
                    primary,
                    label: primary.then(|| format_duration(time)),
                }
            })
            .collect()
    }

    /// Title strip position of every thread, in iteration order.
    pub fn thread_rows(&self, viewport: &Viewport) -> Vec<ThreadRow> {
        let mut y = self.content_top(viewport);
        let mut rows = Vec::with_capacity(self.report.threads().len());
        for thread in self.report.threads().values() {
            let height = self.height_of(thread);
            rows.push(ThreadRow {
                thread: thread.id,
                title: thread.name.clone(),
                y,
                height,
            });
            y += height;
        }
        rows
    }

    /// Rectangles of the records that intersect the viewport.
    pub fn record_boxes(&self, viewport: &Viewport) -> Vec<RecordBox> {
        let pps = self.pixels_per_second(viewport.zoom);
        let row = self.config.record_row_height;
        let mut boxes = Vec::new();

        for thread_row in self.thread_rows(viewport) {
            let Some(thread) = self.report.thread(thread_row.thread) else {
                continue;
            };
            let first_row = thread_row.y + self.config.thread_title_height;
            if thread_row.y > viewport.height {
                break;
            }
            if thread_row.y + thread_row.height < 0.0 {
                continue;
            }

            let mut stack: Vec<(u32, RecordId)> =
                thread.records.iter().rev().map(|&id| (0, id)).collect();
            while let Some((level, id)) = stack.pop() {
                let record = self.report.record(id);
                let x = record.time_start * pps - viewport.offset_x;
                let width = record.duration() * pps;
                let y = first_row + f64::from(level) * row;

                // Children sit inside the parent horizontally and below it
                // vertically, so either miss prunes the whole subtree.
                if x > viewport.width || x + width < 0.0 || y > viewport.height {
                    continue;
                }
                stack.extend(record.enclosed.iter().rev().map(|&c| (level + 1, c)));
                if y + row < 0.0 {
                    continue;
                }

                let label = match record.kind {
                    RecordKind::Scope => {
                        format!("{} {}", record.name, format_duration(record.duration()))
                    }
                    RecordKind::Instant => record.name.clone(),
                };
                boxes.push(RecordBox {
                    id,
                    thread: thread.id,
                    x,
                    y,
                    width,
                    height: row,
                    label,
                });
            }
        }
        boxes
    }

    /// Record under the given widget pixel. Rows never overlap, so at most
    /// one box matches away from shared edges.
    pub fn hit_test(&self, viewport: &Viewport, x: f64, y: f64) -> Option<RecordId> {
        self.record_boxes(viewport)
            .into_iter()
            .find(|b| b.contains(x, y))
            .map(|b| b.id)
    }

    fn content_top(&self, viewport: &Viewport) -> f64 {
        self.config.ruler_height + self.config.ruler_gap - viewport.offset_y
    }
}
