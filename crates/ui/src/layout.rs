//! Geometry of the continuous page column and the thumbnail strip.
//!
//! Pages are stacked top to bottom in a pixel scroll space; the terminal
//! cell size converts between that space and rows/columns.

use folio_core::PageSize;
use ratatui::layout::Rect;

use crate::observer::Span;

/// Vertical gap between two pages, in pixels.
pub const PAGE_GAP_PX: f32 = 12.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellSize {
    pub width: u16,
    pub height: u16,
}

impl CellSize {
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
        }
    }

    pub fn cols_for(&self, px: f32) -> u16 {
        let cols = (px.max(0.0) / f32::from(self.width)).ceil();
        cols.min(f32::from(u16::MAX)) as u16
    }

    pub fn rows_for(&self, px: f32) -> u16 {
        let rows = (px.max(0.0) / f32::from(self.height)).ceil();
        rows.min(f32::from(u16::MAX)) as u16
    }

    pub fn px_for_rows(&self, rows: u16) -> f32 {
        f32::from(rows) * f32::from(self.height)
    }

    pub fn px_for_cols(&self, cols: u16) -> f32 {
        f32::from(cols) * f32::from(self.width)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnLayout {
    spans: Vec<Span>,
    widths: Vec<f32>,
    gap: f32,
}

impl ColumnLayout {
    /// `extra_height` is added below every page (label rows of thumbnails).
    pub fn build(sizes: impl IntoIterator<Item = PageSize>, gap: f32, extra_height: f32) -> Self {
        let mut spans = Vec::new();
        let mut widths = Vec::new();
        let mut top = gap / 2.0;
        for size in sizes {
            let height = size.height.max(1.0) + extra_height;
            spans.push(Span::new(top, height));
            widths.push(size.width.max(1.0));
            top += height + gap;
        }
        Self { spans, widths, gap }
    }

    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    pub fn span(&self, page: u32) -> Option<Span> {
        let idx = page.checked_sub(1)? as usize;
        self.spans.get(idx).copied()
    }

    pub fn width(&self, page: u32) -> Option<f32> {
        let idx = page.checked_sub(1)? as usize;
        self.widths.get(idx).copied()
    }

    pub fn total_height(&self) -> f32 {
        self.spans
            .last()
            .map(|span| span.bottom() + self.gap / 2.0)
            .unwrap_or(0.0)
    }

    pub fn max_scroll(&self, viewport_height: f32) -> f32 {
        (self.total_height() - viewport_height).max(0.0)
    }

    pub fn clamp_scroll(&self, top: f32, viewport_height: f32) -> f32 {
        top.clamp(0.0, self.max_scroll(viewport_height))
    }

    /// Scroll offset that puts the top of `page` at the top of the viewport.
    pub fn scroll_target(&self, page: u32, viewport_height: f32) -> Option<f32> {
        let span = self.span(page)?;
        Some(self.clamp_scroll(span.top - self.gap / 2.0, viewport_height))
    }

    /// Smallest scroll change that brings `page` fully into view.
    pub fn reveal(&self, page: u32, scroll_top: f32, viewport_height: f32) -> Option<f32> {
        let span = self.span(page)?;
        let top = if span.top < scroll_top {
            span.top - self.gap / 2.0
        } else if span.bottom() > scroll_top + viewport_height {
            span.bottom() + self.gap / 2.0 - viewport_height
        } else {
            scroll_top
        };
        Some(self.clamp_scroll(top, viewport_height))
    }

    /// Pages overlapping `viewport`, in order.
    pub fn visible(&self, viewport: Span) -> impl Iterator<Item = (u32, Span)> + '_ {
        let start = self
            .spans
            .partition_point(|span| span.bottom() <= viewport.top);
        self.spans[start..]
            .iter()
            .enumerate()
            .take_while(move |(_, span)| span.top < viewport.bottom())
            .map(move |(offset, span)| ((start + offset) as u32 + 1, *span))
    }
}

/// Where a page lands on screen and which of its pixel rows are shown.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PagePlacement {
    pub page: u32,
    pub area: Rect,
    /// Shown slice of the page, in page pixels from its top.
    pub clip_top: f32,
    pub clip_bottom: f32,
    /// Shown slice of the page width, in page pixels from its left edge.
    pub clip_left: f32,
    pub clip_right: f32,
}

impl PagePlacement {
    pub fn clip_height(&self) -> f32 {
        self.clip_bottom - self.clip_top
    }

    pub fn clip_width(&self) -> f32 {
        self.clip_right - self.clip_left
    }
}

/// Maps the visible pages of `layout` onto `area`, centring narrow pages and
/// clipping wide ones symmetrically.
pub fn place_pages(
    layout: &ColumnLayout,
    scroll_top: f32,
    area: Rect,
    cell: CellSize,
) -> Vec<PagePlacement> {
    let viewport = Span::new(scroll_top, cell.px_for_rows(area.height));
    let area_width_px = cell.px_for_cols(area.width);
    let mut out = Vec::new();

    for (page, span) in layout.visible(viewport) {
        let page_width = layout.width(page).unwrap_or(area_width_px);
        let shown_top = span.top.max(viewport.top);
        let shown_bottom = span.bottom().min(viewport.bottom());
        if shown_bottom <= shown_top {
            continue;
        }

        let row = ((shown_top - viewport.top) / f32::from(cell.height)).floor() as u16;
        let row_end = cell
            .rows_for(shown_bottom - viewport.top)
            .min(area.height);
        if row_end <= row {
            continue;
        }

        let (clip_left, clip_right) = if page_width > area_width_px {
            let excess = page_width - area_width_px;
            (excess / 2.0, page_width - excess / 2.0)
        } else {
            (0.0, page_width)
        };
        let cols = cell.cols_for(clip_right - clip_left).clamp(1, area.width.max(1));
        let x = area.x + area.width.saturating_sub(cols) / 2;

        out.push(PagePlacement {
            page,
            area: Rect::new(x, area.y + row, cols, row_end - row),
            clip_top: shown_top - span.top,
            clip_bottom: shown_bottom - span.top,
            clip_left,
            clip_right,
        });
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform(count: usize, width: f32, height: f32) -> ColumnLayout {
        ColumnLayout::build(
            std::iter::repeat_n(PageSize::new(width, height), count),
            PAGE_GAP_PX,
            0.0,
        )
    }

    #[test]
    fn pages_stack_with_gaps() {
        let layout = uniform(3, 600.0, 800.0);
        assert_eq!(layout.span(1), Some(Span::new(6.0, 800.0)));
        assert_eq!(layout.span(2), Some(Span::new(818.0, 800.0)));
        assert_eq!(layout.total_height(), 3.0 * 812.0);
        assert_eq!(layout.span(0), None);
        assert_eq!(layout.span(4), None);
    }

    #[test]
    fn scroll_target_is_clamped_to_the_end() {
        let layout = uniform(3, 600.0, 800.0);
        assert_eq!(layout.scroll_target(2, 400.0), Some(812.0));
        assert_eq!(layout.scroll_target(3, 2000.0), Some(layout.max_scroll(2000.0)));
    }

    #[test]
    fn visible_pages_follow_the_viewport() {
        let layout = uniform(10, 600.0, 800.0);
        let pages: Vec<u32> = layout
            .visible(Span::new(1000.0, 1000.0))
            .map(|(page, _)| page)
            .collect();
        assert_eq!(pages, vec![2, 3]);
    }

    #[test]
    fn reveal_scrolls_minimally() {
        let layout = uniform(10, 100.0, 100.0);
        // Page 5 spans 454..554.
        assert_eq!(layout.reveal(5, 0.0, 300.0), Some(560.0 - 300.0));
        assert_eq!(layout.reveal(5, 500.0, 300.0), Some(448.0));
        assert_eq!(layout.reveal(5, 400.0, 300.0), Some(400.0));
    }

    #[test]
    fn placement_clips_partially_visible_pages() {
        let layout = uniform(4, 200.0, 400.0);
        let cell = CellSize::new(10, 20);
        let area = Rect::new(0, 0, 40, 20);
        // Viewport 206..606 shows the bottom half of page 1 and the top of page 2.
        let placed = place_pages(&layout, 206.0, area, cell);

        assert_eq!(placed.len(), 2);
        assert_eq!(placed[0].page, 1);
        assert_eq!(placed[0].clip_top, 200.0);
        assert_eq!(placed[0].clip_bottom, 400.0);
        assert_eq!(placed[0].area, Rect::new(10, 0, 20, 10));
        assert_eq!(placed[1].page, 2);
        assert_eq!(placed[1].clip_top, 0.0);
        assert_eq!(placed[1].clip_bottom, 188.0);
    }

    #[test]
    fn wide_pages_are_clipped_horizontally() {
        let layout = uniform(1, 1000.0, 100.0);
        let placed = place_pages(&layout, 0.0, Rect::new(0, 0, 40, 10), CellSize::new(10, 20));
        assert_eq!(placed[0].clip_left, 300.0);
        assert_eq!(placed[0].clip_right, 700.0);
        assert_eq!(placed[0].area.width, 40);
    }
}
