//! Viewport intersection tracking for the page column and the thumbnail
//! strip.
//!
//! Every frame the observer is handed the scroll position and the page
//! geometry; it reports only the pages whose state changed since the last
//! frame, as one batch. A page counts as intersecting when it overlaps the
//! viewport grown by the root margin (so renders start before a page scrolls
//! into view), while its ratio is the share of the page inside the viewport
//! itself.

use std::collections::BTreeMap;

use folio_application::VisibilityEvent;
use folio_core::Settings;

/// Ratio steps that trigger a fresh event for the page column.
pub const MAIN_THRESHOLDS: [f32; 7] = [0.0, 0.1, 0.3, 0.5, 0.7, 0.9, 1.0];
pub const THUMBNAIL_THRESHOLDS: [f32; 1] = [0.01];

/// Vertical extent of something in the scroll space, in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Span {
    pub top: f32,
    pub height: f32,
}

impl Span {
    pub fn new(top: f32, height: f32) -> Self {
        Self {
            top,
            height: height.max(0.0),
        }
    }

    pub fn bottom(&self) -> f32 {
        self.top + self.height
    }

    fn overlap(&self, other: &Span) -> f32 {
        (self.bottom().min(other.bottom()) - self.top.max(other.top)).max(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Observation {
    intersecting: bool,
    bucket: usize,
}

#[derive(Debug, Clone)]
pub struct IntersectionObserver {
    root_margin: f32,
    thresholds: Vec<f32>,
    observed: BTreeMap<u32, Observation>,
}

impl IntersectionObserver {
    pub fn new(root_margin: f32, thresholds: &[f32]) -> Self {
        let mut thresholds = thresholds.to_vec();
        thresholds.sort_by(f32::total_cmp);
        Self {
            root_margin: root_margin.max(0.0),
            thresholds,
            observed: BTreeMap::new(),
        }
    }

    pub fn for_pages(settings: &Settings) -> Self {
        Self::new(settings.main_root_margin_px as f32, &MAIN_THRESHOLDS)
    }

    pub fn for_thumbnails(settings: &Settings) -> Self {
        Self::new(settings.thumbnail_root_margin_px as f32, &THUMBNAIL_THRESHOLDS)
    }

    /// Forgets every page; the next `observe` reports from scratch.
    pub fn reset(&mut self) {
        self.observed.clear();
    }

    /// `targets[i]` is the extent of page `i + 1`.
    pub fn observe(&mut self, viewport: Span, targets: &[Span]) -> Vec<VisibilityEvent> {
        let root = Span::new(
            viewport.top - self.root_margin,
            viewport.height + 2.0 * self.root_margin,
        );
        let mut batch = Vec::new();

        for (idx, target) in targets.iter().enumerate() {
            let page = idx as u32 + 1;
            let intersecting = target.height > 0.0 && target.overlap(&root) > 0.0;
            let ratio = if target.height > 0.0 {
                (target.overlap(&viewport) / target.height).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let current = Observation {
                intersecting,
                bucket: self.bucket(ratio),
            };

            let changed = match self.observed.get(&page) {
                Some(previous) => *previous != current,
                None => intersecting,
            };
            self.observed.insert(page, current);
            if !changed {
                continue;
            }
            batch.push(if intersecting {
                VisibilityEvent::entered(page, ratio)
            } else {
                VisibilityEvent::left(page)
            });
        }

        let page_count = targets.len() as u32;
        let dropped: Vec<u32> = self
            .observed
            .range(page_count + 1..)
            .map(|(page, _)| *page)
            .collect();
        for page in dropped {
            if let Some(previous) = self.observed.remove(&page)
                && previous.intersecting
            {
                batch.push(VisibilityEvent::left(page));
            }
        }

        batch
    }

    fn bucket(&self, ratio: f32) -> usize {
        self.thresholds.partition_point(|step| *step <= ratio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(count: usize, height: f32, gap: f32) -> Vec<Span> {
        (0..count)
            .map(|idx| Span::new(idx as f32 * (height + gap), height))
            .collect()
    }

    fn pages(batch: &[VisibilityEvent]) -> Vec<(u32, bool)> {
        batch.iter().map(|e| (e.page, e.is_intersecting)).collect()
    }

    #[test]
    fn first_frame_reports_pages_inside_the_margin() {
        let mut observer = IntersectionObserver::new(600.0, &MAIN_THRESHOLDS);
        let targets = column(10, 800.0, 0.0);
        let batch = observer.observe(Span::new(0.0, 800.0), &targets);

        assert_eq!(pages(&batch), vec![(1, true), (2, true)]);
        assert_eq!(batch[0].ratio, 1.0);
        assert_eq!(batch[1].ratio, 0.0);
    }

    #[test]
    fn ratio_is_measured_against_the_viewport() {
        let mut observer = IntersectionObserver::new(0.0, &MAIN_THRESHOLDS);
        let targets = column(4, 100.0, 0.0);
        let batch = observer.observe(Span::new(40.0, 100.0), &targets);

        assert_eq!(pages(&batch), vec![(1, true), (2, true)]);
        assert!((batch[0].ratio - 0.6).abs() < 1e-6);
        assert!((batch[1].ratio - 0.4).abs() < 1e-6);
    }

    #[test]
    fn unchanged_frames_are_silent() {
        let mut observer = IntersectionObserver::new(0.0, &MAIN_THRESHOLDS);
        let targets = column(4, 100.0, 0.0);
        assert_eq!(observer.observe(Span::new(5.0, 100.0), &targets).len(), 2);
        assert!(observer.observe(Span::new(5.0, 100.0), &targets).is_empty());
        // 0.95 -> 0.94 and 0.05 -> 0.06 stay within their threshold steps.
        assert!(observer.observe(Span::new(6.0, 100.0), &targets).is_empty());
        assert_eq!(
            pages(&observer.observe(Span::new(20.0, 100.0), &targets)),
            vec![(1, true), (2, true)]
        );
    }

    #[test]
    fn scrolling_away_emits_leave_events() {
        let mut observer = IntersectionObserver::new(0.0, &MAIN_THRESHOLDS);
        let targets = column(6, 100.0, 10.0);
        observer.observe(Span::new(0.0, 100.0), &targets);
        let batch = observer.observe(Span::new(440.0, 100.0), &targets);

        assert!(batch.contains(&VisibilityEvent::left(1)));
        assert!(batch.iter().any(|e| e.page == 5 && e.is_intersecting));
    }

    #[test]
    fn shrinking_document_releases_vanished_pages() {
        let mut observer = IntersectionObserver::new(0.0, &THUMBNAIL_THRESHOLDS);
        observer.observe(Span::new(0.0, 500.0), &column(5, 100.0, 0.0));
        let batch = observer.observe(Span::new(0.0, 500.0), &column(2, 100.0, 0.0));
        assert_eq!(pages(&batch), vec![(3, false), (4, false), (5, false)]);
    }

    #[test]
    fn reset_reports_again() {
        let mut observer = IntersectionObserver::new(0.0, &THUMBNAIL_THRESHOLDS);
        let targets = column(2, 100.0, 0.0);
        observer.observe(Span::new(0.0, 100.0), &targets);
        observer.reset();
        assert_eq!(pages(&observer.observe(Span::new(0.0, 100.0), &targets)), vec![(1, true)]);
    }
}
