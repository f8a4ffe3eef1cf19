//! Reconciles batched visibility notifications into a single current page.

use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibilityEvent {
    pub page: u32,
    pub ratio: f32,
    pub is_intersecting: bool,
}

impl VisibilityEvent {
    pub fn entered(page: u32, ratio: f32) -> Self {
        Self {
            page,
            ratio,
            is_intersecting: true,
        }
    }

    pub fn left(page: u32) -> Self {
        Self {
            page,
            ratio: 0.0,
            is_intersecting: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct VisibilityAggregator {
    visible: BTreeMap<u32, f32>,
    threshold: f32,
}

impl VisibilityAggregator {
    pub fn new(threshold: f32) -> Self {
        Self {
            visible: BTreeMap::new(),
            threshold,
        }
    }

    pub fn clear(&mut self) {
        self.visible.clear();
    }

    pub fn len(&self) -> usize {
        self.visible.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visible.is_empty()
    }

    pub fn ratio(&self, page: u32) -> Option<f32> {
        self.visible.get(&page).copied()
    }

    pub fn apply(&mut self, batch: &[VisibilityEvent]) {
        for event in batch {
            if event.is_intersecting {
                let ratio = if event.ratio.is_nan() {
                    0.0
                } else {
                    event.ratio.clamp(0.0, 1.0)
                };
                self.visible.insert(event.page, ratio);
            } else {
                self.visible.remove(&event.page);
            }
        }
    }

    /// Page with the largest ratio; ties go to the smallest page number.
    pub fn most_visible(&self) -> Option<(u32, f32)> {
        let mut best: Option<(u32, f32)> = None;
        for (&page, &ratio) in &self.visible {
            match best {
                Some((_, best_ratio)) if ratio <= best_ratio => {}
                _ => best = Some((page, ratio)),
            }
        }
        best
    }

    /// Applies the batch and returns the page that should become current,
    /// if any. Nothing changes hands while a programmatic scroll is in
    /// flight, when only slivers are showing, or when the winner already is
    /// the current page.
    pub fn reconcile(
        &mut self,
        batch: &[VisibilityEvent],
        current_page: u32,
        programmatic_scroll: bool,
    ) -> Option<u32> {
        self.apply(batch);
        if programmatic_scroll {
            return None;
        }
        let (page, ratio) = self.most_visible()?;
        (ratio > self.threshold && page != current_page).then_some(page)
    }
}
