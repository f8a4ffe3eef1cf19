//! Programmatic navigation and the highlight fan-out shared by all
//! navigation surfaces.

use std::time::{Duration, Instant};

use folio_core::Settings;

use crate::outline::{EntryId, OutlineResolver};
use crate::view::ViewState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollBehavior {
    Instant,
    Smooth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollRequest {
    pub page: u32,
    pub behavior: ScrollBehavior,
}

/// Active markers of the sidebar surfaces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Highlights {
    pub thumbnail: Option<u32>,
    pub outline: Option<EntryId>,
}

#[derive(Debug, Clone)]
pub struct ScrollSyncController {
    instant_settle: Duration,
    smooth_settle: Duration,
    settle_deadline: Option<Instant>,
    highlights: Highlights,
    pending_scroll: Option<ScrollRequest>,
}

impl ScrollSyncController {
    pub fn new(settings: &Settings) -> Self {
        Self {
            instant_settle: Duration::from_millis(settings.instant_settle_ms),
            smooth_settle: Duration::from_millis(settings.smooth_settle_ms),
            settle_deadline: None,
            highlights: Highlights::default(),
            pending_scroll: None,
        }
    }

    pub fn settle_delay(&self, behavior: ScrollBehavior) -> Duration {
        match behavior {
            ScrollBehavior::Instant => self.instant_settle,
            ScrollBehavior::Smooth => self.smooth_settle,
        }
    }

    /// Starts a programmatic scroll to `page`. Returns `None` (and changes
    /// nothing) when the page is outside `1..=page_count`.
    pub fn go_to_page(
        &mut self,
        view: &mut ViewState,
        outline: &OutlineResolver,
        page_count: u32,
        page: u32,
        behavior: ScrollBehavior,
        now: Instant,
    ) -> Option<ScrollRequest> {
        if page == 0 || page > page_count {
            return None;
        }
        view.is_programmatic_scroll = true;
        view.current_page = page;
        self.highlight(page, outline);

        let request = ScrollRequest { page, behavior };
        self.pending_scroll = Some(request);
        self.settle_deadline = Some(now + self.settle_delay(behavior));
        Some(request)
    }

    /// Clears the programmatic flag once the settle delay has passed.
    pub fn settle(&mut self, view: &mut ViewState, now: Instant) -> bool {
        match self.settle_deadline {
            Some(deadline) if now >= deadline => {
                self.settle_deadline = None;
                view.is_programmatic_scroll = false;
                true
            }
            _ => false,
        }
    }

    /// Moves the thumbnail and outline markers to `page`.
    pub fn highlight(&mut self, page: u32, outline: &OutlineResolver) -> Highlights {
        self.highlights = Highlights {
            thumbnail: Some(page),
            outline: outline.active_entry(page),
        };
        self.highlights
    }

    pub fn highlights(&self) -> Highlights {
        self.highlights
    }

    pub fn settle_deadline(&self) -> Option<Instant> {
        self.settle_deadline
    }

    pub fn take_scroll_request(&mut self) -> Option<ScrollRequest> {
        self.pending_scroll.take()
    }

    pub fn reset(&mut self, view: &mut ViewState) {
        self.settle_deadline = None;
        self.pending_scroll = None;
        self.highlights = Highlights::default();
        view.is_programmatic_scroll = false;
    }
}
