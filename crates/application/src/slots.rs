//! Per-page render state for one view (main column or thumbnail strip).
//!
//! Every render request leaves the store as a [`RenderTicket`] stamped with
//! the store generation and a per-request serial. A completion is applied
//! only while the slot still waits for exactly that ticket; anything else is
//! a stale result and is dropped.

use folio_core::{PageSize, RenderState, RgbaBitmap, ViewKind};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderTicket {
    pub kind: ViewKind,
    pub page: u32,
    pub scale: f32,
    pub generation: u64,
    pub serial: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    Applied,
    Stale,
    Failed { will_retry: bool },
}

#[derive(Debug, Clone)]
pub struct PageSlot {
    page: u32,
    state: RenderState,
    last_known_size: Option<PageSize>,
    pixels: Option<RgbaBitmap>,
    in_flight: Option<u64>,
    failures: u32,
}

impl PageSlot {
    fn new(page: u32) -> Self {
        Self {
            page,
            state: RenderState::Unrendered,
            last_known_size: None,
            pixels: None,
            in_flight: None,
            failures: 0,
        }
    }

    pub fn page_number(&self) -> u32 {
        self.page
    }

    pub fn render_state(&self) -> RenderState {
        self.state
    }

    pub fn last_known_size(&self) -> Option<PageSize> {
        self.last_known_size
    }

    pub fn pixels(&self) -> Option<&RgbaBitmap> {
        self.pixels.as_ref()
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}

#[derive(Debug, Clone)]
pub struct PageSlotStore {
    kind: ViewKind,
    scale: f32,
    generation: u64,
    next_serial: u64,
    placeholder: PageSize,
    max_failures: u32,
    slots: Vec<PageSlot>,
}

impl PageSlotStore {
    pub fn new(kind: ViewKind, max_failures: u32) -> Self {
        Self {
            kind,
            scale: 1.0,
            generation: 0,
            next_serial: 1,
            placeholder: PageSize::new(0.0, 0.0),
            max_failures: max_failures.max(1),
            slots: Vec::new(),
        }
    }

    /// Drops every slot and creates `page_count` fresh `Unrendered` ones.
    /// Tickets issued before the rebuild become stale.
    pub fn rebuild(&mut self, page_count: u32, scale: f32, placeholder: PageSize) {
        self.generation += 1;
        self.scale = scale;
        self.placeholder = placeholder;
        self.slots = (1..=page_count).map(PageSlot::new).collect();
        tracing::debug!(
            view = %self.kind,
            pages = page_count,
            scale,
            generation = self.generation,
            "rebuilt page slots"
        );
    }

    pub fn clear(&mut self) {
        self.generation += 1;
        self.slots.clear();
    }

    pub fn kind(&self) -> ViewKind {
        self.kind
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn placeholder(&self) -> PageSize {
        self.placeholder
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[PageSlot] {
        &self.slots
    }

    pub fn slot(&self, page: u32) -> Option<&PageSlot> {
        let index = usize::try_from(page.checked_sub(1)?).ok()?;
        self.slots.get(index)
    }

    fn slot_mut(&mut self, page: u32) -> Option<&mut PageSlot> {
        let index = usize::try_from(page.checked_sub(1)?).ok()?;
        self.slots.get_mut(index)
    }

    pub fn rendered_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.state == RenderState::Rendered)
            .count()
    }

    /// Size the slot occupies in layout: rendered pixels, then the size it
    /// had before eviction, then the page-1 placeholder.
    pub fn display_size(&self, page: u32) -> PageSize {
        match self.slot(page) {
            Some(slot) => slot
                .pixels
                .as_ref()
                .map(RgbaBitmap::size)
                .or(slot.last_known_size)
                .unwrap_or(self.placeholder),
            None => self.placeholder,
        }
    }

    /// Page entered the observed window. Returns a ticket when a render
    /// should start; a slot already rendering or rendered yields nothing.
    pub fn on_visible(&mut self, page: u32) -> Option<RenderTicket> {
        let kind = self.kind;
        let scale = self.scale;
        let generation = self.generation;
        let serial = self.next_serial;
        let max_failures = self.max_failures;

        let slot = self.slot_mut(page)?;
        if slot.state != RenderState::Unrendered || slot.failures >= max_failures {
            return None;
        }
        slot.state = RenderState::Rendering;
        slot.in_flight = Some(serial);
        self.next_serial += 1;

        Some(RenderTicket {
            kind,
            page,
            scale,
            generation,
            serial,
        })
    }

    /// Page left the observed window. Rendered pixels are released but the
    /// slot keeps its size so the layout does not jump. Returns whether
    /// anything was evicted.
    pub fn on_hidden(&mut self, page: u32) -> bool {
        let kind = self.kind;
        let Some(slot) = self.slot_mut(page) else {
            return false;
        };
        match slot.state {
            RenderState::Rendered => {
                if let Some(pixels) = slot.pixels.take() {
                    slot.last_known_size = Some(pixels.size());
                }
                slot.state = RenderState::Unrendered;
                tracing::trace!(view = %kind, page, "evicted rendered page");
                true
            }
            RenderState::Rendering => {
                slot.state = RenderState::Unrendered;
                slot.in_flight = None;
                true
            }
            RenderState::Unrendered => false,
        }
    }

    pub fn is_current(&self, ticket: &RenderTicket) -> bool {
        if ticket.kind != self.kind || ticket.generation != self.generation {
            return false;
        }
        self.slot(ticket.page).is_some_and(|slot| {
            slot.state == RenderState::Rendering && slot.in_flight == Some(ticket.serial)
        })
    }

    pub fn complete(
        &mut self,
        ticket: &RenderTicket,
        result: anyhow::Result<RgbaBitmap>,
    ) -> RenderOutcome {
        if !self.is_current(ticket) {
            tracing::trace!(
                view = %self.kind,
                page = ticket.page,
                ticket_generation = ticket.generation,
                generation = self.generation,
                "dropping stale render result"
            );
            return RenderOutcome::Stale;
        }

        let kind = self.kind;
        let max_failures = self.max_failures;
        let Some(slot) = self.slot_mut(ticket.page) else {
            return RenderOutcome::Stale;
        };
        slot.in_flight = None;

        match result {
            Ok(pixels) => {
                slot.last_known_size = Some(pixels.size());
                slot.pixels = Some(pixels);
                slot.state = RenderState::Rendered;
                slot.failures = 0;
                RenderOutcome::Applied
            }
            Err(err) => {
                slot.state = RenderState::Unrendered;
                slot.failures += 1;
                let will_retry = slot.failures < max_failures;
                tracing::warn!(
                    view = %kind,
                    page = ticket.page,
                    failures = slot.failures,
                    will_retry,
                    "page render failed: {err:#}"
                );
                RenderOutcome::Failed { will_retry }
            }
        }
    }
}
