//! The viewer controller: owns the document, both slot stores, the
//! visibility aggregator, the outline and the scroll-sync state, and wires
//! them to the document engine and the session store.

use std::collections::VecDeque;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use folio_core::{
    Document, DocumentEngine, LoadError, OutlineNode, PageSize, Progress, ReadingPosition,
    RgbaBitmap, Session, SessionGateway, Settings, ViewKind, snap_scale, theme_toggle_label,
    zoom_label,
};

use crate::outline::{EntryId, OutlineEntry, OutlineResolver, resolve_destination, resolve_pending};
use crate::slots::{PageSlotStore, RenderOutcome, RenderTicket};
use crate::sync::{Highlights, ScrollBehavior, ScrollRequest, ScrollSyncController};
use crate::view::ViewState;
use crate::visibility::{VisibilityAggregator, VisibilityEvent};
use crate::zoom::{ZoomChange, ZoomController};

struct LoadedDocument<D> {
    document: D,
    name: String,
    generation: u64,
}

pub struct Viewer<E: DocumentEngine, S: SessionGateway> {
    engine: E,
    sessions: S,
    settings: Settings,
    view: ViewState,
    document: Option<LoadedDocument<E::Document>>,
    document_generation: u64,
    main: PageSlotStore,
    thumbnails: PageSlotStore,
    aggregator: VisibilityAggregator,
    outline: OutlineResolver,
    sync: ScrollSyncController,
    zoom: ZoomController,
    render_queue: VecDeque<RenderTicket>,
}

impl<E: DocumentEngine, S: SessionGateway> Viewer<E, S> {
    pub fn new(engine: E, sessions: S, mut settings: Settings) -> Self {
        settings.normalize();
        Self {
            engine,
            sessions,
            view: ViewState::new(&settings),
            document: None,
            document_generation: 0,
            main: PageSlotStore::new(ViewKind::Main, settings.max_render_failures),
            thumbnails: PageSlotStore::new(ViewKind::Thumbnail, settings.max_render_failures),
            aggregator: VisibilityAggregator::new(settings.visibility_threshold),
            outline: OutlineResolver::new(),
            sync: ScrollSyncController::new(&settings),
            zoom: ZoomController::new(&settings),
            render_queue: VecDeque::new(),
            settings,
        }
    }

    /// Restores the saved session, if any. Returns whether a document was
    /// loaded; a saved document that no longer opens is reported as an error.
    pub fn init(&mut self) -> Result<bool, LoadError> {
        let saved = match self.sessions.load() {
            Ok(saved) => saved,
            Err(err) => {
                tracing::warn!("failed to read saved session: {err:#}");
                None
            }
        };

        match saved {
            Some(session) => {
                tracing::info!(name = %session.name, page = session.page, "restoring session");
                self.load_document(
                    session.content,
                    session.name,
                    session.page,
                    session.scale,
                    session.inverted,
                )?;
                Ok(true)
            }
            None => {
                self.view.inverted = self.settings.default_inverted;
                Ok(false)
            }
        }
    }

    /// Opens freshly selected content with default page, scale and theme.
    pub fn open(&mut self, content: Vec<u8>, name: impl Into<String>) -> Result<(), LoadError> {
        let scale = self.settings.default_scale;
        let inverted = self.settings.default_inverted;
        self.load_document(content, name, 1, scale, inverted)
    }

    /// Opens `content` and makes it the current document. When the engine
    /// rejects it, the previously loaded document stays untouched.
    pub fn load_document(
        &mut self,
        content: Vec<u8>,
        name: impl Into<String>,
        page: u32,
        scale: f32,
        inverted: bool,
    ) -> Result<(), LoadError> {
        let name = name.into();
        tracing::info!(%name, bytes = content.len(), "loading document");

        let document = self.engine.open(&content).inspect_err(|err| {
            tracing::warn!(%name, "document failed to open: {err}");
        })?;
        let page_count = document.page_count();
        if page_count == 0 {
            return Err(LoadError::Empty);
        }

        let scale = if scale.is_finite() {
            snap_scale(scale.max(self.settings.min_scale))
        } else {
            self.settings.default_scale
        };
        let thumbnail_scale = self.settings.thumbnail_scale;
        let main_placeholder = document
            .page_size(1, scale)
            .map_err(|err| LoadError::Malformed(format!("{err:#}")))?;
        let thumbnail_placeholder = document
            .page_size(1, thumbnail_scale)
            .map_err(|err| LoadError::Malformed(format!("{err:#}")))?;
        let outline_nodes: Vec<OutlineNode> = document.outline().unwrap_or_else(|err| {
            tracing::warn!(%name, "failed to read outline: {err:#}");
            Vec::new()
        });

        self.teardown();
        self.document_generation += 1;
        let generation = self.document_generation;

        self.view.scale = scale;
        self.view.inverted = inverted;
        self.view.current_page = 1;
        self.main.rebuild(page_count, scale, main_placeholder);
        self.thumbnails.rebuild(page_count, thumbnail_scale, thumbnail_placeholder);

        let pending = self.outline.begin(&outline_nodes, generation);
        let resolution = resolve_pending(&document, &pending, generation);
        self.document = Some(LoadedDocument {
            document,
            name: name.clone(),
            generation,
        });
        self.outline.publish(resolution);

        let page = page.clamp(1, page_count);
        if page > 1 {
            self.go_to_page_at(page, ScrollBehavior::Instant, Instant::now());
        } else {
            self.sync.highlight(1, &self.outline);
        }

        let session = Session {
            content,
            name,
            page: self.view.current_page,
            scale: self.view.scale,
            inverted: self.view.inverted,
            timestamp: unix_now_secs(),
        };
        if let Err(err) = self.sessions.save(&session) {
            tracing::warn!("failed to save session: {err:#}");
        }

        tracing::info!(
            pages = page_count,
            page = self.view.current_page,
            scale = self.view.scale,
            generation,
            outline_entries = self.outline.tree().len(),
            "document loaded"
        );
        Ok(())
    }

    /// Drops the current document and everything derived from it.
    pub fn teardown(&mut self) {
        if let Some(loaded) = self.document.take() {
            tracing::debug!(
                name = %loaded.name,
                generation = loaded.generation,
                "tearing down document"
            );
        }
        self.main.clear();
        self.thumbnails.clear();
        self.aggregator.clear();
        self.outline.clear();
        self.render_queue.clear();
        self.sync.reset(&mut self.view);
        self.view.current_page = 1;
    }

    pub fn handle_main_visibility(&mut self, batch: &[VisibilityEvent]) -> Option<u32> {
        let page_count = self.page_count()?;
        let batch: Vec<VisibilityEvent> = batch
            .iter()
            .copied()
            .filter(|event| (1..=page_count).contains(&event.page))
            .collect();

        for event in &batch {
            if event.is_intersecting {
                if let Some(ticket) = self.main.on_visible(event.page) {
                    self.render_queue.push_back(ticket);
                }
            } else {
                self.main.on_hidden(event.page);
            }
        }

        let next = self.aggregator.reconcile(
            &batch,
            self.view.current_page,
            self.view.is_programmatic_scroll,
        )?;
        self.view.current_page = next;
        self.sync.highlight(next, &self.outline);
        self.persist_progress();
        tracing::debug!(page = next, "current page follows visibility");
        Some(next)
    }

    pub fn handle_thumbnail_visibility(&mut self, batch: &[VisibilityEvent]) {
        for event in batch {
            if event.is_intersecting {
                if let Some(ticket) = self.thumbnails.on_visible(event.page) {
                    self.render_queue.push_back(ticket);
                }
            } else {
                self.thumbnails.on_hidden(event.page);
            }
        }
    }

    /// Jumps to `page` without animation. Out-of-range pages are ignored.
    pub fn go_to_page(&mut self, page: u32) -> bool {
        self.go_to_page_at(page, ScrollBehavior::Instant, Instant::now())
    }

    pub fn go_to_page_with(&mut self, page: u32, behavior: ScrollBehavior) -> bool {
        self.go_to_page_at(page, behavior, Instant::now())
    }

    pub fn go_to_page_at(&mut self, page: u32, behavior: ScrollBehavior, now: Instant) -> bool {
        let Some(page_count) = self.page_count() else {
            return false;
        };
        let request = self.sync.go_to_page(
            &mut self.view,
            &self.outline,
            page_count,
            page,
            behavior,
            now,
        );
        if request.is_none() {
            return false;
        }
        self.persist_progress();
        true
    }

    /// Previous/next page buttons.
    pub fn step_page(&mut self, delta: i32) -> bool {
        let target = i64::from(self.view.current_page) + i64::from(delta);
        match u32::try_from(target) {
            Ok(page) => self.go_to_page(page),
            Err(_) => false,
        }
    }

    pub fn zoom_in(&mut self) -> bool {
        if self.document.is_none() {
            return false;
        }
        let change = self.zoom.zoom_in(&mut self.view);
        self.relayout(change);
        true
    }

    pub fn zoom_out(&mut self) -> bool {
        if self.document.is_none() {
            return false;
        }
        match self.zoom.zoom_out(&mut self.view) {
            Some(change) => {
                self.relayout(change);
                true
            }
            None => false,
        }
    }

    fn relayout(&mut self, change: ZoomChange) {
        let Some(loaded) = self.document.as_ref() else {
            return;
        };
        let page_count = loaded.document.page_count();
        let placeholder = loaded
            .document
            .page_size(1, change.to)
            .unwrap_or_else(|err| {
                tracing::warn!("failed to measure page 1 at new scale: {err:#}");
                self.main.placeholder().scaled(change.to / change.from)
            });

        self.main.rebuild(page_count, change.to, placeholder);
        self.aggregator.clear();
        self.render_queue.retain(|ticket| ticket.kind != ViewKind::Main);
        tracing::debug!(
            from = change.from,
            to = change.to,
            anchor = change.anchor,
            "zoom relayout"
        );
        self.go_to_page(change.anchor);
    }

    /// Flips the night-mode flag and returns the new value.
    pub fn toggle_theme(&mut self) -> bool {
        self.view.inverted = !self.view.inverted;
        self.persist_progress();
        self.view.inverted
    }

    pub fn activate_thumbnail(&mut self, page: u32) -> bool {
        self.go_to_page(page)
    }

    /// Scrolls smoothly to an outline entry. An entry whose destination failed
    /// to resolve during load gets one more resolution attempt.
    pub fn activate_outline_entry(&mut self, id: EntryId) -> bool {
        let Some(entry) = self.outline.entry(id) else {
            return false;
        };
        if let Some(page) = entry.resolved_page {
            return self.go_to_page_with(page, ScrollBehavior::Smooth);
        }
        let Some(destination) = entry.destination.clone() else {
            return false;
        };
        let Some(loaded) = self.document.as_ref() else {
            return false;
        };
        match resolve_destination(&loaded.document, &destination) {
            Ok(page) => self.go_to_page_with(page, ScrollBehavior::Smooth),
            Err(err) => {
                tracing::debug!(entry = id.0, "outline entry still unresolved: {err:#}");
                false
            }
        }
    }

    /// Advances time-based state; returns whether a programmatic scroll
    /// just settled.
    pub fn tick(&mut self, now: Instant) -> bool {
        self.sync.settle(&mut self.view, now)
    }

    pub fn take_scroll_request(&mut self) -> Option<ScrollRequest> {
        self.sync.take_scroll_request()
    }

    pub fn drain_render_tickets(&mut self) -> Vec<RenderTicket> {
        self.render_queue.drain(..).collect()
    }

    pub fn pending_renders(&self) -> usize {
        self.render_queue.len()
    }

    pub fn complete_render(
        &mut self,
        ticket: &RenderTicket,
        result: anyhow::Result<RgbaBitmap>,
    ) -> RenderOutcome {
        match ticket.kind {
            ViewKind::Main => self.main.complete(ticket, result),
            ViewKind::Thumbnail => self.thumbnails.complete(ticket, result),
        }
    }

    /// Runs up to `budget` queued renders against the engine, main view
    /// first. Returns how many were executed.
    pub fn run_pending_renders(&mut self, budget: usize) -> usize {
        let mut executed = 0;
        while executed < budget {
            let next = self
                .render_queue
                .iter()
                .position(|ticket| ticket.kind == ViewKind::Main)
                .or(if self.render_queue.is_empty() { None } else { Some(0) });
            let Some(position) = next else {
                break;
            };
            let Some(ticket) = self.render_queue.remove(position) else {
                break;
            };
            let still_wanted = match ticket.kind {
                ViewKind::Main => self.main.is_current(&ticket),
                ViewKind::Thumbnail => self.thumbnails.is_current(&ticket),
            };
            if !still_wanted {
                continue;
            }
            let Some(loaded) = self.document.as_ref() else {
                break;
            };
            let result = loaded.document.render_page(ticket.page, ticket.scale);
            self.complete_render(&ticket, result);
            executed += 1;
        }
        executed
    }

    fn persist_progress(&self) {
        if self.document.is_none() {
            return;
        }
        if let Err(err) = self.sessions.update_progress(&self.position()) {
            tracing::warn!("failed to persist reading progress: {err:#}");
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn position(&self) -> ReadingPosition {
        ReadingPosition {
            page: self.view.current_page,
            scale: self.view.scale,
            inverted: self.view.inverted,
        }
    }

    pub fn current_page(&self) -> u32 {
        self.view.current_page
    }

    pub fn page_count(&self) -> Option<u32> {
        self.document
            .as_ref()
            .map(|loaded| loaded.document.page_count())
    }

    pub fn document_name(&self) -> Option<&str> {
        self.document.as_ref().map(|loaded| loaded.name.as_str())
    }

    pub fn document_generation(&self) -> u64 {
        self.document_generation
    }

    pub fn progress(&self) -> Option<Progress> {
        Some(Progress {
            current_page: self.view.current_page,
            total_pages: self.page_count()?,
        })
    }

    pub fn zoom_label(&self) -> String {
        zoom_label(self.view.scale)
    }

    pub fn theme_toggle_label(&self) -> &'static str {
        theme_toggle_label(self.view.inverted)
    }

    pub fn main_slots(&self) -> &PageSlotStore {
        &self.main
    }

    pub fn thumbnail_slots(&self) -> &PageSlotStore {
        &self.thumbnails
    }

    pub fn main_display_size(&self, page: u32) -> PageSize {
        self.main.display_size(page)
    }

    pub fn outline(&self) -> &OutlineResolver {
        &self.outline
    }

    pub fn outline_entries(&self) -> &[OutlineEntry] {
        self.outline.tree().entries()
    }

    pub fn highlights(&self) -> Highlights {
        self.sync.highlights()
    }

    pub fn active_thumbnail(&self) -> Option<u32> {
        self.sync.highlights().thumbnail
    }

    pub fn active_outline_entry(&self) -> Option<EntryId> {
        self.sync.highlights().outline
    }
}

fn unix_now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use folio_core::{Destination, RenderState};
    use folio_test::{
        FakeDocument, FakeEngine, MemorySessions, make_session, make_settings, page_location,
    };

    const DOC: &[u8] = b"ten-pages";

    fn outline_nodes() -> Vec<OutlineNode> {
        vec![
            OutlineNode::new("Cover", Some(Destination::Explicit(page_location(1)))),
            OutlineNode::new("Body", None).with_children(vec![
                OutlineNode::new("Chapter 1", Some(Destination::Named("ch1".to_string()))),
                OutlineNode::new("Chapter 2", Some(Destination::Explicit(page_location(6)))),
                OutlineNode::new("Lost", Some(Destination::Named("lost".to_string()))),
            ]),
        ]
    }

    fn ten_pages() -> FakeDocument {
        FakeDocument::uniform(10)
            .with_outline(outline_nodes())
            .with_named_destination("ch1", 2)
    }

    fn viewer_with(
        document: FakeDocument,
        sessions: MemorySessions,
    ) -> Viewer<FakeEngine, MemorySessions> {
        let engine = FakeEngine::new().with_document(DOC, document);
        Viewer::new(engine, sessions, make_settings())
    }

    fn loaded_viewer() -> anyhow::Result<(Viewer<FakeEngine, MemorySessions>, MemorySessions)> {
        let sessions = MemorySessions::new();
        let mut viewer = viewer_with(ten_pages(), sessions.clone());
        viewer.load_document(DOC.to_vec(), "ten.pdf", 1, 1.0, true)?;
        Ok((viewer, sessions))
    }

    fn settle(viewer: &mut Viewer<FakeEngine, MemorySessions>) {
        viewer.tick(Instant::now() + Duration::from_secs(2));
    }

    #[test]
    fn load_starts_on_first_page_and_saves_session() -> anyhow::Result<()> {
        let (viewer, sessions) = loaded_viewer()?;
        assert_eq!(viewer.current_page(), 1);
        assert_eq!(viewer.page_count(), Some(10));
        assert_eq!(viewer.theme_toggle_label(), "day");
        assert_eq!(viewer.zoom_label(), "100%");
        assert_eq!(viewer.active_thumbnail(), Some(1));
        assert_eq!(viewer.active_outline_entry(), Some(EntryId(0)));
        assert!(!viewer.view().is_programmatic_scroll);

        let session = sessions.current().expect("session saved");
        assert_eq!(session.page, 1);
        assert_eq!(session.scale, 1.0);
        assert!(session.inverted);
        assert_eq!(session.name, "ten.pdf");
        assert_eq!(session.content, DOC.to_vec());
        Ok(())
    }

    #[test]
    fn load_builds_slots_for_both_views() -> anyhow::Result<()> {
        let (viewer, _) = loaded_viewer()?;
        assert_eq!(viewer.main_slots().len(), 10);
        assert_eq!(viewer.thumbnail_slots().len(), 10);
        assert_eq!(viewer.thumbnail_slots().scale(), 0.15);
        assert_eq!(viewer.main_display_size(4), PageSize::new(600.0, 800.0));
        assert!(
            viewer
                .main_slots()
                .slots()
                .iter()
                .all(|slot| slot.render_state() == RenderState::Unrendered)
        );
        Ok(())
    }

    #[test]
    fn outline_resolution_skips_unresolvable_entries() -> anyhow::Result<()> {
        let (viewer, _) = loaded_viewer()?;
        let pages: Vec<Option<u32>> = viewer
            .outline_entries()
            .iter()
            .map(|entry| entry.resolved_page)
            .collect();
        assert_eq!(pages, vec![Some(1), None, Some(2), Some(6), None]);
        assert_eq!(viewer.outline().index().len(), 3);
        Ok(())
    }

    #[test]
    fn visibility_batch_moves_current_page() -> anyhow::Result<()> {
        let (mut viewer, sessions) = loaded_viewer()?;
        let batch = [VisibilityEvent::entered(2, 0.6), VisibilityEvent::entered(3, 0.1)];
        assert_eq!(viewer.handle_main_visibility(&batch), Some(2));
        assert_eq!(viewer.current_page(), 2);
        assert_eq!(viewer.active_thumbnail(), Some(2));
        assert_eq!(viewer.active_outline_entry(), Some(EntryId(2)));
        assert_eq!(sessions.current().map(|s| s.page), Some(2));
        assert_eq!(viewer.pending_renders(), 2);
        Ok(())
    }

    #[test]
    fn sliver_batch_keeps_current_page() -> anyhow::Result<()> {
        let (mut viewer, sessions) = loaded_viewer()?;
        let updates = sessions.progress_updates();
        let batch = [VisibilityEvent::entered(4, 0.04), VisibilityEvent::entered(5, 0.05)];
        assert_eq!(viewer.handle_main_visibility(&batch), None);
        assert_eq!(viewer.current_page(), 1);
        assert_eq!(sessions.progress_updates(), updates);
        Ok(())
    }

    #[test]
    fn programmatic_scroll_suppresses_visibility() -> anyhow::Result<()> {
        let (mut viewer, _) = loaded_viewer()?;
        assert!(viewer.go_to_page(7));
        assert!(viewer.view().is_programmatic_scroll);
        let batch = [VisibilityEvent::entered(5, 0.9)];
        assert_eq!(viewer.handle_main_visibility(&batch), None);
        assert_eq!(viewer.current_page(), 7);

        settle(&mut viewer);
        assert!(!viewer.view().is_programmatic_scroll);
        assert_eq!(viewer.handle_main_visibility(&[]), Some(5));
        Ok(())
    }

    #[test]
    fn go_to_page_is_idempotent() -> anyhow::Result<()> {
        let (mut viewer, sessions) = loaded_viewer()?;
        assert!(viewer.go_to_page(6));
        let highlights = viewer.highlights();
        let record = sessions.current();
        assert!(viewer.go_to_page(6));
        assert_eq!(viewer.highlights(), highlights);
        assert_eq!(sessions.current(), record);
        assert_eq!(highlights.outline, Some(EntryId(3)));
        assert_eq!(
            viewer.take_scroll_request(),
            Some(ScrollRequest {
                page: 6,
                behavior: ScrollBehavior::Instant
            })
        );
        Ok(())
    }

    #[test]
    fn out_of_range_navigation_is_ignored() -> anyhow::Result<()> {
        let (mut viewer, sessions) = loaded_viewer()?;
        let updates = sessions.progress_updates();
        assert!(!viewer.go_to_page(0));
        assert!(!viewer.go_to_page(11));
        assert!(!viewer.step_page(-1));
        assert_eq!(viewer.current_page(), 1);
        assert!(viewer.take_scroll_request().is_none());
        assert_eq!(sessions.progress_updates(), updates);
        Ok(())
    }

    #[test]
    fn step_page_moves_by_one() -> anyhow::Result<()> {
        let (mut viewer, _) = loaded_viewer()?;
        assert!(viewer.step_page(1));
        assert!(viewer.step_page(1));
        assert!(viewer.step_page(-1));
        assert_eq!(viewer.current_page(), 2);
        Ok(())
    }

    #[test]
    fn zoom_round_trip_keeps_page() -> anyhow::Result<()> {
        let (mut viewer, sessions) = loaded_viewer()?;
        viewer.go_to_page(4);
        settle(&mut viewer);

        assert!(viewer.zoom_in());
        assert_eq!(viewer.view().scale, 1.2);
        assert_eq!(viewer.current_page(), 4);
        let size = viewer.main_display_size(1);
        assert_eq!((size.width.round(), size.height.round()), (720.0, 960.0));
        assert_eq!(sessions.current().map(|s| s.scale), Some(1.2));

        assert!(viewer.zoom_out());
        assert_eq!(viewer.view().scale, 1.0);
        assert_eq!(viewer.current_page(), 4);
        assert_eq!(viewer.thumbnail_slots().scale(), 0.15);
        Ok(())
    }

    #[test]
    fn zoom_clears_visibility_and_keeps_thumbnails() -> anyhow::Result<()> {
        let (mut viewer, _) = loaded_viewer()?;
        viewer.handle_thumbnail_visibility(&[VisibilityEvent::entered(1, 1.0)]);
        assert_eq!(viewer.handle_main_visibility(&[VisibilityEvent::entered(5, 0.9)]), Some(5));
        viewer.run_pending_renders(10);
        let thumbnail_generation = viewer.thumbnail_slots().generation();

        assert!(viewer.zoom_in());
        settle(&mut viewer);

        assert_eq!(viewer.handle_main_visibility(&[]), None);
        assert_eq!(viewer.current_page(), 5);
        assert_eq!(viewer.thumbnail_slots().generation(), thumbnail_generation);
        assert_eq!(
            viewer.thumbnail_slots().slot(1).map(|slot| slot.render_state()),
            Some(RenderState::Rendered)
        );
        Ok(())
    }

    #[test]
    fn zoom_out_is_guarded_at_minimum() -> anyhow::Result<()> {
        let sessions = MemorySessions::new();
        let mut viewer = viewer_with(ten_pages(), sessions);
        viewer.load_document(DOC.to_vec(), "ten.pdf", 1, 0.4, false)?;
        let generation = viewer.main_slots().generation();
        assert!(!viewer.zoom_out());
        assert_eq!(viewer.view().scale, 0.4);
        assert_eq!(viewer.main_slots().generation(), generation);
        Ok(())
    }

    #[test]
    fn zoom_rebuild_discards_old_render() -> anyhow::Result<()> {
        let (mut viewer, _) = loaded_viewer()?;
        viewer.handle_main_visibility(&[VisibilityEvent::entered(4, 0.8)]);
        let old = viewer
            .drain_render_tickets()
            .into_iter()
            .find(|ticket| ticket.page == 4)
            .expect("ticket for page 4");
        assert_eq!(old.scale, 1.0);

        viewer.zoom_in();
        viewer.zoom_in();
        assert_eq!(viewer.view().scale, 1.4);

        let pixels = RgbaBitmap {
            width: 600,
            height: 800,
            stride: 2400,
            pixels: vec![0; 600 * 800 * 4],
        };
        assert_eq!(viewer.complete_render(&old, Ok(pixels)), RenderOutcome::Stale);
        let slot = viewer.main_slots().slot(4).expect("slot");
        assert_eq!(slot.render_state(), RenderState::Unrendered);
        assert!(slot.pixels().is_none());
        Ok(())
    }

    #[test]
    fn pending_renders_run_against_engine() -> anyhow::Result<()> {
        let document = ten_pages();
        let log = document.render_log();
        let mut viewer = viewer_with(document, MemorySessions::new());
        viewer.load_document(DOC.to_vec(), "ten.pdf", 1, 1.0, true)?;

        viewer.handle_thumbnail_visibility(&[VisibilityEvent::entered(1, 1.0)]);
        viewer.handle_main_visibility(&[
            VisibilityEvent::entered(1, 1.0),
            VisibilityEvent::entered(2, 0.2),
        ]);
        assert_eq!(viewer.run_pending_renders(8), 3);
        assert_eq!(log.borrow()[0], (1, 1.0));
        assert_eq!(log.borrow()[2], (1, 0.15));
        assert_eq!(viewer.main_slots().rendered_count(), 2);
        assert_eq!(viewer.thumbnail_slots().rendered_count(), 1);
        Ok(())
    }

    #[test]
    fn renders_for_evicted_pages_are_skipped() -> anyhow::Result<()> {
        let document = ten_pages();
        let log = document.render_log();
        let mut viewer = viewer_with(document, MemorySessions::new());
        viewer.load_document(DOC.to_vec(), "ten.pdf", 1, 1.0, true)?;

        viewer.handle_main_visibility(&[VisibilityEvent::entered(3, 0.5)]);
        viewer.handle_main_visibility(&[VisibilityEvent::left(3)]);
        assert_eq!(viewer.run_pending_renders(4), 0);
        assert!(log.borrow().is_empty());
        Ok(())
    }

    #[test]
    fn failed_render_retries_on_next_visit() -> anyhow::Result<()> {
        let mut viewer = viewer_with(ten_pages().with_failing_page(2), MemorySessions::new());
        viewer.load_document(DOC.to_vec(), "ten.pdf", 1, 1.0, true)?;

        viewer.handle_main_visibility(&[VisibilityEvent::entered(2, 0.5)]);
        viewer.run_pending_renders(1);
        let slot = viewer.main_slots().slot(2).expect("slot");
        assert_eq!(slot.render_state(), RenderState::Unrendered);
        assert_eq!(slot.failures(), 1);

        viewer.handle_main_visibility(&[VisibilityEvent::left(2)]);
        viewer.handle_main_visibility(&[VisibilityEvent::entered(2, 0.5)]);
        assert_eq!(viewer.pending_renders(), 1);
        Ok(())
    }

    #[test]
    fn failed_load_keeps_previous_document() -> anyhow::Result<()> {
        let (mut viewer, sessions) = loaded_viewer()?;
        viewer.go_to_page(3);
        let err = viewer.open(b"garbage".to_vec(), "bad.pdf");
        assert!(matches!(err, Err(LoadError::Malformed(_))));
        assert_eq!(viewer.document_name(), Some("ten.pdf"));
        assert_eq!(viewer.page_count(), Some(10));
        assert_eq!(viewer.current_page(), 3);
        assert_eq!(sessions.current().map(|s| s.name), Some("ten.pdf".to_string()));
        Ok(())
    }

    #[test]
    fn init_restores_saved_session() -> anyhow::Result<()> {
        let mut saved = make_session(DOC, 5);
        saved.scale = 1.4;
        saved.inverted = false;
        let sessions = MemorySessions::with_session(saved);
        let mut viewer = viewer_with(ten_pages(), sessions.clone());

        assert!(viewer.init()?);
        assert_eq!(viewer.current_page(), 5);
        assert_eq!(viewer.view().scale, 1.4);
        assert_eq!(viewer.theme_toggle_label(), "night");
        assert_eq!(viewer.take_scroll_request().map(|r| r.page), Some(5));
        assert_eq!(sessions.current().map(|s| s.page), Some(5));
        Ok(())
    }

    #[test]
    fn init_without_session_applies_default_theme() -> anyhow::Result<()> {
        let mut viewer = viewer_with(ten_pages(), MemorySessions::new());
        assert!(!viewer.init()?);
        assert!(viewer.view().inverted);
        assert_eq!(viewer.page_count(), None);
        Ok(())
    }

    #[test]
    fn restored_page_is_clamped() -> anyhow::Result<()> {
        let sessions = MemorySessions::with_session(make_session(DOC, 99));
        let mut viewer = viewer_with(ten_pages(), sessions);
        viewer.init()?;
        assert_eq!(viewer.current_page(), 10);
        Ok(())
    }

    #[test]
    fn theme_toggle_persists() -> anyhow::Result<()> {
        let (mut viewer, sessions) = loaded_viewer()?;
        assert!(!viewer.toggle_theme());
        assert_eq!(viewer.theme_toggle_label(), "night");
        assert_eq!(sessions.current().map(|s| s.inverted), Some(false));
        Ok(())
    }

    #[test]
    fn outline_activation_navigates() -> anyhow::Result<()> {
        let (mut viewer, _) = loaded_viewer()?;
        assert!(viewer.activate_outline_entry(EntryId(3)));
        assert_eq!(viewer.current_page(), 6);
        assert!(!viewer.activate_outline_entry(EntryId(1)));
        assert!(!viewer.activate_outline_entry(EntryId(4)));
        assert!(!viewer.activate_outline_entry(EntryId(42)));
        assert_eq!(viewer.current_page(), 6);
        Ok(())
    }

    #[test]
    fn outline_activation_scrolls_smoothly() -> anyhow::Result<()> {
        let (mut viewer, _) = loaded_viewer()?;
        let start = Instant::now();
        assert!(viewer.activate_outline_entry(EntryId(2)));
        assert_eq!(
            viewer.take_scroll_request(),
            Some(ScrollRequest {
                page: 2,
                behavior: ScrollBehavior::Smooth
            })
        );

        assert!(!viewer.tick(start + Duration::from_millis(300)));
        assert!(viewer.view().is_programmatic_scroll);
        assert_eq!(viewer.handle_main_visibility(&[VisibilityEvent::entered(1, 1.0)]), None);

        assert!(viewer.tick(Instant::now() + Duration::from_millis(800)));
        assert!(!viewer.view().is_programmatic_scroll);
        assert_eq!(viewer.current_page(), 2);
        Ok(())
    }

    #[test]
    fn thumbnail_activation_navigates() -> anyhow::Result<()> {
        let (mut viewer, _) = loaded_viewer()?;
        assert!(viewer.activate_thumbnail(9));
        assert_eq!(viewer.active_thumbnail(), Some(9));
        assert_eq!(viewer.active_outline_entry(), Some(EntryId(3)));
        Ok(())
    }

    #[test]
    fn persistence_failures_do_not_block_navigation() -> anyhow::Result<()> {
        let mut viewer = viewer_with(ten_pages(), MemorySessions::failing());
        viewer.load_document(DOC.to_vec(), "ten.pdf", 1, 1.0, true)?;
        assert!(viewer.go_to_page(2));
        assert_eq!(viewer.current_page(), 2);
        Ok(())
    }

    #[test]
    fn teardown_clears_document_state() -> anyhow::Result<()> {
        let (mut viewer, _) = loaded_viewer()?;
        viewer.handle_main_visibility(&[VisibilityEvent::entered(1, 1.0)]);
        viewer.teardown();
        assert_eq!(viewer.page_count(), None);
        assert!(viewer.main_slots().is_empty());
        assert!(viewer.outline_entries().is_empty());
        assert_eq!(viewer.pending_renders(), 0);
        assert_eq!(viewer.highlights(), Highlights::default());
        assert!(!viewer.go_to_page(1));
        Ok(())
    }
}
