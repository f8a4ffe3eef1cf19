//! Test helpers and fixtures.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use folio_core::{
    Document, DocumentEngine, LoadError, LocationRef, OutlineNode, PageSize, ReadingPosition,
    RgbaBitmap, Session, SessionGateway, Settings,
};

pub fn make_settings() -> Settings {
    Settings::default()
}

/// Location used by fake documents for page `page` (1-based).
pub fn page_location(page: u32) -> LocationRef {
    LocationRef {
        object: 1000 + u64::from(page),
        generation: 0,
    }
}

#[derive(Debug, Clone)]
pub struct FakeDocument {
    pages: Vec<PageSize>,
    outline: Vec<OutlineNode>,
    named: HashMap<String, LocationRef>,
    failing_pages: HashSet<u32>,
    renders: Rc<RefCell<Vec<(u32, f32)>>>,
}

impl FakeDocument {
    pub fn uniform(page_count: u32) -> Self {
        Self {
            pages: vec![PageSize::new(600.0, 800.0); page_count as usize],
            outline: Vec::new(),
            named: HashMap::new(),
            failing_pages: HashSet::new(),
            renders: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn with_outline(mut self, outline: Vec<OutlineNode>) -> Self {
        self.outline = outline;
        self
    }

    pub fn with_named_destination(mut self, name: &str, page: u32) -> Self {
        self.named.insert(name.to_string(), page_location(page));
        self
    }

    pub fn with_failing_page(mut self, page: u32) -> Self {
        self.failing_pages.insert(page);
        self
    }

    /// Every `(page, scale)` passed to `render_page`, shared across clones.
    pub fn render_log(&self) -> Rc<RefCell<Vec<(u32, f32)>>> {
        Rc::clone(&self.renders)
    }

    fn check_page(&self, page: u32) -> anyhow::Result<PageSize> {
        if page == 0 {
            anyhow::bail!("page numbers start at 1");
        }
        self.pages
            .get(page as usize - 1)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("page {page} out of range"))
    }
}

impl Document for FakeDocument {
    fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    fn page_size(&self, page: u32, scale: f32) -> anyhow::Result<PageSize> {
        Ok(self.check_page(page)?.scaled(scale))
    }

    fn render_page(&self, page: u32, scale: f32) -> anyhow::Result<RgbaBitmap> {
        self.renders.borrow_mut().push((page, scale));
        if self.failing_pages.contains(&page) {
            anyhow::bail!("render failed for page {page}");
        }
        let size = self.page_size(page, scale)?;
        let width = size.width.round().max(1.0) as usize;
        let height = size.height.round().max(1.0) as usize;
        Ok(RgbaBitmap {
            width,
            height,
            stride: width * 4,
            pixels: vec![255; width * height * 4],
        })
    }

    fn outline(&self) -> anyhow::Result<Vec<OutlineNode>> {
        Ok(self.outline.clone())
    }

    fn resolve_named_destination(&self, name: &str) -> anyhow::Result<LocationRef> {
        self.named
            .get(name)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("unknown destination {name:?}"))
    }

    fn location_to_page_index(&self, location: LocationRef) -> anyhow::Result<u32> {
        let page = location
            .object
            .checked_sub(1000)
            .filter(|p| *p >= 1 && *p <= self.pages.len() as u64)
            .ok_or_else(|| anyhow::anyhow!("location {location:?} is not a page"))?;
        Ok(page as u32 - 1)
    }
}

/// Engine that "opens" registered byte strings.
#[derive(Debug, Clone, Default)]
pub struct FakeEngine {
    documents: HashMap<Vec<u8>, FakeDocument>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(mut self, content: &[u8], document: FakeDocument) -> Self {
        self.documents.insert(content.to_vec(), document);
        self
    }
}

impl DocumentEngine for FakeEngine {
    type Document = FakeDocument;

    fn open(&self, content: &[u8]) -> Result<FakeDocument, LoadError> {
        let document = self
            .documents
            .get(content)
            .cloned()
            .ok_or_else(|| LoadError::Malformed("not a registered fake document".to_string()))?;
        if document.page_count() == 0 {
            return Err(LoadError::Empty);
        }
        Ok(document)
    }
}

#[derive(Debug, Default)]
struct SessionLog {
    record: Option<Session>,
    saves: usize,
    progress_updates: usize,
}

/// In-memory session gateway; clones share the same record so a test can
/// keep a handle after moving one into the viewer.
#[derive(Debug, Clone, Default)]
pub struct MemorySessions {
    inner: Rc<RefCell<SessionLog>>,
    fail_writes: bool,
}

impl MemorySessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: Session) -> Self {
        let sessions = Self::default();
        sessions.inner.borrow_mut().record = Some(session);
        sessions
    }

    pub fn failing() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    pub fn current(&self) -> Option<Session> {
        self.inner.borrow().record.clone()
    }

    pub fn saves(&self) -> usize {
        self.inner.borrow().saves
    }

    pub fn progress_updates(&self) -> usize {
        self.inner.borrow().progress_updates
    }
}

impl SessionGateway for MemorySessions {
    fn save(&self, session: &Session) -> anyhow::Result<()> {
        if self.fail_writes {
            anyhow::bail!("session store is read-only");
        }
        let mut inner = self.inner.borrow_mut();
        inner.record = Some(session.clone());
        inner.saves += 1;
        Ok(())
    }

    fn load(&self) -> anyhow::Result<Option<Session>> {
        Ok(self.inner.borrow().record.clone())
    }

    fn update_progress(&self, position: &ReadingPosition) -> anyhow::Result<()> {
        if self.fail_writes {
            anyhow::bail!("session store is read-only");
        }
        let mut inner = self.inner.borrow_mut();
        inner.progress_updates += 1;
        if let Some(record) = inner.record.as_mut() {
            record.page = position.page;
            record.scale = position.scale;
            record.inverted = position.inverted;
        }
        Ok(())
    }
}

pub fn make_session(content: &[u8], page: u32) -> Session {
    Session {
        content: content.to_vec(),
        name: "fixture.pdf".to_string(),
        page,
        scale: 1.0,
        inverted: true,
        timestamp: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_document_maps_locations_to_pages() -> anyhow::Result<()> {
        let doc = FakeDocument::uniform(5).with_named_destination("intro", 3);
        let location = doc.resolve_named_destination("intro")?;
        assert_eq!(doc.location_to_page_index(location)?, 2);
        assert!(doc.location_to_page_index(page_location(9)).is_err());
        Ok(())
    }

    #[test]
    fn fake_engine_rejects_unknown_content() {
        let engine = FakeEngine::new().with_document(b"a", FakeDocument::uniform(1));
        assert!(engine.open(b"a").is_ok());
        assert!(matches!(engine.open(b"b"), Err(LoadError::Malformed(_))));
    }

    #[test]
    fn memory_sessions_ignore_progress_without_record() -> anyhow::Result<()> {
        let sessions = MemorySessions::new();
        sessions.update_progress(&ReadingPosition {
            page: 3,
            scale: 1.0,
            inverted: false,
        })?;
        assert!(sessions.load()?.is_none());
        assert_eq!(sessions.progress_updates(), 1);
        Ok(())
    }
}
