//! PDF engine: `pdf` for document structure, Pdfium for rasterization.

use std::cell::{Ref, RefCell};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::Context as _;
use folio_core::{
    Destination, Document, DocumentEngine, LoadError, LocationRef, OutlineNode, PageSize,
    RgbaBitmap,
};
use pdf::file::FileOptions;
use pdf::object::{
    Action, Dest, MaybeNamedDest, OutlineItem, PageTree, PagesNode, PlainRef, RcRef, Resolve,
};
use pdf::primitive::{PdfString, Primitive};
use pdfium_render::prelude::{PdfBitmapFormat, PdfRenderConfig, Pdfium};

/// US Letter in points, used when a page box cannot be read.
const FALLBACK_PAGE_SIZE: PageSize = PageSize {
    width: 612.0,
    height: 792.0,
};

/// The PDF header may appear anywhere in the first kilobyte.
const HEADER_SEARCH_LIMIT: usize = 1024;

#[derive(Debug, Default)]
enum PdfiumState {
    #[default]
    Uninitialized,
    Available(Pdfium),
    Unavailable(String),
}

/// Lazily bound Pdfium library shared by the engine and its documents.
#[derive(Debug, Clone, Default)]
struct PdfiumHandle {
    state: Rc<RefCell<PdfiumState>>,
}

impl PdfiumHandle {
    fn get(&self) -> anyhow::Result<Ref<'_, Pdfium>> {
        let init_error = {
            let mut state = self.state.borrow_mut();
            match &*state {
                PdfiumState::Available(_) => None,
                PdfiumState::Unavailable(err) => Some(err.clone()),
                PdfiumState::Uninitialized => match bind_pdfium() {
                    Ok(pdfium) => {
                        tracing::debug!("pdfium bound");
                        *state = PdfiumState::Available(pdfium);
                        None
                    }
                    Err(err) => {
                        let msg = err.to_string();
                        tracing::warn!("pdfium unavailable: {msg}");
                        *state = PdfiumState::Unavailable(msg.clone());
                        Some(msg)
                    }
                },
            }
        };

        if let Some(err) = init_error {
            return Err(anyhow::anyhow!(err));
        }

        let state = self.state.borrow();
        match &*state {
            PdfiumState::Available(_) => Ok(Ref::map(state, |state| match state {
                PdfiumState::Available(pdfium) => pdfium,
                _ => unreachable!("pdfium state checked above"),
            })),
            PdfiumState::Unavailable(err) => Err(anyhow::anyhow!(err.clone())),
            PdfiumState::Uninitialized => unreachable!("pdfium state initialized above"),
        }
    }

    fn render(
        &self,
        content: &[u8],
        page_index: u32,
        target_width: i32,
        max_height: i32,
    ) -> anyhow::Result<RgbaBitmap> {
        if pdfium_disabled() {
            anyhow::bail!("pdfium disabled via FOLIO_DISABLE_PDFIUM");
        }

        let pdfium = self.get()?;
        let document = pdfium
            .load_pdf_from_byte_slice(content, None)
            .map_err(|err| anyhow::anyhow!(err))
            .context("load document into pdfium")?;

        let page_index =
            u16::try_from(page_index).map_err(|_| anyhow::anyhow!("page index out of range"))?;
        let page = document
            .pages()
            .get(page_index)
            .map_err(|err| anyhow::anyhow!(err))?;

        let render_config = PdfRenderConfig::new()
            .set_target_width(target_width.max(1))
            .set_maximum_width(target_width.max(1))
            .set_maximum_height(max_height.max(1))
            .render_form_data(false)
            .render_annotations(true)
            .use_grayscale_rendering(false)
            .set_reverse_byte_order(false)
            .set_format(PdfBitmapFormat::BGRA);

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|err| anyhow::anyhow!(err))?;

        let width = bitmap.width().max(0) as usize;
        let height = bitmap.height().max(0) as usize;
        Ok(bgra_to_rgba(&bitmap.as_raw_bytes(), width, height))
    }
}

fn bgra_to_rgba(src_pixels: &[u8], width: usize, height: usize) -> RgbaBitmap {
    let src_stride = if height == 0 {
        0
    } else {
        src_pixels.len() / height
    };

    let mut pixels = Vec::with_capacity(width.saturating_mul(height).saturating_mul(4));
    for y in 0..height {
        let base = y.saturating_mul(src_stride);
        for x in 0..width {
            let idx = base.saturating_add(x.saturating_mul(4));
            let b = src_pixels.get(idx).copied().unwrap_or(255);
            let g = src_pixels.get(idx + 1).copied().unwrap_or(255);
            let r = src_pixels.get(idx + 2).copied().unwrap_or(255);
            let a = src_pixels.get(idx + 3).copied().unwrap_or(255);
            pixels.extend_from_slice(&[r, g, b, a]);
        }
    }

    RgbaBitmap {
        width,
        height,
        stride: width.saturating_mul(4),
        pixels,
    }
}

#[derive(Debug, Default)]
pub struct PdfEngine {
    pdfium: PdfiumHandle,
}

impl PdfEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds Pdfium now instead of on first open.
    pub fn check_pdfium(&self) -> anyhow::Result<()> {
        let _ = self.pdfium.get()?;
        Ok(())
    }
}

impl DocumentEngine for PdfEngine {
    type Document = PdfDocument;

    fn open(&self, content: &[u8]) -> Result<PdfDocument, LoadError> {
        let structure = PdfStructure::parse(content)?;
        if pdfium_disabled() {
            tracing::warn!("pdfium disabled via FOLIO_DISABLE_PDFIUM; pages will not render");
        } else {
            self.pdfium
                .get()
                .map_err(|err| LoadError::EngineUnavailable(err.to_string()))?;
        }
        Ok(PdfDocument {
            content: content.to_vec(),
            structure,
            pdfium: self.pdfium.clone(),
        })
    }
}

/// Everything the viewer needs from the document structure, read once at
/// open time.
#[derive(Debug, Clone, Default)]
struct PdfStructure {
    /// Page boxes in points, indexed by 0-based page index.
    pages: Vec<PageSize>,
    pages_by_ref: HashMap<PlainRef, u32>,
    named: HashMap<String, PlainRef>,
    outline: Vec<OutlineNode>,
}

impl PdfStructure {
    fn parse(content: &[u8]) -> Result<Self, LoadError> {
        if content.is_empty() {
            return Err(LoadError::Malformed("empty input".to_string()));
        }
        let header_window = &content[..content.len().min(HEADER_SEARCH_LIMIT)];
        if !header_window.windows(5).any(|w| w == b"%PDF-") {
            return Err(LoadError::Unsupported("missing %PDF header".to_string()));
        }

        let file = FileOptions::cached()
            .load(content.to_vec())
            .map_err(|err| LoadError::Malformed(err.to_string()))?;
        let page_count = file.num_pages();
        if page_count == 0 {
            return Err(LoadError::Empty);
        }

        let pages = (0..page_count)
            .map(|index| {
                let size = file
                    .get_page(index)
                    .map_err(|err| anyhow::anyhow!(err))
                    .and_then(|page| page.crop_box().map_err(|err| anyhow::anyhow!(err)));
                match size {
                    Ok(rect) => PageSize::new(
                        (rect.right - rect.left).abs().max(1.0),
                        (rect.top - rect.bottom).abs().max(1.0),
                    ),
                    Err(err) => {
                        tracing::debug!(page = index + 1, "page box unreadable: {err:#}");
                        FALLBACK_PAGE_SIZE
                    }
                }
            })
            .collect();

        let resolver = file.resolver();
        let catalog = file.get_root();

        let mut pages_by_ref: HashMap<PlainRef, u32> = HashMap::new();
        fn add_tree(
            r: &impl Resolve,
            pages: &mut HashMap<PlainRef, u32>,
            tree: &PageTree,
            current_page: &mut u32,
        ) {
            for &node_ref in &tree.kids {
                let node = match r.get(node_ref) {
                    Ok(n) => n,
                    Err(_) => continue,
                };
                match *node {
                    PagesNode::Tree(ref tree) => add_tree(r, pages, tree, current_page),
                    PagesNode::Leaf(ref _page) => {
                        pages.insert(node_ref.get_inner(), *current_page);
                        *current_page += 1;
                    }
                }
            }
        }
        add_tree(&resolver, &mut pages_by_ref, &catalog.pages, &mut 0);

        let mut named: HashMap<String, PlainRef> = HashMap::new();
        if let Some(ref names) = catalog.names
            && let Some(ref dests) = names.dests
        {
            let walked = dests.walk(&resolver, &mut |key: &PdfString, val: &Option<Dest>| {
                if let Some(Dest {
                    page: Some(page), ..
                }) = val
                {
                    named.insert(key.to_string_lossy(), page.get_inner());
                }
            });
            if let Err(err) = walked {
                tracing::debug!("named destination tree unreadable: {err}");
            }
        }

        let mut outline = Vec::new();
        if let Some(ref outlines) = catalog.outlines
            && let Some(entry_ref) = outlines.first
        {
            match resolver.get(entry_ref) {
                Ok(entry) => walk_outline(&resolver, entry, &mut outline),
                Err(err) => tracing::warn!("outline root unreadable: {err}"),
            }
        }

        Ok(Self {
            pages,
            pages_by_ref,
            named,
            outline,
        })
    }
}

/// Collects `node` and its following siblings, recursing into children.
fn walk_outline(r: &impl Resolve, mut node: RcRef<OutlineItem>, out: &mut Vec<OutlineNode>) {
    loop {
        let title = node
            .title
            .as_ref()
            .map(|t| t.to_string_lossy())
            .unwrap_or_else(|| "(untitled)".to_string());

        let mut destination = node.dest.as_ref().and_then(destination_from_primitive);
        if destination.is_none()
            && let Some(Action::Goto(dest)) = node.action.clone()
        {
            destination = match dest {
                MaybeNamedDest::Named(s) => Some(Destination::Named(s.to_string_lossy())),
                MaybeNamedDest::Direct(Dest { page: Some(p), .. }) => {
                    Some(Destination::Explicit(location_from_ref(p.get_inner())))
                }
                _ => None,
            };
        }

        let mut children = Vec::new();
        if let Some(entry_ref) = node.first
            && let Ok(entry) = r.get(entry_ref)
        {
            walk_outline(r, entry, &mut children);
        }
        out.push(OutlineNode::new(title, destination).with_children(children));

        if let Some(entry_ref) = node.next
            && let Ok(entry) = r.get(entry_ref)
        {
            node = entry;
            continue;
        }

        break;
    }
}

fn destination_from_primitive(dest: &Primitive) -> Option<Destination> {
    match dest {
        Primitive::String(s) => Some(Destination::Named(s.to_string_lossy())),
        Primitive::Name(name) => Some(Destination::Named(name.as_str().to_string())),
        Primitive::Array(a) => match a.first() {
            Some(Primitive::Reference(r)) => Some(Destination::Explicit(location_from_ref(*r))),
            _ => None,
        },
        _ => None,
    }
}

fn location_from_ref(r: PlainRef) -> LocationRef {
    LocationRef {
        object: r.id,
        generation: r.r#gen,
    }
}

fn ref_from_location(location: LocationRef) -> PlainRef {
    PlainRef {
        id: location.object,
        r#gen: location.generation,
    }
}

pub struct PdfDocument {
    content: Vec<u8>,
    structure: PdfStructure,
    pdfium: PdfiumHandle,
}

impl PdfDocument {
    fn base_size(&self, page: u32) -> anyhow::Result<PageSize> {
        let index = page
            .checked_sub(1)
            .ok_or_else(|| anyhow::anyhow!("page numbers start at 1"))?;
        self.structure
            .pages
            .get(index as usize)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("page {page} out of range"))
    }
}

impl Document for PdfDocument {
    fn page_count(&self) -> u32 {
        self.structure.pages.len() as u32
    }

    fn page_size(&self, page: u32, scale: f32) -> anyhow::Result<PageSize> {
        Ok(self.base_size(page)?.scaled(scale))
    }

    fn render_page(&self, page: u32, scale: f32) -> anyhow::Result<RgbaBitmap> {
        let size = self.page_size(page, scale)?;
        let width = size.width.round().max(1.0) as i32;
        let height = size.height.round().max(1.0) as i32;
        self.pdfium
            .render(&self.content, page - 1, width, height)
            .with_context(|| format!("render page {page} at scale {scale}"))
    }

    fn outline(&self) -> anyhow::Result<Vec<OutlineNode>> {
        Ok(self.structure.outline.clone())
    }

    fn resolve_named_destination(&self, name: &str) -> anyhow::Result<LocationRef> {
        self.structure
            .named
            .get(name)
            .copied()
            .map(location_from_ref)
            .with_context(|| format!("unknown named destination {name:?}"))
    }

    fn location_to_page_index(&self, location: LocationRef) -> anyhow::Result<u32> {
        self.structure
            .pages_by_ref
            .get(&ref_from_location(location))
            .copied()
            .with_context(|| {
                format!(
                    "object {} {} R is not a page",
                    location.object, location.generation
                )
            })
    }
}

fn pdfium_disabled() -> bool {
    std::env::var("FOLIO_DISABLE_PDFIUM")
        .map(|v| !v.trim().is_empty() && v.trim() != "0")
        .unwrap_or(false)
}

fn bind_pdfium() -> anyhow::Result<Pdfium> {
    let mut candidates: Vec<PathBuf> = Vec::new();

    if let Ok(path) = std::env::var("FOLIO_PDFIUM_LIB_PATH") {
        let path = PathBuf::from(path);
        let bindings = Pdfium::bind_to_library(&path)
            .map_err(|err| anyhow::anyhow!(err))
            .map_err(|err| {
                anyhow::anyhow!(
                    "{err}\n\nFailed to load Pdfium from FOLIO_PDFIUM_LIB_PATH={}.",
                    path.display()
                )
            })?;
        return Ok(Pdfium::new(bindings));
    }

    if let Some(path) = option_env!("FOLIO_PDFIUM_LIB_PATH") {
        let path = PathBuf::from(path);
        if path.is_file()
            && let Ok(bindings) = Pdfium::bind_to_library(&path)
        {
            return Ok(Pdfium::new(bindings));
        }
    }

    if let Ok(dir) = std::env::var("FOLIO_PDFIUM_DIR") {
        candidates.push(Pdfium::pdfium_platform_library_name_at_path(Path::new(
            &dir,
        )));
    }

    if let Ok(exe) = std::env::current_exe()
        && let Some(dir) = exe.parent()
    {
        candidates.push(Pdfium::pdfium_platform_library_name_at_path(dir));
    }

    candidates.push(Pdfium::pdfium_platform_library_name_at_path(Path::new(
        ".pdfium",
    )));
    candidates.push(Pdfium::pdfium_platform_library_name_at_path(Path::new(".")));

    for path in candidates {
        if let Ok(bindings) = Pdfium::bind_to_library(&path) {
            return Ok(Pdfium::new(bindings));
        }
    }

    let bindings = Pdfium::bind_to_system_library()
        .map_err(|err| anyhow::anyhow!(err))
        .map_err(|err| {
            let lib_name = Pdfium::pdfium_platform_library_name();
            anyhow::anyhow!(
                "{err}\n\nPdfium library not found.\n- Install it system-wide, or\n- Place {} next to the executable, or\n- Set FOLIO_PDFIUM_LIB_PATH.\n",
                lib_name.to_string_lossy()
            )
        })?;

    Ok(Pdfium::new(bindings))
}
