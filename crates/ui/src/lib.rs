//! ratatui-based UI: a continuous page column with a thumbnail and outline
//! sidebar, driven by the viewer's render lifecycle.

use std::io::{self, Stdout};
use std::ops::ControlFlow;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::Context as _;
use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{event, terminal};
use folio_application::{EntryId, Viewer};
use folio_core::{DocumentEngine, RenderState, SessionGateway, ViewKind};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{
    Block, Borders, Clear, HighlightSpacing, List, ListItem, ListState, Paragraph, Wrap,
};
use ratatui_image::Image as ImageWidget;
use ratatui_image::picker::Picker;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

mod graphics;
mod images;
mod layout;
mod observer;

pub use graphics::{TerminalHints, build_picker, protocol_label};
pub use layout::{CellSize, ColumnLayout, PAGE_GAP_PX, PagePlacement, place_pages};
pub use observer::IntersectionObserver;

use images::{PageImages, PageSource};
use observer::Span as Extent;

const IDLE_POLL: Duration = Duration::from_millis(250);
const BUSY_POLL: Duration = Duration::from_millis(16);
const RENDER_BUDGET_PER_FRAME: usize = 2;
const SIDEBAR_WIDTH: u16 = 28;
const SCROLL_STEP_ROWS: u16 = 3;

/// Reads a document from disk, returning its bytes and display name.
pub fn read_document(path: &Path) -> anyhow::Result<(Vec<u8>, String)> {
    let content =
        std::fs::read(path).with_context(|| format!("read document {}", path.display()))?;
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());
    Ok((content, name))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Focus {
    Pages,
    Sidebar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SidebarTab {
    Thumbnails,
    Outline,
}

#[derive(Debug)]
struct PagesPanel {
    area: Rect,
    scroll_top: f32,
}

#[derive(Debug)]
struct Sidebar {
    open: bool,
    tab: SidebarTab,
    area: Rect,
    scroll_top: f32,
    thumbnail_cursor: u32,
    outline_selected: usize,
    revealed: Option<u32>,
}

#[derive(Debug, Default)]
struct GotoPanel {
    open: bool,
    input: String,
    error: Option<String>,
}

#[derive(Debug, Default)]
struct OpenPanel {
    open: bool,
    input: String,
}

/// Generations the page geometry was last built for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct LayoutKey {
    document: u64,
    main: u64,
    thumbnails: u64,
}

struct Screen {
    header: Rect,
    pages: Rect,
    sidebar: Option<Rect>,
    status: Rect,
}

pub struct Ui<E: DocumentEngine, S: SessionGateway> {
    viewer: Viewer<E, S>,
    picker: Picker,
    images: PageImages,
    pages_observer: IntersectionObserver,
    thumbnails_observer: IntersectionObserver,
    pages: PagesPanel,
    sidebar: Sidebar,
    focus: Focus,
    goto_panel: GotoPanel,
    open_panel: OpenPanel,
    error: Option<String>,
    notice: Option<String>,
    quit_armed: bool,
    seen: LayoutKey,
}

impl<E: DocumentEngine, S: SessionGateway> Ui<E, S> {
    pub fn new(viewer: Viewer<E, S>) -> Self {
        let pages_observer = IntersectionObserver::for_pages(viewer.settings());
        let thumbnails_observer = IntersectionObserver::for_thumbnails(viewer.settings());
        Self {
            viewer,
            picker: Picker::halfblocks(),
            images: PageImages::default(),
            pages_observer,
            thumbnails_observer,
            pages: PagesPanel {
                area: Rect::default(),
                scroll_top: 0.0,
            },
            sidebar: Sidebar {
                open: true,
                tab: SidebarTab::Thumbnails,
                area: Rect::default(),
                scroll_top: 0.0,
                thumbnail_cursor: 1,
                outline_selected: 0,
                revealed: None,
            },
            focus: Focus::Pages,
            goto_panel: GotoPanel::default(),
            open_panel: OpenPanel::default(),
            error: None,
            quit_armed: false,
            notice: None,
            seen: LayoutKey::default(),
        }
    }

    /// Starts with an error popup, e.g. a document that failed to open.
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error = Some(message.into());
        self
    }

    pub fn viewer(&self) -> &Viewer<E, S> {
        &self.viewer
    }

    pub fn run(&mut self) -> anyhow::Result<()> {
        let mut terminal = setup_terminal()?;
        self.picker = build_picker(&TerminalHints::from_env());
        self.images.clear();
        terminal.clear().ok();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.event_loop(&mut terminal)
        }));
        let restore_result = restore_terminal(&mut terminal);

        match (result, restore_result) {
            (Ok(Ok(())), Ok(())) => Ok(()),
            (Ok(Ok(())), Err(err)) => Err(err),
            (Ok(Err(err)), Ok(())) => Err(err),
            (Ok(Err(err)), Err(restore)) => Err(err.context(format!(
                "additionally failed to restore terminal: {restore}"
            ))),
            (Err(panic), Ok(())) => Err(anyhow::anyhow!(panic_to_string(panic))),
            (Err(panic), Err(err)) => Err(anyhow::anyhow!(
                "{}\n(additionally failed to restore terminal: {err})",
                panic_to_string(panic)
            )),
        }
    }

    fn event_loop(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    ) -> anyhow::Result<()> {
        let mut needs_redraw = true;

        loop {
            let size = terminal.size().context("read terminal size")?;
            let area = Rect::new(0, 0, size.width, size.height);
            needs_redraw |= self.sync(area, Instant::now());

            if needs_redraw {
                terminal.draw(|frame| self.draw(frame.area(), frame))?;
                needs_redraw = false;
            }

            let timeout = if self.is_busy() { BUSY_POLL } else { IDLE_POLL };
            if !event::poll(timeout)? {
                continue;
            }

            match event::read()? {
                Event::Resize(_, _) => {
                    needs_redraw = true;
                }
                Event::Key(key) => {
                    if key.kind == KeyEventKind::Release {
                        continue;
                    }
                    needs_redraw = true;
                    if self.handle_key(key)?.is_break() {
                        return Ok(());
                    }
                }
                _ => {}
            }
        }
    }

    /// Renders are pending or a programmatic scroll has yet to settle.
    fn is_busy(&self) -> bool {
        self.viewer.pending_renders() > 0 || self.viewer.view().is_programmatic_scroll
    }

    fn cell_size(&self) -> CellSize {
        let (width, height) = self.picker.font_size();
        CellSize::new(width, height)
    }

    fn main_layout(&self) -> ColumnLayout {
        let count = self.viewer.page_count().unwrap_or(0);
        ColumnLayout::build(
            (1..=count).map(|page| self.viewer.main_display_size(page)),
            PAGE_GAP_PX,
            0.0,
        )
    }

    /// Every thumbnail carries one text row below it for the page label.
    fn thumbnail_layout(&self, cell: CellSize) -> ColumnLayout {
        let count = self.viewer.page_count().unwrap_or(0);
        let slots = self.viewer.thumbnail_slots();
        ColumnLayout::build(
            (1..=count).map(|page| slots.display_size(page)),
            PAGE_GAP_PX,
            cell.px_for_rows(1),
        )
    }

    /// One frame of bookkeeping: settles programmatic scrolls, applies
    /// scroll requests, feeds visibility to the viewer and runs a bounded
    /// number of renders. Returns whether anything on screen changed.
    fn sync(&mut self, area: Rect, now: Instant) -> bool {
        let screen = split_screen(area, self.sidebar.open);
        let sidebar_area = screen.sidebar.map(sidebar_inner).unwrap_or_default();
        let mut changed = screen.pages != self.pages.area || sidebar_area != self.sidebar.area;
        self.pages.area = screen.pages;
        self.sidebar.area = sidebar_area;

        changed |= self.viewer.tick(now);
        changed |= self.refresh_layout_key();

        let cell = self.cell_size();
        let layout = self.main_layout();
        let viewport_height = cell.px_for_rows(self.pages.area.height);
        if let Some(request) = self.viewer.take_scroll_request()
            && let Some(top) = layout.scroll_target(request.page, viewport_height)
        {
            tracing::trace!(
                page = request.page,
                behavior = ?request.behavior,
                top,
                "scroll request"
            );
            self.pages.scroll_top = top;
            changed = true;
        }
        self.pages.scroll_top = layout.clamp_scroll(self.pages.scroll_top, viewport_height);

        let batch = self.pages_observer.observe(
            Extent::new(self.pages.scroll_top, viewport_height),
            layout.spans(),
        );
        if !batch.is_empty() {
            self.viewer.handle_main_visibility(&batch);
            changed = true;
        }
        changed |= self.sync_thumbnails(cell);

        let executed = self.viewer.run_pending_renders(RENDER_BUDGET_PER_FRAME);
        changed |= executed > 0;

        let main = self.viewer.main_slots();
        self.images.retain(ViewKind::Main, |page| {
            main.slot(page).is_some_and(|slot| slot.pixels().is_some())
        });
        let thumbnails = self.viewer.thumbnail_slots();
        self.images.retain(ViewKind::Thumbnail, |page| {
            thumbnails.slot(page).is_some_and(|slot| slot.pixels().is_some())
        });
        changed
    }

    fn refresh_layout_key(&mut self) -> bool {
        let key = LayoutKey {
            document: self.viewer.document_generation(),
            main: self.viewer.main_slots().generation(),
            thumbnails: self.viewer.thumbnail_slots().generation(),
        };
        if key == self.seen {
            return false;
        }
        if key.document != self.seen.document {
            self.pages.scroll_top = 0.0;
            self.sidebar.scroll_top = 0.0;
            self.sidebar.thumbnail_cursor = self.viewer.current_page();
            self.sidebar.outline_selected = 0;
            self.sidebar.revealed = None;
            self.images.clear();
        }
        if key.main != self.seen.main {
            self.pages_observer.reset();
            self.images.retain(ViewKind::Main, |_| false);
        }
        if key.thumbnails != self.seen.thumbnails {
            self.thumbnails_observer.reset();
            self.images.retain(ViewKind::Thumbnail, |_| false);
        }
        self.seen = key;
        true
    }

    fn thumbnails_shown(&self) -> bool {
        self.sidebar.open
            && self.sidebar.tab == SidebarTab::Thumbnails
            && self.sidebar.area.height > 0
    }

    fn sync_thumbnails(&mut self, cell: CellSize) -> bool {
        if !self.thumbnails_shown() {
            self.sidebar.revealed = None;
            let batch = self.thumbnails_observer.observe(Extent::new(0.0, 0.0), &[]);
            if batch.is_empty() {
                return false;
            }
            self.viewer.handle_thumbnail_visibility(&batch);
            return true;
        }

        let layout = self.thumbnail_layout(cell);
        let viewport_height = cell.px_for_rows(self.sidebar.area.height);
        let mut changed = false;

        let target = match self.focus {
            Focus::Sidebar => Some(self.sidebar.thumbnail_cursor),
            Focus::Pages => self.viewer.active_thumbnail(),
        };
        if target != self.sidebar.revealed {
            if let Some(page) = target
                && let Some(top) = layout.reveal(page, self.sidebar.scroll_top, viewport_height)
            {
                changed |= top != self.sidebar.scroll_top;
                self.sidebar.scroll_top = top;
            }
            self.sidebar.revealed = target;
        }
        self.sidebar.scroll_top = layout.clamp_scroll(self.sidebar.scroll_top, viewport_height);

        let batch = self.thumbnails_observer.observe(
            Extent::new(self.sidebar.scroll_top, viewport_height),
            layout.spans(),
        );
        if !batch.is_empty() {
            self.viewer.handle_thumbnail_visibility(&batch);
            changed = true;
        }
        changed
    }

    fn scroll_by(&mut self, delta_px: f32) {
        self.pages.scroll_top = (self.pages.scroll_top + delta_px).max(0.0);
    }

    fn page_scroll_px(&self) -> f32 {
        let cell = self.cell_size();
        cell.px_for_rows(self.pages.area.height.saturating_sub(1).max(1))
    }

    fn open_document(&mut self, path: &Path) {
        let (content, name) = match read_document(path) {
            Ok(read) => read,
            Err(err) => {
                self.error = Some(format!("{err:#}"));
                return;
            }
        };
        match self.viewer.open(content, name.clone()) {
            Ok(()) => {
                self.notice = Some(format!("opened {name}"));
            }
            Err(err) => {
                self.error = Some(format!("{name}: {err}"));
            }
        }
    }

    fn handle_key(&mut self, key: KeyEvent) -> anyhow::Result<ControlFlow<()>> {
        if self.error.is_some() {
            if matches!(key.code, KeyCode::Esc | KeyCode::Enter | KeyCode::Char('q')) {
                self.error = None;
            }
            return Ok(ControlFlow::Continue(()));
        }
        if self.goto_panel.open {
            return self.handle_goto_panel_key(key);
        }
        if self.open_panel.open {
            return self.handle_open_panel_key(key);
        }

        self.notice = None;
        let quit_armed = std::mem::take(&mut self.quit_armed);
        let cell = self.cell_size();
        let has_document = self.viewer.page_count().is_some();

        match key.code {
            // An open document asks once before leaving.
            KeyCode::Char('q') | KeyCode::Esc if has_document && !quit_armed => {
                self.quit_armed = true;
                self.notice = Some("press q again to quit".to_string());
            }
            KeyCode::Char('q') | KeyCode::Esc => return Ok(ControlFlow::Break(())),
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                return Ok(ControlFlow::Break(()));
            }
            KeyCode::Char('o') => {
                self.open_panel.open = true;
                self.open_panel.input.clear();
            }
            KeyCode::Char('g') => {
                if has_document {
                    self.goto_panel.open = true;
                    self.goto_panel.input.clear();
                    self.goto_panel.error = None;
                } else {
                    self.notice = Some("no document loaded".to_string());
                }
            }
            KeyCode::Char('s') => {
                self.sidebar.open = !self.sidebar.open;
                if !self.sidebar.open {
                    self.focus = Focus::Pages;
                }
            }
            KeyCode::Char('t') => {
                self.sidebar.tab = match self.sidebar.tab {
                    SidebarTab::Thumbnails => SidebarTab::Outline,
                    SidebarTab::Outline => SidebarTab::Thumbnails,
                };
                self.sidebar.open = true;
            }
            KeyCode::Tab | KeyCode::BackTab => {
                self.focus = match self.focus {
                    Focus::Pages if self.sidebar.open => {
                        self.sidebar.thumbnail_cursor = self.viewer.current_page();
                        if let Some(EntryId(idx)) = self.viewer.active_outline_entry() {
                            self.sidebar.outline_selected = idx;
                        }
                        Focus::Sidebar
                    }
                    _ => Focus::Pages,
                };
                self.sidebar.revealed = None;
            }
            KeyCode::Char('+') | KeyCode::Char('=') => {
                if self.viewer.zoom_in() {
                    self.notice = Some(format!("zoom {}", self.viewer.zoom_label()));
                }
            }
            KeyCode::Char('-') => {
                if self.viewer.zoom_out() {
                    self.notice = Some(format!("zoom {}", self.viewer.zoom_label()));
                } else if has_document {
                    self.notice = Some("already at minimum zoom".to_string());
                }
            }
            KeyCode::Char('i') => {
                let inverted = self.viewer.toggle_theme();
                self.notice = Some(if inverted { "night mode" } else { "day mode" }.to_string());
            }
            KeyCode::Left | KeyCode::Char('h') => {
                self.viewer.step_page(-1);
            }
            KeyCode::Right | KeyCode::Char('l') => {
                self.viewer.step_page(1);
            }
            KeyCode::Home => {
                self.viewer.go_to_page(1);
            }
            KeyCode::End => {
                if let Some(count) = self.viewer.page_count() {
                    self.viewer.go_to_page(count);
                }
            }
            KeyCode::PageDown | KeyCode::Char(' ') => {
                let delta = self.page_scroll_px();
                self.scroll_by(delta);
            }
            KeyCode::PageUp => {
                let delta = self.page_scroll_px();
                self.scroll_by(-delta);
            }
            KeyCode::Down | KeyCode::Char('j') => match self.focus {
                Focus::Pages => self.scroll_by(cell.px_for_rows(SCROLL_STEP_ROWS)),
                Focus::Sidebar => self.move_sidebar_selection(1),
            },
            KeyCode::Up | KeyCode::Char('k') => match self.focus {
                Focus::Pages => self.scroll_by(-cell.px_for_rows(SCROLL_STEP_ROWS)),
                Focus::Sidebar => self.move_sidebar_selection(-1),
            },
            KeyCode::Enter if self.focus == Focus::Sidebar => self.activate_sidebar_selection(),
            _ => {}
        }
        Ok(ControlFlow::Continue(()))
    }

    fn move_sidebar_selection(&mut self, delta: i64) {
        match self.sidebar.tab {
            SidebarTab::Thumbnails => {
                let Some(count) = self.viewer.page_count() else {
                    return;
                };
                let next =
                    (i64::from(self.sidebar.thumbnail_cursor) + delta).clamp(1, i64::from(count));
                self.sidebar.thumbnail_cursor = next as u32;
            }
            SidebarTab::Outline => {
                let len = self.viewer.outline_entries().len();
                if len == 0 {
                    return;
                }
                let next = (self.sidebar.outline_selected as i64 + delta).clamp(0, len as i64 - 1);
                self.sidebar.outline_selected = next as usize;
            }
        }
    }

    fn activate_sidebar_selection(&mut self) {
        match self.sidebar.tab {
            SidebarTab::Thumbnails => {
                self.viewer.activate_thumbnail(self.sidebar.thumbnail_cursor);
            }
            SidebarTab::Outline => {
                let id = EntryId(self.sidebar.outline_selected);
                let Some(entry) = self.viewer.outline().entry(id) else {
                    return;
                };
                if !entry.is_interactive() {
                    self.notice = Some("section has no destination".to_string());
                    return;
                }
                let title = entry.title.clone();
                if !self.viewer.activate_outline_entry(id) {
                    self.notice = Some(format!("could not resolve \"{title}\""));
                }
            }
        }
    }

    fn handle_goto_panel_key(&mut self, key: KeyEvent) -> anyhow::Result<ControlFlow<()>> {
        match key.code {
            KeyCode::Esc => {
                self.goto_panel.open = false;
                self.goto_panel.input.clear();
                self.goto_panel.error = None;
            }
            KeyCode::Enter => {
                let input = self.goto_panel.input.trim();
                if input.is_empty() {
                    self.goto_panel.error = Some("Enter a page number".to_string());
                    return Ok(ControlFlow::Continue(()));
                }

                let page = match input.parse::<u32>() {
                    Ok(p) if p >= 1 => p,
                    _ => {
                        self.goto_panel.error = Some("Invalid page number".to_string());
                        return Ok(ControlFlow::Continue(()));
                    }
                };

                if let Some(total) = self.viewer.page_count()
                    && page > total
                {
                    self.goto_panel.error = Some(format!("Page out of range (1..={total})"));
                    return Ok(ControlFlow::Continue(()));
                }

                if self.viewer.go_to_page(page) {
                    self.notice = Some(format!("jumped to page {page}"));
                }
                self.goto_panel.open = false;
                self.goto_panel.error = None;
            }
            KeyCode::Backspace => {
                self.goto_panel.input.pop();
            }
            KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.goto_panel.input.clear();
            }
            KeyCode::Char(ch) if ch.is_ascii_digit() => {
                self.goto_panel.input.push(ch);
            }
            _ => {}
        }
        Ok(ControlFlow::Continue(()))
    }

    fn handle_open_panel_key(&mut self, key: KeyEvent) -> anyhow::Result<ControlFlow<()>> {
        match key.code {
            KeyCode::Esc => {
                self.open_panel.open = false;
                self.open_panel.input.clear();
            }
            KeyCode::Enter => {
                let input = self.open_panel.input.trim().to_string();
                if input.is_empty() {
                    return Ok(ControlFlow::Continue(()));
                }
                self.open_panel.open = false;
                self.open_panel.input.clear();
                self.open_document(Path::new(&input));
            }
            KeyCode::Backspace => {
                self.open_panel.input.pop();
            }
            KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.open_panel.input.clear();
            }
            KeyCode::Char(ch) => {
                self.open_panel.input.push(ch);
            }
            _ => {}
        }
        Ok(ControlFlow::Continue(()))
    }

    fn accent_color(&self) -> Color {
        if self.viewer.view().inverted {
            Color::Yellow
        } else {
            Color::Cyan
        }
    }

    fn header_line(&self) -> Line<'static> {
        let bold = Style::default().add_modifier(Modifier::BOLD);
        let Some(progress) = self.viewer.progress() else {
            return Line::from(vec![
                Span::styled("folio", bold),
                Span::raw("  no document"),
            ]);
        };
        let name = self.viewer.document_name().unwrap_or("untitled").to_string();
        Line::from(vec![
            Span::styled(name, bold),
            Span::raw(format!(
                "  page {}/{} ({:.0}%)",
                progress.current_page,
                progress.total_pages,
                progress.percent()
            )),
            Span::raw(format!("  zoom {}", self.viewer.zoom_label())),
            Span::raw(format!("  [i] {}", self.viewer.theme_toggle_label())),
            Span::styled(
                format!("  {}", protocol_label(&self.picker)),
                Style::default().fg(Color::DarkGray),
            ),
        ])
    }

    fn status_line(&self) -> Line<'static> {
        if let Some(notice) = &self.notice {
            return Line::from(Span::styled(
                notice.clone(),
                Style::default().fg(self.accent_color()),
            ));
        }
        let key = |label: &'static str| {
            Span::styled(label, Style::default().add_modifier(Modifier::BOLD))
        };
        Line::from(vec![
            key("j/k"),
            Span::raw(" scroll  "),
            key("h/l"),
            Span::raw(" page  "),
            key("+/-"),
            Span::raw(" zoom  "),
            key("g"),
            Span::raw(" go to  "),
            key("o"),
            Span::raw(" open  "),
            key("t"),
            Span::raw(" tab  "),
            key("Tab"),
            Span::raw(" focus  "),
            key("s"),
            Span::raw(" sidebar  "),
            key("q"),
            Span::raw(" quit"),
        ])
    }

    fn draw(&mut self, area: Rect, frame: &mut ratatui::Frame) {
        frame.render_widget(Clear, area);
        let screen = split_screen(area, self.sidebar.open);

        frame.render_widget(Paragraph::new(self.header_line()), screen.header);
        self.draw_pages(screen.pages, frame);
        if let Some(sidebar) = screen.sidebar {
            self.draw_sidebar(sidebar, frame);
        }
        frame.render_widget(Paragraph::new(self.status_line()), screen.status);

        if self.goto_panel.open {
            self.draw_goto_panel(area, frame);
        }
        if self.open_panel.open {
            self.draw_open_panel(area, frame);
        }
        if self.error.is_some() {
            self.draw_error_popup(area, frame);
        }
    }

    fn draw_pages(&mut self, area: Rect, frame: &mut ratatui::Frame) {
        if self.viewer.page_count().is_none() {
            let text = Paragraph::new(Text::from(vec![
                Line::raw(""),
                Line::raw("No document open."),
                Line::raw("Press o to open a PDF."),
            ]))
            .alignment(Alignment::Center);
            frame.render_widget(text, area);
            return;
        }

        let cell = self.cell_size();
        let layout = self.main_layout();
        let inverted = self.viewer.view().inverted;
        let slots = self.viewer.main_slots();

        for placement in place_pages(&layout, self.pages.scroll_top, area, cell) {
            let slot = slots.slot(placement.page);
            let Some(bitmap) = slot.and_then(|slot| slot.pixels()) else {
                let label = match slot {
                    Some(slot) if slot.render_state() == RenderState::Rendering => "rendering…",
                    Some(slot) if slot.failures() > 0 => "render failed",
                    _ => "",
                };
                draw_placeholder(frame, placement.area, placement.page, label, inverted);
                continue;
            };
            let source = PageSource {
                kind: ViewKind::Main,
                generation: slots.generation(),
                inverted,
                bitmap,
                display: slots.display_size(placement.page),
            };
            match self.images.protocol(&self.picker, &source, &placement) {
                Ok(protocol) => frame.render_widget(ImageWidget::new(protocol), placement.area),
                Err(err) => {
                    tracing::warn!(page = placement.page, "failed to encode page image: {err:#}");
                    let (area, page) = (placement.area, placement.page);
                    draw_placeholder(frame, area, page, "image error", inverted);
                }
            }
        }
    }

    fn draw_sidebar(&mut self, area: Rect, frame: &mut ratatui::Frame) {
        let tab_style = |active: bool| {
            if active {
                Style::default().add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
            } else {
                Style::default().fg(Color::DarkGray)
            }
        };
        let border_style = if self.focus == Focus::Sidebar {
            Style::default().fg(self.accent_color())
        } else {
            Style::default()
        };
        let title = Line::from(vec![
            Span::styled("Thumbnails", tab_style(self.sidebar.tab == SidebarTab::Thumbnails)),
            Span::raw(" | "),
            Span::styled("Outline", tab_style(self.sidebar.tab == SidebarTab::Outline)),
        ]);
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(border_style)
            .title(title);
        let inner = block.inner(area);
        frame.render_widget(block, area);

        match self.sidebar.tab {
            SidebarTab::Thumbnails => self.draw_thumbnails(inner, frame),
            SidebarTab::Outline => self.draw_outline(inner, frame),
        }
    }

    fn draw_thumbnails(&mut self, area: Rect, frame: &mut ratatui::Frame) {
        if self.viewer.page_count().is_none() {
            return;
        }
        let cell = self.cell_size();
        let layout = self.thumbnail_layout(cell);
        let inverted = self.viewer.view().inverted;
        let active = self.viewer.active_thumbnail();
        let cursor = (self.focus == Focus::Sidebar).then_some(self.sidebar.thumbnail_cursor);
        let accent = self.accent_color();
        let slots = self.viewer.thumbnail_slots();

        for placement in place_pages(&layout, self.sidebar.scroll_top, area, cell) {
            let page = placement.page;
            let image_height = slots.display_size(page).height;
            let (image, label_row) = split_thumbnail(placement, image_height, area);

            if let Some(image) = image {
                let bitmap = slots.slot(page).and_then(|slot| slot.pixels());
                match bitmap {
                    Some(bitmap) => {
                        let source = PageSource {
                            kind: ViewKind::Thumbnail,
                            generation: slots.generation(),
                            inverted,
                            bitmap,
                            display: slots.display_size(page),
                        };
                        match self.images.protocol(&self.picker, &source, &image) {
                            Ok(protocol) => {
                                frame.render_widget(ImageWidget::new(protocol), image.area)
                            }
                            Err(err) => {
                                tracing::warn!(page, "failed to encode thumbnail: {err:#}");
                                draw_placeholder(frame, image.area, page, "", inverted);
                            }
                        }
                    }
                    None => draw_placeholder(frame, image.area, page, "", inverted),
                }
            }

            if let Some(row) = label_row {
                let mut style = Style::default();
                if active == Some(page) {
                    style = style.fg(Color::Black).bg(accent).add_modifier(Modifier::BOLD);
                }
                if cursor == Some(page) {
                    style = style.add_modifier(Modifier::REVERSED);
                }
                let label = Paragraph::new(Line::styled(format!("{page}"), style))
                    .alignment(Alignment::Center);
                frame.render_widget(label, row);
            }
        }
    }

    fn draw_outline(&self, area: Rect, frame: &mut ratatui::Frame) {
        let entries = self.viewer.outline_entries();
        if entries.is_empty() {
            frame.render_widget(
                Paragraph::new(Line::styled("(no outline)", Style::default().fg(Color::DarkGray))),
                area,
            );
            return;
        }

        let active = self.viewer.active_outline_entry();
        let width = usize::from(area.width.saturating_sub(2));
        let items: Vec<ListItem> = entries
            .iter()
            .enumerate()
            .map(|(idx, entry)| {
                let indent = "  ".repeat(entry.depth.min(8));
                let page = entry
                    .resolved_page
                    .map(|p| format!(" {p}"))
                    .unwrap_or_default();
                let title_width = width.saturating_sub(indent.len() + page.len());
                let title = truncate_to_width(&entry.title, title_width);
                let pad = title_width.saturating_sub(UnicodeWidthStr::width(title.as_str()));

                let mut style = Style::default();
                if !entry.is_interactive() {
                    style = style.fg(Color::DarkGray);
                }
                if active == Some(EntryId(idx)) {
                    style = style.fg(self.accent_color()).add_modifier(Modifier::BOLD);
                }
                ListItem::new(Line::styled(
                    format!("{indent}{title}{}{page}", " ".repeat(pad)),
                    style,
                ))
            })
            .collect();

        let selected = match self.focus {
            Focus::Sidebar => Some(self.sidebar.outline_selected.min(entries.len() - 1)),
            Focus::Pages => active.map(|EntryId(idx)| idx),
        };
        let list = List::new(items)
            .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
            .highlight_symbol("> ")
            .highlight_spacing(HighlightSpacing::Always);
        let mut state = ListState::default();
        state.select(selected);
        frame.render_stateful_widget(list, area, &mut state);
    }

    fn draw_goto_panel(&self, area: Rect, frame: &mut ratatui::Frame) {
        let popup_area = centered_rect(48, 28, area);
        frame.render_widget(Clear, popup_area);

        let title = match self.viewer.page_count() {
            Some(total) => format!("Go to page (1..={total})"),
            None => "Go to page".to_string(),
        };
        let block = Block::default().borders(Borders::ALL).title(Span::styled(
            title,
            Style::default().add_modifier(Modifier::BOLD),
        ));
        frame.render_widget(block.clone(), popup_area);

        let inner = block.inner(popup_area);
        let mut lines = vec![
            Line::from(vec![
                Span::styled("Page: ", Style::default().add_modifier(Modifier::BOLD)),
                Span::raw(self.goto_panel.input.clone()),
            ]),
            Line::raw(""),
            Line::raw("Enter jumps, Esc cancels, Ctrl+u clears."),
        ];
        if let Some(err) = &self.goto_panel.error {
            lines.push(Line::raw(""));
            lines.push(Line::from(Span::styled(
                err.clone(),
                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            )));
        }

        frame.render_widget(Paragraph::new(Text::from(lines)).wrap(Wrap { trim: true }), inner);
    }

    fn draw_open_panel(&self, area: Rect, frame: &mut ratatui::Frame) {
        let popup_area = centered_rect(70, 24, area);
        frame.render_widget(Clear, popup_area);

        let block = Block::default().borders(Borders::ALL).title(Span::styled(
            "Open PDF",
            Style::default().add_modifier(Modifier::BOLD),
        ));
        frame.render_widget(block.clone(), popup_area);

        let lines = vec![
            Line::from(vec![
                Span::styled("Path: ", Style::default().add_modifier(Modifier::BOLD)),
                Span::raw(self.open_panel.input.clone()),
            ]),
            Line::raw(""),
            Line::raw("Enter opens, Esc cancels, Ctrl+u clears."),
        ];
        frame.render_widget(
            Paragraph::new(Text::from(lines)).wrap(Wrap { trim: false }),
            block.inner(popup_area),
        );
    }

    fn draw_error_popup(&self, area: Rect, frame: &mut ratatui::Frame) {
        let Some(message) = &self.error else {
            return;
        };
        let popup_area = centered_rect(60, 30, area);
        frame.render_widget(Clear, popup_area);

        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Red))
            .title(Span::styled(
                "Error",
                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            ));
        let lines = vec![
            Line::raw(message.clone()),
            Line::raw(""),
            Line::styled("Esc or Enter to dismiss.", Style::default().fg(Color::DarkGray)),
        ];
        frame.render_widget(
            Paragraph::new(Text::from(lines))
                .wrap(Wrap { trim: true })
                .block(block),
            popup_area,
        );
    }
}

fn split_screen(area: Rect, sidebar_open: bool) -> Screen {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(area);

    let (pages, sidebar) = if sidebar_open && rows[1].width > SIDEBAR_WIDTH * 2 {
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(SIDEBAR_WIDTH), Constraint::Min(0)])
            .split(rows[1]);
        (columns[1], Some(columns[0]))
    } else {
        (rows[1], None)
    };

    Screen {
        header: rows[0],
        pages,
        sidebar,
        status: rows[2],
    }
}

fn sidebar_inner(area: Rect) -> Rect {
    Block::default().borders(Borders::ALL).inner(area)
}

/// Splits a thumbnail placement into the image part and its label row.
/// Returns no image when only the label is on screen.
fn split_thumbnail(
    placement: PagePlacement,
    image_height: f32,
    column: Rect,
) -> (Option<PagePlacement>, Option<Rect>) {
    if placement.clip_bottom <= image_height {
        return (Some(placement), None);
    }
    let area = placement.area;
    let label = Rect::new(column.x, area.bottom().saturating_sub(1), column.width, 1);
    if placement.clip_top >= image_height || area.height <= 1 {
        return (None, Some(label));
    }
    let mut image = placement;
    image.area.height -= 1;
    image.clip_bottom = image_height;
    (Some(image), Some(label))
}

fn draw_placeholder(
    frame: &mut ratatui::Frame,
    area: Rect,
    page: u32,
    label: &str,
    inverted: bool,
) {
    let style = if inverted {
        Style::default().fg(Color::DarkGray).bg(Color::Black)
    } else {
        Style::default().fg(Color::Gray).bg(Color::White)
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(style)
        .style(style)
        .title(format!("{page}"));
    let lines = if label.is_empty() {
        Vec::new()
    } else {
        vec![Line::raw(label.to_string())]
    };
    frame.render_widget(
        Paragraph::new(Text::from(lines))
            .alignment(Alignment::Center)
            .block(block),
        area,
    );
}

fn truncate_to_width(text: &str, max_width: usize) -> String {
    if UnicodeWidthStr::width(text) <= max_width {
        return text.to_string();
    }
    if max_width == 0 {
        return String::new();
    }
    let mut out = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let w = UnicodeWidthChar::width(ch).unwrap_or(0);
        if used + w + 1 > max_width {
            break;
        }
        out.push(ch);
        used += w;
    }
    out.push('…');
    out
}

fn setup_terminal() -> anyhow::Result<Terminal<CrosstermBackend<Stdout>>> {
    terminal::enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    crossterm::execute!(stdout, EnterAlternateScreen).context("enter alt screen")?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).context("create terminal")
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> anyhow::Result<()> {
    terminal::disable_raw_mode().context("disable raw mode")?;
    crossterm::execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("leave alt screen")?;
    Ok(())
}

fn panic_to_string(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panic: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panic: {s}")
    } else {
        "panic: (unknown payload)".to_string()
    }
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
