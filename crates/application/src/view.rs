use folio_core::{Settings, snap_scale};

/// Process-wide view state shared by the navigation components.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewState {
    pub current_page: u32,
    pub scale: f32,
    pub inverted: bool,
    pub is_programmatic_scroll: bool,
}

impl ViewState {
    pub fn new(settings: &Settings) -> Self {
        Self {
            current_page: 1,
            scale: snap_scale(settings.default_scale),
            inverted: settings.default_inverted,
            is_programmatic_scroll: false,
        }
    }
}
