//! Scale stepping for the main view.

use folio_core::{Settings, snap_scale};

use crate::view::ViewState;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomChange {
    pub from: f32,
    pub to: f32,
    /// Page that was current before the change; the view re-anchors on it.
    pub anchor: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct ZoomController {
    step: f32,
    min_scale: f32,
}

impl ZoomController {
    pub fn new(settings: &Settings) -> Self {
        Self {
            step: settings.zoom_step,
            min_scale: settings.min_scale,
        }
    }

    pub fn min_scale(&self) -> f32 {
        self.min_scale
    }

    pub fn zoom_in(&self, view: &mut ViewState) -> ZoomChange {
        self.apply(view, snap_scale(view.scale + self.step))
    }

    /// `None` when the view already sits at the minimum scale.
    pub fn zoom_out(&self, view: &mut ViewState) -> Option<ZoomChange> {
        if view.scale <= self.min_scale {
            return None;
        }
        let to = snap_scale((view.scale - self.step).max(self.min_scale));
        Some(self.apply(view, to))
    }

    fn apply(&self, view: &mut ViewState, to: f32) -> ZoomChange {
        let change = ZoomChange {
            from: view.scale,
            to,
            anchor: view.current_page,
        };
        view.scale = to;
        change
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view_at(scale: f32) -> ViewState {
        ViewState {
            current_page: 3,
            scale,
            inverted: false,
            is_programmatic_scroll: false,
        }
    }

    #[test]
    fn zoom_round_trip_restores_scale() {
        let zoom = ZoomController::new(&Settings::default());
        let mut view = view_at(1.0);
        let change = zoom.zoom_in(&mut view);
        assert_eq!(change.to, 1.2);
        assert_eq!(change.anchor, 3);
        zoom.zoom_out(&mut view);
        assert_eq!(view.scale, 1.0);
    }

    #[test]
    fn zoom_out_stops_at_minimum() {
        let zoom = ZoomController::new(&Settings::default());
        let mut view = view_at(0.6);
        assert!(zoom.zoom_out(&mut view).is_some());
        assert_eq!(view.scale, 0.4);
        assert!(zoom.zoom_out(&mut view).is_none());
        assert_eq!(view.scale, 0.4);
    }

    #[test]
    fn zoom_out_clamps_off_grid_scale() {
        let zoom = ZoomController::new(&Settings::default());
        let mut view = view_at(0.5);
        let change = zoom.zoom_out(&mut view).expect("change");
        assert_eq!(change.to, 0.4);
    }
}
