//! Application orchestration layer for Folio.

mod outline;
mod slots;
mod sync;
mod view;
mod viewer;
mod visibility;
mod zoom;

pub use outline::{
    EntryId, OutlineEntry, OutlineIndex, OutlineResolution, OutlineResolver, OutlineTree,
    PendingDestination, build_outline, resolve_destination, resolve_pending,
};
pub use slots::{PageSlot, PageSlotStore, RenderOutcome, RenderTicket};
pub use sync::{Highlights, ScrollBehavior, ScrollRequest, ScrollSyncController};
pub use view::ViewState;
pub use viewer::Viewer;
pub use visibility::{VisibilityAggregator, VisibilityEvent};
pub use zoom::{ZoomChange, ZoomController};
