//! Outline tree, destination resolution and the active-section index.
//!
//! Loading runs in three stages: [`build_outline`] flattens the engine's
//! tree into an arena and collects the entries that carry a destination,
//! [`resolve_pending`] maps each destination to a page, and
//! [`OutlineResolver::publish`] stores the pages and builds the sorted
//! index in one step, so no half-resolved index is ever visible.

use folio_core::{Destination, Document, OutlineNode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(pub usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutlineEntry {
    pub title: String,
    pub destination: Option<Destination>,
    pub depth: usize,
    pub parent: Option<EntryId>,
    pub children: Vec<EntryId>,
    pub resolved_page: Option<u32>,
}

impl OutlineEntry {
    /// Entries without a destination are shown but cannot be activated.
    pub fn is_interactive(&self) -> bool {
        self.destination.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDestination {
    pub entry: EntryId,
    pub destination: Destination,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutlineTree {
    entries: Vec<OutlineEntry>,
    roots: Vec<EntryId>,
}

impl OutlineTree {
    pub fn entries(&self) -> &[OutlineEntry] {
        &self.entries
    }

    pub fn roots(&self) -> &[EntryId] {
        &self.roots
    }

    pub fn entry(&self, id: EntryId) -> Option<&OutlineEntry> {
        self.entries.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Flattens `nodes` depth-first. Entry ids follow document order.
pub fn build_outline(nodes: &[OutlineNode]) -> (OutlineTree, Vec<PendingDestination>) {
    fn walk(
        nodes: &[OutlineNode],
        depth: usize,
        parent: Option<EntryId>,
        tree: &mut OutlineTree,
        pending: &mut Vec<PendingDestination>,
    ) -> Vec<EntryId> {
        let mut ids = Vec::with_capacity(nodes.len());
        for node in nodes {
            let id = EntryId(tree.entries.len());
            tree.entries.push(OutlineEntry {
                title: node.title.clone(),
                destination: node.destination.clone(),
                depth,
                parent,
                children: Vec::new(),
                resolved_page: None,
            });
            if let Some(destination) = &node.destination {
                pending.push(PendingDestination {
                    entry: id,
                    destination: destination.clone(),
                });
            }
            let children = walk(&node.children, depth + 1, Some(id), tree, pending);
            tree.entries[id.0].children = children;
            ids.push(id);
        }
        ids
    }

    let mut tree = OutlineTree::default();
    let mut pending = Vec::new();
    let roots = walk(nodes, 0, None, &mut tree, &mut pending);
    tree.roots = roots;
    (tree, pending)
}

/// Maps a destination to a 1-based page number.
pub fn resolve_destination(
    document: &impl Document,
    destination: &Destination,
) -> anyhow::Result<u32> {
    let location = match destination {
        Destination::Named(name) => document.resolve_named_destination(name)?,
        Destination::Explicit(location) => *location,
    };
    let index = document.location_to_page_index(location)?;
    let page = index.saturating_add(1);
    if page > document.page_count() {
        anyhow::bail!("destination points past the last page ({page})");
    }
    Ok(page)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutlineResolution {
    pub document_generation: u64,
    pub pages: Vec<(EntryId, Option<u32>)>,
}

/// Resolves every pending destination. A failure only affects its own entry.
pub fn resolve_pending(
    document: &impl Document,
    pending: &[PendingDestination],
    document_generation: u64,
) -> OutlineResolution {
    let pages = pending
        .iter()
        .map(|item| {
            let page = match resolve_destination(document, &item.destination) {
                Ok(page) => Some(page),
                Err(err) => {
                    tracing::debug!(
                        entry = item.entry.0,
                        "outline destination unresolved: {err:#}"
                    );
                    None
                }
            };
            (item.entry, page)
        })
        .collect();
    OutlineResolution {
        document_generation,
        pages,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutlineIndex {
    items: Vec<(u32, EntryId)>,
}

impl OutlineIndex {
    pub fn build(tree: &OutlineTree) -> Self {
        let mut items: Vec<(u32, EntryId)> = tree
            .entries
            .iter()
            .enumerate()
            .filter_map(|(idx, entry)| entry.resolved_page.map(|page| (page, EntryId(idx))))
            .collect();
        items.sort_by_key(|(page, _)| *page);
        Self { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[(u32, EntryId)] {
        &self.items
    }

    /// Last entry whose page is not after `current_page`.
    pub fn active_entry(&self, current_page: u32) -> Option<EntryId> {
        let end = self.items.partition_point(|(page, _)| *page <= current_page);
        end.checked_sub(1).map(|idx| self.items[idx].1)
    }
}

#[derive(Debug, Clone, Default)]
pub struct OutlineResolver {
    tree: OutlineTree,
    index: OutlineIndex,
    generation: u64,
}

impl OutlineResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the tree for a new document and returns what needs resolving.
    /// The previous index is dropped immediately.
    pub fn begin(
        &mut self,
        nodes: &[OutlineNode],
        document_generation: u64,
    ) -> Vec<PendingDestination> {
        let (tree, pending) = build_outline(nodes);
        self.tree = tree;
        self.index = OutlineIndex::default();
        self.generation = document_generation;
        pending
    }

    /// Applies a finished resolution. Results for another document are ignored.
    pub fn publish(&mut self, resolution: OutlineResolution) -> bool {
        if resolution.document_generation != self.generation {
            tracing::debug!(
                stale = resolution.document_generation,
                current = self.generation,
                "dropping outline resolution for replaced document"
            );
            return false;
        }
        for (id, page) in resolution.pages {
            if let Some(entry) = self.tree.entries.get_mut(id.0) {
                entry.resolved_page = page;
            }
        }
        self.index = OutlineIndex::build(&self.tree);
        tracing::debug!(
            entries = self.tree.len(),
            indexed = self.index.len(),
            "outline index published"
        );
        true
    }

    pub fn clear(&mut self) {
        self.tree = OutlineTree::default();
        self.index = OutlineIndex::default();
    }

    pub fn tree(&self) -> &OutlineTree {
        &self.tree
    }

    pub fn index(&self) -> &OutlineIndex {
        &self.index
    }

    pub fn entry(&self, id: EntryId) -> Option<&OutlineEntry> {
        self.tree.entry(id)
    }

    pub fn active_entry(&self, current_page: u32) -> Option<EntryId> {
        self.index.active_entry(current_page)
    }
}
