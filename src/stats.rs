use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared between a record stream and whoever drives it
#[derive(Default, Debug)]
pub struct ExtractionStats {
    pub glyphs_seen: AtomicU64,
    pub arcs_seen: AtomicU64,
    pub nodes_emitted: AtomicU64,
    pub edges_emitted: AtomicU64,
    pub glyphs_skipped: AtomicU64,
    pub arcs_skipped: AtomicU64,
}

impl ExtractionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_glyphs(&self) {
        self.glyphs_seen.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_arcs(&self) {
        self.arcs_seen.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_nodes(&self) {
        self.nodes_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_edges(&self) {
        self.edges_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_glyphs_skipped(&self) {
        self.glyphs_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_arcs_skipped(&self) {
        self.arcs_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn glyphs(&self) -> u64 {
        self.glyphs_seen.load(Ordering::Relaxed)
    }

    pub fn arcs(&self) -> u64 {
        self.arcs_seen.load(Ordering::Relaxed)
    }

    pub fn nodes(&self) -> u64 {
        self.nodes_emitted.load(Ordering::Relaxed)
    }

    pub fn edges(&self) -> u64 {
        self.edges_emitted.load(Ordering::Relaxed)
    }

    pub fn skipped_glyphs(&self) -> u64 {
        self.glyphs_skipped.load(Ordering::Relaxed)
    }

    pub fn skipped_arcs(&self) -> u64 {
        self.arcs_skipped.load(Ordering::Relaxed)
    }

    pub fn skipped(&self) -> u64 {
        self.skipped_glyphs() + self.skipped_arcs()
    }
}
