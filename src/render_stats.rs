//! Frame statistics tracking for debugging and performance analysis.
//!
//! Enable by compiling with the `render-stats` feature:
//! ```bash
//! cargo test --features render-stats
//! ```
//!
//! A summary is logged at info level every second, showing:
//! - Frames and nodes updated
//! - Submissions and batch breaks (material/state switches)
//! - Batching passes and how many nodes they moved
//! - Clip scopes entered

/// Snapshot of accumulated frame statistics.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct StatsSnapshot {
    pub frames: u64,
    pub nodes_updated: u64,
    pub submissions: u64,
    pub batch_breaks: u64,
    pub batching_passes: u64,
    pub batching_moves: u64,
    pub rect_clips: u64,
    pub stencil_clips: u64,
}

#[cfg(feature = "render-stats")]
mod inner {
    use std::cell::RefCell;
    use std::time::Instant;

    thread_local! {
        static STATS: RefCell<RenderStats> = RefCell::new(RenderStats::new());
    }

    struct RenderStats {
        counts: super::StatsSnapshot,
        last_print: Instant,
    }

    impl RenderStats {
        fn new() -> Self {
            Self {
                counts: super::StatsSnapshot::default(),
                last_print: Instant::now(),
            }
        }

        fn reset(&mut self) {
            self.counts = super::StatsSnapshot::default();
            self.last_print = Instant::now();
        }
    }

    /// Record one node visited by the update traversal.
    #[inline]
    pub fn record_node_updated() {
        STATS.with(|s| {
            s.borrow_mut().counts.nodes_updated += 1;
        });
    }

    /// Record a batching pass over `moves` reordered descendants.
    #[inline]
    pub fn record_batching_pass(moves: u64) {
        STATS.with(|s| {
            let mut stats = s.borrow_mut();
            stats.counts.batching_passes += 1;
            stats.counts.batching_moves += moves;
        });
    }

    #[inline]
    pub fn record_rect_clip() {
        STATS.with(|s| {
            s.borrow_mut().counts.rect_clips += 1;
        });
    }

    #[inline]
    pub fn record_stencil_clip() {
        STATS.with(|s| {
            s.borrow_mut().counts.stencil_clips += 1;
        });
    }

    /// Return a snapshot of the current stats (for testing).
    pub fn get_stats() -> super::StatsSnapshot {
        STATS.with(|s| s.borrow().counts.clone())
    }

    /// Reset all stats to zero (for test isolation).
    pub fn reset_stats() {
        STATS.with(|s| {
            s.borrow_mut().reset();
        });
    }

    /// Called at the end of each frame to potentially log stats.
    pub fn end_frame(frame: &crate::context::FrameStats) {
        STATS.with(|s| {
            let mut stats = s.borrow_mut();
            stats.counts.frames += 1;
            stats.counts.submissions += frame.submissions as u64;
            stats.counts.batch_breaks += frame.batch_breaks as u64;

            if stats.last_print.elapsed().as_secs() >= 1 {
                let c = &stats.counts;
                let per_frame = |v: u64| v as f64 / c.frames.max(1) as f64;
                log::info!(
                    "[Render Stats] frames={} nodes/frame={:.1} submissions/frame={:.1} batches/frame={:.1}",
                    c.frames,
                    per_frame(c.nodes_updated),
                    per_frame(c.submissions),
                    per_frame(c.batch_breaks)
                );
                log::info!(
                    "  batching: passes={} moves={} clips: rect={} stencil={}",
                    c.batching_passes,
                    c.batching_moves,
                    c.rect_clips,
                    c.stencil_clips
                );
                stats.reset();
            }
        });
    }
}

#[cfg(feature = "render-stats")]
pub use inner::*;

// No-op implementations when feature is disabled - these get completely inlined away

#[cfg(not(feature = "render-stats"))]
#[inline(always)]
pub fn get_stats() -> StatsSnapshot {
    StatsSnapshot::default()
}

#[cfg(not(feature = "render-stats"))]
#[inline(always)]
pub fn reset_stats() {}

#[cfg(not(feature = "render-stats"))]
#[inline(always)]
pub fn record_node_updated() {}

#[cfg(not(feature = "render-stats"))]
#[inline(always)]
pub fn record_batching_pass(_moves: u64) {}

#[cfg(not(feature = "render-stats"))]
#[inline(always)]
pub fn record_rect_clip() {}

#[cfg(not(feature = "render-stats"))]
#[inline(always)]
pub fn record_stencil_clip() {}

#[cfg(not(feature = "render-stats"))]
#[inline(always)]
pub fn end_frame(_frame: &crate::context::FrameStats) {}
