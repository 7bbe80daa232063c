use bitflags::bitflags;

bitflags! {
    /// Internal state bits carried by every node.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct NodeFlags: u16 {
        /// Geometry changed since the last batching pass read the outline
        const OUTLINE_CHANGED    = 1 << 0;
        /// Group asked to reorder its own subtree for batching
        const FAIRY_BATCHING     = 1 << 1;
        /// Group owns a descendants list that must be rebuilt
        const BATCHING_REQUESTED = 1 << 2;
        /// Group owns a descendants list (derived, see `update_batching_flags`)
        const BATCHING_ROOT      = 1 << 3;
        /// Node must not move during batching and blocks others from moving past it
        const SKIP_BATCHING      = 1 << 4;
        /// Painted output is reused once captured
        const CACHE_AS_BITMAP    = 1 << 5;
        /// A capture has completed since the cache was last invalidated
        const CAPTURED           = 1 << 6;
        /// A stale mask warning was already logged for this group
        const MASK_WARNED        = 1 << 7;
    }
}
