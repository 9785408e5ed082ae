use bitflags::bitflags;

bitflags! {
    /// Per-instruction hints the register allocator consumes (spec §3).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct RtlFlags: u8 {
        /// The instruction clobbers one of its source registers; the
        /// allocator must not assign the same hardware register to a
        /// source that's still live afterward and a different result.
        const DESTRUCTIVE = 0b001;
        /// Sources may be evaluated/assigned in any order (no destructive
        /// aliasing hazard between them).
        const UNORDERED   = 0b010;
        /// A [`RegisterState`](crate::RegisterState) snapshot of every
        /// live value is attached, for call sites and side exits that need
        /// to restore register contents afterward.
        const SAVE_STATE  = 0b100;
    }
}
