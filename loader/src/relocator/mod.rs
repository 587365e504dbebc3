mod arena;

pub use arena::{BlockUse, PhysArena, RamBlock};

use crate::error::Result;
use core::convert::Infallible;

/// Handle to a claimed range of physical memory.
///
/// The bytes behind it are only reachable through the relocator that
/// issued it, so a released chunk cannot be written to by accident.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Chunk {
    id: usize,
    target: u64,
    size: usize
}

impl Chunk {
    pub const fn new(id: usize, target: u64, size: usize) -> Self {
        return Self { id, target, size };
    }

    pub fn id(&self) -> usize     { self.id }
    pub fn target(&self) -> u64   { self.target }
    pub fn size(&self) -> usize   { self.size }
    pub fn end(&self) -> u64      { self.target + self.size as u64 }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Preference {
    Low,
    High
}

/// Floating chunk request: `size` bytes starting somewhere in `[min, max_start]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RangeRequest {
    size: usize,
    align: u64,
    min: u64,
    max_start: u64,
    pref: Preference
}

impl RangeRequest {
    pub fn new(size: usize) -> Self {
        Self {
            size, align: 1,
            min: 0, max_start: u64::MAX,
            pref: Preference::Low
        }
    }

    pub fn align(mut self, align: u64) -> Self { self.align = align.max(1); self }
    pub fn within(mut self, min: u64, max_start: u64) -> Self { (self.min, self.max_start) = (min, max_start); self }
    pub fn prefer(mut self, pref: Preference) -> Self { self.pref = pref; self }

    /// Keep the whole chunk below `limit` (exclusive).
    pub fn below(self, limit: u64) -> Option<Self> {
        let max_start = limit.checked_sub(self.size as u64)?;
        return Some(self.within(self.min, max_start));
    }

    pub fn size(&self) -> usize             { self.size }
    pub fn alignment(&self) -> u64          { self.align }
    pub fn min(&self) -> u64                { self.min }
    pub fn max_start(&self) -> u64          { self.max_start }
    pub fn preference(&self) -> Preference  { self.pref }
}

/// CPU state the kernel is entered with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegisterState {
    pub gpr: [u64; 32],
    /// Index of the register holding the jump target.
    pub jumpreg: usize
}

impl RegisterState {
    pub const AT: usize = 1;
    pub const A0: usize = 4;
    pub const A1: usize = 5;

    pub const fn new() -> Self {
        return Self { gpr: [0; 32], jumpreg: Self::AT };
    }

    pub fn entry(&self) -> u64 { self.gpr[self.jumpreg] }
    pub fn argc(&self) -> u64  { self.gpr[Self::A0] }
    pub fn argv(&self) -> u64  { self.gpr[Self::A1] }
}

impl Default for RegisterState {
    fn default() -> Self { Self::new() }
}

/// Physical memory broker and final control transfer.
pub trait Relocator {
    /// Claim exactly `[target, target + size)`.
    fn alloc_at(&mut self, target: u64, size: usize) -> Result<Chunk>;

    fn alloc_in_range(&mut self, req: RangeRequest) -> Result<Chunk>;

    fn chunk_mut(&mut self, chunk: &Chunk) -> Result<&mut [u8]>;

    fn release(&mut self, chunk: Chunk);

    fn release_all(&mut self);

    /// Jump into the loaded kernel. Only ever returns on failure.
    fn boot(&mut self, state: &RegisterState) -> Result<Infallible>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn below_keeps_chunk_under_limit() {
        let req = RangeRequest::new(0x40).align(8).below(0x1_0000_0000).unwrap();
        assert_eq!(req.max_start(), 0xffff_ffc0);
        assert_eq!(req.min(), 0);
        assert!(RangeRequest::new(0x100).below(0x80).is_none());
    }

    #[test]
    fn register_indices() {
        let mut state = RegisterState::new();
        state.gpr[RegisterState::AT] = 0x8020_0000;
        state.gpr[RegisterState::A0] = 3;
        assert_eq!(state.entry(), 0x8020_0000);
        assert_eq!(state.argc(), 3);
        assert_eq!(state.argv(), 0);
    }
}
