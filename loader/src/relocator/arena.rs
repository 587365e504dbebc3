use crate::{
    addr::align_down,
    error::{Error, Result},
    relocator::{Chunk, Preference, RangeRequest, RegisterState, Relocator}
};
use alloc::{collections::BTreeMap, vec, vec::Vec};
use core::{cmp::Ordering, convert::Infallible};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockUse {
    Free,
    Reserved,
    Claimed(usize)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RamBlock {
    addr: u64,
    size: u64,
    usage: BlockUse
}

impl RamBlock {
    fn new(addr: u64, size: u64, usage: BlockUse) -> Self {
        return Self { addr, size, usage };
    }

    pub fn addr(&self) -> u64        { self.addr }
    pub fn size(&self) -> u64        { self.size }
    pub fn end(&self) -> u64         { self.addr + self.size }
    pub fn usage(&self) -> BlockUse  { self.usage }
    pub fn is_free(&self) -> bool    { self.usage == BlockUse::Free }

    fn contains(&self, addr: u64, size: u64) -> bool {
        return addr >= self.addr && addr.checked_add(size).is_some_and(|end| end <= self.end());
    }

    fn is_coalescable(&self, other: &RamBlock) -> Ordering {
        let info_eq = {
            self.usage == other.usage &&
            !matches!(self.usage, BlockUse::Claimed(_))
        };
        if !info_eq { return Ordering::Equal; }
        return
             if self.end() == other.addr { Ordering::Less }    // self is before other
        else if other.end() == self.addr { Ordering::Greater } // self is after other
        else { Ordering::Equal };
    }
}

/// Simulated physical address space.
///
/// Keeps an address-ordered block map of the machine's RAM windows and
/// backs every claimed chunk with its own buffer, so a 4 GiB window costs
/// nothing until it is used. `boot` records the register state instead of
/// jumping.
#[derive(Debug, Default)]
pub struct PhysArena {
    blocks: Vec<RamBlock>,
    backing: BTreeMap<usize, Vec<u8>>,
    next_id: usize,
    handoff: Option<RegisterState>
}

impl PhysArena {
    pub fn new(base: u64, size: u64) -> Self {
        return Self::default().with_ram(base, size);
    }

    /// Add another RAM window. Overlaps with existing windows are ignored.
    pub fn with_ram(mut self, base: u64, size: u64) -> Self {
        let overlaps = self.blocks.iter().any(|b| base < b.end() && b.addr < base.saturating_add(size));
        if size > 0 && base.checked_add(size).is_some() && !overlaps {
            self.add(RamBlock::new(base, size, BlockUse::Free));
        }
        self
    }

    /// Mark a free range as unusable, like firmware-owned memory.
    pub fn reserve(&mut self, addr: u64, size: u64) -> Result<()> {
        if size == 0 || !self.carve(addr, size, BlockUse::Reserved) {
            return Err(Error::AddressUnavailable { target: addr, size });
        }
        return Ok(());
    }

    pub fn blocks(&self) -> impl Iterator<Item = &RamBlock> { self.blocks.iter() }
    pub fn handoff(&self) -> Option<&RegisterState> { self.handoff.as_ref() }
    pub fn claimed(&self) -> usize { self.backing.len() }

    pub fn free_bytes(&self) -> u64 {
        return self.blocks.iter().filter(|b| b.is_free()).map(|b| b.size).sum();
    }

    /// Bytes at `addr` inside a claimed chunk.
    pub fn read(&self, addr: u64, len: usize) -> Option<&[u8]> {
        let block = self.blocks.iter().find(|b| b.contains(addr, len as u64))?;
        let BlockUse::Claimed(id) = block.usage else { return None; };
        let start = (addr - block.addr) as usize;
        return self.backing.get(&id).map(|buf| &buf[start..start + len]);
    }

    /// NUL-terminated string starting at `addr`.
    pub fn read_cstr(&self, addr: u64) -> Option<&[u8]> {
        let block = self.blocks.iter().find(|b| b.contains(addr, 1))?;
        let bytes = self.read(addr, (block.end() - addr) as usize)?;
        let len = bytes.iter().position(|&c| c == 0)?;
        return Some(&bytes[..len]);
    }

    fn claimed_index(&self, id: usize) -> Option<usize> {
        return self.blocks.iter().position(|b| b.usage == BlockUse::Claimed(id));
    }

    fn carve(&mut self, addr: u64, size: u64, usage: BlockUse) -> bool {
        let Some(idx) = self.blocks.iter().position(|b| b.is_free() && b.contains(addr, size)) else {
            return false;
        };
        let block = self.blocks.remove(idx);
        let mut parts: Vec<RamBlock> = Vec::with_capacity(3);
        if addr > block.addr {
            parts.push(RamBlock::new(block.addr, addr - block.addr, BlockUse::Free));
        }
        parts.push(RamBlock::new(addr, size, usage));
        if addr + size < block.end() {
            parts.push(RamBlock::new(addr + size, block.end() - addr - size, BlockUse::Free));
        }
        for (i, part) in parts.into_iter().enumerate() {
            self.blocks.insert(idx + i, part);
        }
        return true;
    }

    fn free_block(&mut self, idx: usize) {
        let block = self.blocks.remove(idx);
        self.add(RamBlock::new(block.addr, block.size, BlockUse::Free));
    }

    fn add(&mut self, new_block: RamBlock) {
        let (mut before, mut after) = (None, None);
        for (idx, block) in self.blocks.iter().enumerate() {
            match new_block.is_coalescable(block) {
                Ordering::Less => { after = Some(idx); },
                Ordering::Greater => { before = Some(idx); },
                Ordering::Equal => continue
            }
        }

        match (before, after) {
            (Some(b), Some(a)) => {
                self.blocks[b].size += new_block.size + self.blocks[a].size;
                self.blocks.remove(a);
            },
            (Some(b), None) => {
                self.blocks[b].size += new_block.size;
            },
            (None, Some(a)) => {
                self.blocks[a].addr = new_block.addr;
                self.blocks[a].size += new_block.size;
            },
            (None, None) => {
                let idx = self.blocks.partition_point(|b| b.addr < new_block.addr);
                self.blocks.insert(idx, new_block);
            }
        }
    }

    fn claim(&mut self, addr: u64, size: usize) -> Option<Chunk> {
        let id = self.next_id;
        if !self.carve(addr, size as u64, BlockUse::Claimed(id)) { return None; }
        self.next_id += 1;
        self.backing.insert(id, vec![0u8; size]);
        return Some(Chunk::new(id, addr, size));
    }

    fn find_start(&self, req: &RangeRequest) -> Option<u64> {
        let size = req.size() as u64;
        let align = req.alignment();
        let fits = |block: &RamBlock| -> Option<u64> {
            if !block.is_free() || block.size < size { return None; }
            let lo = block.addr.max(req.min());
            let hi = (block.end() - size).min(req.max_start());
            if lo > hi { return None; }
            return match req.preference() {
                Preference::High => Some(align_down(hi, align)).filter(|&s| s >= lo),
                Preference::Low => lo.checked_next_multiple_of(align).filter(|&s| s <= hi)
            };
        };

        return match req.preference() {
            Preference::High => self.blocks.iter().rev().find_map(fits),
            Preference::Low => self.blocks.iter().find_map(fits)
        };
    }
}

impl Relocator for PhysArena {
    fn alloc_at(&mut self, target: u64, size: usize) -> Result<Chunk> {
        let unavailable = Error::AddressUnavailable { target, size: size as u64 };
        if size == 0 { return Err(unavailable); }
        let chunk = self.claim(target, size).ok_or(unavailable)?;
        log::trace!("arena: fixed chunk #{} at 0x{:x}+0x{:x}", chunk.id(), target, size);
        return Ok(chunk);
    }

    fn alloc_in_range(&mut self, req: RangeRequest) -> Result<Chunk> {
        let exhausted = Error::NoAddressSpace {
            size: req.size() as u64,
            align: req.alignment(),
            limit: req.max_start().saturating_add(req.size() as u64)
        };
        if req.size() == 0 { return Err(exhausted); }
        let start = self.find_start(&req).ok_or(exhausted.clone())?;
        let chunk = self.claim(start, req.size()).ok_or(exhausted)?;
        log::trace!("arena: chunk #{} at 0x{:x}+0x{:x}", chunk.id(), start, req.size());
        return Ok(chunk);
    }

    fn chunk_mut(&mut self, chunk: &Chunk) -> Result<&mut [u8]> {
        let idx = self.claimed_index(chunk.id()).ok_or(Error::StaleChunk)?;
        if self.blocks[idx].addr != chunk.target() { return Err(Error::StaleChunk); }
        return self.backing.get_mut(&chunk.id())
            .map(|buf| buf.as_mut_slice())
            .ok_or(Error::StaleChunk);
    }

    fn release(&mut self, chunk: Chunk) {
        if let Some(idx) = self.claimed_index(chunk.id()) {
            self.free_block(idx);
            self.backing.remove(&chunk.id());
        }
    }

    fn release_all(&mut self) {
        while let Some(idx) = self.blocks.iter().position(|b| matches!(b.usage, BlockUse::Claimed(_))) {
            self.free_block(idx);
        }
        self.backing.clear();
    }

    fn boot(&mut self, state: &RegisterState) -> Result<Infallible> {
        log::info!(
            "arena: hand-off to 0x{:x} (a0={}, a1=0x{:x})",
            state.entry(), state.argc(), state.argv()
        );
        self.handoff = Some(*state);
        return Err(Error::HandoffReturned);
    }
}
