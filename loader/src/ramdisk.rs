use crate::{
    config::BootConfig,
    error::{Error, Result},
    initrd::InitrdSet,
    relocator::{Chunk, RangeRequest, Relocator}
};

/// Final placement of the ramdisk, as announced to the kernel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RamdiskRegion {
    addr: u64,
    size: u64
}

impl RamdiskRegion {
    pub const fn new(addr: u64, size: u64) -> Self {
        return Self { addr, size };
    }

    pub fn addr(&self) -> u64 { self.addr }
    pub fn size(&self) -> u64 { self.size }
}

/// Claim a chunk for `set` below the argument window limit and copy it in.
/// The chunk is released again if anything after the claim fails.
pub fn place<R: Relocator>(relocator: &mut R, config: &BootConfig, set: &InitrdSet) -> Result<(RamdiskRegion, Chunk)> {
    let size = set.size();
    if size == 0 { return Err(Error::EmptyRamdisk); }

    let req = RangeRequest::new(size)
        .align(config.initrd_align)
        .prefer(config.preference)
        .below(config.args_limit)
        .ok_or(Error::NoAddressSpace {
            size: size as u64,
            align: config.initrd_align,
            limit: config.args_limit
        })?;
    let chunk = relocator.alloc_in_range(req)?;

    let loaded = relocator.chunk_mut(&chunk).and_then(|dest| set.load_into(dest));
    if let Err(err) = loaded {
        relocator.release(chunk);
        return Err(err);
    }

    let region = RamdiskRegion::new(chunk.target(), size as u64);
    log::info!("initrd at 0x{:x}+0x{:x} ({} file(s))", region.addr, region.size, set.count());
    return Ok((region, chunk));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relocator::{PhysArena, Preference};
    use alloc::collections::BTreeMap;

    fn initrd(len: usize) -> InitrdSet {
        let mut files = BTreeMap::new();
        files.insert("initrd.img".to_string(), vec![0x42; len]);
        return InitrdSet::open(&["initrd.img"], &mut files).unwrap();
    }

    #[test]
    fn lands_high_and_aligned() {
        let mut arena = PhysArena::new(0, 0x1000_0000);
        let (region, chunk) = place(&mut arena, &BootConfig::default(), &initrd(0x1234)).unwrap();
        assert_eq!(region.addr(), 0x0fff_0000);
        assert_eq!(region.size(), 0x1234);
        assert_eq!(chunk.size(), 0x1234);
        assert_eq!(arena.read(0x0fff_0000, 4), Some(&[0x42; 4][..]));
    }

    #[test]
    fn low_preference_is_honoured() {
        let mut arena = PhysArena::new(0x10_0000, 0x100_0000);
        let config = BootConfig::default().with_preference(Preference::Low);
        let (region, _) = place(&mut arena, &config, &initrd(0x10)).unwrap();
        assert_eq!(region.addr(), 0x10_0000);
    }

    #[test]
    fn empty_and_oversized_ramdisks_fail() {
        let mut arena = PhysArena::new(0, 0x1_0000);
        assert_eq!(place(&mut arena, &BootConfig::default(), &initrd(0)), Err(Error::EmptyRamdisk));
        assert!(matches!(
            place(&mut arena, &BootConfig::default(), &initrd(0x2_0000)),
            Err(Error::NoAddressSpace { .. })
        ));
        assert_eq!(arena.claimed(), 0);
    }
}
