//! Kernel argument vector as the MIPS firmware convention lays it out:
//! a table of 32-bit pointers followed by the strings they point to.
//!
//! ```text
//! +--------+-----+-----------+------+------+------+------+-----------+-----------+----------+
//! | argv 0 | ... | argv n-1  | rd 0 | rd 1 | NULL | "a0" | args[1..] | rd_start= | rd_size= |
//! +--------+-----+-----------+------+------+------+------+-----------+-----------+----------+
//! ```
//!
//! The two `rd` slots and their strings are reserved when the blob is
//! built and only filled once a ramdisk has been placed.

use crate::{
    addr::checked_align_up,
    error::{Error, Result},
    ramdisk::RamdiskRegion
};
use alloc::{format, vec, vec::Vec};
use zerocopy::{FromBytes, IntoBytes, LE, U32};

/// Whatever the caller passes as argv[0], the kernel sees this.
pub const ARGV0: &str = "a0";
pub const RD_START_KEY: &str = "rd_start=0x";
pub const RD_SIZE_KEY: &str = "rd_size=0x";

const SLOT: usize = size_of::<U32<LE>>();
const RESERVED_SLOTS: usize = 2;
const MAX_HEX_DIGITS: usize = 16;

fn string_room(len: usize) -> Option<usize> {
    return checked_align_up(len.checked_add(1)?, SLOT);
}

/// Byte layout of a blob for a given argument list, computed before
/// anything is written.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlobLayout {
    argc: usize,
    table_len: usize,
    rd_addr_off: usize,
    rd_size_off: usize,
    size: usize
}

impl BlobLayout {
    pub fn measure<S: AsRef<str>>(args: &[S]) -> Result<Self> {
        if args.is_empty() { return Err(Error::FilenameExpected); }
        return Self::measure_checked(args).ok_or(Error::ArgumentsTooLarge);
    }

    fn measure_checked<S: AsRef<str>>(args: &[S]) -> Option<Self> {
        let argc = args.len();
        let table_len = argc.checked_add(1 + RESERVED_SLOTS)?;
        let mut offset = table_len.checked_mul(SLOT)?;

        offset = offset.checked_add(string_room(ARGV0.len())?)?;
        for arg in &args[1..] {
            offset = offset.checked_add(string_room(arg.as_ref().len())?)?;
        }
        let rd_addr_off = offset;
        offset = offset.checked_add(string_room(RD_START_KEY.len() + MAX_HEX_DIGITS)?)?;
        let rd_size_off = offset;
        offset = offset.checked_add(string_room(RD_SIZE_KEY.len() + MAX_HEX_DIGITS)?)?;

        let size = checked_align_up(offset, 8)?;
        u32::try_from(size).ok()?;
        return Some(Self { argc, table_len, rd_addr_off, rd_size_off, size });
    }

    pub fn size(&self) -> usize         { self.size }
    pub fn argc(&self) -> usize         { self.argc }
    pub fn table_len(&self) -> usize    { self.table_len }
    pub fn strings_off(&self) -> usize  { self.table_len * SLOT }
}

/// Store `value` in pointer table slot `index`.
pub fn patch_slot(mut bytes: Vec<u8>, index: usize, value: u32) -> Result<Vec<u8>> {
    let start = index.checked_mul(SLOT).ok_or(Error::ArgumentsTooLarge)?;
    let end = start.checked_add(SLOT).ok_or(Error::ArgumentsTooLarge)?;
    let slot = bytes.get_mut(start..end).ok_or(Error::ArgumentsTooLarge)?;
    slot.copy_from_slice(U32::<LE>::new(value).as_bytes());
    return Ok(bytes);
}

/// Store `s` NUL-terminated at byte `offset`.
pub fn patch_str(mut bytes: Vec<u8>, offset: usize, s: &str) -> Result<Vec<u8>> {
    let end = offset.checked_add(s.len() + 1).ok_or(Error::ArgumentsTooLarge)?;
    let dest = bytes.get_mut(offset..end).ok_or(Error::ArgumentsTooLarge)?;
    dest[..s.len()].copy_from_slice(s.as_bytes());
    dest[s.len()] = 0;
    return Ok(bytes);
}

/// Composed argument blob, addressed as if it already sat at `base`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArgBlob {
    bytes: Vec<u8>,
    base: u32,
    layout: BlobLayout,
    argc: u32
}

impl ArgBlob {
    pub fn build<S: AsRef<str>>(args: &[S], base: u64) -> Result<Self> {
        let layout = BlobLayout::measure(args)?;
        let base = u32::try_from(base)
            .ok()
            .filter(|&b| b as u64 + layout.size as u64 <= 1 << 32)
            .ok_or(Error::AddressNotRepresentable(base))?;

        let rest = args[1..].iter().map(AsRef::<str>::as_ref);
        let strings = core::iter::once(ARGV0).chain(rest);
        let mut bytes = vec![0u8; layout.size];
        let mut offset = layout.strings_off();
        for (idx, s) in strings.enumerate() {
            bytes = patch_str(bytes, offset, s)?;
            bytes = patch_slot(bytes, idx, base + offset as u32)?;
            offset += string_room(s.len()).ok_or(Error::ArgumentsTooLarge)?;
        }

        log::debug!(
            "argv: {} args, 0x{:x} bytes at 0x{:x}, rd slots at +0x{:x}/+0x{:x}",
            layout.argc, layout.size, base, layout.rd_addr_off, layout.rd_size_off
        );
        return Ok(Self { bytes, base, layout, argc: layout.argc as u32 });
    }

    /// Fill the reserved ramdisk strings and append their two slots.
    pub fn with_ramdisk(self, region: &RamdiskRegion) -> Result<Self> {
        if self.has_ramdisk() { return Err(Error::RamdiskAlreadyAttached); }
        let Self { mut bytes, base, layout, mut argc } = self;

        let entries = [
            (layout.rd_addr_off, format!("{RD_START_KEY}{:x}", region.addr())),
            (layout.rd_size_off, format!("{RD_SIZE_KEY}{:x}", region.size()))
        ];
        for (offset, s) in entries {
            bytes = patch_str(bytes, offset, &s)?;
            bytes = patch_slot(bytes, argc as usize, base + offset as u32)?;
            argc += 1;
        }
        return Ok(Self { bytes, base, layout, argc });
    }

    pub fn bytes(&self) -> &[u8]          { &self.bytes }
    pub fn base(&self) -> u32             { self.base }
    pub fn argc(&self) -> u32             { self.argc }
    pub fn layout(&self) -> &BlobLayout   { &self.layout }
    pub fn rd_addr_offset(&self) -> usize { self.layout.rd_addr_off }
    pub fn rd_size_offset(&self) -> usize { self.layout.rd_size_off }
    pub fn has_ramdisk(&self) -> bool     { self.argc as usize > self.layout.argc }

    pub fn slot(&self, index: usize) -> Option<u32> {
        if index >= self.layout.table_len { return None; }
        let raw = self.bytes.get(index * SLOT..(index + 1) * SLOT)?;
        return U32::<LE>::read_from_bytes(raw).ok().map(U32::get);
    }

    /// String whose first byte sits at blob address `addr`.
    pub fn string_at(&self, addr: u32) -> Option<&str> {
        let start = addr.checked_sub(self.base)? as usize;
        let tail = self.bytes.get(start..)?;
        let len = tail.iter().position(|&c| c == 0)?;
        return core::str::from_utf8(&tail[..len]).ok();
    }

    /// Arguments as the kernel will walk them, up to the NULL slot.
    pub fn argv(&self) -> Vec<&str> {
        return (0..self.layout.table_len)
            .map_while(|idx| self.slot(idx).filter(|&p| p != 0))
            .filter_map(|ptr| self.string_at(ptr))
            .collect();
    }
}
