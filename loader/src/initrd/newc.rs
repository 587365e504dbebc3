use crate::error::{Error, Result};
use alloc::{string::ToString, vec::Vec};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

pub const MAGIC: [u8; 6] = *b"070701";
pub const TRAILER: &str = "TRAILER!!!";
pub const MODE_FILE: u32 = 0o100777;
pub const MODE_DIR: u32 = 0o040777;

type HexField = [u8; 8];

#[repr(C)]
#[derive(Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct NewcHeader {
    magic: [u8; 6], // == "070701"
    ino: HexField,
    mode: HexField,
    uid: HexField,
    gid: HexField,
    nlink: HexField,
    mtime: HexField,
    filesize: HexField,
    devmajor: HexField,
    devminor: HexField,
    rdevmajor: HexField,
    rdevminor: HexField,
    namesize: HexField, // including the NUL
    check: HexField
}

fn hex_field(val: u32) -> HexField {
    let mut out = [0u8; 8];
    for (i, digit) in out.iter_mut().enumerate() {
        let nibble = (val >> (28 - 4 * i)) & 0xf;
        *digit = b"0123456789ABCDEF"[nibble as usize];
    }
    return out;
}

fn parse_field(field: &HexField) -> Option<u32> {
    let text = core::str::from_utf8(field).ok()?;
    return u32::from_str_radix(text, 16).ok();
}

impl NewcHeader {
    fn new(mode: u32, file_size: u32, name_size: u32) -> Self {
        let zero = hex_field(0);
        return Self {
            magic: MAGIC,
            ino: zero,
            mode: hex_field(mode),
            uid: zero,
            gid: zero,
            nlink: hex_field(1),
            mtime: zero,
            filesize: hex_field(file_size),
            devmajor: zero,
            devminor: zero,
            rdevmajor: zero,
            rdevminor: zero,
            namesize: hex_field(name_size),
            check: zero
        };
    }

    pub fn is_valid(&self) -> bool          { self.magic == MAGIC }
    pub fn mode(&self) -> Option<u32>       { parse_field(&self.mode) }
    pub fn file_size(&self) -> Option<u32>  { parse_field(&self.filesize) }
    pub fn name_size(&self) -> Option<u32>  { parse_field(&self.namesize) }
}

/// Header plus NUL-terminated name, padded so the file data that follows
/// starts 4-byte aligned.
pub fn entry(name: &str, mode: u32, file_size: usize) -> Result<Vec<u8>> {
    let too_large = || Error::BadRamdiskSpec(name.to_string());
    let file_size = u32::try_from(file_size).map_err(|_| too_large())?;
    let name_size = u32::try_from(name.len() + 1).map_err(|_| too_large())?;

    let head = NewcHeader::new(mode, file_size, name_size);
    let mut out = Vec::with_capacity(size_of::<NewcHeader>() + name.len() + 4);
    out.extend_from_slice(head.as_bytes());
    out.extend_from_slice(name.as_bytes());
    out.push(0);
    out.resize(out.len().next_multiple_of(4), 0);
    return Ok(out);
}

pub fn trailer() -> Vec<u8> {
    let mut out = Vec::with_capacity(size_of::<NewcHeader>() + TRAILER.len() + 4);
    out.extend_from_slice(NewcHeader::new(0, 0, TRAILER.len() as u32 + 1).as_bytes());
    out.extend_from_slice(TRAILER.as_bytes());
    out.push(0);
    out.resize(out.len().next_multiple_of(4), 0);
    return out;
}
