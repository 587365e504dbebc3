//! Synthesized kernel images for the integration tests

use std::collections::BTreeMap;

pub const ET_EXEC: u16 = 2;
pub const ET_DYN: u16 = 3;
const EM_MIPS: u16 = 8;
const PT_LOAD: u32 = 1;
const PT_NOTE: u32 = 4;

struct Segment {
    kind: u32,
    paddr: u64,
    data: Vec<u8>,
    mem_size: u64
}

/// Little-endian ELF executable with arbitrary program headers.
pub struct ElfBuilder {
    wide: bool,
    e_type: u16,
    entry: u64,
    segments: Vec<Segment>
}

impl ElfBuilder {
    pub fn elf64(entry: u64) -> Self {
        Self { wide: true, e_type: ET_EXEC, entry, segments: Vec::new() }
    }

    pub fn elf32(entry: u32) -> Self {
        Self { wide: false, e_type: ET_EXEC, entry: entry as u64, segments: Vec::new() }
    }

    pub fn e_type(mut self, e_type: u16) -> Self {
        self.e_type = e_type;
        self
    }

    /// PT_LOAD segment at `paddr` with `data` followed by zero fill up to `mem_size`.
    pub fn load(mut self, paddr: u64, data: &[u8], mem_size: u64) -> Self {
        self.segments.push(Segment { kind: PT_LOAD, paddr, data: data.to_vec(), mem_size });
        self
    }

    pub fn note(mut self, data: &[u8]) -> Self {
        let len = data.len() as u64;
        self.segments.push(Segment { kind: PT_NOTE, paddr: 0, data: data.to_vec(), mem_size: len });
        self
    }

    pub fn build(self) -> Vec<u8> {
        let (ehsize, phentsize) = if self.wide { (64usize, 56usize) } else { (52, 32) };
        let payload = ehsize + phentsize * self.segments.len();
        let mut out = vec![0u8; payload];

        out[..4].copy_from_slice(b"\x7fELF");
        out[4] = if self.wide { 2 } else { 1 };
        out[5] = 1; // little-endian
        out[6] = 1;
        put(&mut out, 16, &self.e_type.to_le_bytes());
        put(&mut out, 18, &EM_MIPS.to_le_bytes());
        put(&mut out, 20, &1u32.to_le_bytes());
        if self.wide {
            put(&mut out, 24, &self.entry.to_le_bytes());
            put(&mut out, 32, &(ehsize as u64).to_le_bytes());
            put(&mut out, 52, &(ehsize as u16).to_le_bytes());
            put(&mut out, 54, &(phentsize as u16).to_le_bytes());
            put(&mut out, 56, &(self.segments.len() as u16).to_le_bytes());
            put(&mut out, 58, &64u16.to_le_bytes());
        } else {
            put(&mut out, 24, &(self.entry as u32).to_le_bytes());
            put(&mut out, 28, &(ehsize as u32).to_le_bytes());
            put(&mut out, 40, &(ehsize as u16).to_le_bytes());
            put(&mut out, 42, &(phentsize as u16).to_le_bytes());
            put(&mut out, 44, &(self.segments.len() as u16).to_le_bytes());
            put(&mut out, 46, &40u16.to_le_bytes());
        }

        let mut file_off = payload as u64;
        for (i, seg) in self.segments.iter().enumerate() {
            let ph = ehsize + i * phentsize;
            let filesz = seg.data.len() as u64;
            if self.wide {
                put(&mut out, ph, &seg.kind.to_le_bytes());
                put(&mut out, ph + 8, &file_off.to_le_bytes());
                put(&mut out, ph + 16, &seg.paddr.to_le_bytes());
                put(&mut out, ph + 24, &seg.paddr.to_le_bytes());
                put(&mut out, ph + 32, &filesz.to_le_bytes());
                put(&mut out, ph + 40, &seg.mem_size.to_le_bytes());
            } else {
                put(&mut out, ph, &seg.kind.to_le_bytes());
                put(&mut out, ph + 4, &(file_off as u32).to_le_bytes());
                put(&mut out, ph + 8, &(seg.paddr as u32).to_le_bytes());
                put(&mut out, ph + 12, &(seg.paddr as u32).to_le_bytes());
                put(&mut out, ph + 16, &(filesz as u32).to_le_bytes());
                put(&mut out, ph + 20, &(seg.mem_size as u32).to_le_bytes());
            }
            file_off += filesz;
        }
        for seg in &self.segments {
            out.extend_from_slice(&seg.data);
        }
        out
    }
}

fn put(out: &mut [u8], at: usize, bytes: &[u8]) {
    out[at..at + bytes.len()].copy_from_slice(bytes);
}

/// A 64-bit kernel spanning 0x20000 bytes from 0x80010000.
pub fn vmlinux64() -> Vec<u8> {
    ElfBuilder::elf64(0xffff_ffff_8001_0400)
        .load(0x8001_0000, &[0x11; 0x8000], 0x8000)
        .load(0x8001_8000, &[0x22; 0x1000], 0x1_8000)
        .build()
}

pub fn files() -> BTreeMap<String, Vec<u8>> {
    let mut files = BTreeMap::new();
    files.insert("vmlinux".to_string(), vmlinux64());
    files.insert("initrd.img".to_string(), vec![0xee; 0x1000]);
    files
}
