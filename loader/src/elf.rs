use crate::{
    error::{Error, Result},
    image::ImageClass
};
use alloc::{vec, vec::Vec};
use core::ops::Deref;
use xmas_elf::{
    ElfFile,
    header::{Class, Data, Type as EType},
    program::{ProgramHeader, ProgramHeader32, ProgramHeader64, Type as PhType}
};
use zerocopy::IntoBytes;

/// Image bytes copied into 8-byte aligned storage, as the header
/// structures are read in place.
pub struct AlignedImage {
    words: Vec<u64>,
    len: usize
}

impl AlignedImage {
    pub fn new(bytes: &[u8]) -> Self {
        let mut words = vec![0u64; bytes.len().div_ceil(8)];
        words.as_mut_bytes()[..bytes.len()].copy_from_slice(bytes);
        return Self { words, len: bytes.len() };
    }
}

impl Deref for AlignedImage {
    type Target = [u8];
    fn deref(&self) -> &Self::Target {
        &self.words.as_bytes()[..self.len]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Segment {
    pub offset: u64,
    pub paddr: u64,
    pub file_size: u64,
    pub mem_size: u64
}

/// Executable kernel image, checked for the things the loader relies on.
pub struct KernelElf<'a> {
    elf: ElfFile<'a>,
    class: ImageClass,
    segments: Vec<Segment>
}

impl<'a> KernelElf<'a> {
    pub fn parse(input: &'a [u8]) -> Result<Self> {
        let elf = ElfFile::new(input).map_err(|_| Error::UnsupportedFormat("invalid arch-dependent ELF magic"))?;

        let class = match elf.header.pt1.class() {
            Class::ThirtyTwo => ImageClass::Elf32,
            Class::SixtyFour => ImageClass::Elf64,
            _ => return Err(Error::UnsupportedFormat("invalid arch-dependent ELF magic"))
        };
        // pt2 fields are only meaningful once the byte order is known
        if !matches!(elf.header.pt1.data(), Data::LittleEndian) {
            return Err(Error::UnsupportedFormat("only little-endian images are supported"));
        }

        if !matches!(elf.header.pt2.type_().as_type(), EType::Executable) {
            return Err(Error::WrongExecutableType);
        }

        let segments = load_segments(&elf, class)?;
        return Ok(Self { elf, class, segments });
    }

    pub fn class(&self) -> ImageClass { self.class }
    pub fn entry_point(&self) -> u64 { self.elf.header.pt2.entry_point() }
    pub fn segments(&self) -> &[Segment] { &self.segments }

    /// Lowest load address and byte length covering every loadable segment.
    pub fn span(&self) -> Result<(u64, u64)> {
        if self.segments.is_empty() {
            return Err(Error::EmptyOrInvalidImage("no program headers present"));
        }
        let base = self.segments.iter().map(|s| s.paddr).min().unwrap_or(0);
        let mut top = 0u64;
        for seg in &self.segments {
            let end = seg.paddr.checked_add(seg.mem_size)
                .ok_or(Error::Malformed("segment wraps the address space"))?;
            top = top.max(end);
        }
        if top <= base {
            return Err(Error::EmptyOrInvalidImage("image has no size"));
        }
        return Ok((base, top - base));
    }

    /// Copy every loadable segment into `dest`, which stands for `base`.
    /// Bytes not covered by file contents are zeroed.
    pub fn populate(&self, dest: &mut [u8], base: u64) -> Result<()> {
        dest.fill(0);
        let input = self.elf.input;
        for seg in &self.segments {
            let start = (seg.paddr - base) as usize;
            let end = start.checked_add(seg.mem_size as usize)
                .filter(|&end| end <= dest.len())
                .ok_or(Error::Malformed("segment outside of the image span"))?;
            let file = &input[seg.offset as usize..][..seg.file_size as usize];
            dest[start..start + file.len()].copy_from_slice(file);
            log::trace!(
                "segment 0x{:x}: 0x{:x} file bytes, 0x{:x} zeroed",
                seg.paddr, seg.file_size, (end - start) - file.len()
            );
        }
        return Ok(());
    }
}

fn load_segments(elf: &ElfFile, class: ImageClass) -> Result<Vec<Segment>> {
    let pt2 = &elf.header.pt2;
    let count = pt2.ph_count() as u64;
    if count == 0 { return Ok(Vec::new()); }

    let (expected_entry, align) = match class {
        ImageClass::Elf32 => (size_of::<ProgramHeader32>() as u64, 4),
        ImageClass::Elf64 => (size_of::<ProgramHeader64>() as u64, 8)
    };
    let (offset, entry_size) = (pt2.ph_offset(), pt2.ph_entry_size() as u64);
    if offset == 0 || entry_size != expected_entry || offset % align != 0 {
        return Err(Error::Malformed("bad program header table"));
    }
    let table_end = entry_size.checked_mul(count).and_then(|len| len.checked_add(offset));
    if table_end.is_none_or(|end| end > elf.input.len() as u64) {
        return Err(Error::Malformed("program header table exceeds the file"));
    }

    let mut segments = Vec::new();
    for idx in 0..pt2.ph_count() {
        let ph: ProgramHeader = elf.program_header(idx).map_err(Error::Malformed)?;
        if ph.get_type() != Ok(PhType::Load) { continue; }

        let seg = Segment {
            offset: ph.offset(),
            paddr: ph.physical_addr(),
            file_size: ph.file_size(),
            mem_size: ph.mem_size()
        };
        if seg.file_size > seg.mem_size {
            return Err(Error::Malformed("segment file size exceeds its memory size"));
        }
        let file_end = seg.offset.checked_add(seg.file_size);
        if file_end.is_none_or(|end| end > elf.input.len() as u64) {
            return Err(Error::Truncated { offset: seg.offset, len: seg.file_size, file_len: elf.input.len() });
        }
        segments.push(seg);
    }
    return Ok(segments);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn elf64(ty: u16, class: u8, data: u8, segs: &[(u64, u64, u64)]) -> Vec<u8> {
        let phoff = 64usize;
        let payload = phoff + segs.len() * 56;
        let mut out = vec![0u8; payload];
        out[..4].copy_from_slice(b"\x7fELF");
        (out[4], out[5], out[6]) = (class, data, 1);
        out[16..18].copy_from_slice(&ty.to_le_bytes());
        out[18..20].copy_from_slice(&8u16.to_le_bytes());
        out[20..24].copy_from_slice(&1u32.to_le_bytes());
        out[24..32].copy_from_slice(&0x8001_0040u64.to_le_bytes());
        out[32..40].copy_from_slice(&(phoff as u64).to_le_bytes());
        out[52..54].copy_from_slice(&64u16.to_le_bytes());
        out[54..56].copy_from_slice(&56u16.to_le_bytes());
        out[56..58].copy_from_slice(&(segs.len() as u16).to_le_bytes());
        out[58..60].copy_from_slice(&64u16.to_le_bytes());

        let mut file_off = payload as u64;
        for (i, &(paddr, filesz, memsz)) in segs.iter().enumerate() {
            let ph = &mut out[phoff + i * 56..][..56];
            ph[0..4].copy_from_slice(&1u32.to_le_bytes());
            ph[8..16].copy_from_slice(&file_off.to_le_bytes());
            ph[16..24].copy_from_slice(&paddr.to_le_bytes());
            ph[24..32].copy_from_slice(&paddr.to_le_bytes());
            ph[32..40].copy_from_slice(&filesz.to_le_bytes());
            ph[40..48].copy_from_slice(&memsz.to_le_bytes());
            file_off += filesz;
        }
        for &(_, filesz, _) in segs {
            out.extend(core::iter::repeat_n(0x5a, filesz as usize));
        }
        return out;
    }

    #[test]
    fn aligned_copy_keeps_length() {
        let image = AlignedImage::new(&[1, 2, 3, 4, 5]);
        assert_eq!(&image[..], &[1, 2, 3, 4, 5]);
        assert_eq!(image.as_ptr() as usize % 8, 0);
    }

    #[test]
    fn rejects_non_executables() {
        let bytes = AlignedImage::new(&elf64(3, 2, 1, &[(0x1000, 0x10, 0x10)]));
        assert!(matches!(KernelElf::parse(&bytes), Err(Error::WrongExecutableType)));
        let bytes = AlignedImage::new(&elf64(2, 2, 2, &[(0x1000, 0x10, 0x10)]));
        assert!(matches!(KernelElf::parse(&bytes), Err(Error::UnsupportedFormat(_))));
        let bytes = AlignedImage::new(b"MZ not an elf at all, just some bytes padding padding padding");
        assert!(matches!(KernelElf::parse(&bytes), Err(Error::UnsupportedFormat(_))));
    }

    #[test]
    fn byte_order_is_checked_before_type() {
        let mut raw = elf64(2, 2, 2, &[(0x1000, 0x10, 0x10)]);
        raw[16..18].copy_from_slice(&2u16.to_be_bytes());
        let bytes = AlignedImage::new(&raw);
        let err = KernelElf::parse(&bytes).err().unwrap();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
        assert_eq!(err.kind(), crate::error::ErrorKind::BadOs);
    }

    #[test]
    fn span_covers_all_segments() {
        let bytes = AlignedImage::new(&elf64(2, 2, 1, &[(0x8001_0000, 0x100, 0x100), (0x8002_0000, 0x10, 0x1000)]));
        let elf = KernelElf::parse(&bytes).unwrap();
        assert_eq!(elf.class(), ImageClass::Elf64);
        assert_eq!(elf.entry_point(), 0x8001_0040);
        assert_eq!(elf.span().unwrap(), (0x8001_0000, 0x1_1000));
    }

    #[test]
    fn populate_zero_fills_bss_and_gaps() {
        let bytes = AlignedImage::new(&elf64(2, 2, 1, &[(0x1000, 4, 8), (0x1010, 2, 2)]));
        let elf = KernelElf::parse(&bytes).unwrap();
        let (base, size) = elf.span().unwrap();
        let mut dest = vec![0xffu8; size as usize];
        elf.populate(&mut dest, base).unwrap();
        assert_eq!(&dest[..8], &[0x5a, 0x5a, 0x5a, 0x5a, 0, 0, 0, 0]);
        assert_eq!(&dest[8..16], &[0; 8]);
        assert_eq!(&dest[16..], &[0x5a, 0x5a]);
    }

    #[test]
    fn truncated_segments_are_caught() {
        let mut raw = elf64(2, 2, 1, &[(0x1000, 0x40, 0x40)]);
        raw.truncate(raw.len() - 8);
        let bytes = AlignedImage::new(&raw);
        assert!(matches!(KernelElf::parse(&bytes), Err(Error::Truncated { len: 0x40, .. })));
    }

    #[test]
    fn no_loadable_segments_is_empty() {
        let bytes = AlignedImage::new(&elf64(2, 2, 1, &[]));
        let elf = KernelElf::parse(&bytes).unwrap();
        assert!(matches!(elf.span(), Err(Error::EmptyOrInvalidImage(_))));
    }
}
