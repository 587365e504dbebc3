use crate::{
    addr::virt_to_phys,
    elf::KernelElf,
    error::{Error, Result},
    relocator::{Chunk, Relocator}
};

/// Width class of the kernel executable, resolved once at load time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageClass {
    Elf32,
    Elf64
}

impl ImageClass {
    pub fn bits(&self) -> u32 {
        return match self {
            ImageClass::Elf32 => 32,
            ImageClass::Elf64 => 64
        };
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoadedImage {
    entry: u64,
    target_base: u64,
    phys_base: u64,
    total_size: u64,
    class: ImageClass
}

impl LoadedImage {
    /// Entry address exactly as the header spells it.
    pub fn entry(&self) -> u64          { self.entry }
    /// Base address the image declares for itself.
    pub fn target_base(&self) -> u64    { self.target_base }
    /// Where the fixed chunk was claimed.
    pub fn phys_base(&self) -> u64      { self.phys_base }
    pub fn total_size(&self) -> u64     { self.total_size }
    pub fn class(&self) -> ImageClass   { self.class }
}

/// Place every loadable segment of `elf` at the address it was linked for.
///
/// The chunk is fixed, never floated: the kernel references its own
/// absolute addresses. On failure the chunk, if any, has been released.
pub fn load_image<R: Relocator>(relocator: &mut R, elf: &KernelElf) -> Result<(LoadedImage, Chunk)> {
    let (base, size) = elf.span()?;
    let total_size = size.checked_next_multiple_of(8)
        .ok_or(Error::Malformed("image size overflows"))?;
    let len = usize::try_from(total_size)
        .map_err(|_| Error::Malformed("image does not fit the address space"))?;

    let phys_base = virt_to_phys(base);
    log::debug!(
        "{}-bit image: base 0x{:x} (phys 0x{:x}), 0x{:x} bytes",
        elf.class().bits(), base, phys_base, total_size
    );

    let chunk = relocator.alloc_at(phys_base, len)?;
    let populated = relocator.chunk_mut(&chunk).and_then(|dest| elf.populate(dest, base));
    if let Err(err) = populated {
        relocator.release(chunk);
        return Err(err);
    }

    let image = LoadedImage {
        entry: elf.entry_point(),
        target_base: base,
        phys_base,
        total_size,
        class: elf.class()
    };
    log::info!("kernel at 0x{:x}+0x{:x}, entry 0x{:x}", phys_base, total_size, image.entry);
    return Ok((image, chunk));
}
