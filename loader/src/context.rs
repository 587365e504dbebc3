use crate::{
    argv::{ArgBlob, BlobLayout},
    config::BootConfig,
    elf::{AlignedImage, KernelElf},
    error::{Error, Result},
    image::{LoadedImage, load_image},
    initrd::InitrdSet,
    ramdisk::{self, RamdiskRegion},
    relocator::{Chunk, RangeRequest, RegisterState, Relocator},
    source::FileSource
};
use core::convert::Infallible;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BootState {
    Unloaded,
    KernelLoaded,
    KernelAndRamdiskLoaded
}

/// Everything one successful `load` claimed.
struct Loaded {
    image: LoadedImage,
    kernel: Chunk,
    blob: ArgBlob,
    blob_chunk: Chunk,
    ramdisk: Option<(RamdiskRegion, Chunk)>
}

/// One boot attempt: the kernel, its argument blob and optional ramdisk,
/// together with the relocator that owns their memory.
pub struct BootContext<R: Relocator> {
    relocator: R,
    config: BootConfig,
    loaded: Option<Loaded>
}

impl<R: Relocator> BootContext<R> {
    pub fn new(relocator: R, config: BootConfig) -> Self {
        return Self { relocator, config, loaded: None };
    }

    pub fn state(&self) -> BootState {
        return match &self.loaded {
            None => BootState::Unloaded,
            Some(Loaded { ramdisk: None, .. }) => BootState::KernelLoaded,
            Some(Loaded { ramdisk: Some(_), .. }) => BootState::KernelAndRamdiskLoaded
        };
    }

    pub fn config(&self) -> &BootConfig                 { &self.config }
    pub fn relocator(&self) -> &R                       { &self.relocator }
    pub fn relocator_mut(&mut self) -> &mut R           { &mut self.relocator }
    pub fn image(&self) -> Option<&LoadedImage>         { self.loaded.as_ref().map(|l| &l.image) }
    pub fn args(&self) -> Option<&ArgBlob>              { self.loaded.as_ref().map(|l| &l.blob) }
    pub fn ramdisk(&self) -> Option<&RamdiskRegion>     { self.loaded.as_ref()?.ramdisk.as_ref().map(|(r, _)| r) }
    pub fn into_relocator(self) -> R                    { self.relocator }

    /// Place `image` and build its argument blob from `args`, where
    /// `args[0]` names the kernel file.
    ///
    /// Anything a previous `load` claimed is released first. If this
    /// fails, nothing stays claimed and the context is `Unloaded`.
    pub fn load<S: AsRef<str>>(&mut self, image: &[u8], args: &[S]) -> Result<LoadedImage> {
        self.unload();
        if args.is_empty() { return Err(Error::FilenameExpected); }

        let loaded = self.try_load(image, args);
        return match loaded {
            Ok(loaded) => {
                let image = loaded.image;
                log::info!("{}-bit kernel loaded, {} argument(s)", image.class().bits(), loaded.blob.argc());
                self.loaded = Some(loaded);
                Ok(image)
            },
            Err(err) => {
                self.relocator.release_all();
                Err(err)
            }
        };
    }

    fn try_load<S: AsRef<str>>(&mut self, image: &[u8], args: &[S]) -> Result<Loaded> {
        let aligned = AlignedImage::new(image);
        let elf = KernelElf::parse(&aligned)?;

        let layout = BlobLayout::measure(args)?;
        let req = RangeRequest::new(layout.size())
            .align(self.config.args_align)
            .prefer(self.config.preference)
            .below(self.config.args_limit)
            .ok_or(Error::ArgumentsTooLarge)?;

        let (image, kernel) = load_image(&mut self.relocator, &elf)?;
        let blob_chunk = self.relocator.alloc_in_range(req)?;
        let blob = ArgBlob::build(args, blob_chunk.target())?;
        commit(&mut self.relocator, &blob_chunk, &blob)?;

        return Ok(Loaded { image, kernel, blob, blob_chunk, ramdisk: None });
    }

    /// Place the ramdisk named by `args` and announce it in the argument
    /// blob. A failure leaves the kernel loaded and bootable without it.
    pub fn attach_ramdisk<S, F>(&mut self, args: &[S], files: &mut F) -> Result<RamdiskRegion>
    where S: AsRef<str>, F: FileSource + ?Sized {
        if args.is_empty() { return Err(Error::FilenameExpected); }
        let loaded = self.loaded.as_mut().ok_or(Error::KernelNotLoaded)?;
        if loaded.ramdisk.is_some() { return Err(Error::RamdiskAlreadyAttached); }

        let attached = attach(&mut self.relocator, &self.config, loaded, args, files);
        if let Err(err) = &attached {
            log::warn!("initrd not attached: {}", err);
        }
        return attached;
    }

    pub fn register_state(&self) -> Result<RegisterState> {
        let loaded = self.loaded.as_ref().ok_or(Error::KernelNotLoaded)?;
        let mut state = RegisterState::new();
        state.gpr[RegisterState::AT] = loaded.image.entry();
        state.gpr[RegisterState::A0] = loaded.blob.argc() as u64;
        state.gpr[RegisterState::A1] = loaded.blob.base() as u64;
        state.jumpreg = RegisterState::AT;
        return Ok(state);
    }

    /// Hand off to the kernel. Only returns if the hand-off did not happen.
    pub fn boot(&mut self) -> Result<Infallible> {
        let state = self.register_state()?;
        return self.relocator.boot(&state);
    }

    /// Release every claimed chunk.
    pub fn unload(&mut self) {
        if let Some(loaded) = self.loaded.take() {
            log::debug!(
                "releasing kernel chunk #{} and argument chunk #{}",
                loaded.kernel.id(), loaded.blob_chunk.id()
            );
        }
        self.relocator.release_all();
    }
}

fn attach<R, S, F>(relocator: &mut R, config: &BootConfig, loaded: &mut Loaded, args: &[S], files: &mut F) -> Result<RamdiskRegion>
where R: Relocator, S: AsRef<str>, F: FileSource + ?Sized {
    let set = InitrdSet::open(args, files)?;
    let (region, chunk) = ramdisk::place(relocator, config, &set)?;

    let patched = loaded.blob.clone().with_ramdisk(&region)
        .and_then(|blob| commit(relocator, &loaded.blob_chunk, &blob).map(|_| blob));
    return match patched {
        Ok(blob) => {
            loaded.blob = blob;
            loaded.ramdisk = Some((region, chunk));
            Ok(region)
        },
        Err(err) => {
            relocator.release(chunk);
            Err(err)
        }
    };
}

/// Copy the composed blob into the chunk it was laid out for.
fn commit<R: Relocator>(relocator: &mut R, chunk: &Chunk, blob: &ArgBlob) -> Result<()> {
    let bytes = blob.bytes();
    let dest = relocator.chunk_mut(chunk)?;
    dest.get_mut(..bytes.len())
        .ok_or(Error::ArgumentsTooLarge)?
        .copy_from_slice(bytes);
    return Ok(());
}
