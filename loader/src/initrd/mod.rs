mod newc;

pub use newc::NewcHeader;

use crate::{
    addr::checked_align_up,
    error::{Error, Result},
    source::FileSource
};
use alloc::{collections::BTreeSet, string::{String, ToString}, vec::Vec};

struct Component {
    /// Set for `newc:NAME:PATH` components, which get wrapped in a cpio entry.
    name: Option<String>,
    data: Vec<u8>
}

/// One or more ramdisk files, concatenated the way the kernel expects
/// multiple initrds: every piece starts 4-byte aligned, and `newc:`
/// components are synthesized into a cpio archive on the fly.
pub struct InitrdSet {
    components: Vec<Component>,
    size: usize
}

impl InitrdSet {
    pub fn open<S, F>(args: &[S], files: &mut F) -> Result<Self>
    where S: AsRef<str>, F: FileSource + ?Sized {
        if args.is_empty() { return Err(Error::NoRamdiskSpecified); }

        let mut components = Vec::with_capacity(args.len());
        for arg in args.iter().map(AsRef::<str>::as_ref) {
            let (name, path) = match arg.strip_prefix("newc:") {
                Some(rest) => {
                    let (name, path) = rest.split_once(':')
                        .filter(|(name, path)| !name.is_empty() && !path.is_empty())
                        .ok_or_else(|| Error::BadRamdiskSpec(arg.to_string()))?;
                    (Some(name.to_string()), path)
                },
                None => (None, arg)
            };
            let data = files.read(path)?;
            log::debug!("initrd: {} (0x{:x} bytes)", path, data.len());
            components.push(Component { name, data });
        }

        let mut set = Self { components, size: 0 };
        set.size = set.walk(|_, _| {})?;
        return Ok(set);
    }

    pub fn size(&self) -> usize { self.size }
    pub fn count(&self) -> usize { self.components.len() }

    /// Write exactly `size()` bytes to the front of `dest`.
    pub fn load_into(&self, dest: &mut [u8]) -> Result<()> {
        if dest.len() < self.size {
            return Err(Error::NoAddressSpace { size: self.size as u64, align: 1, limit: dest.len() as u64 });
        }
        let dest = &mut dest[..self.size];
        dest.fill(0);
        self.walk(|offset, bytes| dest[offset..offset + bytes.len()].copy_from_slice(bytes))?;
        return Ok(());
    }

    /// Lay every piece out in order, handing each to `emit` with its offset.
    /// Returns the total length.
    fn walk(&self, mut emit: impl FnMut(usize, &[u8])) -> Result<usize> {
        let mut offset = 0;
        let mut dirs: BTreeSet<&str> = BTreeSet::new();
        let mut in_archive = false;

        for comp in &self.components {
            match &comp.name {
                Some(name) => {
                    for dir in parent_dirs(name) {
                        if dirs.insert(dir) {
                            offset = put(offset, &newc::entry(dir, newc::MODE_DIR, 0)?, &mut emit)?;
                        }
                    }
                    offset = put(offset, &newc::entry(name, newc::MODE_FILE, comp.data.len())?, &mut emit)?;
                    in_archive = true;
                },
                None if in_archive => {
                    offset = put(offset, &newc::trailer(), &mut emit)?;
                    dirs.clear();
                    in_archive = false;
                },
                None => {}
            }
            offset = put(offset, &comp.data, &mut emit)?;
        }
        if in_archive {
            offset = put(offset, &newc::trailer(), &mut emit)?;
        }
        return Ok(offset);
    }
}

fn put(offset: usize, bytes: &[u8], emit: &mut impl FnMut(usize, &[u8])) -> Result<usize> {
    let start = checked_align_up(offset, 4).ok_or(Error::ArgumentsTooLarge)?;
    let end = start.checked_add(bytes.len()).ok_or(Error::ArgumentsTooLarge)?;
    emit(start, bytes);
    return Ok(end);
}

fn parent_dirs(name: &str) -> impl Iterator<Item = &str> {
    return name.match_indices('/')
        .map(move |(idx, _)| &name[..idx])
        .filter(|dir| !dir.is_empty());
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::collections::BTreeMap;
    use zerocopy::FromBytes;

    fn files() -> BTreeMap<String, Vec<u8>> {
        let mut files = BTreeMap::new();
        files.insert("/boot/initrd.img".to_string(), vec![0xaa; 6]);
        files.insert("/boot/firmware.bin".to_string(), vec![0xbb; 3]);
        files.insert("/boot/extra".to_string(), vec![0xcc; 4]);
        return files;
    }

    #[test]
    fn plain_files_are_aligned_and_concatenated() {
        let set = InitrdSet::open(&["/boot/initrd.img", "/boot/firmware.bin"], &mut files()).unwrap();
        assert_eq!(set.count(), 2);
        assert_eq!(set.size(), 8 + 3);

        let mut dest = vec![0xffu8; 16];
        set.load_into(&mut dest).unwrap();
        assert_eq!(&dest[..11], &[0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0, 0, 0xbb, 0xbb, 0xbb]);
        assert_eq!(&dest[11..], &[0xff; 5]);
    }

    #[test]
    fn newc_components_become_an_archive() {
        let args = ["/boot/initrd.img", "newc:lib/firmware/fw.bin:/boot/firmware.bin", "/boot/extra"];
        let set = InitrdSet::open(&args, &mut files()).unwrap();
        let mut dest = vec![0u8; set.size()];
        set.load_into(&mut dest).unwrap();

        // "lib", "lib/firmware", the file itself, then the trailer
        let mut offset = 8;
        let mut names = Vec::new();
        while let Ok((head, rest)) = NewcHeader::read_from_prefix(&dest[offset..]) {
            if !head.is_valid() { break; }
            let name_size = head.name_size().unwrap() as usize;
            names.push(core::str::from_utf8(&rest[..name_size - 1]).unwrap().to_string());
            let data = (110 + name_size).next_multiple_of(4);
            offset += (data + head.file_size().unwrap() as usize).next_multiple_of(4);
        }
        assert_eq!(names, ["lib", "lib/firmware", "lib/firmware/fw.bin", "TRAILER!!!"]);
        assert_eq!(&dest[offset..], &[0xcc; 4]);
        assert_eq!(dest.len(), offset + 4);
    }

    #[test]
    fn bad_arguments() {
        assert!(matches!(InitrdSet::open::<&str, _>(&[], &mut files()), Err(Error::NoRamdiskSpecified)));
        assert!(matches!(InitrdSet::open(&["newc:nopath"], &mut files()), Err(Error::BadRamdiskSpec(_))));
        assert!(matches!(InitrdSet::open(&["newc::/boot/extra"], &mut files()), Err(Error::BadRamdiskSpec(_))));
        assert!(matches!(InitrdSet::open(&["/boot/none"], &mut files()), Err(Error::FileNotFound(_))));
    }
}
