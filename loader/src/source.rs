use crate::error::{Error, Result};
use alloc::{collections::BTreeMap, string::{String, ToString}, vec::Vec};

/// Where the `linux` and `initrd` commands read their files from.
pub trait FileSource {
    fn read(&mut self, path: &str) -> Result<Vec<u8>>;
}

impl FileSource for BTreeMap<String, Vec<u8>> {
    fn read(&mut self, path: &str) -> Result<Vec<u8>> {
        return self.get(path).cloned().ok_or_else(|| Error::FileNotFound(path.to_string()));
    }
}

impl<F: FileSource + ?Sized> FileSource for &mut F {
    fn read(&mut self, path: &str) -> Result<Vec<u8>> {
        return (**self).read(path);
    }
}
