//!                        MIPS64 Linux Boot Composer                        !//
//!
//! Crafted by HaמuL in 2026
//! Description: Places a Linux kernel and its initrd in physical memory,
//!              builds the argv blob and hands off to the kernel
//! Licence: Public Domain

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod addr;
pub mod argv;
pub mod commands;
pub mod config;
pub mod context;
pub mod elf;
pub mod error;
pub mod image;
pub mod initrd;
pub mod ramdisk;
pub mod relocator;
pub mod source;

pub use crate::{
    argv::ArgBlob,
    config::BootConfig,
    context::{BootContext, BootState},
    error::{Error, ErrorKind, Result},
    image::{ImageClass, LoadedImage},
    initrd::InitrdSet,
    ramdisk::RamdiskRegion,
    relocator::{Chunk, PhysArena, Preference, RangeRequest, RegisterState, Relocator},
    source::FileSource
};
