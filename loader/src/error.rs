use alloc::string::String;
use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

/// Coarse classification of [`Error`], matching what a command prompt reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    BadArgument,
    UnknownOs,
    BadOs,
    OutOfMemory,
    FileNotFound,
    Handoff
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // Command arguments
    #[error("filename expected")]
    FilenameExpected,

    #[error("you need to load the kernel first")]
    KernelNotLoaded,

    #[error("only one initrd command can be issued")]
    RamdiskAlreadyAttached,

    #[error("no ramdisk specified")]
    NoRamdiskSpecified,

    #[error("ramdisk is empty")]
    EmptyRamdisk,

    #[error("invalid ramdisk component: {0}")]
    BadRamdiskSpec(String),

    #[error("argument list too large")]
    ArgumentsTooLarge,

    #[error("unknown command `{0}`")]
    UnknownCommand(String),

    // Image rejection
    #[error("this ELF file is not of the right type")]
    WrongExecutableType,

    #[error("unsupported image: {0}")]
    UnsupportedFormat(&'static str),

    #[error("empty or invalid image: {0}")]
    EmptyOrInvalidImage(&'static str),

    #[error("malformed ELF image: {0}")]
    Malformed(&'static str),

    #[error("premature end of file: segment at 0x{offset:x} (+0x{len:x}) exceeds 0x{file_len:x} bytes")]
    Truncated { offset: u64, len: u64, file_len: usize },

    // Address space
    #[error("out of address space: 0x{size:x} bytes aligned to 0x{align:x} below 0x{limit:x}")]
    NoAddressSpace { size: u64, align: u64, limit: u64 },

    #[error("address range 0x{target:x}+0x{size:x} is not available")]
    AddressUnavailable { target: u64, size: u64 },

    #[error("address 0x{0:x} does not fit a 32-bit argument slot")]
    AddressNotRepresentable(u64),

    #[error("chunk is no longer owned by the relocator")]
    StaleChunk,

    // Files
    #[error("file `{0}` not found")]
    FileNotFound(String),

    #[error("kernel returned control to the loader")]
    HandoffReturned
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        return match self {
            Error::FilenameExpected | Error::KernelNotLoaded |
            Error::RamdiskAlreadyAttached | Error::NoRamdiskSpecified |
            Error::EmptyRamdisk | Error::BadRamdiskSpec(_) |
            Error::ArgumentsTooLarge | Error::UnknownCommand(_) => ErrorKind::BadArgument,

            Error::WrongExecutableType => ErrorKind::UnknownOs,

            Error::UnsupportedFormat(_) | Error::EmptyOrInvalidImage(_) |
            Error::Malformed(_) | Error::Truncated { .. } => ErrorKind::BadOs,

            Error::NoAddressSpace { .. } | Error::AddressUnavailable { .. } |
            Error::AddressNotRepresentable(_) | Error::StaleChunk => ErrorKind::OutOfMemory,

            Error::FileNotFound(_) => ErrorKind::FileNotFound,
            Error::HandoffReturned => ErrorKind::Handoff
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_errors_are_bad_arguments() {
        assert_eq!(Error::KernelNotLoaded.kind(), ErrorKind::BadArgument);
        assert_eq!(Error::RamdiskAlreadyAttached.kind(), ErrorKind::BadArgument);
        assert_eq!(Error::WrongExecutableType.kind(), ErrorKind::UnknownOs);
        assert_eq!(Error::EmptyOrInvalidImage("no loadable segments").kind(), ErrorKind::BadOs);
    }

    #[test]
    fn messages_keep_command_wording() {
        assert_eq!(Error::KernelNotLoaded.to_string(), "you need to load the kernel first");
        assert_eq!(
            Error::NoAddressSpace { size: 0x40, align: 8, limit: 0x1_0000_0000 }.to_string(),
            "out of address space: 0x40 bytes aligned to 0x8 below 0x100000000"
        );
    }
}
