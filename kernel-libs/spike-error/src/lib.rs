#![no_std]

use num_enum::{IntoPrimitive, TryFromPrimitive};
use thiserror::Error;

macro_rules! enum_with_max {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident : $repr:ty {
            $(
                $(#[$vmeta:meta])*
                $variant:ident $(= $value:expr)?
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr($repr)]
        $vis enum $name {
            $(
                $(#[$vmeta])*
                $variant $(= $value)?,
            )*
        }

        impl $name {
            pub const MAX_PRIMITIVE: $repr = {
                let mut max = 0 as $repr;
                $(
                    let val = $name::$variant as $repr;
                    if val > max { max = val; }
                )*
                max
            };

            pub const COUNT: $repr = {
                let mut count = 0 as $repr;
                $(
                    let _ = $name::$variant as $repr;
                    count += 1;
                )*
                count
            };
        }
    };
}

enum_with_max! {
    /// Every failure the filesystem core reports to its callers.
    ///
    /// The numeric value is what the syscall layer hands back to user
    /// space (negated, see [`FsError::errno`]).
    #[derive(IntoPrimitive, TryFromPrimitive, Debug, Error, Clone, Copy, PartialEq, Eq)]
    pub enum FsError : u64 {
        #[error("Not found")]
        NotFound = 1,
        #[error("Not a directory")]
        NotADirectory,
        #[error("Is a directory")]
        IsADirectory,
        #[error("Already exists")]
        AlreadyExists,
        #[error("Directory not empty")]
        DirectoryNotEmpty,
        #[error("Invalid argument")]
        InvalidArgument,
        #[error("File name too long")]
        NameTooLong,
        #[error("File too large")]
        FileTooLarge,
        #[error("Out of inodes")]
        OutOfInodes,
        #[error("Out of disk space")]
        OutOfDiskSpace,
        #[error("I/O error")]
        IoError,
        #[error("Corrupt superblock")]
        CorruptSuperblock,
        #[error("Corrupted filesystem metadata")]
        Corrupted,
        #[error("Out of memory")]
        OutOfMemory,
    }
}

impl FsError {
    /// Negative error code as returned by the syscall layer.
    pub fn errno(self) -> i64 {
        -(u64::from(self) as i64)
    }

    /// Inverse of [`FsError::errno`]. Non-negative or unknown codes yield `None`.
    pub fn from_errno(code: i64) -> Option<Self> {
        if code >= 0 {
            return None;
        }
        Self::try_from(code.unsigned_abs()).ok()
    }
}

pub type Result<T, E = FsError> = core::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::FsError;

    #[test]
    fn errno_round_trip() {
        for code in 1..=FsError::MAX_PRIMITIVE {
            let err = FsError::try_from(code).expect("contiguous codes");
            assert_eq!(Some(err), FsError::from_errno(err.errno()));
        }
    }

    #[test]
    fn codes_are_contiguous() {
        assert_eq!(FsError::COUNT, FsError::MAX_PRIMITIVE);
    }

    #[test]
    fn positive_is_not_an_error() {
        assert_eq!(None, FsError::from_errno(0));
        assert_eq!(None, FsError::from_errno(5));
        assert_eq!(None, FsError::from_errno(-(FsError::MAX_PRIMITIVE as i64) - 1));
    }

    #[test]
    fn not_found_is_minus_one() {
        assert_eq!(-1, FsError::NotFound.errno());
    }
}
