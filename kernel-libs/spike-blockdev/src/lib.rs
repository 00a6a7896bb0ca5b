#![no_std]

extern crate alloc;

use alloc::boxed::Box;
use thiserror::Error;

pub mod ramdisk;

pub use ramdisk::RamDisk;

/// Size of one sector, which is also the filesystem block size.
pub const SECTOR_SIZE: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("no device present")]
    NotPresent,
    #[error("sectors {lba}..{lba}+{count} out of range")]
    OutOfRange { lba: u32, count: u32 },
    #[error("buffer of {len} bytes does not match {count} sectors")]
    BadBuffer { len: usize, count: u32 },
    #[error("transfer failed at sector {lba}")]
    Transfer { lba: u32 },
}

/// Synchronous sector-level access to a disk.
///
/// `buf` always holds exactly `count * SECTOR_SIZE` bytes.
pub trait BlockDevice {
    fn read_sectors(&mut self, lba: u32, count: u32, buf: &mut [u8]) -> Result<(), DeviceError>;
    fn write_sectors(&mut self, lba: u32, count: u32, buf: &[u8]) -> Result<(), DeviceError>;
    fn flush(&mut self) -> Result<(), DeviceError>;
    fn total_sectors(&self) -> u32;
    fn present(&self) -> bool;
}

impl<D: BlockDevice + ?Sized> BlockDevice for &mut D {
    fn read_sectors(&mut self, lba: u32, count: u32, buf: &mut [u8]) -> Result<(), DeviceError> {
        (**self).read_sectors(lba, count, buf)
    }

    fn write_sectors(&mut self, lba: u32, count: u32, buf: &[u8]) -> Result<(), DeviceError> {
        (**self).write_sectors(lba, count, buf)
    }

    fn flush(&mut self) -> Result<(), DeviceError> {
        (**self).flush()
    }

    fn total_sectors(&self) -> u32 {
        (**self).total_sectors()
    }

    fn present(&self) -> bool {
        (**self).present()
    }
}

impl<D: BlockDevice + ?Sized> BlockDevice for Box<D> {
    fn read_sectors(&mut self, lba: u32, count: u32, buf: &mut [u8]) -> Result<(), DeviceError> {
        (**self).read_sectors(lba, count, buf)
    }

    fn write_sectors(&mut self, lba: u32, count: u32, buf: &[u8]) -> Result<(), DeviceError> {
        (**self).write_sectors(lba, count, buf)
    }

    fn flush(&mut self) -> Result<(), DeviceError> {
        (**self).flush()
    }

    fn total_sectors(&self) -> u32 {
        (**self).total_sectors()
    }

    fn present(&self) -> bool {
        (**self).present()
    }
}

/// Checks shared by device implementations: presence, bounds and buffer size.
pub fn check_transfer(
    total_sectors: u32,
    lba: u32,
    count: u32,
    len: usize,
) -> Result<(), DeviceError> {
    if len != count as usize * SECTOR_SIZE {
        return Err(DeviceError::BadBuffer { len, count });
    }
    match lba.checked_add(count) {
        Some(end) if end <= total_sectors => Ok(()),
        _ => Err(DeviceError::OutOfRange { lba, count }),
    }
}
