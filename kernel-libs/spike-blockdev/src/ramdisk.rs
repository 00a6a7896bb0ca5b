use alloc::{vec, vec::Vec};
use log::trace;

use crate::{BlockDevice, DeviceError, SECTOR_SIZE, check_transfer};

/// A disk kept entirely in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RamDisk {
    data: Vec<u8>,
    flushes: usize,
}

impl RamDisk {
    pub fn new(sectors: u32) -> Self {
        Self {
            data: vec![0; sectors as usize * SECTOR_SIZE],
            flushes: 0,
        }
    }

    /// Wrap an existing image. Trailing bytes that do not fill a sector are dropped.
    pub fn from_image(mut data: Vec<u8>) -> Self {
        let whole = data.len() - data.len() % SECTOR_SIZE;
        data.truncate(whole);
        Self { data, flushes: 0 }
    }

    pub fn sector(&self, lba: u32) -> Option<&[u8]> {
        let start = lba as usize * SECTOR_SIZE;
        self.data.get(start..start + SECTOR_SIZE)
    }

    pub fn image(&self) -> &[u8] {
        &self.data
    }

    pub fn into_image(self) -> Vec<u8> {
        self.data
    }

    /// How many times [`BlockDevice::flush`] was called.
    pub const fn flush_count(&self) -> usize {
        self.flushes
    }
}

impl BlockDevice for RamDisk {
    fn read_sectors(&mut self, lba: u32, count: u32, buf: &mut [u8]) -> Result<(), DeviceError> {
        check_transfer(self.total_sectors(), lba, count, buf.len())?;
        let start = lba as usize * SECTOR_SIZE;
        buf.copy_from_slice(&self.data[start..start + buf.len()]);
        Ok(())
    }

    fn write_sectors(&mut self, lba: u32, count: u32, buf: &[u8]) -> Result<(), DeviceError> {
        check_transfer(self.total_sectors(), lba, count, buf.len())?;
        trace!("ramdisk write lba={lba} count={count}");
        let start = lba as usize * SECTOR_SIZE;
        self.data[start..start + buf.len()].copy_from_slice(buf);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), DeviceError> {
        self.flushes += 1;
        Ok(())
    }

    fn total_sectors(&self) -> u32 {
        (self.data.len() / SECTOR_SIZE) as u32
    }

    fn present(&self) -> bool {
        true
    }
}
