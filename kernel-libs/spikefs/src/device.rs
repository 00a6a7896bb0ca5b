use spike_blockdev::{BlockDevice, DeviceError, SECTOR_SIZE};
use spike_error::{FsError, Result};

use log::error;

use crate::layout::Layout;

pub(crate) trait DeviceResultExt<T> {
    /// Report a device failure as [`FsError::IoError`].
    fn or_io(self) -> Result<T>;
}

impl<T> DeviceResultExt<T> for core::result::Result<T, DeviceError> {
    fn or_io(self) -> Result<T> {
        self.map_err(|err| {
            error!("block device: {err}");
            FsError::IoError
        })
    }
}

/// Fail with [`FsError::IoError`] when no disk is attached.
pub(crate) fn ensure_present<D: BlockDevice + ?Sized>(device: &D) -> Result<()> {
    if device.present() {
        Ok(())
    } else {
        Err(DeviceError::NotPresent).or_io()
    }
}

pub(crate) fn read_block<D: BlockDevice + ?Sized>(
    device: &mut D,
    layout: &Layout,
    block: u32,
    buf: &mut [u8; SECTOR_SIZE],
) -> Result<()> {
    let lba = layout.block_lba(block)?;
    device.read_sectors(lba, 1, buf).or_io()
}

/// Write `data`, a whole number of sectors, to the run starting at `block`.
pub(crate) fn write_blocks<D: BlockDevice + ?Sized>(
    device: &mut D,
    layout: &Layout,
    block: u32,
    data: &[u8],
) -> Result<()> {
    let count = (data.len() / SECTOR_SIZE) as u32;
    let lba = layout.run_lba(block, count)?;
    device.write_sectors(lba, count, data).or_io()
}
