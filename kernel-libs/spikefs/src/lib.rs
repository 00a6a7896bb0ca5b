#![no_std]

extern crate alloc;

use log::info;
use spike_blockdev::BlockDevice;
use spike_error::{FsError, Result};
use spike_vfs::Vfs;

pub mod bitmap;
pub mod check;
mod device;
pub mod layout;
mod le;
mod load;
pub mod locked;
pub mod record;
pub mod superblock;
mod sync;

pub use bitmap::Bitmap;
pub use check::CheckReport;
pub use layout::Layout;
pub use locked::LockedSpikeFs;
pub use superblock::Superblock;

/// Data-pool occupancy, in blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Usage {
    pub total: u32,
    pub used: u32,
    pub free: u32,
}

/// A SpikeFS volume: the device, its layout and bitmap, and the in-memory
/// tree that [`SpikeFs::sync`] persists.
pub struct SpikeFs<D: BlockDevice> {
    device: D,
    layout: Layout,
    bitmap: Bitmap,
    superblock: Superblock,
    vfs: Vfs,
}

impl<D: BlockDevice> SpikeFs<D> {
    /// Lay out a new filesystem on `device`, holding only an empty root.
    pub fn format(mut device: D) -> Result<Self> {
        device::ensure_present(&device)?;
        let layout = Layout::format(device.total_sectors())?;
        info!(
            "formatting SpikeFS: {} sectors, bitmap at {} ({} sectors), {} data blocks at {}",
            device.total_sectors(),
            layout.bitmap_start,
            layout.bitmap_sectors(),
            layout.block_count,
            layout.data_start
        );
        let vfs = Vfs::new()?;
        let synced = sync::sync(&mut device, &layout, &Bitmap::new(layout.block_count)?, &vfs)?;
        Ok(Self {
            device,
            layout,
            bitmap: synced.bitmap,
            superblock: synced.superblock,
            vfs,
        })
    }

    /// Load the filesystem already on `device`.
    pub fn open(mut device: D) -> Result<Self> {
        let loaded = load::load(&mut device)?;
        Ok(Self::loaded(device, loaded))
    }

    /// Boot-time mount: open the filesystem, or format the device when it
    /// does not hold one.
    pub fn mount(mut device: D) -> Result<Self> {
        match load::load(&mut device) {
            Ok(loaded) => Ok(Self::loaded(device, loaded)),
            Err(FsError::CorruptSuperblock) => {
                info!("no SpikeFS found, formatting");
                Self::format(device)
            }
            Err(err) => Err(err),
        }
    }

    fn loaded(device: D, loaded: load::Loaded) -> Self {
        Self {
            device,
            layout: loaded.layout,
            bitmap: loaded.bitmap,
            superblock: loaded.superblock,
            vfs: loaded.vfs,
        }
    }

    /// Persist the in-memory tree. On failure the previous image stays
    /// current and nothing here changes.
    pub fn sync(&mut self) -> Result<()> {
        let synced = sync::sync(&mut self.device, &self.layout, &self.bitmap, &self.vfs)?;
        self.bitmap = synced.bitmap;
        self.superblock = synced.superblock;
        self.vfs.mark_clean();
        Ok(())
    }

    /// Replace the in-memory state with what the device holds.
    pub fn load(&mut self) -> Result<()> {
        let loaded = load::load(&mut self.device)?;
        self.layout = loaded.layout;
        self.bitmap = loaded.bitmap;
        self.superblock = loaded.superblock;
        self.vfs = loaded.vfs;
        Ok(())
    }

    /// Cross-check the persisted bitmap against the blocks the image uses.
    pub fn check(&mut self) -> Result<CheckReport> {
        check::check(&mut self.device)
    }

    pub const fn vfs(&self) -> &Vfs {
        &self.vfs
    }

    pub const fn vfs_mut(&mut self) -> &mut Vfs {
        &mut self.vfs
    }

    pub const fn layout(&self) -> &Layout {
        &self.layout
    }

    /// The bitmap as of the last successful sync or load.
    pub const fn bitmap(&self) -> &Bitmap {
        &self.bitmap
    }

    pub const fn superblock(&self) -> &Superblock {
        &self.superblock
    }

    pub const fn device(&self) -> &D {
        &self.device
    }

    /// Direct access to the device. Writes through it bypass the bitmap.
    pub const fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn into_device(self) -> D {
        self.device
    }

    pub fn usage(&self) -> Usage {
        let used = self.bitmap.allocated_count();
        Usage {
            total: self.layout.block_count,
            used,
            free: self.layout.block_count - used,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::SpikeFs;
    use spike_blockdev::{BlockDevice, RamDisk, SECTOR_SIZE};
    use spike_error::FsError;

    #[test]
    fn format_writes_root() {
        let fs = SpikeFs::format(RamDisk::new(64)).unwrap();
        // One chunk, one imap block and the root's entries.
        assert_eq!(3, fs.usage().used);
        assert_eq!(59, fs.usage().free);
        assert_eq!(1, fs.superblock().imap_first);
        assert_eq!(1, fs.superblock().num_ichunks);
        assert!(!fs.vfs().is_dirty());
        assert_eq!(1, fs.device().flush_count());
        assert_eq!(b"SPKF", &fs.device().sector(0).unwrap()[..4]);
    }

    #[test]
    fn format_too_small() {
        assert_eq!(
            Some(FsError::OutOfDiskSpace),
            SpikeFs::format(RamDisk::new(3)).err()
        );
    }

    #[test]
    fn open_blank_disk() {
        assert_eq!(
            Some(FsError::CorruptSuperblock),
            SpikeFs::open(RamDisk::new(64)).err()
        );
    }

    #[test]
    fn mount_formats_blank_disk() {
        let fs = SpikeFs::mount(RamDisk::new(64)).unwrap();
        let disk = fs.into_device();
        assert_eq!(64, disk.total_sectors());
        let fs = SpikeFs::mount(disk).unwrap();
        assert_eq!(1, fs.superblock().num_ichunks);
        assert_eq!(SECTOR_SIZE * 64, fs.device().image().len());
    }
}
