use lock_api::{Mutex, MutexGuard, RawMutex};
use spike_blockdev::BlockDevice;
use spike_error::Result;

use crate::SpikeFs;

/// A mounted filesystem behind one coarse lock, so whole operations
/// (including a sync) never interleave.
pub struct LockedSpikeFs<R: RawMutex, D: BlockDevice> {
    inner: Mutex<R, SpikeFs<D>>,
}

impl<R: RawMutex, D: BlockDevice> LockedSpikeFs<R, D> {
    pub const fn new(fs: SpikeFs<D>) -> Self {
        Self {
            inner: Mutex::new(fs),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, R, SpikeFs<D>> {
        self.inner.lock()
    }

    /// Run `f` with the filesystem locked.
    pub fn with<T>(&self, f: impl FnOnce(&mut SpikeFs<D>) -> T) -> T {
        f(&mut self.inner.lock())
    }

    pub fn sync(&self) -> Result<()> {
        self.inner.lock().sync()
    }

    pub fn into_inner(self) -> SpikeFs<D> {
        self.inner.into_inner()
    }
}
