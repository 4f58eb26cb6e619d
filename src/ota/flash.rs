// Firmware storage and restart primitives

/// Persistent firmware storage. One `begin`..`finalize`/`abort` span per run.
pub trait FlashWriter {
    /// Reserve room for `capacity` bytes. `false` means insufficient storage.
    fn begin(&mut self, capacity: usize) -> bool;

    /// `false` when storage rejected the chunk.
    fn write(&mut self, chunk: &[u8]) -> bool;

    /// Run the storage's own integrity check and mark the image bootable.
    fn finalize(&mut self) -> bool;

    /// Drop a partially written image.
    fn abort(&mut self);
}

/// Reboots the device into whatever image storage marks as active.
pub trait DeviceRestart {
    fn restart(&mut self);
}

impl<F: FlashWriter + ?Sized> FlashWriter for &mut F {
    fn begin(&mut self, capacity: usize) -> bool {
        F::begin(self, capacity)
    }

    fn write(&mut self, chunk: &[u8]) -> bool {
        F::write(self, chunk)
    }

    fn finalize(&mut self) -> bool {
        F::finalize(self)
    }

    fn abort(&mut self) {
        F::abort(self)
    }
}

impl<R: DeviceRestart + ?Sized> DeviceRestart for &mut R {
    fn restart(&mut self) {
        R::restart(self)
    }
}
