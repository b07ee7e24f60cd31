/*
 * File-Writer Adapter
 *
 * The buffered file writers and the FAT library live outside the
 * kernel. What the kernel owns is the registration contract: a writer
 * object registers with a bounded write buffer taken from the threads
 * arena, and the file-service thread calls its periodic service routine
 * until it has no pending data.
 *
 * The mount/unmount system calls are forwarded to hooks the file
 * subsystem installs at boot; without hooks they report FAIL.
 */

use spin::Once;

use crate::scheduler::with_fos;
use crate::types::FosError;

/// A registered writer object, serviced by the file-service thread.
pub trait WriterService: Sync {
    /// One service step: push buffered data towards the device.
    fn service(&self);

    /// Bytes still waiting to be written.
    fn data_to_write(&self) -> u32;
}

/// Mount state machine of the external file subsystem.
pub trait FsHooks: Sync {
    fn mount(&self, dev: u8) -> Result<(), FosError>;
    fn unmount(&self, dev: u8) -> Result<(), FosError>;

    /// Periodic device-state handling, run by the service thread.
    fn mount_proc(&self) {}
}

/// Registry slot: the service object plus its arena-backed buffer.
pub struct WriterSlot {
    pub service: &'static dyn WriterService,
    pub buf: u32,
    pub buf_len: u16,
}

static FS_HOOKS: Once<&'static dyn FsHooks> = Once::new();

/// Install the file-subsystem hooks. First call wins.
pub fn install_fs_hooks(hooks: &'static dyn FsHooks) {
    FS_HOOKS.call_once(|| hooks);
}

pub(crate) fn mount(dev: u8) -> Result<(), FosError> {
    match FS_HOOKS.get() {
        Some(h) => h.mount(dev),
        None => Err(FosError::WrongState),
    }
}

pub(crate) fn unmount(dev: u8) -> Result<(), FosError> {
    match FS_HOOKS.get() {
        Some(h) => h.unmount(dev),
        None => Err(FosError::WrongState),
    }
}

/// Body of the file-service thread.
///
/// Services every registered writer, sleeps for a beat when none of
/// them has pending data, and lets the mount state machine advance.
/// The service calls run outside the kernel lock: a writer is free to
/// use the kernel API from its service routine.
pub(crate) fn fproc_main() {
    const SLEEP_TIME_MS: u32 = 10;

    loop {
        let mut services: heapless::Vec<&'static dyn WriterService, { crate::config::FWRITER_CNT }> =
            heapless::Vec::new();
        with_fos(|f| f.fwriter_services(&mut services));

        let mut data_pending = false;
        for w in &services {
            w.service();
            if w.data_to_write() != 0 {
                data_pending = true;
            }
        }

        if !data_pending {
            let _ = crate::api::sleep(SLEEP_TIME_MS);
        }

        if let Some(h) = FS_HOOKS.get() {
            h.mount_proc();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::ArenaId;
    use crate::platform::test_port;
    use core::sync::atomic::{AtomicU32, Ordering};

    struct CountingWriter {
        serviced: AtomicU32,
        pending: AtomicU32,
    }

    impl WriterService for CountingWriter {
        fn service(&self) {
            self.serviced.fetch_add(1, Ordering::SeqCst);
        }
        fn data_to_write(&self) -> u32 {
            self.pending.load(Ordering::SeqCst)
        }
    }

    static WRITER_A: CountingWriter = CountingWriter {
        serviced: AtomicU32::new(0),
        pending: AtomicU32::new(0),
    };
    static WRITER_B: CountingWriter = CountingWriter {
        serviced: AtomicU32::new(0),
        pending: AtomicU32::new(0),
    };

    #[test]
    fn test_registration_allocates_buffer_and_rejects_duplicates() {
        test_port::setup();
        let mut fos = crate::scheduler::Fos::new();
        fos.init();

        let before = fos.arena_used(ArenaId::Threads);
        fos.fwriter_reg(&WRITER_A, 256).unwrap();
        assert!(fos.arena_used(ArenaId::Threads) > before);

        assert_eq!(fos.fwriter_reg(&WRITER_A, 256), Err(FosError::WrongState));
        fos.fwriter_reg(&WRITER_B, 128).unwrap();

        let mut services: heapless::Vec<_, { crate::config::FWRITER_CNT }> = heapless::Vec::new();
        fos.fwriter_services(&mut services);
        assert_eq!(services.len(), 2);
    }

    #[test]
    fn test_buffer_length_is_capped() {
        test_port::setup();
        let mut fos = crate::scheduler::Fos::new();
        fos.init();
        let slot = fos.fwriter_reg(&WRITER_B, u16::MAX).unwrap();
        let _ = slot;
        assert_eq!(fos.fwriter_reg(&WRITER_B, 0), Err(FosError::InvalidArg));
    }

    struct RecordingHooks {
        mounted: AtomicU32,
        unmounted: AtomicU32,
    }

    impl FsHooks for RecordingHooks {
        fn mount(&self, dev: u8) -> Result<(), FosError> {
            self.mounted.store(dev as u32 + 1, Ordering::SeqCst);
            Ok(())
        }
        fn unmount(&self, dev: u8) -> Result<(), FosError> {
            self.unmounted.store(dev as u32 + 1, Ordering::SeqCst);
            Ok(())
        }
    }

    static HOOKS: RecordingHooks = RecordingHooks {
        mounted: AtomicU32::new(0),
        unmounted: AtomicU32::new(0),
    };

    #[test]
    fn test_mount_calls_forward_to_hooks() {
        install_fs_hooks(&HOOKS);
        mount(3).unwrap();
        unmount(1).unwrap();
        assert_eq!(HOOKS.mounted.load(Ordering::SeqCst), 4);
        assert_eq!(HOOKS.unmounted.load(Ordering::SeqCst), 2);
    }
}
