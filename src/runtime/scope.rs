//! Thread-local current device selection

use std::cell::Cell;
use std::marker::PhantomData;

thread_local! {
    static CURRENT_DEVICE: Cell<usize> = const { Cell::new(0) };
}

/// Index of the device kernels are launched on by this thread
///
/// Defaults to 0. Arrays passed to a kernel must live on this device.
pub fn current_device_index() -> usize {
    CURRENT_DEVICE.with(Cell::get)
}

/// Scoped switch of the current device; the previous device is restored on drop
///
/// The guard is `!Send`: it must be dropped on the thread that created it.
#[derive(Debug)]
pub struct DeviceGuard {
    previous: usize,
    _not_send: PhantomData<*const ()>,
}

impl DeviceGuard {
    /// Make `index` the current device until the guard is dropped
    pub fn new(index: usize) -> Self {
        let previous = CURRENT_DEVICE.with(|slot| slot.replace(index));
        log::trace!("current device {previous} -> {index}");
        Self {
            previous,
            _not_send: PhantomData,
        }
    }
}

impl Drop for DeviceGuard {
    fn drop(&mut self) {
        CURRENT_DEVICE.with(|slot| slot.set(self.previous));
    }
}

/// Run `f` with `index` as the current device
pub fn using_device<T>(index: usize, f: impl FnOnce() -> T) -> T {
    let _guard = DeviceGuard::new(index);
    f()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_restores_previous() {
        assert_eq!(current_device_index(), 0);
        {
            let _outer = DeviceGuard::new(2);
            assert_eq!(current_device_index(), 2);
            using_device(5, || assert_eq!(current_device_index(), 5));
            assert_eq!(current_device_index(), 2);
        }
        assert_eq!(current_device_index(), 0);
    }

    // Resolves only when `T: !Send`; a `Send` type makes the impl choice ambiguous.
    trait AmbiguousIfSend<A> {
        fn check() {}
    }
    impl<T: ?Sized> AmbiguousIfSend<()> for T {}
    impl<T: ?Sized + Send> AmbiguousIfSend<u8> for T {}

    #[test]
    fn test_guard_is_not_send() {
        <DeviceGuard as AmbiguousIfSend<_>>::check();
    }

    #[test]
    fn test_current_device_is_per_thread() {
        let _guard = DeviceGuard::new(3);
        let other = std::thread::spawn(current_device_index).join().unwrap();
        assert_eq!(other, 0);
        assert_eq!(current_device_index(), 3);
    }
}
