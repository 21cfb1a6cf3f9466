// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Waiter bookkeeping for the blocking wait/notify operations.
//!
//! A fixed table of cache-line-aligned entries, bucketed by the same
//! address hash as the emulation lock table, tracks how many threads are
//! blocked on addresses in each bucket and carries a generation word for
//! cells the platform cannot wait on directly. The waiter count lets
//! notify skip the OS wake call entirely when nobody is blocked, which is
//! the common case.
//!
//! Unrelated atomics hashing to the same bucket share an entry. A wake
//! routed through the shared generation word therefore always wakes every
//! waiter on it; woken threads re-check their own cell and re-block. That
//! is a spurious wakeup, which this API permits.

use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering, fence};

/// Number of contention buckets; must stay a power of two.
const CONTENTION_BUCKETS: usize = 64;

/// One contention bucket, padded to a cache line pair so waiter traffic on
/// one bucket does not thrash its neighbours.
#[repr(align(128))]
pub(crate) struct ContentionEntry {
    /// Number of threads currently between register and unregister.
    waiters: AtomicU32,
    /// Bumped by every notify; the blocking target for cells the platform
    /// cannot wait on directly.
    generation: AtomicU32,
}

impl ContentionEntry {
    /// Announces a waiter before it blocks. The sequential fence orders
    /// the increment before the waiter's re-check load, closing the race
    /// against a concurrent notify reading the count.
    #[inline]
    pub(crate) fn register(&self) {
        self.waiters.fetch_add(1, Ordering::SeqCst);
        fence(Ordering::SeqCst);
    }

    #[inline]
    pub(crate) fn unregister(&self) {
        self.waiters.fetch_sub(1, Ordering::Release);
    }

    #[inline]
    pub(crate) fn has_waiters(&self) -> bool {
        self.waiters.load(Ordering::SeqCst) != 0
    }

    /// Current generation; read this before the re-check load so a notify
    /// landing after the re-check makes the block return immediately.
    #[inline]
    pub(crate) fn generation(&self) -> u32 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Bumps the generation so blocked-on-generation waiters observe a
    /// changed value.
    #[inline]
    pub(crate) fn advance_generation(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        fence(Ordering::SeqCst);
    }

    #[inline]
    pub(crate) fn generation_ptr(&self) -> *const u32 {
        self.generation.as_ptr()
    }
}

/// The bucket covering `addr`.
pub(crate) fn entry_for(addr: usize) -> &'static ContentionEntry {
    const EMPTY: ContentionEntry = ContentionEntry {
        waiters: AtomicU32::new(0),
        generation: AtomicU32::new(0),
    };
    static CONTENTION: [ContentionEntry; CONTENTION_BUCKETS] = [EMPTY; CONTENTION_BUCKETS];

    &CONTENTION[crate::fallback::bucket_index(addr, CONTENTION_BUCKETS)]
}

static OS_WAKE_CALLS: AtomicUsize = AtomicUsize::new(0);

/// Number of OS wake calls issued so far, process-wide.
///
/// Instrumentation for tests and callers tuning notify traffic: a notify
/// with no registered waiters must leave this counter untouched.
#[inline]
pub fn os_wake_call_count() -> usize {
    OS_WAKE_CALLS.load(Ordering::Relaxed)
}

#[inline]
fn count_wake_call() {
    OS_WAKE_CALLS.fetch_add(1, Ordering::Relaxed);
}

#[cfg(any(target_os = "linux", target_os = "android"))]
pub(crate) mod platform {
    use super::count_wake_call;

    /// Widths the futex syscall can block on directly.
    pub(crate) const fn can_wait_on_cell(size: usize) -> bool {
        size == 4
    }

    /// Blocks until the 4-byte value at `addr` is observed to differ from
    /// `expected`, a wake arrives, or spuriously.
    ///
    /// # Safety
    ///
    /// `addr` must be valid for reads of 4 bytes for the duration of the
    /// call and 4-byte aligned.
    pub(crate) unsafe fn wait_on_address(addr: *const (), expected: &[u8]) {
        debug_assert_eq!(expected.len(), 4);
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(expected);
        let value = u32::from_ne_bytes(bytes);
        // SAFETY: FUTEX_WAIT only reads the word at addr and sleeps; a
        // mismatched value or any signal makes it return immediately.
        unsafe {
            libc::syscall(
                libc::SYS_futex,
                addr,
                libc::FUTEX_WAIT | libc::FUTEX_PRIVATE_FLAG,
                value,
                core::ptr::null::<libc::timespec>(),
            );
        }
    }

    pub(crate) fn wake_one(addr: *const ()) {
        count_wake_call();
        // SAFETY: FUTEX_WAKE does not access the memory at addr.
        unsafe {
            libc::syscall(
                libc::SYS_futex,
                addr,
                libc::FUTEX_WAKE | libc::FUTEX_PRIVATE_FLAG,
                1i32,
            );
        }
    }

    pub(crate) fn wake_all(addr: *const ()) {
        count_wake_call();
        // SAFETY: FUTEX_WAKE does not access the memory at addr.
        unsafe {
            libc::syscall(
                libc::SYS_futex,
                addr,
                libc::FUTEX_WAKE | libc::FUTEX_PRIVATE_FLAG,
                i32::MAX,
            );
        }
    }
}

#[cfg(windows)]
pub(crate) mod platform {
    use super::count_wake_call;
    use windows_sys::Win32::System::Threading::{
        INFINITE, WaitOnAddress, WakeByAddressAll, WakeByAddressSingle,
    };

    /// `WaitOnAddress` accepts every natively atomic width.
    pub(crate) const fn can_wait_on_cell(size: usize) -> bool {
        matches!(size, 1 | 2 | 4 | 8)
    }

    /// # Safety
    ///
    /// `addr` must be valid for reads of `expected.len()` bytes for the
    /// duration of the call.
    pub(crate) unsafe fn wait_on_address(addr: *const (), expected: &[u8]) {
        // SAFETY: WaitOnAddress compares expected.len() bytes at addr
        // against the undesired value and sleeps only while they match.
        unsafe {
            WaitOnAddress(
                addr.cast(),
                expected.as_ptr().cast(),
                expected.len(),
                INFINITE,
            );
        }
    }

    pub(crate) fn wake_one(addr: *const ()) {
        count_wake_call();
        // SAFETY: WakeByAddressSingle does not access the memory at addr.
        unsafe { WakeByAddressSingle(addr.cast()) };
    }

    pub(crate) fn wake_all(addr: *const ()) {
        count_wake_call();
        // SAFETY: WakeByAddressAll does not access the memory at addr.
        unsafe { WakeByAddressAll(addr.cast()) };
    }
}

#[cfg(target_os = "macos")]
pub(crate) mod platform {
    use super::count_wake_call;

    // Undocumented but stable libSystem primitives; the ecosystem's
    // address-wait crates bind them the same way.
    const UL_COMPARE_AND_WAIT: u32 = 1;
    const ULF_WAKE_ALL: u32 = 0x0000_0100;
    const ULF_NO_ERRNO: u32 = 0x0100_0000;

    unsafe extern "C" {
        fn __ulock_wait(operation: u32, addr: *mut core::ffi::c_void, value: u64, timeout: u32)
        -> i32;
        fn __ulock_wake(operation: u32, addr: *mut core::ffi::c_void, wake_value: u64) -> i32;
    }

    /// `__ulock_wait` compares a 32-bit value.
    pub(crate) const fn can_wait_on_cell(size: usize) -> bool {
        size == 4
    }

    /// # Safety
    ///
    /// `addr` must be valid for reads of 4 bytes for the duration of the
    /// call and 4-byte aligned.
    pub(crate) unsafe fn wait_on_address(addr: *const (), expected: &[u8]) {
        debug_assert_eq!(expected.len(), 4);
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(expected);
        let value = u32::from_ne_bytes(bytes);
        // SAFETY: __ulock_wait only reads the word at addr and sleeps
        // while it matches value.
        unsafe {
            __ulock_wait(
                UL_COMPARE_AND_WAIT | ULF_NO_ERRNO,
                addr.cast_mut().cast(),
                u64::from(value),
                0,
            );
        }
    }

    pub(crate) fn wake_one(addr: *const ()) {
        count_wake_call();
        // SAFETY: __ulock_wake does not access the memory at addr.
        unsafe { __ulock_wake(UL_COMPARE_AND_WAIT | ULF_NO_ERRNO, addr.cast_mut().cast(), 0) };
    }

    pub(crate) fn wake_all(addr: *const ()) {
        count_wake_call();
        // SAFETY: __ulock_wake does not access the memory at addr.
        unsafe {
            __ulock_wake(
                UL_COMPARE_AND_WAIT | ULF_WAKE_ALL | ULF_NO_ERRNO,
                addr.cast_mut().cast(),
                0,
            )
        };
    }
}

#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "macos",
    windows
)))]
pub(crate) mod platform {
    //! Portable substitute: no address-wait primitive, so "blocking" is a
    //! bounded relax loop. Every return is a legal spurious wakeup and the
    //! caller's re-check loop carries the semantics.

    pub(crate) const fn can_wait_on_cell(_size: usize) -> bool {
        false
    }

    pub(crate) unsafe fn wait_on_address(_addr: *const (), _expected: &[u8]) {
        for _ in 0..1024 {
            crate::pause();
        }
    }

    pub(crate) fn wake_one(_addr: *const ()) {
        super::count_wake_call();
    }

    pub(crate) fn wake_all(_addr: *const ()) {
        super::count_wake_call();
    }
}
