// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Spinlock emulation for widths the hardware cannot handle atomically.
//!
//! A fixed, process-lifetime table of binary spinlocks is indexed by a hash
//! of the cell's address. While a bucket's lock is held the requested
//! operation runs as plain, non-atomic memory accesses; mutual exclusion
//! supplies the same external ordering contract the native path gets from
//! lock-freedom.
//!
//! Constraint: the cell memory of an emulated atomic must only ever be
//! accessed through this table. `Atomic<T>` owns its cell exclusively and
//! routes every operation on an emulated width here, so the constraint
//! holds by construction. Unrelated cells hashing to the same bucket share
//! a lock; that is false contention, not incorrectness.

use core::sync::atomic::{AtomicU32, Ordering, fence};

use crate::MemoryOrder;
use crate::bits::byte_eq;

/// Number of lock buckets; must stay a power of two for the index mask.
const LOCK_BUCKETS: usize = 64;

/// Addresses within one cache line should land in the same bucket.
const CACHE_LINE_SHIFT: u32 = 6;

#[cfg(target_pointer_width = "64")]
const FIBONACCI_MIX: usize = 0x9E37_79B9_7F4A_7C15;
#[cfg(not(target_pointer_width = "64"))]
const FIBONACCI_MIX: usize = 0x9E37_79B9;

/// Hashes a cell address into one of `buckets` slots: shift off the
/// cache-line bits, mix, mask. Shared with the wait/notify contention
/// table so both layers agree on bucket boundaries.
#[inline]
pub(crate) const fn bucket_index(addr: usize, buckets: usize) -> usize {
    debug_assert!(buckets.is_power_of_two());
    let mixed = (addr >> CACHE_LINE_SHIFT).wrapping_mul(FIBONACCI_MIX);
    (mixed >> (usize::BITS - buckets.trailing_zeros())) & (buckets - 1)
}

/// One binary spinlock word. 0 is unlocked, 1 is held.
struct LockWord {
    state: AtomicU32,
}

impl LockWord {
    /// Spins until the 0→1 exchange succeeds.
    #[inline]
    fn acquire(&'static self) -> LockGuard {
        loop {
            if self.state.swap(1, Ordering::Acquire) == 0 {
                return LockGuard { word: self };
            }
            while self.state.load(Ordering::Relaxed) != 0 {
                crate::pause();
            }
        }
    }
}

struct LockGuard {
    word: &'static LockWord,
}

impl Drop for LockGuard {
    #[inline]
    fn drop(&mut self) {
        self.word.state.store(0, Ordering::Release);
    }
}

#[inline]
#[must_use]
fn lock_for(addr: usize) -> LockGuard {
    const UNLOCKED: LockWord = LockWord {
        state: AtomicU32::new(0),
    };
    static LOCKS: [LockWord; LOCK_BUCKETS] = [UNLOCKED; LOCK_BUCKETS];

    LOCKS[bucket_index(addr, LOCK_BUCKETS)].acquire()
}

/// Emits the extra fence sequential operations need beyond the bucket
/// lock's acquire/release pair.
#[inline(always)]
fn seq_cst_fence_for(order: MemoryOrder) {
    if order == MemoryOrder::SeqCst {
        fence(Ordering::SeqCst);
    }
}

/// # Safety
///
/// `cell` must be valid for reads of `T` and only ever accessed under this
/// lock table while shared.
pub(crate) unsafe fn load<T: Copy>(cell: *mut T, order: MemoryOrder) -> T {
    seq_cst_fence_for(order);
    let guard = lock_for(cell as usize);
    // SAFETY: the bucket lock excludes every other accessor of this cell.
    let value = unsafe { cell.read() };
    drop(guard);
    seq_cst_fence_for(order);
    value
}

/// # Safety
///
/// `cell` must be valid for writes of `T` and only ever accessed under this
/// lock table while shared.
pub(crate) unsafe fn store<T: Copy>(cell: *mut T, value: T, order: MemoryOrder) {
    seq_cst_fence_for(order);
    let guard = lock_for(cell as usize);
    // SAFETY: the bucket lock excludes every other accessor of this cell.
    unsafe { cell.write(value) };
    drop(guard);
    seq_cst_fence_for(order);
}

/// # Safety
///
/// Same contract as [`store`].
pub(crate) unsafe fn swap<T: Copy>(cell: *mut T, value: T, order: MemoryOrder) -> T {
    seq_cst_fence_for(order);
    let guard = lock_for(cell as usize);
    // SAFETY: the bucket lock excludes every other accessor of this cell.
    let previous = unsafe { cell.replace(value) };
    drop(guard);
    seq_cst_fence_for(order);
    previous
}

/// Bitwise compare-exchange under the bucket lock. Returns the observed
/// value; `Ok` means `desired` was installed.
///
/// # Safety
///
/// Same contract as [`store`].
pub(crate) unsafe fn compare_exchange<T: Copy>(
    cell: *mut T,
    current: T,
    desired: T,
    success: MemoryOrder,
    failure: MemoryOrder,
) -> Result<T, T> {
    let order = MemoryOrder::combine(success, failure);
    seq_cst_fence_for(order);
    let guard = lock_for(cell as usize);
    // SAFETY: the bucket lock excludes every other accessor of this cell.
    let observed = unsafe { cell.read() };
    let exchanged = byte_eq(&observed, &current);
    if exchanged {
        // SAFETY: as above.
        unsafe { cell.write(desired) };
    }
    drop(guard);
    seq_cst_fence_for(order);
    if exchanged { Ok(observed) } else { Err(observed) }
}

/// Applies `op` to the cell under the bucket lock, returning the previous
/// value. Carries the integer fetch operations for emulated widths.
///
/// # Safety
///
/// Same contract as [`store`].
pub(crate) unsafe fn read_modify_write<T: Copy>(
    cell: *mut T,
    order: MemoryOrder,
    op: impl FnOnce(T) -> T,
) -> T {
    seq_cst_fence_for(order);
    let guard = lock_for(cell as usize);
    // SAFETY: the bucket lock excludes every other accessor of this cell.
    let previous = unsafe { cell.read() };
    // SAFETY: as above.
    unsafe { cell.write(op(previous)) };
    drop(guard);
    seq_cst_fence_for(order);
    previous
}
