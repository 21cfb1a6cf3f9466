// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Interlocked atomic cells over raw hardware instructions.
//!
//! [`Atomic<T>`] wraps any trivially-copyable `T` and provides loads,
//! stores, exchanges, compare-exchanges, integer/float/pointer fetch
//! operations and futex-style blocking waits, all with an explicit
//! [`MemoryOrder`] per call.
//!
//! The implementation is layered:
//!
//! - widths the target can handle atomically (1, 2 and 4 bytes
//!   everywhere, 8 bytes on 64-bit targets) compile down to inline
//!   assembly in `raw`, one instruction sequence per width and ordering
//!   class;
//! - every other width is emulated in `fallback` under a process-wide
//!   table of address-hashed spinlocks;
//! - blocking waits park on the platform's address-wait primitive in
//!   `wait`, either on the cell itself when the platform can compare its
//!   width or on a shared per-bucket generation word when it cannot.
//!
//! Which layer a given `T` uses is decided at compile time from its size
//! and alignment; [`Atomic::is_always_lock_free`] exposes the answer.
//!
//! ```
//! use interlocked_atomics::{Atomic, MemoryOrder};
//!
//! let counter = Atomic::new(0u32);
//! counter.fetch_add(3, MemoryOrder::Relaxed);
//! counter.store(counter.load(MemoryOrder::Relaxed) + 1, MemoryOrder::Release);
//! assert_eq!(counter.load(MemoryOrder::Acquire), 4);
//! ```
//!
//! The cell of an `Atomic<T>` must only be accessed through its methods
//! while shared; the ownership rules enforce this, which is what makes the
//! mixed native/emulated scheme sound.

#![no_std]

mod bits;
mod fallback;
mod order;
#[cfg(any(target_arch = "x86", target_arch = "x86_64", target_arch = "aarch64"))]
mod raw;
mod wait;

use core::cell::UnsafeCell;
use core::fmt;
use core::sync::atomic::{compiler_fence, fence};
#[cfg(any(target_arch = "x86", target_arch = "x86_64", target_arch = "aarch64"))]
use core::sync::atomic::Ordering;

use crate::bits::byte_eq;

pub use crate::order::MemoryOrder;
pub use crate::wait::os_wake_call_count;

/// Issues a memory fence with the given ordering.
///
/// A [`Relaxed`](MemoryOrder::Relaxed) fence is a no-op.
#[inline]
pub fn thread_fence(order: MemoryOrder) {
    if let Some(order) = order.fence_order() {
        fence(order);
    }
}

/// Restricts compiler reordering without emitting a hardware fence.
///
/// Only meaningful for code racing against itself on the same thread, such
/// as a signal handler.
#[inline]
pub fn signal_fence(order: MemoryOrder) {
    if let Some(order) = order.fence_order() {
        compiler_fence(order);
    }
}

/// Hints the processor that the caller is spinning.
#[inline(always)]
pub fn pause() {
    core::hint::spin_loop();
}

/// Rounds `wait` spins on the value before involving the OS.
const WAIT_SPIN_ROUNDS: u32 = 64;

/// An atomic cell holding any trivially-copyable `T`.
///
/// Operations are lock-free whenever `T`'s size is a machine word the
/// target supports and its alignment is at least its size; other types are
/// transparently emulated under a spinlock table. Equality inside
/// compare-exchange and wait is bitwise, not `PartialEq`, so padding bytes
/// participate.
#[repr(transparent)]
pub struct Atomic<T> {
    value: UnsafeCell<T>,
}

// SAFETY: every shared access goes through an interlocked instruction or
// the bucket lock, so views from multiple threads are serialized. Send is
// derived from UnsafeCell<T>.
unsafe impl<T: Copy + Send> Sync for Atomic<T> {}

impl<T> Atomic<T> {
    /// Creates a new atomic cell.
    #[inline]
    pub const fn new(value: T) -> Self {
        Self {
            value: UnsafeCell::new(value),
        }
    }

    /// Consumes the cell and returns the contained value.
    #[inline]
    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }

    /// Returns a mutable reference to the value. The borrow proves no
    /// other thread can observe the cell, so no atomics are involved.
    #[inline]
    pub const fn get_mut(&mut self) -> &mut T {
        self.value.get_mut()
    }
}

/// Whether `size` bytes can be carried by a single interlocked instruction
/// on the compilation target.
const fn native_width(size: usize) -> bool {
    #[cfg(any(target_arch = "x86", target_arch = "x86_64", target_arch = "aarch64"))]
    {
        #[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
        {
            if size == 8 {
                return true;
            }
        }
        return matches!(size, 1 | 2 | 4);
    }
    #[cfg(not(any(target_arch = "x86", target_arch = "x86_64", target_arch = "aarch64")))]
    {
        let _ = size;
        false
    }
}

/// Routes a call to the width-matched [`raw::RawWord`] implementor and
/// falls through when `$t` has no native width. The branches are constant
/// per monomorphization; the optimizer keeps exactly one.
#[cfg_attr(
    not(any(target_arch = "x86", target_arch = "x86_64", target_arch = "aarch64")),
    allow(unused_macros)
)]
macro_rules! route_native {
    ($t:ty, $self:ident . $method:ident ( $($arg:expr),* )) => {
        #[cfg(any(target_arch = "x86", target_arch = "x86_64", target_arch = "aarch64"))]
        {
            if const { size_of::<$t>() == 1 } {
                // SAFETY: the cell's size and alignment match the word.
                return unsafe { $self.$method::<u8>($($arg),*) };
            }
            if const { size_of::<$t>() == 2 && align_of::<$t>() >= 2 } {
                // SAFETY: as above.
                return unsafe { $self.$method::<u16>($($arg),*) };
            }
            if const { size_of::<$t>() == 4 && align_of::<$t>() >= 4 } {
                // SAFETY: as above.
                return unsafe { $self.$method::<u32>($($arg),*) };
            }
            #[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
            {
                if const { size_of::<$t>() == 8 && align_of::<$t>() >= 8 } {
                    // SAFETY: as above.
                    return unsafe { $self.$method::<u64>($($arg),*) };
                }
            }
        }
    };
}

impl<T: Copy> Atomic<T> {
    /// Whether operations on any `Atomic<T>` of this `T` are lock-free.
    ///
    /// True when `T` is exactly one machine word wide and at least that
    /// aligned. An under-aligned `T` of native size is emulated; the
    /// interlocked instructions require natural alignment.
    #[inline]
    pub const fn is_always_lock_free() -> bool {
        native_width(size_of::<T>()) && align_of::<T>() >= size_of::<T>()
    }

    /// Whether operations on this cell are lock-free. Equivalent to
    /// [`is_always_lock_free`](Self::is_always_lock_free); the cell's
    /// placement never demotes a lock-free width.
    #[inline]
    pub const fn is_lock_free(&self) -> bool {
        Self::is_always_lock_free()
    }

    /// Atomically loads the value.
    ///
    /// `order` must be a load ordering; release-class orderings are
    /// rejected by a debug assertion.
    #[inline]
    pub fn load(&self, order: MemoryOrder) -> T {
        debug_assert!(order.is_load_order());
        route_native!(T, self.native_load(order));
        // SAFETY: self owns the cell and routes every access here.
        unsafe { fallback::load(self.value.get(), order) }
    }

    /// Atomically stores `value`.
    ///
    /// `order` must be a store ordering; acquire-class orderings are
    /// rejected by a debug assertion.
    #[inline]
    pub fn store(&self, value: T, order: MemoryOrder) {
        debug_assert!(order.is_store_order());
        route_native!(T, self.native_store(value, order));
        // SAFETY: self owns the cell and routes every access here.
        unsafe { fallback::store(self.value.get(), value, order) }
    }

    /// Atomically replaces the value, returning the previous one.
    #[inline]
    pub fn swap(&self, value: T, order: MemoryOrder) -> T {
        route_native!(T, self.native_swap(value, order));
        // SAFETY: self owns the cell and routes every access here.
        unsafe { fallback::swap(self.value.get(), value, order) }
    }

    /// Atomically replaces the value with `desired` if the current value
    /// is bitwise equal to `current`.
    ///
    /// Returns the previous value: `Ok` if the exchange happened, `Err`
    /// with the observed value otherwise. `failure` must be a load
    /// ordering.
    #[inline]
    pub fn compare_exchange(
        &self,
        current: T,
        desired: T,
        success: MemoryOrder,
        failure: MemoryOrder,
    ) -> Result<T, T> {
        debug_assert!(failure.is_load_order());
        route_native!(T, self.native_compare_exchange(current, desired));
        // SAFETY: self owns the cell and routes every access here.
        unsafe { fallback::compare_exchange(self.value.get(), current, desired, success, failure) }
    }

    /// [`compare_exchange`](Self::compare_exchange) that is additionally
    /// allowed to fail spuriously.
    ///
    /// Neither the hardware path nor the emulation actually fails
    /// spuriously on the supported targets, but callers must treat this as
    /// if it could and retry in a loop.
    #[inline]
    pub fn compare_exchange_weak(
        &self,
        current: T,
        desired: T,
        success: MemoryOrder,
        failure: MemoryOrder,
    ) -> Result<T, T> {
        self.compare_exchange(current, desired, success, failure)
    }

    /// Blocks until the value is bitwise unequal to `current`.
    ///
    /// The comparison load uses `order`, which must be a load ordering.
    /// Spurious OS wakeups are absorbed internally; when this returns, a
    /// load with `order` observed a differing value.
    pub fn wait(&self, current: T, order: MemoryOrder) {
        debug_assert!(order.is_load_order());
        for _ in 0..WAIT_SPIN_ROUNDS {
            if !byte_eq(&self.load(order), &current) {
                return;
            }
            pause();
        }
        let entry = wait::entry_for(self.value.get() as usize);
        loop {
            if !byte_eq(&self.load(order), &current) {
                return;
            }
            entry.register();
            if const { Self::cell_waitable() } {
                // Re-check after announcing ourselves; a notify landing
                // between the check and the block is caught by the
                // platform's value comparison on the cell itself.
                if byte_eq(&self.load(order), &current) {
                    // SAFETY: current lives across the call and T is plain
                    // bytes.
                    let expected = unsafe {
                        core::slice::from_raw_parts(
                            (&raw const current).cast::<u8>(),
                            size_of::<T>(),
                        )
                    };
                    // SAFETY: the cell is valid and naturally aligned for
                    // the whole wait.
                    unsafe { wait::platform::wait_on_address(self.value.get().cast(), expected) };
                }
            } else {
                // The platform cannot compare T's width, so block on the
                // bucket's generation word. Reading the generation before
                // the re-check means a notify landing afterwards bumps it
                // and the block returns immediately.
                let generation = entry.generation();
                if byte_eq(&self.load(order), &current) {
                    let expected = generation.to_ne_bytes();
                    // SAFETY: the generation word is static.
                    unsafe {
                        wait::platform::wait_on_address(entry.generation_ptr().cast(), &expected)
                    };
                }
            }
            entry.unregister();
        }
    }

    /// Wakes at most one thread blocked in [`wait`](Self::wait) on this
    /// cell.
    ///
    /// When no thread is registered as waiting, this returns without an OS
    /// call. Cells the platform cannot wait on directly share a wake word
    /// per bucket, so a single notify may wake waiters of unrelated cells;
    /// they re-check and block again.
    pub fn notify_one(&self) {
        let entry = wait::entry_for(self.value.get() as usize);
        entry.advance_generation();
        if !entry.has_waiters() {
            return;
        }
        if const { Self::cell_waitable() } {
            wait::platform::wake_one(self.value.get().cast_const().cast());
        } else {
            // Shared word: must wake everyone so the right waiter runs.
            wait::platform::wake_all(entry.generation_ptr().cast());
        }
    }

    /// Wakes every thread blocked in [`wait`](Self::wait) on this cell.
    ///
    /// As with [`notify_one`](Self::notify_one), no OS call is made when
    /// no waiter is registered.
    pub fn notify_all(&self) {
        let entry = wait::entry_for(self.value.get() as usize);
        entry.advance_generation();
        if !entry.has_waiters() {
            return;
        }
        if const { Self::cell_waitable() } {
            wait::platform::wake_all(self.value.get().cast_const().cast());
        } else {
            wait::platform::wake_all(entry.generation_ptr().cast());
        }
    }

    /// Whether waiters can block on the cell's own bytes rather than the
    /// shared generation word.
    const fn cell_waitable() -> bool {
        Self::is_always_lock_free() && wait::platform::can_wait_on_cell(size_of::<T>())
    }
}

/// The interlocked implementations behind `route_native!`. Orderings with
/// no direct instruction form are synthesized: acquire loads as a relaxed
/// load plus an acquire fence, release stores as a release fence plus a
/// relaxed store. The read-modify-write instructions are full barriers and
/// satisfy every requested ordering as-is.
#[cfg(any(target_arch = "x86", target_arch = "x86_64", target_arch = "aarch64"))]
impl<T: Copy> Atomic<T> {
    #[inline(always)]
    fn word_ptr(&self) -> core::ptr::NonNull<()> {
        core::ptr::NonNull::from(&self.value).cast()
    }

    /// # Safety
    ///
    /// `W` must match `T`'s size and the cell must be aligned to `W`.
    #[inline(always)]
    unsafe fn native_load<W: raw::RawWord>(&self, order: MemoryOrder) -> T {
        let ptr = self.word_ptr();
        let word = if order == MemoryOrder::SeqCst {
            // SAFETY: caller guarantees width and alignment; the cell is
            // valid for the lifetime of self.
            unsafe { W::load_seq_cst(ptr) }
        } else {
            // SAFETY: as above.
            let word = unsafe { W::load_relaxed(ptr) };
            if order.needs_acquire() {
                fence(Ordering::Acquire);
            }
            word
        };
        bits::from_bits(word)
    }

    /// # Safety
    ///
    /// Same contract as [`native_load`](Self::native_load).
    #[inline(always)]
    unsafe fn native_store<W: raw::RawWord>(&self, value: T, order: MemoryOrder) {
        let ptr = self.word_ptr();
        let word: W = bits::to_bits(value);
        if order == MemoryOrder::SeqCst {
            // SAFETY: caller guarantees width and alignment.
            unsafe { W::store_seq_cst(ptr, word) };
        } else {
            if order.needs_release() {
                fence(Ordering::Release);
            }
            // SAFETY: as above.
            unsafe { W::store_relaxed(ptr, word) };
        }
    }

    /// # Safety
    ///
    /// Same contract as [`native_load`](Self::native_load).
    #[inline(always)]
    unsafe fn native_swap<W: raw::RawWord>(&self, value: T, order: MemoryOrder) -> T {
        // The exchange instruction is a full barrier; no ordering needs
        // strengthening.
        let _ = order;
        // SAFETY: caller guarantees width and alignment.
        bits::from_bits(unsafe { W::exchange(self.word_ptr(), bits::to_bits(value)) })
    }

    /// # Safety
    ///
    /// Same contract as [`native_load`](Self::native_load).
    #[inline(always)]
    unsafe fn native_compare_exchange<W: raw::RawWord>(
        &self,
        current: T,
        desired: T,
    ) -> Result<T, T> {
        let expected: W = bits::to_bits(current);
        // SAFETY: caller guarantees width and alignment.
        let observed =
            unsafe { W::compare_exchange(self.word_ptr(), expected, bits::to_bits(desired)) };
        if observed == expected {
            Ok(bits::from_bits(observed))
        } else {
            Err(bits::from_bits(observed))
        }
    }

    /// # Safety
    ///
    /// Same contract as [`native_load`](Self::native_load).
    #[inline(always)]
    unsafe fn native_fetch_add<W: raw::RawWord>(&self, value: T) -> T {
        // SAFETY: caller guarantees width and alignment.
        bits::from_bits(unsafe { W::fetch_add(self.word_ptr(), bits::to_bits(value)) })
    }

    /// # Safety
    ///
    /// Same contract as [`native_load`](Self::native_load).
    #[inline(always)]
    unsafe fn native_fetch_and<W: raw::RawWord>(&self, value: T) -> T {
        // SAFETY: caller guarantees width and alignment.
        bits::from_bits(unsafe { W::fetch_and(self.word_ptr(), bits::to_bits(value)) })
    }

    /// # Safety
    ///
    /// Same contract as [`native_load`](Self::native_load).
    #[inline(always)]
    unsafe fn native_fetch_or<W: raw::RawWord>(&self, value: T) -> T {
        // SAFETY: caller guarantees width and alignment.
        bits::from_bits(unsafe { W::fetch_or(self.word_ptr(), bits::to_bits(value)) })
    }

    /// # Safety
    ///
    /// Same contract as [`native_load`](Self::native_load).
    #[inline(always)]
    unsafe fn native_fetch_xor<W: raw::RawWord>(&self, value: T) -> T {
        // SAFETY: caller guarantees width and alignment.
        bits::from_bits(unsafe { W::fetch_xor(self.word_ptr(), bits::to_bits(value)) })
    }
}

macro_rules! atomic_integer_ops {
    ($($t:ty),* $(,)?) => {$(
        impl Atomic<$t> {
            /// Atomically adds, wrapping on overflow. Returns the previous
            /// value.
            #[inline]
            pub fn fetch_add(&self, value: $t, order: MemoryOrder) -> $t {
                route_native!($t, self.native_fetch_add(value));
                // SAFETY: self owns the cell and routes every access here.
                unsafe {
                    fallback::read_modify_write(self.value.get(), order, |v| {
                        v.wrapping_add(value)
                    })
                }
            }

            /// Atomically subtracts, wrapping on overflow. Returns the
            /// previous value.
            #[inline]
            pub fn fetch_sub(&self, value: $t, order: MemoryOrder) -> $t {
                self.fetch_add(value.wrapping_neg(), order)
            }

            /// Atomically applies bitwise AND. Returns the previous value.
            #[inline]
            pub fn fetch_and(&self, value: $t, order: MemoryOrder) -> $t {
                route_native!($t, self.native_fetch_and(value));
                // SAFETY: self owns the cell and routes every access here.
                unsafe { fallback::read_modify_write(self.value.get(), order, |v| v & value) }
            }

            /// Atomically applies bitwise OR. Returns the previous value.
            #[inline]
            pub fn fetch_or(&self, value: $t, order: MemoryOrder) -> $t {
                route_native!($t, self.native_fetch_or(value));
                // SAFETY: self owns the cell and routes every access here.
                unsafe { fallback::read_modify_write(self.value.get(), order, |v| v | value) }
            }

            /// Atomically applies bitwise XOR. Returns the previous value.
            #[inline]
            pub fn fetch_xor(&self, value: $t, order: MemoryOrder) -> $t {
                route_native!($t, self.native_fetch_xor(value));
                // SAFETY: self owns the cell and routes every access here.
                unsafe { fallback::read_modify_write(self.value.get(), order, |v| v ^ value) }
            }
        }
    )*};
}

atomic_integer_ops!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize);

macro_rules! atomic_float_ops {
    ($($t:ty),* $(,)?) => {$(
        impl Atomic<$t> {
            /// Atomically adds via a compare-exchange loop. Returns the
            /// previous value. The loop compares bitwise, so it makes
            /// progress through NaNs.
            #[inline]
            pub fn fetch_add(&self, value: $t, order: MemoryOrder) -> $t {
                let mut current = self.load(MemoryOrder::Relaxed);
                loop {
                    match self.compare_exchange_weak(
                        current,
                        current + value,
                        order,
                        MemoryOrder::Relaxed,
                    ) {
                        Ok(previous) => return previous,
                        Err(observed) => current = observed,
                    }
                }
            }

            /// Atomically subtracts via a compare-exchange loop. Returns
            /// the previous value.
            #[inline]
            pub fn fetch_sub(&self, value: $t, order: MemoryOrder) -> $t {
                self.fetch_add(-value, order)
            }
        }
    )*};
}

atomic_float_ops!(f32, f64);

impl<P> Atomic<*mut P> {
    /// Atomically advances the pointer by `count` elements of `P`,
    /// wrapping on address-space overflow. Returns the previous pointer.
    #[inline]
    pub fn fetch_ptr_add(&self, count: usize, order: MemoryOrder) -> *mut P {
        self.fetch_byte_offset(count.wrapping_mul(size_of::<P>()), order, false)
    }

    /// Atomically retreats the pointer by `count` elements of `P`,
    /// wrapping on address-space underflow. Returns the previous pointer.
    #[inline]
    pub fn fetch_ptr_sub(&self, count: usize, order: MemoryOrder) -> *mut P {
        self.fetch_byte_offset(count.wrapping_mul(size_of::<P>()), order, true)
    }

    fn fetch_byte_offset(&self, bytes: usize, order: MemoryOrder, negate: bool) -> *mut P {
        let mut current = self.load(MemoryOrder::Relaxed);
        loop {
            let next = if negate {
                current.wrapping_byte_sub(bytes)
            } else {
                current.wrapping_byte_add(bytes)
            };
            match self.compare_exchange_weak(current, next, order, MemoryOrder::Relaxed) {
                Ok(previous) => return previous,
                Err(observed) => current = observed,
            }
        }
    }
}

impl<T: Copy> From<T> for Atomic<T> {
    #[inline]
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T: Copy + Default> Default for Atomic<T> {
    #[inline]
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Copy + fmt::Debug> fmt::Debug for Atomic<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Atomic")
            .field(&self.load(MemoryOrder::SeqCst))
            .finish()
    }
}
