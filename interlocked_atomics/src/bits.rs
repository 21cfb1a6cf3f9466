// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Bit-casts between a value type and the machine word of matching width.
//!
//! The hardware layer only understands unsigned integers; `Atomic<T>`
//! reinterprets `T`'s bytes as the integer of the same size to feed them to
//! the interlocked instructions. These two functions are the single place
//! where that reinterpretation happens.
//!
//! The size match is a debug assertion rather than a compile-time one:
//! the width dispatch in `Atomic<T>` mentions every word type in branches
//! that are constant-false for most `T`, and those dead branches must
//! still type-check and monomorphize.

/// Reinterprets `value`'s bytes as a `W` of identical size.
#[cfg(any(target_arch = "x86", target_arch = "x86_64", target_arch = "aarch64"))]
#[inline(always)]
pub(crate) fn to_bits<T: Copy, W: Copy>(value: T) -> W {
    debug_assert_eq!(size_of::<T>(), size_of::<W>());
    // SAFETY: sizes are equal and both types are trivially copyable.
    unsafe { core::mem::transmute_copy::<T, W>(&value) }
}

/// Reinterprets a machine word back into the value type of identical size.
#[cfg(any(target_arch = "x86", target_arch = "x86_64", target_arch = "aarch64"))]
#[inline(always)]
pub(crate) fn from_bits<W: Copy, T: Copy>(bits: W) -> T {
    debug_assert_eq!(size_of::<T>(), size_of::<W>());
    // SAFETY: sizes are equal and both types are trivially copyable.
    unsafe { core::mem::transmute_copy::<W, T>(&bits) }
}

/// Bitwise equality of two values, padding included.
///
/// Compare-exchange and wait compare representations, not `PartialEq`;
/// this is what lets `Atomic<T>` work for any trivially-copyable `T`.
#[inline]
pub(crate) fn byte_eq<T: Copy>(a: &T, b: &T) -> bool {
    // SAFETY: both references are valid for size_of::<T>() bytes.
    unsafe {
        let a = core::slice::from_raw_parts(a as *const T as *const u8, size_of::<T>());
        let b = core::slice::from_raw_parts(b as *const T as *const u8, size_of::<T>());
        a == b
    }
}
