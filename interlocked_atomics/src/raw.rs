// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Hardware interlocked operations for the natively supported widths.
//!
//! Each machine word (1, 2, 4 and 8 bytes) gets one implementation of
//! [`RawWord`], macro-generated from per-architecture inline assembly
//! templates. The templates keep each operation at the minimal instruction
//! sequence its ordering requires:
//!
//! - relaxed loads and stores are plain `mov`/`ldr`/`str`;
//! - sequentially consistent loads are plain on x86 (the total order is
//!   carried by the fence on the store side) and `ldr` + `dmb ish` on
//!   aarch64;
//! - sequentially consistent stores are `mov` + `mfence` on x86 and
//!   `dmb ish`/`str`/`dmb ish` on aarch64;
//! - exchange, compare-exchange and the integer fetch operations are
//!   full-barrier (`lock`-prefixed instructions on x86, `dmb` around
//!   `ldxr`/`stxr` loops on aarch64) and therefore satisfy every ordering
//!   a caller can request.
//!
//! There is no native acquire-load form here; `Atomic<T>` synthesizes
//! acquire loads from a relaxed load plus an acquire fence, and release
//! stores from a release fence plus a relaxed store.
//!
//! 8-byte operations exist only on 64-bit targets. Widths without an
//! implementation of [`RawWord`] are handled by the spinlock emulation in
//! [`crate::fallback`].

use core::ptr::NonNull;

/// One machine word's worth of interlocked operations.
///
/// This is the compile-time strategy seam between `Atomic<T>` and the
/// hardware: `Atomic<T>` picks the implementor whose width matches `T`, or
/// falls back to the lock table when none does.
///
/// # Safety
///
/// Every method requires `ptr` to be non-null, valid for reads and writes
/// of `Self`, and aligned to `Self`. The pointed-to memory must only ever
/// be accessed through these operations (or plain accesses strictly
/// before/after all sharing), never through `core::sync::atomic` types.
pub(crate) trait RawWord: Copy + Eq {
    unsafe fn load_relaxed(ptr: NonNull<()>) -> Self;
    unsafe fn load_seq_cst(ptr: NonNull<()>) -> Self;
    unsafe fn store_relaxed(ptr: NonNull<()>, val: Self);
    unsafe fn store_seq_cst(ptr: NonNull<()>, val: Self);
    unsafe fn exchange(ptr: NonNull<()>, val: Self) -> Self;
    /// Returns the observed value; the exchange happened iff it equals
    /// `expected`.
    unsafe fn compare_exchange(ptr: NonNull<()>, expected: Self, desired: Self) -> Self;
    unsafe fn fetch_add(ptr: NonNull<()>, val: Self) -> Self;
    unsafe fn fetch_and(ptr: NonNull<()>, val: Self) -> Self;
    unsafe fn fetch_or(ptr: NonNull<()>, val: Self) -> Self;
    unsafe fn fetch_xor(ptr: NonNull<()>, val: Self) -> Self;
}

/// Generates one bitwise read-modify-write method: a `lock; cmpxchg` retry
/// loop on x86 and a `ldxr`/`stxr` retry loop on aarch64. `fetch_add` is
/// not generated here because x86 has the dedicated `xadd` instruction.
macro_rules! bitwise_rmw {
    (
        $fname:ident, $x86_op:literal, $a64_op:literal,
        x86: ($($x86:tt)*), class: $rc:ident, v: $v:literal, acc: $acc:tt,
        a64: sfx: $sfx:literal, w: $w:literal
    ) => {
        #[inline(always)]
        unsafe fn $fname(ptr: NonNull<()>, val: Self) -> Self {
            let res: Self;

            #[cfg($($x86)*)]
            // SAFETY: caller upholds the `RawWord` contract.
            unsafe {
                core::arch::asm!(
                    concat!("mov ", $acc, ", [{ptr}]"),
                    concat!("2: mov {scratch", $v, "}, ", $acc),
                    concat!($x86_op, " {scratch", $v, "}, {val", $v, "}"),
                    concat!("lock; cmpxchg [{ptr}], {scratch", $v, "}"),
                    "jnz 2b",
                    // CMPXCHG compares against the accumulator register.
                    out($acc) res,
                    scratch = out($rc) _,
                    ptr = in(reg) ptr.as_ptr(),
                    val = in($rc) val,
                    options(nostack)
                );
            }

            #[cfg(target_arch = "aarch64")]
            // SAFETY: caller upholds the `RawWord` contract.
            unsafe {
                core::arch::asm!(
                    "dmb ish",
                    "2:",
                    concat!("ldxr", $sfx, " {res", $w, "}, [{ptr}]"),
                    concat!($a64_op, " {scratch1", $w, "}, {res", $w, "}, {val", $w, "}"),
                    concat!("stxr", $sfx, " {scratch2:w}, {scratch1", $w, "}, [{ptr}]"),
                    "cbnz {scratch2:w}, 2b",
                    "dmb ish",
                    res = out(reg) res,
                    scratch1 = out(reg) _,
                    scratch2 = out(reg) _,
                    ptr = in(reg) ptr.as_ptr(),
                    val = in(reg) val,
                    options(nostack)
                );
            }

            res
        }
    };
}

/// Implements [`RawWord`] for one unsigned integer width.
///
/// `x86` carries the cfg predicate for the x86 family (plain
/// `target_arch = "x86_64"` for the 8-byte width), the operand register
/// class, the template modifier and the accumulator register name. `a64`
/// carries the `ldxr`/`stxr` suffix, the register-view modifier and the
/// instruction that widens the expected compare-exchange operand.
macro_rules! interlocked_word {
    (
        $int:ty,
        x86: ($($x86:tt)*), class: $rc:ident, v: $v:literal, acc: $acc:tt,
        a64: sfx: $sfx:literal, w: $w:literal, widen: $widen:literal
    ) => {
        #[cfg(any($($x86)*, target_arch = "aarch64"))]
        impl RawWord for $int {
            #[inline(always)]
            unsafe fn load_relaxed(ptr: NonNull<()>) -> Self {
                let z: $int;

                #[cfg($($x86)*)]
                // SAFETY: caller upholds the `RawWord` contract.
                unsafe {
                    core::arch::asm!(
                        concat!("mov {val", $v, "}, [{ptr}]"),
                        ptr = in(reg) ptr.as_ptr(),
                        val = lateout($rc) z,
                        options(preserves_flags, nostack, readonly)
                    );
                }

                #[cfg(target_arch = "aarch64")]
                // SAFETY: caller upholds the `RawWord` contract.
                unsafe {
                    core::arch::asm!(
                        concat!("ldr", $sfx, " {val", $w, "}, [{ptr}]"),
                        ptr = in(reg) ptr.as_ptr(),
                        val = lateout(reg) z,
                        options(preserves_flags, nostack, readonly)
                    );
                }

                z
            }

            #[inline(always)]
            unsafe fn load_seq_cst(ptr: NonNull<()>) -> Self {
                let z: $int;

                // Sequential loads need no fence on x86; the total order is
                // enforced by the MFENCE on the sequential store side.
                #[cfg($($x86)*)]
                // SAFETY: caller upholds the `RawWord` contract.
                unsafe {
                    core::arch::asm!(
                        concat!("mov {val", $v, "}, [{ptr}]"),
                        ptr = in(reg) ptr.as_ptr(),
                        val = lateout($rc) z,
                        options(preserves_flags, nostack, readonly)
                    );
                }

                #[cfg(target_arch = "aarch64")]
                // SAFETY: caller upholds the `RawWord` contract.
                unsafe {
                    core::arch::asm!(
                        concat!("ldr", $sfx, " {val", $w, "}, [{ptr}]"),
                        "dmb ish",
                        ptr = in(reg) ptr.as_ptr(),
                        val = lateout(reg) z,
                        options(preserves_flags, nostack, readonly)
                    );
                }

                z
            }

            #[inline(always)]
            unsafe fn store_relaxed(ptr: NonNull<()>, val: Self) {
                #[cfg($($x86)*)]
                // SAFETY: caller upholds the `RawWord` contract.
                unsafe {
                    core::arch::asm!(
                        concat!("mov [{ptr}], {val", $v, "}"),
                        ptr = in(reg) ptr.as_ptr(),
                        val = in($rc) val,
                        options(preserves_flags, nostack)
                    );
                }

                #[cfg(target_arch = "aarch64")]
                // SAFETY: caller upholds the `RawWord` contract.
                unsafe {
                    core::arch::asm!(
                        concat!("str", $sfx, " {val", $w, "}, [{ptr}]"),
                        ptr = in(reg) ptr.as_ptr(),
                        val = in(reg) val,
                        options(preserves_flags, nostack)
                    );
                }
            }

            #[inline(always)]
            unsafe fn store_seq_cst(ptr: NonNull<()>, val: Self) {
                #[cfg($($x86)*)]
                // SAFETY: caller upholds the `RawWord` contract.
                unsafe {
                    core::arch::asm!(
                        concat!("mov [{ptr}], {val", $v, "}"),
                        "mfence",
                        ptr = in(reg) ptr.as_ptr(),
                        val = in($rc) val,
                        options(preserves_flags, nostack)
                    );
                }

                #[cfg(target_arch = "aarch64")]
                // SAFETY: caller upholds the `RawWord` contract.
                unsafe {
                    core::arch::asm!(
                        "dmb ish",
                        concat!("str", $sfx, " {val", $w, "}, [{ptr}]"),
                        "dmb ish",
                        ptr = in(reg) ptr.as_ptr(),
                        val = in(reg) val,
                        options(preserves_flags, nostack)
                    );
                }
            }

            #[inline(always)]
            unsafe fn exchange(ptr: NonNull<()>, val: Self) -> Self {
                let mut val = val;

                #[cfg($($x86)*)]
                // SAFETY: caller upholds the `RawWord` contract.
                unsafe {
                    core::arch::asm!(
                        concat!("xchg [{ptr}], {val", $v, "}"),
                        ptr = in(reg) ptr.as_ptr(),
                        val = inout($rc) val,
                        options(preserves_flags, nostack)
                    );
                }

                #[cfg(target_arch = "aarch64")]
                // SAFETY: caller upholds the `RawWord` contract.
                unsafe {
                    let res: $int;
                    core::arch::asm!(
                        "dmb ish",
                        "2:",
                        concat!("ldxr", $sfx, " {res", $w, "}, [{ptr}]"),
                        concat!("stxr", $sfx, " {scratch:w}, {val", $w, "}, [{ptr}]"),
                        "cbnz {scratch:w}, 2b",
                        "dmb ish",
                        res = out(reg) res,
                        scratch = out(reg) _,
                        ptr = in(reg) ptr.as_ptr(),
                        val = in(reg) val,
                        options(nostack)
                    );
                    val = res;
                }

                val
            }

            #[inline(always)]
            unsafe fn compare_exchange(
                ptr: NonNull<()>,
                expected: Self,
                desired: Self,
            ) -> Self {
                let mut old = expected;

                #[cfg($($x86)*)]
                // SAFETY: caller upholds the `RawWord` contract.
                unsafe {
                    core::arch::asm!(
                        concat!("lock; cmpxchg [{ptr}], {new", $v, "}"),
                        // CMPXCHG compares against the accumulator register.
                        inout($acc) old,
                        ptr = in(reg) ptr.as_ptr(),
                        new = in($rc) desired,
                        options(nostack)
                    );
                }

                #[cfg(target_arch = "aarch64")]
                // SAFETY: caller upholds the `RawWord` contract.
                unsafe {
                    let res: $int;
                    core::arch::asm!(
                        "dmb ish",
                        "2:",
                        $widen,
                        concat!("ldxr", $sfx, " {res", $w, "}, [{ptr}]"),
                        concat!("cmp {res", $w, "}, {scratch", $w, "}"),
                        "b.ne 3f",
                        concat!("stxr", $sfx, " {scratch:w}, {new", $w, "}, [{ptr}]"),
                        "cbnz {scratch:w}, 2b",
                        "3:",
                        "dmb ish",
                        res = out(reg) res,
                        scratch = out(reg) _,
                        ptr = in(reg) ptr.as_ptr(),
                        old = in(reg) old,
                        new = in(reg) desired,
                        options(nostack)
                    );
                    old = res;
                }

                old
            }

            #[inline(always)]
            unsafe fn fetch_add(ptr: NonNull<()>, val: Self) -> Self {
                let mut val = val;

                #[cfg($($x86)*)]
                // SAFETY: caller upholds the `RawWord` contract.
                unsafe {
                    core::arch::asm!(
                        concat!("lock; xadd [{ptr}], {val", $v, "}"),
                        ptr = in(reg) ptr.as_ptr(),
                        val = inout($rc) val,
                        options(nostack)
                    );
                }

                #[cfg(target_arch = "aarch64")]
                // SAFETY: caller upholds the `RawWord` contract.
                unsafe {
                    let res: $int;
                    core::arch::asm!(
                        "dmb ish",
                        "2:",
                        concat!("ldxr", $sfx, " {res", $w, "}, [{ptr}]"),
                        concat!("add {scratch1", $w, "}, {res", $w, "}, {val", $w, "}"),
                        concat!("stxr", $sfx, " {scratch2:w}, {scratch1", $w, "}, [{ptr}]"),
                        "cbnz {scratch2:w}, 2b",
                        "dmb ish",
                        res = out(reg) res,
                        scratch1 = out(reg) _,
                        scratch2 = out(reg) _,
                        ptr = in(reg) ptr.as_ptr(),
                        val = in(reg) val,
                        options(nostack)
                    );
                    val = res;
                }

                val
            }

            bitwise_rmw!(
                fetch_and, "and", "and",
                x86: ($($x86)*), class: $rc, v: $v, acc: $acc,
                a64: sfx: $sfx, w: $w
            );
            bitwise_rmw!(
                fetch_or, "or", "orr",
                x86: ($($x86)*), class: $rc, v: $v, acc: $acc,
                a64: sfx: $sfx, w: $w
            );
            bitwise_rmw!(
                fetch_xor, "xor", "eor",
                x86: ($($x86)*), class: $rc, v: $v, acc: $acc,
                a64: sfx: $sfx, w: $w
            );
        }
    };
}

interlocked_word!(
    u8,
    x86: (any(target_arch = "x86", target_arch = "x86_64")),
    class: reg_byte, v: "", acc: "al",
    a64: sfx: "b", w: ":w", widen: "uxtb {scratch:w}, {old:w}"
);

interlocked_word!(
    u16,
    x86: (any(target_arch = "x86", target_arch = "x86_64")),
    class: reg, v: ":x", acc: "ax",
    a64: sfx: "h", w: ":w", widen: "uxth {scratch:w}, {old:w}"
);

interlocked_word!(
    u32,
    x86: (any(target_arch = "x86", target_arch = "x86_64")),
    class: reg, v: ":e", acc: "eax",
    a64: sfx: "", w: ":w", widen: "mov {scratch:w}, {old:w}"
);

interlocked_word!(
    u64,
    x86: (target_arch = "x86_64"),
    class: reg, v: ":r", acc: "rax",
    a64: sfx: "", w: ":x", widen: "mov {scratch:x}, {old:x}"
);
