// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Memory orderings and the compare-exchange ordering fold.

/// Memory ordering requested for an atomic operation.
///
/// The orderings form the usual model: [`SeqCst`] operations across all
/// atomics observe one global total order; a [`Release`] store that is read
/// by an [`Acquire`] load on the same object forms a synchronizes-with
/// edge; [`Relaxed`] guarantees atomicity and nothing else. [`Consume`] is
/// treated as [`Acquire`].
///
/// Store-only operations reject acquire-class orderings and load-only
/// operations reject release-class orderings. Violations are debug-time
/// assertions; release builds treat the order as given and the resulting
/// synchronization is unspecified.
///
/// [`SeqCst`]: MemoryOrder::SeqCst
/// [`Release`]: MemoryOrder::Release
/// [`Acquire`]: MemoryOrder::Acquire
/// [`Relaxed`]: MemoryOrder::Relaxed
/// [`Consume`]: MemoryOrder::Consume
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum MemoryOrder {
    /// Atomicity only; no synchronization.
    Relaxed,
    /// Dependency-ordered load; promoted to [`Acquire`](MemoryOrder::Acquire).
    Consume,
    /// Later reads and writes cannot be reordered before this load.
    Acquire,
    /// Earlier reads and writes cannot be reordered after this store.
    Release,
    /// Both [`Acquire`](MemoryOrder::Acquire) and
    /// [`Release`](MemoryOrder::Release); for read-modify-write operations.
    AcqRel,
    /// Sequentially consistent; the default idiom throughout this crate.
    SeqCst,
}

impl MemoryOrder {
    /// Position in the strength lattice
    /// relaxed < consume/acquire < release < acquire-release < sequential.
    #[inline(always)]
    const fn rank(self) -> u8 {
        match self {
            MemoryOrder::Relaxed => 0,
            MemoryOrder::Consume | MemoryOrder::Acquire => 1,
            MemoryOrder::Release => 2,
            MemoryOrder::AcqRel => 3,
            MemoryOrder::SeqCst => 4,
        }
    }

    /// Folds a compare-exchange (success, failure) ordering pair into the
    /// single ordering that dominates both.
    ///
    /// The failure ordering must not request a release-class effect; that
    /// is a precondition of compare-exchange, not something this function
    /// repairs.
    #[inline]
    #[must_use]
    pub const fn combine(success: MemoryOrder, failure: MemoryOrder) -> MemoryOrder {
        debug_assert!(failure.is_load_order());
        if failure.rank() > success.rank() {
            failure
        } else {
            success
        }
    }

    /// Whether this ordering is legal for a load-only operation.
    #[inline(always)]
    pub(crate) const fn is_load_order(self) -> bool {
        matches!(
            self,
            MemoryOrder::Relaxed
                | MemoryOrder::Consume
                | MemoryOrder::Acquire
                | MemoryOrder::SeqCst
        )
    }

    /// Whether this ordering is legal for a store-only operation.
    #[inline(always)]
    pub(crate) const fn is_store_order(self) -> bool {
        matches!(
            self,
            MemoryOrder::Relaxed | MemoryOrder::Release | MemoryOrder::SeqCst
        )
    }

    /// Whether the operation must behave as an acquire.
    #[inline(always)]
    pub(crate) const fn needs_acquire(self) -> bool {
        matches!(
            self,
            MemoryOrder::Consume | MemoryOrder::Acquire | MemoryOrder::AcqRel | MemoryOrder::SeqCst
        )
    }

    /// Whether the operation must behave as a release.
    #[inline(always)]
    pub(crate) const fn needs_release(self) -> bool {
        matches!(
            self,
            MemoryOrder::Release | MemoryOrder::AcqRel | MemoryOrder::SeqCst
        )
    }

    /// The closest `core` fence ordering; used for the synthesized fences
    /// around relaxed hardware accesses.
    #[inline(always)]
    pub(crate) const fn fence_order(self) -> Option<core::sync::atomic::Ordering> {
        match self {
            MemoryOrder::Relaxed => None,
            MemoryOrder::Consume | MemoryOrder::Acquire => {
                Some(core::sync::atomic::Ordering::Acquire)
            }
            MemoryOrder::Release => Some(core::sync::atomic::Ordering::Release),
            MemoryOrder::AcqRel => Some(core::sync::atomic::Ordering::AcqRel),
            MemoryOrder::SeqCst => Some(core::sync::atomic::Ordering::SeqCst),
        }
    }
}
