// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Differential fuzzing of the single-threaded semantics: every operation
//! sequence is applied to an `Atomic` cell and to a plain model value, and
//! the results must agree bit for bit. Exercises both the native widths
//! and the spinlock-emulated 16-byte width.

#![no_main]

use arbitrary::Arbitrary;
use interlocked_atomics::{Atomic, MemoryOrder};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Clone, Copy, Debug)]
enum LoadOrder {
    Relaxed,
    Consume,
    Acquire,
    SeqCst,
}

impl From<LoadOrder> for MemoryOrder {
    fn from(value: LoadOrder) -> Self {
        match value {
            LoadOrder::Relaxed => Self::Relaxed,
            LoadOrder::Consume => Self::Consume,
            LoadOrder::Acquire => Self::Acquire,
            LoadOrder::SeqCst => Self::SeqCst,
        }
    }
}

#[derive(Arbitrary, Clone, Copy, Debug)]
enum StoreOrder {
    Relaxed,
    Release,
    SeqCst,
}

impl From<StoreOrder> for MemoryOrder {
    fn from(value: StoreOrder) -> Self {
        match value {
            StoreOrder::Relaxed => Self::Relaxed,
            StoreOrder::Release => Self::Release,
            StoreOrder::SeqCst => Self::SeqCst,
        }
    }
}

#[derive(Arbitrary, Clone, Copy, Debug)]
enum RmwOrder {
    Relaxed,
    Acquire,
    Release,
    AcqRel,
    SeqCst,
}

impl From<RmwOrder> for MemoryOrder {
    fn from(value: RmwOrder) -> Self {
        match value {
            RmwOrder::Relaxed => Self::Relaxed,
            RmwOrder::Acquire => Self::Acquire,
            RmwOrder::Release => Self::Release,
            RmwOrder::AcqRel => Self::AcqRel,
            RmwOrder::SeqCst => Self::SeqCst,
        }
    }
}

#[derive(Arbitrary, Clone, Copy, Debug)]
enum IntOp<T> {
    Load(LoadOrder),
    Store(T, StoreOrder),
    Swap(T, RmwOrder),
    CompareExchange(T, T, RmwOrder, LoadOrder),
    FetchAdd(T, RmwOrder),
    FetchSub(T, RmwOrder),
    FetchAnd(T, RmwOrder),
    FetchOr(T, RmwOrder),
    FetchXor(T, RmwOrder),
}

macro_rules! run_ops {
    ($t:ty, $initial:expr, $ops:expr) => {{
        let cell = Atomic::new($initial);
        let mut model: $t = $initial;
        for op in $ops {
            match *op {
                IntOp::Load(order) => {
                    assert_eq!(cell.load(order.into()), model);
                }
                IntOp::Store(value, order) => {
                    cell.store(value, order.into());
                    model = value;
                }
                IntOp::Swap(value, order) => {
                    assert_eq!(cell.swap(value, order.into()), model);
                    model = value;
                }
                IntOp::CompareExchange(current, desired, success, failure) => {
                    let result =
                        cell.compare_exchange(current, desired, success.into(), failure.into());
                    if current == model {
                        assert_eq!(result, Ok(model));
                        model = desired;
                    } else {
                        assert_eq!(result, Err(model));
                    }
                }
                IntOp::FetchAdd(value, order) => {
                    assert_eq!(cell.fetch_add(value, order.into()), model);
                    model = model.wrapping_add(value);
                }
                IntOp::FetchSub(value, order) => {
                    assert_eq!(cell.fetch_sub(value, order.into()), model);
                    model = model.wrapping_sub(value);
                }
                IntOp::FetchAnd(value, order) => {
                    assert_eq!(cell.fetch_and(value, order.into()), model);
                    model &= value;
                }
                IntOp::FetchOr(value, order) => {
                    assert_eq!(cell.fetch_or(value, order.into()), model);
                    model |= value;
                }
                IntOp::FetchXor(value, order) => {
                    assert_eq!(cell.fetch_xor(value, order.into()), model);
                    model ^= value;
                }
            }
        }
        assert_eq!(cell.into_inner(), model);
    }};
}

#[derive(Arbitrary, Debug)]
struct Input {
    initial_u8: u8,
    ops_u8: Vec<IntOp<u8>>,
    initial_u32: u32,
    ops_u32: Vec<IntOp<u32>>,
    initial_u64: u64,
    ops_u64: Vec<IntOp<u64>>,
    initial_i16: i16,
    ops_i16: Vec<IntOp<i16>>,
    initial_u128: u128,
    ops_u128: Vec<IntOp<u128>>,
}

fuzz_target!(|input: Input| {
    run_ops!(u8, input.initial_u8, input.ops_u8.iter());
    run_ops!(u32, input.initial_u32, input.ops_u32.iter());
    run_ops!(u64, input.initial_u64, input.ops_u64.iter());
    run_ops!(i16, input.initial_i16, input.ops_i16.iter());
    run_ops!(u128, input.initial_u128, input.ops_u128.iter());
});
