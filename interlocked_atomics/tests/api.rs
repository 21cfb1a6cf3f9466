// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use interlocked_atomics::*;

#[derive(Copy, Clone, Debug, PartialEq)]
struct Triple {
    a: u64,
    b: u64,
    c: u64,
}

#[test]
fn test_load_store() {
    let a8 = Atomic::new(0u8);
    a8.store(u8::MAX, MemoryOrder::Relaxed);
    assert_eq!(a8.load(MemoryOrder::Relaxed), u8::MAX);

    let a16 = Atomic::new(0u16);
    a16.store(u16::MAX, MemoryOrder::Release);
    assert_eq!(a16.load(MemoryOrder::Acquire), u16::MAX);

    let a32 = Atomic::new(0u32);
    a32.store(u32::MAX, MemoryOrder::SeqCst);
    assert_eq!(a32.load(MemoryOrder::SeqCst), u32::MAX);

    let a64 = Atomic::new(0u64);
    a64.store(u64::MAX, MemoryOrder::SeqCst);
    assert_eq!(a64.load(MemoryOrder::Consume), u64::MAX);

    let a128 = Atomic::new(0u128);
    a128.store(u128::MAX, MemoryOrder::SeqCst);
    assert_eq!(a128.load(MemoryOrder::SeqCst), u128::MAX);
}

#[test]
fn test_load_store_struct() {
    let cell = Atomic::new(Triple { a: 1, b: 2, c: 3 });
    assert_eq!(cell.load(MemoryOrder::SeqCst), Triple { a: 1, b: 2, c: 3 });
    cell.store(Triple { a: 9, b: 8, c: 7 }, MemoryOrder::SeqCst);
    assert_eq!(cell.load(MemoryOrder::Relaxed), Triple { a: 9, b: 8, c: 7 });
}

#[test]
fn test_swap() {
    let cell = Atomic::new(5u32);
    assert_eq!(cell.swap(17, MemoryOrder::SeqCst), 5);
    assert_eq!(cell.swap(0, MemoryOrder::AcqRel), 17);
    assert_eq!(cell.load(MemoryOrder::Relaxed), 0);

    let wide = Atomic::new(Triple { a: 1, b: 1, c: 1 });
    let previous = wide.swap(Triple { a: 2, b: 2, c: 2 }, MemoryOrder::SeqCst);
    assert_eq!(previous, Triple { a: 1, b: 1, c: 1 });
}

#[test]
fn test_compare_exchange() {
    let cell = Atomic::new(10u64);

    assert_eq!(
        cell.compare_exchange(10, 20, MemoryOrder::SeqCst, MemoryOrder::SeqCst),
        Ok(10)
    );
    assert_eq!(
        cell.compare_exchange(10, 30, MemoryOrder::SeqCst, MemoryOrder::Relaxed),
        Err(20)
    );
    assert_eq!(cell.load(MemoryOrder::SeqCst), 20);

    assert_eq!(
        cell.compare_exchange(20, 30, MemoryOrder::Release, MemoryOrder::Acquire),
        Ok(20)
    );
    assert_eq!(cell.load(MemoryOrder::SeqCst), 30);
}

#[test]
fn test_compare_exchange_struct() {
    let cell = Atomic::new(Triple { a: 1, b: 2, c: 3 });
    let next = Triple { a: 4, b: 5, c: 6 };

    assert_eq!(
        cell.compare_exchange(
            Triple { a: 0, b: 2, c: 3 },
            next,
            MemoryOrder::SeqCst,
            MemoryOrder::SeqCst,
        ),
        Err(Triple { a: 1, b: 2, c: 3 })
    );
    assert_eq!(
        cell.compare_exchange(
            Triple { a: 1, b: 2, c: 3 },
            next,
            MemoryOrder::SeqCst,
            MemoryOrder::SeqCst,
        ),
        Ok(Triple { a: 1, b: 2, c: 3 })
    );
    assert_eq!(cell.load(MemoryOrder::SeqCst), next);
}

#[test]
fn test_compare_exchange_weak_retry_loop() {
    let cell = Atomic::new(0u32);
    let mut current = cell.load(MemoryOrder::Relaxed);
    loop {
        match cell.compare_exchange_weak(
            current,
            current + 1,
            MemoryOrder::SeqCst,
            MemoryOrder::Relaxed,
        ) {
            Ok(_) => break,
            Err(observed) => current = observed,
        }
    }
    assert_eq!(cell.load(MemoryOrder::SeqCst), 1);
}

#[test]
fn test_fetch_add_sub() {
    let cell = Atomic::new(10u8);
    assert_eq!(cell.fetch_add(5, MemoryOrder::SeqCst), 10);
    assert_eq!(cell.fetch_sub(3, MemoryOrder::SeqCst), 15);
    assert_eq!(cell.load(MemoryOrder::SeqCst), 12);

    // Wrapping at both ends.
    let cell = Atomic::new(u16::MAX);
    assert_eq!(cell.fetch_add(1, MemoryOrder::SeqCst), u16::MAX);
    assert_eq!(cell.load(MemoryOrder::SeqCst), 0);
    assert_eq!(cell.fetch_sub(1, MemoryOrder::SeqCst), 0);
    assert_eq!(cell.load(MemoryOrder::SeqCst), u16::MAX);

    let cell = Atomic::new(-5i32);
    assert_eq!(cell.fetch_add(3, MemoryOrder::AcqRel), -5);
    assert_eq!(cell.load(MemoryOrder::SeqCst), -2);

    let cell = Atomic::new(1u128 << 100);
    assert_eq!(cell.fetch_add(1, MemoryOrder::SeqCst), 1u128 << 100);
    assert_eq!(cell.load(MemoryOrder::SeqCst), (1u128 << 100) + 1);
}

#[test]
fn test_fetch_bitops() {
    let cell = Atomic::new(0b1100u32);
    assert_eq!(cell.fetch_and(0b1010, MemoryOrder::SeqCst), 0b1100);
    assert_eq!(cell.fetch_or(0b0001, MemoryOrder::SeqCst), 0b1000);
    assert_eq!(cell.fetch_xor(0b1111, MemoryOrder::SeqCst), 0b1001);
    assert_eq!(cell.load(MemoryOrder::SeqCst), 0b0110);

    let cell = Atomic::new(u64::MAX);
    assert_eq!(cell.fetch_and(0xFF, MemoryOrder::Relaxed), u64::MAX);
    assert_eq!(cell.load(MemoryOrder::Relaxed), 0xFF);

    let cell = Atomic::new(0u128);
    assert_eq!(cell.fetch_or(u128::MAX, MemoryOrder::SeqCst), 0);
    assert_eq!(cell.fetch_xor(u128::MAX, MemoryOrder::SeqCst), u128::MAX);
    assert_eq!(cell.load(MemoryOrder::SeqCst), 0);
}

#[test]
fn test_fetch_float() {
    let cell = Atomic::new(1.5f32);
    assert_eq!(cell.fetch_add(2.0, MemoryOrder::SeqCst), 1.5);
    assert_eq!(cell.fetch_sub(0.5, MemoryOrder::SeqCst), 3.5);
    assert_eq!(cell.load(MemoryOrder::SeqCst), 3.0);

    let cell = Atomic::new(f64::NAN);
    // The compare-exchange loop must terminate even though NaN != NaN.
    let previous = cell.fetch_add(1.0, MemoryOrder::SeqCst);
    assert!(previous.is_nan());
    assert!(cell.load(MemoryOrder::SeqCst).is_nan());
}

#[test]
fn test_fetch_ptr() {
    let mut array = [0u64; 8];
    let base: *mut u64 = array.as_mut_ptr();
    let cell = Atomic::new(base);

    assert_eq!(cell.fetch_ptr_add(3, MemoryOrder::SeqCst), base);
    assert_eq!(cell.load(MemoryOrder::SeqCst), unsafe { base.add(3) });
    assert_eq!(cell.fetch_ptr_sub(2, MemoryOrder::SeqCst), unsafe {
        base.add(3)
    });
    assert_eq!(cell.load(MemoryOrder::SeqCst), unsafe { base.add(1) });
}

#[test]
fn test_lock_freedom() {
    assert!(Atomic::<u8>::is_always_lock_free());
    assert!(Atomic::<u16>::is_always_lock_free());
    assert!(Atomic::<u32>::is_always_lock_free());
    assert!(Atomic::<f32>::is_always_lock_free());
    assert!(Atomic::<*mut u8>::is_always_lock_free());
    #[cfg(target_pointer_width = "64")]
    assert!(Atomic::<u64>::is_always_lock_free());

    assert!(!Atomic::<u128>::is_always_lock_free());
    assert!(!Atomic::<[u8; 3]>::is_always_lock_free());
    assert!(!Atomic::<Triple>::is_always_lock_free());
    // Native size but sub-natural alignment.
    assert!(!Atomic::<[u16; 2]>::is_always_lock_free());

    let cell = Atomic::new(0u32);
    assert_eq!(cell.is_lock_free(), Atomic::<u32>::is_always_lock_free());
}

#[test]
fn test_order_combine() {
    use MemoryOrder::*;

    assert_eq!(MemoryOrder::combine(Relaxed, Relaxed), Relaxed);
    assert_eq!(MemoryOrder::combine(Relaxed, Acquire), Acquire);
    assert_eq!(MemoryOrder::combine(Release, Acquire), Release);
    assert_eq!(MemoryOrder::combine(AcqRel, Acquire), AcqRel);
    assert_eq!(MemoryOrder::combine(Acquire, SeqCst), SeqCst);
    assert_eq!(MemoryOrder::combine(SeqCst, Relaxed), SeqCst);
    assert_eq!(MemoryOrder::combine(Release, Consume), Release);
}

#[test]
fn test_fences() {
    // Every ordering is accepted; Relaxed is a no-op.
    for order in [
        MemoryOrder::Relaxed,
        MemoryOrder::Consume,
        MemoryOrder::Acquire,
        MemoryOrder::Release,
        MemoryOrder::AcqRel,
        MemoryOrder::SeqCst,
    ] {
        thread_fence(order);
        signal_fence(order);
    }
    pause();
}

#[test]
fn test_wait_returns_on_changed_value() {
    // A wait whose comparison fails immediately must not block.
    let cell = Atomic::new(7u32);
    cell.wait(3, MemoryOrder::SeqCst);

    let wide = Atomic::new(Triple { a: 1, b: 2, c: 3 });
    wide.wait(Triple { a: 0, b: 0, c: 0 }, MemoryOrder::Acquire);
}

#[test]
fn test_value_accessors() {
    let mut cell = Atomic::new(3u32);
    *cell.get_mut() += 1;
    assert_eq!(cell.load(MemoryOrder::Relaxed), 4);
    assert_eq!(cell.into_inner(), 4);

    let cell = Atomic::from(11u8);
    assert_eq!(cell.load(MemoryOrder::Relaxed), 11);

    let cell: Atomic<i64> = Atomic::default();
    assert_eq!(cell.load(MemoryOrder::Relaxed), 0);

    let cell = Atomic::new(42u16);
    assert_eq!(format!("{cell:?}"), "Atomic(42)");
}
