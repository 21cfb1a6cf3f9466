// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Cross-thread behaviour: counters, message passing, emulated-width
//! atomicity and the blocking wait/notify pair.

use std::thread;

use interlocked_atomics::{Atomic, MemoryOrder};

const THREADS: usize = 8;
const ROUNDS: u64 = 10_000;

#[test]
fn counter_increments_are_not_lost() {
    let counter = Atomic::new(0u64);

    thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                for _ in 0..ROUNDS {
                    counter.fetch_add(1, MemoryOrder::Relaxed);
                }
            });
        }
    });

    assert_eq!(counter.load(MemoryOrder::SeqCst), THREADS as u64 * ROUNDS);
}

#[test]
fn release_store_publishes_acquire_load_observes() {
    let data = Atomic::new(0u64);
    let ready = Atomic::new(false);

    thread::scope(|s| {
        s.spawn(|| {
            data.store(0xDEAD_BEEF, MemoryOrder::Relaxed);
            ready.store(true, MemoryOrder::Release);
        });
        s.spawn(|| {
            while !ready.load(MemoryOrder::Acquire) {
                interlocked_atomics::pause();
            }
            assert_eq!(data.load(MemoryOrder::Relaxed), 0xDEAD_BEEF);
        });
    });
}

#[derive(Copy, Clone, Debug, PartialEq)]
struct Triple {
    a: u64,
    b: u64,
    c: u64,
}

/// Concurrent compare-exchange on an emulated width must never expose a
/// torn value: every observed Triple has three equal fields.
#[test]
fn emulated_compare_exchange_is_atomic() {
    let cell = Atomic::new(Triple { a: 0, b: 0, c: 0 });

    thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                for _ in 0..ROUNDS {
                    let mut current = cell.load(MemoryOrder::SeqCst);
                    loop {
                        assert_eq!(current.a, current.b);
                        assert_eq!(current.b, current.c);
                        let next = Triple {
                            a: current.a + 1,
                            b: current.b + 1,
                            c: current.c + 1,
                        };
                        match cell.compare_exchange_weak(
                            current,
                            next,
                            MemoryOrder::SeqCst,
                            MemoryOrder::SeqCst,
                        ) {
                            Ok(_) => break,
                            Err(observed) => current = observed,
                        }
                    }
                }
            });
        }
    });

    let total = THREADS as u64 * ROUNDS;
    assert_eq!(
        cell.load(MemoryOrder::SeqCst),
        Triple {
            a: total,
            b: total,
            c: total
        }
    );
}

/// Emulated swap serializes against concurrent swaps: every handed-out
/// token appears exactly once.
#[test]
fn emulated_swap_exchanges_whole_values() {
    let cell = Atomic::new([0u64; 4]);
    let seen = std::sync::Mutex::new(Vec::new());

    thread::scope(|s| {
        for t in 0..THREADS as u64 {
            let seen = &seen;
            let cell = &cell;
            s.spawn(move || {
                let token = [t + 1; 4];
                let previous = cell.swap(token, MemoryOrder::SeqCst);
                assert_eq!([previous[0]; 4], previous);
                seen.lock().unwrap().push(previous[0]);
            });
        }
    });

    let mut seen = seen.into_inner().unwrap();
    seen.push(cell.load(MemoryOrder::SeqCst)[0]);
    seen.sort_unstable();
    let mut expected: Vec<u64> = (0..=THREADS as u64).collect();
    expected.sort_unstable();
    assert_eq!(seen, expected);
}

#[test]
fn wait_blocks_until_notified() {
    // u32 waits on the cell itself where the platform allows it.
    let flag = Atomic::new(0u32);

    thread::scope(|s| {
        let waiter = s.spawn(|| {
            while flag.load(MemoryOrder::Acquire) == 0 {
                flag.wait(0, MemoryOrder::Acquire);
            }
            flag.load(MemoryOrder::Acquire)
        });

        thread::sleep(std::time::Duration::from_millis(10));
        flag.store(99, MemoryOrder::Release);
        flag.notify_one();

        assert_eq!(waiter.join().unwrap(), 99);
    });
}

#[test]
fn wait_blocks_on_generation_word_widths() {
    // A 24-byte cell always takes the shared-word blocking path.
    let state = Atomic::new(Triple { a: 0, b: 0, c: 0 });
    let target = Triple { a: 1, b: 2, c: 3 };

    thread::scope(|s| {
        let waiter = s.spawn(|| {
            let mut current = state.load(MemoryOrder::Acquire);
            while current == (Triple { a: 0, b: 0, c: 0 }) {
                state.wait(current, MemoryOrder::Acquire);
                current = state.load(MemoryOrder::Acquire);
            }
            current
        });

        thread::sleep(std::time::Duration::from_millis(10));
        state.store(target, MemoryOrder::SeqCst);
        state.notify_all();

        assert_eq!(waiter.join().unwrap(), target);
    });
}

#[test]
fn notify_all_releases_every_waiter() {
    let gate = Atomic::new(0u32);
    let released = Atomic::new(0u32);

    thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                while gate.load(MemoryOrder::Acquire) == 0 {
                    gate.wait(0, MemoryOrder::Acquire);
                }
                released.fetch_add(1, MemoryOrder::Relaxed);
            });
        }

        thread::sleep(std::time::Duration::from_millis(10));
        gate.store(1, MemoryOrder::Release);
        gate.notify_all();
    });

    assert_eq!(released.load(MemoryOrder::SeqCst), THREADS as u32);
}

#[test]
fn producer_consumer_over_wait() {
    let sequence = Atomic::new(0u64);
    let consumed = Atomic::new(0u64);
    const ITEMS: u64 = 1_000;

    thread::scope(|s| {
        s.spawn(|| {
            let mut seen = 0;
            while seen < ITEMS {
                let current = sequence.load(MemoryOrder::Acquire);
                if current == seen {
                    sequence.wait(current, MemoryOrder::Acquire);
                    continue;
                }
                seen = current;
                consumed.store(seen, MemoryOrder::Release);
            }
        });

        s.spawn(|| {
            for next in 1..=ITEMS {
                sequence.store(next, MemoryOrder::Release);
                sequence.notify_one();
            }
        });
    });

    assert_eq!(consumed.load(MemoryOrder::SeqCst), ITEMS);
}
