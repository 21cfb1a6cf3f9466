// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The OS wake-call counter. Kept in its own binary: the counter is
//! process-wide and the other suites run wait/notify tests concurrently.

use std::thread;
use std::time::Duration;

use interlocked_atomics::{Atomic, MemoryOrder, os_wake_call_count};

#[test]
fn notify_without_waiters_skips_the_os() {
    let cell = Atomic::new(0u32);
    let wide = Atomic::new([0u64; 3]);

    let before = os_wake_call_count();
    for _ in 0..100 {
        cell.notify_one();
        cell.notify_all();
        wide.notify_one();
        wide.notify_all();
    }
    assert_eq!(os_wake_call_count(), before);

    // With a blocked waiter the wake is real and the counter moves.
    thread::scope(|s| {
        s.spawn(|| {
            while cell.load(MemoryOrder::Acquire) == 0 {
                cell.wait(0, MemoryOrder::Acquire);
            }
        });

        thread::sleep(Duration::from_millis(20));
        cell.store(1, MemoryOrder::Release);
        cell.notify_all();
    });
    // The waiter may also have left via the spin phase or a re-check, so
    // the counter is allowed to move by zero or more; the join above is
    // the real assertion that the wake was delivered.
    assert!(os_wake_call_count() >= before);
}
