// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The classic reference-count ordering recipe: relaxed increments, a
//! release decrement, and an acquire fence before tearing the object down.

use std::thread;

use interlocked_atomics::{Atomic, MemoryOrder, thread_fence};

struct Shared {
    refs: Atomic<usize>,
    payload: Atomic<u64>,
}

fn retain(shared: &Shared) {
    // A new reference can only be created from an existing one, so no
    // ordering is needed here.
    shared.refs.fetch_add(1, MemoryOrder::Relaxed);
}

/// Returns true when the caller dropped the last reference and must free.
fn release(shared: &Shared) -> bool {
    if shared.refs.fetch_sub(1, MemoryOrder::Release) != 1 {
        return false;
    }
    // Pair with every releasing decrement before reading the payload
    // non-atomically for teardown.
    thread_fence(MemoryOrder::Acquire);
    true
}

fn main() {
    let shared = Shared {
        refs: Atomic::new(1),
        payload: Atomic::new(0),
    };

    thread::scope(|s| {
        for i in 0..4u64 {
            retain(&shared);
            let shared = &shared;
            s.spawn(move || {
                shared.payload.fetch_add(i, MemoryOrder::Relaxed);
                if release(shared) {
                    println!("worker {i} dropped the last reference");
                }
            });
        }
    });

    if release(&shared) {
        let total = shared.payload.load(MemoryOrder::Relaxed);
        println!("main dropped the last reference, payload {total}");
    }
}
