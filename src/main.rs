//! Example demonstrating usage of the debouncer from the `axiom-debounce` crate.
//!
//! This program spawns 100 threads, each hammering the same trigger a hundred
//! times. Every trigger re-arms the window, so the counting callback fires only
//! once the burst has been quiet for the whole delay.

use axiom_debounce::DebounceBuilder;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

// Number of times the debounced callback has run.
static FIRINGS: AtomicUsize = AtomicUsize::new(0);

const DELAY: Duration = Duration::from_millis(100);

fn main() {
    tracing_subscriber::fmt::init();

    let (trigger, cancel) = DebounceBuilder::new(DELAY)
        .label("demo")
        .callback(|| {
            FIRINGS.fetch_add(1, Ordering::SeqCst);
        })
        .build();

    println!("Starting debounce test...");

    // Spawn 100 threads triggering concurrently.
    let mut threads = Vec::with_capacity(100);
    for _ in 0..100 {
        let trigger = trigger.clone();
        threads.push(thread::spawn(move || {
            for _ in 0..100 {
                trigger.trigger();
            }
        }));
    }

    for t in threads {
        let _ = t.join();
    }

    thread::sleep(DELAY * 3);
    println!("Firings after burst: {}", FIRINGS.load(Ordering::SeqCst));

    // Once cancelled, triggers are ignored.
    cancel.cancel();
    trigger.trigger();
    thread::sleep(DELAY * 3);
    println!("Firings after cancel: {}", FIRINGS.load(Ordering::SeqCst));
}
