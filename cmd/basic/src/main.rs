//! Basic vtask example
//!
//! Demonstrates spawning tasks, yielding, and waiting on join handles.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use vtask::{Runtime, SchedulerConfig};

fn main() {
    println!("=== vtask Basic Example ===\n");

    let mut config = SchedulerConfig::from_env();
    config.workers = 4;
    config.debug_logging = true;

    let runtime = Runtime::new(config);

    let completed = Arc::new(AtomicUsize::new(0));

    let result = runtime.block_on(async {
        println!("Spawning tasks...\n");

        let c1 = completed.clone();
        let h1 = vtask::spawn(async move {
            println!("[task 1] started");
            for i in 0..3 {
                println!("[task 1] iteration {i}");
                vtask::yield_now().await;
            }
            println!("[task 1] finished");
            c1.fetch_add(1, Ordering::SeqCst);
        });

        let c2 = completed.clone();
        let h2 = vtask::spawn(async move {
            println!("[task 2] started");
            for i in 0..3 {
                println!("[task 2] iteration {i}");
                vtask::yield_now().await;
            }
            println!("[task 2] finished");
            c2.fetch_add(1, Ordering::SeqCst);
        });

        let c3 = completed.clone();
        let h3 = vtask::spawn_fn(move || {
            println!("[task 3] started and finished (closure task)");
            c3.fetch_add(1, Ordering::SeqCst);
        });

        h1.join().unwrap();
        h2.join().unwrap();
        h3.join().unwrap();

        completed.load(Ordering::SeqCst)
    });

    println!("\n{result}/3 tasks completed!");
    println!("\n=== Example Complete ===");
}
