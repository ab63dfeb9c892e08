//! Stress test - many tasks
//!
//! Spawns a large number of tasks, each yielding a few times, and waits on
//! every join handle to measure spawn and completion throughput.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use vtask::{Runtime, SchedulerConfig};

fn main() {
    println!("=== vtask Stress Test ===\n");

    let num_tasks: usize =
        std::env::args().nth(1).and_then(|s| s.parse().ok()).unwrap_or(10_000);

    println!("Spawning {num_tasks} tasks...");

    let mut config = SchedulerConfig::from_env();
    config.workers = 8;

    let runtime = Runtime::new(config);
    let completed = Arc::new(AtomicU64::new(0));

    runtime.block_on(async {
        let start = Instant::now();

        let mut handles = Vec::with_capacity(num_tasks);
        for i in 0..num_tasks {
            let completed = completed.clone();
            handles.push(vtask::spawn(async move {
                for _ in 0..10 {
                    vtask::yield_now().await;
                }
                completed.fetch_add(1, Ordering::Relaxed);
            }));

            if (i + 1) % 1000 == 0 {
                print!("\rSpawned: {}/{num_tasks}", i + 1);
            }
        }

        let spawn_time = start.elapsed();
        println!("\n\nSpawn time: {spawn_time:?}");
        println!("Spawn rate: {:.0} tasks/sec", num_tasks as f64 / spawn_time.as_secs_f64());

        println!("\nWaiting for completion...");
        let run_start = Instant::now();
        for h in handles {
            let _ = h.join();
        }

        let total_time = start.elapsed();
        let run_time = run_start.elapsed();

        println!("\n=== Results ===");
        println!("Total tasks:  {num_tasks}");
        println!("Completed:    {}", completed.load(Ordering::Relaxed));
        println!("Spawn time:   {spawn_time:?}");
        println!("Run time:     {run_time:?}");
        println!("Total time:   {total_time:?}");
        println!(
            "Throughput:   {:.0} tasks/sec",
            num_tasks as f64 / total_time.as_secs_f64()
        );
    });

    println!("\n=== Stress Test Complete ===");
}
