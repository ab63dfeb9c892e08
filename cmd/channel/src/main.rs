//! Channel communication example
//!
//! Demonstrates inter-task communication using a bounded channel. Producer
//! and consumer are both closure tasks (`spawn_fn`): channel `send`/`recv`
//! block the worker thread they run on rather than suspending the task, so
//! this example doesn't need `.await` at all.

use vtask::{channel, Runtime, SchedulerConfig};

fn main() {
    println!("=== vtask Channel Example ===\n");

    let mut config = SchedulerConfig::from_env();
    config.workers = 4;
    config.debug_logging = true;

    let runtime = Runtime::new(config);

    runtime.block_on(async {
        let (tx, rx) = channel::<i32>(10);
        println!("Created channel with capacity 10\n");

        let producer = vtask::spawn_fn(move || {
            println!("[producer] starting");
            for i in 1..=5 {
                match tx.send(i) {
                    Ok(()) => println!("[producer] sent: {i}"),
                    Err(e) => println!("[producer] failed to send {i}: {e}"),
                }
            }
            println!("[producer] done (channel closes when tx drops)");
        });

        let consumer = vtask::spawn_fn(move || {
            println!("[consumer] starting");
            loop {
                match rx.recv() {
                    Ok(val) => println!("[consumer] received: {val}"),
                    Err(_) => {
                        println!("[consumer] channel closed, done");
                        break;
                    }
                }
            }
        });

        producer.join().unwrap();
        consumer.join().unwrap();
    });

    println!("\n=== Example Complete ===");
}
