//! Basic line usage example
//!
//! Demonstrates group creation, pushes, resizing, reports and shutdown.
//!
//! Run with: cargo run --example basic_usage

use assembly_line::prelude::*;
use std::thread;
use std::time::Duration;

fn main() -> Result<()> {
    env_logger::init();

    println!("=== Assembly Line - Basic Usage Example ===\n");

    let line: Line<&'static str> = Line::with_config(LineConfig::new("basic"))?;
    let work = line.new_group("work", 2)?;

    println!("1. Starting line {}", line.id());
    line.start(&CancellationToken::new())?;

    println!("\n2. Pushing ten tasks to a group of two workers:");
    for i in 0..10 {
        let status = work.push(EffectTask::new("work", move |_: &CancellationToken| {
            println!("  Task {} executing on {:?}", i, thread::current().name());
            thread::sleep(Duration::from_millis(50));
        }))?;
        println!(
            "   pushed task {}: {} workers, {} busy, {} queued",
            i, status.workers, status.busy(), status.queued
        );
    }

    println!("\n3. Hiring two more workers while tasks run:");
    let status = work.hire(2)?;
    println!("   now {} workers, {} queued", status.workers, status.queued);

    println!("\n4. Peeking at the queue:");
    work.walk_tasks(|i, task| println!("   #{} {:?}", i, task))?;

    line.wait()?;

    println!("\n5. Report after the barrier:");
    let report = line.report()?;
    for group in &report.groups {
        println!(
            "   {:?}: {} completed, avg latency {:?}, success rate {:.0}%",
            group.category,
            group.stats.completed,
            group.stats.avg_latency(),
            group.stats.success_rate()
        );
    }
    println!("{}", report.to_json()?);

    println!("\n6. Shrinking below the busy count is rejected:");
    if let Err(e) = work.hire(-10) {
        println!("   {}", e);
    }

    println!("\n7. Finishing the line...");
    line.finish()?;
    println!("   terminated: {}", line.is_terminated());

    Ok(())
}
