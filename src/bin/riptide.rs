//! Demonstration actors for the riptide runtime.
//!
//! Each subcommand spins up a fresh runtime context, runs one scenario,
//! and exits when the scenario stops the loop.

use clap::{Parser, Subcommand};
use riptide::{choose, delay, Error, ErrorKind, Future, Net, Promise, Result, Void};
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Parser)]
#[command(name = "riptide", about = "Demonstration actors for the riptide runtime")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// A busy loop racing an always-ready future against a timer.
    Loop,
    /// A five-second timer.
    Delay,
    /// A promise abandoned by its actor.
    Broken,
    /// An unobserved error that never propagates.
    Except,
}

async fn infinite_loop() -> Result<Void> {
    // Both arms survive across iterations, like `state` variables.
    let stop = delay(0.01);
    let on_change = Future::ready(Void);
    let mut count = 0u64;
    loop {
        choose! {
            _ = stop.clone() => { break; },
            _ = on_change.clone() => {
                count += 1;
                if count % 1000 == 0 {
                    println!("Loop count {count}");
                }
            },
        }
    }
    println!("loop returned after {count} iterations");
    Ok(Void)
}

async fn loop_test() -> Result<Void> {
    let net = Net::current();
    net.spawn(infinite_loop()).await?;
    println!("loopTest done");
    net.stop();
    Ok(Void)
}

async fn delay_test() -> Result<Void> {
    let net = Net::current();
    let start = net.precise_now();
    println!("Delaying for 5 seconds...");
    delay(5.0).await?;
    println!("Delay done after {:.3} seconds", net.precise_now() - start);
    net.stop();
    Ok(Void)
}

/// Hands its local promise's future to the caller, then returns without
/// sending: the caller observes a broken promise.
async fn promise_broken(slot: Rc<RefCell<Option<Future<i32>>>>) -> Result<i32> {
    let p: Promise<i32> = Promise::new();
    *slot.borrow_mut() = Some(p.get_future());
    delay(0.1).await?;
    Ok(2)
}

async fn watch_both(mut f: Future<i32>, mut s: Future<i32>) -> Result<Void> {
    loop {
        choose! {
            v = f.clone() => {
                println!("Got value from function {v}");
                f = Future::never();
            },
            v = s.clone() => {
                println!("Got value from promise {v}");
                s = Future::never();
            },
        }
    }
}

async fn broken_test() -> Result<Void> {
    let net = Net::current();
    let slot = Rc::new(RefCell::new(None));
    let f = net.spawn(promise_broken(Rc::clone(&slot)));
    // The child runs to its first suspension before spawn returns, so the
    // slot is filled here.
    let s = slot.borrow_mut().take().expect("child actor did not start");
    if let Err(err) = net.spawn(watch_both(f, s)).await {
        println!("Error: {}", err.name());
    }
    net.stop();
    Ok(Void)
}

async fn raise_exception() -> Result<i32> {
    delay(0.1).await?;
    println!("Throwing value_too_large");
    Err(Error::new(ErrorKind::ValueTooLarge))
}

async fn except_test() -> Result<Void> {
    let net = Net::current();
    // No arm waits on this future, so its error is never observed.
    let _unobserved = net.spawn(raise_exception());
    let f = delay(1.0);
    loop {
        choose! {
            _ = f.clone() => { break; },
            _ = Future::<i32>::never() => {},
        }
    }
    println!("No exception caught");
    net.stop();
    Ok(Void)
}

fn main() {
    let cli = Cli::parse();
    let net = Net::new();
    let scenario = match cli.command {
        Command::Loop => net.spawn(loop_test()),
        Command::Delay => net.spawn(delay_test()),
        Command::Broken => net.spawn(broken_test()),
        Command::Except => net.spawn(except_test()),
    };
    net.run();
    if scenario.is_error() {
        eprintln!("scenario failed: {}", scenario.get_error());
        std::process::exit(1);
    }
    println!("scenario finished");
}
