//! Riptide: a cooperative single-threaded promise/actor runtime.
//!
//! # Overview
//!
//! Riptide is the asynchronous foundation of a distributed database:
//! a promise/future value-passing primitive, a cooperative event loop
//! (the "network"), actors compiled to suspendable state machines, a
//! thread-pool offload for blocking work, and a structured diagnostic
//! trace pipeline.
//!
//! # Core Guarantees
//!
//! - **At-most-once resolution**: a cell transitions out of pending
//!   exactly once; a second resolution is fatal
//! - **Deterministic scheduling**: FIFO within a priority class, callbacks
//!   in insertion order, timers by deadline
//! - **Cancellation by ownership**: dropping the last reference to an
//!   actor's output future delivers `actor_cancelled` at its suspension
//!   point
//! - **Single-threaded execution**: all actor code runs on the network
//!   thread; offload threads only run blocking receivers
//!
//! # Module Structure
//!
//! - [`error`]: first-class error values
//! - [`future`]: `Promise`, `Future`, and stream handles over cells
//! - [`select`]: `choose!` disjunction over futures and streams
//! - [`runtime`]: the event loop, timers, priorities, and actor spawning
//! - [`threadsafe`]: the mutex-guarded cross-thread cell
//! - [`pool`]: worker threads bound to receiver objects
//! - [`trace`]: the buffered, rolling, structured event pipeline
//! - [`net`]: address literals and packet-queue primitives
//! - [`buffer`]: size-classed block recycling with per-thread magazines
//! - [`config`]: runtime tunables
//! - [`monitor`]: machine state and periodic process metrics
//! - [`util`]: deterministic RNG and unique ids

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]

pub mod buffer;
pub(crate) mod cell;
pub mod config;
pub mod error;
pub mod future;
pub mod monitor;
pub mod net;
pub mod pool;
pub mod runtime;
pub mod select;
pub mod threadsafe;
pub mod trace;
pub mod util;

pub use error::{Error, ErrorKind, Result};
pub use future::{never, Future, FutureStream, Promise, PromiseStream, Void};
pub use runtime::{delay, now, yield_now, ClockMode, Net, Priority};
pub use select::{select2, select3, select4, Choice2, Choice3, Choice4};
pub use trace::{
    flush_trace, open_trace_file, Severity, TraceEvent, TraceEventFields, TraceFormat,
    TraceLogOptions,
};
