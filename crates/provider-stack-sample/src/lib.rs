//! # Provider Stack Sample
//!
//! A small service wired with [`provider_stack`]:
//!
//! 1. [`Tracing`](provider_stack::Tracing) installs the subscriber,
//! 2. [`App`](provider_stack::App) carries the name, version and base path,
//! 3. [`Probes`](provider_stack::Probes) serves `/healthz` and `/ready`,
//! 4. [`Pinger`](pinger::Pinger) waits for the probes server, then ticks and
//!    reports its own health through it.
//!
//! The application entry point is in `main.rs`. Stop it with ctrl-c; the
//! components are closed in reverse order.

pub mod pinger;

pub use pinger::{Pinger, PingerConfig, PingerError};
