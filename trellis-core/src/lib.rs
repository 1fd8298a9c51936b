//! Trellis Core
//!
//! This crate provides the core runtime for the Trellis UI engine.
//! It implements:
//!
//! - Reactive primitives (signals, computeds, watches)
//! - A batched effect queue drained on the microtask queue
//! - An interruptible fiber reconciler with hooks and class-like components
//! - A commit engine that patches a host document
//!
//! Everything runs on one thread. Handles are `Rc`-based and not `Send`.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Signals, dependency tracking and the effect queue
//! - `fiber`: Elements, the work loop, hooks and the commit engine
//! - `host`: The native document interface and an in-memory implementation
//! - `config`: Renderer tuning
//! - `error`: Error types
//!
//! # Example
//!
//! ```rust
//! use trellis_core::reactive::{Computed, Scheduler, Signal, Watch};
//!
//! // Create a signal
//! let count = Signal::new(1);
//!
//! // Create a derived value
//! let doubled = {
//!     let count = count.clone();
//!     Computed::new(move || count.get() * 2)
//! };
//!
//! // Create a watch
//! let _watch = {
//!     let doubled = doubled.clone();
//!     Watch::new(move || {
//!         println!("doubled: {}", doubled.get());
//!         None
//!     })
//! };
//!
//! // Update the signal. Reactions are batched and run as microtasks.
//! count.set(5);
//! Scheduler::run_microtasks().unwrap();
//! assert_eq!(doubled.get(), 10);
//! ```

pub mod config;
pub mod error;
pub mod fiber;
pub mod host;
pub mod reactive;

pub use config::{EffectOrder, RendererConfig};
pub use error::{ConfigError, ReactiveError, RenderError};
pub use fiber::{mount, ClassComponent, Element, Props, Root, Scope};
pub use reactive::{Computed, Signal, Watch};
