//! Reactive Primitives
//!
//! This module implements the signal reactivity engine: signals, computed
//! signals, watches and the effect queue that batches their reactions.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. Reading it inside a tracking
//! pass records it as a dependency of whatever is deriving. Reading it while
//! a component renders entangles that tree node, so a later write re-renders
//! just that node. Writing notifies every subscriber.
//!
//! ## Computeds
//!
//! A Computed is a read-only signal derived from other signals. It
//! re-derives when a dependency changes and rewires its subscriptions to
//! whatever the getter read on that run.
//!
//! ## Watches
//!
//! A Watch is a side-effecting reaction. It follows the same tracking
//! protocol as a computed but produces no value, only an optional cleanup.
//!
//! # Scheduling
//!
//! Reactions never run synchronously inside a write. They are coalesced per
//! identity in the effect queue and flushed once per turn by the
//! [`Scheduler`]'s microtask queue, or manually with
//! [`flush_pending_reactions`].

mod computed;
mod context;
#[cfg(feature = "hmr")]
mod hmr;
mod queue;
mod reaction;
mod signal;
mod subscriber;
mod watch;

pub use computed::Computed;
pub use context::ReactiveContext;
#[cfg(feature = "hmr")]
pub use hmr::HotReplace;
pub use queue::{flush_pending_reactions, ReactionId, Scheduler};
pub use signal::{Signal, SignalId, Subscription};
pub use subscriber::SubscriberId;
pub use watch::{Cleanup, Watch};

pub(crate) use signal::Source;
pub(crate) use subscriber::{NodeObserver, UpdateTarget};
