//! Fiber Reconciler
//!
//! This module turns declarative [`Element`] trees into native nodes of a
//! [`HostDocument`](crate::host::HostDocument), re-rendering incrementally as
//! state changes.
//!
//! # Concepts
//!
//! ## Elements and fibers
//!
//! An Element is an immutable description: a node type and its props.
//! A fiber is the persistent tree node an element is rendered into. Fibers
//! keep the native node, hook state and the snapshot of their last commit.
//!
//! ## Passes
//!
//! A pass renders a subtree one fiber at a time and then commits it. The
//! render phase only touches fibers, so a pass can yield to the host between
//! units (see [`Deadline`]) or be thrown away. The commit phase applies the
//! whole pass to the document at once.
//!
//! ## Hooks
//!
//! Components keep state through hooks on their [`Scope`]. Hooks are matched
//! to their state by call order, which must not change between renders.
//!
//! # Example
//!
//! ```
//! use trellis_core::fiber::{mount, Element, Props};
//! use trellis_core::host::MemoryDocument;
//!
//! let doc = MemoryDocument::new();
//! let container = doc.create_container("main");
//! let root = mount(
//!     |cx, _props| {
//!         let (count, _set) = cx.use_state(0)?;
//!         Ok(Element::new("p").with_text(format!("count: {count}")))
//!     },
//!     doc.target(container),
//!     Props::new(),
//! );
//! root.run_until_idle().unwrap();
//! assert_eq!(doc.inner_markup(container), "<p>count: 0</p>");
//! ```

mod arena;
mod commit;
mod element;
mod hooks;
mod node;
mod props;
mod reconcile;
mod root;

pub use element::{
    ClassComponent, Element, NodeRef, NodeType, PropValue, Props, RenderResult,
};
pub use hooks::{Dep, Deps, HookContext, Scope, StateSetter};
pub use node::{EffectTag, FiberId};
pub use root::{mount, Deadline, Root, TimeSlice, UnitBudget, WorkStatus};
