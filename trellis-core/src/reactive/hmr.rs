//! Hot replacement protocol.
//!
//! A dev-time module replacement coordinator swaps a reactive primitive for a
//! freshly constructed one. It asks the outgoing primitive to
//! [`provide`](HotReplace::provide) its state, hands that state to the
//! incoming primitive's [`inject`](HotReplace::inject), and finally calls
//! [`destroy`](HotReplace::destroy) on the outgoing one.
//!
//! Compiled only with the `hmr` feature.

use crate::error::ReactiveError;

use super::computed::Computed;
use super::signal::Signal;
use super::watch::Watch;

/// Capability to take over from a previous instance of the same primitive.
pub trait HotReplace {
    type State;

    fn provide(&self) -> Self::State;

    fn inject(&self, prev: Self::State) -> Result<(), ReactiveError>;

    fn destroy(&self);
}

impl<T: Clone + 'static> HotReplace for Signal<T> {
    type State = Signal<T>;

    fn provide(&self) -> Self::State {
        self.clone()
    }

    /// Carry over the value and every entangled node. Callback subscribers
    /// belong to the replaced module and are left behind.
    fn inject(&self, prev: Self::State) -> Result<(), ReactiveError> {
        self.sneak(prev.peek());
        for observer in prev.node_subscribers() {
            self.adopt_node(observer);
        }
        Ok(())
    }

    fn destroy(&self) {
        self.clear_subscribers();
    }
}

impl<T: Clone + 'static> HotReplace for Computed<T> {
    type State = Computed<T>;

    fn provide(&self) -> Self::State {
        self.clone()
    }

    fn inject(&self, prev: Self::State) -> Result<(), ReactiveError> {
        for observer in prev.signal().node_subscribers() {
            self.signal().adopt_node(observer);
        }
        prev.stop();
        self.start()
    }

    fn destroy(&self) {}
}

impl HotReplace for Watch {
    type State = Watch;

    fn provide(&self) -> Self::State {
        self.clone()
    }

    /// A replacement for a watch that was already stopped stays stopped.
    fn inject(&self, prev: Self::State) -> Result<(), ReactiveError> {
        if !prev.is_running() {
            self.stop();
        }
        Ok(())
    }

    fn destroy(&self) {
        self.stop();
    }
}
