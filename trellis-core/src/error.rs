//! Error types.
//!
//! Rendering errors are fatal to the pass that raised them: the pass is rolled
//! back and the error is returned from the work loop. Reactive errors come from
//! fallible computed getters and propagate to whoever triggered the derivation.

use thiserror::Error;

use crate::reactive::SignalId;

/// Boxed error produced by a fallible computed getter.
pub type BoxError = Box<dyn std::error::Error + 'static>;

/// Errors raised while rendering or committing a tree.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The hook sequence of a component diverged from its previous render.
    #[error(
        "hook order changed in `{component}` at index {index}: expected `{expected}`, found `{found}`"
    )]
    HookOrderViolation {
        /// Name of the component whose hooks diverged.
        component: String,
        /// Position of the first diverging hook.
        index: usize,
        /// Hook recorded at this position on the previous render.
        expected: String,
        /// Hook called at this position on the current render.
        found: String,
    },

    /// A hook was called from inside another hook's callback.
    #[error("hook `{hook}` cannot be called inside another hook")]
    NestedHookCall {
        /// The hook that was called re-entrantly.
        hook: &'static str,
    },

    /// A hook was called while its component was not rendering.
    #[error("hook `{hook}` called outside of its component's render")]
    MissingRenderContext {
        /// The hook that was called.
        hook: &'static str,
    },

    /// No native ancestor exists to mount a node into.
    ///
    /// The commit engine logs this and skips the subtree; it never fails a pass.
    #[error("no mountable native ancestor for `{node}`")]
    UnmountableTree {
        /// Type name of the node that could not be mounted.
        node: String,
    },

    /// A derivation failed while rendering.
    #[error(transparent)]
    Reactive(#[from] ReactiveError),
}

/// Errors raised by the signal runtime.
#[derive(Debug, Error)]
pub enum ReactiveError {
    /// A computed getter returned an error. The computed keeps its previous
    /// value and dependency set.
    #[error("derivation of computed signal {signal} failed: {source}")]
    Derivation {
        /// Identity of the computed signal.
        signal: SignalId,
        /// Error returned by the getter.
        source: BoxError,
    },
}

/// Errors raised while loading a [`RendererConfig`](crate::config::RendererConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse renderer config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid renderer config: {0}")]
    Invalid(String),
}
