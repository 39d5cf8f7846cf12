//! # Dispatch: Selective Interception of a Call Surface
//!
//! **Role**: Presents the full call surface of a remote service while
//! implementing only a declared subset of its operations. Everything else is
//! forwarded, untouched, to the original handle.
//!
//! **Core Types**:
//! - `SelectiveDispatcher`: the proxy object. A rule table keyed by
//!   `MethodSig`; the default for a missing key is forward-to-original.
//! - `Rule` / `RuleSet` / `InterceptionPolicy`: per-operation overrides and the
//!   policies that install them.
//! - `Invocation`: the in-flight call as a rule sees it, with
//!   `invoke_original()` as the delegation primitive.
//! - `ProxyBinder`: the original handle and the proxy, kept together.
//!
//! New operations on the remote surface need no code here: an unknown
//! signature simply has no rule and is delegated.

pub mod dispatcher;
pub mod proxy;
pub mod rules;

pub use dispatcher::{DispatcherBuilder, SelectiveDispatcher};
pub use proxy::{ProxyBinder, Side};
pub use rules::{InterceptionPolicy, Invocation, Rule, RuleSet};

use common::MethodSig;

/// Errors from building or binding a dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Dispatch target is already bound")]
    TargetAlreadySet,
    #[error("Dispatcher has no target bound")]
    MissingTarget,
    #[error("A rule for {0} is already installed")]
    DuplicateRule(MethodSig),
}
