//! # Hook: Lifecycle of a Service-Handle Substitution
//!
//! **Role**: Swaps every cached reference to one remote service for a proxy,
//! and puts the original back when anything goes wrong.
//!
//! **Lifecycle**:
//! 1. `obtain_original()`: ask the registry for the current handle.
//! 2. Build a `SelectiveDispatcher` bound to it, with the policy's rules.
//! 3. Overwrite every configured `CacheSlot` with the proxy.
//! 4. Propagate to `Holder`s that captured the handle before the hook existed,
//!    and invalidate memoized copies.
//! 5. On a failure in 3 or 4, the original is written back everywhere.
//!
//! Slots and holders are configuration data owned by the controller; nothing
//! here looks a cache up by name on its own.

pub mod controller;
pub mod holders;
pub mod slots;

pub use controller::{HookBuilder, HookController, HookState};
pub use holders::{ContextPackageManager, FieldHolder, Holder};
pub use slots::{CacheSlot, MainThreadSlot, RegistryCacheSlot};
pub use dispatch::{ProxyBinder, Side};

use bridge::AccessError;
use common::ServiceIdentity;
use dispatch::DispatchError;

/// Errors from hook activation and restoration.
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("Cannot obtain a handle for {0}")]
    Obtain(ServiceIdentity),
    #[error("Activation failed at {slot}: {source}")]
    Activation {
        slot: String,
        #[source]
        source: AccessError,
    },
    #[error("Dispatcher construction failed: {0}")]
    Dispatch(#[from] DispatchError),
    #[error("Restore incomplete; still pointing elsewhere: {}", failed.join(", "))]
    RestoreIncomplete { failed: Vec<String> },
}
