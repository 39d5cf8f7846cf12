//! The handle pair installed into (and restored from) caches.

use crate::{DispatchError, SelectiveDispatcher};
use common::{same_handle, RemoteHandle};
use std::sync::Arc;

/// Which half of a [`ProxyBinder`] to install.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Original,
    Proxy,
}

/// The original remote handle and the proxy standing in for it.
///
/// Storage only: lets the controller treat "the thing to put in a slot" the
/// same way whether it is activating or restoring.
#[derive(Clone)]
pub struct ProxyBinder {
    original: RemoteHandle,
    proxy: RemoteHandle,
}

impl ProxyBinder {
    pub fn new(original: RemoteHandle, proxy: RemoteHandle) -> Self {
        Self { original, proxy }
    }

    /// Pairs a bound dispatcher with its target.
    pub fn from_dispatcher(dispatcher: Arc<SelectiveDispatcher>) -> Result<Self, DispatchError> {
        let original = dispatcher
            .target()
            .cloned()
            .ok_or(DispatchError::MissingTarget)?;
        Ok(Self::new(original, dispatcher))
    }

    pub fn original(&self) -> &RemoteHandle {
        &self.original
    }

    pub fn proxy(&self) -> &RemoteHandle {
        &self.proxy
    }

    pub fn handle(&self, side: Side) -> &RemoteHandle {
        match side {
            Side::Original => &self.original,
            Side::Proxy => &self.proxy,
        }
    }

    /// Classifies a handle read back from a slot.
    pub fn side_of(&self, handle: &RemoteHandle) -> Option<Side> {
        if same_handle(handle, &self.proxy) {
            Some(Side::Proxy)
        } else if same_handle(handle, &self.original) {
            Some(Side::Original)
        } else {
            None
        }
    }
}

impl std::fmt::Debug for ProxyBinder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyBinder")
            .field("descriptor", &self.original.descriptor())
            .finish()
    }
}
