//! The hook controller: obtain, activate, restore.

use crate::holders::{ContextPackageManager, Holder};
use crate::slots::{CacheSlot, MainThreadSlot, RegistryCacheSlot};
use crate::HookError;
use bridge::{BridgedRegistry, HostObject, RuntimeAccess};
use common::package::methods;
use common::{RemoteHandle, ServiceIdentity, ServiceRegistry};
use dispatch::{InterceptionPolicy, ProxyBinder, SelectiveDispatcher, Side};
use std::sync::Arc;
use uuid::Uuid;

/// Where a controller is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookState {
    Uninstalled,
    Obtaining,
    Active,
    Restoring,
}

/// Owns one substitution: the proxy, the slots it lives in, and the way back.
pub struct HookController {
    identity: ServiceIdentity,
    registry: Box<dyn ServiceRegistry + Send + Sync>,
    policy: Arc<dyn InterceptionPolicy>,
    slots: Vec<Box<dyn CacheSlot>>,
    holders: Vec<Box<dyn Holder>>,
    state: HookState,
    binder: Option<ProxyBinder>,
    activation: Option<Uuid>,
}

impl HookController {
    pub fn builder(
        identity: ServiceIdentity,
        registry: impl ServiceRegistry + Send + Sync + 'static,
        policy: Arc<dyn InterceptionPolicy>,
    ) -> HookBuilder {
        HookBuilder {
            identity,
            registry: Box::new(registry),
            policy,
            slots: Vec::new(),
            holders: Vec::new(),
        }
    }

    /// Controller for the package-manager service with the standard slots.
    ///
    /// Slots: the registry cache entry and the main thread's reference.
    /// Holders: the memoized package manager of `context`'s base context.
    pub fn package_manager(
        runtime: Arc<dyn RuntimeAccess>,
        context: HostObject,
        policy: Arc<dyn InterceptionPolicy>,
    ) -> Self {
        let identity = ServiceIdentity::new(methods::SERVICE);
        Self::builder(
            identity.clone(),
            BridgedRegistry::new(Arc::clone(&runtime)),
            policy,
        )
        .slot(RegistryCacheSlot::new(BridgedRegistry::new(Arc::clone(&runtime)), identity))
        .slot(MainThreadSlot::new(Arc::clone(&runtime)))
        .holder(ContextPackageManager::new(runtime, context))
        .build()
    }

    pub fn identity(&self) -> &ServiceIdentity {
        &self.identity
    }

    pub fn state(&self) -> HookState {
        self.state
    }

    /// The installed handle pair while active.
    pub fn binder(&self) -> Option<&ProxyBinder> {
        self.binder.as_ref()
    }

    /// Correlation id of the current activation, logged on every transition.
    pub fn activation_id(&self) -> Option<Uuid> {
        self.activation
    }

    /// Looks up the current handle for the identity. Mutates nothing.
    pub fn obtain_original(&self) -> Result<RemoteHandle, HookError> {
        self.registry
            .get_handle(&self.identity)
            .ok_or_else(|| HookError::Obtain(self.identity.clone()))
    }

    /// Installs the proxy into every slot and propagates it to every holder.
    ///
    /// Calling this while active reinstalls the same proxy. Any failure
    /// restores the original before returning the error.
    pub fn activate(&mut self) -> Result<ProxyBinder, HookError> {
        if let (HookState::Active, Some(binder)) = (self.state, self.binder.clone()) {
            tracing::debug!(service = %self.identity, activation = ?self.activation, "already active; reinstalling proxy");
            return match self.install(&binder) {
                Ok(()) => Ok(binder),
                Err(e) => Err(self.abort(binder.original().clone(), e)),
            };
        }

        let activation = Uuid::new_v4();
        tracing::info!(service = %self.identity, %activation, "activating hook");
        self.state = HookState::Obtaining;

        let binder = match self.obtain_original().and_then(|original| self.bind(original)) {
            Ok(binder) => binder,
            Err(e) => {
                // Nothing written yet.
                self.state = HookState::Uninstalled;
                tracing::warn!(service = %self.identity, %activation, error = %e, "activation failed before install");
                return Err(e);
            }
        };

        if let Err(e) = self.install(&binder) {
            return Err(self.abort(binder.original().clone(), e));
        }

        self.binder = Some(binder.clone());
        self.activation = Some(activation);
        self.state = HookState::Active;
        tracing::info!(
            service = %self.identity,
            %activation,
            slots = self.slots.len(),
            holders = self.holders.len(),
            "hook active"
        );
        Ok(binder)
    }

    /// Writes the original handle back into every slot and holder.
    ///
    /// Every slot is attempted even if an earlier one fails; the failures are
    /// reported together. A no-op when nothing is installed.
    ///
    /// After an incomplete restore the controller stays `Active` and keeps
    /// the handle pair, since some slot may still hold the proxy. Calling
    /// `restore()` again retries; `activate()` reinstalls the same proxy
    /// rather than wrapping it in a new one.
    pub fn restore(&mut self) -> Result<(), HookError> {
        let Some(binder) = self.binder.clone() else {
            tracing::debug!(service = %self.identity, "restore requested while not active");
            self.state = HookState::Uninstalled;
            return Ok(());
        };
        self.state = HookState::Restoring;
        let failed = self.write_everywhere(binder.original());

        if failed.is_empty() {
            let activation = self.activation.take();
            self.binder = None;
            self.state = HookState::Uninstalled;
            tracing::info!(service = %self.identity, ?activation, "hook restored");
            Ok(())
        } else {
            self.state = HookState::Active;
            tracing::error!(service = %self.identity, activation = ?self.activation, failed = ?failed, "restore incomplete");
            Err(HookError::RestoreIncomplete { failed })
        }
    }

    /// Which half of the handle pair each slot currently holds.
    ///
    /// `None` for a slot that is empty, unreadable, or holds a handle that is
    /// neither (or when nothing has been installed).
    pub fn slot_report(&self) -> Vec<(String, Option<Side>)> {
        self.slots
            .iter()
            .map(|slot| {
                let side = match (&self.binder, slot.read()) {
                    (Some(binder), Ok(Some(handle))) => binder.side_of(&handle),
                    _ => None,
                };
                (slot.name().to_owned(), side)
            })
            .collect()
    }

    fn bind(&self, original: RemoteHandle) -> Result<ProxyBinder, HookError> {
        let dispatcher = SelectiveDispatcher::builder(original.descriptor())
            .policy(Arc::clone(&self.policy))?
            .target(original)
            .build();
        Ok(ProxyBinder::from_dispatcher(dispatcher)?)
    }

    fn install(&self, binder: &ProxyBinder) -> Result<(), HookError> {
        for slot in &self.slots {
            slot.write(binder.proxy())
                .map_err(|source| HookError::Activation {
                    slot: slot.name().to_owned(),
                    source,
                })?;
            tracing::debug!(slot = slot.name(), "proxy installed");
        }
        for holder in &self.holders {
            match holder.propagate(binder.proxy()) {
                Ok(()) => tracing::debug!(holder = holder.name(), "holder updated"),
                Err(e) if !holder.essential() => {
                    tracing::warn!(holder = holder.name(), error = %e, "optional holder skipped");
                }
                Err(source) => {
                    return Err(HookError::Activation {
                        slot: holder.name().to_owned(),
                        source,
                    })
                }
            }
        }
        Ok(())
    }

    /// Restores `original` after a failed install and hands back the cause.
    fn abort(&mut self, original: RemoteHandle, cause: HookError) -> HookError {
        tracing::warn!(service = %self.identity, error = %cause, "activation failed; restoring original");
        self.state = HookState::Restoring;
        let failed = self.write_everywhere(&original);
        if !failed.is_empty() {
            tracing::error!(service = %self.identity, failed = ?failed, "rollback left slots unrestored");
        }
        self.binder = None;
        self.activation = None;
        self.state = HookState::Uninstalled;
        cause
    }

    /// Returns the names of essential slots and holders that could not be written.
    fn write_everywhere(&self, handle: &RemoteHandle) -> Vec<String> {
        let mut failed = Vec::new();
        for slot in &self.slots {
            if let Err(e) = slot.write(handle) {
                tracing::warn!(slot = slot.name(), error = %e, "slot not restored");
                failed.push(slot.name().to_owned());
            }
        }
        for holder in &self.holders {
            if let Err(e) = holder.propagate(handle) {
                tracing::warn!(holder = holder.name(), error = %e, "holder not restored");
                if holder.essential() {
                    failed.push(holder.name().to_owned());
                }
            }
        }
        failed
    }
}

/// Builder for [`HookController`].
pub struct HookBuilder {
    identity: ServiceIdentity,
    registry: Box<dyn ServiceRegistry + Send + Sync>,
    policy: Arc<dyn InterceptionPolicy>,
    slots: Vec<Box<dyn CacheSlot>>,
    holders: Vec<Box<dyn Holder>>,
}

impl HookBuilder {
    /// Adds a slot. Slots are written in the order they are added.
    pub fn slot(mut self, slot: impl CacheSlot + 'static) -> Self {
        self.slots.push(Box::new(slot));
        self
    }

    pub fn holder(mut self, holder: impl Holder + 'static) -> Self {
        self.holders.push(Box::new(holder));
        self
    }

    pub fn build(self) -> HookController {
        HookController {
            identity: self.identity,
            registry: self.registry,
            policy: self.policy,
            slots: self.slots,
            holders: self.holders,
            state: HookState::Uninstalled,
            binder: None,
            activation: None,
        }
    }
}
