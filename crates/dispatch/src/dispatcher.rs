//! The selective dispatcher: a proxy with a rule table.

use crate::rules::{InterceptionPolicy, Invocation, Rule, RuleSet};
use crate::DispatchError;
use common::{Call, MethodSig, RemoteError, RemoteHandle, RemoteService, Value};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, Weak};

/// Proxy object implementing a full call surface by delegation.
///
/// Signatures with a rule run the rule; every other signature is forwarded to
/// the target with its original arguments.
pub struct SelectiveDispatcher {
    descriptor: String,
    rules: HashMap<MethodSig, Arc<dyn Rule>>,
    target: OnceLock<RemoteHandle>,
    this: Weak<SelectiveDispatcher>,
}

impl SelectiveDispatcher {
    pub fn builder(descriptor: impl Into<String>) -> DispatcherBuilder {
        DispatcherBuilder::new(descriptor)
    }

    /// Binds the target. A target can be bound exactly once.
    pub fn set_target(&self, target: RemoteHandle) -> Result<(), DispatchError> {
        self.target
            .set(target)
            .map_err(|_| DispatchError::TargetAlreadySet)
    }

    pub fn target(&self) -> Option<&RemoteHandle> {
        self.target.get()
    }

    /// This dispatcher as a handle, for installation into caches.
    pub fn self_handle(&self) -> Option<RemoteHandle> {
        self.this.upgrade().map(|this| this as RemoteHandle)
    }

    /// Returns `true` if `sig` has a rule.
    pub fn intercepts(&self, sig: &MethodSig) -> bool {
        self.rules.contains_key(sig)
    }
}

impl RemoteService for SelectiveDispatcher {
    fn descriptor(&self) -> &str {
        self.target
            .get()
            .map(|t| t.descriptor())
            .unwrap_or(self.descriptor.as_str())
    }

    fn transact(&self, call: &Call) -> Result<Value, RemoteError> {
        let target = self
            .target
            .get()
            .ok_or_else(|| RemoteError::NoTarget(call.sig().clone()))?;
        let invocation = Invocation::new(call, target, self.self_handle());
        match self.rules.get(call.sig()) {
            Some(rule) => {
                tracing::debug!(sig = %call.sig(), "intercepted call");
                rule.handle(&invocation)
            }
            None => invocation.invoke_original(),
        }
    }
}

/// Builder for [`SelectiveDispatcher`].
pub struct DispatcherBuilder {
    descriptor: String,
    rules: RuleSet,
    target: Option<RemoteHandle>,
}

impl DispatcherBuilder {
    pub fn new(descriptor: impl Into<String>) -> Self {
        Self {
            descriptor: descriptor.into(),
            rules: RuleSet::new(),
            target: None,
        }
    }

    pub fn rules_mut(&mut self) -> &mut RuleSet {
        &mut self.rules
    }

    /// Lets `policy` install its rules.
    pub fn policy(mut self, policy: Arc<dyn InterceptionPolicy>) -> Result<Self, DispatchError> {
        let name = policy.name().to_owned();
        policy.install(&mut self.rules)?;
        tracing::debug!(policy = %name, rules = self.rules.len(), "policy installed");
        Ok(self)
    }

    pub fn target(mut self, target: RemoteHandle) -> Self {
        self.target = Some(target);
        self
    }

    pub fn build(self) -> Arc<SelectiveDispatcher> {
        let DispatcherBuilder {
            descriptor,
            rules,
            target,
        } = self;
        let dispatcher = Arc::new_cyclic(|this| SelectiveDispatcher {
            descriptor,
            rules: rules.into_table(),
            target: OnceLock::new(),
            this: this.clone(),
        });
        if let Some(target) = target {
            // Fresh OnceLock; cannot already be set.
            let _ = dispatcher.target.set(target);
        }
        dispatcher
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{same_handle, ParamKind};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const LOOKUP: MethodSig = MethodSig::new("lookup", &[ParamKind::Str]);
    const LOOKUP_USER: MethodSig = MethodSig::new("lookup", &[ParamKind::Str, ParamKind::Int]);
    const REMOVE: MethodSig = MethodSig::new("remove", &[ParamKind::Str]);

    /// Records every call; `remove` is always rejected.
    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<Call>>,
        calls: AtomicUsize,
    }

    impl RemoteService for Recorder {
        fn descriptor(&self) -> &str {
            "test.IRecorder"
        }

        fn transact(&self, call: &Call) -> Result<Value, RemoteError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(call.clone());
            if *call.sig() == REMOVE {
                return Err(RemoteError::Rejected("read-only".into()));
            }
            Ok(Value::Str(format!("real:{}", call.str_arg(0)?)))
        }
    }

    fn dispatcher_over(target: Arc<Recorder>) -> Arc<SelectiveDispatcher> {
        let mut builder = SelectiveDispatcher::builder("test.IRecorder").target(target);
        builder
            .rules_mut()
            .on(LOOKUP, |inv| {
                if inv.call().str_arg(0)? == "hooked" {
                    return Ok(Value::Str("local".into()));
                }
                inv.invoke_original()
            })
            .unwrap();
        builder.build()
    }

    fn lookup(sig: MethodSig, args: Vec<Value>) -> Call {
        Call::new(sig, args).unwrap()
    }

    #[test]
    fn test_rule_substitutes_for_matching_args() {
        let real = Arc::new(Recorder::default());
        let proxy = dispatcher_over(real.clone());

        let out = proxy
            .transact(&lookup(LOOKUP, vec![Value::Str("hooked".into())]))
            .unwrap();
        assert_eq!(out, Value::Str("local".into()));
        assert_eq!(real.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_rule_delegates_when_condition_fails() {
        let real = Arc::new(Recorder::default());
        let proxy = dispatcher_over(real.clone());

        let out = proxy
            .transact(&lookup(LOOKUP, vec![Value::Str("other".into())]))
            .unwrap();
        assert_eq!(out, Value::Str("real:other".into()));
        assert_eq!(real.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unruled_operations_are_transparent() {
        let real = Arc::new(Recorder::default());
        let proxy = dispatcher_over(real.clone());

        // A different overload of an intercepted name has no rule.
        let call = lookup(LOOKUP_USER, vec![Value::Str("hooked".into()), Value::Int(7)]);
        let via_proxy = proxy.transact(&call).unwrap();
        let direct = real.transact(&call).unwrap();
        assert_eq!(via_proxy, direct);

        let seen = real.seen.lock().unwrap();
        assert_eq!(seen[0], call);
    }

    #[test]
    fn test_failures_pass_through_unchanged() {
        let real = Arc::new(Recorder::default());
        let proxy = dispatcher_over(real.clone());

        let err = proxy
            .transact(&lookup(REMOVE, vec![Value::Str("x".into())]))
            .unwrap_err();
        assert!(matches!(err, RemoteError::Rejected(msg) if msg == "read-only"));
    }

    #[test]
    fn test_no_target_before_binding() {
        let proxy = SelectiveDispatcher::builder("test.IRecorder").build();
        let err = proxy
            .transact(&lookup(LOOKUP, vec![Value::Str("x".into())]))
            .unwrap_err();
        assert!(matches!(err, RemoteError::NoTarget(_)));
        assert_eq!(proxy.descriptor(), "test.IRecorder");
    }

    #[test]
    fn test_target_set_once() {
        let proxy = SelectiveDispatcher::builder("test.IRecorder").build();
        proxy.set_target(Arc::new(Recorder::default())).unwrap();
        let err = proxy.set_target(Arc::new(Recorder::default())).unwrap_err();
        assert!(matches!(err, DispatchError::TargetAlreadySet));
    }

    #[test]
    fn test_self_handle_is_the_proxy() {
        let proxy = dispatcher_over(Arc::new(Recorder::default()));
        let as_handle: RemoteHandle = proxy.clone();
        assert!(same_handle(&proxy.self_handle().unwrap(), &as_handle));
        assert!(proxy.intercepts(&LOOKUP));
        assert!(!proxy.intercepts(&REMOVE));
    }
}
