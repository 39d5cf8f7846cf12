//! Interception rules and the policies that install them.

use crate::DispatchError;
use common::{Call, MethodSig, RemoteError, RemoteHandle, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// The in-flight call as seen by a rule.
pub struct Invocation<'a> {
    call: &'a Call,
    target: &'a RemoteHandle,
    proxy: Option<RemoteHandle>,
}

impl<'a> Invocation<'a> {
    pub fn new(call: &'a Call, target: &'a RemoteHandle, proxy: Option<RemoteHandle>) -> Self {
        Self {
            call,
            target,
            proxy,
        }
    }

    pub fn call(&self) -> &'a Call {
        self.call
    }

    /// The proxy itself, while it is alive.
    pub fn proxy_handle(&self) -> Option<&RemoteHandle> {
        self.proxy.as_ref()
    }

    /// Forwards the in-flight call, arguments untouched, to the original
    /// handle. Its result or error is returned as is.
    pub fn invoke_original(&self) -> Result<Value, RemoteError> {
        self.target.transact(self.call)
    }
}

/// An override for one operation.
///
/// A rule either produces a substituted result or calls
/// [`Invocation::invoke_original`] when its condition does not hold for the
/// arguments at hand.
///
/// # Example
/// ```
/// use common::Value;
/// use dispatch::{Invocation, Rule};
///
/// struct AlwaysZero;
///
/// impl Rule for AlwaysZero {
///     fn handle(&self, invocation: &Invocation<'_>) -> Result<Value, common::RemoteError> {
///         if invocation.call().str_arg(0)? == "target" {
///             return Ok(Value::Int(0));
///         }
///         invocation.invoke_original()
///     }
/// }
/// ```
pub trait Rule: Send + Sync {
    fn handle(&self, invocation: &Invocation<'_>) -> Result<Value, RemoteError>;
}

struct FnRule<F>(F);

impl<F> Rule for FnRule<F>
where
    F: Fn(&Invocation<'_>) -> Result<Value, RemoteError> + Send + Sync,
{
    fn handle(&self, invocation: &Invocation<'_>) -> Result<Value, RemoteError> {
        (self.0)(invocation)
    }
}

/// Rule table keyed by exact signature.
#[derive(Default)]
pub struct RuleSet {
    rules: HashMap<MethodSig, Arc<dyn Rule>>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a closure as the rule for `sig`.
    pub fn on<F>(&mut self, sig: MethodSig, handler: F) -> Result<&mut Self, DispatchError>
    where
        F: Fn(&Invocation<'_>) -> Result<Value, RemoteError> + Send + Sync + 'static,
    {
        self.rule(sig, Arc::new(FnRule(handler)))
    }

    /// Installs `rule` for `sig`. Each signature takes exactly one rule.
    pub fn rule(&mut self, sig: MethodSig, rule: Arc<dyn Rule>) -> Result<&mut Self, DispatchError> {
        if self.rules.contains_key(&sig) {
            return Err(DispatchError::DuplicateRule(sig));
        }
        self.rules.insert(sig, rule);
        Ok(self)
    }

    pub(crate) fn len(&self) -> usize {
        self.rules.len()
    }

    pub(crate) fn into_table(self) -> HashMap<MethodSig, Arc<dyn Rule>> {
        self.rules
    }
}

/// A domain policy layered on a dispatcher.
///
/// The policy owns its configuration explicitly and installs one rule per
/// signature it overrides.
pub trait InterceptionPolicy: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    fn install(self: Arc<Self>, rules: &mut RuleSet) -> Result<(), DispatchError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{ParamKind, RemoteService};

    const PING: MethodSig = MethodSig::new("ping", &[ParamKind::Str]);

    struct Pong;

    impl RemoteService for Pong {
        fn descriptor(&self) -> &str {
            "test.IPong"
        }

        fn transact(&self, _call: &Call) -> Result<Value, RemoteError> {
            Ok(Value::Str("pong".into()))
        }
    }

    #[test]
    fn test_duplicate_rule_rejected() {
        let mut rules = RuleSet::new();
        rules.on(PING, |_| Ok(Value::Null)).unwrap();
        let err = rules.on(PING, |_| Ok(Value::Null)).err().unwrap();
        assert!(matches!(err, DispatchError::DuplicateRule(sig) if sig == PING));
        assert_eq!(rules.len(), 1);
    }

    #[test]
    fn test_invocation_forwards_to_target() {
        let target: RemoteHandle = Arc::new(Pong);
        let call = Call::new(PING, vec![Value::Str("x".into())]).unwrap();
        let invocation = Invocation::new(&call, &target, None);
        assert_eq!(invocation.invoke_original().unwrap(), Value::Str("pong".into()));
        assert!(invocation.proxy_handle().is_none());
    }
}
