use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use super::value::{FromValue, Resource, Value};
use crate::error::{EngineError, Result};

/// Shared named-value store for one run.
///
/// - Names are single-assignment: `put` never overwrites.
/// - Resource values are queued for teardown in insertion order, unless their kind is
///   declared as retained (owned by a longer-lived scope).
/// - `invalidate` releases a queued resource immediately; `close` drains the queue.
///
/// Variables and the teardown queue live behind one lock so the
/// "every queued resource is bound exactly once" invariant holds under concurrent use.
pub struct Context {
    inner: Mutex<Inner>,
    retained: BTreeSet<String>,
}

#[derive(Default)]
struct Inner {
    vars: BTreeMap<String, Value>,
    queue: VecDeque<Queued>,
}

struct Queued {
    name: String,
    resource: Arc<dyn Resource>,
}

impl Context {
    pub fn new() -> Self {
        Self::with_retained_kinds(std::iter::empty::<String>())
    }

    /// Create a context that never closes resources of the given kinds.
    pub fn with_retained_kinds<I, S>(kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inner: Mutex::new(Inner::default()),
            retained: kinds.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_retained(&self, resource: &dyn Resource) -> bool {
        self.retained.contains(resource.kind())
    }

    /// Bind `name` if it is not bound yet. Returns false (and changes nothing) otherwise.
    pub fn put(&self, name: impl Into<String>, value: impl Into<Value>) -> bool {
        let name = name.into();
        let value = value.into();
        let mut inner = self.inner.lock();
        if inner.vars.contains_key(&name) {
            trace!(target: "casebot::context", %name, "put ignored: name already bound");
            return false;
        }
        if let Value::Resource(resource) = &value {
            if self.is_retained(resource.as_ref()) {
                debug!(
                    target: "casebot::context",
                    %name, kind = resource.kind(),
                    "Resource kind is retained; not queued for teardown"
                );
            } else if inner.queue.iter().any(|q| Arc::ptr_eq(&q.resource, resource)) {
                trace!(
                    target: "casebot::context",
                    %name, kind = resource.kind(),
                    "Resource already queued under another name"
                );
            } else {
                inner.queue.push_back(Queued {
                    name: name.clone(),
                    resource: Arc::clone(resource),
                });
            }
        }
        inner.vars.insert(name, value);
        true
    }

    /// Bind a resource value.
    pub fn put_resource<R: Resource>(&self, name: impl Into<String>, resource: R) -> bool {
        self.put(name, Value::resource(resource))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.lock().vars.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.inner.lock().vars.get(name).cloned()
    }

    /// Typed lookup; empty when absent or of another type.
    pub fn get_as<T: FromValue>(&self, name: &str) -> Option<T> {
        self.inner.lock().vars.get(name).and_then(T::from_value)
    }

    /// Typed lookup that fails with `MissingContextValue` when absent or mismatched.
    pub fn require<T: FromValue>(&self, name: &str) -> Result<T> {
        self.get_as(name)
            .ok_or_else(|| EngineError::MissingContextValue {
                name: name.to_string(),
                expected: T::EXPECTED.to_string(),
            })
    }

    /// Resource lookup downcast to its concrete type.
    pub fn resource<R: Resource>(&self, name: &str) -> Option<Arc<R>> {
        let resource = self.get_as::<Arc<dyn Resource>>(name)?;
        resource.as_any_arc().downcast::<R>().ok()
    }

    pub fn require_resource<R: Resource>(&self, name: &str) -> Result<Arc<R>> {
        self.resource(name)
            .ok_or_else(|| EngineError::MissingContextValue {
                name: name.to_string(),
                expected: std::any::type_name::<R>()
                    .rsplit("::")
                    .next()
                    .unwrap_or("Resource")
                    .to_string(),
            })
    }

    /// Guard: `name` must already be bound to a value other than `Null`.
    pub fn require_exists(&self, name: &str) -> Result<()> {
        let present = self
            .inner
            .lock()
            .vars
            .get(name)
            .is_some_and(|v| !matches!(v, Value::Null));
        if present {
            Ok(())
        } else {
            Err(EngineError::PreconditionViolated {
                name: name.to_string(),
                reason: "required, but not exists".into(),
            })
        }
    }

    /// Guard: `name` must not be bound yet.
    pub fn require_absent(&self, name: &str) -> Result<()> {
        if self.contains(name) {
            Err(EngineError::PreconditionViolated {
                name: name.to_string(),
                reason: "already exists".into(),
            })
        } else {
            Ok(())
        }
    }

    /// Remove a binding. A queued resource is dequeued and released right away, unless
    /// another name is still bound to the same resource.
    /// Returns false when `name` was not bound.
    pub fn invalidate(&self, name: &str) -> bool {
        let released = {
            let mut inner = self.inner.lock();
            let Some(value) = inner.vars.remove(name) else {
                return false;
            };
            match value {
                Value::Resource(resource) => {
                    let shared = inner.vars.values().any(|v| {
                        v.as_resource().is_some_and(|other| Arc::ptr_eq(other, &resource))
                    });
                    if shared {
                        None
                    } else {
                        let before = inner.queue.len();
                        inner.queue.retain(|q| !Arc::ptr_eq(&q.resource, &resource));
                        (inner.queue.len() < before).then_some(resource)
                    }
                }
                _ => None,
            }
        };
        if let Some(resource) = released {
            release(name, resource.as_ref());
        }
        trace!(target: "casebot::context", %name, "Binding invalidated");
        true
    }

    /// Currently bound names.
    pub fn names(&self) -> BTreeSet<String> {
        self.inner.lock().vars.keys().cloned().collect()
    }

    /// Copy of every binding.
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.inner.lock().vars.clone()
    }

    /// Number of resources waiting for teardown.
    pub fn pending_teardown(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Drain the teardown queue in enqueue order, releasing each resource once.
    /// Bindings stay readable; their resources are simply closed.
    /// Returns how many resources were released.
    pub fn close(&self) -> usize {
        let mut released = 0;
        loop {
            let Some(next) = self.inner.lock().queue.pop_front() else {
                break;
            };
            if self.is_retained(next.resource.as_ref()) {
                continue;
            }
            release(&next.name, next.resource.as_ref());
            released += 1;
        }
        debug!(target: "casebot::context", released, "Context closed");
        released
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Context")
            .field("vars", &inner.vars)
            .field("queued", &inner.queue.iter().map(|q| &q.name).collect::<Vec<_>>())
            .field("retained", &self.retained)
            .finish()
    }
}

fn release(name: &str, resource: &dyn Resource) {
    trace!(target: "casebot::context", %name, kind = resource.kind(), "Releasing resource");
    if let Err(err) = resource.release() {
        warn!(
            target: "casebot::context",
            %name, kind = resource.kind(), error = %err,
            "Failed to release resource"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct Probe {
        id: &'static str,
        kind: &'static str,
        releases: Arc<AtomicUsize>,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Resource for Probe {
        fn kind(&self) -> &'static str {
            self.kind
        }

        fn release(&self) -> anyhow::Result<()> {
            self.releases.fetch_add(1, Ordering::SeqCst);
            self.log.lock().push(self.id);
            Ok(())
        }
    }

    struct Probes {
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Probes {
        fn new() -> Self {
            Self {
                log: Arc::default(),
            }
        }

        fn make(&self, id: &'static str, kind: &'static str) -> (Probe, Arc<AtomicUsize>) {
            let releases = Arc::new(AtomicUsize::new(0));
            let probe = Probe {
                id,
                kind,
                releases: Arc::clone(&releases),
                log: Arc::clone(&self.log),
            };
            (probe, releases)
        }

        fn order(&self) -> Vec<&'static str> {
            self.log.lock().clone()
        }
    }

    #[test]
    fn put_is_single_assignment() {
        let ctx = Context::new();
        assert!(ctx.put("x", "first"));
        assert!(!ctx.put("x", "second"));
        assert_eq!(ctx.get("x"), Some(Value::from("first")));
    }

    #[test]
    fn typed_lookup_and_require() {
        let ctx = Context::new();
        ctx.put("flag", true);
        assert_eq!(ctx.get_as::<bool>("flag"), Some(true));
        assert_eq!(ctx.get_as::<String>("flag"), None);
        assert!(ctx.require::<bool>("flag").unwrap());
        match ctx.require::<String>("flag") {
            Err(EngineError::MissingContextValue { name, expected }) => {
                assert_eq!(name, "flag");
                assert_eq!(expected, "Text");
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(ctx.require::<bool>("nope").is_err());
    }

    #[test]
    fn guards_report_the_name() {
        let ctx = Context::new();
        ctx.put("session", 1i64);
        assert!(ctx.require_exists("session").is_ok());
        assert!(ctx.require_absent("other").is_ok());
        match ctx.require_absent("session") {
            Err(EngineError::PreconditionViolated { name, .. }) => assert_eq!(name, "session"),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(matches!(
            ctx.require_exists("other"),
            Err(EngineError::PreconditionViolated { .. })
        ));
    }

    #[test]
    fn invalidate_releases_once() {
        let probes = Probes::new();
        let (probe, releases) = probes.make("a", "probe");
        let ctx = Context::new();
        assert!(ctx.put_resource("x", probe));
        assert_eq!(ctx.pending_teardown(), 1);

        assert!(ctx.invalidate("x"));
        assert_eq!(releases.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.pending_teardown(), 0);

        assert!(!ctx.invalidate("x"));
        assert_eq!(releases.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.close(), 0);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn one_resource_under_two_names_is_released_once() {
        let probes = Probes::new();
        let (probe, releases) = probes.make("shared", "probe");
        let ctx = Context::new();
        ctx.put_resource("a", probe);
        assert!(ctx.put("b", ctx.get("a").unwrap()));
        assert_eq!(ctx.pending_teardown(), 1);

        assert_eq!(ctx.close(), 1);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn invalidate_keeps_a_resource_still_bound_elsewhere() {
        let probes = Probes::new();
        let (probe, releases) = probes.make("shared", "probe");
        let ctx = Context::new();
        ctx.put_resource("a", probe);
        ctx.put("b", ctx.get("a").unwrap());

        assert!(ctx.invalidate("a"));
        assert_eq!(releases.load(Ordering::SeqCst), 0);
        assert_eq!(ctx.pending_teardown(), 1);

        assert!(ctx.invalidate("b"));
        assert_eq!(releases.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.close(), 0);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn null_does_not_satisfy_require_exists() {
        let ctx = Context::new();
        ctx.put("empty", Value::Null);
        assert!(matches!(
            ctx.require_exists("empty"),
            Err(EngineError::PreconditionViolated { name, .. }) if name == "empty"
        ));
    }

    #[test]
    fn close_releases_in_enqueue_order_and_skips_retained() {
        let probes = Probes::new();
        let (first, first_n) = probes.make("first", "probe");
        let (kept, kept_n) = probes.make("kept", "session");
        let (second, second_n) = probes.make("second", "probe");

        let ctx = Context::with_retained_kinds(["session"]);
        ctx.put_resource("b", first);
        ctx.put_resource("a", kept);
        ctx.put_resource("c", second);
        ctx.put("plain", "text");
        assert_eq!(ctx.pending_teardown(), 2);

        assert_eq!(ctx.close(), 2);
        assert_eq!(probes.order(), vec!["first", "second"]);
        assert_eq!(first_n.load(Ordering::SeqCst), 1);
        assert_eq!(second_n.load(Ordering::SeqCst), 1);
        assert_eq!(kept_n.load(Ordering::SeqCst), 0);

        // a second close has nothing left to release
        assert_eq!(ctx.close(), 0);
        assert_eq!(first_n.load(Ordering::SeqCst), 1);

        // retained resources are not released by invalidate either
        assert!(ctx.invalidate("a"));
        assert_eq!(kept_n.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn resources_downcast_to_their_type() {
        let probes = Probes::new();
        let (probe, _) = probes.make("p", "probe");
        let ctx = Context::new();
        ctx.put_resource("p", probe);
        let typed = ctx.require_resource::<Probe>("p").unwrap();
        assert_eq!(typed.id, "p");
        assert!(ctx.resource::<Probe>("missing").is_none());
        ctx.put("text", "not a resource");
        assert!(ctx.require_resource::<Probe>("text").is_err());
    }

    #[test]
    fn context_is_shareable_across_threads() {
        let ctx = Arc::new(Context::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let ctx = Arc::clone(&ctx);
                std::thread::spawn(move || ctx.put("shared", i as i64))
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
