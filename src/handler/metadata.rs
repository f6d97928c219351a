use dashmap::DashMap;
use once_cell::sync::Lazy;
use serde_json::Value;
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use super::{Handler, HandlerId, MethodConfig, ValidationRequirements};
use crate::error::Failure;
use crate::middleware::Hook;

/// Slot names understood by [`MetadataStore::config_for`].
pub mod slot {
    pub const AUTH: &str = "auth";
    pub const TIMEOUT: &str = "timeout";
    pub const BEFORE: &str = "before";
    pub const AFTER: &str = "after";
    pub const VALIDATION: &str = "validation";
    pub const BODY: &str = "body";
    pub const REQUIRED_PATH: &str = "required_path";
}

type HookList = Vec<Arc<dyn Hook>>;
type BodyFn = super::BodyTransform;

static GLOBAL: Lazy<Arc<MetadataStore>> = Lazy::new(|| Arc::new(MetadataStore::new()));

/// Side table of values attached to handler functions, keyed by
/// `(handler identity, slot name)`.
///
/// Values are type-erased; [`get`](Self::get) only returns a value when the
/// requested type matches the stored one.
#[derive(Default)]
pub struct MetadataStore {
    entries: DashMap<(HandlerId, &'static str), Arc<dyn Any + Send + Sync>>,
}

impl MetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide store used by [`Handler::annotate`].
    pub fn global() -> Arc<MetadataStore> {
        Arc::clone(&GLOBAL)
    }

    pub(crate) fn global_ref() -> &'static MetadataStore {
        &GLOBAL
    }

    pub fn set<T: Any + Send + Sync>(&self, id: HandlerId, slot: &'static str, value: T) {
        self.entries.insert((id, slot), Arc::new(value));
    }

    pub fn get<T: Any + Send + Sync>(&self, id: HandlerId, slot: &'static str) -> Option<Arc<T>> {
        let value = Arc::clone(self.entries.get(&(id, slot))?.value());
        value.downcast::<T>().ok()
    }

    pub fn has(&self, id: HandlerId, slot: &'static str) -> bool {
        self.entries.contains_key(&(id, slot))
    }

    pub fn remove(&self, id: HandlerId, slot: &'static str) -> bool {
        self.entries.remove(&(id, slot)).is_some()
    }

    /// Forget everything attached to `id`.
    pub fn clear_handler(&self, id: HandlerId) {
        self.entries.retain(|(owner, _), _| *owner != id);
    }

    pub fn annotate(&self, handler: &Handler) -> Annotate<'_> {
        Annotate {
            store: self,
            id: handler.id(),
        }
    }

    /// Assemble the metadata-sourced configuration of a handler, or `None`
    /// when nothing is attached.
    pub fn config_for(&self, handler: &Handler) -> Option<MethodConfig> {
        let id = handler.id();
        let config = MethodConfig {
            auth: self.get::<bool>(id, slot::AUTH).map(|v| *v),
            timeout: self.get::<Duration>(id, slot::TIMEOUT).map(|v| *v),
            before: self
                .get::<HookList>(id, slot::BEFORE)
                .map(|v| v.as_ref().clone())
                .unwrap_or_default(),
            after: self
                .get::<HookList>(id, slot::AFTER)
                .map(|v| v.as_ref().clone())
                .unwrap_or_default(),
            validation: self
                .get::<ValidationRequirements>(id, slot::VALIDATION)
                .map(|v| v.as_ref().clone()),
            body: self
                .get::<BodyFn>(id, slot::BODY)
                .map(|v| Arc::clone(v.as_ref())),
            required_path: self
                .get::<String>(id, slot::REQUIRED_PATH)
                .map(|v| v.as_ref().clone()),
        };
        let empty = config.auth.is_none()
            && config.timeout.is_none()
            && config.before.is_empty()
            && config.after.is_empty()
            && config.validation.is_none()
            && config.body.is_none()
            && config.required_path.is_none();
        (!empty).then_some(config)
    }

    fn push_hook(&self, id: HandlerId, slot: &'static str, hook: Arc<dyn Hook>) {
        // the entry guard holds the shard lock across read and write
        let mut entry = self
            .entries
            .entry((id, slot))
            .or_insert_with(|| Arc::new(HookList::new()));
        let current: &(dyn Any + Send + Sync) = &**entry.value();
        let mut hooks = current.downcast_ref::<HookList>().cloned().unwrap_or_default();
        hooks.push(hook);
        *entry.value_mut() = Arc::new(hooks);
    }
}

/// Fluent writer for one handler's metadata.
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use treeroute::event::{Request, Response};
/// use treeroute::handler::Handler;
///
/// let handler = Handler::new(|_req: Arc<Request>, res: Response| async move { Ok(res) });
/// handler
///     .annotate()
///     .auth(true)
///     .timeout(Duration::from_secs(2))
///     .required_path("/users/{id}");
/// ```
pub struct Annotate<'a> {
    store: &'a MetadataStore,
    id: HandlerId,
}

impl Annotate<'_> {
    pub fn auth(self, required: bool) -> Self {
        self.store.set(self.id, slot::AUTH, required);
        self
    }

    pub fn timeout(self, timeout: Duration) -> Self {
        self.store.set(self.id, slot::TIMEOUT, timeout);
        self
    }

    /// Append a before hook; repeated calls run in declaration order.
    pub fn before(self, hook: Arc<dyn Hook>) -> Self {
        self.store.push_hook(self.id, slot::BEFORE, hook);
        self
    }

    pub fn after(self, hook: Arc<dyn Hook>) -> Self {
        self.store.push_hook(self.id, slot::AFTER, hook);
        self
    }

    pub fn validation(self, requirements: ValidationRequirements) -> Self {
        self.store.set(self.id, slot::VALIDATION, requirements);
        self
    }

    pub fn body<F>(self, transform: F) -> Self
    where
        F: Fn(Value) -> Result<Value, Failure> + Send + Sync + 'static,
    {
        let transform: BodyFn = Arc::new(transform);
        self.store.set(self.id, slot::BODY, transform);
        self
    }

    pub fn required_path(self, template: impl Into<String>) -> Self {
        self.store.set(self.id, slot::REQUIRED_PATH, template.into());
        self
    }
}
