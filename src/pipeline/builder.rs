use std::sync::Arc;
use tracing::info;

use super::router::{Router, ValidationMode};
use crate::config::{RouterSettings, ValidationKind};
use crate::error::RouteError;
use crate::handler::MetadataStore;
use crate::middleware::{ErrorHook, Hook, LogHook, RouterMetrics, TimeoutHook};
use crate::router::{ModuleLoader, RouteResolver};
use crate::validator::{RequirementsValidator, SchemaValidator};
use crate::validator_cache::ValidatorCache;

/// Assembles a [`Router`] from declarative settings plus the runtime pieces
/// settings cannot express: the module loader, hooks and validators.
pub struct RouterBuilder {
    settings: RouterSettings,
    loader: Option<Arc<dyn ModuleLoader>>,
    metadata: Option<Arc<MetadataStore>>,
    before_all: Vec<Arc<dyn Hook>>,
    after_all: Vec<Arc<dyn Hook>>,
    auth: Option<Arc<dyn Hook>>,
    on_error: Option<Arc<dyn ErrorHook>>,
    on_timeout: Option<Arc<dyn TimeoutHook>>,
    loggers: Vec<Arc<dyn LogHook>>,
    schema_validator: Option<Arc<dyn SchemaValidator>>,
    validator_cache: Option<ValidatorCache>,
    metrics: Option<Arc<RouterMetrics>>,
    preload: bool,
}

impl RouterBuilder {
    pub fn new(settings: RouterSettings) -> Self {
        Self {
            settings,
            loader: None,
            metadata: None,
            before_all: Vec::new(),
            after_all: Vec::new(),
            auth: None,
            on_error: None,
            on_timeout: None,
            loggers: Vec::new(),
            schema_validator: None,
            validator_cache: None,
            metrics: None,
            preload: true,
        }
    }

    #[must_use]
    pub fn loader(mut self, loader: impl ModuleLoader + 'static) -> Self {
        self.loader = Some(Arc::new(loader));
        self
    }

    #[must_use]
    pub fn shared_loader(mut self, loader: Arc<dyn ModuleLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Metadata store consulted for handler annotations. Defaults to the
    /// process-wide store.
    #[must_use]
    pub fn metadata(mut self, store: Arc<MetadataStore>) -> Self {
        self.metadata = Some(store);
        self
    }

    #[must_use]
    pub fn before_all(mut self, hook: Arc<dyn Hook>) -> Self {
        self.before_all.push(hook);
        self
    }

    #[must_use]
    pub fn after_all(mut self, hook: Arc<dyn Hook>) -> Self {
        self.after_all.push(hook);
        self
    }

    /// Hook run for endpoints that require auth.
    #[must_use]
    pub fn auth(mut self, hook: Arc<dyn Hook>) -> Self {
        self.auth = Some(hook);
        self
    }

    #[must_use]
    pub fn on_error(mut self, hook: Arc<dyn ErrorHook>) -> Self {
        self.on_error = Some(hook);
        self
    }

    #[must_use]
    pub fn on_timeout(mut self, hook: Arc<dyn TimeoutHook>) -> Self {
        self.on_timeout = Some(hook);
        self
    }

    #[must_use]
    pub fn log(mut self, hook: Arc<dyn LogHook>) -> Self {
        self.loggers.push(hook);
        self
    }

    /// Validator used when settings select schema validation.
    #[must_use]
    pub fn schema_validator(mut self, validator: Arc<dyn SchemaValidator>) -> Self {
        self.schema_validator = Some(validator);
        self
    }

    /// Share compiled schemas with other routers.
    #[must_use]
    pub fn validator_cache(mut self, cache: ValidatorCache) -> Self {
        self.validator_cache = Some(cache);
        self
    }

    #[must_use]
    pub fn metrics(mut self, metrics: Arc<RouterMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Build the route index and load every module in `build`. On by
    /// default; turning it off defers both to the first request.
    #[must_use]
    pub fn preload(mut self, preload: bool) -> Self {
        self.preload = preload;
        self
    }

    pub fn build(self) -> Result<Router, RouteError> {
        let loader = self.loader.ok_or_else(|| RouteError::Misconfigured {
            reason: "no module loader configured".to_string(),
        })?;
        let validation = match self.settings.validation {
            ValidationKind::Off => ValidationMode::Off,
            ValidationKind::Schema => {
                let validator = self.schema_validator.ok_or_else(|| RouteError::Misconfigured {
                    reason: "schema validation selected but no schema validator configured"
                        .to_string(),
                })?;
                ValidationMode::Schema(validator)
            }
            ValidationKind::Requirements => ValidationMode::Requirements(
                RequirementsValidator::new(self.validator_cache.unwrap_or_default()),
            ),
        };
        let metadata = self.metadata.unwrap_or_else(MetadataStore::global);

        let resolver = RouteResolver::from_settings(&self.settings, loader, metadata)?;
        if self.preload {
            resolver.preload()?;
        }

        let router = Router {
            resolver,
            before_all: self.before_all,
            after_all: self.after_all,
            auth: self.auth,
            on_error: self.on_error,
            on_timeout: self.on_timeout,
            loggers: self.loggers,
            validation,
            validate_response: self.settings.validate_response,
            timeout: self.settings.timeout(),
            expose_errors: self.settings.expose_errors,
            metrics: self.metrics.unwrap_or_default(),
        };
        info!(
            strategy = router.resolver.strategy().name(),
            cache_mode = ?self.settings.cache_mode,
            cache_size = self.settings.cache_size,
            validation = ?router.validation,
            timeout_ms = self.settings.timeout_ms,
            preloaded = self.preload,
            "Router ready"
        );
        Ok(router)
    }
}
