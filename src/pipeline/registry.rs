use crate::error::{ConfigurationError, Location};
use crate::generators::{CsvGenerator, JsonGenerator, NotifyingGenerator};
use crate::pipeline::stage::{Generator, Serializer, Stage, StageRole, Transformer};
use crate::serializers::{TextSerializer, XmlSerializer};
use crate::transformers::{IdentityTransformer, LogTransformer, RenameTransformer, StripTransformer};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

type Factory<T> = Box<dyn Fn() -> Box<T> + Send + Sync>;

const DEFAULT_POOL_SIZE: usize = 8;

struct Pool<T: ?Sized> {
    role: StageRole,
    factories: HashMap<String, Factory<T>>,
    idle: Mutex<HashMap<String, Vec<Box<T>>>>,
}

impl<T: ?Sized + Stage> Pool<T> {
    fn new(role: StageRole) -> Self {
        Pool {
            role,
            factories: HashMap::new(),
            idle: Mutex::new(HashMap::new()),
        }
    }

    fn lookup(&self, kind: &str, location: Option<&Location>) -> Result<Box<T>, ConfigurationError> {
        let factory = self
            .factories
            .get(kind)
            .ok_or_else(|| ConfigurationError::UnknownStage {
                role: self.role,
                kind: kind.to_string(),
                location: location.cloned(),
            })?;

        // A poisoned pool only costs reuse, never the lookup
        let pooled = self
            .idle
            .lock()
            .ok()
            .and_then(|mut idle| idle.get_mut(kind).and_then(|instances| instances.pop()));

        Ok(pooled.unwrap_or_else(|| factory()))
    }

    fn release(&self, kind: &str, mut instance: Box<T>, pool_size: usize) {
        if let Err(err) = instance.recycle() {
            tracing::warn!(
                role = %self.role,
                kind,
                "discarding stage '{}' that failed to recycle: {:#}",
                instance.name(),
                err
            );
            return;
        }
        if let Ok(mut idle) = self.idle.lock() {
            let instances = idle.entry(kind.to_string()).or_default();
            if instances.len() < pool_size {
                instances.push(instance);
            }
        }
    }

    fn idle_count(&self) -> usize {
        self.idle
            .lock()
            .map(|idle| idle.values().map(Vec::len).sum())
            .unwrap_or(0)
    }
}

/// Resolves stage kinds to live instances and takes them back after use
///
/// Every `lookup_*` must be paired with the matching `release_*`.
pub struct StageRegistry {
    generators: Pool<dyn Generator>,
    transformers: Pool<dyn Transformer>,
    serializers: Pool<dyn Serializer>,
    pool_size: usize,
    outstanding: AtomicUsize,
}

impl Default for StageRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StageRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::with_pool_size(DEFAULT_POOL_SIZE)
    }

    pub fn with_pool_size(pool_size: usize) -> Self {
        StageRegistry {
            generators: Pool::new(StageRole::Generator),
            transformers: Pool::new(StageRole::Transformer),
            serializers: Pool::new(StageRole::Serializer),
            pool_size,
            outstanding: AtomicUsize::new(0),
        }
    }

    /// Registry with every built-in stage
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry
            .register_generator("json", || Box::new(JsonGenerator::new()))
            .register_generator("csv", || Box::new(CsvGenerator::new()))
            .register_generator("notifying", || Box::new(NotifyingGenerator::new()))
            .register_transformer("identity", || Box::new(IdentityTransformer::new()))
            .register_transformer("rename", || Box::new(RenameTransformer::new()))
            .register_transformer("strip", || Box::new(StripTransformer::new()))
            .register_transformer("log", || Box::new(LogTransformer::new()))
            .register_serializer("xml", || Box::new(XmlSerializer::new()))
            .register_serializer("text", || Box::new(TextSerializer::new()));
        registry
    }

    pub fn register_generator<F>(&mut self, kind: &str, factory: F) -> &mut Self
    where
        F: Fn() -> Box<dyn Generator> + Send + Sync + 'static,
    {
        self.generators.factories.insert(kind.to_string(), Box::new(factory));
        self
    }

    pub fn register_transformer<F>(&mut self, kind: &str, factory: F) -> &mut Self
    where
        F: Fn() -> Box<dyn Transformer> + Send + Sync + 'static,
    {
        self.transformers.factories.insert(kind.to_string(), Box::new(factory));
        self
    }

    pub fn register_serializer<F>(&mut self, kind: &str, factory: F) -> &mut Self
    where
        F: Fn() -> Box<dyn Serializer> + Send + Sync + 'static,
    {
        self.serializers.factories.insert(kind.to_string(), Box::new(factory));
        self
    }

    pub fn has(&self, role: StageRole, kind: &str) -> bool {
        match role {
            StageRole::Generator => self.generators.factories.contains_key(kind),
            StageRole::Transformer => self.transformers.factories.contains_key(kind),
            StageRole::Serializer => self.serializers.factories.contains_key(kind),
        }
    }

    pub fn lookup_generator(
        &self,
        kind: &str,
        location: Option<&Location>,
    ) -> Result<Box<dyn Generator>, ConfigurationError> {
        let instance = self.generators.lookup(kind, location)?;
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        Ok(instance)
    }

    pub fn lookup_transformer(
        &self,
        kind: &str,
        location: Option<&Location>,
    ) -> Result<Box<dyn Transformer>, ConfigurationError> {
        let instance = self.transformers.lookup(kind, location)?;
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        Ok(instance)
    }

    pub fn lookup_serializer(
        &self,
        kind: &str,
        location: Option<&Location>,
    ) -> Result<Box<dyn Serializer>, ConfigurationError> {
        let instance = self.serializers.lookup(kind, location)?;
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        Ok(instance)
    }

    pub fn release_generator(&self, kind: &str, instance: Box<dyn Generator>) {
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
        self.generators.release(kind, instance, self.pool_size);
    }

    pub fn release_transformer(&self, kind: &str, instance: Box<dyn Transformer>) {
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
        self.transformers.release(kind, instance, self.pool_size);
    }

    pub fn release_serializer(&self, kind: &str, instance: Box<dyn Serializer>) {
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
        self.serializers.release(kind, instance, self.pool_size);
    }

    /// Instances looked up and not yet released
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Instances waiting in the pools
    pub fn idle(&self) -> usize {
        self.generators.idle_count() + self.transformers.idle_count() + self.serializers.idle_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_kind_reports_role_and_location() {
        let registry = StageRegistry::with_builtins();
        let location = Location::new("site.yaml").described("pipeline/generator");
        let err = match registry.lookup_generator("nope", Some(&location)) {
            Err(err) => err,
            Ok(_) => panic!("lookup of an unknown kind succeeded"),
        };
        let message = err.to_string();
        assert!(message.contains("generator 'nope'"), "{}", message);
        assert!(message.contains("site.yaml"), "{}", message);
        assert_eq!(err.location(), Some(&location));
        assert_eq!(registry.outstanding(), 0);
    }

    #[test]
    fn test_release_returns_instance_to_pool() {
        let registry = StageRegistry::with_builtins();
        let serializer = registry.lookup_serializer("xml", None).unwrap();
        assert_eq!(registry.outstanding(), 1);

        registry.release_serializer("xml", serializer);
        assert_eq!(registry.outstanding(), 0);
        assert_eq!(registry.idle(), 1);

        let _again = registry.lookup_serializer("xml", None).unwrap();
        assert_eq!(registry.idle(), 0);
    }

    #[test]
    fn test_pool_size_bounds_idle_instances() {
        let mut registry = StageRegistry::with_pool_size(1);
        registry.register_transformer("identity", || Box::new(IdentityTransformer::new()));
        let a = registry.lookup_transformer("identity", None).unwrap();
        let b = registry.lookup_transformer("identity", None).unwrap();
        registry.release_transformer("identity", a);
        registry.release_transformer("identity", b);
        assert_eq!(registry.idle(), 1);
        assert_eq!(registry.outstanding(), 0);
    }
}
