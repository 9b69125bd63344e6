//! Driver registry
//!
//! Ordered lists of compiled-in backend drivers, selected by name at runtime.
//! List order encodes priority: when a configured name matches nothing, the
//! registry logs the full set of candidates and falls back to index 0.

use thiserror::Error;

/// Registry errors
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("no {category} drivers compiled in")]
    NoDriversCompiled { category: &'static str },
}

pub type DriverResult<T> = Result<T, DriverError>;

/// Implemented by every driver descriptor so the registry can match
/// configured names against compiled-in drivers.
pub trait DriverIdent {
    /// Unique identifier, stable across builds (used in config files).
    fn ident(&self) -> &'static str;
}

/// Join driver identifiers with `|` for help text and diagnostics.
///
/// Handles zero, one, and many entries without a trailing delimiter.
pub fn join_idents(idents: &[&str]) -> String {
    idents.join("|")
}

/// An ordered, immutable list of compiled-in drivers for one category.
///
/// The list is fixed at construction and never mutated afterwards. There is
/// no terminator entry; the collection carries its own length.
pub struct DriverRegistry<D: DriverIdent> {
    category: &'static str,
    drivers: Vec<D>,
}

impl<D: DriverIdent> DriverRegistry<D> {
    /// Build a registry from the drivers compiled into this frontend.
    ///
    /// An empty list is fatal: there is no valid fallback, so startup must
    /// abort rather than continue in a silently degraded mode.
    pub fn new(category: &'static str, drivers: Vec<D>) -> DriverResult<Self> {
        if drivers.is_empty() {
            return Err(DriverError::NoDriversCompiled { category });
        }
        Ok(Self { category, drivers })
    }

    /// Category name ("camera", "video", "input").
    pub fn category(&self) -> &'static str {
        self.category
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }

    /// Case-sensitive exact match against driver identifiers, in list order.
    pub fn find_index(&self, name: &str) -> Option<usize> {
        self.drivers.iter().position(|d| d.ident() == name)
    }

    /// Resolve a configured driver name to an index.
    ///
    /// Unknown names log the failure plus every available identifier so the
    /// operator can fix the config, then fall back to the highest-priority
    /// compiled-in driver (index 0).
    pub fn resolve(&self, requested: &str) -> usize {
        if let Some(index) = self.find_index(requested) {
            return index;
        }

        tracing::error!(
            "Couldn't find any {} driver named \"{}\"",
            self.category,
            requested
        );
        tracing::info!("Available {} drivers are:", self.category);
        for drv in &self.drivers {
            tracing::info!("\t{}", drv.ident());
        }
        tracing::warn!(
            "Going to default to first {} driver ({})...",
            self.category,
            self.drivers[0].ident()
        );

        0
    }

    pub fn get(&self, index: usize) -> &D {
        &self.drivers[index]
    }

    /// Identifiers in priority order.
    pub fn idents(&self) -> Vec<&'static str> {
        self.drivers.iter().map(|d| d.ident()).collect()
    }

    /// Pipe-delimited identifier list for config help text.
    pub fn joined_idents(&self) -> String {
        join_idents(&self.idents())
    }
}

/// Consumer callbacks fired synchronously around lifecycle transitions.
///
/// `on_initialized` fires after a backend init succeeds; `on_deinitialized`
/// fires before the backend is torn down.
#[derive(Default)]
pub struct LifecycleHooks {
    on_initialized: Option<Box<dyn FnMut()>>,
    on_deinitialized: Option<Box<dyn FnMut()>>,
}

impl LifecycleHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_on_initialized(&mut self, hook: impl FnMut() + 'static) {
        self.on_initialized = Some(Box::new(hook));
    }

    pub fn set_on_deinitialized(&mut self, hook: impl FnMut() + 'static) {
        self.on_deinitialized = Some(Box::new(hook));
    }

    pub fn fire_initialized(&mut self) {
        if let Some(hook) = &mut self.on_initialized {
            hook();
        }
    }

    pub fn fire_deinitialized(&mut self) {
        if let Some(hook) = &mut self.on_deinitialized {
            hook();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeDriver(&'static str);

    impl DriverIdent for FakeDriver {
        fn ident(&self) -> &'static str {
            self.0
        }
    }

    fn registry() -> DriverRegistry<FakeDriver> {
        DriverRegistry::new(
            "camera",
            vec![FakeDriver("v4l2"), FakeDriver("netcam"), FakeDriver("null")],
        )
        .unwrap()
    }

    #[test]
    fn test_find_index_exact_match() {
        let reg = registry();
        assert_eq!(reg.find_index("v4l2"), Some(0));
        assert_eq!(reg.find_index("netcam"), Some(1));
        assert_eq!(reg.find_index("null"), Some(2));
        assert_eq!(reg.find_index("missing"), None);
        // Case-sensitive
        assert_eq!(reg.find_index("Netcam"), None);
    }

    #[test]
    fn test_resolve_present_names() {
        let reg = registry();
        assert_eq!(reg.resolve("netcam"), 1);
        assert_eq!(reg.resolve("null"), 2);
    }

    #[test]
    fn test_resolve_absent_name_defaults_to_first() {
        let reg = registry();
        assert_eq!(reg.resolve("webcam"), 0);
        assert_eq!(reg.resolve(""), 0);
    }

    #[test]
    fn test_empty_registry_is_fatal() {
        let result = DriverRegistry::<FakeDriver>::new("camera", Vec::new());
        assert!(matches!(
            result,
            Err(DriverError::NoDriversCompiled { category: "camera" })
        ));
    }

    #[test]
    fn test_join_idents() {
        assert_eq!(join_idents(&["a", "b", "c"]), "a|b|c");
        assert_eq!(join_idents(&["a"]), "a");
        assert_eq!(join_idents(&[]), "");
    }

    #[test]
    fn test_joined_idents() {
        assert_eq!(registry().joined_idents(), "v4l2|netcam|null");
    }

    #[test]
    fn test_lifecycle_hooks_fire() {
        use std::cell::Cell;
        use std::rc::Rc;

        let inits = Rc::new(Cell::new(0));
        let deinits = Rc::new(Cell::new(0));

        let mut hooks = LifecycleHooks::new();
        // Unset hooks are a no-op
        hooks.fire_initialized();
        hooks.fire_deinitialized();

        let i = inits.clone();
        hooks.set_on_initialized(move || i.set(i.get() + 1));
        let d = deinits.clone();
        hooks.set_on_deinitialized(move || d.set(d.get() + 1));

        hooks.fire_initialized();
        hooks.fire_initialized();
        hooks.fire_deinitialized();

        assert_eq!(inits.get(), 2);
        assert_eq!(deinits.get(), 1);
    }
}
