// =============================================================================
// Strategy registry — string-keyed constructor table
// =============================================================================
//
// Generalizes `core/strategy/registry.py`'s decorator-based global registry
// into an explicit, instantiable table: construction happens once at
// startup and the registry is immutable thereafter — the only process-wide
// singletons are the strategy registry and the indicator library handle.
// No implicit module-import side effects; callers
// register strategies explicitly.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::EngineError;

use super::Strategy;

type Constructor = Box<dyn Fn() -> Arc<dyn Strategy> + Send + Sync>;

#[derive(Default)]
pub struct StrategyRegistry {
    constructors: HashMap<String, Constructor>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a strategy constructor under `name`. Errors if the name is
    /// already taken. Programmer error, fatal.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        constructor: impl Fn() -> Arc<dyn Strategy> + Send + Sync + 'static,
    ) -> Result<(), EngineError> {
        let name = name.into();
        if self.constructors.contains_key(&name) {
            return Err(EngineError::DuplicateStrategy(name));
        }
        self.constructors.insert(name, Box::new(constructor));
        Ok(())
    }

    /// Instantiate a strategy by name. Errors if unknown: startup-time
    /// error, the process refuses to start.
    pub fn create(&self, name: &str) -> Result<Arc<dyn Strategy>, EngineError> {
        match self.constructors.get(name) {
            Some(ctor) => Ok(ctor()),
            None => Err(EngineError::UnknownStrategy(
                name.to_string(),
                self.list_strategies().join(", "),
            )),
        }
    }

    pub fn list_strategies(&self) -> Vec<String> {
        let mut names: Vec<String> = self.constructors.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::ema_crossover::EmaCrossoverStrategy;
    use crate::strategy::msr::MsrStrategy;

    #[test]
    fn register_and_create_round_trip() {
        let mut registry = StrategyRegistry::new();
        registry
            .register("msr_retest_capture", || {
                Arc::new(MsrStrategy::new(Default::default())) as Arc<dyn Strategy>
            })
            .unwrap();

        let strategy = registry.create("msr_retest_capture").unwrap();
        assert_eq!(strategy.name(), "msr_retest_capture");
    }

    #[test]
    fn duplicate_registration_is_error() {
        let mut registry = StrategyRegistry::new();
        registry
            .register("msr_retest_capture", || {
                Arc::new(MsrStrategy::new(Default::default())) as Arc<dyn Strategy>
            })
            .unwrap();
        let err = registry
            .register("msr_retest_capture", || {
                Arc::new(MsrStrategy::new(Default::default())) as Arc<dyn Strategy>
            })
            .unwrap_err();
        assert!(matches!(err, EngineError::DuplicateStrategy(_)));
    }

    #[test]
    fn unknown_strategy_is_error() {
        let registry = StrategyRegistry::new();
        let err = registry.create("nonexistent").unwrap_err();
        assert!(matches!(err, EngineError::UnknownStrategy(_, _)));
    }

    #[test]
    fn list_strategies_is_sorted() {
        let mut registry = StrategyRegistry::new();
        registry
            .register("ema_crossover", || {
                Arc::new(EmaCrossoverStrategy::new(Default::default())) as Arc<dyn Strategy>
            })
            .unwrap();
        registry
            .register("msr_retest_capture", || {
                Arc::new(MsrStrategy::new(Default::default())) as Arc<dyn Strategy>
            })
            .unwrap();
        assert_eq!(
            registry.list_strategies(),
            vec!["ema_crossover".to_string(), "msr_retest_capture".to_string()]
        );
    }
}
