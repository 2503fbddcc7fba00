//! Strategy registry.
//!
//! Maps a [`MergeStrategyType`] to the function implementing it. The registry
//! is assembled once through [`StrategyRegistryBuilder`] and is read-only
//! afterwards; strategies are plain functions, so no per-call state can leak
//! between merges.

use std::collections::BTreeMap;

use tracing::debug;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ItemTree, MergeConfig, MergeStrategyType, MergedTree};
use crate::services::basic_merge::basic_merge;
use crate::services::deep_merge::deep_merge;
use crate::services::matching_engine::MatchingEngine;

/// Signature of a merge algorithm. `trees` are in chronological launch order.
pub type MergeFn = fn(&[ItemTree], &MatchingEngine) -> DomainResult<MergedTree>;

/// A resolved merge strategy.
#[derive(Clone, Copy)]
pub struct MergeStrategy {
    kind: MergeStrategyType,
    merge: MergeFn,
}

impl std::fmt::Debug for MergeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergeStrategy").field("kind", &self.kind).finish()
    }
}

impl MergeStrategy {
    /// Wrap `merge` as strategy `kind`.
    pub fn new(kind: MergeStrategyType, merge: MergeFn) -> Self {
        Self { kind, merge }
    }

    /// Identifier the strategy is registered under.
    pub fn kind(&self) -> MergeStrategyType {
        self.kind
    }

    /// Run the strategy over chronologically ordered `trees`.
    pub fn merge(&self, trees: &[ItemTree], matching: &MatchingEngine) -> DomainResult<MergedTree> {
        (self.merge)(trees, matching)
    }
}

/// Immutable lookup table from strategy identifier to implementation.
#[derive(Debug, Clone)]
pub struct StrategyRegistry {
    strategies: BTreeMap<MergeStrategyType, MergeStrategy>,
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl StrategyRegistry {
    /// Start an empty registry.
    pub fn builder() -> StrategyRegistryBuilder {
        StrategyRegistryBuilder::default()
    }

    /// Registry holding every built-in strategy.
    pub fn with_defaults() -> Self {
        Self {
            strategies: [
                (MergeStrategyType::Deep, MergeStrategy::new(MergeStrategyType::Deep, deep_merge)),
                (MergeStrategyType::Basic, MergeStrategy::new(MergeStrategyType::Basic, basic_merge)),
            ]
            .into_iter()
            .collect(),
        }
    }

    /// Registry holding only the strategies enabled in configuration.
    pub fn from_config(config: &MergeConfig) -> DomainResult<Self> {
        let mut builder = Self::builder();
        for name in &config.enabled_strategies {
            let kind = MergeStrategyType::parse(name)?;
            builder = builder.register(kind, builtin(kind))?;
        }
        Ok(builder.build())
    }

    /// Look up the strategy registered for `kind`.
    pub fn resolve(&self, kind: MergeStrategyType) -> DomainResult<MergeStrategy> {
        let strategy = self
            .strategies
            .get(&kind)
            .copied()
            .ok_or_else(|| DomainError::UnknownStrategy(kind.to_string()))?;
        debug!(strategy = %kind, "Resolved merge strategy");
        Ok(strategy)
    }

    /// Look up a strategy by its textual identifier.
    pub fn resolve_name(&self, name: &str) -> DomainResult<MergeStrategy> {
        self.resolve(MergeStrategyType::parse(name)?)
    }

    /// Registered identifiers in order.
    pub fn kinds(&self) -> Vec<MergeStrategyType> {
        self.strategies.keys().copied().collect()
    }
}

fn builtin(kind: MergeStrategyType) -> MergeFn {
    match kind {
        MergeStrategyType::Deep => deep_merge,
        MergeStrategyType::Basic => basic_merge,
    }
}

/// Collects registrations before the registry is frozen.
#[derive(Debug, Default)]
pub struct StrategyRegistryBuilder {
    strategies: BTreeMap<MergeStrategyType, MergeStrategy>,
}

impl StrategyRegistryBuilder {
    /// Register `merge` under `kind`. Each identifier may be registered once.
    pub fn register(mut self, kind: MergeStrategyType, merge: MergeFn) -> DomainResult<Self> {
        if self.strategies.contains_key(&kind) {
            return Err(DomainError::ValidationFailed(format!(
                "Merge strategy '{kind}' is already registered"
            )));
        }
        self.strategies.insert(kind, MergeStrategy::new(kind, merge));
        Ok(self)
    }

    /// Freeze the registrations.
    pub fn build(self) -> StrategyRegistry {
        StrategyRegistry {
            strategies: self.strategies,
        }
    }
}
