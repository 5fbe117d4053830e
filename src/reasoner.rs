//! The reasoner: one worldview, shared caches, and the matching engines.
//!
//! All query methods take `&self` and may be called from any number of
//! threads. Each query runs against a snapshot of the worldview taken at its
//! start; a worldview change swaps in a new lattice and invalidates every
//! cache under the same write lock, so results computed against the old
//! worldview are never published into the new caches.

use std::sync::{Arc, RwLock};

use crate::cache::{CacheHandle, CacheStats, MatchCaches};
use crate::compatibility::{CompatibilityFlags, compatible};
use crate::concept::{ConceptId, Semantics};
use crate::config::ReasonerConfig;
use crate::distance::{Distance, DistanceRequest, SemanticMatcher};
use crate::error::MatchResult;
use crate::lattice::{ConceptLattice, ConceptSpec};
use crate::observable::Observable;
use crate::pattern::PatternMatcher;
use crate::strategy::{
    ContextScope, ObservationStrategy, StrategyDefinition, StrategyInference, StrategyRegistry,
};

pub struct Reasoner {
    config: ReasonerConfig,
    worldview: RwLock<Arc<ConceptLattice>>,
    caches: MatchCaches,
    matcher: SemanticMatcher,
    patterns: PatternMatcher,
    strategies: StrategyInference,
    declared: StrategyRegistry,
}

impl Reasoner {
    /// A reasoner over an empty worldview.
    pub fn new(config: ReasonerConfig) -> MatchResult<Self> {
        Self::with_worldview(config, ConceptLattice::new())
    }

    /// A reasoner over `lattice`, which must be acyclic.
    pub fn with_worldview(config: ReasonerConfig, mut lattice: ConceptLattice) -> MatchResult<Self> {
        config.validate()?;
        lattice.set_max_depth(config.max_hierarchy_depth);
        lattice.check_acyclic()?;
        tracing::info!(concepts = lattice.len(), "worldview loaded");
        Ok(Self {
            caches: MatchCaches::new(config.cache_capacity),
            matcher: SemanticMatcher::new(config.max_hierarchy_depth),
            patterns: PatternMatcher::new(),
            strategies: StrategyInference::new(&config),
            declared: StrategyRegistry::new(),
            worldview: RwLock::new(Arc::new(lattice)),
            config,
        })
    }

    pub fn config(&self) -> &ReasonerConfig {
        &self.config
    }

    /// A snapshot of the current worldview.
    ///
    /// The handle stays readable after the worldview is replaced, but then
    /// refuses to intern with [`LatticeError::StaleWorldview`]. New concepts
    /// go through [`intern`](Self::intern); changes to existing concepts go
    /// through [`update_worldview`](Self::update_worldview).
    ///
    /// [`LatticeError::StaleWorldview`]: crate::error::LatticeError::StaleWorldview
    pub fn lattice(&self) -> Arc<ConceptLattice> {
        self.snapshot().0
    }

    /// Intern a concept into the current worldview.
    pub fn intern(&self, spec: ConceptSpec) -> MatchResult<ConceptId> {
        let guard = self.worldview.read().expect("worldview lock poisoned");
        guard.intern(spec)
    }

    /// The worldview together with the cache epoch it belongs to.
    fn snapshot(&self) -> (Arc<ConceptLattice>, CacheHandle<'_>) {
        let guard = self.worldview.read().expect("worldview lock poisoned");
        let lattice = Arc::clone(&guard);
        let handle = self.caches.current();
        (lattice, handle)
    }

    /// Distance from `from` to `to`, comparing inherency, without context.
    pub fn distance(&self, from: &dyn Semantics, to: &dyn Semantics) -> MatchResult<Distance> {
        self.semantic_distance(&DistanceRequest::new(from, to))
    }

    /// Distance for a fully specified request. Plain requests are memoized.
    pub fn semantic_distance(&self, request: &DistanceRequest<'_>) -> MatchResult<Distance> {
        let (lattice, cache) = self.snapshot();
        self.matcher.distance(lattice.as_ref(), cache, request)
    }

    /// Can `to_resolve` be resolved by an observation of `other`, in `context`?
    pub fn resolves(
        &self,
        to_resolve: &dyn Semantics,
        other: &dyn Semantics,
        context: Option<&dyn Semantics>,
    ) -> MatchResult<bool> {
        let request = DistanceRequest::new(to_resolve, other).with_context(context);
        Ok(self.semantic_distance(&request)?.is_compatible())
    }

    /// Structural compatibility of `candidate` with `required`.
    pub fn compatible(
        &self,
        candidate: &dyn Semantics,
        required: &dyn Semantics,
        flags: CompatibilityFlags,
    ) -> MatchResult<bool> {
        let (lattice, _) = self.snapshot();
        compatible(lattice.as_ref(), candidate.concept(), required.concept(), flags)
    }

    /// Does `candidate` match the syntactic `pattern`?
    pub fn matches(&self, candidate: &dyn Semantics, pattern: &dyn Semantics) -> MatchResult<bool> {
        let (lattice, cache) = self.snapshot();
        self.patterns
            .matches(lattice.as_ref(), lattice.as_ref(), cache, candidate, pattern)
    }

    /// Ranked strategies for resolving `observable` in `scope`.
    pub fn infer_strategies(
        &self,
        observable: &Observable,
        scope: &dyn ContextScope,
    ) -> MatchResult<Vec<ObservationStrategy>> {
        let (lattice, cache) = self.snapshot();
        self.strategies
            .infer(lattice.as_ref(), &self.matcher, cache, observable, scope)
    }

    /// Register a declared strategy, replacing one with the same URN.
    pub fn register_strategy(&self, definition: StrategyDefinition) -> MatchResult<()> {
        let guard = self.worldview.read().expect("worldview lock poisoned");
        self.declared.register(guard.as_ref(), definition)
    }

    /// Drop the declared strategies of `namespace`.
    pub fn release_namespace(&self, namespace: &str) -> usize {
        self.declared.release_namespace(namespace)
    }

    /// Put declared strategies in rank order. Call after registering.
    pub fn initialize_strategies(&self) {
        self.declared.initialize();
    }

    /// Declared strategies applicable to `observable` in `scope`, in rank order.
    pub fn matching_strategies(
        &self,
        observable: &Observable,
        scope: &dyn ContextScope,
    ) -> MatchResult<Vec<ObservationStrategy>> {
        let (lattice, cache) = self.snapshot();
        self.declared
            .matching(lattice.as_ref(), &self.patterns, cache, observable, scope)
    }

    /// Drop every cached result.
    pub fn reset_caches(&self) {
        let _guard = self.worldview.write().expect("worldview lock poisoned");
        self.caches.reset();
    }

    /// Replace the worldview.
    pub fn load_worldview(&self, mut lattice: ConceptLattice) -> MatchResult<()> {
        lattice.set_max_depth(self.config.max_hierarchy_depth);
        lattice.check_acyclic()?;
        let concepts = lattice.len();
        let mut guard = self.worldview.write().expect("worldview lock poisoned");
        self.declared.refresh(&lattice)?;
        guard.retire();
        *guard = Arc::new(lattice);
        self.caches.reset();
        tracing::info!(concepts, "worldview loaded");
        Ok(())
    }

    /// Change the worldview in place.
    ///
    /// `change` edits a copy; the copy replaces the worldview only if `change`
    /// succeeds and the result is still acyclic. The old lattice stops
    /// accepting new concepts while the copy is staged, and for good once it
    /// is replaced.
    pub fn update_worldview<R>(
        &self,
        change: impl FnOnce(&mut ConceptLattice) -> MatchResult<R>,
    ) -> MatchResult<R> {
        let mut guard = self.worldview.write().expect("worldview lock poisoned");
        guard.retire();
        let mut lattice = ConceptLattice::clone(&guard);
        let staged = change(&mut lattice).and_then(|result| {
            lattice.check_acyclic()?;
            self.declared.refresh(&lattice)?;
            Ok(result)
        });
        let result = match staged {
            Ok(result) => result,
            Err(err) => {
                guard.reinstate();
                return Err(err);
            }
        };
        let concepts = lattice.len();
        *guard = Arc::new(lattice);
        self.caches.reset();
        tracing::info!(concepts, "worldview updated");
        Ok(result)
    }

    pub fn cache_stats(&self) -> Vec<CacheStats> {
        self.caches.stats()
    }
}

impl std::fmt::Debug for Reasoner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reasoner")
            .field("config", &self.config)
            .field("epoch", &self.caches.epoch())
            .finish_non_exhaustive()
    }
}
