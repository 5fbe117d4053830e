//! Declared observation strategies.
//!
//! A [`StrategyDefinition`] is a strategy written down ahead of time: filters
//! deciding which observables it applies to, and operation templates that are
//! instantiated against the observable and its scope. The [`StrategyRegistry`]
//! holds definitions in rank order and precomputes a [`QuickFilter`] for each,
//! so most definitions are rejected on semantic types alone before any
//! pattern is matched.

use std::sync::{Arc, RwLock};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use super::{ContextScope, ObservationStrategy, ServiceCall, StrategyOrigin};
use crate::cache::CacheHandle;
use crate::concept::{SemanticType, SemanticTypes};
use crate::error::{MatchResult, StrategyError};
use crate::lattice::{ConceptGraph, ConceptLattice};
use crate::observable::Observable;
use crate::pattern::PatternMatcher;

/// The observable an operation template refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemplateTarget {
    /// The observable being resolved.
    This,
    /// The context observable of the scope.
    Context,
    /// A fixed concept, by URN.
    Concept(String),
}

/// One operation of a declared strategy, before instantiation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OperationTemplate {
    Observe { target: TemplateTarget, optional: bool },
    Resolve { target: TemplateTarget, optional: bool },
    Apply(ServiceCall),
}

impl OperationTemplate {
    pub fn observe(target: TemplateTarget) -> Self {
        Self::Observe {
            target,
            optional: false,
        }
    }

    pub fn resolve(target: TemplateTarget) -> Self {
        Self::Resolve {
            target,
            optional: false,
        }
    }

    pub fn apply(call: ServiceCall) -> Self {
        Self::Apply(call)
    }

    /// Mark the target optional. An optional operation whose target is not
    /// available in the scope is left out instead of ruling the strategy out.
    pub fn optional(self) -> Self {
        match self {
            Self::Observe { target, .. } => Self::Observe {
                target,
                optional: true,
            },
            Self::Resolve { target, .. } => Self::Resolve {
                target,
                optional: true,
            },
            apply => apply,
        }
    }

    fn target(&self) -> Option<(&TemplateTarget, bool)> {
        match self {
            Self::Observe { target, optional } | Self::Resolve { target, optional } => {
                Some((target, *optional))
            }
            Self::Apply(_) => None,
        }
    }
}

/// A match condition on the observable. A filter without a pattern matches
/// everything; negation inverts the outcome.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StrategyFilter {
    /// URN of the pattern concept.
    pub pattern: Option<String>,
    pub negated: bool,
}

impl StrategyFilter {
    pub fn matching(pattern: impl Into<String>) -> Self {
        Self {
            pattern: Some(pattern.into()),
            negated: false,
        }
    }

    pub fn any() -> Self {
        Self::default()
    }

    pub fn negated(mut self) -> Self {
        self.negated = !self.negated;
        self
    }
}

/// A declared strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyDefinition {
    pub urn: String,
    pub namespace: String,
    /// Lower ranks are tried first.
    pub rank: u32,
    pub description: Option<String>,
    /// Groups of filters. The strategy applies if any filter of any group
    /// matches.
    pub filters: Vec<Vec<StrategyFilter>>,
    pub operations: Vec<OperationTemplate>,
}

impl StrategyDefinition {
    pub fn new(urn: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            urn: urn.into(),
            namespace: namespace.into(),
            rank: 0,
            description: None,
            filters: Vec::new(),
            operations: Vec::new(),
        }
    }

    pub fn rank(mut self, rank: u32) -> Self {
        self.rank = rank;
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Add a group holding a single filter.
    pub fn filter(self, filter: StrategyFilter) -> Self {
        self.filter_group([filter])
    }

    pub fn filter_group(mut self, group: impl IntoIterator<Item = StrategyFilter>) -> Self {
        self.filters.push(group.into_iter().collect());
        self
    }

    pub fn operation(mut self, operation: OperationTemplate) -> Self {
        self.operations.push(operation);
        self
    }

    pub fn validate(&self) -> MatchResult<()> {
        let invalid = |message: &str| -> MatchResult<()> {
            Err(StrategyError::InvalidDefinition {
                urn: self.urn.clone(),
                message: message.to_string(),
            }
            .into())
        };
        if self.urn.trim().is_empty() {
            return invalid("URN is empty");
        }
        if self.namespace.trim().is_empty() {
            return invalid("namespace is empty");
        }
        if self.operations.is_empty() {
            return invalid("no operations");
        }
        if self.filters.iter().any(Vec::is_empty) {
            return invalid("empty filter group");
        }
        Ok(())
    }

    /// True if some mandatory operation needs the scope's context.
    pub fn requires_context(&self) -> bool {
        self.operations.iter().any(|op| {
            matches!(op.target(), Some((TemplateTarget::Context, false)))
        })
    }
}

/// Semantic-type preconditions of a definition, computed from its filter
/// patterns against a worldview.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuickFilter {
    /// Observables must carry one of these types, if any are listed.
    pub whitelist: SemanticTypes,
    /// Observables must carry none of these types.
    pub blacklist: SemanticTypes,
    pub collective_only: bool,
    pub non_collective_only: bool,
    /// False if some pattern was not declared yet.
    pub complete: bool,
}

impl QuickFilter {
    pub fn compute(graph: &dyn ConceptGraph, definition: &StrategyDefinition) -> MatchResult<Self> {
        let mut filter = QuickFilter {
            complete: true,
            ..Self::default()
        };
        let (mut collective, mut individual) = (0usize, 0usize);
        for f in definition.filters.iter().flatten() {
            let Some(urn) = &f.pattern else {
                continue;
            };
            let Some(id) = graph.lookup(urn) else {
                filter.complete = false;
                continue;
            };
            let concept = graph.concept(id)?;
            let fundamental = concept.types.fundamental();
            if fundamental != SemanticType::Nothing {
                if f.negated {
                    filter.blacklist.insert(fundamental);
                } else {
                    filter.whitelist.insert(fundamental);
                }
            }
            if concept.collective {
                collective += 1;
            } else {
                individual += 1;
            }
        }
        if (collective == 0) != (individual == 0) {
            filter.collective_only = collective > 0;
            filter.non_collective_only = individual > 0;
        }
        Ok(filter)
    }

    /// Cheap precondition check on the observable's concept.
    pub fn admits(&self, types: &SemanticTypes, collective: bool) -> bool {
        if !self.whitelist.is_empty() && !self.whitelist.iter().any(|t| types.contains(t)) {
            return false;
        }
        if self.blacklist.iter().any(|t| types.contains(t)) {
            return false;
        }
        !((self.collective_only && !collective) || (self.non_collective_only && collective))
    }
}

/// Registered strategy definitions, kept in rank order once initialized.
#[derive(Debug, Default)]
pub struct StrategyRegistry {
    definitions: RwLock<Vec<Arc<StrategyDefinition>>>,
    /// Definition URN → quick filter for the current worldview.
    quick_filters: DashMap<String, QuickFilter>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a definition, replacing any earlier one with the same URN.
    pub fn register(&self, graph: &dyn ConceptGraph, definition: StrategyDefinition) -> MatchResult<()> {
        definition.validate()?;
        let quick = QuickFilter::compute(graph, &definition)?;
        let urn = definition.urn.clone();
        let mut definitions = self.definitions.write().expect("strategy registry lock poisoned");
        let definition = Arc::new(definition);
        match definitions.iter_mut().find(|d| d.urn == urn) {
            Some(existing) => *existing = definition,
            None => definitions.push(definition),
        }
        self.quick_filters.insert(urn.clone(), quick);
        tracing::debug!(urn = %urn, "strategy registered");
        Ok(())
    }

    /// Remove every definition declared in `namespace`. Returns how many
    /// were removed.
    pub fn release_namespace(&self, namespace: &str) -> usize {
        let mut definitions = self.definitions.write().expect("strategy registry lock poisoned");
        let before = definitions.len();
        definitions.retain(|d| {
            let keep = d.namespace != namespace;
            if !keep {
                self.quick_filters.remove(&d.urn);
            }
            keep
        });
        let removed = before - definitions.len();
        tracing::debug!(namespace, removed, "strategy namespace released");
        removed
    }

    /// Order definitions by rank. Registration order breaks ties.
    pub fn initialize(&self) {
        let mut definitions = self.definitions.write().expect("strategy registry lock poisoned");
        definitions.sort_by_key(|d| d.rank);
        tracing::debug!(strategies = definitions.len(), "strategies initialized");
    }

    /// Recompute every quick filter against a new worldview.
    pub fn refresh(&self, graph: &dyn ConceptGraph) -> MatchResult<()> {
        let definitions = self.definitions.read().expect("strategy registry lock poisoned");
        let computed = definitions
            .iter()
            .map(|d| -> MatchResult<_> { Ok((d.urn.clone(), QuickFilter::compute(graph, d)?)) })
            .collect::<MatchResult<Vec<_>>>()?;
        for (urn, quick) in computed {
            self.quick_filters.insert(urn, quick);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.definitions.read().expect("strategy registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// URNs in current order.
    pub fn urns(&self) -> Vec<String> {
        self.definitions
            .read()
            .expect("strategy registry lock poisoned")
            .iter()
            .map(|d| d.urn.clone())
            .collect()
    }

    /// Instantiate every definition applicable to `observable` in `scope`,
    /// in registry order.
    pub fn matching(
        &self,
        lattice: &ConceptLattice,
        patterns: &PatternMatcher,
        cache: CacheHandle<'_>,
        observable: &Observable,
        scope: &dyn ContextScope,
    ) -> MatchResult<Vec<ObservationStrategy>> {
        let definitions: Vec<_> = self
            .definitions
            .read()
            .expect("strategy registry lock poisoned")
            .clone();
        let concept = lattice.concept(observable.concept_id())?;
        let mut out = Vec::new();
        for definition in definitions {
            if definition.requires_context() && scope.context().is_none() {
                continue;
            }
            let quick = self.quick_filter(lattice, &definition)?;
            if !quick.admits(&concept.types, concept.collective) {
                continue;
            }
            if !self.any_filter_matches(lattice, patterns, cache, observable, &definition)? {
                continue;
            }
            out.push(self.instantiate(lattice, observable, scope, &definition)?);
        }
        tracing::trace!(urn = %concept.urn, matched = out.len(), "declared strategies matched");
        Ok(out)
    }

    /// The stored quick filter, recomputed if a pattern was missing when it
    /// was last computed.
    fn quick_filter(&self, graph: &dyn ConceptGraph, definition: &StrategyDefinition) -> MatchResult<QuickFilter> {
        if let Some(stored) = self.quick_filters.get(&definition.urn) {
            if stored.complete {
                return Ok(stored.clone());
            }
        }
        let quick = QuickFilter::compute(graph, definition)?;
        self.quick_filters.insert(definition.urn.clone(), quick.clone());
        Ok(quick)
    }

    fn any_filter_matches(
        &self,
        lattice: &ConceptLattice,
        patterns: &PatternMatcher,
        cache: CacheHandle<'_>,
        observable: &Observable,
        definition: &StrategyDefinition,
    ) -> MatchResult<bool> {
        if definition.filters.is_empty() {
            return Ok(true);
        }
        for filter in definition.filters.iter().flatten() {
            let matched = match &filter.pattern {
                None => true,
                Some(urn) => match lattice.lookup(urn) {
                    Some(pattern) => patterns.matches(lattice, lattice, cache, observable, &pattern)?,
                    None => false,
                },
            };
            if matched != filter.negated {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn instantiate(
        &self,
        lattice: &ConceptLattice,
        observable: &Observable,
        scope: &dyn ContextScope,
        definition: &StrategyDefinition,
    ) -> MatchResult<ObservationStrategy> {
        let mut builder = ObservationStrategy::builder(observable.clone(), StrategyOrigin::Declared)
            .rank(definition.rank)
            .urn(definition.urn.clone());
        if let Some(description) = &definition.description {
            builder = builder.documentation(description.clone());
        }
        for operation in &definition.operations {
            let target = match operation.target() {
                Some((target, optional)) => {
                    let resolved = match target {
                        TemplateTarget::This => Some(observable.clone()),
                        TemplateTarget::Context => scope
                            .context()
                            .map(|context| Observable::new(lattice, context))
                            .transpose()?,
                        TemplateTarget::Concept(urn) => {
                            Some(Observable::new(lattice, lattice.require(urn)?)?)
                        }
                    };
                    match resolved {
                        Some(o) => {
                            let optional = optional || o.is_optional();
                            Some(o.to_builder().optional(optional).build())
                        }
                        None => continue,
                    }
                }
                None => None,
            };
            builder = match (operation, target) {
                (OperationTemplate::Observe { .. }, Some(o)) => builder.observe(o),
                (OperationTemplate::Resolve { .. }, Some(o)) => builder.resolve(o),
                (OperationTemplate::Apply(call), _) => builder.apply(call.clone()),
                (_, None) => builder,
            };
        }
        Ok(builder.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MatchCaches;
    use crate::concept::ConceptId;
    use crate::error::MatchError;
    use crate::lattice::ConceptSpec;
    use crate::lattice::fixtures::{Fixture, test_lattice};
    use crate::strategy::{OperationKind, OperationPayload, SimpleScope};

    fn elevation_by_lidar() -> StrategyDefinition {
        StrategyDefinition::new("geo.strategies:elevation-by-lidar", "geo.strategies")
            .rank(2)
            .describe("Process lidar returns into elevation.")
            .filter(StrategyFilter::matching("geo:Elevation"))
            .operation(OperationTemplate::observe(TemplateTarget::This))
            .operation(OperationTemplate::apply(ServiceCall::new("lidar.process")))
    }

    fn regions() -> StrategyDefinition {
        StrategyDefinition::new("earth.strategies:regions", "earth.strategies")
            .rank(1)
            .filter(StrategyFilter::matching("earth:Region"))
            .operation(OperationTemplate::observe(TemplateTarget::This))
    }

    fn within_context() -> StrategyDefinition {
        StrategyDefinition::new("geo.strategies:within-context", "geo.strategies")
            .filter(StrategyFilter::matching("geo:Elevation"))
            .operation(OperationTemplate::resolve(TemplateTarget::Context))
            .operation(OperationTemplate::observe(TemplateTarget::This))
    }

    fn matching(
        fx: &Fixture,
        registry: &StrategyRegistry,
        concept: ConceptId,
        scope: &dyn ContextScope,
    ) -> Vec<ObservationStrategy> {
        let caches = MatchCaches::new(64);
        let observable = Observable::new(&fx.lattice, concept).unwrap();
        registry
            .matching(&fx.lattice, &PatternMatcher::new(), caches.current(), &observable, scope)
            .unwrap()
    }

    fn observed(strategy: &ObservationStrategy) -> Vec<(OperationKind, ConceptId, bool)> {
        strategy
            .operations()
            .iter()
            .filter_map(|op| match &op.payload {
                OperationPayload::Observable(o) => Some((op.kind, o.concept_id(), o.is_optional())),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn fundamental_type_picks_the_single_kind() {
        use SemanticType as T;
        let quality = SemanticTypes::from([T::Observable, T::Quality, T::Quantifiable]);
        assert_eq!(quality.fundamental(), T::Quality);
        let attribute = SemanticTypes::from([T::Predicate, T::Trait, T::Attribute]);
        assert_eq!(attribute.fundamental(), T::Attribute);
        let ambiguous = SemanticTypes::from([T::Observable, T::Quality, T::Process]);
        assert_eq!(ambiguous.fundamental(), T::Nothing);
    }

    #[test]
    fn quick_filter_follows_pattern_types() {
        let fx = test_lattice();
        let each_elevation = fx
            .lattice
            .intern(ConceptSpec::derived(fx.elevation).collective())
            .unwrap();
        let definition = StrategyDefinition::new("s:collective", "s")
            .filter(StrategyFilter::matching("each geo:Elevation"))
            .filter(StrategyFilter::matching("earth:Region").negated())
            .operation(OperationTemplate::observe(TemplateTarget::This));
        let quick = QuickFilter::compute(&fx.lattice, &definition).unwrap();
        assert!(quick.complete);
        assert_eq!(quick.whitelist, SemanticTypes::from([SemanticType::Quality]));
        assert_eq!(quick.blacklist, SemanticTypes::from([SemanticType::Subject]));
        assert!(!quick.collective_only && !quick.non_collective_only);

        let collective_only = StrategyDefinition::new("s:each", "s")
            .filter(StrategyFilter::matching("each geo:Elevation"))
            .operation(OperationTemplate::observe(TemplateTarget::This));
        let quick = QuickFilter::compute(&fx.lattice, &collective_only).unwrap();
        let each = fx.lattice.concept(each_elevation).unwrap();
        let single = fx.lattice.concept(fx.elevation).unwrap();
        assert!(quick.admits(&each.types, true));
        assert!(!quick.admits(&single.types, false));
    }

    #[test]
    fn strategies_are_matched_and_ordered_by_rank() {
        let fx = test_lattice();
        let registry = StrategyRegistry::new();
        registry.register(&fx.lattice, elevation_by_lidar()).unwrap();
        registry.register(&fx.lattice, regions()).unwrap();
        registry
            .register(
                &fx.lattice,
                StrategyDefinition::new("earth.strategies:anything", "earth.strategies")
                    .filter(StrategyFilter::any())
                    .operation(OperationTemplate::resolve(TemplateTarget::This)),
            )
            .unwrap();
        registry.initialize();
        assert_eq!(
            registry.urns(),
            vec![
                "earth.strategies:anything",
                "earth.strategies:regions",
                "geo.strategies:elevation-by-lidar",
            ]
        );

        let found = matching(&fx, &registry, fx.lidar_elevation, &SimpleScope::root());
        let urns: Vec<_> = found.iter().filter_map(ObservationStrategy::urn).collect();
        assert_eq!(urns, vec!["earth.strategies:anything", "geo.strategies:elevation-by-lidar"]);
        let lidar = &found[1];
        assert_eq!(lidar.origin(), StrategyOrigin::Declared);
        assert_eq!(lidar.rank(), 2);
        assert_eq!(lidar.documentation(), Some("Process lidar returns into elevation."));
        assert_eq!(
            observed(lidar),
            vec![(OperationKind::Observe, fx.lidar_elevation, false)]
        );
        assert!(matches!(
            &lidar.operations()[1].payload,
            OperationPayload::Service(call) if call.function == "lidar.process"
        ));

        let found = matching(&fx, &registry, fx.volcano, &SimpleScope::root());
        let urns: Vec<_> = found.iter().filter_map(ObservationStrategy::urn).collect();
        assert_eq!(urns, vec!["earth.strategies:anything", "earth.strategies:regions"]);
    }

    #[test]
    fn context_strategies_apply_only_within_a_context() {
        let fx = test_lattice();
        let registry = StrategyRegistry::new();
        registry.register(&fx.lattice, within_context()).unwrap();
        assert!(matching(&fx, &registry, fx.elevation, &SimpleScope::root()).is_empty());

        let found = matching(&fx, &registry, fx.elevation, &SimpleScope::within(fx.mountain));
        assert_eq!(found.len(), 1);
        assert_eq!(
            observed(&found[0]),
            vec![
                (OperationKind::Resolve, fx.mountain, false),
                (OperationKind::Observe, fx.elevation, false),
            ]
        );
    }

    #[test]
    fn optional_context_operations_are_dropped_without_a_context() {
        let fx = test_lattice();
        let registry = StrategyRegistry::new();
        let definition = StrategyDefinition::new("geo.strategies:maybe-context", "geo.strategies")
            .filter(StrategyFilter::matching("geo:Elevation"))
            .operation(OperationTemplate::resolve(TemplateTarget::Context).optional())
            .operation(OperationTemplate::observe(TemplateTarget::This));
        assert!(!definition.requires_context());
        registry.register(&fx.lattice, definition).unwrap();

        let root = matching(&fx, &registry, fx.elevation, &SimpleScope::root());
        assert_eq!(
            observed(&root[0]),
            vec![(OperationKind::Observe, fx.elevation, false)]
        );
        let within = matching(&fx, &registry, fx.elevation, &SimpleScope::within(fx.region));
        assert_eq!(
            observed(&within[0]),
            vec![
                (OperationKind::Resolve, fx.region, true),
                (OperationKind::Observe, fx.elevation, false),
            ]
        );

        // A request that is optional itself stays optional.
        let caches = MatchCaches::new(16);
        let request = Observable::new(&fx.lattice, fx.elevation)
            .unwrap()
            .to_builder()
            .optional(true)
            .build();
        let found = registry
            .matching(
                &fx.lattice,
                &PatternMatcher::new(),
                caches.current(),
                &request,
                &SimpleScope::root(),
            )
            .unwrap();
        assert_eq!(
            observed(&found[0]),
            vec![(OperationKind::Observe, fx.elevation, true)]
        );
    }

    #[test]
    fn negated_filters_exclude_matches() {
        let fx = test_lattice();
        let registry = StrategyRegistry::new();
        registry
            .register(
                &fx.lattice,
                StrategyDefinition::new("s:not-mountains", "s")
                    .filter(StrategyFilter::matching("earth:Mountain").negated())
                    .operation(OperationTemplate::observe(TemplateTarget::This)),
            )
            .unwrap();
        assert_eq!(matching(&fx, &registry, fx.elevation, &SimpleScope::root()).len(), 1);
        // A negated subject pattern rules out every subject on type alone.
        assert!(matching(&fx, &registry, fx.volcano, &SimpleScope::root()).is_empty());
        assert!(matching(&fx, &registry, fx.region, &SimpleScope::root()).is_empty());
    }

    #[test]
    fn fixed_concept_targets_resolve_by_urn() {
        let fx = test_lattice();
        let registry = StrategyRegistry::new();
        registry
            .register(
                &fx.lattice,
                StrategyDefinition::new("s:with-terrain", "s")
                    .filter(StrategyFilter::matching("geo:Elevation"))
                    .operation(OperationTemplate::resolve(TemplateTarget::Concept(
                        "earth:Region".into(),
                    )))
                    .operation(OperationTemplate::observe(TemplateTarget::This)),
            )
            .unwrap();
        let found = matching(&fx, &registry, fx.elevation, &SimpleScope::root());
        assert_eq!(observed(&found[0])[0], (OperationKind::Resolve, fx.region, false));
    }

    #[test]
    fn patterns_declared_later_are_picked_up() {
        let fx = test_lattice();
        let registry = StrategyRegistry::new();
        registry
            .register(
                &fx.lattice,
                StrategyDefinition::new("s:slope", "s")
                    .filter(StrategyFilter::matching("geo:Slope"))
                    .operation(OperationTemplate::observe(TemplateTarget::This)),
            )
            .unwrap();
        let quality = SemanticTypes::from([
            SemanticType::Observable,
            SemanticType::Quality,
            SemanticType::Quantifiable,
        ]);
        let slope = fx
            .lattice
            .intern(ConceptSpec::named("geo:Slope", quality))
            .unwrap();
        assert_eq!(matching(&fx, &registry, slope, &SimpleScope::root()).len(), 1);
        assert!(matching(&fx, &registry, fx.elevation, &SimpleScope::root()).is_empty());
    }

    #[test]
    fn reregistering_replaces_and_namespaces_release() {
        let fx = test_lattice();
        let registry = StrategyRegistry::new();
        registry.register(&fx.lattice, elevation_by_lidar()).unwrap();
        registry.register(&fx.lattice, within_context()).unwrap();
        registry.register(&fx.lattice, regions()).unwrap();
        registry
            .register(&fx.lattice, elevation_by_lidar().rank(7))
            .unwrap();
        assert_eq!(registry.len(), 3);

        assert_eq!(registry.release_namespace("geo.strategies"), 2);
        assert_eq!(registry.urns(), vec!["earth.strategies:regions"]);
        assert!(matching(&fx, &registry, fx.elevation, &SimpleScope::root()).is_empty());
        assert_eq!(registry.release_namespace("geo.strategies"), 0);
    }

    #[test]
    fn invalid_definitions_are_rejected() {
        let fx = test_lattice();
        let registry = StrategyRegistry::new();
        for definition in [
            StrategyDefinition::new("", "s").operation(OperationTemplate::observe(TemplateTarget::This)),
            StrategyDefinition::new("s:x", " ").operation(OperationTemplate::observe(TemplateTarget::This)),
            StrategyDefinition::new("s:x", "s").filter(StrategyFilter::any()),
            StrategyDefinition::new("s:x", "s")
                .filter_group(Vec::new())
                .operation(OperationTemplate::observe(TemplateTarget::This)),
        ] {
            let err = registry.register(&fx.lattice, definition).unwrap_err();
            assert!(matches!(
                err,
                MatchError::Strategy(StrategyError::InvalidDefinition { .. })
            ));
        }
        assert!(registry.is_empty());
    }
}
