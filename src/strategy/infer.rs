//! Strategy inference: which plans could resolve an observable, best first.

use rayon::prelude::*;

use crate::cache::CacheHandle;
use crate::concept::{ConceptId, RelationSlot, SemanticType, Semantics};
use crate::config::ReasonerConfig;
use crate::distance::{DistanceRequest, SemanticMatcher, Substitutions};
use crate::error::{MatchResult, StrategyError};
use crate::lattice::{ConceptGraph, ConceptLattice, ConceptSpec};
use crate::observable::{DescriptionType, Observable};

use super::{ContextScope, ObservationStrategy, ServiceCall, StrategyOrigin};

/// Builds ranked observation strategies for observables.
#[derive(Debug, Clone)]
pub struct StrategyInference {
    max_substitutions: usize,
    parallel: bool,
}

impl StrategyInference {
    pub fn new(config: &ReasonerConfig) -> Self {
        Self {
            max_substitutions: config.max_substitutions,
            parallel: config.parallel_candidates,
        }
    }

    /// Strategies for `observable`, sorted ascending by rank.
    ///
    /// The direct strategy, when there is one, has rank 0. Each concrete
    /// substitution of an abstract or generic predicate yields a strategy
    /// ranked `1 + distance`; substitutions at a negative distance are
    /// dropped. Each direct trait adds a deferred strategy, ranked last.
    pub fn infer(
        &self,
        lattice: &ConceptLattice,
        matcher: &SemanticMatcher,
        cache: CacheHandle<'_>,
        observable: &Observable,
        scope: &dyn ContextScope,
    ) -> MatchResult<Vec<ObservationStrategy>> {
        if observable.has_value_operators() {
            return self.with_value_operators(lattice, matcher, cache, observable, scope);
        }

        let id = observable.concept_id();
        let concept = lattice.concept(id)?;
        if lattice.core_observable(id)?.is_none() {
            return Err(StrategyError::UndeterminedCore {
                urn: concept.urn.clone(),
            }
            .into());
        }

        let mut strategies = Vec::new();
        if observable.generics().is_empty()
            && !concept.is_abstract
            && !concept.is(SemanticType::Relationship)
        {
            strategies.push(direct_strategy(observable));
        }

        let predicates: Vec<ConceptId> = if observable.generics().is_empty() {
            let mut abstract_predicates = Vec::new();
            for &p in concept.traits.iter().chain(&concept.roles) {
                if lattice.is_abstract(p)? {
                    abstract_predicates.push(p);
                }
            }
            abstract_predicates
        } else {
            observable
                .generics()
                .iter()
                .copied()
                .filter(|p| concept.traits.contains(p) || concept.roles.contains(p))
                .collect()
        };

        let mut unsubstitutable = None;
        for &predicate in &predicates {
            let substitutes = lattice.concrete_descendants(predicate, self.max_substitutions)?;
            if substitutes.is_empty() {
                tracing::debug!(predicate = %predicate, "no concrete substitutions");
                unsubstitutable.get_or_insert(predicate);
                continue;
            }
            let evaluate = |substitute: &ConceptId| {
                self.substitution_strategy(
                    lattice,
                    matcher,
                    cache,
                    observable,
                    scope,
                    predicate,
                    *substitute,
                )
            };
            let candidates: Vec<Option<ObservationStrategy>> = if self.parallel {
                substitutes
                    .par_iter()
                    .map(evaluate)
                    .collect::<MatchResult<_>>()?
            } else {
                substitutes
                    .iter()
                    .map(evaluate)
                    .collect::<MatchResult<_>>()?
            };
            strategies.extend(candidates.into_iter().flatten());
        }

        let mut next_rank = strategies
            .iter()
            .map(ObservationStrategy::rank)
            .max()
            .map_or(0, |r| r + 1);
        for &t in &concept.traits {
            strategies.push(self.deferred_strategy(lattice, observable, t, next_rank)?);
            next_rank += 1;
        }

        if strategies.is_empty() {
            if let Some(predicate) = unsubstitutable {
                return Err(StrategyError::NoSubstitutions {
                    urn: lattice.urn(predicate)?,
                }
                .into());
            }
        }

        strategies.sort_by_key(ObservationStrategy::rank);
        tracing::debug!(
            observable = %concept.urn,
            strategies = strategies.len(),
            predicates = predicates.len(),
            "inferred strategies"
        );
        Ok(strategies)
    }

    /// Infer for the bare observable, then re-apply the value operators to
    /// each resulting strategy.
    fn with_value_operators(
        &self,
        lattice: &ConceptLattice,
        matcher: &SemanticMatcher,
        cache: CacheHandle<'_>,
        observable: &Observable,
        scope: &dyn ContextScope,
    ) -> MatchResult<Vec<ObservationStrategy>> {
        let bare = observable.to_builder().without_value_operators().build();
        let nested = self.infer(lattice, matcher, cache, &bare, scope)?;
        Ok(nested
            .into_iter()
            .map(|strategy| {
                let mut builder =
                    ObservationStrategy::builder(observable.clone(), StrategyOrigin::ValueOperators)
                        .rank(strategy.rank())
                        .resolve_strategy(strategy);
                for operation in observable.value_operators() {
                    builder = builder.apply(ServiceCall::for_value_operation(operation));
                }
                builder.build()
            })
            .collect())
    }

    #[allow(clippy::too_many_arguments)]
    fn substitution_strategy(
        &self,
        lattice: &ConceptLattice,
        matcher: &SemanticMatcher,
        cache: CacheHandle<'_>,
        observable: &Observable,
        scope: &dyn ContextScope,
        predicate: ConceptId,
        substitute: ConceptId,
    ) -> MatchResult<Option<ObservationStrategy>> {
        let original = observable.concept_id();
        let concretized = lattice.substitute_predicate(original, predicate, substitute)?;
        let substitutions = Substitutions::from([(predicate, substitute)]);
        let request = DistanceRequest {
            from: original,
            to: concretized,
            context: scope.context(),
            compare_inherency: true,
            substitutions: Some(&substitutions),
        };
        let Some(penalty) = matcher.distance(lattice, cache, &request)?.penalty() else {
            tracing::trace!(predicate = %predicate, substitute = %substitute, "substitution rejected");
            return Ok(None);
        };
        let target = observable
            .to_builder()
            .with_concept(concretized)
            .without_generics()
            .build();
        Ok(Some(
            ObservationStrategy::builder(
                target.clone(),
                StrategyOrigin::Substitution {
                    predicate,
                    substitute,
                },
            )
            .rank(penalty.saturating_add(1))
            .observe(target)
            .build(),
        ))
    }

    /// Resolve the observable without `predicate`, classify the result by
    /// the predicate's family and keep the members carrying `predicate`.
    fn deferred_strategy(
        &self,
        lattice: &ConceptLattice,
        observable: &Observable,
        predicate: ConceptId,
        rank: u32,
    ) -> MatchResult<ObservationStrategy> {
        let naked_id = lattice.without_predicate(observable.concept_id(), predicate)?;
        let naked = observable
            .to_builder()
            .with_concept(naked_id)
            .without_generics()
            .build();
        let family = lattice.core_observable(predicate)?.unwrap_or(predicate);
        let classifier_id =
            lattice.intern(ConceptSpec::derived(family).with(RelationSlot::Inherent, naked_id))?;
        let classifier = Observable::builder(classifier_id, DescriptionType::Classification).build();

        let origin = StrategyOrigin::Deferred { predicate };
        let inner = ObservationStrategy::builder(naked.clone(), origin)
            .rank(rank)
            .observe(naked)
            .resolve(classifier)
            .apply(ServiceCall::filter_by_trait(predicate, naked_id))
            .build();
        Ok(ObservationStrategy::builder(observable.clone(), origin)
            .rank(rank)
            .resolve_strategy(inner)
            .build())
    }
}

fn direct_strategy(observable: &Observable) -> ObservationStrategy {
    let mut builder = ObservationStrategy::builder(observable.clone(), StrategyOrigin::Direct)
        .rank(0)
        .observe(observable.clone());
    if observable.description() == DescriptionType::Instantiation {
        builder = builder.resolve(
            observable
                .to_builder()
                .with_description(DescriptionType::Acknowledgement)
                .build(),
        );
    }
    builder.build()
}
