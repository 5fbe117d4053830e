//! The concept lattice: interned concepts, `is-a` edges, and the query
//! surface the matchers consume.
//!
//! [`ConceptGraph`] is the read-only contract the distance engine, pattern
//! matcher and strategy inference are written against. [`ConceptLattice`] is
//! the in-memory implementation: an arena of immutable [`Concept`] records, a
//! `DashMap` URN index, and a `petgraph` digraph carrying child → parent edges
//! whose node indices coincide with arena slots.

pub mod declare;
pub mod hierarchy;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use dashmap::DashMap;
use petgraph::graph::DiGraph;

use crate::concept::{Concept, ConceptId, OperatorStep, RelationSlot, SemanticType};
use crate::error::{LatticeError, MatchResult};

pub use declare::ConceptSpec;

/// Default recursion bound for hierarchy walks.
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Read access to a concept hierarchy.
///
/// All methods are safe to call concurrently. Methods return errors only for
/// precondition violations (unknown ids, runaway hierarchies); a concept that
/// simply lacks a trait or relation yields `false`/`None`.
pub trait ConceptGraph: Send + Sync {
    /// The concept record for `id`.
    fn concept(&self, id: ConceptId) -> MatchResult<Arc<Concept>>;

    /// Find a concept by canonical URN.
    fn lookup(&self, urn: &str) -> Option<ConceptId>;

    /// Direct parents in declaration order.
    fn parents(&self, id: ConceptId) -> MatchResult<Vec<ConceptId>>;

    /// Subsumption: `a` equals `b` or `a` is a descendant of `b`.
    fn is(&self, a: ConceptId, b: ConceptId) -> MatchResult<bool>;

    /// Traits of `id`, including those inherited from ancestors.
    fn traits(&self, id: ConceptId) -> MatchResult<Vec<ConceptId>>;

    /// Roles of `id`, including those inherited from ancestors.
    fn roles(&self, id: ConceptId) -> MatchResult<Vec<ConceptId>>;

    /// The fundamental observed type of `id`, or `None` if undetermined.
    fn core_observable(&self, id: ConceptId) -> MatchResult<Option<ConceptId>>;

    /// Peel semantic modifiers off `id`, outermost first.
    fn split_operators(&self, id: ConceptId) -> MatchResult<(ConceptId, Vec<OperatorStep>)>;

    /// The value of `slot` as declared on `id` itself.
    fn direct_relation(&self, id: ConceptId, slot: RelationSlot) -> MatchResult<Option<ConceptId>>;

    /// The value of `slot` on `id` or, failing that, on its nearest ancestor.
    fn relation(&self, id: ConceptId, slot: RelationSlot) -> MatchResult<Option<ConceptId>>;

    /// True if some trait of `id` is-a `t`.
    fn has_trait(&self, id: ConceptId, t: ConceptId) -> MatchResult<bool> {
        for own in self.traits(id)? {
            if self.is(own, t)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// True if some role of `id` is-a `r`.
    fn has_role(&self, id: ConceptId, r: ConceptId) -> MatchResult<bool> {
        for own in self.roles(id)? {
            if self.is(own, r)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn direct_inherent(&self, id: ConceptId) -> MatchResult<Option<ConceptId>> {
        self.direct_relation(id, RelationSlot::Inherent)
    }

    fn inherent(&self, id: ConceptId) -> MatchResult<Option<ConceptId>> {
        self.relation(id, RelationSlot::Inherent)
    }

    fn is_abstract(&self, id: ConceptId) -> MatchResult<bool> {
        Ok(self.concept(id)?.is_abstract)
    }

    /// True if `id` negates its base: an odd number of `not` along its chain
    /// of base observables.
    fn is_negated(&self, id: ConceptId) -> MatchResult<bool> {
        let mut negated = false;
        let mut current = Some(id);
        while let Some(next) = current {
            let concept = self.concept(next)?;
            negated ^= concept.negated;
            current = concept.observable;
        }
        Ok(negated)
    }

    fn has_type(&self, id: ConceptId, ty: SemanticType) -> MatchResult<bool> {
        Ok(self.concept(id)?.is(ty))
    }
}

/// In-memory concept lattice.
///
/// Lock order, where more than one is taken: URN index shard, then
/// `concepts`, then `hierarchy`.
pub struct ConceptLattice {
    /// Arena of interned concepts; `ConceptId::index()` addresses it.
    concepts: RwLock<Vec<Arc<Concept>>>,
    /// Canonical URN → id.
    by_urn: DashMap<String, ConceptId>,
    /// Child → parent edges. Node `i` carries the concept in arena slot `i`.
    hierarchy: RwLock<DiGraph<ConceptId, ()>>,
    max_depth: usize,
    /// Set once the lattice stops being the current worldview.
    retired: AtomicBool,
}

impl ConceptLattice {
    /// Create an empty lattice.
    pub fn new() -> Self {
        Self::with_max_depth(DEFAULT_MAX_DEPTH)
    }

    /// Create an empty lattice with a custom hierarchy walk bound.
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            concepts: RwLock::new(Vec::new()),
            by_urn: DashMap::new(),
            hierarchy: RwLock::new(DiGraph::new()),
            max_depth,
            retired: AtomicBool::new(false),
        }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn set_max_depth(&mut self, max_depth: usize) {
        self.max_depth = max_depth;
    }

    /// True once a reasoner has replaced this lattice with another worldview.
    ///
    /// A retired lattice still answers queries, but refuses new concepts.
    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::SeqCst)
    }

    /// Refuse further interning. Interns already holding the arena lock
    /// finish first.
    pub(crate) fn retire(&self) {
        let _concepts = self.concepts.write().expect("concept lock poisoned");
        self.retired.store(true, Ordering::SeqCst);
    }

    pub(crate) fn reinstate(&self) {
        self.retired.store(false, Ordering::SeqCst);
    }

    /// Number of interned concepts.
    pub fn len(&self) -> usize {
        self.concepts.read().expect("concept lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All concept ids in interning order.
    pub fn ids(&self) -> Vec<ConceptId> {
        self.concepts
            .read()
            .expect("concept lock poisoned")
            .iter()
            .map(|c| c.id)
            .collect()
    }

    /// Canonical URN of `id`.
    pub fn urn(&self, id: ConceptId) -> MatchResult<String> {
        Ok(self.concept(id)?.urn.clone())
    }

    /// Look up a concept by URN, failing if it is not declared.
    pub fn require(&self, urn: &str) -> MatchResult<ConceptId> {
        self.lookup(urn).ok_or_else(|| {
            LatticeError::UnknownUrn {
                urn: urn.to_string(),
            }
            .into()
        })
    }

    fn collect_inherited(
        &self,
        id: ConceptId,
        select: impl Fn(&Concept) -> &[ConceptId],
    ) -> MatchResult<Vec<ConceptId>> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for ancestor in self.ancestors_inclusive(id)? {
            let concept = self.concept(ancestor)?;
            for &p in select(&concept) {
                if seen.insert(p) {
                    out.push(p);
                }
            }
        }
        Ok(out)
    }
}

impl Default for ConceptLattice {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for ConceptLattice {
    /// Deep copy with identical ids, used to stage worldview updates.
    fn clone(&self) -> Self {
        let concepts = self.concepts.read().expect("concept lock poisoned");
        let hierarchy = self.hierarchy.read().expect("hierarchy lock poisoned");
        let by_urn = concepts.iter().map(|c| (c.urn.clone(), c.id)).collect();
        Self {
            concepts: RwLock::new(concepts.clone()),
            hierarchy: RwLock::new(hierarchy.clone()),
            by_urn,
            max_depth: self.max_depth,
            retired: AtomicBool::new(false),
        }
    }
}

impl std::fmt::Debug for ConceptLattice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConceptLattice")
            .field("concepts", &self.len())
            .field("max_depth", &self.max_depth)
            .finish()
    }
}

impl ConceptGraph for ConceptLattice {
    fn concept(&self, id: ConceptId) -> MatchResult<Arc<Concept>> {
        let concepts = self.concepts.read().expect("concept lock poisoned");
        concepts
            .get(id.index())
            .cloned()
            .ok_or_else(|| LatticeError::UnknownConcept { id: id.get() }.into())
    }

    fn lookup(&self, urn: &str) -> Option<ConceptId> {
        self.by_urn.get(urn.trim()).map(|e| *e.value())
    }

    fn parents(&self, id: ConceptId) -> MatchResult<Vec<ConceptId>> {
        self.direct_parents(id)
    }

    fn is(&self, a: ConceptId, b: ConceptId) -> MatchResult<bool> {
        self.subsumes(a, b)
    }

    fn traits(&self, id: ConceptId) -> MatchResult<Vec<ConceptId>> {
        self.collect_inherited(id, |c| &c.traits)
    }

    fn roles(&self, id: ConceptId) -> MatchResult<Vec<ConceptId>> {
        self.collect_inherited(id, |c| &c.roles)
    }

    fn core_observable(&self, id: ConceptId) -> MatchResult<Option<ConceptId>> {
        let mut current = self.concept(id)?;
        let mut steps = 0usize;
        loop {
            if current.is(SemanticType::Nothing) {
                return Ok(None);
            }
            let next = match current.observable {
                Some(base) => Some(base),
                None if current.is(SemanticType::Predicate) => {
                    self.predicate_family_step(current.id)?
                }
                None => None,
            };
            let Some(next) = next else {
                return Ok(Some(current.id));
            };
            steps += 1;
            if steps > self.max_depth {
                tracing::warn!(urn = %current.urn, max_depth = self.max_depth, "core observable chain too deep");
                return Err(LatticeError::DepthExceeded {
                    urn: current.urn.clone(),
                    max_depth: self.max_depth,
                }
                .into());
            }
            current = self.concept(next)?;
        }
    }

    fn split_operators(&self, id: ConceptId) -> MatchResult<(ConceptId, Vec<OperatorStep>)> {
        let mut steps = Vec::new();
        let mut current = self.concept(id)?;
        while let Some(modifier) = current.modifier {
            if steps.len() >= self.max_depth {
                return Err(LatticeError::DepthExceeded {
                    urn: current.urn.clone(),
                    max_depth: self.max_depth,
                }
                .into());
            }
            steps.push(OperatorStep {
                operator: modifier.operator,
                comparison: modifier.comparison,
            });
            current = self.concept(modifier.argument)?;
        }
        Ok((current.id, steps))
    }

    fn direct_relation(&self, id: ConceptId, slot: RelationSlot) -> MatchResult<Option<ConceptId>> {
        Ok(self.concept(id)?.relations.get(slot))
    }

    fn relation(&self, id: ConceptId, slot: RelationSlot) -> MatchResult<Option<ConceptId>> {
        for ancestor in self.ancestors_inclusive(id)? {
            if let Some(value) = self.concept(ancestor)?.relations.get(slot) {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Shared test worldview.
    //!
    //! ```text
    //! im:Predicate ── im:Size (abstract) ── im:Big, im:Small
    //!              └─ im:Method (abstract) ── im:Lidar, im:Radar
    //! geo:Elevation ── geo:LidarElevation
    //! earth:Region ── earth:Mountain ── earth:Volcano
    //! im:Agent (role, abstract) ── im:Observer
    //! ```

    use super::*;
    use crate::concept::{SemanticType as T, SemanticTypes};

    pub struct Fixture {
        pub lattice: ConceptLattice,
        pub predicate: ConceptId,
        pub size: ConceptId,
        pub big: ConceptId,
        pub small: ConceptId,
        pub method: ConceptId,
        pub lidar: ConceptId,
        pub radar: ConceptId,
        pub agent: ConceptId,
        pub observer: ConceptId,
        pub elevation: ConceptId,
        pub lidar_elevation: ConceptId,
        pub region: ConceptId,
        pub mountain: ConceptId,
        pub volcano: ConceptId,
        pub precipitation: ConceptId,
    }

    fn trait_types() -> SemanticTypes {
        SemanticTypes::from([T::Predicate, T::Trait, T::Attribute])
    }

    pub fn test_lattice() -> Fixture {
        let lattice = ConceptLattice::new();
        let named = |urn: &str, types: SemanticTypes| {
            lattice.intern(ConceptSpec::named(urn, types)).unwrap()
        };
        let predicate = named("im:Predicate", trait_types());
        let size = lattice
            .intern(
                ConceptSpec::named("im:Size", trait_types())
                    .is_a(predicate)
                    .mark_abstract(),
            )
            .unwrap();
        let big = lattice
            .intern(ConceptSpec::named("im:Big", trait_types()).is_a(size))
            .unwrap();
        let small = lattice
            .intern(ConceptSpec::named("im:Small", trait_types()).is_a(size))
            .unwrap();
        let method = lattice
            .intern(
                ConceptSpec::named("im:Method", trait_types())
                    .is_a(predicate)
                    .mark_abstract(),
            )
            .unwrap();
        let lidar = lattice
            .intern(ConceptSpec::named("im:Lidar", trait_types()).is_a(method))
            .unwrap();
        let radar = lattice
            .intern(ConceptSpec::named("im:Radar", trait_types()).is_a(method))
            .unwrap();
        let agent = lattice
            .intern(
                ConceptSpec::named("im:Agent", SemanticTypes::from([T::Predicate, T::Role]))
                    .mark_abstract(),
            )
            .unwrap();
        let observer = lattice
            .intern(
                ConceptSpec::named("im:Observer", SemanticTypes::from([T::Predicate, T::Role]))
                    .is_a(agent),
            )
            .unwrap();
        let quality = SemanticTypes::from([T::Observable, T::Quality, T::Quantifiable]);
        let elevation = named("geo:Elevation", quality.clone());
        let lidar_elevation = lattice
            .intern(ConceptSpec::named("geo:LidarElevation", quality.clone()).is_a(elevation))
            .unwrap();
        let precipitation = named("geo:Precipitation", quality);
        let subject = SemanticTypes::from([
            T::Observable,
            T::Subject,
            T::Countable,
            T::DirectObservable,
        ]);
        let region = named("earth:Region", subject.clone());
        let mountain = lattice
            .intern(ConceptSpec::named("earth:Mountain", subject.clone()).is_a(region))
            .unwrap();
        let volcano = lattice
            .intern(ConceptSpec::named("earth:Volcano", subject).is_a(mountain))
            .unwrap();
        Fixture {
            lattice,
            predicate,
            size,
            big,
            small,
            method,
            lidar,
            radar,
            agent,
            observer,
            elevation,
            lidar_elevation,
            region,
            mountain,
            volcano,
            precipitation,
        }
    }
}
