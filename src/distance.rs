//! Structural semantic distance between concepts.
//!
//! [`SemanticMatcher`] decides whether a candidate concept (`from`) can stand
//! in for a target (`to`) and how loosely. The result is a [`Distance`]:
//! `Compatible(0)` is an exact match, larger penalties are looser matches, and
//! `Incompatible` means the candidate cannot be used at all. The raw negative
//! value of an incompatible result carries no ranking information.
//!
//! The comparison runs in fixed order: operators, core observable, `is-a`
//! hops, traits, roles, inherency, then the remaining relation slots. Any
//! failing stage ends the computation.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cache::CacheHandle;
use crate::concept::{ConceptId, RelationSlot, Semantics};
use crate::error::{LatticeError, MatchResult};
use crate::lattice::ConceptGraph;

/// Penalty per asserted `is-a` hop between core-compatible concepts.
pub const HOP_PENALTY: u32 = 50;
/// Penalty per trait carried by a relation target but not by the candidate's.
pub const EXTRA_TRAIT_PENALTY: i32 = 10;
/// Upper bound of a single relation component.
pub const RELATION_CAP: i32 = 100;

const UNDETERMINED: i32 = -100;
const MISMATCH: i32 = -50;

/// Abstract predicate → concrete predicate chosen for it downstream.
pub type Substitutions = HashMap<ConceptId, ConceptId>;

/// Signed compatibility score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Distance {
    /// Usable, with the given penalty (0 = exact).
    Compatible(u32),
    /// Not usable. Always negative; the magnitude is not a grade.
    Incompatible(i32),
}

impl Distance {
    pub const EXACT: Distance = Distance::Compatible(0);

    /// Wrap a signed score.
    pub fn from_raw(raw: i64) -> Self {
        if raw >= 0 {
            Distance::Compatible(u32::try_from(raw).unwrap_or(u32::MAX))
        } else {
            Distance::Incompatible(i32::try_from(raw).unwrap_or(i32::MIN))
        }
    }

    /// The signed score.
    pub fn raw(self) -> i64 {
        match self {
            Distance::Compatible(d) => i64::from(d),
            Distance::Incompatible(d) => i64::from(d),
        }
    }

    pub fn is_compatible(self) -> bool {
        matches!(self, Distance::Compatible(_))
    }

    /// The penalty of a compatible match.
    pub fn penalty(self) -> Option<u32> {
        match self {
            Distance::Compatible(d) => Some(d),
            Distance::Incompatible(_) => None,
        }
    }
}

impl fmt::Display for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw())
    }
}

/// A negative relation component aborts the comparison with a scaled-down
/// penalty of at least 10.
fn dampen(component: i32) -> Distance {
    let scaled = (component.unsigned_abs() / 10).max(10);
    Distance::Incompatible(-i32::try_from(scaled).unwrap_or(i32::MAX))
}

/// Parameters of one distance query.
#[derive(Debug, Clone, Copy)]
pub struct DistanceRequest<'a> {
    pub from: ConceptId,
    pub to: ConceptId,
    pub context: Option<ConceptId>,
    pub compare_inherency: bool,
    pub substitutions: Option<&'a Substitutions>,
}

impl<'a> DistanceRequest<'a> {
    /// Context-free request comparing inherency.
    pub fn new(from: &dyn Semantics, to: &dyn Semantics) -> Self {
        Self {
            from: from.concept(),
            to: to.concept(),
            context: None,
            compare_inherency: true,
            substitutions: None,
        }
    }

    pub fn with_context(mut self, context: Option<&dyn Semantics>) -> Self {
        self.context = context.map(|c| c.concept());
        self
    }

    pub fn compare_inherency(mut self, compare: bool) -> Self {
        self.compare_inherency = compare;
        self
    }

    pub fn with_substitutions(mut self, substitutions: Option<&'a Substitutions>) -> Self {
        self.substitutions = substitutions.filter(|s| !s.is_empty());
        self
    }

    /// Only plain requests are memoized.
    fn cacheable(&self) -> bool {
        self.compare_inherency && self.substitutions.is_none()
    }

    fn nested(&self, from: ConceptId, to: ConceptId) -> Self {
        Self { from, to, ..*self }
    }
}

#[derive(Debug, Clone, Copy)]
enum PredicateKind {
    Trait,
    Role,
}

impl PredicateKind {
    fn of(self, graph: &dyn ConceptGraph, id: ConceptId) -> MatchResult<Vec<ConceptId>> {
        match self {
            PredicateKind::Trait => graph.traits(id),
            PredicateKind::Role => graph.roles(id),
        }
    }

    fn carried_by(self, graph: &dyn ConceptGraph, id: ConceptId, p: ConceptId) -> MatchResult<bool> {
        match self {
            PredicateKind::Trait => graph.has_trait(id, p),
            PredicateKind::Role => graph.has_role(id, p),
        }
    }
}

/// The structural distance engine.
#[derive(Debug, Clone)]
pub struct SemanticMatcher {
    max_depth: usize,
}

impl SemanticMatcher {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// Distance with memoization of plain requests.
    pub fn distance(
        &self,
        graph: &dyn ConceptGraph,
        cache: CacheHandle<'_>,
        request: &DistanceRequest<'_>,
    ) -> MatchResult<Distance> {
        if !request.cacheable() {
            return self.semantic_distance(graph, request);
        }
        let compute = || self.semantic_distance(graph, request);
        let result = match request.context {
            None => cache.caches.binary.get_or_try_insert_with(
                (request.from, request.to),
                cache.stamp,
                cache.epoch(),
                compute,
            ),
            Some(context) => cache.caches.ternary.get_or_try_insert_with(
                (request.from, request.to, context),
                cache.stamp,
                cache.epoch(),
                compute,
            ),
        }?;
        tracing::trace!(from = %request.from, to = %request.to, distance = %result, "semantic distance");
        Ok(result)
    }

    /// Uncached distance computation.
    pub fn semantic_distance(
        &self,
        graph: &dyn ConceptGraph,
        request: &DistanceRequest<'_>,
    ) -> MatchResult<Distance> {
        let (from, to) = (request.from, request.to);

        if from != to {
            let (from_core, from_ops) = graph.split_operators(from)?;
            let (to_core, to_ops) = graph.split_operators(to)?;
            if from_ops != to_ops {
                return Ok(Distance::Incompatible(MISMATCH));
            }
            if !from_ops.is_empty() {
                return self.semantic_distance(graph, &request.nested(from_core, to_core));
            }
        }

        let hops = match self.core_distance(graph, from, to, request.substitutions)? {
            Distance::Compatible(hops) => hops,
            incompatible => return Ok(incompatible),
        };
        let mut total = i64::from(hops) * i64::from(HOP_PENALTY);

        for kind in [PredicateKind::Trait, PredicateKind::Role] {
            match self.predicate_distance(graph, from, to, request.substitutions, kind)? {
                Some(added) => total += i64::from(added),
                None => return Ok(Distance::Incompatible(MISMATCH)),
            }
        }

        if request.compare_inherency {
            match (graph.direct_inherent(from)?, graph.direct_inherent(to)?) {
                (None, None) => {}
                (Some(ours), Some(its)) => {
                    let explicit = self.semantic_distance(
                        graph,
                        &request.nested(ours, its).compare_inherency(false),
                    )?;
                    match explicit {
                        Distance::Compatible(d) => total += i64::from(d),
                        Distance::Incompatible(c) => return Ok(dampen(c)),
                    }
                }
                _ => return Ok(Distance::Incompatible(MISMATCH)),
            }

            let ours = graph.inherent(from)?;
            let its = graph.inherent(to)?;
            if ours.is_some() || its.is_some() {
                let component = match (ours, its, request.context) {
                    (Some(o), _, _) if graph.is_abstract(o)? => {
                        self.relation_component(graph, Some(o), its, false)?
                    }
                    (None, Some(i), Some(context)) => {
                        self.relation_component(graph, Some(context), Some(i), false)?
                    }
                    _ => self.relation_component(graph, its, ours, false)?,
                };
                if component < 0 {
                    return Ok(dampen(component));
                }
                total += i64::from(component);
            }
        }

        for slot in RelationSlot::STRUCTURAL {
            let component = self.relation_component(
                graph,
                graph.relation(from, slot)?,
                graph.relation(to, slot)?,
                false,
            )?;
            if component < 0 {
                return Ok(dampen(component));
            }
            total += i64::from(component);
        }

        Ok(Distance::from_raw(total))
    }

    /// Compare core observables of operator-free concepts.
    ///
    /// Returns the asserted hop count on success, or the incompatibility
    /// sentinel.
    pub fn core_distance(
        &self,
        graph: &dyn ConceptGraph,
        from: ConceptId,
        to: ConceptId,
        substitutions: Option<&Substitutions>,
    ) -> MatchResult<Distance> {
        if from == to {
            return Ok(Distance::EXACT);
        }
        if graph.is_negated(from)? != graph.is_negated(to)? {
            return Ok(Distance::Incompatible(MISMATCH));
        }
        let (Some(from_core), Some(to_core)) =
            (graph.core_observable(from)?, graph.core_observable(to)?)
        else {
            return Ok(Distance::Incompatible(UNDETERMINED));
        };
        if from_core != to_core {
            // Only predicates may resolve across cores, and only within one
            // family, so a differing core is never a match.
            return Ok(Distance::Incompatible(MISMATCH));
        }
        if let Some(hops) = self.asserted_distance(graph, from, to)? {
            return Ok(Distance::Compatible(hops));
        }
        if substitutions.is_some() && self.share_base(graph, from, to)? {
            return Ok(Distance::EXACT);
        }
        Ok(Distance::Incompatible(MISMATCH))
    }

    /// Both derived from the same base with the same flags, so they differ
    /// only in predicates and relations.
    fn share_base(&self, graph: &dyn ConceptGraph, a: ConceptId, b: ConceptId) -> MatchResult<bool> {
        let (a, b) = (graph.concept(a)?, graph.concept(b)?);
        Ok(a.observable.is_some()
            && a.observable == b.observable
            && a.negated == b.negated
            && a.collective == b.collective
            && a.modifier == b.modifier
            && a.compound == b.compound)
    }

    /// Two-pass containment check of traits or roles.
    ///
    /// Returns the penalty added by substitutions, or `None` if the
    /// predicates are incompatible.
    fn predicate_distance(
        &self,
        graph: &dyn ConceptGraph,
        from: ConceptId,
        to: ConceptId,
        substitutions: Option<&Substitutions>,
        kind: PredicateKind,
    ) -> MatchResult<Option<u32>> {
        let mut added = 0u32;
        let mut accepted = HashSet::new();
        for p in kind.of(graph, from)? {
            let substitute = match substitutions {
                Some(map) if graph.is_abstract(p)? => map.get(&p).copied(),
                _ => None,
            };
            match substitute {
                Some(s) => match self.asserted_distance(graph, s, p)? {
                    Some(d) => {
                        added += d;
                        accepted.insert(s);
                    }
                    None => return Ok(None),
                },
                None => {
                    if !kind.carried_by(graph, to, p)? {
                        return Ok(None);
                    }
                }
            }
        }
        for p in kind.of(graph, to)? {
            if !accepted.contains(&p) && !kind.carried_by(graph, from, p)? {
                return Ok(None);
            }
        }
        Ok(Some(added))
    }

    /// Asymmetric comparison of one relation slot.
    ///
    /// The target side must be subsumed by the candidate side.
    fn relation_component(
        &self,
        graph: &dyn ConceptGraph,
        from_side: Option<ConceptId>,
        to_side: Option<ConceptId>,
        accept_absent: bool,
    ) -> MatchResult<i32> {
        let component = match (from_side, to_side) {
            (None, None) => 0,
            (None, Some(_)) => {
                if accept_absent {
                    50
                } else {
                    -50
                }
            }
            (Some(_), None) => -50,
            (Some(f), Some(t)) => {
                if !graph.is(t, f)? {
                    UNDETERMINED
                } else {
                    match self.asserted_distance(graph, t, f)? {
                        None => -1,
                        Some(hops) => {
                            let mut component = i32::try_from(hops).unwrap_or(RELATION_CAP);
                            for required in graph.traits(f)? {
                                if !graph.has_trait(t, required)? {
                                    return Ok(-50);
                                }
                            }
                            for extra in graph.traits(t)? {
                                if !graph.has_trait(f, extra)? {
                                    component += EXTRA_TRAIT_PENALTY;
                                }
                            }
                            component
                        }
                    }
                }
            }
        };
        Ok(component.min(RELATION_CAP))
    }

    /// Number of `is-a` hops from `from` up to `to` along the first path
    /// found, or `None` if `to` is not an ancestor.
    ///
    /// Parents are explored depth-first in declaration order, so with
    /// multiple inheritance the result need not be the shortest path.
    pub fn asserted_distance(
        &self,
        graph: &dyn ConceptGraph,
        from: ConceptId,
        to: ConceptId,
    ) -> MatchResult<Option<u32>> {
        if from == to {
            return Ok(Some(0));
        }
        let mut on_path = HashSet::new();
        let mut exhausted = HashSet::new();
        self.asserted_walk(graph, from, to, 0, &mut on_path, &mut exhausted)
    }

    fn asserted_walk(
        &self,
        graph: &dyn ConceptGraph,
        node: ConceptId,
        target: ConceptId,
        depth: usize,
        on_path: &mut HashSet<ConceptId>,
        exhausted: &mut HashSet<ConceptId>,
    ) -> MatchResult<Option<u32>> {
        if depth >= self.max_depth {
            let urn = graph.concept(node)?.urn.clone();
            tracing::warn!(urn = %urn, max_depth = self.max_depth, "asserted distance walk too deep");
            return Err(LatticeError::DepthExceeded {
                urn,
                max_depth: self.max_depth,
            }
            .into());
        }
        let parents = graph.parents(node)?;
        if parents.contains(&target) {
            return Ok(Some(1));
        }
        on_path.insert(node);
        for parent in parents {
            if on_path.contains(&parent) {
                let urn = graph.concept(parent)?.urn.clone();
                tracing::warn!(urn = %urn, "is-a cycle while computing asserted distance");
                return Err(LatticeError::HierarchyCycle { urn }.into());
            }
            if exhausted.contains(&parent) {
                continue;
            }
            if let Some(d) = self.asserted_walk(graph, parent, target, depth + 1, on_path, exhausted)? {
                on_path.remove(&node);
                return Ok(Some(d + 1));
            }
        }
        on_path.remove(&node);
        exhausted.insert(node);
        Ok(None)
    }
}
