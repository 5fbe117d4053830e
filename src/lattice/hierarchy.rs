//! `is-a` hierarchy walks over the lattice digraph.
//!
//! Edges point from child to parent. Walks are breadth-first with a visited
//! set, so a malformed (cyclic) hierarchy never loops; [`check_acyclic`]
//! rejects such hierarchies up front when a worldview is loaded.
//!
//! [`check_acyclic`]: ConceptLattice::check_acyclic

use std::collections::{HashSet, VecDeque};

use petgraph::Direction;
use petgraph::graph::NodeIndex;

use crate::concept::{ConceptId, Connector, SemanticType};
use crate::error::{LatticeError, MatchResult};

use super::{ConceptGraph, ConceptLattice};

fn node(id: ConceptId) -> NodeIndex {
    NodeIndex::new(id.index())
}

impl ConceptLattice {
    fn neighbors(&self, id: ConceptId, direction: Direction) -> MatchResult<Vec<ConceptId>> {
        let graph = self.hierarchy.read().expect("hierarchy lock poisoned");
        if id.index() >= graph.node_count() {
            return Err(LatticeError::UnknownConcept { id: id.get() }.into());
        }
        // petgraph yields the most recently added edge first.
        let mut out: Vec<ConceptId> = graph
            .neighbors_directed(node(id), direction)
            .filter_map(|n| graph.node_weight(n).copied())
            .collect();
        out.reverse();
        Ok(out)
    }

    /// Direct parents in declaration order.
    pub fn direct_parents(&self, id: ConceptId) -> MatchResult<Vec<ConceptId>> {
        self.neighbors(id, Direction::Outgoing)
    }

    /// Direct children in declaration order.
    pub fn children(&self, id: ConceptId) -> MatchResult<Vec<ConceptId>> {
        self.neighbors(id, Direction::Incoming)
    }

    /// `id` followed by all its ancestors, breadth-first.
    pub fn ancestors_inclusive(&self, id: ConceptId) -> MatchResult<Vec<ConceptId>> {
        let mut visited = HashSet::from([id]);
        let mut order = vec![id];
        let mut queue = VecDeque::from([id]);
        while let Some(current) = queue.pop_front() {
            for parent in self.direct_parents(current)? {
                if visited.insert(parent) {
                    order.push(parent);
                    queue.push_back(parent);
                }
            }
        }
        Ok(order)
    }

    /// All descendants of `id` (excluding `id`), breadth-first.
    pub fn descendants(&self, id: ConceptId) -> MatchResult<Vec<ConceptId>> {
        let mut visited = HashSet::from([id]);
        let mut order = Vec::new();
        let mut queue = VecDeque::from([id]);
        while let Some(current) = queue.pop_front() {
            for child in self.children(current)? {
                if visited.insert(child) {
                    order.push(child);
                    queue.push_back(child);
                }
            }
        }
        Ok(order)
    }

    /// Non-abstract descendants of `id` sharing its predicate kind, at most
    /// `limit` of them, nearest first.
    pub fn concrete_descendants(&self, id: ConceptId, limit: usize) -> MatchResult<Vec<ConceptId>> {
        let root = self.concept(id)?;
        let mut out = Vec::new();
        for candidate in self.descendants(id)? {
            if out.len() >= limit {
                break;
            }
            let concept = self.concept(candidate)?;
            if concept.is_abstract
                || concept.observable.is_some()
                || concept.modifier.is_some()
                || concept.compound.is_some()
            {
                continue;
            }
            if root.is(SemanticType::Predicate) && !concept.is(SemanticType::Predicate) {
                continue;
            }
            out.push(candidate);
        }
        Ok(out)
    }

    pub(crate) fn subsumes(&self, a: ConceptId, b: ConceptId) -> MatchResult<bool> {
        if a == b {
            return Ok(true);
        }
        let candidate = self.concept(a)?;
        if let Some(compound) = candidate
            .compound
            .as_ref()
            .filter(|c| c.connector == Connector::Union)
        {
            for &operand in &compound.operands {
                if !self.subsumes(operand, b)? {
                    return Ok(false);
                }
            }
            return Ok(true);
        }
        let target = self.concept(b)?;
        if let Some(compound) = &target.compound {
            return match compound.connector {
                Connector::Union => {
                    for &operand in &compound.operands {
                        if self.subsumes(a, operand)? {
                            return Ok(true);
                        }
                    }
                    Ok(false)
                }
                Connector::Intersection => {
                    if self.ancestors_inclusive(a)?.contains(&b) {
                        return Ok(true);
                    }
                    for &operand in &compound.operands {
                        if !self.subsumes(a, operand)? {
                            return Ok(false);
                        }
                    }
                    Ok(true)
                }
            };
        }
        if self.is_negated(a)? != self.is_negated(b)? {
            return Ok(false);
        }
        Ok(self.ancestors_inclusive(a)?.contains(&b))
    }

    /// For a predicate, the first parent if it is itself a non-root predicate.
    pub(crate) fn predicate_family_step(&self, id: ConceptId) -> MatchResult<Option<ConceptId>> {
        let Some(&first) = self.direct_parents(id)?.first() else {
            return Ok(None);
        };
        if !self.concept(first)?.is(SemanticType::Predicate) {
            return Ok(None);
        }
        if self.direct_parents(first)?.is_empty() {
            return Ok(None);
        }
        Ok(Some(first))
    }

    /// Add an `is-a` edge between two existing concepts.
    ///
    /// This changes the meaning of concepts already in the lattice, so on a
    /// loaded worldview it must go through `Reasoner::update_worldview`.
    pub fn assert_is_a(&mut self, child: ConceptId, parent: ConceptId) -> MatchResult<()> {
        self.concept(child)?;
        self.concept(parent)?;
        let graph = self.hierarchy.get_mut().expect("hierarchy lock poisoned");
        if graph.find_edge(node(child), node(parent)).is_none() {
            graph.add_edge(node(child), node(parent), ());
        }
        Ok(())
    }

    /// Reject hierarchies containing an `is-a` cycle.
    pub fn check_acyclic(&self) -> MatchResult<()> {
        let cycle_node = {
            let graph = self.hierarchy.read().expect("hierarchy lock poisoned");
            match petgraph::algo::toposort(&*graph, None) {
                Ok(_) => return Ok(()),
                Err(cycle) => graph.node_weight(cycle.node_id()).copied(),
            }
        };
        let urn = match cycle_node {
            Some(id) => self.concept(id)?.urn.clone(),
            None => String::from("<unknown>"),
        };
        tracing::warn!(urn = %urn, "is-a cycle in worldview");
        Err(LatticeError::HierarchyCycle { urn }.into())
    }
}

#[cfg(test)]
mod tests {
    use super::super::ConceptSpec;
    use super::super::fixtures::test_lattice;
    use super::*;
    use crate::concept::Connector;

    #[test]
    fn parents_in_declaration_order() {
        let fx = test_lattice();
        let both = fx
            .lattice
            .intern(
                ConceptSpec::named("earth:Peak", [SemanticType::Observable, SemanticType::Subject])
                    .is_a(fx.mountain)
                    .is_a(fx.region),
            )
            .unwrap();
        assert_eq!(fx.lattice.parents(both).unwrap(), vec![fx.mountain, fx.region]);
        assert_eq!(fx.lattice.children(fx.size).unwrap(), vec![fx.big, fx.small]);
    }

    #[test]
    fn subsumption_is_transitive_and_reflexive() {
        let fx = test_lattice();
        assert!(fx.lattice.is(fx.volcano, fx.region).unwrap());
        assert!(fx.lattice.is(fx.volcano, fx.volcano).unwrap());
        assert!(!fx.lattice.is(fx.region, fx.volcano).unwrap());
        assert!(!fx.lattice.is(fx.elevation, fx.lidar_elevation).unwrap());
    }

    #[test]
    fn subsumption_over_compounds() {
        let fx = test_lattice();
        let big_or_small = fx
            .lattice
            .intern(ConceptSpec::compound(Connector::Union, [fx.big, fx.small]))
            .unwrap();
        assert!(fx.lattice.is(fx.big, big_or_small).unwrap());
        assert!(fx.lattice.is(big_or_small, fx.size).unwrap());
        assert!(!fx.lattice.is(fx.lidar, big_or_small).unwrap());

        let lidar_and_big = fx
            .lattice
            .intern(ConceptSpec::compound(Connector::Intersection, [fx.lidar, fx.big]))
            .unwrap();
        assert!(fx.lattice.is(lidar_and_big, fx.method).unwrap());
        assert!(fx.lattice.is(lidar_and_big, fx.size).unwrap());
        assert!(!fx.lattice.is(fx.lidar, lidar_and_big).unwrap());
    }

    #[test]
    fn negation_is_not_subsumed_by_its_base() {
        let fx = test_lattice();
        let not_elevation = fx
            .lattice
            .intern(ConceptSpec::derived(fx.elevation).negated())
            .unwrap();
        assert!(fx.lattice.parents(not_elevation).unwrap().is_empty());
        assert!(!fx.lattice.is(not_elevation, fx.elevation).unwrap());
        assert!(!fx.lattice.is(fx.elevation, not_elevation).unwrap());
        assert!(fx.lattice.is_negated(not_elevation).unwrap());

        // A concept qualifying a negation keeps its polarity.
        let big_not_elevation = fx
            .lattice
            .intern(ConceptSpec::derived(not_elevation).with_trait(fx.big))
            .unwrap();
        assert!(fx.lattice.is(big_not_elevation, not_elevation).unwrap());
        assert!(!fx.lattice.is(big_not_elevation, fx.elevation).unwrap());

        let either = fx
            .lattice
            .intern(ConceptSpec::compound(Connector::Union, [not_elevation, fx.precipitation]))
            .unwrap();
        assert!(fx.lattice.is(not_elevation, either).unwrap());
        assert!(!fx.lattice.is(fx.elevation, either).unwrap());
    }

    #[test]
    fn concrete_descendants_skip_abstract_and_respect_limit() {
        let fx = test_lattice();
        assert_eq!(
            fx.lattice.concrete_descendants(fx.predicate, 10).unwrap(),
            vec![fx.big, fx.small, fx.lidar, fx.radar]
        );
        assert_eq!(fx.lattice.concrete_descendants(fx.size, 1).unwrap(), vec![fx.big]);
    }

    #[test]
    fn cycles_are_detected() {
        let mut fx = test_lattice();
        assert!(fx.lattice.check_acyclic().is_ok());
        fx.lattice.assert_is_a(fx.region, fx.volcano).unwrap();
        let err = fx.lattice.check_acyclic().unwrap_err();
        assert!(matches!(
            err,
            crate::error::MatchError::Lattice(LatticeError::HierarchyCycle { .. })
        ));
        // Walks still terminate on the cyclic graph.
        assert!(fx.lattice.is(fx.region, fx.mountain).unwrap());
    }

    #[test]
    fn assert_is_a_is_idempotent() {
        let mut fx = test_lattice();
        fx.lattice.assert_is_a(fx.lidar_elevation, fx.elevation).unwrap();
        assert_eq!(fx.lattice.parents(fx.lidar_elevation).unwrap(), vec![fx.elevation]);
    }
}
