//! Syntactic pattern matching over declaration trees.
//!
//! A cheap structural filter run before (or instead of) the distance engine.
//! Atomic patterns reduce to subsumption; anything else is compared node by
//! node against the candidate's declaration. Pattern nodes constrain, and
//! whatever a pattern leaves out is unconstrained.

use std::sync::Arc;

use crate::cache::CacheHandle;
use crate::concept::{ConceptId, Connector, Semantics, is_atomic_urn};
use crate::declaration::{Declaration, DeclarationSource};
use crate::error::{MatchResult, PatternError};
use crate::lattice::ConceptGraph;
use crate::observable::{ValueOperand, ValueOperation};

/// The syntactic pattern matcher.
#[derive(Debug, Clone, Default)]
pub struct PatternMatcher;

impl PatternMatcher {
    pub fn new() -> Self {
        Self
    }

    /// Does `candidate` match `pattern`?
    ///
    /// Results for operator-free pairs are memoized by URN pair.
    pub fn matches(
        &self,
        graph: &dyn ConceptGraph,
        source: &dyn DeclarationSource,
        cache: CacheHandle<'_>,
        candidate: &dyn Semantics,
        pattern: &dyn Semantics,
    ) -> MatchResult<bool> {
        let candidate_ops = candidate.value_operators();
        let pattern_ops = pattern.value_operators();
        if !self.operators_match(graph, candidate_ops, pattern_ops)? {
            return Ok(false);
        }
        let (c, p) = (candidate.concept(), pattern.concept());
        if !candidate_ops.is_empty() || !pattern_ops.is_empty() {
            return self.match_concepts(graph, source, cache, c, p);
        }
        let key = (graph.concept(c)?.urn.clone(), graph.concept(p)?.urn.clone());
        cache.caches.matches.get_or_try_insert_with(key, cache.stamp, cache.epoch(), || {
            self.match_concepts(graph, source, cache, c, p)
        })
    }

    fn match_concepts(
        &self,
        graph: &dyn ConceptGraph,
        source: &dyn DeclarationSource,
        cache: CacheHandle<'_>,
        candidate: ConceptId,
        pattern: ConceptId,
    ) -> MatchResult<bool> {
        let pattern_urn = graph.concept(pattern)?.urn.clone();
        if is_atomic_urn(&pattern_urn) {
            return graph.is(candidate, pattern);
        }
        let candidate_urn = graph.concept(candidate)?.urn.clone();
        let (Some(candidate), Some(pattern)) = (
            self.declaration(graph, source, cache, &candidate_urn)?,
            self.declaration(graph, source, cache, &pattern_urn)?,
        ) else {
            return Ok(false);
        };
        self.match_tree(graph, &candidate, &pattern)
    }

    /// Parsed declaration for `urn`, memoized per URN.
    fn declaration(
        &self,
        graph: &dyn ConceptGraph,
        source: &dyn DeclarationSource,
        cache: CacheHandle<'_>,
        urn: &str,
    ) -> MatchResult<Option<Arc<Declaration>>> {
        let found = cache.caches.declarations.load(
            urn.to_string(),
            cache.stamp,
            cache.epoch(),
            || -> MatchResult<_> { Ok(source.declaration(urn)?.map(Arc::new)) },
        )?;
        if found.is_none() && graph.lookup(urn).is_some() {
            return Err(PatternError::MissingDeclaration {
                urn: urn.to_string(),
            }
            .into());
        }
        Ok(found)
    }

    /// Recursive structural match. Recursion only descends into pattern
    /// sub-trees, so it is bounded by the pattern's depth.
    pub fn match_tree(
        &self,
        graph: &dyn ConceptGraph,
        candidate: &Declaration,
        pattern: &Declaration,
    ) -> MatchResult<bool> {
        if pattern.is_atomic() {
            let target = pattern.concept.or_else(|| graph.lookup(&pattern.urn));
            return match target {
                Some(target) => self.match_atomic(graph, candidate, target),
                None => Ok(false),
            };
        }

        if let Some(pattern_compound) = &pattern.compound {
            let arity = pattern_compound.operands.len();
            if arity != 2 {
                return Err(PatternError::CompoundArity {
                    urn: pattern.urn.clone(),
                    arity,
                }
                .into());
            }
            let Some(candidate_compound) = &candidate.compound else {
                return Ok(false);
            };
            if candidate_compound.connector != pattern_compound.connector
                || candidate_compound.operands.len() < 2
            {
                return Ok(false);
            }
            let head = &candidate_compound.operands[0];
            let tail = Declaration::fold_tail(
                candidate_compound.connector,
                candidate_compound.operands[1..].to_vec(),
            );
            return Ok(self.match_tree(graph, head, &pattern_compound.operands[0])?
                && self.match_tree(graph, &tail, &pattern_compound.operands[1])?);
        }

        if candidate.collective != pattern.collective || candidate.negated != pattern.negated {
            return Ok(false);
        }

        match (&candidate.modifier, &pattern.modifier) {
            (None, None) => {}
            (Some(cm), Some(pm)) => {
                if cm.operator != pm.operator || !self.match_tree(graph, &cm.argument, &pm.argument)? {
                    return Ok(false);
                }
                if let Some(pattern_comparison) = &pm.comparison {
                    let Some(candidate_comparison) = &cm.comparison else {
                        return Ok(false);
                    };
                    if !self.match_tree(graph, candidate_comparison, pattern_comparison)? {
                        return Ok(false);
                    }
                }
            }
            _ => return Ok(false),
        }

        if let Some(pattern_observable) = &pattern.observable {
            let main = candidate.observable.as_deref().unwrap_or(candidate);
            if !self.match_tree(graph, main, pattern_observable)? {
                return Ok(false);
            }
        }

        for (wanted, available) in [
            (&pattern.traits, &candidate.traits),
            (&pattern.roles, &candidate.roles),
        ] {
            for p in wanted {
                if !self.any_matches(graph, available, p)? {
                    return Ok(false);
                }
            }
        }

        for (slot, pattern_value) in &pattern.slots {
            let Some(candidate_value) = candidate.slots.get(slot) else {
                return Ok(false);
            };
            if !self.match_tree(graph, candidate_value, pattern_value)? {
                return Ok(false);
            }
        }

        self.operators_match(graph, &candidate.value_operators, &pattern.value_operators)
    }

    fn any_matches(
        &self,
        graph: &dyn ConceptGraph,
        candidates: &[Declaration],
        pattern: &Declaration,
    ) -> MatchResult<bool> {
        for candidate in candidates {
            if self.match_tree(graph, candidate, pattern)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Atomic pattern against any candidate tree. Compound candidates without
    /// an interned concept use set semantics: an intersection matches if any
    /// operand does, a union only if all operands do.
    fn match_atomic(
        &self,
        graph: &dyn ConceptGraph,
        candidate: &Declaration,
        target: ConceptId,
    ) -> MatchResult<bool> {
        if let Some(id) = candidate.concept {
            return graph.is(id, target);
        }
        let Some(compound) = &candidate.compound else {
            return Ok(false);
        };
        match compound.connector {
            Connector::Intersection => {
                for operand in &compound.operands {
                    if self.match_atomic(graph, operand, target)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Connector::Union => {
                for operand in &compound.operands {
                    if !self.match_atomic(graph, operand, target)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        }
    }

    /// Value operators: a pattern without operators accepts any; otherwise
    /// the lists must agree in length, operators and operands, in order.
    pub fn operators_match(
        &self,
        graph: &dyn ConceptGraph,
        candidate: &[ValueOperation],
        pattern: &[ValueOperation],
    ) -> MatchResult<bool> {
        if pattern.is_empty() {
            return Ok(true);
        }
        if candidate.len() != pattern.len() {
            return Ok(false);
        }
        for (c, p) in candidate.iter().zip(pattern) {
            if c.operator != p.operator || !operand_matches(graph, &c.operand, &p.operand)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

fn operand_matches(
    graph: &dyn ConceptGraph,
    candidate: &ValueOperand,
    pattern: &ValueOperand,
) -> MatchResult<bool> {
    Ok(match (candidate, pattern) {
        (_, ValueOperand::Any) => true,
        (ValueOperand::Literal(a), ValueOperand::Literal(b)) => a == b,
        (ValueOperand::Concept(a), ValueOperand::Concept(b)) => graph.is(*a, *b)?,
        _ => false,
    })
}
