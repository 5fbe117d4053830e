//! Structural compatibility between two observables.
//!
//! Compatibility is a yes/no check, independent of the distance engine: `a`
//! is compatible with `b` if an observation of `a` can stand in wherever `b`
//! is required. Cores must be related by `is`, inherency must be compatible
//! in turn, and `a` must carry every trait and role `b` asks for.

use crate::concept::{ConceptId, SemanticType};
use crate::error::MatchResult;
use crate::lattice::ConceptGraph;

/// Options tightening or loosening [`compatible`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompatibilityFlags {
    /// Cores must be identical rather than related by `is`.
    pub require_same_core: bool,
    /// A role of the candidate that generalizes a required role satisfies it.
    pub role_parent_closure: bool,
}

impl CompatibilityFlags {
    pub fn same_core(mut self) -> Self {
        self.require_same_core = true;
        self
    }

    pub fn role_parent_closure(mut self) -> Self {
        self.role_parent_closure = true;
        self
    }
}

/// Can `candidate` be used where `required` is asked for?
pub fn compatible(
    graph: &dyn ConceptGraph,
    candidate: ConceptId,
    required: ConceptId,
    flags: CompatibilityFlags,
) -> MatchResult<bool> {
    if candidate == required {
        return Ok(true);
    }

    let configurations = graph.has_type(candidate, SemanticType::Configuration)?
        && graph.has_type(required, SemanticType::Configuration)?;
    if !configurations
        && !(graph.has_type(candidate, SemanticType::Observable)?
            && graph.has_type(required, SemanticType::Observable)?)
    {
        return Ok(false);
    }

    if graph.is_negated(candidate)? != graph.is_negated(required)? {
        return Ok(false);
    }

    let (Some(core1), Some(core2)) = (
        graph.core_observable(candidate)?,
        graph.core_observable(required)?,
    ) else {
        return Ok(false);
    };
    let cores = if flags.require_same_core {
        core1 == core2
    } else {
        graph.is(core1, core2)?
    };
    if !cores {
        return Ok(false);
    }

    match (graph.inherent(candidate)?, graph.inherent(required)?) {
        (None, Some(_)) => return Ok(false),
        (Some(own), Some(wanted)) => {
            if !compatible(graph, own, wanted, CompatibilityFlags::default())? {
                return Ok(false);
            }
        }
        _ => {}
    }

    for t in graph.traits(required)? {
        if !graph.has_trait(candidate, t)? {
            return Ok(false);
        }
    }

    for r in graph.roles(required)? {
        let satisfied = graph.has_role(candidate, r)?
            || (flags.role_parent_closure && has_parent_role(graph, candidate, r)?);
        if !satisfied {
            return Ok(false);
        }
    }

    Ok(true)
}

/// True if some role of `id` is an ancestor of `role`.
fn has_parent_role(graph: &dyn ConceptGraph, id: ConceptId, role: ConceptId) -> MatchResult<bool> {
    for own in graph.roles(id)? {
        if graph.is(role, own)? {
            return Ok(true);
        }
    }
    Ok(false)
}
