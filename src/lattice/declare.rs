//! Declaring and interning concepts.
//!
//! A [`ConceptSpec`] describes a concept by structure. Interning renders its
//! canonical URN, and returns the existing id when a structurally identical
//! concept is already present. New concepts are always leaves, so interning
//! never changes the answer to any query about concepts already in the lattice.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;

use crate::concept::{
    Compound, Concept, ConceptId, Connector, RelationSlot, Relations, SemanticModifier,
    SemanticType, SemanticTypes, UnaryOperator, is_atomic_urn,
};
use crate::error::{LatticeError, MatchResult};

use super::{ConceptGraph, ConceptLattice};

/// Structural description of a concept to intern.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConceptSpec {
    name: Option<String>,
    types: SemanticTypes,
    parents: Vec<ConceptId>,
    observable: Option<ConceptId>,
    traits: Vec<ConceptId>,
    roles: Vec<ConceptId>,
    relations: Relations,
    modifier: Option<SemanticModifier>,
    compound: Option<Compound>,
    negated: bool,
    collective: bool,
    is_abstract: bool,
}

impl ConceptSpec {
    /// A named, declared concept such as `geography:Elevation`.
    pub fn named(urn: impl Into<String>, types: impl Into<SemanticTypes>) -> Self {
        Self {
            name: Some(urn.into()),
            types: types.into(),
            ..Self::default()
        }
    }

    /// A concept derived from `base` by adding predicates or relations.
    pub fn derived(base: ConceptId) -> Self {
        Self {
            observable: Some(base),
            ..Self::default()
        }
    }

    /// A semantic modifier applied to `argument`, e.g. `presence of X`.
    pub fn modified(
        operator: UnaryOperator,
        argument: ConceptId,
        comparison: Option<ConceptId>,
    ) -> Self {
        Self {
            modifier: Some(SemanticModifier {
                operator,
                argument,
                comparison,
            }),
            ..Self::default()
        }
    }

    /// A union or intersection of operands.
    pub fn compound(connector: Connector, operands: impl IntoIterator<Item = ConceptId>) -> Self {
        Self {
            compound: Some(Compound {
                connector,
                operands: operands.into_iter().collect(),
            }),
            ..Self::default()
        }
    }

    /// Rebuild the spec of an interned concept.
    pub(crate) fn from_concept(concept: &Concept, parents: Vec<ConceptId>) -> Self {
        let explicit: Vec<ConceptId> = parents
            .into_iter()
            .filter(|p| Some(*p) != concept.observable)
            .filter(|p| {
                !concept
                    .compound
                    .as_ref()
                    .is_some_and(|c| c.connector == Connector::Intersection && c.operands.contains(p))
            })
            .collect();
        let derived = concept.observable.is_some()
            || concept.modifier.is_some()
            || concept.compound.is_some();
        Self {
            name: (!derived).then(|| concept.urn.clone()),
            types: concept.types.clone(),
            parents: explicit,
            observable: concept.observable,
            traits: concept.traits.clone(),
            roles: concept.roles.clone(),
            relations: concept.relations,
            modifier: concept.modifier,
            compound: concept.compound.clone(),
            negated: concept.negated,
            collective: concept.collective,
            is_abstract: concept.is_abstract,
        }
    }

    pub fn is_a(mut self, parent: ConceptId) -> Self {
        if !self.parents.contains(&parent) {
            self.parents.push(parent);
        }
        self
    }

    pub fn with_trait(mut self, t: ConceptId) -> Self {
        self.traits.push(t);
        self
    }

    pub fn with_role(mut self, r: ConceptId) -> Self {
        self.roles.push(r);
        self
    }

    /// Fill a relation slot.
    pub fn with(mut self, slot: RelationSlot, value: ConceptId) -> Self {
        self.relations.set(slot, Some(value));
        self
    }

    pub fn negated(mut self) -> Self {
        self.negated = true;
        self
    }

    pub fn collective(mut self) -> Self {
        self.collective = true;
        self
    }

    pub fn mark_abstract(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    fn has_qualifiers(&self) -> bool {
        !self.traits.is_empty()
            || !self.roles.is_empty()
            || !self.relations.is_empty()
            || self.negated
            || self.collective
    }

    fn invalid(message: impl Into<String>) -> LatticeError {
        LatticeError::InvalidDeclaration {
            message: message.into(),
        }
    }

    fn validate(&self) -> Result<(), LatticeError> {
        let forms = [
            self.name.is_some(),
            self.observable.is_some(),
            self.modifier.is_some(),
            self.compound.is_some(),
        ];
        if forms.iter().filter(|f| **f).count() != 1 {
            return Err(Self::invalid(
                "a concept is exactly one of: named, derived, modified or compound",
            ));
        }
        if self.observable.is_none() && self.has_qualifiers() {
            return Err(Self::invalid(
                "predicates, relations and flags require a base observable",
            ));
        }
        if let Some(compound) = &self.compound {
            if compound.operands.len() < 2 {
                return Err(Self::invalid(format!(
                    "{} needs at least two operands",
                    compound.connector.keyword()
                )));
            }
        }
        if self.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(LatticeError::EmptyUrn);
        }
        Ok(())
    }

    fn referenced(&self) -> Vec<ConceptId> {
        let mut ids: Vec<ConceptId> = self.parents.clone();
        ids.extend(self.observable);
        ids.extend(self.traits.iter().copied());
        ids.extend(self.roles.iter().copied());
        ids.extend(self.relations.iter().map(|(_, c)| c));
        if let Some(m) = &self.modifier {
            ids.push(m.argument);
            ids.extend(m.comparison);
        }
        if let Some(c) = &self.compound {
            ids.extend(c.operands.iter().copied());
        }
        ids
    }
}

impl ConceptLattice {
    /// Intern a concept, returning the id of the structurally identical
    /// concept if it already exists.
    pub fn intern(&self, spec: ConceptSpec) -> MatchResult<ConceptId> {
        let mut spec = spec;
        spec.validate()?;
        for id in spec.referenced() {
            self.concept(id)?;
        }
        spec.traits.sort();
        spec.traits.dedup();
        spec.roles.sort();
        spec.roles.dedup();

        // A derived concept that adds nothing is its base.
        if let Some(base) = spec.observable {
            if !spec.has_qualifiers()
                && spec.parents.is_empty()
                && !spec.is_abstract
                && spec.types.is_empty()
            {
                return Ok(base);
            }
        }

        let urn = self.render(&spec)?;
        if self.is_retired() {
            return Err(LatticeError::StaleWorldview { urn }.into());
        }
        let (types, is_abstract) = self.derive_flags(&spec)?;
        let parents = self.effective_parents(&spec);

        match self.by_urn.entry(urn.clone()) {
            Entry::Occupied(existing) => {
                let id = *existing.get();
                let concept = self.concept(id)?;
                let same = concept.types == types
                    && concept.observable == spec.observable
                    && concept.traits == spec.traits
                    && concept.roles == spec.roles
                    && concept.relations == spec.relations
                    && concept.modifier == spec.modifier
                    && concept.compound == spec.compound
                    && concept.negated == spec.negated
                    && concept.collective == spec.collective
                    && concept.is_abstract == is_abstract
                    && self.direct_parents(id)? == parents;
                if same {
                    Ok(id)
                } else {
                    Err(LatticeError::ConflictingDeclaration { urn }.into())
                }
            }
            Entry::Vacant(slot) => {
                let mut concepts = self.concepts.write().expect("concept lock poisoned");
                if self.is_retired() {
                    return Err(LatticeError::StaleWorldview { urn }.into());
                }
                let mut graph = self.hierarchy.write().expect("hierarchy lock poisoned");
                let id = ConceptId::from_index(concepts.len()).ok_or_else(|| {
                    ConceptSpec::invalid("concept arena is full")
                })?;
                concepts.push(Arc::new(Concept {
                    id,
                    urn,
                    types,
                    observable: spec.observable,
                    traits: spec.traits,
                    roles: spec.roles,
                    relations: spec.relations,
                    modifier: spec.modifier,
                    compound: spec.compound,
                    negated: spec.negated,
                    collective: spec.collective,
                    is_abstract,
                }));
                let node = graph.add_node(id);
                for parent in parents {
                    graph.add_edge(node, petgraph::graph::NodeIndex::new(parent.index()), ());
                }
                slot.insert(id);
                Ok(id)
            }
        }
    }

    /// Replace predicate `from` with `to` among the direct traits and roles of
    /// `concept`, interning the result.
    pub fn substitute_predicate(
        &self,
        concept: ConceptId,
        from: ConceptId,
        to: ConceptId,
    ) -> MatchResult<ConceptId> {
        let original = self.concept(concept)?;
        let mut spec = ConceptSpec::from_concept(&original, self.direct_parents(concept)?);
        let swap = |list: &mut Vec<ConceptId>| {
            for p in list.iter_mut() {
                if *p == from {
                    *p = to;
                }
            }
        };
        swap(&mut spec.traits);
        swap(&mut spec.roles);
        spec.is_abstract = false;
        self.intern(spec)
    }

    /// Remove predicate `predicate` from the direct traits and roles of
    /// `concept`, interning the result.
    pub fn without_predicate(
        &self,
        concept: ConceptId,
        predicate: ConceptId,
    ) -> MatchResult<ConceptId> {
        let original = self.concept(concept)?;
        let mut spec = ConceptSpec::from_concept(&original, self.direct_parents(concept)?);
        spec.traits.retain(|t| *t != predicate);
        spec.roles.retain(|r| *r != predicate);
        spec.is_abstract = false;
        if spec.observable.is_some() {
            spec.types = SemanticTypes::new();
        }
        self.intern(spec)
    }

    /// Parents implied by the structure of `spec`, then the declared ones.
    ///
    /// A negation is not a specialization of what it negates, so a negated
    /// concept gets no edge to its base.
    fn effective_parents(&self, spec: &ConceptSpec) -> Vec<ConceptId> {
        let mut parents = Vec::new();
        if !spec.negated {
            parents.extend(spec.observable);
        }
        if let Some(c) = &spec.compound {
            if c.connector == Connector::Intersection {
                parents.extend(c.operands.iter().copied());
            }
        }
        for &p in &spec.parents {
            if !parents.contains(&p) {
                parents.push(p);
            }
        }
        parents
    }

    fn derive_flags(&self, spec: &ConceptSpec) -> MatchResult<(SemanticTypes, bool)> {
        let mut types = spec.types.clone();
        let mut is_abstract = spec.is_abstract;
        if let Some(base) = spec.observable {
            let base = self.concept(base)?;
            types.extend(base.types.iter());
            is_abstract |= base.is_abstract;
        }
        if let Some(m) = &spec.modifier {
            let produced = m.operator.return_type();
            types.insert(produced);
            if produced == SemanticType::Trait {
                types.insert(SemanticType::Predicate);
            } else {
                types.insert(SemanticType::Observable);
            }
            is_abstract |= self.concept(m.argument)?.is_abstract;
        }
        if let Some(c) = &spec.compound {
            types.insert(c.connector.semantic_type());
            let mut common: Option<SemanticTypes> = None;
            for &operand in &c.operands {
                let concept = self.concept(operand)?;
                is_abstract |= concept.is_abstract;
                common = Some(match common {
                    None => concept.types.clone(),
                    Some(acc) => acc.iter().filter(|t| concept.types.contains(*t)).collect(),
                });
            }
            types.extend(common.unwrap_or_default().iter());
        }
        for &p in spec.traits.iter().chain(&spec.roles) {
            is_abstract |= self.concept(p)?.is_abstract;
        }
        Ok((types, is_abstract))
    }

    fn operand(&self, id: ConceptId) -> MatchResult<String> {
        let urn = self.urn(id)?;
        Ok(if is_atomic_urn(&urn) {
            urn
        } else {
            format!("({urn})")
        })
    }

    /// Canonical URN of a spec, rendered in declaration syntax.
    fn render(&self, spec: &ConceptSpec) -> MatchResult<String> {
        if let Some(name) = &spec.name {
            return Ok(name.trim().to_string());
        }
        if let Some(c) = &spec.compound {
            let parts = c
                .operands
                .iter()
                .map(|&o| self.operand(o))
                .collect::<MatchResult<Vec<_>>>()?;
            return Ok(parts.join(&format!(" {} ", c.connector.keyword())));
        }
        if let Some(m) = &spec.modifier {
            let mut out = format!("{} {}", m.operator.keyword(), self.operand(m.argument)?);
            if let Some(comparison) = m.comparison {
                let keyword = m.operator.comparison_keyword().unwrap_or("vs");
                out.push_str(&format!(" {keyword} {}", self.operand(comparison)?));
            }
            return Ok(out);
        }
        let mut parts: Vec<String> = Vec::new();
        if spec.negated {
            parts.push("not".into());
        }
        if spec.collective {
            parts.push("each".into());
        }
        for &p in spec.traits.iter().chain(&spec.roles) {
            parts.push(self.operand(p)?);
        }
        if let Some(base) = spec.observable {
            parts.push(self.operand(base)?);
        }
        for (slot, value) in spec.relations.iter() {
            parts.push(format!("{} {}", slot.keyword(), self.operand(value)?));
        }
        Ok(parts.join(" "))
    }
}
