//! Parsed declaration syntax trees.
//!
//! The pattern matcher compares concepts by the shape of their declarations
//! rather than by their resolved graph form. A [`DeclarationSource`] turns a
//! canonical URN into a [`Declaration`]; [`ConceptLattice`] provides one by
//! unfolding a concept's structure.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::concept::{
    ConceptId, Connector, RelationSlot, SemanticTypes, UnaryOperator, is_atomic_urn,
};
use crate::error::{LatticeError, MatchResult};
use crate::lattice::{ConceptGraph, ConceptLattice};
use crate::observable::ValueOperation;

/// A unary modifier in declaration form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModifierDeclaration {
    pub operator: UnaryOperator,
    pub argument: Box<Declaration>,
    pub comparison: Option<Box<Declaration>>,
}

/// A union or intersection in declaration form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompoundDeclaration {
    pub connector: Connector,
    pub operands: Vec<Declaration>,
}

/// The declaration syntax tree of a concept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Declaration {
    pub urn: String,
    /// The interned concept, when the declaration denotes one.
    pub concept: Option<ConceptId>,
    pub types: SemanticTypes,
    pub observable: Option<Box<Declaration>>,
    pub traits: Vec<Declaration>,
    pub roles: Vec<Declaration>,
    pub slots: BTreeMap<RelationSlot, Declaration>,
    pub modifier: Option<ModifierDeclaration>,
    pub compound: Option<CompoundDeclaration>,
    pub negated: bool,
    pub collective: bool,
    pub value_operators: Vec<ValueOperation>,
}

impl Declaration {
    /// A leaf declaration naming a single concept.
    pub fn atom(urn: impl Into<String>, concept: Option<ConceptId>, types: SemanticTypes) -> Self {
        Self {
            urn: urn.into(),
            concept,
            types,
            observable: None,
            traits: Vec::new(),
            roles: Vec::new(),
            slots: BTreeMap::new(),
            modifier: None,
            compound: None,
            negated: false,
            collective: false,
            value_operators: Vec::new(),
        }
    }

    /// True if the URN names a single declared concept.
    pub fn is_atomic(&self) -> bool {
        is_atomic_urn(&self.urn)
    }

    fn operand_text(&self) -> String {
        if self.is_atomic() {
            self.urn.clone()
        } else {
            format!("({})", self.urn)
        }
    }

    /// Join `operands` back into one expression.
    ///
    /// A single operand is returned as is; two or more become an uninterned
    /// compound declaration.
    pub fn fold_tail(connector: Connector, mut operands: Vec<Declaration>) -> Declaration {
        if operands.len() == 1 {
            return operands.remove(0);
        }
        let urn = operands
            .iter()
            .map(Declaration::operand_text)
            .collect::<Vec<_>>()
            .join(&format!(" {} ", connector.keyword()));
        let mut types: SemanticTypes = operands
            .first()
            .map(|d| {
                d.types
                    .iter()
                    .filter(|t| operands.iter().all(|o| o.types.contains(*t)))
                    .collect()
            })
            .unwrap_or_default();
        types.insert(connector.semantic_type());
        let mut folded = Declaration::atom(urn, None, types);
        folded.compound = Some(CompoundDeclaration {
            connector,
            operands,
        });
        folded
    }
}

/// Resolves canonical URNs to declaration syntax trees.
pub trait DeclarationSource: Send + Sync {
    /// The declaration for `urn`, or `None` if the URN is unknown.
    fn declaration(&self, urn: &str) -> MatchResult<Option<Declaration>>;
}

impl ConceptLattice {
    fn unfold(&self, id: ConceptId, depth: usize) -> MatchResult<Declaration> {
        let concept = self.concept(id)?;
        if depth > self.max_depth() {
            return Err(LatticeError::DepthExceeded {
                urn: concept.urn.clone(),
                max_depth: self.max_depth(),
            }
            .into());
        }
        let mut decl = Declaration::atom(concept.urn.clone(), Some(id), concept.types.clone());
        decl.negated = concept.negated;
        decl.collective = concept.collective;
        if let Some(base) = concept.observable {
            decl.observable = Some(Box::new(self.unfold(base, depth + 1)?));
        }
        for &t in &concept.traits {
            decl.traits.push(self.unfold(t, depth + 1)?);
        }
        for &r in &concept.roles {
            decl.roles.push(self.unfold(r, depth + 1)?);
        }
        for (slot, value) in concept.relations.iter() {
            decl.slots.insert(slot, self.unfold(value, depth + 1)?);
        }
        if let Some(m) = concept.modifier {
            decl.modifier = Some(ModifierDeclaration {
                operator: m.operator,
                argument: Box::new(self.unfold(m.argument, depth + 1)?),
                comparison: match m.comparison {
                    Some(c) => Some(Box::new(self.unfold(c, depth + 1)?)),
                    None => None,
                },
            });
        }
        if let Some(c) = &concept.compound {
            let operands = c
                .operands
                .iter()
                .map(|&o| self.unfold(o, depth + 1))
                .collect::<MatchResult<Vec<_>>>()?;
            decl.compound = Some(CompoundDeclaration {
                connector: c.connector,
                operands,
            });
        }
        Ok(decl)
    }
}

impl DeclarationSource for ConceptLattice {
    fn declaration(&self, urn: &str) -> MatchResult<Option<Declaration>> {
        match self.lookup(urn) {
            Some(id) => self.unfold(id, 0).map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lattice::ConceptSpec;
    use crate::lattice::fixtures::test_lattice;

    #[test]
    fn unknown_urn_has_no_declaration() {
        let fx = test_lattice();
        assert!(fx.lattice.declaration("geo:Unknown").unwrap().is_none());
    }

    #[test]
    fn declarations_unfold_structure() {
        let fx = test_lattice();
        let c = fx
            .lattice
            .intern(
                ConceptSpec::derived(fx.elevation)
                    .with_trait(fx.big)
                    .with(RelationSlot::Inherent, fx.mountain),
            )
            .unwrap();
        let urn = fx.lattice.urn(c).unwrap();
        let decl = fx.lattice.declaration(&urn).unwrap().unwrap();
        assert!(!decl.is_atomic());
        assert_eq!(decl.concept, Some(c));
        assert_eq!(decl.observable.as_ref().unwrap().urn, "geo:Elevation");
        assert_eq!(decl.traits.len(), 1);
        assert_eq!(decl.slots[&RelationSlot::Inherent].concept, Some(fx.mountain));
    }

    #[test]
    fn fold_tail_joins_remaining_operands() {
        let fx = test_lattice();
        let a = fx.lattice.declaration("im:Big").unwrap().unwrap();
        let b = fx.lattice.declaration("im:Lidar").unwrap().unwrap();
        let single = Declaration::fold_tail(Connector::Intersection, vec![a.clone()]);
        assert_eq!(single, a);
        let folded = Declaration::fold_tail(Connector::Intersection, vec![a, b]);
        assert_eq!(folded.urn, "im:Big and im:Lidar");
        assert!(folded.concept.is_none());
        assert_eq!(folded.compound.as_ref().unwrap().operands.len(), 2);
        assert!(folded.types.is_predicate());
    }
}
