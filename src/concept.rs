//! Core concept types for the matching engine.
//!
//! Concepts are the interned, immutable nodes of the concept lattice. Every
//! concept is identified by a [`ConceptId`] (a stable arena index) and
//! described by a [`Concept`] record. The [`Semantics`] trait lets the
//! matchers accept both raw concept ids and richer wrappers such as
//! [`Observable`](crate::observable::Observable) uniformly.

use std::collections::BTreeSet;
use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};

use crate::observable::ValueOperation;

/// Niche-optimized arena index of an interned concept.
///
/// `Option<ConceptId>` has the same size as `ConceptId`, which keeps relation
/// slots compact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct ConceptId(NonZeroU32);

impl ConceptId {
    /// Create a `ConceptId` from a raw value. Returns `None` for zero.
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(ConceptId)
    }

    /// The id for arena slot `index`.
    pub(crate) fn from_index(index: usize) -> Option<Self> {
        u32::try_from(index + 1).ok().and_then(Self::new)
    }

    /// Get the underlying value.
    pub fn get(self) -> u32 {
        self.0.get()
    }

    /// Arena slot of this concept.
    pub fn index(self) -> usize {
        (self.0.get() - 1) as usize
    }
}

impl std::fmt::Display for ConceptId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "concept:{}", self.0)
    }
}

/// Declared semantic kind of a concept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SemanticType {
    Observable,
    Predicate,
    Quality,
    Quantifiable,
    Process,
    Subject,
    Event,
    Relationship,
    Agent,
    Configuration,
    Countable,
    DirectObservable,
    Trait,
    Identity,
    Attribute,
    Realm,
    Ordering,
    Role,
    Domain,
    Class,
    Presence,
    /// Marks a logically inconsistent concept.
    Nothing,
    Union,
    Intersection,
}

/// An ordered set of [`SemanticType`] tags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SemanticTypes(BTreeSet<SemanticType>);

impl SemanticTypes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, ty: SemanticType) -> bool {
        self.0.contains(&ty)
    }

    pub fn insert(&mut self, ty: SemanticType) -> bool {
        self.0.insert(ty)
    }

    pub fn remove(&mut self, ty: SemanticType) -> bool {
        self.0.remove(&ty)
    }

    pub fn iter(&self) -> impl Iterator<Item = SemanticType> + '_ {
        self.0.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True for concepts that can be observed (as opposed to predicates).
    pub fn is_observable(&self) -> bool {
        self.contains(SemanticType::Observable)
    }

    /// True for traits and roles.
    pub fn is_predicate(&self) -> bool {
        self.contains(SemanticType::Predicate)
    }

    /// The one kind that classifies a concept for strategy selection: its
    /// single fundamental observable or trait kind, then role, else `Nothing`.
    pub fn fundamental(&self) -> SemanticType {
        const FUNDAMENTAL: [SemanticType; 12] = [
            SemanticType::Quality,
            SemanticType::Subject,
            SemanticType::Agent,
            SemanticType::Event,
            SemanticType::Configuration,
            SemanticType::Domain,
            SemanticType::Relationship,
            SemanticType::Process,
            SemanticType::Attribute,
            SemanticType::Realm,
            SemanticType::Identity,
            SemanticType::Role,
        ];
        const TRAITS: [SemanticType; 4] = [
            SemanticType::Attribute,
            SemanticType::Realm,
            SemanticType::Identity,
            SemanticType::Ordering,
        ];
        for candidates in [&FUNDAMENTAL[..], &TRAITS[..]] {
            let mut found = candidates.iter().copied().filter(|t| self.contains(*t));
            if let (Some(only), None) = (found.next(), found.next()) {
                return only;
            }
        }
        if self.contains(SemanticType::Role) {
            SemanticType::Role
        } else {
            SemanticType::Nothing
        }
    }
}

impl<const N: usize> From<[SemanticType; N]> for SemanticTypes {
    fn from(types: [SemanticType; N]) -> Self {
        Self(types.into_iter().collect())
    }
}

impl FromIterator<SemanticType> for SemanticTypes {
    fn from_iter<I: IntoIterator<Item = SemanticType>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Extend<SemanticType> for SemanticTypes {
    fn extend<I: IntoIterator<Item = SemanticType>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

/// Named relation slots a concept may qualify its observable with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RelationSlot {
    Inherent,
    Goal,
    Cooccurrent,
    Causant,
    Caused,
    Adjacent,
    Compresent,
    RelativeTo,
}

impl RelationSlot {
    pub const ALL: [RelationSlot; 8] = [
        RelationSlot::Inherent,
        RelationSlot::Goal,
        RelationSlot::Cooccurrent,
        RelationSlot::Causant,
        RelationSlot::Caused,
        RelationSlot::Adjacent,
        RelationSlot::Compresent,
        RelationSlot::RelativeTo,
    ];

    /// The structural relations compared after inherency, in comparison order.
    pub const STRUCTURAL: [RelationSlot; 7] = [
        RelationSlot::Goal,
        RelationSlot::Cooccurrent,
        RelationSlot::Causant,
        RelationSlot::Caused,
        RelationSlot::Adjacent,
        RelationSlot::Compresent,
        RelationSlot::RelativeTo,
    ];

    /// Keyword introducing the slot in a rendered declaration.
    pub fn keyword(self) -> &'static str {
        match self {
            RelationSlot::Inherent => "of",
            RelationSlot::Goal => "for",
            RelationSlot::Cooccurrent => "during",
            RelationSlot::Causant => "caused by",
            RelationSlot::Caused => "causing",
            RelationSlot::Adjacent => "adjacent to",
            RelationSlot::Compresent => "with",
            RelationSlot::RelativeTo => "relative to",
        }
    }

    fn position(self) -> usize {
        self as usize
    }
}

/// The relation slots of a concept, each holding zero or one concept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Relations([Option<ConceptId>; 8]);

impl Relations {
    pub fn get(&self, slot: RelationSlot) -> Option<ConceptId> {
        self.0[slot.position()]
    }

    pub fn set(&mut self, slot: RelationSlot, concept: Option<ConceptId>) {
        self.0[slot.position()] = concept;
    }

    /// Occupied slots in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (RelationSlot, ConceptId)> + '_ {
        RelationSlot::ALL
            .into_iter()
            .filter_map(|slot| self.get(slot).map(|c| (slot, c)))
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(Option::is_none)
    }
}

/// Unary semantic operators that turn a concept into a different observable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum UnaryOperator {
    Not,
    Presence,
    Proportion,
    Percentage,
    Ratio,
    Distance,
    Probability,
    Uncertainty,
    Count,
    Value,
    MonetaryValue,
    Occurrence,
    Change,
    Changed,
    Rate,
    Magnitude,
    Level,
    Type,
}

impl UnaryOperator {
    /// Leading keyword of the operator in a declaration.
    pub fn keyword(self) -> &'static str {
        match self {
            UnaryOperator::Not => "not",
            UnaryOperator::Presence => "presence of",
            UnaryOperator::Proportion => "proportion of",
            UnaryOperator::Percentage => "percentage of",
            UnaryOperator::Ratio => "ratio of",
            UnaryOperator::Distance => "distance to",
            UnaryOperator::Probability => "probability of",
            UnaryOperator::Uncertainty => "uncertainty of",
            UnaryOperator::Count => "count of",
            UnaryOperator::Value => "value of",
            UnaryOperator::MonetaryValue => "monetary value of",
            UnaryOperator::Occurrence => "occurrence of",
            UnaryOperator::Change => "change in",
            UnaryOperator::Changed => "changed",
            UnaryOperator::Rate => "change rate of",
            UnaryOperator::Magnitude => "magnitude of",
            UnaryOperator::Level => "level of",
            UnaryOperator::Type => "type of",
        }
    }

    /// Keyword introducing the comparison concept, for binary forms.
    pub fn comparison_keyword(self) -> Option<&'static str> {
        match self {
            UnaryOperator::Proportion | UnaryOperator::Percentage => Some("in"),
            UnaryOperator::Ratio => Some("to"),
            UnaryOperator::Value => Some("over"),
            _ => None,
        }
    }

    /// Semantic type of the observable the operator produces.
    pub fn return_type(self) -> SemanticType {
        match self {
            UnaryOperator::Not => SemanticType::Trait,
            UnaryOperator::Change => SemanticType::Process,
            UnaryOperator::Changed => SemanticType::Event,
            UnaryOperator::Level => SemanticType::Class,
            _ => SemanticType::Quality,
        }
    }
}

/// One peeled operator: the operator plus its optional comparison concept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperatorStep {
    pub operator: UnaryOperator,
    pub comparison: Option<ConceptId>,
}

/// A unary semantic modifier applied to an argument concept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SemanticModifier {
    pub operator: UnaryOperator,
    pub argument: ConceptId,
    pub comparison: Option<ConceptId>,
}

/// Logical connector of a compound concept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Connector {
    Union,
    Intersection,
}

impl Connector {
    pub fn keyword(self) -> &'static str {
        match self {
            Connector::Union => "or",
            Connector::Intersection => "and",
        }
    }

    pub fn semantic_type(self) -> SemanticType {
        match self {
            Connector::Union => SemanticType::Union,
            Connector::Intersection => SemanticType::Intersection,
        }
    }
}

/// A union or intersection of operand concepts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Compound {
    pub connector: Connector,
    pub operands: Vec<ConceptId>,
}

/// An interned concept. Immutable once interned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Concept {
    pub id: ConceptId,
    /// Canonical name.
    pub urn: String,
    pub types: SemanticTypes,
    /// Base observable this concept qualifies, for derived concepts.
    pub observable: Option<ConceptId>,
    /// Attached traits, sorted.
    pub traits: Vec<ConceptId>,
    /// Attached roles, sorted.
    pub roles: Vec<ConceptId>,
    pub relations: Relations,
    pub modifier: Option<SemanticModifier>,
    pub compound: Option<Compound>,
    pub negated: bool,
    pub collective: bool,
    /// True if the concept denotes a class rather than a concrete type.
    pub is_abstract: bool,
}

impl Concept {
    pub fn is(&self, ty: SemanticType) -> bool {
        self.types.contains(ty)
    }

    /// A canonical name without internal whitespace is atomic.
    pub fn is_atomic(&self) -> bool {
        is_atomic_urn(&self.urn)
    }
}

/// True if `urn` contains no whitespace, i.e. names a single declared concept.
pub fn is_atomic_urn(urn: &str) -> bool {
    !urn.trim().chars().any(char::is_whitespace)
}

/// Anything the matchers can compare: a concept, optionally decorated with
/// value operators.
pub trait Semantics: Send + Sync {
    /// The concept this semantics reduces to.
    fn concept(&self) -> ConceptId;

    /// Value operators applied on top of the concept.
    fn value_operators(&self) -> &[ValueOperation] {
        &[]
    }
}

impl Semantics for ConceptId {
    fn concept(&self) -> ConceptId {
        *self
    }
}
