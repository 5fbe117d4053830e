//! Observables: concepts decorated for an observation request.
//!
//! An [`Observable`] wraps a concept with the metadata a resolution request
//! needs: which of its predicates are still generic, what kind of description
//! is being asked for, and the value operators to apply once the bare concept
//! is observed. Observables are immutable; [`ObservableBuilder`] produces
//! edited copies.

use serde::{Deserialize, Serialize};

use crate::concept::{ConceptId, SemanticType, SemanticTypes, Semantics};
use crate::error::MatchResult;
use crate::lattice::ConceptGraph;

/// The kind of description an observation produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DescriptionType {
    /// Individuate a population of direct observables.
    Instantiation,
    /// Find configurations.
    Detection,
    /// Run a process.
    Simulation,
    Quantification,
    Categorization,
    Verification,
    Classification,
    Characterization,
    Compilation,
    /// Acknowledge a single, already individuated direct observable.
    Acknowledgement,
}

impl DescriptionType {
    /// Default description for a concept of the given types.
    ///
    /// `distributed` selects instantiation over acknowledgement for direct
    /// observables.
    pub fn for_semantics(types: &SemanticTypes, distributed: bool) -> Self {
        if types.contains(SemanticType::Class) {
            DescriptionType::Categorization
        } else if types.contains(SemanticType::Presence) {
            DescriptionType::Verification
        } else if types.contains(SemanticType::Quantifiable) {
            DescriptionType::Quantification
        } else if types.contains(SemanticType::Configuration) {
            DescriptionType::Detection
        } else if types.contains(SemanticType::Process) {
            DescriptionType::Simulation
        } else if types.contains(SemanticType::Trait) {
            DescriptionType::Classification
        } else if types.contains(SemanticType::DirectObservable) {
            if distributed {
                DescriptionType::Instantiation
            } else {
                DescriptionType::Acknowledgement
            }
        } else {
            DescriptionType::Compilation
        }
    }
}

/// Operators applied to the value of an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueOperator {
    By,
    DownTo,
    GreaterThan,
    LessThan,
    GreaterOrEqual,
    LessOrEqual,
    Equals,
    NotEquals,
    SameAs,
    Without,
    Where,
    Plus,
    Minus,
    Times,
    Over,
}

impl ValueOperator {
    pub fn keyword(self) -> &'static str {
        match self {
            ValueOperator::By => "by",
            ValueOperator::DownTo => "down to",
            ValueOperator::GreaterThan => ">",
            ValueOperator::LessThan => "<",
            ValueOperator::GreaterOrEqual => ">=",
            ValueOperator::LessOrEqual => "<=",
            ValueOperator::Equals => "=",
            ValueOperator::NotEquals => "!=",
            ValueOperator::SameAs => "same as",
            ValueOperator::Without => "without",
            ValueOperator::Where => "where",
            ValueOperator::Plus => "plus",
            ValueOperator::Minus => "minus",
            ValueOperator::Times => "times",
            ValueOperator::Over => "over",
        }
    }

    /// Name of the service function that applies this operator.
    pub fn function_name(self) -> &'static str {
        match self {
            ValueOperator::By => "value.aggregate",
            ValueOperator::DownTo => "value.downgrade",
            ValueOperator::GreaterThan
            | ValueOperator::LessThan
            | ValueOperator::GreaterOrEqual
            | ValueOperator::LessOrEqual
            | ValueOperator::Equals
            | ValueOperator::NotEquals
            | ValueOperator::SameAs
            | ValueOperator::Without
            | ValueOperator::Where => "value.filter",
            ValueOperator::Plus
            | ValueOperator::Minus
            | ValueOperator::Times
            | ValueOperator::Over => "value.arithmetic",
        }
    }
}

impl std::fmt::Display for ValueOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.keyword())
    }
}

/// A literal operand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Number(f64),
    Text(String),
    Boolean(bool),
}

impl std::fmt::Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Literal::Number(n) => write!(f, "{n}"),
            Literal::Text(s) => write!(f, "{s:?}"),
            Literal::Boolean(b) => write!(f, "{b}"),
        }
    }
}

/// The operand of a value operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ValueOperand {
    Literal(Literal),
    /// A classifier concept.
    Concept(ConceptId),
    /// Matches any operand when used in a pattern.
    Any,
}

/// One value operator with its operand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueOperation {
    pub operator: ValueOperator,
    pub operand: ValueOperand,
}

impl ValueOperation {
    pub fn new(operator: ValueOperator, operand: ValueOperand) -> Self {
        Self { operator, operand }
    }
}

/// A concept prepared for observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observable {
    concept: ConceptId,
    generics: Vec<ConceptId>,
    description: DescriptionType,
    value_operators: Vec<ValueOperation>,
    optional: bool,
    name: Option<String>,
}

impl Observable {
    /// An observable for `concept` with the default description for its types.
    pub fn new(graph: &dyn ConceptGraph, concept: ConceptId) -> MatchResult<Self> {
        let record = graph.concept(concept)?;
        Ok(Self {
            concept,
            generics: Vec::new(),
            description: DescriptionType::for_semantics(&record.types, true),
            value_operators: Vec::new(),
            optional: false,
            name: None,
        })
    }

    /// Start building an observable with an explicit description type.
    pub fn builder(concept: ConceptId, description: DescriptionType) -> ObservableBuilder {
        ObservableBuilder {
            inner: Self {
                concept,
                generics: Vec::new(),
                description,
                value_operators: Vec::new(),
                optional: false,
                name: None,
            },
        }
    }

    /// Start an edited copy of this observable.
    pub fn to_builder(&self) -> ObservableBuilder {
        ObservableBuilder {
            inner: self.clone(),
        }
    }

    pub fn concept_id(&self) -> ConceptId {
        self.concept
    }

    /// Predicates left generic by the request.
    pub fn generics(&self) -> &[ConceptId] {
        &self.generics
    }

    pub fn description(&self) -> DescriptionType {
        self.description
    }

    /// True if a plan may proceed without observing this.
    pub fn is_optional(&self) -> bool {
        self.optional
    }

    /// Stated name, if the request gave one.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn has_value_operators(&self) -> bool {
        !self.value_operators.is_empty()
    }
}

impl Semantics for Observable {
    fn concept(&self) -> ConceptId {
        self.concept
    }

    fn value_operators(&self) -> &[ValueOperation] {
        &self.value_operators
    }
}

/// Produces edited copies of an [`Observable`].
#[derive(Debug, Clone)]
pub struct ObservableBuilder {
    inner: Observable,
}

impl ObservableBuilder {
    /// Replace the concept, keeping all other metadata.
    pub fn with_concept(mut self, concept: ConceptId) -> Self {
        self.inner.concept = concept;
        self
    }

    pub fn with_description(mut self, description: DescriptionType) -> Self {
        self.inner.description = description;
        self
    }

    /// Mark a predicate of the concept as generic.
    pub fn with_generic(mut self, predicate: ConceptId) -> Self {
        if !self.inner.generics.contains(&predicate) {
            self.inner.generics.push(predicate);
        }
        self
    }

    pub fn without_generics(mut self) -> Self {
        self.inner.generics.clear();
        self
    }

    pub fn with_value_operator(mut self, operator: ValueOperator, operand: ValueOperand) -> Self {
        self.inner
            .value_operators
            .push(ValueOperation::new(operator, operand));
        self
    }

    pub fn without_value_operators(mut self) -> Self {
        self.inner.value_operators.clear();
        self
    }

    pub fn optional(mut self, optional: bool) -> Self {
        self.inner.optional = optional;
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.inner.name = Some(name.into());
        self
    }

    pub fn build(self) -> Observable {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concept::SemanticType as T;
    use crate::lattice::fixtures::test_lattice;

    #[test]
    fn description_defaults() {
        let quality = SemanticTypes::from([T::Observable, T::Quality, T::Quantifiable]);
        assert_eq!(
            DescriptionType::for_semantics(&quality, true),
            DescriptionType::Quantification
        );
        let subject = SemanticTypes::from([T::Observable, T::Subject, T::DirectObservable]);
        assert_eq!(
            DescriptionType::for_semantics(&subject, true),
            DescriptionType::Instantiation
        );
        assert_eq!(
            DescriptionType::for_semantics(&subject, false),
            DescriptionType::Acknowledgement
        );
        let class = SemanticTypes::from([T::Observable, T::Class, T::Quantifiable]);
        assert_eq!(
            DescriptionType::for_semantics(&class, true),
            DescriptionType::Categorization
        );
        assert_eq!(
            DescriptionType::for_semantics(&SemanticTypes::new(), true),
            DescriptionType::Compilation
        );
    }

    #[test]
    fn new_observable_picks_description() {
        let fx = test_lattice();
        let obs = Observable::new(&fx.lattice, fx.mountain).unwrap();
        assert_eq!(obs.description(), DescriptionType::Instantiation);
        assert_eq!(Semantics::concept(&obs), fx.mountain);
        assert!(!obs.has_value_operators());
    }

    #[test]
    fn builder_edits_are_copies() {
        let fx = test_lattice();
        let original = Observable::builder(fx.elevation, DescriptionType::Quantification)
            .with_value_operator(ValueOperator::GreaterThan, ValueOperand::Literal(Literal::Number(100.0)))
            .named("elevation")
            .build();
        let stripped = original.to_builder().without_value_operators().build();
        assert_eq!(original.value_operators().len(), 1);
        assert!(stripped.value_operators().is_empty());
        assert_eq!(stripped.name(), Some("elevation"));
        assert_eq!(stripped.concept_id(), original.concept_id());
    }

    #[test]
    fn value_operator_functions() {
        assert_eq!(ValueOperator::Where.function_name(), "value.filter");
        assert_eq!(ValueOperator::Over.function_name(), "value.arithmetic");
        assert_eq!(ValueOperator::DownTo.to_string(), "down to");
        assert_eq!(Literal::Text("a".into()).to_string(), "\"a\"");
    }
}
