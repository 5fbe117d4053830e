//! Observation strategies: ranked plans for turning an observable into an
//! observation.
//!
//! A strategy is an ordered list of [`Operation`]s built append-only through
//! [`StrategyBuilder`]. Strategies nest: a RESOLVE operation may carry a
//! whole strategy, which is how deferred resolution and value-operator
//! wrapping are expressed.

pub mod infer;
pub mod registry;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::concept::ConceptId;
use crate::error::{MatchResult, StrategyError};
use crate::observable::{Literal, Observable, ValueOperand, ValueOperation};

pub use infer::StrategyInference;
pub use registry::{StrategyDefinition, StrategyRegistry};

/// What an operation does with its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    /// Resolve an observable (or run a nested strategy) in the current scope.
    Resolve,
    /// Observe an observable directly.
    Observe,
    /// Apply a service function to the result so far.
    Apply,
}

/// A call to a service function with named arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceCall {
    pub function: String,
    pub arguments: BTreeMap<String, ValueOperand>,
}

impl ServiceCall {
    pub fn new(function: impl Into<String>) -> Self {
        Self {
            function: function.into(),
            arguments: BTreeMap::new(),
        }
    }

    pub fn with_argument(mut self, name: impl Into<String>, value: ValueOperand) -> Self {
        self.arguments.insert(name.into(), value);
        self
    }

    /// The call applying one value operator.
    pub fn for_value_operation(operation: &ValueOperation) -> Self {
        Self::new(operation.operator.function_name())
            .with_argument(
                "operator",
                ValueOperand::Literal(Literal::Text(operation.operator.keyword().to_string())),
            )
            .with_argument("operand", operation.operand.clone())
    }

    /// The call keeping only the members of `artifact` that carry `predicate`.
    pub fn filter_by_trait(predicate: ConceptId, artifact: ConceptId) -> Self {
        Self::new("value.filter")
            .with_argument("trait", ValueOperand::Concept(predicate))
            .with_argument("artifact", ValueOperand::Concept(artifact))
    }
}

/// The payload of an operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OperationPayload {
    Observable(Observable),
    Service(ServiceCall),
    Strategy(Box<ObservationStrategy>),
}

/// One step of a strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub kind: OperationKind,
    pub payload: OperationPayload,
}

/// How a strategy came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyOrigin {
    /// Observe the observable as stated.
    Direct,
    /// Observe a concretized observable with `predicate` replaced by
    /// `substitute`.
    Substitution {
        predicate: ConceptId,
        substitute: ConceptId,
    },
    /// Resolve the observable without `predicate`, then classify and filter.
    Deferred { predicate: ConceptId },
    /// Resolve the bare observable, then apply its value operators.
    ValueOperators,
    /// Instantiated from a registered [`StrategyDefinition`].
    Declared,
}

/// A ranked, ordered resolution plan. Lower ranks are preferred.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationStrategy {
    rank: u32,
    origin: StrategyOrigin,
    /// The observable this strategy resolves.
    target: Observable,
    operations: Vec<Operation>,
    /// URN of the definition a declared strategy came from.
    urn: Option<String>,
    documentation: Option<String>,
}

impl ObservationStrategy {
    pub fn builder(target: Observable, origin: StrategyOrigin) -> StrategyBuilder {
        StrategyBuilder {
            inner: Self {
                rank: 0,
                origin,
                target,
                operations: Vec::new(),
                urn: None,
                documentation: None,
            },
        }
    }

    pub fn rank(&self) -> u32 {
        self.rank
    }

    pub fn origin(&self) -> StrategyOrigin {
        self.origin
    }

    pub fn target(&self) -> &Observable {
        &self.target
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn urn(&self) -> Option<&str> {
        self.urn.as_deref()
    }

    pub fn documentation(&self) -> Option<&str> {
        self.documentation.as_deref()
    }

    /// Nested strategies resolved by this one, in declaration order.
    pub fn deferred(&self) -> impl Iterator<Item = &ObservationStrategy> {
        self.operations.iter().filter_map(|op| match (&op.kind, &op.payload) {
            (OperationKind::Resolve, OperationPayload::Strategy(s)) => Some(s.as_ref()),
            _ => None,
        })
    }
}

/// Append-only builder for [`ObservationStrategy`].
#[derive(Debug, Clone)]
pub struct StrategyBuilder {
    inner: ObservationStrategy,
}

impl StrategyBuilder {
    pub fn rank(mut self, rank: u32) -> Self {
        self.inner.rank = rank;
        self
    }

    pub fn urn(mut self, urn: impl Into<String>) -> Self {
        self.inner.urn = Some(urn.into());
        self
    }

    pub fn documentation(mut self, documentation: impl Into<String>) -> Self {
        self.inner.documentation = Some(documentation.into());
        self
    }

    pub fn observe(self, observable: Observable) -> Self {
        self.push(OperationKind::Observe, OperationPayload::Observable(observable))
    }

    pub fn resolve(self, observable: Observable) -> Self {
        self.push(OperationKind::Resolve, OperationPayload::Observable(observable))
    }

    pub fn resolve_strategy(self, strategy: ObservationStrategy) -> Self {
        self.push(
            OperationKind::Resolve,
            OperationPayload::Strategy(Box::new(strategy)),
        )
    }

    pub fn apply(self, call: ServiceCall) -> Self {
        self.push(OperationKind::Apply, OperationPayload::Service(call))
    }

    fn push(mut self, kind: OperationKind, payload: OperationPayload) -> Self {
        self.inner.operations.push(Operation { kind, payload });
        self
    }

    pub fn build(self) -> ObservationStrategy {
        self.inner
    }
}

/// Fraction of a request covered by a resolution attempt, in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Coverage(f64);

impl Coverage {
    pub const EMPTY: Coverage = Coverage(0.0);
    pub const FULL: Coverage = Coverage(1.0);

    /// Coverage clamped to the unit interval. NaN counts as empty.
    pub fn new(fraction: f64) -> Self {
        if fraction.is_nan() {
            Self::EMPTY
        } else {
            Coverage(fraction.clamp(0.0, 1.0))
        }
    }

    pub fn fraction(self) -> f64 {
        self.0
    }

    pub fn is_complete(self) -> bool {
        self.0 >= 1.0
    }
}

/// Try `strategies` strictly in order until one reaches full coverage.
///
/// Returns the first fully covering strategy, or else the earliest strategy
/// with the best partial coverage. Later strategies are never attempted once
/// one has covered the request.
pub fn resolve_in_order<'s>(
    strategies: &'s [ObservationStrategy],
    mut attempt: impl FnMut(&ObservationStrategy) -> MatchResult<Coverage>,
) -> MatchResult<(&'s ObservationStrategy, Coverage)> {
    let mut best: Option<(&ObservationStrategy, Coverage)> = None;
    for strategy in strategies {
        let coverage = attempt(strategy)?;
        if coverage.is_complete() {
            return Ok((strategy, coverage));
        }
        if best.is_none_or(|(_, b)| coverage > b) {
            best = Some((strategy, coverage));
        }
    }
    best.ok_or_else(|| StrategyError::Empty.into())
}

/// The scope a resolution request runs in.
pub trait ContextScope: Send + Sync {
    /// The observable providing the context of the request, if any.
    fn context(&self) -> Option<ConceptId>;
}

/// A scope with a fixed context.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleScope {
    context: Option<ConceptId>,
}

impl SimpleScope {
    /// A scope without a context observable.
    pub fn root() -> Self {
        Self::default()
    }

    pub fn within(context: ConceptId) -> Self {
        Self {
            context: Some(context),
        }
    }
}

impl ContextScope for SimpleScope {
    fn context(&self) -> Option<ConceptId> {
        self.context
    }
}
