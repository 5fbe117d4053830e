//! Rich diagnostic error types for the matching engine.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes and help text. Structural incompatibility between
//! concepts is *not* an error: it is reported as a negative [`Distance`] or a
//! `false` match. Only precondition violations end up here.
//!
//! [`Distance`]: crate::distance::Distance

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the matching engine.
#[derive(Debug, Error, Diagnostic)]
pub enum MatchError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Lattice(#[from] LatticeError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Pattern(#[from] PatternError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Strategy(#[from] StrategyError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Lattice errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum LatticeError {
    #[error("unknown concept: {id}")]
    #[diagnostic(
        code(semmatch::lattice::unknown_concept),
        help(
            "The concept id does not belong to the current worldview. \
             Ids are only valid for the lattice that issued them; after a \
             worldview reload, look concepts up again by URN."
        )
    )]
    UnknownConcept { id: u32 },

    #[error("unknown concept URN: {urn}")]
    #[diagnostic(
        code(semmatch::lattice::unknown_urn),
        help("Declare the concept in the lattice before referring to it.")
    )]
    UnknownUrn { urn: String },

    #[error("concept URN must not be empty")]
    #[diagnostic(
        code(semmatch::lattice::empty_urn),
        help("Named concepts need a non-empty canonical name such as `geography:Elevation`.")
    )]
    EmptyUrn,

    #[error("concept {urn} was already declared with a different structure")]
    #[diagnostic(
        code(semmatch::lattice::conflicting_declaration),
        help(
            "Concepts are interned by canonical name. Two declarations with the \
             same URN must describe the same concept; rename one of them."
        )
    )]
    ConflictingDeclaration { urn: String },

    #[error("is-a cycle detected through {urn}")]
    #[diagnostic(
        code(semmatch::lattice::cycle),
        help(
            "The worldview declares a concept as its own ancestor. \
             Remove one of the `is` edges involved before reloading."
        )
    )]
    HierarchyCycle { urn: String },

    #[error("hierarchy depth exceeded maximum of {max_depth} while walking {urn}")]
    #[diagnostic(
        code(semmatch::lattice::depth_exceeded),
        help(
            "A walk up the concept hierarchy went deeper than `max_hierarchy_depth`. \
             Increase the bound in the configuration or check the worldview for cycles."
        )
    )]
    DepthExceeded { urn: String, max_depth: usize },

    #[error("invalid concept declaration: {message}")]
    #[diagnostic(
        code(semmatch::lattice::invalid_declaration),
        help("Check the concept specification passed to `ConceptLattice::intern`.")
    )]
    InvalidDeclaration { message: String },

    #[error("worldview has been replaced; cannot intern {urn}")]
    #[diagnostic(
        code(semmatch::lattice::stale_worldview),
        help(
            "The lattice handle belongs to a worldview that was replaced or is \
             being updated. Intern through `Reasoner::intern`, or fetch a fresh \
             handle with `Reasoner::lattice`."
        )
    )]
    StaleWorldview { urn: String },
}

// ---------------------------------------------------------------------------
// Pattern errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum PatternError {
    #[error("compound pattern {urn} has {arity} operands, expected exactly 2")]
    #[diagnostic(
        code(semmatch::pattern::compound_arity),
        help(
            "Union and intersection patterns are matched head-to-head and \
             tail-to-tail and must have exactly two operands. Nest deeper \
             expressions, e.g. `A and (B and C)`."
        )
    )]
    CompoundArity { urn: String, arity: usize },

    #[error("no declaration available for {urn}")]
    #[diagnostic(
        code(semmatch::pattern::missing_declaration),
        help(
            "The declaration source could not produce the parsed form of a \
             concept the lattice knows about. The two collaborators are out of sync."
        )
    )]
    MissingDeclaration { urn: String },
}

// ---------------------------------------------------------------------------
// Strategy errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum StrategyError {
    #[error("observable {urn} has no determinable core observable")]
    #[diagnostic(
        code(semmatch::strategy::undetermined_core),
        help(
            "The concept is inconsistent (tagged NOTHING) or its base chain \
             could not be followed. Fix the declaration in the worldview."
        )
    )]
    UndeterminedCore { urn: String },

    #[error("abstract predicate {urn} has no concrete specializations")]
    #[diagnostic(
        code(semmatch::strategy::no_substitutions),
        help(
            "A generic component must be concretized before resolution. \
             Declare at least one non-abstract child of the predicate."
        )
    )]
    NoSubstitutions { urn: String },

    #[error("no strategies to resolve")]
    #[diagnostic(
        code(semmatch::strategy::empty),
        help("Pass at least one strategy to `resolve_in_order`.")
    )]
    Empty,

    #[error("invalid strategy definition {urn}: {message}")]
    #[diagnostic(
        code(semmatch::strategy::invalid_definition),
        help("A declared strategy needs a non-empty URN and namespace and at least one operation.")
    )]
    InvalidDefinition { urn: String, message: String },
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read configuration: {path}")]
    #[diagnostic(
        code(semmatch::config::read),
        help("Ensure the configuration file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration {path}: {message}")]
    #[diagnostic(
        code(semmatch::config::parse),
        help("Check the TOML syntax and the field names in the configuration.")
    )]
    Parse { path: String, message: String },

    #[error("invalid configuration: {message}")]
    #[diagnostic(code(semmatch::config::invalid), help("Check the ReasonerConfig fields."))]
    Invalid { message: String },
}

/// Convenience alias used throughout the crate.
pub type MatchResult<T> = std::result::Result<T, MatchError>;
