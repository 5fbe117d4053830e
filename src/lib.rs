// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # semmatch
//!
//! Semantic matching and resolution strategies over a concept lattice.
//!
//! ## Architecture
//!
//! - **Concept lattice** (`lattice`): interned concepts with an `is-a` DAG (petgraph)
//! - **Distance engine** (`distance`): structural, asymmetric distance between concepts
//! - **Pattern matcher** (`pattern`): syntactic matching over declaration trees
//! - **Compatibility** (`compatibility`): yes/no structural substitutability check
//! - **Strategy inference** (`strategy`): ranked plans for resolving an observable,
//!   plus a registry of declared strategies matched by pattern
//! - **Memoization** (`cache`): bounded single-flight caches invalidated per worldview
//!
//! ## Library usage
//!
//! ```no_run
//! use semmatch::concept::SemanticType;
//! use semmatch::config::ReasonerConfig;
//! use semmatch::lattice::{ConceptLattice, ConceptSpec};
//! use semmatch::reasoner::Reasoner;
//!
//! let lattice = ConceptLattice::new();
//! let trait_types = [SemanticType::Predicate, SemanticType::Trait];
//! let root = lattice.intern(ConceptSpec::named("im:Predicate", trait_types)).unwrap();
//! let size = lattice
//!     .intern(ConceptSpec::named("im:Size", trait_types).is_a(root).mark_abstract())
//!     .unwrap();
//! let big = lattice
//!     .intern(ConceptSpec::named("im:Big", trait_types).is_a(size))
//!     .unwrap();
//!
//! let reasoner = Reasoner::with_worldview(ReasonerConfig::default(), lattice).unwrap();
//! assert!(reasoner.distance(&big, &size).unwrap().is_compatible());
//! ```

pub mod cache;
pub mod compatibility;
pub mod concept;
pub mod config;
pub mod declaration;
pub mod distance;
pub mod error;
pub mod lattice;
pub mod observable;
pub mod pattern;
pub mod reasoner;
pub mod strategy;

pub use distance::Distance;
pub use error::{MatchError, MatchResult};
pub use reasoner::Reasoner;
