//! Benchmarks for distance, matching and strategy inference.

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use semmatch::concept::{ConceptId, RelationSlot, SemanticType as T};
use semmatch::config::ReasonerConfig;
use semmatch::distance::{DistanceRequest, SemanticMatcher};
use semmatch::lattice::{ConceptLattice, ConceptSpec};
use semmatch::observable::Observable;
use semmatch::strategy::SimpleScope;
use semmatch::Reasoner;

struct Bench {
    reasoner: Reasoner,
    /// Deep trait, its family root, and two derived qualities using them.
    leaf: ConceptId,
    family: ConceptId,
    candidate: ConceptId,
    pattern: ConceptId,
    generic: ConceptId,
}

/// A trait family 32 levels deep, with 8 concrete leaves under the family.
fn setup() -> Bench {
    let lattice = ConceptLattice::new();
    let traits = [T::Predicate, T::Trait, T::Attribute];
    let root = lattice.intern(ConceptSpec::named("im:Predicate", traits)).unwrap();
    let family = lattice
        .intern(ConceptSpec::named("im:Family", traits).is_a(root).mark_abstract())
        .unwrap();
    let mut leaf = family;
    for depth in 0..32 {
        leaf = lattice
            .intern(ConceptSpec::named(format!("im:Level{depth}"), traits).is_a(leaf))
            .unwrap();
    }
    for n in 0..8 {
        lattice
            .intern(ConceptSpec::named(format!("im:Sibling{n}"), traits).is_a(family))
            .unwrap();
    }
    let quality = lattice
        .intern(ConceptSpec::named(
            "geo:Elevation",
            [T::Observable, T::Quality, T::Quantifiable],
        ))
        .unwrap();
    let region = lattice
        .intern(ConceptSpec::named(
            "earth:Region",
            [T::Observable, T::Subject, T::Countable],
        ))
        .unwrap();
    let candidate = lattice
        .intern(
            ConceptSpec::derived(quality)
                .with_trait(leaf)
                .with(RelationSlot::Inherent, region),
        )
        .unwrap();
    let pattern = lattice
        .intern(ConceptSpec::derived(quality).with(RelationSlot::Inherent, region))
        .unwrap();
    let generic = lattice
        .intern(ConceptSpec::derived(quality).with_trait(family))
        .unwrap();
    Bench {
        reasoner: Reasoner::with_worldview(ReasonerConfig::default(), lattice).unwrap(),
        leaf,
        family,
        candidate,
        pattern,
        generic,
    }
}

fn bench_distance_uncached(c: &mut Criterion) {
    let bench = setup();
    let lattice = bench.reasoner.lattice();
    let engine = SemanticMatcher::new(256);
    let request = DistanceRequest::new(&bench.leaf, &bench.family);

    c.bench_function("distance_uncached_depth32", |b| {
        b.iter(|| black_box(engine.semantic_distance(lattice.as_ref(), &request).unwrap()))
    });
}

fn bench_distance_cached(c: &mut Criterion) {
    let bench = setup();
    bench.reasoner.distance(&bench.leaf, &bench.family).unwrap();

    c.bench_function("distance_cached_depth32", |b| {
        b.iter(|| black_box(bench.reasoner.distance(&bench.leaf, &bench.family).unwrap()))
    });
}

fn bench_match(c: &mut Criterion) {
    let bench = setup();

    c.bench_function("match_cached", |b| {
        b.iter(|| black_box(bench.reasoner.matches(&bench.candidate, &bench.pattern).unwrap()))
    });
}

fn bench_strategies(c: &mut Criterion) {
    let bench = setup();
    let observable = Observable::new(bench.reasoner.lattice().as_ref(), bench.generic).unwrap();
    let scope = SimpleScope::root();

    c.bench_function("infer_strategies_40_substitutions", |b| {
        b.iter(|| black_box(bench.reasoner.infer_strategies(&observable, &scope).unwrap()))
    });
}

criterion_group!(
    benches,
    bench_distance_uncached,
    bench_distance_cached,
    bench_match,
    bench_strategies
);
criterion_main!(benches);
