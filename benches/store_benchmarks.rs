use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use trellis::rdf::{
    parse_turtle, serialize_turtle, Literal, NamedNode, NamespaceManager, RdfPredicate, RdfSubject,
    Store, Triple,
};
use trellis::sparql::SparqlEngine;

fn person(i: usize) -> NamedNode {
    NamedNode::new_unchecked(format!("http://example.org/person/{}", i))
}

fn predicate(local: &str) -> RdfPredicate {
    NamedNode::new_unchecked(format!("http://example.org/{}", local)).into()
}

/// A social graph: every person has a name, an age and knows the next two
fn social_graph(size: usize) -> Store {
    let store = Store::new();
    let name = predicate("name");
    let age = predicate("age");
    let knows = predicate("knows");
    let mut triples = Vec::with_capacity(size * 4);
    for i in 0..size {
        triples.push(Triple::new(
            person(i).into(),
            name.clone(),
            Literal::new_simple_literal(format!("Person{}", i)).into(),
        ));
        triples.push(Triple::new(
            person(i).into(),
            age.clone(),
            Literal::from_integer((i % 100) as i64).into(),
        ));
        for hop in 1..=2 {
            triples.push(Triple::new(
                person(i).into(),
                knows.clone(),
                person((i + hop) % size).into(),
            ));
        }
    }
    store.extend(&triples);
    store
}

/// Benchmark triple insertion throughput
fn bench_triple_insertion(c: &mut Criterion) {
    let mut group = c.benchmark_group("triple_insertion");

    for size in [100, 1000, 10_000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let store = social_graph(size);
                criterion::black_box(store.count());
            });
        });
    }
    group.finish();
}

/// Benchmark bound-subject and bound-predicate lookups
fn bench_pattern_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("pattern_lookup");

    for size in [1000, 10_000].iter() {
        let store = social_graph(*size);
        let subject: RdfSubject = person(size / 2).into();
        let knows = predicate("knows");

        group.bench_with_input(BenchmarkId::new("subject", size), size, |b, _| {
            b.iter(|| criterion::black_box(store.matching(Some(&subject), None, None).len()));
        });
        group.bench_with_input(BenchmarkId::new("predicate", size), size, |b, _| {
            b.iter(|| criterion::black_box(store.matching(None, Some(&knows), None).len()));
        });
    }
    group.finish();
}

/// Benchmark two-hop join and filter queries
fn bench_sparql(c: &mut Criterion) {
    let mut group = c.benchmark_group("sparql");
    let store = social_graph(1000);
    let engine = SparqlEngine::new(&store);

    let queries = [
        (
            "two_hop",
            "PREFIX ex: <http://example.org/> \
             SELECT ?c WHERE { <http://example.org/person/1> ex:knows ?b . ?b ex:knows ?c }",
        ),
        (
            "filter",
            "PREFIX ex: <http://example.org/> \
             SELECT ?p WHERE { ?p ex:age ?age FILTER(?age > 90) }",
        ),
        (
            "order_limit",
            "PREFIX ex: <http://example.org/> \
             SELECT ?p ?name WHERE { ?p ex:name ?name } ORDER BY DESC(?name) LIMIT 10",
        ),
    ];

    for (name, query) in queries {
        group.bench_function(name, |b| {
            b.iter(|| criterion::black_box(engine.query(query).map(|r| r.len())));
        });
    }
    group.finish();
}

/// Benchmark the Turtle codec
fn bench_turtle(c: &mut Criterion) {
    let mut group = c.benchmark_group("turtle");
    let store = social_graph(1000);
    let namespaces = NamespaceManager::new();
    let text = serialize_turtle(store.read().iter(), &namespaces).unwrap_or_default();

    group.bench_function("serialize", |b| {
        b.iter(|| criterion::black_box(serialize_turtle(store.read().iter(), &namespaces)));
    });
    group.bench_function("parse", |b| {
        b.iter(|| criterion::black_box(parse_turtle(&text, None).map(|t| t.len())));
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_triple_insertion,
    bench_pattern_lookup,
    bench_sparql,
    bench_turtle
);
criterion_main!(benches);
