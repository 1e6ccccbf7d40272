//! End-to-end tests of the host call contract
//!
//! Exercises `Database` the way an embedding host does: byte inputs,
//! caller buffers and signed status codes.

use trellis::api::{Database, ErrorCode};
use trellis::{DeterministicClock, ErrorKind, Literal, RdfObject, Store, TrellisConfig};
use std::sync::Arc;

fn status_of<T: trellis::api::StatusValue>(result: &trellis::Result<T>) -> i64 {
    Database::status(result)
}

#[test]
fn test_add_count_contains_clear_scenario() {
    let db = Database::new();

    let added = db.add_triple(b"http://ex/a", b"http://ex/b", b"http://ex/c");
    assert_eq!(status_of(&added), 1);
    assert_eq!(db.count(), 1);
    assert!(db
        .contains_triple(b"http://ex/a", b"http://ex/b", b"http://ex/c")
        .unwrap());

    // the same triple in angle-bracket form is the same triple
    assert!(!db
        .add_triple(b"<http://ex/a>", b"<http://ex/b>", b"<http://ex/c>")
        .unwrap());
    assert_eq!(db.count(), 1);

    db.clear();
    assert_eq!(db.count(), 0);
    assert!(!db
        .contains_triple(b"http://ex/a", b"http://ex/b", b"http://ex/c")
        .unwrap());
}

#[test]
fn test_turtle_language_literal_scenario() {
    let db = Database::new();
    let loaded = db.load_turtle(b"<http://ex/a> <http://ex/b> \"hi\"@en .", None);
    assert_eq!(status_of(&loaded), 1);

    let triples = db.store().matching(None, None, None);
    assert_eq!(triples.len(), 1);
    let RdfObject::Literal(literal) = &triples[0].object else {
        panic!("expected a literal object");
    };
    assert_eq!(literal.value(), "hi");
    assert_eq!(literal.language(), Some("en"));
}

#[test]
fn test_transactional_load() {
    let db = Database::new();
    db.add_triple(b"http://ex/keep", b"http://ex/p", b"\"kept\"")
        .unwrap();

    let document = b"@prefix ex: <http://ex/> .\n\
        ex:a ex:p ex:b .\n\
        ex:c ex:p ex:d .\n\
        ex:e ex:p .\n";
    let result = db.load_turtle(document, None);
    assert_eq!(status_of(&result), ErrorCode::Parse as i64);
    assert_eq!(result.unwrap_err().kind(), ErrorKind::Grammar);
    assert_eq!(db.count(), 1);
}

#[test]
fn test_relative_iri_needs_base() {
    let db = Database::new();
    let without = db.load_turtle(b"<a> <b> <c> .", None);
    assert_eq!(status_of(&without), ErrorCode::Parse as i64);

    let with = db.load_turtle(b"<a> <b> <c> .", Some(b"http://ex/base/\0"));
    assert_eq!(status_of(&with), 1);
    assert!(db
        .contains_triple(b"http://ex/base/a", b"http://ex/base/b", b"http://ex/base/c")
        .unwrap());
}

#[test]
fn test_error_codes() {
    let db = Database::new();
    let mut out = [0u8; 64];

    let empty = db.add_triple(b"", b"http://ex/p", b"x");
    assert_eq!(status_of(&empty), ErrorCode::InvalidArgument as i64);

    let bad_utf8 = db.add_triple(&[0xc3, 0x28], b"http://ex/p", b"x");
    assert_eq!(status_of(&bad_utf8), ErrorCode::InvalidUtf8 as i64);

    let bad_term = db.add_triple(b"\"literal subject\"", b"http://ex/p", b"x");
    assert_eq!(status_of(&bad_term), ErrorCode::Parse as i64);
    assert_eq!(bad_term.unwrap_err().kind(), ErrorKind::TermFormat);

    let bad_literal = db.add_triple(b"http://ex/s", b"http://ex/p", b"\"unterminated");
    assert_eq!(status_of(&bad_literal), ErrorCode::Parse as i64);

    let zero = db.query_sparql(b"ASK {}", &mut []);
    assert_eq!(status_of(&zero), ErrorCode::InvalidArgument as i64);

    let syntax = db.query_sparql(b"SELECT WHERE", &mut out);
    assert_eq!(status_of(&syntax), ErrorCode::Parse as i64);

    let unsupported = db.query_sparql(b"SELECT * WHERE { ?s <http://ex/p>+ ?o }", &mut out);
    assert_eq!(status_of(&unsupported), ErrorCode::Parse as i64);
    assert_eq!(unsupported.unwrap_err().kind(), ErrorKind::UnsupportedFeature);

    let unknown = db.query_sparql(b"SELECT ?x WHERE { ?s ?p ?o }", &mut out);
    assert_eq!(status_of(&unknown), ErrorCode::Parse as i64);

    assert_eq!(db.count(), 0);
}

#[test]
fn test_query_output_and_capacity_retry() {
    let db = Database::new();
    db.load_turtle(
        b"@prefix ex: <http://ex/> .\n ex:a ex:name \"Alice\" .\n ex:b ex:name \"Bob\" .\n",
        None,
    )
    .unwrap();
    let query = b"PREFIX ex: <http://ex/> SELECT ?s ?n WHERE { ?s ex:name ?n } ORDER BY ?n";
    let expected = "s=<http://ex/a>, n=\"Alice\"\ns=<http://ex/b>, n=\"Bob\"";

    // exactly one byte short: the terminator does not fit
    let mut small = vec![0u8; expected.len()];
    let result = db.query_sparql(query, &mut small);
    assert_eq!(status_of(&result), ErrorCode::BufferTooSmall as i64);
    assert!(result.unwrap_err().is_retryable());
    assert!(small.iter().all(|&b| b == 0));

    let mut out = vec![0u8; expected.len() + 1];
    let written = db.query_sparql(query, &mut out).unwrap();
    assert_eq!(written, expected.len());
    assert_eq!(std::str::from_utf8(&out[..written]).unwrap(), expected);
    assert_eq!(out[written], 0);
}

#[test]
fn test_ask_and_construct_output() {
    let db = Database::new();
    db.add_triple(b"http://ex/a", b"http://ex/knows", b"http://ex/b")
        .unwrap();
    let mut out = [0u8; 256];

    let n = db.query_sparql(b"ASK { ?s ?p ?o }", &mut out).unwrap();
    assert_eq!(&out[..n], b"true");

    let n = db
        .query_sparql(
            b"CONSTRUCT { ?o <http://ex/knownBy> ?s } WHERE { ?s <http://ex/knows> ?o }",
            &mut out,
        )
        .unwrap();
    let turtle = std::str::from_utf8(&out[..n]).unwrap();
    let reparsed = trellis::rdf::parse_turtle(turtle, None).unwrap();
    assert_eq!(reparsed.len(), 1);
    assert_eq!(reparsed[0].subject.to_string(), "<http://ex/b>");
}

#[test]
fn test_serialize_turtle_round_trip() {
    let db = Database::new();
    db.load_turtle(
        "@prefix ex: <http://ex/> .\n\
         ex:a ex:label \"caf\u{e9}\"@fr ; ex:n 42 ; ex:link [ ex:p ex:q ] .\n"
            .as_bytes(),
        None,
    )
    .unwrap();
    assert_eq!(db.count(), 4);

    let mut out = vec![0u8; 4096];
    let n = db.serialize_turtle(&mut out).unwrap();
    let text = std::str::from_utf8(&out[..n]).unwrap().to_string();

    let copy = Database::new();
    assert_eq!(copy.load_turtle(text.as_bytes(), None).unwrap(), 4);
    assert!(copy
        .contains_triple(b"http://ex/a", b"http://ex/n", b"\"42\"^^<http://www.w3.org/2001/XMLSchema#integer>")
        .unwrap());
    let label = Literal::new_language_tagged_literal("caf\u{e9}", "fr").unwrap();
    assert_eq!(
        copy.store()
            .matching(None, None, Some(&label.into()))
            .len(),
        1
    );
}

#[test]
fn test_configured_clock_and_prefixes() {
    let config = TrellisConfig::from_yaml_str(
        "clock:\n  kind: deterministic\n  start: 100\n  step: 10\n\
         serializer:\n  use_default_prefixes: false\n  prefixes:\n    ex: http://ex/\n",
    )
    .unwrap();
    let db = Database::with_config(config);
    assert_eq!(db.now(), 100);
    assert_eq!(db.now(), 110);

    db.add_triple(b"http://ex/a", b"http://ex/p", b"http://ex/b")
        .unwrap();
    let mut out = [0u8; 256];
    let n = db.serialize_turtle(&mut out).unwrap();
    let text = std::str::from_utf8(&out[..n]).unwrap();
    assert!(text.starts_with("@prefix ex: <http://ex/> ."));
    assert!(text.contains("ex:a ex:p ex:b"));
}

#[test]
fn test_concurrent_readers_and_writer() {
    let store = Arc::new(Store::with_clock(Arc::new(DeterministicClock::default())));
    store
        .load_turtle("<http://ex/s> <http://ex/p> 0 .", None)
        .unwrap();

    let mut handles = Vec::new();
    for worker in 0..4 {
        let store = Arc::clone(&store);
        handles.push(std::thread::spawn(move || {
            for i in 0..50 {
                if worker == 0 {
                    let doc = format!("<http://ex/s> <http://ex/p> {} .", i + 1);
                    store.load_turtle(&doc, None).unwrap();
                } else {
                    let engine = trellis::SparqlEngine::new(&store);
                    let results = engine.query("SELECT * WHERE { ?s ?p ?o }").unwrap();
                    // every row is a complete triple, never a torn index
                    assert!(results.len() as u64 >= 1);
                }
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(store.count(), 51);
}
