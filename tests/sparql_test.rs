//! SPARQL end-to-end tests
//!
//! Loads a small social graph and checks query results through the public
//! engine, mostly in the `name=<term>` text format.

use trellis::rdf::Store;
use trellis::sparql::{QueryResults, ResultFormat, SparqlEngine, SparqlError};

const DATA: &str = r#"
@prefix ex: <http://example.org/> .
@prefix xsd: <http://www.w3.org/2001/XMLSchema#> .

ex:alice a ex:Person ;
    ex:name "Alice" ;
    ex:age 30 ;
    ex:knows ex:bob, ex:carol .

ex:bob a ex:Person ;
    ex:name "Bob"@en ;
    ex:age 25 ;
    ex:knows ex:carol .

ex:carol a ex:Person ;
    ex:name "Carol" ;
    ex:email <mailto:carol@example.org> .

ex:acme a ex:Company ;
    ex:name "ACME" ;
    ex:founded "1999"^^xsd:integer .
"#;

fn store() -> Store {
    let store = Store::new();
    store.load_turtle(DATA, None).unwrap();
    store
}

fn text(store: &Store, query: &str) -> String {
    let query = format!("PREFIX ex: <http://example.org/>\n{}", query);
    SparqlEngine::new(store)
        .query(&query)
        .unwrap()
        .serialize(ResultFormat::Text)
        .unwrap()
}

#[test]
fn test_pattern_completeness() {
    let store = store();
    let results = SparqlEngine::new(&store)
        .query("SELECT * WHERE { ?s ?p ?o }")
        .unwrap();
    let QueryResults::Solutions { variables, rows } = results else {
        panic!("expected solutions");
    };
    assert_eq!(variables, vec!["s", "p", "o"]);
    assert_eq!(rows.len() as u64, store.count());

    let mut distinct: Vec<String> = rows
        .iter()
        .map(|row| format!("{:?}", row.values()))
        .collect();
    distinct.sort();
    distinct.dedup();
    assert_eq!(distinct.len(), rows.len());
}

#[test]
fn test_literal_iri_comparison_drops_row() {
    let store = store();
    // ?o is an IRI for ex:knows rows and a literal elsewhere
    let out = text(
        &store,
        "SELECT ?o WHERE { ex:alice ?p ?o FILTER(?o > 10) }",
    );
    assert_eq!(out, "o=\"30\"^^<http://www.w3.org/2001/XMLSchema#integer>");

    let out = text(&store, "SELECT ?s WHERE { ?s ex:email ?e FILTER(?e = \"x\") }");
    assert_eq!(out, "");
}

#[test]
fn test_filter_unbound_is_dropped() {
    let store = store();
    let out = text(
        &store,
        "SELECT ?p WHERE { ?p a ex:Person OPTIONAL { ?p ex:age ?age } FILTER(?age < 100) } ORDER BY ?p",
    );
    assert_eq!(
        out,
        "p=<http://example.org/alice>\np=<http://example.org/bob>"
    );
}

#[test]
fn test_optional_and_bound() {
    let store = store();
    let out = text(
        &store,
        "SELECT ?p ?age WHERE { ?p a ex:Person OPTIONAL { ?p ex:age ?age } } ORDER BY DESC(?age)",
    );
    assert_eq!(
        out,
        "p=<http://example.org/alice>, age=\"30\"^^<http://www.w3.org/2001/XMLSchema#integer>\n\
         p=<http://example.org/bob>, age=\"25\"^^<http://www.w3.org/2001/XMLSchema#integer>\n\
         p=<http://example.org/carol>"
    );

    let out = text(
        &store,
        "SELECT ?p WHERE { ?p a ex:Person OPTIONAL { ?p ex:age ?age } FILTER(!BOUND(?age)) }",
    );
    assert_eq!(out, "p=<http://example.org/carol>");
}

#[test]
fn test_union_and_distinct() {
    let store = store();
    let out = text(
        &store,
        "SELECT DISTINCT ?x WHERE { { ?x a ex:Company } UNION { ?x ex:knows ex:carol } } ORDER BY ?x",
    );
    assert_eq!(
        out,
        "x=<http://example.org/acme>\nx=<http://example.org/alice>\nx=<http://example.org/bob>"
    );
}

#[test]
fn test_nested_group_scoping() {
    let store = store();
    let engine = SparqlEngine::new(&store);
    let rows = |query: &str| {
        engine
            .query(&format!("PREFIX ex: <http://example.org/>\n{}", query))
            .unwrap()
            .len()
    };

    // ?age is bound outside the inner group only
    assert_eq!(rows("SELECT ?p WHERE { ?p ex:age ?age { FILTER(?age = 30) } }"), 0);
    assert_eq!(rows("SELECT ?p WHERE { ?p ex:age ?age FILTER(?age = 30) }"), 1);
    assert_eq!(
        rows("SELECT ?p WHERE { ?p ex:age ?age { ?p ex:age ?inner FILTER(?inner = 30) } }"),
        1
    );

    let out = text(
        &store,
        "SELECT ?p ?copy WHERE { ?p ex:age ?age { BIND(?age AS ?copy) } } ORDER BY ?p",
    );
    assert_eq!(out, "p=<http://example.org/alice>\np=<http://example.org/bob>");
}

#[test]
fn test_union_branch_scoping() {
    let store = store();
    let out = text(
        &store,
        "SELECT ?p WHERE { ?p a ex:Person { ?p ex:age ?age } UNION { FILTER(BOUND(?p)) } } ORDER BY ?p",
    );
    assert_eq!(out, "p=<http://example.org/alice>\np=<http://example.org/bob>");

    // each branch binds on its own and joins on the shared ?p
    let out = text(
        &store,
        "SELECT ?p ?v WHERE { ?p ex:knows ex:bob { ?p ex:age ?v } UNION { ?p ex:name ?v } } ORDER BY ?v",
    );
    assert_eq!(
        out,
        "p=<http://example.org/alice>, v=\"30\"^^<http://www.w3.org/2001/XMLSchema#integer>\n\
         p=<http://example.org/alice>, v=\"Alice\""
    );
}

#[test]
fn test_optional_filter_sees_outer_bindings() {
    let store = store();
    let out = text(
        &store,
        "SELECT ?p ?younger WHERE { ?p ex:age ?a OPTIONAL { ?younger ex:age ?b FILTER(?b < ?a) } } ORDER BY ?p",
    );
    assert_eq!(
        out,
        "p=<http://example.org/alice>, younger=<http://example.org/bob>\np=<http://example.org/bob>"
    );
}

#[test]
fn test_minus_and_not_exists() {
    let store = store();
    let minus = text(
        &store,
        "SELECT ?p WHERE { ?p a ex:Person MINUS { ?p ex:knows ?anyone } }",
    );
    assert_eq!(minus, "p=<http://example.org/carol>");

    let not_exists = text(
        &store,
        "SELECT ?p WHERE { ?p a ex:Person FILTER NOT EXISTS { ?p ex:knows ?anyone } }",
    );
    assert_eq!(not_exists, minus);

    let exists = text(
        &store,
        "SELECT ?p WHERE { ?p a ex:Person FILTER EXISTS { ?p ex:knows ex:bob } }",
    );
    assert_eq!(exists, "p=<http://example.org/alice>");
}

#[test]
fn test_bind_values_and_select_expressions() {
    let store = store();
    let out = text(
        &store,
        "SELECT ?p ?next WHERE { ?p ex:age ?age BIND(?age + 1 AS ?next) } ORDER BY ?next",
    );
    assert_eq!(
        out,
        "p=<http://example.org/bob>, next=\"26\"^^<http://www.w3.org/2001/XMLSchema#integer>\n\
         p=<http://example.org/alice>, next=\"31\"^^<http://www.w3.org/2001/XMLSchema#integer>"
    );

    let out = text(
        &store,
        "SELECT ?p (UCASE(STR(?n)) AS ?upper) WHERE { VALUES ?p { ex:bob ex:nobody } ?p ex:name ?n }",
    );
    assert_eq!(out, "p=<http://example.org/bob>, upper=\"BOB\"");

    let out = text(
        &store,
        "SELECT ?n WHERE { ?p ex:name ?n } ORDER BY ?n VALUES ?p { ex:alice ex:acme }",
    );
    assert_eq!(out, "n=\"ACME\"\nn=\"Alice\"");
}

#[test]
fn test_string_builtins() {
    let store = store();
    let out = text(
        &store,
        "SELECT ?n WHERE { ?p ex:name ?n FILTER(LANG(?n) = \"en\" && LANGMATCHES(LANG(?n), \"EN\")) }",
    );
    assert_eq!(out, "n=\"Bob\"@en");

    let out = text(
        &store,
        "SELECT ?n WHERE { ?p ex:name ?n FILTER(REGEX(?n, \"^a\", \"i\")) } ORDER BY ?n",
    );
    assert_eq!(out, "n=\"ACME\"\nn=\"Alice\"");

    let out = text(
        &store,
        "SELECT ?p WHERE { ?p ex:email ?e FILTER(isIRI(?e) && STRSTARTS(STR(?e), \"mailto:\")) }",
    );
    assert_eq!(out, "p=<http://example.org/carol>");
}

#[test]
fn test_in_and_arithmetic() {
    let store = store();
    let out = text(
        &store,
        "SELECT ?p WHERE { ?p ex:age ?age FILTER(?age * 2 IN (50, 70)) }",
    );
    assert_eq!(out, "p=<http://example.org/bob>");

    let out = text(
        &store,
        "SELECT ?p WHERE { ?p ex:age ?age FILTER(?age NOT IN (25)) }",
    );
    assert_eq!(out, "p=<http://example.org/alice>");
}

#[test]
fn test_limit_offset() {
    let store = store();
    let out = text(
        &store,
        "SELECT ?n WHERE { ?p ex:name ?n } ORDER BY ?n LIMIT 2 OFFSET 1",
    );
    assert_eq!(out, "n=\"Alice\"\nn=\"Bob\"@en");
}

#[test]
fn test_ask_and_construct() {
    let store = store();
    let engine = SparqlEngine::new(&store);
    assert_eq!(
        engine
            .query("ASK { <http://example.org/bob> <http://example.org/knows> ?x }")
            .unwrap(),
        QueryResults::Boolean(true)
    );

    let results = engine
        .query(
            "PREFIX ex: <http://example.org/> \
             CONSTRUCT { ?b ex:knownBy ?a } WHERE { ?a ex:knows ?b }",
        )
        .unwrap();
    assert_eq!(results.len(), 3);

    let short = engine
        .query("PREFIX ex: <http://example.org/> CONSTRUCT WHERE { ?s a ex:Company }")
        .unwrap();
    let turtle = short.serialize(ResultFormat::Json).unwrap();
    assert!(turtle.contains("<http://example.org/acme>"));
}

#[test]
fn test_json_results() {
    let store = store();
    let json = SparqlEngine::new(&store)
        .query("SELECT ?n WHERE { <http://example.org/bob> <http://example.org/name> ?n }")
        .unwrap()
        .serialize(ResultFormat::Json)
        .unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    let binding = &value["results"]["bindings"][0]["n"];
    assert_eq!(binding["type"], "literal");
    assert_eq!(binding["value"], "Bob");
    assert_eq!(binding["xml:lang"], "en");
}

#[test]
fn test_rejections() {
    let store = store();
    let engine = SparqlEngine::new(&store);

    for query in [
        "SELECT * FROM <http://example.org/g> WHERE { ?s ?p ?o }",
        "SELECT * WHERE { GRAPH ?g { ?s ?p ?o } }",
        "SELECT (COUNT(?s) AS ?c) WHERE { ?s ?p ?o }",
        "SELECT ?s WHERE { ?s ?p ?o } GROUP BY ?s",
        "INSERT DATA { <http://a> <http://b> <http://c> }",
        "SELECT * WHERE { ?s <http://example.org/knows>/<http://example.org/knows> ?o }",
    ] {
        assert!(
            matches!(engine.query(query), Err(SparqlError::UnsupportedFeature(_))),
            "{}",
            query
        );
    }

    match engine.query("SELECT * WHERE {\n  ?s ?p\n}") {
        Err(SparqlError::Syntax { line, .. }) => assert_eq!(line, 3),
        other => panic!("expected a syntax error, got {:?}", other),
    }
    assert!(matches!(
        engine.query("SELECT ?s WHERE { ?s ?p ?o } ORDER BY ?missing"),
        Err(SparqlError::UnknownVariable(name)) if name == "missing"
    ));
}
