//! End-to-end `$expand` and `$validate-code` scenarios through the request
//! layer.

use terminology_engine::operations::{self, ExpandRequest, ValidateCodeRequest};
use terminology_engine::terminology_types::well_known::{V2_0136, V3_MARITAL_STATUS};
use terminology_engine::terminology_types::{
    CodeSystemDefinition, ConceptDefinition, ConceptSet, Filter, ValueSetDefinition,
};
use terminology_engine::{EngineConfig, TerminologyEngine};

const MY_CS: &str = "http://example.com/my_code_system";
const MY_VS: &str = "http://example.com/my_value_set";

fn my_code_system() -> CodeSystemDefinition {
    CodeSystemDefinition::new(MY_CS)
        .with_id("my-cs")
        .with_concept(
            ConceptDefinition::new("ParentA", "Parent A")
                .with_child(
                    ConceptDefinition::new("childAA", "Child AA")
                        .with_child(ConceptDefinition::new("childAAA", "Child AAA"))
                        .with_child(ConceptDefinition::new("childAAB", "Child AAB")),
                )
                .with_child(ConceptDefinition::new("childAB", "Child AB")),
        )
        .with_concept(ConceptDefinition::new("ParentB", "Parent B"))
}

fn my_value_set() -> ValueSetDefinition {
    ValueSetDefinition::new(MY_VS)
        .with_id("my-vs")
        .with_include(ConceptSet::system(MY_CS).with_filter(Filter::is_a("childAA")))
}

fn engine(config: EngineConfig) -> TerminologyEngine {
    let engine = TerminologyEngine::in_memory(config).unwrap();
    engine.store_code_system(my_code_system()).unwrap();
    engine.store_value_set(my_value_set()).unwrap();
    engine
}

fn sorted_codes(expansion: &terminology_engine::terminology_types::ExpansionResult) -> Vec<&str> {
    let mut codes: Vec<&str> = expansion.codes().collect();
    codes.sort_unstable();
    codes
}

// ═══════════════════════════════════════════════════════════════════════════
// $expand
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn expand_by_instance_url_and_inline() {
    let engine = engine(EngineConfig::default());
    let expected = vec!["childAA", "childAAA", "childAAB"];

    let by_id = operations::expand(&engine, &ExpandRequest::instance("my-vs")).unwrap();
    assert_eq!(sorted_codes(&by_id), expected);

    let by_url = operations::expand(&engine, &ExpandRequest::by_url(MY_VS)).unwrap();
    assert_eq!(sorted_codes(&by_url), expected);

    let inline = operations::expand(&engine, &ExpandRequest::inline(my_value_set())).unwrap();
    assert_eq!(sorted_codes(&inline), expected);
    assert_eq!(inline.total, 3);
}

#[test]
fn expand_with_pre_expansion_matches_live() {
    let live = engine(EngineConfig::default());
    let pre = engine(EngineConfig::with_pre_expansion());

    let report = pre.run_deferred_pre_expansions();
    assert_eq!(report.processed, 1);
    assert!(pre.materializer().snapshots().get("my-vs").is_some());

    for request in [
        ExpandRequest::instance("my-vs"),
        ExpandRequest::by_url(MY_VS),
        ExpandRequest::inline(my_value_set()),
    ] {
        let from_snapshot = operations::expand(&pre, &request).unwrap();
        let from_graph = operations::expand(&live, &request).unwrap();
        assert!(from_snapshot.same_contents(&from_graph));
    }
}

#[test]
fn expand_after_code_system_change_sees_new_concepts() {
    let engine = engine(EngineConfig::with_pre_expansion());
    engine.run_deferred_pre_expansions();

    let mut updated = my_code_system().with_concept(ConceptDefinition::new("ParentC", "Parent C"));
    updated.concepts[0].concepts[0]
        .concepts
        .push(ConceptDefinition::new("childAAC", "Child AAC"));
    engine.store_code_system(updated).unwrap();

    assert!(engine.materializer().snapshots().get("my-vs").is_none());
    let expansion = operations::expand(&engine, &ExpandRequest::instance("my-vs")).unwrap();
    assert_eq!(
        sorted_codes(&expansion),
        vec!["childAA", "childAAA", "childAAB", "childAAC"]
    );

    engine.run_deferred_pre_expansions();
    let snapshot = engine.materializer().snapshots().get("my-vs").unwrap();
    assert_eq!(snapshot.expansion.total, 4);
}

#[test]
fn expand_paging_and_filter() {
    let engine = engine(EngineConfig::default());
    let vs = ValueSetDefinition::new("http://vs")
        .with_include(ConceptSet::system(MY_CS).with_filter(Filter::is_a("ParentA")));

    let mut request = ExpandRequest::inline(vs.clone());
    request.offset = Some(1);
    request.count = Some(2);
    let page = operations::expand(&engine, &request).unwrap();
    assert_eq!(page.len(), 2);
    assert_eq!(page.total, 5);
    assert_eq!(page.offset, 1);

    let mut request = ExpandRequest::inline(vs);
    request.filter = Some("aab".into());
    let filtered = operations::expand(&engine, &request).unwrap();
    assert_eq!(filtered.codes().collect::<Vec<_>>(), vec!["childAAB"]);
}

#[test]
fn expand_rejects_invalid_window() {
    let engine = engine(EngineConfig::with_pre_expansion());

    let mut request = ExpandRequest::instance("my-vs");
    request.offset = Some(-1);
    let err = operations::expand(&engine, &request).unwrap_err();
    assert_eq!(
        err.to_string(),
        "HTTP 400 Bad Request: offset parameter for $expand operation must be >= 0 when specified. offset: -1"
    );

    let mut request = ExpandRequest::by_url(MY_VS);
    request.count = Some(-1);
    let err = operations::expand(&engine, &request).unwrap_err();
    assert_eq!(
        err.to_string(),
        "HTTP 400 Bad Request: count parameter for $expand operation must be >= 0 when specified. count: -1"
    );
}

#[test]
fn expand_unknown_filter_code() {
    let engine = engine(EngineConfig::default());
    let vs = ValueSetDefinition::new("http://vs")
        .with_include(ConceptSet::system(MY_CS).with_filter(Filter::is_a("childFOOOOOOO")));

    let err = operations::expand(&engine, &ExpandRequest::inline(vs)).unwrap_err();
    assert_eq!(
        err.to_string(),
        "HTTP 400 Bad Request: Invalid filter criteria - code does not exist: {http://example.com/my_code_system}childFOOOOOOO"
    );
}

#[test]
fn expand_bogus_url() {
    let engine = engine(EngineConfig::default());
    let err = operations::expand(
        &engine,
        &ExpandRequest::by_url("http://www.healthintersections.com.au/fhir/ValueSet/bogus"),
    )
    .unwrap_err();

    assert_eq!(err.status, 404);
    assert_eq!(
        err.to_string(),
        "HTTP 404 Not Found: Unknown ValueSet: http%3A%2F%2Fwww.healthintersections.com.au%2Ffhir%2FValueSet%2Fbogus"
    );
}

#[test]
fn expand_after_code_system_url_change() {
    let engine = TerminologyEngine::in_memory(EngineConfig::with_pre_expansion()).unwrap();

    let cs = |url: &str| {
        CodeSystemDefinition::new(url)
            .with_id("CS")
            .with_concept(ConceptDefinition::new("A", "Code A"))
    };
    let vs = |system: &str| {
        ValueSetDefinition::new("http://vs179789")
            .with_id("VS179789")
            .with_include(ConceptSet::system(system))
    };

    engine.store_code_system(cs("http://foo1")).unwrap();
    engine.store_value_set(vs("http://foo1")).unwrap();
    engine.run_deferred_pre_expansions();
    let first = operations::expand(&engine, &ExpandRequest::instance("VS179789")).unwrap();
    assert_eq!(first.len(), 1);

    engine.store_code_system(cs("http://foo2")).unwrap();
    engine.store_value_set(vs("http://foo2")).unwrap();
    engine.run_deferred_pre_expansions();
    let second = operations::expand(&engine, &ExpandRequest::instance("VS179789")).unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second.contains[0].system, "http://foo2");

    assert!(!engine.registry().contains("http://foo1"));
}

#[test]
fn expand_extensional_value_set() {
    let engine = TerminologyEngine::in_memory(EngineConfig::default()).unwrap();
    engine
        .store_code_system(
            CodeSystemDefinition::new("http://acme.org")
                .with_id("acme")
                .with_concept(ConceptDefinition::new("8450-9", "Systolic blood pressure--expiration"))
                .with_concept(ConceptDefinition::new(
                    "11378-7",
                    "Systolic blood pressure at First encounter",
                )),
        )
        .unwrap();
    engine
        .store_value_set(
            ValueSetDefinition::new("http://acme.org/ValueSet/extensional-case-2")
                .with_id("extensional-case-2")
                .with_include(ConceptSet::system("http://acme.org").with_code("11378-7").with_code("8450-9")),
        )
        .unwrap();

    let expansion = operations::expand(&engine, &ExpandRequest::instance("extensional-case-2")).unwrap();
    assert_eq!(expansion.codes().collect::<Vec<_>>(), vec!["11378-7", "8450-9"]);

    let result = operations::validate_code(
        &engine,
        &ValidateCodeRequest {
            instance_id: Some("extensional-case-2".into()),
            system: Some("http://acme.org".into()),
            code: Some("11378-7".into()),
            display: Some("Systolic blood pressure at First encounter".into()),
            ..Default::default()
        },
    )
    .unwrap();
    assert!(result.matched);
}

// ═══════════════════════════════════════════════════════════════════════════
// $validate-code
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn validate_built_in_value_set() {
    let engine = TerminologyEngine::in_memory(EngineConfig::default()).unwrap();
    let result = operations::validate_code(
        &engine,
        &ValidateCodeRequest {
            instance_id: Some("yesnodontknow".into()),
            system: Some(V2_0136.into()),
            code: Some("Y".into()),
            ..Default::default()
        },
    )
    .unwrap();

    assert!(result.matched);
    assert_eq!(result.display.as_deref(), Some("Yes"));
}

#[test]
fn validate_against_is_a_value_set() {
    let engine = TerminologyEngine::in_memory(EngineConfig::default()).unwrap();
    engine
        .store_code_system(
            CodeSystemDefinition::new("http://mycs").with_concept(
                ConceptDefinition::new("ParentA", "Parent A")
                    .with_child(ConceptDefinition::new("ChildAA", "Child AA")),
            ),
        )
        .unwrap();
    let vs = ValueSetDefinition::new("http://myvs")
        .with_include(ConceptSet::system("http://mycs").with_filter(Filter::is_a("ParentA")));

    let request = |code: &str| ValidateCodeRequest {
        value_set: Some(vs.clone()),
        system: Some("http://mycs".into()),
        code: Some(code.into()),
        ..Default::default()
    };

    let child = operations::validate_code(&engine, &request("ChildAA")).unwrap();
    assert!(child.matched);
    assert_eq!(child.display.as_deref(), Some("Child AA"));

    let foo = operations::validate_code(&engine, &request("FOO")).unwrap();
    assert!(!foo.matched);
    assert_eq!(
        foo.message,
        "validation failed: Unknown code 'http://mycs#FOO' for ValueSet http://myvs"
    );
}

#[test]
fn validate_in_code_system() {
    let engine = TerminologyEngine::in_memory(EngineConfig::default()).unwrap();
    let request = |system: &str, code: &str| ValidateCodeRequest {
        system: Some(system.into()),
        code: Some(code.into()),
        ..Default::default()
    };

    let married = operations::validate_code(&engine, &request(V3_MARITAL_STATUS, "M")).unwrap();
    assert!(married.matched);
    assert_eq!(married.display.as_deref(), Some("Married"));

    let err = operations::validate_code(&engine, &request("http://unknown", "M")).unwrap_err();
    assert_eq!(err.status, 404);
}

#[test]
fn validate_display_mismatch() {
    let engine = engine(EngineConfig::default());
    let result = operations::validate_code(
        &engine,
        &ValidateCodeRequest {
            url: Some(MY_VS.into()),
            system: Some(MY_CS.into()),
            code: Some("childAAA".into()),
            display: Some("Wrong".into()),
            ..Default::default()
        },
    )
    .unwrap();

    assert!(!result.matched);
    assert!(result.message.contains("does not match expected \"Child AAA\""));
}

#[test]
fn validate_requires_code() {
    let engine = engine(EngineConfig::default());
    let err = operations::validate_code(
        &engine,
        &ValidateCodeRequest {
            instance_id: Some("my-vs".into()),
            ..Default::default()
        },
    )
    .unwrap_err();
    assert_eq!(err.message, "No code was provided to validate. Unable to validate.");
}
