//! Analyzer tests over hand-built definition graphs.

use std::collections::HashMap;

use asc_def::{Ident, Layer, Tag};
use asc_diag::ErrorKind;
use asc_types::{Type, display_signature};

use crate::{AnalyzeResult, NoFormTypes, Report, analyze, analyze_all};

fn layer(json: &str) -> Layer {
    serde_json::from_str(json).expect("test layer should parse")
}

fn check(json: &str, id: &str) -> AnalyzeResult<Report> {
    analyze(&[layer(json)], &Ident::name(id), &NoFormTypes)
}

fn check_ok(json: &str, id: &str) -> Report {
    check(json, id).expect("analysis should succeed")
}

#[test]
fn primitive_literals() {
    let graph = r#"{
        "n": {"t": "n", "v": 2},
        "s": {"t": "s", "v": "x"},
        "b": {"t": "b", "v": true},
        "u": {"t": "u"}
    }"#;
    assert_eq!(check_ok(graph, "n").ty, Type::Number);
    assert_eq!(check_ok(graph, "s").ty, Type::Str);
    assert_eq!(check_ok(graph, "b").ty, Type::Bool);
    assert_eq!(check_ok(graph, "u").ty, Type::Null);
}

#[test]
fn inline_literals_union_their_elements() {
    let graph = r#"{"m": {"t": "m", "v": [1, true, [2, "x"]]}}"#;
    assert_eq!(
        check_ok(graph, "m").ty.signature(),
        "array((array((number | string)) | bool | number))"
    );
}

#[test]
fn empty_literal_gets_a_fresh_element_variable() {
    let graph = r#"{"m": {"t": "m", "v": []}}"#;
    let report = check_ok(graph, "m");
    assert!(matches!(&report.ty, Type::Applied(recv, _) if **recv == Type::Array));
    assert!(!report.ty.is_concrete());
}

#[test]
fn zero_argument_call_of_a_constant() {
    let graph = r#"{
        "a": {"t": "n", "v": 2},
        "b": {"t": "c", "f": "a"},
        "c": {"t": "c", "f": "b", "a": ["a"]}
    }"#;
    assert_eq!(check_ok(graph, "a").ty, Type::Number);
    assert_eq!(check_ok(graph, "b").ty, Type::Number);
    // Applying a number is deferred, not invalid; only evaluation fails.
    assert_eq!(check_ok(graph, "c").ty.signature(), "number(number)");
}

#[test]
fn user_functions_get_one_variable_mapping() {
    let graph = r#"{
        "add3": {"t": "f", "p": ["a"], "b": {
            "=": {"t": "c", "f": "+", "a": ["a", "_three"]},
            "_three": {"t": "n", "v": 3}
        }},
        "one": {"t": "n", "v": 1},
        "call": {"t": "c", "f": "add3", "a": ["one"]}
    }"#;
    let add3 = check_ok(graph, "add3");
    assert!(matches!(&add3.ty, Type::Func(f) if f.arity() == 1));
    assert_eq!(check_ok(graph, "call").ty, Type::Number);
}

#[test]
fn map_over_a_list_of_numbers() {
    let graph = r#"{
        "add3": {"t": "f", "p": ["a"], "b": {
            "=": {"t": "c", "f": "+", "a": ["a", "_three"]},
            "_three": {"t": "n", "v": 3}
        }},
        "xs": {"t": "m", "v": [1, 2, 3]},
        "out": {"t": "c", "f": "map", "a": ["add3", "xs"]}
    }"#;
    let report = check_ok(graph, "out");
    assert_eq!(report.ty.signature(), "array(number)");
    assert!(report.std_usage.contains("map"));
    assert!(report.std_usage.contains("+"));
    for tag in [Tag::Call, Tag::Fn, Tag::Number, Tag::Literal] {
        assert!(report.def_types.contains(&tag), "missing tag {tag}");
    }
}

#[test]
fn identity_function_is_polymorphic() {
    let graph = r#"{"id2": {"t": "f", "p": ["x"], "b": {"=": {"t": "c", "f": "x"}}}}"#;
    let report = check_ok(graph, "id2");
    assert_eq!(display_signature(&report.ty), "fn{('a) -> 'a}");
}

#[test]
fn switch_results_union() {
    let graph = r#"{
        "x": {"t": "w", "m": [{"c": "t1", "v": "v1"}, {"v": "v2"}]},
        "t1": {"t": "b", "v": false},
        "v1": {"t": "n", "v": 1},
        "v2": {"t": "s", "v": "fallback"}
    }"#;
    assert_eq!(check_ok(graph, "x").ty.signature(), "(number | string)");
}

#[test]
fn self_reference_resolves_to_never() {
    let graph = r#"{"r": {"t": "c", "f": "r"}}"#;
    let report = check_ok(graph, "r");
    assert_eq!(report.ty, Type::Never);
    assert_eq!(report.ty.does_halt(), Some(false));
}

#[test]
fn mutual_recursion_also_collapses() {
    let graph = r#"{
        "a": {"t": "c", "f": "b"},
        "b": {"t": "c", "f": "a"}
    }"#;
    assert_eq!(check_ok(graph, "a").ty, Type::Never);
    assert_eq!(check_ok(graph, "b").ty, Type::Never);
}

#[test]
fn stdlib_misuse_is_a_type_error() {
    let graph = r#"{
        "s": {"t": "s", "v": "x"},
        "one": {"t": "n", "v": 1},
        "bad": {"t": "c", "f": "+", "a": ["s", "one"]},
        "arity": {"t": "c", "f": "+", "a": ["one"]}
    }"#;
    let err = check(graph, "bad").expect_err("string plus number");
    assert_eq!(err.kind, ErrorKind::TypeError);
    assert_eq!(err.path, vec!["bad".to_string()]);

    let err = check(graph, "arity").expect_err("wrong arity");
    assert_eq!(err.kind, ErrorKind::TypeError);
}

#[test]
fn missing_identifiers_report_not_in_scope() {
    let graph = r#"{"x": {"t": "c", "f": "missing"}}"#;
    let err = check(graph, "x").expect_err("missing reference");
    assert_eq!(err.kind, ErrorKind::NotInScope);
    assert_eq!(err.path, vec!["x".to_string(), "missing".to_string()]);
}

#[test]
fn parent_private_definitions_are_hidden_from_function_bodies() {
    let graph = r#"{
        "_k": {"t": "n", "v": 7},
        "f1": {"t": "f", "p": [], "b": {"=": {"t": "c", "f": "_k"}}},
        "out": {"t": "c", "f": "f1"}
    }"#;
    let err = check(graph, "out").expect_err("private parent definition");
    assert_eq!(err.kind, ErrorKind::NotInScope);
    assert_eq!(
        err.path,
        vec![
            "out".to_string(),
            "f1".to_string(),
            "=".to_string(),
            "_k".to_string(),
        ]
    );
    // Privates defined in the same body remain reachable.
    let graph = r#"{
        "f1": {"t": "f", "p": [], "b": {
            "=": {"t": "c", "f": "_k"},
            "_k": {"t": "n", "v": 7}
        }},
        "out": {"t": "c", "f": "f1"}
    }"#;
    assert_eq!(check_ok(graph, "out").ty, Type::Number);
}

#[test]
fn form_values_use_the_provider_type() {
    let graph = r#"{"x": {"t": "c", "f": "+", "a": ["@age", "one"]}, "one": {"t": "n", "v": 1}}"#;
    let mut form_types = HashMap::new();
    form_types.insert("@age".to_string(), Type::Number);
    let report =
        analyze(&[layer(graph)], &Ident::name("x"), &form_types).expect("typed form value");
    assert_eq!(report.ty, Type::Number);

    let err = analyze(&[layer(graph)], &Ident::name("x"), &NoFormTypes)
        .expect_err("untyped form value");
    assert_eq!(err.kind, ErrorKind::LeadingAtIdent);
    assert_eq!(err.path, vec!["x".to_string(), "@age".to_string()]);
}

#[test]
fn analyze_all_reports_every_top_level_id_in_order() {
    let graph = r#"{
        "a": {"t": "n", "v": 1},
        "bad": {"t": "c", "f": "+", "a": ["a", "s"]},
        "s": {"t": "s", "v": "x"}
    }"#;
    let results = analyze_all(&[layer(graph)], &NoFormTypes);
    let ids: Vec<String> = results.iter().map(|(id, _)| id.to_string()).collect();
    assert_eq!(ids, vec!["a", "bad", "s"]);
    assert!(results[0].1.is_ok());
    assert!(results[1].1.is_err());
    assert!(results[2].1.is_ok());
}

#[test]
fn analyze_all_strict_collects_every_error() {
    let graph = r#"{
        "a": {"t": "n", "v": 1},
        "bad": {"t": "c", "f": "+", "a": ["a", "s"]},
        "s": {"t": "s", "v": "x"},
        "worse": {"t": "c", "f": "missing"}
    }"#;
    let err = crate::analyze_all_strict(&[layer(graph)], &NoFormTypes)
        .expect_err("two failing definitions");
    assert_eq!(err.errors().len(), 2);
    assert!(err.to_string().starts_with("error["));
}

#[test]
fn later_layers_shadow_earlier_ones() {
    let base = layer(r#"{"x": {"t": "n", "v": 1}}"#);
    let over = layer(r#"{"x": {"t": "s", "v": "shadowed"}}"#);
    let report =
        analyze(&[base, over], &Ident::name("x"), &NoFormTypes).expect("shadowed lookup");
    assert_eq!(report.ty, Type::Str);
}
