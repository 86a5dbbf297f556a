use jsonql as jql;
use jql::{JsonCompiler, JsonTextData};
use pretty_assertions::assert_eq;
use serde_json::json;

fn query(expression: &str, text: &str) -> jql::QueryResult {
    JsonCompiler::new().query_text(expression, &JsonTextData::new("Doc", text))
}

#[test]
fn test_sum() {
    let result = query("Sum(A)", r#"{"A": [1, 2, 3, 4]}"#);
    assert!(result.errors.is_empty());
    assert_eq!(result.to_json(), json!(10));
}

#[test]
fn test_where() {
    let result = query("A.Where(x => x > 2)", r#"{"A": [1, 2, 3, 4]}"#);
    assert_eq!(result.to_json(), json!([3, 4]));
}

#[test]
fn test_first_with_predicate() {
    let result = query("A.First(x => x > 2)", r#"{"A": [1, 2, 3, 4]}"#);
    assert_eq!(result.to_json(), json!(3));
}

#[test]
fn test_select_splices_array_projections() {
    let result = query("A.Select(x => x.L)", r#"{"A": [{"L": [1, 2]}, {"L": [3]}, {"L": []}]}"#);
    assert!(result.errors.is_empty());
    assert_eq!(result.to_json(), json!([1, 2, 3]));

    let result = query("Sum(A.Select(x => x.L))", r#"{"A": [{"L": [1, 2]}, {"L": [3]}]}"#);
    assert_eq!(result.to_json(), json!(6));
}

#[test]
fn test_property_steps_reach_into_nested_arrays() {
    let result = query("A.L.X", r#"{"A": [{"L": [{"X": 1}, {"X": 2}]}, {"L": [{"X": 3}]}]}"#);
    assert!(result.errors.is_empty());
    assert_eq!(result.to_json(), json!([1, 2, 3]));
}

#[test]
fn test_lookup_falls_back_to_ancestor() {
    let data = JsonTextData::new("Child", r#"{"B": 1}"#).with_parent(JsonTextData::new("Parent", r#"{"A": [5, 6]}"#));
    let result = JsonCompiler::new().query_text("A", &data);
    assert_eq!(result.errors, vec![]);
    assert_eq!(result.to_json(), json!([5, 6]));
}

#[test]
fn test_nearest_ancestor_wins() {
    let data = JsonTextData::new("Child", r#"{"B": "$value(A)"}"#).with_parent(
        JsonTextData::new("Parent", r#"{"A": "parent"}"#).with_parent(JsonTextData::new("Grand", r#"{"A": "grand"}"#)),
    );
    let compiled = jql::compile(&data);
    assert!(!compiled.has_errors());
    let child = compiled.document("Child").unwrap();
    assert_eq!(child.to_json(), json!({"B": "parent"}));
    assert_eq!(jql::query("A", &[child.clone()]).to_json(), json!("parent"));
    assert_eq!(jql::query("parent.A", &[child.clone()]).to_json(), json!("parent"));
}

#[test]
fn test_unterminated_call_fails_the_document() {
    let data = JsonTextData::new("Doc", r#"{"A": [1, 2], "S": "$value(Sum(A)"}"#);
    let compiled = jql::compile(&data);
    assert_eq!(compiled.errors.len(), 1);
    assert!(compiled.document("Doc").is_none());
}

#[test]
fn test_compiled_document_with_mutators() {
    let text = r#"{
        "Defaults": {"Currency": "EUR", "Rate": 0.2},
        "Order": {
            "$copyFields": "Defaults",
            "Lines": [{"Price": 10, "Qty": 2}, {"Price": 5, "Qty": 1}],
            "Net": "$value(Sum(Order.Lines, l => l.Price * l.Qty))",
            "Label": "Total: $(Order.Net * (1 + Order.Rate)) $(Order.Currency)"
        }
    }"#;
    let compiled = jql::compile(&JsonTextData::new("Doc", text));
    assert_eq!(compiled.errors, vec![]);
    let order = compiled.document("Doc").unwrap().to_json()["Order"].clone();
    assert_eq!(
        order,
        json!({
            "Currency": "EUR",
            "Rate": 0.2,
            "Lines": [{"Price": 10, "Qty": 2}, {"Price": 5, "Qty": 1}],
            "Net": 25,
            "Label": "Total: 30 EUR"
        })
    );
}
