use jsonql as jql;
use jql::{JsonCompiler, JsonQlOptions, JsonTextData};
use pretty_assertions::assert_eq;
use serde_json::json;

fn compile(text: &str) -> (serde_json::Value, Vec<String>) {
    let result = jql::compile(&JsonTextData::new("Doc", text));
    let value = result.document("Doc").map(|d| d.to_json()).unwrap_or_default();
    (value, result.errors.iter().map(|e| e.to_string()).collect())
}

#[test]
fn test_value_keeps_json_types() {
    let (value, errors) = compile(
        r#"{"N": [3, 1, 2], "Max": "$value(Max(N))", "Sorted": "$value(N.Where(x => x > 1))", "Flag": "$value(Any(N, x => x == 2))", "Text": "$value(Upper('ab'))"}"#,
    );
    assert!(errors.is_empty(), "{errors:?}");
    assert_eq!(value["Max"], json!(3));
    assert_eq!(value["Sorted"], json!([3, 2]));
    assert_eq!(value["Flag"], json!(true));
    assert_eq!(value["Text"], json!("AB"));
}

#[test]
fn test_merge_splices_items_in_place() {
    let (value, errors) = compile(r#"{"A": [1, 2], "B": {"K": 1}, "L": ["$merge(A)", "x", "$merge(B)", "$merge(Missing)", "$merge(Count(A))"]}"#);
    assert!(errors.is_empty(), "{errors:?}");
    assert_eq!(value["L"], json!([1, 2, "x", {"K": 1}, 2]));
}

#[test]
fn test_merge_outside_array_is_rejected() {
    let (value, errors) = compile(r#"{"A": [1], "B": "$merge(A)"}"#);
    assert_eq!(value, json!(null));
    assert_eq!(errors.len(), 1);
}

#[test]
fn test_copy_fields_from_collection() {
    let (value, errors) = compile(
        r#"{"Parts": [{"A": 1}, {"B": 2, "A": 9}], "Obj": {"$copyFields": "Parts", "C": 3}}"#,
    );
    assert!(errors.is_empty(), "{errors:?}");
    assert_eq!(value["Obj"], json!({"A": 1, "B": 2, "C": 3}));
}

#[test]
fn test_copy_fields_from_parent_document() {
    let data = JsonTextData::new("Doc", r#"{"Obj": {"$copyFields": "Base", "Own": true}}"#)
        .with_parent(JsonTextData::new("Parent", r#"{"Base": {"Inherited": [1, 2]}}"#));
    let result = jql::compile(&data);
    assert_eq!(result.errors, vec![]);
    let doc = result.document("Doc").unwrap();
    assert_eq!(doc.to_json(), json!({"Obj": {"Inherited": [1, 2], "Own": true}}));
    let inherited = doc.value.get("Obj").unwrap().get("Inherited").unwrap();
    assert_eq!(inherited.path().to_string(), "Obj.Inherited");
    assert_eq!(inherited.path_in_referenced_json().unwrap().document_id(), "Parent");
}

#[test]
fn test_interpolation_formats_values() {
    let (value, errors) = compile(
        r#"{"Name": "Ada", "N": 2.5, "Items": [1, 2], "S": "$(Name) has $(N) and $(Items) and $(null)", "Plain": "costs $5 (approx)"}"#,
    );
    assert!(errors.is_empty(), "{errors:?}");
    assert_eq!(value["S"], json!("Ada has 2.5 and [1,2] and null"));
    assert_eq!(value["Plain"], json!("costs $5 (approx)"));
}

#[test]
fn test_undefined_value_is_an_error_when_not_removed() {
    let options = JsonQlOptions { remove_undefined_values: false, ..JsonQlOptions::default() };
    let result = JsonCompiler::new()
        .with_options(options)
        .compile(&JsonTextData::new("Doc", r#"{"A": "$value(Missing)"}"#));
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].message, "value is undefined");
    assert_eq!(result.document("Doc").unwrap().to_json(), json!({"A": "$value(Missing)"}));
}

#[test]
fn test_root_value_document() {
    let (value, errors) = compile(r#""$value(1 + 2)""#);
    assert!(errors.is_empty());
    assert_eq!(value, json!(3));
}

#[test]
fn test_copies_carry_evaluated_subtrees() {
    let (value, errors) = compile(
        r#"{"Template": {"Id": "$value(2 * 21)", "Label": "item $(Template.Id)"}, "Copy": {"$copyFields": "Template"}, "List": ["$merge(Template)"], "Whole": "$value(Template)"}"#,
    );
    assert!(errors.is_empty(), "{errors:?}");
    let template = json!({"Id": 42, "Label": "item 42"});
    assert_eq!(
        value,
        json!({"Template": template.clone(), "Copy": template.clone(), "List": [template.clone()], "Whole": template})
    );
}

#[test]
fn test_forward_references_resolve() {
    let (value, errors) = compile(r#"{"Total": "$value(Net * 1.5)", "Net": "$value(Sum(Lines))", "Lines": [2, "$merge(Extra)"], "Extra": [4, 6]}"#);
    assert!(errors.is_empty(), "{errors:?}");
    assert_eq!(value, json!({"Total": 18, "Net": 12, "Lines": [2, 4, 6], "Extra": [4, 6]}));
}

#[test]
fn test_sibling_values_over_one_array_do_not_wait_on_each_other() {
    let (value, errors) =
        compile(r#"{"Items": [{"P": 1, "Total": "$value(Sum(Items.P))"}, {"P": 3, "Total": "$value(Sum(Items.P))"}]}"#);
    assert!(errors.is_empty(), "{errors:?}");
    assert_eq!(value, json!({"Items": [{"P": 1, "Total": 4}, {"P": 3, "Total": 4}]}));
}

#[test]
fn test_reference_cycle_is_reported() {
    let (value, errors) = compile(r#"{"A": "$value(B)", "B": "$value(A)"}"#);
    assert_eq!(value, json!({"A": "$value(B)", "B": "$value(A)"}));
    assert_eq!(errors.len(), 2);
    assert!(errors.iter().all(|e| e.ends_with("circular reference between expressions")), "{errors:?}");
}
