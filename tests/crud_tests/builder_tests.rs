//! Builder Tests
//!
//! Clause validation for every CRUD builder.

use xclient::crud::{
    Assignment, CollectionAdd, CollectionFind, CollectionModify, CollectionRemove, CrudKind,
    DataModel, TableDelete, TableInsert, TableSelect, TableUpdate, Target,
};
use xclient::{DynamicValue, WireValue, XError};

// =============================================================================
// Helper Functions
// =============================================================================

fn message<T: std::fmt::Debug>(result: xclient::Result<T>) -> String {
    match result {
        Err(XError::Argument(message)) => message,
        other => panic!("Expected an argument error, got {:?}", other),
    }
}

// =============================================================================
// Target Tests
// =============================================================================

#[test]
fn test_target_from_qualified_name() {
    let target = Target::from("test.alpha");
    assert_eq!(target.schema.as_deref(), Some("test"));
    assert_eq!(target.name, "alpha");

    let target = Target::from("alpha");
    assert_eq!(target.schema, None);
    assert_eq!(target.name, "alpha");
}

// =============================================================================
// Select Tests
// =============================================================================

#[test]
fn test_select_collects_clauses() {
    let request = TableSelect::new("alpha")
        .fields(&["idalpha", " alphacol "])
        .unwrap()
        .where_("idalpha > :min")
        .unwrap()
        .bind("min", 1)
        .unwrap()
        .order_by(&["idalpha DESC"])
        .unwrap()
        .limit(10)
        .unwrap()
        .offset(5)
        .unwrap()
        .build()
        .unwrap();

    assert_eq!(request.kind(), CrudKind::Find);
    assert_eq!(request.data_model(), DataModel::Table);
    assert_eq!(request.projection(), &["idalpha", "alphacol"]);
    assert_eq!(request.criteria(), Some("idalpha > :min"));
    assert_eq!(request.bindings(), &[("min".to_string(), WireValue::SInt(1))]);
    assert_eq!(request.order(), &["idalpha DESC"]);
    assert_eq!(request.limit(), Some(10));
    assert_eq!(request.offset(), Some(5));
}

#[test]
fn test_select_empty_fields() {
    assert_eq!(
        message(TableSelect::new("alpha").fields(&[])),
        "Field selection criteria can not be empty"
    );
    assert_eq!(
        message(TableSelect::new("alpha").fields(&["a", "  "])),
        "Field selection criteria can not be empty"
    );
}

#[test]
fn test_select_empty_condition() {
    assert_eq!(
        message(TableSelect::new("alpha").where_("   ")),
        "find: Requires a search condition"
    );
}

#[test]
fn test_select_repeated_clause() {
    let select = TableSelect::new("alpha").where_("a = 1").unwrap();
    assert_eq!(message(select.where_("b = 2")), "find: filter was already given");

    let select = TableSelect::new("alpha").limit(1).unwrap();
    assert_eq!(message(select.limit(2)), "find: limit was already given");
}

#[test]
fn test_select_empty_sort() {
    assert_eq!(
        message(TableSelect::new("alpha").order_by(&[])),
        "Sort criteria can not be empty"
    );
}

#[test]
fn test_offset_requires_limit() {
    assert_eq!(
        message(TableSelect::new("alpha").offset(3)),
        "find: offset requires a limit"
    );
}

#[test]
fn test_missing_bindings_are_listed() {
    let select = TableSelect::new("alpha")
        .where_("a = :first AND b = :second OR c = :first")
        .unwrap();
    assert_eq!(
        message(select.build()),
        "Missing value bindings for: first, second"
    );
}

#[test]
fn test_binding_unknown_placeholder() {
    let select = TableSelect::new("alpha")
        .where_("a = :a")
        .unwrap()
        .bind("a", 1)
        .unwrap()
        .bind("z", 2)
        .unwrap();
    assert_eq!(
        message(select.build()),
        "Unable to bind value for unexisting placeholder: z"
    );
}

#[test]
fn test_binding_without_condition() {
    let select = TableSelect::new("alpha").bind("a", 1).unwrap();
    assert_eq!(
        message(select.build()),
        "Unable to bind value for unexisting placeholder: a"
    );
}

#[test]
fn test_rebinding_replaces_value() {
    let request = TableSelect::new("alpha")
        .where_("a = :a")
        .unwrap()
        .bind(":a", 1)
        .unwrap()
        .bind("a", "one")
        .unwrap()
        .build()
        .unwrap();
    assert_eq!(
        request.bindings(),
        &[("a".to_string(), WireValue::String("one".to_string()))]
    );
}

#[test]
fn test_placeholders_inside_quotes_are_text() {
    let request = TableSelect::new("alpha")
        .where_("alphacol = ':literal' AND idalpha = :id")
        .unwrap()
        .bind("id", 4)
        .unwrap()
        .build()
        .unwrap();
    assert_eq!(request.bindings().len(), 1);
}

#[test]
fn test_bind_value_uses_bridge() {
    let err = TableSelect::new("alpha")
        .where_("a = :a")
        .unwrap()
        .bind_value("a", &DynamicValue::Array(vec![]))
        .unwrap_err();
    assert!(err.is_argument_error());
    assert!(err.to_string().contains("Unsupported value received: []"));
}

// =============================================================================
// Insert Tests
// =============================================================================

#[test]
fn test_insert_rows() {
    let request = TableInsert::new("alpha")
        .columns(&["idalpha", "alphacol"])
        .unwrap()
        .values(vec![1.into(), "one".into()])
        .unwrap()
        .values_dynamic(&[DynamicValue::Integer(2), DynamicValue::from("two")])
        .unwrap()
        .build()
        .unwrap();

    assert_eq!(request.kind(), CrudKind::Insert);
    assert_eq!(request.columns(), &["idalpha", "alphacol"]);
    assert_eq!(request.rows().len(), 2);
    assert_eq!(request.rows()[1][1], WireValue::String("two".to_string()));
}

#[test]
fn test_insert_arity_mismatch() {
    let insert = TableInsert::new("alpha")
        .columns(&["idalpha", "alphacol"])
        .unwrap();
    assert_eq!(
        message(insert.values(vec![1.into()])),
        "insert: row has 1 values, expected 2"
    );
}

#[test]
fn test_insert_rows_without_columns_share_arity() {
    let insert = TableInsert::new("alpha")
        .values(vec![1.into(), 2.into()])
        .unwrap();
    assert_eq!(
        message(insert.values(vec![1.into(), 2.into(), 3.into()])),
        "insert: row has 3 values, expected 2"
    );
}

#[test]
fn test_insert_without_rows() {
    let insert = TableInsert::new("alpha").columns(&["a"]).unwrap();
    assert_eq!(message(insert.build()), "insert: Missing values for insert");
}

#[test]
fn test_insert_columns_after_values() {
    let insert = TableInsert::new("alpha").values(vec![1.into()]).unwrap();
    assert_eq!(
        message(insert.columns(&["a"])),
        "insert: columns must precede values"
    );
}

#[test]
fn test_insert_undefined_value() {
    let err = TableInsert::new("alpha")
        .values_dynamic(&[DynamicValue::Undefined])
        .unwrap_err();
    assert_eq!(err.to_string(), "Argument error: Invalid value");
}

// =============================================================================
// Update and Delete Tests
// =============================================================================

#[test]
fn test_update_requires_assignment() {
    let update = TableUpdate::new("alpha").where_("idalpha = 1").unwrap();
    assert_eq!(
        message(update.build()),
        "update: No fields specified for update"
    );
}

#[test]
fn test_update_assignments_keep_order() {
    let request = TableUpdate::new("alpha")
        .set("alphacol", "x")
        .unwrap()
        .set("counter", WireValue::expression("counter + 1").unwrap())
        .unwrap()
        .build()
        .unwrap();

    let targets: Vec<&str> = request.assignments().iter().map(Assignment::target).collect();
    assert_eq!(targets, vec!["alphacol", "counter"]);
}

#[test]
fn test_update_empty_column() {
    assert_eq!(
        message(TableUpdate::new("alpha").set(" ", 1)),
        "update: target can not be empty"
    );
}

#[test]
fn test_delete_without_condition() {
    let request = TableDelete::new("alpha").build().unwrap();
    assert_eq!(request.kind(), CrudKind::Delete);
    assert_eq!(request.criteria(), None);
}

// =============================================================================
// Collection Tests
// =============================================================================

#[test]
fn test_find_uses_document_model() {
    let request = CollectionFind::new("people")
        .fields(&["name", "$.address.city AS city"])
        .unwrap()
        .sort(&["name"])
        .unwrap()
        .build()
        .unwrap();
    assert_eq!(request.data_model(), DataModel::Document);
    assert_eq!(request.projection().len(), 2);
}

#[test]
fn test_add_validates_documents() {
    assert_eq!(
        message(CollectionAdd::new("people").add("[1, 2]")),
        "add: Invalid document: expected a JSON object"
    );
    assert!(message(CollectionAdd::new("people").add("{nope"))
        .starts_with("add: Invalid document: "));
    assert_eq!(
        message(CollectionAdd::new("people").add(5)),
        "add: Invalid document: sint value"
    );
}

#[test]
fn test_add_accepts_json_and_expressions() {
    let request = CollectionAdd::new("people")
        .add(r#"{"_id": "1", "name": "Ann"}"#)
        .unwrap()
        .add_json(&serde_json::json!({"_id": "2", "name": "Bob"}))
        .unwrap()
        .add(WireValue::expression("JSON_OBJECT('_id', '3')").unwrap())
        .unwrap()
        .build()
        .unwrap();
    assert_eq!(request.rows().len(), 3);
}

#[test]
fn test_add_without_documents() {
    assert_eq!(
        message(CollectionAdd::new("people").build()),
        "add: Missing documents for add"
    );
}

#[test]
fn test_modify_requires_condition_and_changes() {
    assert_eq!(
        message(CollectionModify::new("people", "")),
        "update: Requires a search condition"
    );

    let modify = CollectionModify::new("people", "$._id = '1'").unwrap();
    assert_eq!(message(modify.build()), "modify: No changes specified");
}

#[test]
fn test_modify_set_and_unset() {
    let request = CollectionModify::new("people", "$._id = :id")
        .unwrap()
        .set("name", "Ann")
        .unwrap()
        .unset(&["age", "nick"])
        .unwrap()
        .bind("id", "1")
        .unwrap()
        .build()
        .unwrap();

    assert_eq!(
        request.assignments(),
        &[
            Assignment::Set {
                target: "name".to_string(),
                value: WireValue::String("Ann".to_string()),
            },
            Assignment::Unset {
                target: "age".to_string(),
            },
            Assignment::Unset {
                target: "nick".to_string(),
            },
        ]
    );
}

#[test]
fn test_remove_condition_is_optional() {
    let everything = CollectionRemove::new("people").build().unwrap();
    assert_eq!(everything.kind(), CrudKind::Delete);
    assert_eq!(everything.criteria(), None);

    // An explicit filter still may not be blank
    assert_eq!(
        message(CollectionRemove::new("people").filter(" ")),
        "delete: Requires a search condition"
    );
    assert_eq!(
        message(
            CollectionRemove::new("people")
                .filter("$.a = 1")
                .unwrap()
                .filter("$.b = 2")
        ),
        "delete: filter was already given"
    );

    let request = CollectionRemove::new("people")
        .filter("$.age < :age")
        .unwrap()
        .bind_value("age", &DynamicValue::Integer(18))
        .unwrap()
        .limit(1)
        .unwrap()
        .build()
        .unwrap();
    assert_eq!(request.limit(), Some(1));
}
