//! In-memory evaluation tests for Quarry Query
//!
//! Grouping, ranking and conditional aggregates over fixtures, plus the
//! SQL and in-memory paths agreeing on the same filters.

use quarry_query::ast::{AggregateExpr, AggregateQuery, AggregationType};
use quarry_query::prelude::*;
use quarry_query::{InMemoryEvaluator, SqlTranslator};
use std::sync::Arc;

fn catalog() -> Catalog {
    Catalog::new()
        .with_entity(
            EntitySchema::new("Employee", "employees")
                .field(FieldMeta::new("id", DataType::BigInt).primary_key())
                .field(FieldMeta::new("dept", DataType::Text))
                .field(FieldMeta::new("sal", DataType::Integer))
                .field(FieldMeta::new("status", DataType::Text)),
        )
        .with_entity(
            EntitySchema::new("Review", "reviews")
                .field(FieldMeta::new("id", DataType::BigInt).primary_key())
                .field(FieldMeta::new("employeeId", DataType::BigInt).with_column("employee_id"))
                .field(FieldMeta::new("score", DataType::Integer)),
        )
}

fn employee(id: i64, dept: &str, sal: i64, status: &str) -> Record {
    Record::new()
        .with("id", id)
        .with("dept", dept)
        .with("sal", sal)
        .with("status", status)
}

fn rows(query: &Query, items: &[Record]) -> Vec<ResultRow> {
    let catalog = catalog();
    let adapters = AdapterRegistry::new();
    InMemoryEvaluator::new(&catalog, &adapters)
        .evaluate("Employee", query, items)
        .unwrap()
        .into_rows()
        .unwrap()
}

fn ints(rows: &[ResultRow], column: &str) -> Vec<i64> {
    rows.iter()
        .map(|r| r.value(column).and_then(Value::as_i64).unwrap_or(-1))
        .collect()
}

#[test]
fn test_group_sum_in_first_seen_order() {
    let items = vec![
        employee(1, "A", 10, "active"),
        employee(2, "A", 20, "active"),
        employee(3, "B", 5, "active"),
    ];
    let q = aggregate()
        .select(field("dept").into_definition())
        .select(field("sal").sum().as_("sum"))
        .group_by("dept")
        .build()
        .unwrap();
    let out = rows(&q, &items);
    assert_eq!(
        out,
        vec![
            ResultRow::new().with("dept", "A").with("sum", 30),
            ResultRow::new().with("dept", "B").with("sum", 5),
        ]
    );
}

#[test]
fn test_rank_dense_rank_row_number() {
    let items = vec![
        employee(1, "A", 300, "active"),
        employee(2, "A", 200, "active"),
        employee(3, "A", 200, "active"),
        employee(4, "A", 100, "active"),
    ];
    let q = window()
        .select_field("id")
        .select(rank().order_by_desc("sal").as_("rank"))
        .select(dense_rank().order_by_desc("sal").as_("dense"))
        .select(row_number().order_by_desc("sal").as_("n"))
        .build()
        .unwrap();
    let out = rows(&q, &items);
    assert_eq!(ints(&out, "rank"), vec![1, 2, 2, 4]);
    assert_eq!(ints(&out, "dense"), vec![1, 2, 2, 3]);
    assert_eq!(ints(&out, "n"), vec![1, 2, 3, 4]);
}

#[test]
fn test_count_if_counts_matching_rows() {
    let items = vec![
        employee(1, "A", 1, "active"),
        employee(2, "A", 1, "inactive"),
        employee(3, "B", 1, "active"),
        employee(4, "B", 1, "active"),
        employee(5, "C", 1, "pending"),
    ];
    let q = aggregate()
        .select(field("status").count_if(Condition::eq("active")).as_("active"))
        .build()
        .unwrap();
    let out = rows(&q, &items);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].value("active"), Some(&Value::Integer(3)));
}

#[test]
fn test_count_if_without_condition_fails_everywhere() {
    assert!(matches!(
        field("status").try_agg(AggregationType::CountIf, None),
        Err(QuarryError::MissingCondition(_))
    ));
    assert!(matches!(
        AggregateExpr::new("status", AggregationType::CountIf),
        Err(QuarryError::MissingCondition(_))
    ));

    // A hand-assembled AST cannot sneak past translation or evaluation.
    let q = Query::Aggregate(AggregateQuery {
        select_fields: vec![FieldDefinition::Aggregate {
            expr: AggregateExpr {
                field: "status".to_string(),
                json_path: None,
                agg_type: AggregationType::CountIf,
                condition: None,
                key_field: None,
            },
            alias: "active".to_string(),
        }],
        from_table: None,
        where_filters: Vec::new(),
        group_by: Vec::new(),
        having: Vec::new(),
        order_by: Vec::new(),
        limit: Limit::Unbounded,
    });
    let catalog = catalog();
    for dialect in [Dialect::POSTGRES, Dialect::MYSQL, Dialect::SQLITE, Dialect::H2] {
        let err = SqlTranslator::new(dialect, &catalog).translate("Employee", &q).unwrap_err();
        assert!(matches!(err, QuarryError::MissingCondition(_)), "{}", dialect.name());
    }
    let adapters = AdapterRegistry::new();
    let err = InMemoryEvaluator::new(&catalog, &adapters)
        .evaluate("Employee", &q, &[employee(1, "A", 1, "active")])
        .unwrap_err();
    assert!(matches!(err, QuarryError::MissingCondition(_)));
}

/// Shared operator subset: the in-memory result equals the rows a WHERE
/// clause over the same fixture selects.
#[test]
fn test_shared_operators_agree_with_sql_fixture() {
    let items = vec![
        employee(1, "A", 100, "active"),
        employee(2, "B", 250, "inactive"),
        employee(3, "A", 250, "active"),
        employee(4, "C", 400, "pending"),
    ];
    let cases: Vec<(Query, Vec<i64>, &str)> = vec![
        (
            select().where_("sal").eq(250).build().unwrap(),
            vec![2, 3],
            "SELECT * FROM \"employees\" WHERE \"sal\" = $1",
        ),
        (
            select().where_("dept").ne("A").build().unwrap(),
            vec![2, 4],
            "SELECT * FROM \"employees\" WHERE \"dept\" != $1",
        ),
        (
            select().where_("sal").gt(100).where_("sal").lte(250).build().unwrap(),
            vec![2, 3],
            "SELECT * FROM \"employees\" WHERE \"sal\" > $1 AND \"sal\" <= $2",
        ),
        (
            select().where_("sal").gte(250).where_("sal").lt(400).build().unwrap(),
            vec![2, 3],
            "SELECT * FROM \"employees\" WHERE \"sal\" >= $1 AND \"sal\" < $2",
        ),
        (
            select().where_("status").in_list(["active", "pending"]).build().unwrap(),
            vec![1, 3, 4],
            "SELECT * FROM \"employees\" WHERE \"status\" IN ($1, $2)",
        ),
    ];

    let catalog = catalog();
    let adapters = AdapterRegistry::new();
    let evaluator = InMemoryEvaluator::new(&catalog, &adapters);
    let translator = SqlTranslator::new(Dialect::POSTGRES, &catalog);
    for (query, expected_ids, expected_sql) in cases {
        assert_eq!(translator.translate("Employee", &query).unwrap().sql, expected_sql);
        let matched: Vec<i64> = evaluator
            .evaluate("Employee", &query, &items)
            .unwrap()
            .into_entities()
            .unwrap()
            .iter()
            .filter_map(|r| r.value("id").and_then(Value::as_i64))
            .collect();
        assert_eq!(matched, expected_ids, "{}", expected_sql);
    }
}

#[test]
fn test_engine_sub_query_through_adapter() {
    let reviews = vec![
        Record::new().with("id", 1).with("employeeId", 1).with("score", 5),
        Record::new().with("id", 2).with("employeeId", 3).with("score", 2),
        Record::new().with("id", 3).with("employeeId", 3).with("score", 4),
    ];
    let mut engine = QueryEngine::new(Arc::new(catalog()));
    engine.register_adapter("Review", move || -> Result<Vec<Record>> { Ok(reviews.clone()) });

    let items = vec![
        employee(1, "A", 100, "active"),
        employee(2, "B", 250, "inactive"),
        employee(3, "A", 250, "active"),
    ];
    let q = select()
        .where_("id")
        .in_sub_query(sub_query("Review").select_field("employeeId").where_("score").gte(4))
        .order_by_desc("id")
        .build()
        .unwrap();
    let picked: Vec<i64> = engine
        .evaluate("Employee", &q, &items)
        .unwrap()
        .into_entities()
        .unwrap()
        .iter()
        .filter_map(|r| r.value("id").and_then(Value::as_i64))
        .collect();
    assert_eq!(picked, vec![3, 1]);

    let prepared = engine.prepare_sql("Employee", &q).unwrap();
    assert_eq!(
        prepared.statement().unwrap().sql,
        "SELECT e.* FROM \"employees\" AS e WHERE e.\"id\" IN (SELECT r.\"employee_id\" FROM \"reviews\" AS r WHERE r.\"score\" >= $1) ORDER BY e.\"id\" DESC"
    );
    assert_eq!(prepared.bindings().len(), 1);
}
