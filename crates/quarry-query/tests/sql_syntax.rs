//! SQL syntax checks for Quarry Query
//!
//! Every statement the translator emits is parsed by an independent SQL
//! parser for the matching dialect. No database is involved.

use quarry_query::prelude::*;
use quarry_query::SqlTranslator;
use sqlparser::dialect::{Dialect as ParserDialect, GenericDialect, MySqlDialect, PostgreSqlDialect, SQLiteDialect};
use sqlparser::parser::Parser;

fn catalog() -> Catalog {
    Catalog::new()
        .with_entity(
            EntitySchema::new("Employee", "employees")
                .field(FieldMeta::new("id", DataType::BigInt).primary_key())
                .field(FieldMeta::new("name", DataType::Text))
                .field(FieldMeta::new("dept", DataType::Text))
                .field(FieldMeta::new("sal", DataType::Integer))
                .field(FieldMeta::new("status", DataType::Text))
                .field(FieldMeta::new("managerId", DataType::BigInt).with_column("manager_id"))
                .field(FieldMeta::new("profile", DataType::Json)),
        )
        .with_entity(
            EntitySchema::new("Project", "projects")
                .field(FieldMeta::new("id", DataType::BigInt).primary_key())
                .field(FieldMeta::new("ownerId", DataType::BigInt).with_column("owner_id"))
                .field(FieldMeta::new("budget", DataType::Double)),
        )
}

fn parser_for(dialect: &Dialect) -> Box<dyn ParserDialect> {
    match dialect.kind {
        DialectKind::Postgres => Box::new(PostgreSqlDialect {}),
        DialectKind::MySql => Box::new(MySqlDialect {}),
        DialectKind::Sqlite => Box::new(SQLiteDialect {}),
        DialectKind::H2 => Box::new(GenericDialect {}),
    }
}

fn assert_parses(dialect: Dialect, query: &Query) {
    let catalog = catalog();
    let statement = SqlTranslator::new(dialect, &catalog)
        .translate("Employee", query)
        .unwrap();
    let parser = parser_for(&dialect);
    if let Err(e) = Parser::parse_sql(parser.as_ref(), &statement.sql) {
        panic!("{} rejected `{}`: {}", dialect.name(), statement.sql, e);
    }
}

fn all_dialects() -> [Dialect; 4] {
    [Dialect::POSTGRES, Dialect::MYSQL, Dialect::SQLITE, Dialect::H2]
}

#[test]
fn test_select_statements_parse() {
    let q = select()
        .columns(["id", "name"])
        .where_("sal")
        .gte(100)
        .where_("dept")
        .in_list(["A", "B"])
        .where_("name")
        .like("a%")
        .where_("status")
        .is_not_null()
        .where_("sal")
        .between(10, 20)
        .order_by_desc("sal")
        .order_by_asc("name")
        .limit(5)
        .build()
        .unwrap();
    for dialect in all_dialects() {
        assert_parses(dialect, &q);
    }
}

#[test]
fn test_empty_in_list_parses() {
    let q = select()
        .where_("id")
        .in_list(Vec::<i64>::new())
        .where_("dept")
        .not_in(Vec::<String>::new())
        .build()
        .unwrap();
    for dialect in all_dialects() {
        assert_parses(dialect, &q);
    }
}

#[test]
fn test_aggregate_statements_parse() {
    let q = aggregate()
        .select(field("dept").into_definition())
        .select(field("sal").sum().as_("total"))
        .select(field("status").count_if(Condition::eq("active")).as_("active"))
        .select(field("sal").sum_if(Condition::on("status").eq("active")).as_("active_sal"))
        .select(count_all().as_("n"))
        .where_("sal")
        .gt(0)
        .group_by("dept")
        .having()
        .field("sal")
        .sum()
        .gt(100)
        .end()
        .order_by_desc("total")
        .limit(10)
        .build()
        .unwrap();
    for dialect in all_dialects() {
        assert_parses(dialect, &q);
    }
}

#[test]
fn test_window_statements_parse() {
    let q = window()
        .select_field("id")
        .select(rank().partition_by("dept").order_by_desc("sal").as_("r"))
        .select(dense_rank().partition_by("dept").order_by_desc("sal").as_("dr"))
        .select(row_number().order_by_asc("id").as_("n"))
        .select(
            field("sal")
                .over(WindowFunction::Sum)
                .order_by_asc("id")
                .rows_between(FrameBound::Preceding(2), FrameBound::CurrentRow)
                .as_("rolling"),
        )
        .build()
        .unwrap();
    for dialect in [Dialect::POSTGRES, Dialect::MYSQL, Dialect::SQLITE] {
        assert_parses(dialect, &q);
    }
}

#[test]
fn test_sub_queries_parse() {
    let q = select()
        .where_exists(sub_query("Employee").where_("managerId").eq_outer("id"))
        .where_("id")
        .in_sub_query(sub_query("Project").select_field("ownerId").where_("budget").gt(1000))
        .build()
        .unwrap();
    for dialect in all_dialects() {
        assert_parses(dialect, &q);
    }
}

#[test]
fn test_update_and_delete_parse() {
    let update_q = update()
        .set("status", "left")
        .set("sal", 0)
        .where_("id")
        .eq(7)
        .build()
        .unwrap();
    let delete_q = delete().where_("status").eq("left").build().unwrap();
    for dialect in all_dialects() {
        assert_parses(dialect, &update_q);
        assert_parses(dialect, &delete_q);
    }
}

#[test]
fn test_json_path_filters_parse() {
    let q = select()
        .where_json("profile", "$.city")
        .eq("Oslo")
        .where_json("profile", "$.address.zip")
        .eq("0150")
        .build()
        .unwrap();
    for dialect in [Dialect::POSTGRES, Dialect::MYSQL, Dialect::SQLITE] {
        assert_parses(dialect, &q);
    }
}

#[test]
fn test_h2_rejects_json_paths() {
    let catalog = catalog();
    let q = select().where_json("profile", "$.city").eq("Oslo").build().unwrap();
    let err = SqlTranslator::new(Dialect::H2, &catalog)
        .translate("Employee", &q)
        .unwrap_err();
    assert!(matches!(err, QuarryError::UnsupportedFeature { .. }));
}
