//! Quarry Query Benchmarks
//!
//! Translation, binding and in-memory evaluation throughput.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use quarry_query::prelude::*;
use quarry_query::{InMemoryEvaluator, ParameterBinder, SqlTranslator, ValueResolverRegistry};

fn catalog() -> Catalog {
    Catalog::new()
        .with_entity(
            EntitySchema::new("Employee", "employees")
                .field(FieldMeta::new("id", DataType::BigInt).primary_key())
                .field(FieldMeta::new("dept", DataType::Text))
                .field(FieldMeta::new("sal", DataType::Integer))
                .field(FieldMeta::new("profile", DataType::Jsonb)),
        )
        .with_entity(
            EntitySchema::new("Review", "reviews")
                .field(FieldMeta::new("id", DataType::BigInt).primary_key())
                .field(FieldMeta::new("employeeId", DataType::BigInt).with_column("employee_id"))
                .field(FieldMeta::new("score", DataType::Integer)),
        )
}

fn select_query() -> Query {
    select()
        .where_("sal")
        .gte(1000)
        .where_("dept")
        .in_list(["A", "B", "C", "D"])
        .where_json("profile", "$.address.city")
        .eq("Oslo")
        .where_("id")
        .in_sub_query(sub_query("Review").select_field("employeeId").where_("score").gt(3))
        .order_by_desc("sal")
        .limit(50)
        .build()
        .unwrap_or_else(|e| panic!("bench query: {}", e))
}

fn aggregate_query() -> Query {
    aggregate()
        .select(field("dept").into_definition())
        .select(field("sal").sum().as_("total"))
        .select(field("sal").avg().as_("mean"))
        .group_by("dept")
        .having()
        .field("sal")
        .sum()
        .gt(100)
        .end()
        .build()
        .unwrap_or_else(|e| panic!("bench query: {}", e))
}

fn translate_benchmark(c: &mut Criterion) {
    let catalog = catalog();
    let registry = ValueResolverRegistry::with_defaults();
    let query = select_query();

    let mut group = c.benchmark_group("translate");
    group.throughput(Throughput::Elements(1));
    for dialect in [Dialect::POSTGRES, Dialect::MYSQL, Dialect::SQLITE] {
        let translator = SqlTranslator::new(dialect, &catalog);
        group.bench_function(dialect.name(), |b| {
            b.iter(|| translator.translate("Employee", black_box(&query)))
        });
    }
    group.finish();

    let binder = ParameterBinder::new(Dialect::POSTGRES, &catalog, &registry);
    c.bench_function("bind_postgres", |b| {
        b.iter(|| binder.bind_query("Employee", black_box(&query)))
    });
    c.bench_function("cache_key", |b| b.iter(|| black_box(&query).cache_key()));
}

fn evaluate_benchmark(c: &mut Criterion) {
    let catalog = catalog();
    let adapters = AdapterRegistry::new();
    let evaluator = InMemoryEvaluator::new(&catalog, &adapters);
    let items: Vec<Record> = (0..1_000)
        .map(|i| {
            Record::new()
                .with("id", i)
                .with("dept", ["A", "B", "C", "D"][i as usize % 4])
                .with("sal", (i * 37) % 5_000)
        })
        .collect();
    let query = aggregate_query();

    let mut group = c.benchmark_group("evaluate");
    group.throughput(Throughput::Elements(items.len() as u64));
    group.bench_function("group_by_having", |b| {
        b.iter(|| evaluator.evaluate("Employee", black_box(&query), &items))
    });
    group.finish();
}

criterion_group!(benches, translate_benchmark, evaluate_benchmark);
criterion_main!(benches);
