/// Benchmarks for filtering and aggregating datasets.
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use sheetdash::aggregation::Aggregation;
use sheetdash::aggregations::{ColumnTotal, GroupSum, ShareOfTotal};
use sheetdash::filter::{FilterConfig, FilterDescriptor, FilterValues};
use sheetdash::table::Table;
use sheetdash::types::{Selection, Value};

const CATEGORIES: [&str; 4] = ["Electronics", "Clothing", "Garden", "Toys"];

fn descriptor(id: &str, column: &str, depends_on: &[&str]) -> FilterDescriptor {
    FilterDescriptor {
        id: id.to_string(),
        column: column.to_string(),
        depends_on: depends_on.iter().map(|id| id.to_string()).collect(),
        kind: None,
    }
}

fn get_test_table(rows: usize) -> Table {
    let rows = (0..rows)
        .map(|i| {
            let category = CATEGORIES[i % CATEGORIES.len()];
            vec![
                Value::from(category),
                Value::Text(format!("{}-{}", category, i % 16)),
                Value::Number((i % 256) as f64),
            ]
        })
        .collect();
    Table::from_rows(
        vec![
            "Category".to_string(),
            "SubCategory".to_string(),
            "Value".to_string(),
        ],
        rows,
    )
    .unwrap()
}

fn criterion_benchmark(c: &mut Criterion) {
    let config = FilterConfig::new(vec![
        descriptor("category", "Category", &[]),
        descriptor("subcategory", "SubCategory", &["category"]),
    ]);
    let selections = [
        ("all", FilterValues::new()),
        (
            "one",
            FilterValues::from([(
                "Category".to_string(),
                Selection::One("Electronics".to_string()),
            )]),
        ),
        (
            "many",
            FilterValues::from([(
                "Category".to_string(),
                Selection::Many(vec!["Clothing".to_string(), "Toys".to_string()]),
            )]),
        ),
    ];
    for size_k in [1, 16, 64] {
        let table = get_test_table(size_k * 1024);
        for (selection_name, values) in &selections {
            let name = format!("filter({}k, {})", size_k, selection_name);
            c.bench_function(&name, |b| {
                b.iter(|| config.apply(black_box(&table), values).unwrap())
            });
            let name = format!("options({}k, {})", size_k, selection_name);
            c.bench_function(&name, |b| {
                b.iter(|| config.options(black_box(&table), values).unwrap())
            });
        }
        let aggregations: [(&str, Box<dyn Fn(&Table)>); 3] = [
            (
                "group_sum",
                Box::new(|table: &Table| {
                    GroupSum::new("Category", "Value", "value")
                        .aggregate(table)
                        .unwrap();
                }),
            ),
            (
                "share_of_total",
                Box::new(|table: &Table| {
                    ShareOfTotal::new("SubCategory", "Value", "value", Some(5))
                        .aggregate(table)
                        .unwrap();
                }),
            ),
            (
                "column_total",
                Box::new(|table: &Table| {
                    ColumnTotal::new("Value").aggregate(table).unwrap();
                }),
            ),
        ];
        for (aggregation_name, aggregate) in aggregations {
            let name = format!("{}({}k)", aggregation_name, size_k);
            c.bench_function(&name, |b| b.iter(|| aggregate(black_box(&table))));
        }
    }
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
