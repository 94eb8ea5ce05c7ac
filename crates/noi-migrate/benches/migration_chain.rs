use criterion::{black_box, criterion_group, criterion_main, Criterion};
use noi_migrate::{
    noi_engine, ImportContext, Lookups, MemoryPartners, Row, SchemaVersion, SiteConfig, Value,
};

fn interests(n: i64) -> Vec<Row> {
    (0..n)
        .map(|id| {
            Row::new("tickets.interest")
                .with("id", id)
                .with("product_id", id % 20)
                .with("site_id", id % 50)
        })
        .collect()
}

fn products(n: i64) -> Vec<Row> {
    (0..n)
        .map(|id| {
            Row::new("products.product")
                .with("id", id)
                .with("ref", Value::Null)
                .with("name", Value::List(vec![format!("Product {id}").into()]))
                .with("description", Value::List(vec!["".into()]))
                .with("cat_id", Value::Null)
        })
        .collect()
}

fn bench_plan(c: &mut Criterion) {
    let engine = noi_engine(&SiteConfig::default()).unwrap();
    let oldest = SchemaVersion::parse("0.0.1").unwrap();

    c.bench_function("MigrationEngine::run from 0.0.1", |b| {
        b.iter(|| black_box(engine.run(&oldest).unwrap()))
    });
}

fn bench_replay(c: &mut Criterion) {
    let engine = noi_engine(&SiteConfig::default()).unwrap();
    let mut table = engine.default_constructors();
    table.merge(engine.run(&SchemaVersion::parse("0.0.1").unwrap()).unwrap());
    let lookups = Lookups::default();

    for (name, rows) in [
        ("replay 1000 interests from 0.0.1", interests(1000)),
        ("replay 1000 products from 0.0.1", products(1000)),
    ] {
        c.bench_function(name, |b| {
            b.iter(|| {
                let mut partners = MemoryPartners::new();
                let mut recovered = Vec::new();
                let mut ctx = ImportContext::new(&lookups, &mut partners, &mut recovered);
                let mut written = 0;
                for row in rows.iter().cloned() {
                    written += table.construct(row, &mut ctx).unwrap().len();
                }
                black_box(written)
            })
        });
    }
}

criterion_group!(benches, bench_plan, bench_replay);
criterion_main!(benches);
