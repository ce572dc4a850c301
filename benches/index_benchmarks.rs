use criterion::{BatchSize, BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use flora_geoindex::index::{IndexStore, PointIndexBuilder};
use flora_geoindex::query::{PointQueryEngine, QueryGeometry};
use flora_geoindex::{
    BoundingBox, Config, DateKey, GeoPoint, IndexStrategy, PointKind, Record, RegionCoverer,
    SubjectId, parse_records,
};
use std::sync::Arc;

fn asheville() -> GeoPoint {
    GeoPoint::new(35.538851, -82.7054901)
}

/// Deterministic scatter of `n` prediction records around Asheville on one day.
fn records(n: usize) -> Vec<Record> {
    let date = DateKey::parse("20171103").unwrap();
    (0..n)
        .map(|i| {
            let lat = 35.0 + ((i * 7919) % 1000) as f64 * 0.0015;
            let lng = -83.5 + ((i * 104_729) % 1000) as f64 * 0.0015;
            let attribute = (i % 100) as f64 / 100.0;
            Record::new(date.clone(), GeoPoint::new(lat, lng), Some(attribute))
        })
        .collect()
}

fn engine(strategy: IndexStrategy, n: usize) -> PointQueryEngine {
    let store = Arc::new(IndexStore::new(PointKind::Predictions));
    let ticket = store.select(Some(SubjectId::from("bench"))).unwrap();
    let builder = PointIndexBuilder::new(Config::default()).strategy(PointKind::Predictions, strategy);
    let index = builder.build(SubjectId::from("bench"), PointKind::Predictions, records(n));
    store.commit(&ticket, index);
    PointQueryEngine::new(store)
}

fn benchmark_index_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_build");

    for size in [1_000, 10_000] {
        for strategy in [IndexStrategy::Cluster, IndexStrategy::Proximity] {
            let builder =
                PointIndexBuilder::new(Config::default()).strategy(PointKind::Predictions, strategy);
            group.bench_with_input(
                BenchmarkId::new(format!("{:?}", strategy), size),
                &size,
                |b, &size| {
                    b.iter_batched(
                        || records(size),
                        |records| {
                            builder.build(
                                SubjectId::from("bench"),
                                PointKind::Predictions,
                                black_box(records),
                            )
                        },
                        BatchSize::LargeInput,
                    )
                },
            );
        }
    }

    group.finish();
}

fn benchmark_ingest(c: &mut Criterion) {
    let mut body = String::new();
    for record in records(5_000) {
        body.push_str(&format!(
            "{},{},{},{}\n",
            record.date_key,
            record.point.lat,
            record.point.lng,
            record.attribute.unwrap_or(0.0)
        ));
    }

    c.bench_function("parse_5000_rows", |b| {
        b.iter(|| {
            parse_records(
                &SubjectId::from("bench"),
                PointKind::Predictions,
                black_box(body.as_bytes()),
            )
            .unwrap()
        })
    });
}

fn benchmark_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("queries");
    let date = DateKey::parse("20171103").unwrap();
    let bbox = BoundingBox::new(-83.2, 35.2, -82.2, 35.9);
    let geometry = QueryGeometry::Radius {
        center: asheville(),
        radius_km: 50.0,
    };

    for strategy in [IndexStrategy::Cluster, IndexStrategy::Proximity] {
        let engine = engine(strategy, 10_000);
        for zoom in [6u8, 10, 14] {
            group.bench_with_input(
                BenchmarkId::new(format!("get_points_{:?}", strategy), zoom),
                &zoom,
                |b, &zoom| b.iter(|| engine.get_points(black_box(&bbox), zoom, &date)),
            );
        }
        group.bench_function(format!("aggregate_radius_{:?}", strategy), |b| {
            b.iter(|| engine.get_aggregation(black_box(&geometry), 10, &date))
        });
    }

    group.finish();
}

fn benchmark_covering(c: &mut Criterion) {
    let mut group = c.benchmark_group("covering");
    let coverer = RegionCoverer::default();

    for radius in [5.0, 50.0, 500.0] {
        group.bench_with_input(
            BenchmarkId::new("cover_radius", radius as u64),
            &radius,
            |b, &radius| b.iter(|| coverer.cover_radius(black_box(&asheville()), radius)),
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_index_build,
    benchmark_ingest,
    benchmark_queries,
    benchmark_covering
);

criterion_main!(benches);
