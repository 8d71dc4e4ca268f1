use criterion::{black_box, criterion_group, criterion_main, Criterion};
use embedrec::algorithms::engine::NdarrayEngine;
use embedrec::algorithms::initializer::InitializationMethod;
use embedrec::algorithms::optimizer::Adam;
use embedrec::algorithms::retriever;
use embedrec::*;
use ndarray::Array2;

fn interactions(users: usize, entities: usize, per_user: usize) -> Vec<Interaction> {
    (0..users)
        .flat_map(|u| {
            (0..per_user).map(move |j| {
                let entity = (u * 31 + j * 17) % entities;
                Interaction::rated(u as i64, format!("e{}", entity), ((u + j) % 5) as f32)
            })
        })
        .collect()
}

fn seeded() -> TrainingConfig {
    TrainingConfig {
        seed: Some(42),
        ..TrainingConfig::default()
    }
}

fn benchmark_fit(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let data = interactions(200, 500, 20);
    let data = &data;

    c.bench_function("fit_single_epoch_4k_interactions", |b| {
        b.to_async(&rt).iter(|| async move {
            let mut model =
                CollaborativeFiltering::with_training(ModelConfig::new(1, 32, 0.001, 64), seeded()).unwrap();
            black_box(model.fit(&data).await.unwrap());
        });
    });

    c.bench_function("incremental_fit_new_ids", |b| {
        b.to_async(&rt).iter(|| async move {
            let mut model =
                CollaborativeFiltering::with_training(ModelConfig::new(1, 32, 0.001, 64), seeded()).unwrap();
            model.fit(&data[..2000]).await.unwrap();
            black_box(model.fit(&data[2000..]).await.unwrap());
        });
    });
}

fn benchmark_ranking(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let model = rt.block_on(async {
        let mut model =
            CollaborativeFiltering::with_training(ModelConfig::new(2, 32, 0.001, 64), seeded()).unwrap();
        model.fit(&interactions(1000, 5000, 10)).await.unwrap();
        model
    });
    let model = &model;

    c.bench_function("get_entities_top10_of_5000", |b| {
        b.to_async(&rt).iter(|| async move {
            black_box(model.get_entities(&Id::Int(7), 10).await);
        });
    });

    let engine = NdarrayEngine::with_optimizer(InitializationMethod::default(), Some(1), Adam::default());
    let candidates = Array2::<f32>::from_shape_fn((10_000, 64), |(i, j)| ((i + j) % 13) as f32 / 13.0);
    let ids: Vec<Id> = (0..10_000).map(|i| Id::Int(i as i64)).collect();
    let query = candidates.row(42).to_owned();

    c.bench_function("score_and_rank_10000x64", |b| {
        b.iter(|| {
            black_box(retriever::rank_ids(&engine, query.view(), candidates.view(), &ids, 50));
        });
    });
}

criterion_group!(benches, benchmark_fit, benchmark_ranking);
criterion_main!(benches);
