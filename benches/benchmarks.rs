use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;

use sigmap_rust::index::fm::{build_signal_index, FmIndex};
use sigmap_rust::map::{Chunk, MapOpts, Mapper};
use sigmap_rust::model::{pack_kmer, PoreModel};

fn make_reference(len: usize) -> Vec<u8> {
    let mut seq = Vec::with_capacity(len);
    let mut x: u32 = 42;
    for _ in 0..len {
        x = x.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        seq.push(((x >> 16) % 4) as u8);
    }
    seq
}

fn make_model() -> Arc<PoreModel> {
    let levels: Vec<(f32, f32)> = (0..4096).map(|i| (60.0 + 0.02 * i as f32, 1.5)).collect();
    Arc::new(PoreModel::from_levels(6, &levels).unwrap())
}

fn make_index(reference: &[u8]) -> Arc<FmIndex> {
    Arc::new(build_signal_index(
        &[("bench".to_string(), reference.to_vec())],
        true,
        128,
    ))
}

fn bench_emission_table(c: &mut Criterion) {
    let model = make_model();
    let mut probs = vec![0.0f32; model.kmer_count() as usize];

    c.bench_function("emission_table_4096", |b| {
        b.iter(|| {
            for km in 0..model.kmer_count() as u16 {
                probs[km as usize] = model.event_match_prob(black_box(95.0), km);
            }
            black_box(&probs);
        })
    });
}

fn bench_fm_neighbor(c: &mut Criterion) {
    let reference = make_reference(10_000);
    let fmi = make_index(&reference);
    let model = make_model();
    let kmer = pack_kmer(&reference[100..106]);
    let base = fmi.kmer_range(&model.kmer_bases(kmer));

    c.bench_function("fm_neighbor_step", |b| {
        b.iter(|| {
            black_box(fmi.get_neighbor(black_box(base), black_box(reference[106])));
        })
    });
}

fn bench_event_step(c: &mut Criterion) {
    let reference = make_reference(10_000);
    let fmi = make_index(&reference);
    let model = make_model();
    let opts = MapOpts {
        seed_len: 22,
        max_paths: 4096,
        ..MapOpts::default()
    };

    // 理想事件序列：参考前 200 个 k-mer 的水平均值
    let events: Vec<f32> = reference
        .windows(6)
        .take(200)
        .map(|w| model.level_mean_of(pack_kmer(w)))
        .collect();

    c.bench_function("event_step_200", |b| {
        b.iter(|| {
            let mut mapper = Mapper::new(opts, Arc::clone(&model), Arc::clone(&fmi));
            mapper.new_read(Chunk::new("bench", 0, Vec::new()));
            for &e in &events {
                if mapper.add_event(black_box(e)) {
                    break;
                }
            }
            black_box(mapper.event_index());
        })
    });
}

criterion_group!(benches, bench_emission_table, bench_fm_neighbor, bench_event_step);
criterion_main!(benches);
