//! 演示如何在 library 模式下使用 sigmap-rust 做实时信号比对。
//!
//! 运行方式：
//! ```bash
//! cargo run --example simple_map
//! ```

use std::sync::Arc;

use sigmap_rust::index::fm::build_signal_index;
use sigmap_rust::map::{Chunk, MapOpts, Mapper, State};
use sigmap_rust::model::{pack_kmer, PoreModel};

fn codes(s: &str) -> Vec<u8> {
    s.bytes()
        .map(|b| match b {
            b'A' => 0,
            b'C' => 1,
            b'G' => 2,
            b'T' => 3,
            _ => 0,
        })
        .collect()
}

fn main() {
    // 1. 玩具孔模型：k=3，各 k-mer 水平均匀展开
    let levels: Vec<(f32, f32)> = (0..64).map(|i| (60.0 + 2.0 * i as f32, 0.5)).collect();
    let model = Arc::new(PoreModel::from_levels(3, &levels).unwrap());
    println!("孔模型: k={}, k-mer 数={}", model.kmer_len(), model.kmer_count());

    // 2. 参考序列与双链信号索引
    let reference = "ACGCAGGCAGCGGACGAGCCGCAGACGGCAGGACGCAGCA";
    let fmi = Arc::new(build_signal_index(
        &[("ref1".to_string(), codes(reference))],
        true,
        64,
    ));
    println!("参考长度: {} bp, 索引文本: {}", reference.len(), fmi.size());

    // 3. 合成事件流：参考前缀的各 k-mer 水平，带少量抖动
    //   （原始样本到事件的链路见 Mapper::process_chunk / map_chunk）
    let read_bases = &reference[..24];
    let mut events: Vec<f32> = Vec::new();
    let mut x: u32 = 7;
    for w in codes(read_bases).windows(3) {
        let level = model.level_mean_of(pack_kmer(w));
        x = x.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        let jitter = ((x >> 16) % 100) as f32 / 1000.0 - 0.05;
        events.push(level + jitter);
    }
    println!("合成事件: {} 个（前 {} bp）", events.len(), read_bases.len());

    // 4. 逐事件比对
    let opts = MapOpts {
        seed_len: 8,
        max_paths: 1024,
        min_seed_prob: -2.5,
        min_aln_len: 12,
        min_top_conf: 1.5,
        min_mean_conf: 2.0,
        prob_thresh_base: -3.0,
        prob_thresh_decay: 0.3,
        prob_thresh_floor: -6.0,
        source_prob: -3.0,
        ..MapOpts::default()
    };
    let mut mapper = Mapper::new(opts, model, fmi);
    mapper.new_read(Chunk::new("demo_read", 0, Vec::new()));

    for (i, &e) in events.iter().enumerate() {
        if mapper.add_event(e) {
            println!("第 {} 个事件后终止", i + 1);
            break;
        }
    }
    if !mapper.finished() {
        mapper.end_read(0);
        mapper.map_chunk();
    }

    // 5. 结果
    let state = match mapper.get_state() {
        State::Success => "SUCCESS",
        State::Failure => "FAILURE",
        _ => "UNMAPPED",
    };
    println!("\n状态: {}，消费事件数: {}", state, mapper.event_index());
    println!("{}", mapper.loc().to_tsv("demo_read", state, mapper.event_index()));
    if mapper.loc().mapped {
        println!(
            "映射到 {} [{}..{}] 链方向 {}",
            mapper.loc().rf_name,
            mapper.loc().rf_st,
            mapper.loc().rf_en,
            if mapper.loc().fwd { "+" } else { "-" },
        );
    }
    println!("\n完成！");
}
