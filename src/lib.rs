//! # sigmap-rust
//!
//! 受 [UNCALLED](https://github.com/skovaka/UNCALLED) 启发的 Rust 版
//! 纳米孔实时信号比对器（read-until）。
//!
//! 本 crate 对单通道的原始电流信号做流式比对：事件检测与归一化之后，
//! 每个事件在参考 k-mer 序列的 FM 索引上扩展一群有界的候选路径，
//! 高置信路径经后缀数组验证后聚簇，足够多的种子相互印证时立即给出
//! 映射结论，供调用方决定是否弹出该 read。
//!
//! ## 快速示例
//!
//! ```rust,no_run
//! use sigmap_rust::index::fm;
//! use sigmap_rust::map::{Chunk, MapOpts, Mapper};
//! use sigmap_rust::model::PoreModel;
//! use std::sync::Arc;
//!
//! // 构建索引（正链 + 反向互补链）与孔模型
//! let codes = vec![0u8, 1, 2, 3, 0, 1]; // ACGTAC
//! let fmi = Arc::new(fm::build_signal_index(&[("ref".to_string(), codes)], true, 64));
//! let levels: Vec<(f32, f32)> = (0..64).map(|i| (60.0 + 2.0 * i as f32, 1.0)).collect();
//! let model = Arc::new(PoreModel::from_levels(3, &levels).unwrap());
//!
//! // 流式比对一条 read 的首个分片
//! let mut mapper = Mapper::new(MapOpts::default(), model, fmi);
//! mapper.new_read(Chunk::new("read1", 0, vec![80.0; 4000]));
//! let _ = mapper.process_chunk();
//! while mapper.events_ready() {
//!     if mapper.map_chunk() {
//!         break;
//!     }
//! }
//! ```
//!
//! ## 模块说明
//!
//! - [`io`] — 参考 FASTA 与原始信号 read 文件解析
//! - [`index`] — 信号索引构建（后缀数组、BWT、FM 索引、坐标翻译）
//! - [`model`] — 孔 k-mer 电流模型（高斯发射概率、邻居 k-mer）
//! - [`signal`] — 事件检测与事件归一化
//! - [`map`] — 核心比对器（路径扩展、种子验证、生命周期）

pub mod index;
pub mod io;
pub mod map;
pub mod model;
pub mod signal;
