pub mod path;
pub mod read;
pub mod tracker;

use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Result};

use crate::index::fm::{FmIndex, Range};
use crate::model::{PoreModel, ALPH_SIZE};
use crate::signal::{EvdtParams, EventDetector, Normalizer};

pub use path::{cmp_paths, EventType, PathLayout, PathState, MAX_SEED_LEN};
pub use read::{Chunk, ReadBuffer, ReadLoc};
pub use tracker::{SeedGroup, SeedTracker};

/// 比对选项。阈值均为对数概率；get_* 系列把策略曲线封装在此，
/// 核心算法只消费结果。
#[derive(Clone, Copy, Debug)]
pub struct MapOpts {
    /// 种子长度，同时是路径概率窗口长度（≤ MAX_SEED_LEN）
    pub seed_len: u8,
    /// 两个乒乓缓冲各自的容量
    pub max_paths: usize,
    /// 连续 STAY 的上限
    pub max_consec_stay: u8,
    /// 种子窗口内 STAY 占比上限
    pub max_stay_frac: f32,
    /// 种子平均每事件对数概率下限
    pub min_seed_prob: f32,
    /// 路径终止时允许验证的最大区间拷贝数
    pub max_rep_copy: u32,
    /// 路径终止验证要求的最少 MATCH 数
    pub min_rep_len: u8,
    /// 每 read 处理事件总数上限
    pub max_events_proc: u32,
    /// 每 read 处理分片数上限（0 表示不限）
    pub max_chunks_proc: u32,
    /// 单事件的毫秒时间预算（map_chunk 的墙钟预算 = 该值 × 批大小）
    pub evt_timeout_ms: f32,
    /// 归一化缓冲容量（事件数）
    pub evt_buffer_len: usize,
    /// 单次 map_chunk 消费的事件批大小
    pub evt_batch_size: u16,
    /// 追踪器：最优簇对其余簇均值的置信度下限
    pub min_mean_conf: f32,
    /// 追踪器：最优簇对次优簇的置信度下限
    pub min_top_conf: f32,
    /// 追踪器：最优簇的最小覆盖长度
    pub min_aln_len: u32,
    /// 概率阈值曲线：区间长度 1 处的基准
    pub prob_thresh_base: f32,
    /// 概率阈值曲线：每翻倍一次区间长度放宽的量
    pub prob_thresh_decay: f32,
    /// 概率阈值曲线下限
    pub prob_thresh_floor: f32,
    /// 注入源路径所需的最低事件概率
    pub source_prob: f32,
    /// read 长度估计用的碱基/样本比
    pub bases_per_sample: f32,
}

impl Default for MapOpts {
    fn default() -> Self {
        Self {
            seed_len: 22,
            max_paths: 10000,
            max_consec_stay: 8,
            max_stay_frac: 0.5,
            min_seed_prob: -3.75,
            max_rep_copy: 50,
            min_rep_len: 18,
            max_events_proc: 30000,
            max_chunks_proc: 10,
            evt_timeout_ms: 5.0,
            evt_buffer_len: 512,
            evt_batch_size: 128,
            min_mean_conf: 6.67,
            min_top_conf: 2.0,
            min_aln_len: 25,
            prob_thresh_base: -2.25,
            prob_thresh_decay: 0.15,
            prob_thresh_floor: -4.5,
            source_prob: -2.25,
            bases_per_sample: 450.0 / 4000.0,
        }
    }
}

impl MapOpts {
    /// 区间长度相关的事件概率下限：区间越宽阈值越低。
    #[inline]
    pub fn get_prob_thresh(&self, range_len: u64) -> f32 {
        let lg = (range_len.max(1) as f32).log2();
        (self.prob_thresh_base - self.prob_thresh_decay * lg).max(self.prob_thresh_floor)
    }

    #[inline]
    pub fn get_source_prob(&self) -> f32 {
        self.source_prob
    }

    /// 本批最多可消费的事件数；接近总预算时收紧，但至少为 1，
    /// 保证超限状态能推进到下一次 add_event 的终止判定。
    #[inline]
    pub fn get_max_events(&self, event_i: u32) -> u16 {
        let batch = self.evt_batch_size as u32;
        if event_i + batch > self.max_events_proc {
            self.max_events_proc.saturating_sub(event_i).max(1) as u16
        } else {
            self.evt_batch_size
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.seed_len < 2 || self.seed_len as usize > MAX_SEED_LEN {
            bail!("seed_len must be in [2, {}], got {}", MAX_SEED_LEN, self.seed_len);
        }
        if !(0.0..=1.0).contains(&self.max_stay_frac) {
            bail!("max_stay_frac must be in [0, 1], got {}", self.max_stay_frac);
        }
        if self.evt_buffer_len == 0 {
            bail!("evt_buffer_len must be positive");
        }
        if self.evt_batch_size == 0 {
            bail!("evt_batch_size must be positive");
        }
        Ok(())
    }
}

/// 比对生命周期状态。SUCCESS / FAILURE 为终态。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Inactive,
    Mapping,
    Success,
    Failure,
}

/// 单通道的实时比对器。每个事件把现存路径群扩展至多 5 个子路径，
/// 排序去重后注入源路径，并把高置信路径经 SA 查询送入种子追踪器；
/// 所有缓冲在构造时一次分配，事件循环内零堆分配。
pub struct Mapper {
    opts: MapOpts,
    model: Arc<PoreModel>,
    fmi: Arc<FmIndex>,
    layout: PathLayout,
    event_detector: EventDetector,
    norm: Normalizer,
    seed_tracker: SeedTracker,
    read: ReadBuffer,
    kmer_probs: Vec<f32>,
    kmer_fmranges: Vec<Range>,
    sources_added: Vec<bool>,
    prev_paths: Vec<PathState>,
    next_paths: Vec<PathState>,
    prev_size: usize,
    event_i: u32,
    reset_flag: bool,
    state: State,
}

impl Mapper {
    pub fn new(opts: MapOpts, model: Arc<PoreModel>, fmi: Arc<FmIndex>) -> Self {
        debug_assert!(opts.seed_len >= 2 && opts.seed_len as usize <= MAX_SEED_LEN);
        let layout = PathLayout::new(opts.seed_len);
        let kmer_count = model.kmer_count() as usize;

        let kmer_fmranges: Vec<Range> = (0..kmer_count)
            .map(|km| fmi.kmer_range(&model.kmer_bases(km as u16)))
            .collect();

        let seed_tracker = SeedTracker::new(
            opts.min_mean_conf,
            opts.min_top_conf,
            opts.min_aln_len,
            opts.seed_len,
        );
        let norm = Normalizer::new(model.model_mean(), model.model_stdv(), opts.evt_buffer_len);

        Self {
            layout,
            event_detector: EventDetector::new(EvdtParams::default()),
            norm,
            seed_tracker,
            read: ReadBuffer::default(),
            kmer_probs: vec![0.0; kmer_count],
            kmer_fmranges,
            sources_added: vec![false; kmer_count],
            prev_paths: vec![PathState::invalid(); opts.max_paths],
            next_paths: vec![PathState::invalid(); opts.max_paths],
            prev_size: 0,
            event_i: 0,
            reset_flag: false,
            state: State::Inactive,
            opts,
            model,
            fmi,
        }
    }

    /// 开始一条新 read。若上一条 read 仍在比对则告警后放弃之。
    pub fn new_read(&mut self, chunk: Chunk) {
        if self.prev_unfinished(chunk.number) {
            eprintln!("warning: possibly lost read '{}'", self.read.id);
        }
        self.read = ReadBuffer::new(chunk);
        self.prev_size = 0;
        self.event_i = 0;
        self.reset_flag = false;
        self.state = State::Mapping;
        self.seed_tracker.reset();
        self.event_detector.reset();
        self.norm.skip_unread(0);
    }

    #[inline]
    pub fn prev_unfinished(&self, next_number: u32) -> bool {
        self.state == State::Mapping && self.read.number != next_number
    }

    #[inline]
    pub fn finished(&self) -> bool {
        self.state == State::Success || self.state == State::Failure
    }

    #[inline]
    pub fn get_state(&self) -> State {
        self.state
    }

    #[inline]
    pub fn is_chunk_processed(&self) -> bool {
        self.read.chunk_processed
    }

    #[inline]
    pub fn is_resetting(&self) -> bool {
        self.reset_flag
    }

    pub fn request_reset(&mut self) {
        self.reset_flag = true;
    }

    pub fn end_reset(&mut self) {
        self.reset_flag = false;
    }

    /// read 结束通知：序号吻合时触发复位。
    pub fn end_read(&mut self, number: u32) -> bool {
        self.reset_flag = self.read.number == number;
        self.reset_flag
    }

    pub fn deactivate(&mut self) {
        self.state = State::Inactive;
        self.reset_flag = false;
    }

    pub fn read(&self) -> &ReadBuffer {
        &self.read
    }

    pub fn loc(&self) -> &ReadLoc {
        &self.read.loc
    }

    #[inline]
    pub fn event_index(&self) -> u32 {
        self.event_i
    }

    /// 当前存活路径（上一代缓冲的活动前缀，含去重后的无效槽位）。
    pub fn beam(&self) -> &[PathState] {
        &self.prev_paths[..self.prev_size]
    }

    pub fn tracker(&self) -> &SeedTracker {
        &self.seed_tracker
    }

    #[inline]
    pub fn events_ready(&self) -> bool {
        !self.norm.empty()
    }

    fn skip_events(&mut self, n: u32) {
        self.event_i += n;
        self.prev_size = 0;
    }

    /// 换入下一个分片。当前分片未处理完或正在复位时拒绝；
    /// 分片预算用尽时直接判负并触发复位。
    pub fn swap_chunk(&mut self, chunk: &mut Chunk) -> bool {
        if !self.read.chunk_processed || self.reset_flag {
            return false;
        }
        if self.opts.max_chunks_proc > 0 && self.read.num_chunks == self.opts.max_chunks_proc {
            self.state = State::Failure;
            self.reset_flag = true;
            chunk.clear();
            return true;
        }
        let added = self.read.add_chunk(chunk);
        if !added {
            eprintln!("warning: chunk for read '{}' not added", chunk.read_id);
        }
        added
    }

    /// 把当前分片的样本推进事件检测与归一化，返回产出的事件数。
    /// 归一化缓冲塞不下时丢弃最早的未读事件并相应推进事件号。
    pub fn process_chunk(&mut self) -> u16 {
        if self.read.chunk_processed || self.reset_flag {
            return 0;
        }
        let mut nevents: u16 = 0;
        for i in 0..self.read.chunk.len() {
            let s = self.read.chunk[i];
            if self.event_detector.add_sample(s) {
                let mean = self.event_detector.get_mean();
                if !self.norm.add_event(mean) {
                    let nskip = self.norm.skip_unread(nevents as usize);
                    self.skip_events(nskip);
                    if !self.norm.add_event(mean) {
                        eprintln!("error: chunk events do not fit in the normalisation buffer");
                        return nevents;
                    }
                }
                nevents += 1;
            }
        }
        self.read.chunk.clear();
        self.read.chunk_processed = true;
        nevents
    }

    /// 消费一批归一化事件。返回 true 表示已达终态；超出墙钟预算时
    /// 返回 false，未读事件留在归一化缓冲里，下个调度片无损续跑。
    pub fn map_chunk(&mut self) -> bool {
        if self.reset_flag {
            self.state = State::Failure;
            return true;
        }
        let nevents = self.opts.get_max_events(self.event_i);
        let tlimit_ms = self.opts.evt_timeout_ms * nevents as f32;
        let t = Instant::now();
        for _ in 0..nevents {
            if self.norm.empty() {
                break;
            }
            let e = self.norm.pop_event();
            if self.add_event(e) {
                return true;
            }
            if t.elapsed().as_secs_f32() * 1000.0 > tlimit_ms {
                return false;
            }
        }
        false
    }

    /// 单事件扩展（核心算法）。返回 true 表示比对终止（成功或失败）。
    pub fn add_event(&mut self, event: f32) -> bool {
        if self.reset_flag || self.event_i >= self.opts.max_events_proc {
            self.reset_flag = false;
            self.state = State::Failure;
            return true;
        }

        let kmer_count = self.model.kmer_count() as usize;
        let max_paths = self.next_paths.len();

        // 发射概率表
        for km in 0..kmer_count {
            self.kmer_probs[km] = self.model.event_match_prob(event, km as u16);
        }

        let mut next_len = 0usize;

        // 扩展上一代路径
        'parents: for pi in 0..self.prev_size {
            if !self.prev_paths[pi].is_valid() {
                continue;
            }
            if next_len == max_paths {
                break;
            }
            let parent = self.prev_paths[pi];
            let thresh = self.opts.get_prob_thresh(parent.fm_range.length());
            let mut child_found = false;

            // STAY 子路径
            if parent.consec_stays < self.opts.max_consec_stay
                && self.kmer_probs[parent.kmer as usize] >= thresh
            {
                self.next_paths[next_len].set_child(
                    &parent,
                    &self.layout,
                    parent.fm_range,
                    parent.kmer,
                    self.kmer_probs[parent.kmer as usize],
                    EventType::Stay,
                );
                next_len += 1;
                child_found = true;
                if next_len == max_paths {
                    break 'parents;
                }
            }

            // MATCH 子路径
            for b in 0..ALPH_SIZE as u8 {
                let next_kmer = self.model.get_neighbor(parent.kmer, b);
                if self.kmer_probs[next_kmer as usize] < thresh {
                    continue;
                }
                let next_range = self.fmi.get_neighbor(parent.fm_range, b);
                if !next_range.is_valid() {
                    continue;
                }
                self.next_paths[next_len].set_child(
                    &parent,
                    &self.layout,
                    next_range,
                    next_kmer,
                    self.kmer_probs[next_kmer as usize],
                    EventType::Match,
                );
                next_len += 1;
                child_found = true;
                if next_len == max_paths {
                    break;
                }
            }

            // 断头路径带着积累的证据离场：放宽规则做一次 SA 验证
            if !child_found && !parent.sa_checked {
                Self::update_seeds(
                    &self.fmi,
                    &mut self.seed_tracker,
                    &self.opts,
                    &self.layout,
                    &mut self.prev_paths[pi],
                    self.event_i,
                    true,
                );
            }

            if next_len == max_paths {
                break;
            }
        }

        // 排序 + 去重 + 注入源路径
        if next_len > 0 {
            let next_size = next_len;
            self.next_paths[..next_size].sort_unstable_by(cmp_paths);

            let mut prev_kmer: u32 = kmer_count as u32; // 哨兵
            let mut unchecked_range = Range::EMPTY;

            let (children, spill) = self.next_paths.split_at_mut(next_size);
            let mut spill_len = 0usize;

            for i in 0..next_size {
                let source_kmer = children[i].kmer;
                let kmer_fmr = self.kmer_fmranges[source_kmer as usize];

                // k-mer 区间开头的前导源路径
                if source_kmer as u32 != prev_kmer
                    && next_size + spill_len < max_paths
                    && self.kmer_probs[source_kmer as usize] >= self.opts.get_source_prob()
                {
                    self.sources_added[source_kmer as usize] = true;

                    if children[i].fm_range.start > kmer_fmr.start {
                        let source_range =
                            Range::new(kmer_fmr.start, children[i].fm_range.start - 1);
                        if source_range.is_valid() {
                            spill[spill_len].set_source(
                                source_range,
                                source_kmer,
                                self.kmer_probs[source_kmer as usize],
                            );
                            spill_len += 1;
                        }
                    }

                    unchecked_range = if children[i].fm_range.end < kmer_fmr.end {
                        Range::new(children[i].fm_range.end + 1, kmer_fmr.end)
                    } else {
                        Range::EMPTY
                    };
                }

                prev_kmer = source_kmer as u32;

                // 区间重复的路径只保留排在后面的高概率者
                if i + 1 < next_size && children[i].fm_range == children[i + 1].fm_range {
                    children[i].invalidate();
                    continue;
                }

                // 当前路径之后的源路径
                if next_size + spill_len < max_paths
                    && self.kmer_probs[source_kmer as usize] >= self.opts.get_source_prob()
                {
                    let mut source_range = unchecked_range;

                    // 与下一条同 k-mer 路径之间的缝隙
                    if i + 1 < next_size && source_kmer == children[i + 1].kmer {
                        if children[i + 1].fm_range.start > 0 {
                            source_range.end = children[i + 1].fm_range.start - 1;
                        } else {
                            source_range = Range::EMPTY;
                        }
                        if unchecked_range.start <= children[i + 1].fm_range.end {
                            unchecked_range.start = children[i + 1].fm_range.end + 1;
                        }
                    }

                    if source_range.is_valid() {
                        spill[spill_len].set_source(
                            source_range,
                            source_kmer,
                            self.kmer_probs[source_kmer as usize],
                        );
                        spill_len += 1;
                    }
                }

                Self::update_seeds(
                    &self.fmi,
                    &mut self.seed_tracker,
                    &self.opts,
                    &self.layout,
                    &mut children[i],
                    self.event_i,
                    false,
                );
            }

            next_len = next_size + spill_len;
        }

        // 未被代表的 k-mer 的全区间源路径；标志位同时为下个事件清零
        for km in 0..kmer_count {
            if !self.sources_added[km]
                && next_len < max_paths
                && self.kmer_probs[km] >= self.opts.get_source_prob()
                && self.kmer_fmranges[km].is_valid()
            {
                let r = self.kmer_fmranges[km];
                let p = self.kmer_probs[km];
                self.next_paths[next_len].set_source(r, km as u16, p);
                next_len += 1;
            }
            self.sources_added[km] = false;
        }

        // 晋升为下一代
        self.prev_size = next_len;
        std::mem::swap(&mut self.prev_paths, &mut self.next_paths);
        self.event_i += 1;

        if let Some(sg) = self.seed_tracker.get_final() {
            self.state = State::Success;
            self.set_ref_loc(&sg);
            return true;
        }
        false
    }

    /// 种子验证桥：合格路径的区间逐项做 SA 查询，换算成两条链统一的
    /// 终点坐标后交给追踪器。path_ended 的种子归属于上一个事件。
    fn update_seeds(
        fmi: &FmIndex,
        tracker: &mut SeedTracker,
        opts: &MapOpts,
        layout: &PathLayout,
        path: &mut PathState,
        event_i: u32,
        path_ended: bool,
    ) {
        if !path.is_seed_valid(opts, layout, path_ended) {
            return;
        }
        path.sa_checked = true;
        for s in path.fm_range.start..=path.fm_range.end {
            // 反转坐标，使两条链的参考坐标都从左到右
            let ref_en = fmi.size() - fmi.sa(s) + 1;
            tracker.add_seed(ref_en, path.match_len(), event_i - path_ended as u32);
        }
    }

    /// SUCCESS 时把种子簇换算成参考坐标与 read 区间估计。
    fn set_ref_loc(&mut self, seeds: &SeedGroup) {
        let k_shift = (self.model.kmer_len() - 1) as u64;
        let size = self.fmi.size();

        let fwd = seeds.ref_st > size / 2;
        let sa_st = if fwd {
            size.saturating_sub(seeds.ref_en.end + k_shift)
        } else {
            seeds.ref_st
        };

        let rd_len = (self.opts.bases_per_sample * self.read.raw_len as f32) as u64;
        let rd_st = (self.opts.max_stay_frac * seeds.evt_st as f32) as u64;
        let rd_en = (self.opts.max_stay_frac * (seeds.evt_en + self.opts.seed_len as u32) as f32)
            as u64
            + k_shift;

        if let Some((rf_name, rf_st, rf_len)) = self.fmi.translate_loc(sa_st) {
            let rf_en = rf_st + (seeds.ref_en.end - seeds.ref_st) + k_shift;
            let match_count = seeds.total_len + k_shift as u32;
            self.read
                .loc
                .set_mapped(rd_st, rd_en, rd_len, rf_name, rf_st, rf_en, rf_len, match_count, fwd);
        }
    }
}
