use std::cmp::Ordering;

use crate::index::fm::Range;
use crate::map::MapOpts;

/// 每个事件类型占用的位宽。
pub const TYPE_BITS: u32 = 2;
const TYPE_MASK: u64 = (1 << TYPE_BITS) - 1;

/// 种子长度（即路径窗口长度）的编译期上限，保证 prob_sums
/// 可以内联为定长数组、PathState 保持可按位复制。
pub const MAX_SEED_LEN: usize = 32;

pub const NUM_TYPES: usize = 2;

/// 事件类型：MATCH 前进一个碱基，STAY 复用上一个 k-mer。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum EventType {
    Match = 0,
    Stay = 1,
}

impl EventType {
    #[inline]
    fn from_bits(v: u64) -> Self {
        if v == 0 {
            EventType::Match
        } else {
            EventType::Stay
        }
    }
}

/// 路径位压缩的布局常量，由每个 Mapper 在构造时根据 seed_len 生成，
/// 以引用传入 PathState 的各操作。
#[derive(Clone, Copy, Debug)]
pub struct PathLayout {
    max_path_len: u8,
    win_mask: u64,
    head_shift: u32,
}

impl PathLayout {
    /// seed_len 必须在 [2, MAX_SEED_LEN] 内。
    pub fn new(seed_len: u8) -> Self {
        debug_assert!(seed_len >= 2 && seed_len as usize <= MAX_SEED_LEN);
        let fields = seed_len as u32 - 1;
        Self {
            max_path_len: seed_len,
            win_mask: if fields as usize * TYPE_BITS as usize >= 64 {
                u64::MAX
            } else {
                (1u64 << (TYPE_BITS * fields)) - 1
            },
            head_shift: TYPE_BITS * (seed_len as u32 - 2),
        }
    }

    #[inline]
    pub fn max_path_len(&self) -> u8 {
        self.max_path_len
    }
}

/// 一条候选比对路径。事件类型历史以移位寄存器方式打包：低位字段是
/// 尾部（最新事件），最高有效字段是头部（窗口内最老的事件）；扩展时
/// 整体左移，最老的事件从高端滚出。
#[derive(Clone, Copy, Debug)]
pub struct PathState {
    pub fm_range: Range,
    pub kmer: u16,
    pub length: u8,
    pub event_types: u64,
    pub type_counts: [u8; NUM_TYPES],
    pub prob_sums: [f32; MAX_SEED_LEN + 1],
    pub seed_prob: f32,
    pub consec_stays: u8,
    pub sa_checked: bool,
}

impl PathState {
    /// 无效槽位（length == 0）。
    pub fn invalid() -> Self {
        Self {
            fm_range: Range::EMPTY,
            kmer: 0,
            length: 0,
            event_types: 0,
            type_counts: [0; NUM_TYPES],
            prob_sums: [0.0; MAX_SEED_LEN + 1],
            seed_prob: 0.0,
            consec_stays: 0,
            sa_checked: false,
        }
    }

    /// 初始化为长度 1 的源路径：无历史，计一次 MATCH。
    pub fn set_source(&mut self, range: Range, kmer: u16, prob: f32) {
        self.length = 1;
        self.consec_stays = 0;
        self.event_types = 0;
        self.seed_prob = prob;
        self.fm_range = range;
        self.kmer = kmer;
        self.sa_checked = false;
        self.type_counts = [0; NUM_TYPES];
        self.type_counts[EventType::Match as usize] = 1;
        self.prob_sums[0] = 0.0;
        self.prob_sums[1] = prob;
    }

    /// 由父路径派生子路径。窗口满时概率前缀和整体左移一格，
    /// 并把滚出窗口的事件从类型计数中扣除。
    pub fn set_child(
        &mut self,
        parent: &PathState,
        layout: &PathLayout,
        range: Range,
        kmer: u16,
        prob: f32,
        typ: EventType,
    ) {
        let full = parent.length >= layout.max_path_len;
        self.length = if full {
            layout.max_path_len
        } else {
            parent.length + 1
        };
        self.fm_range = range;
        self.kmer = kmer;
        self.sa_checked = parent.sa_checked;
        self.event_types = ((parent.event_types << TYPE_BITS) | typ as u64) & layout.win_mask;
        self.consec_stays = if typ == EventType::Stay {
            parent.consec_stays + 1
        } else {
            0
        };
        self.type_counts = parent.type_counts;
        self.type_counts[typ as usize] += 1;

        let len = self.length as usize;
        if full {
            self.type_counts[parent.type_head(layout) as usize] -= 1;
            for i in 0..len {
                self.prob_sums[i] = parent.prob_sums[i + 1];
            }
            self.prob_sums[len] = self.prob_sums[len - 1] + prob;
            self.seed_prob = (self.prob_sums[len] - self.prob_sums[0]) / len as f32;
        } else {
            self.prob_sums[..len].copy_from_slice(&parent.prob_sums[..len]);
            self.prob_sums[len] = self.prob_sums[len - 1] + prob;
            self.seed_prob = self.prob_sums[len] / len as f32;
        }
    }

    #[inline]
    pub fn invalidate(&mut self) {
        self.length = 0;
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.length > 0
    }

    #[inline]
    pub fn match_len(&self) -> u8 {
        self.type_counts[EventType::Match as usize]
    }

    /// 窗口内最老的事件类型（最高有效字段）。
    #[inline]
    pub fn type_head(&self, layout: &PathLayout) -> EventType {
        EventType::from_bits((self.event_types >> layout.head_shift) & TYPE_MASK)
    }

    /// 最新的事件类型（最低字段）。
    #[inline]
    pub fn type_tail(&self) -> EventType {
        EventType::from_bits(self.event_types & TYPE_MASK)
    }

    /// 解码窗口内保留的事件类型，最新者在前（调试与测试用）。
    pub fn event_types_vec(&self, layout: &PathLayout) -> Vec<EventType> {
        let n = (self.length.saturating_sub(1) as usize).min(layout.max_path_len as usize - 1);
        (0..n)
            .map(|i| EventType::from_bits((self.event_types >> (i as u32 * TYPE_BITS)) & TYPE_MASK))
            .collect()
    }

    /// 种子有效性判定。path_ended 时放宽：允许 max_rep_copy 以内的
    /// 多拷贝区间，且不再要求头部事件是 MATCH、不检查 STAY 配额。
    pub fn is_seed_valid(&self, opts: &MapOpts, layout: &PathLayout, path_ended: bool) -> bool {
        (self.fm_range.length() == 1
            || (path_ended
                && self.fm_range.length() <= opts.max_rep_copy as u64
                && self.match_len() >= opts.min_rep_len))
            && self.length >= opts.seed_len
            && (path_ended || self.type_head(layout) == EventType::Match)
            && (path_ended
                || (self.type_counts[EventType::Stay as usize] as f32)
                    <= opts.max_stay_frac * opts.seed_len as f32)
            && self.seed_prob >= opts.min_seed_prob
    }
}

/// 排序关系：先按 FM 区间 (start, end) 字典序，区间相同时按
/// seed_prob 升序——这样去重时保留的（靠后的）是高概率者。
pub fn cmp_paths(a: &PathState, b: &PathState) -> Ordering {
    a.fm_range
        .cmp(&b.fm_range)
        .then(a.seed_prob.total_cmp(&b.seed_prob))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout8() -> PathLayout {
        PathLayout::new(8)
    }

    fn opts8() -> MapOpts {
        MapOpts {
            seed_len: 8,
            max_rep_copy: 3,
            min_rep_len: 4,
            max_stay_frac: 0.5,
            min_seed_prob: -2.0,
            ..MapOpts::default()
        }
    }

    fn source(range: Range, kmer: u16, prob: f32) -> PathState {
        let mut p = PathState::invalid();
        p.set_source(range, kmer, prob);
        p
    }

    fn extend(p: &PathState, layout: &PathLayout, prob: f32, typ: EventType) -> PathState {
        let mut c = PathState::invalid();
        c.set_child(p, layout, p.fm_range, p.kmer, prob, typ);
        c
    }

    #[test]
    fn source_invariants() {
        let p = source(Range::new(3, 9), 7, -0.5);
        assert!(p.is_valid());
        assert_eq!(p.length, 1);
        assert_eq!(p.match_len(), 1);
        assert_eq!(p.type_counts[EventType::Stay as usize], 0);
        assert_eq!(p.prob_sums[0], 0.0);
        assert_eq!(p.prob_sums[1], -0.5);
        assert_eq!(p.seed_prob, -0.5);
        assert!(!p.sa_checked);
        assert!(p.event_types_vec(&layout8()).is_empty());
    }

    #[test]
    fn invalidate_then_source_restores() {
        let mut p = source(Range::new(3, 9), 7, -0.5);
        p.invalidate();
        assert!(!p.is_valid());
        p.set_source(Range::new(1, 1), 2, -1.0);
        assert!(p.is_valid());
        assert_eq!(p.length, 1);
        assert_eq!(p.seed_prob, -1.0);
    }

    #[test]
    fn child_counts_and_sums() {
        let layout = layout8();
        let mut p = source(Range::new(0, 10), 1, -1.0);
        for i in 0..4 {
            p = extend(
                &p,
                &layout,
                -1.0,
                if i == 1 { EventType::Stay } else { EventType::Match },
            );
        }
        assert_eq!(p.length, 5);
        // 类型计数之和 == min(length, MAX_PATH_LEN)
        let total: u8 = p.type_counts.iter().sum();
        assert_eq!(total, 5);
        assert_eq!(p.type_counts[EventType::Stay as usize], 1);
        assert_eq!(p.match_len(), 4);
        // 前缀和单调不增（对数概率为负），窗口均值一致
        assert!((p.seed_prob - (p.prob_sums[5] - p.prob_sums[0]) / 5.0).abs() < 1e-6);
        // 历史解码：最新在前
        let hist = p.event_types_vec(&layout);
        assert_eq!(hist.len(), 4);
        assert_eq!(hist[0], EventType::Match);
        assert_eq!(hist[2], EventType::Stay);
    }

    #[test]
    fn stay_child_keeps_range_and_kmer() {
        let layout = layout8();
        let p = source(Range::new(4, 6), 9, -0.3);
        let c = extend(&p, &layout, -0.4, EventType::Stay);
        assert_eq!(c.fm_range, p.fm_range);
        assert_eq!(c.kmer, p.kmer);
        assert_eq!(c.consec_stays, p.consec_stays + 1);
        let c2 = extend(&c, &layout, -0.4, EventType::Match);
        assert_eq!(c2.consec_stays, 0);
    }

    #[test]
    fn window_overflow_shifts_and_drops_head() {
        let layout = layout8();
        // 事件 2 是 STAY，其余 MATCH；窗口满后最老事件依次滚出
        let mut p = source(Range::new(0, 3), 5, -1.0);
        p = extend(&p, &layout, -1.0, EventType::Stay);
        for _ in 0..6 {
            p = extend(&p, &layout, -1.0, EventType::Match);
        }
        assert_eq!(p.length, 8);
        assert_eq!(p.type_counts[EventType::Stay as usize], 1);
        // 头部（最老保留的事件）此刻是那次 STAY
        assert_eq!(p.type_head(&layout), EventType::Stay);

        // 再扩展一次：窗口溢出，头部 STAY 被扣除
        p = extend(&p, &layout, -2.0, EventType::Match);
        assert_eq!(p.length, 8);
        assert_eq!(p.type_counts[EventType::Stay as usize], 0);
        assert_eq!(p.match_len(), 8);
        let total: u8 = p.type_counts.iter().sum();
        assert_eq!(total, 8);
        // 溢出后 prob_sums 是真实尾部窗口的前缀和
        assert!((p.seed_prob - (p.prob_sums[8] - p.prob_sums[0]) / 8.0).abs() < 1e-6);
        assert!((p.prob_sums[8] - p.prob_sums[7] - (-2.0)).abs() < 1e-6);
    }

    #[test]
    fn seed_rules() {
        let layout = layout8();
        let opts = opts8();
        // 长度不足
        let p = source(Range::new(2, 2), 3, -0.5);
        assert!(!p.is_seed_valid(&opts, &layout, false));

        // 唯一区间、纯 MATCH、满长度：有效
        let mut q = source(Range::new(2, 2), 3, -0.5);
        for _ in 0..7 {
            q = extend(&q, &layout, -0.5, EventType::Match);
        }
        assert!(q.is_seed_valid(&opts, &layout, false));

        // 概率阈值高于任何对数概率时永不有效
        let strict = MapOpts {
            min_seed_prob: 1.5,
            ..opts8()
        };
        assert!(!q.is_seed_valid(&strict, &layout, false));
        assert!(!q.is_seed_valid(&strict, &layout, true));

        // 多拷贝区间：仅在 path_ended 且拷贝数受限时有效
        let mut r = source(Range::new(2, 4), 3, -0.5);
        for _ in 0..7 {
            r = extend(&r, &layout, -0.5, EventType::Match);
        }
        assert!(!r.is_seed_valid(&opts, &layout, false));
        assert!(r.is_seed_valid(&opts, &layout, true));
        let tight = MapOpts {
            max_rep_copy: 2,
            ..opts8()
        };
        assert!(!r.is_seed_valid(&tight, &layout, true));
    }

    #[test]
    fn head_stay_blocks_emission_until_ended() {
        let layout = layout8();
        let opts = opts8();
        // 第一次扩展是 STAY，到达满长度时它正好位于窗口头部
        let mut p = source(Range::new(5, 5), 3, -0.5);
        p = extend(&p, &layout, -0.5, EventType::Stay);
        for _ in 0..6 {
            p = extend(&p, &layout, -0.5, EventType::Match);
        }
        assert_eq!(p.type_head(&layout), EventType::Stay);
        assert!(!p.is_seed_valid(&opts, &layout, false));
        assert!(p.is_seed_valid(&opts, &layout, true));
    }

    #[test]
    fn ordering_puts_best_duplicate_last() {
        let mut a = source(Range::new(5, 9), 1, -2.0);
        let b = source(Range::new(5, 9), 1, -0.5);
        let c = source(Range::new(2, 3), 1, -3.0);
        assert_eq!(cmp_paths(&c, &a), Ordering::Less);
        assert_eq!(cmp_paths(&a, &b), Ordering::Less);
        a.fm_range = Range::new(5, 8);
        assert_eq!(cmp_paths(&a, &b), Ordering::Less);
    }
}
