use crate::index::fm::Range;

/// 一簇相互印证的种子。ref_en 是簇内已见终点坐标的跨度，
/// ref_st 是按首个种子回推的起点估计。
#[derive(Clone, Copy, Debug)]
pub struct SeedGroup {
    pub ref_st: u64,
    pub ref_en: Range,
    pub evt_st: u32,
    pub evt_en: u32,
    pub total_len: u32,
}

const MAX_GROUPS: usize = 512;

/// 种子追踪器：把 (终点坐标, 匹配长度, 事件号) 三元组聚成簇，
/// 簇的参考前进量不得超过事件前进量加上一个 k-mer 量级的松弛。
/// 当最优簇积累的非重叠覆盖超过 min_aln_len、且相对次优簇
/// （或其余簇均值）的置信度达标时，get_final 给出结论。
pub struct SeedTracker {
    min_mean_conf: f32,
    min_top_conf: f32,
    min_aln_len: u32,
    slack: u32,
    groups: Vec<SeedGroup>,
    n_seeds: u32,
}

impl SeedTracker {
    pub fn new(min_mean_conf: f32, min_top_conf: f32, min_aln_len: u32, seed_len: u8) -> Self {
        Self {
            min_mean_conf,
            min_top_conf,
            min_aln_len,
            slack: seed_len as u32,
            groups: Vec::with_capacity(64),
            n_seeds: 0,
        }
    }

    pub fn reset(&mut self) {
        self.groups.clear();
        self.n_seeds = 0;
    }

    /// 记录一枚种子。ref_en 为参考终点坐标（两条链统一从左到右），
    /// evt_i 为产生该种子的事件号。
    pub fn add_seed(&mut self, ref_en: u64, match_len: u8, evt_i: u32) {
        self.n_seeds += 1;

        // 找参考/事件前进量都相容、且参考间隙最小的簇
        let mut best: Option<(usize, u64)> = None;
        for (gi, g) in self.groups.iter().enumerate() {
            if evt_i < g.evt_en || ref_en < g.ref_en.end {
                continue;
            }
            let d_ref = ref_en - g.ref_en.end;
            let d_evt = (evt_i - g.evt_en) as u64;
            if d_ref > d_evt + self.slack as u64 {
                continue;
            }
            if best.map(|(_, d)| d_ref < d).unwrap_or(true) {
                best = Some((gi, d_ref));
            }
        }

        match best {
            Some((gi, d_ref)) => {
                let g = &mut self.groups[gi];
                g.ref_en.end = ref_en;
                g.evt_en = evt_i;
                g.total_len += (match_len as u64).min(d_ref) as u32;
            }
            None => {
                if self.groups.len() >= MAX_GROUPS {
                    self.prune();
                }
                self.groups.push(SeedGroup {
                    ref_st: ref_en.saturating_sub(match_len as u64),
                    ref_en: Range::new(ref_en, ref_en),
                    evt_st: evt_i,
                    evt_en: evt_i,
                    total_len: match_len as u32,
                });
            }
        }
    }

    /// 最优簇达到长度与置信度门槛时返回它。
    pub fn get_final(&self) -> Option<SeedGroup> {
        let best_i = self
            .groups
            .iter()
            .enumerate()
            .max_by_key(|(_, g)| g.total_len)
            .map(|(i, _)| i)?;
        let best = &self.groups[best_i];
        if best.total_len < self.min_aln_len {
            return None;
        }

        let mut second = 0u32;
        let mut others_sum = 0u64;
        let mut others_n = 0u64;
        for (i, g) in self.groups.iter().enumerate() {
            if i == best_i {
                continue;
            }
            second = second.max(g.total_len);
            others_sum += g.total_len as u64;
            others_n += 1;
        }

        let top_conf = if second == 0 {
            f32::INFINITY
        } else {
            best.total_len as f32 / second as f32
        };
        let mean_conf = if others_sum == 0 {
            f32::INFINITY
        } else {
            best.total_len as f32 / (others_sum as f32 / others_n as f32)
        };

        if top_conf >= self.min_top_conf || mean_conf >= self.min_mean_conf {
            Some(*best)
        } else {
            None
        }
    }

    #[inline]
    pub fn seed_count(&self) -> u32 {
        self.n_seeds
    }

    #[inline]
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    fn prune(&mut self) {
        // 保留覆盖最长的一半，给新簇腾位
        self.groups.sort_unstable_by(|a, b| b.total_len.cmp(&a.total_len));
        self.groups.truncate(MAX_GROUPS / 2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> SeedTracker {
        SeedTracker::new(2.0, 1.5, 12, 8)
    }

    #[test]
    fn coherent_seeds_form_one_group() {
        let mut t = tracker();
        t.add_seed(30, 8, 7);
        for i in 1..6u32 {
            t.add_seed(30 + i as u64, 8, 7 + i);
        }
        assert_eq!(t.group_count(), 1);
        assert_eq!(t.seed_count(), 6);
        // 初始 8，随后每事件 +1 的非重叠覆盖
        let g = t.get_final().expect("single coherent group");
        assert_eq!(g.total_len, 13);
        assert_eq!(g.evt_st, 7);
        assert_eq!(g.evt_en, 12);
        assert_eq!(g.ref_en.start, 30);
        assert_eq!(g.ref_en.end, 35);
    }

    #[test]
    fn incoherent_seed_opens_new_group() {
        let mut t = tracker();
        t.add_seed(30, 8, 7);
        // 参考前进远超事件前进：另起一簇
        t.add_seed(500, 8, 8);
        assert_eq!(t.group_count(), 2);
    }

    #[test]
    fn final_requires_min_len() {
        let mut t = tracker();
        t.add_seed(30, 8, 7);
        assert!(t.get_final().is_none());
        for i in 1..5u32 {
            t.add_seed(30 + i as u64, 8, 7 + i);
        }
        assert!(t.get_final().is_some());
    }

    #[test]
    fn final_requires_confidence() {
        let mut t = SeedTracker::new(10.0, 3.0, 12, 8);
        // 两簇覆盖接近：置信度不足
        for i in 0..8u32 {
            t.add_seed(30 + i as u64, 8, i);
            t.add_seed(500 + i as u64, 8, i);
        }
        assert!(t.get_final().is_none());
        // 最优簇继续增长后胜出
        for i in 8..40u32 {
            t.add_seed(30 + i as u64, 8, i);
        }
        assert!(t.get_final().is_some());
    }

    #[test]
    fn reset_clears_groups() {
        let mut t = tracker();
        t.add_seed(30, 8, 7);
        t.reset();
        assert_eq!(t.group_count(), 0);
        assert_eq!(t.seed_count(), 0);
    }
}
