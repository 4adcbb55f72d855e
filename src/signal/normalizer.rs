/// 事件归一化器：固定容量环形缓冲区保存最近的原始事件均值，
/// 弹出时按缓冲窗口的均值/方差拟合 `scale·x + shift`，把事件
/// 缩放到孔模型的水平空间。缓冲满（全部未读）时拒绝新事件。
pub struct Normalizer {
    target_mean: f32,
    target_stdv: f32,
    events: Vec<f32>,
    n_filled: usize,
    wr: usize,
    n_unread: usize,
    sum: f64,
    sumsq: f64,
}

impl Normalizer {
    pub fn new(target_mean: f32, target_stdv: f32, capacity: usize) -> Self {
        Self {
            target_mean,
            target_stdv,
            events: vec![0.0; capacity.max(1)],
            n_filled: 0,
            wr: 0,
            n_unread: 0,
            sum: 0.0,
            sumsq: 0.0,
        }
    }

    pub fn reset(&mut self) {
        self.n_filled = 0;
        self.wr = 0;
        self.n_unread = 0;
        self.sum = 0.0;
        self.sumsq = 0.0;
    }

    /// 追加一个原始事件均值；缓冲已满（未读事件占满容量）时返回 false。
    pub fn add_event(&mut self, mean: f32) -> bool {
        let cap = self.events.len();
        if self.n_unread == cap {
            return false;
        }
        if self.n_filled == cap {
            let old = self.events[self.wr];
            self.sum -= old as f64;
            self.sumsq -= (old * old) as f64;
        } else {
            self.n_filled += 1;
        }
        self.events[self.wr] = mean;
        self.sum += mean as f64;
        self.sumsq += (mean * mean) as f64;
        self.wr = (self.wr + 1) % cap;
        self.n_unread += 1;
        true
    }

    /// 弹出最早的未读事件，返回缩放到模型空间后的均值。
    pub fn pop_event(&mut self) -> f32 {
        let cap = self.events.len();
        if self.n_unread == 0 {
            return 0.0;
        }
        let rd = (self.wr + cap - self.n_unread) % cap;
        let x = self.events[rd];
        self.n_unread -= 1;

        let n = self.n_filled as f64;
        let mean = self.sum / n;
        let var = (self.sumsq / n - mean * mean).max(1e-6);
        let scale = self.target_stdv as f64 / var.sqrt();
        let shift = self.target_mean as f64 - scale * mean;
        (scale * x as f64 + shift) as f32
    }

    /// 丢弃最早的未读事件，只保留最近 nkeep 个；返回丢弃数。
    pub fn skip_unread(&mut self, nkeep: usize) -> u32 {
        let skipped = self.n_unread.saturating_sub(nkeep);
        self.n_unread -= skipped;
        skipped as u32
    }

    #[inline]
    pub fn empty(&self) -> bool {
        self.n_unread == 0
    }

    #[inline]
    pub fn unread_count(&self) -> usize {
        self.n_unread
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_when_full() {
        let mut norm = Normalizer::new(0.0, 1.0, 4);
        for i in 0..4 {
            assert!(norm.add_event(i as f32));
        }
        assert!(!norm.add_event(9.0));
        let _ = norm.pop_event();
        assert!(norm.add_event(9.0));
    }

    #[test]
    fn scales_window_to_target() {
        // 缓冲内容 {10, 20}：均值 15，标准差 5 -> 目标 (0, 1)
        let mut norm = Normalizer::new(0.0, 1.0, 8);
        assert!(norm.add_event(10.0));
        assert!(norm.add_event(20.0));
        let a = norm.pop_event();
        let b = norm.pop_event();
        assert!((a + 1.0).abs() < 1e-4, "got {}", a);
        assert!((b - 1.0).abs() < 1e-4, "got {}", b);
    }

    #[test]
    fn skip_unread_keeps_most_recent() {
        let mut norm = Normalizer::new(0.0, 1.0, 8);
        for i in 0..6 {
            norm.add_event(i as f32);
        }
        assert_eq!(norm.skip_unread(2), 4);
        assert_eq!(norm.unread_count(), 2);
        // 剩下的两个是最近写入的 4 和 5（缩放前）
        let _ = norm.pop_event();
        let _ = norm.pop_event();
        assert!(norm.empty());
    }

    #[test]
    fn identity_when_window_matches_target() {
        let mut norm = Normalizer::new(15.0, 5.0, 8);
        norm.add_event(10.0);
        norm.add_event(20.0);
        let a = norm.pop_event();
        assert!((a - 10.0).abs() < 1e-3, "got {}", a);
    }
}
