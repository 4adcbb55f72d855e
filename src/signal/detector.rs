use std::collections::VecDeque;

/// 事件检测参数：双窗口 t 统计量分段。
#[derive(Clone, Copy, Debug)]
pub struct EvdtParams {
    pub window_length1: usize,
    pub window_length2: usize,
    pub threshold1: f32,
    pub threshold2: f32,
    pub min_event_len: usize,
    pub max_event_len: usize,
}

impl Default for EvdtParams {
    fn default() -> Self {
        Self {
            window_length1: 3,
            window_length2: 6,
            threshold1: 1.4,
            threshold2: 9.0,
            min_event_len: 3,
            max_event_len: 100,
        }
    }
}

const VAR_FLOOR: f32 = 0.01;

/// 流式事件检测器：在长度 2·w2 的滑动窗口中点处计算左右两半的
/// Welch t 统计量，t 越过阈值后的局部峰即为事件边界候选；短窗口
/// 统计量作为确认条件。每个完结的事件输出一个样本均值。
///
/// 样本从窗口尾部释放进当前事件的累加器，因此边界判定相对输入有
/// 固定的 2·w2 延迟；`add_sample` 返回 true 表示刚完结一个事件，
/// 其均值可由 `get_mean` 读取。
pub struct EventDetector {
    params: EvdtParams,
    win: VecDeque<f32>,
    pos: u64,
    released: u64,
    event_sum: f64,
    event_len: usize,
    stat1_prev: f32,
    stat2_prev: f32,
    rising: bool,
    last_boundary: u64,
    pending: VecDeque<u64>,
    mean_out: f32,
}

impl EventDetector {
    pub fn new(params: EvdtParams) -> Self {
        Self {
            params,
            win: VecDeque::with_capacity(2 * params.window_length2 + 1),
            pos: 0,
            released: 0,
            event_sum: 0.0,
            event_len: 0,
            stat1_prev: 0.0,
            stat2_prev: 0.0,
            rising: false,
            last_boundary: 0,
            pending: VecDeque::with_capacity(8),
            mean_out: 0.0,
        }
    }

    pub fn reset(&mut self) {
        self.win.clear();
        self.pos = 0;
        self.released = 0;
        self.event_sum = 0.0;
        self.event_len = 0;
        self.stat1_prev = 0.0;
        self.stat2_prev = 0.0;
        self.rising = false;
        self.last_boundary = 0;
        self.pending.clear();
    }

    /// 送入一个原始样本；完结一个事件时返回 true。
    pub fn add_sample(&mut self, s: f32) -> bool {
        let w2 = self.params.window_length2;
        let full = 2 * w2;

        self.win.push_back(s);
        self.pos += 1;

        let mut emitted = false;

        if self.win.len() > full {
            let out = self.win.pop_front().unwrap_or(0.0);
            // 释放样本前检查是否恰好到达一个边界
            if self.pending.front() == Some(&self.released) {
                self.pending.pop_front();
                emitted = self.finalize_event();
            }
            self.event_sum += out as f64;
            self.event_len += 1;
            self.released += 1;
            if self.event_len >= self.params.max_event_len {
                emitted = self.finalize_event() || emitted;
            }
        }

        if self.win.len() >= full {
            let (stat1, stat2) = self.window_stats();
            // stat2 的局部峰（越过阈值后回落），短窗口统计量确认
            if stat2 > self.stat2_prev {
                self.rising = true;
            } else if self.rising
                && stat2 < self.stat2_prev
                && self.stat2_prev >= self.params.threshold2
                && self.stat1_prev >= self.params.threshold1
            {
                self.rising = false;
                // 峰在上一个窗口中点：junction = pos - 1 - w2
                let boundary = self.pos - 1 - w2 as u64;
                if boundary >= self.last_boundary + self.params.min_event_len as u64
                    && boundary >= self.released
                {
                    self.pending.push_back(boundary);
                    self.last_boundary = boundary;
                }
            }
            self.stat1_prev = stat1;
            self.stat2_prev = stat2;
        }

        emitted
    }

    /// 最近一次完结事件的样本均值。
    #[inline]
    pub fn get_mean(&self) -> f32 {
        self.mean_out
    }

    fn finalize_event(&mut self) -> bool {
        if self.event_len == 0 {
            return false;
        }
        self.mean_out = (self.event_sum / self.event_len as f64) as f32;
        self.event_sum = 0.0;
        self.event_len = 0;
        true
    }

    fn window_stats(&self) -> (f32, f32) {
        let w1 = self.params.window_length1;
        let w2 = self.params.window_length2;
        let mid = w2;
        let t2 = welch_t(
            self.win.iter().take(mid).copied(),
            self.win.iter().skip(mid).copied(),
            w2,
        );
        let t1 = welch_t(
            self.win.iter().skip(mid - w1).take(w1).copied(),
            self.win.iter().skip(mid).take(w1).copied(),
            w1,
        );
        (t1, t2)
    }
}

fn welch_t(left: impl Iterator<Item = f32>, right: impl Iterator<Item = f32>, w: usize) -> f32 {
    let (mut s1, mut q1) = (0.0f64, 0.0f64);
    let (mut s2, mut q2) = (0.0f64, 0.0f64);
    for x in left {
        s1 += x as f64;
        q1 += (x * x) as f64;
    }
    for x in right {
        s2 += x as f64;
        q2 += (x * x) as f64;
    }
    let n = w as f64;
    let m1 = s1 / n;
    let m2 = s2 / n;
    let v1 = (q1 / n - m1 * m1).max(VAR_FLOOR as f64);
    let v2 = (q2 / n - m2 * m2).max(VAR_FLOOR as f64);
    ((m1 - m2).abs() / ((v1 / n + v2 / n).sqrt())) as f32
}
