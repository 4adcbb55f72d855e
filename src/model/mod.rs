use anyhow::{anyhow, bail, Result};
use std::io::BufRead;

/// 碱基字母表大小（A/C/G/T）。
pub const ALPH_SIZE: usize = 4;

const LOG_2PI_HALF: f32 = 0.918_938_5; // 0.5 * ln(2*pi)

#[inline]
pub fn base_to_code(b: u8) -> Option<u8> {
    match b.to_ascii_uppercase() {
        b'A' => Some(0),
        b'C' => Some(1),
        b'G' => Some(2),
        b'T' | b'U' => Some(3),
        _ => None,
    }
}

#[inline]
pub fn code_to_base(c: u8) -> u8 {
    match c & 3 {
        0 => b'A',
        1 => b'C',
        2 => b'G',
        _ => b'T',
    }
}

/// 纳米孔 k-mer 电流模型：每个 k-mer 一个高斯电流水平 (mean, stdv)，
/// 事件-k-mer 匹配概率为对数密度。k-mer 以 2-bit 编码打包进 u16，
/// 最早的碱基在高位，k 最大为 8。
#[derive(Debug, Clone)]
pub struct PoreModel {
    k: u8,
    kmer_mask: u16,
    level_mean: Vec<f32>,
    level_stdv: Vec<f32>,
    lognorm: Vec<f32>,
    model_mean: f32,
    model_stdv: f32,
}

impl PoreModel {
    /// 由内存中的水平表构建模型；levels 按 k-mer 编码顺序排列。
    pub fn from_levels(k: u8, levels: &[(f32, f32)]) -> Result<Self> {
        if k < 1 || k > 8 {
            bail!("k-mer length must be in [1, 8], got {}", k);
        }
        let count = 1usize << (2 * k);
        if levels.len() != count {
            bail!("expected {} k-mer levels for k={}, got {}", count, k, levels.len());
        }
        let mut level_mean = Vec::with_capacity(count);
        let mut level_stdv = Vec::with_capacity(count);
        let mut lognorm = Vec::with_capacity(count);
        for &(m, s) in levels {
            if s <= 0.0 {
                bail!("k-mer level stdv must be positive, got {}", s);
            }
            level_mean.push(m);
            level_stdv.push(s);
            lognorm.push(-(s.ln() + LOG_2PI_HALF));
        }

        let n = count as f32;
        let mean = level_mean.iter().sum::<f32>() / n;
        let var = level_mean.iter().map(|m| (m - mean) * (m - mean)).sum::<f32>() / n;

        Ok(Self {
            k,
            kmer_mask: (count - 1) as u16,
            level_mean,
            level_stdv,
            lognorm,
            model_mean: mean,
            model_stdv: var.sqrt().max(f32::EPSILON),
        })
    }

    /// 从文本水平表加载：每行 `kmer  level_mean  level_stdv`，
    /// 允许 '#' 注释行与 "kmer" 开头的表头行。
    pub fn load_from_file(path: &str) -> Result<Self> {
        let f = std::fs::File::open(path)
            .map_err(|e| anyhow!("cannot open pore model '{}': {}", path, e))?;
        let reader = std::io::BufReader::new(f);

        let mut k: Option<u8> = None;
        let mut levels: Vec<Option<(f32, f32)>> = Vec::new();
        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.split_whitespace();
            let kmer_str = fields.next().unwrap_or("");
            if kmer_str.eq_ignore_ascii_case("kmer") {
                continue; // header
            }
            let mean: f32 = fields
                .next()
                .ok_or_else(|| anyhow!("line {}: missing level_mean", lineno + 1))?
                .parse()
                .map_err(|e| anyhow!("line {}: bad level_mean: {}", lineno + 1, e))?;
            let stdv: f32 = fields
                .next()
                .ok_or_else(|| anyhow!("line {}: missing level_stdv", lineno + 1))?
                .parse()
                .map_err(|e| anyhow!("line {}: bad level_stdv: {}", lineno + 1, e))?;

            let klen = kmer_str.len() as u8;
            match k {
                None => {
                    if klen < 1 || klen > 8 {
                        bail!("line {}: k-mer length {} out of range", lineno + 1, klen);
                    }
                    k = Some(klen);
                    levels = vec![None; 1usize << (2 * klen)];
                }
                Some(prev) if prev != klen => {
                    bail!("line {}: inconsistent k-mer length {} (expected {})", lineno + 1, klen, prev);
                }
                _ => {}
            }

            let mut idx: u16 = 0;
            for &b in kmer_str.as_bytes() {
                let code = base_to_code(b)
                    .ok_or_else(|| anyhow!("line {}: bad base '{}' in k-mer", lineno + 1, b as char))?;
                idx = (idx << 2) | code as u16;
            }
            levels[idx as usize] = Some((mean, stdv));
        }

        let k = k.ok_or_else(|| anyhow!("pore model '{}' contains no k-mer rows", path))?;
        let mut full = Vec::with_capacity(levels.len());
        for (i, lv) in levels.iter().enumerate() {
            match lv {
                Some(pair) => full.push(*pair),
                None => bail!("pore model '{}' is missing k-mer {}", path, kmer_to_string(i as u16, k)),
            }
        }
        Self::from_levels(k, &full)
    }

    #[inline]
    pub fn kmer_len(&self) -> u8 {
        self.k
    }

    #[inline]
    pub fn kmer_count(&self) -> u32 {
        1u32 << (2 * self.k)
    }

    /// 事件均值与 k-mer 的匹配对数概率（高斯对数密度）。
    #[inline]
    pub fn event_match_prob(&self, evt_mean: f32, kmer: u16) -> f32 {
        let i = kmer as usize;
        let d = (evt_mean - self.level_mean[i]) / self.level_stdv[i];
        -0.5 * d * d + self.lognorm[i]
    }

    /// 在末端追加一个碱基得到的下一个 k-mer。
    #[inline]
    pub fn get_neighbor(&self, kmer: u16, base: u8) -> u16 {
        ((kmer << 2) & self.kmer_mask) | base as u16
    }

    /// k-mer 的碱基序列（读取方向从左到右）。
    pub fn kmer_bases(&self, kmer: u16) -> Vec<u8> {
        let k = self.k as usize;
        let mut out = Vec::with_capacity(k);
        for i in 0..k {
            out.push(((kmer >> (2 * (k - 1 - i))) & 3) as u8);
        }
        out
    }

    /// 全部 k-mer 水平均值的均值（归一化目标）。
    #[inline]
    pub fn model_mean(&self) -> f32 {
        self.model_mean
    }

    /// 全部 k-mer 水平均值的标准差（归一化目标）。
    #[inline]
    pub fn model_stdv(&self) -> f32 {
        self.model_stdv
    }

    #[inline]
    pub fn level_mean_of(&self, kmer: u16) -> f32 {
        self.level_mean[kmer as usize]
    }
}

/// 2-bit 编码转 k-mer 字符串。
pub fn kmer_to_string(kmer: u16, k: u8) -> String {
    let mut s = String::with_capacity(k as usize);
    for i in 0..k {
        let code = (kmer >> (2 * (k - 1 - i))) & 3;
        s.push(code_to_base(code as u8) as char);
    }
    s
}

/// 碱基序列打包为 k-mer 编码（调试与测试用）。
pub fn pack_kmer(codes: &[u8]) -> u16 {
    let mut idx: u16 = 0;
    for &c in codes {
        idx = (idx << 2) | (c & 3) as u16;
    }
    idx
}
