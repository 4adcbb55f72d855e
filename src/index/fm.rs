use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::index::sa;

const FM_MAGIC: u64 = 0x5349_474D_4150_464D; // "SIGMAPFM"
const FM_VERSION: u32 = 1;

/// 数值字母表大小：{0:$, 1:A, 2:C, 3:G, 4:T}
pub const SIGMA: usize = 5;

/// 后缀数组域上的闭区间 [start, end]。
/// start > end 表示无效（空）区间；比较按 (start, end) 字典序。
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Range {
    pub start: u64,
    pub end: u64,
}

impl Range {
    pub const EMPTY: Range = Range { start: 1, end: 0 };

    #[inline]
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.start <= self.end
    }

    #[inline]
    pub fn length(&self) -> u64 {
        if self.is_valid() {
            self.end - self.start + 1
        } else {
            0
        }
    }
}

impl Default for Range {
    fn default() -> Self {
        Self::EMPTY
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Contig {
    pub name: String,
    pub len: u64,
    pub offset: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct IndexMeta {
    pub reference_file: Option<String>,
    pub build_args: Option<String>,
    pub build_timestamp: Option<String>,
}

/// 面向信号比对的 FM 索引：
/// - 索引文本为「正链 ++ 反向互补链」整体反转后的数值序列，这样沿读取方向
///   逐碱基延伸恰好是一次 FM 反向扩展，且 `size − sa(s) + 1` 给出两条链统一
///   的从左到右终点坐标。
/// - 采用定长分块的 Occ 采样（块内顺扫补偿），保存完整 SA（MVP，可换稀疏）。
#[derive(Debug, Serialize, Deserialize)]
pub struct FmIndex {
    pub magic: u64,
    pub version: u32,
    pub sigma: u8,
    pub block: u32,
    /// C[i] = 文本中字母 < i 的累计数量
    pub c: Vec<u64>,
    /// BWT 序列（与 SA 同长度）
    pub bwt: Vec<u8>,
    /// Occ 采样（按块存储，行优先展平）：occ_samples[block_id * sigma + c]
    pub occ_samples: Vec<u64>,
    /// 完整 SA
    pub sa: Vec<u32>,
    /// 正链坐标下的 contig 元信息（名称、长度、起始偏移）
    pub contigs: Vec<Contig>,
    /// 正链部分（含分隔符）的长度
    pub fwd_len: u64,
    pub meta: Option<IndexMeta>,
}

impl FmIndex {
    pub fn build(bwt: Vec<u8>, sa: Vec<u32>, contigs: Vec<Contig>, fwd_len: u64, block: usize) -> Self {
        let n = bwt.len();
        // 计算 C 表
        let mut freq = vec![0u64; SIGMA];
        for &ch in &bwt {
            let ci = ch as usize;
            if ci < SIGMA {
                freq[ci] += 1;
            }
        }
        let mut c = vec![0u64; SIGMA];
        let mut acc = 0u64;
        for i in 0..SIGMA {
            c[i] = acc;
            acc += freq[i];
        }

        // 采样 Occ
        let num_blocks = if n == 0 { 0 } else { (n + block - 1) / block };
        let mut occ_samples = vec![0u64; num_blocks * SIGMA];
        let mut running = vec![0u64; SIGMA];
        for bi in 0..num_blocks {
            for a in 0..SIGMA {
                occ_samples[bi * SIGMA + a] = running[a];
            }
            let start = bi * block;
            let end = ((bi + 1) * block).min(n);
            for &ch in &bwt[start..end] {
                let ci = ch as usize;
                if ci < SIGMA {
                    running[ci] += 1;
                }
            }
        }

        Self {
            magic: FM_MAGIC,
            version: FM_VERSION,
            sigma: SIGMA as u8,
            block: block as u32,
            c,
            bwt,
            occ_samples,
            sa,
            contigs,
            fwd_len,
            meta: None,
        }
    }

    pub fn set_meta(&mut self, meta: IndexMeta) {
        self.meta = Some(meta);
    }

    /// 索引文本总长度（含分隔符与哨兵）。
    #[inline]
    pub fn size(&self) -> u64 {
        self.bwt.len() as u64
    }

    /// SA 查询。
    #[inline]
    pub fn sa(&self, i: u64) -> u64 {
        self.sa[i as usize] as u64
    }

    #[inline]
    fn occ(&self, c: u8, pos: usize) -> u64 {
        // 返回 BWT[0..pos) 中 c 的出现次数
        if pos == 0 {
            return 0;
        }
        let block = self.block as usize;
        let bi = (pos - 1) / block;
        let base = self.occ_samples[bi * SIGMA + c as usize];
        let start = bi * block;
        let mut add = 0u64;
        for &ch in &self.bwt[start..pos] {
            if ch == c {
                add += 1;
            }
        }
        base + add
    }

    /// 单步 FM 反向扩展：将碱基 base（0:A,1:C,2:G,3:T）追加到当前路径末端，
    /// 返回收窄后的区间；结果为空时返回无效 Range。
    #[inline]
    pub fn get_neighbor(&self, r: Range, base: u8) -> Range {
        if !r.is_valid() {
            return Range::EMPTY;
        }
        let sym = (base + 1) as usize;
        let l = self.c[sym] + self.occ(sym as u8, r.start as usize);
        let rr = self.c[sym] + self.occ(sym as u8, r.end as usize + 1);
        if l < rr {
            Range::new(l, rr - 1)
        } else {
            Range::EMPTY
        }
    }

    /// 求一个碱基序列（读取方向从左到右）的初始 SA 区间。
    pub fn kmer_range(&self, bases: &[u8]) -> Range {
        let mut r = Range::new(0, self.size().saturating_sub(1));
        for &b in bases {
            r = self.get_neighbor(r, b);
            if !r.is_valid() {
                return Range::EMPTY;
            }
        }
        r
    }

    /// 将正链坐标映射到 (contig 名称, contig 内偏移, contig 长度)。
    /// 落在分隔符或反向互补半区内时返回 None。
    pub fn translate_loc(&self, pos: u64) -> Option<(String, u64, u64)> {
        if self.contigs.is_empty() {
            return None;
        }
        let mut lo = 0usize;
        let mut hi = self.contigs.len();
        while lo < hi {
            let mid = (lo + hi) / 2;
            let ct = &self.contigs[mid];
            if pos < ct.offset {
                hi = mid;
            } else if pos >= ct.offset + ct.len {
                lo = mid + 1;
            } else {
                return Some((ct.name.clone(), pos - ct.offset, ct.len));
            }
        }
        None
    }

    pub fn save_to_file(&self, path: &str) -> Result<()> {
        let mut f = std::fs::File::create(path)?;
        bincode::serialize_into(&mut f, self)?;
        Ok(())
    }

    pub fn load_from_file(path: &str) -> Result<Self> {
        let f = std::fs::File::open(path)?;
        let idx: Self = bincode::deserialize_from(f)?;
        if idx.magic != FM_MAGIC {
            return Err(anyhow!(
                "invalid signal index file: bad magic number (expected 0x{:016X}, got 0x{:016X})",
                FM_MAGIC,
                idx.magic
            ));
        }
        if idx.version != FM_VERSION {
            return Err(anyhow!(
                "unsupported signal index version: expected {}, got {}",
                FM_VERSION,
                idx.version
            ));
        }
        Ok(idx)
    }
}

#[inline]
fn comp_sym(s: u8) -> u8 {
    // 符号空间取补：A<->T, C<->G，分隔符不变
    if s == 0 {
        0
    } else {
        5 - s
    }
}

/// 由后缀数组导出 BWT：每个后缀取其前一个字符，首后缀回绕到文本末尾。
fn bwt_from_sa(text: &[u8], sa: &[u32]) -> Vec<u8> {
    let last = *text.last().unwrap_or(&0);
    sa.iter()
        .map(|&p| match p {
            0 => last,
            _ => text[p as usize - 1],
        })
        .collect()
}

/// 从各 contig 的 2-bit 碱基编码（0:A,1:C,2:G,3:T）构建信号索引。
/// include_rc 为 true 时同时索引反向互补链（正式比对必选；
/// 单元测试可以关掉以获得更可控的区间）。
pub fn build_signal_index(
    contig_seqs: &[(String, Vec<u8>)],
    include_rc: bool,
    block: usize,
) -> FmIndex {
    let mut fwd: Vec<u8> = Vec::new();
    let mut contigs: Vec<Contig> = Vec::with_capacity(contig_seqs.len());
    for (name, codes) in contig_seqs {
        let offset = fwd.len() as u64;
        for &b in codes {
            fwd.push(b + 1);
        }
        contigs.push(Contig {
            name: name.clone(),
            len: codes.len() as u64,
            offset,
        });
        // contig 之间以分隔符隔断，避免跨界匹配
        fwd.push(0);
    }
    let fwd_len = fwd.len() as u64;

    let mut genome = fwd;
    if include_rc {
        let rc: Vec<u8> = genome.iter().rev().map(|&s| comp_sym(s)).collect();
        genome.extend_from_slice(&rc);
    }

    let mut text: Vec<u8> = genome.into_iter().rev().collect();
    text.push(0); // sentinel

    let sa_arr = sa::build_sa(&text);
    let bwt_arr = bwt_from_sa(&text, &sa_arr);
    FmIndex::build(bwt_arr, sa_arr, contigs, fwd_len, block)
}
