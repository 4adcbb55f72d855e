/// 单个信号分片：同一 read 的分片按序到达，read 序号用于
/// 识别跨 read 的分片冲突。
#[derive(Debug, Clone, Default)]
pub struct Chunk {
    pub read_id: String,
    pub number: u32,
    pub samples: Vec<f32>,
}

impl Chunk {
    pub fn new(read_id: impl Into<String>, number: u32, samples: Vec<f32>) -> Self {
        Self {
            read_id: read_id.into(),
            number,
            samples,
        }
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// 正在比对的 read 的缓冲与统计。
#[derive(Debug, Clone, Default)]
pub struct ReadBuffer {
    pub id: String,
    pub number: u32,
    pub chunk: Vec<f32>,
    pub chunk_processed: bool,
    pub num_chunks: u32,
    pub raw_len: u32,
    pub loc: ReadLoc,
}

impl ReadBuffer {
    pub fn new(chunk: Chunk) -> Self {
        let raw_len = chunk.samples.len() as u32;
        Self {
            id: chunk.read_id,
            number: chunk.number,
            chunk: chunk.samples,
            chunk_processed: false,
            num_chunks: 1,
            raw_len,
            loc: ReadLoc::default(),
        }
    }

    /// 换入同一 read 的下一个分片；read 序号不符时拒绝。
    pub fn add_chunk(&mut self, chunk: &mut Chunk) -> bool {
        if self.number != chunk.number {
            return false;
        }
        self.chunk = std::mem::take(&mut chunk.samples);
        self.raw_len += self.chunk.len() as u32;
        self.num_chunks += 1;
        self.chunk_processed = false;
        true
    }
}

/// 比对结论：read 上的区间估计与参考上的映射坐标。
#[derive(Debug, Clone, Default)]
pub struct ReadLoc {
    pub mapped: bool,
    pub rd_st: u64,
    pub rd_en: u64,
    pub rd_len: u64,
    pub rf_name: String,
    pub rf_st: u64,
    pub rf_en: u64,
    pub rf_len: u64,
    pub match_count: u32,
    pub fwd: bool,
}

impl ReadLoc {
    #[allow(clippy::too_many_arguments)]
    pub fn set_mapped(
        &mut self,
        rd_st: u64,
        rd_en: u64,
        rd_len: u64,
        rf_name: String,
        rf_st: u64,
        rf_en: u64,
        rf_len: u64,
        match_count: u32,
        fwd: bool,
    ) {
        self.mapped = true;
        self.rd_st = rd_st;
        self.rd_en = rd_en;
        self.rd_len = rd_len;
        self.rf_name = rf_name;
        self.rf_st = rf_st;
        self.rf_en = rf_en;
        self.rf_len = rf_len;
        self.match_count = match_count;
        self.fwd = fwd;
    }

    /// 渲染为一行制表符分隔的比对记录（近似 PAF 布局）。
    pub fn to_tsv(&self, read_id: &str, state: &str, events: u32) -> String {
        if self.mapped {
            format!(
                "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
                read_id,
                self.rd_len,
                self.rd_st,
                self.rd_en,
                if self.fwd { '+' } else { '-' },
                self.rf_name,
                self.rf_len,
                self.rf_st,
                self.rf_en,
                self.match_count,
                state,
                events,
            )
        } else {
            format!(
                "{}\t{}\t*\t*\t*\t*\t*\t*\t*\t0\t{}\t{}",
                read_id, self.rd_len, state, events,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_chunk_rejects_other_read() {
        let mut rb = ReadBuffer::new(Chunk::new("r1", 5, vec![1.0, 2.0]));
        rb.chunk_processed = true;
        let mut wrong = Chunk::new("r2", 6, vec![3.0]);
        assert!(!rb.add_chunk(&mut wrong));
        assert_eq!(rb.num_chunks, 1);

        let mut right = Chunk::new("r1", 5, vec![3.0, 4.0, 5.0]);
        assert!(rb.add_chunk(&mut right));
        assert_eq!(rb.num_chunks, 2);
        assert_eq!(rb.raw_len, 5);
        assert!(!rb.chunk_processed);
        assert!(right.samples.is_empty());
    }

    #[test]
    fn loc_tsv_unmapped_and_mapped() {
        let mut loc = ReadLoc::default();
        let line = loc.to_tsv("r1", "FAILURE", 42);
        assert!(line.starts_with("r1\t"));
        assert!(line.contains("FAILURE"));

        loc.set_mapped(1, 20, 120, "chr1".to_string(), 3, 25, 100, 24, false);
        let line = loc.to_tsv("r1", "SUCCESS", 42);
        assert!(line.contains("chr1"));
        assert!(line.contains("\t-\t"));
        assert!(line.contains("SUCCESS"));
    }
}
