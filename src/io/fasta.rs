use anyhow::{bail, Result};
use std::io::BufRead;

/// 参考序列记录（建索引用）。
#[derive(Debug, Clone)]
pub struct FastaRecord {
    pub id: String,
    pub desc: Option<String>,
    pub seq: Vec<u8>,
}

/// 流式 FASTA 解析器：一次返回一条记录。序列行内的空白被丢弃，
/// 碱基统一转成大写；头部行以外的非空行视为格式错误。
pub struct FastaReader<R: BufRead> {
    input: R,
    line: String,
    pending_header: Option<String>,
    eof: bool,
}

impl<R: BufRead> FastaReader<R> {
    pub fn new(input: R) -> Self {
        Self {
            input,
            line: String::new(),
            pending_header: None,
            eof: false,
        }
    }

    pub fn next_record(&mut self) -> Result<Option<FastaRecord>> {
        if self.eof {
            return Ok(None);
        }

        // 找到本条记录的头部：要么是上一轮多读的那行，要么继续向下扫
        let header = match self.pending_header.take() {
            Some(h) => h,
            None => loop {
                if !self.fill_line()? {
                    self.eof = true;
                    return Ok(None);
                }
                let line = self.line.trim();
                if let Some(h) = line.strip_prefix('>') {
                    break h.trim().to_string();
                }
                if !line.is_empty() {
                    bail!("invalid FASTA: expected a '>' header line, got '{}'", line);
                }
            },
        };

        let (id, desc) = split_header(&header);
        if id.is_empty() {
            bail!("invalid FASTA: record header has no id");
        }

        // 收集序列行，直到下一条头部或文件结束
        let mut seq: Vec<u8> = Vec::new();
        loop {
            if !self.fill_line()? {
                self.eof = true;
                break;
            }
            let line = self.line.trim();
            if let Some(h) = line.strip_prefix('>') {
                self.pending_header = Some(h.trim().to_string());
                break;
            }
            seq.extend(
                line.bytes()
                    .filter(|b| !b.is_ascii_whitespace())
                    .map(|b| b.to_ascii_uppercase()),
            );
        }

        Ok(Some(FastaRecord { id, desc, seq }))
    }

    fn fill_line(&mut self) -> Result<bool> {
        self.line.clear();
        Ok(self.input.read_line(&mut self.line)? > 0)
    }
}

fn split_header(header: &str) -> (String, Option<String>) {
    match header.split_once(char::is_whitespace) {
        Some((id, rest)) => {
            let desc = rest.trim();
            let desc = (!desc.is_empty()).then(|| desc.to_string());
            (id.to_string(), desc)
        }
        None => (header.to_string(), None),
    }
}
