use anyhow::{anyhow, Result};
use std::io::BufRead;

/// 一条原始信号 read：`id<TAB>逗号分隔的样本值`，每行一条。
/// '#' 开头的行与空行忽略。
#[derive(Debug, Clone)]
pub struct SignalRecord {
    pub id: String,
    pub samples: Vec<f32>,
}

pub struct SignalReader<R: BufRead> {
    reader: R,
    buf: String,
    line_no: usize,
    done: bool,
}

impl<R: BufRead> SignalReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: String::new(),
            line_no: 0,
            done: false,
        }
    }

    pub fn next_record(&mut self) -> Result<Option<SignalRecord>> {
        if self.done {
            return Ok(None);
        }
        loop {
            self.buf.clear();
            let n = self.reader.read_line(&mut self.buf)?;
            if n == 0 {
                self.done = true;
                return Ok(None);
            }
            self.line_no += 1;
            let line = self.buf.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (id, rest) = line
                .split_once('\t')
                .ok_or_else(|| anyhow!("line {}: expected `id<TAB>samples`", self.line_no))?;
            if id.is_empty() {
                return Err(anyhow!("line {}: empty read id", self.line_no));
            }

            let mut samples = Vec::new();
            for tok in rest.split(',') {
                let tok = tok.trim();
                if tok.is_empty() {
                    continue;
                }
                let v: f32 = tok.parse().map_err(|e| {
                    anyhow!("line {}: bad sample value '{}': {}", self.line_no, tok, e)
                })?;
                samples.push(v);
            }
            if samples.is_empty() {
                return Err(anyhow!("line {}: read '{}' has no samples", self.line_no, id));
            }

            return Ok(Some(SignalRecord {
                id: id.to_string(),
                samples,
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parse_signal_records() {
        let data = b"# comment\nread1\t1.0,2.5, 3.25\n\nread2\t80.0,81.5\n";
        let mut r = SignalReader::new(Cursor::new(&data[..]));

        let r1 = r.next_record().unwrap().unwrap();
        assert_eq!(r1.id, "read1");
        assert_eq!(r1.samples, vec![1.0, 2.5, 3.25]);

        let r2 = r.next_record().unwrap().unwrap();
        assert_eq!(r2.id, "read2");
        assert_eq!(r2.samples.len(), 2);

        assert!(r.next_record().unwrap().is_none());
    }

    #[test]
    fn reject_missing_tab() {
        let data = b"read1 1.0,2.0\n";
        let mut r = SignalReader::new(Cursor::new(&data[..]));
        assert!(r.next_record().is_err());
    }

    #[test]
    fn reject_bad_sample() {
        let data = b"read1\t1.0,abc\n";
        let mut r = SignalReader::new(Cursor::new(&data[..]));
        assert!(r.next_record().is_err());
    }
}
