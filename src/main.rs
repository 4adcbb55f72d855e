use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::Write as _;
use std::sync::Arc;

use rayon::prelude::*;

use sigmap_rust::index::fm::{build_signal_index, FmIndex, IndexMeta};
use sigmap_rust::io::fasta::FastaReader;
use sigmap_rust::io::signal::{SignalReader, SignalRecord};
use sigmap_rust::map::{Chunk, MapOpts, Mapper, State};
use sigmap_rust::model::{base_to_code, PoreModel};

#[derive(Parser, Debug)]
#[command(name = "sigmap", author, version, about = "Real-time nanopore signal mapper", arg_required_else_help = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build the signal index (forward + reverse-complement FM index)
    Index {
        /// Reference FASTA file
        reference: String,
        /// Output prefix for the index file
        #[arg(short, long, default_value = "ref")]
        output: String,
    },
    /// Map raw-signal reads against a signal index
    Map {
        /// Path to signal index (.fm)
        #[arg(short = 'i', long = "index")]
        index: String,
        /// Pore model table (kmer  level_mean  level_stdv)
        #[arg(short = 'm', long = "model")]
        model: String,
        /// Raw-signal reads file (`id<TAB>comma-separated samples` per line)
        reads: String,
        /// Output path (stdout if omitted)
        #[arg(short, long)]
        out: Option<String>,
        #[arg(long = "chunk-size", default_value_t = 4000)]
        chunk_size: usize,
        #[arg(long = "seed-len", default_value_t = 22)]
        seed_len: u8,
        #[arg(long = "max-paths", default_value_t = 10000)]
        max_paths: usize,
        #[arg(long = "max-consec-stay", default_value_t = 8)]
        max_consec_stay: u8,
        #[arg(long = "max-stay-frac", default_value_t = 0.5)]
        max_stay_frac: f32,
        #[arg(long = "min-seed-prob", default_value_t = -3.75)]
        min_seed_prob: f32,
        #[arg(long = "max-events", default_value_t = 30000)]
        max_events: u32,
        #[arg(long = "max-chunks", default_value_t = 10)]
        max_chunks: u32,
        #[arg(long = "min-aln-len", default_value_t = 25)]
        min_aln_len: u32,
        #[arg(short = 't', long = "threads", default_value_t = 1)]
        threads: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Index { reference, output } => run_index(&reference, &output),
        Commands::Map {
            index,
            model,
            reads,
            out,
            chunk_size,
            seed_len,
            max_paths,
            max_consec_stay,
            max_stay_frac,
            min_seed_prob,
            max_events,
            max_chunks,
            min_aln_len,
            threads,
        } => {
            let opts = MapOpts {
                seed_len,
                max_paths,
                max_consec_stay,
                max_stay_frac,
                min_seed_prob,
                max_events_proc: max_events,
                max_chunks_proc: max_chunks,
                min_aln_len,
                ..MapOpts::default()
            };
            run_map(&index, &model, &reads, out.as_deref(), opts, chunk_size, threads)
        }
    }
}

fn run_index(reference: &str, output: &str) -> Result<()> {
    let fh = std::fs::File::open(reference)
        .map_err(|e| anyhow::anyhow!("cannot open reference FASTA '{}': {}", reference, e))?;
    let buf = std::io::BufReader::new(fh);
    let mut reader = FastaReader::new(buf);

    let mut n_seqs = 0usize;
    let mut total_len = 0usize;
    let mut contigs: Vec<(String, Vec<u8>)> = Vec::new();

    while let Some(rec) = reader.next_record()? {
        n_seqs += 1;
        total_len += rec.seq.len();
        // 信号空间没有简并碱基：非 ACGT 一律折算为 A
        let codes: Vec<u8> = rec
            .seq
            .iter()
            .map(|&b| base_to_code(b).unwrap_or(0))
            .collect();
        contigs.push((rec.id, codes));
    }

    if n_seqs == 0 {
        anyhow::bail!("FASTA file '{}' contains no sequences", reference);
    }
    if total_len == 0 {
        anyhow::bail!("FASTA file '{}' contains only empty sequences", reference);
    }

    println!("reference: {}", reference);
    println!("sequences: {}", n_seqs);
    println!("total_len: {}", total_len);

    let mut fm = build_signal_index(&contigs, true, 512);
    fm.set_meta(IndexMeta {
        reference_file: Some(reference.to_string()),
        build_args: Some(std::env::args().collect::<Vec<_>>().join(" ")),
        build_timestamp: Some(chrono::Utc::now().to_rfc3339()),
    });

    let out_path = format!("{}.fm", output);
    fm.save_to_file(&out_path)
        .map_err(|e| anyhow::anyhow!("cannot write index to '{}': {}", out_path, e))?;
    println!("signal index saved: {}", out_path);
    Ok(())
}

fn run_map(
    index_path: &str,
    model_path: &str,
    reads_path: &str,
    out_path: Option<&str>,
    opts: MapOpts,
    chunk_size: usize,
    threads: usize,
) -> Result<()> {
    opts.validate()?;
    if chunk_size == 0 {
        anyhow::bail!("chunk size must be positive");
    }

    let fmi = Arc::new(FmIndex::load_from_file(index_path)?);
    let model = Arc::new(PoreModel::load_from_file(model_path)?);

    let fh = std::fs::File::open(reads_path)
        .map_err(|e| anyhow::anyhow!("cannot open reads file '{}': {}", reads_path, e))?;
    let mut reader = SignalReader::new(std::io::BufReader::new(fh));

    let mut out_box: Box<dyn std::io::Write> = if let Some(p) = out_path {
        Box::new(std::io::BufWriter::new(std::fs::File::create(p)?))
    } else {
        Box::new(std::io::BufWriter::new(std::io::stdout()))
    };

    // 设置 rayon 线程池
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .unwrap_or_else(|_| rayon::ThreadPoolBuilder::new().build().unwrap());

    // 批量读取 reads，每个工作线程持有自己的 Mapper（缓冲区较大，复用）
    let batch_size = 256;
    let mut read_no: u32 = 0;
    loop {
        let mut batch: Vec<(u32, SignalRecord)> = Vec::with_capacity(batch_size);
        for _ in 0..batch_size {
            match reader.next_record()? {
                Some(rec) => {
                    batch.push((read_no, rec));
                    read_no = read_no.wrapping_add(1);
                }
                None => break,
            }
        }
        if batch.is_empty() {
            break;
        }

        let fmi_ref = Arc::clone(&fmi);
        let model_ref = Arc::clone(&model);
        let results: Vec<String> = pool.install(|| {
            batch
                .par_iter()
                .map_init(
                    || Mapper::new(opts, Arc::clone(&model_ref), Arc::clone(&fmi_ref)),
                    |mapper, (number, rec)| map_read(mapper, *number, rec, chunk_size),
                )
                .collect()
        });

        for line in results {
            writeln!(out_box, "{}", line)?;
        }
    }

    Ok(())
}

/// 按分片驱动一条 read 的比对，返回一行结果。
fn map_read(mapper: &mut Mapper, number: u32, rec: &SignalRecord, chunk_size: usize) -> String {
    let mut chunks = rec.samples.chunks(chunk_size);
    let first: Vec<f32> = chunks.next().map(|c| c.to_vec()).unwrap_or_default();
    mapper.new_read(Chunk::new(rec.id.clone(), number, first));

    'outer: loop {
        mapper.process_chunk();
        while mapper.events_ready() {
            if mapper.map_chunk() {
                break 'outer;
            }
        }
        match chunks.next() {
            Some(c) => {
                let mut chunk = Chunk::new(rec.id.clone(), number, c.to_vec());
                mapper.swap_chunk(&mut chunk);
                if mapper.finished() {
                    break;
                }
            }
            None => {
                // 信号耗尽仍未定论：按 read 结束处理，下一步判负
                mapper.end_read(number);
                mapper.map_chunk();
                break;
            }
        }
    }

    let state = match mapper.get_state() {
        State::Success => "SUCCESS",
        State::Failure => "FAILURE",
        _ => "UNMAPPED",
    };
    let line = mapper.loc().to_tsv(&rec.id, state, mapper.event_index());
    mapper.deactivate();
    line
}
