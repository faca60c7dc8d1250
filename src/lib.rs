pub mod error;
pub mod params;

pub mod align;
pub mod chimeric;
pub mod genome;
pub mod index;
pub mod io;
pub mod junction;
pub mod stats;

use log::info;
use rayon::prelude::*;

use crate::align::{JunctionSet, ReadAligner, ReadResult};
use crate::index::GenomeIndex;
use crate::io::{output_path, ReadRecord, ReadSource, ResultWriter};
use crate::junction::NovelJunctionCounter;
use crate::params::{OutFilterType, Parameters, RunMode};
use crate::stats::AlignmentStats;

/// Reads handed to the worker pool at a time.
const BATCH_SIZE: usize = 10_000;

/// Chunks per worker thread within a batch.
const CHUNKS_PER_THREAD: usize = 4;

/// Top-level dispatcher. Called from `main()` after CLI parsing.
pub fn run(params: &Parameters) -> anyhow::Result<()> {
    params.validate()?;

    info!("rustar v{}", env!("CARGO_PKG_VERSION"));
    info!("runMode: {}", params.run_mode);
    info!("runThreadN: {}", params.run_thread_n);

    match params.run_mode {
        RunMode::GenomeGenerate => genome_generate(params),
        RunMode::AlignReads => align_reads(params),
    }
}

fn genome_generate(params: &Parameters) -> anyhow::Result<()> {
    info!("genomeDir: {}", params.genome_dir.display());
    info!(
        "genomeFastaFiles: {:?}",
        params
            .genome_fasta_files
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
    );

    info!("Building genome index...");
    let index = index::build::genome_generate(params)?;
    info!(
        "Genome generation complete: {} chromosomes, {} suffixes, {} annotated junctions",
        index.genome.n_chr(),
        index.suffix_array.len(),
        index.sjdb.len()
    );
    Ok(())
}

fn align_reads(params: &Parameters) -> anyhow::Result<()> {
    info!("genomeDir: {}", params.genome_dir.display());
    info!(
        "readFilesIn: {:?}",
        params
            .read_files_in
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
    );

    let index = GenomeIndex::load(&params.genome_dir, params.genome_load)?;
    let params = params.resolved_for(&index.header);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(params.run_thread_n)
        .build()?;

    let mut source = ReadSource::open(&params.read_files_in, params.read_files_command.as_deref())?;
    let mut writer = ResultWriter::create(&params)?;
    let mut stats = AlignmentStats::new();

    let by_sj = params.out_filter_type == OutFilterType::BySJout;
    let mut held: Vec<ReadRecord> = Vec::new();
    let mut junctions = NovelJunctionCounter::new();

    let mut remaining = u64::try_from(params.read_map_number).unwrap_or(u64::MAX);
    while remaining > 0 {
        let want = remaining.min(BATCH_SIZE as u64) as usize;
        let batch = source.read_batch(want)?;
        if batch.is_empty() {
            break;
        }
        remaining -= batch.len() as u64;

        let results = pool.install(|| align_batch(&index, &params, None, &batch));
        for (record, result) in batch.into_iter().zip(results) {
            if by_sj {
                if result.class.is_mapped() {
                    junctions.record(result.class, &result.transcripts);
                }
                if result.has_novel_junctions() {
                    held.push(record);
                    continue;
                }
            }
            stats.record(&result);
            writer.write(&result, &index.genome)?;
        }
    }

    if by_sj {
        let approved = junctions.approved(&params);
        info!(
            "Junction filter: {} of {} novel junctions approved, re-mapping {} reads",
            approved.len(),
            junctions.len(),
            held.len()
        );
        for chunk in held.chunks(BATCH_SIZE) {
            let results = pool.install(|| align_batch(&index, &params, Some(&approved), chunk));
            for result in &results {
                stats.record(result);
                writer.write(result, &index.genome)?;
            }
        }
    }

    writer.finish()?;
    stats.print_summary();
    stats.write_final_log(&output_path(&params.out_file_name_prefix, "Log.final.out"))?;
    info!("Alignment complete!");
    Ok(())
}

/// Align a batch on the current pool, results in input order.
///
/// The batch is cut into a few chunks per worker; each chunk gets one
/// aligner so scratch buffers are allocated once per chunk.
fn align_batch(
    index: &GenomeIndex,
    params: &Parameters,
    approved: Option<&JunctionSet>,
    batch: &[ReadRecord],
) -> Vec<ReadResult> {
    let chunk_size = batch
        .len()
        .div_ceil(rayon::current_num_threads() * CHUNKS_PER_THREAD)
        .max(1);
    batch
        .par_chunks(chunk_size)
        .flat_map_iter(|chunk| {
            let mut aligner = ReadAligner::new(index, params);
            if let Some(set) = approved {
                aligner = aligner.with_approved_junctions(set);
            }
            chunk
                .iter()
                .map(|record| aligner.align(&record.name, &record.mate_slices()))
                .collect::<Vec<_>>()
        })
        .collect()
}
