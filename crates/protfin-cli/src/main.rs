use anyhow::Context;
use clap::{Parser, Subcommand};
use protfin_lib::builder::{FastaSource, SequenceSource};
use protfin_lib::constants::{
    DEFAULT_DELTA_BITS, DEFAULT_FREQUENCY_BITS, DEFAULT_LOWER_QUANTILE, DEFAULT_MAX_PAIR_DISTANCE,
    DEFAULT_N_PEAKS, DEFAULT_OVERLAP, DEFAULT_UPPER_QUANTILE, DEFAULT_WINDOW_SIZE,
};
use protfin_lib::kidera::DEFAULT_KIDERA_FACTOR;
use protfin_lib::{
    BuildConfiguration, Database, DatabaseBuilder, FeatureMapper, FingerprintConfig, Matcher,
    OccurrencePolicy, PeakPolicy, QuantileReference, RankingPolicy, ResultSink, TextSink,
};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "protfin")]
#[command(version = "0.1.0")]
#[command(about = "protfin: spectral fingerprints of protein sequences", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Parameters shared by everything that maps residues to a signal
#[derive(clap::Args)]
struct SignalArgs {
    /// Kidera factor used as signal (0-9)
    #[arg(long, default_value_t = DEFAULT_KIDERA_FACTOR)]
    kidera_factor: usize,

    /// Keep the raw factor values instead of shifting them to non-negatives
    #[arg(long)]
    no_normalize: bool,
}

/// Fingerprinting parameters of a database build
#[derive(clap::Args)]
struct FingerprintArgs {
    /// Residues per analysis window
    #[arg(short = 'w', long, default_value_t = DEFAULT_WINDOW_SIZE)]
    window_size: usize,

    /// Residues shared by consecutive windows
    #[arg(long, default_value_t = DEFAULT_OVERLAP)]
    overlap: usize,

    /// Landmarks per window (0 = all)
    #[arg(short = 'n', long, default_value_t = DEFAULT_N_PEAKS)]
    n_peaks: usize,

    /// Landmark selection: prominence or quantile
    #[arg(long, default_value = "prominence")]
    peak_policy: PeakPolicy,

    /// Lower significance quantile (quantile policy)
    #[arg(long, default_value_t = DEFAULT_LOWER_QUANTILE)]
    lower: f64,

    /// Upper significance quantile (quantile policy)
    #[arg(long, default_value_t = DEFAULT_UPPER_QUANTILE)]
    upper: f64,

    #[command(flatten)]
    signal: SignalArgs,

    /// Pack the Kidera factor id into every fingerprint
    #[arg(long)]
    factor_discriminator: bool,

    /// Pack the significance bands of both landmarks (quantile policy)
    #[arg(long)]
    band_flags: bool,

    /// Largest window distance between paired landmarks
    #[arg(long, default_value_t = DEFAULT_MAX_PAIR_DISTANCE)]
    max_pair_distance: u32,

    /// Bits per frequency field
    #[arg(long, default_value_t = DEFAULT_FREQUENCY_BITS)]
    frequency_bits: u8,

    /// Bits of the window distance field
    #[arg(long, default_value_t = DEFAULT_DELTA_BITS)]
    delta_bits: u8,

    /// Occurrences kept per hash and sequence: first or all
    #[arg(long, default_value = "first")]
    occurrence_policy: OccurrencePolicy,
}

impl FingerprintArgs {
    fn to_config(&self) -> FingerprintConfig {
        FingerprintConfig {
            window_size: self.window_size,
            overlap: self.overlap,
            n_peaks: self.n_peaks,
            peak_policy: self.peak_policy,
            lower_quantile: self.lower,
            upper_quantile: self.upper,
            kidera_factor: self.signal.kidera_factor,
            normalize: !self.signal.no_normalize,
            factor_discriminator: self.factor_discriminator,
            band_flags: self.band_flags,
            max_pair_distance: self.max_pair_distance,
            frequency_bits: self.frequency_bits,
            delta_bits: self.delta_bits,
            occurrence_policy: self.occurrence_policy,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Build a fingerprint database from a protein FASTA file
    Build {
        /// Input FASTA file (optionally gzipped)
        #[arg(short, long)]
        input: String,

        /// Output database base path (default: input file stem)
        #[arg(short, long)]
        output: Option<String>,

        #[command(flatten)]
        fingerprint: FingerprintArgs,

        /// Quantile reference JSON (required by the quantile policy)
        #[arg(long)]
        reference: Option<String>,

        /// Number of threads (0 = all available cores)
        #[arg(short = 't', long, default_value = "0")]
        threads: usize,

        /// Number of corpus partitions (0 = one per thread)
        #[arg(long, default_value = "0")]
        partitions: usize,

        /// Largest index size per corpus byte (0 = unlimited)
        #[arg(long, default_value = "6.0")]
        max_index_ratio: f64,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Match query proteins against a database
    Query {
        /// Database file
        #[arg(short, long)]
        database: String,

        /// Query FASTA file
        #[arg(short, long)]
        query: String,

        /// List every candidate, not only the top matches
        #[arg(long)]
        all: bool,

        /// Ranking: jaccard or alignment
        #[arg(long, default_value = "jaccard")]
        ranking: RankingPolicy,
    },

    /// Print fingerprint statistics of a database as CSV
    Stats {
        /// Database file
        #[arg(short, long)]
        database: String,

        /// Sequences per fingerprint instead of fingerprints per sequence
        #[arg(long)]
        per_hash: bool,
    },

    /// Learn a per-bin quantile reference from a protein corpus
    LearnReference {
        /// Input FASTA file (optionally gzipped)
        #[arg(short, long)]
        input: String,

        /// Output JSON file
        #[arg(short, long)]
        output: String,

        /// Residues per analysis window
        #[arg(short = 'w', long, default_value_t = DEFAULT_WINDOW_SIZE)]
        window_size: usize,

        /// Lower significance quantile
        #[arg(long, default_value_t = DEFAULT_LOWER_QUANTILE)]
        lower: f64,

        /// Upper significance quantile
        #[arg(long, default_value_t = DEFAULT_UPPER_QUANTILE)]
        upper: f64,

        #[command(flatten)]
        signal: SignalArgs,
    },
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing: use RUST_LOG if set, otherwise default to info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            input,
            output,
            fingerprint,
            reference,
            threads,
            partitions,
            max_index_ratio,
            verbose,
        } => {
            let mut config = BuildConfiguration::new(fingerprint.to_config())?;
            config.num_threads = threads;
            config.num_partitions = partitions;
            config.max_index_ratio = (max_index_ratio > 0.0).then_some(max_index_ratio);
            config.verbose = verbose;
            build_command(&input, output, config, reference.as_deref())?;
        }
        Commands::Query { database, query, all, ranking } => {
            query_command(&database, &query, all, ranking)?;
        }
        Commands::Stats { database, per_hash } => {
            stats_command(&database, per_hash)?;
        }
        Commands::LearnReference { input, output, window_size, lower, upper, signal } => {
            learn_reference_command(&input, &output, window_size, lower, upper, &signal)?;
        }
    }

    Ok(())
}

/// Build a database from FASTA input
fn build_command(
    input: &str,
    output: Option<String>,
    config: BuildConfiguration,
    reference: Option<&str>,
) -> anyhow::Result<()> {
    info!("Building protfin database...");
    info!("  Input: {}", input);

    let mut builder = DatabaseBuilder::new(config)?;
    if let Some(path) = reference {
        let reference = QuantileReference::from_json_file(path)
            .with_context(|| format!("Failed to load quantile reference {}", path))?;
        info!("  Quantile reference: {} ({} bins)", path, reference.bins.len());
        builder = builder.with_reference(Arc::new(reference));
    }

    let mut source = FastaSource::open(input)?;
    let (database, report) = builder.build_from_source(&mut source)?;

    for failure in &report.failures {
        warn!("Skipped sequence {} ({}): {}", failure.sequence, failure.name, failure.error);
    }
    info!(
        "Indexed {}/{} sequences in {} partitions (corpus {} bytes, index ~{} bytes)",
        report.num_indexed,
        report.num_sequences,
        report.num_partitions,
        report.corpus_bytes,
        report.projected_bytes
    );

    let output = match output {
        Some(output) => output,
        None => Path::new(input)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .map(String::from)
            .context("Cannot derive an output name from the input path, use --output")?,
    };
    database.save(&output)?;
    database.print_stats();

    info!("Database built successfully!");
    Ok(())
}

/// Match every query of a FASTA file and print the text report
fn query_command(
    database: &str,
    query: &str,
    all: bool,
    ranking: RankingPolicy,
) -> anyhow::Result<()> {
    info!("Loading database from {}...", database);
    let database = Database::load(database)
        .with_context(|| format!("Failed to load database {}", database))?;

    let queries = FastaSource::open(query)?.read_all()?;
    info!("Matching {} queries (ranking by {})...", queries.len(), ranking);

    let matcher = Matcher::new(&database)?.with_ranking(ranking);
    let results = matcher.match_batch(&queries);

    let stdout = std::io::stdout();
    let mut sink = TextSink::new(BufWriter::new(stdout.lock()), &database).with_all_candidates(all);
    let mut failed = 0usize;
    for (record, result) in queries.iter().zip(results) {
        match result {
            Ok(result) => sink.accept(record, &result)?,
            Err(e) => {
                warn!("Query {} failed: {}", record.id, e);
                failed += 1;
            }
        }
    }
    sink.into_inner().flush()?;

    if failed > 0 {
        warn!("{} of {} queries failed", failed, queries.len());
    }
    Ok(())
}

/// Print per-sequence or per-hash counts as CSV
fn stats_command(database: &str, per_hash: bool) -> anyhow::Result<()> {
    let database = Database::load(database)
        .with_context(|| format!("Failed to load database {}", database))?;
    database.print_stats();

    let stdout = std::io::stdout();
    write_stats(&database, per_hash, BufWriter::new(stdout.lock()))
}

/// Write the statistics table, quoting fields where CSV needs it
fn write_stats<W: Write>(database: &Database, per_hash: bool, writer: W) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    if per_hash {
        wtr.write_record(["hash", "sequences"])?;
        for (hash, count) in database.sequences_per_hash() {
            wtr.write_record([hash.to_string(), count.to_string()])?;
        }
    } else {
        wtr.write_record(["id", "name", "length", "fingerprints"])?;
        for (id, entry) in database.sequences() {
            wtr.write_record([
                id.to_string(),
                entry.name.clone(),
                entry.length.to_string(),
                entry.fingerprint_count.to_string(),
            ])?;
        }
    }
    wtr.flush()?;
    Ok(())
}

/// Learn a quantile reference and write it as JSON
fn learn_reference_command(
    input: &str,
    output: &str,
    window_size: usize,
    lower: f64,
    upper: f64,
    signal: &SignalArgs,
) -> anyhow::Result<()> {
    info!("Learning quantile reference from {}...", input);
    let mapper = FeatureMapper::new(signal.kidera_factor, !signal.no_normalize)?;

    let records = FastaSource::open(input)?.read_all()?;
    let vectors: Vec<Vec<f32>> = records.iter().map(|r| mapper.map(&r.residues)).collect();
    let reference =
        QuantileReference::learn(vectors.iter().map(Vec::as_slice), window_size, lower, upper)?;

    reference.to_json_file(output)?;
    info!(
        "Wrote quantile reference for {} bins ({} sequences) to {}",
        reference.bins.len(),
        records.len(),
        output
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use protfin_lib::builder::MemorySource;

    fn database() -> Database {
        let config = BuildConfiguration {
            num_threads: 1,
            max_index_ratio: None,
            verbose: false,
            ..BuildConfiguration::default()
        };
        let mut source = MemorySource::from_pairs([
            ("sp|P1|plain", "MKTAYIAKQRQISFVKSHFSRQLEERLGLIEVQAPILSRVGDGTQDNLSGAEKAVQV"),
            ("odd,\"name\"", "MVLSPADKTNVKAAWGKVGAHAGEYGAEALERMFLSFPTTKTYFPHFDLSHGSAQ"),
        ]);
        let (database, _) = DatabaseBuilder::new(config).unwrap().build_from_source(&mut source).unwrap();
        database
    }

    #[test]
    fn test_stats_csv_quotes_names() {
        let database = database();
        let mut out = Vec::new();
        write_stats(&database, false, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "id,name,length,fingerprints");
        assert!(lines[1].starts_with("0,sp|P1|plain,"));
        assert!(lines[2].starts_with("1,\"odd,\"\"name\"\"\","));
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_stats_csv_per_hash() {
        let database = database();
        let mut out = Vec::new();
        write_stats(&database, true, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("hash,sequences\n"));
        assert_eq!(text.lines().count(), database.num_hashes() + 1);
    }
}
