use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use featix::{
    bookmarks::InMemoryBookmarks,
    histogram::{self, HistogramEngine},
    index::{
        self, build_gene_index, build_interval_index, build_variant_index, FilterSpec,
        IndexCollection, IndexWriterHandle, SearchEngine,
    },
    readers,
    reference::Reference,
    store::{FileStore, LocalFileStore},
    types::{FeatureFile, FeatureType, FileFormat, FileId, GeneContentMode, HistogramBucket},
    Config, Error,
};

#[derive(Parser)]
#[command(name = "featix", version)]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the feature index for a registered file
    Index {
        /// Reference metadata JSON (chromosomes + registered files)
        #[arg(long)]
        reference: PathBuf,
        #[arg(long)]
        file_id: FileId,
        /// Gene indexing mode: full or incremental
        #[arg(long, default_value = "full")]
        gene_mode: String,
    },
    /// Run a filtered search over registered files
    Search {
        #[arg(long)]
        reference: PathBuf,
        #[arg(long, value_delimiter = ',')]
        file_ids: Vec<FileId>,
        /// Filter specification as JSON; omitted means "everything"
        #[arg(long)]
        filter: Option<String>,
        /// Target feature type (variation, gene, mrna, exon, bed_feature)
        #[arg(long, default_value = "variation")]
        target: String,
    },
    /// Look up features by id/name prefix across a reference's gene files
    Features {
        #[arg(long)]
        reference: PathBuf,
        prefix: String,
    },
    /// Build (or load) the density histogram track of one chromosome
    Histogram {
        #[arg(long)]
        reference: PathBuf,
        #[arg(long)]
        file_id: FileId,
        #[arg(long)]
        chromosome: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.config;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    histogram::init_worker_pool(config.worker_threads)?;
    let store = Arc::new(LocalFileStore::new(config.data_dir.clone()));

    match cli.command {
        Command::Index {
            reference,
            file_id,
            gene_mode,
        } => {
            let reference = load_reference(&reference)?;
            let file = find_file(&reference, file_id)?;
            let mode = match gene_mode.as_str() {
                "full" => GeneContentMode::Full,
                "incremental" => GeneContentMode::Incremental,
                other => anyhow::bail!("unknown gene mode '{other}'"),
            };

            let chromosomes = reference.chromosome_map();
            let sink = IndexWriterHandle::create_or_open(&store.index_dir(&file))?;
            let records = readers::open_reader(&file)?;
            let stats = match file.format {
                FileFormat::Vcf => build_variant_index(
                    &file,
                    &chromosomes,
                    sink,
                    config.index_buffer_size,
                    records,
                )?,
                FileFormat::Gff | FileFormat::Gtf => build_gene_index(
                    &file,
                    &chromosomes,
                    sink,
                    config.index_buffer_size,
                    mode,
                    records,
                )?,
                FileFormat::Bed => build_interval_index(
                    &file,
                    &chromosomes,
                    sink,
                    config.index_buffer_size,
                    records,
                )?,
            };
            tracing::info!(
                file = file.id,
                indexed = stats.indexed,
                skipped = stats.skipped_unresolved + stats.skipped_ineligible,
                batches = stats.batches,
                "index build complete"
            );
        }

        Command::Search {
            reference,
            file_ids,
            filter,
            target,
        } => {
            let reference = load_reference(&reference)?;
            let files = file_ids
                .iter()
                .map(|id| find_file(&reference, *id))
                .collect::<featix::Result<Vec<_>>>()?;
            let spec: FilterSpec = match filter {
                Some(json) => serde_json::from_str(&json)?,
                None => FilterSpec::default(),
            };
            let target = FeatureType::from_index_value(&target)
                .ok_or_else(|| Error::InvalidFilter(format!("unknown feature type '{target}'")))?;

            let engine = SearchEngine::new(store, config.max_search_results);
            let result = engine.search(&files, &spec, target)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }

        Command::Features { reference, prefix } => {
            let reference = load_reference(&reference)?;
            let engine = SearchEngine::new(store, config.max_search_results);
            // the CLI carries no saved bookmarks
            let bookmarks = InMemoryBookmarks::new();
            let result = engine.search_features_by_reference(&prefix, &reference, &bookmarks)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }

        Command::Histogram {
            reference,
            file_id,
            chromosome,
        } => {
            let reference = load_reference(&reference)?;
            let file = find_file(&reference, file_id)?;
            let chromosome = reference
                .chromosome_by_name(&chromosome)
                .cloned()
                .ok_or_else(|| Error::NotFound(format!("chromosome {chromosome}")))?;

            let engine = HistogramEngine::new(store.clone());
            let compute_store = store.clone();
            let compute = move |file: &FeatureFile,
                                chromosome: &featix::types::Chromosome,
                                slice: &[(u64, u64)]| {
                density_slice(compute_store.as_ref(), file, chromosome, slice)
            };
            let buckets = engine.load_or_build(&file, &chromosome, &compute)?;
            println!("{}", serde_json::to_string_pretty(&buckets)?);
        }
    }

    Ok(())
}

fn load_reference(path: &std::path::Path) -> anyhow::Result<Reference> {
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn find_file(reference: &Reference, id: FileId) -> featix::Result<FeatureFile> {
    reference
        .gene_file
        .iter()
        .chain(reference.annotation_files.iter())
        .find(|f| f.id == id)
        .cloned()
        .ok_or_else(|| Error::NotFound(format!("file {id} in reference {}", reference.name)))
}

/// Bucket values for one interval slice: features overlapping each bucket,
/// counted from the file's index.
fn density_slice(
    store: &dyn FileStore,
    file: &FeatureFile,
    chromosome: &featix::types::Chromosome,
    slice: &[(u64, u64)],
) -> featix::Result<Vec<HistogramBucket>> {
    let collection = IndexCollection::open(&[store.index_dir(file)])?;
    let mut buckets = Vec::with_capacity(slice.len());
    for &(start, end) in slice {
        let query = index::filter::interval_query(collection.schema(), chromosome.id, start, end, &[]);
        let count = collection.count(&*query)?;
        buckets.push(HistogramBucket {
            start_index: start,
            end_index: end,
            value: count as f32,
        });
    }
    Ok(buckets)
}
