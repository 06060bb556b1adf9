use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use wordforest::config;
use wordforest::{
    default_index_path, open_embeddings, BuildOptions, BuildOutcome, BuildPipeline, ForestParams,
    QueryOptions, WordIndex,
};

#[derive(Parser)]
#[command(name = "wordforest", about = "Nearest-neighbor search over word embeddings")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build an index from an embeddings file
    Build {
        /// Embeddings file (plaintext, or word2vec binary with a .bin extension)
        #[arg(short, long)]
        embeddings: PathBuf,

        /// Number of partition trees
        #[arg(short = 't', long, default_value_t = config::DEFAULT_NUM_TREES)]
        num_trees: usize,

        /// Index directory (default: <embeddings>.index)
        #[arg(short, long)]
        index: Option<PathBuf>,

        /// Maximum ids per leaf (default: derived from the collection size)
        #[arg(long)]
        leaf_capacity: Option<usize>,

        /// Base seed for tree construction
        #[arg(long, default_value_t = config::DEFAULT_SEED)]
        seed: u64,

        /// Worker threads for tree construction (default: all cores)
        #[arg(long)]
        threads: Option<usize>,

        /// Rebuild even if a complete index exists
        #[arg(short, long, default_value_t = false)]
        force: bool,

        /// Log progress
        #[arg(short, long, default_value_t = false)]
        verbose: bool,
    },

    /// Print the nearest tokens to a token as a JSON array
    Query {
        /// Query token
        #[arg(short = 'w', long)]
        token: String,

        /// Number of results
        #[arg(short = 'k', long, default_value_t = config::DEFAULT_NUM_RESULTS)]
        num_results: usize,

        /// Index directory
        #[arg(short, long, conflicts_with = "embeddings")]
        index: Option<PathBuf>,

        /// Embeddings file the index was built from; locates <embeddings>.index
        #[arg(short, long)]
        embeddings: Option<PathBuf>,

        /// Candidate pool size (default: num_results * num_trees)
        #[arg(long)]
        search_k: Option<usize>,

        /// Leave the query token out of the results
        #[arg(long, default_value_t = false)]
        exclude_self: bool,

        /// Include ids and distances in the output
        #[arg(short, long, default_value_t = false)]
        verbose: bool,
    },
}

impl Command {
    fn verbose(&self) -> bool {
        match self {
            Command::Build { verbose, .. } | Command::Query { verbose, .. } => *verbose,
        }
    }
}

fn init_tracing(verbose: bool) -> anyhow::Result<()> {
    let level = if verbose { "wordforest=debug" } else { "wordforest=warn" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.parse()?))
        .init();
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.command.verbose())?;

    match args.command {
        Command::Build {
            embeddings,
            num_trees,
            index,
            leaf_capacity,
            seed,
            threads,
            force,
            verbose,
        } => {
            let index = index.unwrap_or_else(|| default_index_path(&embeddings));
            let options = BuildOptions {
                forest: ForestParams {
                    num_trees,
                    leaf_capacity,
                    seed,
                    num_threads: threads,
                    ..ForestParams::default()
                },
                verbose,
            };
            let pipeline = BuildPipeline::new(&index, options);

            if !force {
                if let Some(manifest) = pipeline.existing_manifest()? {
                    eprintln!(
                        "index {} already built ({} tokens); use --force to rebuild",
                        index.display(),
                        manifest.count
                    );
                    return Ok(());
                }
            }

            let source = open_embeddings(&embeddings)
                .with_context(|| format!("opening {}", embeddings.display()))?;
            let stats = if force {
                pipeline.rebuild(source)
            } else {
                match pipeline.build(source)? {
                    BuildOutcome::Built(stats) => Ok(stats),
                    BuildOutcome::AlreadyBuilt(_) => return Ok(()),
                }
            }
            .with_context(|| format!("building {}", index.display()))?;

            eprintln!(
                "indexed {} tokens (dim {}) into {} trees at {} in {:.2?}",
                stats.count,
                stats.dimension,
                stats.num_trees,
                index.display(),
                stats.elapsed
            );
        }

        Command::Query {
            token,
            num_results,
            index,
            embeddings,
            search_k,
            exclude_self,
            verbose,
        } => {
            let index = match (index, embeddings) {
                (Some(index), _) => index,
                (None, Some(embeddings)) => default_index_path(&embeddings),
                (None, None) => bail!("either --index or --embeddings is required"),
            };
            let loaded = WordIndex::open(&index)
                .with_context(|| format!("opening index {}", index.display()))?;
            let options = QueryOptions {
                search_k,
                exclude_self,
            };
            let neighbors = loaded.query_with(&token, num_results, &options)?;

            let out = if verbose {
                serde_json::to_string_pretty(&neighbors)?
            } else {
                let tokens: Vec<&str> = neighbors.iter().map(|n| n.token.as_str()).collect();
                serde_json::to_string(&tokens)?
            };
            println!("{out}");
        }
    }
    Ok(())
}
