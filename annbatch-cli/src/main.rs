//! # annbatch CLI
//!
//! Build and query nearest neighbor indexes from text matrices.
//!
//! ## Usage
//!
//! ```bash
//! # Build an index, one vector per line (whitespace or comma separated)
//! annbatch build --input vectors.txt --output vectors.idx --space cosine --threads 8
//!
//! # Query it, printing labels and distances per query line
//! annbatch query --index vectors.idx --input queries.txt --k 10 --distances
//!
//! # Show what an index holds
//! annbatch info --index vectors.idx
//! ```
//!
//! Index settings are written next to the index as `<index>.toml` so that
//! `query` and `info` can reopen it.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use annbatch_core::config::{Config, EngineKind, LogFormat, LoggingConfig, SpaceKind};
use annbatch_index::{AnnEngine, BatchIndex, FlatIndex, MatrixView, VamanaIndex};

#[derive(Parser)]
#[command(name = "annbatch")]
#[command(about = "Batch build and query approximate nearest neighbor indexes")]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// TOML configuration file
    #[arg(short, long, global = true, env = "ANNBATCH_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build an index from a text matrix
    Build {
        /// Input vectors, one per line
        #[arg(short, long)]
        input: PathBuf,

        /// Output index file
        #[arg(short, long)]
        output: PathBuf,

        #[arg(long, value_enum)]
        space: Option<SpaceArg>,

        #[arg(long, value_enum)]
        engine: Option<EngineArg>,

        /// Worker threads (0 = calling thread only)
        #[arg(short, long)]
        threads: Option<usize>,

        /// Minimum items per worker
        #[arg(long)]
        grain: Option<usize>,

        /// Capacity ceiling (defaults to the number of input vectors)
        #[arg(long)]
        max_elements: Option<usize>,

        /// Max out-degree per graph node
        #[arg(long)]
        m: Option<usize>,

        /// Search beam used while inserting
        #[arg(long)]
        ef_construction: Option<usize>,
    },
    /// Query an index with a text matrix
    Query {
        /// Index file written by `build`
        #[arg(long)]
        index: PathBuf,

        /// Query vectors, one per line
        #[arg(short, long)]
        input: PathBuf,

        /// Neighbors per query
        #[arg(short, long, default_value_t = 10)]
        k: usize,

        /// Print distances after the labels
        #[arg(long)]
        distances: bool,

        /// Search beam width
        #[arg(long)]
        ef: Option<usize>,

        /// Worker threads (0 = calling thread only)
        #[arg(short, long)]
        threads: Option<usize>,

        /// Pass queries to the index item-minor
        #[arg(long)]
        column_major: bool,
    },
    /// Print index metadata
    Info {
        #[arg(long)]
        index: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SpaceArg {
    L2,
    Euclidean,
    Cosine,
    Ip,
}

impl From<SpaceArg> for SpaceKind {
    fn from(arg: SpaceArg) -> Self {
        match arg {
            SpaceArg::L2 => SpaceKind::L2,
            SpaceArg::Euclidean => SpaceKind::Euclidean,
            SpaceArg::Cosine => SpaceKind::Cosine,
            SpaceArg::Ip => SpaceKind::InnerProduct,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum EngineArg {
    Flat,
    Vamana,
}

impl From<EngineArg> for EngineKind {
    fn from(arg: EngineArg) -> Self {
        match arg {
            EngineArg::Flat => EngineKind::Flat,
            EngineArg::Vamana => EngineKind::Vamana,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path).with_context(|| format!("loading {}", path.display()))?,
        None => Config::default(),
    };
    init_logging(&config.logging, cli.verbose);

    match cli.command {
        Commands::Build {
            input,
            output,
            space,
            engine,
            threads,
            grain,
            max_elements,
            m,
            ef_construction,
        } => {
            let matrix = read_matrix(&input)?;
            let mut config = config;
            config.index.dimension = matrix.ncols;
            config.index.max_elements = max_elements.unwrap_or(matrix.nrows);
            if let Some(space) = space {
                config.index.space = space.into();
            }
            if let Some(engine) = engine {
                config.index.engine = engine.into();
            }
            if let Some(threads) = threads {
                config.parallel.num_threads = threads;
            }
            if let Some(grain) = grain {
                config.parallel.grain_size = grain;
            }
            if let Some(m) = m {
                config.index.m = m;
            }
            if let Some(ef_construction) = ef_construction {
                config.index.ef_construction = ef_construction;
            }
            config.validate()?;

            let size = match config.index.engine {
                EngineKind::Flat => build::<FlatIndex>(&config, &matrix, &output)?,
                EngineKind::Vamana => build::<VamanaIndex>(&config, &matrix, &output)?,
            };
            config.save(meta_path(&output))?;
            println!(
                "Indexed {} vectors of dimension {} into {}",
                size,
                matrix.ncols,
                output.display()
            );
        }
        Commands::Query {
            index,
            input,
            k,
            distances,
            ef,
            threads,
            column_major,
        } => {
            let meta = read_meta(&index)?;
            let request = QueryRequest {
                queries: read_matrix(&input)?,
                k,
                distances,
                ef: ef.unwrap_or(meta.index.ef_search),
                threads: threads.unwrap_or(meta.parallel.num_threads),
                column_major,
            };
            let lines = match meta.index.engine {
                EngineKind::Flat => query::<FlatIndex>(&meta, &index, &request)?,
                EngineKind::Vamana => query::<VamanaIndex>(&meta, &index, &request)?,
            };
            for line in lines {
                println!("{}", line);
            }
        }
        Commands::Info { index } => {
            let meta = read_meta(&index)?;
            let (size, capacity) = match meta.index.engine {
                EngineKind::Flat => describe::<FlatIndex>(&meta, &index)?,
                EngineKind::Vamana => describe::<VamanaIndex>(&meta, &index)?,
            };
            println!("dimension: {}", meta.index.dimension);
            println!("space:     {:?}", meta.index.space);
            println!("engine:    {:?}", meta.index.engine);
            println!("items:     {}", size);
            println!("capacity:  {}", capacity);
        }
    }

    Ok(())
}

fn init_logging(logging: &LoggingConfig, verbose: bool) {
    let default = if verbose { "debug" } else { logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    match logging.format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

// ============================================================================
// Commands
// ============================================================================

struct QueryRequest {
    queries: TextMatrix,
    k: usize,
    distances: bool,
    ef: usize,
    threads: usize,
    column_major: bool,
}

fn build<E: AnnEngine>(config: &Config, matrix: &TextMatrix, output: &Path) -> Result<usize> {
    let mut index = BatchIndex::<E>::from_config(config)?;
    let view = MatrixView::row_major(&matrix.data, matrix.nrows, matrix.ncols)?;
    let labels = index.add_items(&view)?;
    index.save(output)?;

    let snap = index.metrics().snapshot();
    info!(
        items = snap.items_added,
        first_label = labels.start,
        last_label = labels.end - 1,
        "Build finished"
    );
    Ok(index.size())
}

fn query<E: AnnEngine>(meta: &Config, path: &Path, request: &QueryRequest) -> Result<Vec<String>> {
    let mut index = BatchIndex::<E>::load(path, meta.index.space, meta.index.dimension, None)?;
    index.set_ef(request.ef);
    index.set_num_threads(request.threads);
    index.set_grain_size(meta.parallel.grain_size);

    let queries = &request.queries;
    if queries.ncols != index.dimension() {
        bail!(
            "queries have dimension {}, index has dimension {}",
            queries.ncols,
            index.dimension()
        );
    }

    let transposed;
    let view = if request.column_major {
        transposed = queries.transposed();
        MatrixView::col_major(&transposed, queries.ncols, queries.nrows)?
    } else {
        MatrixView::row_major(&queries.data, queries.nrows, queries.ncols)?
    };

    let result = index.get_all_nns_list(&view, request.k, request.distances)?;
    let lines = (0..queries.nrows)
        .map(|q| {
            let mut fields: Vec<String> = result.items.item(q).iter().map(|l| l.to_string()).collect();
            if let Some(distances) = &result.distances {
                fields.extend(distances.item(q).iter().map(|d| d.to_string()));
            }
            fields.join("\t")
        })
        .collect();
    Ok(lines)
}

fn describe<E: AnnEngine>(meta: &Config, path: &Path) -> Result<(usize, usize)> {
    let index = BatchIndex::<E>::load(path, meta.index.space, meta.index.dimension, None)?;
    Ok((index.size(), index.capacity()))
}

// ============================================================================
// Files
// ============================================================================

/// Settings file stored alongside an index
fn meta_path(index: &Path) -> PathBuf {
    let mut name: OsString = index.as_os_str().to_owned();
    name.push(".toml");
    PathBuf::from(name)
}

fn read_meta(index: &Path) -> Result<Config> {
    let path = meta_path(index);
    Config::from_file(&path).with_context(|| format!("reading index settings {}", path.display()))
}

/// Dense matrix parsed from text, item-major
#[derive(Debug)]
struct TextMatrix {
    data: Vec<f32>,
    nrows: usize,
    ncols: usize,
}

impl TextMatrix {
    fn parse(text: &str) -> Result<Self> {
        let mut data = Vec::new();
        let mut ncols = 0;
        let mut nrows = 0;

        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let before = data.len();
            for field in line.split(|c: char| c == ',' || c.is_whitespace()).filter(|f| !f.is_empty()) {
                let value: f32 = field
                    .parse()
                    .with_context(|| format!("line {}: bad number {:?}", lineno + 1, field))?;
                data.push(value);
            }
            let width = data.len() - before;
            if nrows == 0 {
                ncols = width;
            } else if width != ncols {
                bail!("line {}: expected {} values, found {}", lineno + 1, ncols, width);
            }
            nrows += 1;
        }

        if nrows == 0 {
            bail!("no vectors found");
        }
        Ok(Self { data, nrows, ncols })
    }

    /// Item-minor copy of the data
    fn transposed(&self) -> Vec<f32> {
        let mut out = vec![0.0; self.data.len()];
        for i in 0..self.nrows {
            for j in 0..self.ncols {
                out[j * self.nrows + i] = self.data[i * self.ncols + j];
            }
        }
        out
    }
}

fn read_matrix(path: &Path) -> Result<TextMatrix> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    TextMatrix::parse(&text).with_context(|| format!("parsing {}", path.display()))
}
