use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::info;

use splice_psi::assemble::{read_splice_table, write_annotated, write_transcripts};
use splice_psi::io::{create_writer, open_bufread};
use splice_psi::psi::table::{write_leafcutter, write_rmats, write_spliser};
use splice_psi::{
    AnnotationBuilder, JoinOptions, LeafcutterSites, ParalogColumns, ParalogSet, PsiTable,
    RmatsSites, SiteIndex, SourceKind, SpliceTableAssembler, SpliserSites,
};

/// Build splice tables and annotate them with splice-site PSI.
#[derive(Parser, Debug)]
#[command(name = "splice-psi")]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Pick primary transcripts from a GTF and write the base splice table
    SpliceTable(SpliceTableArgs),

    /// Sum LeafCutter intron PSI per cluster boundary
    Leafcutter(ConvertArgs),

    /// Average rMATS event PSI per splice site across result directories
    Rmats(RmatsArgs),

    /// Average SpliSER SSE per site
    Spliser(ConvertArgs),

    /// Build a binary site index from a normalized PSI table
    Index(IndexArgs),

    /// Load a site index from disk and print summary stats
    Stats(StatsArgs),

    /// Append matched positions and PSI values to a splice table
    Annotate(AnnotateArgs),
}

#[derive(Args, Debug)]
struct SpliceTableArgs {
    /// Input annotation (.gtf or .gtf.gz)
    #[arg(long)]
    gtf: PathBuf,

    /// Tab-separated paralog export
    #[arg(long)]
    paralogs: PathBuf,

    /// Output splice table
    #[arg(long, short)]
    output: PathBuf,

    /// Only genes of this gene_type are considered
    #[arg(long, default_value = "protein_coding")]
    gene_type: String,

    /// Paralog table column holding the versioned gene id
    #[arg(long, default_value = "Gene stable ID version")]
    gene_id_column: String,

    /// Paralog table column holding the paralogue id
    #[arg(long, default_value = "Human paralogue gene stable ID")]
    paralog_column: String,
}

#[derive(Args, Debug)]
struct ConvertArgs {
    /// Tool output table (may be gzipped)
    #[arg(long, short)]
    input: PathBuf,

    /// Normalized CSV
    #[arg(long, short)]
    output: PathBuf,
}

#[derive(Args, Debug)]
struct RmatsArgs {
    /// Directory holding one rMATS output directory per comparison
    #[arg(long)]
    input_dir: PathBuf,

    /// Normalized CSV
    #[arg(long, short)]
    output: PathBuf,

    /// Worker threads (default: all cores)
    #[arg(long, short)]
    threads: Option<usize>,
}

#[derive(Args, Debug)]
struct IndexArgs {
    /// Tool the PSI table came from (leafcutter, rmats, spliser)
    #[arg(long, short)]
    source: SourceKind,

    /// Normalized CSV written by the matching subcommand
    #[arg(long)]
    psi: PathBuf,

    /// Output serialized index file
    #[arg(long, short)]
    output: PathBuf,
}

#[derive(Args, Debug)]
struct StatsArgs {
    /// Serialized index file
    #[arg(long, short)]
    index: PathBuf,
}

#[derive(Args, Debug)]
struct AnnotateArgs {
    /// Tool the PSI table came from (leafcutter, rmats, spliser)
    #[arg(long, short)]
    source: Option<SourceKind>,

    /// Normalized CSV written by the matching subcommand
    #[arg(long, conflicts_with = "index")]
    psi: Option<PathBuf>,

    /// Serialized index file instead of a CSV
    #[arg(long)]
    index: Option<PathBuf>,

    /// Base splice table
    #[arg(long)]
    splice_table: PathBuf,

    /// Annotated output table
    #[arg(long, short)]
    output: PathBuf,

    /// Worker threads (default: all cores)
    #[arg(long, short)]
    threads: Option<usize>,
}

fn join_options(threads: Option<usize>) -> JoinOptions {
    match threads {
        Some(threads) => JoinOptions { threads },
        None => JoinOptions::default(),
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.cmd {
        Command::SpliceTable(args) => {
            let columns = ParalogColumns {
                gene_id: args.gene_id_column,
                paralog_id: args.paralog_column,
            };
            let paralogs = ParalogSet::from_path(&args.paralogs, &columns)
                .with_context(|| format!("reading paralogs {}", args.paralogs.display()))?;
            info!("{} genes with annotated paralogs", paralogs.len());

            let model = AnnotationBuilder::new()
                .gene_type(&args.gene_type)
                .build_from_path(&args.gtf, &paralogs)
                .with_context(|| format!("building transcripts from {}", args.gtf.display()))?;

            let out = create_writer(&args.output)?;
            let n = write_transcripts(out, &model.transcripts)
                .with_context(|| format!("writing splice table {}", args.output.display()))?;
            model.summary.log("splice-table");
            info!("{n} of {} genes written to {}", model.n_genes, args.output.display());
        }

        Command::Leafcutter(args) => {
            let sites = LeafcutterSites::from_path(&args.input)
                .with_context(|| format!("reading LeafCutter PSI {}", args.input.display()))?;
            let n = write_leafcutter(create_writer(&args.output)?, &sites.clusters)
                .with_context(|| format!("writing {}", args.output.display()))?;
            sites.summary.log("leafcutter");
            info!("{n} cluster sites written to {}", args.output.display());
        }

        Command::Rmats(args) => {
            let threads = join_options(args.threads).threads;
            let rm = RmatsSites::from_parent_dir(&args.input_dir, threads)
                .with_context(|| format!("reading rMATS results under {}", args.input_dir.display()))?;
            if rm.directories.is_empty() {
                bail!("no usable rMATS result directory under {}", args.input_dir.display());
            }
            let n = write_rmats(create_writer(&args.output)?, &rm.sites)
                .with_context(|| format!("writing {}", args.output.display()))?;
            rm.summary.log("rmats");
            info!("{n} sites written to {}", args.output.display());
        }

        Command::Spliser(args) => {
            let sites = SpliserSites::from_path(&args.input)
                .with_context(|| format!("reading SpliSER table {}", args.input.display()))?;
            let n = write_spliser(create_writer(&args.output)?, &sites.sites)
                .with_context(|| format!("writing {}", args.output.display()))?;
            sites.summary.log("spliser");
            info!("{n} sites written to {}", args.output.display());
        }

        Command::Index(args) => {
            let idx = SiteIndex::from_source(&PsiTable::new(args.source, &args.psi))
                .with_context(|| format!("indexing {}", args.psi.display()))?;

            println!("{idx}");

            idx.save(&args.output)
                .with_context(|| format!("writing index to {}", args.output.display()))?;

            info!("Index written to {}", args.output.display());
        }

        Command::Stats(args) => {
            let idx = SiteIndex::load(&args.index)
                .with_context(|| format!("reading index {}", args.index.display()))?;
            println!("{idx}");
        }

        Command::Annotate(args) => {
            let idx = match (&args.index, &args.psi) {
                (Some(path), _) => {
                    let idx = SiteIndex::load(path)
                        .with_context(|| format!("reading index {}", path.display()))?;
                    if let Some(kind) = args.source {
                        if kind != idx.source {
                            bail!("index {} holds {} sites, not {kind}", path.display(), idx.source);
                        }
                    }
                    idx
                }
                (None, Some(path)) => {
                    let Some(kind) = args.source else {
                        bail!("--source is required with --psi");
                    };
                    SiteIndex::from_source(&PsiTable::new(kind, path))
                        .with_context(|| format!("reading PSI table {}", path.display()))?
                }
                (None, None) => bail!("one of --psi or --index is required"),
            };

            let rows = read_splice_table(open_bufread(&args.splice_table)?)
                .with_context(|| format!("reading splice table {}", args.splice_table.display()))?;

            let (annotated, summary) = SpliceTableAssembler::new(&idx)
                .with_options(join_options(args.threads))
                .annotate(&rows)?;

            write_annotated(create_writer(&args.output)?, &annotated)
                .with_context(|| format!("writing {}", args.output.display()))?;
            summary.log("annotate");
            info!("Annotated splice table written to {}", args.output.display());
        }
    }

    Ok(())
}
