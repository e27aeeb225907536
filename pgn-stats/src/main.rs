//! pgn-stats: opening statistics from PGN collections.
//!
//! - `import` streams PGN files into a JSON statistics snapshot, in
//!   resumable batches.
//! - `resolve` replays SAN moves from a position and prints them as UCI.
//! - `query` lists the moves stored for a position, best known first.
//!
//! Logging goes to stderr and is controlled by `RUST_LOG` (default `info`).
//! See [`config`] for the environment variables backing the defaults.

use std::path::{Path, PathBuf};

use anyhow::Context;
use chess::fen::normalized_fen;
use chess::pgn::{PromotionPolicy, ResolvedMove, ResolverOptions, SanResolver};
use chess::{Board, PieceColor};
use clap::{Args, Parser, Subcommand};
use opening_stats::{
    rank_moves, ImportConfig, ImportError, ImportSummary, Importer, JsonStatsStore, RankedMove,
    ResultPerspective, StatsStore,
};

mod config;

#[derive(Parser)]
#[command(name = "pgn-stats", about = "Opening statistics from PGN game collections")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay PGN files and add their move statistics to the store.
    Import(ImportArgs),
    /// Resolve SAN moves from a position and print them as UCI moves.
    Resolve {
        /// Starting position. Defaults to the standard initial position.
        #[arg(long)]
        fen: Option<String>,
        /// Place the promoted piece instead of keeping the pawn.
        #[arg(long)]
        apply_promotions: bool,
        #[arg(required = true)]
        moves: Vec<String>,
    },
    /// Show the stored moves for a position.
    Query {
        /// Statistics snapshot. Defaults to `PGN_STATS_STORE_PATH`.
        #[arg(long)]
        store: Option<PathBuf>,
        /// Position to look up. Defaults to the standard initial position.
        #[arg(long)]
        fen: Option<String>,
        /// Maximum number of moves to list.
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// How the store's counters were recorded.
        #[arg(long, default_value_t = ResultPerspective::Absolute)]
        perspective: ResultPerspective,
    },
}

#[derive(Args)]
struct ImportArgs {
    /// PGN files, imported in order.
    #[arg(required = true)]
    pgn: Vec<PathBuf>,
    /// Statistics snapshot. Defaults to `PGN_STATS_STORE_PATH`.
    #[arg(long)]
    store: Option<PathBuf>,
    /// Half-moves of each game to count.
    #[arg(long)]
    max_plies: Option<usize>,
    /// Games between two flushes to the store.
    #[arg(long)]
    batch_size: Option<u64>,
    /// Minimum games per batch for a (position, move) pair to be stored.
    #[arg(long)]
    min_games: Option<u64>,
    /// Byte offset to resume the first file from.
    #[arg(long, default_value_t = 0)]
    resume_offset: u64,
    /// Games to skip in the first file after the resume offset.
    #[arg(long, default_value_t = 0)]
    resume_skip: u64,
    /// Place promoted pieces on the board during replay.
    #[arg(long)]
    apply_promotions: bool,
    /// Count wins and losses for white (absolute) or for the moving side.
    #[arg(long, default_value_t = ResultPerspective::Absolute)]
    perspective: ResultPerspective,
}

impl ImportArgs {
    fn import_config(&self) -> ImportConfig {
        ImportConfig {
            max_plies: self.max_plies.unwrap_or_else(config::get_max_plies),
            batch_size: self.batch_size.unwrap_or_else(config::get_batch_size),
            min_games: self.min_games.unwrap_or_else(config::get_min_games),
            resume_byte_offset: self.resume_offset,
            resume_game_skip: self.resume_skip,
            promotion: promotion_policy(self.apply_promotions),
            perspective: self.perspective,
        }
    }
}

fn promotion_policy(apply: bool) -> PromotionPolicy {
    if apply {
        PromotionPolicy::Apply
    } else {
        PromotionPolicy::Legacy
    }
}

fn board_from(fen: Option<&str>) -> anyhow::Result<Board> {
    match fen {
        Some(fen) => Board::from_fen(fen).with_context(|| format!("invalid FEN '{fen}'")),
        None => Ok(Board::starting_position()),
    }
}

fn handle_import(args: ImportArgs) -> anyhow::Result<()> {
    let store_path = args.store.clone().unwrap_or_else(config::get_store_path);
    let mut store = JsonStatsStore::open(&store_path)
        .with_context(|| format!("failed to open store {}", store_path.display()))?;
    let base = args.import_config();
    tracing::info!(
        store = %store_path.display(),
        files = args.pgn.len(),
        max_plies = base.max_plies,
        batch_size = base.batch_size,
        min_games = base.min_games,
        perspective = %base.perspective,
        "starting import"
    );

    let mut total = ImportSummary::default();
    for (index, path) in args.pgn.iter().enumerate() {
        let config = if index == 0 {
            base
        } else {
            ImportConfig {
                resume_byte_offset: 0,
                resume_game_skip: 0,
                ..base
            }
        };
        let (summary, returned) = import_one(store, path, config)?;
        store = returned;

        println!(
            "{}: {} games ({} recorded, {} without result, {} failed), {} entries in {} batches",
            path.display(),
            summary.games_read,
            summary.games_recorded,
            summary.games_skipped,
            summary.games_failed,
            summary.entries_flushed,
            summary.batches
        );
        total.games_read += summary.games_read;
        total.games_recorded += summary.games_recorded;
        total.entries_flushed += summary.entries_flushed;
    }

    if args.pgn.len() > 1 {
        println!(
            "total: {} games ({} recorded), {} entries",
            total.games_read, total.games_recorded, total.entries_flushed
        );
    }
    Ok(())
}

fn import_one(
    store: JsonStatsStore,
    path: &Path,
    config: ImportConfig,
) -> anyhow::Result<(ImportSummary, JsonStatsStore)> {
    let mut importer = Importer::new(store, config);
    match importer.import_file(path) {
        Ok(summary) => Ok((summary, importer.into_store())),
        Err(ImportError::Flush { checkpoint, source }) => {
            tracing::error!(
                path = %path.display(),
                byte_offset = checkpoint.byte_offset,
                games_committed = checkpoint.games_committed,
                "batch flush failed; rerun this file with --resume-offset {}",
                checkpoint.byte_offset
            );
            Err(anyhow::Error::new(source)
                .context(format!("failed to flush statistics for {}", path.display())))
        }
        Err(e) => Err(e).with_context(|| format!("failed to import {}", path.display())),
    }
}

/// Replay `moves` from `fen` and return them with the final FEN.
fn resolve_moves(
    fen: Option<&str>,
    moves: &[String],
    promotion: PromotionPolicy,
) -> anyhow::Result<(Vec<ResolvedMove>, String)> {
    let mut board = board_from(fen)?;
    let resolver = SanResolver::new(ResolverOptions { promotion });
    let mut resolved = Vec::with_capacity(moves.len());
    for (ply, san) in moves.iter().enumerate() {
        let mv = resolver
            .resolve(&mut board, san)
            .with_context(|| format!("move {} ({san})", ply + 1))?;
        resolved.push(mv);
    }
    Ok((resolved, board.to_fen()))
}

/// Ranked moves stored for the position `fen`.
fn query_store(
    store: &impl StatsStore,
    fen: Option<&str>,
    perspective: ResultPerspective,
    limit: usize,
) -> anyhow::Result<Vec<RankedMove>> {
    let board = board_from(fen)?;
    let key = normalized_fen(&board);
    let entries = store
        .moves_for(&key)
        .with_context(|| format!("failed to read moves for '{key}'"))?;
    let side = match perspective {
        ResultPerspective::Absolute => board.side_to_move,
        ResultPerspective::Mover => PieceColor::White,
    };
    let mut ranked = rank_moves(&entries, side);
    ranked.truncate(limit);
    Ok(ranked)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Import(args) => handle_import(args)?,
        Commands::Resolve {
            fen,
            apply_promotions,
            moves,
        } => {
            let (resolved, final_fen) =
                resolve_moves(fen.as_deref(), &moves, promotion_policy(apply_promotions))?;
            for (san, mv) in moves.iter().zip(&resolved) {
                println!("{san}\t{mv}");
            }
            println!("{final_fen}");
        }
        Commands::Query {
            store,
            fen,
            limit,
            perspective,
        } => {
            let path = store.unwrap_or_else(config::get_store_path);
            let store = JsonStatsStore::open(&path)
                .with_context(|| format!("failed to open store {}", path.display()))?;
            let ranked = query_store(&store, fen.as_deref(), perspective, limit)?;
            if ranked.is_empty() {
                println!("no statistics for this position");
            }
            for mv in ranked {
                println!(
                    "{:<8} {:>8} games  +{} ={} -{}  {:>5.1}%",
                    mv.mv,
                    mv.outcomes.total(),
                    mv.outcomes.wins,
                    mv.outcomes.draws,
                    mv.outcomes.losses,
                    mv.score * 100.0
                );
            }
        }
    }

    Ok(())
}
