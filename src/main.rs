//! Command-line front end: argument parsing and human-readable
//! rendering only. All business logic lives in the library crate.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::warn;

use torrent_crab::batch::{self, BatchConfig};
use torrent_crab::metainfo::{self, CreateOptions};
use torrent_crab::modify::{self, FieldEdit, ModifyOptions};
use torrent_crab::presets::{self, PresetOptions};
use torrent_crab::progress::ProgressUpdate;
use torrent_crab::seasonpack;
use torrent_crab::verify::{self, VerifyOptions};
use torrent_crab::Error;

#[derive(Parser)]
#[command(name = "torrent-crab")]
#[command(about = "Create, verify, and rewrite BitTorrent v1 metainfo files")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a new .torrent from a file or directory.
    Create {
        path: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(short, long = "tracker")]
        trackers: Vec<String>,
        #[arg(long = "webseed")]
        webseeds: Vec<String>,
        #[arg(long)]
        private: bool,
        #[arg(long)]
        comment: Option<String>,
        #[arg(long)]
        source: Option<String>,
        #[arg(long)]
        entropy: bool,
        #[arg(long = "piece-length")]
        piece_length_exp: Option<u32>,
        #[arg(long = "max-piece-length")]
        max_piece_length_exp: Option<u32>,
        #[arg(long = "no-date")]
        no_date: bool,
        #[arg(long = "no-creator")]
        no_creator: bool,
        #[arg(long = "skip-prefix")]
        skip_prefix: bool,
        #[arg(long = "include")]
        include_patterns: Vec<String>,
        #[arg(long = "exclude")]
        exclude_patterns: Vec<String>,
        #[arg(long)]
        preset: Option<String>,
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Verify on-disk content against an existing .torrent.
    Verify {
        torrent: PathBuf,
        content: PathBuf,
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Rewrite fields of an existing .torrent without re-hashing.
    Modify {
        torrent: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(short, long = "tracker")]
        trackers: Option<Vec<String>>,
        #[arg(long = "webseed")]
        webseeds: Option<Vec<String>>,
        #[arg(long)]
        comment: Option<String>,
        #[arg(long = "clear-comment")]
        clear_comment: bool,
        #[arg(long)]
        private: Option<bool>,
        #[arg(long = "clear-private")]
        clear_private: bool,
        #[arg(long)]
        source: Option<String>,
        #[arg(long = "clear-source")]
        clear_source: bool,
        #[arg(long)]
        entropy: bool,
        #[arg(long = "clear-entropy")]
        clear_entropy: bool,
        #[arg(long = "no-date")]
        no_date: bool,
        #[arg(long = "no-creator")]
        no_creator: bool,
        #[arg(long = "skip-prefix")]
        skip_prefix: bool,
        #[arg(long = "dry-run")]
        dry_run: bool,
        #[arg(long)]
        preset: Option<String>,
    },
    /// Run a batch of create jobs from a YAML config.
    Batch {
        config: PathBuf,
        #[arg(long, default_value_t = batch::DEFAULT_CONCURRENCY)]
        concurrency: usize,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("torrent_crab=info")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.command {
        Command::Create {
            path,
            output,
            trackers,
            webseeds,
            private,
            comment,
            source,
            entropy,
            piece_length_exp,
            max_piece_length_exp,
            no_date,
            no_creator,
            skip_prefix,
            include_patterns,
            exclude_patterns,
            preset,
            workers,
        } => {
            let mut opts = CreateOptions {
                name: None,
                trackers,
                webseeds,
                private,
                source,
                entropy,
                comment,
                no_creator,
                no_date,
                piece_length_exp,
                max_piece_length_exp,
                include_patterns,
                exclude_patterns,
                skip_prefix,
                output_path: output,
                workers,
                progress: Some(Arc::new(render_progress)),
                cancel: Some(Arc::new(AtomicBool::new(false))),
            };

            if let Some(name) = &preset {
                match presets::load_from_search_path(None, "torrent-crab")? {
                    Some((path, file)) => {
                        let resolved = file.resolve(name)?;
                        warn!(preset = %name, file = %path.display(), "preset loaded (CLI flags above still take precedence)");
                        apply_preset_to_create(&mut opts, &resolved);
                    }
                    None => {
                        return Err(Error::InvalidInput(format!(
                            "preset {name:?} requested but no presets.yaml found"
                        ))
                        .into())
                    }
                }
            }

            let result = metainfo::create(&path, &opts)?;
            println!();
            println!("wrote {}", result.output_path.display());
            println!("info hash: {}", hex::encode(result.info_hash));

            if path.is_dir() {
                let names: Vec<String> = match &result.metainfo.info {
                    Some(torrent_crab::metainfo::InfoSource::Built(info)) => match &info.mode {
                        torrent_crab::metainfo::InfoMode::MultiFile { files } => files
                            .iter()
                            .filter_map(|f| f.path.last().cloned())
                            .collect(),
                        torrent_crab::metainfo::InfoMode::SingleFile { .. } => Vec::new(),
                    },
                    _ => Vec::new(),
                };
                let season_info = seasonpack::analyze(&path.to_string_lossy(), &names);
                if season_info.is_season_pack && season_info.is_suspicious {
                    warn!(
                        missing = ?season_info.missing_episodes,
                        "season pack looks incomplete"
                    );
                }
            }

            Ok(ExitCode::SUCCESS)
        }

        Command::Verify { torrent, content, workers } => {
            let data = std::fs::read(&torrent).map_err(|e| Error::io(&torrent, e))?;
            let opts = VerifyOptions {
                workers,
                progress: Some(Arc::new(render_progress)),
                cancel: None,
            };
            let report = verify::verify(&data, &content, &opts)?;

            println!(
                "{}/{} pieces good, {} bad, {} missing ({:.1}% complete)",
                report.good_pieces,
                report.total_pieces,
                report.bad_pieces,
                report.missing_pieces,
                report.completion_percent
            );
            if !report.missing_files.is_empty() {
                println!("missing files: {}", report.missing_files.join(", "));
            }
            for m in &report.mismatched_files {
                println!(
                    "{} (size mismatch: expected {}, found {})",
                    m.relative_path, m.expected_length, m.actual_length
                );
            }

            Ok(if report.has_problems() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            })
        }

        Command::Modify {
            torrent,
            output,
            trackers,
            webseeds,
            comment,
            clear_comment,
            private,
            clear_private,
            source,
            clear_source,
            entropy,
            clear_entropy,
            no_date,
            no_creator,
            skip_prefix,
            dry_run,
            preset,
        } => {
            let mut opts = ModifyOptions {
                trackers,
                webseeds,
                comment: field_edit(comment, clear_comment),
                private: field_edit(private, clear_private),
                source: field_edit(source, clear_source),
                entropy: if clear_entropy {
                    FieldEdit::Clear
                } else if entropy {
                    FieldEdit::Set(())
                } else {
                    FieldEdit::Unset
                },
                no_creator,
                no_date,
                output_path: output,
                output_prefix: None,
                skip_prefix,
                dry_run,
            };

            if let Some(name) = &preset {
                match presets::load_from_search_path(None, "torrent-crab")? {
                    Some((path, file)) => {
                        let resolved = file.resolve(name)?;
                        warn!(preset = %name, file = %path.display(), "preset loaded (CLI flags above still take precedence)");
                        apply_preset_to_modify(&mut opts, &resolved);
                        opts.output_prefix.get_or_insert_with(|| name.clone());
                    }
                    None => {
                        return Err(Error::InvalidInput(format!(
                            "preset {name:?} requested but no presets.yaml found"
                        ))
                        .into())
                    }
                }
            }

            let result = modify::modify(&torrent, &opts)?;
            println!("info hash: {}", hex::encode(result.info_hash));
            if result.info_hash_changed {
                println!("note: info hash changed (an info-level field was modified)");
            }
            if result.wrote {
                println!("wrote {}", result.output_path.display());
            } else {
                println!("dry run: would write {}", result.output_path.display());
            }

            Ok(ExitCode::SUCCESS)
        }

        Command::Batch { config, concurrency } => {
            let data = std::fs::read_to_string(&config).map_err(|e| Error::io(&config, e))?;
            let parsed = BatchConfig::parse(&data)?;
            let results = batch::run_batch(&parsed, concurrency);

            let mut any_failed = false;
            for result in &results {
                if result.success {
                    println!(
                        "[{}] ok: {} ({})",
                        result.index,
                        result.output.display(),
                        result
                            .info_hash
                            .map(hex::encode)
                            .unwrap_or_default()
                    );
                } else {
                    any_failed = true;
                    println!(
                        "[{}] failed: {} ({})",
                        result.index,
                        result.output.display(),
                        result.error.clone().unwrap_or_default()
                    );
                }
            }

            Ok(if any_failed { ExitCode::FAILURE } else { ExitCode::SUCCESS })
        }
    }
}

fn field_edit<T>(set: Option<T>, clear: bool) -> FieldEdit<T> {
    if clear {
        FieldEdit::Clear
    } else if let Some(v) = set {
        FieldEdit::Set(v)
    } else {
        FieldEdit::Unset
    }
}

/// Overlay a resolved preset onto CLI-parsed `CreateOptions`. CLI flags
/// win: a preset field is applied only where the corresponding flag is
/// still at its clap default (empty list, `false`, or `None`).
fn apply_preset_to_create(opts: &mut CreateOptions, preset: &PresetOptions) {
    if opts.trackers.is_empty() {
        if let Some(v) = &preset.trackers {
            opts.trackers = v.clone();
        }
    }
    if opts.webseeds.is_empty() {
        if let Some(v) = &preset.webseeds {
            opts.webseeds = v.clone();
        }
    }
    if !opts.private {
        if let Some(v) = preset.private {
            opts.private = v;
        }
    }
    if !opts.no_date {
        if let Some(v) = preset.no_date {
            opts.no_date = v;
        }
    }
    if !opts.no_creator {
        if let Some(v) = preset.no_creator {
            opts.no_creator = v;
        }
    }
    if !opts.skip_prefix {
        if let Some(v) = preset.skip_prefix {
            opts.skip_prefix = v;
        }
    }
    if !opts.entropy {
        if let Some(v) = preset.entropy {
            opts.entropy = v;
        }
    }
    if opts.comment.is_none() {
        opts.comment = preset.comment.clone();
    }
    if opts.source.is_none() {
        opts.source = preset.source.clone();
    }
    if opts.piece_length_exp.is_none() {
        opts.piece_length_exp = preset.piece_length;
    }
    if opts.max_piece_length_exp.is_none() {
        opts.max_piece_length_exp = preset.max_piece_length;
    }
    if opts.exclude_patterns.is_empty() {
        if let Some(v) = &preset.exclude_patterns {
            opts.exclude_patterns = v.clone();
        }
    }
    if opts.include_patterns.is_empty() {
        if let Some(v) = &preset.include_patterns {
            opts.include_patterns = v.clone();
        }
    }
}

/// Overlay a resolved preset onto CLI-parsed `ModifyOptions`, following
/// the same "CLI already touched it, leave it alone" precedence as
/// `apply_preset_to_create`. A field counts as CLI-touched when its
/// `FieldEdit` is no longer `Unset`, or its `Option` is no longer `None`.
fn apply_preset_to_modify(opts: &mut ModifyOptions, preset: &PresetOptions) {
    if opts.trackers.is_none() {
        opts.trackers = preset.trackers.clone();
    }
    if opts.webseeds.is_none() {
        opts.webseeds = preset.webseeds.clone();
    }
    if opts.comment == FieldEdit::Unset {
        if let Some(v) = &preset.comment {
            opts.comment = FieldEdit::Set(v.clone());
        }
    }
    if opts.private == FieldEdit::Unset {
        if let Some(v) = preset.private {
            opts.private = FieldEdit::Set(v);
        }
    }
    if opts.source == FieldEdit::Unset {
        if let Some(v) = &preset.source {
            opts.source = FieldEdit::Set(v.clone());
        }
    }
    if !opts.no_date {
        if let Some(v) = preset.no_date {
            opts.no_date = v;
        }
    }
    if !opts.no_creator {
        if let Some(v) = preset.no_creator {
            opts.no_creator = v;
        }
    }
    if !opts.skip_prefix {
        if let Some(v) = preset.skip_prefix {
            opts.skip_prefix = v;
        }
    }
}

fn render_progress(update: ProgressUpdate) {
    eprint!(
        "\rhashing: {}/{} pieces ({} KiB/s)   ",
        update.pieces_done,
        update.pieces_total,
        update.bytes_per_sec / 1024
    );
}
