use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use officepatch_core::{PatchConfig, PatchOptions, ops};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "officepatch")]
#[command(about = "Surgical patching of OOXML documents: queries, links, chart caches", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to configuration file (TOML)
    #[arg(short, long, value_name = "CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Skip the timestamped backup before destructive operations
    #[arg(long, global = true)]
    no_backup: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract M query definitions from a document's datamashup
    ExtractQueries {
        /// Document to read (xlsx/pptx)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Directory to write the .m files into
        #[arg(short, long, value_name = "DIR")]
        out: Option<PathBuf>,
    },

    /// Update a document's datamashup from edited .m files
    UpdateQueries {
        /// Document to patch
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Replacement .m files, matched by base file name
        #[arg(value_name = "M_FILE", num_args = 1.., required = true)]
        queries: Vec<PathBuf>,
    },

    /// Rewrite absolute link targets in relationship parts
    RetargetLinks {
        /// Presentation to patch
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Path currently referenced by the links
        #[arg(short, long, value_name = "PATH")]
        search: String,

        /// Path the links should reference instead
        #[arg(short, long, value_name = "PATH")]
        replace: String,
    },

    /// Toggle the update-links popup (link auto-update flags)
    TogglePopup {
        /// Presentation to patch
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Enable automatic update (shows the popup on open)
        #[arg(long)]
        auto_update: bool,
    },

    /// Sync chart data caches from their embedded workbooks
    SyncCaches {
        /// Presentation to patch
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Extract every entry of a document to a directory tree
    Explode {
        /// Document to extract
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Target directory (default: `tmp` next to the document)
        #[arg(short, long, value_name = "DIR")]
        out: Option<PathBuf>,
    },

    /// Rebuild a document from an exploded directory tree
    Repack {
        /// Directory tree to pack
        #[arg(value_name = "DIR")]
        dir: PathBuf,

        /// Document to write
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli)?;
    let mut options = config.options();
    if cli.no_backup {
        options = PatchOptions::without_backup();
    }

    match cli.command {
        Command::ExtractQueries { file, out } => {
            let out_dir = out
                .or_else(|| config.queries.output_dir.clone())
                .unwrap_or_else(|| PathBuf::from("."));
            let count = ops::queries::extract(&file, &out_dir)
                .with_context(|| format!("Failed to extract queries from {}", file.display()))?;
            println!(
                "{} Extracted {} query file(s) to {}",
                "✓".green(),
                count,
                out_dir.display()
            );
        }
        Command::UpdateQueries { file, queries } => {
            let count = ops::queries::update(&file, &queries, &options)
                .with_context(|| format!("Failed to update queries in {}", file.display()))?;
            if count == 0 {
                println!("{} No datamashup items found; document unchanged", "!".yellow());
            } else {
                println!("{} Updated {} datamashup item(s)", "✓".green(), count);
            }
        }
        Command::RetargetLinks { file, search, replace } => {
            let count = ops::links::retarget(&file, &search, &replace, &options)
                .with_context(|| format!("Failed to retarget links in {}", file.display()))?;
            if count == 0 {
                println!("{} No matching link targets found", "!".yellow());
            } else {
                println!("{} Replaced {} link target occurrence(s)", "✓".green(), count);
            }
        }
        Command::TogglePopup { file, auto_update } => {
            let count = ops::links::toggle_popup(&file, auto_update, &options)
                .with_context(|| format!("Failed to toggle popup in {}", file.display()))?;
            println!(
                "{} Set auto-update to {} ({} flag(s) flipped)",
                "✓".green(),
                auto_update,
                count
            );
        }
        Command::SyncCaches { file } => {
            let report = ops::caches::sync(&file, &options)
                .with_context(|| format!("Failed to sync caches in {}", file.display()))?;
            println!(
                "{} Synced {} cache(s) across {} chart(s)",
                "✓".green(),
                report.caches_synced,
                report.charts_updated
            );
            if report.unmatched > 0 {
                println!(
                    "{} {} cache element(s) had no positional partner; review the result",
                    "!".yellow(),
                    report.unmatched
                );
            }
        }
        Command::Explode { file, out } => {
            let out_dir = out.unwrap_or_else(|| {
                file.parent().unwrap_or_else(|| std::path::Path::new(".")).join("tmp")
            });
            let count = ops::archive::explode(&file, &out_dir)
                .with_context(|| format!("Failed to explode {}", file.display()))?;
            println!("{} Extracted {} entries to {}", "✓".green(), count, out_dir.display());
        }
        Command::Repack { dir, file } => {
            ops::archive::repack(&dir, &file, &options)
                .with_context(|| format!("Failed to repack {}", dir.display()))?;
            println!("{} Wrote {}", "✓".green(), file.display());
        }
    }

    Ok(())
}

fn load_config(cli: &Cli) -> Result<PatchConfig> {
    if let Some(config_path) = &cli.config {
        return PatchConfig::from_file(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()));
    }

    let default_config_path = PathBuf::from("officepatch.toml");
    if default_config_path.exists() {
        PatchConfig::from_file(&default_config_path).with_context(|| {
            format!(
                "Failed to load config from {}",
                default_config_path.display()
            )
        })
    } else {
        Ok(PatchConfig::default())
    }
}
