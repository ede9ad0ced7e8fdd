//! varsync CLI - keep DOCVARIABLE values in Word documents in sync
//!
//! Reads and patches closed .docx files, reads Excel cells and ranges, and
//! runs Update All / Excel refresh against a JSON workspace.

mod logger;
mod store;

use clap::{Parser, Subcommand};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use varsync::sync::{
    plan_range_import, plan_update_all, reconcile_document, sync_cell_links, sync_saved_ranges,
    ChangeSource, FileOutcome, OfflineDocument,
};
use varsync::xlsx::IdentityCheck;
use varsync::{normalize_variable_name, RangeOptions, UpdateOptions};

use store::Workspace;

type BoxResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Offline DOCVARIABLE sync for Word documents and Excel workbooks
#[derive(Parser)]
#[command(
    name = "varsync",
    version,
    about = "Sync document variables between Word and Excel files",
    long_about = "varsync - DOCVARIABLE sync without Office.\n\n\
                  Patches docVar definitions and DOCVARIABLE field results inside .docx files, \
                  and reads values from .xlsx/.xlsm workbooks."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Workspace file holding variables, documents and ranges
    #[arg(short, long, global = true, default_value = "varsync.json")]
    workspace: PathBuf,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    /// Show debug output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the variables a document defines and displays
    Vars {
        /// Input .docx file
        input: PathBuf,
    },

    /// Write variable values into a document
    Set {
        /// Input .docx file
        input: PathBuf,

        /// Values as NAME=VALUE
        #[arg(required = true, value_parser = parse_assignment)]
        values: Vec<(String, String)>,

        /// Do not keep a backup copy
        #[arg(long)]
        no_backup: bool,
    },

    /// Reconcile one document against the workspace
    Reconcile {
        /// Input .docx file
        input: PathBuf,

        /// Write the desired values when anything is stale
        #[arg(long)]
        apply: bool,

        /// Do not keep a backup copy
        #[arg(long)]
        no_backup: bool,
    },

    /// List the sheets of a workbook
    Sheets {
        /// Input .xlsx or .xlsm file
        input: PathBuf,
    },

    /// Read one cell
    Cell {
        /// Input .xlsx or .xlsm file
        input: PathBuf,

        /// Sheet name
        sheet: String,

        /// Cell reference (e.g. B5)
        cell: String,
    },

    /// Read a name/value/unit block
    Range {
        /// Input .xlsx or .xlsm file
        input: PathBuf,

        /// Sheet name
        sheet: String,

        /// Top-left cell of the name column (e.g. A2)
        start: String,

        /// Maximum number of rows to examine
        #[arg(long, default_value = "1000")]
        max_rows: u32,

        /// Import the rows into the workspace
        #[arg(long)]
        import: bool,

        /// Save the range in the workspace under this name
        #[arg(long)]
        save: Option<String>,
    },

    /// Show the top-left corner of a sheet
    Preview {
        /// Input .xlsx or .xlsm file
        input: PathBuf,

        /// Sheet name
        sheet: String,

        /// Number of rows
        #[arg(long, default_value = "10")]
        rows: u32,

        /// Number of columns
        #[arg(long, default_value = "6")]
        cols: u32,
    },

    /// Read, create or check a workbook's identity
    Identity {
        /// Input .xlsx or .xlsm file
        input: PathBuf,

        /// Tag the workbook when it has no identity yet
        #[arg(long)]
        create: bool,

        /// Identity the workbook is expected to carry
        #[arg(long, conflicts_with = "create")]
        expect: Option<String>,
    },

    /// Push workspace values into every tracked document
    UpdateAll {
        /// Only show what would change
        #[arg(long)]
        dry_run: bool,

        /// Do not keep backup copies
        #[arg(long)]
        no_backup: bool,
    },

    /// Refresh workspace values from linked cells and saved ranges
    SyncExcel {
        /// Only show what would change
        #[arg(long)]
        dry_run: bool,
    },

    /// Show version information
    Version,
}

fn main() {
    let cli = Cli::parse();
    logger::init(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> BoxResult<()> {
    let json = cli.json;

    match cli.command {
        Commands::Vars { input } => {
            let snapshot = varsync::read_docx_snapshot(&input)?;
            if json {
                return print_json(&snapshot);
            }

            println!("{}", "Definitions".cyan().bold());
            println!("{}", "─".repeat(40));
            if snapshot.doc_var_values.is_empty() {
                println!("{}", "(none)".dimmed());
            }
            for (name, value) in &snapshot.doc_var_values {
                let shown = if snapshot.displays(name) { "" } else { " (not displayed)" };
                println!("{} = {}{}", name.bold(), value, shown.dimmed());
            }

            let orphans: Vec<&String> = snapshot
                .display_field_names
                .iter()
                .filter(|n| !snapshot.doc_var_values.contains_key(*n))
                .collect();
            if !orphans.is_empty() {
                println!("\n{}", "Displayed without definition".yellow().bold());
                println!("{}", "─".repeat(40));
                for name in orphans {
                    println!("{}", name);
                }
            }
        }

        Commands::Set {
            input,
            values,
            no_backup,
        } => {
            let values: BTreeMap<String, String> = values.into_iter().collect();
            let options = UpdateOptions::new().with_backup(!no_backup);

            let pb = create_spinner("Updating document...");
            let report = varsync::update_docx_variables(&input, &values, &options)?;
            pb.finish_and_clear();

            if json {
                return print_json(&report);
            }
            if report.written {
                println!(
                    "{} Updated {}: {}",
                    "✓".green().bold(),
                    input.display(),
                    report.updated.join(", ")
                );
                if let Some(backup) = &report.backup {
                    println!("  backup: {}", backup.display());
                }
            } else {
                println!("{} {} is already up to date", "✓".green().bold(), input.display());
            }
        }

        Commands::Reconcile {
            input,
            apply,
            no_backup,
        } => {
            let mut workspace = Workspace::load(&cli.workspace)?;
            let path = std::fs::canonicalize(&input)?;
            let tracked = workspace.track_document(&path);

            let mut doc = OfflineDocument::new(&path)
                .with_options(UpdateOptions::new().with_backup(!no_backup));
            let rec = reconcile_document(&mut doc, &workspace.variables, &workspace.usage, &tracked.guid)?;

            let changed = if apply { rec.apply(&mut doc)? } else { Vec::new() };
            workspace.record_usage(rec.usage.clone());
            workspace.save(&cli.workspace)?;

            if json {
                return print_json(&rec);
            }
            if rec.is_up_to_date() {
                println!("{} {} is up to date", "✓".green().bold(), input.display());
            } else {
                for (name, change) in &rec.stale {
                    println!("{}: {} → {}", name.bold(), change.old.red(), change.new.green());
                }
                if apply {
                    println!("{} Updated {} variable(s)", "✓".green().bold(), changed.len());
                } else {
                    println!("{} {} stale; run with --apply to write", "!".yellow().bold(), rec.stale.len());
                }
            }
            if !rec.untracked.is_empty() {
                println!("{}: {}", "Untracked".dimmed(), rec.untracked.join(", "));
            }
        }

        Commands::Sheets { input } => {
            let names = varsync::list_sheet_names(&input)?;
            if json {
                return print_json(&names);
            }
            for name in names {
                println!("{}", name);
            }
        }

        Commands::Cell { input, sheet, cell } => {
            let value = varsync::read_cell(&input, &sheet, &cell)?;
            if json {
                return print_json(&value);
            }
            println!("{}", value);
        }

        Commands::Range {
            input,
            sheet,
            start,
            max_rows,
            import,
            save,
        } => {
            let options = RangeOptions::new().with_max_rows(max_rows);
            let rows = if save.is_some() {
                varsync::xlsx::validate_range(&input, &sheet, &start, &options)?
            } else {
                varsync::xlsx::read_range_from_path(&input, &sheet, &start, &options)?
            };

            if import || save.is_some() {
                let mut workspace = Workspace::load(&cli.workspace)?;
                if import {
                    let plan = plan_range_import(&rows, &workspace.variables);
                    for row in &plan.rejected {
                        log::warn!("row {}: rejected name '{}'", row.source_row, row.name);
                    }
                    let applied = workspace.apply_import(&plan);
                    if !json {
                        println!(
                            "{} Imported {} variable(s): {} added, {} updated",
                            "✓".green().bold(),
                            applied,
                            plan.additions.len(),
                            plan.updates.len()
                        );
                    }
                }
                if let Some(name) = &save {
                    let path = std::fs::canonicalize(&input)?;
                    workspace.save_range(name, &path, &sheet, &start);
                    if !json {
                        println!("{} Saved range '{}'", "✓".green().bold(), name);
                    }
                }
                workspace.save(&cli.workspace)?;
            }

            if json {
                return print_json(&rows);
            }
            if !(import || save.is_some()) {
                println!("{}", format!("{} row(s)", rows.len()).cyan().bold());
                println!("{}", "─".repeat(40));
                for row in &rows {
                    println!("{:>5}  {} = {} {}", row.source_row, row.name.bold(), row.value, row.unit);
                }
            }
        }

        Commands::Preview {
            input,
            sheet,
            rows,
            cols,
        } => {
            let grid = varsync::xlsx::read_sheet_preview(&input, &sheet, rows, cols)?;
            if json {
                return print_json(&grid);
            }

            let header: Vec<String> = (1..=cols)
                .map(|c| format!("{:<12}", varsync::xlsx::column_letters(c)))
                .collect();
            println!("{:>5}  {}", "", header.join(" ").bold());
            for (i, row) in grid.iter().enumerate() {
                let cells: Vec<String> = row.iter().map(|v| format!("{:<12}", truncate(v, 12))).collect();
                println!("{:>5}  {}", (i + 1).to_string().dimmed(), cells.join(" "));
            }
        }

        Commands::Identity {
            input,
            create,
            expect,
        } => {
            if let Some(expected) = expect {
                let check = varsync::xlsx::verify_identity(&input, &expected)?;
                if json {
                    return print_json(&check);
                }
                match check {
                    IdentityCheck::Match => println!("{} Identity matches", "✓".green().bold()),
                    IdentityCheck::Mismatch { found } => {
                        println!("{} Workbook carries {}", "✗".red().bold(), found)
                    }
                    IdentityCheck::Untagged => {
                        println!("{} Workbook has no identity", "!".yellow().bold())
                    }
                }
            } else if create {
                let pb = create_spinner("Tagging workbook...");
                let id = varsync::get_or_create_identity(&input)?;
                pb.finish_and_clear();
                if json {
                    return print_json(&id);
                }
                println!("{}", id);
            } else {
                let id = varsync::xlsx::read_identity(&input)?;
                if json {
                    return print_json(&id);
                }
                match id {
                    Some(id) => println!("{}", id),
                    None => println!("{} Workbook has no identity", "!".yellow().bold()),
                }
            }
        }

        Commands::UpdateAll { dry_run, no_backup } => {
            let workspace = Workspace::load(&cli.workspace)?;
            let pb = create_spinner("Checking documents...");
            let plan = plan_update_all(&workspace.documents, &workspace.variables, &workspace.usage);
            pb.finish_and_clear();

            if dry_run {
                if json {
                    return print_json(&plan);
                }
                for update in plan.updates() {
                    println!("{}", update.path.display().to_string().bold());
                    for (name, change) in &update.changes {
                        println!("  {}: {} → {}", name, change.old.red(), change.new.green());
                    }
                }
                println!(
                    "{} {} change(s) in {} document(s)",
                    "!".yellow().bold(),
                    plan.change_count(),
                    plan.pending()
                );
                return Ok(());
            }

            let options = UpdateOptions::new().with_backup(!no_backup);
            let pb = ProgressBar::new(plan.pending() as u64);
            pb.set_style(bar_style());
            let report = plan.apply_with(&options, |update| {
                pb.set_message(update.document.name.clone());
                pb.inc(1);
            });
            pb.finish_and_clear();

            if json {
                print_json(&report)?;
            } else {
                for result in &report.results {
                    let name = &result.document.name;
                    match &result.outcome {
                        FileOutcome::Updated { changed, .. } => {
                            println!("{} {}: {}", "✓".green().bold(), name, changed.join(", "))
                        }
                        FileOutcome::UpToDate => println!("{} {}", "·".dimmed(), name),
                        FileOutcome::Skipped { reason } => {
                            println!("{} {} ({})", "-".dimmed(), name, reason.dimmed())
                        }
                        FileOutcome::Failed { message, .. } => {
                            println!("{} {}: {}", "✗".red().bold(), name, message)
                        }
                    }
                }
                println!("\n{} document(s) updated", report.updated_count());
            }

            if !report.is_success() {
                return Err(format!("{} document(s) failed", report.failures().count()).into());
            }
        }

        Commands::SyncExcel { dry_run } => {
            let mut workspace = Workspace::load(&cli.workspace)?;
            let pb = create_spinner("Reading workbooks...");
            let mut report = sync_cell_links(&workspace.variables);
            report.merge(sync_saved_ranges(
                &workspace.ranges,
                &workspace.variables,
                &RangeOptions::default(),
            ));
            pb.finish_and_clear();

            if !dry_run {
                workspace.apply_changes(&report.changes);
                workspace.mark_ranges_synced(&unix_timestamp());
                workspace.save(&cli.workspace)?;
            }

            if json {
                return print_json(&report);
            }
            for change in &report.changes {
                let source = match &change.source {
                    ChangeSource::Cell { sheet, cell, .. } => format!("{}!{}", sheet, cell),
                    ChangeSource::Range { name, row } => format!("{} row {}", name, row),
                };
                println!(
                    "{}: {} → {} {}",
                    change.name.bold(),
                    change.old.red(),
                    change.new.green(),
                    format!("({})", source).dimmed()
                );
            }
            for skipped in &report.skipped {
                println!("{} {}: {}", "!".yellow().bold(), skipped.item, skipped.reason);
            }
            let verb = if dry_run { "would change" } else { "changed" };
            println!(
                "\n{} checked, {} {}",
                report.checked,
                report.changes.len(),
                verb
            );
        }

        Commands::Version => {
            print_version();
        }
    }

    Ok(())
}

fn parse_assignment(s: &str) -> Result<(String, String), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", s))?;
    let name = normalize_variable_name(name);
    if name.is_empty() {
        return Err(format!("empty variable name in '{}'", s));
    }
    Ok((name, value.to_string()))
}

fn print_json<T: Serialize>(value: &T) -> BoxResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(width - 1).collect();
        out.push('…');
        out
    }
}

fn unix_timestamp() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_default()
}

fn print_version() {
    println!("{} {}", "varsync".green().bold(), env!("CARGO_PKG_VERSION"));
    println!("Offline DOCVARIABLE sync for Word documents and Excel workbooks");
    println!();
    println!("Supported formats: DOCX, XLSX, XLSM");
    println!("Library: varsync {}", varsync::VERSION);
}

fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
    pb.set_style(style.clone().template("{spinner:.blue} {msg}").unwrap_or(style));
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{bar:30.blue} {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}
