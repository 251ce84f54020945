use chrono::{Datelike, Duration, Local, NaiveDate};
use clap::{Parser, Subcommand};
use colored::Colorize;
use globset::{Glob, GlobSetBuilder};
use ignore::WalkBuilder;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

/// texgress - Writing-progress tracker for LaTeX projects
#[derive(Parser)]
#[command(name = "texgress")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true, default_value = ".texgress.yaml")]
    config: PathBuf,

    /// Quiet mode - suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize project config
    Init {
        /// Total word goal for the project
        #[arg(long)]
        target_total: u64,

        /// Daily word goal
        #[arg(long)]
        target_daily: u64,

        /// Weekly word goal
        #[arg(long)]
        target_weekly: u64,

        /// Path to the LaTeX source tree (file or directory)
        #[arg(long)]
        latex_path: PathBuf,

        /// Path to the bibliography (.bib) file
        #[arg(long)]
        bib: Option<PathBuf>,

        /// Abbreviations file prepended to the bibliography before counting
        #[arg(long)]
        bib_abbrev: Option<PathBuf>,

        /// Calendar sync target name (e.g. google)
        #[arg(long)]
        calendar: Option<String>,

        /// Calendar ID for the sync target
        #[arg(long, default_value = "primary")]
        calendar_id: String,
    },

    /// Measure the project and record a snapshot for today
    Track {
        /// Record under this date instead of today (YYYY-MM-DD)
        #[arg(long)]
        date: Option<String>,

        /// Output the recorded entry as JSON
        #[arg(long)]
        json: bool,

        /// Log directory
        #[arg(short, long, default_value = ".texgress")]
        log_dir: PathBuf,
    },

    /// Show recorded progress and the current week's rollup
    Stats {
        /// Show the last N entries
        #[arg(short = 'n', long, default_value = "14")]
        last: usize,

        /// Output as JSON
        #[arg(long)]
        json: bool,

        /// Log directory
        #[arg(short, long, default_value = ".texgress")]
        log_dir: PathBuf,
    },
}

// Config and metrics records

#[derive(Serialize, Deserialize, Debug, Clone)]
struct ProjectConfig {
    target_total: u64,
    target_daily: u64,
    target_weekly: u64,
    latex_path: String,
    #[serde(default)]
    bib: Option<String>,
    #[serde(default)]
    bib_abbrev: Option<String>,
    #[serde(default)]
    calendar: Option<String>,
    #[serde(default = "default_calendar_id")]
    calendar_id: String,
}

fn default_calendar_id() -> String {
    "primary".to_string()
}

/// Counts gathered from the raw LaTeX sources plus extracted plain text
#[derive(Debug, Default)]
struct LexicalCounts {
    words_total: u64,
    figures_total: u64,
    tables_total: u64,
    algorithms_total: u64,
    equations_total: u64,
    citation_keys: HashSet<String>,
}

/// Flat metrics for one measurement; the date, goals and delta are
/// attached when the entry is logged
#[derive(Debug, Clone)]
struct SourceMetrics {
    words_total: u64,
    figures_total: u64,
    tables_total: u64,
    algorithms_total: u64,
    equations_total: u64,
    citations_used_unique: u64,
    bib_total: u64,
    citation_coverage: f64,
}

/// Outcome of reading the bibliography; anything but Parsed degrades to
/// zero entries without aborting the run
#[derive(Debug)]
enum BibScan {
    Parsed { bib_total: u64 },
    NotConfigured,
    Missing(String),
    Unreadable(String),
}

/// One day's record in the progress log, one JSON object per line.
/// Non-date fields default so that older or foreign lines still scan.
#[derive(Serialize, Deserialize, Debug, Clone)]
struct ProgressEntry {
    date: String,
    #[serde(default)]
    words_total: u64,
    #[serde(default)]
    figures_total: u64,
    #[serde(default)]
    tables_total: u64,
    #[serde(default)]
    algorithms_total: u64,
    #[serde(default)]
    equations_total: u64,
    #[serde(default)]
    citations_used_unique: u64,
    #[serde(default)]
    bib_total: u64,
    #[serde(default)]
    citation_coverage: f64,
    #[serde(default)]
    daily_goal: u64,
    #[serde(default)]
    weekly_goal: u64,
    #[serde(default)]
    project_goal_total: u64,
    #[serde(default)]
    words_delta: i64,
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init {
            target_total,
            target_daily,
            target_weekly,
            latex_path,
            bib,
            bib_abbrev,
            calendar,
            calendar_id,
        } => cmd_init(
            &cli.config,
            target_total,
            target_daily,
            target_weekly,
            &latex_path,
            bib.as_deref(),
            bib_abbrev.as_deref(),
            calendar,
            &calendar_id,
        ),
        Commands::Track { date, json, log_dir } => {
            cmd_track(&cli.config, date.as_deref(), json, &log_dir, cli.quiet)
        }
        Commands::Stats { last, json, log_dir } => cmd_stats(last, json, &log_dir),
    };

    if let Err(e) = result {
        eprintln!("{}: {}", "error".red().bold(), e);
        std::process::exit(1);
    }
}

fn cmd_init(
    config_path: &Path,
    target_total: u64,
    target_daily: u64,
    target_weekly: u64,
    latex_path: &Path,
    bib: Option<&Path>,
    bib_abbrev: Option<&Path>,
    calendar: Option<String>,
    calendar_id: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    if !latex_path.exists() {
        return Err(format!("LaTeX path does not exist: {}", latex_path.display()).into());
    }

    let config = ProjectConfig {
        target_total,
        target_daily,
        target_weekly,
        latex_path: resolve_path(latex_path),
        bib: bib.map(resolve_path),
        bib_abbrev: bib_abbrev.map(resolve_path),
        calendar,
        calendar_id: calendar_id.to_string(),
    };

    save_config(config_path, &config)?;
    println!(
        "{} {}",
        "Initialized config and saved to".green(),
        config_path.display().to_string().cyan()
    );

    Ok(())
}

fn cmd_track(
    config_path: &Path,
    date_override: Option<&str>,
    json: bool,
    log_dir: &Path,
    quiet: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path)?;
    if config.latex_path.is_empty() {
        return Err("No LaTeX path in config. Re-run 'texgress init'.".into());
    }
    let root = PathBuf::from(&config.latex_path);

    if !quiet && !json {
        println!("{} {}", "Tracking".cyan().bold(), root.display());
    }

    // Words come from extracted plain text; structural markers and
    // citation keys from the raw sources
    let texts = extract_project_text(&root, &["."], &["**/*.tex"])?;
    let mut counts = scan_latex_sources(&root);
    counts.words_total = texts.values().map(|text| count_words(text)).sum();

    let bib_total = match scan_bibliography(&config) {
        BibScan::Parsed { bib_total } => bib_total,
        BibScan::NotConfigured => 0,
        BibScan::Missing(path) => {
            warn(&format!("bibliography file not found: {}", path));
            0
        }
        BibScan::Unreadable(reason) => {
            warn(&format!("could not read bibliography: {}", reason));
            0
        }
    };

    let metrics = assemble_metrics(&counts, bib_total);
    let log_path = log_dir.join("progress.jsonl");
    let entry = upsert_progress_entry(&log_path, &metrics, &config, date_override)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entry)?);
    } else if !quiet {
        let delta = format!("{:+}", entry.words_delta);
        let delta = if entry.words_delta >= 0 {
            delta.green()
        } else {
            delta.red()
        };

        println!();
        println!("  Date:            {}", entry.date.cyan());
        println!(
            "  Total words:     {} ({} today)",
            entry.words_total.to_string().cyan(),
            delta
        );
        println!(
            "  Figures: {}, Tables: {}, Algorithms: {}, Equations: {}",
            entry.figures_total, entry.tables_total, entry.algorithms_total, entry.equations_total
        );
        println!(
            "  Citations used:  {} / {} (coverage {}%)",
            entry.citations_used_unique.to_string().cyan(),
            entry.bib_total,
            format!("{:.1}", entry.citation_coverage * 100.0)
        );
        println!(
            "  Goals:           daily {}, weekly {}, project {}",
            entry.daily_goal, entry.weekly_goal, entry.project_goal_total
        );
    }

    // Local recording is done; the calendar payload is best-effort on top
    if config.calendar.as_deref().is_some_and(|c| !c.is_empty()) {
        let week_sum = match parse_iso_date(&entry.date) {
            Some(date) => week_delta_sum(&log_path, date),
            None => 0,
        };
        let event = build_calendar_event(&entry, week_sum, &config.calendar_id);
        match upsert_calendar_event(&log_dir.join("calendar-events.jsonl"), &event) {
            Ok(action) => {
                if !quiet && !json {
                    let verb = match action {
                        SyncAction::Created => "created",
                        SyncAction::Updated => "updated",
                    };
                    println!();
                    println!("{}", format!("Calendar event {} for sync.", verb).green());
                }
            }
            Err(e) => warn(&format!("calendar sync failed: {}", e)),
        }
    }

    Ok(())
}

fn cmd_stats(last: usize, json: bool, log_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let log_path = log_dir.join("progress.jsonl");
    let mut entries: Vec<ProgressEntry> = read_log_lines(&log_path)
        .iter()
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect();

    if entries.is_empty() {
        println!("{}", "No progress recorded yet.".yellow());
        return Ok(());
    }

    // Storage order is append order; show the log chronologically
    entries.sort_by(|a, b| a.date.cmp(&b.date));
    let today = Local::now().date_naive();
    let week_sum = week_delta_sum(&log_path, today);
    let start = entries.len().saturating_sub(last);
    let recent = &entries[start..];
    let latest = &entries[entries.len() - 1];

    if json {
        let output = serde_json::json!({
            "entries": entries.len(),
            "week_delta_sum": week_sum,
            "latest": latest,
            "recent": recent,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let total_pct = percent_of(latest.words_total as i64, latest.project_goal_total);
    let week_pct = percent_of(week_sum, latest.weekly_goal);

    println!("{}", "Progress Log".green().bold());
    println!();
    println!("  Entries:       {}", entries.len().to_string().cyan());
    println!("  First entry:   {}", entries[0].date.dimmed());
    println!("  Latest entry:  {}", latest.date.cyan());
    println!(
        "  Total words:   {} / {} ({}%)",
        latest.words_total.to_string().cyan(),
        latest.project_goal_total,
        total_pct
    );
    println!(
        "  This week:     {} / {} ({}%)",
        week_sum.to_string().cyan(),
        latest.weekly_goal,
        week_pct
    );
    println!();
    println!("{}", format!("Last {} Entries", recent.len()).green().bold());
    println!();
    println!(
        "  {:<12} {:>7} {:>6}  {:>3} {:>3} {:>3} {:>3}  {:>8}",
        "date", "words", "delta", "fig", "tab", "alg", "eqn", "coverage"
    );
    println!("  {}", "-".repeat(58));

    for entry in recent {
        let bar = "=".repeat(((entry.words_delta.max(0) as usize) / 50).min(24));
        println!(
            "  {:<12} {:>7} {:>6}  {:>3} {:>3} {:>3} {:>3}  {:>7}% {}",
            entry.date,
            entry.words_total,
            format!("{:+}", entry.words_delta),
            entry.figures_total,
            entry.tables_total,
            entry.algorithms_total,
            entry.equations_total,
            format!("{:.1}", entry.citation_coverage * 100.0),
            bar.dimmed()
        );
    }

    Ok(())
}

/// Walk the configured folders and reduce every file matching the include
/// globs to plain text, keyed by path relative to the root. The root may
/// be a single file; unreadable files are skipped and a missing root
/// yields an empty map.
fn extract_project_text(
    root: &Path,
    folders: &[&str],
    include_globs: &[&str],
) -> Result<BTreeMap<String, String>, Box<dyn std::error::Error>> {
    let mut includes = GlobSetBuilder::new();
    for pattern in include_globs {
        includes.add(Glob::new(pattern)?);
    }
    let includes = includes.build()?;

    let mut texts = BTreeMap::new();
    for folder in folders {
        // Joining "." onto a single-file root would make it unwalkable
        let base = if *folder == "." {
            root.to_path_buf()
        } else {
            root.join(folder)
        };
        let mut builder = WalkBuilder::new(&base);
        builder.hidden(true).git_ignore(true).git_global(true);

        for entry in builder.build().filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.is_dir() {
                continue;
            }

            // A single-file root is keyed by its file name
            let rel: &Path = match path.strip_prefix(root) {
                Ok(r) if !r.as_os_str().is_empty() => r,
                _ => match path.file_name() {
                    Some(name) => Path::new(name),
                    None => continue,
                },
            };
            if !includes.is_match(rel) {
                continue;
            }

            let raw = match fs::read_to_string(path) {
                Ok(raw) => raw,
                Err(_) => continue,
            };
            texts.insert(rel.to_string_lossy().to_string(), latex_to_plaintext(&raw));
        }
    }

    Ok(texts)
}

/// Reduce LaTeX source to approximate plain text: comments, math and
/// markup commands go away, prose arguments stay, whitespace is
/// normalized
fn latex_to_plaintext(source: &str) -> String {
    let mut stripped = String::with_capacity(source.len());
    for line in source.lines() {
        stripped.push_str(strip_comment(line));
        stripped.push('\n');
    }

    let display_math_re = Regex::new(r"(?s)\$\$.*?\$\$|\\\[.*?\\\]").unwrap();
    let inline_math_re = Regex::new(r"\$[^$\n]*\$|\\\(.*?\\\)").unwrap();
    let env_marker_re =
        Regex::new(r"\\(?:begin|end)\{[^}]*\}(?:\[[^\]]*\])?(?:\{[^}]*\})*").unwrap();
    // Commands whose argument is a label, key or file rather than prose
    let ref_arg_re = Regex::new(
        r"\\(?:cite[a-zA-Z]*|ref|eqref|pageref|label|input|include|includegraphics|usepackage|documentclass|bibliography|bibliographystyle)\*?(?:\[[^\]]*\])?\{[^}]*\}",
    )
    .unwrap();
    let command_re = Regex::new(r"\\[a-zA-Z@]+\*?").unwrap();

    let text = display_math_re.replace_all(&stripped, " ");
    let text = inline_math_re.replace_all(&text, " ");
    let text = env_marker_re.replace_all(&text, " ");
    let text = ref_arg_re.replace_all(&text, " ");
    let text = command_re.replace_all(&text, " ");
    let text = text
        .replace(['{', '}', '~'], " ")
        .replace("\\%", "%")
        .replace("\\&", "&")
        .replace("\\_", "_");

    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

// A % starts a comment unless escaped as \%
fn strip_comment(line: &str) -> &str {
    let bytes = line.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if b == b'%' && (i == 0 || bytes[i - 1] != b'\\') {
            return &line[..i];
        }
    }
    line
}

/// Count words in a string (split on any run of whitespace)
fn count_words(text: &str) -> u64 {
    text.split_whitespace().count() as u64
}

/// Scan raw .tex files for structural begin-markers and citation keys.
/// Pure occurrence counting; nesting and malformed markup are not
/// validated, and starred environment variants are distinct markers.
fn scan_latex_sources(root: &Path) -> LexicalCounts {
    let cite_re = Regex::new(r"\\cite[a-zA-Z]*\{([^}]+)\}").unwrap();
    let mut counts = LexicalCounts::default();

    let mut builder = WalkBuilder::new(root);
    builder.hidden(true).git_ignore(true).git_global(true);

    for entry in builder.build().filter_map(|e| e.ok()) {
        let path = entry.path();
        if path.is_dir() {
            continue;
        }
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        if ext != "tex" {
            continue;
        }

        // Unreadable files contribute nothing
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(_) => continue,
        };

        counts.figures_total += content.matches(r"\begin{figure}").count() as u64;
        counts.tables_total += content.matches(r"\begin{table}").count() as u64;
        counts.algorithms_total += content.matches(r"\begin{algorithm}").count() as u64;
        counts.equations_total += content.matches(r"\begin{equation}").count() as u64;

        for caps in cite_re.captures_iter(&content) {
            for key in caps[1].split(',') {
                counts.citation_keys.insert(key.trim().to_string());
            }
        }
    }

    counts
}

/// Read the configured bibliography, with the abbreviations file (when
/// present) concatenated before the main file
fn scan_bibliography(config: &ProjectConfig) -> BibScan {
    let bib_path = match config.bib.as_deref() {
        Some(p) if !p.is_empty() => PathBuf::from(p),
        _ => return BibScan::NotConfigured,
    };
    if !bib_path.exists() {
        return BibScan::Missing(bib_path.display().to_string());
    }

    let mut content = String::new();
    if let Some(abbrev) = config.bib_abbrev.as_deref() {
        let abbrev_path = Path::new(abbrev);
        if abbrev_path.exists() {
            match fs::read_to_string(abbrev_path) {
                Ok(text) => {
                    content.push_str(&text);
                    content.push('\n');
                }
                Err(e) => {
                    return BibScan::Unreadable(format!("{}: {}", abbrev_path.display(), e))
                }
            }
        }
    }
    match fs::read_to_string(&bib_path) {
        Ok(text) => content.push_str(&text),
        Err(e) => return BibScan::Unreadable(format!("{}: {}", bib_path.display(), e)),
    }

    BibScan::Parsed {
        bib_total: count_bib_entries(&content),
    }
}

// Every @type{...} record is an entry except the @string/@comment/@preamble
// directives
fn count_bib_entries(content: &str) -> u64 {
    let entry_re = Regex::new(r"(?m)^\s*@([A-Za-z]+)\s*[\{\(]").unwrap();
    entry_re
        .captures_iter(content)
        .filter(|caps| {
            let kind = caps[1].to_lowercase();
            kind != "string" && kind != "comment" && kind != "preamble"
        })
        .count() as u64
}

/// Fraction of bibliography entries cited at least once, rounded to four
/// decimal places (half away from zero). Zero when the bibliography is
/// empty or absent.
fn citation_coverage(citations_used_unique: u64, bib_total: u64) -> f64 {
    if bib_total == 0 {
        return 0.0;
    }
    let ratio = citations_used_unique as f64 / bib_total as f64;
    (ratio * 10_000.0).round() / 10_000.0
}

/// Pure merge of the lexical counts and the bibliography total into one
/// flat metrics record
fn assemble_metrics(counts: &LexicalCounts, bib_total: u64) -> SourceMetrics {
    let citations_used_unique = counts.citation_keys.len() as u64;
    SourceMetrics {
        words_total: counts.words_total,
        figures_total: counts.figures_total,
        tables_total: counts.tables_total,
        algorithms_total: counts.algorithms_total,
        equations_total: counts.equations_total,
        citations_used_unique,
        bib_total,
        citation_coverage: citation_coverage(citations_used_unique, bib_total),
    }
}

/// Insert or replace the entry for its date in the progress log.
///
/// The log keeps at most one record per date: a rerun for an
/// already-logged date replaces that line in place and every other line
/// keeps its position. `words_delta` is measured against the entry with
/// the greatest date strictly before this one, wherever it sits in the
/// file. Lines that fail to parse are kept verbatim but never scanned.
fn upsert_progress_entry(
    log_path: &Path,
    metrics: &SourceMetrics,
    config: &ProjectConfig,
    date_override: Option<&str>,
) -> Result<ProgressEntry, Box<dyn std::error::Error>> {
    let entry_date = match date_override {
        Some(date) => date.to_string(),
        None => Local::now().date_naive().to_string(),
    };

    // A corrupt or missing history never blocks recording new progress
    let mut lines = read_log_lines(log_path);

    let mut existing_idx = None;
    let mut prev_day: Option<(String, u64)> = None;
    for (idx, line) in lines.iter().enumerate() {
        let rec: ProgressEntry = match serde_json::from_str(line) {
            Ok(rec) => rec,
            Err(_) => continue,
        };
        if rec.date == entry_date {
            existing_idx = Some(idx);
        } else if rec.date < entry_date {
            let newer = match &prev_day {
                Some((best, _)) => rec.date > *best,
                None => true,
            };
            if newer {
                prev_day = Some((rec.date, rec.words_total));
            }
        }
    }

    let words_delta = match prev_day {
        Some((_, prev_words)) => metrics.words_total as i64 - prev_words as i64,
        None => metrics.words_total as i64,
    };

    let entry = ProgressEntry {
        date: entry_date,
        words_total: metrics.words_total,
        figures_total: metrics.figures_total,
        tables_total: metrics.tables_total,
        algorithms_total: metrics.algorithms_total,
        equations_total: metrics.equations_total,
        citations_used_unique: metrics.citations_used_unique,
        bib_total: metrics.bib_total,
        citation_coverage: metrics.citation_coverage,
        daily_goal: config.target_daily,
        weekly_goal: config.target_weekly,
        project_goal_total: config.target_total,
        words_delta,
    };

    let line = serde_json::to_string(&entry)?;
    match existing_idx {
        Some(idx) => lines[idx] = line,
        None => lines.push(line),
    }
    write_log_atomic(log_path, &lines)?;

    Ok(entry)
}

// Raw log lines; any read failure is treated as an absent history
fn read_log_lines(log_path: &Path) -> Vec<String> {
    match fs::read_to_string(log_path) {
        Ok(content) => content.lines().map(|l| l.to_string()).collect(),
        Err(_) => Vec::new(),
    }
}

// Rewrite the whole log through a temp file so a crash cannot truncate it
fn write_log_atomic(log_path: &Path, lines: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(dir) = log_path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir)?;
        }
    }

    let mut content = String::new();
    for line in lines {
        content.push_str(line);
        content.push('\n');
    }

    let tmp_path = log_path.with_extension("jsonl.tmp");
    fs::write(&tmp_path, content)?;
    if let Err(err) = fs::rename(&tmp_path, log_path) {
        // A failed swap must not strand the temp file
        let _ = fs::remove_file(&tmp_path);
        return Err(err.into());
    }
    Ok(())
}

/// Sum of words_delta over entries dated within the reference date's week,
/// Monday through the reference date inclusive. Entries without a
/// parseable date are skipped; a missing log sums to zero.
fn week_delta_sum(log_path: &Path, reference: NaiveDate) -> i64 {
    let monday = week_start(reference);
    let mut sum = 0;

    for line in read_log_lines(log_path) {
        let rec: ProgressEntry = match serde_json::from_str(&line) {
            Ok(rec) => rec,
            Err(_) => continue,
        };
        let date = match parse_iso_date(&rec.date) {
            Some(date) => date,
            None => continue,
        };
        if date >= monday && date <= reference {
            sum += rec.words_delta;
        }
    }

    sum
}

// Monday of the week containing the given date
fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

fn parse_iso_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

// ============================================================================
// Calendar sync payload
// ============================================================================

/// One all-day event for the external sync client to pick up. The
/// description ends with a per-date tag so a rerun updates the event in
/// place instead of duplicating it.
#[derive(Serialize, Deserialize, Debug, Clone)]
struct CalendarEvent {
    date: String,
    calendar_id: String,
    summary: String,
    description: String,
}

#[derive(Debug, PartialEq)]
enum SyncAction {
    Created,
    Updated,
}

fn progress_tag(date: &str) -> String {
    format!("<!--progress:{}-->", date)
}

fn build_calendar_event(entry: &ProgressEntry, week_sum: i64, calendar_id: &str) -> CalendarEvent {
    let daily_pct = percent_of(entry.words_delta, entry.daily_goal);
    let weekly_pct = percent_of(week_sum, entry.weekly_goal);
    let total_pct = percent_of(entry.words_total as i64, entry.project_goal_total);

    let summary = format!(
        "Words: {}/{} ({}%)",
        entry.words_delta, entry.daily_goal, daily_pct
    );
    let description = format!(
        "Weekly: {}/{} ({}%)\nOverall: {}/{} ({}%)\nFigures: {}, Tables: {}, Algorithms: {}, Equations: {}\nCitation coverage: {:.1}%\n{}",
        week_sum,
        entry.weekly_goal,
        weekly_pct,
        entry.words_total,
        entry.project_goal_total,
        total_pct,
        entry.figures_total,
        entry.tables_total,
        entry.algorithms_total,
        entry.equations_total,
        entry.citation_coverage * 100.0,
        progress_tag(&entry.date)
    );

    CalendarEvent {
        date: entry.date.clone(),
        calendar_id: calendar_id.to_string(),
        summary,
        description,
    }
}

// Integer percent, zero when the goal is unset
fn percent_of(value: i64, goal: u64) -> i64 {
    if goal == 0 {
        0
    } else {
        100 * value / goal as i64
    }
}

/// Insert or update the event for its date in the outbox, matched by the
/// embedded tag in existing event descriptions
fn upsert_calendar_event(
    outbox_path: &Path,
    event: &CalendarEvent,
) -> Result<SyncAction, Box<dyn std::error::Error>> {
    let tag = progress_tag(&event.date);
    let mut lines = read_log_lines(outbox_path);

    let mut existing_idx = None;
    for (idx, line) in lines.iter().enumerate() {
        let existing: CalendarEvent = match serde_json::from_str(line) {
            Ok(existing) => existing,
            Err(_) => continue,
        };
        if existing.description.contains(&tag) {
            existing_idx = Some(idx);
            break;
        }
    }

    let line = serde_json::to_string(event)?;
    let action = match existing_idx {
        Some(idx) => {
            lines[idx] = line;
            SyncAction::Updated
        }
        None => {
            lines.push(line);
            SyncAction::Created
        }
    };
    write_log_atomic(outbox_path, &lines)?;

    Ok(action)
}

// Helper functions

fn load_config(path: &Path) -> Result<ProjectConfig, Box<dyn std::error::Error>> {
    let content = fs::read_to_string(path).map_err(|_| {
        format!(
            "No project config found at {}. Run 'texgress init' first.",
            path.display()
        )
    })?;
    Ok(serde_yaml::from_str(&content)?)
}

fn save_config(path: &Path, config: &ProjectConfig) -> Result<(), Box<dyn std::error::Error>> {
    fs::write(path, serde_yaml::to_string(config)?)?;
    Ok(())
}

fn resolve_path(path: &Path) -> String {
    fs::canonicalize(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .to_string_lossy()
        .to_string()
}

fn warn(message: &str) {
    eprintln!("{}: {}", "warning".yellow().bold(), message);
}
