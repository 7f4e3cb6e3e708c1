//! Main entry point for the runphar CLI application.
//!
//! Lists or extracts PHAR archives from the local filesystem or from HTTP
//! URLs.

use anyhow::Result;
use chrono::DateTime;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use runphar::phar::{Entry, output_path};
use runphar::{Cli, HttpRangeReader, LocalFileReader, PharExtractor, ReadAt, logs};

fn main() -> Result<()> {
    let cli = Cli::parse();
    logs::init(cli.is_very_quiet())?;

    if cli.is_http_url() {
        let reader = Arc::new(HttpRangeReader::new(cli.file.clone())?);
        let transferred_before = reader.transferred_bytes();

        process_phar(reader.clone(), &cli)?;

        if !cli.is_quiet() {
            let transferred = reader.transferred_bytes() - transferred_before;
            eprintln!("\nTotal bytes transferred: {}", format_size(transferred));
        }
    } else {
        let reader = Arc::new(LocalFileReader::new(Path::new(&cli.file))?);
        process_phar(reader, &cli)?;
    }

    Ok(())
}

/// List, describe or extract an archive according to the CLI options.
fn process_phar<R: ReadAt + 'static>(reader: Arc<R>, cli: &Cli) -> Result<()> {
    let extractor = PharExtractor::new(reader, &cli.parse_options(), !cli.no_verify)?;

    if cli.info {
        print_info(&extractor);
        if !(cli.list || cli.verbose) {
            return Ok(());
        }
    }

    if cli.list || cli.verbose {
        list_files(&extractor, cli.verbose);
        return Ok(());
    }

    let selected: Vec<&Entry> = extractor
        .list_files()
        .iter()
        .filter(|e| is_selected(e, cli))
        .collect();

    // In pipe mode directories have nothing to print.
    let selected: Vec<&Entry> = if cli.pipe {
        selected.into_iter().filter(|e| !e.is_directory).collect()
    } else {
        selected
    };

    let show_names = cli.pipe && selected.len() > 1;
    for entry in selected {
        extract_file(&extractor, entry, cli, show_names)?;
    }

    Ok(())
}

/// Apply the positional file list and the `-x` exclusions.
fn is_selected(entry: &Entry, cli: &Cli) -> bool {
    let base_name = Path::new(&entry.name)
        .file_name()
        .map(|s| s.to_string_lossy())
        .unwrap_or_default();

    if !cli.files.is_empty() {
        let wanted = cli.files.iter().any(|f| {
            if has_glob_chars(f) {
                glob_match(f, &entry.name)
            } else {
                entry.name == *f || base_name == *f
            }
        });
        if !wanted {
            return false;
        }
    }

    !cli
        .exclude
        .iter()
        .any(|x| entry.name.contains(x.as_str()) || glob_match(x, &entry.name))
}

fn print_info<R: ReadAt>(extractor: &PharExtractor<R>) {
    let archive = extractor.archive();
    let manifest = archive.manifest();

    println!("API version:  {}", manifest.version);
    println!("Flags:        {:#010x}", manifest.flags);
    println!("Entries:      {}", manifest.entry_count);
    if !manifest.alias.is_empty() {
        println!("Alias:        {}", manifest.alias_lossy());
    }
    if !manifest.metadata.is_empty() {
        println!("Metadata:     {} bytes", manifest.metadata.len());
    }
    match archive.signature() {
        Some(signature) => println!(
            "Signature:    {} {}",
            signature.algorithm,
            signature.to_hex()
        ),
        None => println!("Signature:    none"),
    }
}

/// List files in the archive, one name per line or as a verbose table.
fn list_files<R: ReadAt>(extractor: &PharExtractor<R>, verbose: bool) {
    let entries = extractor.list_files();

    if !verbose {
        for entry in entries {
            println!("{}", entry.name);
        }
        return;
    }

    println!(
        "{:>10}  {:>10}  {:>5}  {:>10}  {:>5}  {:>8}  Name",
        "Length", "Size", "Cmpr", "Date", "Time", "CRC-32"
    );
    println!("{}", "-".repeat(80));

    let mut total_size = 0u64;
    let mut total_packed = 0u64;
    let mut file_count = 0usize;

    for entry in entries {
        let (date, time) = DateTime::from_timestamp(entry.timestamp as i64, 0)
            .map(|dt| (dt.format("%Y-%m-%d").to_string(), dt.format("%H:%M").to_string()))
            .unwrap_or_default();

        println!(
            "{:>10}  {:>10}  {}  {:>10}  {:>5}  {:08x}  {}",
            entry.uncompressed_size,
            entry.on_disk_len(),
            ratio(entry.uncompressed_size as u64, entry.on_disk_len()),
            date,
            time,
            entry.crc32,
            entry.name
        );

        if !entry.is_directory {
            total_size += entry.uncompressed_size as u64;
            total_packed += entry.on_disk_len();
            file_count += 1;
        }
    }

    println!("{}", "-".repeat(80));
    println!(
        "{:>10}  {:>10}  {}  {:>31}  {} files",
        total_size,
        total_packed,
        ratio(total_size, total_packed),
        "",
        file_count
    );
}

/// Space saved by compression, as a right-aligned percentage.
fn ratio(size: u64, packed: u64) -> String {
    if size == 0 || packed >= size {
        return "  0%".to_string();
    }
    format!("{:>4}%", 100 - packed * 100 / size)
}

/// Extract a single entry to a file or to stdout.
fn extract_file<R: ReadAt>(
    extractor: &PharExtractor<R>,
    entry: &Entry,
    cli: &Cli,
    show_name: bool,
) -> Result<()> {
    if cli.pipe {
        if show_name {
            println!("--- {} ---", entry.name);
        }
        return extractor.extract_to_stdout(entry);
    }

    let dir = cli
        .extract_dir
        .as_deref()
        .map(PathBuf::from)
        .unwrap_or_default();
    let path = output_path(&dir, &entry.name, cli.junk_paths)?;

    if entry.is_directory {
        if cli.junk_paths {
            return Ok(());
        }
        return extractor.extract_to_file(entry, &path);
    }

    if path.exists() {
        if cli.never_overwrite {
            if !cli.is_quiet() {
                eprintln!("Skipping: {} (file exists)", entry.name);
            }
            return Ok(());
        }

        if !cli.overwrite {
            if !cli.is_quiet() {
                eprintln!("Skipping: {} (use -o to overwrite)", entry.name);
            }
            return Ok(());
        }
    }

    if !cli.is_quiet() {
        println!("  extracting: {}", entry.name);
    }

    extractor.extract_to_file(entry, &path)
}

fn has_glob_chars(pattern: &str) -> bool {
    pattern.contains('*') || pattern.contains('?')
}

/// Match `text` against a pattern where `*` is any run of characters and
/// `?` exactly one.
fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let (mut p, mut t) = (0, 0);
    // Position of the last `*` and the text index it was tried at.
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some(&c) if c == '?' || c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match backtrack {
                Some((star, tried)) => {
                    p = star + 1;
                    t = tried + 1;
                    backtrack = Some((star, tried + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}

fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    match size {
        s if s >= GB => format!("{:.2} GB", s as f64 / GB as f64),
        s if s >= MB => format!("{:.2} MB", s as f64 / MB as f64),
        s if s >= KB => format!("{:.2} KB", s as f64 / KB as f64),
        s => format!("{s} bytes"),
    }
}
