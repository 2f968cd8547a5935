//! Command-line entry point for zipbridge.
//!
//! Lists or extracts a local ZIP archive; Deflate64 entries (and any other
//! method selected on the command line) are decoded through an external
//! engine.

use anyhow::{Result, bail};
use clap::Parser;
use log::debug;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use zipbridge::zip::extract_to_file;
use zipbridge::{BridgedReader, Cli, EntryReader, LocalFileReader, ZipArchive, ZipFileEntry};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let file = Arc::new(LocalFileReader::new(&cli.file)?);
    let reader = BridgedReader::new(ZipArchive::new(file), cli.bridge_config());
    debug!("bridge configuration: {:?}", reader.config());

    if cli.list || cli.verbose {
        return list_files(&reader, cli.verbose).await;
    }

    extract_matching(&reader, &cli).await
}

/// Extract every entry selected by the positional names and `-x` exclusions.
///
/// All selected entries are attempted; the run fails if any of them failed.
async fn extract_matching<E: EntryReader>(reader: &E, cli: &Cli) -> Result<()> {
    let entries = reader.list_files().await?;
    let selected: Vec<_> = entries
        .iter()
        .filter(|e| !e.is_directory && is_selected(e, cli))
        .collect();

    let show_names = cli.pipe && selected.len() > 1;
    let mut failures = 0usize;
    for entry in selected {
        if let Err(e) = extract_file(reader, entry, cli, show_names).await {
            if !cli.is_very_quiet() {
                eprintln!("error: {}: {:#}", entry.file_name, e);
            }
            failures += 1;
        }
    }

    if failures > 0 {
        bail!("{} file(s) could not be extracted", failures);
    }
    Ok(())
}

fn is_selected(entry: &ZipFileEntry, cli: &Cli) -> bool {
    if !cli.files.is_empty() {
        let wanted = cli.files.iter().any(|f| {
            if has_glob_chars(f) {
                glob_match(f, &entry.file_name)
            } else {
                let basename = Path::new(&entry.file_name)
                    .file_name()
                    .map(|s| s.to_string_lossy())
                    .unwrap_or_default();
                entry.file_name == *f || basename == *f
            }
        });
        if !wanted {
            return false;
        }
    }

    !cli
        .exclude
        .iter()
        .any(|x| entry.file_name.contains(x.as_str()) || glob_match(x, &entry.file_name))
}

/// Print the archive listing, short (`-l`) or as a table (`-v`).
async fn list_files<E: EntryReader>(reader: &E, verbose: bool) -> Result<()> {
    let entries = reader.list_files().await?;

    if !verbose {
        for entry in &entries {
            println!("{}", entry.file_name);
        }
        return Ok(());
    }

    println!(
        "{:>10}  {:<7} {:>10}  {:>5}  {:>10}  {:>5}  Name",
        "Length", "Method", "Size", "Cmpr", "Date", "Time"
    );
    println!("{}", "-".repeat(78));

    let mut total_uncompressed = 0u64;
    let mut total_compressed = 0u64;
    let mut file_count = 0usize;

    for entry in &entries {
        let (year, month, day) = entry.mod_date();
        let (hour, minute, _second) = entry.mod_time();
        println!(
            "{:>10}  {:<7} {:>10}  {}  {:04}-{:02}-{:02}  {:02}:{:02}  {}",
            entry.uncompressed_size,
            entry.compression_method.name(),
            entry.compressed_size,
            ratio(entry.compressed_size, entry.uncompressed_size),
            year,
            month,
            day,
            hour,
            minute,
            entry.file_name
        );

        if !entry.is_directory {
            total_uncompressed += entry.uncompressed_size;
            total_compressed += entry.compressed_size;
            file_count += 1;
        }
    }

    println!("{}", "-".repeat(78));
    println!(
        "{:>10}  {:<7} {:>10}  {}  {:>18}  {} files",
        total_uncompressed,
        "",
        total_compressed,
        ratio(total_compressed, total_uncompressed),
        "",
        file_count
    );

    Ok(())
}

/// Space saved as a right-aligned percentage
fn ratio(compressed: u64, uncompressed: u64) -> String {
    let saved = if uncompressed == 0 || compressed >= uncompressed {
        0
    } else {
        100 - (compressed * 100 / uncompressed)
    };
    format!("{:>4}%", saved)
}

async fn extract_file<E: EntryReader>(
    reader: &E,
    entry: &ZipFileEntry,
    cli: &Cli,
    show_filename: bool,
) -> Result<()> {
    if cli.pipe {
        use tokio::io::AsyncWriteExt;

        let mut stdout = tokio::io::stdout();
        if show_filename {
            stdout
                .write_all(format!("--- {} ---\n", entry.file_name).as_bytes())
                .await?;
        }
        zipbridge::zip::extract_to_writer(reader, entry, &mut stdout).await?;
        return Ok(());
    }

    let escapes = Path::new(&entry.file_name)
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        bail!("refusing to extract outside the target directory");
    }

    let output_path = match cli.extract_dir {
        Some(ref dir) => dir.join(&entry.file_name),
        None => PathBuf::from(&entry.file_name),
    };

    if output_path.exists() {
        if cli.never_overwrite {
            if !cli.is_quiet() {
                eprintln!("Skipping: {} (file exists)", entry.file_name);
            }
            return Ok(());
        }
        if !cli.overwrite {
            if !cli.is_quiet() {
                eprintln!("Skipping: {} (use -o to overwrite)", entry.file_name);
            }
            return Ok(());
        }
    }

    if !cli.is_quiet() {
        println!("  extracting: {}", entry.file_name);
    }

    extract_to_file(reader, entry, &output_path).await?;
    Ok(())
}

fn has_glob_chars(pattern: &str) -> bool {
    pattern.contains('*') || pattern.contains('?')
}

/// Glob matching with `*` (any run of characters) and `?` (one character).
fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    // Iterative matcher with single-star backtracking
    let (mut p, mut t) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;
    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                star = Some((p, t));
                p += 1;
            }
            Some(&c) if c == '?' || c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match star {
                Some((sp, st)) => {
                    p = sp + 1;
                    t = st + 1;
                    star = Some((sp, st + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|&c| c == '*')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_patterns() {
        assert!(glob_match("*.txt", "readme.txt"));
        assert!(glob_match("file?.dat", "file1.dat"));
        assert!(glob_match("a*b*c", "aXXbYYc"));
        assert!(glob_match("*", ""));
        assert!(!glob_match("*.txt", "readme.md"));
        assert!(!glob_match("file?.dat", "file10.dat"));
    }

    #[test]
    fn ratio_formatting() {
        assert_eq!(ratio(50, 200), "  75%");
        assert_eq!(ratio(10, 0), "   0%");
        assert_eq!(ratio(300, 200), "   0%");
        assert_eq!(ratio(0, 200), " 100%");

        // every cell fills the five-character Cmpr column
        for (c, u) in [(50, 200), (10, 0), (300, 200), (0, 200), (199, 200)] {
            assert_eq!(ratio(c, u).len(), 5, "ratio({}, {})", c, u);
        }
    }
}
