//! Scan command.

use std::path::Path;
use tokio::runtime::Runtime;

use crate::config::Config;
use crate::library::group_files;
use crate::scanner::{DirectoryScanner, ScanOptions};

/// Scan a directory and print the books it contains
pub fn cmd_scan(rt: &Runtime, config: &Config, path: &Path) -> anyhow::Result<()> {
    rt.block_on(async {
        println!("Scanning directory: {}", path.display());

        let scanner = DirectoryScanner::new(super::console_bus());
        let files = scanner.scan(path, &ScanOptions::from_config(&config.scan)).await?;
        let file_count = files.len();
        let books = group_files(files);

        for book in &books {
            println!(
                "\n{} ({} file{}, {:.1} MiB)",
                book.name,
                book.files.len(),
                if book.files.len() == 1 { "" } else { "s" },
                book.total_size as f64 / (1024.0 * 1024.0)
            );
            println!("  {}", book.directory.display());
            for (i, file) in book.files.iter().enumerate() {
                println!("  {:>3}. {}", i + 1, file.name);
            }
        }

        println!("\n{} books in {} files.", books.len(), file_count);
        Ok::<(), anyhow::Error>(())
    })
}
