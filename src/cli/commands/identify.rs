//! Identify command.

use std::path::Path;
use tokio::runtime::Runtime;

use crate::config::Config;

/// Print the ranked provider candidates for every book under `path`
pub fn cmd_identify(rt: &Runtime, config: &Config, path: &Path, top: usize) -> anyhow::Result<()> {
    let min_confidence = config.matching.min_confidence;
    let orchestrator = super::build_orchestrator(config.clone(), super::console_bus())?;

    rt.block_on(async {
        let results = orchestrator.identify(path).await?;

        for result in &results {
            let identity = &result.identity;
            println!("\n{}", result.book.name);
            println!(
                "  Inferred: \"{}\" by {}{}",
                identity.title,
                identity.author.as_deref().unwrap_or("unknown"),
                identity
                    .asin
                    .as_deref()
                    .map(|a| format!(" [{}]", a))
                    .unwrap_or_default()
            );

            if let Some(ref error) = result.error {
                println!("  Lookup failed: {}", error);
                continue;
            }
            if result.matches.is_empty() {
                println!("  No candidates");
                continue;
            }

            for m in result.matches.iter().take(top) {
                let c = &m.candidate;
                let marker = if m.score >= min_confidence { "*" } else { " " };
                println!(
                    "  {} {:.2}  {} - {}{}{}",
                    marker,
                    m.score,
                    c.primary_author().unwrap_or("unknown"),
                    c.title,
                    c.series
                        .as_ref()
                        .map(|s| match s.position {
                            Some(ref p) => format!(" ({} #{})", s.name, p),
                            None => format!(" ({})", s.name),
                        })
                        .unwrap_or_default(),
                    c.asin.as_deref().map(|a| format!(" [{}]", a)).unwrap_or_default()
                );
            }
        }

        println!("\nIdentified {} books (* = accepted at {:.2}).", results.len(), min_confidence);
        Ok::<(), anyhow::Error>(())
    })
}
