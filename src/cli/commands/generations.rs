//! Generations command - list stored cache generations

use crate::cache::{list_generations, Generation, GenerationState};
use crate::cli::args::{GenerationsArgs, OutputFormat};
use crate::config::Config;
use crate::error::OffcacheResult;
use crate::reactor::factory::create_storage;
use console::style;

/// Execute the generations command
pub async fn execute(args: GenerationsArgs, config: &Config) -> OffcacheResult<()> {
    let storage = create_storage(config).await?;
    let generations = list_generations(storage.as_ref()).await?;
    let current = config.worker.cache_name.as_str();

    match args.format {
        OutputFormat::Table => print_table(&generations, current, storage.backend_name()),
        OutputFormat::Json => print_json(&generations, current)?,
        OutputFormat::Plain => print_plain(&generations),
    }

    Ok(())
}

fn print_table(generations: &[Generation], current: &str, backend: &str) {
    if generations.is_empty() {
        println!("No cache generations found.");
        return;
    }

    println!(
        "{:<36} {:<10} {:<8} {:<14} {:<20}",
        "NAME", "STATE", "ENTRIES", "FINGERPRINT", "CREATED"
    );
    println!("{}", "-".repeat(90));

    for generation in generations {
        let state = match generation.state {
            GenerationState::Complete => style("complete").green().to_string(),
            GenerationState::Building => style("building").yellow().to_string(),
        };
        let name = if generation.name == current {
            format!("{} *", generation.name)
        } else {
            generation.name.clone()
        };

        println!(
            "{:<36} {:<10} {:<8} {:<14} {:<20}",
            name,
            state,
            generation.entries,
            generation.fingerprint.as_deref().unwrap_or("-"),
            generation.created_at.format("%Y-%m-%d %H:%M").to_string(),
        );
    }

    println!();
    println!(
        "Total: {} generation(s) in {} storage (* = configured)",
        generations.len(),
        backend
    );
}

fn print_json(generations: &[Generation], current: &str) -> OffcacheResult<()> {
    #[derive(serde::Serialize)]
    struct GenerationJson<'a> {
        #[serde(flatten)]
        generation: &'a Generation,
        current: bool,
    }

    let rows: Vec<GenerationJson<'_>> = generations
        .iter()
        .map(|generation| GenerationJson {
            generation,
            current: generation.name == current,
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}

fn print_plain(generations: &[Generation]) {
    for generation in generations {
        println!("{}", generation.name);
    }
}
