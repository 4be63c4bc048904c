//! `ontosync status` command implementation
//!
//! Shows the stored version and the ontologies held locally.

use crate::config::Config;
use crate::error::Result;
use crate::progress::format_count;
use crate::store::LocalStore;
use colored::Colorize;

pub async fn run(config: &Config) -> Result<()> {
    let store = LocalStore::open(&config.database_path).await?;

    println!("{}", "Version:".cyan().bold());
    match store.stored_version().await? {
        Some(version) => {
            println!("  Backend: {}", version.backend);
            println!("  Client:  {}", version.client);
        },
        None => println!("  No version recorded. Run 'ontosync version-check'."),
    }
    println!();

    let ontologies = store.list_ontologies().await?;
    if ontologies.is_empty() {
        println!("No ontologies stored locally.");
        println!("Run 'ontosync sync' to download them.");
        return Ok(());
    }

    println!("{}", "Ontologies:".cyan().bold());
    for ontology in &ontologies {
        println!("{}", ontology.name.green());
        println!("  Codes:  {}", format_count(ontology.code_count));
        println!("  Roots:  {}", ontology.root_count);
        println!("  Synced: {}", ontology.synced_at);
    }
    println!();

    println!("{}", "Summary:".cyan().bold());
    println!("  Total ontologies: {}", ontologies.len());
    println!("  Total codes:      {}", format_count(store.total_codes().await?));
    println!("  Database:         {}", config.database_path.display());

    Ok(())
}
