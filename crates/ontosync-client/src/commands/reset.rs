//! `ontosync reset` command implementation

use crate::config::Config;
use crate::error::Result;
use crate::store::LocalStore;
use colored::Colorize;
use std::io::{self, Write};

/// Clear the cache and coded data so the next run starts fresh.
pub async fn run(config: &Config, yes: bool) -> Result<()> {
    if !yes {
        println!(
            "{}",
            "This will remove all locally stored codes and cached state.".yellow()
        );
        print!("Continue? [y/N]: ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        let input = input.trim().to_lowercase();
        if input != "y" && input != "yes" {
            println!("Reset cancelled.");
            return Ok(());
        }
    }

    let store = LocalStore::open(&config.database_path).await?;
    store.reset().await?;

    println!("{} Local replica reset", "✓".green());
    Ok(())
}
