//! Initialize command.

use console::style;

use crate::config::Settings;
use crate::repository::{BacklogRepository, RestaurantRepository};

/// Initialize the data directory and database.
pub async fn cmd_init(settings: &Settings) -> anyhow::Result<()> {
    settings.ensure_directories()?;

    let db_path = settings.database_path();
    RestaurantRepository::new(&db_path)?;
    BacklogRepository::new(&db_path)?;

    println!(
        "{} Initialized tablescout in {}",
        style("✓").green(),
        settings.data_dir.display()
    );
    println!("  Database: {}", db_path.display());

    Ok(())
}
