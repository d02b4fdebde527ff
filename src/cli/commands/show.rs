//! Profile display.

use crate::cli::helpers::open_restaurants;
use crate::config::Settings;
use crate::profile;

/// Print one record with its menu and images, as Markdown or JSON.
pub fn cmd_show(settings: &Settings, id: i64, json: bool) -> anyhow::Result<()> {
    let repo = open_restaurants(settings)?;
    let record = repo
        .get(id)?
        .ok_or_else(|| anyhow::anyhow!("Restaurant {} not found", id))?;
    let menu = repo.menu(id)?;
    let images = repo.images(id)?;

    if json {
        let value = serde_json::json!({
            "restaurant": record,
            "menu": menu,
            "images": images,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        print!("{}", profile::render(&record, &menu, &images));
    }
    Ok(())
}
