//! Catalog seeding from YAML.
//!
//! The file is a list of items:
//!
//! ```yaml
//! - name: Plasma Rifle
//!   kind: weapon
//!   description: Standard issue sidearm for boarding parties.
//!   power_level: 70
//!   unit_price: "1200.00"
//!   stock_count: 12
//! ```
//!
//! Items whose name already exists are skipped, so seeding is repeatable.

use std::path::Path;

use ec_space_storefront::db::ItemRepository;
use ec_space_storefront::models::NewItem;
use tracing::{info, warn};

use super::CliError;

/// Parse and validate a YAML item list.
///
/// # Errors
///
/// Returns an error if the YAML is malformed or any item is invalid.
pub fn parse_items(content: &str) -> Result<Vec<NewItem>, CliError> {
    let items: Vec<NewItem> = serde_yaml::from_str(content)?;

    for item in &items {
        item.validate()
            .map_err(|e| CliError::Invalid(format!("item '{}': {e}", item.name)))?;
    }

    Ok(items)
}

/// Seed catalog items from a YAML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or a database
/// operation fails.
pub async fn items(file_path: &str) -> Result<(), CliError> {
    let path = Path::new(file_path);
    info!(path = %file_path, "Loading items from file");

    // Validate before connecting so a bad file never half-seeds the catalog
    let content = tokio::fs::read_to_string(path).await?;
    let items = parse_items(&content)?;
    info!(items = items.len(), "Parsed items");

    let pool = super::connect().await?;
    let repo = ItemRepository::new(&pool);

    let mut inserted = 0_usize;
    let mut skipped = 0_usize;
    for item in &items {
        if repo.find_by_name(item.name.trim()).await?.is_some() {
            warn!(name = %item.name, "Item already exists, skipping");
            skipped += 1;
            continue;
        }
        let unit_price = item
            .validate()
            .map_err(|e| CliError::Invalid(e.to_string()))?;
        let created = repo.create(item, unit_price).await?;
        info!(item_id = %created.id, name = %created.name, "Item created");
        inserted += 1;
    }

    info!(inserted, skipped, "Seeding complete!");
    Ok(())
}
