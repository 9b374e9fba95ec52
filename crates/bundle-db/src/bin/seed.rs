//! # Seed Data Generator
//!
//! Populates a database with a small demo catalog: components, one
//! percent-off bundle, one fixed-price bundle, a promotion, and an open
//! order holding both bundles.
//!
//! ## Usage
//! ```bash
//! # Use pricing.toml / environment for the database path
//! cargo run -p bundle-db --bin seed
//!
//! # Specify database path
//! cargo run -p bundle-db --bin seed -- --db ./data/bundles.db
//!
//! # Specify config file
//! cargo run -p bundle-db --bin seed -- --config ./pricing.toml
//! ```
//!
//! Set `RUST_LOG=debug` to see allocator drift and stacking decisions.

use std::env;
use std::path::PathBuf;

use bundle_core::{BundleOverride, DiscountPolicy, Money, PromotionOverride, Rate};
use bundle_db::{Database, DbConfig, PricingConfig};
use tracing_subscriber::EnvFilter;

/// Demo components: (sku, name, price in cents)
const COMPONENTS: &[(&str, &str, i64)] = &[
    ("KB-01", "Mechanical Keyboard", 3000),
    ("MS-01", "Wireless Mouse", 4500),
    ("PAD-01", "Desk Pad", 2501),
    ("CAB-01", "USB-C Cable", 999),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    let mut config_path: Option<PathBuf> = None;
    let mut db_path: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Bundle Pricing Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --config <PATH>  pricing.toml to load (default: platform config dir)");
                println!("  -d, --db <PATH>      Database file path (overrides config)");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    let mut config = PricingConfig::load(config_path)?;
    if let Some(path) = db_path {
        config.database.path = path;
    }

    println!("Bundle Pricing Seed Data Generator");
    println!("==================================");
    println!("Database: {}", config.database_path().display());
    println!();

    let db = Database::new(DbConfig::from_pricing(&config)).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let mut component_ids = Vec::new();
    for (sku, name, price) in COMPONENTS {
        let component = db.components().create(sku, name, Some(*price)).await?;
        component_ids.push(component.id);
    }
    println!("✓ Created {} components", component_ids.len());

    // 20% off keyboard + mouse
    let desk = db
        .bundles()
        .create_draft(
            "Desk Starter",
            DiscountPolicy::percent(Rate::from_percent(20)),
            BundleOverride::Inherit,
        )
        .await?;
    db.bundles().add_item(&desk.id, &component_ids[0], 1, None).await?;
    db.bundles().add_item(&desk.id, &component_ids[1], 1, None).await?;
    let desk = db.bundles().publish(&desk.id).await?;

    // $50.00 for keyboard, desk pad and two cables
    let combo = db
        .bundles()
        .create_draft(
            "Typing Combo",
            DiscountPolicy::fixed(Money::from_cents(5000)),
            BundleOverride::Yes,
        )
        .await?;
    db.bundles().add_item(&combo.id, &component_ids[0], 1, None).await?;
    db.bundles().add_item(&combo.id, &component_ids[2], 1, None).await?;
    db.bundles().add_item(&combo.id, &component_ids[3], 2, None).await?;
    let combo = db.bundles().publish(&combo.id).await?;
    println!(
        "✓ Published bundles '{}' (v{}) and '{}' (v{})",
        desk.name, desk.version, combo.name, combo.version
    );

    let promo = db
        .promotions()
        .create("Weekend Sale", Rate::from_percent(10), PromotionOverride::Inherit)
        .await?;

    let order = db.orders().create().await?;
    let service = db.bundle_orders(&config);

    let added = service.add_bundle(&order.id, &desk.id, 3).await?;
    println!();
    println!("{} × 3: discount {}", desk.name, added.discount);
    for line in &added.children {
        println!(
            "  {} × {} @ {} → {} (-{})",
            line.component_id.as_deref().unwrap_or("-"),
            line.quantity,
            Money::from_cents(line.base_unit_price_cents),
            Money::from_cents(line.effective_unit_price_cents),
            Money::from_cents(line.discount_cents),
        );
    }

    let added = service.add_bundle(&order.id, &combo.id, 1).await?;
    println!("{} × 1: discount {}", combo.name, added.discount);

    if let Some(first) = added.children.first() {
        let decision = service.apply_promotion(&first.id, &promo.id).await?;
        println!("  {} on first line: {}", promo.name, serde_json::to_string(&decision)?);
    }

    println!();
    println!("✓ Seed complete! Order {}", order.id);

    Ok(())
}
