//! # bundle-db: Database Layer for Bundle Pricing
//!
//! SQLite storage for components, bundle definitions, promotions and orders,
//! plus the transactional order mutations that turn a bundle into priced
//! order lines.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Bundle Pricing Data Flow                            │
//! │                                                                         │
//! │  Caller (checkout, admin tool, seed binary)                             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     bundle-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐   ┌────────────────┐   ┌──────────────┐    │   │
//! │  │   │   Database    │   │  Repositories  │   │  Migrations  │    │   │
//! │  │   │   (pool.rs)   │   │  component     │   │  (embedded)  │    │   │
//! │  │   │               │◄──│  bundle        │   │              │    │   │
//! │  │   │ SqlitePool    │   │  promotion     │   │ 001_initial  │    │   │
//! │  │   │ WAL + FKs     │   │  order         │   │              │    │   │
//! │  │   └───────────────┘   └────────────────┘   └──────────────┘    │   │
//! │  │           ▲                                                     │   │
//! │  │   ┌───────┴─────────────────────┐   ┌─────────────────────┐    │   │
//! │  │   │ BundleOrderService          │   │ PricingConfig       │    │   │
//! │  │   │ add / adjust / remove       │──►│ pricing.toml + env  │    │   │
//! │  │   │ apply_promotion             │   │ stacking, limits    │    │   │
//! │  │   └─────────────┬───────────────┘   └─────────────────────┘    │   │
//! │  └─────────────────┼───────────────────────────────────────────────┘   │
//! │                    ▼                                                    │
//! │            bundle-core (allocator, guard, lifecycle)                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`config`] - `pricing.toml` loading and environment overrides
//! - [`repository`] - Repository implementations
//! - [`service`] - Bundle order mutations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bundle_db::{Database, DbConfig, PricingConfig};
//!
//! let config = PricingConfig::load(None)?;
//! let db = Database::new(DbConfig::from_pricing(&config)).await?;
//!
//! let order = db.orders().create().await?;
//! let added = db.bundle_orders(&config).add_bundle(&order.id, &bundle_id, 3).await?;
//! println!("bundle discount: {}", added.discount);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod service;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{ConfigError, PricingConfig};
pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use service::{AddedBundle, BundleOrderService};

// Repository re-exports for convenience
pub use repository::bundle::BundleRepository;
pub use repository::component::ComponentRepository;
pub use repository::order::OrderRepository;
pub use repository::promotion::PromotionRepository;
