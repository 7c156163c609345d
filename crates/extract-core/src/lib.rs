//! Shared domain types, ambient configuration, and error taxonomy for the
//! catalog extraction engine: [`model`] (Product/Variant/Metafield/…),
//! [`settings`] (per-run request config), [`filters`] (REST/GraphQL filter
//! rendering), [`gid`] (Shopify global id parsing), and process-level
//! [`app_config`]/[`config`].

pub mod app_config;
pub mod config;
pub mod error;
pub mod filters;
pub mod gid;
pub mod model;
pub mod settings;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use error::{ConfigError, CoreError};
pub use filters::{FilterManager, FilterValue};
pub use gid::Gid;
pub use model::{
    Collection, CollectionKind, FieldHaver, InventoryItem, InventoryLevel, InventoryRow,
    MediaImage, Metafield, MetafieldOwnerType, Money, PresentmentPrice, Product, ProductOption,
    ProductStatus, Publication, SelectedOption, ShopContext, Translation, Variant, VariantImage,
    WeightMeasurement, WeightUnit,
};
pub use settings::{DataType, Settings};
