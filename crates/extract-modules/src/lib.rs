//! Module pullers (spec §4.7): products (primary), metafields, collections,
//! translations, and inventories, plus the shared bulk-line parsing and
//! per-field derivation helpers they all build on.

pub mod bulk_line;
pub mod collections;
pub mod error;
pub mod fields;
pub mod inventories;
pub mod metafields;
pub mod products;
pub mod products_rest;
pub mod registry;
pub mod translations;

pub use bulk_line::BulkLine;
pub use error::{ModuleError, PullStats};
pub use registry::{active_modules, primary_module, ModuleName};
