//! Slide abstraction layer.
//!
//! Sits between vendor format readers and consumers:
//!
//! ```text
//! ┌───────────────────────────────────┐
//! │        CLI / applications         │
//! └─────────────────┬─────────────────┘
//!                   ▼
//! ┌───────────────────────────────────┐
//! │         SlideReader trait         │
//! │  (levels, properties, painting)   │
//! └─────────────────┬─────────────────┘
//!                   ▼
//! ┌───────────────────────────────────┐
//! │             ScnReader             │
//! │        (Leica SCN format)         │
//! └───────────────────────────────────┘
//! ```

mod properties;
mod reader;

pub use properties::{
    PropertyBag, PROPERTY_COMMENT, PROPERTY_MPP_X, PROPERTY_MPP_Y, PROPERTY_OBJECTIVE_POWER,
    PROPERTY_QUICKHASH, PROPERTY_TIFF_IMAGE_DESCRIPTION, PROPERTY_VENDOR,
};
pub(crate) use properties::{init_properties_and_hash, set_resolution_prop};
pub use reader::{AssociatedImageInfo, LevelInfo, SlideReader};
