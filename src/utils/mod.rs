//! Helper functions used across the application.
//!
//! - [`code_generator`] - Random short code generation
//! - [`long_url`] - Long URL parsing and canonicalisation
//! - [`money`] - Range and precision of stored amounts

pub mod code_generator;
pub mod long_url;
pub mod money;
