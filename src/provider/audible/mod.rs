//! Audible catalog + Audnexus integration
//!
//! Search goes to the Audible catalog products endpoint; lookups by ASIN go
//! to Audnexus, which returns richer records (genres, primary series).
//!
//! Catalog API: https://audible.readthedocs.io/en/latest/misc/external_api.html
//! Audnexus: https://audnex.us

pub mod dto;
mod adapter;
mod client;

pub use adapter::{from_audnexus, from_catalog_product};
pub use client::{AudibleProvider, catalog_base_url_for_region};
