//! Recipe costing backend.
//!
//! Users keep a private catalogue of ingredients (each with a unit cost) and
//! compose recipes from them. Every recipe response carries a per-ingredient
//! line price and a total, recomputed from the stored composition on each
//! read.

pub mod auth;
pub mod composition;
pub mod config;
pub mod db;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod ingredients;
pub mod media;
pub mod models;
pub mod pricing;
pub mod query;
pub mod schema;
