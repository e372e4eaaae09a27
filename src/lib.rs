//! Joins per-district benefits data to congressional district boundaries and builds
//! the payload for a choropleth map.

pub mod aggregate;
pub mod config;
pub mod data;
pub mod join;
pub mod normalize;
pub mod render;
pub mod server;
pub mod session;
pub mod spatial;
pub mod table;
pub mod types;
