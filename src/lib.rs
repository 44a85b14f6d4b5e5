//! Shelf application library
//!
//! Book catalog module: record store gateway, HTTP routes and wire models.

pub mod modules;

pub use modules::register_all;
