pub mod app;
mod catalog;
pub mod config;
pub mod domain;
pub mod error;
pub mod fs_util;
pub mod output;
pub mod parsers;
pub mod plan;
pub mod query;
pub mod registry;
pub mod store;
pub mod template;
pub mod transport;
pub mod version;
