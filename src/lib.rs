//! Cubox to Markdown vault sync library
//!
//! This library pulls cards and highlights from a Cubox account, renders each one
//! through user templates, and writes them as Markdown notes with YAML front matter.
//! Progress is checkpointed so an interrupted run resumes where it stopped.

mod api;
mod article;
mod cli;
mod config;
mod errors;
mod filter;
mod helper;
mod scheduler;
mod sync;
mod template;
mod types;
mod vault;

// Re-export key components
pub use api::*;
pub use article::*;
pub use cli::*;
pub use config::*;
pub use errors::*;
pub use filter::*;
pub use helper::*;
pub use scheduler::*;
pub use sync::*;
pub use template::*;
pub use types::*;
pub use vault::*;
