//! Component repository materialization.
//!
//! Each manifest entry maps a component name to an ordered list of mirror
//! URLs that all produce the same tree at `custom_nodes/<name>/`. Mirrors
//! are tried in order; each gets the full clone retry budget before the
//! next one is tried.

mod error;
mod materializer;

pub use error::CloneError;
pub use materializer::RepositoryMaterializer;
