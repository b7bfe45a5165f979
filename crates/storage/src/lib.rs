//! Local site sources.
//!
//! A site source is the read side of a deployment: it lists the files that
//! make up a site and hands their bytes to the deployment engine. The engine
//! treats a source purely as a `(path, bytes)` iterator; which files are
//! visible (ignore rules, hidden files) is decided here, not there.

pub mod backend;
pub mod error;
mod ignore;
mod models;
mod path;

pub use crate::backend::SiteSource;
pub use crate::ignore::IgnoreRules;
pub use crate::models::SourceFile;
pub use crate::path::{to_site_path, validate as validate_path};
use std::sync::Arc;

pub type SourceHandle = Arc<dyn SiteSource + Send + Sync>;
