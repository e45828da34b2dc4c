//! EPG (Electronic Program Guide) merging
//!
//! Resolves channel ids, extracts feeds, merges them and writes the result.

mod assemble;
mod element;
mod extract;
mod identity;
mod merge;


// Re-export public types
pub use assemble::AssembleOptions;
pub use merge::MergeStats;

use assemble::{assemble, write_document};
use crate::config::MergeConfig;
use crate::error::Result;
use crate::fetch::Fetch;
use std::path::Path;

/// Merge every configured source and write the guide to `output`.
///
/// Source failures only shrink the result; an error here means the
/// document itself could not be produced or written.
pub fn merge_to_file<F: Fetch + ?Sized>(
    config: &MergeConfig,
    fetcher: &F,
    jobs: usize,
    options: AssembleOptions,
    output: &Path,
) -> Result<MergeStats> {
    let (doc, stats) = merge::merge(config, fetcher, jobs);
    let text = assemble(&doc, options)?;
    write_document(output, &text)?;
    Ok(stats)
}
