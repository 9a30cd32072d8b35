use crate::config::Context;
use crate::error::StepError;
use crate::output::Output;

use super::{index, partials};

/// The index with everything it references, plus the partials served next
/// to it.
pub fn build_app_dev(ctx: &Context) -> Result<Vec<Output>, StepError> {
    let (index, partials) = rayon::join(
        || index::build_index_dev(ctx),
        || partials::build_partials_dev(ctx),
    );

    let mut outputs = index?;
    outputs.extend(partials?);
    Ok(outputs)
}

/// Partials are part of the app bundle in prod, so the index covers
/// everything.
pub fn build_app_prod(ctx: &Context) -> Result<Vec<Output>, StepError> {
    index::build_index_prod(ctx)
}
