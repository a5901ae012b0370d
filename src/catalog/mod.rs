//! Shipped source tables.
//!
//! Sources whose releases need 7z, protobuf, RDF or parquet decoding are not
//! listed here.

use crate::error::KiraError;
use crate::registry::SourceDescriptor;

mod compound;
mod reaction;

pub(crate) fn descriptors() -> Result<Vec<SourceDescriptor>, KiraError> {
    let mut descriptors = compound::descriptors()?;
    descriptors.extend(reaction::descriptors()?);
    Ok(descriptors)
}
