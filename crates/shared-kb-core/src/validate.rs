//! Input validation for index creation and query submission.

use crate::error::ValidationError;
use crate::models::Document;

/// Reject a blank name or an empty selection before anything is looked up.
pub fn validate_index_request(name: &str, selected: &[String]) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyIndexName);
    }
    if selected.is_empty() {
        return Err(ValidationError::EmptySelection);
    }
    Ok(())
}

/// Resolve a selection against the current collection.
///
/// Keeps only documents that exist and are `Completed`, in collection
/// order, each at most once. Fails when nothing survives the filter.
pub fn select_completed(
    documents: &[Document],
    selected: &[String],
) -> Result<Vec<Document>, ValidationError> {
    let snapshot: Vec<Document> = documents
        .iter()
        .filter(|d| d.is_completed() && selected.iter().any(|id| *id == d.id))
        .cloned()
        .collect();
    if snapshot.is_empty() {
        return Err(ValidationError::EmptySelection);
    }
    Ok(snapshot)
}

/// Check that a query names an index and carries non-blank text.
pub fn validate_query<'a>(
    index_id: Option<&'a str>,
    text: &str,
) -> Result<&'a str, ValidationError> {
    let index_id = match index_id {
        Some(id) if !id.trim().is_empty() => id,
        _ => return Err(ValidationError::NoIndexSelected),
    };
    if text.trim().is_empty() {
        return Err(ValidationError::BlankQuery);
    }
    Ok(index_id)
}
