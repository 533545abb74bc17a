//! Reorders primary-store results to follow a relevance-ordered key list.

use mirror_types::{AssociationKey, Record};

/// Reorder `results` so entries matching `ordered_keys` come first, in key
/// order. Entries whose key is not listed follow in their original order.
///
/// Each key takes the first remaining match, so nothing is duplicated or
/// dropped. Quadratic, which is fine at page sizes.
pub fn reconcile<T, F>(results: Vec<T>, ordered_keys: &[AssociationKey], key_of: F) -> Vec<T>
where
    F: Fn(&T) -> Option<AssociationKey>,
{
    let mut remaining: Vec<(Option<AssociationKey>, T)> = results
        .into_iter()
        .map(|item| (key_of(&item), item))
        .collect();
    let mut ordered = Vec::with_capacity(remaining.len());

    for key in ordered_keys {
        if let Some(pos) = remaining
            .iter()
            .position(|(candidate, _)| candidate.as_ref() == Some(key))
        {
            ordered.push(remaining.remove(pos).1);
        }
    }

    ordered.extend(remaining.into_iter().map(|(_, item)| item));
    ordered
}

/// Reconcile records by their primary key, looking through the entity alias.
pub fn reconcile_records(
    records: Vec<Record>,
    ordered_keys: &[AssociationKey],
    primary_key: &str,
    alias: &str,
) -> Vec<Record> {
    reconcile(records, ordered_keys, |record| {
        record.unwrap_alias(alias).key_of(primary_key)
    })
}
