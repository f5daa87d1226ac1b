use std::collections::BTreeSet;

use stackdraft_core::ItemId;

/// Apply a subsystem delta to a base item set.
///
/// Exclusions are removed first and additions applied last, so an item named
/// in both lists ends up present.
pub fn resolve_effective_items(
    base: &BTreeSet<ItemId>,
    additions: &[ItemId],
    exclusions: &[ItemId],
) -> BTreeSet<ItemId> {
    let mut effective = base.clone();
    for item in exclusions {
        effective.remove(item);
    }
    effective.extend(additions.iter().cloned());
    effective
}

/// The delta that turns `base` into `selected`. Resolving it against the same
/// base reproduces `selected` exactly.
pub fn derive_delta(
    base: &BTreeSet<ItemId>,
    selected: &BTreeSet<ItemId>,
) -> (Vec<ItemId>, Vec<ItemId>) {
    let additions = selected.difference(base).cloned().collect();
    let exclusions = base.difference(selected).cloned().collect();
    (additions, exclusions)
}
