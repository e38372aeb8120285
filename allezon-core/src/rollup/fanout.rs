//! Power-set enumeration over filterable dimensions.

/// Every subset of `items` by position, relative order preserved.
///
/// Yields exactly `2^items.len()` subsets, starting with the empty one.
/// Equal values at different positions count as distinct.
pub fn power_set<T: Clone>(items: &[T]) -> impl Iterator<Item = Vec<T>> + '_ {
    debug_assert!(items.len() < usize::BITS as usize);
    let total = 1usize << items.len();
    (0..total).map(move |mask| {
        items
            .iter()
            .enumerate()
            .filter(|(position, _)| mask & (1 << position) != 0)
            .map(|(_, item)| item.clone())
            .collect()
    })
}
