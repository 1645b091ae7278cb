//! Consistency checks over a cache.

use pagesync_store::LocalStore;

/// Lists every way the cache breaks its cursor invariants.
///
/// Checked per cached record:
/// - it has exactly one cursor row
/// - `prev_page` is absent on page 1 and `page - 1` elsewhere
/// - `next_page` is absent (end of data) or `page + 1`
///
/// Also checks that no cursor row exists without its record.
pub fn cursor_violations(store: &LocalStore) -> Vec<String> {
    let rows = store.all_records();
    let mut violations = Vec::new();

    if rows.len() != store.remote_key_count() {
        violations.push(format!(
            "{} records but {} cursor rows",
            rows.len(),
            store.remote_key_count()
        ));
    }

    for row in &rows {
        let Some(key) = store.remote_key(row.key()) else {
            violations.push(format!("{} has no cursor row", row.key()));
            continue;
        };
        let expected_prev = (row.page > 1).then(|| row.page - 1);
        if key.prev_page != expected_prev {
            violations.push(format!(
                "{} on page {} has prev_page {:?}",
                row.key(),
                row.page,
                key.prev_page
            ));
        }
        if key.next_page.is_some_and(|next| next != row.page + 1) {
            violations.push(format!(
                "{} on page {} has next_page {:?}",
                row.key(),
                row.page,
                key.next_page
            ));
        }
    }
    violations
}

/// Panics with every violation found by [`cursor_violations`].
pub fn assert_cache_consistent(store: &LocalStore) {
    let violations = cursor_violations(store);
    assert!(violations.is_empty(), "cache inconsistent: {violations:#?}");
}

/// Returns the cache contents as `(key, value, page)` in read order.
///
/// Insertion sequences are left out, so two caches built by the same
/// fetches compare equal.
pub fn cache_contents(store: &LocalStore) -> Vec<(String, String, u32)> {
    store
        .all_records()
        .into_iter()
        .map(|row| (row.record.key, row.record.value, row.page))
        .collect()
}
