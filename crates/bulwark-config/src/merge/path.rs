/// Navigate into a nested table by path segments.
pub(super) fn get_nested<'a>(val: &'a toml::Value, path: &[&str]) -> Option<&'a toml::Value> {
    path.iter()
        .try_fold(val, |current, segment| current.as_table()?.get(*segment))
}

/// The table holding the leaf of `path`, if every parent exists.
fn parent_table_mut<'a>(
    val: &'a mut toml::Value,
    parents: &[&str],
) -> Option<&'a mut toml::map::Map<String, toml::Value>> {
    parents
        .iter()
        .try_fold(val, |current, segment| {
            current.as_table_mut()?.get_mut(*segment)
        })?
        .as_table_mut()
}

/// Set a value at a nested path. Missing parent tables leave `val` unchanged.
pub(super) fn set_nested(val: &mut toml::Value, path: &[&str], new_val: toml::Value) {
    let Some((leaf, parents)) = path.split_last() else {
        return;
    };
    match parent_table_mut(val, parents) {
        Some(table) => {
            table.insert((*leaf).to_owned(), new_val);
        },
        None => tracing::warn!(path = %path.join("."), "missing parent table; value not set"),
    }
}

/// Remove the value at a nested path.
pub(super) fn remove_nested(val: &mut toml::Value, path: &[&str]) {
    if let Some((leaf, parents)) = path.split_last()
        && let Some(table) = parent_table_mut(val, parents)
    {
        table.remove(*leaf);
    }
}
