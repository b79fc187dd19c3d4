//! Mirror deduplication
//!
//! Several servers may carry the same files. Before downloading, each unique
//! basename is assigned to exactly one server, rotating between servers so
//! mirrors share the load instead of the first server serving everything.

use crate::RemoteFileReference;
use std::collections::HashSet;

/// Remove duplicate basenames across per-server lists.
///
/// Servers take turns claiming their next unclaimed file; a file already
/// claimed by another server is dropped from every later list. Each
/// basename appears exactly once in the output. Lists stay aligned with the
/// input (index `i` of the output belongs to server `i`).
pub fn deduplicate(lists: Vec<Vec<RemoteFileReference>>) -> Vec<Vec<RemoteFileReference>> {
    let mut claimed: HashSet<String> = HashSet::new();
    let mut output: Vec<Vec<RemoteFileReference>> = lists.iter().map(|_| Vec::new()).collect();
    let mut cursors: Vec<std::vec::IntoIter<RemoteFileReference>> =
        lists.into_iter().map(Vec::into_iter).collect();

    let mut active = cursors.len();
    while active > 0 {
        active = 0;
        for (server, cursor) in cursors.iter_mut().enumerate() {
            // Advance this server to its next unclaimed file.
            for file in cursor.by_ref() {
                if claimed.insert(file.basename.clone()) {
                    output[server].push(file);
                    active += 1;
                    break;
                }
            }
        }
    }

    output
}

/// Total files across all lists
pub fn total_files(lists: &[Vec<RemoteFileReference>]) -> usize {
    lists.iter().map(Vec::len).sum()
}
