// Revision resolver: list the stored versions of a key in chronological
// order and turn a 1-based user choice into a revision.

use tracing::debug;

use crate::error::Result;
use crate::format::describe_revision;
use crate::prompt::{choose, select_one, Prompter};
use crate::store::{RemoteStore, RevisionDescriptor, StoreError};

/// How many revisions are fetched when the caller does not say.
pub const DEFAULT_REVISION_LIMIT: u32 = 30;

/// Returns up to `limit` revisions of `remote_key`, oldest first.
///
/// A key without history (including one the store has never seen) gives
/// an empty list. Revisions with equal timestamps keep the store's order.
pub fn list_revisions(
    store: &dyn RemoteStore,
    remote_key: &str,
    limit: u32,
) -> Result<Vec<RevisionDescriptor>> {
    let mut revisions = match store.list_revisions(remote_key, limit) {
        Ok(revisions) => revisions,
        Err(StoreError::NotFound(detail)) => {
            debug!(key = remote_key, %detail, "no revision history");
            return Ok(Vec::new());
        }
        Err(err) => return Err(err.into()),
    };

    revisions.sort_by_key(|rev| rev.modified_at);

    let limit = limit as usize;
    if revisions.len() > limit {
        let excess = revisions.len() - limit;
        revisions.drain(..excess);
    }
    Ok(revisions)
}

/// Picks the revision at 1-based `index`; `0` aborts with `Ok(None)` and
/// any other out-of-range index is `Error::InvalidSelection`.
pub fn select_revision(
    revisions: &[RevisionDescriptor],
    index: i64,
) -> Result<Option<&RevisionDescriptor>> {
    select_one(revisions, index)
}

/// Shows `revisions` and keeps asking until the user picks one or enters 0.
pub fn prompt_for_revision(
    prompter: &mut dyn Prompter,
    revisions: &[RevisionDescriptor],
) -> Result<Option<RevisionDescriptor>> {
    let picked = choose(
        prompter,
        "Enter the number of the revision to restore (Enter 0 to quit)",
        revisions,
        describe_revision,
    )?;
    Ok(picked.cloned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::testing::{revision, Call, MemoryStore, Op, ScriptedPrompter};

    #[test]
    fn sorts_oldest_first_and_keeps_ties_in_listing_order() {
        let store = MemoryStore::new();
        store.add_revision("/b/f", revision("c", 3, 300), b"c");
        store.add_revision("/b/f", revision("a", 1, 100), b"a");
        store.add_revision("/b/f", revision("b1", 2, 200), b"b1");
        store.add_revision("/b/f", revision("b2", 2, 200), b"b2");

        let revs = list_revisions(&store, "/b/f", 30).unwrap();
        let ids: Vec<_> = revs.iter().map(|r| r.revision_id.as_str()).collect();
        assert_eq!(ids, ["a", "b1", "b2", "c"]);
        assert_eq!(
            store.calls(),
            vec![Call::ListRevisions {
                key: "/b/f".into(),
                limit: 30
            }]
        );
    }

    #[test]
    fn key_without_history_is_empty() {
        let store = MemoryStore::new();
        assert!(list_revisions(&store, "/b/unknown", 30).unwrap().is_empty());
    }

    #[test]
    fn other_store_errors_propagate() {
        let store = MemoryStore::new();
        store.fail(Op::ListRevisions, || {
            StoreError::Auth("expired_access_token".into())
        });
        let err = list_revisions(&store, "/b/f", 30).unwrap_err();
        assert!(matches!(err, Error::Remote { .. }));
    }

    #[test]
    fn select_zero_aborts() {
        let revs = vec![revision("a", 1, 1)];
        assert!(select_revision(&revs, 0).unwrap().is_none());
    }

    #[test]
    fn select_out_of_range_is_recoverable() {
        let revs = vec![revision("a", 1, 1), revision("b", 1, 2)];
        assert_eq!(select_revision(&revs, 2).unwrap().unwrap().revision_id, "b");
        assert!(matches!(
            select_revision(&revs, 3),
            Err(Error::InvalidSelection { index: 3, max: 2 })
        ));
        assert!(matches!(
            select_revision(&revs, -1),
            Err(Error::InvalidSelection { index: -1, max: 2 })
        ));
    }

    #[test]
    fn prompt_lists_revisions_and_retries_until_valid() {
        let revs = vec![revision("0a1", 1, 1), revision("0b2", 2048, 2)];
        let mut prompter = ScriptedPrompter::new()
            .select_with(5)
            .select_with(-1)
            .select_with(2);
        let choice = prompt_for_revision(&mut prompter, &revs).unwrap();
        assert_eq!(choice.unwrap().revision_id, "0b2");
        assert_eq!(prompter.asked.len(), 3);
        assert_eq!(prompter.shown.len(), 2);
        assert!(prompter.shown[1].starts_with("2.0 KB "));
        assert!(prompter.shown[1].ends_with(" 0b2"));
    }

    #[test]
    fn prompt_zero_quits() {
        let revs = vec![revision("a", 1, 1)];
        let mut prompter = ScriptedPrompter::new().select_with(0);
        assert!(prompt_for_revision(&mut prompter, &revs).unwrap().is_none());
    }
}
