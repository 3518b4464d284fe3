//! JSON snapshots of committed collection state.
//!
//! Snapshots read through the plain driver path, so they only ever show
//! committed data. Documents are ordered by `_id`.

use ambientdb_driver::{Collection, Document, Filter, FindOptions, SortOrder};

/// Committed documents of a collection, ordered by `_id`.
pub fn committed_documents<C: Collection>(collection: &C) -> Vec<Document> {
    collection
        .find(
            Filter::All,
            FindOptions::new().sort(Document::ID_FIELD, SortOrder::Ascending),
        )
        .expect("Failed to read committed documents")
}

/// Pretty JSON of a collection's committed documents.
pub fn snapshot_json<C: Collection>(collection: &C) -> String {
    serde_json::to_string_pretty(&committed_documents(collection))
        .expect("Failed to serialize snapshot")
}

/// Asserts that two collections hold the same committed documents.
///
/// On mismatch the panic message carries both snapshots.
pub fn assert_same_contents<A: Collection, B: Collection>(left: &A, right: &B) {
    let left_docs = committed_documents(left);
    let right_docs = committed_documents(right);
    assert!(
        left_docs == right_docs,
        "collections differ\nleft {}: {}\nright {}: {}",
        left.namespace(),
        snapshot_json(left),
        right.namespace(),
        snapshot_json(right)
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use ambientdb_driver::memory::MemoryClient;
    use ambientdb_driver::{doc, Client, Database};

    #[test]
    fn snapshot_is_ordered_json() {
        let client = MemoryClient::new();
        let coll = client.database("app").collection("items");
        coll.insert_one(doc! { "_id": 2, "name": "b" }).unwrap();
        coll.insert_one(doc! { "_id": 1, "name": "a" }).unwrap();

        let json: serde_json::Value = serde_json::from_str(&snapshot_json(&coll)).unwrap();
        let items = json.as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert!(items[0].to_string().contains("\"a\""));
    }

    #[test]
    fn same_contents_across_databases() {
        let client = MemoryClient::new();
        let left = client.database("one").collection("items");
        let right = client.database("two").collection("items");
        left.insert_one(doc! { "_id": 1 }).unwrap();
        right.insert_one(doc! { "_id": 1 }).unwrap();
        assert_same_contents(&left, &right);
    }
}
