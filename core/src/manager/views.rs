//! The views the projection cache is built from.
//!
//! Changing what a view emits, or which documents it looks at, requires bumping its
//! version so that existing databases reindex.

use std::collections::BTreeSet;

use serde_json::{json, Value};

use crate::model::doc_type;
use crate::store::{Database, View};

pub const SECTIONS_VIEW: &str = "sections";
pub const SECTIONS_VERSION: &str = "1";
pub const FILES_VIEW: &str = "files";
pub const FILES_VERSION: &str = "1";
pub const TAGS_VIEW: &str = "tags";
pub const TAGS_VERSION: &str = "3";

/// `(id, document)` for every section.
pub fn sections_view() -> View {
    View::new(SECTIONS_VIEW, SECTIONS_VERSION, |doc, emit| {
        if doc.doc_type() == Some(doc_type::SECTION) {
            emit.emit(json!(doc.id()), doc.to_value());
        }
    })
}

/// `(id, document)` for every file.
pub fn files_view() -> View {
    View::new(FILES_VIEW, FILES_VERSION, |doc, emit| {
        if doc.doc_type() == Some(doc_type::FILE) {
            emit.emit(json!(doc.id()), doc.to_value());
        }
    })
}

/// `(tag, 1)` for every distinct tag of every file, summed per tag.
pub fn tags_view() -> View {
    View::new(TAGS_VIEW, TAGS_VERSION, |doc, emit| {
        if doc.doc_type() != Some(doc_type::FILE) {
            return;
        }
        if let Some(tags) = doc.get("tags").and_then(Value::as_array) {
            let tags: BTreeSet<&str> = tags.iter().filter_map(Value::as_str).collect();
            for tag in tags {
                emit.emit(json!(tag), json!(1));
            }
        }
    })
    .with_reduce(|_keys, values, _rereduce| sum(values))
}

// Reduce and rereduce are the same: partial counts add up.
fn sum(values: &[Value]) -> Value {
    json!(values.iter().filter_map(Value::as_u64).sum::<u64>())
}

pub fn define_views(database: &Database) {
    database.define_view(sections_view());
    database.define_view(files_view());
    database.define_view(tags_view());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Query;
    use tempfile::tempdir;

    #[test]
    fn test_tags_reduce_sums_partials() {
        let view = tags_view();
        assert_eq!(view.reduce(&[], &[json!(1), json!(1), json!(1)], false), Some(json!(3)));
        assert_eq!(view.reduce(&[], &[json!(2), json!(5)], true), Some(json!(7)));
    }

    #[tokio::test]
    async fn test_views_filter_by_type() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path(), "southlake").await.unwrap();
        define_views(&db);

        let mut file = crate::store::Document::with_id("f");
        file.set("type", json!("file")).set("tags", json!(["x", "y", "x"]));
        let mut section = crate::store::Document::with_id("s");
        section.set("type", json!("section")).set("tags", json!(["ignored"]));
        db.put(file).await.unwrap();
        db.put(section).await.unwrap();

        let files = db.query(&Query::new(FILES_VIEW)).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].key, json!("f"));
        assert_eq!(files[0].value["tags"], json!(["x", "y", "x"]));

        let sections = db.query(&Query::new(SECTIONS_VIEW)).unwrap();
        assert_eq!(sections.len(), 1);

        let tags = db.query(&Query::new(TAGS_VIEW).group_level(1)).unwrap();
        let tags: Vec<_> = tags.into_iter().map(|r| (r.key, r.value)).collect();
        // A file repeating a tag still counts once for it.
        assert_eq!(tags, vec![(json!("x"), json!(1)), (json!("y"), json!(1))]);

        let total = db.query(&Query::new(TAGS_VIEW)).unwrap();
        assert_eq!(total[0].value, json!(2));
    }

    #[tokio::test]
    async fn test_redefining_views_is_a_no_op() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path(), "southlake").await.unwrap();
        define_views(&db);
        let sequence = db.sequence();
        define_views(&db);
        assert_eq!(db.sequence(), sequence);
        assert_eq!(db.view(TAGS_VIEW).unwrap().version(), TAGS_VERSION);
    }
}
