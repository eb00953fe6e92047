use tracing::{debug, info, instrument};

use crate::model::{uti, DataSource, Section};
use crate::store::{Database, Result};

/// Writes the default sections and significant data sources into an empty
/// database. Returns `false` without writing anything if the database already
/// holds documents.
#[instrument(skip(database), fields(database = database.name()))]
pub async fn seed_default_structure(database: &Database) -> Result<bool> {
    if database.document_count() > 0 {
        debug!("Database is not empty, not seeding");
        return Ok(false);
    }

    let sources = [
        DataSource::node("Library", uti::LIBRARY).with_id("library"),
        DataSource::node("Calendar", uti::CALENDAR).with_id("calendar"),
        DataSource::node("Tags", uti::TAGS).with_id("tags"),
        DataSource::node("Trash", uti::TRASH).with_id("trash"),
        DataSource::folder("Inbox").with_uti(uti::INBOX).with_id("inbox"),
    ];
    let sections = [
        Section::new(uti::NOTEBOOK, 0)
            .with_id("notebook")
            .with_title("Notebook")
            .with_child_ids(["library", "calendar", "tags", "trash"]),
        Section::new(uti::SHORTCUTS, 1).with_id("shortcuts").with_title("Shortcuts"),
        Section::new(uti::FOLDERS, 2)
            .with_id("folders")
            .with_title("Folders")
            .with_child_ids(["inbox"]),
        Section::new(uti::SMART_FOLDERS, 3).with_id("smart-folders").with_title("Smart Folders"),
    ];

    // Children first, so a section is never seen with unresolvable children.
    for source in &sources {
        database.put(source.to_document()).await?;
    }
    for section in &sections {
        database.put(section.to_document()).await?;
    }

    info!("Seeded {} sections and {} data sources", sections.len(), sources.len());
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelRegistry;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_seeds_empty_database_once() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path(), "southlake").await.unwrap();

        assert!(seed_default_structure(&db).await.unwrap());
        assert_eq!(db.document_count(), 9);
        let sequence = db.sequence();

        assert!(!seed_default_structure(&db).await.unwrap());
        assert_eq!(db.sequence(), sequence);
    }

    #[tokio::test]
    async fn test_seeded_documents_decode() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path(), "southlake").await.unwrap();
        seed_default_structure(&db).await.unwrap();

        let models = ModelRegistry::with_default_models();
        let folders = models.decode_section(&db.get("folders").unwrap()).unwrap();
        assert_eq!(folders.uti, uti::FOLDERS);
        assert_eq!(folders.child_ids, ["inbox"]);

        let inbox = models.decode_data_source(&db.get("inbox").unwrap()).unwrap();
        assert_eq!(inbox.uti, uti::INBOX);
        assert!(inbox.rev.is_some());
    }
}
