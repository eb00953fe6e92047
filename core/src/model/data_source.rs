use std::collections::BTreeSet;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use crate::store::Document;

use super::{decode_body, doc_type, invalid, uti, DecodeError};

/// Anything that can be shown in the source list or a collection: files, folders,
/// smart folders and the special library/calendar/tags/inbox nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSource {
    pub id: String,
    pub rev: Option<String>,
    pub title: String,
    /// Type tag used to pick an editor and to find the special nodes.
    pub uti: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub kind: DataSourceKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DataSourceKind {
    File {
        /// Uti, extension or MIME type of the content.
        filetype: String,
        tags: BTreeSet<String>,
        content: Vec<u8>,
    },
    Folder {
        child_ids: Vec<String>,
    },
    /// Membership is given by `predicates` rather than explicit children.
    SmartFolder {
        child_ids: Vec<String>,
        predicates: Vec<String>,
    },
    Node,
}

#[derive(Deserialize)]
struct Common {
    #[serde(default)]
    title: String,
    #[serde(default)]
    uti: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct FileBody {
    #[serde(default)]
    filetype: String,
    #[serde(default)]
    tags: BTreeSet<String>,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct FolderBody {
    #[serde(default)]
    children: Vec<String>,
    #[serde(default)]
    predicates: Vec<String>,
}

impl DataSource {
    fn with_kind(title: impl Into<String>, uti: impl Into<String>, kind: DataSourceKind) -> Self {
        let now = Utc::now();
        DataSource {
            id: Document::new().id().to_string(),
            rev: None,
            title: title.into(),
            uti: uti.into(),
            created_at: Some(now),
            updated_at: Some(now),
            kind,
        }
    }

    pub fn file(title: impl Into<String>, filetype: impl Into<String>) -> Self {
        let kind = DataSourceKind::File {
            filetype: filetype.into(),
            tags: BTreeSet::new(),
            content: Vec::new(),
        };
        Self::with_kind(title, uti::FILE, kind)
    }

    pub fn folder(title: impl Into<String>) -> Self {
        Self::with_kind(title, uti::FOLDER, DataSourceKind::Folder { child_ids: Vec::new() })
    }

    pub fn smart_folder<I, S>(title: impl Into<String>, predicates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let kind = DataSourceKind::SmartFolder {
            child_ids: Vec::new(),
            predicates: predicates.into_iter().map(Into::into).collect(),
        };
        Self::with_kind(title, uti::SMART_FOLDER, kind)
    }

    /// A plain data source, distinguished only by its `uti`.
    pub fn node(title: impl Into<String>, uti: impl Into<String>) -> Self {
        Self::with_kind(title, uti, DataSourceKind::Node)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_uti(mut self, uti: impl Into<String>) -> Self {
        self.uti = uti.into();
        self
    }

    /// Sets the tags of a file. Has no effect on other kinds.
    pub fn with_tags<I, S>(mut self, new_tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let DataSourceKind::File { tags, .. } = &mut self.kind {
            *tags = new_tags.into_iter().map(Into::into).collect();
        }
        self
    }

    /// Sets the content of a file. Has no effect on other kinds.
    pub fn with_content(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        if let DataSourceKind::File { content, .. } = &mut self.kind {
            *content = bytes.into();
        }
        self
    }

    /// Sets the children of a folder or smart folder. Has no effect on other kinds.
    pub fn with_child_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        match &mut self.kind {
            DataSourceKind::Folder { child_ids } | DataSourceKind::SmartFolder { child_ids, .. } => {
                *child_ids = ids.into_iter().map(Into::into).collect();
            }
            DataSourceKind::File { .. } | DataSourceKind::Node => {}
        }
        self
    }

    pub fn is_file(&self) -> bool {
        matches!(self.kind, DataSourceKind::File { .. })
    }

    pub fn tags(&self) -> Option<&BTreeSet<String>> {
        match &self.kind {
            DataSourceKind::File { tags, .. } => Some(tags),
            _ => None,
        }
    }

    pub fn filetype(&self) -> Option<&str> {
        match &self.kind {
            DataSourceKind::File { filetype, .. } => Some(filetype),
            _ => None,
        }
    }

    pub fn child_ids(&self) -> &[String] {
        match &self.kind {
            DataSourceKind::Folder { child_ids } | DataSourceKind::SmartFolder { child_ids, .. } => child_ids,
            DataSourceKind::File { .. } | DataSourceKind::Node => &[],
        }
    }

    /// The document `type` this data source is stored under.
    pub fn doc_type(&self) -> &'static str {
        match self.kind {
            DataSourceKind::File { .. } => doc_type::FILE,
            DataSourceKind::Folder { .. } => doc_type::FOLDER,
            DataSourceKind::SmartFolder { .. } => doc_type::SMART_FOLDER,
            DataSourceKind::Node => doc_type::DATA_SOURCE,
        }
    }

    /// Decodes a `file`, `folder`, `smart_folder` or `datasource` document.
    pub fn from_document(document: &Document) -> Result<Self, DecodeError> {
        let common: Common = decode_body(document)?;
        let (kind, default_uti) = match document.doc_type() {
            Some(doc_type::FILE) => {
                let body: FileBody = decode_body(document)?;
                let content = match body.content {
                    Some(encoded) => STANDARD.decode(encoded).map_err(|e| invalid(document, e))?,
                    None => Vec::new(),
                };
                (DataSourceKind::File { filetype: body.filetype, tags: body.tags, content }, uti::FILE)
            }
            Some(doc_type::FOLDER) => {
                let body: FolderBody = decode_body(document)?;
                (DataSourceKind::Folder { child_ids: body.children }, uti::FOLDER)
            }
            Some(doc_type::SMART_FOLDER) => {
                let body: FolderBody = decode_body(document)?;
                let kind = DataSourceKind::SmartFolder { child_ids: body.children, predicates: body.predicates };
                (kind, uti::SMART_FOLDER)
            }
            Some(doc_type::DATA_SOURCE) => (DataSourceKind::Node, uti::DATA_SOURCE),
            _ => return Err(invalid(document, "not a data source type")),
        };

        Ok(DataSource {
            id: document.id().to_string(),
            rev: document.rev().map(str::to_string),
            title: common.title,
            uti: common.uti.unwrap_or_else(|| default_uti.to_string()),
            created_at: common.created_at,
            updated_at: common.updated_at,
            kind,
        })
    }

    pub fn to_document(&self) -> Document {
        let mut document = Document::with_id(self.id.clone());
        document.set_rev(self.rev.clone());
        document
            .set("type", json!(self.doc_type()))
            .set("title", json!(self.title))
            .set("uti", json!(self.uti));
        if let Some(created_at) = self.created_at {
            document.set("created_at", json!(created_at));
        }
        if let Some(updated_at) = self.updated_at {
            document.set("updated_at", json!(updated_at));
        }

        match &self.kind {
            DataSourceKind::File { filetype, tags, content } => {
                document.set("filetype", json!(filetype)).set("tags", json!(tags));
                if !content.is_empty() {
                    document.set("content", json!(STANDARD.encode(content)));
                }
            }
            DataSourceKind::Folder { child_ids } => {
                document.set("children", json!(child_ids));
            }
            DataSourceKind::SmartFolder { child_ids, predicates } => {
                document.set("children", json!(child_ids)).set("predicates", json!(predicates));
            }
            DataSourceKind::Node => {}
        }
        document
    }

    /// Marks the data source as modified now.
    pub fn touch(&mut self) {
        self.updated_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_document_round_trip() {
        let file = DataSource::file("Meeting notes", "markdown")
            .with_id("notes")
            .with_tags(["work", "meetings"])
            .with_content(b"# Agenda".to_vec());
        let doc = file.to_document();

        assert_eq!(doc.doc_type(), Some("file"));
        assert_eq!(doc.get("tags"), Some(&json!(["meetings", "work"])));
        assert_eq!(doc.get("content"), Some(&json!("IyBBZ2VuZGE=")));
        assert_eq!(DataSource::from_document(&doc).unwrap(), file);
    }

    #[test]
    fn test_smart_folder_keeps_predicates() {
        let folder = DataSource::smart_folder("Recent", ["updated_at > now - 7d"]).with_id("recent");
        let decoded = DataSource::from_document(&folder.to_document()).unwrap();
        assert_eq!(decoded.uti, uti::SMART_FOLDER);
        match decoded.kind {
            DataSourceKind::SmartFolder { predicates, .. } => assert_eq!(predicates, vec!["updated_at > now - 7d"]),
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn test_node_keeps_uti() {
        let inbox = DataSource::folder("Inbox").with_uti(uti::INBOX).with_child_ids(["a"]);
        let decoded = DataSource::from_document(&inbox.to_document()).unwrap();
        assert_eq!(decoded.uti, uti::INBOX);
        assert_eq!(decoded.child_ids(), ["a".to_string()]);
        assert!(decoded.tags().is_none());
    }

    #[test]
    fn test_defaults_and_errors() {
        let doc = Document::from_value(json!({ "_id": "f", "type": "file" })).unwrap();
        let file = DataSource::from_document(&doc).unwrap();
        assert_eq!(file.uti, uti::FILE);
        assert_eq!(file.tags().map(BTreeSet::len), Some(0));
        assert!(file.created_at.is_none());

        let bad_content = Document::from_value(json!({ "_id": "g", "type": "file", "content": "%%%" })).unwrap();
        assert!(matches!(DataSource::from_document(&bad_content), Err(DecodeError::InvalidDocument { .. })));

        let section = Document::from_value(json!({ "_id": "s", "type": "section" })).unwrap();
        assert!(DataSource::from_document(&section).is_err());
    }

    #[test]
    fn test_builders_ignore_other_kinds() {
        let node = DataSource::node("Library", uti::LIBRARY).with_tags(["x"]).with_content(b"y".to_vec());
        assert_eq!(node.kind, DataSourceKind::Node);
        assert!(!node.is_file());
        assert!(node.filetype().is_none());
    }

    #[test]
    fn test_touch_advances_update_time() {
        let mut file = DataSource::file("a", "md");
        let before = file.updated_at;
        file.touch();
        assert!(file.updated_at >= before);
    }
}
