use serde::Deserialize;
use serde_json::json;

use crate::store::Document;

use super::{decode_body, doc_type, uti, DataSource, DecodeError};

/// A top-level navigational grouping, such as the notebook or the folders section.
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub id: String,
    pub rev: Option<String>,
    pub title: Option<String>,
    pub uti: String,
    /// Display position among sections. Only used for ordering.
    pub index: i64,
    /// Ids of the child data sources, in display order. Stored as `children`.
    pub child_ids: Vec<String>,
    /// Child data sources resolved from `child_ids` by the projection cache.
    /// Never persisted.
    pub children: Vec<DataSource>,
}

#[derive(Deserialize)]
struct SectionBody {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    uti: Option<String>,
    #[serde(default)]
    index: i64,
    #[serde(default)]
    children: Vec<String>,
}

impl Section {
    /// An unsaved section with a fresh id.
    pub fn new(uti: impl Into<String>, index: i64) -> Self {
        Section {
            id: Document::new().id().to_string(),
            rev: None,
            title: None,
            uti: uti.into(),
            index,
            child_ids: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_child_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.child_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn from_document(document: &Document) -> Result<Self, DecodeError> {
        let body: SectionBody = decode_body(document)?;
        Ok(Section {
            id: document.id().to_string(),
            rev: document.rev().map(str::to_string),
            title: body.title,
            uti: body.uti.unwrap_or_else(|| uti::SECTION.to_string()),
            index: body.index,
            child_ids: body.children,
            children: Vec::new(),
        })
    }

    /// The document this section is stored as. Resolved children are not included.
    pub fn to_document(&self) -> Document {
        let mut document = Document::with_id(self.id.clone());
        document.set_rev(self.rev.clone());
        document
            .set("type", json!(doc_type::SECTION))
            .set("uti", json!(self.uti))
            .set("index", json!(self.index))
            .set("children", json!(self.child_ids));
        if let Some(title) = &self.title {
            document.set("title", json!(title));
        }
        document
    }

    /// First resolved child carrying `uti`.
    pub fn child_with_uti(&self, uti: &str) -> Option<&DataSource> {
        self.children.iter().find(|child| child.uti == uti)
    }
}
