//! Typed records decoded from store documents.
//!
//! Every document carries a `type` discriminator. A [`ModelRegistry`] maps each
//! discriminator to a decoder that turns the document into a [`Record`]; documents
//! whose type is not registered, or whose fields do not fit the registered type,
//! fail with a [`DecodeError`] instead of being cast blindly.

pub use self::data_source::{DataSource, DataSourceKind};
pub use self::section::Section;
pub use self::tag::Tag;

mod data_source;
mod section;
mod tag;

use std::collections::HashMap;

use thiserror::Error;

use crate::store::Document;

/// Document `type` discriminators.
pub mod doc_type {
    pub const SECTION: &str = "section";
    pub const FOLDER: &str = "folder";
    pub const SMART_FOLDER: &str = "smart_folder";
    pub const FILE: &str = "file";
    /// Plain data sources such as the library or calendar nodes.
    pub const DATA_SOURCE: &str = "datasource";
}

/// Stable type tags used to classify and locate records.
pub mod uti {
    pub const DATA_SOURCE: &str = "southlake.source-item";
    pub const SECTION: &str = "southlake.section";
    pub const FOLDER: &str = "southlake.folder";
    pub const SMART_FOLDER: &str = "southlake.smart-folder";
    pub const FILE: &str = "southlake.file";

    pub const NOTEBOOK: &str = "southlake.notebook";
    pub const SHORTCUTS: &str = "southlake.shortcuts";
    pub const FOLDERS: &str = "southlake.folders";
    pub const SMART_FOLDERS: &str = "southlake.smart-folders";

    pub const LIBRARY: &str = "southlake.notebook.library";
    pub const CALENDAR: &str = "southlake.notebook.calendar";
    pub const TAGS: &str = "southlake.notebook.tags";
    pub const TRASH: &str = "southlake.notebook.trash";
    pub const INBOX: &str = "southlake.inbox";

    pub const MARKDOWN: &str = "net.daringfireball.markdown";
    pub const PDF: &str = "com.adobe.pdf";
}

/// A decoded document.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Section(Section),
    DataSource(DataSource),
}

impl Record {
    pub fn id(&self) -> &str {
        match self {
            Record::Section(section) => &section.id,
            Record::DataSource(source) => &source.id,
        }
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Document {0} has no type")]
    MissingType(String),

    #[error("Document {id} has unregistered type {doc_type:?}")]
    UnregisteredType { id: String, doc_type: String },

    #[error("Document {id} is not a valid {doc_type}: {reason}")]
    InvalidDocument { id: String, doc_type: String, reason: String },

    #[error("Document {id} decoded to a {found}, expected a {expected}")]
    UnexpectedRecord { id: String, expected: &'static str, found: &'static str },
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Document type must not be empty")]
    EmptyType,

    #[error("Document type {0:?} is already registered")]
    DuplicateType(String),
}

/// Turns a document of a registered type into a [`Record`].
pub type Decoder = fn(&Document) -> Result<Record, DecodeError>;

/// Maps document type discriminators to decoders.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    decoders: HashMap<String, Decoder>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the application's record types registered.
    pub fn with_default_models() -> Self {
        let defaults: [(&str, Decoder); 5] = [
            (doc_type::SECTION, |doc| Section::from_document(doc).map(Record::Section)),
            (doc_type::FOLDER, |doc| DataSource::from_document(doc).map(Record::DataSource)),
            (doc_type::SMART_FOLDER, |doc| DataSource::from_document(doc).map(Record::DataSource)),
            (doc_type::FILE, |doc| DataSource::from_document(doc).map(Record::DataSource)),
            (doc_type::DATA_SOURCE, |doc| DataSource::from_document(doc).map(Record::DataSource)),
        ];
        ModelRegistry {
            decoders: defaults.into_iter().map(|(ty, decoder)| (ty.to_string(), decoder)).collect(),
        }
    }

    /// Registers `decoder` for documents whose `type` is `doc_type`.
    pub fn register(&mut self, doc_type: &str, decoder: Decoder) -> Result<(), RegistryError> {
        if doc_type.is_empty() {
            return Err(RegistryError::EmptyType);
        }
        if self.decoders.contains_key(doc_type) {
            return Err(RegistryError::DuplicateType(doc_type.to_string()));
        }
        self.decoders.insert(doc_type.to_string(), decoder);
        Ok(())
    }

    pub fn is_registered(&self, doc_type: &str) -> bool {
        self.decoders.contains_key(doc_type)
    }

    pub fn decode(&self, document: &Document) -> Result<Record, DecodeError> {
        let doc_type = document.doc_type()
            .ok_or_else(|| DecodeError::MissingType(document.id().to_string()))?;
        let decoder = self.decoders.get(doc_type).ok_or_else(|| DecodeError::UnregisteredType {
            id: document.id().to_string(),
            doc_type: doc_type.to_string(),
        })?;
        decoder(document)
    }

    pub fn decode_section(&self, document: &Document) -> Result<Section, DecodeError> {
        match self.decode(document)? {
            Record::Section(section) => Ok(section),
            Record::DataSource(_) => Err(DecodeError::UnexpectedRecord {
                id: document.id().to_string(),
                expected: "section",
                found: "data source",
            }),
        }
    }

    pub fn decode_data_source(&self, document: &Document) -> Result<DataSource, DecodeError> {
        match self.decode(document)? {
            Record::DataSource(source) => Ok(source),
            Record::Section(_) => Err(DecodeError::UnexpectedRecord {
                id: document.id().to_string(),
                expected: "data source",
                found: "section",
            }),
        }
    }
}

/// Deserializes the properties of `document` into `T`.
pub(crate) fn decode_body<T: serde::de::DeserializeOwned>(document: &Document) -> Result<T, DecodeError> {
    let properties = serde_json::Value::Object(document.properties().clone());
    serde_json::from_value(properties).map_err(|e| invalid(document, e))
}

pub(crate) fn invalid(document: &Document, reason: impl std::fmt::Display) -> DecodeError {
    DecodeError::InvalidDocument {
        id: document.id().to_string(),
        doc_type: document.doc_type().unwrap_or_default().to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document(value: serde_json::Value) -> Document {
        Document::from_value(value).unwrap()
    }

    #[test]
    fn test_default_models_registered() {
        let registry = ModelRegistry::with_default_models();
        for ty in ["section", "folder", "smart_folder", "file", "datasource"] {
            assert!(registry.is_registered(ty), "{ty}");
        }
        assert!(!registry.is_registered("tag"));
    }

    #[test]
    fn test_register_validates() {
        let mut registry = ModelRegistry::with_default_models();
        let decoder: Decoder = |doc| DataSource::from_document(doc).map(Record::DataSource);
        assert!(matches!(registry.register("file", decoder), Err(RegistryError::DuplicateType(_))));
        assert!(matches!(registry.register("", decoder), Err(RegistryError::EmptyType)));

        registry.register("search_results", decoder).unwrap();
        let doc = document(json!({ "_id": "r", "type": "search_results", "title": "Results" }));
        assert!(matches!(registry.decode(&doc), Ok(Record::DataSource(_))));
    }

    #[test]
    fn test_decode_errors() {
        let registry = ModelRegistry::with_default_models();

        let untyped = document(json!({ "_id": "a" }));
        assert!(matches!(registry.decode(&untyped), Err(DecodeError::MissingType(_))));

        let unknown = document(json!({ "_id": "b", "type": "bookmark" }));
        assert!(matches!(registry.decode(&unknown), Err(DecodeError::UnregisteredType { .. })));

        let bad_index = document(json!({ "_id": "c", "type": "section", "index": "first" }));
        assert!(matches!(registry.decode(&bad_index), Err(DecodeError::InvalidDocument { .. })));
    }

    #[test]
    fn test_decode_expecting_kind() {
        let registry = ModelRegistry::with_default_models();
        let section = document(json!({ "_id": "s", "type": "section", "uti": uti::NOTEBOOK }));
        let file = document(json!({ "_id": "f", "type": "file", "title": "Notes" }));

        assert_eq!(registry.decode_section(&section).unwrap().uti, uti::NOTEBOOK);
        assert!(matches!(registry.decode_section(&file), Err(DecodeError::UnexpectedRecord { .. })));
        assert!(matches!(registry.decode_data_source(&section), Err(DecodeError::UnexpectedRecord { .. })));
        assert_eq!(registry.decode(&file).unwrap().id(), "f");
    }
}
