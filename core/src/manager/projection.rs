use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, warn};

use crate::model::{DataSource, ModelRegistry, Section, Tag};
use crate::store::{Database, Document, QueryRow};

use super::significant::{MissingSignificantNode, SignificantNodes};

/// Decoded, sorted results of the section, tag and file live queries.
///
/// Each projection is `None` until its live query has delivered rows, and is
/// replaced as a whole on every delivery.
#[derive(Debug, Default)]
pub(crate) struct Projections {
    sections: RwLock<Option<Arc<Vec<Section>>>>,
    tags: RwLock<Option<Arc<Vec<Tag>>>>,
    files: RwLock<Option<Arc<Vec<DataSource>>>>,
    significant: RwLock<SignificantNodes>,
    // What the last resolution that ran reported.
    missing: RwLock<Vec<MissingSignificantNode>>,
}

impl Projections {
    pub fn sections(&self) -> Option<Arc<Vec<Section>>> {
        self.sections.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn tags(&self) -> Option<Arc<Vec<Tag>>> {
        self.tags.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn files(&self) -> Option<Arc<Vec<DataSource>>> {
        self.files.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Reads the significant node references.
    pub fn with_significant<T>(&self, f: impl FnOnce(&SignificantNodes) -> T) -> T {
        f(&self.significant.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// The significant nodes the most recent resolution could not find.
    pub fn missing_significant(&self) -> Vec<MissingSignificantNode> {
        self.missing.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Rebuilds the sections from `rows` and resolves the significant nodes against
    /// them.
    pub fn update_sections(
        &self,
        rows: &[QueryRow],
        database: &Database,
        models: &ModelRegistry,
    ) -> Vec<MissingSignificantNode> {
        let sections = Arc::new(build_sections(rows, database, models));
        debug!("Rebuilt {} sections", sections.len());
        self.replace_sections(sections)
    }

    /// Reloads the children of every section from `database`. The sections are
    /// replaced, and the significant nodes resolved again, only if some child was
    /// added, changed or removed.
    pub fn refresh_children(&self, database: &Database, models: &ModelRegistry) -> Option<Vec<MissingSignificantNode>> {
        let current = self.sections()?;
        let children: Vec<_> = current.iter().map(|section| load_children(section, database, models)).collect();
        if current.iter().zip(&children).all(|(section, children)| section.children == *children) {
            return None;
        }

        let sections: Vec<Section> = current
            .iter()
            .zip(children)
            .map(|(section, children)| Section { children, ..section.clone() })
            .collect();
        debug!("Reloaded the children of {} sections", sections.len());
        Some(self.replace_sections(Arc::new(sections)))
    }

    fn replace_sections(&self, sections: Arc<Vec<Section>>) -> Vec<MissingSignificantNode> {
        *self.sections.write().unwrap_or_else(PoisonError::into_inner) = Some(sections.clone());
        let mut significant = self.significant.write().unwrap_or_else(PoisonError::into_inner);
        if significant.is_resolved() {
            return Vec::new();
        }
        let missing = significant.resolve(&sections);
        *self.missing.write().unwrap_or_else(PoisonError::into_inner) = missing.clone();
        missing
    }

    pub fn update_tags(&self, rows: &[QueryRow]) {
        let tags = build_tags(rows);
        debug!("Rebuilt {} tags", tags.len());
        *self.tags.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(tags));
    }

    pub fn update_files(&self, rows: &[QueryRow], models: &ModelRegistry) {
        let files = build_files(rows, models);
        debug!("Rebuilt {} files", files.len());
        *self.files.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(files));
    }
}

fn row_document(row: &QueryRow) -> Option<Document> {
    match Document::from_value(row.value.clone()) {
        Ok(document) => Some(document),
        Err(e) => {
            warn!("Skipping row {:?}: {}", row.key, e);
            None
        }
    }
}

/// Decodes each row, resolves the children of each section and orders the
/// sections by ascending index. Rows and children that do not decode, and child
/// ids with no document, are skipped.
pub(crate) fn build_sections(rows: &[QueryRow], database: &Database, models: &ModelRegistry) -> Vec<Section> {
    let mut sections: Vec<Section> = rows
        .iter()
        .filter_map(row_document)
        .filter_map(|doc| match models.decode_section(&doc) {
            Ok(section) => Some(section),
            Err(e) => {
                warn!("Skipping section: {}", e);
                None
            }
        })
        .collect();

    for section in &mut sections {
        section.children = load_children(section, database, models);
        let unresolved = section.child_ids.len().saturating_sub(section.children.len());
        if unresolved > 0 {
            warn!("Section {} has {} unresolved children", section.id, unresolved);
        }
    }

    // Stable, so equal indices keep view order.
    sections.sort_by_key(|section| section.index);
    sections
}

/// The children of `section` in `child_ids` order. Ids with no document, and
/// documents that do not decode, are skipped.
fn load_children(section: &Section, database: &Database, models: &ModelRegistry) -> Vec<DataSource> {
    section
        .child_ids
        .iter()
        .filter_map(|id| {
            let Some(doc) = database.get(id) else {
                debug!("Section {} refers to missing child {}", section.id, id);
                return None;
            };
            models.decode_data_source(&doc)
                .inspect_err(|e| debug!("Skipping child {} of section {}: {}", id, section.id, e))
                .ok()
        })
        .collect()
}

/// One tag per reduced row, in view order. Rows whose key is not a string or
/// whose count is not an integer are skipped.
pub(crate) fn build_tags(rows: &[QueryRow]) -> Vec<Tag> {
    rows.iter()
        .filter_map(|row| match (row.key.as_str(), row.value.as_u64()) {
            (Some(title), Some(count)) => Some(Tag::new(title, count)),
            _ => {
                warn!("Skipping tag row {} => {}", row.key, row.value);
                None
            }
        })
        .collect()
}

/// One file per row, in view order.
pub(crate) fn build_files(rows: &[QueryRow], models: &ModelRegistry) -> Vec<DataSource> {
    rows.iter()
        .filter_map(row_document)
        .filter_map(|doc| {
            models.decode_data_source(&doc)
                .inspect_err(|e| warn!("Skipping file: {}", e))
                .ok()
        })
        .filter(DataSource::is_file)
        .collect()
}
