use std::fmt;

use thiserror::Error;
use tracing::{debug, warn};

use crate::model::{uti, DataSource, Section};

/// The sections and data sources the application cannot work without.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignificantNode {
    NotebookSection,
    ShortcutsSection,
    FoldersSection,
    SmartFoldersSection,
    Library,
    Calendar,
    Tags,
    Inbox,
}

impl SignificantNode {
    pub const ALL: [SignificantNode; 8] = [
        SignificantNode::NotebookSection,
        SignificantNode::ShortcutsSection,
        SignificantNode::FoldersSection,
        SignificantNode::SmartFoldersSection,
        SignificantNode::Library,
        SignificantNode::Calendar,
        SignificantNode::Tags,
        SignificantNode::Inbox,
    ];

    /// The uti the node is located by.
    pub fn uti(self) -> &'static str {
        match self {
            SignificantNode::NotebookSection => uti::NOTEBOOK,
            SignificantNode::ShortcutsSection => uti::SHORTCUTS,
            SignificantNode::FoldersSection => uti::FOLDERS,
            SignificantNode::SmartFoldersSection => uti::SMART_FOLDERS,
            SignificantNode::Library => uti::LIBRARY,
            SignificantNode::Calendar => uti::CALENDAR,
            SignificantNode::Tags => uti::TAGS,
            SignificantNode::Inbox => uti::INBOX,
        }
    }

    /// The section a data source node is a child of. `None` for sections.
    pub fn parent(self) -> Option<SignificantNode> {
        match self {
            SignificantNode::Library | SignificantNode::Calendar | SignificantNode::Tags => {
                Some(SignificantNode::NotebookSection)
            }
            SignificantNode::Inbox => Some(SignificantNode::FoldersSection),
            _ => None,
        }
    }
}

impl fmt::Display for SignificantNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SignificantNode::NotebookSection => "notebook section",
            SignificantNode::ShortcutsSection => "shortcuts section",
            SignificantNode::FoldersSection => "folders section",
            SignificantNode::SmartFoldersSection => "smart folders section",
            SignificantNode::Library => "library source",
            SignificantNode::Calendar => "calendar source",
            SignificantNode::Tags => "tags source",
            SignificantNode::Inbox => "inbox source",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Significant node not found: {0} ({uti})", uti = .0.uti())]
pub struct MissingSignificantNode(pub SignificantNode);

/// Direct references to the significant nodes, located by uti in the sections
/// projection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignificantNodes {
    pub notebook_section: Option<Section>,
    pub shortcuts_section: Option<Section>,
    pub folders_section: Option<Section>,
    pub smart_folders_section: Option<Section>,
    pub library_source: Option<DataSource>,
    pub calendar_source: Option<DataSource>,
    pub tags_source: Option<DataSource>,
    pub inbox_source: Option<DataSource>,
    /// Optional. Never reported missing.
    pub trash_source: Option<DataSource>,
}

impl SignificantNodes {
    /// True once the library source has been found. Resolution does not run again
    /// after that.
    pub fn is_resolved(&self) -> bool {
        self.library_source.is_some()
    }

    pub fn contains(&self, node: SignificantNode) -> bool {
        match node {
            SignificantNode::NotebookSection => self.notebook_section.is_some(),
            SignificantNode::ShortcutsSection => self.shortcuts_section.is_some(),
            SignificantNode::FoldersSection => self.folders_section.is_some(),
            SignificantNode::SmartFoldersSection => self.smart_folders_section.is_some(),
            SignificantNode::Library => self.library_source.is_some(),
            SignificantNode::Calendar => self.calendar_source.is_some(),
            SignificantNode::Tags => self.tags_source.is_some(),
            SignificantNode::Inbox => self.inbox_source.is_some(),
        }
    }

    /// Locates every significant node in `sections` and returns the ones that are
    /// missing, each also logged as a warning.
    ///
    /// Sections are matched by uti, first match wins. Data sources are looked up
    /// among the resolved children of their parent section, so a missing section
    /// also reports its children missing. Does nothing if already resolved.
    pub fn resolve(&mut self, sections: &[Section]) -> Vec<MissingSignificantNode> {
        if self.is_resolved() {
            return Vec::new();
        }

        let section = |uti: &str| sections.iter().find(|s| s.uti == uti).cloned();
        self.notebook_section = section(uti::NOTEBOOK);
        self.shortcuts_section = section(uti::SHORTCUTS);
        self.folders_section = section(uti::FOLDERS);
        self.smart_folders_section = section(uti::SMART_FOLDERS);

        let child = |parent: &Option<Section>, uti: &str| {
            parent.as_ref().and_then(|s| s.child_with_uti(uti)).cloned()
        };
        self.library_source = child(&self.notebook_section, uti::LIBRARY);
        self.calendar_source = child(&self.notebook_section, uti::CALENDAR);
        self.tags_source = child(&self.notebook_section, uti::TAGS);
        self.trash_source = child(&self.notebook_section, uti::TRASH);
        self.inbox_source = child(&self.folders_section, uti::INBOX);

        let missing: Vec<_> = SignificantNode::ALL
            .into_iter()
            .filter(|node| !self.contains(*node))
            .map(MissingSignificantNode)
            .collect();
        if missing.is_empty() {
            debug!("Resolved all significant nodes");
        }
        for node in &missing {
            warn!("{}", node);
        }
        missing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(uti: &str) -> DataSource {
        DataSource::node(uti, uti).with_id(uti)
    }

    fn section(uti: &str, index: i64, children: Vec<DataSource>) -> Section {
        let mut section = Section::new(uti, index).with_id(uti);
        section.child_ids = children.iter().map(|c| c.id.clone()).collect();
        section.children = children;
        section
    }

    fn complete_tree() -> Vec<Section> {
        vec![
            section(uti::NOTEBOOK, 0, vec![node(uti::LIBRARY), node(uti::CALENDAR), node(uti::TAGS), node(uti::TRASH)]),
            section(uti::SHORTCUTS, 1, vec![]),
            section(uti::FOLDERS, 2, vec![node(uti::INBOX)]),
            section(uti::SMART_FOLDERS, 3, vec![]),
        ]
    }

    #[test]
    fn test_resolves_complete_tree() {
        let mut nodes = SignificantNodes::default();
        assert!(nodes.resolve(&complete_tree()).is_empty());
        assert!(nodes.is_resolved());
        assert_eq!(nodes.inbox_source.as_ref().map(|s| s.uti.as_str()), Some(uti::INBOX));
        assert_eq!(nodes.trash_source.as_ref().map(|s| s.uti.as_str()), Some(uti::TRASH));
        for node in SignificantNode::ALL {
            assert!(nodes.contains(node), "{node}");
        }
    }

    #[test]
    fn test_reports_every_missing_node() {
        let sections: Vec<_> = complete_tree()
            .into_iter()
            .filter(|s| s.uti != uti::SHORTCUTS && s.uti != uti::SMART_FOLDERS)
            .collect();
        let mut nodes = SignificantNodes::default();
        let missing = nodes.resolve(&sections);

        assert_eq!(missing, vec![
            MissingSignificantNode(SignificantNode::ShortcutsSection),
            MissingSignificantNode(SignificantNode::SmartFoldersSection),
        ]);
        assert!(nodes.library_source.is_some());
        assert!(nodes.inbox_source.is_some());
    }

    #[test]
    fn test_missing_section_reports_its_children() {
        let sections: Vec<_> = complete_tree().into_iter().filter(|s| s.uti != uti::NOTEBOOK).collect();
        let mut nodes = SignificantNodes::default();
        let missing: Vec<_> = nodes.resolve(&sections).into_iter().map(|m| m.0).collect();

        assert_eq!(missing, vec![
            SignificantNode::NotebookSection,
            SignificantNode::Library,
            SignificantNode::Calendar,
            SignificantNode::Tags,
        ]);
        assert!(!nodes.is_resolved());
        for node in &missing[1..] {
            assert_eq!(node.parent(), Some(SignificantNode::NotebookSection));
        }
    }

    #[test]
    fn test_trash_is_optional() {
        let mut sections = complete_tree();
        sections[0].children.retain(|c| c.uti != uti::TRASH);
        let mut nodes = SignificantNodes::default();
        assert!(nodes.resolve(&sections).is_empty());
        assert!(nodes.trash_source.is_none());
    }

    #[test]
    fn test_short_circuits_once_resolved() {
        let mut nodes = SignificantNodes::default();
        nodes.resolve(&complete_tree());
        let before = nodes.clone();

        assert!(nodes.resolve(&[]).is_empty());
        assert_eq!(nodes, before);
    }

    #[test]
    fn test_unresolved_retries() {
        let mut nodes = SignificantNodes::default();
        assert_eq!(nodes.resolve(&[]).len(), SignificantNode::ALL.len());
        assert!(nodes.resolve(&complete_tree()).is_empty());
    }

    #[test]
    fn test_first_match_wins() {
        let mut sections = complete_tree();
        let mut duplicate = section(uti::NOTEBOOK, 9, vec![]);
        duplicate.id = "duplicate".into();
        sections.push(duplicate);

        let mut nodes = SignificantNodes::default();
        nodes.resolve(&sections);
        assert_eq!(nodes.notebook_section.map(|s| s.id), Some(uti::NOTEBOOK.to_string()));
    }

    #[test]
    fn test_error_message_names_node() {
        let message = MissingSignificantNode(SignificantNode::Inbox).to_string();
        assert!(message.contains("inbox source"));
        assert!(message.contains(uti::INBOX));
    }
}
