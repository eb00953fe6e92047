use std::fmt;
use std::sync::Arc;

use crate::model::{uti, DataSource};

/// An editor that can open files of some filetypes.
pub trait EditorPlugIn: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;

    /// Utis, extensions and MIME types this editor handles.
    fn filetypes(&self) -> &[&str];

    fn handles(&self, filetype: &str) -> bool {
        self.filetypes().iter().any(|t| t.eq_ignore_ascii_case(filetype))
    }
}

pub struct MarkdownEditor;

impl EditorPlugIn for MarkdownEditor {
    fn name(&self) -> &str {
        "MarkdownEditor"
    }

    fn description(&self) -> &str {
        "Plain text editor with Markdown highlighting"
    }

    fn filetypes(&self) -> &[&str] {
        &[uti::MARKDOWN, "markdown", "md", "text/markdown"]
    }
}

pub struct PdfEditor;

impl EditorPlugIn for PdfEditor {
    fn name(&self) -> &str {
        "PDFEditor"
    }

    fn description(&self) -> &str {
        "Read-only PDF viewer"
    }

    fn filetypes(&self) -> &[&str] {
        &[uti::PDF, "pdf", "application/pdf"]
    }
}

/// Picks an editor for a file by its filetype. Editors are consulted in
/// registration order.
#[derive(Clone, Default)]
pub struct EditorRegistry {
    editors: Vec<Arc<dyn EditorPlugIn>>,
}

impl EditorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_editors() -> Self {
        let mut registry = Self::new();
        registry.register(MarkdownEditor);
        registry.register(PdfEditor);
        registry
    }

    pub fn register(&mut self, editor: impl EditorPlugIn + 'static) {
        self.editors.push(Arc::new(editor));
    }

    pub fn editor_for(&self, filetype: &str) -> Option<&Arc<dyn EditorPlugIn>> {
        self.editors.iter().find(|editor| editor.handles(filetype))
    }

    /// `None` for data sources that are not files.
    pub fn editor_for_file(&self, file: &DataSource) -> Option<&Arc<dyn EditorPlugIn>> {
        file.filetype().and_then(|filetype| self.editor_for(filetype))
    }
}

impl fmt::Debug for EditorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.editors.iter().map(|e| e.name())).finish()
    }
}
