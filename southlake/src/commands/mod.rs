use anyhow::{bail, Context, Result};
use southlake_core::manager::bootstrap::seed_default_structure;
use southlake_core::manager::significant::SignificantNode;
use southlake_core::model::{DataSource, DataSourceKind};
use tracing::info;

use crate::cli::{AddFileArgs, TagArgs};
use crate::AppContext;

// --- Handler Functions ---

pub async fn handle_init(cx: AppContext) -> Result<()> {
    let database = cx.manager.database();
    if seed_default_structure(database).await? {
        println!("Initialized {} in {}", database.name(), database.path().display());
    } else {
        println!("{} already holds {} documents, nothing to do.", database.name(), database.document_count());
    }
    Ok(())
}

pub async fn handle_sections(cx: AppContext) -> Result<()> {
    cx.manager.sections();
    cx.manager.settle().await?;
    let Some(sections) = cx.manager.sections() else {
        bail!("Sections are not available");
    };

    for section in sections.iter() {
        println!("{:3}  {}  ({})", section.index, section.title.as_deref().unwrap_or("<untitled>"), section.uti);
        for child in &section.children {
            println!("       - {}  ({})  {}", child.title, child.uti, child.id);
        }
        let missing = section.child_ids.len().saturating_sub(section.children.len());
        if missing > 0 {
            println!("       ({} unresolved children)", missing);
        }
    }
    Ok(())
}

pub async fn handle_tags(cx: AppContext) -> Result<()> {
    cx.manager.tags();
    cx.manager.settle().await?;
    let tags = cx.manager.tags().unwrap_or_default();

    if tags.is_empty() {
        println!("No tags.");
    }
    for tag in tags.iter() {
        println!("{:5}  {}", tag.count, tag.title);
    }
    Ok(())
}

pub async fn handle_files(cx: AppContext) -> Result<()> {
    cx.manager.files();
    cx.manager.settle().await?;
    let files = cx.manager.files().unwrap_or_default();

    if files.is_empty() {
        println!("No files.");
    }
    for file in files.iter() {
        let editor = cx.editors.editor_for_file(file).map(|e| e.name().to_string());
        let tags = file.tags().map(|t| t.iter().cloned().collect::<Vec<_>>().join(", ")).unwrap_or_default();
        println!("{}  {}", file.id, file.title);
        println!(
            "    filetype: {}  editor: {}  tags: {}",
            file.filetype().unwrap_or_default(),
            editor.as_deref().unwrap_or("none"),
            if tags.is_empty() { "-" } else { tags.as_str() },
        );
    }
    Ok(())
}

pub async fn handle_status(cx: AppContext) -> Result<()> {
    cx.manager.sections();
    cx.manager.settle().await?;
    let nodes = cx.manager.significant_nodes();

    for node in SignificantNode::ALL {
        let id = match node {
            SignificantNode::NotebookSection => nodes.notebook_section.as_ref().map(|s| &s.id),
            SignificantNode::ShortcutsSection => nodes.shortcuts_section.as_ref().map(|s| &s.id),
            SignificantNode::FoldersSection => nodes.folders_section.as_ref().map(|s| &s.id),
            SignificantNode::SmartFoldersSection => nodes.smart_folders_section.as_ref().map(|s| &s.id),
            SignificantNode::Library => nodes.library_source.as_ref().map(|s| &s.id),
            SignificantNode::Calendar => nodes.calendar_source.as_ref().map(|s| &s.id),
            SignificantNode::Tags => nodes.tags_source.as_ref().map(|s| &s.id),
            SignificantNode::Inbox => nodes.inbox_source.as_ref().map(|s| &s.id),
        };
        println!("{:22} {}", node.to_string(), id.map(String::as_str).unwrap_or("missing"));
    }
    println!("{:22} {}", "trash source", nodes.trash_source.as_ref().map_or("-", |s| s.id.as_str()));

    let missing = cx.manager.missing_significant_nodes();
    if !missing.is_empty() {
        println!("\n{} significant nodes were reported missing:", missing.len());
        for node in missing {
            println!("  {}", node);
        }
    }
    Ok(())
}

pub async fn handle_add_file(args: AddFileArgs, cx: AppContext) -> Result<()> {
    let mut file = DataSource::file(args.title, args.filetype).with_tags(args.tag);
    if let Some(path) = args.content_file {
        let content = tokio::fs::read(&path).await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        file = file.with_content(content);
    }

    let saved = cx.manager.database().put(file.to_document()).await?;
    info!("Added file {}", saved.id());
    println!("{}", saved.id());
    Ok(())
}

pub async fn handle_tag(args: TagArgs, cx: AppContext) -> Result<()> {
    let database = cx.manager.database();
    let Some(document) = database.get(&args.id) else {
        bail!("No document with id {}", args.id);
    };
    let mut file = cx.manager.models().decode_data_source(&document)?;
    let DataSourceKind::File { tags, .. } = &mut file.kind else {
        bail!("{} is not a file", args.id);
    };
    tags.extend(args.tags);
    file.touch();

    database.put(file.to_document()).await?;
    println!("{}: {}", args.id, file.tags().map(|t| t.iter().cloned().collect::<Vec<_>>().join(", ")).unwrap_or_default());
    Ok(())
}
