use std::path::Path;

use moyun_core::models::Document;

use crate::cli::DocsCommands;
use crate::commands::common::{
    document_to_list_item, format_document_lines, normalize_document_id, open_engine,
    open_local_store, read_body_input, split_paragraphs, DocumentListItem,
};
use crate::error::CliError;

pub async fn run_docs(
    command: DocsCommands,
    db_path: &Path,
    profile: Option<&str>,
) -> Result<(), CliError> {
    match command {
        DocsCommands::List { limit, json } => run_list(limit, json, db_path).await,
        DocsCommands::Show { id } => run_show(&id, db_path).await,
        DocsCommands::New { title } => run_new(&title, db_path, profile).await,
        DocsCommands::Delete { id } => run_delete(&id, db_path, profile).await,
    }
}

async fn run_list(limit: usize, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let local = open_local_store(db_path).await?;
    let mut entries = local.load_document_index().await?.entries.sorted_by_recency();
    entries.truncate(limit);

    if as_json {
        let json_items = entries
            .iter()
            .map(document_to_list_item)
            .collect::<Vec<DocumentListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else if entries.is_empty() {
        println!("No documents.");
    } else {
        for line in format_document_lines(&entries) {
            println!("{line}");
        }
    }
    Ok(())
}

async fn run_show(id: &str, db_path: &Path) -> Result<(), CliError> {
    let id = normalize_document_id(id)?;
    let local = open_local_store(db_path).await?;
    let document = local
        .load_document(&id)
        .await?
        .ok_or(CliError::DocumentNotFound(id))?;
    println!("{}", serde_json::to_string_pretty(&document)?);
    Ok(())
}

async fn run_new(title_parts: &[String], db_path: &Path, profile: Option<&str>) -> Result<(), CliError> {
    let title = title_parts.join(" ").trim().to_string();
    if title.is_empty() {
        return Err(CliError::EmptyTitle);
    }
    let body = read_body_input()?.unwrap_or_default();

    let engine = open_engine(db_path, profile).await?;
    let mut document = Document::new(title, 0);
    document.created_at = None;
    document.paragraphs = split_paragraphs(&body);
    let saved = engine.save_document(document).await?;

    println!("{}", saved.id);
    Ok(())
}

async fn run_delete(id: &str, db_path: &Path, profile: Option<&str>) -> Result<(), CliError> {
    let id = normalize_document_id(id)?;
    let engine = open_engine(db_path, profile).await?;
    if !engine.delete_document(&id).await? {
        return Err(CliError::DocumentNotFound(id));
    }
    println!("Deleted {id}; run `moyun drain` to remove it remotely");
    Ok(())
}
