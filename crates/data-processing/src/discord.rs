use crate::error::DiscordExportError;
use core_types::{StrategyId, resolve};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// Only embeds linking to a symphony page are collected.
const SYMPHONY_URL_MARKER: &str = "app.composer.trade/symphony";
const UNKNOWN_AUTHOR: &str = "Unknown";
const UNKNOWN_TITLE: &str = "Unknown Title";

/// What a chat export tells us about one shared symphony.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymphonyMeta {
    pub title: String,
    pub url: String,
    pub timestamp: String,
    pub id: StrategyId,
    pub author: String,
}

/// The `Author` field of an embed, which overrides the message author.
fn embed_author(embed: &Value) -> Option<&str> {
    embed
        .get("fields")?
        .as_array()?
        .iter()
        .find(|field| field.get("name").and_then(Value::as_str) == Some("Author"))?
        .get("value")?
        .as_str()
}

/// Collects the symphonies shared in a Discord channel export.
///
/// Later mentions of the same symphony replace earlier ones.
pub fn extract_symphonies(
    export: &Value,
) -> Result<BTreeMap<StrategyId, SymphonyMeta>, DiscordExportError> {
    let messages = export
        .as_object()
        .and_then(|root| root.get("messages"))
        .ok_or(DiscordExportError::MissingMessages)?
        .as_array()
        .ok_or(DiscordExportError::InvalidMessages)?;

    let mut symphonies = BTreeMap::new();

    for message in messages {
        let Some(author) = message.get("author") else {
            tracing::warn!("Skipping message without an author");
            continue;
        };
        let message_author = author.get("name").and_then(Value::as_str).unwrap_or(UNKNOWN_AUTHOR);

        let embeds = message.get("embeds").and_then(Value::as_array).into_iter().flatten();
        for embed in embeds.filter(|e| e.is_object()) {
            let Some(url) = embed.get("url").and_then(Value::as_str) else {
                continue;
            };
            if !url.contains(SYMPHONY_URL_MARKER) {
                continue;
            }

            let id = match resolve(url) {
                Ok(id) => id,
                Err(e) => {
                    tracing::warn!(%url, error = %e, "Failed to process embed URL");
                    continue;
                }
            };

            let text = |key: &str, default: &str| {
                embed.get(key).and_then(Value::as_str).unwrap_or(default).to_string()
            };
            let meta = SymphonyMeta {
                title: text("title", UNKNOWN_TITLE),
                url: url.to_string(),
                timestamp: text("timestamp", ""),
                id: id.clone(),
                author: embed_author(embed).unwrap_or(message_author).to_string(),
            };
            symphonies.insert(id, meta);
        }
    }

    tracing::info!(
        symphonies = symphonies.len(),
        messages = messages.len(),
        "Extracted symphonies from export"
    );
    Ok(symphonies)
}

/// Reads a Discord export from disk and extracts its symphonies.
pub fn load_symphonies(
    path: impl AsRef<Path>,
) -> Result<BTreeMap<StrategyId, SymphonyMeta>, DiscordExportError> {
    let raw = std::fs::read_to_string(path)?;
    let export: Value = serde_json::from_str(&raw)?;
    extract_symphonies(&export)
}
