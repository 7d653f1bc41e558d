use anyhow::{Result, bail};
use rusqlite::{Connection, params};
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::info;

use crate::core::broadcast::{BroadcastRequest, Button, MAX_BUTTONS, Template};
use crate::platform::{NativePlatform, Platform};

pub const TEMPLATES_DB: &str = "templates.db";

/// Saved message presets. The engine never reads these; callers resolve a
/// template into a [`BroadcastRequest`] first.
#[derive(Clone)]
pub struct TemplateStore {
    db: Arc<Mutex<Connection>>,
}

impl TemplateStore {
    pub async fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        if !data_dir.exists() {
            fs::create_dir_all(data_dir).await?;
        }

        let db_path = data_dir.join(TEMPLATES_DB);
        let db = Connection::open(&db_path)?;
        NativePlatform::restrict_file_permissions(&db_path);

        db.execute(
            "CREATE TABLE IF NOT EXISTS templates (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                message TEXT NOT NULL DEFAULT '',
                footer TEXT,
                buttons TEXT NOT NULL DEFAULT '[]',
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        info!("Template store opened at {}", db_path.display());
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    pub async fn list(&self) -> Result<Vec<Template>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT id, name, message, footer, buttons FROM templates ORDER BY created_at, rowid",
        )?;
        let rows = stmt.query_map([], row_to_parts)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(into_template(row?)?);
        }
        Ok(results)
    }

    pub async fn get(&self, id: &str) -> Result<Option<Template>> {
        let db = self.db.lock().await;
        let mut stmt =
            db.prepare("SELECT id, name, message, footer, buttons FROM templates WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], row_to_parts)?;

        match rows.next() {
            Some(row) => Ok(Some(into_template(row?)?)),
            None => Ok(None),
        }
    }

    /// Inserts or replaces. A blank id gets a fresh `template-<uuid>`.
    pub async fn save(&self, mut template: Template) -> Result<Template> {
        template.name = template.name.trim().to_string();
        if template.name.is_empty() {
            bail!("Template name cannot be empty.");
        }
        if template.buttons.len() > MAX_BUTTONS {
            bail!(
                "A template can carry at most {} buttons (got {}).",
                MAX_BUTTONS,
                template.buttons.len()
            );
        }
        if template.id.trim().is_empty() {
            template.id = format!("template-{}", uuid::Uuid::new_v4());
        }
        template.footer = template.footer.filter(|f| !f.trim().is_empty());

        let buttons = serde_json::to_string(&template.buttons)?;
        let db = self.db.lock().await;
        let updated = db.execute(
            "UPDATE templates SET name = ?2, message = ?3, footer = ?4, buttons = ?5 WHERE id = ?1",
            params![template.id, template.name, template.message, template.footer, buttons],
        )?;
        if updated == 0 {
            db.execute(
                "INSERT INTO templates (id, name, message, footer, buttons) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![template.id, template.name, template.message, template.footer, buttons],
            )?;
        }
        Ok(template)
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        let db = self.db.lock().await;
        let rows_deleted = db.execute("DELETE FROM templates WHERE id = ?1", params![id])?;
        Ok(rows_deleted > 0)
    }
}

type TemplateParts = (String, String, String, Option<String>, String);

fn row_to_parts(row: &rusqlite::Row<'_>) -> rusqlite::Result<TemplateParts> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn into_template((id, name, message, footer, buttons): TemplateParts) -> Result<Template> {
    let buttons: Vec<Button> = serde_json::from_str(&buttons)?;
    Ok(Template {
        id,
        name,
        message,
        footer,
        buttons,
    })
}

/// Builds a request from a saved preset.
pub fn request_from_template(
    template: &Template,
    recipients: Vec<String>,
    delay_secs: u64,
) -> BroadcastRequest {
    let mut request = BroadcastRequest::new(recipients, template.message.clone())
        .with_buttons(template.buttons.clone())
        .with_delay_secs(delay_secs);
    if let Some(footer) = &template.footer {
        request = request.with_footer(footer.clone());
    }
    request
}
