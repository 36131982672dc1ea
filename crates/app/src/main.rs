//! Demo entry point: a short document editing session.

use std::sync::{Arc, PoisonError, RwLock};

use app::{App, Config, Result};
use command::{AssignCommand, CompositeCommand, boxed};

/// A document whose fields are edited through commands.
#[derive(Debug)]
struct Document {
    title: Arc<RwLock<String>>,
    body: Arc<RwLock<String>>,
    status: Arc<RwLock<String>>,
}

impl Document {
    fn new() -> Self {
        Self {
            title: Arc::new(RwLock::new("Untitled".to_string())),
            body: Arc::new(RwLock::new(String::new())),
            status: Arc::new(RwLock::new("draft".to_string())),
        }
    }

    fn summary(&self) -> String {
        let read = |field: &Arc<RwLock<String>>| {
            field
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        };
        format!(
            "'{}' [{}] {} chars",
            read(&self.title),
            read(&self.status),
            read(&self.body).len()
        )
    }
}

async fn run_session(app: &App) -> Result<()> {
    let document = Document::new();
    let history = app.history();

    history
        .execute(AssignCommand::new(
            "set title",
            &document.title,
            "Site inspection notes".to_string(),
        ))
        .await?;

    let publish = CompositeCommand::<String>::new(
        "publish document",
        true,
        1,
        vec![
            boxed(AssignCommand::new(
                "write body",
                &document.body,
                "Roof flashing needs replacement on the north side.".to_string(),
            )),
            boxed(AssignCommand::new(
                "set status",
                &document.status,
                "published".to_string(),
            )),
        ],
    )?;
    let status = history.execute(publish).await?;
    tracing::info!(%status, document = %document.summary(), "document published");

    let undone = history.undo().await?;
    tracing::info!(
        command = %undone.description,
        document = %document.summary(),
        "undo"
    );

    let redone = history.redo().await?;
    tracing::info!(
        command = %redone.description,
        sequence = %redone.sequence,
        document = %document.summary(),
        "redo"
    );

    tracing::info!(
        undo_stack = ?history.undo_descriptions().await,
        "session finished"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env();
    app::telemetry::init(&config)?;
    let metrics = app::telemetry::install_metrics()?;

    let app = App::bootstrap(&config)?;
    let session = run_session(&app).await;
    app.shutdown().await;

    if let Err(err) = &session {
        tracing::error!(error = %err, "editing session failed");
    }
    tracing::info!(audit_entries = app.audit().len(), "audit trail complete");
    print!("{}", metrics.render());
    session
}
