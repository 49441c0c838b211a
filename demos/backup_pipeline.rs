//! End-to-end backup-shaped pipeline: a paginated source streamed as one
//! JSON array, scrubbed, annotated and written to disk.
//!
//! Run with: cargo run --example backup_pipeline

use async_trait::async_trait;
use serde_json::json;

use jsonflow::emitter::EmitterOptions;
use jsonflow::filters::{inject_entry, omit_entry, InjectEntryOptions, OmitEntryOptions};
use jsonflow::sink::write_json_file;
use jsonflow::source::{entity_stream, Page, PagedSource};
use jsonflow::SourceError;

/// Stands in for a remote task service; three pages of two lists each.
struct TaskService;

#[async_trait]
impl PagedSource for TaskService {
    async fn fetch_page(&self, cursor: Option<String>) -> Result<Page, SourceError> {
        let page: usize = cursor.map(|c| c.parse().unwrap_or(0)).unwrap_or(0);
        let items = (0..2)
            .map(|i| {
                let id = page * 2 + i;
                json!({
                    "id": id,
                    "name": format!("list-{id}"),
                    "etag": format!("internal-{id}"),
                })
            })
            .collect();
        Ok(Page {
            items,
            next: (page < 2).then(|| (page + 1).to_string()),
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "jsonflow=debug".into()),
        )
        .init();

    let tokens = entity_stream(TaskService);
    // Strip service-internal fields, then stamp each list with backup info.
    let scrubbed = omit_entry(
        tokens,
        OmitEntryOptions::new(regex::Regex::new(r"^\d+\.etag$")?),
    );
    let annotated = inject_entry(
        scrubbed,
        InjectEntryOptions::value("backup", json!({"tool": "jsonflow", "version": 1})),
    );

    let path = std::env::temp_dir().join("jsonflow-lists.json");
    let written = write_json_file(annotated, &path, EmitterOptions::default()).await?;
    println!("wrote {written} bytes to {}", path.display());
    println!("{}", tokio::fs::read_to_string(&path).await?);
    Ok(())
}
