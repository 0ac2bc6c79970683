use clap::Parser;
use std::env;

use fieldscope_rs::{AttachmentManager, InspectionManager, LocalStore, PhotoAttachment, SyncQueue};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, rename_all = "snake_case")]
struct Args {
    /// Command to execute: status, list_pending, list_failed, list_photos, reset
    #[arg(short, long)]
    command: String,

    /// Path to the local database (or set FIELDSCOPE_DB_PATH env var)
    #[arg(long, name = "db_path")]
    db_path: Option<String>,

    /// Inspection ID (for list_photos)
    #[arg(long, name = "inspection_id")]
    inspection_id: Option<String>,

    /// Required confirmation for reset
    #[arg(long, default_value_t = false)]
    yes: bool,
}

// example usage:
// FIELDSCOPE_DB_PATH=/var/lib/fieldscope/local.db ./target/release/fieldscope_cli --command status
// ./target/release/fieldscope_cli --command list_pending --db_path ./local.db
// ./target/release/fieldscope_cli --command reset --db_path ./local.db --yes

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let db_path = match args.db_path.or_else(|| env::var("FIELDSCOPE_DB_PATH").ok()) {
        Some(path) => path,
        None => {
            eprintln!("No database path provided. Use --db_path or set FIELDSCOPE_DB_PATH.");
            std::process::exit(1);
        }
    };

    let store = LocalStore::open(&db_path)?;
    let inspections = InspectionManager::new(&store);
    let photos = AttachmentManager::new(&store);
    let queue = SyncQueue::new(&store);

    match args.command.as_str() {
        "status" => {
            let pending = inspections.list_pending().await?.len();
            let failed = inspections.list_failed().await?.len();
            let status = serde_json::json!({
                "inspections": store.count::<fieldscope_rs::InspectionRecord>()?,
                "photos": store.count::<PhotoAttachment>()?,
                "queue_depth": queue.count().await?,
                "pending": pending,
                "failed": failed,
            });
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        "list_pending" => {
            for record in inspections.list_pending().await? {
                println!("{}", serde_json::to_string(&record)?);
            }
        }
        "list_failed" => {
            for record in inspections.list_failed().await? {
                println!("{}", serde_json::to_string(&record)?);
            }
        }
        "list_photos" => {
            let inspection_id = match args.inspection_id {
                Some(id) => id,
                None => {
                    eprintln!("list_photos requires --inspection_id");
                    std::process::exit(1);
                }
            };
            for photo in photos.list_by_inspection(&inspection_id).await? {
                let line = serde_json::json!({
                    "id": photo.id,
                    "inspection_id": photo.inspection_id,
                    "kind": photo.kind.as_str(),
                    "bytes": photo.payload.len(),
                    "geo_tag": photo.geo_tag,
                    "created_at": photo.created_at,
                });
                println!("{}", serde_json::to_string(&line)?);
            }
        }
        "reset" => {
            if !args.yes {
                eprintln!("reset wipes all local state; re-run with --yes to confirm");
                std::process::exit(1);
            }
            queue.reset().await?;
            println!("local store reset");
        }
        other => {
            eprintln!(
                "Unknown command: {}. Expected status, list_pending, list_failed, list_photos or reset.",
                other
            );
            std::process::exit(1);
        }
    }

    Ok(())
}
