//! Status command handler

use anyhow::Result;
use serde_json::json;

use notesync_core::{CollectionSource, Config, IndexCache, JsonFileSource};

use crate::output::{Output, OutputFormat};

/// Local record counts per collection, alongside what the last pass indexed
struct CollectionStatus {
    name: &'static str,
    local: Option<usize>,
    indexed: Option<usize>,
}

/// Show local and cached sync state; never contacts the remote
pub async fn show(config: &Config, output: &Output) -> Result<()> {
    let cache = IndexCache::open(config.index_cache_path(), &config.profile).ok();

    let mut collections = Vec::new();
    for &collection in &config.collections {
        let source = JsonFileSource::new(config.collection_path(collection));
        collections.push(CollectionStatus {
            name: collection.as_str(),
            local: source.fetch_all().await.ok().map(|r| r.len()),
            indexed: cache
                .as_ref()
                .and_then(|c| c.index(collection))
                .map(|entries| entries.len()),
        });
    }
    let last_pass = cache.as_ref().and_then(|c| c.last_pass_at());
    let configured = config.gitlab().is_ok();

    match output.format {
        OutputFormat::Json => {
            let counts: Vec<_> = collections
                .iter()
                .map(|c| json!({"collection": c.name, "local": c.local, "indexed": c.indexed}))
                .collect();
            println!(
                "{}",
                json!({
                    "profile": config.profile,
                    "configured": configured,
                    "server_url": config.server_url,
                    "project_id": config.project_id,
                    "branch": config.branch,
                    "last_pass_at": last_pass,
                    "collections": counts
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", if configured { "configured" } else { "unconfigured" });
        }
        OutputFormat::Human => {
            println!("Notesync Status");
            println!("===============");
            println!();
            println!("Remote:");
            println!(
                "  Server:  {}",
                config.server_url.as_deref().unwrap_or("(not set)")
            );
            println!(
                "  Project: {}",
                config.project_id.as_deref().unwrap_or("(not set)")
            );
            println!("  Branch:  {}", config.branch);
            println!("  Profile: {}", config.profile);
            if !configured {
                println!("  Sync is not configured. Run `notesync config show` for details.");
            }
            println!();
            println!("Last pass:");
            match last_pass {
                Some(at) => println!(
                    "  {}",
                    at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S")
                ),
                None => println!("  never"),
            }
            println!();
            println!("Collections (local / indexed):");
            for c in &collections {
                println!(
                    "  {:<10} {} / {}",
                    c.name,
                    count_label(c.local),
                    count_label(c.indexed)
                );
            }
        }
    }

    Ok(())
}

fn count_label(count: Option<usize>) -> String {
    count.map_or_else(|| "-".to_string(), |n| n.to_string())
}
