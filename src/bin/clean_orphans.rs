use std::collections::HashSet;
use std::env;
use std::io::{self, Write};
use std::time::Duration;

use chrono::{DateTime, Utc};
use sea_orm::prelude::*;
use sea_orm::{Database, QuerySelect};
use tracing::{error, info, warn};

use brandshot::asset_store::supabase::{StoredObject, SupabaseAssetStore};
use brandshot::asset_store::AssetStore;
use brandshot::entities::generation;
use brandshot::entities::prelude::*;

const DEFAULT_GRACE_MINUTES: i64 = 60;

#[derive(Debug, Default)]
struct Counters {
    objects_seen: u64,
    referenced: u64,
    too_recent: u64,
    deleted: u64,
    failed: u64,
}

struct Args {
    dry_run: bool,
    grace_minutes: i64,
}

fn parse_args() -> Option<Args> {
    let mut args = Args {
        dry_run: false,
        grace_minutes: DEFAULT_GRACE_MINUTES,
    };
    let mut it = env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--dry-run" | "-n" => args.dry_run = true,
            "--grace-minutes" => match it.next().and_then(|v| v.parse().ok()) {
                Some(m) if m >= 0 => args.grace_minutes = m,
                _ => {
                    error!("--grace-minutes needs a non-negative number");
                    std::process::exit(2);
                }
            },
            "-h" | "--help" => {
                print_help();
                return None;
            }
            other => warn!("unknown_arg = {}", other),
        }
    }
    Some(args)
}

fn required_env(name: &str) -> String {
    match env::var(name) {
        Ok(v) => v,
        Err(_) => {
            error!("{} is not set", name);
            std::process::exit(2);
        }
    }
}

/// Objects with no generation row that are older than the cutoff.
/// Objects without a creation time are kept.
fn orphans(
    objects: Vec<StoredObject>,
    referenced: &HashSet<String>,
    cutoff: DateTime<Utc>,
    counters: &mut Counters,
) -> Vec<StoredObject> {
    let mut out = Vec::new();
    for object in objects {
        counters.objects_seen += 1;
        if referenced.contains(&object.name) {
            counters.referenced += 1;
            continue;
        }
        match object.created_at {
            Some(t) if t < cutoff => out.push(object),
            _ => counters.too_recent += 1,
        }
    }
    out
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let Some(args) = parse_args() else {
        return;
    };

    let db = match Database::connect(required_env("DATABASE_URL")).await {
        Ok(db) => db,
        Err(e) => {
            error!("Could not connect to the database: {}", e);
            std::process::exit(2);
        }
    };
    let store = match SupabaseAssetStore::new(
        &required_env("SUPABASE_URL"),
        &required_env("SUPABASE_SERVICE_KEY"),
        &env::var("STORAGE_BUCKET").unwrap_or_else(|_| "assets".to_string()),
        Duration::from_secs(60),
    ) {
        Ok(store) => store,
        Err(e) => {
            error!("Could not build the storage client: {}", e);
            std::process::exit(2);
        }
    };

    let referenced: HashSet<String> = match Generation::find()
        .select_only()
        .column(generation::Column::AssetId)
        .into_tuple::<String>()
        .all(&db)
        .await
    {
        Ok(keys) => keys.into_iter().collect(),
        Err(e) => {
            error!("Error loading generation asset keys: {}", e);
            std::process::exit(1);
        }
    };
    let objects = match store.list_objects().await {
        Ok(objects) => objects,
        Err(e) => {
            error!("Error listing storage objects: {}", e);
            std::process::exit(1);
        }
    };
    info!(
        objects = objects.len(),
        referenced = referenced.len(),
        "Loaded storage listing and generation keys"
    );

    let mut counters = Counters::default();
    let cutoff = Utc::now() - chrono::Duration::minutes(args.grace_minutes);
    let orphans = orphans(objects, &referenced, cutoff, &mut counters);

    if orphans.is_empty() {
        println!("No orphaned objects found.");
        return;
    }
    println!("Orphaned objects ({}):", orphans.len());
    for o in &orphans {
        println!("- {} created_at={:?}", o.name, o.created_at);
    }

    if args.dry_run {
        println!("--dry-run: nothing was deleted.");
        return;
    }

    println!("Delete these objects? Type 'yes' to confirm:");
    print!("> ");
    let _ = io::stdout().flush();
    let mut answer = String::new();
    if io::stdin().read_line(&mut answer).is_err() {
        error!("Could not read confirmation");
        std::process::exit(1);
    }
    if answer.trim() != "yes" {
        println!("Cancelled.");
        return;
    }

    for o in &orphans {
        match store.delete(&o.name).await {
            Ok(()) => counters.deleted += 1,
            Err(e) => {
                counters.failed += 1;
                error!("Error deleting {}: {}", o.name, e);
            }
        }
    }

    println!("Done.");
    println!("- objects seen: {}", counters.objects_seen);
    println!("- referenced by a generation: {}", counters.referenced);
    println!("- within grace period: {}", counters.too_recent);
    println!("- deleted: {}", counters.deleted);
    println!("- failed: {}", counters.failed);
}

fn print_help() {
    println!("Deletes stored images that no generation refers to\n");
    println!("Usage: clean_orphans [--dry-run] [--grace-minutes N]\n");
    println!("Objects younger than the grace period (default {} minutes) are kept,", DEFAULT_GRACE_MINUTES);
    println!("so uploads still waiting for their record are not swept.\n");
    println!("Environment:");
    println!("  DATABASE_URL          PostgreSQL connection string");
    println!("  SUPABASE_URL          storage base URL");
    println!("  SUPABASE_SERVICE_KEY  storage credential");
    println!("  STORAGE_BUCKET        bucket name (default assets)");
}
