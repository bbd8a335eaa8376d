//! Cache command - inspect or clear a build cache

use crate::cache::{dir_size, format_bytes, CacheFingerprint, CACHED_PATHS};
use crate::cli::args::{CacheAction, CacheArgs, OutputFormat};
use crate::error::{RbpackError, RbpackResult};
use crate::store::{keys, CacheStore, DirCacheStore, DirMetadataStore, MetadataStore, METADATA_DIR};
use crate::ui::{self, TaskSpinner, UiContext};
use console::style;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Execute the cache command
pub async fn execute(args: CacheArgs) -> RbpackResult<()> {
    match args.action {
        CacheAction::Info { cache_dir, format } => show_info(&cache_dir, format).await,
        CacheAction::Clear { cache_dir, yes } => clear_cache(&cache_dir, yes).await,
    }
}

/// What a cache directory holds
#[derive(Debug, Serialize)]
struct CacheInfo {
    cache_dir: PathBuf,
    ruby_version: Option<String>,
    pipeline_version: Option<String>,
    bundler_version: Option<String>,
    fingerprint: Option<CacheFingerprint>,
    digest: Option<String>,
    paths: Vec<CachedPath>,
}

#[derive(Debug, Serialize)]
struct CachedPath {
    path: String,
    present: bool,
    bytes: u64,
}

impl CacheInfo {
    async fn read(cache_dir: &Path) -> RbpackResult<Self> {
        let metadata = DirMetadataStore::new(cache_dir.join(METADATA_DIR));
        let fingerprint = match metadata.read(keys::FINGERPRINT).await? {
            Some(bytes) => CacheFingerprint::from_bytes(&bytes).ok(),
            None => None,
        };

        let paths = CACHED_PATHS
            .iter()
            .map(|path| {
                let full = cache_dir.join(path);
                CachedPath {
                    path: path.to_string(),
                    present: full.exists(),
                    bytes: dir_size(&full),
                }
            })
            .collect();

        Ok(Self {
            cache_dir: cache_dir.to_path_buf(),
            ruby_version: metadata.read_string(keys::RUBY_VERSION).await?,
            pipeline_version: metadata.read_string(keys::PIPELINE_VERSION).await?,
            bundler_version: metadata.read_string(keys::BUNDLER_VERSION).await?,
            digest: fingerprint.as_ref().map(CacheFingerprint::digest),
            fingerprint,
            paths,
        })
    }

    fn is_empty(&self) -> bool {
        self.fingerprint.is_none() && self.paths.iter().all(|p| !p.present)
    }
}

async fn show_info(cache_dir: &Path, format: OutputFormat) -> RbpackResult<()> {
    if !cache_dir.is_dir() {
        return Err(RbpackError::PathNotFound(cache_dir.to_path_buf()));
    }
    let info = CacheInfo::read(cache_dir).await?;

    match format {
        OutputFormat::Table => print_info_table(&info),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&info)?),
        OutputFormat::Plain => print_info_plain(&info),
    }
    Ok(())
}

fn print_info_table(info: &CacheInfo) {
    println!("Cache: {}", info.cache_dir.display());
    println!();

    if info.is_empty() {
        println!("No build has been cached here yet.");
        return;
    }

    let unknown = || "-".to_string();
    println!("{:<20} {}", "RUBY", info.ruby_version.clone().unwrap_or_else(unknown));
    println!("{:<20} {}", "RBPACK", info.pipeline_version.clone().unwrap_or_else(unknown));
    println!("{:<20} {}", "BUNDLER", info.bundler_version.clone().unwrap_or_else(unknown));
    println!("{:<20} {}", "FINGERPRINT", info.digest.clone().unwrap_or_else(unknown));

    if let Some(ref fingerprint) = info.fingerprint {
        println!(
            "{:<20} {}",
            "RECORDED",
            fingerprint.recorded_at.format("%Y-%m-%d %H:%M")
        );
        println!();
        println!("Runtimes:");
        for (description, gem_version) in &fingerprint.runtimes {
            println!(
                "  {} {} (RubyGems {})",
                style("•").cyan(),
                description,
                gem_version
            );
        }
    }

    println!();
    println!("Cached paths:");
    for path in &info.paths {
        if path.present {
            println!(
                "  {} {} ({})",
                style("✓").green(),
                path.path,
                format_bytes(path.bytes)
            );
        } else {
            println!("  {} {}", style("○").dim(), path.path);
        }
    }
}

fn print_info_plain(info: &CacheInfo) {
    let fields = [
        ("ruby_version", &info.ruby_version),
        ("pipeline_version", &info.pipeline_version),
        ("bundler_version", &info.bundler_version),
        ("fingerprint", &info.digest),
    ];
    for (key, value) in fields {
        if let Some(value) = value {
            println!("{}={}", key, value);
        }
    }
    for path in info.paths.iter().filter(|p| p.present) {
        println!("{}={}", path.path, path.bytes);
    }
}

/// Remove cached gems and build metadata
async fn clear_cache(cache_dir: &Path, skip_confirm: bool) -> RbpackResult<()> {
    let ctx = UiContext::detect().with_auto_yes(skip_confirm);

    let targets: Vec<&str> = CACHED_PATHS
        .iter()
        .copied()
        .chain(std::iter::once(METADATA_DIR))
        .filter(|path| cache_dir.join(path).exists())
        .collect();

    if targets.is_empty() {
        ui::step_info(&ctx, "Nothing cached to clear");
        return Ok(());
    }

    ui::step_info(&ctx, "This will remove:");
    for path in &targets {
        ui::remark(&ctx, &cache_dir.join(path).display().to_string());
    }

    if !ui::confirm(&ctx, "Clear the cache?", false).await? {
        ui::step_info(&ctx, "Aborted, nothing was removed");
        return Ok(());
    }

    let store = DirCacheStore::new(cache_dir, cache_dir);
    let mut spinner = TaskSpinner::new(&ctx);
    spinner.start("Clearing cache...");
    for path in &targets {
        if let Err(e) = store.clear(path).await {
            spinner.stop_error("Failed to clear cache");
            return Err(e);
        }
    }
    spinner.stop(&format!("Removed {} cached path(s)", targets.len()));

    Ok(())
}
