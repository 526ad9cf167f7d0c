use anyhow::{anyhow, bail, Context, Result};
use kestrel_catalog::cli::CliOverrides;
use kestrel_catalog::config::CatalogConfig;
use kestrel_catalog::scene::EditorScene;
use kestrel_catalog::{CatalogPipeline, ObjectModel};
use log::{info, warn};
use serde_json::json;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::thread;
use std::time::{Duration, Instant};

const SCAN_DEADLINE: Duration = Duration::from_secs(30);

fn main() {
    env_logger::init();
    match run() {
        Ok(unresolved) => {
            if unresolved > 0 {
                process::exit(2);
            }
        }
        Err(err) => {
            eprintln!("catalog_scan error: {err:?}");
            process::exit(1);
        }
    }
}

fn run() -> Result<usize> {
    let cli = CliOverrides::parse_from_env()?;
    let mut config = match cli.config_path() {
        Some(path) => CatalogConfig::load(path)?,
        None => CatalogConfig::default(),
    };
    let overrides = cli.config_overrides();
    if !overrides.is_empty() {
        info!("[catalog_scan] overrides applied: {}", overrides.applied_fields().join(", "));
        config.apply_overrides(&overrides);
    }
    if cli.targets().is_empty() {
        print_usage();
        bail!("no definition paths given");
    }

    let mut scene = EditorScene::new();
    for file in collect_definitions(cli.targets())? {
        if let Err(err) = scene.import_file(&file) {
            warn!("[catalog_scan] skipping {}: {err:#}", file.display());
        }
    }
    let discovered: usize = scene.namespaces().iter().map(|namespace| scene.objects(namespace).len()).sum();

    let mut pipeline = CatalogPipeline::new(&config)?;
    pipeline.request_scan(&scene, None);
    let deadline = Instant::now() + SCAN_DEADLINE;
    while !pipeline.is_idle() {
        pipeline.update_contents(&scene, None);
        if Instant::now() > deadline {
            return Err(anyhow!("scan did not finish within {}s", SCAN_DEADLINE.as_secs()));
        }
        thread::sleep(Duration::from_millis(1));
    }

    for key in pipeline.keys() {
        let Some(entry) = pipeline.entry(&key) else {
            continue;
        };
        let kind = if entry.descriptor.is_static() { "static" } else { "animated" };
        println!(
            "{key} {kind} rotations={:?} frames={} source={}",
            entry.rotations.as_slice(),
            entry.descriptor.frame_count(),
            entry.descriptor.source.display()
        );
    }
    let unresolved = discovered.saturating_sub(pipeline.len());
    let summary = json!({
        "summary": {
            "discovered": discovered,
            "cached": pipeline.len(),
            "unresolved": unresolved,
            "images": pipeline.images().image_count(),
            "textures": pipeline.images().texture_count(),
        }
    });
    println!("{summary}");
    Ok(unresolved)
}

fn print_usage() {
    eprintln!(
        "Catalog Scan

Usage:
  catalog_scan [--config <file>] [--publish-budget <n>] <path> [<path>...]

Each <path> may be a definition file or a directory walked recursively for
JSON files. Every declared object is resolved and the catalog is printed.
Exit code 2 means some objects could not be resolved.
"
    );
}

fn collect_definitions(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut seen = HashSet::new();
    for input in inputs {
        if input.is_file() {
            if seen.insert(input.clone()) {
                files.push(input.clone());
            }
        } else if input.is_dir() {
            walk_dir(input, &mut seen, &mut files)
                .with_context(|| format!("failed to enumerate directory '{}'", input.display()))?;
        } else {
            bail!("path '{}' does not exist", input.display());
        }
    }
    files.sort();
    Ok(files)
}

fn walk_dir(dir: &Path, seen: &mut HashSet<PathBuf>, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            walk_dir(&path, seen, files)?;
        } else if is_json(&path) && seen.insert(path.clone()) {
            files.push(path);
        }
    }
    Ok(())
}

fn is_json(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()).map(|ext| ext.eq_ignore_ascii_case("json")).unwrap_or(false)
}
