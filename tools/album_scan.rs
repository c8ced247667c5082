use std::env;
use std::fs;
use std::path::PathBuf;

use common::ImageSlot;
use library::{config_path_from_env, load_or_create_config, DirectoryScan};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut args = env::args().skip(1);
    let album_dir = args
        .next()
        .or_else(|| env::var("ALBUM_DIR").ok())
        .ok_or("ALBUM_DIR not set and no path argument")?;
    let cover_dir = args.next().map(PathBuf::from);

    let config_path = config_path_from_env();
    let (config, created) = load_or_create_config(&config_path)?;
    if created {
        info!("Wrote default config to {:?}", config_path);
    }

    let scan = DirectoryScan::open(&album_dir, &config)?;
    for failure in scan.failures() {
        warn!("Skipped {}: {}", failure.file_relpath, failure.error);
    }

    let album = scan
        .album()
        .ok_or_else(|| format!("no album title found under {}", album_dir))?;

    if let Some(cover_dir) = cover_dir {
        fs::create_dir_all(&cover_dir)?;
        for slot in [ImageSlot::Front, ImageSlot::Back] {
            if let Some((name, image)) = scan.cover(slot) {
                let path = cover_dir.join(&name);
                fs::write(&path, &image.data)?;
                info!("Wrote {:?}", path);
            }
        }
    }

    println!("{}", serde_json::to_string_pretty(&album)?);
    Ok(())
}
