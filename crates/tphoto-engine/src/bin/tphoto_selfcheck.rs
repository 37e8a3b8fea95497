use std::path::Path;

use tphoto_backend::HttpBackend;
use tphoto_engine::{init_tracing, EngineConfig};
use tphoto_media::{check_ffmpeg, check_ffprobe};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = EngineConfig::from_env();
    config.validate()?;

    println!(
        "tphoto-selfcheck: starting with cache_dir={}",
        config.cache.dir.display()
    );
    ensure_cache_dir(&config.cache.dir).await?;
    ensure_tools()?;
    ensure_backend(&config).await?;

    println!("tphoto-selfcheck: ok");
    Ok(())
}

async fn ensure_cache_dir(path: &Path) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(path).await?;
    let probe = path.join(".selfcheck");
    tokio::fs::write(&probe, b"ok")
        .await
        .map_err(|e| anyhow::anyhow!("cache dir {} not writable: {}", path.display(), e))?;
    tokio::fs::remove_file(&probe).await?;
    Ok(())
}

fn ensure_tools() -> anyhow::Result<()> {
    let ffmpeg = check_ffmpeg()?;
    let ffprobe = check_ffprobe()?;
    println!(
        "tphoto-selfcheck: ffmpeg={} ffprobe={}",
        ffmpeg.display(),
        ffprobe.display()
    );
    Ok(())
}

async fn ensure_backend(config: &EngineConfig) -> anyhow::Result<()> {
    let backend = HttpBackend::new(config.backend.clone())?;
    if !backend.health_check().await? {
        return Err(anyhow::anyhow!(
            "backend at {} reported unhealthy",
            backend.base_url()
        ));
    }
    Ok(())
}
