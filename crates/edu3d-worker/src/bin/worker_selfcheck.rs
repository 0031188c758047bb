use std::path::Path;

use edu3d_media::{probe_blender, probe_ffmpeg, ToolProbe};
use edu3d_worker::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env();

    println!(
        "worker-selfcheck: starting with work_dir={} output_dir={}",
        config.work_dir.display(),
        config.output_dir.display()
    );
    ensure_dir(&config.work_dir).await?;
    ensure_dir(&config.output_dir).await?;
    ensure_tool(probe_ffmpeg(&config.tools).await, "ffmpeg")?;
    ensure_tool(probe_blender(&config.tools).await, "blender")?;
    ensure_env_present(&["REDIS_URL"])?;

    if config.openai.is_none() {
        println!("worker-selfcheck: OPENAI_API_KEY not set, analysis will use the baseline");
    }
    if config.gemini.is_none() {
        println!("worker-selfcheck: GOOGLE_API_KEY not set, image workflow disabled");
    }

    println!("worker-selfcheck: ok");
    Ok(())
}

async fn ensure_dir<P: AsRef<Path>>(path: P) -> anyhow::Result<()> {
    let path = path.as_ref();
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| anyhow::anyhow!("cannot create {}: {}", path.display(), e))?;
    Ok(())
}

fn ensure_tool(probe: ToolProbe, name: &str) -> anyhow::Result<()> {
    if !probe.ok {
        return Err(anyhow::anyhow!(
            "{} not available: {}",
            name,
            probe.error.unwrap_or_default()
        ));
    }
    println!(
        "worker-selfcheck: {} {} ({} ms)",
        name,
        probe.version.unwrap_or_default(),
        probe.latency_ms
    );
    Ok(())
}

fn ensure_env_present(vars: &[&str]) -> anyhow::Result<()> {
    for var in vars {
        if std::env::var(var).is_err() {
            return Err(anyhow::anyhow!("missing required env var {}", var));
        }
    }
    Ok(())
}
