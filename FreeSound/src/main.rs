use fsdownload::DownloaderServerExt;
use fsserver::ServerBuilder;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut server = ServerBuilder::new_configured().build();
    server.init_logging().await;

    info!("🎵 Initializing downloader...");
    let downloader = server.init_downloader().await?;

    if downloader.ffmpeg_available().await {
        info!("✅ ffmpeg found");
    } else {
        tracing::warn!(
            "⚠️ ffmpeg not found at '{}', downloads will fail",
            downloader.settings().encoder.ffmpeg_path
        );
    }

    info!("🌐 Starting HTTP server...");
    server.start().await?;

    let info = server.info();
    info!("✅ FreeSound is ready at {}", info.base_url);
    info!("Press Ctrl+C to stop...");
    server.wait().await;

    Ok(())
}
