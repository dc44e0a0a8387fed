use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use url::Url;

use ydm_core::batch::BatchCoordinator;
use ydm_core::config::CoreConfig;
use ydm_core::types::types::{
    parse_url_list, BatchReport, DownloadError, DownloadRequest, Quality,
};

mod terminal_observer;
use terminal_observer::TerminalBatchObserver;

#[derive(Parser)]
#[command(name = "ydm", about = "Batch video/audio downloader driving yt-dlp")]
struct Args {
    /// URLs to download
    urls: Vec<String>,

    /// File with one URL per line
    #[arg(long)]
    urls_file: Option<PathBuf>,

    /// Continue from the persisted pending-URL list
    #[arg(long)]
    resume: bool,

    /// Output directory or yt-dlp output template
    #[arg(short, long, default_value = ".")]
    output: String,

    /// audio, 1440p, 1080p or 720p
    #[arg(short, long, default_value = "1080p")]
    quality: String,

    /// Audio codec (audio) or container (video), e.g. mp3, flac, mkv
    #[arg(short, long)]
    format: Option<String>,

    /// Subtitle language prefix to embed, e.g. en (video only)
    #[arg(long)]
    subs: Option<String>,

    /// Path to the yt-dlp executable
    #[arg(long)]
    ytdlp: Option<PathBuf>,

    /// Path to ffmpeg (binary or directory)
    #[arg(long)]
    ffmpeg: Option<PathBuf>,

    /// Where the pending-URL list is kept
    #[arg(long)]
    pending_list: Option<PathBuf>,

    /// JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Check available formats for every URL before starting
    #[arg(long)]
    probe_formats: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    let start = Instant::now();

    match run(args).await {
        Ok(report) => {
            println!(
                "Downloaded {} item(s) in {:.2}s",
                report.completed.len(),
                start.elapsed().as_secs_f64()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Download failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn load_config(args: &Args) -> Result<CoreConfig, DownloadError> {
    let mut config = match args.config.as_deref() {
        Some(path) => CoreConfig::load(path).await?,
        None => CoreConfig::default(),
    };
    if let Some(path) = args.ytdlp.clone() {
        config = config.with_executable(path);
    }
    if let Some(path) = args.ffmpeg.clone() {
        config = config.with_ffmpeg_location(path);
    }
    if let Some(path) = args.pending_list.clone() {
        config = config.with_pending_list_path(path);
    }
    if args.probe_formats {
        config = config.with_probe_formats(true);
    }
    Ok(config)
}

async fn collect_urls(args: &Args, coordinator: &BatchCoordinator) -> Result<Vec<Url>, DownloadError> {
    let mut urls = Vec::new();
    for raw in &args.urls {
        match Url::parse(raw) {
            Ok(url) => urls.push(url),
            Err(e) => log::warn!("[cli] skipping {:?}: {}", raw, e),
        }
    }
    if let Some(path) = args.urls_file.as_deref() {
        let text = tokio::fs::read_to_string(path).await?;
        urls.extend(parse_url_list(&text));
    }
    if args.resume {
        let pending = coordinator.pending_list().load().await?;
        log::info!("[cli] resuming {} pending url(s)", pending.len());
        urls.extend(pending);
    }
    Ok(urls)
}

async fn run(args: Args) -> Result<BatchReport, DownloadError> {
    let config = load_config(&args).await?;
    let quality: Quality = args.quality.parse()?;

    let mut coordinator = BatchCoordinator::new(config);
    let urls = collect_urls(&args, &coordinator).await?;
    if urls.is_empty() {
        return Err(DownloadError::InvalidRequest(
            "no URLs given (pass URLs, --urls-file or --resume)".to_string(),
        ));
    }

    let request = DownloadRequest::new(urls, args.output.clone(), quality)
        .with_file_format(args.format.clone().unwrap_or_default())
        .with_subtitle_langs(args.subs.clone().unwrap_or_default());

    let observer = Arc::new(TerminalBatchObserver::new(request.urls.len()));
    coordinator.add_observer(observer.clone());
    let coordinator = Arc::new(coordinator);

    observer.println(format!(
        "Starting batch: {} url(s) at {}",
        request.urls.len(),
        request.quality
    ));
    let handle = coordinator.start(request)?;

    let token = handle.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("[cli] interrupt received, cancelling batch");
            token.cancel();
        }
    });

    let result = handle.wait().await;
    if result.is_err() {
        let state = coordinator.state();
        if !state.pending_urls.is_empty() {
            eprintln!(
                "{} url(s) left in {}; rerun with --resume to continue",
                state.pending_urls.len(),
                coordinator.pending_list().path().display()
            );
        }
    }
    result
}
