use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use youtube_grab::downloader::tools::ToolManager;
use youtube_grab::downloader::{
    DownloadRequest, Downloader, ExtractorMode, FetchConfig, FormatChoice, ProgressEmitter,
};
use youtube_grab::logging;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// YouTube video URL (or bare video id)
    #[arg(required_unless_present = "check_tools")]
    url: Option<String>,

    /// Download audio only and save it as .mp3
    #[arg(short = 'a', long)]
    audio: bool,

    /// Destination directory. Empty means ./videos; relative paths resolve under $HOME
    #[arg(short = 'p', long, default_value = "")]
    path: String,

    /// SOCKS5/HTTP proxy passed to yt-dlp (overrides YTDLP_PROXY)
    #[arg(long)]
    proxy: Option<String>,

    /// cookies.txt file passed to yt-dlp
    #[arg(long)]
    cookies: Option<String>,

    /// Read cookies from this browser (e.g. chrome, firefox)
    #[arg(long, value_name = "BROWSER")]
    cookies_from_browser: Option<String>,

    /// How yt-dlp is launched: auto, python or cli
    #[arg(long, default_value = "auto")]
    mode: ExtractorMode,

    /// Path to the yt-dlp binary (overrides YTDLP_PATH)
    #[arg(long)]
    ytdlp: Option<String>,

    /// Seconds allowed for the stream lookup
    #[arg(long, default_value_t = 60)]
    lookup_timeout: u64,

    /// Seconds allowed for the transfer; unlimited when omitted
    #[arg(long)]
    transfer_timeout: Option<u64>,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,

    /// Report yt-dlp availability and exit
    #[arg(long)]
    check_tools: bool,

    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    logging::init_tracing(args.verbose);

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<ExitCode> {
    let config = FetchConfig::from_env()
        .with_mode(args.mode)
        .with_ytdlp_path(args.ytdlp.clone())
        .with_proxy(args.proxy.clone())
        .with_cookies_path(args.cookies.clone())
        .with_cookies_from_browser(args.cookies_from_browser.clone())
        .with_lookup_timeout(Duration::from_secs(args.lookup_timeout))
        .with_transfer_timeout(args.transfer_timeout.map(Duration::from_secs));

    if args.check_tools {
        let manager = ToolManager::new(config.python_cmd.clone(), config.ytdlp_path.clone());
        let tools = manager.get_all_tools();
        if args.json {
            println!("{}", serde_json::to_string_pretty(&tools)?);
        } else {
            for tool in &tools {
                match (&tool.path, &tool.version) {
                    (Some(path), Some(version)) => {
                        println!("✓ {} {} ({})", tool.name, version, path)
                    }
                    (Some(path), None) => {
                        println!("? {} found at {} (version unknown)", tool.name, path)
                    }
                    _ => println!("✗ {} not found", tool.name),
                }
            }
        }
        let code = if tools.iter().any(|t| t.is_available) {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        };
        return Ok(code);
    }

    let url = args.url.context("a URL is required")?;
    let choice = if args.audio {
        FormatChoice::AudioOnly
    } else {
        FormatChoice::AvCombined
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    let downloader = Downloader::from_config(config).with_progress(ProgressEmitter::new(tx));

    let quiet = args.json;
    let printer = tokio::spawn(async move {
        let mut printed = false;
        while let Some(progress) = rx.recv().await {
            if !quiet {
                eprint!("\r{:<72}", progress.status);
                printed = true;
            }
        }
        if printed {
            eprintln!();
        }
    });

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Ctrl-C received, cancelling download");
                cancel.cancel();
            }
        });
    }

    let request = DownloadRequest::new(url, choice).with_destination(args.path);
    let outcome = downloader
        .resolve_and_fetch_cancellable(&request, &cancel)
        .await;

    // Dropping the downloader closes the progress channel
    drop(downloader);
    let _ = printer.await;

    match outcome {
        Ok(result) => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Done downloading {}", result.media_title);
                println!("Downloaded to: {}", result.final_file_path.display());
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            if args.json {
                let body = serde_json::json!({
                    "error": e.kind().as_str(),
                    "message": e.to_string(),
                    "suggestion": e.suggestion(),
                    "retry_with": e.retry_hints(),
                });
                println!("{}", serde_json::to_string_pretty(&body)?);
            } else {
                eprintln!("[{}] {}", e.kind(), e);
                if let Some(suggestion) = e.suggestion() {
                    eprintln!("\n{}", suggestion);
                }
                let hints = e.retry_hints();
                if !hints.is_empty() {
                    eprintln!("\nRetry with: {}", hints.join(" or "));
                }
            }
            Ok(ExitCode::FAILURE)
        }
    }
}
