//! drivecap command line: export one Drive document, or serve JSON requests
//! line by line on stdin.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use log::{error, warn};
use tokio::sync::{broadcast, mpsc};

use drivecap::detect::{watches_video, DocumentKind};
use drivecap::media::VideoDetected;
use drivecap::{ExportOptions, Exporter, ProgressEvent, Request, SessionConfig};

#[derive(Parser)]
#[command(name = "drivecap")]
#[command(about = "Export view-only Google Drive documents")]
#[command(version)]
struct Cli {
    /// Directory artifacts are written to
    #[arg(short, long, default_value = ".", global = true)]
    out_dir: PathBuf,

    /// Chrome or Chromium binary to launch
    #[arg(long, global = true)]
    chrome_path: Option<PathBuf>,

    /// Show the browser window
    #[arg(long, global = true)]
    headed: bool,

    /// Print replies and progress as JSON lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Save the document as one PDF
    Pdf {
        url: String,
        /// Render pages at twice their size
        #[arg(long)]
        high_res: bool,
        /// Capture only what is already rendered
        #[arg(long)]
        no_auto_scroll: bool,
    },
    /// Save the pages as PNG files in one ZIP
    Zip {
        url: String,
        #[arg(long)]
        no_auto_scroll: bool,
    },
    /// Save every rendered page as its own PNG
    Images { url: String },
    /// Print the direct video and audio URLs of a Drive video
    Video { url: String },
    /// Open the document and answer JSON requests read from stdin
    Serve { url: String },
}

impl Commands {
    fn url(&self) -> &str {
        match self {
            Commands::Pdf { url, .. }
            | Commands::Zip { url, .. }
            | Commands::Images { url }
            | Commands::Video { url }
            | Commands::Serve { url } => url,
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        error!("{}", e);
        eprintln!("drivecap: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> drivecap::Result<()> {
    let url = cli.command.url().to_string();
    match DocumentKind::from_url(&url) {
        Some(kind) => {
            if matches!(cli.command, Commands::Video { .. }) && !watches_video(&url) {
                warn!("{} pages are not watched for video; no media URL will be found", kind.label());
            }
        }
        None => warn!("{} does not look like a Google Docs, Slides or Drive viewer", url),
    }

    let config = SessionConfig {
        output_dir: cli.out_dir.clone(),
        chrome_path: cli.chrome_path.clone(),
        headless: !cli.headed,
        ..Default::default()
    };
    let exporter = drivecap::launch(&url, config).await?;
    let printer = tokio::spawn(print_progress(exporter.subscribe(), cli.json));
    let detections = tokio::spawn(print_detections(exporter.subscribe_video(), cli.json));

    let reply = match cli.command {
        Commands::Pdf {
            high_res,
            no_auto_scroll,
            ..
        } => Some(
            exporter
                .request(Request::DownloadPdf {
                    options: ExportOptions {
                        high_res,
                        auto_scroll: !no_auto_scroll,
                    },
                })
                .await?,
        ),
        Commands::Zip { no_auto_scroll, .. } => Some(
            exporter
                .request(Request::DownloadZip {
                    options: ExportOptions {
                        high_res: false,
                        auto_scroll: !no_auto_scroll,
                    },
                })
                .await?,
        ),
        Commands::Images { .. } => Some(exporter.request(Request::ExtractImages).await?),
        Commands::Video { .. } => Some(exporter.request(Request::GetVideoUrl).await?),
        Commands::Serve { .. } => {
            serve(&exporter).await?;
            None
        }
    };

    if let Some(reply) = reply {
        if cli.json {
            println!("{}", reply.to_json());
        } else {
            print_human(&reply);
        }
    }

    exporter.close().await?;
    printer.abort();
    detections.abort();
    Ok(())
}

/// One request per stdin line, one JSON reply per stdout line.
async fn serve(exporter: &Exporter) -> drivecap::Result<()> {
    let (line_tx, mut line_rx) = mpsc::unbounded_channel::<String>();
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            match line {
                Ok(line) => {
                    if line_tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("stdin read failed: {}", e);
                    break;
                }
            }
        }
    });

    while let Some(line) = line_rx.recv().await {
        if line.trim().is_empty() {
            continue;
        }
        let reply = match Request::from_json(&line) {
            Ok(request) => exporter.request(request).await?,
            Err(reply) => reply,
        };
        println!("{}", reply.to_json());
    }
    Ok(())
}

async fn print_progress(mut rx: broadcast::Receiver<ProgressEvent>, json: bool) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                if json {
                    if let Ok(line) = serde_json::to_string(&event) {
                        println!("{}", line);
                    }
                } else {
                    eprintln!("[{:>3}%] {}", event.percent, event.message);
                }
            }
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn print_detections(mut rx: broadcast::Receiver<VideoDetected>, json: bool) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                if json {
                    if let Ok(line) = serde_json::to_string(&event) {
                        println!("{}", line);
                    }
                } else if let Some(video) = &event.urls.video_url {
                    eprintln!("[video] {}", video);
                }
            }
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn print_human(reply: &drivecap::Response) {
    use drivecap::Response;
    match reply {
        Response::Export(r) if r.success => match r.count {
            Some(count) => println!("Exported {} page(s)", count),
            None => println!("Export complete"),
        },
        Response::Export(r) => {
            println!("Export failed: {}", r.error.as_deref().unwrap_or("unknown error"))
        }
        Response::Video(v) => match &v.video_url {
            Some(video) => {
                println!("video: {}", video);
                if let Some(audio) = &v.audio_url {
                    println!("audio: {}", audio);
                }
            }
            None => println!("No video URL detected. Start playback in the viewer and try again."),
        },
        other => println!("{}", other.to_json()),
    }
}
