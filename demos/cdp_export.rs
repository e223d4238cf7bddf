//! Basic example: export a Google Doc as a PDF through headless Chrome

use drivecap::{ExportOptions, SessionConfig, Viewport};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "https://docs.google.com/document/d/example/view".to_string());

    let config = SessionConfig {
        viewport: Viewport {
            width: 1280,
            height: 900,
        },
        output_dir: "exports".into(),
        ..Default::default()
    };

    println!("Opening {}", url);
    let exporter = drivecap::launch(&url, config).await?;

    let mut progress = exporter.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = progress.recv().await {
            println!("[{:>3}%] {}", event.percent, event.message);
        }
    });

    let reply = exporter
        .download_pdf(ExportOptions {
            high_res: true,
            auto_scroll: true,
        })
        .await?;
    println!("Reply: {}", drivecap::Response::Export(reply).to_json());

    exporter.close().await?;
    Ok(())
}
