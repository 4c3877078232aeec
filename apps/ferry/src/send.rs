use std::time::Duration;

use ferry_client::{
    TcpConnector, UploadConfig, UploadDriver, UploadEvent, UploadReport, UploadState,
};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Uploads one file, drawing a progress bar unless `quiet`.
pub async fn run(
    connector: TcpConnector,
    config: UploadConfig,
    quiet: bool,
) -> anyhow::Result<UploadReport> {
    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, cancelling upload");
            interrupt.cancel();
        }
    });

    let total = tokio::fs::metadata(&config.file_path).await?.len();
    let bar = progress_bar(total, quiet);

    let (tx, mut rx) = mpsc::channel(256);
    let display = {
        let bar = bar.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                render(&bar, &event);
            }
        })
    };

    let result = UploadDriver::new(connector, config, cancel)
        .with_events(tx)
        .run()
        .await;

    // The driver owned the only sender; the display task drains and exits.
    let _ = display.await;
    match &result {
        Ok(_) => bar.finish_with_message("complete"),
        Err(_) => bar.abandon(),
    }
    Ok(result?)
}

fn progress_bar(total: u64, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

fn render(bar: &ProgressBar, event: &UploadEvent) {
    match event {
        UploadEvent::StateChanged(state) => bar.set_message(state.to_string()),
        UploadEvent::Acknowledged {
            offset,
            bytes_per_second,
            ..
        } => {
            bar.set_position(*offset);
            bar.set_message(format_speed(*bytes_per_second));
        }
        UploadEvent::Retrying {
            attempt,
            delay,
            error,
        } => {
            bar.set_message(format!(
                "retry #{attempt} in {:.1}s ({error})",
                delay.as_secs_f64()
            ));
        }
        UploadEvent::Completed(report) => bar.set_position(report.total_size),
    }
}

fn format_speed(bytes_per_second: f64) -> String {
    if bytes_per_second <= 0.0 {
        return UploadState::Sending.to_string();
    }
    if bytes_per_second >= 1_048_576.0 {
        format!("{:.1} MiB/s", bytes_per_second / 1_048_576.0)
    } else {
        format!("{:.1} KiB/s", bytes_per_second / 1024.0)
    }
}
