//! Example: create an upload and stream an archive into it
//!
//! Usage:
//!   cargo run --example upload -- [--api-base URL] --token TOKEN [--name NAME] [--wait] <ARCHIVE>

mod cli;

use std::process;
use std::time::Duration;

use cli::{ArgParser, Connection, init_logging, usage_and_exit};
use nomadlib::make_progress_bar;
use tokio_util::sync::CancellationToken;

const USAGE: &str = "Usage: cargo run --example upload -- [--api-base URL] [--token TOKEN] [--proxy PROXY] [--name NAME] [--wait] <ARCHIVE>";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let mut parser = ArgParser::new(USAGE);
    let connection = Connection::from_parser(&mut parser);
    let name = parser.take_value(&["--name", "-n"]);
    let wait = parser.take_flag(&["--wait", "-w"]);
    let positionals = parser.remaining();
    if positionals.len() != 1 {
        usage_and_exit(USAGE);
    }
    let archive = &positionals[0];
    let name = name.unwrap_or_else(|| archive.clone());

    let portal = connection.connect()?;
    let uploads = portal.upload_resource();

    println!("Creating upload {}...", name);
    let mut record = uploads.create(&name).await?;
    if !record.accepts_payload() {
        uploads.refresh(&mut record).await?;
    }
    println!("Upload id: {}", record.upload_id);

    // Ctrl-C aborts the transfer instead of killing the process.
    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    let mut record = match uploads
        .upload_file(record, archive, Some(make_progress_bar()), &cancel)
        .await
    {
        Ok(record) => record,
        Err(failure) if failure.error.is_aborted() => {
            println!("\nTransfer cancelled; upload {} kept.", failure.record.upload_id);
            return Ok(());
        }
        Err(failure) => {
            eprintln!("Transfer failed: {}", failure);
            eprintln!("Retry with upload {}", failure.record.upload_id);
            process::exit(1);
        }
    };
    println!("Transfer complete!");

    if wait {
        println!("Waiting for processing...");
        uploads
            .wait_until_settled(&mut record, Duration::from_secs(2), 300)
            .await?;
        println!(
            "Upload {} is {} ({} entries)",
            record.upload_id,
            record.status,
            record.entries.unwrap_or(0)
        );
    }

    Ok(())
}
