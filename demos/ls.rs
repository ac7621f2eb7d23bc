//! Example: list uploads, or the raw files of one upload
//!
//! Usage:
//!   cargo run --example ls -- [--token TOKEN] [--page N]
//!   cargo run --example ls -- [--token TOKEN] [--recursive] <UPLOAD_ID> [PATH]

mod cli;

use cli::{ArgParser, Connection, init_logging, usage_and_exit};
use nomadlib::tree::join_path;
use nomadlib::{Portal, RemoteTree};

const USAGE: &str = "Usage: cargo run --example ls -- [--api-base URL] [--token TOKEN] [--page N] [--recursive] [UPLOAD_ID [PATH]]";

#[tokio::main]
async fn main() -> nomadlib::Result<()> {
    init_logging();

    let mut parser = ArgParser::new(USAGE);
    let connection = Connection::from_parser(&mut parser);
    let page = parser
        .take_value(&["--page"])
        .map(|p| p.parse::<u32>().unwrap_or_else(|_| usage_and_exit(USAGE)))
        .unwrap_or(1);
    let recursive = parser.take_flag(&["--recursive", "-r"]);
    let positionals = parser.remaining();

    let portal = connection.connect()?;
    match positionals.as_slice() {
        [] => list_uploads(&portal, page).await,
        [upload_id] => list_tree(&portal.tree(upload_id), "", recursive).await,
        [upload_id, path] => list_tree(&portal.tree(upload_id), path, recursive).await,
        _ => usage_and_exit(USAGE),
    }
}

async fn list_uploads(portal: &Portal, page: u32) -> nomadlib::Result<()> {
    let listing = portal.uploads().list(page, 20).await?;
    println!("Uploads (page {}, {} total)\n", page, listing.total);

    if listing.uploads.is_empty() {
        println!("  (empty)");
    }
    for upload in listing.uploads {
        println!(
            "  {} {:<10} {}",
            upload.upload_id,
            upload.status,
            upload.name.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

async fn list_tree(tree: &RemoteTree, path: &str, recursive: bool) -> nomadlib::Result<()> {
    let mut pending = vec![(path.to_string(), 0usize)];

    while let Some((dir, depth)) = pending.pop() {
        tree.expand(&dir).await?;
        let Some(node) = tree.read(&dir) else {
            continue;
        };

        let indent = "  ".repeat(depth + 1);
        if node.content.is_empty() && depth == 0 {
            println!("{}(empty)", indent);
        }
        if recursive {
            // Reversed so subdirectories are visited in server order.
            for entry in node.content.iter().rev().filter(|e| e.is_dir()) {
                pending.push((join_path(&dir, &entry.name), depth + 1));
            }
        }
        for entry in &node.content {
            if entry.is_file {
                let size = entry.size.map(format_size).unwrap_or_default();
                match &entry.parser {
                    Some(parser) => println!("{}{} {} [{}]", indent, entry.name, size, parser),
                    None => println!("{}{} {}", indent, entry.name, size),
                }
            } else {
                println!("{}{}/", indent, entry.name);
            }
        }
    }
    Ok(())
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{}B", bytes)
    } else if bytes < 1_048_576 {
        format!("{:.1}KB", bytes as f64 / 1024.0)
    } else if bytes < 1_073_741_824 {
        format!("{:.1}MB", bytes as f64 / 1_048_576.0)
    } else {
        format!("{:.2}GB", bytes as f64 / 1_073_741_824.0)
    }
}
