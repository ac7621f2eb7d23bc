mod cli;

use cli::{ArgParser, Connection, init_logging, usage_and_exit};
use nomadlib::DeleteAck;

const USAGE: &str =
    "Usage: cargo run --example rm -- [--api-base URL] [--token TOKEN] [--proxy PROXY] <UPLOAD_ID>...";

#[tokio::main]
async fn main() -> nomadlib::Result<()> {
    init_logging();

    let mut parser = ArgParser::new(USAGE);
    let connection = Connection::from_parser(&mut parser);
    let targets = parser.remaining();
    if targets.is_empty() {
        usage_and_exit(USAGE);
    }

    let uploads = connection.connect()?.uploads();
    for upload_id in targets {
        println!("Removing: {}", upload_id);
        match uploads.delete(&upload_id).await {
            Ok(DeleteAck::Deleted) => println!("Removed successfully!"),
            Ok(DeleteAck::AlreadyGone) => println!("Already gone."),
            Err(e) => eprintln!("Failed to remove: {}", e),
        }
    }

    Ok(())
}
