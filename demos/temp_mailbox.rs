//! Example: Inspect a temp-mailbox once, without retries.
//!
//! Looks at the newest message, prints any code it carries and deletes it.
//!
//! # Usage
//!
//! ```bash
//! export TEMP_MAIL_USERNAME="myinbox"
//! export TEMP_MAIL_EXT="@mailto.plus"
//! export TEMP_MAIL_EPIN="epin"
//! # Optional: self-hosted mirror
//! export TEMP_MAIL_URL="https://tempmail.plus"
//!
//! cargo run --example temp_mailbox
//! ```

use email_code::{RetrievalConfig, TempMailBackend, TempMailConfig};
use std::env;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> email_code::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("email_code=debug")),
        )
        .init();

    let username =
        env::var("TEMP_MAIL_USERNAME").expect("TEMP_MAIL_USERNAME environment variable required");
    let extension = env::var("TEMP_MAIL_EXT").expect("TEMP_MAIL_EXT environment variable required");
    let epin = env::var("TEMP_MAIL_EPIN").expect("TEMP_MAIL_EPIN environment variable required");

    let mut mailbox = TempMailConfig::new(username, extension, epin);
    if let Ok(url) = env::var("TEMP_MAIL_URL") {
        mailbox = mailbox.with_base_url(url);
    }

    let config = RetrievalConfig::builder()
        .account(mailbox.address())
        .temp_mail(mailbox)
        .build()?;

    let backend = TempMailBackend::new(&config)?;
    println!("Checking {}...", backend.address());

    match backend.fetch_latest().await? {
        Some((code, message_id)) => {
            println!("Message {message_id} carries code {code}");
            let deleted = backend.delete(message_id).await;
            println!("Deleted: {deleted}");
        }
        None => println!("No code in the newest message"),
    }

    Ok(())
}
