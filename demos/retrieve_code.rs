//! Example: Retrieve a verification code using settings from the environment.
//!
//! Without `MAIL_HOST` the temp-mailbox is used; with it, the mail server is
//! read over POP3 (or IMAP when `MAIL_PROTOCOL=IMAP`).
//!
//! # Usage
//!
//! ```bash
//! export CODE_ACCOUNT="signup-4821@example.com"
//!
//! # Either a mail server...
//! export MAIL_HOST="imap.example.com"
//! export MAIL_USER="me@example.com"
//! export MAIL_PASSWORD="app-password"
//! export MAIL_PROTOCOL="IMAP"       # optional, POP3 by default
//! export MAIL_PORT="993"            # optional
//! export MAIL_FOLDER="INBOX"        # optional
//!
//! # ...or a temp-mailbox
//! export TEMP_MAIL_USERNAME="myinbox"
//! export TEMP_MAIL_EXT="@mailto.plus"
//! export TEMP_MAIL_EPIN="epin"
//!
//! export RUST_LOG=email_code=debug
//! cargo run --example retrieve_code
//! ```

use email_code::{MailServerConfig, RetrievalConfig, TempMailConfig, VerificationCodeRetriever};
use std::env;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> email_code::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("email_code=info")),
        )
        .with_target(true)
        .init();

    let account = env::var("CODE_ACCOUNT").expect("CODE_ACCOUNT environment variable required");

    let mut builder = RetrievalConfig::builder().account(&account);

    if let Ok(host) = env::var("MAIL_HOST") {
        let user = env::var("MAIL_USER").expect("MAIL_USER environment variable required");
        let password =
            env::var("MAIL_PASSWORD").expect("MAIL_PASSWORD environment variable required");

        let mut server = MailServerConfig::new(host, user, password);
        if let Some(port) = env::var("MAIL_PORT").ok().and_then(|p| p.parse().ok()) {
            server = server.with_port(port);
        }
        if let Ok(folder) = env::var("MAIL_FOLDER") {
            server = server.with_folder(folder);
        }

        builder = builder.mail_server(server);
        if let Ok(protocol) = env::var("MAIL_PROTOCOL") {
            builder = builder.protocol(protocol);
        }
    }

    if let (Ok(username), Ok(extension), Ok(epin)) = (
        env::var("TEMP_MAIL_USERNAME"),
        env::var("TEMP_MAIL_EXT"),
        env::var("TEMP_MAIL_EPIN"),
    ) {
        builder = builder.temp_mail(TempMailConfig::new(username, extension, epin));
    }

    let config = builder.build()?;
    let retriever = VerificationCodeRetriever::new(&config)?;

    println!("Waiting for a verification code sent to {account}...");

    match retriever.retrieve().await {
        Ok(code) => println!("Got code: {code}"),
        Err(e) => {
            eprintln!("Retrieval failed: {e}");
            eprintln!("  Category: {}", e.category());
            return Err(e);
        }
    }

    Ok(())
}
