#![allow(clippy::expect_used, clippy::doc_markdown, clippy::uninlined_format_args)]
//! Example: list the newest messages of INBOX over a plaintext connection
//!
//! Intended for a local test server (Dovecot, GreenMail); credentials travel
//! in the clear.
//!
//! ## Running
//!
//! ```bash
//! IMAP_HOST=localhost:143 IMAP_USER=alice IMAP_PASS=secret \
//!     cargo run --package postwire-imap --example fetch_inbox
//! ```

use postwire_imap::summary::MessageSummaryItems;
use postwire_imap::{
    Command, Engine, EngineConfig, FetchRequest, LoggingHandler, MessageId, MessageSet,
    SequenceSet,
};
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let host = std::env::var("IMAP_HOST").unwrap_or_else(|_| "localhost:143".to_string());
    let user = std::env::var("IMAP_USER")?;
    let pass = std::env::var("IMAP_PASS")?;

    let mut stream = TcpStream::connect(&host).await?;

    // The engine starts after the greeting; it only needs the text to
    // recognise the server.
    let mut greeting = Vec::new();
    while greeting.last() != Some(&b'\n') {
        greeting.push(stream.read_u8().await?);
    }
    let greeting = String::from_utf8_lossy(&greeting);
    let mut engine = Engine::new(stream, EngineConfig::default())
        .with_greeting(greeting.trim_end())
        .with_unsolicited_handler(LoggingHandler);
    println!(
        "Greeting: {} ({:?})",
        greeting.trim_end(),
        engine.quirks().server_type
    );

    let login = Command::builder("LOGIN").astring(&user).astring(&pass).build();
    engine.execute(login).await?.check()?;
    println!("✓ Authenticated as {}", user);

    let select = Command::builder("SELECT").mailbox("INBOX").exclusive().build();
    engine.execute(select).await?.check()?;

    let set = MessageSet::Seq(SequenceSet::All);
    let request = FetchRequest::new(MessageSummaryItems::UNIQUE_ID | MessageSummaryItems::ENVELOPE);
    let summaries = engine.fetch_summaries(&set, &request).await?;
    println!("{} messages:", summaries.len());
    for summary in summaries.iter().rev().take(10) {
        let subject = summary
            .envelope
            .as_ref()
            .and_then(|e| e.subject.as_deref())
            .unwrap_or("(no subject)");
        println!("  #{} {}", summary.seq.get(), subject);
    }

    if let Some(uid) = summaries.last().and_then(|s| s.uid) {
        let factory = engine.sink_factory();
        let mut section = engine
            .fetch_section(MessageId::Uid(uid), "TEXT", Some((0, 200)), factory)
            .await?;
        let preview = section.read_to_vec()?;
        println!("\nNewest message starts:\n{}", String::from_utf8_lossy(&preview));
    }

    engine.execute(Command::builder("LOGOUT").build()).await?;
    Ok(())
}
