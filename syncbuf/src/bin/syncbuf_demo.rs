//! SyncBuffer CLI Demo
//!
//! Reads lines from stdin into a buffer and streams them to three readers.
//! An empty line (or EOF) closes the buffer.
//!
//! Usage: `syncbuf_demo [config.json]`

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use syncbuf::{Config, Options, Pacing, Reader, Stepper, StoragePolicy, SyncBuffer};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let (storage, pacing, stepper, options) = match std::env::args().nth(1) {
        Some(path) => Config::from_reader(std::fs::File::open(path)?)?.into_parts(),
        None => (
            StoragePolicy::Log,
            Pacing::autonomous(Duration::from_millis(100)),
            None,
            Options::default(),
        ),
    };
    let buffer = Arc::new(SyncBuffer::with_options(storage, pacing, options));

    let readers = [buffer.new_reader(), buffer.new_reader(), buffer.new_reader()];
    let reader_tasks: Vec<_> = readers
        .into_iter()
        .map(|reader| tokio::spawn(read_all(reader)))
        .collect();

    // Spawn writer task
    let writer_task = tokio::spawn(write_lines(Arc::clone(&buffer), stepper));
    if let Err(e) = writer_task.await? {
        eprintln!("Write error: {e}");
    }

    buffer.close().await;
    println!("Buffer closed");

    for task in reader_tasks {
        task.await?;
    }
    println!("All tasks completed");
    Ok(())
}

async fn write_lines(buffer: Arc<SyncBuffer>, stepper: Option<Stepper>) -> syncbuf::Result<()> {
    println!("Enter text (empty line to quit):");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            break;
        }

        buffer.add(trimmed.to_owned()).await?;
        // A manual clock has nobody else to step it
        if let Some(stepper) = &stepper {
            stepper.step().await?;
        }
    }
    Ok(())
}

async fn read_all(mut reader: Reader) {
    let name = reader.id();
    let mut stream = reader.stream();

    while let Some(chunk) = stream.next().await {
        println!("({name}): {}", String::from_utf8_lossy(&chunk));
    }
    println!("({name}) EOF");
    reader.close().await;
}
