//! Tracing setup. Stdout carries native messaging frames, so logs never go there.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Filter from `RUST_LOG`, else `BROWSER_REMOTE_LOG` as a level for our crates.
fn env_filter() -> EnvFilter {
    if std::env::var("RUST_LOG").is_ok() {
        return EnvFilter::from_default_env();
    }

    let level = match std::env::var("BROWSER_REMOTE_LOG").as_deref() {
        Ok("trace") => "trace",
        Ok("debug") => "debug",
        Ok("warn") | Ok("warning") => "warn",
        Ok("error") => "error",
        _ => "info",
    };
    EnvFilter::new(format!(
        "browser_remote={level},browser_remote_host={level}"
    ))
}

pub fn init_tracing(log_file: &Path, to_stderr: bool) -> anyhow::Result<()> {
    let (writer, ansi) = if to_stderr {
        (BoxMakeWriter::new(std::io::stderr), true)
    } else {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)?;
        (BoxMakeWriter::new(Mutex::new(file)), false)
    };

    let use_json = std::env::var("LOG_FORMAT").as_deref() == Ok("json");

    if use_json {
        let subscriber = tracing_subscriber::registry()
            .with(env_filter())
            .with(fmt::layer().json().with_writer(writer));
        let _ = subscriber.try_init();
    } else {
        let subscriber = tracing_subscriber::registry()
            .with(env_filter())
            .with(fmt::layer().with_ansi(ansi).with_writer(writer));
        let _ = subscriber.try_init();
    }
    Ok(())
}
