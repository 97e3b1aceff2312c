//! Dump and verify an activity file.
//!
//! ```text
//! fit-inspect [--sdk-crc] [--records] <file.fit>
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `tirelab=info,warn`).

use anyhow::{Context, bail};
use tirelab::fit::{ActivityFileReader, ChecksumKind, DecodedValue, global};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn message_name(global_id: u16) -> &'static str {
    match global_id {
        global::FILE_ID => "file_id",
        global::SESSION => "session",
        global::LAP => "lap",
        global::RECORD => "record",
        global::EVENT => "event",
        global::DEVICE_INFO => "device_info",
        global::ACTIVITY => "activity",
        _ => "unknown",
    }
}

fn format_value(value: &DecodedValue) -> String {
    match value {
        DecodedValue::UInt(v) => v.to_string(),
        DecodedValue::SInt(v) => v.to_string(),
        DecodedValue::Float(v) => format!("{:.3}", v),
        DecodedValue::Text(text) => format!("{:?}", text),
        DecodedValue::Bytes(bytes) => format!("{:02x?}", bytes),
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tirelab=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut checksum = ChecksumKind::Ccitt;
    let mut show_records = false;
    let mut path = None;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--sdk-crc" => checksum = ChecksumKind::FitSdk,
            "--records" => show_records = true,
            flag if flag.starts_with("--") => bail!("unknown flag {flag}"),
            _ if path.is_some() => bail!("only one file can be inspected at a time"),
            _ => path = Some(arg),
        }
    }
    let path = path.context("usage: fit-inspect [--sdk-crc] [--records] <file.fit>")?;

    let reader = ActivityFileReader::open(&path, checksum)
        .with_context(|| format!("failed to read activity file {path}"))?;

    let header = reader.header();
    info!(
        protocol = header.protocol_version,
        profile = header.profile_version,
        data_size = header.data_size,
        "Header verified"
    );
    println!(
        "{path}: {} definitions, {} messages, crc {:#06x}",
        reader.definition_count(),
        reader.messages().len(),
        reader.file_crc()
    );

    let mut counts = std::collections::BTreeMap::<u16, usize>::new();
    for message in reader.messages() {
        *counts.entry(message.global_id).or_default() += 1;
    }
    for (global_id, count) in &counts {
        println!("  {:>4} {:<12} x{}", global_id, message_name(*global_id), count);
    }

    for message in reader.messages() {
        if message.global_id == global::RECORD && !show_records {
            continue;
        }
        let fields: Vec<String> = message
            .fields
            .iter()
            .map(|f| format!("{}={}", f.field_id, format_value(&f.value)))
            .collect();
        println!("{} [{}]", message_name(message.global_id), fields.join(" "));
    }

    Ok(())
}
