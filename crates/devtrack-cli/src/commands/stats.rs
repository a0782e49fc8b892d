use devtrack_core::models::{Device, ErrorRecord, User};
use devtrack_core::records;
use devtrack_core::stats::{HistogramEntry, Statistics};
use serde::Serialize;

use crate::commands::common::Context;
use crate::error::CliError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatisticsOutput<'a> {
    filter: &'a str,
    users_by_department: Vec<EntryItem<'a>>,
    devices_by_department: Vec<EntryItem<'a>>,
    devices_by_user: Vec<EntryItem<'a>>,
    errors_by_device: Vec<EntryItem<'a>>,
}

#[derive(Debug, Serialize)]
struct EntryItem<'a> {
    key: &'a str,
    count: usize,
}

pub async fn run_stats(filter: &str, as_json: bool, ctx: &Context) -> Result<(), CliError> {
    let users = records::fetch_all::<User>(&ctx.store).await?;
    let devices = records::fetch_all::<Device>(&ctx.store).await?;
    let errors = records::fetch_all::<ErrorRecord>(&ctx.store).await?;
    let stats = Statistics::compute(&users, &devices, &errors, filter);

    if as_json {
        let output = StatisticsOutput {
            filter: &stats.filter,
            users_by_department: entry_items(&stats.users_by_department),
            devices_by_department: entry_items(&stats.devices_by_department),
            devices_by_user: entry_items(&stats.devices_by_user),
            errors_by_device: entry_items(&stats.errors_by_device),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    for line in format_statistics(&stats) {
        println!("{line}");
    }
    Ok(())
}

fn entry_items(entries: &[HistogramEntry]) -> Vec<EntryItem<'_>> {
    entries
        .iter()
        .map(|entry| EntryItem {
            key: &entry.key,
            count: entry.count,
        })
        .collect()
}

pub fn format_statistics(stats: &Statistics) -> Vec<String> {
    let charts = [
        ("Users by department", &stats.users_by_department),
        ("Devices by department", &stats.devices_by_department),
        ("Devices by user", &stats.devices_by_user),
        ("Errors by device", &stats.errors_by_device),
    ];

    let mut lines = Vec::new();
    for (title, entries) in charts {
        lines.push(title.to_string());
        if entries.is_empty() {
            lines.push("  (no data)".to_string());
        }
        let peak = entries.first().map_or(0, |entry| entry.count);
        for entry in entries {
            let key = if entry.key.is_empty() { "(none)" } else { &entry.key };
            lines.push(format!("  {key:<24} {:>4}  {}", entry.count, bar(entry.count, peak)));
        }
    }
    lines
}

fn bar(count: usize, peak: usize) -> String {
    const WIDTH: usize = 30;
    if peak == 0 {
        return String::new();
    }
    "#".repeat((count * WIDTH).div_ceil(peak))
}
