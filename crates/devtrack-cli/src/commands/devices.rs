use std::time::Duration;

use devtrack_core::artifact::{payload_url, QrPayload};
use devtrack_core::models::{Device, DeviceEdits, RecordSet};
use devtrack_core::records;
use devtrack_core::views::{
    department_devices_view, devices_by_type, filter_records, Groups, ViewState,
};
use serde::Serialize;

use crate::commands::common::{
    device_group_items, format_device_groups, parse_specs, resolve_department, resolve_device,
    Context,
};
use crate::error::CliError;

pub struct EditArgs {
    pub name: Option<String>,
    pub department: Option<String>,
    pub user: Option<String>,
    pub note: Option<String>,
    pub specs: Vec<String>,
    pub clear_specs: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeviceDetail<'a> {
    device: &'a Device,
    payload: QrPayload,
    payload_url: String,
}

pub async fn run_list(
    department: Option<&str>,
    search: Option<&str>,
    as_json: bool,
    ctx: &Context,
) -> Result<(), CliError> {
    let devices = records::fetch_all::<Device>(&ctx.store).await?;
    let mut selected = match department {
        Some(name) => devices
            .iter()
            .filter(|device| device.department_name == name)
            .cloned()
            .collect::<Vec<_>>(),
        None => devices.into_records(),
    };
    if let Some(query) = search {
        selected = filter_records(&selected, query);
    }

    let groups = devices_by_type(&RecordSet::from(selected));
    if as_json {
        println!("{}", serde_json::to_string_pretty(&device_group_items(&groups))?);
    } else {
        print_groups(&groups);
    }
    Ok(())
}

pub async fn run_add(
    name: &str,
    kind: &str,
    department: &str,
    ctx: &Context,
) -> Result<(), CliError> {
    let device = records::add_device(&ctx.store, name, kind, department).await?;
    println!("{}", device.id);
    Ok(())
}

pub async fn run_show(id: &str, as_json: bool, ctx: &Context) -> Result<(), CliError> {
    let device = resolve_device(&ctx.store, id).await?;
    let payload = QrPayload::from(&device);
    let url = payload_url(&ctx.config.qr_base_url, &payload)?;

    if as_json {
        let detail = DeviceDetail {
            device: &device,
            payload,
            payload_url: url,
        };
        println!("{}", serde_json::to_string_pretty(&detail)?);
        return Ok(());
    }

    println!("ID:          {}", device.id);
    println!("Name:        {}", device.name);
    println!("Type:        {}", device.kind);
    println!("Department:  {}", device.department_name);
    println!("User:        {}", device.user);
    for (key, value) in &device.specifications {
        println!("  {key}: {value}");
    }
    if !device.note.is_empty() {
        println!("Note:        {}", device.note);
    }
    let image = if device.has_artifact() {
        device.image_url.as_str()
    } else {
        "(none)"
    };
    println!("QR image:    {image}");
    println!("QR payload:  {url}");
    Ok(())
}

pub async fn run_edit(id: &str, args: EditArgs, ctx: &Context) -> Result<(), CliError> {
    let device = resolve_device(&ctx.store, id).await?;

    let specifications = if args.clear_specs {
        Some(Default::default())
    } else if args.specs.is_empty() {
        None
    } else {
        Some(parse_specs(&args.specs)?)
    };
    let department_name = match args.department {
        Some(query) => Some(resolve_department(&ctx.store, &query).await?.name),
        None => None,
    };

    let edits = DeviceEdits {
        name: args.name,
        department_name,
        user: args.user,
        specifications,
        note: args.note,
    };
    if edits.is_empty() {
        return Err(CliError::NothingToEdit);
    }

    let report = ctx.artifact_sync().save(&device, &edits).await?;
    println!("{}", report.device.id);
    println!("{}", report.artifact.url);
    Ok(())
}

pub async fn run_watch(department: &str, interval_ms: u64, ctx: &Context) -> Result<(), CliError> {
    let department = resolve_department(&ctx.store, department).await?;
    let mut view = department_devices_view(&ctx.store, &department.name);
    let mut poll = tokio::time::interval(Duration::from_millis(interval_ms.max(100)));

    let Some(initial) = view.ready().await else {
        return Ok(());
    };
    render_state(&department.name, initial)?;

    loop {
        tokio::select! {
            state = view.changed() => match state {
                Some(state) => render_state(&department.name, state)?,
                None => break,
            },
            _ = poll.tick() => {
                ctx.sqlite.refresh().await?;
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    view.cancel();
    Ok(())
}

fn render_state(department: &str, state: ViewState<Groups<Device>>) -> Result<(), CliError> {
    match state {
        ViewState::Pending => Ok(()),
        ViewState::Ready(groups) => {
            println!("== {department} ==");
            print_groups(&groups);
            println!();
            Ok(())
        }
        ViewState::Failed(error) => Err(error.into()),
    }
}

fn print_groups(groups: &Groups<Device>) {
    if groups.is_empty() {
        println!("No devices");
    }
    for line in format_device_groups(groups) {
        println!("{line}");
    }
}
