use devtrack_core::records;
use devtrack_core::store::Fields;
use devtrack_core::util::unix_millis_now;
use serde_json::Value;

use crate::commands::common::Context;
use crate::error::CliError;

pub async fn run_add(
    device_name: &str,
    message: Option<String>,
    ctx: &Context,
) -> Result<(), CliError> {
    let mut details = Fields::new();
    if let Some(message) = message {
        details.insert("message".to_string(), Value::String(message));
    }
    details.insert("reportedAt".to_string(), Value::from(unix_millis_now()));

    let record = records::add_error(&ctx.store, device_name, details).await?;
    println!("{}", record.id);
    Ok(())
}
