use std::sync::Arc;

use devtrack_core::guard::{AutoConfirm, Confirmer, DeleteOutcome, DepartmentGuard};
use devtrack_core::models::Department;
use devtrack_core::records;
use devtrack_core::views::department_list;

use crate::commands::common::{resolve_department, short_id, Context, StdinConfirmer};
use crate::error::CliError;

pub async fn run_list(as_json: bool, ctx: &Context) -> Result<(), CliError> {
    let departments = department_list(&records::fetch_all::<Department>(&ctx.store).await?);

    if as_json {
        println!("{}", serde_json::to_string_pretty(&departments)?);
    } else {
        for department in &departments {
            println!("{:<13}  {}", short_id(&department.id), department.name);
        }
    }
    Ok(())
}

pub async fn run_add(name: &str, ctx: &Context) -> Result<(), CliError> {
    let department = records::add_department(&ctx.store, name).await?;
    println!("{}", department.id);
    Ok(())
}

pub async fn run_delete(query: &str, yes: bool, ctx: &Context) -> Result<(), CliError> {
    let department = resolve_department(&ctx.store, query).await?;
    let guard = DepartmentGuard::new(Arc::clone(&ctx.store));

    let auto = AutoConfirm(true);
    let confirmer: &dyn Confirmer = if yes { &auto } else { &StdinConfirmer };
    let outcome = guard.request_delete(&department, confirmer).await?;

    match outcome {
        DeleteOutcome::Blocked(_) => Err(CliError::Blocked(outcome.user_message())),
        _ => {
            println!("{}", outcome.user_message());
            Ok(())
        }
    }
}
