use devtrack_core::models::User;
use devtrack_core::records;

use crate::commands::common::{short_id, Context};
use crate::error::CliError;

pub async fn run_list(
    department: Option<&str>,
    as_json: bool,
    ctx: &Context,
) -> Result<(), CliError> {
    let users = records::fetch_all::<User>(&ctx.store).await?;
    let users = users
        .iter()
        .filter(|user| department.map_or(true, |name| user.department == name))
        .collect::<Vec<_>>();

    if as_json {
        println!("{}", serde_json::to_string_pretty(&users)?);
    } else {
        for user in users {
            println!(
                "{:<13}  {:<24}  {}",
                short_id(&user.id),
                user.fullname,
                user.department
            );
        }
    }
    Ok(())
}

pub async fn run_add(fullname: &str, department: &str, ctx: &Context) -> Result<(), CliError> {
    let user = records::add_user(&ctx.store, fullname, department).await?;
    println!("{}", user.id);
    Ok(())
}
