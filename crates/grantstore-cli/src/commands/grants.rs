use anyhow::Result;
use colored::Colorize;
use grantstore::GrantStorage;

use crate::cli::{LookupArgs, RevokeArgs};
use crate::output::{print_grant, print_success};

pub async fn revoke(storage: &dyn GrantStorage, args: &RevokeArgs) -> Result<()> {
    let deleted = storage
        .delete_by_registered_client_id_and_principal_name(&args.client, &args.principal)
        .await?;

    print_success(&format!(
        "Revoked {deleted} grant(s) for client {} and principal {}",
        args.client, args.principal
    ));
    Ok(())
}

pub async fn lookup(storage: &dyn GrantStorage, args: &LookupArgs) -> Result<()> {
    match storage.find_by_token(&args.value, args.kind).await? {
        Some(grant) => print_grant(&grant, args.reveal),
        None => anyhow::bail!("No grant is bound to that value"),
    }
}

pub async fn count(storage: &dyn GrantStorage) -> Result<()> {
    let count = storage.count().await?;
    println!("{}: {count}", "Grants".cyan());
    Ok(())
}
