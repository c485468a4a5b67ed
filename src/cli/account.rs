//! `cape account` - register and list cloud accounts.

use std::collections::BTreeMap;

use crate::cli::CliContext;
use crate::cli::args::{AccountAddArgs, AccountCommand};
use crate::core::models::{AccountStatus, CloudAccount, ProviderCredentials};
use crate::core::ports::AccountStore;
use crate::core::provider::CloudProvider;
use crate::error::Result;

/// Execute an account subcommand.
///
/// # Errors
/// Returns argument errors and store failures.
pub fn execute(ctx: &CliContext, command: &AccountCommand) -> Result<()> {
    match command {
        AccountCommand::Add(args) => add(ctx, args),
        AccountCommand::List { tenant } => list(ctx, tenant),
    }
}

fn add(ctx: &CliContext, args: &AccountAddArgs) -> Result<()> {
    // Registration validates the provider name up front; the collector
    // re-validates on every run since accounts are externally mutable.
    CloudProvider::parse(&args.provider)?;

    let raw = std::fs::read_to_string(&args.credentials_file)?;
    let fields: BTreeMap<String, String> = serde_json::from_str(&raw)?;
    let credentials = ProviderCredentials::new(fields);

    let account = CloudAccount {
        id: args.id.clone(),
        tenant_id: args.tenant.clone(),
        provider: args.provider.to_lowercase(),
        status: AccountStatus::Active,
        last_synced_at: None,
        credentials: ctx.vault().seal(&credentials)?,
    };
    ctx.store.register_account(&account)?;

    ctx.print(
        "account.add",
        &serde_json::json!({ "id": account.id, "tenantId": account.tenant_id }),
        &format!("Registered account {} for tenant {}", account.id, account.tenant_id),
        Vec::new(),
    )
}

fn list(ctx: &CliContext, tenant: &str) -> Result<()> {
    let accounts = ctx.store.active_accounts(tenant)?;

    // Credential blobs stay out of command output.
    let summaries: Vec<serde_json::Value> = accounts
        .iter()
        .map(|a| {
            serde_json::json!({
                "id": a.id,
                "tenantId": a.tenant_id,
                "provider": a.provider,
                "status": a.status.as_str(),
                "lastSyncedAt": a.last_synced_at.map(|t| t.to_rfc3339()),
            })
        })
        .collect();

    let mut human = format!("{} active account(s) for {tenant}", accounts.len());
    for account in &accounts {
        let synced = account
            .last_synced_at
            .map_or_else(|| "never".to_string(), |t| t.to_rfc3339());
        human.push_str(&format!(
            "\n  {} ({}) last synced: {synced}",
            account.id, account.provider,
        ));
    }
    ctx.print("account.list", &summaries, &human, Vec::new())
}
