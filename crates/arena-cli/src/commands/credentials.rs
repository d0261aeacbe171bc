//! `arena credentials` and `arena policies`.

use std::path::Path;

use anyhow::{bail, Context, Result};
use arena_control::PolicyClient;
use arena_credentials::CredentialManager;
use serde_json::Value;

use super::{load_config, print_json};

pub async fn show(config: &Path) -> Result<()> {
    let config = load_config(config)?;
    let manager = CredentialManager::auto(&config.credentials)?;
    let credential = manager.credential().await?;

    println!("Method:     {}", manager.method());
    println!("Access key: {}...", credential.key_prefix());
    println!("Issued:     {}", credential.issued_at());
    println!("Expires:    {}", credential.expires_at());
    println!("Refresh at: {}", credential.refresh_due_at());
    Ok(())
}

pub async fn list_policies(config: &Path) -> Result<()> {
    let config = load_config(config)?;
    let policies = PolicyClient::from_config(&config.credentials)?.list().await;

    if policies.is_empty() {
        eprintln!("No policies found");
        return Ok(());
    }
    print_json(&policies)
}

pub async fn apply_policy(config: &Path, file: &Path) -> Result<()> {
    let config = load_config(config)?;
    let text = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;
    let policy: Value = serde_json::from_str(&text)
        .with_context(|| format!("{} is not valid JSON", file.display()))?;
    if policy.get("policy").is_none() {
        bail!("policy document must have a top-level \"policy\" object");
    }

    PolicyClient::from_config(&config.credentials)?
        .apply(&policy)
        .await?;
    println!("Policy '{}' applied", arena_control::storage::policy_name(&policy));
    Ok(())
}

pub async fn delete_policy(config: &Path, name: &str) -> Result<()> {
    let config = load_config(config)?;
    PolicyClient::from_config(&config.credentials)?
        .delete(name)
        .await?;
    println!("Policy '{name}' deleted");
    Ok(())
}
