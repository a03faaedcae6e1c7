//! Config command handlers

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use notesync_core::{CollectionType, Config};

use crate::output::{Output, OutputFormat};

const VALID_KEYS: &str = "data_dir, profile, server_url, project_id, api_key, branch, \
                          interval_min_ms, interval_max_ms, collections, redact_fields, log_file";

/// Show current configuration
pub fn show(config_path: Option<&PathBuf>, output: &Output) -> Result<()> {
    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;
    let api_key = config.api_key.as_deref().map(mask_secret);

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "data_dir": config.data_dir,
                    "profile": config.profile,
                    "server_url": config.server_url,
                    "project_id": config.project_id,
                    "api_key": api_key,
                    "branch": config.branch,
                    "interval_min_ms": config.interval_min_ms,
                    "interval_max_ms": config.interval_max_ms,
                    "collections": config.collections,
                    "redact_fields": config.redact_fields,
                    "log_file": config.log_file
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", config.data_dir.display());
        }
        OutputFormat::Human => {
            let effective_path = config_path
                .cloned()
                .unwrap_or_else(Config::config_file_path);
            println!("Configuration:");
            println!("  data_dir:        {}", config.data_dir.display());
            println!("  profile:         {}", config.profile);
            println!("  server_url:      {}", or_unset(config.server_url.as_deref()));
            println!("  project_id:      {}", or_unset(config.project_id.as_deref()));
            println!("  api_key:         {}", or_unset(api_key.as_deref()));
            println!("  branch:          {}", config.branch);
            println!("  interval_min_ms: {}", config.interval_min_ms);
            println!("  interval_max_ms: {}", config.interval_max_ms);
            println!("  collections:     {}", join_collections(&config.collections));
            println!("  redact_fields:   {}", config.redact_fields.join(", "));
            println!(
                "  log_file:        {}",
                config
                    .log_file
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(not set)".to_string())
            );
            println!();
            println!("Config file: {}", effective_path.display());
            if let Err(e) = config.gitlab() {
                println!();
                println!("{}", e);
            }
        }
    }

    Ok(())
}

/// Set a configuration value
pub fn set(
    key: String,
    value: String,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    let mut config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    apply(&mut config, &key, &value)?;
    config.validate()?;

    // Save to the CLI-specified path or default
    let save_path = config_path
        .cloned()
        .unwrap_or_else(Config::config_file_path);
    config
        .save_to_path(&save_path)
        .context("Failed to save configuration")?;

    let shown = if key == "api_key" {
        mask_secret(&value)
    } else {
        value
    };
    output.success(&format!("Set {} = {}", key, shown));

    Ok(())
}

fn apply(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        "data_dir" => config.data_dir = value.into(),
        "profile" => config.profile = value.to_string(),
        "server_url" => config.server_url = optional(value),
        "project_id" => config.project_id = optional(value),
        "api_key" => config.api_key = optional(value),
        "branch" => {
            if value.is_empty() {
                bail!("branch must not be empty");
            }
            config.branch = value.to_string();
        }
        "interval_min_ms" => {
            config.interval_min_ms = value
                .parse()
                .context("Invalid value for interval_min_ms. Use milliseconds.")?;
        }
        "interval_max_ms" => {
            config.interval_max_ms = value
                .parse()
                .context("Invalid value for interval_max_ms. Use milliseconds.")?;
        }
        "collections" => {
            config.collections = split_list(value)
                .iter()
                .map(|s| s.parse::<CollectionType>().map_err(anyhow::Error::msg))
                .collect::<Result<_>>()?;
        }
        "redact_fields" => config.redact_fields = split_list(value),
        "log_file" => config.log_file = optional(value).map(PathBuf::from),
        _ => {
            bail!(
                "Unknown configuration key: '{}'\nValid keys: {}",
                key,
                VALID_KEYS
            );
        }
    }
    Ok(())
}

/// Empty or `none` clears an optional value
fn optional(value: &str) -> Option<String> {
    if value.is_empty() || value == "none" {
        None
    } else {
        Some(value.to_string())
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn join_collections(collections: &[CollectionType]) -> String {
    collections
        .iter()
        .map(|c| c.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn or_unset(value: Option<&str>) -> &str {
    value.unwrap_or("(not set)")
}

/// Show only the last four characters of a secret
fn mask_secret(secret: &str) -> String {
    let visible: String = secret
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    if secret.chars().count() <= 4 {
        "****".to_string()
    } else {
        format!("****{}", visible)
    }
}
