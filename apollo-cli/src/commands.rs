use anyhow::{Context, Result};
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, Color, Table};
use std::collections::BTreeMap;

use apollo_client::{ClientOptions, ConfigClient};

async fn connect(options: ClientOptions) -> Result<ConfigClient> {
    ConfigClient::start(options).await.context("Failed to start Apollo client")
}

pub async fn get_value(
    options: ClientOptions,
    namespace: &str,
    key: &str,
    default: Option<&str>,
) -> Result<()> {
    let client = connect(options).await?;
    let value = client.namespace(namespace).await.get_string(key);
    client.shutdown().await;

    match (value, default) {
        (Some(value), _) => println!("{}", value),
        (None, Some(default)) => println!("{}", default),
        (None, None) => anyhow::bail!("Key '{}' not found in namespace '{}'", key, namespace),
    }
    Ok(())
}

pub async fn list_keys(
    options: ClientOptions,
    namespace: &str,
    prefix: Option<&str>,
    json: bool,
) -> Result<()> {
    let client = connect(options).await?;
    let values = collect_values(&client, namespace, prefix).await;
    client.shutdown().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&values)?);
        return Ok(());
    }

    if values.is_empty() {
        println!("{}", format!("No keys in namespace '{}'.", namespace).yellow());
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Key", "Value"]);
    for (key, value) in &values {
        table.add_row(vec![Cell::new(key).fg(Color::Cyan), Cell::new(value)]);
    }

    println!("{table}");
    println!("\n{} keys in {}", values.len(), namespace);
    Ok(())
}

async fn collect_values(
    client: &ConfigClient,
    namespace: &str,
    prefix: Option<&str>,
) -> BTreeMap<String, String> {
    let view = client.namespace(namespace).await;
    let keys = match prefix {
        Some(prefix) => view.keys_with_prefix(prefix),
        None => view.keys(),
    };
    keys.into_iter()
        .filter_map(|key| view.get_string(&key).map(|value| (key, value)))
        .collect()
}

pub async fn watch(options: ClientOptions, extra_namespaces: &[String]) -> Result<()> {
    let client = connect(options).await?;

    for namespace in extra_namespaces {
        if !client.namespace(namespace).await.is_loaded() {
            println!("{} namespace '{}' is not available yet", "!".yellow(), namespace);
        }
    }

    client.subscribe(|event| {
        let changed = event.changed_keys();
        let removed = event.removed_keys();
        println!(
            "{} {} ({} changed, {} removed)",
            "↻".green(),
            event.namespace.bold(),
            changed.len(),
            removed.len()
        );
        for key in &changed {
            let old = event.old_values.as_ref().and_then(|m| m.get(key));
            let new = event.new_values.get(key).map(String::as_str).unwrap_or_default();
            match old {
                Some(old) => println!("  {} {}: {} -> {}", "~".yellow(), key, old, new),
                None => println!("  {} {}: {}", "+".green(), key, new),
            }
        }
        for key in &removed {
            println!("  {} {}", "-".red(), key);
        }
    });

    let endpoint = client.endpoint();
    println!(
        "{} Watching {} ({}, cluster {}) via {}. Press Ctrl-C to stop.",
        "✓".green(),
        endpoint.app_id.bold(),
        endpoint.env,
        endpoint.cluster,
        endpoint.server
    );

    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
    client.shutdown().await;
    println!("Stopped ({})", client.state());
    Ok(())
}
