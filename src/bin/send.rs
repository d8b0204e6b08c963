//! Command-line sender.
//!
//! `nolasms-send [--config PATH] [--name LABEL] MESSAGE RECIPIENT...`
//!
//! A recipient is a phone number or `@ID` for a configured contact that has
//! not been deleted. One recipient sends a single message; several send a
//! bulk run, which is recorded in the history database under `--name` if
//! given (`--name` is only accepted for bulk runs).
//!
//! Other modes:
//! - `--history` lists recorded bulk runs.
//! - `--contacts [QUERY]` lists visible contacts, optionally searched.
//! - `--delete-contact ID` / `--restore-contact ID` hide or restore one.

use anyhow::{Context, Result};
use chrono::Utc;
use std::path::PathBuf;
use tracing::info;

use nolasms::config::Config;
use nolasms::contacts::{self, Contact, ContactStore};
use nolasms::dispatch::{BulkDispatchResult, DispatchClient};
use nolasms::history::{relative_time, BulkHistoryItem, HistoryStore, SqliteHistoryStore};
use nolasms::outbox::Outbox;

#[derive(Debug, PartialEq)]
enum Command {
    History,
    Contacts {
        query: String,
    },
    DeleteContact(String),
    RestoreContact(String),
    Send {
        message: String,
        recipients: Vec<String>,
        name: Option<String>,
    },
}

#[derive(Debug, PartialEq)]
struct Args {
    config_path: PathBuf,
    command: Command,
}

fn parse_args(args: &[String]) -> Result<Args> {
    let mut config_path = PathBuf::from("config.toml");
    let mut name = None;
    let mut mode = None;
    let mut positional = Vec::new();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                config_path = PathBuf::from(iter.next().context("--config needs a path")?);
            }
            "--name" => {
                name = Some(iter.next().context("--name needs a label")?.clone());
            }
            "--history" => mode = Some(Command::History),
            "--contacts" => {
                mode = Some(Command::Contacts {
                    query: String::new(),
                })
            }
            "--delete-contact" => {
                let id = iter.next().context("--delete-contact needs an ID")?;
                mode = Some(Command::DeleteContact(id.clone()));
            }
            "--restore-contact" => {
                let id = iter.next().context("--restore-contact needs an ID")?;
                mode = Some(Command::RestoreContact(id.clone()));
            }
            _ => positional.push(arg.clone()),
        }
    }

    match mode {
        Some(Command::Contacts { .. }) => {
            return Ok(Args {
                config_path,
                command: Command::Contacts {
                    query: positional.join(" "),
                },
            });
        }
        Some(command) => {
            return Ok(Args {
                config_path,
                command,
            });
        }
        None => {}
    }

    let mut positional = positional.into_iter();
    let message = positional.next().context("Missing MESSAGE")?;
    let recipients: Vec<String> = positional.collect();
    if recipients.is_empty() {
        anyhow::bail!("Missing RECIPIENT");
    }
    if name.is_some() && recipients.len() == 1 {
        anyhow::bail!("--name labels a bulk run; it needs more than one recipient");
    }

    Ok(Args {
        config_path,
        command: Command::Send {
            message,
            recipients,
            name,
        },
    })
}

/// Resolve `@ID` recipients against the visible contacts. Returns the phone
/// to dial and a display name for each recipient.
fn resolve_recipients(recipients: &[String], contacts: &[Contact]) -> Result<Vec<(String, String)>> {
    recipients
        .iter()
        .map(|r| match r.strip_prefix('@') {
            Some(id) => contacts
                .iter()
                .find(|c| c.id == id)
                .map(|c| (c.phone.clone(), c.name.clone()))
                .with_context(|| format!("Unknown contact: {}", id)),
            None => Ok((r.clone(), r.clone())),
        })
        .collect()
}

async fn show_history(store: &dyn HistoryStore) -> Result<()> {
    let items = store.load().await?;
    if items.is_empty() {
        println!("No bulk messages sent yet.");
        return Ok(());
    }

    let now = Utc::now();
    for item in items {
        let label = item.custom_name.as_deref().unwrap_or(&item.message);
        println!(
            "{:>10}  {:<7}  {} recipient(s)  {}",
            relative_time(item.timestamp, now),
            item.status.as_str(),
            item.recipient_count,
            label
        );
    }
    Ok(())
}

fn show_contacts(contacts: &[Contact]) {
    if contacts.is_empty() {
        println!("No contacts found.");
        return;
    }

    for contact in contacts {
        let canonical = contact
            .canonical_phone()
            .map(|n| n.to_string())
            .unwrap_or_else(|| "invalid number".to_string());
        println!(
            "@{:<4} {:<24} {:<16} {}",
            contact.id, contact.name, contact.phone, canonical
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    nolasms::init_logging();

    let raw: Vec<String> = std::env::args().skip(1).collect();
    let args = parse_args(&raw)?;
    let config = Config::load(&args.config_path)
        .with_context(|| format!("Failed to load config from {}", args.config_path.display()))?;
    let store = SqliteHistoryStore::open(&config.history.database_path)?;

    let (message, recipients, name) = match args.command {
        Command::History => return show_history(&store).await,
        Command::Contacts { query } => {
            let deleted = store.deleted_ids().await?;
            let visible = contacts::visible_contacts(&config.contacts, &deleted);
            show_contacts(&contacts::filter_contacts(&visible, &query));
            return Ok(());
        }
        Command::DeleteContact(id) => {
            store.delete_contact(&id).await?;
            println!("Deleted contact @{}", id);
            return Ok(());
        }
        Command::RestoreContact(id) => {
            store.restore_contact(&id).await?;
            println!("Restored contact @{}", id);
            return Ok(());
        }
        Command::Send {
            message,
            recipients,
            name,
        } => (message, recipients, name),
    };

    let deleted = store.deleted_ids().await?;
    let visible = contacts::visible_contacts(&config.contacts, &deleted);
    let resolved = resolve_recipients(&recipients, &visible)?;
    let client = DispatchClient::new(config.dispatch.clone());
    info!("Sending as {}", client.sender_name());

    let mut outbox = Outbox::new();
    let ids: Vec<String> = resolved
        .iter()
        .map(|(phone, _)| outbox.compose(phone, &message))
        .collect();
    for id in &ids {
        outbox.mark_sending(id)?;
    }

    let phones: Vec<&str> = resolved.iter().map(|(phone, _)| phone.as_str()).collect();
    let results = if phones.len() == 1 {
        vec![client.send_single(phones[0], &message).await]
    } else {
        client.send_bulk(&phones, &message).await
    };

    for (id, result) in ids.iter().zip(&results) {
        outbox.complete(id, result)?;
    }
    for (sent, (_, display)) in outbox.list().iter().zip(&resolved) {
        println!(
            "{:<24} {:?}: {}",
            display,
            sent.status,
            sent.detail.as_deref().unwrap_or_default()
        );
    }

    if results.len() == 1 {
        if !results[0].success {
            anyhow::bail!("Message not sent");
        }
        return Ok(());
    }

    let summary = BulkDispatchResult::from_results(&results);
    println!("{}", summary.message);

    let names = resolved.into_iter().map(|(_, display)| display).collect();
    let mut item = BulkHistoryItem::new(&message, names, &summary);
    item.custom_name = name;
    store.save(&item).await?;

    if !summary.success {
        anyhow::bail!("No messages were sent");
    }
    Ok(())
}
