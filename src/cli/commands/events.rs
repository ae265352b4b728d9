//! Event commands - sync, push, notification click and messages

use super::fetch::resolve_target;
use crate::cli::args::{ClickArgs, MessageArgs, PushArgs, SyncArgs};
use crate::config::Config;
use crate::error::{OffcacheError, OffcacheResult};
use crate::reactor::factory::create_runtime;
use crate::ui::{self, UiContext};
use crate::worker::{Notification, ACTION_EXPLORE};

/// Execute the sync command
pub async fn sync(args: SyncArgs, config: &Config) -> OffcacheResult<()> {
    let ctx = UiContext::detect();
    let tag = args.tag.unwrap_or_else(|| config.worker.sync_tag.clone());

    let runtime = create_runtime(config).await?;
    let restored = runtime.handle.sync(tag.clone()).await;
    runtime.shutdown().await?;

    let restored = restored?;
    if tag != config.worker.sync_tag {
        ui::step_warn_hint(
            &ctx,
            &format!("Sync tag '{}' ignored", tag),
            &format!("The worker handles '{}'", config.worker.sync_tag),
        );
    } else if restored == 0 {
        ui::step_ok(&ctx, "Nothing to restore");
    } else {
        ui::step_ok(&ctx, &format!("Restored {} manifest entries", restored));
    }
    Ok(())
}

/// Execute the push command
pub async fn push(args: PushArgs, config: &Config) -> OffcacheResult<()> {
    let ctx = UiContext::detect();
    let runtime = create_runtime(config).await?;
    let notification = runtime.handle.push(args.payload).await;
    runtime.shutdown().await?;

    print_notification(&ctx, &notification?);
    Ok(())
}

/// Execute the click command
///
/// Clicks a freshly shown notification, as if the push had just arrived.
pub async fn click(args: ClickArgs, config: &Config) -> OffcacheResult<()> {
    let ctx = UiContext::detect();
    let notification = Notification::from_push(None, &config.notification);
    if let Some(action) = args.action.as_deref() {
        if !notification.has_action(action) {
            ui::step_warn(&ctx, &format!("Notification has no '{}' action", action));
        }
    }

    let pages = args
        .open
        .iter()
        .map(|page| resolve_target(&config.worker.scope, page))
        .collect::<OffcacheResult<Vec<_>>>()?;

    let runtime = create_runtime(config).await?;
    for page in pages {
        runtime.host.add_client(page);
    }
    let open_before = runtime.host.snapshot().len();
    let explore = args.action.as_deref() == Some(ACTION_EXPLORE);
    let result = runtime
        .handle
        .notification_click(notification, args.action)
        .await;
    let clients = runtime.host.snapshot();
    runtime.shutdown().await?;
    result?;

    ui::step_ok(&ctx, "Notification closed");
    if explore {
        if let Some(client) = clients.iter().find(|c| c.focused) {
            let label = if clients.len() > open_before {
                "Window opened"
            } else {
                "Window focused"
            };
            ui::step_ok_detail(&ctx, label, client.url.as_str());
        }
    }
    Ok(())
}

/// Execute the message command
pub async fn message(args: MessageArgs, config: &Config) -> OffcacheResult<()> {
    let ctx = UiContext::detect();
    let data: serde_json::Value = serde_json::from_str(&args.data)
        .map_err(|e| OffcacheError::User(format!("Message is not valid JSON: {}", e)))?;

    let runtime = create_runtime(config).await?;
    let handled = runtime.handle.message(data).await;
    let state = runtime.handle.state().await;
    runtime.shutdown().await?;

    if handled? {
        ui::step_ok(&ctx, "Message handled");
    } else {
        ui::step_info(&ctx, "Message ignored");
    }
    ui::key_value(&ctx, "State", &state?.to_string());
    Ok(())
}

fn print_notification(ctx: &UiContext, notification: &Notification) {
    ui::section(ctx, &notification.title);
    ui::remark(ctx, &notification.body);
    let actions: Vec<&str> = notification
        .actions
        .iter()
        .map(|a| a.title.as_str())
        .collect();
    ui::key_value(ctx, "Actions", &actions.join(", "));
}
