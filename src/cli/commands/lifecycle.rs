//! Lifecycle commands - install, activate and update the worker

use crate::config::Config;
use crate::error::OffcacheResult;
use crate::reactor::factory::{create_runtime, Runtime};
use crate::ui::{self, TaskSpinner, UiContext};
use crate::worker::WorkerState;

/// Execute the install command
pub async fn install(config: &Config) -> OffcacheResult<()> {
    let ctx = UiContext::detect();
    let runtime = create_runtime(config).await?;
    let name = &config.worker.cache_name;

    let mut spinner = TaskSpinner::new(&ctx);
    spinner.start(&installing(name, runtime.assets));
    let result = run_install(&ctx, &runtime, &mut spinner, name).await;

    runtime.shutdown().await?;
    result
}

/// Execute the activate command
pub async fn activate(config: &Config) -> OffcacheResult<()> {
    let ctx = UiContext::detect();
    let runtime = create_runtime(config).await?;
    let name = &config.worker.cache_name;

    let mut spinner = TaskSpinner::new(&ctx);
    spinner.start(&format!("Activating {}...", name));
    let result = run_activate(&runtime, &mut spinner, name).await;

    runtime.shutdown().await?;
    result
}

/// Execute the update command
///
/// Installs only when the stored generation was not built from the
/// current configuration.
pub async fn update(config: &Config) -> OffcacheResult<()> {
    let ctx = UiContext::detect();
    let runtime = create_runtime(config).await?;
    let name = &config.worker.cache_name;

    let mut spinner = TaskSpinner::new(&ctx);
    spinner.start(&format!("Checking {}...", name));

    let result = match runtime.handle.state().await {
        Ok(WorkerState::Activated) => {
            spinner.stop(&format!("Already up to date ({})", name));
            Ok(())
        }
        Ok(WorkerState::Installed) => {
            spinner.message(&format!("Activating {}...", name));
            run_activate(&runtime, &mut spinner, name).await
        }
        Ok(_) => {
            spinner.message(&installing(name, runtime.assets));
            run_install(&ctx, &runtime, &mut spinner, name).await
        }
        Err(e) => {
            spinner.clear();
            Err(e)
        }
    };

    runtime.shutdown().await?;
    result
}

fn installing(name: &str, assets: usize) -> String {
    format!("Installing {} ({} assets)...", name, assets)
}

async fn run_install(
    ctx: &UiContext,
    runtime: &Runtime,
    spinner: &mut TaskSpinner,
    name: &str,
) -> OffcacheResult<()> {
    if let Err(e) = runtime.handle.install().await {
        spinner.stop_error(&format!("Install of {} failed", name));
        return Err(e);
    }

    let state = runtime.handle.state().await?;
    if state == WorkerState::Activated {
        spinner.stop(&format!("Installed {}", name));
        ui::key_value_status(ctx, "State", &state.to_string(), true);
    } else {
        spinner.stop_warn(&format!("Installed {}, not yet active", name));
        ui::key_value_status(ctx, "State", &state.to_string(), false);
        ui::remark(ctx, "Run: offcache activate");
    }
    Ok(())
}

async fn run_activate(
    runtime: &Runtime,
    spinner: &mut TaskSpinner,
    name: &str,
) -> OffcacheResult<()> {
    match runtime.handle.activate().await {
        Ok(()) => {
            spinner.stop(&format!("Activated {}", name));
            Ok(())
        }
        Err(e) => {
            spinner.stop_error(&format!("Could not activate {}", name));
            Err(e)
        }
    }
}
