//! Fetch command - intercept one request through the worker

use crate::cli::args::FetchArgs;
use crate::config::Config;
use crate::error::{OffcacheError, OffcacheResult};
use crate::http::{Request, Response};
use crate::reactor::factory::create_runtime;
use crate::ui::{self, UiContext};
use crate::worker::{FetchOutcome, ResponseSource};
use tokio::fs;
use url::Url;

/// Execute the fetch command
pub async fn execute(args: FetchArgs, config: &Config) -> OffcacheResult<()> {
    let ctx = UiContext::detect();
    let url = resolve_target(&config.worker.scope, &args.url)?;
    let mut request = if args.navigate {
        Request::navigate(url)
    } else {
        Request::get(url)
    }
    .with_method(args.method);
    if let Some(destination) = args.destination {
        request = request.with_destination(destination);
    }

    let runtime = create_runtime(config).await?;
    let outcome = runtime.handle.fetch(request).await;
    // Runtime caching finishes before the process exits
    runtime.shutdown().await?;

    match outcome? {
        FetchOutcome::Passthrough => {
            ui::step_warn_hint(
                &ctx,
                "Not intercepted; the worker is not controlling fetches",
                "Run: offcache install",
            );
        }
        FetchOutcome::Respond { response, source } => {
            report(&ctx, &response, source);
            if let Some(path) = args.output {
                fs::write(&path, &response.body)
                    .await
                    .map_err(|e| OffcacheError::io(format!("writing {}", path.display()), e))?;
                ui::step_ok_detail(&ctx, "Body written", &path.display().to_string());
            }
        }
    }

    Ok(())
}

fn report(ctx: &UiContext, response: &Response, source: ResponseSource) {
    ui::key_value(ctx, "URL", &response.url);
    ui::key_value_status(ctx, "Status", &response.status.to_string(), response.is_ok());
    ui::key_value_status(
        ctx,
        "Source",
        &source.to_string(),
        source != ResponseSource::Fallback,
    );
    if let Some(content_type) = response.header("content-type") {
        ui::key_value(ctx, "Content-Type", content_type);
    }
    ui::key_value(ctx, "Bytes", &response.body.len().to_string());
}

/// Accept an absolute URL, or a path resolved against the scope
pub(super) fn resolve_target(scope: &str, target: &str) -> OffcacheResult<Url> {
    let invalid = |reason: String| OffcacheError::InvalidUrl {
        url: target.to_string(),
        reason,
    };

    match Url::parse(target) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let base = Url::parse(scope).map_err(|e| invalid(e.to_string()))?;
            base.join(target).map_err(|e| invalid(e.to_string()))
        }
        Err(e) => Err(invalid(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_paths_against_scope() {
        let url = resolve_target("https://portfolio.test/", "/static/css/style.css").unwrap();
        assert_eq!(url.as_str(), "https://portfolio.test/static/css/style.css");
    }

    #[test]
    fn keeps_absolute_urls() {
        let url =
            resolve_target("https://portfolio.test/", "https://cdn.example.com/a.js").unwrap();
        assert_eq!(url.host_str(), Some("cdn.example.com"));
    }

    #[test]
    fn rejects_garbage() {
        assert!(resolve_target("https://portfolio.test/", "http://[::1").is_err());
    }
}
