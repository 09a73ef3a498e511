//! Forwards `log` records to Application Insights.
//!
//! Run with the instrumentation key of your resource:
//! `APPINSIGHTS_INSTRUMENTATION_KEY=<key> cargo run --example basic`
use appinsights_appender::{AppInsightsHook, AppInsightsLogBridge, Config, Value};
use log::{error, info, warn, LevelFilter};
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let instrumentation_key = std::env::var("APPINSIGHTS_INSTRUMENTATION_KEY")?;
    let config = Config::new(instrumentation_key).with_max_batch_interval(Duration::from_secs(2));

    let mut hook = AppInsightsHook::new("basic-example", config)?;
    hook.add_ignore("request_body");
    hook.add_filter("user_email", |_| Value::from("<redacted>"));
    hook.set_async(true)?;

    log::set_boxed_logger(Box::new(AppInsightsLogBridge::new(hook)))?;
    log::set_max_level(LevelFilter::Info);

    info!(cart_items = 3; "checkout started");
    warn!(user_email = "someone@example.com", attempt = 2; "payment retried");
    error!(request_body = "{...}", status = 502; "payment provider unavailable");

    log::logger().flush();
    Ok(())
}
