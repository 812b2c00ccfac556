use std::time::Duration;

use posthog_rs::Event;
use tracing::warn;

const CAPTURE_TIMEOUT: Duration = Duration::from_secs(5);

fn capture_async(event: Event) {
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        return;
    };
    handle.spawn(async move {
        match tokio::time::timeout(CAPTURE_TIMEOUT, posthog_rs::capture(event)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Failed to capture analytics event: {e}"),
            Err(_) => warn!("Analytics event capture timed out"),
        }
    });
}

pub fn track_site_created(template_type: &str) {
    let mut event = Event::new_anon("site_created");
    event.insert_prop("template_type", template_type).ok();
    capture_async(event);
}

pub fn track_payment_started(flow: &str) {
    let mut event = Event::new_anon("payment_started");
    event.insert_prop("flow", flow).ok();
    capture_async(event);
}

pub fn track_payment_start_failed(error_kind: &str) {
    let mut event = Event::new_anon("payment_start_failed");
    event.insert_prop("error_kind", error_kind).ok();
    capture_async(event);
}

pub fn track_site_promoted(source: &str) {
    let mut event = Event::new_anon("site_promoted");
    event.insert_prop("source", source).ok();
    capture_async(event);
}

pub fn track_sweep_completed(checked: usize, recovered: usize) {
    let mut event = Event::new_anon("sweep_completed");
    event.insert_prop("checked", checked).ok();
    event.insert_prop("recovered", recovered).ok();
    capture_async(event);
}
