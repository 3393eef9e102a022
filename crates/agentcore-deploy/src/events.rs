//! EventFilter: turns the toolkit's noisy notification stream into
//! deployment progress.
//!
//! The filter is an [`IoHost`]. For every notification it
//!
//! 1. forwards `(code, level, message)` to every raw (audit) subscriber,
//! 2. and, when verbose mode is on and the code is deployment-relevant,
//!    publishes a [`DeployMessage`] with extracted progress to every
//!    filtered subscriber.
//!
//! Subscribing returns a [`Subscription`]; dropping it unsubscribes.
//! Requests are always answered with their default response.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, Weak};

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::metrics::METRICS;
use crate::obs;
use crate::toolkit::{IoHost, ToolkitMessage, ToolkitRequest};

/// Stack monitoring start.
pub const STACK_MONITOR_START: &str = "CDK_TOOLKIT_I5501";
/// Resource activity, carries `| N/M |` progress.
pub const STACK_ACTIVITY: &str = "CDK_TOOLKIT_I5502";
/// Stack monitoring end.
pub const STACK_MONITOR_END: &str = "CDK_TOOLKIT_I5503";
/// Deploy result with outputs and stack ARN.
pub const DEPLOY_RESULT: &str = "CDK_TOOLKIT_I5900";
pub const DEPLOY_SUCCESS: &str = "CDK_TOOLKIT_I5901";

/// Codes forwarded to filtered subscribers. Stack-level progress (I5100) is
/// left out because it counts stacks, not resources.
pub const DEPLOY_MESSAGE_CODES: &[&str] = &[
    STACK_MONITOR_START,
    STACK_ACTIVITY,
    STACK_MONITOR_END,
    DEPLOY_RESULT,
    DEPLOY_SUCCESS,
];

static PROGRESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\|\s*(\d+)/(\d+)\s*\|").expect("progress regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceProgress {
    pub completed: u32,
    pub total: u32,
}

/// `"MyStack | 3/7 | ..."` -> 3 of 7. No match means no progress.
pub fn extract_progress(message: &str) -> Option<ResourceProgress> {
    let caps = PROGRESS.captures(message)?;
    Some(ResourceProgress {
        completed: caps.get(1)?.as_str().parse().ok()?,
        total: caps.get(2)?.as_str().parse().ok()?,
    })
}

/// A deployment-relevant toolkit message, with data pre-extracted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployMessage {
    pub code: String,
    pub message: String,
    pub level: String,
    pub timestamp: DateTime<Utc>,
    pub progress: Option<ResourceProgress>,
    /// Only on deploy results.
    pub outputs: Option<BTreeMap<String, String>>,
    /// Only on deploy results.
    pub stack_arn: Option<String>,
}

/// Unfiltered toolkit message as seen by audit subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMessage {
    pub code: String,
    pub level: String,
    pub message: String,
}

impl RawMessage {
    /// `[CODE] message`, the form written to audit logs.
    pub fn line(&self) -> String {
        format!("[{}] {}", self.code, self.message)
    }
}

type Senders<T> = Mutex<Vec<(u64, mpsc::UnboundedSender<T>)>>;

#[derive(Default)]
struct Hub {
    verbose: AtomicBool,
    next_id: AtomicU64,
    filtered: Senders<DeployMessage>,
    raw: Senders<RawMessage>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Send to every live subscriber, pruning closed ones.
fn publish<T: Clone>(senders: &Senders<T>, item: &T) -> usize {
    let mut senders = lock(senders);
    senders.retain(|(_, tx)| tx.send(item.clone()).is_ok());
    senders.len()
}

/// Cheap to clone; clones share subscribers and the verbose flag.
#[derive(Clone, Default)]
pub struct EventFilter {
    hub: Arc<Hub>,
}

impl std::fmt::Debug for EventFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventFilter")
            .field("verbose", &self.is_verbose())
            .finish()
    }
}

impl EventFilter {
    /// Starts quiet: filtered subscribers see nothing until verbose is on.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_verbose(&self, verbose: bool) {
        self.hub.verbose.store(verbose, Ordering::SeqCst);
    }

    pub fn is_verbose(&self) -> bool {
        self.hub.verbose.load(Ordering::SeqCst)
    }

    pub fn subscribe_filtered(&self) -> Subscription<DeployMessage> {
        self.subscribe(Channel::Filtered)
    }

    pub fn subscribe_raw(&self) -> Subscription<RawMessage> {
        self.subscribe(Channel::Raw)
    }

    fn subscribe<T>(&self, channel: Channel) -> Subscription<T>
    where
        Hub: Register<T>,
    {
        let id = self.hub.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        lock(<Hub as Register<T>>::senders(&self.hub)).push((id, tx));
        Subscription {
            id,
            channel,
            rx,
            hub: Arc::downgrade(&self.hub),
        }
    }

    fn classify(message: &ToolkitMessage) -> Option<DeployMessage> {
        let code = message.code.as_deref()?;
        if !DEPLOY_MESSAGE_CODES.contains(&code) {
            return None;
        }
        let mut out = DeployMessage {
            code: code.to_string(),
            message: message.message.clone(),
            level: message.level.clone().unwrap_or_else(|| "info".to_string()),
            timestamp: message.time.unwrap_or_else(Utc::now),
            progress: extract_progress(&message.message),
            outputs: None,
            stack_arn: None,
        };
        if code == DEPLOY_RESULT {
            if let Some(data) = &message.data {
                out.outputs = data
                    .get("outputs")
                    .and_then(|v| serde_json::from_value(v.clone()).ok());
                out.stack_arn = data
                    .get("stackArn")
                    .and_then(Value::as_str)
                    .map(str::to_string);
            }
        }
        Some(out)
    }
}

impl IoHost for EventFilter {
    fn notify(&self, message: ToolkitMessage) {
        METRICS.inc_toolkit_messages();
        let raw = RawMessage {
            code: message.code.clone().unwrap_or_else(|| "UNKNOWN".to_string()),
            level: message.level.clone().unwrap_or_else(|| "info".to_string()),
            message: message.message.clone(),
        };
        obs::emit_toolkit_message(&raw.code, &raw.level, &raw.message);
        publish(&self.hub.raw, &raw);

        if !self.is_verbose() {
            return;
        }
        if let Some(filtered) = Self::classify(&message) {
            if publish(&self.hub.filtered, &filtered) > 0 {
                METRICS.inc_filtered_messages();
            }
        }
    }

    fn request_response(&self, request: ToolkitRequest) -> Value {
        request.default_response
    }
}

#[derive(Debug, Clone, Copy)]
enum Channel {
    Filtered,
    Raw,
}

trait Register<T> {
    fn senders(&self) -> &Senders<T>;
}

impl Register<DeployMessage> for Hub {
    fn senders(&self) -> &Senders<DeployMessage> {
        &self.filtered
    }
}

impl Register<RawMessage> for Hub {
    fn senders(&self) -> &Senders<RawMessage> {
        &self.raw
    }
}

/// A live subscription. Dropping it unsubscribes.
pub struct Subscription<T> {
    id: u64,
    channel: Channel,
    rx: mpsc::UnboundedReceiver<T>,
    hub: Weak<Hub>,
}

impl<T> Subscription<T> {
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Everything delivered so far, without waiting.
    pub fn drain(&mut self) -> Vec<T> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        let Some(hub) = self.hub.upgrade() else {
            return;
        };
        let id = self.id;
        match self.channel {
            Channel::Filtered => lock(&hub.filtered).retain(|(i, _)| *i != id),
            Channel::Raw => lock(&hub.raw).retain(|(i, _)| *i != id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn activity(text: &str) -> ToolkitMessage {
        ToolkitMessage::new(STACK_ACTIVITY, "info", text)
    }

    #[test]
    fn progress_is_extracted() {
        assert_eq!(
            extract_progress("MyStack | 3/7 | 2024-01-01T00:00:00Z | UPDATE_IN_PROGRESS"),
            Some(ResourceProgress {
                completed: 3,
                total: 7
            })
        );
        assert_eq!(extract_progress("Deployment time: 42.1s"), None);
        assert_eq!(extract_progress("MyStack |0/6| CREATE"), Some(ResourceProgress { completed: 0, total: 6 }));
    }

    #[test]
    fn quiet_mode_still_feeds_audit() {
        let filter = EventFilter::new();
        let mut raw = filter.subscribe_raw();
        let mut filtered = filter.subscribe_filtered();

        filter.notify(activity("MyStack | 1/2 | x"));

        assert_eq!(raw.drain().len(), 1);
        assert!(filtered.drain().is_empty());
    }

    #[test]
    fn verbose_mode_forwards_only_allow_listed_codes() {
        let filter = EventFilter::new();
        filter.set_verbose(true);
        let mut raw = filter.subscribe_raw();
        let mut filtered = filter.subscribe_filtered();

        filter.notify(ToolkitMessage::new("CDK_TOOLKIT_I5100", "info", "Stack 1/1"));
        filter.notify(activity("MyStack | 3/7 | UPDATE_IN_PROGRESS"));

        assert_eq!(raw.drain().len(), 2);
        let got = filtered.drain();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].code, STACK_ACTIVITY);
        assert_eq!(
            got[0].progress,
            Some(ResourceProgress {
                completed: 3,
                total: 7
            })
        );
    }

    #[test]
    fn missing_code_and_level_get_defaults() {
        let filter = EventFilter::new();
        let mut raw = filter.subscribe_raw();
        filter.notify(ToolkitMessage {
            code: None,
            level: None,
            message: "hello".to_string(),
            time: None,
            data: None,
        });
        let got = raw.drain();
        assert_eq!(got[0].code, "UNKNOWN");
        assert_eq!(got[0].level, "info");
        assert_eq!(got[0].line(), "[UNKNOWN] hello");
    }

    #[test]
    fn deploy_result_carries_outputs_and_arn() {
        let filter = EventFilter::new();
        filter.set_verbose(true);
        let mut filtered = filter.subscribe_filtered();

        filter.notify(
            ToolkitMessage::new(DEPLOY_RESULT, "result", "ProjA-default deployed").with_data(json!({
                "outputs": {"BucketName": "x"},
                "stackArn": "arn:aws:cloudformation:us-east-1:123456789012:stack/ProjA-default/abc",
            })),
        );

        let got = filtered.drain();
        let outputs = got[0].outputs.clone().unwrap();
        assert_eq!(outputs.get("BucketName").map(String::as_str), Some("x"));
        assert!(got[0].stack_arn.as_deref().unwrap().contains(":stack/ProjA-default/"));
        assert_eq!(got[0].progress, None);
    }

    #[test]
    fn dropping_subscription_unsubscribes() {
        let filter = EventFilter::new();
        let sub = filter.subscribe_raw();
        assert_eq!(lock(&filter.hub.raw).len(), 1);
        drop(sub);
        assert_eq!(lock(&filter.hub.raw).len(), 0);
    }

    #[test]
    fn requests_get_default_response() {
        let filter = EventFilter::new();
        let answer = filter.request_response(ToolkitRequest {
            message: ToolkitMessage::new("CDK_TOOLKIT_I5060", "info", "Approve changes?"),
            default_response: json!(true),
        });
        assert_eq!(answer, json!(true));
    }

    #[test]
    fn verbose_toggle_is_shared_by_clones() {
        let filter = EventFilter::new();
        let clone = filter.clone();
        clone.set_verbose(true);
        assert!(filter.is_verbose());
    }
}
