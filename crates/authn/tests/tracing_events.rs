//! Integration test verifying the session core's spans and events: replays
//! are logged at `warn`, and credentials never appear in any recorded field.

#![allow(clippy::expect_used)]

use std::{
    fmt,
    sync::{Arc, Mutex},
};

use taskhub_authn::testutil::TestHarness;
use tracing::{Level, Subscriber, field::Field};
use tracing_subscriber::{layer::SubscriberExt, registry::LookupSpan};

// ---------------------------------------------------------------------------
// Collecting layer: records span names and flattened events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct RecordedEvent {
    level: Level,
    fields: String,
}

#[derive(Clone, Default)]
struct Collector {
    spans: Arc<Mutex<Vec<String>>>,
    events: Arc<Mutex<Vec<RecordedEvent>>>,
}

struct FieldWriter<'a>(&'a mut String);

impl tracing::field::Visit for FieldWriter<'_> {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0.push_str(&format!("{}={:?} ", field.name(), value));
    }
}

impl<S> tracing_subscriber::Layer<S> for Collector
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(
        &self,
        attrs: &tracing::span::Attributes<'_>,
        id: &tracing::span::Id,
        ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        if let Some(span) = ctx.span(id) {
            let mut fields = String::new();
            attrs.record(&mut FieldWriter(&mut fields));
            self.spans.lock().expect("lock poisoned").push(format!("{} {fields}", span.name()));
        }
    }

    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let mut fields = String::new();
        event.record(&mut FieldWriter(&mut fields));
        self.events
            .lock()
            .expect("lock poisoned")
            .push(RecordedEvent { level: *event.metadata().level(), fields });
    }
}

fn collect() -> (Collector, tracing::subscriber::DefaultGuard) {
    let collector = Collector::default();
    let guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(collector.clone()));
    (collector, guard)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn replay_is_logged_at_warn() {
    let (collector, _guard) = collect();
    let harness = TestHarness::new();

    let session = harness.service.sign_in(harness.member_id).await.expect("sign in");
    harness.service.rotate(&session.refresh.token).await.expect("rotate");
    let _ = harness.service.rotate(&session.refresh.token).await;

    let events = collector.events.lock().expect("lock poisoned");
    let replay = events
        .iter()
        .find(|e| e.fields.contains("revoked refresh credential presented again"))
        .expect("replay event");
    assert_eq!(replay.level, Level::WARN);
    assert!(replay.fields.contains(&format!("subject={}", harness.member_id)));
}

#[tokio::test]
async fn session_operations_create_spans() {
    let (collector, _guard) = collect();
    let harness = TestHarness::new();

    let session = harness.service.sign_in(harness.member_id).await.expect("sign in");
    harness.service.rotate(&session.refresh.token).await.expect("rotate");
    harness.service.sign_out(None).await.expect("sign out");

    let spans = collector.spans.lock().expect("lock poisoned");
    for name in ["sign_in", "rotate", "sign_out", "lock_by_hash"] {
        assert!(
            spans.iter().any(|s| s.split(' ').next() == Some(name)),
            "expected a '{name}' span, got: {spans:?}"
        );
    }
}

#[tokio::test]
async fn credentials_never_logged() {
    let (collector, _guard) = collect();
    let harness = TestHarness::new();

    let first = harness.service.sign_in(harness.member_id).await.expect("sign in");
    let second = harness.service.rotate(&first.refresh.token).await.expect("rotate");
    let _ = harness.service.rotate(&first.refresh.token).await;
    harness.service.authenticate(&second.access.token).await.expect("authenticate");
    harness.service.sign_out(Some(&second.refresh.token)).await.expect("sign out");

    let spans = collector.spans.lock().expect("lock poisoned");
    let events = collector.events.lock().expect("lock poisoned");
    for token in [&first.access.token, &first.refresh.token, &second.access.token, &second.refresh.token] {
        assert!(!spans.iter().any(|s| s.contains(token.as_str())), "credential leaked into a span");
        assert!(!events.iter().any(|e| e.fields.contains(token.as_str())), "credential leaked into an event");
    }
}
