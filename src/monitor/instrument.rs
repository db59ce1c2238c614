// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The instrumentation wrapper.
//!
//! [`Monitor::run`] decorates one invocation of an async operation;
//! [`Monitor::wrap`] turns an operation into a reusable
//! [`Instrumented`] value with the same behaviour on every call.
//!
//! Per invocation:
//!
//! 1. a [`CorrelationId`] is generated and a running record inserted;
//! 2. a limiter slot for the operation name is awaited;
//! 3. the operation runs with its original arguments and its own id;
//! 4. stats and the record are finalized for both outcomes;
//! 5. successful JSON-object results get a `_meta` object attached;
//! 6. errors are logged and returned unchanged.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{error, info, info_span, Instrument};

use super::limiter::DEFAULT_MAX_PARALLEL;
use super::Monitor;
use crate::telemetry::{CorrelationId, CorrelationRecord};

/// Maximum characters of the argument rendering kept on a record.
pub const ARGS_PREVIEW_CHARS: usize = 100;

/// Key under which call metadata is attached to object results.
pub const META_KEY: &str = "_meta";

/// Name and concurrency cap of an instrumented operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub name: String,
    pub max_parallel: usize,
}

impl Operation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_parallel: DEFAULT_MAX_PARALLEL,
        }
    }

    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel;
        self
    }
}

/// The two optional per-call parameters: an external request id and a
/// parent correlation id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallContext {
    pub request_id: Option<String>,
    pub parent: Option<CorrelationId>,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_parent(mut self, parent: impl Into<CorrelationId>) -> Self {
        self.parent = Some(parent.into());
        self
    }
}

/// Metadata attached to successful structured results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallMeta {
    pub correlation_id: CorrelationId,
    /// Elapsed milliseconds rounded to one decimal.
    pub latency_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// Results that can carry [`CallMeta`].
///
/// The default does nothing; only mapping-shaped results are annotated.
pub trait AttachMeta {
    fn attach_meta(&mut self, _meta: &CallMeta) {}
}

impl AttachMeta for Value {
    fn attach_meta(&mut self, meta: &CallMeta) {
        let Some(object) = self.as_object_mut() else {
            return;
        };
        let slot = object.entry(META_KEY).or_insert_with(|| json!({}));
        if let Some(slot) = slot.as_object_mut() {
            slot.insert("correlation_id".into(), json!(meta.correlation_id));
            slot.insert("latency_ms".into(), json!(meta.latency_ms));
            if let Some(request_id) = &meta.request_id {
                slot.insert("request_id".into(), json!(request_id));
            }
        }
    }
}

impl AttachMeta for () {}
impl AttachMeta for String {}
impl AttachMeta for bool {}
impl<T> AttachMeta for Vec<T> {}
impl<T> AttachMeta for Option<T> {}

impl Monitor {
    /// Run one instrumented invocation of `op`.
    ///
    /// `f` receives `args` unchanged plus the invocation's correlation id,
    /// which it can hand to nested calls as their parent.
    pub async fn run<A, T, E, F, Fut>(
        &self,
        op: &Operation,
        ctx: CallContext,
        args: A,
        f: F,
    ) -> Result<T, E>
    where
        A: fmt::Debug,
        F: FnOnce(A, CorrelationId) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        T: AttachMeta,
        E: fmt::Display,
    {
        let cid = CorrelationId::new();
        let start = Instant::now();

        self.chain().insert(CorrelationRecord::start(
            cid.clone(),
            op.name.as_str(),
            ctx.request_id.clone(),
            ctx.parent.clone(),
            preview(&args),
        ));
        info!(
            cid = %cid,
            tool = %op.name,
            request_id = ctx.request_id.as_deref().unwrap_or("N/A"),
            parent = ctx.parent.as_ref().map(|p| p.as_str()).unwrap_or("N/A"),
            "START"
        );

        let _slot = self.limiter().acquire(&op.name, op.max_parallel).await;

        let span = info_span!("operation", cid = %cid, tool = %op.name);
        let result = f(args, cid.clone()).instrument(span).await;

        let elapsed = start.elapsed();
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        let rounded_ms = (elapsed_ms * 10.0).round() / 10.0;
        self.stats().record(&op.name, elapsed, result.is_ok());

        match result {
            Ok(mut value) => {
                self.chain().finish_success(&cid, elapsed_ms);
                info!(cid = %cid, tool = %op.name, elapsed_ms = rounded_ms, "END");
                value.attach_meta(&CallMeta {
                    correlation_id: cid,
                    latency_ms: rounded_ms,
                    request_id: ctx.request_id,
                });
                Ok(value)
            }
            Err(err) => {
                let message = err.to_string();
                self.chain().finish_error(&cid, elapsed_ms, &message);
                error!(
                    cid = %cid,
                    tool = %op.name,
                    elapsed_ms = rounded_ms,
                    error = %message,
                    "ERROR"
                );
                Err(err)
            }
        }
    }

    /// Compose `f` with instrumentation for `op`.
    pub fn wrap<F>(self: &Arc<Self>, op: Operation, f: F) -> Instrumented<F> {
        Instrumented {
            monitor: Arc::clone(self),
            op,
            f,
        }
    }
}

/// An operation wrapped with instrumentation, callable many times.
pub struct Instrumented<F> {
    monitor: Arc<Monitor>,
    op: Operation,
    f: F,
}

impl<F> Instrumented<F> {
    pub fn operation(&self) -> &Operation {
        &self.op
    }

    pub async fn call<A, T, E, Fut>(&self, ctx: CallContext, args: A) -> Result<T, E>
    where
        A: fmt::Debug,
        F: Fn(A, CorrelationId) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        T: AttachMeta,
        E: fmt::Display,
    {
        let f = &self.f;
        self.monitor.run(&self.op, ctx, args, |args, cid| f(args, cid)).await
    }
}

fn preview(args: &impl fmt::Debug) -> String {
    let rendered = format!("{args:?}");
    match rendered.char_indices().nth(ARGS_PREVIEW_CHARS) {
        Some((cut, _)) => rendered[..cut].to_string(),
        None => rendered,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::CallStatus;
    use std::time::Duration;

    #[tokio::test]
    async fn test_success_records_and_annotates() {
        let monitor = Monitor::new();
        let op = Operation::new("sonar.scan");
        let ctx = CallContext::new().with_request_id("rpc-1").with_parent("figma-code");

        let result: Result<Value, String> = monitor
            .run(&op, ctx, ("demo", 2), |_args, cid| async move {
                Ok(json!({"taskId": "t-1", "seen_cid": cid}))
            })
            .await;

        let value = result.unwrap();
        let meta = &value[META_KEY];
        assert_eq!(meta["request_id"], "rpc-1");
        assert_eq!(meta["correlation_id"], value["seen_cid"]);
        assert!(meta["latency_ms"].as_f64().unwrap() >= 0.0);

        let records = monitor.chain().records();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.status, CallStatus::Success);
        assert_eq!(record.parent.as_ref().unwrap().as_str(), "figma-code");
        assert_eq!(record.args, "(\"demo\", 2)");

        let stats = monitor.stats().get("sonar.scan").unwrap();
        assert_eq!(stats.count, 1);
        assert!((stats.total_ms - record.elapsed_ms.unwrap()).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_error_propagates_unchanged() {
        let monitor = Monitor::new();
        let op = Operation::new("sonar.quality_gate");

        let result: Result<Value, String> = monitor
            .run(&op, CallContext::new(), (), |_, _| async {
                Err("HTTP 500 - boom".to_string())
            })
            .await;

        assert_eq!(result.unwrap_err(), "HTTP 500 - boom");
        let record = &monitor.chain().records()[0];
        assert_eq!(record.status, CallStatus::Error);
        assert_eq!(record.error.as_deref(), Some("HTTP 500 - boom"));
        assert_eq!(monitor.stats().get("sonar.quality_gate").unwrap().count, 1);
        assert_eq!(monitor.stats().get("sonar.quality_gate").unwrap().failures, 1);
    }

    #[tokio::test]
    async fn test_non_object_results_untouched() {
        let monitor = Monitor::new();
        let op = Operation::new("list");
        let out: Result<Value, String> = monitor
            .run(&op, CallContext::new(), (), |_, _| async { Ok(json!([1, 2])) })
            .await;
        assert_eq!(out.unwrap(), json!([1, 2]));
    }

    #[tokio::test]
    async fn test_record_is_running_during_execution() {
        let monitor = Arc::new(Monitor::new());
        let observer = Arc::clone(&monitor);
        let op = Operation::new("slow");

        let out: Result<bool, String> = monitor
            .run(&op, CallContext::new(), (), |_, cid| async move {
                Ok(observer.chain().get(&cid).unwrap().status == CallStatus::Running)
            })
            .await;
        assert!(out.unwrap());
    }

    #[tokio::test]
    async fn test_instrumented_is_reusable() {
        let monitor = Arc::new(Monitor::new());
        let double = monitor.wrap(Operation::new("double"), |n: u32, _cid: CorrelationId| async move {
            Ok::<_, String>(json!({ "value": n * 2 }))
        });

        for n in 0..3u32 {
            let out = double.call(CallContext::new(), n).await.unwrap();
            assert_eq!(out["value"], n * 2);
        }
        assert_eq!(monitor.stats().get("double").unwrap().count, 3);
        assert_eq!(double.operation().name, "double");
    }

    #[tokio::test]
    async fn test_wrapper_honours_limit() {
        let monitor = Arc::new(Monitor::new());
        let op = Operation::new("gated").with_max_parallel(1);

        let first = {
            let monitor = Arc::clone(&monitor);
            let op = op.clone();
            tokio::spawn(async move {
                monitor
                    .run(&op, CallContext::new(), (), |_, _| async {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok::<_, String>(())
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(monitor.limiter().available("gated"), Some(0));
        first.await.unwrap().unwrap();
        assert_eq!(monitor.limiter().available("gated"), Some(1));
    }

    #[test]
    fn test_preview_truncates() {
        let long = "x".repeat(500);
        assert_eq!(preview(&long).chars().count(), ARGS_PREVIEW_CHARS);
    }
}
