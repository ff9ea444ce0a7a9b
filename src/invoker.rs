//! Bounded, contained execution of model-requested tool calls.
//!
//! Every request produces exactly one result. Lookup misses, timeouts, tool
//! errors, and panics all become error-flagged results; nothing a tool does
//! can abort the exchange that invoked it.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use model_gateway::{ToolCallRequest, ToolCallResult};
use tracing::{debug, warn};

use crate::registry::ToolRegistry;

/// Per-call execution budget before the invoker gives up on a tool.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ToolInvoker {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
}

impl ToolInvoker {
    #[must_use]
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Executes one request; never raises.
    pub fn invoke(&self, request: &ToolCallRequest) -> ToolCallResult {
        let Some(tool) = self.registry.lookup(&request.tool_name) else {
            warn!(tool = %request.tool_name, "model requested unregistered tool");
            return ToolCallResult::error(
                request.call_id.clone(),
                request.tool_name.clone(),
                format!("unknown capability: {}", request.tool_name),
            );
        };

        debug!(tool = %request.tool_name, call_id = %request.call_id, "invoking tool");

        let (result_sender, result_receiver) = mpsc::channel();
        let arguments = request.arguments.clone();
        let spawned = thread::Builder::new()
            .name(format!("tool-{}", request.tool_name))
            .spawn(move || {
                let outcome = catch_unwind(AssertUnwindSafe(|| tool.invoke(&arguments)));
                let _ = result_sender.send(outcome);
            });

        if let Err(error) = spawned {
            return ToolCallResult::error(
                request.call_id.clone(),
                request.tool_name.clone(),
                format!("failed to spawn tool worker: {error}"),
            );
        }

        match result_receiver.recv_timeout(self.timeout) {
            Ok(Ok(Ok(output))) => ToolCallResult::success(
                request.call_id.clone(),
                request.tool_name.clone(),
                output,
            ),
            Ok(Ok(Err(error))) => ToolCallResult::error(
                request.call_id.clone(),
                request.tool_name.clone(),
                error,
            ),
            Ok(Err(_)) => ToolCallResult::error(
                request.call_id.clone(),
                request.tool_name.clone(),
                format!("tool '{}' panicked", request.tool_name),
            ),
            Err(_) => {
                // The worker thread keeps running to completion; its late
                // result is dropped with the channel.
                warn!(tool = %request.tool_name, "tool call timed out");
                ToolCallResult::error(
                    request.call_id.clone(),
                    request.tool_name.clone(),
                    format!(
                        "capability '{}' timed out after {}s",
                        request.tool_name,
                        self.timeout.as_secs()
                    ),
                )
            }
        }
    }

    /// Executes a turn's requests concurrently, returning results in request
    /// order regardless of completion order.
    pub fn invoke_batch(&self, requests: &[ToolCallRequest]) -> Vec<ToolCallResult> {
        thread::scope(|scope| {
            let workers: Vec<_> = requests
                .iter()
                .map(|request| scope.spawn(move || self.invoke(request)))
                .collect();

            workers
                .into_iter()
                .zip(requests)
                .map(|(worker, request)| match worker.join() {
                    Ok(result) => result,
                    Err(_) => ToolCallResult::error(
                        request.call_id.clone(),
                        request.tool_name.clone(),
                        format!("tool '{}' panicked", request.tool_name),
                    ),
                })
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use model_gateway::ToolDefinition;
    use serde_json::{json, Value};

    use super::*;
    use crate::registry::{Tool, ToolRegistry};

    struct SleepyTool {
        name: &'static str,
        sleep: Duration,
    }

    impl Tool for SleepyTool {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: self.name.to_string(),
                description: None,
                input_schema: json!({ "type": "object" }),
            }
        }

        fn invoke(&self, arguments: &Value) -> Result<String, String> {
            thread::sleep(self.sleep);
            Ok(format!("{}:{}", self.name, arguments["tag"]))
        }
    }

    struct PanickyTool;

    impl Tool for PanickyTool {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "panicky".to_string(),
                description: None,
                input_schema: json!({ "type": "object" }),
            }
        }

        fn invoke(&self, _arguments: &Value) -> Result<String, String> {
            panic!("tool exploded");
        }
    }

    fn registry() -> Arc<ToolRegistry> {
        Arc::new(
            ToolRegistry::builder()
                .register(Arc::new(SleepyTool {
                    name: "fast",
                    sleep: Duration::ZERO,
                }))
                .expect("register fast")
                .register(Arc::new(SleepyTool {
                    name: "slow",
                    sleep: Duration::from_millis(120),
                }))
                .expect("register slow")
                .register(Arc::new(PanickyTool))
                .expect("register panicky")
                .build(),
        )
    }

    fn request(call_id: &str, tool_name: &str, tag: &str) -> ToolCallRequest {
        ToolCallRequest {
            call_id: call_id.to_string(),
            tool_name: tool_name.to_string(),
            arguments: json!({ "tag": tag }),
        }
    }

    #[test]
    fn unknown_tool_yields_contained_error_result() {
        let invoker = ToolInvoker::new(registry());

        let result = invoker.invoke(&request("call_0", "delete_everything", "x"));

        assert!(result.is_error);
        assert_eq!(result.output, "unknown capability: delete_everything");
        assert_eq!(result.call_id, "call_0");
    }

    #[test]
    fn timeout_yields_error_result_with_nonempty_message() {
        let invoker = ToolInvoker::new(registry()).with_timeout(Duration::from_millis(20));

        let result = invoker.invoke(&request("call_0", "slow", "x"));

        assert!(result.is_error);
        assert!(!result.output.is_empty());
        assert!(result.output.contains("timed out"));
    }

    #[test]
    fn panicking_tool_is_contained_as_error_result() {
        let invoker = ToolInvoker::new(registry());

        let result = invoker.invoke(&request("call_0", "panicky", "x"));

        assert!(result.is_error);
        assert!(result.output.contains("panicked"));
    }

    #[test]
    fn batch_results_preserve_request_order_despite_completion_order() {
        let invoker = ToolInvoker::new(registry());
        let requests = vec![
            request("call_0", "slow", "first"),
            request("call_1", "fast", "second"),
        ];

        let results = invoker.invoke_batch(&requests);

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].call_id, "call_0");
        assert_eq!(results[0].output, "slow:\"first\"");
        assert_eq!(results[1].call_id, "call_1");
        assert_eq!(results[1].output, "fast:\"second\"");
    }

    #[test]
    fn batch_dispatch_is_concurrent_not_sequential() {
        let invoker = ToolInvoker::new(registry());
        let requests: Vec<_> = (0..3)
            .map(|index| request(&format!("call_{index}"), "slow", "x"))
            .collect();

        let started = Instant::now();
        let results = invoker.invoke_batch(&requests);
        let elapsed = started.elapsed();

        assert_eq!(results.len(), 3);
        // Three sequential 120ms sleeps would need 360ms.
        assert!(elapsed < Duration::from_millis(300));
    }

    #[test]
    fn every_request_gets_exactly_one_result() {
        let invoker = ToolInvoker::new(registry()).with_timeout(Duration::from_millis(20));
        let requests = vec![
            request("call_0", "fast", "a"),
            request("call_1", "missing", "b"),
            request("call_2", "slow", "c"),
            request("call_3", "panicky", "d"),
        ];

        let results = invoker.invoke_batch(&requests);

        let observed: Vec<_> = results.iter().map(|result| result.call_id.as_str()).collect();
        assert_eq!(observed, vec!["call_0", "call_1", "call_2", "call_3"]);
        assert!(!results[0].is_error);
        assert!(results[1].is_error);
        assert!(results[2].is_error);
        assert!(results[3].is_error);
    }
}
