//! The agent reasoning loop implementation.

use crate::policy::ToolPolicy;
use futures::future::join_all;
use orchestrator_core::error::{ProviderError, ToolError};
use orchestrator_core::message::{Conversation, Message, MessageToolCall};
use orchestrator_core::provider::{Provider, ProviderRequest};
use orchestrator_core::run::{StepEvent, StepRecorder};
use orchestrator_core::tool::ToolRegistry;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Fixed system instruction seeded into every transcript.
pub const SYSTEM_PROMPT: &str = "You are an orchestrator agent. Coordinate the tools \
you have been given to accomplish the user's goal, calling them as needed and combining \
their results. Only use tools that are actually available to you and never make up tools \
or tool output. When the answer is simple, reply in plain text without markdown or other markup.";

const NO_RESPONSE: &str = "No response";

/// Per-run parameters.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Backend model id sent to the provider.
    pub model: String,

    /// `None` offers no tools, `["auto"]` offers all, anything else is a forced subset.
    pub allowed_tools: Option<Vec<String>>,

    pub max_iterations: u32,

    /// Tools switched off in settings. Never offered, never dispatched.
    pub disabled_tools: BTreeSet<String>,
}

impl RunOptions {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            allowed_tools: None,
            max_iterations: 10,
            disabled_tools: BTreeSet::new(),
        }
    }

    pub fn with_tools(mut self, tools: Option<Vec<String>>) -> Self {
        self.allowed_tools = tools;
        self
    }

    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_disabled_tools(mut self, disabled: BTreeSet<String>) -> Self {
        self.disabled_tools = disabled;
        self
    }
}

/// The core agent loop that orchestrates LLM calls and tool execution.
pub struct AgentLoop {
    /// The LLM provider to use
    provider: Arc<dyn Provider>,

    /// Tool registry, shared read-only across runs
    tools: Arc<ToolRegistry>,

    /// Temperature setting
    temperature: f32,

    /// Default max tokens per response
    max_tokens: Option<u32>,
}

impl AgentLoop {
    /// Create a new agent loop.
    pub fn new(provider: Arc<dyn Provider>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            provider,
            tools,
            temperature: 0.7,
            max_tokens: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the default max tokens per LLM response.
    pub fn with_max_tokens(mut self, max: Option<u32>) -> Self {
        self.max_tokens = max;
        self
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Drive one run to its final answer, recording every step.
    ///
    /// Tool failures are folded into the transcript and never end the run.
    /// A provider failure records an error response and is returned as-is;
    /// the caller finalizes the run as failed. Hitting the iteration cap is
    /// not an error.
    pub async fn run(
        &self,
        goal: &str,
        options: &RunOptions,
        recorder: &mut StepRecorder,
    ) -> Result<String, ProviderError> {
        recorder.record(StepEvent::UserRequest(goal.to_string()));

        let policy = ToolPolicy::resolve(
            options.allowed_tools.as_deref(),
            &self.tools,
            &options.disabled_tools,
        );
        let mut conversation = Conversation::seeded(SYSTEM_PROMPT, goal);

        info!(
            run_id = %recorder.run_id(),
            model = %options.model,
            max_iterations = options.max_iterations,
            tools = ?policy.active_names().collect::<Vec<_>>(),
            "Starting agent run"
        );

        for iteration in 1..=options.max_iterations {
            let mut request = ProviderRequest::new(&options.model, conversation.messages.clone());
            request.temperature = self.temperature;
            request.max_tokens = self.max_tokens;
            request.tools = policy.definitions().to_vec();
            request.tool_choice = policy.choice_for(iteration);

            debug!(
                run_id = %recorder.run_id(),
                iteration,
                messages = request.messages.len(),
                tool_choice = request.tool_choice.as_str(),
                "Sending request to provider"
            );

            let reply = match self.provider.complete(request).await {
                Ok(response) => response.message,
                Err(e) => {
                    error!(run_id = %recorder.run_id(), iteration, error = %e, "Provider call failed");
                    recorder.record(StepEvent::AgentResponse(format!(
                        "Error in iteration {iteration}: {e}"
                    )));
                    return Err(e);
                }
            };

            if !reply.has_tool_calls() {
                let answer = if reply.content.is_empty() {
                    NO_RESPONSE.to_string()
                } else {
                    reply.content.clone()
                };
                conversation.push(reply);
                recorder.record(StepEvent::AgentResponse(answer.clone()));
                info!(run_id = %recorder.run_id(), iteration, "Agent produced final answer");
                return Ok(answer);
            }

            let calls = reply.tool_calls.clone();
            conversation.push(reply);

            let names: Vec<&str> = calls.iter().map(|c| c.name.as_str()).collect();
            recorder.record(StepEvent::AgentThought(format!(
                "Using tool(s): {}",
                names.join(", ")
            )));

            let results = self.dispatch(&calls, &policy, recorder).await;
            for (call, result) in calls.iter().zip(results) {
                recorder.record(StepEvent::ToolResult {
                    tool_name: call.name.clone(),
                    result: result.clone(),
                });
                conversation.push(Message::tool_result(&call.id, result));
            }
            debug!(
                run_id = %recorder.run_id(),
                iteration,
                results = conversation.trailing_tool_results().len(),
                "Tool results appended"
            );
        }

        let message = format!("Reached maximum iterations ({})", options.max_iterations);
        warn!(run_id = %recorder.run_id(), max_iterations = options.max_iterations, "Iteration cap reached");
        recorder.record(StepEvent::AgentResponse(message.clone()));
        Ok(message)
    }

    /// Record every call, run them concurrently, and return results in call order.
    async fn dispatch(
        &self,
        calls: &[MessageToolCall],
        policy: &ToolPolicy,
        recorder: &mut StepRecorder,
    ) -> Vec<String> {
        let prepared: Vec<Result<Value, String>> = calls
            .iter()
            .map(|call| {
                let parsed = parse_arguments(&call.arguments);
                let params = match &parsed {
                    Ok(args) => args.clone(),
                    Err(_) => Value::String(call.arguments.clone()),
                };
                recorder.record(StepEvent::ToolCall {
                    tool_name: call.name.clone(),
                    params,
                });
                parsed.map_err(|e| {
                    format!(
                        "tool_dispatch_failed: could not parse arguments for '{}': {e}",
                        call.name
                    )
                })
            })
            .collect();

        let run_id = recorder.run_id().to_string();
        let pending = calls.iter().zip(prepared).map(|(call, prepared)| {
            let run_id = run_id.as_str();
            async move {
                let args = match prepared {
                    Ok(args) => args,
                    Err(message) => {
                        warn!(run_id, tool = %call.name, "Tool arguments did not parse");
                        return message;
                    }
                };

                if self.tools.contains(&call.name) && !policy.permits(&call.name) {
                    let denied = ToolError::PermissionDenied {
                        tool_name: call.name.clone(),
                        reason: "tool is not enabled for this run".into(),
                    };
                    warn!(run_id, tool = %call.name, "Tool call outside the allowed set");
                    return format!("Error executing tool: {denied}");
                }

                debug!(run_id, tool = %call.name, "Executing tool");
                match self.tools.execute_named(&call.name, args).await {
                    Ok(output) => output,
                    Err(e) => {
                        warn!(run_id, tool = %call.name, error = %e, "Tool execution failed");
                        format!("Error executing tool: {e}")
                    }
                }
            }
        });

        join_all(pending).await
    }
}

/// Parse a raw argument string. Blank input means no arguments.
fn parse_arguments(raw: &str) -> Result<Value, serde_json::Error> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(serde_json::Map::new()));
    }
    serde_json::from_str(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use orchestrator_core::message::Role;
    use orchestrator_core::provider::{ProviderResponse, ToolChoice};
    use orchestrator_core::run::{RunStatus, StepKind};
    use orchestrator_core::tool::Tool;
    use orchestrator_tools::{CalculatorTool, WebSearchTool};
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays a fixed script of turns and captures every request.
    struct ScriptedProvider {
        script: Mutex<VecDeque<Result<Message, ProviderError>>>,
        repeat: Option<Message>,
        requests: Mutex<Vec<ProviderRequest>>,
    }

    impl ScriptedProvider {
        fn new(script: Vec<Result<Message, ProviderError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                repeat: None,
                requests: Mutex::new(Vec::new()),
            })
        }

        fn repeating(message: Message) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(VecDeque::new()),
                repeat: Some(message),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<ProviderRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            request: ProviderRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            self.requests.lock().unwrap().push(request);
            let next = self.script.lock().unwrap().pop_front();
            let message = match next {
                Some(turn) => turn?,
                None => self.repeat.clone().expect("script exhausted"),
            };
            Ok(ProviderResponse {
                message,
                usage: None,
                model: "scripted-model".into(),
            })
        }
    }

    struct FailingTool;

    #[async_trait]
    impl Tool for FailingTool {
        fn name(&self) -> &str {
            "flaky"
        }
        fn description(&self) -> &str {
            "Always fails"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, _arguments: Value) -> Result<String, ToolError> {
            Err(ToolError::ExecutionFailed {
                tool_name: "flaky".into(),
                reason: "backend unavailable".into(),
            })
        }
    }

    /// Sleeps for `delay_ms`, notes when it finished, then returns its own name.
    struct LabelTool {
        name: &'static str,
        delay_ms: u64,
        finished: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Tool for LabelTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "Returns its own name"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, _arguments: Value) -> Result<String, ToolError> {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
            self.finished.lock().unwrap().push(self.name);
            Ok(format!("result from {}", self.name))
        }
    }

    fn call(id: &str, name: &str, arguments: &str) -> MessageToolCall {
        MessageToolCall {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    fn tool_turn(calls: Vec<MessageToolCall>) -> Message {
        Message::assistant_with_tool_calls("", calls)
    }

    fn registry(tools: Vec<Box<dyn Tool>>) -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        for tool in tools {
            registry.register(tool);
        }
        Arc::new(registry)
    }

    fn auto() -> Option<Vec<String>> {
        Some(vec!["auto".into()])
    }

    fn kinds(recorder: &StepRecorder) -> Vec<StepKind> {
        recorder.steps().iter().map(|s| s.kind).collect()
    }

    fn assert_contiguous(recorder: &StepRecorder) {
        let orders: Vec<u32> = recorder.steps().iter().map(|s| s.order).collect();
        let expected: Vec<u32> = (0..orders.len() as u32).collect();
        assert_eq!(orders, expected);
    }

    #[tokio::test]
    async fn plain_answer_takes_one_call() {
        let provider = ScriptedProvider::new(vec![Ok(Message::assistant("Hello there."))]);
        let agent = AgentLoop::new(provider.clone(), registry(vec![]));
        let mut recorder = StepRecorder::new("hi");

        let answer = agent
            .run("hi", &RunOptions::new("m"), &mut recorder)
            .await
            .unwrap();

        assert_eq!(answer, "Hello there.");
        assert_eq!(provider.requests().len(), 1);
        assert_eq!(
            kinds(&recorder),
            vec![StepKind::UserRequest, StepKind::AgentResponse]
        );
        assert_contiguous(&recorder);

        let request = &provider.requests()[0];
        assert_eq!(request.messages[0].role, Role::System);
        assert_eq!(request.messages[0].content, SYSTEM_PROMPT);
        assert_eq!(request.messages[1].content, "hi");
        assert!(request.tools.is_empty());
        assert_eq!(request.tool_choice, ToolChoice::None);
    }

    #[tokio::test]
    async fn empty_reply_falls_back() {
        let provider = ScriptedProvider::new(vec![Ok(Message::assistant(""))]);
        let agent = AgentLoop::new(provider, registry(vec![]));
        let mut recorder = StepRecorder::new("hi");

        let answer = agent
            .run("hi", &RunOptions::new("m"), &mut recorder)
            .await
            .unwrap();
        assert_eq!(answer, "No response");
        assert_eq!(recorder.steps()[1].text(), Some("No response"));
    }

    #[tokio::test]
    async fn calculator_scenario() {
        let provider = ScriptedProvider::new(vec![
            Ok(tool_turn(vec![call(
                "call_1",
                "calculator",
                r#"{"operation":"add","x":2,"y":2}"#,
            )])),
            Ok(Message::assistant("2 + 2 equals 4.")),
        ]);
        let agent = AgentLoop::new(provider.clone(), registry(vec![Box::new(CalculatorTool)]));
        let options = RunOptions::new("m").with_tools(Some(vec!["calculator".into()]));
        let mut recorder = StepRecorder::new("what is 2+2");

        let answer = agent.run("what is 2+2", &options, &mut recorder).await.unwrap();
        recorder.finalize(RunStatus::Completed).unwrap();

        assert!(answer.contains('4'));
        assert_eq!(
            kinds(&recorder),
            vec![
                StepKind::UserRequest,
                StepKind::AgentThought,
                StepKind::ToolCall,
                StepKind::ToolResult,
                StepKind::AgentResponse,
            ]
        );
        assert_contiguous(&recorder);

        let steps = recorder.steps();
        assert_eq!(steps[1].text(), Some("Using tool(s): calculator"));
        assert_eq!(steps[2].tool_name(), Some("calculator"));
        assert_eq!(
            steps[2].params(),
            Some(&json!({"operation": "add", "x": 2, "y": 2}))
        );
        assert_eq!(steps[3].result(), Some("2 + 2 = 4"));

        let requests = provider.requests();
        assert_eq!(requests[0].tool_choice, ToolChoice::Required);
        assert_eq!(requests[1].tool_choice, ToolChoice::Auto);
        assert_eq!(requests[0].tools.len(), 1);

        let tail = Conversation {
            messages: requests[1].messages.clone(),
        };
        let results = tail.trailing_tool_results();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(results[0].content, "2 + 2 = 4");
    }

    #[tokio::test]
    async fn forced_subset_tolerates_plain_reply() {
        let provider = ScriptedProvider::new(vec![Ok(Message::assistant("I'd rather not."))]);
        let agent = AgentLoop::new(provider.clone(), registry(vec![Box::new(CalculatorTool)]));
        let options = RunOptions::new("m").with_tools(Some(vec!["calculator".into()]));
        let mut recorder = StepRecorder::new("add stuff");

        let answer = agent.run("add stuff", &options, &mut recorder).await.unwrap();
        assert_eq!(answer, "I'd rather not.");
        assert_eq!(provider.requests()[0].tool_choice, ToolChoice::Required);
        assert_eq!(recorder.steps().len(), 2);
    }

    #[tokio::test]
    async fn failing_tool_is_recorded_and_run_continues() {
        let provider = ScriptedProvider::new(vec![
            Ok(tool_turn(vec![call("a", "flaky", "{}")])),
            Ok(tool_turn(vec![call("b", "flaky", "{}")])),
            Ok(Message::assistant("Gave up on the tool.")),
        ]);
        let agent = AgentLoop::new(provider, registry(vec![Box::new(FailingTool)]));
        let options = RunOptions::new("m").with_tools(auto());
        let mut recorder = StepRecorder::new("try it");

        let answer = agent.run("try it", &options, &mut recorder).await.unwrap();
        recorder.finalize(RunStatus::Completed).unwrap();
        assert_eq!(answer, "Gave up on the tool.");

        let results: Vec<&str> = recorder
            .steps()
            .iter()
            .filter(|s| s.kind == StepKind::ToolResult)
            .filter_map(|s| s.result())
            .collect();
        assert_eq!(results.len(), 2);
        for result in results {
            assert_eq!(
                result,
                "Error executing tool: Tool execution failed: flaky: backend unavailable"
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn results_follow_request_order() {
        let provider = ScriptedProvider::new(vec![
            Ok(tool_turn(vec![
                call("1", "alpha", "{}"),
                call("2", "bravo", "{}"),
                call("3", "charlie", "{}"),
            ])),
            Ok(Message::assistant("done")),
        ]);
        let finished = Arc::new(Mutex::new(Vec::new()));
        let label = |name, delay_ms| -> Box<dyn Tool> {
            Box::new(LabelTool {
                name,
                delay_ms,
                finished: finished.clone(),
            })
        };
        let agent = AgentLoop::new(
            provider.clone(),
            registry(vec![label("charlie", 10), label("alpha", 300), label("bravo", 100)]),
        );
        let options = RunOptions::new("m").with_tools(auto());
        let mut recorder = StepRecorder::new("abc");
        agent.run("abc", &options, &mut recorder).await.unwrap();

        assert_eq!(*finished.lock().unwrap(), vec!["charlie", "bravo", "alpha"]);
        let steps = recorder.steps();
        assert_eq!(steps[1].text(), Some("Using tool(s): alpha, bravo, charlie"));
        let call_names: Vec<_> = steps[2..5].iter().filter_map(|s| s.tool_name()).collect();
        assert_eq!(call_names, vec!["alpha", "bravo", "charlie"]);
        assert!(steps[2..5].iter().all(|s| s.kind == StepKind::ToolCall));
        let result_names: Vec<_> = steps[5..8].iter().filter_map(|s| s.tool_name()).collect();
        assert_eq!(result_names, vec!["alpha", "bravo", "charlie"]);

        let second = Conversation {
            messages: provider.requests()[1].messages.clone(),
        };
        let ids: Vec<_> = second
            .trailing_tool_results()
            .iter()
            .filter_map(|m| m.tool_call_id.as_deref())
            .collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
        assert_eq!(second.trailing_tool_results()[2].content, "result from charlie");
    }

    #[tokio::test]
    async fn iteration_cap_is_not_a_failure() {
        let provider = ScriptedProvider::repeating(tool_turn(vec![call(
            "loop",
            "web_search",
            r#"{"query":"again"}"#,
        )]));
        let agent = AgentLoop::new(provider.clone(), registry(vec![Box::new(WebSearchTool)]));
        let options = RunOptions::new("m")
            .with_tools(auto())
            .with_max_iterations(2);
        let mut recorder = StepRecorder::new("loop forever");

        let answer = agent.run("loop forever", &options, &mut recorder).await.unwrap();
        recorder.finalize(RunStatus::Completed).unwrap();

        assert_eq!(answer, "Reached maximum iterations (2)");
        assert_eq!(provider.requests().len(), 2);
        assert_eq!(recorder.status(), RunStatus::Completed);
        assert_eq!(recorder.run().final_response(), Some(answer.as_str()));
        assert_contiguous(&recorder);
    }

    #[tokio::test]
    async fn provider_error_is_recorded_and_propagated() {
        let provider = ScriptedProvider::new(vec![Err(ProviderError::Network(
            "connection refused".into(),
        ))]);
        let agent = AgentLoop::new(provider, registry(vec![]));
        let mut recorder = StepRecorder::new("hello");

        let err = agent
            .run("hello", &RunOptions::new("m"), &mut recorder)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Network(_)));

        let last = recorder.steps().last().unwrap();
        assert_eq!(last.kind, StepKind::AgentResponse);
        assert_eq!(
            last.text(),
            Some("Error in iteration 1: Network error: connection refused")
        );
    }

    #[tokio::test]
    async fn unparseable_arguments_become_dispatch_error() {
        let provider = ScriptedProvider::new(vec![
            Ok(tool_turn(vec![call("x", "calculator", "{not json")])),
            Ok(Message::assistant("Sorry, bad call.")),
        ]);
        let agent = AgentLoop::new(provider, registry(vec![Box::new(CalculatorTool)]));
        let options = RunOptions::new("m").with_tools(auto());
        let mut recorder = StepRecorder::new("oops");

        let answer = agent.run("oops", &options, &mut recorder).await.unwrap();
        assert_eq!(answer, "Sorry, bad call.");

        let steps = recorder.steps();
        assert_eq!(steps[2].params(), Some(&json!("{not json")));
        assert!(steps[3].result().unwrap().starts_with("tool_dispatch_failed:"));
    }

    #[tokio::test]
    async fn calls_outside_the_run_are_refused() {
        let provider = ScriptedProvider::new(vec![
            Ok(tool_turn(vec![
                call("1", "web_search", r#"{"query":"x"}"#),
                call("2", "ghost", "{}"),
            ])),
            Ok(Message::assistant("ok")),
        ]);
        let agent = AgentLoop::new(
            provider,
            registry(vec![Box::new(CalculatorTool), Box::new(WebSearchTool)]),
        );
        let options = RunOptions::new("m").with_tools(Some(vec!["calculator".into()]));
        let mut recorder = StepRecorder::new("search");
        agent.run("search", &options, &mut recorder).await.unwrap();

        let results: Vec<&str> = recorder
            .steps()
            .iter()
            .filter_map(|s| s.result())
            .collect();
        assert_eq!(
            results[0],
            "Error executing tool: Permission denied: web_search: tool is not enabled for this run"
        );
        assert_eq!(
            results[1],
            "Error executing tool: Tool 'ghost' not found. Available tools: calculator, web_search"
        );
    }

    #[tokio::test]
    async fn disabled_tools_are_never_offered() {
        let provider = ScriptedProvider::new(vec![Ok(Message::assistant("fine"))]);
        let agent = AgentLoop::new(
            provider.clone(),
            registry(vec![Box::new(CalculatorTool), Box::new(WebSearchTool)]),
        );
        let options = RunOptions::new("m")
            .with_tools(auto())
            .with_disabled_tools(["web_search".to_string()].into());
        let mut recorder = StepRecorder::new("q");
        agent.run("q", &options, &mut recorder).await.unwrap();

        let offered: Vec<_> = provider.requests()[0]
            .tools
            .iter()
            .map(|t| t.name.clone())
            .collect();
        assert_eq!(offered, vec!["calculator"]);
    }

    #[tokio::test]
    async fn request_carries_model_and_sampling() {
        let provider = ScriptedProvider::new(vec![Ok(Message::assistant("ok"))]);
        let agent = AgentLoop::new(provider.clone(), registry(vec![]))
            .with_temperature(0.2)
            .with_max_tokens(Some(256));
        let mut recorder = StepRecorder::new("q");
        agent
            .run("q", &RunOptions::new("gemini-2.5-flash"), &mut recorder)
            .await
            .unwrap();

        let request = &provider.requests()[0];
        assert_eq!(request.model, "gemini-2.5-flash");
        assert_eq!(request.temperature, 0.2);
        assert_eq!(request.max_tokens, Some(256));
    }
}
