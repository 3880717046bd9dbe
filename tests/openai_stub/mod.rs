use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use serde_json::Value;

#[derive(Debug, Clone, Default)]
pub struct OpenAiStubConfig {
    pub expected_reasoning_effort: Option<String>,
    /// The first N requests get a reasoning-only response with no visible text.
    pub empty_responses_before_success: usize,
    /// Prompts containing this marker always get an empty response.
    pub always_empty_marker: Option<String>,
}

#[allow(dead_code)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub task: String,
    pub model: Option<String>,
    pub max_output_tokens: Option<u64>,
    pub reasoning_effort: Option<String>,
}

pub struct OpenAiStub {
    pub base_url: String,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl OpenAiStub {
    pub fn spawn(config: OpenAiStubConfig) -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start openai stub server");
        let addr = server.server_addr();
        let base_url = format!("http://{addr}/v1");
        let calls = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&calls);

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let handle = thread::spawn(move || {
            let mut empty_left = config.empty_responses_before_success;
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                let mut request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let path = request.url().to_string();
                if request.method() != &tiny_http::Method::Post || path != "/v1/responses" {
                    let _ = request.respond(
                        tiny_http::Response::from_string("not found").with_status_code(404),
                    );
                    continue;
                }

                let mut body = String::new();
                if request.as_reader().read_to_string(&mut body).is_err() {
                    let _ = request.respond(
                        tiny_http::Response::from_string("invalid request body")
                            .with_status_code(400),
                    );
                    continue;
                }

                let parsed: Value = match serde_json::from_str(&body) {
                    Ok(value) => value,
                    Err(_) => {
                        let _ = request.respond(
                            tiny_http::Response::from_string("invalid json").with_status_code(400),
                        );
                        continue;
                    }
                };

                let effort = parsed
                    .pointer("/reasoning/effort")
                    .and_then(|v| v.as_str())
                    .map(str::to_owned);
                if let Some(expected) = config.expected_reasoning_effort.as_deref() {
                    let actual = effort.as_deref().unwrap_or("");
                    if actual != expected {
                        let _ = request.respond(
                            tiny_http::Response::from_string(format!(
                                "missing expected reasoning.effort: expected={expected} actual={actual}"
                            ))
                            .with_status_code(400),
                        );
                        continue;
                    }
                }

                let Some(prompt) = parsed.get("input").and_then(|v| v.as_str()) else {
                    let _ = request.respond(
                        tiny_http::Response::from_string("missing input").with_status_code(400),
                    );
                    continue;
                };

                let task = prompt.lines().next().unwrap_or_default().to_owned();
                recorded.lock().expect("lock calls").push(RecordedCall {
                    task: task.clone(),
                    model: parsed.get("model").and_then(|v| v.as_str()).map(str::to_owned),
                    max_output_tokens: parsed.get("max_output_tokens").and_then(|v| v.as_u64()),
                    reasoning_effort: effort,
                });

                let force_empty = config
                    .always_empty_marker
                    .as_deref()
                    .is_some_and(|marker| prompt.contains(marker));
                let output_text = if force_empty || empty_left > 0 {
                    empty_left = empty_left.saturating_sub(1);
                    None
                } else {
                    match summary_response(&task, prompt) {
                        Some(text) => Some(text),
                        None => {
                            let _ = request.respond(
                                tiny_http::Response::from_string("unknown prompt mode")
                                    .with_status_code(400),
                            );
                            continue;
                        }
                    }
                };

                let response_body = match output_text {
                    Some(output_text) => serde_json::json!({
                        "id": "resp_stub",
                        "object": "response",
                        "status": "completed",
                        "model": parsed.get("model").cloned().unwrap_or(Value::String("stub-model".to_owned())),
                        "output": [
                            { "type": "reasoning", "summary": [] },
                            {
                                "type": "message",
                                "role": "assistant",
                                "content": [
                                    { "type": "output_text", "text": output_text }
                                ]
                            }
                        ]
                    }),
                    None => serde_json::json!({
                        "id": "resp_stub",
                        "object": "response",
                        "status": "incomplete",
                        "incomplete_details": { "reason": "max_output_tokens" },
                        "output": [ { "type": "reasoning", "summary": [] } ]
                    }),
                };

                let mut response = tiny_http::Response::from_string(response_body.to_string())
                    .with_status_code(200);
                let header =
                    tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
                        .expect("build header");
                response = response.with_header(header);
                let _ = request.respond(response);
            }
        });

        Self {
            base_url,
            calls,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    #[allow(dead_code)]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().expect("lock calls").clone()
    }
}

impl Drop for OpenAiStub {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn line_value<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    text.lines().find_map(|line| line.strip_prefix(prefix))
}

/// Answers by the prompt's leading `Task:` line.
fn summary_response(task: &str, prompt: &str) -> Option<String> {
    if task.contains("Summarize one chapter") {
        let title = line_value(prompt, "Chapter title: ")?;
        return Some(format!("Stub summary of {title}."));
    }
    if task.contains("whole-book summary") {
        return Some("Stub book summary.".to_owned());
    }
    if task.contains("initial summary") {
        return Some("Stub seed summary.".to_owned());
    }
    if task.contains("Refine a running") {
        let progress = line_value(prompt, "Progress: chapter ")?;
        return Some(format!("Stub refined summary through {progress}."));
    }
    if task.contains("Polish") {
        return Some("Stub final summary.".to_owned());
    }
    None
}
