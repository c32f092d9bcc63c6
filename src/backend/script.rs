//! Script back-end: shell scripts per resource kind, run locally.
//!
//! Every script receives a JSON payload on stdin:
//! `{step, action, type, inputs, state}`. Apply scripts report
//! `{"outputs": {...}, "state": ...}` as JSON on their last stdout line.
//! Step id, action and working directory are also exported as
//! `TESSERA_STEP`, `TESSERA_ACTION` and `TESSERA_WORK_DIR`.

use super::{ApplyContext, ApplyUpdate, Backend, BackendError, ListFilter, ResourceRow};
use crate::core::config::ScriptConfig;
use crate::core::types::{Action, StepState};
use crate::resources::{ResourceInputs, ResourceKind, ResourceOutputs};
use crate::transport::local::exec_local;
use crate::transport::{ExecOutput, ExecRequest};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};

/// What an apply script prints last.
#[derive(Debug, Deserialize)]
struct ApplyReport {
    #[serde(default)]
    outputs: Value,
    #[serde(default)]
    state: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct ScriptBackend {
    kind: ResourceKind,
    scripts: ScriptConfig,
    env: Vec<(String, String)>,
}

impl ScriptBackend {
    pub fn new(kind: ResourceKind, scripts: ScriptConfig) -> Self {
        Self {
            kind,
            scripts,
            env: Vec::new(),
        }
    }

    pub fn with_env(mut self, env: impl IntoIterator<Item = (String, String)>) -> Self {
        self.env.extend(env);
        self
    }

    fn request(&self, script: &str, ctx: Option<&ApplyContext>, payload: &Value) -> ExecRequest {
        let mut request = ExecRequest::new(script).stdin(payload.to_string());
        for (key, value) in &self.env {
            request = request.env(key, value);
        }
        if let Some(ctx) = ctx {
            request = request
                .cwd(&ctx.work_dir)
                .env("TESSERA_STEP", &ctx.step)
                .env("TESSERA_ACTION", ctx.action.to_string())
                .env("TESSERA_WORK_DIR", ctx.work_dir.display().to_string());
        }
        request
    }
}

fn stdin_payload(ctx: &ApplyContext, inputs: &ResourceInputs, state: Option<&Value>) -> Value {
    let mut value = serde_json::to_value(inputs).unwrap_or_else(|_| json!({}));
    if let Value::Object(ref mut map) = value {
        map.insert("step".to_string(), Value::String(ctx.step.clone()));
        map.insert("action".to_string(), Value::String(ctx.action.to_string()));
        map.insert("state".to_string(), state.cloned().unwrap_or(Value::Null));
    }
    value
}

async fn run(request: ExecRequest) -> Result<ExecOutput, BackendError> {
    let output = exec_local(&request).await.map_err(BackendError::Failed)?;
    if !output.success() {
        return Err(BackendError::Failed(output.failure_message()));
    }
    Ok(output)
}

fn last_json(output: &ExecOutput) -> Result<Value, BackendError> {
    let line = output
        .last_line()
        .ok_or_else(|| BackendError::Decode("no output".to_string()))?;
    serde_json::from_str(line).map_err(|e| BackendError::Decode(format!("{}: {}", e, line)))
}

fn decode_apply(kind: ResourceKind, output: &ExecOutput) -> Result<ApplyUpdate, BackendError> {
    let report: ApplyReport = serde_json::from_value(last_json(output)?)
        .map_err(|e| BackendError::Decode(e.to_string()))?;
    let outputs = ResourceOutputs::from_json(kind, report.outputs)
        .map_err(|e| BackendError::Decode(format!("{} outputs: {}", kind, e)))?;
    Ok(ApplyUpdate::finished(outputs, report.state))
}

fn decode_row(value: Value) -> Result<ResourceRow, BackendError> {
    serde_json::from_value(value).map_err(|e| BackendError::Decode(e.to_string()))
}

#[async_trait]
impl Backend for ScriptBackend {
    async fn list(&self, filter: &ListFilter) -> Result<Vec<ResourceRow>, BackendError> {
        let Some(ref script) = self.scripts.list else {
            return Ok(Vec::new());
        };
        let payload = serde_json::to_value(filter).unwrap_or(Value::Null);
        let output = run(self.request(script, None, &payload)).await?;
        match last_json(&output)? {
            Value::Array(items) => items.into_iter().map(decode_row).collect(),
            other => Err(BackendError::Decode(format!("expected a list, got {}", other))),
        }
    }

    async fn get(&self, id: &str) -> Result<Option<ResourceRow>, BackendError> {
        let Some(ref script) = self.scripts.get else {
            return Ok(None);
        };
        let request = self
            .request(script, None, &json!({ "id": id }))
            .env("TESSERA_RESOURCE_ID", id);
        let output = run(request).await?;
        match last_json(&output)? {
            Value::Null => Ok(None),
            value => decode_row(value).map(Some),
        }
    }

    fn apply(
        &self,
        ctx: ApplyContext,
        inputs: ResourceInputs,
        state: Option<Value>,
    ) -> BoxStream<'static, Result<ApplyUpdate, BackendError>> {
        let payload = stdin_payload(&ctx, &inputs, state.as_ref());
        let request = self.request(&self.scripts.apply, Some(&ctx), &payload);
        let kind = self.kind;
        stream::once(async { Ok(ApplyUpdate::status(StepState::Applying)) })
            .chain(stream::once(async move {
                let output = run(request).await?;
                decode_apply(kind, &output)
            }))
            .boxed()
    }

    fn destroy(
        &self,
        ctx: ApplyContext,
        inputs: ResourceInputs,
        state: Option<Value>,
    ) -> BoxStream<'static, Result<StepState, BackendError>> {
        let Some(ref script) = self.scripts.destroy else {
            return stream::once(async {
                Err(BackendError::Unsupported {
                    action: Action::Delete,
                })
            })
            .boxed();
        };
        let payload = stdin_payload(&ctx, &inputs, state.as_ref());
        let request = self.request(script, Some(&ctx), &payload);
        stream::once(async { Ok(StepState::Destroying) })
            .chain(stream::once(async move {
                run(request).await?;
                Ok(StepState::Destroying)
            }))
            .boxed()
    }

    async fn after_create(
        &self,
        ctx: &ApplyContext,
        outputs: Option<&ResourceOutputs>,
    ) -> Result<(), BackendError> {
        if let Some(ref script) = self.scripts.after_create {
            let payload = json!({ "step": ctx.step, "outputs": outputs });
            run(self.request(script, Some(ctx), &payload)).await?;
        }
        Ok(())
    }

    async fn after_delete(&self, ctx: &ApplyContext) -> Result<(), BackendError> {
        if let Some(ref script) = self.scripts.after_delete {
            run(self.request(script, Some(ctx), &json!({ "step": ctx.step }))).await?;
        }
        Ok(())
    }

    fn supports(&self, action: Action) -> bool {
        match action {
            Action::Delete => self.scripts.destroy.is_some(),
            _ => true,
        }
    }
}
