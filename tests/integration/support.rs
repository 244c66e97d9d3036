use async_trait::async_trait;
use parking_lot::Mutex;
use skillgraph::config::RuntimeConfig;
use skillgraph::error::RuntimeError;
use skillgraph::model::{FinalAnswer, ModelClient, ModelRequest, ModelTurn, ToolCall, ToolHost};
use skillgraph::registry::{LoadReport, Registry};
use skillgraph::report::Finding;
use skillgraph::runtime::Runtime;
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Temporary workspace with a `.skillgraph` descriptor tree.
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, rel: &str, content: &str) -> &Self {
        let path = self.dir.path().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
        self
    }

    pub fn skill(&self, file: &str, content: &str) -> &Self {
        self.write(&format!(".skillgraph/skills/{}", file), content)
    }

    pub fn agent(&self, file: &str, content: &str) -> &Self {
        self.write(&format!(".skillgraph/agents/{}", file), content)
    }

    pub fn command(&self, file: &str, content: &str) -> &Self {
        self.write(&format!(".skillgraph/commands/{}", file), content)
    }

    pub fn config(&self) -> RuntimeConfig {
        RuntimeConfig::for_workspace(self.root())
    }

    pub fn registry(&self) -> (Arc<Registry>, LoadReport) {
        let (registry, report) = Registry::load(&self.config());
        (Arc::new(registry), report)
    }

    pub fn runtime(&self, model: ScriptedModel) -> Runtime {
        self.runtime_with(Arc::new(model), Arc::new(RecordingToolHost::default()))
    }

    pub fn runtime_with(
        &self,
        model: Arc<ScriptedModel>,
        tools: Arc<RecordingToolHost>,
    ) -> Runtime {
        let (registry, report) = self.registry();
        assert!(report.is_clean(), "descriptor errors: {:?}", report.errors);
        Runtime::new(registry, model, tools, self.config())
    }
}

#[derive(Default)]
struct Script {
    delay: Option<Duration>,
    turns: VecDeque<ModelTurn>,
    fail: Option<String>,
    findings: Vec<Finding>,
}

/// Model whose behaviour is scripted per component. Components without a
/// script answer immediately with `"<name> done"`.
#[derive(Default)]
pub struct ScriptedModel {
    scripts: Mutex<HashMap<String, Script>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep before every turn of `component`.
    pub fn delay(self, component: &str, delay: Duration) -> Self {
        self.scripts.lock().entry(component.to_string()).or_default().delay = Some(delay);
        self
    }

    /// Turns `component` takes before its final answer.
    pub fn turns(self, component: &str, turns: Vec<ModelTurn>) -> Self {
        self.scripts.lock().entry(component.to_string()).or_default().turns = turns.into();
        self
    }

    /// Every turn of `component` fails with a model error.
    pub fn fail(self, component: &str, message: &str) -> Self {
        self.scripts
            .lock()
            .entry(component.to_string())
            .or_default()
            .fail = Some(message.to_string());
        self
    }

    /// Findings in `component`'s final answer.
    pub fn findings(self, component: &str, findings: Vec<Finding>) -> Self {
        self.scripts.lock().entry(component.to_string()).or_default().findings = findings;
        self
    }

    pub fn prompts_for(&self, component: &str) -> Vec<String> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.component == component)
            .map(|r| r.prompt.clone())
            .collect()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn next_turn(&self, request: ModelRequest) -> Result<ModelTurn, RuntimeError> {
        let component = request.component.clone();
        let iteration = request.iteration;
        self.requests.lock().push(request);

        let delay = self.scripts.lock().get(&component).and_then(|s| s.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut scripts = self.scripts.lock();
        let Some(script) = scripts.get_mut(&component) else {
            return Ok(final_answer(&component, Vec::new()));
        };
        if let Some(message) = &script.fail {
            return Err(RuntimeError::Model(format!("{} (turn {})", message, iteration)));
        }
        Ok(match script.turns.pop_front() {
            Some(turn) => turn,
            None => final_answer(&component, std::mem::take(&mut script.findings)),
        })
    }
}

fn final_answer(component: &str, findings: Vec<Finding>) -> ModelTurn {
    ModelTurn::Final(FinalAnswer {
        summary: format!("{} done", component),
        findings,
    })
}

/// Tool host that records every call it performs.
#[derive(Default)]
pub struct RecordingToolHost {
    calls: Mutex<Vec<(String, String)>>,
}

impl RecordingToolHost {
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl ToolHost for RecordingToolHost {
    async fn execute(&self, component: &str, call: &ToolCall) -> Result<String, RuntimeError> {
        self.calls
            .lock()
            .push((component.to_string(), call.capability.as_str().to_string()));
        Ok("ok".to_string())
    }
}

pub fn invoke(target: &str, prompt: &str) -> ModelTurn {
    ModelTurn::Invoke {
        target: target.to_string(),
        prompt: prompt.to_string(),
    }
}

pub fn tool(capability: &str) -> ModelTurn {
    ModelTurn::ToolUse(ToolCall::new(capability, serde_json::json!({})))
}
