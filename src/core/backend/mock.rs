use async_trait::async_trait;
use std::path::Path;
use std::sync::Mutex;

use super::{Backend, BackendError, BackendOutput};

type Responder = dyn Fn(&str) -> Result<BackendOutput, BackendError> + Send + Sync;

/// Backend double answering each prompt through a closure and recording
/// every prompt it saw.
pub struct ScriptedBackend {
    responder: Box<Responder>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new(
        responder: impl Fn(&str) -> Result<BackendOutput, BackendError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Box::new(responder),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    async fn run(&self, prompt: &str, _cwd: &Path) -> Result<BackendOutput, BackendError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        (self.responder)(prompt)
    }

    async fn is_available(&self) -> bool {
        true
    }
}

pub fn ok(text: &str) -> Result<BackendOutput, BackendError> {
    Ok(BackendOutput {
        output: text.to_string(),
        exit_code: 0,
    })
}

pub fn fail(text: &str) -> Result<BackendOutput, BackendError> {
    Ok(BackendOutput {
        output: text.to_string(),
        exit_code: 1,
    })
}
