//! Shared test doubles.

use std::sync::{Arc, Mutex};

use hearth::{Container, ContainerContext, DeploymentMeta, LifecycleError};

/// Observation handle for a [`RecordingContainer`].
#[derive(Clone, Default)]
pub struct Recorder {
    inner: Arc<Mutex<RecorderInner>>,
}

#[derive(Default)]
struct RecorderInner {
    events: Vec<String>,
    context: Option<ContainerContext>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn container(&self) -> Box<RecordingContainer> {
        Box::new(RecordingContainer {
            recorder: self.clone(),
        })
    }

    pub fn events(&self) -> Vec<String> {
        self.inner.lock().unwrap().events.clone()
    }

    pub fn context(&self) -> ContainerContext {
        self.inner
            .lock()
            .unwrap()
            .context
            .clone()
            .expect("container was never initialized")
    }

    fn push(&self, event: impl Into<String>) {
        self.inner.lock().unwrap().events.push(event.into());
    }
}

/// Container double that records every lifecycle call.
pub struct RecordingContainer {
    recorder: Recorder,
}

impl Container for RecordingContainer {
    fn init(&mut self, ctx: &ContainerContext) -> Result<(), LifecycleError> {
        self.recorder.inner.lock().unwrap().context = Some(ctx.clone());
        self.recorder.push("init");
        Ok(())
    }

    fn start(&mut self) -> Result<(), LifecycleError> {
        self.recorder.push("start");
        Ok(())
    }

    fn stop(&mut self) -> Result<(), LifecycleError> {
        self.recorder.push("stop");
        Ok(())
    }

    fn destroy(&mut self) -> Result<(), LifecycleError> {
        self.recorder.push("destroy");
        Ok(())
    }

    fn mount(&mut self, meta: &DeploymentMeta) -> Result<(), LifecycleError> {
        self.recorder.push(format!("mount:{}", meta.mount_path));
        Ok(())
    }

    fn unmount(&mut self, mount_path: &str) {
        self.recorder.push(format!("unmount:{mount_path}"));
    }
}
