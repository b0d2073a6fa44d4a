//! The server lifecycle state machine.
//!
//! # Responsibilities
//! - Drive `Created -> Started -> Closed` under a single state mutex
//! - Materialize the instance layout (base, conf, logs, temp, work, apps)
//! - Stage the server descriptor and build the connectors
//! - Arm a Ctrl-C hook that closes the instance and disarms itself
//!
//! # Design Decisions
//! - A failed start leaves the partially started instance in `Started` so
//!   the caller's `close` reclaims whatever came up; there is no automatic
//!   rollback
//! - `close` is idempotent and `Closed` is terminal; repeat calls succeed
//! - The throwaway base directory is deleted on close only when this
//!   instance created it

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Weak};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::config::binder::substitute_with;
use crate::config::schema::ServerConfig;
use crate::config::sources::PropertySources;
use crate::server::connector::{build_connectors, ConnectorSpec};
use crate::server::deployments::{DeploymentRegistry, DeploymentUnit};
use crate::server::descriptor::DescriptorPorts;
use crate::server::env::{EnvGuard, EnvOverlay};
use crate::server::runtime::{
    Container, ContainerContext, DeploymentMeta, InterceptorSpec, TcpContainer,
};
use crate::server::{DeployError, LifecycleError};

/// Environment variable naming a previously created base directory to reuse.
pub const BASE_ENV: &str = "HEARTH_BASE";

/// Placeholder resolved to the effective HTTP port in instance properties.
pub const VAR_HTTP: &str = "hearth.embedded.http";
/// Placeholder resolved to the effective HTTPS port in instance properties.
pub const VAR_HTTPS: &str = "hearth.embedded.https";
/// Placeholder resolved to the effective stop port in instance properties.
pub const VAR_STOP: &str = "hearth.embedded.stop";

type SharedContainer = Arc<Mutex<Box<dyn Container>>>;

struct Running {
    container: SharedContainer,
    base: PathBuf,
    base_owned: bool,
    env: Option<EnvGuard>,
    pid_file: Option<PathBuf>,
    connectors: Vec<ConnectorSpec>,
}

enum State {
    Created(Box<dyn Container>),
    Started(Running),
    Closed,
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            State::Created(_) => "created",
            State::Started(_) => "started",
            State::Closed => "closed",
        }
    }
}

/// An embeddable server instance.
pub struct Server {
    config: Mutex<ServerConfig>,
    sources: PropertySources,
    overlay: EnvOverlay,
    state: Mutex<State>,
    deployments: Arc<DeploymentRegistry>,
    hook: Mutex<Option<JoinHandle<()>>>,
    closed: Notify,
}

impl Server {
    /// A server backed by the default TCP container.
    pub fn new(config: ServerConfig) -> Arc<Self> {
        Self::with_container(config, Box::new(TcpContainer::new()))
    }

    pub fn with_container(config: ServerConfig, container: Box<dyn Container>) -> Arc<Self> {
        Self::with_parts(config, PropertySources::default(), EnvOverlay::new(), container)
    }

    pub fn with_parts(
        config: ServerConfig,
        sources: PropertySources,
        overlay: EnvOverlay,
        container: Box<dyn Container>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config: Mutex::new(config),
            sources,
            overlay,
            state: Mutex::new(State::Created(container)),
            deployments: Arc::new(DeploymentRegistry::new()),
            hook: Mutex::new(None),
            closed: Notify::new(),
        })
    }

    /// Bring the instance up. Legal in `Created` only.
    ///
    /// On failure the partially started instance stays in `Started`; the
    /// caller is expected to `close` it to reclaim what came up.
    pub fn start(self: &Arc<Self>) -> Result<(), LifecycleError> {
        let (result, use_hook, protocol, port) = {
            let mut state = self.state.lock().expect("lifecycle state poisoned");
            let container = match std::mem::replace(&mut *state, State::Closed) {
                State::Created(container) => container,
                other => {
                    let name = other.name();
                    *state = other;
                    return Err(LifecycleError::InvalidState { state: name });
                }
            };
            let mut running = Running {
                container: Arc::new(Mutex::new(container)),
                base: PathBuf::new(),
                base_owned: false,
                env: None,
                pid_file: None,
                connectors: Vec::new(),
            };
            let mut config = self.config.lock().expect("configuration poisoned");
            let result = start_steps(&mut config, &self.sources, &self.overlay, &mut running);
            let summary = (
                result,
                config.use_shutdown_hook,
                config.active_protocol(),
                config.active_port(),
            );
            *state = State::Started(running);
            summary
        };

        result?;
        if use_hook {
            self.arm_hook();
        }
        tracing::info!(protocol, port, "server started");
        Ok(())
    }

    /// Tear the instance down. Idempotent; `Closed` is terminal.
    ///
    /// Everything is cleaned up even when the container fails to stop; the
    /// first failure is reported after cleanup completes.
    pub fn close(&self) -> Result<(), LifecycleError> {
        let previous = {
            let mut state = self.state.lock().expect("lifecycle state poisoned");
            match std::mem::replace(&mut *state, State::Closed) {
                State::Started(running) => Some(running),
                State::Created(_) | State::Closed => None,
            }
        };

        if let Some(handle) = self.hook.lock().expect("hook slot poisoned").take() {
            handle.abort();
        }

        let Some(mut running) = previous else {
            self.closed.notify_waiters();
            return Ok(());
        };

        self.deployments.drain_all();

        let (stop_result, destroy_result) = {
            let mut container = running.container.lock().expect("container poisoned");
            (container.stop(), container.destroy())
        };

        if let Some(env) = running.env.take() {
            env.restore();
        }
        if let Some(pid_file) = running.pid_file.take() {
            let _ = fs::remove_file(pid_file);
        }
        if running.base_owned {
            let _ = fs::remove_dir_all(&running.base);
        }
        tracing::info!(base = %running.base.display(), "server closed");
        self.closed.notify_waiters();

        stop_result.and(destroy_result)
    }

    /// Mount an application on the running instance.
    pub fn deploy(&self, meta: DeploymentMeta) -> Result<(), DeployError> {
        let container = {
            let mut state = self.state.lock().expect("lifecycle state poisoned");
            let State::Started(running) = &mut *state else {
                return Err(DeployError::NotRunning);
            };
            Arc::clone(&running.container)
        };

        let mount_path = meta.mount_path.clone();
        let teardown_container = Arc::clone(&container);
        let teardown_path = mount_path.clone();
        let mut unit = DeploymentUnit::new(&mount_path).with_teardown(move || {
            if let Ok(mut c) = teardown_container.lock() {
                c.unmount(&teardown_path);
            }
        });
        if let Some(doc_base) = &meta.doc_base {
            unit = unit.with_source(doc_base);
        }

        // reserve the path first; the registry's serialized write is the
        // single arbiter, so concurrent deploys cannot both reach mount
        self.deployments.deploy(unit)?;

        let mounted = container
            .lock()
            .expect("container poisoned")
            .mount(&meta);
        if let Err(error) = mounted {
            // unmount inside the teardown is a no-op for a path that never
            // made it into the container
            self.deployments.undeploy(&mount_path);
            return Err(error.into());
        }
        Ok(())
    }

    /// Unmount an application. Unknown paths are a no-op.
    pub fn undeploy(&self, mount_path: &str) {
        self.deployments.undeploy(mount_path);
    }

    /// Resolve once the instance has been closed.
    pub async fn wait(&self) {
        loop {
            let notified = self.closed.notified();
            if !self.is_serving() {
                return;
            }
            notified.await;
        }
    }

    pub fn is_serving(&self) -> bool {
        matches!(
            &*self.state.lock().expect("lifecycle state poisoned"),
            State::Started(_)
        )
    }

    /// Base directory of the running instance.
    pub fn base(&self) -> Option<PathBuf> {
        match &*self.state.lock().expect("lifecycle state poisoned") {
            State::Started(running) => Some(running.base.clone()),
            _ => None,
        }
    }

    /// Connectors handed to the container, after customizers ran.
    pub fn connectors(&self) -> Vec<ConnectorSpec> {
        match &*self.state.lock().expect("lifecycle state poisoned") {
            State::Started(running) => running.connectors.clone(),
            _ => Vec::new(),
        }
    }

    pub fn config(&self) -> ServerConfig {
        self.config.lock().expect("configuration poisoned").clone()
    }

    pub fn deployments(&self) -> Arc<DeploymentRegistry> {
        Arc::clone(&self.deployments)
    }

    /// Spawn the Ctrl-C hook. Without an async runtime the hook is skipped
    /// and closing stays the embedder's responsibility.
    fn arm_hook(self: &Arc<Self>) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!("no async runtime, shutdown hook not armed");
            return;
        };
        let weak: Weak<Server> = Arc::downgrade(self);
        let task = runtime.spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                if let Some(server) = weak.upgrade() {
                    // disarm first so close() does not abort this very task
                    if let Ok(mut hook) = server.hook.lock() {
                        hook.take();
                    }
                    if let Err(error) = server.close() {
                        tracing::error!(%error, "shutdown hook close failed");
                    }
                }
            }
        });
        *self.hook.lock().expect("hook slot poisoned") = Some(task);
    }
}

fn start_steps(
    config: &mut ServerConfig,
    sources: &PropertySources,
    overlay: &EnvOverlay,
    running: &mut Running,
) -> Result<(), LifecycleError> {
    if !overlay.is_empty() {
        running.env = Some(overlay.apply());
    }

    let (base, base_owned) = resolve_base(config)?;
    tracing::info!(base = %base.display(), owned = base_owned, "base directory ready");
    running.base = base.clone();
    running.base_owned = base_owned;

    let conf_dir = base.join("conf");
    let apps_dir = base.join("apps");
    for dir in [&conf_dir, &apps_dir, &base.join("logs"), &base.join("temp"), &base.join("work")] {
        create_dir(dir)?;
    }

    let synced_descriptor = sync_conf_resources(config, sources, &conf_dir)?;
    resolve_instance_properties(config);
    let descriptor = stage_descriptor(config, sources, &conf_dir, synced_descriptor)?;

    let mut connectors = build_connectors(config, sources, &conf_dir)?;
    connectors.extend(config.connectors.iter().cloned());

    let mut ctx = ContainerContext {
        base: base.clone(),
        conf_dir,
        apps_dir,
        host: config.host.clone(),
        descriptor,
        connectors,
        users: config.users.clone(),
        roles: config.roles.clone(),
        interceptors: build_interceptors(config),
    };
    for customizer in config.customizers() {
        customizer(&mut ctx);
    }
    running.connectors = ctx.connectors.clone();

    {
        let mut container = running.container.lock().expect("container poisoned");
        container.init(&ctx)?;
        container.start()?;
    }

    if let Some(pid_file) = &config.pid_file {
        if let Some(parent) = pid_file.parent() {
            if !parent.as_os_str().is_empty() {
                create_dir(parent)?;
            }
        }
        fs::write(pid_file, std::process::id().to_string()).map_err(|source| {
            LifecycleError::Io {
                path: pid_file.clone(),
                source,
            }
        })?;
        running.pid_file = Some(pid_file.clone());
    }

    Ok(())
}

fn resolve_base(config: &ServerConfig) -> Result<(PathBuf, bool), LifecycleError> {
    if let Some(dir) = &config.dir {
        let path = PathBuf::from(dir);
        if path.exists() && config.delete_base_on_startup {
            fs::remove_dir_all(&path).map_err(|source| LifecycleError::Io {
                path: path.clone(),
                source,
            })?;
        }
        create_dir(&path)?;
        return Ok((path, false));
    }

    if let Ok(recorded) = std::env::var(BASE_ENV) {
        let path = PathBuf::from(&recorded);
        if path.is_dir() {
            tracing::info!(base = %path.display(), "reusing recorded base directory");
            return Ok((path, false));
        }
    }

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let path = config.temp_dir.join(format!("hearth-{nanos}"));
    create_dir(&path)?;
    Ok((path, true))
}

fn create_dir(path: &Path) -> Result<(), LifecycleError> {
    fs::create_dir_all(path).map_err(|source| LifecycleError::DirectoryCreation {
        path: path.to_path_buf(),
        source,
    })
}

/// Copy the files of the configured conf resource directory into the
/// instance conf dir. A copied `server.xml` is reported as descriptor
/// candidate.
fn sync_conf_resources(
    config: &ServerConfig,
    sources: &PropertySources,
    conf_dir: &Path,
) -> Result<Option<PathBuf>, LifecycleError> {
    let Some(resource) = &config.conf else {
        return Ok(None);
    };
    let Some(dir) = sources.resolve_dir(resource) else {
        tracing::debug!(resource, "conf resource directory not found");
        return Ok(None);
    };

    let mut descriptor = None;
    let entries = fs::read_dir(&dir).map_err(|source| LifecycleError::Io {
        path: dir.clone(),
        source,
    })?;
    for entry in entries {
        let entry = entry.map_err(|source| LifecycleError::Io {
            path: dir.clone(),
            source,
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let target = conf_dir.join(entry.file_name());
        fs::copy(&path, &target).map_err(|source| LifecycleError::Io {
            path: target.clone(),
            source,
        })?;
        if entry.file_name() == "server.xml" {
            descriptor = Some(target);
        }
    }
    Ok(descriptor)
}

/// Resolve `${...}` placeholders in the free-form instance properties, with
/// the effective ports available under dedicated names.
fn resolve_instance_properties(config: &mut ServerConfig) {
    let http = config.http_port.to_string();
    let https = config.https_port.to_string();
    let stop = config.stop_port.to_string();
    let resolver = |name: &str| match name {
        _ if name == VAR_HTTP => Some(http.clone()),
        _ if name == VAR_HTTPS => Some(https.clone()),
        _ if name == VAR_STOP => Some(stop.clone()),
        _ => std::env::var(name).ok(),
    };
    config.properties = config
        .properties
        .iter()
        .map(|(key, value)| (key.clone(), substitute_with(value, &resolver)))
        .collect();
}

/// Stage the server descriptor into `conf/server.xml`, adopting its ports
/// into the configuration or rewriting them to the configured ones.
fn stage_descriptor(
    config: &mut ServerConfig,
    sources: &PropertySources,
    conf_dir: &Path,
    synced: Option<PathBuf>,
) -> Result<Option<PathBuf>, LifecycleError> {
    let source_path = match config.descriptor.clone() {
        Some(configured) if configured.is_file() => Some(configured),
        Some(configured) => configured.to_str().and_then(|name| sources.resolve(name)),
        None => synced,
    };
    let Some(source_path) = source_path else {
        return Ok(None);
    };

    let content = fs::read_to_string(&source_path).map_err(|source| LifecycleError::Io {
        path: source_path.clone(),
        source,
    })?;
    let parsed = DescriptorPorts::parse(&content);
    let target = conf_dir.join("server.xml");

    let staged = if config.keep_descriptor_ports {
        config.http_port = parsed.http;
        config.https_port = parsed.https;
        config.stop_port = parsed.stop;
        tracing::info!(
            http = parsed.http,
            https = parsed.https,
            stop = parsed.stop,
            "descriptor ports adopted"
        );
        content
    } else {
        let wanted = DescriptorPorts {
            http: config.http_port,
            https: config.https_port,
            stop: if config.stop_port > 0 {
                config.stop_port
            } else {
                parsed.stop
            },
        };
        DescriptorPorts::rewrite(&content, parsed, wanted)
    };
    fs::write(&target, staged).map_err(|source| LifecycleError::Io {
        path: target.clone(),
        source,
    })?;
    Ok(Some(target))
}

/// Build interceptor specs from `interceptors.<name>.*` properties. The
/// access log interceptor, when configured, always runs first.
fn build_interceptors(config: &ServerConfig) -> Vec<InterceptorSpec> {
    let mut named: BTreeMap<String, InterceptorSpec> = BTreeMap::new();
    for (key, value) in &config.properties {
        let Some(rest) = key.strip_prefix("interceptors.") else {
            continue;
        };
        let Some((name, attribute)) = rest.split_once('.') else {
            continue;
        };
        let entry = named
            .entry(name.to_string())
            .or_insert_with(|| InterceptorSpec {
                name: name.to_string(),
                kind: String::new(),
                order: 0,
                params: BTreeMap::new(),
            });
        match attribute {
            "_kind" => entry.kind = value.clone(),
            "_order" => entry.order = value.parse().unwrap_or(0),
            _ => {
                entry.params.insert(attribute.to_string(), value.clone());
            }
        }
    }

    let mut specs: Vec<InterceptorSpec> = named
        .into_values()
        .filter(|spec| !spec.kind.is_empty())
        .collect();
    specs.sort_by_key(|spec| spec.order);

    if let Some(pattern) = &config.access_log_pattern {
        let mut params = BTreeMap::new();
        params.insert("pattern".to_string(), pattern.clone());
        specs.insert(
            0,
            InterceptorSpec {
                name: "access-log".to_string(),
                kind: "access-log".to_string(),
                order: i32::MIN,
                params,
            },
        );
    }
    specs
}
