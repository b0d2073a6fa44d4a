//! End-to-end lifecycle behavior against real directories and sockets.

mod common;

use std::fs;
use std::net::TcpStream;
use std::sync::Arc;

use common::Recorder;
use hearth::{
    Container, ContainerContext, DeployError, DeploymentMeta, EnvOverlay, LifecycleError,
    MergedConfiguration, PropertySources, Server, ServerConfig, TcpContainer,
};

fn quiet(tmp: &tempfile::TempDir) -> hearth::ServerConfigBuilder {
    ServerConfig::builder()
        .skip_http(true)
        .temp_dir(tmp.path())
        .use_shutdown_hook(false)
}

#[test]
fn test_start_materializes_layout_and_context() {
    let tmp = tempfile::tempdir().unwrap();
    let recorder = Recorder::new();
    let config = quiet(&tmp)
        .host("apps.example.org")
        .user("admin", "pw")
        .role("admin", "ops")
        .access_log_pattern("%h %t")
        .build();
    let server = Server::with_container(config, recorder.container());

    server.start().unwrap();
    let base = server.base().unwrap();
    for dir in ["conf", "logs", "temp", "work", "apps"] {
        assert!(base.join(dir).is_dir(), "missing {dir}");
    }

    let ctx = recorder.context();
    assert_eq!(ctx.base, base);
    assert_eq!(ctx.host, "apps.example.org");
    assert_eq!(ctx.users.get("admin").map(String::as_str), Some("pw"));
    assert_eq!(ctx.roles.get("admin").map(String::as_str), Some("ops"));
    assert!(ctx.connectors.is_empty());
    assert_eq!(ctx.interceptors.len(), 1);
    assert_eq!(ctx.interceptors[0].name, "access-log");
    assert_eq!(recorder.events(), vec!["init", "start"]);

    server.close().unwrap();
    assert_eq!(recorder.events(), vec!["init", "start", "stop", "destroy"]);
    // the throwaway base is deleted with the instance
    assert!(!base.exists());
}

#[test]
fn test_ephemeral_http_port_is_connectable() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = ServerConfig::builder()
        .temp_dir(tmp.path())
        .use_shutdown_hook(false)
        .build();
    config
        .bind_bag(MergedConfiguration::from_entries("test", [("http", "-1")]))
        .unwrap();
    let port = config.http_port;
    assert!(port > 0);

    let server = Server::new(config);
    server.start().unwrap();
    TcpStream::connect(("127.0.0.1", port as u16)).unwrap();
    server.close().unwrap();
}

#[test]
fn test_repeated_close_tears_down_once() {
    let tmp = tempfile::tempdir().unwrap();
    let recorder = Recorder::new();
    let server = Server::with_container(quiet(&tmp).build(), recorder.container());
    server.start().unwrap();
    server.close().unwrap();
    server.close().unwrap();
    server.close().unwrap();
    assert_eq!(recorder.events(), vec!["init", "start", "stop", "destroy"]);
}

#[test]
fn test_deploy_and_drain_on_close() {
    let tmp = tempfile::tempdir().unwrap();
    let recorder = Recorder::new();
    let server = Server::with_container(quiet(&tmp).build(), recorder.container());
    server.start().unwrap();

    server.deploy(DeploymentMeta::new("/app")).unwrap();
    server.deploy(DeploymentMeta::new("/other")).unwrap();
    let err = server.deploy(DeploymentMeta::new("/app")).unwrap_err();
    assert!(matches!(err, DeployError::DuplicateMountPath(p) if p == "/app"));

    server.undeploy("/app");
    server.close().unwrap();

    // close drains the remaining deployment before stopping the container
    assert_eq!(
        recorder.events(),
        vec![
            "init",
            "start",
            "mount:/app",
            "mount:/other",
            "unmount:/app",
            "unmount:/other",
            "stop",
            "destroy"
        ]
    );
    assert!(server.deployments().is_empty());
}

const DESCRIPTOR: &str = r#"<Server port="9005" shutdown="SHUTDOWN">
  <Connector port="9080" protocol="HTTP/1.1"/>
  <Connector port="9443" secure="true" scheme="https"/>
</Server>
"#;

#[test]
fn test_descriptor_ports_rewritten_to_configuration() {
    let tmp = tempfile::tempdir().unwrap();
    let source = tmp.path().join("custom.xml");
    fs::write(&source, DESCRIPTOR).unwrap();

    let recorder = Recorder::new();
    let config = quiet(&tmp).descriptor(&source).http_port(17171).build();
    let server = Server::with_container(config, recorder.container());
    server.start().unwrap();

    let staged = recorder.context().descriptor.unwrap();
    assert_eq!(staged, server.base().unwrap().join("conf").join("server.xml"));
    let content = fs::read_to_string(&staged).unwrap();
    assert!(content.contains("port=\"17171\""));
    assert!(!content.contains("port=\"9080\""));
    server.close().unwrap();
}

#[test]
fn test_descriptor_ports_adopted_when_kept() {
    let tmp = tempfile::tempdir().unwrap();
    let source = tmp.path().join("custom.xml");
    fs::write(&source, DESCRIPTOR).unwrap();

    let config = quiet(&tmp)
        .descriptor(&source)
        .keep_descriptor_ports(true)
        .build();
    let server = Server::with_container(config, Recorder::new().container());
    server.start().unwrap();

    let effective = server.config();
    assert_eq!(effective.http_port, 9080);
    assert_eq!(effective.https_port, 9443);
    assert_eq!(effective.stop_port, 9005);
    server.close().unwrap();
}

#[test]
fn test_pid_file_written_and_removed() {
    let tmp = tempfile::tempdir().unwrap();
    let pid_file = tmp.path().join("run").join("hearth.pid");
    let config = quiet(&tmp).pid_file(&pid_file).build();
    let server = Server::with_container(config, Recorder::new().container());

    server.start().unwrap();
    let recorded: u32 = fs::read_to_string(&pid_file).unwrap().parse().unwrap();
    assert_eq!(recorded, std::process::id());

    server.close().unwrap();
    assert!(!pid_file.exists());
}

#[test]
fn test_env_overlay_scoped_to_instance() {
    let name = "HEARTH_LIFECYCLE_OVERLAY";
    std::env::remove_var(name);

    let tmp = tempfile::tempdir().unwrap();
    let server = Server::with_parts(
        quiet(&tmp).build(),
        PropertySources::default(),
        EnvOverlay::new().set(name, "active"),
        Recorder::new().container(),
    );

    server.start().unwrap();
    assert_eq!(std::env::var(name).as_deref(), Ok("active"));
    server.close().unwrap();
    assert!(std::env::var(name).is_err());
}

#[test]
fn test_explicit_base_dir_is_kept_on_close() {
    let tmp = tempfile::tempdir().unwrap();
    let base = tmp.path().join("instance");
    fs::create_dir_all(base.join("stale")).unwrap();

    let config = quiet(&tmp).dir(base.to_str().unwrap()).build();
    let server = Server::with_container(config, Recorder::new().container());
    server.start().unwrap();

    // delete-on-startup wiped the stale content
    assert!(!base.join("stale").exists());
    assert!(base.join("conf").is_dir());

    server.close().unwrap();
    assert!(base.exists());
}

#[test]
fn test_conf_resources_synced_into_instance() {
    let tmp = tempfile::tempdir().unwrap();
    let resources = tmp.path().join("resources").join("conf-files");
    fs::create_dir_all(&resources).unwrap();
    fs::write(resources.join("app.policy"), "grant {};\n").unwrap();
    fs::write(resources.join("server.xml"), DESCRIPTOR).unwrap();

    let recorder = Recorder::new();
    let config = quiet(&tmp).conf("conf-files").http_port(14141).build();
    let server = Server::with_parts(
        config,
        PropertySources::new([tmp.path().join("resources")]),
        EnvOverlay::new(),
        recorder.container(),
    );
    server.start().unwrap();

    let conf_dir = recorder.context().conf_dir.clone();
    assert!(conf_dir.join("app.policy").is_file());
    // the synced descriptor was adopted and rewritten
    let staged = fs::read_to_string(conf_dir.join("server.xml")).unwrap();
    assert!(staged.contains("port=\"14141\""));
    server.close().unwrap();
}

struct StuckContainer;

impl Container for StuckContainer {
    fn init(&mut self, _ctx: &ContainerContext) -> Result<(), LifecycleError> {
        Ok(())
    }

    fn start(&mut self) -> Result<(), LifecycleError> {
        Ok(())
    }

    fn stop(&mut self) -> Result<(), LifecycleError> {
        Err(LifecycleError::StopFailure("connections stuck".to_string()))
    }

    fn destroy(&mut self) -> Result<(), LifecycleError> {
        Ok(())
    }

    fn mount(&mut self, _meta: &DeploymentMeta) -> Result<(), LifecycleError> {
        Ok(())
    }

    fn unmount(&mut self, _mount_path: &str) {}
}

#[test]
fn test_failed_stop_still_completes_cleanup() {
    let name = "HEARTH_CLEANUP_OVERLAY";
    std::env::remove_var(name);

    let tmp = tempfile::tempdir().unwrap();
    let pid_file = tmp.path().join("hearth.pid");
    let config = quiet(&tmp).pid_file(&pid_file).build();
    let server = Server::with_parts(
        config,
        PropertySources::default(),
        EnvOverlay::new().set(name, "active"),
        Box::new(StuckContainer),
    );

    server.start().unwrap();
    let base = server.base().unwrap();
    assert!(pid_file.exists());

    // the stop failure is surfaced, but only after the rest of the
    // teardown has run
    let err = server.close().unwrap_err();
    assert!(matches!(err, LifecycleError::StopFailure(_)));
    assert!(std::env::var(name).is_err());
    assert!(!pid_file.exists());
    assert!(!base.exists());
    assert!(!server.is_serving());
    // terminal: a repeat close no longer reports the stale failure
    server.close().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_wait_unblocks_on_close() {
    let tmp = tempfile::tempdir().unwrap();
    let server = Server::with_container(quiet(&tmp).build(), Recorder::new().container());
    server.start().unwrap();

    let closer = Arc::clone(&server);
    let handle = tokio::task::spawn_blocking(move || {
        std::thread::sleep(std::time::Duration::from_millis(50));
        closer.close().unwrap();
    });

    server.wait().await;
    assert!(!server.is_serving());
    handle.await.unwrap();
}

#[tokio::test]
async fn test_wait_returns_immediately_when_closed() {
    let tmp = tempfile::tempdir().unwrap();
    let server = Server::with_container(quiet(&tmp).build(), Recorder::new().container());
    server.start().unwrap();
    server.close().unwrap();
    server.wait().await;
}

#[test]
fn test_customizer_can_add_connector() {
    let tmp = tempfile::tempdir().unwrap();
    let recorder = Recorder::new();
    let mut config = quiet(&tmp).build();
    config.add_instance_customizer(10, |ctx| {
        ctx.connectors.push(hearth::ConnectorSpec::http(0));
    });
    let server = Server::with_container(config, recorder.container());
    server.start().unwrap();

    assert_eq!(recorder.context().connectors.len(), 1);
    assert_eq!(server.connectors().len(), 1);
    server.close().unwrap();
}

#[test]
fn test_default_container_opens_no_socket_without_connectors() {
    let tmp = tempfile::tempdir().unwrap();
    let server = Server::with_container(
        quiet(&tmp).build(),
        Box::new(TcpContainer::new()),
    );
    server.start().unwrap();
    assert!(server.connectors().is_empty());
    server.close().unwrap();
}
