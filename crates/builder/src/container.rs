//! Containerized builds over the local daemon socket.

use std::path::Path;

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, LogOutput, LogsOptions, RemoveContainerOptions,
    StartContainerOptions, WaitContainerOptions,
};
use bollard::image::{BuildImageOptions, CreateImageOptions};
use bollard::models::HostConfig;
use bollard::Docker;
use futures::StreamExt;
use slipway_core::{DeployConfig, DeploymentId, DetectionResult, Error, Result};
use slipway_logbus::LogWriter;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::traits::ArtifactBuilder;

/// Image used for the web-framework build path. Python API projects
/// would get a Python image here; the detector currently only produces
/// Node-built project types.
const NODE_IMAGE: &str = "node:lts";

/// 4 GiB memory cap per build container.
const MEMORY_LIMIT_BYTES: i64 = 4 * 1024 * 1024 * 1024;

/// ~1 CPU share per build container.
const NANO_CPUS: i64 = 1_000_000_000;

/// How many trailing output lines are kept for failure reports.
const OUTPUT_TAIL_LINES: usize = 60;

/// Builds workspaces inside disposable containers.
pub struct ContainerBuilder {
    host: Option<String>,
}

impl ContainerBuilder {
    /// `host` overrides the daemon endpoint; `None` uses the platform's
    /// local socket.
    #[must_use]
    pub fn new(host: Option<String>) -> Self {
        Self { host }
    }

    /// Connect and ping the daemon. An unreachable daemon is the
    /// distinct, terminal [`Error::ContainerUnavailable`].
    async fn connect(&self) -> Result<Docker> {
        let unavailable = |e: bollard::errors::Error| Error::ContainerUnavailable {
            message: e.to_string(),
        };
        let docker = match &self.host {
            None => Docker::connect_with_local_defaults().map_err(unavailable)?,
            Some(host) if host.starts_with("http") || host.starts_with("tcp") => {
                Docker::connect_with_http(host, 120, bollard::API_DEFAULT_VERSION)
                    .map_err(unavailable)?
            }
            Some(host) => {
                let path = host.strip_prefix("unix://").unwrap_or(host);
                Docker::connect_with_socket(path, 120, bollard::API_DEFAULT_VERSION)
                    .map_err(unavailable)?
            }
        };
        docker.ping().await.map_err(unavailable)?;
        Ok(docker)
    }

    async fn ensure_image(&self, docker: &Docker, image: &str, log: &LogWriter) -> Result<()> {
        if docker.inspect_image(image).await.is_ok() {
            debug!(image, "image already present");
            return Ok(());
        }
        log.info("build", format!("pulling image {image}")).await;
        let mut pull = docker.create_image(
            Some(CreateImageOptions {
                from_image: image.to_owned(),
                ..Default::default()
            }),
            None,
            None,
        );
        while let Some(progress) = pull.next().await {
            match progress {
                Ok(info) => {
                    if let Some(status) = info.status {
                        debug!(image, status, "pull progress");
                    }
                }
                // Racing pulls are fine (the daemon deduplicates); a
                // pull that errors out retries at the job level.
                Err(e) => return Err(Error::transient(format!("image pull failed: {e}"))),
            }
        }
        Ok(())
    }

    async fn build_from_dockerfile(
        &self,
        docker: &Docker,
        workspace: &Path,
        deployment_id: DeploymentId,
        cancel: &CancellationToken,
        log: &LogWriter,
    ) -> Result<()> {
        let tag = format!("slipway-build-{deployment_id}");
        log.info("build", format!("Dockerfile found, building image {tag}"))
            .await;

        let context = tar_context(workspace.to_path_buf()).await?;
        let mut stream = docker.build_image(
            BuildImageOptions {
                dockerfile: "Dockerfile".to_owned(),
                t: tag,
                rm: true,
                ..Default::default()
            },
            None,
            Some(context.into()),
        );

        let mut tail: Vec<String> = Vec::new();
        loop {
            tokio::select! {
                () = cancel.cancelled() => return Err(Error::Cancelled),
                progress = stream.next() => match progress {
                    None => return Ok(()),
                    Some(Ok(info)) => {
                        if let Some(line) = info.stream {
                            let line = line.trim_end();
                            if !line.is_empty() {
                                push_tail(&mut tail, line);
                                // Builder output is streamed verbatim.
                                log.debug("build", line).await;
                            }
                        }
                        if let Some(error) = info.error {
                            return Err(Error::BuildFailed {
                                message: format!("image build failed: {error}"),
                            });
                        }
                    }
                    Some(Err(e)) => {
                        return Err(Error::BuildFailed {
                            message: format!("image build stream failed: {e}\n{}", tail.join("\n")),
                        });
                    }
                },
            }
        }
    }

    async fn run_build_container(
        &self,
        docker: &Docker,
        workspace: &Path,
        deployment_id: DeploymentId,
        detection: &DetectionResult,
        config: &DeployConfig,
        cancel: &CancellationToken,
        log: &LogWriter,
    ) -> Result<()> {
        self.ensure_image(docker, NODE_IMAGE, log).await?;

        let command = build_shell_command(detection, config);
        log.info("build", format!("running: {command}")).await;

        let env: Vec<String> = config
            .env_vars
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect();
        let name = format!("slipway-build-{deployment_id}");
        let container = docker
            .create_container(
                Some(CreateContainerOptions {
                    name: name.clone(),
                    platform: None,
                }),
                Config {
                    image: Some(NODE_IMAGE.to_owned()),
                    cmd: Some(vec!["sh".to_owned(), "-lc".to_owned(), command]),
                    working_dir: Some("/workspace".to_owned()),
                    env: Some(env),
                    host_config: Some(HostConfig {
                        binds: Some(vec![format!("{}:/workspace", workspace.display())]),
                        memory: Some(MEMORY_LIMIT_BYTES),
                        nano_cpus: Some(NANO_CPUS),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| Error::BuildFailed {
                message: format!("container create failed: {e}"),
            })?;

        let result = self
            .drive_container(docker, &container.id, cancel, log)
            .await;

        // The container goes away on success, failure, and cancel alike.
        if let Err(error) = docker
            .remove_container(
                &container.id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
        {
            warn!(container = %container.id, %error, "build container removal failed");
        }
        result
    }

    async fn drive_container(
        &self,
        docker: &Docker,
        container_id: &str,
        cancel: &CancellationToken,
        log: &LogWriter,
    ) -> Result<()> {
        docker
            .start_container(container_id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| Error::BuildFailed {
                message: format!("container start failed: {e}"),
            })?;

        // Forward build output to the bus while waiting for exit.
        let mut logs = docker.logs(
            container_id,
            Some(LogsOptions::<String> {
                follow: true,
                stdout: true,
                stderr: true,
                ..Default::default()
            }),
        );
        let forwarder_log = log.clone();
        let tail = std::sync::Arc::new(parking_lot::Mutex::new(Vec::<String>::new()));
        let forwarder_tail = tail.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(chunk) = logs.next().await {
                if let Ok(output) = chunk {
                    let line = log_line(&output);
                    if line.is_empty() {
                        continue;
                    }
                    push_tail(&mut forwarder_tail.lock(), &line);
                    forwarder_log.debug("build", line).await;
                }
            }
        });

        let mut wait = docker.wait_container(container_id, None::<WaitContainerOptions<String>>);
        let outcome = tokio::select! {
            () = cancel.cancelled() => {
                info!(container = %container_id, "build cancelled, killing container");
                Err(Error::Cancelled)
            }
            exit = wait.next() => match exit {
                Some(Ok(status)) if status.status_code == 0 => Ok(()),
                Some(Ok(status)) => {
                    let captured = tail.lock().join("\n");
                    Err(Error::BuildFailed {
                        message: format!(
                            "build exited with code {}\n{captured}",
                            status.status_code
                        ),
                    })
                }
                Some(Err(e)) => {
                    let captured = tail.lock().join("\n");
                    Err(Error::BuildFailed {
                        message: format!("build wait failed: {e}\n{captured}"),
                    })
                }
                None => Err(Error::BuildFailed {
                    message: "build wait stream ended unexpectedly".to_owned(),
                }),
            },
        };
        forwarder.abort();
        outcome
    }
}

#[async_trait]
impl ArtifactBuilder for ContainerBuilder {
    async fn build(
        &self,
        workspace: &Path,
        deployment_id: DeploymentId,
        detection: &DetectionResult,
        config: &DeployConfig,
        cancel: &CancellationToken,
        log: &LogWriter,
    ) -> Result<()> {
        let docker = self.connect().await?;
        if workspace.join("Dockerfile").is_file() {
            self.build_from_dockerfile(&docker, workspace, deployment_id, cancel, log)
                .await
        } else {
            self.run_build_container(
                &docker,
                workspace,
                deployment_id,
                detection,
                config,
                cancel,
                log,
            )
            .await
        }
    }
}

/// `<install> && <build>`, with the intake config able to override the
/// detected build command.
#[must_use]
pub fn build_shell_command(detection: &DetectionResult, config: &DeployConfig) -> String {
    let install = detection.package_manager.install_command();
    let build = config
        .build_command
        .clone()
        .or_else(|| detection.build_command.clone())
        .unwrap_or_else(|| detection.package_manager.run_build_command().to_owned());
    format!("{install} && {build}")
}

fn log_line(output: &LogOutput) -> String {
    match output {
        LogOutput::StdOut { message }
        | LogOutput::StdErr { message }
        | LogOutput::Console { message }
        | LogOutput::StdIn { message } => {
            String::from_utf8_lossy(message).trim_end().to_owned()
        }
    }
}

fn push_tail(tail: &mut Vec<String>, line: &str) {
    if tail.len() == OUTPUT_TAIL_LINES {
        tail.remove(0);
    }
    tail.push(line.to_owned());
}

/// Gzipped tar of the workspace, used as the image build context.
async fn tar_context(workspace: std::path::PathBuf) -> Result<Vec<u8>> {
    tokio::task::spawn_blocking(move || {
        let encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::fast());
        let mut archive = tar::Builder::new(encoder);
        archive
            .append_dir_all(".", &workspace)
            .map_err(|e| Error::storage(format!("tar of build context failed: {e}")))?;
        let encoder = archive
            .into_inner()
            .map_err(|e| Error::storage(format!("tar finish failed: {e}")))?;
        encoder
            .finish()
            .map_err(|e| Error::storage(format!("gzip finish failed: {e}")))
    })
    .await
    .map_err(|e| Error::internal(format!("tar task panicked: {e}")))?
}
