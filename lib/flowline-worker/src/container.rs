//! Container lifecycle: image presence, creation with tier-derived resource
//! limits, errgroup-style parallel I/O staging, log collection, and
//! teardown. Grounded on `bollard`'s `Docker` client, already declared in
//! this crate's dependencies but unused until this module.

use std::collections::HashMap;

use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, DownloadFromContainerOptions, LogOutput, LogsOptions,
    RemoveContainerOptions, StartContainerOptions, UploadToContainerOptions, WaitContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::models::HostConfig;
use bytes::Bytes;
use flowline_resources::TierRequirement;
use futures::StreamExt;

use crate::error::WorkerError;
use crate::io::ResolvedPath;

/// Ensures `image` is present locally, pulling it if an inspect misses.
///
/// # Errors
///
/// Returns an error if the pull stream reports a failure.
pub async fn ensure_image(docker: &Docker, image: &str) -> Result<(), WorkerError> {
    if docker.inspect_image(image).await.is_ok() {
        return Ok(());
    }

    let mut pull = docker.create_image(
        Some(CreateImageOptions { from_image: image, ..Default::default() }),
        None,
        None,
    );
    while let Some(progress) = pull.next().await {
        progress.map_err(|e| WorkerError::ContainerFailed { message: format!("image pull failed: {e}") })?;
    }
    Ok(())
}

/// Creates a container running `argv` from `image`, with resource limits
/// derived from the node def's tier requirement. Returns the container id.
///
/// # Errors
///
/// Returns an error if the Docker daemon rejects the create call.
pub async fn create(docker: &Docker, image: &str, argv: &[String], requirement: &TierRequirement) -> Result<String, WorkerError> {
    let host_config = HostConfig {
        memory: Some((requirement.memory_mb * 1024 * 1024) as i64),
        nano_cpus: Some((requirement.cpu * 1_000_000_000.0) as i64),
        ..Default::default()
    };

    let config = Config {
        image: Some(image.to_string()),
        cmd: Some(argv.to_vec()),
        host_config: Some(host_config),
        ..Default::default()
    };

    let response = docker
        .create_container(None::<CreateContainerOptions<String>>, config)
        .await
        .map_err(|e| WorkerError::ContainerFailed { message: format!("container create failed: {e}") })?;
    Ok(response.id)
}

/// Stages every resolved input into the container via the Docker tar-upload
/// API. Errgroup semantics (§9): all inputs stage concurrently, the first
/// failure is returned once every task has settled.
///
/// # Errors
///
/// Returns the first staging failure, if any.
pub async fn stage_inputs(docker: &Docker, container_id: &str, inputs: &[ResolvedPath]) -> Result<(), WorkerError> {
    let tasks = inputs.iter().cloned().map(|input| {
        let docker = docker.clone();
        let container_id = container_id.to_string();
        tokio::spawn(async move { stage_one(&docker, &container_id, &input).await })
    });

    let joined = futures::future::try_join_all(tasks)
        .await
        .map_err(|e| WorkerError::StageInputFailed { name: "<join>".to_string(), message: e.to_string() })?;
    joined.into_iter().collect::<Result<Vec<()>, WorkerError>>()?;
    Ok(())
}

async fn stage_one(docker: &Docker, container_id: &str, input: &ResolvedPath) -> Result<(), WorkerError> {
    let data = tokio::fs::read(&input.host_path).await.map_err(|e| WorkerError::StageInputFailed {
        name: input.port_name.clone(),
        message: e.to_string(),
    })?;

    let tar_bytes = build_tar(&input.host_path, &data).map_err(|message| WorkerError::StageInputFailed {
        name: input.port_name.clone(),
        message,
    })?;

    docker
        .upload_to_container(container_id, Some(UploadToContainerOptions { path: "/", ..Default::default() }), Bytes::from(tar_bytes))
        .await
        .map_err(|e| WorkerError::StageInputFailed { name: input.port_name.clone(), message: e.to_string() })
}

fn build_tar(host_path: &str, data: &[u8]) -> Result<Vec<u8>, String> {
    let mut builder = tar::Builder::new(Vec::new());
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    let entry_path = host_path.trim_start_matches('/');
    builder.append_data(&mut header, entry_path, data).map_err(|e| e.to_string())?;
    builder.into_inner().map_err(|e| e.to_string())
}

/// Starts `container_id` and blocks until it exits, returning its status
/// code.
///
/// # Errors
///
/// Returns an error if the start or wait call fails.
pub async fn start_and_wait(docker: &Docker, container_id: &str) -> Result<i64, WorkerError> {
    docker
        .start_container(container_id, None::<StartContainerOptions<String>>)
        .await
        .map_err(|e| WorkerError::ContainerFailed { message: format!("container start failed: {e}") })?;

    let mut wait_stream = docker.wait_container(container_id, None::<WaitContainerOptions<String>>);
    match wait_stream.next().await {
        Some(Ok(result)) => Ok(result.status_code),
        Some(Err(e)) => Err(WorkerError::ContainerFailed { message: format!("container wait failed: {e}") }),
        None => Err(WorkerError::ContainerFailed { message: "container exited without reporting a status".to_string() }),
    }
}

/// Collects the container's combined stdout/stderr as a flat line list.
/// Best-effort: a log stream failure yields whatever was collected so far
/// rather than failing the whole execution over missing log output.
pub async fn collect_logs(docker: &Docker, container_id: &str) -> Vec<String> {
    let mut stream = docker.logs(
        container_id,
        Some(LogsOptions::<String> { stdout: true, stderr: true, ..Default::default() }),
    );

    let mut lines = Vec::new();
    while let Some(chunk) = stream.next().await {
        let Ok(output) = chunk else { break };
        let bytes = match output {
            LogOutput::StdOut { message } | LogOutput::StdErr { message } | LogOutput::Console { message } => message,
            LogOutput::StdIn { .. } => continue,
        };
        lines.extend(String::from_utf8_lossy(&bytes).lines().map(str::to_string));
    }
    lines
}

/// Downloads every resolved output from the container and uploads it to its
/// presigned PUT URL. Errgroup semantics, matching `stage_inputs`.
///
/// # Errors
///
/// Returns the first upload failure, if any.
pub async fn upload_outputs(
    docker: &Docker,
    container_id: &str,
    outputs: &[ResolvedPath],
    output_urls: &HashMap<String, String>,
) -> Result<(), WorkerError> {
    let tasks = outputs.iter().cloned().map(|output| {
        let docker = docker.clone();
        let container_id = container_id.to_string();
        let url = output_urls.get(&output.port_name).cloned();
        tokio::spawn(async move { upload_one(&docker, &container_id, &output, url).await })
    });

    let joined = futures::future::try_join_all(tasks)
        .await
        .map_err(|e| WorkerError::UploadOutputFailed { name: "<join>".to_string(), message: e.to_string() })?;
    joined.into_iter().collect::<Result<Vec<()>, WorkerError>>()?;
    Ok(())
}

async fn upload_one(docker: &Docker, container_id: &str, output: &ResolvedPath, url: Option<String>) -> Result<(), WorkerError> {
    let Some(url) = url else { return Ok(()) };

    let mut stream = docker.download_from_container(
        container_id,
        Some(DownloadFromContainerOptions { path: output.host_path.clone() }),
    );
    let mut tar_bytes = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| WorkerError::UploadOutputFailed { name: output.port_name.clone(), message: e.to_string() })?;
        tar_bytes.extend_from_slice(&chunk);
    }

    let data = extract_single_file(&tar_bytes)
        .map_err(|message| WorkerError::UploadOutputFailed { name: output.port_name.clone(), message })?;

    let client = reqwest::Client::new();
    let response = client
        .put(&url)
        .body(data)
        .send()
        .await
        .map_err(|e| WorkerError::UploadOutputFailed { name: output.port_name.clone(), message: e.to_string() })?;
    response
        .error_for_status()
        .map_err(|e| WorkerError::UploadOutputFailed { name: output.port_name.clone(), message: e.to_string() })?;
    Ok(())
}

fn extract_single_file(tar_bytes: &[u8]) -> Result<Vec<u8>, String> {
    let mut archive = tar::Archive::new(tar_bytes);
    let mut entries = archive.entries().map_err(|e| e.to_string())?;
    let mut entry = entries
        .next()
        .ok_or_else(|| "container returned an empty tar archive for this output".to_string())?
        .map_err(|e| e.to_string())?;
    let mut data = Vec::new();
    std::io::Read::read_to_end(&mut entry, &mut data).map_err(|e| e.to_string())?;
    Ok(data)
}

/// Removes the container unconditionally, swallowing errors: this runs on
/// every execution path, including after a failed run, and a teardown
/// failure must never mask the execution outcome that triggered it.
pub async fn remove(docker: &Docker, container_id: &str) {
    let _ = docker
        .remove_container(container_id, Some(RemoveContainerOptions { force: true, ..Default::default() }))
        .await;
}
