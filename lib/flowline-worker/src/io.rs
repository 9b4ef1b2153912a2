//! I/O preparation: resolve each declared input/output to a host path,
//! sniffing and validating input mime types along the way.

use std::collections::HashMap;

use flowline_flow::{Node, NodeDef};

use crate::error::WorkerError;

/// How many leading bytes of an input are fetched for mime sniffing.
const SNIFF_BYTES: usize = 512;

/// A single input or output resolved to a path on the worker's host
/// filesystem, ready to be staged into or out of the container.
#[derive(Debug, Clone)]
pub struct ResolvedPath {
    pub port_name: String,
    pub host_path: String,
}

/// Resolves every declared input of `node_def` against `input_urls`,
/// fetching the first bytes of each for mime sniffing and rejecting any
/// whose sniffed type the port doesn't accept.
///
/// # Errors
///
/// Returns an error if a required input has no URL, a fetch fails, or a
/// sniffed mime type is rejected by the port's declared `MimeSet`.
pub async fn prepare_inputs(
    node_def: &NodeDef,
    node: &Node,
    input_urls: &HashMap<String, String>,
) -> Result<Vec<ResolvedPath>, WorkerError> {
    let mut resolved = Vec::new();

    for port in &node_def.inputs {
        let edge = node.input_edge(&port.name);
        let url = edge.and_then(|e| input_urls.get(e));

        let Some(url) = url else {
            if port.required {
                return Err(WorkerError::MissingRequiredInput { name: port.name.clone() });
            }
            continue;
        };

        let prefix = fetch_prefix(url).await.map_err(|e| WorkerError::InputFetchFailed {
            name: port.name.clone(),
            message: e,
        })?;

        let sniffed = infer::get(&prefix).map(|kind| kind.mime_type().to_string());
        if let Some(mime) = &sniffed {
            if !port.mime_set().contains(mime) {
                return Err(WorkerError::MimeRejected {
                    name: port.name.clone(),
                    mime: mime.clone(),
                });
            }
        }

        let extension = sniffed
            .as_deref()
            .and_then(extension_for_mime)
            .map(|ext| format!(".{ext}"))
            .unwrap_or_default();
        let host_path = format!("/tmp/{}{extension}", uuid::Uuid::now_v7());

        resolved.push(ResolvedPath { port_name: port.name.clone(), host_path });
    }

    Ok(resolved)
}

/// Resolves every declared output of `node_def` to a host path. An output
/// whose declared mime types don't resolve to exactly one extension is
/// synthesized without one, per the spec's "exactly one type -> its
/// preferred extension; else none" rule.
#[must_use]
pub fn prepare_outputs(node_def: &NodeDef) -> Vec<ResolvedPath> {
    node_def
        .outputs
        .iter()
        .map(|port| {
            let extension = match port.mime_types.as_slice() {
                [single] => extension_for_mime(single).map(|ext| format!(".{ext}")).unwrap_or_default(),
                _ => String::new(),
            };
            let host_path = format!("/tmp/{}{extension}", uuid::Uuid::now_v7());
            ResolvedPath { port_name: port.name.clone(), host_path }
        })
        .collect()
}

/// Downloads the full content of every resolved input to its host path.
/// Errgroup semantics (§9): all inputs download concurrently, the first
/// failure is returned once every task has settled. Skips an input absent
/// from `input_urls` (already handled as "no binding" during sniffing).
///
/// # Errors
///
/// Returns the first fetch failure, if any.
pub async fn fetch_inputs(resolved: &[ResolvedPath], input_urls: &HashMap<String, String>) -> Result<(), WorkerError> {
    let tasks = resolved.iter().cloned().map(|resolved| {
        let url = input_urls.get(&resolved.port_name).cloned();
        tokio::spawn(async move {
            let Some(url) = url else { return Ok(()) };
            fetch_to_file(&url, &resolved.host_path)
                .await
                .map_err(|message| WorkerError::InputFetchFailed { name: resolved.port_name, message })
        })
    });

    let joined = futures::future::try_join_all(tasks)
        .await
        .map_err(|e| WorkerError::InputFetchFailed { name: "<join>".to_string(), message: e.to_string() })?;
    joined.into_iter().collect::<Result<Vec<()>, WorkerError>>()?;
    Ok(())
}

async fn fetch_to_file(url: &str, host_path: &str) -> Result<(), String> {
    use futures::StreamExt;
    use tokio::io::AsyncWriteExt;

    let response = reqwest::get(url).await.map_err(|e| e.to_string())?;
    let mut stream = response.bytes_stream();
    let mut file = tokio::fs::File::create(host_path).await.map_err(|e| e.to_string())?;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| e.to_string())?;
        file.write_all(&chunk).await.map_err(|e| e.to_string())?;
    }
    Ok(())
}

fn extension_for_mime(mime: &str) -> Option<&'static str> {
    mime_guess::get_mime_extensions_str(mime).and_then(|exts| exts.first().copied())
}

async fn fetch_prefix(url: &str) -> Result<Vec<u8>, String> {
    use futures::StreamExt;

    let response = reqwest::get(url).await.map_err(|e| e.to_string())?;
    let mut stream = response.bytes_stream();
    let mut buf = Vec::with_capacity(SNIFF_BYTES);
    while buf.len() < SNIFF_BYTES {
        match stream.next().await {
            Some(Ok(chunk)) => buf.extend_from_slice(&chunk),
            Some(Err(e)) => return Err(e.to_string()),
            None => break,
        }
    }
    buf.truncate(SNIFF_BYTES);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowline_flow::{Command, PortBinding, PortDef};
    use std::collections::HashMap as Map;

    fn node_def_with_input(required: bool, mime_types: Vec<&str>) -> NodeDef {
        NodeDef {
            publisher: "acme".into(),
            name: "n".into(),
            image: "acme/n:1.0".into(),
            inputs: vec![PortDef {
                name: "in".into(),
                description: String::new(),
                required,
                mime_types: mime_types.into_iter().map(String::from).collect(),
            }],
            outputs: vec![PortDef {
                name: "out".into(),
                description: String::new(),
                required: true,
                mime_types: vec!["image/png".into()],
            }],
            flags: vec![],
            command: Command { name: "run".into(), description: String::new(), exec: "run".into() },
            tier: "c-small".into(),
            max_attempts: 3,
        }
    }

    #[tokio::test]
    async fn missing_required_input_is_an_error() {
        let def = node_def_with_input(true, vec!["image/*"]);
        let node = flowline_flow::Node {
            id: flowline_flow::NodeId::new("a"),
            uses: "acme/n".into(),
            inputs: vec![PortBinding::new("in", "e_in")],
            outputs: vec![],
            flags: Map::new(),
        };
        let err = prepare_inputs(&def, &node, &Map::new()).await.unwrap_err();
        assert!(matches!(err, WorkerError::MissingRequiredInput { .. }));
    }

    #[tokio::test]
    async fn missing_optional_input_is_skipped() {
        let def = node_def_with_input(false, vec!["image/*"]);
        let node = flowline_flow::Node {
            id: flowline_flow::NodeId::new("a"),
            uses: "acme/n".into(),
            inputs: vec![PortBinding::new("in", "e_in")],
            outputs: vec![],
            flags: Map::new(),
        };
        let resolved = prepare_inputs(&def, &node, &Map::new()).await.unwrap();
        assert!(resolved.is_empty());
    }

    #[test]
    fn single_mime_output_resolves_an_extension() {
        let def = node_def_with_input(true, vec!["image/*"]);
        let outputs = prepare_outputs(&def);
        let out = outputs.iter().find(|o| o.port_name == "out").unwrap();
        assert!(out.host_path.ends_with(".png"));
    }

    #[test]
    fn extension_lookup_resolves_common_types() {
        assert_eq!(extension_for_mime("image/png"), Some("png"));
    }

    #[tokio::test]
    async fn fetch_inputs_skips_ports_with_no_url() {
        let resolved = vec![ResolvedPath { port_name: "in".to_string(), host_path: "/tmp/unused".to_string() }];
        fetch_inputs(&resolved, &Map::new()).await.unwrap();
    }
}
