use std::net::{Ipv4Addr, SocketAddr};

use hostbridge_frame::Message;
use hostbridge_peer::{ControlClient, PONG};
use serde_json::Value;
use tracing::debug;

use crate::cmd::{parse_duration, runtime, SendArgs};
use crate::exit::{peer_error, transport_error, CliError, CliResult, FAILURE, SUCCESS, USAGE};
use crate::output::{print_message, print_raw, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let url = resolve_url(&args)?;
    let message = if args.ping {
        None
    } else {
        Some(build_message(&args)?)
    };

    runtime()?.block_on(async move {
        let mut client = ControlClient::connect_url(&url)
            .await
            .map_err(|err| peer_error("connect failed", err))?;

        match &message {
            None => {
                client
                    .ping(wait_timeout)
                    .await
                    .map_err(|err| peer_error("keepalive failed", err))?;
                print_raw(PONG);
            }
            Some(message) => {
                client
                    .send(message)
                    .await
                    .map_err(|err| peer_error("send failed", err))?;
                if args.wait {
                    match client.recv_timeout(wait_timeout).await {
                        Ok(Some(reply)) => print_message("reply", &reply, format),
                        Ok(None) => {
                            return Err(CliError::new(FAILURE, "server closed before replying"))
                        }
                        Err(err) => return Err(peer_error("receive failed", err)),
                    }
                }
            }
        }

        if let Err(err) = client.close().await {
            debug!(error = %err, "control connection did not close cleanly");
        }
        Ok::<_, CliError>(SUCCESS)
    })
}

fn build_message(args: &SendArgs) -> CliResult<Message> {
    let function = args.function.as_deref().unwrap_or_default().trim();
    if function.is_empty() {
        return Err(CliError::new(USAGE, "--function must not be empty"));
    }

    let mut message = Message::new(function);
    if let Some(data) = &args.data {
        match serde_json::from_str::<Value>(data) {
            Ok(Value::Object(map)) => message = message.with_data(map),
            Ok(_) => return Err(CliError::new(USAGE, "--data must be a JSON object")),
            Err(err) => {
                return Err(CliError::new(USAGE, format!("--data is not valid JSON: {err}")))
            }
        }
    }
    if let Some(id) = &args.id {
        message = message.with_id(id.clone());
    }
    Ok(message)
}

fn resolve_url(args: &SendArgs) -> CliResult<String> {
    let Some(target) = args.target.as_deref().map(str::trim) else {
        let port = args
            .store
            .open()?
            .preferred_port()
            .map_err(|err| transport_error("reading persisted port failed", err))?;
        return Ok(format!("ws://{}:{port}", Ipv4Addr::LOCALHOST));
    };

    if target.starts_with("ws://") || target.starts_with("wss://") {
        return Ok(target.to_string());
    }
    if let Ok(addr) = target.parse::<SocketAddr>() {
        return Ok(format!("ws://{addr}"));
    }
    if let Ok(port) = target.parse::<u16>() {
        return Ok(format!("ws://{}:{port}", Ipv4Addr::LOCALHOST));
    }
    Err(CliError::new(
        USAGE,
        format!("target must be a ws:// URL, host:port, or port: {target}"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::StoreArgs;

    fn args(target: Option<&str>) -> SendArgs {
        SendArgs {
            target: target.map(str::to_string),
            store: StoreArgs {
                config: None,
                app_name: "hostbridge".to_string(),
            },
            function: Some("start".to_string()),
            data: None,
            id: None,
            ping: false,
            wait: false,
            wait_timeout: "5s".to_string(),
        }
    }

    #[test]
    fn target_forms_resolve_to_urls() {
        assert_eq!(resolve_url(&args(Some("9001"))).unwrap(), "ws://127.0.0.1:9001");
        assert_eq!(
            resolve_url(&args(Some("127.0.0.1:8766"))).unwrap(),
            "ws://127.0.0.1:8766"
        );
        assert_eq!(
            resolve_url(&args(Some("ws://localhost:8766"))).unwrap(),
            "ws://localhost:8766"
        );
        assert_eq!(resolve_url(&args(Some("nope"))).unwrap_err().code, USAGE);
    }

    #[test]
    fn missing_target_reads_persisted_port() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shared_config.json");
        std::fs::write(&path, r#"{"port": 9123, "other": true}"#).unwrap();

        let mut send = args(None);
        send.store.config = Some(path);
        assert_eq!(resolve_url(&send).unwrap(), "ws://127.0.0.1:9123");
    }

    #[test]
    fn data_must_be_an_object() {
        let mut send = args(None);
        send.data = Some(r#"{"scene":"main"}"#.to_string());
        send.id = Some("1".to_string());
        let message = build_message(&send).unwrap();
        assert_eq!(message.data_field("scene"), Some(&serde_json::json!("main")));
        assert_eq!(message.id.as_deref(), Some("1"));

        send.data = Some("[1,2]".to_string());
        assert_eq!(build_message(&send).unwrap_err().code, USAGE);
    }
}
