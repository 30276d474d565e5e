use std::sync::Arc;

use hostbridge_frame::Message;
use hostbridge_peer::{
    AckPolicy, ChannelHandler, ControlCommand, ControlConfig, ControlEvent, ControlServer,
};
use tracing::{info, warn};

use crate::cmd::{runtime, ServeArgs};
use crate::exit::{peer_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_control_event, print_listening, OutputFormat};

pub fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let ack = parse_ack(&args.ack)?;
    let store = args.store.open()?;

    let mut config = ControlConfig::new(store.clone())
        .with_host(args.host)
        .with_max_probes(args.max_probes)
        .with_ack(ack)
        .with_keepalive(!args.no_keepalive);
    if let Some(port) = args.port {
        config = config.with_port(port);
    }

    runtime()?.block_on(async move {
        let (handler, mut events) = ChannelHandler::channel();
        let server = ControlServer::start(config, Arc::new(handler))
            .await
            .map_err(|err| peer_error("control server failed to start", err))?;

        print_listening(
            server.local_addr(),
            &store.path().display().to_string(),
            format,
        );

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);
        let mut inbound = 0usize;

        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else {
                        break;
                    };
                    print_control_event(&event, format);
                    match &event {
                        ControlEvent::Connected(peer) => {
                            if let Some(verb) = &args.greet {
                                if !server.send_message(&Message::new(verb.clone())) {
                                    warn!(%peer, %verb, "greeting not delivered");
                                }
                            }
                        }
                        ControlEvent::Command { command: ControlCommand::Quit, .. } => {
                            info!("quit received, stopping");
                            break;
                        }
                        ControlEvent::Command { .. } | ControlEvent::Unhandled(_) => {
                            inbound += 1;
                            if args.count.is_some_and(|count| inbound >= count) {
                                break;
                            }
                        }
                        ControlEvent::Disconnected(_) => {}
                    }
                }
                _ = &mut ctrl_c => {
                    info!("interrupted, stopping");
                    break;
                }
            }
        }

        server.shutdown().await;
        Ok::<_, CliError>(SUCCESS)
    })
}

fn parse_ack(value: &str) -> CliResult<AckPolicy> {
    match value.trim() {
        "" => Err(CliError::new(USAGE, "--ack must not be empty")),
        "echo" => Ok(AckPolicy::Echo),
        "none" => Ok(AckPolicy::Disabled),
        verb => Ok(AckPolicy::Fixed(verb.to_string())),
    }
}
