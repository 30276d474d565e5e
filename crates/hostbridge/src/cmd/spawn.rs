use std::future::pending;

use hostbridge_frame::Message;
use hostbridge_peer::{ShutdownReport, WorkerConfig, WorkerProcess};
use tokio::time::{sleep_until, Instant};
use tracing::info;

use crate::cmd::{parse_duration, runtime, SpawnArgs};
use crate::exit::{frame_error, peer_error, CliError, CliResult, FAILURE, INTERNAL, SUCCESS, USAGE};
use crate::output::{print_exit, print_stream_event, OutputFormat};

pub fn run(args: SpawnArgs, format: OutputFormat) -> CliResult<i32> {
    let grace = parse_duration(&args.grace)?;
    let quit_after = args.quit_after.as_deref().map(parse_duration).transpose()?;
    let commands = args
        .commands
        .iter()
        .map(|raw| Message::from_json(raw).map_err(|err| frame_error("invalid --command", err)))
        .collect::<CliResult<Vec<_>>>()?;

    let mut config = WorkerConfig::new(&args.program)
        .args(&args.args)
        .with_grace_period(grace);
    for pair in &args.env {
        let (key, value) = parse_env(pair)?;
        config = config.env(key, value);
    }

    runtime()?.block_on(async move {
        let (mut worker, mut events) =
            WorkerProcess::spawn(config).map_err(|err| peer_error("spawn failed", err))?;
        info!(pid = ?worker.id(), program = %args.program, "worker started");

        for message in &commands {
            worker
                .send_command(message)
                .await
                .map_err(|err| peer_error("command write failed", err))?;
        }

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);
        let timer = async move {
            match quit_after {
                Some(after) => sleep_until(Instant::now() + after).await,
                None => pending::<()>().await,
            }
        };
        tokio::pin!(timer);

        let mut running = Some(worker);
        let mut stopping = None;

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => print_stream_event(&event, format),
                    None => break,
                },
                _ = &mut ctrl_c, if running.is_some() => {
                    info!("interrupted, shutting worker down");
                    stopping = running.take().map(|worker| tokio::spawn(worker.shutdown()));
                }
                _ = &mut timer, if running.is_some() => {
                    info!("quit timer elapsed, shutting worker down");
                    stopping = running.take().map(|worker| tokio::spawn(worker.shutdown()));
                }
            }
        }

        let report = match (stopping, running) {
            (Some(task), _) => task
                .await
                .map_err(|err| CliError::new(INTERNAL, format!("shutdown task failed: {err}")))?
                .map_err(|err| peer_error("shutdown failed", err))?,
            (None, Some(mut worker)) => {
                let status = worker
                    .wait()
                    .await
                    .map_err(|err| peer_error("wait failed", err))?;
                ShutdownReport {
                    status,
                    cleanup_confirmed: worker.cleanup_confirmed(),
                    forced: false,
                }
            }
            (None, None) => return Err(CliError::new(INTERNAL, "worker handle lost")),
        };

        print_exit(&report, format);
        Ok::<_, CliError>(if report.status.success() { SUCCESS } else { FAILURE })
    })
}

fn parse_env(pair: &str) -> CliResult<(&str, &str)> {
    match pair.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key, value)),
        _ => Err(CliError::new(USAGE, format!("--env expects KEY=VALUE: {pair}"))),
    }
}
