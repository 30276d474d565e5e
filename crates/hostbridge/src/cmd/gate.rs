use hostbridge_gate::{presets, ChannelRegistry, GateError, InteractionMode};
use tracing::warn;

use crate::cmd::GateArgs;
use crate::exit::{gate_error, CliError, CliResult, PERMISSION_DENIED, SUCCESS, USAGE};
use crate::output::{print_gate_rows, GateRow, OutputFormat};

pub fn run(args: GateArgs, format: OutputFormat) -> CliResult<i32> {
    let registry = load_registry(&args)?;
    let modes: Vec<InteractionMode> = match &args.mode {
        Some(modes) => modes.iter().copied().map(Into::into).collect(),
        None => InteractionMode::ALL.to_vec(),
    };

    let rows = check_modes(&registry, &args.channel, &modes);
    print_gate_rows(&rows, format);

    if rows.iter().any(|row| !row.allowed) {
        return Ok(PERMISSION_DENIED);
    }
    Ok(SUCCESS)
}

fn load_registry(args: &GateArgs) -> CliResult<ChannelRegistry> {
    match &args.registry {
        Some(path) => ChannelRegistry::from_file(path)
            .map_err(|err| gate_error("registry load failed", err)),
        None => presets::by_name(&args.preset)
            .ok_or_else(|| CliError::new(USAGE, format!("unknown preset: {}", args.preset))),
    }
}

fn check_modes(
    registry: &ChannelRegistry,
    channel: &str,
    modes: &[InteractionMode],
) -> Vec<GateRow> {
    modes
        .iter()
        .map(|&mode| {
            let reason = match registry.check(mode, channel) {
                Ok(()) => None,
                Err(GateError::AccessDenied { reason, .. }) => {
                    warn!(%mode, channel, %reason, "blocked IPC channel");
                    Some(reason.to_string())
                }
                Err(other) => Some(other.to_string()),
            };
            GateRow {
                channel: channel.to_string(),
                mode: mode.as_str(),
                allowed: reason.is_none(),
                reason,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_preset_rows_per_mode() {
        let registry = presets::shell();
        let rows = check_modes(&registry, "settings.get", &InteractionMode::ALL);
        assert_eq!(rows.len(), 3);
        assert!(rows[0].allowed, "invoke allows the settings. prefix");
        assert!(rows[1].allowed, "send allows the settings. prefix");

        let blocked = check_modes(&registry, "fs.readFile", &[InteractionMode::Invoke]);
        assert!(!blocked[0].allowed);
        assert_eq!(blocked[0].reason.as_deref(), Some("not in allow-list"));
    }

    #[test]
    fn malformed_name_reports_shape_reason() {
        let rows = check_modes(&ChannelRegistry::new(), "bad name!", &[InteractionMode::Send]);
        assert_eq!(rows[0].reason.as_deref(), Some("invalid channel name"));
    }
}
