//! Purpose: Hold top-level CLI command dispatch for `hostbridge`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Every command that starts a bridge shuts it down before returning.
//! Invariants: `call` exits non-zero when the reply is an error or not implemented.

use std::io::BufReader;
use std::time::Duration;

use hostbridge::bridge::{Bridge, standard_registry};
use hostbridge::channel::{self, RequestId, reply_json};
use hostbridge::core::home::HomeLoop;
use hostbridge::core::outcome::{Call, Reply};
use hostbridge::core::value::Value;

use super::*;

pub(super) fn dispatch_command(
    command: Command,
    config: BridgeConfig,
    color_mode: ColorMode,
) -> Result<RunOutcome, Error> {
    match command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "hostbridge", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::Version => {
            emit_version_output(color_mode);
            Ok(RunOutcome::ok())
        }
        Command::Methods => {
            let registry = standard_registry(config.resolver(), config.screen())?;
            let methods = registry
                .iter()
                .map(|capability| {
                    json!({
                        "name": capability.name(),
                        "placement": capability.placement().as_str(),
                    })
                })
                .collect::<Vec<_>>();
            emit_json(
                json!({ "channel": hostbridge::bridge::CHANNEL_NAME, "methods": methods }),
                color_mode,
            );
            Ok(RunOutcome::ok())
        }
        Command::Call {
            method,
            arg_json,
            timeout_ms,
        } => {
            let argument = match arg_json {
                Some(text) => parse_argument(&text)?,
                None => Value::Absent,
            };
            let call = Call::new(method).with_argument(argument);

            let home = HomeLoop::new();
            let bridge = Bridge::start(config, &home)?;
            let result = bridge.call_blocking(&home, call, Duration::from_millis(timeout_ms));
            bridge.shutdown()?;
            let reply = result?;

            let exit_code = match &reply {
                Reply::Success(_) => 0,
                Reply::NotImplemented => to_exit_code(ErrorKind::NotFound),
                Reply::Error { .. } => to_exit_code(ErrorKind::Internal),
            };
            emit_json(reply_json(&RequestId::Null, &reply), color_mode);
            Ok(RunOutcome::with_code(exit_code))
        }
        Command::Serve => {
            let home = HomeLoop::new();
            let bridge = Bridge::start(config, &home)?;
            let result = channel::serve(
                &bridge,
                &home,
                BufReader::new(io::stdin()),
                io::stdout(),
            );
            bridge.shutdown()?;
            result?;
            Ok(RunOutcome::ok())
        }
    }
}

fn parse_argument(text: &str) -> Result<Value, Error> {
    let json: Json = serde_json::from_str(text).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message("invalid --arg-json")
            .with_hint("Provide a single JSON value (e.g. true, \"text\", 3, or [1,2,3]).")
            .with_source(err)
    })?;
    Value::from_json(&json).map_err(|err| {
        let message = err
            .message()
            .map(str::to_string)
            .unwrap_or_else(|| "unsupported --arg-json value".to_string());
        Error::new(ErrorKind::Usage)
            .with_message(message)
            .with_hint("Objects are not supported; arrays must hold integers in 0..=255.")
    })
}
