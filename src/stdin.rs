use crate::{
    call::PlayRequest,
    event::{Event, EventBus},
    script::CallAction,
};
use anyhow::{anyhow, Result};
use tokio::io::{AsyncBufReadExt, BufReader};

pub const HELP_TEXT: &str = r#"
Commands:
  play <file>...      queue files for playback
  replace <file>...   stop playback, then queue files
  stop                stop playback and clear the queue
  hold [<file>...]    replace the hold list (empty clears it)
  debug               print call state
  hangup              end the call"#;

/// Parses one console line. Blank lines parse to `None`.
pub fn parse_command(line: &str) -> Result<Option<CallAction>> {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return Ok(None);
    };
    let args: Vec<String> = words.map(str::to_string).collect();

    let action = match command {
        "play" | "next" => CallAction::Play(files_request(args)?),
        "replace" => CallAction::Play(PlayRequest::ClearThen(Box::new(files_request(args)?))),
        "stop" => CallAction::Play(PlayRequest::Clear),
        "hold" => CallAction::OnHold(args),
        "debug" => CallAction::Debug,
        "hangup" | "quit" => CallAction::Hangup,
        _ => return Err(anyhow!("Unknown command {command:?}")),
    };

    Ok(Some(action))
}

fn files_request(mut args: Vec<String>) -> Result<PlayRequest> {
    match args.len() {
        0 => Err(anyhow!("Expected at least one file")),
        1 => Ok(PlayRequest::File(args.remove(0))),
        _ => Ok(PlayRequest::Files(args)),
    }
}

pub fn init(bus: &EventBus) {
    let bus = bus.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        info!("Reading commands from stdin, type \"help\" for a list");

        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    debug!("stdin closed");
                    break;
                }
                Err(e) => {
                    error!("Error while reading stdin: {:?}", e);
                    break;
                }
            };

            if line.trim() == "help" {
                println!("{HELP_TEXT}");
                continue;
            }

            match parse_command(&line) {
                Ok(Some(action)) => bus.send(Event::Call(action)),
                Ok(None) => {}
                Err(e) => warn!("{e}"),
            }
        }
    });
}
