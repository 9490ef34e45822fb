use anyhow::{Context, bail};
use background_thread::{MessageEnvelope, Origin, WireEnvelope};

/// One line of console input.
#[derive(Debug)]
pub enum ConsoleCommand {
    Start(Option<String>),
    Stop,
    Status,
    Quit,
    /// A wire envelope: posted to the runtime, or routed when it has a target.
    Send(MessageEnvelope),
}

impl ConsoleCommand {
    /// Returns `None` for blank lines.
    pub fn parse(line: &str) -> anyhow::Result<Option<Self>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let Some(directive) = line.strip_prefix(':') else {
            let wire = WireEnvelope::decode(line).context("invalid envelope")?;
            return Ok(Some(Self::Send(wire.into_envelope(Origin::Host))));
        };

        let mut words = directive.split_whitespace();
        let command = match words.next() {
            Some("start") => Self::Start(words.next().map(str::to_owned)),
            Some("stop") => Self::Stop,
            Some("status") => Self::Status,
            Some("quit" | "q") => Self::Quit,
            Some(other) => bail!("unknown command `:{other}`"),
            None => bail!("missing command after `:`"),
        };
        if let Some(extra) = words.next() {
            bail!("unexpected argument `{extra}`");
        }
        Ok(Some(command))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> ConsoleCommand {
        ConsoleCommand::parse(line)
            .expect("parse failed")
            .expect("blank line")
    }

    #[test]
    fn blank_lines_are_skipped() {
        assert!(ConsoleCommand::parse("   ").expect("parse").is_none());
    }

    #[test]
    fn directives() {
        assert!(matches!(parse(":start"), ConsoleCommand::Start(None)));
        assert!(matches!(
            parse(":start worker.sh"),
            ConsoleCommand::Start(Some(entry)) if entry == "worker.sh"
        ));
        assert!(matches!(parse(" :stop "), ConsoleCommand::Stop));
        assert!(matches!(parse(":status"), ConsoleCommand::Status));
        assert!(matches!(parse(":q"), ConsoleCommand::Quit));
    }

    #[test]
    fn bad_directives_are_rejected() {
        assert!(ConsoleCommand::parse(":launch").is_err());
        assert!(ConsoleCommand::parse(":").is_err());
        assert!(ConsoleCommand::parse(":stop now").is_err());
    }

    #[test]
    fn envelopes_keep_payload_and_target() {
        let ConsoleCommand::Send(envelope) = parse(r#"{"payload":{"x":1}}"#) else {
            panic!("expected envelope");
        };
        assert_eq!(envelope.payload.as_str(), r#"{"x":1}"#);
        assert!(envelope.target.is_none());
        assert_eq!(envelope.origin, Origin::Host);

        let ConsoleCommand::Send(envelope) = parse(r#"{"payload":[],"target":"sandbox-7"}"#)
        else {
            panic!("expected envelope");
        };
        assert_eq!(
            envelope.target.as_ref().map(|id| id.as_str()),
            Some("sandbox-7")
        );
    }

    #[test]
    fn raw_json_is_not_an_envelope() {
        assert!(ConsoleCommand::parse("not json").is_err());
        assert!(ConsoleCommand::parse(r#"{"x":1}"#).is_err());
    }
}
