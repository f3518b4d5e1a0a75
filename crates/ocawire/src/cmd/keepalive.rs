use std::time::Duration;

use ocawire_frame::{encode_message, KeepAlive, MessageType, Pdu};

use crate::cmd::KeepaliveArgs;
use crate::exit::{frame_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_frame, OutputFormat};

pub fn run(args: KeepaliveArgs, format: OutputFormat) -> CliResult<i32> {
    let interval = parse_interval(&args.interval)?;
    let keepalive =
        KeepAlive::try_from(interval).map_err(|err| frame_error("invalid interval", err))?;
    tracing::debug!(
        interval_ms = keepalive.interval_ms,
        payload_len = keepalive.encoded_length(),
        "encoding keepalive"
    );

    let wire = encode_message(&[Pdu::KeepAlive(keepalive)])
        .map_err(|err| frame_error("encode failed", err))?;
    print_frame(MessageType::KeepAlive, 1, &wire, format);
    Ok(SUCCESS)
}

fn parse_interval(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "interval must not be empty"));
    }

    let (number, to_duration): (&str, fn(u64) -> Duration) =
        if let Some(num) = input.strip_suffix("ms") {
            (num, Duration::from_millis)
        } else if let Some(num) = input.strip_suffix('s') {
            (num, Duration::from_secs)
        } else {
            (input, Duration::from_millis)
        };

    number
        .parse()
        .map(to_duration)
        .map_err(|_| CliError::new(USAGE, format!("invalid interval: {input}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_interval_units() {
        assert_eq!(parse_interval("3s").unwrap(), Duration::from_secs(3));
        assert_eq!(parse_interval("2500ms").unwrap(), Duration::from_millis(2500));
        assert_eq!(parse_interval("2500").unwrap(), Duration::from_millis(2500));
        assert_eq!(parse_interval("0").unwrap(), Duration::ZERO);
    }

    #[test]
    fn parse_interval_rejects_garbage() {
        assert_eq!(parse_interval("").unwrap_err().code, USAGE);
        assert_eq!(parse_interval("soon").unwrap_err().code, USAGE);
        assert_eq!(parse_interval("-1s").unwrap_err().code, USAGE);
    }

    #[test]
    fn interval_beyond_u32_millis_is_usage_error() {
        let err = KeepAlive::try_from(Duration::from_secs(5_000_000))
            .map_err(|err| frame_error("invalid interval", err))
            .unwrap_err();
        assert_eq!(err.code, USAGE);
    }
}
