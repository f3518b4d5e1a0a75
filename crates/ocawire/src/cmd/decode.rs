use std::fs;
use std::io::Read;

use ocawire_frame::{Connection, FrameConfig, Pdu};

use crate::cmd::{parse_hex, DecodeArgs};
use crate::exit::{
    frame_error, hex_error, io_error, CliError, CliResult, DATA_INVALID, SUCCESS, USAGE,
};
use crate::output::{print_pdus, OutputFormat, PduOutput};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let wire = resolve_input(&args)?;
    let mut config = FrameConfig::default();
    if let Some(max) = args.max_frame_size {
        config.max_frame_size = max;
    }
    let chunk_size = args
        .chunk_size
        .map_or(wire.len().max(1), |n| usize::try_from(n).unwrap_or(usize::MAX));

    let decoded = reassemble(&wire, chunk_size, config)?;
    print_pdus(&decoded, format);
    Ok(SUCCESS)
}

fn resolve_input(args: &DecodeArgs) -> CliResult<Vec<u8>> {
    if let Some(text) = &args.hex {
        return parse_hex(text).map_err(|err| hex_error("invalid hex argument", err));
    }

    let bytes = match &args.file {
        Some(path) => fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?,
        None => {
            let mut buf = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buf)
                .map_err(|err| io_error("failed reading stdin", err))?;
            buf
        }
    };

    if !args.text {
        return Ok(bytes);
    }
    let text = String::from_utf8(bytes)
        .map_err(|_| CliError::new(USAGE, "hex input is not valid UTF-8"))?;
    parse_hex(&text).map_err(|err| hex_error("invalid hex input", err))
}

/// Push `wire` through a reassembler `chunk_size` bytes at a time.
fn reassemble(wire: &[u8], chunk_size: usize, config: FrameConfig) -> CliResult<Vec<PduOutput>> {
    let mut conn = Connection::with_config(Vec::<Vec<Pdu>>::new(), config);

    for (n, chunk) in wire.chunks(chunk_size).enumerate() {
        let delivered = conn
            .read(chunk)
            .map_err(|err| frame_error("decode failed", err))?;
        tracing::debug!(chunk = n, len = chunk.len(), delivered, "fed chunk");
    }

    if !conn.is_idle() {
        return Err(CliError::new(
            DATA_INVALID,
            format!(
                "decode failed: input ends inside a frame ({} bytes pending)",
                conn.pending_len()
            ),
        ));
    }

    Ok(conn
        .into_handler()
        .iter()
        .enumerate()
        .flat_map(|(frame, pdus)| pdus.iter().map(move |pdu| PduOutput::new(frame, pdu)))
        .collect())
}

#[cfg(test)]
mod tests {
    use ocawire_frame::{encode_message, Command, KeepAlive, Response};

    use super::*;

    fn stream() -> Vec<u8> {
        [
            vec![Pdu::Command(Command::new(7, 1, 2))],
            vec![Pdu::Response(Response::new(1, 0)), Pdu::Response(Response::new(2, 4))],
            vec![Pdu::KeepAlive(KeepAlive::from_secs(3))],
        ]
        .iter()
        .flat_map(|pdus| encode_message(pdus).unwrap())
        .collect()
    }

    #[test]
    fn chunk_size_does_not_change_result() {
        let wire = stream();
        let whole = reassemble(&wire, wire.len(), FrameConfig::default()).unwrap();
        for size in [1, 3, 10, 11, 26] {
            assert_eq!(reassemble(&wire, size, FrameConfig::default()).unwrap(), whole);
        }
        assert_eq!(whole.len(), 4);
        assert_eq!(whole[2].frame, 1);
        assert_eq!(whole[2].status, Some(4));
    }

    #[test]
    fn truncated_input_is_invalid_data() {
        let wire = stream();
        let err = reassemble(&wire[..wire.len() - 1], 8, FrameConfig::default()).unwrap_err();
        assert_eq!(err.code, DATA_INVALID);
        assert!(err.message.contains("pending"));
    }

    #[test]
    fn bad_sync_is_invalid_data() {
        let err = reassemble(&[0u8; 12], 12, FrameConfig::default()).unwrap_err();
        assert_eq!(err.code, DATA_INVALID);
    }

    #[test]
    fn frame_limit_applies() {
        let wire = stream();
        let err = reassemble(&wire, wire.len(), FrameConfig { max_frame_size: 12 }).unwrap_err();
        assert_eq!(err.code, DATA_INVALID);
        assert!(err.message.contains("too large"));
    }
}
