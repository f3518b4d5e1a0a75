use ocawire_frame::{encode_message, Command, HandleAllocator, Pdu};

use crate::cmd::{parse_hex, CommandArgs};
use crate::exit::{frame_error, hex_error, CliResult, SUCCESS};
use crate::output::{print_frame, OutputFormat};

pub fn run(args: CommandArgs, format: OutputFormat) -> CliResult<i32> {
    let pdu = build(&args, &HandleAllocator::new())?;
    let wire = encode_message(std::slice::from_ref(&pdu))
        .map_err(|err| frame_error("encode failed", err))?;
    print_frame(pdu.message_type(), 1, &wire, format);
    Ok(SUCCESS)
}

fn build(args: &CommandArgs, handles: &HandleAllocator) -> CliResult<Pdu> {
    let mut command = Command::new(args.target, args.level, args.index);
    if let Some(text) = &args.params {
        let params = parse_hex(text).map_err(|err| hex_error("invalid --params", err))?;
        command = command.with_parameters(args.param_count.unwrap_or(1), params);
    } else if let Some(count) = args.param_count {
        command.param_count = count;
    }

    Ok(match (args.rrq, args.handle) {
        (false, _) => Pdu::Command(command),
        (true, Some(handle)) => {
            command.handle = handle;
            Pdu::CommandRrq(command)
        }
        (true, None) => handles.request(command),
    })
}

#[cfg(test)]
mod tests {
    use ocawire_frame::{decode_message, FrameError};

    use super::*;

    fn args() -> CommandArgs {
        CommandArgs {
            target: 4096,
            level: 4,
            index: 2,
            rrq: false,
            handle: None,
            params: None,
            param_count: None,
        }
    }

    #[test]
    fn plain_command_has_no_handle() {
        let pdu = build(&args(), &HandleAllocator::new()).unwrap();
        let Pdu::Command(cmd) = &pdu else {
            panic!("expected Command");
        };
        assert_eq!(cmd.handle, 0);
        assert_eq!(cmd.param_count, 0);
        assert_eq!(encode_message(&[pdu]).unwrap().len(), 27);
    }

    #[test]
    fn rrq_allocates_handle() {
        let handles = HandleAllocator::starting_at(41);
        let pdu = build(&CommandArgs { rrq: true, ..args() }, &handles).unwrap();
        let Pdu::CommandRrq(cmd) = pdu else {
            panic!("expected CommandRrq");
        };
        assert_eq!(cmd.handle, 41);
    }

    #[test]
    fn params_default_to_one_and_roundtrip() {
        let pdu = build(
            &CommandArgs {
                params: Some("c0d0 0000".to_string()),
                ..args()
            },
            &HandleAllocator::new(),
        )
        .unwrap();
        let wire = encode_message(std::slice::from_ref(&pdu)).unwrap();
        let (decoded, _) = decode_message(&wire, 0).unwrap().unwrap();
        assert_eq!(decoded, vec![pdu]);
        let Pdu::Command(cmd) = &decoded[0] else {
            unreachable!();
        };
        assert_eq!(cmd.param_count, 1);
        assert_eq!(cmd.parameters.to_bytes().unwrap().as_ref(), &[0xc0, 0xd0, 0, 0]);
    }

    #[test]
    fn explicit_zero_handle_fails_to_encode() {
        let pdu = build(
            &CommandArgs {
                rrq: true,
                handle: Some(0),
                ..args()
            },
            &HandleAllocator::new(),
        )
        .unwrap();
        let err = encode_message(&[pdu]).unwrap_err();
        assert!(matches!(err, FrameError::UnassignedHandle));
    }
}
