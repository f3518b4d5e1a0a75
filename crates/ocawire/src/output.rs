use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use ocawire_frame::{MessageType, Pdu};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// Flattened view of one PDU, tagged with the frame it arrived in.
#[derive(Serialize, Debug, Default, PartialEq)]
pub struct PduOutput {
    pub frame: usize,
    pub message_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handle: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval_ms: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub param_count: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<String>,
    #[serde(skip)]
    pub payload: Vec<u8>,
}

impl PduOutput {
    pub fn new(frame: usize, pdu: &Pdu) -> Self {
        let mut out = Self {
            frame,
            message_type: pdu.message_type().name(),
            ..Self::default()
        };
        match pdu {
            Pdu::Command(cmd) | Pdu::CommandRrq(cmd) => {
                if pdu.message_type() == MessageType::CommandRrq {
                    out.handle = Some(cmd.handle);
                }
                out.target = Some(cmd.target);
                out.method = Some(format!("{}.{}", cmd.method_level, cmd.method_index));
                out.param_count = Some(cmd.param_count);
                out.set_params(cmd.parameters.to_bytes().ok().as_deref());
            }
            Pdu::Response(rsp) => {
                out.handle = Some(rsp.handle);
                out.status = Some(rsp.status_code);
                out.param_count = Some(rsp.param_count);
                out.set_params(rsp.parameters.to_bytes().ok().as_deref());
            }
            Pdu::Notification(ntf) => {
                out.target = Some(ntf.target);
                out.method = Some(format!("{}.{}", ntf.method_level, ntf.method_index));
                let event = &ntf.event;
                out.event = Some(format!(
                    "{}:{}.{}",
                    event.emitter_ono, event.event_id.def_level, event.event_id.event_index
                ));
                out.context = ntf.context.as_ref().map(hex::encode);
                out.param_count = Some(ntf.param_count);
                out.set_params(ntf.parameters.to_bytes().ok().as_deref());
            }
            Pdu::KeepAlive(ka) => {
                out.interval_ms = Some(ka.interval_ms);
            }
        }
        out
    }

    fn set_params(&mut self, params: Option<&[u8]>) {
        if let Some(bytes) = params.filter(|b| !b.is_empty()) {
            self.params = Some(hex::encode(bytes));
            self.payload = bytes.to_vec();
        }
    }

    fn summary(&self) -> String {
        let mut parts = Vec::new();
        if let Some(handle) = self.handle {
            parts.push(format!("handle={handle}"));
        }
        if let Some(target) = self.target {
            parts.push(format!("target={target}"));
        }
        if let Some(method) = &self.method {
            parts.push(format!("method={method}"));
        }
        if let Some(status) = self.status {
            parts.push(format!("status={status}"));
        }
        if let Some(event) = &self.event {
            parts.push(format!("event={event}"));
        }
        if let Some(context) = &self.context {
            parts.push(format!("context={context}"));
        }
        if let Some(ms) = self.interval_ms {
            parts.push(format!("interval={ms}ms"));
        }
        if let Some(count) = self.param_count {
            parts.push(format!("params={count}"));
        }
        parts.join(" ")
    }
}

pub fn print_pdus(pdus: &[PduOutput], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            for pdu in pdus {
                println!(
                    "{}",
                    serde_json::to_string(pdu).unwrap_or_else(|_| "{}".to_string())
                );
            }
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FRAME", "TYPE", "FIELDS", "PARAMS"]);
            for pdu in pdus {
                table.add_row(vec![
                    pdu.frame.to_string(),
                    pdu.message_type.to_string(),
                    pdu.summary(),
                    pdu.params.clone().unwrap_or_default(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for pdu in pdus {
                let params = pdu
                    .params
                    .as_deref()
                    .map(|hex| format!(" payload={hex}"))
                    .unwrap_or_default();
                println!(
                    "#{} {} {}{}",
                    pdu.frame,
                    pdu.message_type,
                    pdu.summary(),
                    params
                );
            }
        }
        OutputFormat::Raw => {
            let payload: Vec<u8> = pdus.iter().flat_map(|p| p.payload.iter().copied()).collect();
            print_raw(&payload);
        }
    }
}

#[derive(Serialize)]
struct EncodedOutput<'a> {
    message_type: &'static str,
    pdus: usize,
    length: usize,
    hex: &'a str,
}

/// Print one encoded frame.
pub fn print_frame(message_type: MessageType, pdus: usize, wire: &[u8], format: OutputFormat) {
    let hex = hex::encode(wire);
    match format {
        OutputFormat::Json => {
            let out = EncodedOutput {
                message_type: message_type.name(),
                pdus,
                length: wire.len(),
                hex: &hex,
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["TYPE", "PDUS", "BYTES", "HEX"])
                .add_row(vec![
                    message_type.name().to_string(),
                    pdus.to_string(),
                    wire.len().to_string(),
                    hex,
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{hex}"),
        OutputFormat::Raw => print_raw(wire),
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}
