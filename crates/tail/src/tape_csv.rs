//! CSV tape format.
//!
//! Header: `slot,clientId,event,size,amount,recipients`. Pull rows leave
//! the trailing fields empty; `recipients` is a space-separated id list.
//! `read_tape` accepts both empty and absent trailing fields, so
//! `parse(format(e)) == e` for every tape event.

use paysim_core::{ClientMsg, TapeEvent};
use paysim_types::MockTx;
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

const HEADER: [&str; 6] = ["slot", "clientId", "event", "size", "amount", "recipients"];

/// Tape I/O errors. Failures are fatal at load time.
#[derive(Debug, thiserror::Error)]
pub enum TapeError {
    #[error("csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("{path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: Box<TapeError>,
    },

    #[error("record {record}: {reason}")]
    Malformed { record: u64, reason: String },
}

fn malformed(record: u64, reason: impl Into<String>) -> TapeError {
    TapeError::Malformed {
        record,
        reason: reason.into(),
    }
}

/// Write a tape to any writer.
pub fn write_tape<W: io::Write>(writer: W, tape: &[TapeEvent]) -> Result<(), TapeError> {
    let mut out = csv::Writer::from_writer(writer);
    out.write_record(HEADER)?;
    for event in tape {
        let slot = event.slot.to_string();
        let client = event.client.to_string();
        match &event.msg {
            ClientMsg::Pull => {
                out.write_record([slot.as_str(), client.as_str(), "pull", "", "", ""])?;
            }
            ClientMsg::NewTx { tx, recipients } => {
                let size = paysim_types::Tx::size(tx).to_string();
                let amount = tx.amount().to_string();
                let recipients = recipients
                    .iter()
                    .map(|r| r.to_string())
                    .collect::<Vec<_>>()
                    .join(" ");
                out.write_record([
                    slot.as_str(),
                    client.as_str(),
                    "new-tx",
                    size.as_str(),
                    amount.as_str(),
                    recipients.as_str(),
                ])?;
            }
            other => {
                return Err(malformed(
                    0,
                    format!("{} events do not belong on a tape", other.msg_kind()),
                ))
            }
        }
    }
    out.flush().map_err(csv::Error::from)?;
    Ok(())
}

/// Read a tape from any reader.
pub fn read_tape<R: io::Read>(reader: R) -> Result<Vec<TapeEvent>, TapeError> {
    let mut input = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let mut tape = Vec::new();
    for (idx, record) in input.records().enumerate() {
        let record = record?;
        let line = idx as u64 + 1;
        let field = |i: usize| record.get(i).unwrap_or("");

        let slot = field(0)
            .parse()
            .map_err(|_| malformed(line, "bad slot number"))?;
        let client = field(1)
            .parse()
            .map_err(|_| malformed(line, "bad client id"))?;

        let msg = match field(2) {
            "pull" => ClientMsg::Pull,
            "new-tx" => {
                let size = field(3)
                    .parse()
                    .map_err(|_| malformed(line, "bad tx size"))?;
                let amount = field(4)
                    .parse()
                    .map_err(|_| malformed(line, "bad tx amount"))?;
                let recipients = field(5)
                    .split_whitespace()
                    .map(|r| r.parse().map_err(|_| malformed(line, "bad recipient id")))
                    .collect::<Result<Vec<_>, _>>()?;
                ClientMsg::NewTx {
                    tx: MockTx::new(client, slot, amount, size),
                    recipients,
                }
            }
            other => return Err(malformed(line, format!("unknown event `{other}`"))),
        };
        tape.push(TapeEvent::new(slot, client, msg));
    }
    Ok(tape)
}

/// Write a tape to a file, wrapping errors with the path.
pub fn save_tape(path: &Path, tape: &[TapeEvent]) -> Result<(), TapeError> {
    let with_path = |source: TapeError| TapeError::File {
        path: path.to_path_buf(),
        source: Box::new(source),
    };
    let file = std::fs::File::create(path)
        .map_err(csv::Error::from)
        .map_err(TapeError::from)
        .map_err(with_path)?;
    write_tape(file, tape).map_err(with_path)?;
    info!(?path, events = tape.len(), "tape written");
    Ok(())
}

/// Load a tape from a file, wrapping errors with the path.
pub fn load_tape(path: &Path) -> Result<Vec<TapeEvent>, TapeError> {
    let with_path = |source: TapeError| TapeError::File {
        path: path.to_path_buf(),
        source: Box::new(source),
    };
    let file = std::fs::File::open(path)
        .map_err(csv::Error::from)
        .map_err(TapeError::from)
        .map_err(with_path)?;
    let tape = read_tape(file).map_err(with_path)?;
    info!(?path, events = tape.len(), "tape loaded");
    Ok(tape)
}
