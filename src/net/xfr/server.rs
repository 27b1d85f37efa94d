//! Serving zone transfers.

use crate::base::iana::{Rcode, Rtype};
use crate::base::message::Message;
use crate::base::record::Record;
use crate::base::serial::Serial;
use crate::base::wire::{ComposeError, Composer};
use crate::net::server::error_response;
use crate::utils::config::DefMinMax;
use crate::zonetree::ZoneSnapshot;
use std::vec::Vec;
use tracing::{debug, error};

/// Limit of the size of a single response message.
///
/// The default leaves plenty of room for a TSIG record.
const MAX_MESSAGE_SIZE: DefMinMax<usize> = DefMinMax::new(16_384, 512, 65_000);

//------------ XfrServer -----------------------------------------------------

/// Produces the responses to AXFR and IXFR requests.
///
/// An AXFR is answered with the SOA record of the zone, followed by all
/// other records, followed by the SOA record again, spread over as many
/// messages as necessary.
///
/// Since only the current version of a zone is kept, an IXFR is answered
/// with a single SOA record if the client is up to date and like an AXFR
/// otherwise, as permitted by [RFC 1995, section 4].
///
/// Zones that haven’t been verified are never served.
///
/// [RFC 1995, section 4]: https://tools.ietf.org/html/rfc1995#section-4
#[derive(Clone, Copy, Debug)]
pub struct XfrServer {
    max_message_size: usize,
}

impl XfrServer {
    pub fn new() -> Self {
        XfrServer {
            max_message_size: MAX_MESSAGE_SIZE.default(),
        }
    }

    /// Sets the maximum size of a response message.
    ///
    /// The value is limited to between 512 and 65000 octets.
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = MAX_MESSAGE_SIZE.limit(size);
        self
    }

    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    /// Answers a transfer request for the zone in `snapshot`.
    ///
    /// Returns the response messages in order. Errors are reported as a
    /// single response with the appropriate response code.
    pub fn answer(
        &self,
        request: &Message,
        snapshot: &ZoneSnapshot,
    ) -> Vec<Message> {
        let question = match request.question.as_slice() {
            [question]
                if matches!(question.qtype(), Rtype::AXFR | Rtype::IXFR) =>
            {
                question
            }
            _ => return vec![error_response(request, Rcode::FORMERR)],
        };
        if question.qname() != snapshot.apex()
            || question.qclass() != snapshot.class()
        {
            return vec![error_response(request, Rcode::NOTAUTH)];
        }
        let soa = match snapshot.soa_record() {
            Some(soa) if snapshot.is_correct() => soa,
            _ => {
                debug!("refusing transfer of unverified zone {}", snapshot.apex());
                return vec![error_response(request, Rcode::SERVFAIL)];
            }
        };

        if question.qtype() == Rtype::IXFR {
            let client = request
                .authority
                .iter()
                .find_map(|record| record.data().as_soa())
                .map(|soa| soa.serial());
            if let (Some(client), Some(serial)) = (client, snapshot.serial()) {
                if is_current(client, serial) {
                    let mut response = response(request);
                    response.answer.push(soa.clone());
                    return vec![response];
                }
            }
        }

        match self.full_zone(request, soa, snapshot) {
            Ok(messages) => messages,
            Err(err) => {
                error!("failed to serve zone {}: {}", snapshot.apex(), err);
                vec![error_response(request, Rcode::SERVFAIL)]
            }
        }
    }

    /// Produces the messages of a full zone transfer.
    fn full_zone(
        &self,
        request: &Message,
        soa: &Record,
        snapshot: &ZoneSnapshot,
    ) -> Result<Vec<Message>, ComposeError> {
        let head_len = response(request).to_wire()?.len();
        let records = Some(soa)
            .into_iter()
            .chain(snapshot.records().iter().filter(|record| {
                !(record.rtype() == Rtype::SOA
                    && record.owner() == snapshot.apex())
            }))
            .chain(Some(soa));

        let mut res = Vec::new();
        let mut current = response(request);
        let mut current_len = head_len;
        for record in records {
            let len = record_len(record)?;
            if head_len + len > self.max_message_size {
                return Err(ComposeError::LongData);
            }
            if current_len + len > self.max_message_size {
                res.push(current);
                current = response(request);
                current_len = head_len;
            }
            current.answer.push(record.clone());
            current_len += len;
        }
        res.push(current);
        debug!(
            "serving zone {} in {} messages",
            snapshot.apex(),
            res.len()
        );
        Ok(res)
    }
}

//--- Default

impl Default for XfrServer {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns whether a client with serial `client` has serial `serial`.
fn is_current(client: Serial, serial: Serial) -> bool {
    !serial.is_newer_than(client)
}

/// Returns the uncompressed length of a record.
fn record_len(record: &Record) -> Result<usize, ComposeError> {
    let mut target = Composer::new();
    record.compose(&mut target)?;
    Ok(target.len())
}

/// Creates an empty authoritative response.
fn response(request: &Message) -> Message {
    let mut res = request.make_response();
    res.header.set_aa(true);
    res
}


//============ Testing =======================================================
