//! Interpreting AXFR and IXFR responses.

use super::TransferError;
use crate::base::iana::{Class, Opcode, Rcode, Rtype};
use crate::base::message::Message;
use crate::base::name::Name;
use crate::base::record::Record;
use crate::base::serial::Serial;
use crate::zonetree::{ZoneBuffer, ZoneSnapshot};
use core::mem;
use std::sync::Arc;
use tracing::trace;

//------------ XfrType -------------------------------------------------------

/// The kind of zone transfer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum XfrType {
    Axfr,
    Ixfr,
}

impl XfrType {
    pub fn rtype(self) -> Rtype {
        match self {
            XfrType::Axfr => Rtype::AXFR,
            XfrType::Ixfr => Rtype::IXFR,
        }
    }
}

//------------ XfrOutcome ----------------------------------------------------

/// The result of a complete transfer.
#[derive(Clone, Debug)]
pub enum XfrOutcome {
    /// The zone we have is current and has the given serial.
    UpToDate(Serial),

    /// The complete new contents of the zone.
    Zone(ZoneBuffer),
}

//------------ XfrResponseInterpreter ----------------------------------------

/// Collects the records of a sequence of AXFR or IXFR responses.
///
/// Create an interpreter for each transfer and pass each response message
/// in turn to [`interpret_response`][Self::interpret_response] until it
/// reports that the transfer is finished. Then take the result via
/// [`into_outcome`][Self::into_outcome].
///
/// For an AXFR, the records are collected into an empty [`ZoneBuffer`].
/// For an IXFR, the differences are applied to a copy of the current zone.
/// If the primary answers an IXFR request with the complete zone, it is
/// treated like an AXFR response.
///
/// The interpreter never touches the zone store itself.
#[derive(Debug)]
pub struct XfrResponseInterpreter {
    apex: Name,
    class: Class,
    xfr_type: XfrType,
    capacity: usize,

    /// The current zone for an IXFR.
    base: Option<Arc<ZoneSnapshot>>,

    /// The number of messages processed so far.
    messages: usize,

    stage: Stage,
}

#[derive(Debug)]
enum Stage {
    /// Waiting for the initial SOA.
    Start,

    /// Got the initial SOA of an IXFR response.
    IxfrFirst { first: Record },

    /// Collecting the records of a complete zone.
    Axfr { end: Serial, buffer: ZoneBuffer },

    /// Removing the records of an IXFR difference sequence.
    IxfrDelete { end: Serial, buffer: ZoneBuffer },

    /// Adding the records of an IXFR difference sequence.
    IxfrAdd {
        end: Serial,
        version: Serial,
        buffer: ZoneBuffer,
    },

    /// The transfer is complete.
    Done(XfrOutcome),

    /// The transfer failed.
    Failed,
}

impl XfrResponseInterpreter {
    /// Creates an interpreter for an AXFR of the zone at `apex`.
    pub fn axfr(apex: Name, class: Class, capacity: usize) -> Self {
        XfrResponseInterpreter {
            apex,
            class,
            xfr_type: XfrType::Axfr,
            capacity,
            base: None,
            messages: 0,
            stage: Stage::Start,
        }
    }

    /// Creates an interpreter for an IXFR starting from `base`.
    pub fn ixfr(base: Arc<ZoneSnapshot>, capacity: usize) -> Self {
        XfrResponseInterpreter {
            apex: base.apex().clone(),
            class: base.class(),
            xfr_type: XfrType::Ixfr,
            capacity,
            base: Some(base),
            messages: 0,
            stage: Stage::Start,
        }
    }

    pub fn xfr_type(&self) -> XfrType {
        self.xfr_type
    }

    /// Returns whether the end of the transfer has been seen.
    pub fn is_finished(&self) -> bool {
        matches!(self.stage, Stage::Done(_))
    }

    /// Processes the next response message.
    ///
    /// Returns whether the transfer is finished. Checking that the message
    /// is a response to the request by comparing message IDs is left to
    /// the caller.
    pub fn interpret_response(
        &mut self,
        resp: &Message,
    ) -> Result<bool, TransferError> {
        if self.is_finished() {
            return Err(TransferError::Malformed("message after end of transfer"));
        }
        if matches!(self.stage, Stage::Failed) {
            return Err(TransferError::Malformed("transfer already failed"));
        }
        match self.process_message(resp) {
            Ok(finished) => Ok(finished),
            Err(err) => {
                self.stage = Stage::Failed;
                Err(err)
            }
        }
    }

    /// Returns the result of a finished transfer.
    pub fn into_outcome(self) -> Result<XfrOutcome, TransferError> {
        match self.stage {
            Stage::Done(outcome) => Ok(outcome),
            _ => Err(TransferError::Incomplete),
        }
    }

    fn process_message(&mut self, resp: &Message) -> Result<bool, TransferError> {
        self.check_response(resp)?;
        self.messages += 1;

        for record in &resp.answer {
            if self.is_finished() {
                return Err(TransferError::Malformed("record after end of transfer"));
            }
            self.push(record.clone())?;
        }

        // A first message of an IXFR response consisting of a single SOA
        // that isn’t newer than ours means we are up to date.
        if let Stage::IxfrFirst { ref first } = self.stage {
            let serial = soa_serial(first);
            let local = self.base.as_ref().and_then(|base| base.serial());
            if let (Some(serial), Some(local)) = (serial, local) {
                if self.messages == 1
                    && resp.answer.len() == 1
                    && !serial.is_newer_than(local)
                {
                    trace!("IXFR for {}: up to date at {}", self.apex, serial);
                    self.stage = Stage::Done(XfrOutcome::UpToDate(serial));
                }
            }
        }
        Ok(self.is_finished())
    }

    /// Checks the header of a response.
    ///
    /// This follows the rules in [RFC 5936, section 2.2].
    ///
    /// [RFC 5936, section 2.2]: https://tools.ietf.org/html/rfc5936#section-2.2
    fn check_response(&self, resp: &Message) -> Result<(), TransferError> {
        let header = resp.header;
        if header.rcode() != Rcode::NOERROR {
            return Err(TransferError::Rcode(header.rcode()));
        }
        if !header.qr() || header.opcode() != Opcode::QUERY {
            return Err(TransferError::Malformed("not a response"));
        }
        if header.tc() {
            return Err(TransferError::Malformed("truncated response"));
        }
        if resp.answer.is_empty() {
            return Err(TransferError::Malformed("empty answer section"));
        }
        match resp.question.len() {
            0 if self.messages > 0 => Ok(()),
            1 => {
                let question = &resp.question[0];
                if *question.qname() != self.apex
                    || question.qtype() != self.xfr_type.rtype()
                {
                    Err(TransferError::Malformed("question mismatch"))
                } else {
                    Ok(())
                }
            }
            _ => Err(TransferError::Malformed("bad question count")),
        }
    }

    /// Processes a single record of the answer section.
    fn push(&mut self, record: Record) -> Result<(), TransferError> {
        if record.class() != self.class {
            return Err(TransferError::Malformed("record of wrong class"));
        }
        let serial = if *record.owner() == self.apex {
            soa_serial(&record)
        } else {
            None
        };

        self.stage = match mem::replace(&mut self.stage, Stage::Failed) {
            Stage::Start => {
                let serial = serial
                    .ok_or(TransferError::Malformed("first record not SOA"))?;
                match self.xfr_type {
                    XfrType::Axfr => {
                        let mut buffer = ZoneBuffer::new(self.capacity);
                        buffer.push(record)?;
                        Stage::Axfr { end: serial, buffer }
                    }
                    XfrType::Ixfr => Stage::IxfrFirst { first: record },
                }
            }
            Stage::IxfrFirst { first } => {
                let end = soa_serial(&first)
                    .ok_or(TransferError::Malformed("first record not SOA"))?;
                match serial {
                    Some(serial) if serial != end => {
                        // Start of the first difference sequence.
                        let base = self.base.as_ref().ok_or(
                            TransferError::Malformed("IXFR without base"),
                        )?;
                        if base.serial() != Some(serial) {
                            return Err(TransferError::Malformed(
                                "IXFR does not start at local serial",
                            ));
                        }
                        let mut buffer =
                            ZoneBuffer::from_snapshot(base, self.capacity)?;
                        if !buffer.remove(&record) {
                            return Err(TransferError::Malformed(
                                "IXFR does not start at local SOA",
                            ));
                        }
                        trace!("IXFR for {}: incremental", self.apex);
                        Stage::IxfrDelete { end, buffer }
                    }
                    Some(_) => {
                        // A zone consisting of only the SOA.
                        let mut buffer = ZoneBuffer::new(self.capacity);
                        buffer.push(first)?;
                        Stage::Done(XfrOutcome::Zone(buffer))
                    }
                    None => {
                        trace!("IXFR for {}: full zone", self.apex);
                        let mut buffer = ZoneBuffer::new(self.capacity);
                        buffer.push(first)?;
                        buffer.push(record)?;
                        Stage::Axfr { end, buffer }
                    }
                }
            }
            Stage::Axfr { end, mut buffer } => match serial {
                Some(serial) if serial == end => {
                    Stage::Done(XfrOutcome::Zone(buffer))
                }
                Some(_) => {
                    return Err(TransferError::Malformed(
                        "final SOA does not match",
                    ))
                }
                None => {
                    buffer.push(record)?;
                    Stage::Axfr { end, buffer }
                }
            },
            Stage::IxfrDelete { end, mut buffer } => match serial {
                Some(version) => {
                    buffer.push(record)?;
                    Stage::IxfrAdd {
                        end,
                        version,
                        buffer,
                    }
                }
                None => {
                    if !buffer.remove(&record) {
                        return Err(TransferError::Malformed(
                            "deleted record not in zone",
                        ));
                    }
                    Stage::IxfrDelete { end, buffer }
                }
            },
            Stage::IxfrAdd {
                end,
                version,
                mut buffer,
            } => match serial {
                Some(serial) if serial != version => {
                    return Err(TransferError::Malformed(
                        "difference sequence does not continue",
                    ))
                }
                Some(_) if version == end => {
                    Stage::Done(XfrOutcome::Zone(buffer))
                }
                Some(_) => {
                    // Start of the next difference sequence.
                    if !buffer.remove(&record) {
                        return Err(TransferError::Malformed(
                            "difference sequence does not continue",
                        ));
                    }
                    Stage::IxfrDelete { end, buffer }
                }
                None => {
                    buffer.push(record)?;
                    Stage::IxfrAdd {
                        end,
                        version,
                        buffer,
                    }
                }
            },
            Stage::Done(_) | Stage::Failed => {
                return Err(TransferError::Malformed(
                    "record after end of transfer",
                ))
            }
        };
        Ok(())
    }
}

/// Returns the serial if the record is an SOA record.
fn soa_serial(record: &Record) -> Option<Serial> {
    record.data().as_soa().map(|soa| soa.serial())
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use crate::base::question::Question;
    use crate::rdata::{Soa, A};
    use std::net::Ipv4Addr;
    use std::str::FromStr;

    fn apex() -> Name {
        Name::from_str("example.com").unwrap()
    }

    fn soa(serial: u32) -> Record {
        Record::new(
            apex(),
            Class::IN,
            3600,
            Soa::new(
                Name::from_str("ns.example.com").unwrap(),
                Name::from_str("admin.example.com").unwrap(),
                Serial(serial),
                3600,
                600,
                86400,
                300,
            ),
        )
    }

    fn a(owner: &str, last: u8) -> Record {
        Record::new(
            Name::from_str(owner).unwrap(),
            Class::IN,
            3600,
            A::new(Ipv4Addr::new(192, 0, 2, last)),
        )
    }

    fn response(
        xfr_type: XfrType,
        first: bool,
        answer: Vec<Record>,
    ) -> Message {
        let query = Message::query(Question::new_in(apex(), xfr_type.rtype()));
        let mut resp = query.make_response();
        if !first {
            resp.question.clear();
        }
        resp.answer = answer;
        resp
    }

    fn base(serial: u32) -> Arc<ZoneSnapshot> {
        Arc::new(
            ZoneSnapshot::new(
                apex(),
                Class::IN,
                vec![soa(serial), a("a.example.com", 1), a("b.example.com", 2)],
            )
            .unwrap()
            .into_verified(),
        )
    }

    #[test]
    fn axfr_single_message() {
        let mut interp = XfrResponseInterpreter::axfr(apex(), Class::IN, 10);
        let resp = response(
            XfrType::Axfr,
            true,
            vec![soa(5), a("a.example.com", 1), soa(5)],
        );
        assert!(interp.interpret_response(&resp).unwrap());
        match interp.into_outcome().unwrap() {
            XfrOutcome::Zone(buffer) => {
                assert_eq!(buffer.len(), 2);
                assert_eq!(buffer.serial(), Some(Serial(5)));
            }
            _ => panic!("expected zone"),
        }
    }

    #[test]
    fn axfr_multiple_messages() {
        let mut interp = XfrResponseInterpreter::axfr(apex(), Class::IN, 10);
        assert!(!interp
            .interpret_response(&response(
                XfrType::Axfr,
                true,
                vec![soa(5), a("a.example.com", 1)]
            ))
            .unwrap());
        assert!(!interp
            .interpret_response(&response(
                XfrType::Axfr,
                false,
                vec![a("b.example.com", 1)]
            ))
            .unwrap());
        assert!(interp
            .interpret_response(&response(XfrType::Axfr, false, vec![soa(5)]))
            .unwrap());
        assert!(interp
            .interpret_response(&response(XfrType::Axfr, false, vec![soa(5)]))
            .is_err());
    }

    #[test]
    fn axfr_incomplete() {
        let mut interp = XfrResponseInterpreter::axfr(apex(), Class::IN, 10);
        interp
            .interpret_response(&response(
                XfrType::Axfr,
                true,
                vec![soa(5), a("a.example.com", 1)],
            ))
            .unwrap();
        assert!(matches!(
            interp.into_outcome(),
            Err(TransferError::Incomplete)
        ));
    }

    #[test]
    fn axfr_overflow() {
        let mut interp = XfrResponseInterpreter::axfr(apex(), Class::IN, 2);
        let resp = response(
            XfrType::Axfr,
            true,
            vec![soa(5), a("a.example.com", 1), a("b.example.com", 2), soa(5)],
        );
        assert!(matches!(
            interp.interpret_response(&resp),
            Err(TransferError::Overflow { capacity: 2 })
        ));
    }

    #[test]
    fn axfr_bad_responses() {
        let mut interp = XfrResponseInterpreter::axfr(apex(), Class::IN, 10);
        let mut resp = response(XfrType::Axfr, true, vec![soa(5), soa(5)]);
        resp.header.set_rcode(Rcode::NOTAUTH);
        assert!(matches!(
            interp.interpret_response(&resp),
            Err(TransferError::Rcode(Rcode::NOTAUTH))
        ));

        let mut interp = XfrResponseInterpreter::axfr(apex(), Class::IN, 10);
        let resp = response(XfrType::Axfr, true, vec![a("a.example.com", 1)]);
        assert!(matches!(
            interp.interpret_response(&resp),
            Err(TransferError::Malformed(_))
        ));

        let mut interp = XfrResponseInterpreter::axfr(apex(), Class::IN, 10);
        let resp = response(XfrType::Axfr, false, vec![soa(5), soa(5)]);
        assert!(matches!(
            interp.interpret_response(&resp),
            Err(TransferError::Malformed(_))
        ));

        let mut interp = XfrResponseInterpreter::axfr(apex(), Class::IN, 10);
        let resp = response(XfrType::Axfr, true, vec![soa(5), soa(6)]);
        assert!(matches!(
            interp.interpret_response(&resp),
            Err(TransferError::Malformed(_))
        ));
    }

    #[test]
    fn ixfr_up_to_date() {
        let mut interp = XfrResponseInterpreter::ixfr(base(5), 10);
        assert!(interp
            .interpret_response(&response(XfrType::Ixfr, true, vec![soa(5)]))
            .unwrap());
        assert!(matches!(
            interp.into_outcome(),
            Ok(XfrOutcome::UpToDate(Serial(5)))
        ));
    }

    #[test]
    fn ixfr_incremental() {
        let mut interp = XfrResponseInterpreter::ixfr(base(5), 10);
        let resp = response(
            XfrType::Ixfr,
            true,
            vec![
                soa(7),
                // 5 -> 6: remove a, add c
                soa(5),
                a("a.example.com", 1),
                soa(6),
                a("c.example.com", 3),
                // 6 -> 7: remove b
                soa(6),
                a("b.example.com", 2),
                soa(7),
                soa(7),
            ],
        );
        assert!(interp.interpret_response(&resp).unwrap());
        let buffer = match interp.into_outcome().unwrap() {
            XfrOutcome::Zone(buffer) => buffer,
            _ => panic!("expected zone"),
        };
        assert_eq!(buffer.serial(), Some(Serial(7)));
        let snapshot = buffer.into_snapshot(apex(), Class::IN).unwrap();
        assert_eq!(snapshot.len(), 2);
        let c = Name::from_str("c.example.com").unwrap();
        assert_eq!(snapshot.rrset(&c, Rtype::A).count(), 1);
    }

    #[test]
    fn ixfr_bad_base() {
        let mut interp = XfrResponseInterpreter::ixfr(base(4), 10);
        let resp = response(
            XfrType::Ixfr,
            true,
            vec![soa(7), soa(5), soa(7), soa(7)],
        );
        assert!(matches!(
            interp.interpret_response(&resp),
            Err(TransferError::Malformed(_))
        ));

        // Deleting a record that isn’t there.
        let mut interp = XfrResponseInterpreter::ixfr(base(5), 10);
        let resp = response(
            XfrType::Ixfr,
            true,
            vec![soa(7), soa(5), a("x.example.com", 9), soa(7), soa(7)],
        );
        assert!(matches!(
            interp.interpret_response(&resp),
            Err(TransferError::Malformed(_))
        ));
    }

    #[test]
    fn ixfr_full_zone() {
        let mut interp = XfrResponseInterpreter::ixfr(base(5), 10);
        let resp = response(
            XfrType::Ixfr,
            true,
            vec![soa(9), a("z.example.com", 1), soa(9)],
        );
        assert!(interp.interpret_response(&resp).unwrap());
        match interp.into_outcome().unwrap() {
            XfrOutcome::Zone(buffer) => {
                assert_eq!(buffer.len(), 2);
                assert_eq!(buffer.serial(), Some(Serial(9)));
            }
            _ => panic!("expected zone"),
        }
    }
}
