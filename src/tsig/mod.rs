//! Signing and verifying message exchanges with TSIG.
//!
//! TSIG, defined in [RFC 8945], authenticates DNS messages with a secret
//! shared between two parties. The sender computes an HMAC over the
//! message and appends it as a [TSIG] record to the additional section.
//! The receiver recomputes the HMAC with its copy of the secret. Answers
//! include the MAC of the request in their own MAC, so an answer can only
//! be valid for the request it claims to answer.
//!
//! The SHA-based algorithms of [RFC 4635] are available through
//! [`Algorithm`]. A [`Key`] binds the secret to one algorithm and to the
//! key name carried in the record, and holds the local policy on
//! truncated MACs.
//!
//! An exchange is driven by one of four types, depending on the role and
//! on whether the answer is a single message or a stream of them as in a
//! zone transfer:
//!
//! | role   | single answer           | sequence of answers  |
//! |--------|-------------------------|----------------------|
//! | client | [`ClientTransaction`]   | [`ClientSequence`]   |
//! | server | [`ServerTransaction`]   | [`ServerSequence`]   |
//!
//! The MAC covers the octets as they travel on the wire. Signing therefore
//! turns a [`Message`] into its signed wire format and verifying takes the
//! received octets and returns the decoded message without the TSIG
//! record.
//!
//! For a single message outside of any exchange, [`sign_message`] and
//! [`verify_message`] are available.
//!
//! [RFC 4635]: https://tools.ietf.org/html/rfc4635
//! [RFC 8945]: https://tools.ietf.org/html/rfc8945
//! [TSIG]: crate::rdata::Tsig

use crate::base::header::{Header, HeaderCounts};
use crate::base::iana::{Class, Rcode, TsigRcode};
use crate::base::message::Message;
use crate::base::name::Name;
use crate::base::question::Question;
use crate::base::record::Record;
use crate::base::wire::{ComposeError, Composer, ParseError, Parser};
use crate::rdata::tsig::{Time48, Tsig};
use bytes::Bytes;
use core::{cmp, fmt, mem, str};
use ring::{constant_time, hmac};
use std::collections::HashMap;
use std::vec::Vec;

/// The fudge recommended by the RFC.
pub const DEFAULT_FUDGE: u16 = 300;

//------------ Key -----------------------------------------------------------

/// A TSIG key.
///
/// Besides the secret, a key knows its name and the algorithm it is used
/// with. It also carries the truncation policy: received MACs shorter
/// than [`min_mac_len`][Self::min_mac_len] are rejected and MACs created
/// with the key are cut to [`signing_len`][Self::signing_len] octets.
#[derive(Debug)]
pub struct Key {
    key: hmac::Key,
    algorithm: Algorithm,
    name: Name,

    /// Shortest acceptable received MAC.
    ///
    /// Always within [`Algorithm::within_len_bounds`].
    min_mac_len: usize,

    /// Length of the MACs we create.
    signing_len: usize,
}

/// # Creating Keys
///
impl Key {
    /// Creates a key.
    ///
    /// Without explicit lengths, MACs are neither truncated nor accepted
    /// truncated. Explicit lengths must lie between the larger of 10 and
    /// half the native MAC length and the native MAC length itself.
    pub fn new(
        algorithm: Algorithm,
        key: &[u8],
        name: Name,
        min_mac_len: Option<usize>,
        signing_len: Option<usize>,
    ) -> Result<Self, NewKeyError> {
        let (min_mac_len, signing_len) =
            Self::calculate_bounds(algorithm, min_mac_len, signing_len)?;
        Ok(Key {
            key: hmac::Key::new(algorithm.into_hmac_algorithm(), key),
            algorithm,
            name,
            min_mac_len,
            signing_len,
        })
    }

    fn calculate_bounds(
        algorithm: Algorithm,
        min_mac_len: Option<usize>,
        signing_len: Option<usize>,
    ) -> Result<(usize, usize), NewKeyError> {
        let min_mac_len = match min_mac_len {
            Some(len) => {
                if !algorithm.within_len_bounds(len) {
                    return Err(NewKeyError::BadMinMacLen);
                }
                len
            }
            None => algorithm.native_len(),
        };
        let signing_len = match signing_len {
            Some(len) => {
                if !algorithm.within_len_bounds(len) {
                    return Err(NewKeyError::BadSigningLen);
                }
                len
            }
            None => algorithm.native_len(),
        };
        Ok((min_mac_len, signing_len))
    }

    fn signing_context(&self) -> hmac::Context {
        hmac::Context::with_key(&self.key)
    }

    /// Returns the possibly truncated slice of the signature.
    fn signature_slice<'a>(&self, signature: &'a hmac::Tag) -> &'a [u8] {
        &signature.as_ref()[..self.signing_len]
    }
}

/// # Properties
///
impl Key {
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    /// The full length of the algorithm’s MAC.
    pub fn native_len(&self) -> usize {
        self.algorithm.native_len()
    }

    /// Received MACs shorter than this are rejected.
    pub fn min_mac_len(&self) -> usize {
        self.min_mac_len
    }

    /// The length of the MACs this key produces.
    pub fn signing_len(&self) -> usize {
        self.signing_len
    }

    /// Checks that a record names this key and its algorithm.
    fn check_tsig(&self, tsig: &MessageTsig) -> Result<(), ValidationError> {
        if tsig.owner != self.name
            || *tsig.data.algorithm() != self.algorithm.to_name()
        {
            Err(ValidationError::BadKey)
        } else {
            Ok(())
        }
    }

    /// Compares a received MAC to the one we calculated.
    ///
    /// A truncated MAC is compared against the same prefix of ours if it
    /// isn’t shorter than the key allows.
    fn compare_signatures(
        &self,
        expected: &hmac::Tag,
        provided: &[u8],
    ) -> Result<(), ValidationError> {
        if provided.len() < self.min_mac_len {
            return Err(ValidationError::BadTrunc);
        }
        let expected = if provided.len() < expected.as_ref().len() {
            &expected.as_ref()[..provided.len()]
        } else {
            expected.as_ref()
        };
        constant_time::verify_slices_are_equal(expected, provided)
            .map_err(|_| ValidationError::BadSig)
    }

    /// Returns the length of the TSIG record created by this key.
    fn tsig_len(&self, other: bool) -> usize {
        self.name.len()
            + 10 // type, class, TTL, rdlen
            + self.algorithm.into_wire_slice().len()
            + 6 // time signed
            + 2 // fudge
            + 2 + self.signing_len
            + 2 // original ID
            + 2 // error
            + 2 + if other { 6 } else { 0 }
    }

    /// Appends the TSIG record with an already truncated `mac` to `wire`
    /// and bumps ARCOUNT.
    fn complete_message(
        &self,
        wire: &mut Vec<u8>,
        variables: &Variables,
        mac: &[u8],
    ) -> Result<(), ComposeError> {
        let original_id = u16::from_be_bytes([wire[0], wire[1]]);
        let record = variables.to_record(self, mac, original_id);
        let mut target = Composer::new();
        record.compose(&mut target)?;
        wire.extend_from_slice(target.as_slice());
        increment_arcount(wire)
    }
}

//--- AsRef

impl AsRef<Key> for Key {
    fn as_ref(&self) -> &Self {
        self
    }
}

//------------ KeyStore ------------------------------------------------------

/// The keys a server accepts.
///
/// Servers look up the key of a signed request by name and algorithm. The
/// associated `Key` type lets a store hand out shared keys, such as an
/// `Arc<Key>`. A single key is a store containing only itself. A
/// `HashMap` keyed by name and algorithm is a store, too.
pub trait KeyStore {
    type Key: AsRef<Key>;

    fn get_key(&self, name: &Name, algorithm: Algorithm) -> Option<Self::Key>;
}

impl<K: AsRef<Key> + Clone> KeyStore for K {
    type Key = Self;

    fn get_key(&self, name: &Name, algorithm: Algorithm) -> Option<Self::Key> {
        if self.as_ref().name() == name
            && self.as_ref().algorithm() == algorithm
        {
            Some(self.clone())
        } else {
            None
        }
    }
}

impl<K, S> KeyStore for HashMap<(Name, Algorithm), K, S>
where
    K: AsRef<Key> + Clone,
    S: core::hash::BuildHasher,
{
    type Key = K;

    fn get_key(&self, name: &Name, algorithm: Algorithm) -> Option<Self::Key> {
        self.get(&(name.clone(), algorithm)).cloned()
    }
}

//------------ ClientTransaction ---------------------------------------------

/// The client side of a signed request with a single answer.
///
/// [`request`][Self::request] produces the signed request and the
/// transaction. Every candidate answer is then passed to
/// [`answer`][Self::answer]. A rejected answer leaves the transaction
/// usable for the next one.
#[derive(Clone, Debug)]
pub struct ClientTransaction<K> {
    context: SigningContext<K>,
}

impl<K: AsRef<Key>> ClientTransaction<K> {
    /// Signs a request using [`DEFAULT_FUDGE`].
    pub fn request(
        key: K,
        message: &Message,
        now: Time48,
    ) -> Result<(Vec<u8>, Self), ComposeError> {
        Self::request_with_fudge(key, message, now, DEFAULT_FUDGE)
    }

    /// Signs a request allowing the server’s clock to be off by `fudge`
    /// seconds.
    pub fn request_with_fudge(
        key: K,
        message: &Message,
        now: Time48,
        fudge: u16,
    ) -> Result<(Vec<u8>, Self), ComposeError> {
        let (wire, context) =
            SigningContext::sign_request(key, message, now, fudge)?;
        Ok((wire, ClientTransaction { context }))
    }

    /// Checks a received answer.
    ///
    /// On success, returns the decoded answer without its TSIG record and
    /// with the original message ID.
    pub fn answer(
        &self,
        wire: &[u8],
        now: Time48,
    ) -> Result<Message, ValidationError> {
        let mut message = Message::from_octets(wire)?;
        let tsig = match self.context.get_answer_tsig(&message, wire)? {
            Some(some) => some,
            None => return Err(ValidationError::ServerUnsigned),
        };
        let header = tsig.signed_header(wire);
        let signature = self.context.answer(
            &[&header[..], &wire[HEADER_LEN..tsig.start]],
            &tsig.variables(),
        );
        self.context
            .key()
            .compare_signatures(&signature, tsig.data.mac())?;
        self.context.check_answer_time(&message, &tsig, now)?;
        remove_tsig(tsig.data.original_id(), &mut message);
        Ok(message)
    }

    pub fn key(&self) -> &Key {
        self.context.key()
    }
}

//------------ ServerTransaction ---------------------------------------------

/// The server side of a signed request with a single answer.
#[derive(Clone, Debug)]
pub struct ServerTransaction<K> {
    context: SigningContext<K>,
}

impl<K: AsRef<Key>> ServerTransaction<K> {
    /// Verifies a received request.
    ///
    /// `message` must be the decoded form of `wire`. If it has no TSIG
    /// record, returns `Ok(None)`. If it is correctly signed by a key from
    /// `store`, the record is removed from `message` and the transaction
    /// returned. Otherwise the error describes the answer the client
    /// should receive, see [`ServerError::build_message`].
    pub fn request<Store>(
        store: &Store,
        message: &mut Message,
        wire: &[u8],
        now: Time48,
    ) -> Result<Option<Self>, ServerError<K>>
    where
        Store: KeyStore<Key = K>,
    {
        SigningContext::server_request(store, message, wire, now).map(
            |context| context.map(|context| ServerTransaction { context }),
        )
    }

    /// Returns the signed wire format of the answer.
    pub fn answer(
        self,
        message: &Message,
        now: Time48,
    ) -> Result<Vec<u8>, ComposeError> {
        self.answer_truncated(message, usize::MAX, now)
    }

    /// Returns the signed wire format of the answer, at most `limit` octets
    /// long.
    ///
    /// The answer is truncated before signing so that the TSIG record
    /// always survives.
    pub fn answer_truncated(
        self,
        message: &Message,
        limit: usize,
        now: Time48,
    ) -> Result<Vec<u8>, ComposeError> {
        let variables =
            Variables::new(now, DEFAULT_FUDGE, TsigRcode::NOERROR, None);
        let limit = limit.saturating_sub(self.key().tsig_len(false));
        let mut wire = message.to_wire_truncated(limit)?;
        let (mac, key) = self.context.final_answer(&[wire.as_slice()], &variables);
        let mac = key.as_ref().signature_slice(&mac);
        key.as_ref().complete_message(&mut wire, &variables, mac)?;
        Ok(wire)
    }

    /// The key in use.
    pub fn key(&self) -> &Key {
        self.context.key()
    }
}

//------------ ClientSequence ------------------------------------------------

/// The client side of a signed request with many answers.
///
/// Zone transfers answer a single request with a stream of messages. The
/// MAC of each answer after the first covers the previous MAC and all
/// unsigned messages in between. Call [`done`][Self::done] after the last
/// answer: the stream must end with a signed message.
#[derive(Clone, Debug)]
pub struct ClientSequence<K> {
    context: SigningContext<K>,

    /// No answer has arrived yet.
    first: bool,

    /// Unsigned answers since the last signed one.
    unsigned: usize,
}

impl<K: AsRef<Key>> ClientSequence<K> {
    /// Signs a request using [`DEFAULT_FUDGE`].
    pub fn request(
        key: K,
        message: &Message,
        now: Time48,
    ) -> Result<(Vec<u8>, Self), ComposeError> {
        Self::request_with_fudge(key, message, now, DEFAULT_FUDGE)
    }

    /// Signs a request allowing the server’s clock to be off by `fudge`
    /// seconds.
    pub fn request_with_fudge(
        key: K,
        message: &Message,
        now: Time48,
        fudge: u16,
    ) -> Result<(Vec<u8>, Self), ComposeError> {
        let (wire, context) =
            SigningContext::sign_request(key, message, now, fudge)?;
        Ok((
            wire,
            ClientSequence {
                context,
                first: true,
                unsigned: 0,
            },
        ))
    }

    /// Checks the next answer of the sequence.
    ///
    /// Answers without a TSIG record are accepted as long as no more than
    /// 99 of them follow each other. Their octets go into the MAC of the
    /// next signed answer.
    pub fn answer(
        &mut self,
        wire: &[u8],
        now: Time48,
    ) -> Result<Message, ValidationError> {
        let mut message = Message::from_octets(wire)?;
        if self.first {
            self.answer_first(&mut message, wire, now)?;
        } else {
            self.answer_subsequent(&mut message, wire, now)?;
        }
        Ok(message)
    }

    /// Checks that the sequence may end here.
    ///
    /// This fails unless the last answer was signed.
    pub fn done(self) -> Result<(), ValidationError> {
        if self.first || self.unsigned != 0 {
            Err(ValidationError::TooManyUnsigned)
        } else {
            Ok(())
        }
    }

    fn answer_first(
        &mut self,
        message: &mut Message,
        wire: &[u8],
        now: Time48,
    ) -> Result<(), ValidationError> {
        let tsig = match self.context.get_answer_tsig(message, wire)? {
            Some(some) => some,
            None => return Err(ValidationError::ServerUnsigned),
        };
        let header = tsig.signed_header(wire);
        let signature = self.context.first_answer(
            &[&header[..], &wire[HEADER_LEN..tsig.start]],
            &tsig.variables(),
        );
        self.context
            .key()
            .compare_signatures(&signature, tsig.data.mac())?;
        self.context.apply_signature(tsig.data.mac());
        self.context.check_answer_time(message, &tsig, now)?;
        self.first = false;
        remove_tsig(tsig.data.original_id(), message);
        Ok(())
    }

    fn answer_subsequent(
        &mut self,
        message: &mut Message,
        wire: &[u8],
        now: Time48,
    ) -> Result<(), ValidationError> {
        let tsig = match self.context.get_answer_tsig(message, wire)? {
            Some(tsig) => tsig,
            None => {
                if self.unsigned < 99 {
                    self.context.unsigned_subsequent(wire);
                    self.unsigned += 1;
                    return Ok(());
                } else {
                    return Err(ValidationError::TooManyUnsigned);
                }
            }
        };

        let header = tsig.signed_header(wire);
        let signature = self.context.signed_subsequent(
            &[&header[..], &wire[HEADER_LEN..tsig.start]],
            &tsig.variables(),
        );
        self.context
            .key()
            .compare_signatures(&signature, tsig.data.mac())?;
        self.context.apply_signature(tsig.data.mac());
        self.context.check_answer_time(message, &tsig, now)?;
        self.unsigned = 0;
        remove_tsig(tsig.data.original_id(), message);
        Ok(())
    }

    /// The key in use.
    pub fn key(&self) -> &Key {
        self.context.key()
    }
}

//------------ ServerSequence ------------------------------------------------

/// The server side of a signed request with many answers.
///
/// Every answer gets signed, although [RFC 8945] would allow up to 99
/// unsigned messages between two signed ones.
///
/// [RFC 8945]: https://tools.ietf.org/html/rfc8945
#[derive(Clone, Debug)]
pub struct ServerSequence<K> {
    context: SigningContext<K>,

    /// Nothing has been answered yet.
    first: bool,
}

impl<K: AsRef<Key>> ServerSequence<K> {
    /// Checks a request. See [`ServerTransaction::request`] for the result.
    pub fn request<Store>(
        store: &Store,
        message: &mut Message,
        wire: &[u8],
        now: Time48,
    ) -> Result<Option<Self>, ServerError<K>>
    where
        Store: KeyStore<Key = K>,
    {
        SigningContext::server_request(store, message, wire, now).map(
            |context| {
                context.map(|context| ServerSequence {
                    context,
                    first: true,
                })
            },
        )
    }

    /// Produces the next signed answer of the sequence.
    pub fn answer(
        &mut self,
        message: &Message,
        now: Time48,
    ) -> Result<Vec<u8>, ComposeError> {
        let mut wire = message.to_wire()?;
        let variables =
            Variables::new(now, DEFAULT_FUDGE, TsigRcode::NOERROR, None);
        let mac = if self.first {
            self.first = false;
            self.context.first_answer(&[wire.as_slice()], &variables)
        } else {
            self.context.signed_subsequent(&[wire.as_slice()], &variables)
        };
        let mac = self.key().signature_slice(&mac);
        // The next answer chains this MAC.
        let mac = Bytes::copy_from_slice(mac);
        self.context.apply_signature(&mac);
        self.key().complete_message(&mut wire, &variables, &mac)?;
        Ok(wire)
    }

    /// The key signing the answers.
    pub fn key(&self) -> &Key {
        self.context.key()
    }
}

//------------ Single Messages -----------------------------------------------

/// Signs a single message with `key`.
///
/// Returns the wire format of the message with the TSIG record appended.
pub fn sign_message(
    message: &Message,
    key: &Key,
    now: Time48,
) -> Result<Vec<u8>, ComposeError> {
    ClientTransaction::request(key, message, now).map(|(wire, _)| wire)
}

/// Verifies that a single message has been signed with `key`.
///
/// On success, returns the message with the TSIG record removed.
pub fn verify_message(
    wire: &[u8],
    key: &Key,
    now: Time48,
) -> Result<Message, ValidationError> {
    let mut message = Message::from_octets(wire)?;
    match ServerTransaction::request(&key, &mut message, wire, now) {
        Ok(Some(_)) => Ok(message),
        Ok(None) => Err(ValidationError::Unsigned),
        Err(err) => Err(err.into()),
    }
}

//------------ SigningContext ------------------------------------------------

/// The HMAC state carried from one message of an exchange to the next.
///
/// Each new MAC is fed into a fresh context as soon as it is known, since
/// the MAC of the following message starts with it.
#[derive(Clone, Debug)]
struct SigningContext<K> {
    context: hmac::Context,
    key: K,
}

impl<K: AsRef<Key>> SigningContext<K> {
    /// Checks a request received by a server.
    ///
    /// `Ok(None)` means the request wasn’t signed at all. Errors carry what
    /// is needed to answer the client.
    fn server_request<Store>(
        store: &Store,
        message: &mut Message,
        wire: &[u8],
        now: Time48,
    ) -> Result<Option<Self>, ServerError<Store::Key>>
    where
        Store: KeyStore<Key = K>,
    {
        let tsig = match MessageTsig::from_message(message, wire) {
            Ok(Some(tsig)) => tsig,
            Ok(None) => return Ok(None),
            Err(_) => return Err(ServerError::unsigned(TsigRcode::FORMERR)),
        };

        let algorithm = match Algorithm::from_name(tsig.data.algorithm()) {
            Some(algorithm) => algorithm,
            None => return Err(ServerError::unsigned(TsigRcode::BADKEY)),
        };
        let key = match store.get_key(&tsig.owner, algorithm) {
            Some(key) => key,
            None => return Err(ServerError::unsigned(TsigRcode::BADKEY)),
        };
        let variables = tsig.variables();

        // The MAC is checked before the time.
        let header = tsig.signed_header(wire);
        let (mut context, signature) = Self::request(
            key,
            &[&header[..], &wire[HEADER_LEN..tsig.start]],
            &variables,
        );
        let res = context
            .key
            .as_ref()
            .compare_signatures(&signature, tsig.data.mac());
        if let Err(err) = res {
            return Err(ServerError::unsigned(match err {
                ValidationError::BadTrunc => TsigRcode::BADTRUNC,
                ValidationError::BadKey => TsigRcode::BADKEY,
                _ => TsigRcode::BADSIG,
            }));
        }

        // Keep the request MAC for the answer.
        context.apply_signature(tsig.data.mac());

        if !tsig.data.is_valid_at(now) {
            return Err(ServerError::signed(
                context,
                Variables::new(
                    variables.time_signed,
                    variables.fudge,
                    TsigRcode::BADTIME,
                    Some(now),
                ),
            ));
        }
        remove_tsig(tsig.data.original_id(), message);
        Ok(Some(context))
    }

    /// Extracts the TSIG record from an answer.
    ///
    /// A missing record is `Ok(None)`. BADKEY and BADSIG reported by the
    /// server and a record for some other key are errors.
    fn get_answer_tsig(
        &self,
        message: &Message,
        wire: &[u8],
    ) -> Result<Option<MessageTsig>, ValidationError> {
        let tsig = match MessageTsig::from_message(message, wire)? {
            Some(tsig) => tsig,
            None => return Ok(None),
        };

        if message.header.rcode() == Rcode::NOTAUTH {
            if tsig.data.error() == TsigRcode::BADKEY {
                return Err(ValidationError::ServerBadKey);
            }
            if tsig.data.error() == TsigRcode::BADSIG {
                return Err(ValidationError::ServerBadSig);
            }
        }

        self.key().check_tsig(&tsig)?;
        Ok(Some(tsig))
    }

    /// Checks the time of an answer against `now`.
    fn check_answer_time(
        &self,
        message: &Message,
        tsig: &MessageTsig,
        now: Time48,
    ) -> Result<(), ValidationError> {
        if message.header.rcode() == Rcode::NOTAUTH
            && tsig.data.error() == TsigRcode::BADTIME
        {
            let server = match tsig.data.other_time() {
                Some(time) => time,
                None => return Err(ValidationError::FormErr),
            };
            return Err(ValidationError::ServerBadTime {
                client: tsig.data.time_signed(),
                server,
            });
        }
        if !tsig.data.is_valid_at(now) {
            return Err(ValidationError::BadTime);
        }
        Ok(())
    }
}

impl<K: AsRef<Key>> SigningContext<K> {
    fn new(key: K) -> Self {
        SigningContext {
            context: key.as_ref().signing_context(),
            key,
        }
    }

    fn key(&self) -> &Key {
        self.key.as_ref()
    }

    /// Digests a MAC that has been sent or received.
    ///
    /// The MAC must already be truncated. It is preceded by its length as
    /// a 16 bit big-endian integer.
    fn apply_signature(&mut self, data: &[u8]) {
        self.context.update(&(data.len() as u16).to_be_bytes());
        self.context.update(data);
    }

    /// Signs a request, returning its wire format and the context for the
    /// answers.
    fn sign_request(
        key: K,
        message: &Message,
        now: Time48,
        fudge: u16,
    ) -> Result<(Vec<u8>, Self), ComposeError> {
        let mut wire = message.to_wire()?;
        let variables = Variables::new(now, fudge, TsigRcode::NOERROR, None);
        let (mut context, mac) =
            Self::request(key, &[wire.as_slice()], &variables);
        let mac = context.key().signature_slice(&mac);
        context.apply_signature(mac);
        context.key().complete_message(&mut wire, &variables, mac)?;
        Ok((wire, context))
    }

    /// Starts an exchange with the MAC over a request.
    ///
    /// `parts` are the octets of the request without its TSIG record and
    /// with the original ID. Returns the new context and the MAC. The MAC
    /// itself still has to be applied to the context.
    fn request(
        key: K,
        parts: &[&[u8]],
        variables: &Variables,
    ) -> (Self, hmac::Tag) {
        let context = key.as_ref().signing_context();
        let mac = Digest::Full(variables).finish(key.as_ref(), context, parts);
        (Self::new(key), mac)
    }

    /// Returns the MAC over an answer, leaving the context untouched.
    fn answer(&self, parts: &[&[u8]], variables: &Variables) -> hmac::Tag {
        Digest::Full(variables).finish(self.key(), self.context.clone(), parts)
    }

    /// Returns the MAC over the last answer of a transaction.
    fn final_answer(
        self,
        parts: &[&[u8]],
        variables: &Variables,
    ) -> (hmac::Tag, K) {
        let mac =
            Digest::Full(variables).finish(self.key.as_ref(), self.context, parts);
        (mac, self.key)
    }

    /// Returns the MAC over the first answer of a sequence.
    ///
    /// The context is reset for the next answer.
    fn first_answer(
        &mut self,
        parts: &[&[u8]],
        variables: &Variables,
    ) -> hmac::Tag {
        let context = self.take_context();
        Digest::Full(variables).finish(self.key(), context, parts)
    }

    /// Digests an answer of a sequence that carries no TSIG record.
    fn unsigned_subsequent(&mut self, message: &[u8]) {
        self.context.update(message)
    }

    /// Returns the MAC over a later answer of a sequence.
    ///
    /// Of the variables, only the timers are included. The context is
    /// reset for the next answer.
    fn signed_subsequent(
        &mut self,
        parts: &[&[u8]],
        variables: &Variables,
    ) -> hmac::Tag {
        let context = self.take_context();
        Digest::Timers(variables).finish(self.key(), context, parts)
    }

    /// Replaces the context with a fresh one and returns the old one.
    fn take_context(&mut self) -> hmac::Context {
        let fresh = self.key().signing_context();
        mem::replace(&mut self.context, fresh)
    }
}

/// Which TSIG variables go into a MAC.
#[derive(Clone, Copy)]
enum Digest<'a> {
    Full(&'a Variables),
    Timers(&'a Variables),
}

impl<'a> Digest<'a> {
    fn finish(
        self,
        key: &Key,
        mut context: hmac::Context,
        parts: &[&[u8]],
    ) -> hmac::Tag {
        for part in parts {
            context.update(part);
        }
        match self {
            Digest::Full(variables) => variables.sign(key, &mut context),
            Digest::Timers(variables) => variables.sign_timers(&mut context),
        }
        context.sign()
    }
}

//------------ MessageTsig ---------------------------------------------------

const HEADER_LEN: usize = 12;

/// The TSIG record found at the end of a message.
struct MessageTsig {
    /// The owner name of the record, i.e., the key name.
    owner: Name,

    /// The record data.
    data: Tsig,

    /// The index of the start of the record in the wire format.
    start: usize,
}

impl MessageTsig {
    /// Gets the TSIG record from a message.
    ///
    /// Decoding already made sure that a TSIG record can only be the last
    /// record of the additional section. Its class must be ANY and its TTL
    /// zero.
    fn from_message(
        message: &Message,
        wire: &[u8],
    ) -> Result<Option<Self>, ParseError> {
        let record = match message.tsig() {
            Some(record) => record,
            None => return Ok(None),
        };
        let data = match record.data().as_tsig() {
            Some(data) => data.clone(),
            None => return Ok(None),
        };
        if record.class() != Class::ANY || record.ttl() != 0 {
            return Err(ParseError::form_error("invalid TSIG record"));
        }
        Ok(Some(MessageTsig {
            owner: record.owner().clone(),
            data,
            start: last_record_start(wire)?,
        }))
    }

    fn variables(&self) -> Variables {
        Variables::new(
            self.data.time_signed(),
            self.data.fudge(),
            self.data.error(),
            self.data.other_time(),
        )
    }

    /// Returns the header as it was when the message was signed.
    ///
    /// That is, with the original ID and without the TSIG record.
    fn signed_header(&self, wire: &[u8]) -> [u8; HEADER_LEN] {
        let mut res = [0u8; HEADER_LEN];
        res.copy_from_slice(&wire[..HEADER_LEN]);
        res[..2].copy_from_slice(&self.data.original_id().to_be_bytes());
        if let Some(mut counts) = HeaderCounts::for_message_slice(&res) {
            counts.arcount = counts.arcount.saturating_sub(1);
            counts.write_to_message_slice(&mut res);
        }
        res
    }
}

/// Returns the position of the last record in a message.
fn last_record_start(wire: &[u8]) -> Result<usize, ParseError> {
    let mut parser = Parser::from_ref(wire);
    Header::parse(&mut parser)?;
    let counts = HeaderCounts::parse(&mut parser)?;
    for _ in 0..counts.qdcount {
        Question::parse(&mut parser)?;
    }
    let records = usize::from(counts.ancount)
        + usize::from(counts.nscount)
        + usize::from(counts.arcount);
    for _ in 1..records {
        Record::parse(&mut parser)?;
    }
    Ok(parser.pos())
}

//------------ Variables -----------------------------------------------------

/// The per-message values covered by a MAC besides the message itself.
///
/// Key name and algorithm are taken from the key.
#[derive(Clone, Debug)]
struct Variables {
    time_signed: Time48,
    fudge: u16,
    error: TsigRcode,

    /// Other data, which only ever holds the server time with BADTIME.
    other: Option<Time48>,
}

impl Variables {
    fn new(
        time_signed: Time48,
        fudge: u16,
        error: TsigRcode,
        other: Option<Time48>,
    ) -> Self {
        Variables {
            time_signed,
            fudge,
            error,
            other,
        }
    }

    /// Builds the TSIG record carrying `mac`.
    fn to_record(&self, key: &Key, mac: &[u8], original_id: u16) -> Record {
        let other = match self.other {
            Some(time) => Bytes::copy_from_slice(&time.into_octets()),
            None => Bytes::new(),
        };
        Record::new(
            key.name.clone(),
            Class::ANY,
            0,
            Tsig::new(
                key.algorithm.to_name(),
                self.time_signed,
                self.fudge,
                Bytes::copy_from_slice(mac),
                original_id,
                self.error,
                other,
            ),
        )
    }

    /// Applies the full variables including key information.
    fn sign(&self, key: &Key, context: &mut hmac::Context) {
        context.update(key.name.to_canonical().as_slice());
        // Class ANY, TTL 0.
        context.update(&Class::ANY.to_int().to_be_bytes());
        context.update(&0u32.to_be_bytes());
        context.update(key.algorithm.into_wire_slice());
        context.update(&self.time_signed.into_octets());
        context.update(&self.fudge.to_be_bytes());
        context.update(&self.error.to_int().to_be_bytes());
        match self.other {
            Some(time) => {
                context.update(&6u16.to_be_bytes());
                context.update(&time.into_octets());
            }
            None => context.update(&0u16.to_be_bytes()),
        }
    }

    /// Applies the timers only, as used for subsequent sequence messages.
    fn sign_timers(&self, context: &mut hmac::Context) {
        context.update(&self.time_signed.into_octets());
        context.update(&self.fudge.to_be_bytes());
    }
}

//------------ Algorithm -----------------------------------------------------

/// A TSIG MAC algorithm.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub enum Algorithm {
    #[serde(rename = "hmac-sha1")]
    Sha1,
    #[serde(rename = "hmac-sha256")]
    Sha256,
    #[serde(rename = "hmac-sha384")]
    Sha384,
    #[serde(rename = "hmac-sha512")]
    Sha512,
}

impl Algorithm {
    /// Looks up an algorithm by its name.
    ///
    /// Unknown names give `None`.
    pub fn from_name(name: &Name) -> Option<Self> {
        if name.label_count() != 1 {
            return None;
        }
        match name.first_label().to_ascii_lowercase().as_slice() {
            b"hmac-sha1" => Some(Algorithm::Sha1),
            b"hmac-sha256" => Some(Algorithm::Sha256),
            b"hmac-sha384" => Some(Algorithm::Sha384),
            b"hmac-sha512" => Some(Algorithm::Sha512),
            _ => None,
        }
    }

    fn into_hmac_algorithm(self) -> hmac::Algorithm {
        match self {
            Algorithm::Sha1 => hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY,
            Algorithm::Sha256 => hmac::HMAC_SHA256,
            Algorithm::Sha384 => hmac::HMAC_SHA384,
            Algorithm::Sha512 => hmac::HMAC_SHA512,
        }
    }

    /// Returns an octet slice with the wire-format domain name.
    fn into_wire_slice(self) -> &'static [u8] {
        match self {
            Algorithm::Sha1 => b"\x09hmac-sha1\0",
            Algorithm::Sha256 => b"\x0Bhmac-sha256\0",
            Algorithm::Sha384 => b"\x0Bhmac-sha384\0",
            Algorithm::Sha512 => b"\x0Bhmac-sha512\0",
        }
    }

    /// The algorithm name used in TSIG records.
    pub fn to_name(self) -> Name {
        Name::from_static(self.into_wire_slice())
    }

    /// The length of an untruncated MAC.
    pub fn native_len(self) -> usize {
        self.into_hmac_algorithm().digest_algorithm().output_len()
    }

    /// Returns whether `len` is an acceptable signature length.
    pub fn within_len_bounds(self, len: usize) -> bool {
        len >= cmp::max(10, self.native_len() / 2) && len <= self.native_len()
    }
}

//--- FromStr

impl str::FromStr for Algorithm {
    type Err = AlgorithmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hmac-sha1" => Ok(Algorithm::Sha1),
            "hmac-sha256" => Ok(Algorithm::Sha256),
            "hmac-sha384" => Ok(Algorithm::Sha384),
            "hmac-sha512" => Ok(Algorithm::Sha512),
            _ => Err(AlgorithmError),
        }
    }
}

//--- Display

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            Algorithm::Sha1 => "hmac-sha1",
            Algorithm::Sha256 => "hmac-sha256",
            Algorithm::Sha384 => "hmac-sha384",
            Algorithm::Sha512 => "hmac-sha512",
        })
    }
}

//------------ Helper Functions ----------------------------------------------

fn remove_tsig(original_id: u16, message: &mut Message) {
    message.header.set_id(original_id);
    message.additional.pop();
}

fn increment_arcount(wire: &mut [u8]) -> Result<(), ComposeError> {
    let mut counts =
        HeaderCounts::for_message_slice(wire).ok_or(ComposeError::ShortBuf)?;
    counts.arcount =
        counts.arcount.checked_add(1).ok_or(ComposeError::LongData)?;
    counts.write_to_message_slice(wire);
    Ok(())
}

//============ Error Types ===================================================

//------------ ServerError ---------------------------------------------------

/// A signed request was rejected.
///
/// Use [`build_message`][Self::build_message] for the answer to send.
#[derive(Clone)]
pub struct ServerError<K>(ServerErrorInner<K>);

#[derive(Clone)]
enum ServerErrorInner<K> {
    Unsigned { error: TsigRcode },

    /// BADTIME answers are signed.
    Signed {
        context: SigningContext<K>,
        variables: Variables,
    },
}

impl<K> ServerError<K> {
    fn unsigned(error: TsigRcode) -> Self {
        ServerError(ServerErrorInner::Unsigned { error })
    }

    fn signed(context: SigningContext<K>, variables: Variables) -> Self {
        ServerError(ServerErrorInner::Signed { context, variables })
    }

    pub fn error(&self) -> TsigRcode {
        match self.0 {
            ServerErrorInner::Unsigned { error } => error,
            ServerErrorInner::Signed { ref variables, .. } => variables.error,
        }
    }
}

impl<K: AsRef<Key>> ServerError<K> {
    /// Builds the wire format of the error response to `request`.
    ///
    /// The request must still contain its TSIG record.
    pub fn build_message(
        self,
        request: &Message,
    ) -> Result<Vec<u8>, ComposeError> {
        let mut response = request.make_response();
        response.header.set_rcode(Rcode::NOTAUTH);
        match self.0 {
            ServerErrorInner::Unsigned { error } => {
                if let Some(record) = request.tsig() {
                    if let Some(tsig) = record.data().as_tsig() {
                        response.additional.push(Record::new(
                            record.owner().clone(),
                            Class::ANY,
                            0,
                            Tsig::new(
                                tsig.algorithm().clone(),
                                tsig.time_signed(),
                                tsig.fudge(),
                                Bytes::new(),
                                request.header.id(),
                                error,
                                Bytes::new(),
                            ),
                        ));
                    }
                }
                response.to_wire()
            }
            ServerErrorInner::Signed { context, variables } => {
                let mut wire = response.to_wire()?;
                let (mac, key) = context.final_answer(&[wire.as_slice()], &variables);
                let mac = key.as_ref().signature_slice(&mac);
                key.as_ref().complete_message(&mut wire, &variables, mac)?;
                Ok(wire)
            }
        }
    }
}

//--- From

impl<K> From<ServerError<K>> for ValidationError {
    fn from(err: ServerError<K>) -> Self {
        match err.error() {
            TsigRcode::BADKEY => ValidationError::BadKey,
            TsigRcode::BADSIG => ValidationError::BadSig,
            TsigRcode::BADTRUNC => ValidationError::BadTrunc,
            TsigRcode::BADTIME => ValidationError::BadTime,
            _ => ValidationError::FormErr,
        }
    }
}

//--- Debug, Display, and Error

impl<K> fmt::Debug for ServerError<K> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("ServerError").field(&self.error()).finish()
    }
}

impl<K> fmt::Display for ServerError<K> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "TSIG error {}", self.error())
    }
}

impl<K> std::error::Error for ServerError<K> {}

//------------ NewKeyError ---------------------------------------------------

/// The parameters given to [`Key::new`] are unusable.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NewKeyError {
    BadMinMacLen,
    BadSigningLen,
}

//--- Display and Error

impl fmt::Display for NewKeyError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            NewKeyError::BadMinMacLen => {
                f.write_str("minimum signature length out of bounds")
            }
            NewKeyError::BadSigningLen => {
                f.write_str("created signature length out of bounds")
            }
        }
    }
}

impl std::error::Error for NewKeyError {}

//------------ AlgorithmError ------------------------------------------------

/// A string or name doesn’t name a supported algorithm.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AlgorithmError;

//--- Display and Error

impl fmt::Display for AlgorithmError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("invalid algorithm")
    }
}

impl std::error::Error for AlgorithmError {}

//------------ ValidationError -----------------------------------------------

/// A signed answer failed verification.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ValidationError {
    BadSig,
    BadTrunc,
    BadKey,
    BadTime,
    FormErr,
    Unsigned,
    ServerUnsigned,
    ServerBadKey,
    ServerBadSig,
    ServerBadTime { client: Time48, server: Time48 },
    TooManyUnsigned,
}

//--- From

impl From<ParseError> for ValidationError {
    fn from(_: ParseError) -> Self {
        ValidationError::FormErr
    }
}

//--- Display and Error

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ValidationError::BadSig => f.write_str("bad signature"),
            ValidationError::BadTrunc => f.write_str("short signature"),
            ValidationError::BadKey => f.write_str("unknown key"),
            ValidationError::BadTime => f.write_str("bad time"),
            ValidationError::FormErr => f.write_str("format error"),
            ValidationError::Unsigned => f.write_str("unsigned message"),
            ValidationError::ServerUnsigned => f.write_str("unsigned answer"),
            ValidationError::ServerBadKey => {
                f.write_str("unknown key on server")
            }
            ValidationError::ServerBadSig => {
                f.write_str("server failed to verify MAC")
            }
            ValidationError::ServerBadTime { .. } => {
                f.write_str("server reported bad time")
            }
            ValidationError::TooManyUnsigned => {
                f.write_str("too many unsigned messages")
            }
        }
    }
}

impl std::error::Error for ValidationError {}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use crate::base::iana::Rtype;
    use crate::rdata::A;
    use core::str::FromStr;
    use std::sync::Arc;

    fn key(secret: &[u8]) -> Key {
        Key::new(
            Algorithm::Sha256,
            secret,
            Name::from_str("transfer.key").unwrap(),
            None,
            None,
        )
        .unwrap()
    }

    fn request() -> Message {
        let mut msg = Message::query(Question::new_in(
            Name::from_str("example.com").unwrap(),
            Rtype::AXFR,
        ));
        msg.header.set_id(0x1234);
        msg
    }

    fn answer(request: &Message, count: u8) -> Message {
        let mut msg = request.make_response();
        for i in 0..count {
            msg.answer.push(Record::new(
                Name::from_str("www.example.com").unwrap(),
                Class::IN,
                3600,
                A::new([192, 0, 2, i].into()),
            ));
        }
        msg
    }

    #[test]
    fn transaction() {
        let key = Arc::new(key(b"secret"));
        let mut store = HashMap::new();
        store.insert((key.name().clone(), key.algorithm()), key.clone());
        let now = Time48::from_u64(1_700_000_000);

        let (wire, client) =
            ClientTransaction::request(key.clone(), &request(), now).unwrap();
        let mut received = Message::from_octets(&wire).unwrap();
        assert_eq!(received.additional.len(), 1);
        let server =
            ServerTransaction::request(&store, &mut received, &wire, now)
                .unwrap()
                .unwrap();
        assert_eq!(received, request());

        let wire = server.answer(&answer(&received, 2), now).unwrap();
        let response = client.answer(&wire, now).unwrap();
        assert_eq!(response, answer(&request(), 2));
    }

    #[test]
    fn unsigned_request() {
        let key = key(b"secret");
        let mut msg = request();
        let wire = msg.to_wire().unwrap();
        let res = ServerTransaction::request(
            &&key,
            &mut msg,
            &wire,
            Time48::from_u64(0),
        );
        assert!(matches!(res, Ok(None)));
        assert_eq!(
            verify_message(&wire, &key, Time48::from_u64(0)),
            Err(ValidationError::Unsigned)
        );
    }

    #[test]
    fn mutated_message_fails() {
        let key = key(b"secret");
        let now = Time48::from_u64(1_700_000_000);
        let wire = sign_message(&answer(&request(), 1), &key, now).unwrap();
        assert!(verify_message(&wire, &key, now).is_ok());

        // The ID is replaced by the original ID when verifying.
        for pos in 2..wire.len() {
            let mut mutated = wire.clone();
            mutated[pos] ^= 0x01;
            assert!(verify_message(&mutated, &key, now).is_err(), "{}", pos);
        }
    }

    #[test]
    fn wrong_key_fails() {
        let now = Time48::from_u64(1_700_000_000);
        let wire = sign_message(&request(), &key(b"secret"), now).unwrap();
        assert_eq!(
            verify_message(&wire, &key(b"other secret"), now),
            Err(ValidationError::BadSig)
        );
    }

    #[test]
    fn stale_message_fails() {
        let key = key(b"secret");
        let signed = Time48::from_u64(1_700_000_000);
        let wire = sign_message(&request(), &key, signed).unwrap();
        let late = Time48::from_u64(1_700_000_000 + 300);
        assert!(verify_message(&wire, &key, late).is_ok());
        let late = Time48::from_u64(1_700_000_000 + 301);
        assert_eq!(
            verify_message(&wire, &key, late),
            Err(ValidationError::BadTime)
        );
    }

    #[test]
    fn server_reports_bad_time() {
        let key = key(b"secret");
        let signed = Time48::from_u64(1_700_000_000);
        let now = Time48::from_u64(1_700_001_000);
        let (wire, client) =
            ClientTransaction::request(&key, &request(), signed).unwrap();
        let mut received = Message::from_octets(&wire).unwrap();
        let err = ServerTransaction::request(&&key, &mut received, &wire, now)
            .unwrap_err();
        assert_eq!(err.error(), TsigRcode::BADTIME);
        let response = err.build_message(&received).unwrap();
        assert_eq!(
            client.answer(&response, signed),
            Err(ValidationError::ServerBadTime {
                client: signed,
                server: now
            })
        );
    }

    #[test]
    fn truncated_mac() {
        let long = key(b"secret");
        let short = Key::new(
            Algorithm::Sha256,
            b"secret",
            Name::from_str("transfer.key").unwrap(),
            None,
            Some(16),
        )
        .unwrap();
        let now = Time48::from_u64(1_700_000_000);
        let wire = sign_message(&request(), &short, now).unwrap();
        assert_eq!(
            verify_message(&wire, &long, now),
            Err(ValidationError::BadTrunc)
        );

        let lenient = Key::new(
            Algorithm::Sha256,
            b"secret",
            Name::from_str("transfer.key").unwrap(),
            Some(16),
            None,
        )
        .unwrap();
        assert!(verify_message(&wire, &lenient, now).is_ok());
    }

    #[test]
    fn key_bounds() {
        let name = Name::from_str("key").unwrap();
        assert_eq!(
            Key::new(Algorithm::Sha1, b"", name.clone(), Some(9), None)
                .unwrap_err(),
            NewKeyError::BadMinMacLen
        );
        assert_eq!(
            Key::new(Algorithm::Sha512, b"", name, None, Some(65))
                .unwrap_err(),
            NewKeyError::BadSigningLen
        );
    }

    #[test]
    fn sequence() {
        let key = key(b"secret");
        let now = Time48::from_u64(1_700_000_000);
        let (wire, mut client) =
            ClientSequence::request(&key, &request(), now).unwrap();
        let mut received = Message::from_octets(&wire).unwrap();
        let mut server =
            ServerSequence::request(&&key, &mut received, &wire, now)
                .unwrap()
                .unwrap();

        for count in 1..4 {
            let wire = server.answer(&answer(&received, count), now).unwrap();
            let msg = client.answer(&wire, now).unwrap();
            assert_eq!(msg.answer.len(), usize::from(count));
        }
        client.done().unwrap();
    }

    #[test]
    fn sequence_with_unsigned_end() {
        let key = key(b"secret");
        let now = Time48::from_u64(1_700_000_000);
        let (wire, mut client) =
            ClientSequence::request(&key, &request(), now).unwrap();
        let mut received = Message::from_octets(&wire).unwrap();
        let mut server =
            ServerSequence::request(&&key, &mut received, &wire, now)
                .unwrap()
                .unwrap();

        let first = server.answer(&answer(&received, 1), now).unwrap();
        client.answer(&first, now).unwrap();

        // The final message arrives with its TSIG record stripped.
        let last = answer(&received, 2).to_wire().unwrap();
        client.answer(&last, now).unwrap();
        assert_eq!(client.done(), Err(ValidationError::TooManyUnsigned));
    }

    #[test]
    fn sequence_first_must_be_signed() {
        let key = key(b"secret");
        let now = Time48::from_u64(1_700_000_000);
        let (_, mut client) =
            ClientSequence::request(&key, &request(), now).unwrap();
        let unsigned = answer(&request(), 1).to_wire().unwrap();
        assert_eq!(
            client.answer(&unsigned, now),
            Err(ValidationError::ServerUnsigned)
        );
    }

    #[test]
    fn algorithm_names() {
        for alg in [
            Algorithm::Sha1,
            Algorithm::Sha256,
            Algorithm::Sha384,
            Algorithm::Sha512,
        ] {
            assert_eq!(Algorithm::from_name(&alg.to_name()), Some(alg));
            assert_eq!(Algorithm::from_str(&alg.to_string()), Ok(alg));
        }
        assert_eq!(
            Algorithm::from_name(&Name::from_str("HMAC-SHA256").unwrap()),
            Some(Algorithm::Sha256)
        );
    }
}
