//! DNSSEC validation.
//!
//! This module verifies RRSIG signatures over record sets and keeps track
//! of which DNSKEYs are currently trusted for which zone.
//!
//! The function [`verify_rrsig`] checks a single signature with a single
//! key. All the checks of [RFC 4035, section 5.3] that can be performed
//! without further context happen here.
//!
//! The [`KeyState`] holds the trusted keys per zone apex. Keys enter the
//! state either as configured trust anchors or through a DNSKEY record set
//! that has been signed by an already trusted key. The state can be saved
//! to and loaded from a file.
//!
//! Authenticated denial of existence via NSEC3 lives in the [nsec3]
//! sub-module.
//!
//! [RFC 4035, section 5.3]: https://tools.ietf.org/html/rfc4035#section-5.3

pub mod nsec3;

use crate::base::iana::{Class, SecAlg};
use crate::base::name::Name;
use crate::base::record::Record;
use crate::base::serial::Serial;
use crate::base::wire::{ComposeError, Composer, ParseError, Parser};
use crate::rdata::{Dnskey, RecordData, Rrsig};
use ring::signature;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::Path;
use std::vec::Vec;
use std::{error, fmt, fs, io};
use tracing::{debug, trace, warn};

//------------ verify_rrsig --------------------------------------------------

/// Verifies a signature over a record set with the given key.
///
/// The records of `rrset` must all have the same owner, class and the type
/// covered by `rrsig`. The signer name must be `apex` which is also taken
/// to be the owner of `dnskey`. The key tag and algorithm of the signature
/// must match the key, the key must be a zone key for protocol 3 and `now`
/// must be within the validity period of the signature.
///
/// If all that holds, the signed data is reconstructed and the signature
/// checked.
pub fn verify_rrsig(
    rrset: &[Record],
    rrsig: &Rrsig,
    apex: &Name,
    dnskey: &Dnskey,
    now: Serial,
) -> Result<(), DnssecError> {
    let first = rrset.first().ok_or(DnssecError::EmptyRrset)?;
    if rrset.iter().any(|record| {
        record.owner() != first.owner()
            || record.class() != first.class()
            || record.rtype() != rrsig.type_covered()
    }) {
        return Err(DnssecError::MixedRrset);
    }
    if !first.owner().ends_with(apex) {
        return Err(DnssecError::OutOfZone);
    }
    if rrsig.signer_name() != apex {
        return Err(DnssecError::SignerMismatch);
    }
    if usize::from(rrsig.labels()) > owner_labels(first.owner()) {
        return Err(DnssecError::BadLabels);
    }
    if rrsig.key_tag() != dnskey.key_tag()
        || rrsig.algorithm() != dnskey.algorithm()
    {
        return Err(DnssecError::KeyMismatch);
    }
    if !dnskey.is_zone_key() || dnskey.protocol() != 3 {
        return Err(DnssecError::NotZoneKey);
    }
    match now.partial_cmp(&rrsig.inception()) {
        Some(Ordering::Greater) | Some(Ordering::Equal) => {}
        _ => return Err(DnssecError::NotYetValid),
    }
    match now.partial_cmp(&rrsig.expiration()) {
        Some(Ordering::Less) | Some(Ordering::Equal) => {}
        _ => return Err(DnssecError::Expired),
    }

    let data = signed_data(rrsig, rrset)?;
    verify_signed_data(rrsig, dnskey, &data).map_err(Into::into)
}

/// Returns the number of labels of an owner name as counted by RRSIG.
///
/// This excludes the root label and a leading asterisk label.
fn owner_labels(owner: &Name) -> usize {
    let count = owner.label_count();
    if owner.is_wildcard() {
        count - 1
    } else {
        count
    }
}

/// Composes the data a signature is calculated over.
///
/// This is the RRSIG record data without the signature followed by the
/// records of the set in canonical form and order, each with the original
/// TTL of the signature. If the records were synthesized from a wildcard,
/// the owner is replaced by the wildcard name.
///
/// The records must form a record set, which isn’t checked here.
pub fn signed_data(
    rrsig: &Rrsig,
    rrset: &[Record],
) -> Result<Vec<u8>, ComposeError> {
    let mut target = Composer::new();
    rrsig.compose_head(&mut target, true)?;

    let mut rdata = rrset
        .iter()
        .map(|record| {
            let mut target = Composer::new();
            record.data().compose_canonical_rdata(&mut target)?;
            Ok((record, target.finish()))
        })
        .collect::<Result<Vec<_>, ComposeError>>()?;
    rdata.sort_by(|left, right| left.1.cmp(&right.1));
    rdata.dedup_by(|left, right| left.1 == right.1);

    for (record, data) in rdata {
        let owner = record.owner();
        let labels = usize::from(rrsig.labels());
        let count = owner.label_count();
        if labels < count {
            target.append_slice(b"\x01*")?;
            match owner.strip_labels(count - labels) {
                Some(name) => target.append_canonical_name(&name)?,
                None => target.append_canonical_name(owner)?,
            }
        } else {
            target.append_canonical_name(owner)?;
        }
        record.rtype().compose(&mut target)?;
        record.class().compose(&mut target)?;
        target.append_slice(&rrsig.original_ttl().to_be_bytes())?;
        target.length_prefixed(|target| target.append_slice(&data))?;
    }
    Ok(target.finish())
}

/// Checks the cryptographic signature over the signed data.
pub fn verify_signed_data(
    rrsig: &Rrsig,
    dnskey: &Dnskey,
    signed_data: &[u8],
) -> Result<(), AlgorithmError> {
    let signature = rrsig.signature().as_ref();

    match rrsig.algorithm() {
        SecAlg::RSASHA1
        | SecAlg::RSASHA1_NSEC3_SHA1
        | SecAlg::RSASHA256
        | SecAlg::RSASHA512 => {
            let algorithm = match rrsig.algorithm() {
                SecAlg::RSASHA256 => {
                    &signature::RSA_PKCS1_1024_8192_SHA256_FOR_LEGACY_USE_ONLY
                }
                SecAlg::RSASHA512 => {
                    &signature::RSA_PKCS1_1024_8192_SHA512_FOR_LEGACY_USE_ONLY
                }
                _ => &signature::RSA_PKCS1_1024_8192_SHA1_FOR_LEGACY_USE_ONLY,
            };

            // Check for minimum supported key size
            if signature.len() < 1024 / 8 {
                return Err(AlgorithmError::Unsupported);
            }

            // The key isn't available in either PEM or DER, so use the
            // direct RSA verifier.
            let (e, n) = rsa_exponent_modulus(dnskey)?;
            let public_key = signature::RsaPublicKeyComponents { n, e };
            public_key
                .verify(algorithm, signed_data, signature)
                .map_err(|_| AlgorithmError::BadSig)
        }
        SecAlg::ECDSAP256SHA256 | SecAlg::ECDSAP384SHA384 => {
            let algorithm = if rrsig.algorithm() == SecAlg::ECDSAP256SHA256 {
                &signature::ECDSA_P256_SHA256_FIXED
            } else {
                &signature::ECDSA_P384_SHA384_FIXED
            };

            // Add 0x4 identifier to the ECDSA pubkey as expected by ring.
            let public_key = dnskey.public_key().as_ref();
            let mut key = Vec::with_capacity(public_key.len() + 1);
            key.push(0x4);
            key.extend_from_slice(public_key);

            signature::UnparsedPublicKey::new(algorithm, &key)
                .verify(signed_data, signature)
                .map_err(|_| AlgorithmError::BadSig)
        }
        SecAlg::ED25519 => {
            let key = dnskey.public_key();
            signature::UnparsedPublicKey::new(&signature::ED25519, key)
                .verify(signed_data, signature)
                .map_err(|_| AlgorithmError::BadSig)
        }
        _ => Err(AlgorithmError::Unsupported),
    }
}

/// Returns the RSA exponent and modulus from DNSKEY record data.
fn rsa_exponent_modulus(
    dnskey: &Dnskey,
) -> Result<(&[u8], &[u8]), AlgorithmError> {
    let public_key = dnskey.public_key().as_ref();
    if public_key.len() <= 3 {
        return Err(AlgorithmError::InvalidData);
    }

    let (pos, exp_len) = match public_key[0] {
        0 => (
            3,
            (usize::from(public_key[1]) << 8) | usize::from(public_key[2]),
        ),
        len => (1, usize::from(len)),
    };

    // Check if there's enough space for exponent and modulus.
    if public_key.len() < pos + exp_len {
        return Err(AlgorithmError::InvalidData);
    };

    Ok(public_key[pos..].split_at(exp_len))
}

//------------ KeyState ------------------------------------------------------

/// The currently trusted DNSKEYs for a set of zones.
///
/// Keys are never trusted on first sight. They are either added explicitly
/// as trust anchors or accepted via [`accept_dnskeys`][Self::accept_dnskeys]
/// if the DNSKEY record set is signed by a key that is already trusted.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct KeyState {
    keys: HashMap<Name, Vec<Dnskey>>,
}

impl KeyState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a trust anchor for the zone at `apex`.
    pub fn add_trust_anchor(&mut self, apex: Name, key: Dnskey) {
        let keys = self.keys.entry(apex).or_default();
        if !keys.contains(&key) {
            keys.push(key)
        }
    }

    /// Returns the trusted keys for the zone at `apex`.
    pub fn keys(&self, apex: &Name) -> &[Dnskey] {
        self.keys.get(apex).map(Vec::as_slice).unwrap_or_default()
    }

    /// Returns whether there are any trusted keys for the zone at `apex`.
    pub fn has_keys(&self, apex: &Name) -> bool {
        !self.keys(apex).is_empty()
    }

    /// Returns an iterator over the zones with trusted keys.
    pub fn zones(&self) -> impl Iterator<Item = &Name> {
        self.keys.keys()
    }

    /// Verifies a record set with the trusted keys of a zone.
    ///
    /// Succeeds if any of the signatures in `rrsigs` that cover the type of
    /// the set validates under a trusted key. If no signature was made by a
    /// trusted key, fails with [`DnssecError::UntrustedKey`], even if the
    /// signature would otherwise be fine.
    pub fn verify_rrset(
        &self,
        apex: &Name,
        rrset: &[Record],
        rrsigs: &[Rrsig],
        now: Serial,
    ) -> Result<(), DnssecError> {
        let rtype = rrset.first().ok_or(DnssecError::EmptyRrset)?.rtype();
        let mut res = Err(DnssecError::Unsigned);
        for rrsig in rrsigs.iter().filter(|sig| sig.type_covered() == rtype) {
            let candidates = self.keys(apex).iter().filter(|key| {
                key.key_tag() == rrsig.key_tag()
                    && key.algorithm() == rrsig.algorithm()
            });
            let mut found = false;
            for key in candidates {
                found = true;
                match verify_rrsig(rrset, rrsig, apex, key, now) {
                    Ok(()) => return Ok(()),
                    Err(err) => {
                        trace!(
                            "RRSIG {} for {} {} failed: {}",
                            rrsig.key_tag(),
                            apex,
                            rtype,
                            err
                        );
                        res = Err(err)
                    }
                }
            }
            if !found && res == Err(DnssecError::Unsigned) {
                res = Err(DnssecError::UntrustedKey)
            }
        }
        res
    }

    /// Accepts a new DNSKEY record set for the zone at `apex`.
    ///
    /// The set has to be signed by a key that is currently trusted. If it
    /// is, the trusted keys for the zone are replaced by the zone keys in
    /// the set that haven’t been revoked. Returns whether the trusted keys
    /// changed.
    pub fn accept_dnskeys(
        &mut self,
        apex: &Name,
        dnskeys: &[Record],
        rrsigs: &[Rrsig],
        now: Serial,
    ) -> Result<bool, DnssecError> {
        if dnskeys.iter().any(|record| record.owner() != apex) {
            return Err(DnssecError::OutOfZone);
        }
        self.verify_rrset(apex, dnskeys, rrsigs, now)?;
        let mut keys: Vec<Dnskey> = Vec::new();
        for key in dnskeys
            .iter()
            .filter_map(|record| record.data().as_dnskey())
            .filter(|key| key.is_zone_key() && !key.is_revoked())
        {
            if !keys.contains(key) {
                keys.push(key.clone())
            }
        }
        let current = self.keys(apex);
        if current.len() == keys.len()
            && keys.iter().all(|key| current.contains(key))
        {
            return Ok(false);
        }
        debug!("accepted {} DNSKEYs for {}", keys.len(), apex);
        self.keys.insert(apex.clone(), keys);
        Ok(true)
    }

    /// Replaces the keys for `apex` with those of `other`.
    pub(crate) fn update_zone(&mut self, apex: &Name, other: &KeyState) {
        match other.keys.get(apex) {
            Some(keys) => {
                self.keys.insert(apex.clone(), keys.clone());
            }
            None => {
                self.keys.remove(apex);
            }
        }
    }

    /// Returns the wire format of the key state.
    ///
    /// This is a sequence of uncompressed DNSKEY records.
    pub fn to_wire(&self) -> Result<Vec<u8>, ComposeError> {
        let mut zones: Vec<_> = self.keys.iter().collect();
        zones.sort_by(|left, right| left.0.cmp(right.0));
        let mut target = Composer::new();
        for (apex, keys) in zones {
            for key in keys {
                Record::new(apex.clone(), Class::IN, 0, key.clone())
                    .compose(&mut target)?;
            }
        }
        Ok(target.finish())
    }

    /// Creates a key state from its wire format.
    pub fn from_wire(octets: &[u8]) -> Result<Self, ParseError> {
        let mut parser = Parser::from_ref(octets);
        let mut res = Self::new();
        while parser.remaining() > 0 {
            let record = Record::parse(&mut parser)?;
            let owner = record.owner().clone();
            match record.into_data() {
                RecordData::Dnskey(key) => res.add_trust_anchor(owner, key),
                _ => {
                    return Err(ParseError::form_error(
                        "non-DNSKEY record in key state",
                    ))
                }
            }
        }
        Ok(res)
    }

    /// Writes the key state to a file.
    ///
    /// The data is written to a temporary file first which then replaces
    /// the file at `path`.
    pub fn save(&self, path: &Path) -> Result<(), io::Error> {
        let data = self
            .to_wire()
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, data)?;
        fs::rename(&tmp, path)?;
        debug!("saved key state to {}", path.display());
        Ok(())
    }

    /// Loads the key state from a file.
    pub fn load(path: &Path) -> Result<Self, io::Error> {
        let data = fs::read(path)?;
        Self::from_wire(&data).map_err(|err| {
            warn!("corrupt key state in {}: {}", path.display(), err);
            io::Error::new(io::ErrorKind::InvalidData, err)
        })
    }
}

//============ Error Types ===================================================

//------------ DnssecError ---------------------------------------------------

/// A record set could not be validated.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DnssecError {
    /// There were no records to validate.
    EmptyRrset,

    /// The records differ in owner, class or type.
    MixedRrset,

    /// The records are not within the zone.
    OutOfZone,

    /// The signer name isn’t the zone apex.
    SignerMismatch,

    /// The labels field is larger than the owner’s label count.
    BadLabels,

    /// Key tag or algorithm of the signature don’t match the key.
    KeyMismatch,

    /// The key isn’t a zone key or for the wrong protocol.
    NotZoneKey,

    /// The signature’s inception is in the future.
    NotYetValid,

    /// The signature has expired.
    Expired,

    /// There was no signature for the record set.
    Unsigned,

    /// None of the signatures was made by a trusted key.
    UntrustedKey,

    /// The signed data could not be assembled.
    LongData,

    /// The cryptographic check failed.
    Algorithm(AlgorithmError),
}

//--- From

impl From<AlgorithmError> for DnssecError {
    fn from(err: AlgorithmError) -> Self {
        DnssecError::Algorithm(err)
    }
}

impl From<ComposeError> for DnssecError {
    fn from(_: ComposeError) -> Self {
        DnssecError::LongData
    }
}

//--- Display and Error

impl fmt::Display for DnssecError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            DnssecError::EmptyRrset => f.write_str("empty record set"),
            DnssecError::MixedRrset => f.write_str("not a record set"),
            DnssecError::OutOfZone => f.write_str("record outside of zone"),
            DnssecError::SignerMismatch => {
                f.write_str("signer name is not the zone apex")
            }
            DnssecError::BadLabels => f.write_str("bad labels field"),
            DnssecError::KeyMismatch => {
                f.write_str("signature not made with key")
            }
            DnssecError::NotZoneKey => f.write_str("not a zone key"),
            DnssecError::NotYetValid => f.write_str("signature not yet valid"),
            DnssecError::Expired => f.write_str("signature expired"),
            DnssecError::Unsigned => f.write_str("no signature"),
            DnssecError::UntrustedKey => {
                f.write_str("signature by untrusted key")
            }
            DnssecError::LongData => f.write_str("long record data"),
            DnssecError::Algorithm(err) => err.fmt(f),
        }
    }
}

impl error::Error for DnssecError {}

//------------ AlgorithmError ------------------------------------------------

/// An algorithm error during verification.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AlgorithmError {
    Unsupported,
    BadSig,
    InvalidData,
}

//--- Display and Error

impl fmt::Display for AlgorithmError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            AlgorithmError::Unsupported => {
                f.write_str("unsupported algorithm")
            }
            AlgorithmError::BadSig => f.write_str("bad signature"),
            AlgorithmError::InvalidData => f.write_str("invalid data"),
        }
    }
}

impl error::Error for AlgorithmError {}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use crate::base::iana::Rtype;
    use crate::rdata::Mx;
    use crate::utils::base64;
    use bytes::Bytes;
    use ring::signature::{Ed25519KeyPair, KeyPair};
    use std::str::FromStr;

    fn name(s: &str) -> Name {
        Name::from_str(s).unwrap()
    }

    fn dnskey_set(owner: &Name, keys: &[&Dnskey]) -> Vec<Record> {
        keys.iter()
            .map(|key| Record::new(owner.clone(), Class::IN, 0, (*key).clone()))
            .collect()
    }

    // Returns the root KSK and ZSK of mid 2019.
    fn root_pubkey() -> (Dnskey, Dnskey) {
        let ksk = base64::decode(
            "\
            AwEAAaz/tAm8yTn4Mfeh5eyI96WSVexTBAvkMgJzkKTOiW1vkIbzxeF3+/\
            4RgWOq7HrxRixHlFlExOLAJr5emLvN7SWXgnLh4+B5xQlNVz8Og8kvArMt\
            NROxVQuCaSnIDdD5LKyWbRd2n9WGe2R8PzgCmr3EgVLrjyBxWezF0jLHwV\
            N8efS3rCj/EWgvIWgb9tarpVUDK/b58Da+sqqls3eNbuv7pr+eoZG+SrDK\
            6nWeL3c6H5Apxz7LjVc1uTIdsIXxuOLYA4/ilBmSVIzuDWfdRUfhHdY6+c\
            n8HFRm+2hM8AnXGXws9555KrUB5qihylGa8subX2Nn6UwNR1AkUTV74bU=",
        )
        .unwrap();
        let zsk = base64::decode(
            "\
            AwEAAeVDC34GZILwsQJy97K2Fst4P3XYZrXLyrkausYzSqEjSUulgh+iLgH\
            g0y7FIF890+sIjXsk7KLJUmCOWfYWPorNKEOKLk5Zx/4M6D3IHZE3O3m/Ea\
            hrc28qQzmTLxiMZAW65MvR2UO3LxVtYOPBEBiDgAQD47x2JLsJYtavCzNL5\
            WiUk59OgvHmDqmcC7VXYBhK8V8Tic089XJgExGeplKWUt9yyc31ra1swJX5\
            1XsOaQz17+vyLVH8AZP26KvKFiZeoRbaq6vl+hc8HQnI2ug5rA2zoz3MsSQ\
            BvP1f/HvqsWxLqwXXKyDD1QM639U+XzVB8CYigyscRP22QCnwKIU=",
        )
        .unwrap();
        (
            Dnskey::new(257, 3, SecAlg::RSASHA256, ksk.into()),
            Dnskey::new(256, 3, SecAlg::RSASHA256, zsk.into()),
        )
    }

    fn root_rrsig() -> Rrsig {
        Rrsig::new(
            Rtype::DNSKEY,
            SecAlg::RSASHA256,
            0,
            172800,
            Serial(1560211200),
            Serial(1558396800),
            20326,
            Name::root(),
            base64::decode(
                "otBkINZAQu7AvPKjr/xWIEE7+SoZtKgF8bzVynX6bfJMJuPay8jPvNmwXk\
                ZOdSoYlvFp0bk9JWJKCh8y5uoNfMFkN6OSrDkr3t0E+c8c0Mnmwkk5CETH3\
                Gqxthi0yyRX5T4VlHU06/Ks4zI+XAgl3FBpOc554ivdzez8YCjAIGx7Xgzz\
                ooEb7heMSlLc7S7/HNjw51TPRs4RxrAVcezieKCzPPpeWBhjE6R3oiSwrl0\
                SBD4/yplrDlr7UHs/Atcm3MSgemdyr2sOoOUkVQCVpcj3SQQezoD2tCM786\
                1CXEQdg5fjeHDtz285xHt5HJpA5cOcctRo4ihybfow/+V7AQ==",
            )
            .unwrap()
            .into(),
        )
    }

    const ROOT_NOW: Serial = Serial(1559000000);

    #[test]
    fn rrsig_verify_rsa_sha256() {
        let (ksk, zsk) = root_pubkey();
        let rrset = dnskey_set(&Name::root(), &[&ksk, &zsk]);
        let rrsig = root_rrsig();
        let root = Name::root();
        assert_eq!(verify_rrsig(&rrset, &rrsig, &root, &ksk, ROOT_NOW), Ok(()));
        assert_eq!(
            verify_rrsig(&rrset, &rrsig, &root, &zsk, ROOT_NOW),
            Err(DnssecError::KeyMismatch)
        );

        // The order of the records doesn’t matter.
        let rrset = dnskey_set(&Name::root(), &[&zsk, &ksk]);
        assert_eq!(verify_rrsig(&rrset, &rrsig, &root, &ksk, ROOT_NOW), Ok(()));
    }

    #[test]
    fn rrsig_validity_period() {
        let (ksk, zsk) = root_pubkey();
        let rrset = dnskey_set(&Name::root(), &[&ksk, &zsk]);
        let rrsig = root_rrsig();
        let root = Name::root();
        assert_eq!(
            verify_rrsig(&rrset, &rrsig, &root, &ksk, Serial(1558396799)),
            Err(DnssecError::NotYetValid)
        );
        assert_eq!(
            verify_rrsig(&rrset, &rrsig, &root, &ksk, Serial(1560211201)),
            Err(DnssecError::Expired)
        );
    }

    #[test]
    fn rrsig_tampered_rrset() {
        let (ksk, zsk) = root_pubkey();
        let mut rrset = dnskey_set(&Name::root(), &[&ksk, &zsk]);
        rrset.pop();
        assert_eq!(
            verify_rrsig(&rrset, &root_rrsig(), &Name::root(), &ksk, ROOT_NOW),
            Err(DnssecError::Algorithm(AlgorithmError::BadSig))
        );
    }

    #[test]
    fn rrsig_verify_ecdsap256_sha256() {
        let ksk = Dnskey::new(
            257,
            3,
            SecAlg::ECDSAP256SHA256,
            base64::decode(
                "mdsswUyr3DPW132mOi8V9xESWE8jTo0dxCjjnopKl+GqJxpVXckHAe\
                F+KkxLbxILfDLUT0rAK9iUzy1L53eKGQ==",
            )
            .unwrap()
            .into(),
        );
        let zsk = Dnskey::new(
            256,
            3,
            SecAlg::ECDSAP256SHA256,
            base64::decode(
                "oJMRESz5E4gYzS/q6XDrvU1qMPYIjCWzJaOau8XNEZeqCYKD5ar0IR\
                d8KqXXFJkqmVfRvMGPmM1x8fGAa2XhSA==",
            )
            .unwrap()
            .into(),
        );
        let owner = name("cloudflare.com.");
        let rrsig = Rrsig::new(
            Rtype::DNSKEY,
            SecAlg::ECDSAP256SHA256,
            2,
            3600,
            Serial(1560314494),
            Serial(1555130494),
            2371,
            owner.clone(),
            base64::decode(
                "8jnAGhG7O52wmL065je10XQztRX1vK8P8KBSyo71Z6h5wAT9+GFxKBaE\
                zcJBLvRmofYFDAhju21p1uTfLaYHrg==",
            )
            .unwrap()
            .into(),
        );
        let rrset = dnskey_set(&owner, &[&ksk, &zsk]);
        assert_eq!(
            verify_rrsig(&rrset, &rrsig, &owner, &ksk, Serial(1558000000)),
            Ok(())
        );
    }

    #[test]
    fn rrsig_verify_wildcard() {
        let key = Dnskey::new(
            256,
            3,
            SecAlg::RSASHA1,
            base64::decode(
                "AQOy1bZVvpPqhg4j7EJoM9rI3ZmyEx2OzDBVrZy/lvI5CQePxX\
                HZS4i8dANH4DX3tbHol61ek8EFMcsGXxKciJFHyhl94C+NwILQd\
                zsUlSFovBZsyl/NX6yEbtw/xN9ZNcrbYvgjjZ/UVPZIySFNsgEY\
                vh0z2542lzMKR4Dh8uZffQ==",
            )
            .unwrap()
            .into(),
        );
        let rrsig = Rrsig::new(
            Rtype::MX,
            SecAlg::RSASHA1,
            2,
            3600,
            Serial::rrsig_from_str("20040509183619").unwrap(),
            Serial::rrsig_from_str("20040409183619").unwrap(),
            38519,
            name("example."),
            base64::decode(
                "OMK8rAZlepfzLWW75Dxd63jy2wswESzxDKG2f9AMN1CytCd10cYI\
                 SAxfAdvXSZ7xujKAtPbctvOQ2ofO7AZJ+d01EeeQTVBPq4/6KCWhq\
                 e2XTjnkVLNvvhnc0u28aoSsG0+4InvkkOHknKxw4kX18MMR34i8lC\
                 36SR5xBni8vHI=",
            )
            .unwrap()
            .into(),
        );
        let record = Record::new(
            name("a.z.w.example."),
            Class::IN,
            3600,
            Mx::new(1, name("ai.example.")),
        );
        assert_eq!(key.key_tag(), rrsig.key_tag());
        assert_eq!(
            verify_rrsig(
                &[record],
                &rrsig,
                &name("example."),
                &key,
                Serial::rrsig_from_str("20040420000000").unwrap()
            ),
            Ok(())
        );
    }

    //--- Key state with generated keys

    struct TestKey {
        pair: Ed25519KeyPair,
        dnskey: Dnskey,
    }

    impl TestKey {
        fn new(seed: u8, flags: u16) -> Self {
            let pair = Ed25519KeyPair::from_seed_unchecked(&[seed; 32])
                .unwrap();
            let dnskey = Dnskey::new(
                flags,
                3,
                SecAlg::ED25519,
                Bytes::copy_from_slice(pair.public_key().as_ref()),
            );
            TestKey { pair, dnskey }
        }

        fn sign(&self, apex: &Name, rrset: &[Record]) -> Rrsig {
            let first = &rrset[0];
            let mut rrsig = Rrsig::new(
                first.rtype(),
                SecAlg::ED25519,
                owner_labels(first.owner()) as u8,
                first.ttl(),
                Serial(2000),
                Serial(1000),
                self.dnskey.key_tag(),
                apex.clone(),
                Bytes::new(),
            );
            let data = signed_data(&rrsig, rrset).unwrap();
            rrsig.set_signature(Bytes::copy_from_slice(
                self.pair.sign(&data).as_ref(),
            ));
            rrsig
        }
    }

    #[test]
    fn untrusted_key_fails() {
        let apex = name("example.com");
        let ksk = TestKey::new(1, 257);
        let rrset = dnskey_set(&apex, &[&ksk.dnskey]);
        let rrsig = ksk.sign(&apex, &rrset);

        // The signature itself is fine.
        assert_eq!(
            verify_rrsig(&rrset, &rrsig, &apex, &ksk.dnskey, Serial(1500)),
            Ok(())
        );

        let mut state = KeyState::new();
        assert_eq!(
            state.verify_rrset(&apex, &rrset, &[rrsig.clone()], Serial(1500)),
            Err(DnssecError::UntrustedKey)
        );
        assert_eq!(
            state.accept_dnskeys(&apex, &rrset, &[rrsig.clone()], Serial(1500)),
            Err(DnssecError::UntrustedKey)
        );
        assert!(!state.has_keys(&apex));

        state.add_trust_anchor(apex.clone(), ksk.dnskey.clone());
        assert_eq!(
            state.verify_rrset(&apex, &rrset, &[rrsig.clone()], Serial(1500)),
            Ok(())
        );
        assert_eq!(
            state.verify_rrset(&apex, &rrset, &[rrsig], Serial(2001)),
            Err(DnssecError::Expired)
        );
        assert_eq!(
            state.verify_rrset(&apex, &rrset, &[], Serial(1500)),
            Err(DnssecError::Unsigned)
        );
    }

    #[test]
    fn key_rollover() {
        let apex = name("example.com");
        let old = TestKey::new(1, 257);
        let new = TestKey::new(2, 257);
        let zsk = TestKey::new(3, 256);
        let mut state = KeyState::new();
        state.add_trust_anchor(apex.clone(), old.dnskey.clone());

        // New keys signed by the old one are accepted.
        let rrset = dnskey_set(&apex, &[&new.dnskey, &zsk.dnskey]);
        let rrsig = old.sign(&apex, &rrset);
        assert_eq!(
            state.accept_dnskeys(&apex, &rrset, &[rrsig.clone()], Serial(1500)),
            Ok(true)
        );
        assert_eq!(state.keys(&apex), &[new.dnskey.clone(), zsk.dnskey.clone()]);
        assert_eq!(
            state.accept_dnskeys(&apex, &rrset, &[new.sign(&apex, &rrset)], Serial(1500)),
            Ok(false)
        );

        // The old key isn’t trusted anymore.
        assert_eq!(
            state.accept_dnskeys(&apex, &rrset, &[rrsig], Serial(1500)),
            Err(DnssecError::UntrustedKey)
        );
    }

    #[test]
    fn repeated_dnskeys_are_trusted_once() {
        let apex = name("example.com");
        let ksk = TestKey::new(1, 257);
        let zsk = TestKey::new(2, 256);
        let mut state = KeyState::new();
        state.add_trust_anchor(apex.clone(), ksk.dnskey.clone());

        let rrset =
            dnskey_set(&apex, &[&ksk.dnskey, &zsk.dnskey, &ksk.dnskey]);
        let rrsig = ksk.sign(&apex, &rrset);
        assert_eq!(
            state.accept_dnskeys(&apex, &rrset, &[rrsig], Serial(1500)),
            Ok(true)
        );
        assert_eq!(state.keys(&apex), &[ksk.dnskey.clone(), zsk.dnskey.clone()]);

        // The same keys in another order change nothing.
        let rrset = dnskey_set(&apex, &[&zsk.dnskey, &ksk.dnskey]);
        let rrsig = ksk.sign(&apex, &rrset);
        assert_eq!(
            state.accept_dnskeys(&apex, &rrset, &[rrsig], Serial(1500)),
            Ok(false)
        );
    }

    #[test]
    fn save_and_load() {
        let mut state = KeyState::new();
        state.add_trust_anchor(name("example.com"), TestKey::new(1, 257).dnskey);
        state.add_trust_anchor(name("example.com"), TestKey::new(2, 256).dnskey);
        state.add_trust_anchor(name("example.org"), TestKey::new(3, 257).dnskey);

        let dir = std::env::temp_dir().join(format!(
            "keystate-test-{}",
            std::process::id()
        ));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("keys");
        state.save(&path).unwrap();
        assert_eq!(KeyState::load(&path).unwrap(), state);
        fs::remove_dir_all(&dir).unwrap();

        assert!(KeyState::from_wire(b"\x00\x00\x01").is_err());
    }
}
