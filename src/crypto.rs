//! The seam to an external cryptographic collaborator.
//!
//! Some protocols protect parts of their messages. Verifying and
//! decrypting those is not done by this crate. Instead, decoders assemble
//! the cleartext authentication context, look up the key, and hand both
//! together with the ciphertext and MAC to a [`Verifier`] provided by the
//! caller.

use std::fmt;
use std::collections::HashMap;
use bytes::Bytes;
use crate::encode;
use crate::ident::Tag;
use crate::oid::Oid;


//------------ Verifier ------------------------------------------------------

/// Verifies and decrypts protected content.
pub trait Verifier: Send + Sync {
    /// Checks `mac` over `context` and `ciphertext` with `key`.
    ///
    /// If the ciphertext is empty, only authentication is requested and
    /// the plaintext of the result is ignored.
    fn verify_and_decrypt(
        &self,
        context: &[u8],
        key: &[u8],
        ciphertext: &[u8],
        mac: &[u8],
    ) -> Verification;
}


//------------ Verification --------------------------------------------------

/// The outcome of a call to a verifier.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Verification {
    /// The decrypted content if decryption was possible.
    pub plaintext: Option<Bytes>,

    /// Whether the MAC was correct.
    pub authenticated: bool,
}


//------------ KeyStore ------------------------------------------------------

/// The keys available for a session, by key id.
///
/// Keys are owned by the store so that they can outlive the packets they
/// may have been learned from.
#[derive(Clone, Default)]
pub struct KeyStore {
    keys: HashMap<u32, Bytes>,
}

impl KeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: u32, key: impl Into<Bytes>) {
        self.keys.insert(id, key.into());
    }

    pub fn get(&self, id: u32) -> Option<&Bytes> {
        self.keys.get(&id)
    }

    pub fn remove(&mut self, id: u32) -> Option<Bytes> {
        self.keys.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn clear(&mut self) {
        self.keys.clear()
    }
}

impl fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        // Never print key material.
        let mut ids: Vec<_> = self.keys.keys().collect();
        ids.sort();
        f.debug_struct("KeyStore").field("ids", &ids).finish()
    }
}


//------------ CryptoContext -------------------------------------------------

/// What a decoder needs to verify protected content.
#[derive(Clone, Copy)]
pub struct CryptoContext<'a> {
    verifier: &'a dyn Verifier,
    keys: &'a KeyStore,
}

impl<'a> CryptoContext<'a> {
    pub fn new(verifier: &'a dyn Verifier, keys: &'a KeyStore) -> Self {
        CryptoContext { verifier, keys }
    }

    pub fn key(&self, id: u32) -> Option<&'a Bytes> {
        self.keys.get(id)
    }

    pub fn verifier(&self) -> &'a dyn Verifier {
        self.verifier
    }
}

impl fmt::Debug for CryptoContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CryptoContext").field("keys", self.keys).finish()
    }
}


//------------ ApTitle -------------------------------------------------------

/// An application process title.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ApTitle {
    /// A universal object identifier.
    Absolute(Oid),

    /// The content octets of a relative object identifier.
    Relative(Bytes),
}

impl ApTitle {
    /// Appends the title as a complete universal value.
    fn append_encoded(&self, target: &mut Vec<u8>) {
        match *self {
            ApTitle::Absolute(ref oid) => {
                target.extend_from_slice(&encode::oid(oid))
            }
            ApTitle::Relative(ref content) => {
                target.extend_from_slice(
                    &encode::primitive(Tag::RELATIVE_OID, content)
                )
            }
        }
    }
}

impl fmt::Display for ApTitle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ApTitle::Absolute(ref oid) => write!(f, "{oid}"),
            ApTitle::Relative(ref content) => {
                f.write_str(".")?;
                content.iter().try_for_each(|x| write!(f, "{x:02x}"))
            }
        }
    }
}


//------------ AuthContext ---------------------------------------------------

/// The cleartext header fields a message’s MAC is computed over.
///
/// The fields are canonicalized into complete values and concatenated in
/// a fixed order, skipping those that are absent, followed by the
/// cleartext part of the protected content.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AuthContext {
    pub called_ap_title: Option<ApTitle>,
    pub called_ap_invocation_id: Option<i64>,
    pub calling_ap_title: Option<ApTitle>,
    pub calling_ae_qualifier: Option<i64>,
    pub calling_ap_invocation_id: Option<i64>,
}

impl AuthContext {
    /// Returns whether no header field is present at all.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Assembles the context octets.
    pub fn assemble(&self, cleartext: &[u8]) -> Vec<u8> {
        let mut res = Vec::new();
        if let Some(ref title) = self.called_ap_title {
            title.append_encoded(&mut res)
        }
        if let Some(id) = self.called_ap_invocation_id {
            res.extend_from_slice(&encode::integer(id))
        }
        if let Some(ref title) = self.calling_ap_title {
            title.append_encoded(&mut res)
        }
        if let Some(qualifier) = self.calling_ae_qualifier {
            res.extend_from_slice(&encode::integer(qualifier))
        }
        if let Some(id) = self.calling_ap_invocation_id {
            res.extend_from_slice(&encode::integer(id))
        }
        res.extend_from_slice(cleartext);
        res
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn assemble_in_order() {
        let ctx = AuthContext {
            called_ap_title: Some(ApTitle::Absolute(
                "2.16.124".parse().unwrap()
            )),
            called_ap_invocation_id: None,
            calling_ap_title: Some(ApTitle::Relative(
                Bytes::from_static(b"\x81\x05")
            )),
            calling_ae_qualifier: Some(4),
            calling_ap_invocation_id: Some(300),
        };
        assert_eq!(
            ctx.assemble(b"\x90\x00"),
            b"\x06\x02\x60\x7C\
              \x0D\x02\x81\x05\
              \x02\x01\x04\
              \x02\x02\x01\x2C\
              \x90\x00"
        );
        assert!(!ctx.is_empty());
        assert!(AuthContext::default().is_empty());
        assert_eq!(AuthContext::default().assemble(b"ab"), b"ab");
    }

    #[test]
    fn key_store() {
        let mut keys = KeyStore::new();
        keys.insert(1, &b"secret"[..]);
        assert_eq!(keys.get(1).map(AsRef::as_ref), Some(b"secret".as_ref()));
        assert!(keys.get(2).is_none());
        assert!(!format!("{keys:?}").contains("secret"));
        assert_eq!(keys.remove(1).unwrap().as_ref(), b"secret");
        assert!(keys.is_empty());
    }
}
