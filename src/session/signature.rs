//! Request signature engine.
//!
//! Every authenticated call carries a `sig` parameter computed from the
//! query parameters and the session credentials, per one of two circuits:
//!
//! - **client-server**: `md5(uid + sorted "k=v" concatenation + private_key)`
//! - **server-server**: `md5(sorted "k=v" concatenation + secret_key)`
//!
//! Parameter iteration order MUST be lexicographic; the remote end rebuilds
//! the same string and rejects anything else. Queries are passed as a
//! [`BTreeMap`] so sorting is structural, not a convention.

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;

use md5::{Digest, Md5};

use crate::error::{Error, Result};

// ============================================================================
// SignatureCircuit
// ============================================================================

/// Signature circuit, derived from which credential fields are populated.
///
/// Never stored: credentials may be mutated between calls, so the circuit
/// is recomputed on every request via [`Credentials::circuit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureCircuit {
    /// No usable credential set; signing fails.
    Undefined,

    /// `uid` + `private_key` circuit.
    ClientServer,

    /// `secret_key` circuit; adds `secure=1` to required parameters.
    ServerServer,
}

// ============================================================================
// Credentials
// ============================================================================

/// Application and user credentials owned by a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Application (client) id.
    pub app_id: String,

    /// Private key, used by the client-server circuit.
    pub private_key: String,

    /// Secret key, used by the server-server circuit.
    pub secret_key: String,

    /// User id, used by the client-server circuit.
    pub uid: String,

    /// Access token (`session_key` on the wire).
    pub access_token: String,
}

// ============================================================================
// Credentials - Constructors
// ============================================================================

impl Credentials {
    /// Creates credentials for the client-server circuit.
    #[inline]
    #[must_use]
    pub fn client_server(
        app_id: impl Into<String>,
        private_key: impl Into<String>,
        access_token: impl Into<String>,
        uid: impl Into<String>,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            private_key: private_key.into(),
            secret_key: String::new(),
            uid: uid.into(),
            access_token: access_token.into(),
        }
    }

    /// Creates credentials for the server-server circuit.
    #[inline]
    #[must_use]
    pub fn server_server(
        app_id: impl Into<String>,
        secret_key: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            private_key: String::new(),
            secret_key: secret_key.into(),
            uid: String::new(),
            access_token: access_token.into(),
        }
    }
}

// ============================================================================
// Credentials - Circuit Derivation
// ============================================================================

impl Credentials {
    /// Derives the signature circuit from the populated fields.
    #[must_use]
    pub fn circuit(&self) -> SignatureCircuit {
        if !self.uid.is_empty() && !self.private_key.is_empty() {
            SignatureCircuit::ClientServer
        } else if !self.secret_key.is_empty() {
            SignatureCircuit::ServerServer
        } else {
            SignatureCircuit::Undefined
        }
    }
}

// ============================================================================
// Signing
// ============================================================================

/// Builds the pre-digest string for a query under the given circuit.
///
/// `key=value` pairs are concatenated in key order with no separator,
/// framed by the circuit's secret material.
pub(crate) fn presign(
    query: &BTreeMap<String, String>,
    credentials: &Credentials,
    circuit: SignatureCircuit,
) -> String {
    let joined: String = query.iter().map(|(k, v)| format!("{k}={v}")).collect();

    match circuit {
        SignatureCircuit::ClientServer => {
            format!("{}{}{}", credentials.uid, joined, credentials.private_key)
        }
        SignatureCircuit::ServerServer => format!("{}{}", joined, credentials.secret_key),
        SignatureCircuit::Undefined => joined,
    }
}

/// Computes the request signature for a query.
///
/// # Errors
///
/// Returns [`Error::UndefinedCircuit`] when neither credential set is
/// populated.
pub fn sign(query: &BTreeMap<String, String>, credentials: &Credentials) -> Result<String> {
    let circuit = credentials.circuit();
    if circuit == SignatureCircuit::Undefined {
        return Err(Error::UndefinedCircuit);
    }

    let presigned = presign(query, credentials, circuit);
    let mut hasher = Md5::new();
    hasher.update(presigned.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

// ============================================================================
// Tests
// ============================================================================
