//! Envelope wire codec.
//!
//! ```text
//! from: <sender>, to: <recipient>
//! -----BEGIN MESSAGE-----
//! <encrypted-session-key, base64>
//!
//! <encrypted-body, base64>
//! <signature, base64>
//! -----END MESSAGE-----
//! ```
//!
//! Lines end in LF. Every block is a single line of standard padded base64,
//! so the blank line is the only empty line inside the markers.
//!
//! The signed region is `key_b64 "\n\n" body_b64`, exactly as it appears
//! between the begin-marker line and the signature line. The signature line is
//! appended after signing and is not part of the region it covers. The header
//! is outside the signed region; a forged sender fails certificate or
//! signature checks instead.

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::error::{MailError, Result};
use crate::identity::Identity;

pub const BEGIN_MARKER: &str = "-----BEGIN MESSAGE-----";
pub const END_MARKER: &str = "-----END MESSAGE-----";
pub const BOUNDARY: &str = "\n\n";

const FROM_PREFIX: &str = "from: ";
const TO_SEPARATOR: &str = ", to: ";

// ── Signed region ─────────────────────────────────────────────────────────────

/// The exact byte span the sender signs and the receiver verifies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRegion {
    bytes: Vec<u8>,
    encrypted_session_key: Vec<u8>,
    encrypted_body: Vec<u8>,
}

impl SignedRegion {
    /// Lay out the wrapped key and encrypted body as they will appear on the
    /// wire.
    pub fn assemble(encrypted_session_key: Vec<u8>, encrypted_body: Vec<u8>) -> Self {
        let key_block = STANDARD.encode(&encrypted_session_key);
        let body_block = STANDARD.encode(&encrypted_body);

        let mut bytes = Vec::with_capacity(key_block.len() + BOUNDARY.len() + body_block.len());
        bytes.extend_from_slice(key_block.as_bytes());
        bytes.extend_from_slice(BOUNDARY.as_bytes());
        bytes.extend_from_slice(body_block.as_bytes());

        Self {
            bytes,
            encrypted_session_key,
            encrypted_body,
        }
    }

    /// Split a region captured from the wire. The boundary must occur exactly
    /// once and both blocks must be canonical base64.
    fn parse(region: &str) -> Result<Self> {
        let boundaries = region.matches(BOUNDARY).count();
        if boundaries != 1 {
            return Err(MailError::malformed(format!(
                "expected exactly one blank-line boundary in signed region, found {boundaries}"
            )));
        }
        let (key_block, body_block) = region
            .split_once(BOUNDARY)
            .ok_or_else(|| MailError::malformed("missing blank-line boundary"))?;

        let encrypted_session_key = decode_block(key_block, "encrypted session key")?;
        let encrypted_body = decode_block(body_block, "encrypted body")?;

        let parsed = Self::assemble(encrypted_session_key, encrypted_body);
        if parsed.bytes != region.as_bytes() {
            return Err(MailError::malformed("signed region is not in canonical form"));
        }
        Ok(parsed)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn encrypted_session_key(&self) -> &[u8] {
        &self.encrypted_session_key
    }

    pub fn encrypted_body(&self) -> &[u8] {
        &self.encrypted_body
    }
}

// ── Envelope ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    sender: String,
    recipient: String,
    region: SignedRegion,
    signature: Vec<u8>,
}

impl Envelope {
    pub fn new(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        region: SignedRegion,
        signature: Vec<u8>,
    ) -> Result<Self> {
        let sender = sender.into();
        let recipient = recipient.into();
        check_header_field(&sender, "sender")?;
        check_header_field(&recipient, "recipient")?;
        Ok(Self {
            sender,
            recipient,
            region,
            signature,
        })
    }

    /// Sender address as written in the header.
    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn recipient(&self) -> &str {
        &self.recipient
    }

    pub fn sender_identity(&self) -> Result<Identity> {
        Identity::from_address(&self.sender)
    }

    pub fn recipient_identity(&self) -> Result<Identity> {
        Identity::from_address(&self.recipient)
    }

    pub fn signed_region(&self) -> &SignedRegion {
        &self.region
    }

    pub fn encrypted_session_key(&self) -> &[u8] {
        self.region.encrypted_session_key()
    }

    pub fn encrypted_body(&self) -> &[u8] {
        self.region.encrypted_body()
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }
}

/// Header fields must keep the header line parseable.
fn check_header_field(value: &str, what: &str) -> Result<()> {
    if value.is_empty() || value.contains(['\n', '\r']) || value.contains(TO_SEPARATOR) {
        return Err(MailError::malformed(format!("invalid {what} address {value:?}")));
    }
    Ok(())
}

// ── Codec ─────────────────────────────────────────────────────────────────────

pub fn encode(envelope: &Envelope) -> Vec<u8> {
    let header = format!(
        "{FROM_PREFIX}{}{TO_SEPARATOR}{}\n",
        envelope.sender, envelope.recipient
    );
    let signature = STANDARD.encode(&envelope.signature);
    let region = envelope.region.as_bytes();

    let mut out = Vec::with_capacity(
        header.len() + BEGIN_MARKER.len() + region.len() + signature.len() + END_MARKER.len() + 4,
    );
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(BEGIN_MARKER.as_bytes());
    out.push(b'\n');
    out.extend_from_slice(region);
    out.push(b'\n');
    out.extend_from_slice(signature.as_bytes());
    out.push(b'\n');
    out.extend_from_slice(END_MARKER.as_bytes());
    out
}

pub fn decode(raw: &[u8]) -> Result<Envelope> {
    let text = std::str::from_utf8(raw)
        .map_err(|e| MailError::malformed(format!("envelope is not UTF-8: {e}")))?;
    let text = text.strip_suffix('\n').unwrap_or(text);

    let (header, rest) = text
        .split_once('\n')
        .ok_or_else(|| MailError::malformed("missing header line"))?;
    let (sender, recipient) = parse_header(header)?;

    let begin = locate_marker(rest, BEGIN_MARKER, "begin")?;
    let end = locate_marker(rest, END_MARKER, "end")?;
    if end < begin {
        return Err(MailError::malformed("end marker precedes begin marker"));
    }
    if begin != 0 {
        return Err(MailError::malformed("unexpected content before begin marker"));
    }
    if &rest[end..] != END_MARKER {
        return Err(MailError::malformed("unexpected content after end marker"));
    }

    let inner = &rest[BEGIN_MARKER.len()..end];
    let inner = inner
        .strip_prefix('\n')
        .and_then(|s| s.strip_suffix('\n'))
        .ok_or_else(|| MailError::malformed("markers must sit on their own lines"))?;

    let (region, signature_line) = inner
        .rsplit_once('\n')
        .ok_or_else(|| MailError::malformed("missing signature line"))?;
    let signature = decode_block(signature_line, "signature")?;
    let region = SignedRegion::parse(region)?;

    Envelope::new(sender, recipient, region, signature)
}

fn parse_header(line: &str) -> Result<(&str, &str)> {
    let fields = line
        .strip_prefix(FROM_PREFIX)
        .ok_or_else(|| MailError::malformed("header must start with \"from: \""))?;
    let (sender, recipient) = fields
        .split_once(TO_SEPARATOR)
        .ok_or_else(|| MailError::malformed("header is missing \", to: \""))?;
    if sender.is_empty() || recipient.is_empty() {
        return Err(MailError::malformed("header has an empty address"));
    }
    Ok((sender, recipient))
}

fn locate_marker(text: &str, marker: &str, which: &str) -> Result<usize> {
    let mut found = text.match_indices(marker);
    let (at, _) = found
        .next()
        .ok_or_else(|| MailError::malformed(format!("missing {which} marker")))?;
    if found.next().is_some() {
        return Err(MailError::malformed(format!("duplicate {which} marker")));
    }
    Ok(at)
}

fn decode_block(block: &str, what: &str) -> Result<Vec<u8>> {
    if block.is_empty() {
        return Err(MailError::malformed(format!("{what} block is empty")));
    }
    STANDARD
        .decode(block)
        .map_err(|e| MailError::malformed(format!("{what} block: {e}")))
}
