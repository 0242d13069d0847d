//! On-disk plan container.
//!
//! ```text
//! offset  size  field
//! 0       8     magic  b"STATPLAN"
//! 8       4     container version (u32 LE)
//! 12      4     runtime version (u32 LE)
//! 16      8     body length N (u64 LE)
//! 24      N     body: protobuf PlanProto
//! 24+N    32    SHA-256 of the body
//! ```

use crate::layer::Program;
use crate::proto::PlanProto;
use crate::{PlanError, Result};
use prost::Message;
use sha2::{Digest, Sha256};

/// Magic bytes at the start of every plan file.
pub const MAGIC: [u8; 8] = *b"STATPLAN";
/// Container layout version understood by this crate.
pub const CONTAINER_VERSION: u32 = 1;
/// Size of the fixed header in bytes.
pub const HEADER_LEN: usize = 24;
/// Size of the trailing body digest in bytes.
pub const DIGEST_LEN: usize = 32;

/// Fixed-size header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanHeader {
    pub container_version: u32,
    pub runtime_version: u32,
    pub body_len: u64,
}

impl PlanHeader {
    /// Fail with `IncompatibleRuntime` unless the plan targets `runtime`.
    pub fn check_runtime(&self, runtime: u32) -> Result<()> {
        if self.runtime_version != runtime {
            return Err(PlanError::IncompatibleRuntime {
                plan: self.runtime_version,
                runtime,
            });
        }
        Ok(())
    }
}

/// A decoded, validated plan.
#[derive(Debug, Clone)]
pub struct DecodedPlan {
    pub header: PlanHeader,
    pub program: Program,
}

/// Serialize a program into a plan container.
pub fn encode(program: &Program, runtime_version: u32) -> Vec<u8> {
    let body = program.to_proto().encode_to_vec();
    let digest = Sha256::digest(&body);

    let mut bytes = Vec::with_capacity(HEADER_LEN + body.len() + DIGEST_LEN);
    bytes.extend_from_slice(&MAGIC);
    bytes.extend_from_slice(&CONTAINER_VERSION.to_le_bytes());
    bytes.extend_from_slice(&runtime_version.to_le_bytes());
    bytes.extend_from_slice(&(body.len() as u64).to_le_bytes());
    bytes.extend_from_slice(&body);
    bytes.extend_from_slice(&digest);
    bytes
}

/// Parse and check only the fixed header.
pub fn read_header(bytes: &[u8]) -> Result<PlanHeader> {
    if bytes.len() < HEADER_LEN {
        return Err(PlanError::Truncated {
            needed: HEADER_LEN,
            actual: bytes.len(),
        });
    }
    if bytes[..8] != MAGIC {
        return Err(PlanError::BadMagic);
    }

    let header = PlanHeader {
        container_version: read_u32(&bytes[8..12]),
        runtime_version: read_u32(&bytes[12..16]),
        body_len: read_u64(&bytes[16..24]),
    };
    if header.container_version != CONTAINER_VERSION {
        return Err(PlanError::UnsupportedContainer(header.container_version));
    }
    Ok(header)
}

/// Decode a full plan container: header, digest, body and layer chain.
///
/// The runtime version is reported in the header but not checked here;
/// back-ends call `PlanHeader::check_runtime` with their own version.
pub fn decode(bytes: &[u8]) -> Result<DecodedPlan> {
    let header = read_header(bytes)?;

    let body_len = usize::try_from(header.body_len)
        .map_err(|_| PlanError::Invalid(format!("body length {} too large", header.body_len)))?;
    let needed = HEADER_LEN
        .checked_add(body_len)
        .and_then(|n| n.checked_add(DIGEST_LEN))
        .ok_or_else(|| PlanError::Invalid(format!("body length {body_len} too large")))?;

    if bytes.len() < needed {
        return Err(PlanError::Truncated {
            needed,
            actual: bytes.len(),
        });
    }
    if bytes.len() > needed {
        return Err(PlanError::Invalid(format!(
            "{} trailing bytes after plan digest",
            bytes.len() - needed
        )));
    }

    let body = &bytes[HEADER_LEN..HEADER_LEN + body_len];
    let digest = &bytes[HEADER_LEN + body_len..];
    if Sha256::digest(body).as_slice() != digest {
        return Err(PlanError::DigestMismatch);
    }

    let proto = PlanProto::decode(body)?;
    let program = Program::from_proto(&proto)?;

    tracing::debug!(
        name = %program.name,
        layers = program.layers.len(),
        runtime_version = header.runtime_version,
        "Decoded plan"
    );

    Ok(DecodedPlan { header, program })
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    u32::from_le_bytes(buf)
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}
