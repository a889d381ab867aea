//! Identity Builder (C2, §4.2). Computes `size` and `content_hash` for a
//! RomEntity's primary file. Pure and reentrant: the same file hashed twice
//! with the same algorithm yields identical output.

use std::io::Read;
use std::path::Path;

use md5::{Digest, Md5};

use crate::config::HashAlgorithm;
use crate::error::AppResult;

/// Bytes read per chunk while streaming a file through the hasher (§4.2: ~1 MiB).
const CHUNK_SIZE: usize = 1024 * 1024;

/// Result of computing a RomEntity's identity: byte size and, if under the
/// configured cap, the content hash in uppercase hex.
pub struct Identity {
    pub size: u64,
    pub content_hash: Option<String>,
}

/// Compute the identity tuple for `path` using `algorithm`, capped at
/// `size_cap_bytes`. Must be called from a blocking context (not async) —
/// callers wrap this in `tokio::task::spawn_blocking`.
pub fn compute_identity(
    path: &Path,
    algorithm: HashAlgorithm,
    size_cap_bytes: u64,
) -> AppResult<Identity> {
    let size = std::fs::metadata(path)?.len();
    if size > size_cap_bytes {
        return Ok(Identity {
            size,
            content_hash: None,
        });
    }

    let file = std::fs::File::open(path)?;
    let content_hash = Some(hash_reader(file, algorithm)?);
    Ok(Identity { size, content_hash })
}

fn hash_reader(mut reader: impl Read, algorithm: HashAlgorithm) -> AppResult<String> {
    let mut buf = vec![0u8; CHUNK_SIZE];
    match algorithm {
        HashAlgorithm::Crc32 => {
            let mut hasher = crc32fast::Hasher::new();
            loop {
                let n = reader.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
            }
            Ok(format!("{:08X}", hasher.finalize()))
        }
        HashAlgorithm::Md5 => {
            let mut hasher = Md5::new();
            loop {
                let n = reader.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
            }
            Ok(format!("{:X}", hasher.finalize()))
        }
        HashAlgorithm::Sha1 => {
            use sha1::Sha1;
            let mut hasher = Sha1::new();
            loop {
                let n = reader.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
            }
            Ok(format!("{:X}", hasher.finalize()))
        }
    }
}
