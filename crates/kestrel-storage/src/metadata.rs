//! Metadata store on top of the attribute codec
//!
//! Storage nodes keep the metadata of every object, container and account
//! next to its data, in extended attributes of the open data file. This
//! module hides buffer sizing from them:
//!
//! - [`MetadataStore::read_metadata`] probes the value size, allocates
//!   exactly that much and reads. A value that grows between the probe and
//!   the read is retried a bounded number of times.
//! - [`MetadataStore::write_metadata`] is a single atomic `set`.
//!
//! On top of those, a [`MetadataMap`] is persisted as JSON split over
//! numbered chunks (`<key>`, `<key>1`, `<key>2`, ...) so values larger
//! than one attribute allows still fit.

use crate::xattr::{self, AttrKey, XattrError, XattrErrorKind};
use kestrel_common::config::MetadataConfig;
use std::collections::BTreeMap;
use std::os::fd::AsFd;
use tracing::{debug, warn};

/// Metadata dictionary persisted by [`MetadataStore::write_map`]
pub type MetadataMap = BTreeMap<String, String>;

/// Reads and writes metadata blobs as extended attributes
#[derive(Clone, Debug)]
pub struct MetadataStore {
    /// First chunk of the serialized metadata map
    metadata_key: AttrKey,
    /// Largest chunk written to one attribute
    chunk_size: usize,
    /// Probe-then-read attempts per read
    max_read_attempts: u32,
}

impl MetadataStore {
    /// Create a store from configuration
    pub fn new(config: &MetadataConfig) -> Result<Self, XattrError> {
        Ok(Self {
            metadata_key: AttrKey::new(config.metadata_key.clone())?,
            chunk_size: config.chunk_size.max(1),
            max_read_attempts: config.max_read_attempts.max(1),
        })
    }

    /// Attribute holding the first metadata chunk
    #[must_use]
    pub const fn metadata_key(&self) -> &AttrKey {
        &self.metadata_key
    }

    /// Read the full value of `key`.
    ///
    /// Returns `NotFound` when the attribute is absent, and `TooSmall` when
    /// the value kept growing under concurrent writers for every attempt.
    pub fn read_metadata(&self, fd: impl AsFd, key: &AttrKey) -> Result<Vec<u8>, XattrError> {
        let fd = fd.as_fd();
        read_with_retry(self.max_read_attempts, key, |buf| xattr::get(fd, key, buf))
    }

    /// Replace the value of `key`. `bytes` must not be empty.
    pub fn write_metadata(
        &self,
        fd: impl AsFd,
        key: &AttrKey,
        bytes: &[u8],
    ) -> Result<(), XattrError> {
        xattr::set(fd, key, bytes).map(|_| ())
    }

    /// Read and decode the metadata map.
    ///
    /// Chunks are concatenated until the first missing one. A missing first
    /// chunk is `NotFound`; content that does not decode is `Corrupt`.
    pub fn read_map(&self, fd: impl AsFd) -> Result<MetadataMap, XattrError> {
        let fd = fd.as_fd();
        let mut data = self.read_metadata(fd, &self.metadata_key)?;

        for index in 1.. {
            let key = self.chunk_key(index)?;
            match self.read_metadata(fd, &key) {
                Ok(chunk) => data.extend_from_slice(&chunk),
                Err(e) if e.is_not_found() => break,
                Err(e) => return Err(e),
            }
        }

        serde_json::from_slice(&data).map_err(|e| {
            XattrError::new(
                XattrErrorKind::Corrupt,
                None,
                format!("decode {}: {e}", self.metadata_key),
            )
        })
    }

    /// Encode and write the metadata map, then drop chunks left over from
    /// a previously larger map.
    pub fn write_map(&self, fd: impl AsFd, map: &MetadataMap) -> Result<(), XattrError> {
        let fd = fd.as_fd();
        let data = serde_json::to_vec(map).map_err(|e| {
            XattrError::new(
                XattrErrorKind::Corrupt,
                None,
                format!("encode {}: {e}", self.metadata_key),
            )
        })?;

        let mut written = 0;
        for (index, chunk) in data.chunks(self.chunk_size).enumerate() {
            let key = self.chunk_key(index)?;
            self.write_metadata(fd, &key, chunk)?;
            written += 1;
        }

        let mut index = written;
        loop {
            let key = self.chunk_key(index)?;
            match xattr::remove(fd, &key) {
                Ok(()) => {
                    debug!("Removed stale metadata chunk {}", key);
                    index += 1;
                }
                Err(e) if e.is_not_found() => break,
                Err(e) => return Err(e),
            }
        }

        debug!(
            "Wrote {} bytes of metadata in {} chunk(s)",
            data.len(),
            written
        );
        Ok(())
    }

    fn chunk_key(&self, index: usize) -> Result<AttrKey, XattrError> {
        if index == 0 {
            Ok(self.metadata_key.clone())
        } else {
            AttrKey::new(format!("{}{index}", self.metadata_key))
        }
    }
}

/// Probe-then-read loop shared by the store.
///
/// `get` follows the codec contract: an empty buffer returns the size, a
/// short buffer fails with `TooSmall`.
fn read_with_retry<F>(attempts: u32, key: &AttrKey, mut get: F) -> Result<Vec<u8>, XattrError>
where
    F: FnMut(&mut [u8]) -> Result<usize, XattrError>,
{
    for attempt in 1..=attempts {
        let size = get(&mut [])?;
        let mut buf = vec![0u8; size];
        if size == 0 {
            return Ok(buf);
        }
        match get(&mut buf) {
            Ok(n) => {
                buf.truncate(n);
                return Ok(buf);
            }
            Err(e) if e.kind() == XattrErrorKind::TooSmall => {
                debug!(
                    "Attribute {} grew past {} bytes during read (attempt {}/{})",
                    key,
                    e.buffer_len().unwrap_or(size),
                    attempt,
                    attempts
                );
            }
            Err(e) => return Err(e),
        }
    }

    warn!(
        "Giving up reading attribute {} after {} attempts",
        key, attempts
    );
    Err(XattrError::new(
        XattrErrorKind::TooSmall,
        None,
        format!("read {key}: value kept growing over {attempts} attempts"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::xattr_file;

    fn store(chunk_size: usize) -> MetadataStore {
        MetadataStore::new(&MetadataConfig {
            chunk_size,
            ..MetadataConfig::default()
        })
        .unwrap()
    }

    fn key(name: &str) -> AttrKey {
        AttrKey::new(name).unwrap()
    }

    fn too_small() -> XattrError {
        XattrError::new(XattrErrorKind::TooSmall, Some(libc::ERANGE), "fgetxattr")
    }

    #[test]
    fn test_new_rejects_invalid_key() {
        let err = MetadataStore::new(&MetadataConfig {
            metadata_key: String::new(),
            ..MetadataConfig::default()
        })
        .unwrap_err();
        assert_eq!(err.kind(), XattrErrorKind::InvalidKey);
    }

    #[test]
    fn test_retry_recovers_from_growth() {
        // First read races with a writer, second attempt succeeds.
        let mut sizes = vec![4usize, 8].into_iter();
        let mut current = 0;
        let mut reads = 0;
        let value = b"12345678";

        let result = read_with_retry(3, &key("user.k"), |buf| {
            if buf.is_empty() {
                current = sizes.next().unwrap();
                return Ok(current);
            }
            reads += 1;
            if buf.len() < value.len() {
                return Err(too_small());
            }
            buf[..value.len()].copy_from_slice(value);
            Ok(value.len())
        })
        .unwrap();

        assert_eq!(result, value);
        assert_eq!(reads, 2);
        assert_eq!(current, 8);
    }

    #[test]
    fn test_retry_is_bounded() {
        let mut probes = 0;
        let err = read_with_retry(3, &key("user.k"), |buf| {
            if buf.is_empty() {
                probes += 1;
                return Ok(probes * 10);
            }
            Err(too_small())
        })
        .unwrap_err();

        assert_eq!(err.kind(), XattrErrorKind::TooSmall);
        assert_eq!(probes, 3);
    }

    #[test]
    fn test_retry_does_not_mask_other_errors() {
        let mut calls = 0;
        let err = read_with_retry(3, &key("user.k"), |buf| {
            calls += 1;
            if buf.is_empty() {
                return Ok(16);
            }
            Err(XattrError::new(XattrErrorKind::Io, Some(libc::EIO), "fgetxattr"))
        })
        .unwrap_err();

        assert_eq!(err.kind(), XattrErrorKind::Io);
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_value_shrinking_is_truncated() {
        let data = read_with_retry(3, &key("user.k"), |buf| {
            if buf.is_empty() {
                return Ok(10);
            }
            buf[..3].copy_from_slice(b"abc");
            Ok(3)
        })
        .unwrap();
        assert_eq!(data, b"abc");
    }

    #[test]
    fn test_read_write_metadata() {
        let Some(file) = xattr_file() else { return };
        let store = store(254);
        let k = key("user.kestrel.blob");

        assert!(store.read_metadata(&file, &k).unwrap_err().is_not_found());

        store.write_metadata(&file, &k, b"a:1;b:2").unwrap();
        assert_eq!(store.read_metadata(&file, &k).unwrap(), b"a:1;b:2");
    }

    #[test]
    fn test_map_round_trip_across_chunks() {
        let Some(file) = xattr_file() else { return };
        let store = store(16);

        let mut map = MetadataMap::new();
        map.insert("Content-Type".into(), "application/octet-stream".into());
        map.insert("X-Timestamp".into(), "1412345678.12345".into());
        map.insert("ETag".into(), "d41d8cd98f00b204e9800998ecf8427e".into());
        store.write_map(&file, &map).unwrap();

        // Spread over several attributes.
        let chunk1 = key("user.kestrel.metadata1");
        assert!(xattr::get(&file, &chunk1, &mut []).unwrap() <= 16);

        assert_eq!(store.read_map(&file).unwrap(), map);
    }

    #[test]
    fn test_smaller_map_removes_stale_chunks() {
        let Some(file) = xattr_file() else { return };
        let store = store(8);

        let mut big = MetadataMap::new();
        big.insert("name".into(), "x".repeat(64));
        store.write_map(&file, &big).unwrap();

        let mut small = MetadataMap::new();
        small.insert("a".into(), "b".into());
        store.write_map(&file, &small).unwrap();

        assert_eq!(store.read_map(&file).unwrap(), small);
        let names = xattr::list(&file).unwrap();
        let chunks = names
            .iter()
            .filter(|n| n.starts_with("user.kestrel.metadata"))
            .count();
        // {"a":"b"} is 9 bytes, two chunks of 8.
        assert_eq!(chunks, 2);
    }

    #[test]
    fn test_missing_map_is_not_found() {
        let Some(file) = xattr_file() else { return };
        assert!(store(254).read_map(&file).unwrap_err().is_not_found());
    }

    #[test]
    fn test_corrupt_map() {
        let Some(file) = xattr_file() else { return };
        let store = store(254);
        xattr::set(&file, store.metadata_key(), b"not json").unwrap();

        let err = store.read_map(&file).unwrap_err();
        assert_eq!(err.kind(), XattrErrorKind::Corrupt);
    }
}
