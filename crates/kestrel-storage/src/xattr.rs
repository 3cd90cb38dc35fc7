//! Extended attribute codec
//!
//! Reads and writes a single named value as an extended attribute on an
//! open file descriptor. Working on a descriptor instead of a path means
//! the attribute always lands on the file the caller already holds open.
//!
//! A zero-length destination buffer passed to [`get`] is a size probe: the
//! call reports the length of the stored value without copying anything.
//!
//! Platform notes:
//! - Linux: `fgetxattr`/`fsetxattr`, missing attributes report `ENODATA`
//! - macOS: the same calls take a position and options argument, missing
//!   attributes report `ENOATTR`

use nix::errno::Errno;
use std::ffi::CString;
use std::fmt;
use std::os::fd::{AsFd, AsRawFd, RawFd};

/// Name of an extended attribute.
///
/// Never empty and never contains a NUL byte.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct AttrKey(CString);

impl AttrKey {
    /// Create a key, rejecting empty names and names with embedded NULs
    pub fn new(name: impl Into<String>) -> Result<Self, XattrError> {
        let name = name.into();
        if name.is_empty() {
            return Err(XattrError::new(
                XattrErrorKind::InvalidKey,
                None,
                "attribute key must not be empty",
            ));
        }
        let cname = CString::new(name).map_err(|e| {
            XattrError::new(
                XattrErrorKind::InvalidKey,
                None,
                format!("attribute key contains NUL at byte {}", e.nul_position()),
            )
        })?;
        Ok(Self(cname))
    }

    /// The key as text
    #[must_use]
    pub fn as_str(&self) -> &str {
        // Built from a String, so always valid UTF-8.
        self.0.to_str().unwrap_or_default()
    }

    fn as_cstr(&self) -> &std::ffi::CStr {
        &self.0
    }
}

impl fmt::Debug for AttrKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AttrKey({:?})", self.as_str())
    }
}

impl fmt::Display for AttrKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for AttrKey {
    type Error = XattrError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// What went wrong with an attribute operation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum XattrErrorKind {
    /// The attribute does not exist on this handle
    NotFound,
    /// The destination buffer is shorter than the stored value
    TooSmall,
    /// Any other operating system failure
    Io,
    /// The key is empty or contains a NUL byte
    InvalidKey,
    /// The stored value could not be decoded
    Corrupt,
}

impl XattrErrorKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "attribute not found",
            Self::TooSmall => "buffer too small",
            Self::Io => "I/O error",
            Self::InvalidKey => "invalid attribute key",
            Self::Corrupt => "corrupt attribute value",
        }
    }
}

impl fmt::Display for XattrErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error from an attribute operation.
///
/// Carries the kind callers branch on, the raw OS error number when the
/// failure came from a syscall, and a short description of the call.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{context}: {kind}{}", .errno.map_or_else(String::new, |e| format!(" (os error {e})")))]
pub struct XattrError {
    kind: XattrErrorKind,
    errno: Option<i32>,
    context: String,
    /// Length of the buffer offered to a read that came back `TooSmall`
    buffer_len: Option<usize>,
}

impl XattrError {
    pub fn new(kind: XattrErrorKind, errno: Option<i32>, context: impl Into<String>) -> Self {
        Self {
            kind,
            errno,
            context: context.into(),
            buffer_len: None,
        }
    }

    /// Record the length of the buffer the failed read was given
    #[must_use]
    pub const fn with_buffer_len(mut self, len: usize) -> Self {
        self.buffer_len = Some(len);
        self
    }

    /// Classify an errno returned by an attribute syscall
    fn from_errno(errno: Errno, context: impl Into<String>) -> Self {
        let kind = match errno {
            ENOATTR => XattrErrorKind::NotFound,
            Errno::ERANGE => XattrErrorKind::TooSmall,
            _ => XattrErrorKind::Io,
        };
        Self::new(kind, Some(errno as i32), context)
    }

    #[must_use]
    pub const fn kind(&self) -> XattrErrorKind {
        self.kind
    }

    /// Raw OS error number, if the error came from a syscall
    #[must_use]
    pub const fn raw_os_error(&self) -> Option<i32> {
        self.errno
    }

    /// Typed OS error number, if the error came from a syscall
    #[must_use]
    pub fn errno(&self) -> Option<Errno> {
        self.errno.map(Errno::from_raw)
    }

    /// Buffer length offered to the read, set on `TooSmall` from [`get`]
    #[must_use]
    pub const fn buffer_len(&self) -> Option<usize> {
        self.buffer_len
    }

    #[must_use]
    pub fn context(&self) -> &str {
        &self.context
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.kind == XattrErrorKind::NotFound
    }

    /// True when the filesystem does not support extended attributes
    #[must_use]
    pub fn is_unsupported(&self) -> bool {
        self.errno()
            .is_some_and(|e| e == Errno::ENOTSUP || e == Errno::EOPNOTSUPP)
    }
}

impl From<XattrError> for std::io::Error {
    fn from(err: XattrError) -> Self {
        match err.errno {
            Some(errno) => Self::from_raw_os_error(errno),
            None => Self::new(std::io::ErrorKind::InvalidInput, err.to_string()),
        }
    }
}

#[cfg(target_os = "linux")]
const ENOATTR: Errno = Errno::ENODATA;

#[cfg(target_os = "macos")]
const ENOATTR: Errno = Errno::ENOATTR;

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
const ENOATTR: Errno = Errno::ENOENT;

/// Read an attribute value into `buf`.
///
/// With an empty `buf` this is a size probe and returns the length of the
/// stored value. Otherwise the value is copied into `buf` and the number of
/// bytes copied is returned. A non-empty buffer shorter than the value
/// fails with [`XattrErrorKind::TooSmall`] carrying the offered length;
/// the required size is not reported, so callers reissue a probe.
pub fn get(fd: impl AsFd, key: &AttrKey, buf: &mut [u8]) -> Result<usize, XattrError> {
    let raw = fd.as_fd().as_raw_fd();
    let ret = sys::fgetxattr(raw, key, buf);
    if ret < 0 {
        let errno = Errno::last();
        if buf.is_empty() && errno == Errno::ERANGE {
            // A probe has nothing to be too small for.
            return Err(XattrError::new(
                XattrErrorKind::Io,
                Some(errno as i32),
                format!("fgetxattr {key}"),
            ));
        }
        if buf.is_empty() {
            return Err(XattrError::from_errno(errno, format!("fgetxattr {key}")));
        }
        let len = buf.len();
        return Err(
            XattrError::from_errno(errno, format!("fgetxattr {key} into {len}-byte buffer"))
                .with_buffer_len(len),
        );
    }
    Ok(ret.unsigned_abs())
}

/// Replace an attribute value.
///
/// `value` must not be empty. The replacement is atomic per attribute: a
/// concurrent reader sees either the previous or the new value. Returns the
/// number of bytes stored. No flush is issued; durability follows the
/// filesystem's own write-back.
pub fn set(fd: impl AsFd, key: &AttrKey, value: &[u8]) -> Result<usize, XattrError> {
    debug_assert!(!value.is_empty(), "attribute values must not be empty");
    let raw = fd.as_fd().as_raw_fd();
    if sys::fsetxattr(raw, key, value) < 0 {
        return Err(XattrError::from_errno(
            Errno::last(),
            format!("fsetxattr {key}"),
        ));
    }
    Ok(value.len())
}

/// Remove an attribute
pub fn remove(fd: impl AsFd, key: &AttrKey) -> Result<(), XattrError> {
    let raw = fd.as_fd().as_raw_fd();
    if sys::fremovexattr(raw, key) < 0 {
        return Err(XattrError::from_errno(
            Errno::last(),
            format!("fremovexattr {key}"),
        ));
    }
    Ok(())
}

/// List attribute names on a handle.
///
/// Uses the same probe-then-read sequence as [`get`]; a list that grows
/// between the two calls fails with [`XattrErrorKind::TooSmall`].
pub fn list(fd: impl AsFd) -> Result<Vec<String>, XattrError> {
    let raw = fd.as_fd().as_raw_fd();
    let size = sys::flistxattr(raw, &mut []);
    if size < 0 {
        return Err(XattrError::from_errno(Errno::last(), "flistxattr"));
    }
    if size == 0 {
        return Ok(Vec::new());
    }

    let mut buf = vec![0u8; size.unsigned_abs()];
    let n = sys::flistxattr(raw, &mut buf);
    if n < 0 {
        return Err(XattrError::from_errno(Errno::last(), "flistxattr"));
    }
    buf.truncate(n.unsigned_abs());

    Ok(buf
        .split(|b| *b == 0)
        .filter(|name| !name.is_empty())
        .map(|name| String::from_utf8_lossy(name).into_owned())
        .collect())
}

#[allow(unsafe_code)]
#[cfg(target_os = "linux")]
mod sys {
    use super::{AttrKey, RawFd};

    fn value_ptr(buf: &mut [u8]) -> *mut libc::c_void {
        if buf.is_empty() {
            std::ptr::null_mut()
        } else {
            buf.as_mut_ptr().cast()
        }
    }

    pub fn fgetxattr(fd: RawFd, key: &AttrKey, buf: &mut [u8]) -> isize {
        let len = buf.len();
        unsafe { libc::fgetxattr(fd, key.as_cstr().as_ptr(), value_ptr(buf), len) }
    }

    pub fn fsetxattr(fd: RawFd, key: &AttrKey, value: &[u8]) -> i32 {
        unsafe {
            libc::fsetxattr(
                fd,
                key.as_cstr().as_ptr(),
                value.as_ptr().cast(),
                value.len(),
                0,
            )
        }
    }

    pub fn fremovexattr(fd: RawFd, key: &AttrKey) -> i32 {
        unsafe { libc::fremovexattr(fd, key.as_cstr().as_ptr()) }
    }

    pub fn flistxattr(fd: RawFd, buf: &mut [u8]) -> isize {
        let len = buf.len();
        unsafe { libc::flistxattr(fd, value_ptr(buf).cast(), len) }
    }
}

#[allow(unsafe_code)]
#[cfg(target_os = "macos")]
mod sys {
    use super::{AttrKey, RawFd};

    fn value_ptr(buf: &mut [u8]) -> *mut libc::c_void {
        if buf.is_empty() {
            std::ptr::null_mut()
        } else {
            buf.as_mut_ptr().cast()
        }
    }

    pub fn fgetxattr(fd: RawFd, key: &AttrKey, buf: &mut [u8]) -> isize {
        let len = buf.len();
        unsafe { libc::fgetxattr(fd, key.as_cstr().as_ptr(), value_ptr(buf), len, 0, 0) }
    }

    pub fn fsetxattr(fd: RawFd, key: &AttrKey, value: &[u8]) -> i32 {
        unsafe {
            libc::fsetxattr(
                fd,
                key.as_cstr().as_ptr(),
                value.as_ptr().cast(),
                value.len(),
                0,
                0,
            )
        }
    }

    pub fn fremovexattr(fd: RawFd, key: &AttrKey) -> i32 {
        unsafe { libc::fremovexattr(fd, key.as_cstr().as_ptr(), 0) }
    }

    pub fn flistxattr(fd: RawFd, buf: &mut [u8]) -> isize {
        let len = buf.len();
        unsafe { libc::flistxattr(fd, value_ptr(buf).cast(), len, 0) }
    }
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
mod sys {
    use super::{AttrKey, RawFd};
    use nix::errno::Errno;

    fn unsupported() -> i32 {
        Errno::ENOTSUP.set();
        -1
    }

    pub fn fgetxattr(_fd: RawFd, _key: &AttrKey, _buf: &mut [u8]) -> isize {
        unsupported() as isize
    }

    pub fn fsetxattr(_fd: RawFd, _key: &AttrKey, _value: &[u8]) -> i32 {
        unsupported()
    }

    pub fn fremovexattr(_fd: RawFd, _key: &AttrKey) -> i32 {
        unsupported()
    }

    pub fn flistxattr(_fd: RawFd, _buf: &mut [u8]) -> isize {
        unsupported() as isize
    }
}
