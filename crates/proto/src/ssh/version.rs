//! SSH protocol version exchange (RFC 4253 Section 4.2).
//!
//! Both sides send an identification string:
//!
//! ```text
//! SSH-protoversion-softwareversion SP comments CR LF
//! ```
//!
//! A server may send other lines before its identification; the client skips
//! up to [`MAX_BANNER_LINES`] of them.
//!
//! # Security
//!
//! - Maximum line length: 255 bytes including CR LF
//! - Must start with "SSH-2.0-" or "SSH-1.99-"
//! - No null bytes allowed in version string
//!
//! # Example
//!
//! ```rust
//! use sushi_proto::ssh::version::Version;
//!
//! let version = Version::new("Sushi_0.1.0", None);
//! assert_eq!(version.to_string(), "SSH-2.0-Sushi_0.1.0");
//!
//! let parsed = Version::parse("SSH-2.0-OpenSSH_9.6 Ubuntu-3").unwrap();
//! assert_eq!(parsed.software(), "OpenSSH_9.6");
//! assert_eq!(parsed.comments(), Some("Ubuntu-3"));
//! ```

use crate::ssh::error::{Error, Result};
use crate::ssh::packet::read_exact;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

/// Maximum length of an identification line, CR LF included.
pub const MAX_VERSION_LENGTH: usize = 255;

/// Maximum number of non-identification lines skipped before giving up.
pub const MAX_BANNER_LINES: usize = 32;

/// SSH identification string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    proto_version: String,
    software_version: String,
    comments: Option<String>,
}

impl Version {
    /// Creates an identification with protocol version "2.0".
    pub fn new(software: &str, comments: Option<&str>) -> Self {
        Self {
            proto_version: "2.0".to_string(),
            software_version: software.to_string(),
            comments: comments.map(String::from),
        }
    }

    /// This crate's identification, `SSH-2.0-Sushi_<crate version>`.
    pub fn default_sushi() -> Self {
        Self::new(&format!("Sushi_{}", env!("CARGO_PKG_VERSION")), None)
    }

    /// Parses an identification line (with or without CR LF).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidVersion`] if the line is too long, contains a
    /// null byte, does not start with "SSH-" or names a protocol other than
    /// "2.0" or "1.99".
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim_end_matches("\r\n").trim_end_matches('\n');

        if line.len() + 2 > MAX_VERSION_LENGTH {
            return Err(Error::InvalidVersion(format!(
                "line too long: {} bytes (max {})",
                line.len() + 2,
                MAX_VERSION_LENGTH
            )));
        }

        if line.contains('\0') {
            return Err(Error::InvalidVersion("contains null byte".to_string()));
        }

        let rest = line.strip_prefix("SSH-").ok_or_else(|| {
            Error::InvalidVersion(format!("must start with 'SSH-', got '{}'", line))
        })?;

        let (proto_version, rest) = rest
            .split_once('-')
            .ok_or_else(|| Error::InvalidVersion(format!("malformed line '{}'", line)))?;

        if proto_version != "2.0" && proto_version != "1.99" {
            return Err(Error::InvalidVersion(format!(
                "unsupported protocol version '{}'",
                proto_version
            )));
        }

        let (software_version, comments) = match rest.split_once(' ') {
            Some((software, comments)) => (software, Some(comments.trim().to_string())),
            None => (rest, None),
        };

        if software_version.is_empty() {
            return Err(Error::InvalidVersion("empty software version".to_string()));
        }

        Ok(Self {
            proto_version: proto_version.to_string(),
            software_version: software_version.to_string(),
            comments,
        })
    }

    /// Returns the protocol version (e.g., "2.0").
    pub fn proto_version(&self) -> &str {
        &self.proto_version
    }

    /// Returns the software version (e.g., "Sushi_0.1.0").
    pub fn software(&self) -> &str {
        &self.software_version
    }

    /// Returns the comments, if any.
    pub fn comments(&self) -> Option<&str> {
        self.comments.as_deref()
    }

    /// Converts to wire format (with CR LF).
    pub fn to_wire_format(&self) -> String {
        format!("{}\r\n", self)
    }
}

impl Default for Version {
    fn default() -> Self {
        Self::default_sushi()
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SSH-{}-{}", self.proto_version, self.software_version)?;
        if let Some(comments) = &self.comments {
            write!(f, " {}", comments)?;
        }
        Ok(())
    }
}

/// Writes our identification line.
pub async fn write_identification<W>(writer: &mut W, version: &Version) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    writer.write_all(version.to_wire_format().as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads the peer's identification, skipping leading banner lines.
///
/// Returns the parsed version with the exact line received (without CR LF),
/// which is what the exchange hash covers. Reads byte by byte so nothing past
/// the line is consumed.
///
/// # Errors
///
/// - [`Error::InvalidVersion`] if a line is too long, not UTF-8, or more than
///   [`MAX_BANNER_LINES`] lines precede the identification
/// - [`Error::TruncatedInput`] if the stream ends first
pub async fn read_identification<R>(reader: &mut R) -> Result<(Version, String)>
where
    R: AsyncRead + Unpin + ?Sized,
{
    for _ in 0..=MAX_BANNER_LINES {
        let line = read_line(reader).await?;
        if line.starts_with("SSH-") {
            let version = Version::parse(&line)?;
            return Ok((version, line));
        }
    }

    Err(Error::InvalidVersion(format!(
        "no identification within {} lines",
        MAX_BANNER_LINES
    )))
}

async fn read_line<R>(reader: &mut R) -> Result<String>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut line = Vec::with_capacity(64);
    let mut byte = [0u8; 1];

    loop {
        read_exact(reader, &mut byte).await?;
        if byte[0] == b'\n' {
            break;
        }
        line.push(byte[0]);
        if line.len() + 1 > MAX_VERSION_LENGTH {
            return Err(Error::InvalidVersion(format!(
                "line exceeds {} bytes",
                MAX_VERSION_LENGTH
            )));
        }
    }

    if line.last() == Some(&b'\r') {
        line.pop();
    }

    String::from_utf8(line).map_err(|_| Error::InvalidVersion("line is not UTF-8".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_new() {
        let version = Version::new("Sushi_0.1.0", Some("test"));
        assert_eq!(version.proto_version(), "2.0");
        assert_eq!(version.software(), "Sushi_0.1.0");
        assert_eq!(version.comments(), Some("test"));
        assert_eq!(version.to_wire_format(), "SSH-2.0-Sushi_0.1.0 test\r\n");
    }

    #[test]
    fn test_default_sushi() {
        let version = Version::default();
        assert!(version.to_string().starts_with("SSH-2.0-Sushi_"));
        assert_eq!(version.comments(), None);
    }

    #[test]
    fn test_parse_variants() {
        let v = Version::parse("SSH-2.0-OpenSSH_8.9\r\n").unwrap();
        assert_eq!(v.software(), "OpenSSH_8.9");
        assert_eq!(v.comments(), None);

        let v = Version::parse("SSH-1.99-Legacy_1.0").unwrap();
        assert_eq!(v.proto_version(), "1.99");

        let v = Version::parse("SSH-2.0-dropbear_2022.83 extra words").unwrap();
        assert_eq!(v.comments(), Some("extra words"));
    }

    #[test]
    fn test_parse_errors() {
        for line in [
            "HTTP/1.1 200 OK",
            "SSH-1.5-Old",
            "SSH-2.0-",
            "SSH-2.0",
            "SSH-2.0-bad\0name",
        ] {
            match Version::parse(line) {
                Err(Error::InvalidVersion(_)) => {}
                other => panic!("{:?} should be rejected, got {:?}", line, other),
            }
        }

        let long = format!("SSH-2.0-{}", "x".repeat(250));
        assert!(matches!(
            Version::parse(&long),
            Err(Error::InvalidVersion(msg)) if msg.contains("too long")
        ));
    }

    #[tokio::test]
    async fn test_read_identification_plain() {
        let mut data = &b"SSH-2.0-OpenSSH_9.6\r\n\x00\x00\x01\x0c"[..];
        let (version, raw) = read_identification(&mut data).await.unwrap();
        assert_eq!(version.software(), "OpenSSH_9.6");
        assert_eq!(raw, "SSH-2.0-OpenSSH_9.6");
        // the packet that follows is untouched
        assert_eq!(data, &[0, 0, 1, 0x0c]);
    }

    #[tokio::test]
    async fn test_read_identification_skips_banner() {
        let mut data = &b"Welcome\r\nauthorized use only\nSSH-2.0-srv_1.0 c\r\n"[..];
        let (version, raw) = read_identification(&mut data).await.unwrap();
        assert_eq!(version.software(), "srv_1.0");
        assert_eq!(raw, "SSH-2.0-srv_1.0 c");
    }

    #[tokio::test]
    async fn test_read_identification_too_many_lines() {
        let mut input = "noise\r\n".repeat(MAX_BANNER_LINES + 1);
        input.push_str("SSH-2.0-late\r\n");
        let mut data = input.as_bytes();
        assert!(matches!(
            read_identification(&mut data).await,
            Err(Error::InvalidVersion(_))
        ));
    }

    #[tokio::test]
    async fn test_read_identification_eof() {
        let mut data = &b"SSH-2.0-cut"[..];
        assert!(matches!(
            read_identification(&mut data).await,
            Err(Error::TruncatedInput { .. })
        ));
    }

    #[tokio::test]
    async fn test_read_identification_overlong_line() {
        let input = "x".repeat(400);
        let mut data = input.as_bytes();
        assert!(matches!(
            read_identification(&mut data).await,
            Err(Error::InvalidVersion(_))
        ));
    }

    #[tokio::test]
    async fn test_write_identification() {
        let mut out = Vec::new();
        write_identification(&mut out, &Version::new("Sushi_0.1.0", None))
            .await
            .unwrap();
        assert_eq!(out, b"SSH-2.0-Sushi_0.1.0\r\n");
    }
}
