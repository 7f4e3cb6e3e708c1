use byteorder::{LittleEndian, ReadBytesExt};
use std::fmt;
use std::io::{self, Cursor};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Marker terminating the PHP bootstrap stub.
pub const HALT_COMPILER: &[u8] = b"__HALT_COMPILER(); ?>";

/// Manifest flag: the archive carries a trailing signature.
pub const MANIFEST_SIGNED: u32 = 0x0001_0000;

/// Entry flag bits selecting the payload compression.
pub const ENTRY_COMPRESSION_MASK: u32 = 0x0000_F000;
pub const ENTRY_COMPRESSED_GZ: u32 = 0x0000_1000;
pub const ENTRY_COMPRESSED_BZ2: u32 = 0x0000_2000;

/// Entry flag bits holding the Unix permissions.
pub const ENTRY_PERM_MASK: u32 = 0x0000_01FF;

/// `"GBMB"` read little-endian; last four bytes of a signed archive.
pub const SIGNATURE_MAGIC: u32 = 0x424D_4247;

/// Signature trailer: algorithm id + magic.
pub const SIGNATURE_TRAILER_SIZE: u64 = 8;

/// Default upper bound for an OpenSSL signature blob.
pub const MAX_SIGNATURE_LEN: u32 = 8 * 1024;

/// Compression applied to a single entry's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Bzip2,
}

impl Compression {
    /// Select the compression from an entry's flags.
    ///
    /// Returns `None` when the compression bits hold anything but a single
    /// known selector.
    pub fn from_flags(flags: u32) -> Option<Self> {
        match flags & ENTRY_COMPRESSION_MASK {
            0 => Some(Compression::None),
            ENTRY_COMPRESSED_GZ => Some(Compression::Gzip),
            ENTRY_COMPRESSED_BZ2 => Some(Compression::Bzip2),
            _ => None,
        }
    }

    pub fn is_compressed(&self) -> bool {
        *self != Compression::None
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Compression::None => "stored",
            Compression::Gzip => "gzip",
            Compression::Bzip2 => "bzip2",
        })
    }
}

/// Where a signature algorithm keeps its bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureKind {
    /// A fixed-size digest stored right before the trailer.
    Digest { len: usize },
    /// A length-prefixed OpenSSL signature blob.
    Asymmetric,
}

/// Signature algorithms known to the PHAR format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignatureAlgorithm {
    Md5,
    Sha1,
    Sha256,
    Sha512,
    OpenSsl,
    OpenSslSha256,
    OpenSslSha512,
}

impl SignatureAlgorithm {
    pub fn from_id(id: u32) -> Option<Self> {
        match id {
            0x0001 => Some(Self::Md5),
            0x0002 => Some(Self::Sha1),
            0x0003 => Some(Self::Sha256),
            0x0004 => Some(Self::Sha512),
            0x0010 => Some(Self::OpenSsl),
            0x0011 => Some(Self::OpenSslSha256),
            0x0012 => Some(Self::OpenSslSha512),
            _ => None,
        }
    }

    pub fn id(&self) -> u32 {
        match self {
            Self::Md5 => 0x0001,
            Self::Sha1 => 0x0002,
            Self::Sha256 => 0x0003,
            Self::Sha512 => 0x0004,
            Self::OpenSsl => 0x0010,
            Self::OpenSslSha256 => 0x0011,
            Self::OpenSslSha512 => 0x0012,
        }
    }

    pub fn kind(&self) -> SignatureKind {
        match self {
            Self::Md5 => SignatureKind::Digest { len: 16 },
            Self::Sha1 => SignatureKind::Digest { len: 20 },
            Self::Sha256 => SignatureKind::Digest { len: 32 },
            Self::Sha512 => SignatureKind::Digest { len: 64 },
            Self::OpenSsl | Self::OpenSslSha256 | Self::OpenSslSha512 => SignatureKind::Asymmetric,
        }
    }

    /// Distance from end of file to the first digest byte, trailer included.
    pub fn digest_offset_from_end(&self) -> Option<u64> {
        match self.kind() {
            SignatureKind::Digest { len } => Some(len as u64 + SIGNATURE_TRAILER_SIZE),
            SignatureKind::Asymmetric => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Md5 => "MD5",
            Self::Sha1 => "SHA-1",
            Self::Sha256 => "SHA-256",
            Self::Sha512 => "SHA-512",
            Self::OpenSsl => "OpenSSL",
            Self::OpenSslSha256 => "OpenSSL SHA-256",
            Self::OpenSslSha512 => "OpenSSL SHA-512",
        }
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Trailing signature of a signed archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub algorithm: SignatureAlgorithm,
    /// Digest for hash algorithms, the raw blob for OpenSSL ones.
    pub bytes: Vec<u8>,
}

impl Signature {
    /// Lowercase hex of the signature bytes.
    pub fn to_hex(&self) -> String {
        self.bytes.iter().map(|b| format!("{b:02x}")).collect()
    }
}

/// Manifest API version, three 4-bit fields packed into two bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiVersion {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

impl ApiVersion {
    /// Decode the two version bytes as PHP writes them (`1.1.1` is `11 10`).
    pub fn from_bytes(bytes: [u8; 2]) -> Self {
        Self {
            major: bytes[0] >> 4,
            minor: bytes[0] & 0x0F,
            patch: bytes[1] >> 4,
        }
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Global manifest header - 18 bytes, followed by alias and metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    /// Declared manifest length, counted from after the length field itself.
    pub length: u32,
    pub entry_count: u32,
    pub version: ApiVersion,
    pub flags: u32,
    pub alias: Vec<u8>,
    /// Serialized archive metadata, left opaque.
    pub metadata: Vec<u8>,
}

/// Fixed part of the manifest header.
pub(crate) struct ManifestHeader {
    pub length: u32,
    pub entry_count: u32,
    pub version: ApiVersion,
    pub flags: u32,
    pub alias_len: u32,
}

impl ManifestHeader {
    pub const SIZE: usize = 18;

    pub fn from_bytes(data: &[u8]) -> io::Result<Self> {
        let mut cursor = Cursor::new(data);

        Ok(Self {
            length: cursor.read_u32::<LittleEndian>()?,
            entry_count: cursor.read_u32::<LittleEndian>()?,
            version: ApiVersion::from_bytes([cursor.read_u8()?, cursor.read_u8()?]),
            flags: cursor.read_u32::<LittleEndian>()?,
            alias_len: cursor.read_u32::<LittleEndian>()?,
        })
    }
}

impl Manifest {
    pub fn is_signed(&self) -> bool {
        self.flags & MANIFEST_SIGNED != 0
    }

    pub fn alias_lossy(&self) -> String {
        String::from_utf8_lossy(&self.alias).into_owned()
    }
}

/// Fixed block following each entry's file name - 24 bytes
pub(crate) struct EntryHeader {
    pub uncompressed_size: u32,
    pub timestamp: u32,
    pub compressed_size: u32,
    pub crc32: u32,
    pub flags: u32,
    pub metadata_len: u32,
}

impl EntryHeader {
    pub const SIZE: usize = 24;

    pub fn from_bytes(data: &[u8]) -> io::Result<Self> {
        let mut cursor = Cursor::new(data);

        Ok(Self {
            uncompressed_size: cursor.read_u32::<LittleEndian>()?,
            timestamp: cursor.read_u32::<LittleEndian>()?,
            compressed_size: cursor.read_u32::<LittleEndian>()?,
            crc32: cursor.read_u32::<LittleEndian>()?,
            flags: cursor.read_u32::<LittleEndian>()?,
            metadata_len: cursor.read_u32::<LittleEndian>()?,
        })
    }
}

/// One packaged file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Path inside the archive, lexically cleaned, for display. Bytes that
    /// are not UTF-8 are replaced.
    pub name: String,
    /// The cleaned path byte for byte, as stored.
    pub path: Vec<u8>,
    /// Modification time, Unix seconds.
    pub timestamp: u32,
    pub uncompressed_size: u32,
    pub compressed_size: u32,
    pub crc32: u32,
    pub flags: u32,
    pub metadata: Vec<u8>,
    /// The stored name ended in `/`.
    pub is_directory: bool,
    pub(crate) compression: Compression,
    pub(crate) offset: u64,
}

impl Entry {
    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Bytes the payload occupies in the archive.
    pub fn on_disk_len(&self) -> u64 {
        if self.compression.is_compressed() {
            self.compressed_size as u64
        } else {
            self.uncompressed_size as u64
        }
    }

    /// Absolute offset of the payload in the archive.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Unix permission bits (`0o777` mask).
    pub fn permissions(&self) -> u32 {
        self.flags & ENTRY_PERM_MASK
    }

    pub fn modified(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(self.timestamp as u64)
    }
}
