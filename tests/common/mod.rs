//! Test-only PHAR assembly.
#![allow(dead_code)]

use std::io::Write;

use bzip2::write::BzEncoder;
use digest::DynDigest;
use flate2::Compression as Level;
use flate2::write::{DeflateEncoder, GzEncoder};
use runphar::phar::{DigestProvider, SignatureAlgorithm, SoftwareDigests};

pub const STUB: &[u8] = b"<?php echo 'stub'; __HALT_COMPILER(); ?>\r\n";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Packing {
    Stored,
    /// gzip member, flag 0x1000
    Gzip,
    /// raw DEFLATE as PHP writes it, flag 0x1000
    Deflate,
    Bzip2,
}

#[derive(Clone, Debug)]
pub struct TestEntry {
    pub name: String,
    pub content: Vec<u8>,
    pub packing: Packing,
    pub permissions: u32,
    pub timestamp: u32,
    pub metadata: Vec<u8>,
    /// Uncompressed size written to the table instead of the real one.
    pub declared_size: Option<u32>,
    /// Name bytes written to the table instead of `name`.
    pub raw_name: Option<Vec<u8>>,
}

impl TestEntry {
    pub fn new(name: &str, content: &[u8]) -> Self {
        Self {
            name: name.to_string(),
            content: content.to_vec(),
            packing: Packing::Stored,
            permissions: 0o644,
            timestamp: 1_700_000_000,
            metadata: Vec::new(),
            declared_size: None,
            raw_name: None,
        }
    }

    pub fn packed(mut self, packing: Packing) -> Self {
        self.packing = packing;
        self
    }

    pub fn with_metadata(mut self, metadata: &[u8]) -> Self {
        self.metadata = metadata.to_vec();
        self
    }

    pub fn declaring_size(mut self, size: u32) -> Self {
        self.declared_size = Some(size);
        self
    }

    pub fn with_raw_name(mut self, name: &[u8]) -> Self {
        self.raw_name = Some(name.to_vec());
        self
    }
}

/// How the finished archive ends.
#[derive(Clone, Debug)]
pub enum Signing {
    None,
    Digest(SignatureAlgorithm),
    /// An OpenSSL-style blob: algorithm, blob bytes.
    Blob(SignatureAlgorithm, Vec<u8>),
}

pub struct PharBuilder {
    pub stub: Vec<u8>,
    pub alias: Vec<u8>,
    pub metadata: Vec<u8>,
    pub entries: Vec<TestEntry>,
    pub signing: Signing,
}

impl Default for PharBuilder {
    fn default() -> Self {
        Self {
            stub: STUB.to_vec(),
            alias: b"test.phar".to_vec(),
            metadata: Vec::new(),
            entries: Vec::new(),
            signing: Signing::None,
        }
    }
}

/// Where things ended up in a built archive.
#[derive(Debug)]
pub struct Layout {
    pub manifest_start: usize,
    pub data_start: usize,
    /// (offset, on-disk length) per entry.
    pub payloads: Vec<(usize, usize)>,
    pub signed_len: usize,
}

impl PharBuilder {
    pub fn entry(mut self, entry: TestEntry) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn metadata(mut self, metadata: &[u8]) -> Self {
        self.metadata = metadata.to_vec();
        self
    }

    pub fn signed(mut self, signing: Signing) -> Self {
        self.signing = signing;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        self.build_with_layout().0
    }

    pub fn build_with_layout(&self) -> (Vec<u8>, Layout) {
        let packed: Vec<Vec<u8>> = self.entries.iter().map(pack).collect();

        let mut table = Vec::new();
        for (entry, data) in self.entries.iter().zip(&packed) {
            let flags = entry.permissions
                | match entry.packing {
                    Packing::Stored => 0,
                    Packing::Gzip | Packing::Deflate => 0x1000,
                    Packing::Bzip2 => 0x2000,
                };
            let name = entry.raw_name.as_deref().unwrap_or(entry.name.as_bytes());
            put_u32(&mut table, name.len() as u32);
            table.extend_from_slice(name);
            put_u32(
                &mut table,
                entry.declared_size.unwrap_or(entry.content.len() as u32),
            );
            put_u32(&mut table, entry.timestamp);
            put_u32(&mut table, data.len() as u32);
            put_u32(&mut table, crc32fast::hash(&entry.content));
            put_u32(&mut table, flags);
            put_u32(&mut table, entry.metadata.len() as u32);
            table.extend_from_slice(&entry.metadata);
        }

        let signed = !matches!(self.signing, Signing::None);
        let mut manifest = Vec::new();
        put_u32(&mut manifest, self.entries.len() as u32);
        manifest.extend_from_slice(&[0x11, 0x10]);
        put_u32(&mut manifest, if signed { 0x0001_0000 } else { 0 });
        put_u32(&mut manifest, self.alias.len() as u32);
        manifest.extend_from_slice(&self.alias);
        put_u32(&mut manifest, self.metadata.len() as u32);
        manifest.extend_from_slice(&self.metadata);
        manifest.extend_from_slice(&table);

        let mut out = self.stub.clone();
        let manifest_start = out.len();
        put_u32(&mut out, manifest.len() as u32);
        out.extend_from_slice(&manifest);

        let data_start = out.len();
        let mut payloads = Vec::new();
        for data in &packed {
            payloads.push((out.len(), data.len()));
            out.extend_from_slice(data);
        }

        let signed_len = out.len();
        match &self.signing {
            Signing::None => {}
            Signing::Digest(algorithm) => {
                let mut hasher: Box<dyn DynDigest + Send> =
                    SoftwareDigests.hasher(*algorithm).expect("digest algorithm");
                hasher.update(&out);
                let digest = hasher.finalize();
                out.extend_from_slice(&digest);
                put_u32(&mut out, algorithm.id());
                out.extend_from_slice(b"GBMB");
            }
            Signing::Blob(algorithm, blob) => {
                out.extend_from_slice(blob);
                put_u32(&mut out, blob.len() as u32);
                put_u32(&mut out, algorithm.id());
                out.extend_from_slice(b"GBMB");
            }
        }

        (
            out,
            Layout {
                manifest_start,
                data_start,
                payloads,
                signed_len,
            },
        )
    }
}

/// The two-entry archive from the PHAR reference fixture.
pub fn simple_phar() -> PharBuilder {
    PharBuilder::default()
        .metadata(br#"a:1:{s:1:"a";i:123;}"#)
        .entry(TestEntry::new("1.txt", b"ASDF file one\n"))
        .entry(TestEntry::new("index.php", b"ZXCV<?php echo 'hi';\n"))
}

fn pack(entry: &TestEntry) -> Vec<u8> {
    let content = &entry.content;
    match entry.packing {
        Packing::Stored => content.clone(),
        Packing::Gzip => {
            let mut enc = GzEncoder::new(Vec::new(), Level::default());
            enc.write_all(content).unwrap();
            enc.finish().unwrap()
        }
        Packing::Deflate => {
            let mut enc = DeflateEncoder::new(Vec::new(), Level::default());
            enc.write_all(content).unwrap();
            enc.finish().unwrap()
        }
        Packing::Bzip2 => {
            let mut enc = BzEncoder::new(Vec::new(), bzip2::Compression::default());
            enc.write_all(content).unwrap();
            enc.finish().unwrap()
        }
    }
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}
