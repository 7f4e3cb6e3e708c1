mod common;

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

use common::{Packing, PharBuilder, TestEntry, Signing};
use runphar::phar::SignatureAlgorithm;
use runphar::{Archive, HttpRangeReader, ReadAt};

/// Serve `data` over HTTP/1.1 with Range support, one request per
/// connection. Returns the archive URL.
fn serve(data: Vec<u8>, ranges: bool) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}/app.phar", listener.local_addr().unwrap());
    let data = Arc::new(data);

    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { continue };
            let data = Arc::clone(&data);
            thread::spawn(move || {
                let _ = respond(stream, &data, ranges);
            });
        }
    });

    url
}

fn respond(mut stream: TcpStream, data: &[u8], ranges: bool) -> std::io::Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut request_line = String::new();
    reader.read_line(&mut request_line)?;

    let mut range = None;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 || line == "\r\n" {
            break;
        }
        let lower = line.to_ascii_lowercase();
        if let Some(value) = lower.strip_prefix("range: bytes=") {
            let (start, end) = value.trim().split_once('-').unwrap();
            range = Some((start.parse::<usize>().unwrap(), end.parse::<usize>().unwrap()));
        }
    }

    let accept = if ranges { "bytes" } else { "none" };
    if request_line.starts_with("HEAD") {
        write!(
            stream,
            "HTTP/1.1 200 OK\r\nAccept-Ranges: {accept}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            data.len()
        )?;
    } else if let Some((start, end)) = range {
        let end = end.min(data.len() - 1);
        let body = &data[start..=end];
        write!(
            stream,
            "HTTP/1.1 206 Partial Content\r\nContent-Range: bytes {start}-{end}/{}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            data.len(),
            body.len()
        )?;
        stream.write_all(body)?;
    } else {
        write!(
            stream,
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            data.len()
        )?;
        stream.write_all(data)?;
    }
    stream.flush()
}

#[test]
fn parses_a_remote_archive_with_range_requests() {
    let text = b"<?php echo 'remote';\n".repeat(30);
    let data = PharBuilder::default()
        .entry(TestEntry::new("remote.php", &text).packed(Packing::Gzip))
        .entry(TestEntry::new("plain.txt", b"plain"))
        .signed(Signing::Digest(SignatureAlgorithm::Sha256))
        .build();
    let size = data.len() as u64;
    let url = serve(data, true);

    let reader = Arc::new(HttpRangeReader::new(url).unwrap());
    assert_eq!(reader.size(), size);

    let archive = Archive::parse(Arc::clone(&reader)).unwrap();
    let entry = archive.entry("remote.php").unwrap();
    assert_eq!(archive.read(entry).unwrap(), text);
    assert!(reader.transferred_bytes() > 0);
}

#[test]
fn server_without_range_support_is_refused() {
    let url = serve(b"irrelevant".to_vec(), false);
    let err = HttpRangeReader::new(url).err().unwrap();
    assert!(err.to_string().contains("Range"), "{err}");
}
