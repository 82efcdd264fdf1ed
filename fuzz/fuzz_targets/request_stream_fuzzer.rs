//! Fuzz target for request framing across arbitrary read boundaries
//!
//! # Strategy
//!
//! - A sequence of well-formed requests, including uploads whose bodies
//!   contain delimiters
//! - Empty frames interleaved between requests
//! - The encoded stream is delivered through a pipe of 1..=64 bytes, so
//!   frames and upload bodies split at every possible offset
//!
//! # Invariants
//!
//! - `read_request` yields exactly the requests that were written, in order
//! - Empty frames never surface as requests
//! - The stream ends with `EndOfStream`, never a partial request

#![no_main]

use arbitrary::Arbitrary;
use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use sixchan_proto::{
    DELIMITER, FrameReader, ProtocolError, Request, UNNAMED_FILE, bounded_file_name, read_request,
};
use tokio::io::AsyncWriteExt;

#[derive(Debug, Clone, Arbitrary)]
enum Op {
    Sync(Option<u32>),
    Download(u32),
    Upload { name: String, content: Vec<u8> },
    Post(Vec<u8>),
    Blank,
}

#[derive(Debug, Clone, Arbitrary)]
struct Input {
    chunk: u8,
    ops: Vec<Op>,
}

fn clean(bytes: &[u8]) -> Vec<u8> {
    bytes.iter().copied().filter(|&b| b != DELIMITER).collect()
}

/// The request `op` encodes, and the request the server should see.
fn build(op: Op) -> Option<(Vec<u8>, Option<Request>)> {
    let request = match op {
        Op::Blank => return Some((vec![DELIMITER], None)),
        Op::Sync(cursor) => Request::Sync { cursor },
        Op::Download(id) => Request::Download { id },
        Op::Post(text) => {
            // Leading letter keeps arbitrary text from reading as a command
            let mut body = vec![b'p'];
            body.extend(clean(&text));
            Request::Post { text: Bytes::from(body) }
        },
        Op::Upload { name, content } => {
            let name = String::from_utf8(clean(name.as_bytes())).ok()?;
            let sent = Request::Upload { name: name.clone(), content: Bytes::from(content.clone()) };
            let name = bounded_file_name(name.trim());
            let name = if name.is_empty() { UNNAMED_FILE.to_string() } else { name };
            let seen = Request::Upload { name, content: content.into() };
            return Some((sent.to_bytes(), Some(seen)));
        },
    };
    Some((request.to_bytes(), Some(request)))
}

fuzz_target!(|input: Input| {
    let mut stream = Vec::new();
    let mut expected = Vec::new();
    for op in input.ops.into_iter().take(64) {
        if let Some((bytes, request)) = build(op) {
            stream.extend(bytes);
            expected.extend(request);
        }
    }

    let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
    runtime.block_on(async {
        let chunk = usize::from(input.chunk % 64) + 1;
        let (mut tx, rx) = tokio::io::duplex(chunk);

        let write = async move {
            tx.write_all(&stream).await.unwrap();
            drop(tx);
        };
        let read = async move {
            let mut reader = FrameReader::new(rx);
            let mut seen = Vec::new();
            loop {
                match read_request(&mut reader).await {
                    Ok(request) => seen.push(request),
                    Err(ProtocolError::EndOfStream) => break,
                    Err(e) => panic!("unexpected error: {e}"),
                }
            }
            seen
        };

        let ((), seen) = tokio::join!(write, read);
        assert_eq!(seen, expected);
    });
});
