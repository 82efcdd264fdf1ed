//! Fuzz target for single-frame decoding
//!
//! Feeds arbitrary bytes to every frame-level parser:
//! - `RequestHead::decode` (server side)
//! - `Response::parse` (client side)
//! - `DownloadHeader::from_bytes`
//!
//! None of them may panic. A decoded command re-encodes to a frame that
//! decodes to the same request.

#![no_main]

use libfuzzer_sys::fuzz_target;
use sixchan_proto::{DELIMITER, DownloadHeader, Request, RequestHead, Response};

fuzz_target!(|data: &[u8]| {
    let _ = Response::parse(data);
    let _ = DownloadHeader::from_bytes(data);

    let Ok(Some(RequestHead::Complete(request))) = RequestHead::decode(data) else {
        return;
    };

    // Posts carry their bytes verbatim and cannot hold an inner delimiter
    if let Request::Post { text } = &request {
        if text.contains(&DELIMITER) {
            return;
        }
    }

    let encoded = request.to_bytes();
    match RequestHead::decode(&encoded) {
        Ok(Some(RequestHead::Complete(again))) => assert_eq!(again, request),
        other => panic!("re-encoded {request:?} decoded as {other:?}"),
    }
});
