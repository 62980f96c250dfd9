//! LZ4 frame reader that continues across frame boundaries.
//!
//! A container is a run of independent LZ4 frames, one per slice. The reader
//! hands out their decoded bytes back to back; it only reports end of stream
//! once the underlying input is exhausted too.

use std::io::{self, BufRead, Read};

use lz4_flex::frame::FrameDecoder;

pub struct ConcatenatedFrames<R: BufRead> {
    decoder: Option<FrameDecoder<R>>,
}

impl<R: BufRead> ConcatenatedFrames<R> {
    pub fn new(input: R) -> Self {
        Self { decoder: Some(FrameDecoder::new(input)) }
    }
}

impl<R: BufRead> Read for ConcatenatedFrames<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            let Some(decoder) = self.decoder.as_mut() else {
                return Ok(0);
            };
            let n = decoder.read(buf)?;
            if n > 0 {
                return Ok(n);
            }
            if decoder.get_mut().fill_buf()?.is_empty() {
                self.decoder = None;
                return Ok(0);
            }
            // more input follows: start a fresh frame on it
            if let Some(done) = self.decoder.take() {
                self.decoder = Some(FrameDecoder::new(done.into_inner()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lz4_flex::frame::FrameEncoder;
    use std::io::{BufReader, Write};

    fn frame(data: &[u8]) -> Vec<u8> {
        let mut enc = FrameEncoder::new(Vec::new());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn decodes_back_to_back_frames() {
        let mut stream = frame(b"first ");
        stream.extend(frame(b""));
        stream.extend(frame(&vec![b'z'; 70_000]));
        stream.extend(frame(b" last"));

        let mut reader = ConcatenatedFrames::new(BufReader::new(&stream[..]));
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();

        let mut expected = b"first ".to_vec();
        expected.extend(vec![b'z'; 70_000]);
        expected.extend(b" last");
        assert_eq!(out, expected);
    }

    #[test]
    fn trailing_garbage_is_an_error() {
        let mut stream = frame(b"ok");
        stream.extend(b"garbage!");
        let mut reader = ConcatenatedFrames::new(BufReader::new(&stream[..]));
        let mut out = Vec::new();
        assert!(reader.read_to_end(&mut out).is_err());
    }

    #[test]
    fn empty_input_is_empty_output() {
        let mut reader = ConcatenatedFrames::new(BufReader::new(&b""[..]));
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert!(out.is_empty());
    }
}
