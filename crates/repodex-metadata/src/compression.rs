//! Transparent decompression of metadata documents.
//!
//! Repositories publish metadata gzip, xz, bzip2 or zstd compressed; the
//! format is detected from the leading magic bytes rather than the file
//! name, so a mislabeled file still decodes.

use std::io::{self, BufRead, BufReader};

pub const GZIP_MAGIC_BYTES: [u8; 2] = [0x1f, 0x8b];
pub const XZ_MAGIC_BYTES: [u8; 6] = [0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00];
pub const BZIP2_MAGIC_BYTES: [u8; 3] = [0x42, 0x5a, 0x68];
pub const ZST_MAGIC_BYTES: [u8; 4] = [0x28, 0xb5, 0x2f, 0xfd];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Xz,
    Bzip2,
    Zstd,
}

impl Compression {
    /// Detects the compression from the first bytes of a stream.
    pub fn detect(signature: &[u8]) -> Self {
        if signature.starts_with(&XZ_MAGIC_BYTES) {
            Compression::Xz
        } else if signature.starts_with(&ZST_MAGIC_BYTES) {
            Compression::Zstd
        } else if signature.starts_with(&GZIP_MAGIC_BYTES) {
            Compression::Gzip
        } else if signature.starts_with(&BZIP2_MAGIC_BYTES) {
            Compression::Bzip2
        } else {
            Compression::None
        }
    }
}

/// Wraps `reader` in the decoder matching its magic bytes.
pub fn decompress<'a, R>(mut reader: R) -> io::Result<Box<dyn BufRead + 'a>>
where
    R: BufRead + 'a,
{
    let compression = Compression::detect(reader.fill_buf()?);

    Ok(match compression {
        Compression::None => Box::new(reader),
        Compression::Gzip => Box::new(BufReader::new(flate2::bufread::MultiGzDecoder::new(reader))),
        Compression::Xz => Box::new(BufReader::new(xz2::bufread::XzDecoder::new_multi_decoder(reader))),
        Compression::Bzip2 => Box::new(BufReader::new(bzip2::bufread::MultiBzDecoder::new(reader))),
        Compression::Zstd => Box::new(BufReader::new(zstd::Decoder::with_buffer(reader)?)),
    })
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};

    use super::*;

    const PAYLOAD: &[u8] = b"<metadata packages=\"0\"/>";

    fn roundtrip(compressed: Vec<u8>, expected: Compression) {
        assert_eq!(Compression::detect(&compressed), expected);
        let mut out = String::new();
        decompress(compressed.as_slice())
            .unwrap()
            .read_to_string(&mut out)
            .unwrap();
        assert_eq!(out.as_bytes(), PAYLOAD);
    }

    #[test]
    fn test_plain() {
        roundtrip(PAYLOAD.to_vec(), Compression::None);
    }

    #[test]
    fn test_gzip() {
        let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(PAYLOAD).unwrap();
        roundtrip(enc.finish().unwrap(), Compression::Gzip);
    }

    #[test]
    fn test_xz() {
        let mut enc = xz2::write::XzEncoder::new(Vec::new(), 6);
        enc.write_all(PAYLOAD).unwrap();
        roundtrip(enc.finish().unwrap(), Compression::Xz);
    }

    #[test]
    fn test_bzip2() {
        let mut enc = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
        enc.write_all(PAYLOAD).unwrap();
        roundtrip(enc.finish().unwrap(), Compression::Bzip2);
    }

    #[test]
    fn test_zstd() {
        roundtrip(zstd::encode_all(PAYLOAD, 3).unwrap(), Compression::Zstd);
    }
}
