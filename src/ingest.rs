//! Embedding file readers.
//!
//! A build consumes any `IntoIterator<Item = Result<(String, Vec<f32>), IngestError>>`;
//! these readers cover the two common word-vector layouts:
//!
//! - **Plaintext** (GloVe, fastText `.vec`, word2vec text): one
//!   `token f1 f2 ... fD` per line, whitespace separated. A leading
//!   `count dim` header line is skipped.
//! - **word2vec binary** (`.bin`): a `count dim\n` header, then per entry the
//!   token, a space, and `dim` little-endian f32 values.
//!
//!
//! Either layout may be gzip-compressed (`.txt.gz`, `.bin.gz`); it is
//! decoded as it streams.

use crate::config;
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use thiserror::Error;

/// One ingested `(token, vector)` pair.
pub type Embedding = (String, Vec<f32>);

/// Boxed embedding stream, as returned by [`open_embeddings`].
pub type EmbeddingStream = Box<dyn Iterator<Item = Result<Embedding, IngestError>> + Send>;

/// Errors raised by an embedding source.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed entry; `entry` is the 1-based line (text) or record (binary).
    #[error("entry {entry}: {message}")]
    Parse { entry: usize, message: String },
}

fn parse_error(entry: usize, message: impl Into<String>) -> IngestError {
    IngestError::Parse {
        entry,
        message: message.into(),
    }
}

fn lowercase_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

/// Open an embeddings file, choosing the reader by extension. A trailing
/// `.gz` is decompressed and the extension before it picks the layout.
pub fn open_embeddings(path: &Path) -> Result<EmbeddingStream, IngestError> {
    let mut extension = lowercase_extension(path);
    let compressed = extension.as_deref() == Some("gz");
    if compressed {
        extension = path
            .file_stem()
            .and_then(|stem| lowercase_extension(Path::new(stem)));
    }

    let file = File::open(path)?;
    let reader: Box<dyn BufRead + Send> = if compressed {
        Box::new(BufReader::new(GzDecoder::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };
    tracing::debug!(
        path = %path.display(),
        compressed,
        binary = extension.as_deref() == Some("bin"),
        "opening embeddings"
    );
    match extension.as_deref() {
        Some("bin") => Ok(Box::new(Word2VecBinary::new(reader)?)),
        _ => Ok(Box::new(TextEmbeddings::new(reader))),
    }
}

// -----------------------------------------------------------------------------
// Plaintext
// -----------------------------------------------------------------------------

/// Line-oriented plaintext reader.
pub struct TextEmbeddings<R> {
    lines: std::io::Lines<R>,
    line_no: usize,
}

impl<R: BufRead> TextEmbeddings<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
        }
    }

    fn parse_line(&self, line: &str) -> Result<Option<Embedding>, IngestError> {
        let mut fields = line.split_whitespace();
        let Some(token) = fields.next() else {
            return Ok(None); // blank
        };
        let values: Vec<&str> = fields.collect();

        if self.line_no == 1
            && values.len() == 1
            && token.parse::<u64>().is_ok()
            && values[0].parse::<u64>().is_ok()
        {
            return Ok(None); // word2vec text header
        }
        if values.is_empty() {
            return Err(parse_error(
                self.line_no,
                format!("token {token:?} has no vector"),
            ));
        }

        let vector = values
            .iter()
            .map(|v| {
                v.parse::<f32>()
                    .map_err(|e| parse_error(self.line_no, format!("bad float {v:?}: {e}")))
            })
            .collect::<Result<Vec<f32>, _>>()?;
        Ok(Some((token.to_string(), vector)))
    }
}

impl<R: BufRead> Iterator for TextEmbeddings<R> {
    type Item = Result<Embedding, IngestError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e.into())),
            };
            self.line_no += 1;
            match self.parse_line(&line) {
                Ok(Some(embedding)) => return Some(Ok(embedding)),
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

// -----------------------------------------------------------------------------
// word2vec binary
// -----------------------------------------------------------------------------

/// Reader for the original word2vec binary format.
pub struct Word2VecBinary<R> {
    reader: R,
    count: usize,
    dimension: usize,
    record_bytes: usize,
    read: usize,
}

impl<R: BufRead> Word2VecBinary<R> {
    /// Read the `count dim` header.
    pub fn new(mut reader: R) -> Result<Self, IngestError> {
        let mut header = String::new();
        reader.read_line(&mut header)?;
        let mut fields = header.split_whitespace();
        let count = fields
            .next()
            .and_then(|f| f.parse::<usize>().ok())
            .ok_or_else(|| parse_error(0, format!("bad header {:?}", header.trim_end())))?;
        let dimension = fields
            .next()
            .and_then(|f| f.parse::<usize>().ok())
            .filter(|&d| d > 0)
            .ok_or_else(|| parse_error(0, format!("bad header {:?}", header.trim_end())))?;
        let record_bytes = dimension
            .checked_mul(4)
            .filter(|_| dimension <= config::MAX_DIMENSION)
            .ok_or_else(|| {
                parse_error(
                    0,
                    format!(
                        "dimension {dimension} exceeds the limit of {}",
                        config::MAX_DIMENSION
                    ),
                )
            })?;
        Ok(Self {
            reader,
            count,
            dimension,
            record_bytes,
            read: 0,
        })
    }

    /// Entry count announced by the header.
    pub fn header_count(&self) -> usize {
        self.count
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn read_entry(&mut self) -> Result<Embedding, IngestError> {
        let entry = self.read + 1;
        let mut raw = Vec::new();
        self.reader.read_until(b' ', &mut raw)?;
        if raw.last() != Some(&b' ') {
            return Err(parse_error(entry, "unexpected end of file in token"));
        }
        raw.pop();
        // Records may be separated by a newline after the vector.
        let start = raw.iter().position(|&b| b != b'\n').unwrap_or(raw.len());
        let token = String::from_utf8(raw[start..].to_vec())
            .map_err(|e| parse_error(entry, format!("token is not UTF-8: {e}")))?;
        if token.is_empty() {
            return Err(parse_error(entry, "empty token"));
        }

        let mut bytes = vec![0u8; self.record_bytes];
        self.reader.read_exact(&mut bytes).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                parse_error(entry, format!("vector for {token:?} is truncated"))
            } else {
                IngestError::Io(e)
            }
        })?;
        let vector = bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Ok((token, vector))
    }
}

impl<R: BufRead> Iterator for Word2VecBinary<R> {
    type Item = Result<Embedding, IngestError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.read >= self.count {
            return None;
        }
        let result = self.read_entry();
        // Stop after the first error; the stream position is unreliable.
        self.read = if result.is_ok() {
            self.read + 1
        } else {
            self.count
        };
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn collect<I: Iterator<Item = Result<Embedding, IngestError>>>(it: I) -> Vec<Embedding> {
        it.map(|e| e.unwrap()).collect()
    }

    #[test]
    fn glove_text() {
        let data = "the 0.1 -0.2 0.3\n\n, 1 2 3\ncat 0 1e-3 -4.5\n";
        let items = collect(TextEmbeddings::new(Cursor::new(data)));
        assert_eq!(items.len(), 3);
        assert_eq!(items[0], ("the".to_string(), vec![0.1, -0.2, 0.3]));
        assert_eq!(items[1].0, ",");
        assert_eq!(items[2].1, vec![0.0, 1e-3, -4.5]);
    }

    #[test]
    fn word2vec_text_header_is_skipped() {
        let data = "2 2\ncat 0 1\ndog 0 0.9\n";
        let items = collect(TextEmbeddings::new(Cursor::new(data)));
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].0, "cat");
    }

    #[test]
    fn numeric_tokens_after_first_line_are_data() {
        let data = "cat 0 1\n42 7\n";
        let items = collect(TextEmbeddings::new(Cursor::new(data)));
        assert_eq!(items[1], ("42".to_string(), vec![7.0]));
    }

    #[test]
    fn bad_float_reports_line() {
        let data = "cat 0 1\ndog 0 x\n";
        let results: Vec<_> = TextEmbeddings::new(Cursor::new(data)).collect();
        assert!(results[0].is_ok());
        match &results[1] {
            Err(IngestError::Parse { entry, .. }) => assert_eq!(*entry, 2),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn token_without_vector_is_an_error() {
        let results: Vec<_> = TextEmbeddings::new(Cursor::new("lonely\n")).collect();
        assert!(matches!(results[0], Err(IngestError::Parse { entry: 1, .. })));
    }

    fn word2vec_bytes(entries: &[(&str, [f32; 2])]) -> Vec<u8> {
        let mut out = format!("{} 2\n", entries.len()).into_bytes();
        for (token, v) in entries {
            out.extend_from_slice(token.as_bytes());
            out.push(b' ');
            for x in v {
                out.extend_from_slice(&x.to_le_bytes());
            }
            out.push(b'\n');
        }
        out
    }

    #[test]
    fn word2vec_binary() {
        let bytes = word2vec_bytes(&[("cat", [0.0, 1.0]), ("dog", [0.0, 0.9])]);
        let reader = Word2VecBinary::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.header_count(), 2);
        assert_eq!(reader.dimension(), 2);
        let items = collect(reader);
        assert_eq!(items[0], ("cat".to_string(), vec![0.0, 1.0]));
        assert_eq!(items[1], ("dog".to_string(), vec![0.0, 0.9]));
    }

    #[test]
    fn word2vec_binary_truncated() {
        let mut bytes = word2vec_bytes(&[("cat", [0.0, 1.0]), ("dog", [0.0, 0.9])]);
        bytes.truncate(bytes.len() - 6);
        let results: Vec<_> = Word2VecBinary::new(Cursor::new(bytes)).unwrap().collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(IngestError::Parse { entry: 2, .. })));
    }

    #[test]
    fn word2vec_bad_header() {
        assert!(Word2VecBinary::new(Cursor::new(b"garbage\n".to_vec())).is_err());
        assert!(Word2VecBinary::new(Cursor::new(b"3 0\n".to_vec())).is_err());
    }

    #[test]
    fn word2vec_oversized_dimension_is_rejected() {
        let hostile = Word2VecBinary::new(Cursor::new(b"1 4611686018427387904\ncat ".to_vec()));
        assert!(matches!(hostile, Err(IngestError::Parse { entry: 0, .. })));

        let header = format!("1 {}\n", config::MAX_DIMENSION + 1);
        assert!(matches!(
            Word2VecBinary::new(Cursor::new(header.into_bytes())),
            Err(IngestError::Parse { entry: 0, .. })
        ));
    }

    fn gzip(bytes: &[u8]) -> Vec<u8> {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(bytes).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn gzipped_text_is_decoded() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("glove.6B.2d.txt.gz");
        std::fs::write(&path, gzip(b"cat 0 1\ndog 0 0.9\n")).unwrap();

        let items = collect(open_embeddings(&path).unwrap());
        assert_eq!(
            items,
            vec![
                ("cat".to_string(), vec![0.0, 1.0]),
                ("dog".to_string(), vec![0.0, 0.9]),
            ]
        );
    }

    #[test]
    fn gzipped_word2vec_binary_is_decoded() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("vectors.BIN.gz");
        let bytes = word2vec_bytes(&[("cat", [0.0, 1.0]), ("car", [1.0, 0.0])]);
        std::fs::write(&path, gzip(&bytes)).unwrap();

        let items = collect(open_embeddings(&path).unwrap());
        assert_eq!(items[1], ("car".to_string(), vec![1.0, 0.0]));
    }

    #[test]
    fn corrupt_gzip_is_an_io_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("broken.txt.gz");
        std::fs::write(&path, b"not gzip at all").unwrap();

        let results: Vec<_> = open_embeddings(&path).unwrap().collect();
        assert!(matches!(results.first(), Some(Err(IngestError::Io(_)))));
    }
}
