use std::io::BufRead;

use crate::error::Error;
use crate::types::Strand;

/// Attribute column of a GTF line, in file order.
///
/// Keys may repeat (GENCODE writes one `tag "..."` pair per tag), so lookups
/// come in a first-value and an all-values flavour.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes {
    pairs: Vec<(String, String)>,
}

impl Attributes {
    /// First value recorded for `key`, or `None` if the key is absent.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Every value recorded for `key`, in file order.
    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.pairs
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Look up a fixed set of keys at once; unmatched keys yield `None`.
    pub fn select<'k>(&self, keys: &[&'k str]) -> Vec<(&'k str, Option<String>)> {
        keys.iter()
            .map(|&k| (k, self.get(k).map(str::to_string)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// A single parsed GTF record.
///
/// Coordinates are kept exactly as written (1-based, inclusive); the splice
/// table reports them verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationRecord {
    pub seqname: String,
    pub source: String,
    pub feature_type: String,
    pub start: i64,
    pub end: i64,
    pub score: Option<f32>,
    pub strand: Strand,
    pub frame: Option<u8>,
    pub attrs: Attributes,
    pub line_no: usize,
}

impl AnnotationRecord {
    /// Convenience: get an attribute value.
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key)
    }

    pub fn is_feature(&self, feature: &str) -> bool {
        self.feature_type == feature
    }
}

fn malformed(line_no: usize, message: impl Into<String>) -> Error {
    Error::parse(format!("annotation line {line_no}"), message)
}

/// Streaming parser for GTF files.
///
/// Most callers want [`crate::annotation::AnnotationBuilder`] instead, which
/// drives this reader and applies the transcript selection rules.
///
/// # Example
/// ```no_run
/// use std::fs::File;
/// use std::io::BufReader;
/// use splice_psi::annotation::io::AnnotationReader;
///
/// let file = File::open("genes.gtf").unwrap();
/// let rdr = AnnotationReader::new(BufReader::new(file));
/// for rec in rdr.records() {
///     match rec {
///         Ok(rec) => println!("{} {}-{}", rec.seqname, rec.start, rec.end),
///         Err(e) => eprintln!("skipping: {e}"),
///     }
/// }
/// ```
pub struct AnnotationReader<R: BufRead> {
    reader: R,
    buf: Vec<u8>,
    line_no: usize,
}

impl<R: BufRead> AnnotationReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            line_no: 0,
        }
    }

    /// Returns an iterator over parsed records.
    ///
    /// - Skips blank lines
    /// - Skips comment lines starting with '#'
    /// - A malformed or non-UTF-8 line yields `Err(Error::Parse)` and iteration continues
    /// - A read failure yields `Err(Error::Io)` and iteration stops
    pub fn records(mut self) -> impl Iterator<Item = Result<AnnotationRecord, Error>> {
        let mut failed = false;
        std::iter::from_fn(move || loop {
            if failed {
                return None;
            }
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => return None,
                Ok(_) => self.line_no += 1,
                Err(e) => {
                    failed = true;
                    return Some(Err(Error::io(e, "<annotation reader>")));
                }
            }

            let Ok(line) = std::str::from_utf8(&self.buf) else {
                return Some(Err(malformed(self.line_no, "invalid UTF-8")));
            };
            let line = line.trim_end_matches(&['\n', '\r'][..]);
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            return Some(parse_record_line(line, self.line_no));
        })
    }
}

/// Parse a single non-comment line into an `AnnotationRecord`.
pub fn parse_record_line(line: &str, line_no: usize) -> Result<AnnotationRecord, Error> {
    // seqname source feature start end score strand frame attributes
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() != 9 {
        return Err(malformed(
            line_no,
            format!("expected 9 tab-separated columns, found {}", fields.len()),
        ));
    }

    let start: i64 = fields[3]
        .trim()
        .parse()
        .map_err(|_| malformed(line_no, format!("non-numeric start '{}'", fields[3])))?;
    let end: i64 = fields[4]
        .trim()
        .parse()
        .map_err(|_| malformed(line_no, format!("non-numeric end '{}'", fields[4])))?;
    if start <= 0 || end < start {
        return Err(malformed(line_no, format!("bad coordinates {start}..{end}")));
    }

    let score = match fields[5] {
        "." => None,
        s => Some(
            s.parse::<f32>()
                .map_err(|_| malformed(line_no, format!("bad score '{s}'")))?,
        ),
    };

    let strand = Strand::from_symbol(fields[6])
        .ok_or_else(|| malformed(line_no, format!("bad strand '{}'", fields[6])))?;

    let frame = match fields[7] {
        "." => None,
        s => {
            let p: u8 = s
                .parse()
                .map_err(|_| malformed(line_no, format!("bad frame '{s}'")))?;
            if p > 2 {
                return Err(malformed(line_no, format!("bad frame '{s}'")));
            }
            Some(p)
        }
    };

    Ok(AnnotationRecord {
        seqname: fields[0].to_string(),
        source: fields[1].to_string(),
        feature_type: fields[2].to_string(),
        start,
        end,
        score,
        strand,
        frame,
        attrs: parse_attributes(fields[8]),
        line_no,
    })
}

/// Parse a GTF attribute blob: `key "value"; key2 "value2";`.
///
/// Pairs without a value are dropped; unquoted values are accepted as-is.
pub fn parse_attributes(s: &str) -> Attributes {
    let mut pairs = Vec::new();
    for part in s.split(';') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let mut it = part.splitn(2, char::is_whitespace);
        let key = it.next().unwrap_or("").trim();
        let value = unquote(it.next().unwrap_or(""));
        if key.is_empty() || value.is_empty() {
            continue;
        }
        pairs.push((key.to_string(), value));
    }
    Attributes { pairs }
}

fn unquote(v: &str) -> String {
    let v = v.trim();
    let v = v.strip_prefix('"').unwrap_or(v);
    let v = v.strip_suffix('"').unwrap_or(v);
    v.to_string()
}
