/*!
A streaming, push-based PDF parser.

`rill` reads a PDF document and delivers typed events to an
application-provided sink as lexical and structural constructs are
recognized. There is no in-memory document tree: the application
materializes only what it needs from the event stream, which keeps memory
usage flat even for very large documents.

Two modes are supported:

- **Push traversal** ([`Parser::parse`]): the whole document is walked in
  breadth-first discovery order, starting from the trailer dictionary,
  then `/Root`, then `/Info`, then the transitive closure of references.
- **Pull traversal** ([`Parser::load`] + [`Parser::parse_object`]): only
  the cross-reference data is loaded up front; the application resolves
  individual objects on demand and chases references selectively.

Cross-reference tables in all their forms are supported (legacy sections,
xref streams, incremental updates, compressed objects in object streams),
as are the standard non-image stream filters (`FlateDecode`, `LZWDecode`,
`ASCIIHexDecode`, `ASCII85Decode`, `RunLengthDecode`) with PNG and TIFF
predictors. Decoded stream content can additionally be routed to
specialized sub-parsers for content streams, font programs and CMaps.

This crate is read-only: it does not render, decrypt or write PDF files.

# Example

```rust
use rill::{DocumentSink, Name, Parser, Result};

/// Collects every name value in the document.
struct NameCollector {
    names: Vec<String>,
}

impl DocumentSink for NameCollector {
    fn name_value(&mut self, value: &Name) -> Result<()> {
        self.names.push(value.as_str().to_owned());
        Ok(())
    }
}

// A minimal document: a catalog and an empty page tree.
let mut pdf: Vec<u8> = b"%PDF-1.4\n".to_vec();
let first = pdf.len();
pdf.extend_from_slice(b"1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n");
let second = pdf.len();
pdf.extend_from_slice(b"2 0 obj\n<< /Type /Pages /Kids [] /Count 0 >>\nendobj\n");
let xref = pdf.len();
pdf.extend_from_slice(b"xref\n0 3\n0000000000 65535 f \n");
pdf.extend_from_slice(format!("{first:010} 00000 n \n").as_bytes());
pdf.extend_from_slice(format!("{second:010} 00000 n \n").as_bytes());
pdf.extend_from_slice(b"trailer\n<< /Size 3 /Root 1 0 R >>\nstartxref\n");
pdf.extend_from_slice(format!("{xref}\n%%EOF").as_bytes());

let mut parser = Parser::new(NameCollector { names: Vec::new() });
parser.parse(pdf).unwrap();

assert_eq!(parser.sink().names, ["Catalog", "Pages"]);
```
*/

#![deny(missing_docs)]

pub mod error;
pub mod object;
pub mod sink;
pub mod source;
pub mod xref;

mod cmap;
mod content;
mod filter;
mod lexer;
mod object_stream;
mod opentype;
mod parser;
mod trivia;

pub use error::{Error, Result};
pub use object::{Dict, Name, Number, ObjectId, Value};
pub use parser::Parser;
pub use sink::{CMapSink, ContentSink, DocumentSink, OpenTypeSink, StreamKind, StreamParser};
pub use source::ByteSource;
pub use xref::{CrossReferenceEntry, CrossReferenceTable};
