pub mod chunker;
pub mod extractor;
pub mod processor;
#[doc(hidden)]
pub mod sample;

pub use chunker::TextChunker;
pub use extractor::{extract_text, ExtractionError};
pub use processor::{DocumentProcessor, IngestReport};
