pub mod chunker;
pub mod pipeline;
pub mod retriever;

pub use chunker::{chunk, chunk_pieces, normalize_text, ChunkOptions, ChunkStrategy};
pub use pipeline::{
    IngestOptions, IngestReport, QueryRequest, RagPipeline, RetrievalMode, DEFAULT_SYSTEM_PROMPT,
};
pub use retriever::{build_context, RetrievalContext, RetrievedChunk};
