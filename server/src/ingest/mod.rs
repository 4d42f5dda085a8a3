//! Turns uploaded PDFs into embedded, scoped chunks in the vector index.

pub mod chunk;
pub mod pdf;

use sha2::{Digest as _, Sha256};
use tracing::{debug, info};

pub use chunk::chunk_text;
pub use pdf::{PageText, PdfError, extract_pages};

use crate::{
    app::Scope,
    clients::{ChunkMetadata, ClientError, Embedder, VectorIndex, VectorRecord},
    config::IngestConfig,
};

/// Who uploaded a document and where it belongs.
#[derive(Debug, Clone, Copy)]
pub struct Upload<'req> {
    pub scope: &'req Scope,
    pub user_id: &'req str,
    pub filename: &'req str,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    /// Pages with enough text to be indexed.
    pub pages: u32,
    /// Chunks written to the index.
    pub chunks: usize,
}

/// Stable id of a chunk vector; re-uploading the same file overwrites its vectors.
pub fn vector_id(filename: &str, page: u32, chunk_index: u32, user_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(filename.as_bytes());
    hasher.update(page.to_string().as_bytes());
    hasher.update(chunk_index.to_string().as_bytes());
    hasher.update(user_id.as_bytes());
    hex::encode(hasher.finalize())
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn checksum(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

struct Batcher<'run> {
    upload: Upload<'run>,
    embedder: &'run dyn Embedder,
    index: &'run dyn VectorIndex,
    pending: Vec<(u32, u32, String)>,
    written: usize,
}

impl Batcher<'_> {
    async fn flush(&mut self) -> Result<(), ClientError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let batch = core::mem::take(&mut self.pending);
        let texts: Vec<String> = batch.iter().map(|&(_, _, ref text)| text.clone()).collect();
        let embeddings = self.embedder.embed(&texts).await?;

        let scope = self.upload.scope;
        let records: Vec<VectorRecord> = batch
            .into_iter()
            .zip(embeddings)
            .map(|((page, chunk_index, text), values)| VectorRecord {
                id: vector_id(self.upload.filename, page, chunk_index, self.upload.user_id),
                values,
                metadata: ChunkMetadata {
                    company_id: scope.company_id.clone(),
                    team_id: scope.team_id.clone(),
                    project_id: scope.project_id.clone(),
                    user_id: self.upload.user_id.to_string(),
                    doc_name: self.upload.filename.to_string(),
                    page,
                    chunk_index,
                    text,
                },
            })
            .collect();

        self.index.upsert(&scope.company_id, &records).await?;
        self.written += records.len();
        debug!(total = self.written, "Chunk batch indexed");
        Ok(())
    }
}

/// Chunks, embeds and upserts the text of `pages`.
///
/// Chunks are embedded in batches of `embed_batch_size` that never span pages. At
/// most `max_chunks` chunks are written per call.
///
/// # Errors
///
/// Returns the first embedding or upsert failure; batches written before it stay
/// in the index.
pub async fn index_pages(
    pages: &[PageText],
    upload: Upload<'_>,
    settings: &IngestConfig,
    embedder: &dyn Embedder,
    index: &dyn VectorIndex,
) -> Result<IngestSummary, ClientError> {
    let mut batcher = Batcher {
        upload,
        embedder,
        index,
        pending: Vec::with_capacity(settings.embed_batch_size),
        written: 0,
    };
    let mut indexed_pages = 0_u32;

    for page in pages {
        if page.text.trim().chars().count() < settings.min_page_chars {
            debug!(page = page.number, "Skipping page without usable text");
            continue;
        }
        indexed_pages += 1;

        let mut chunk_index = 0_u32;
        for chunk in chunk_text(&page.text, settings.chunk_size, settings.chunk_overlap) {
            if chunk.trim().is_empty() {
                continue;
            }
            if batcher.written + batcher.pending.len() >= settings.max_chunks {
                break;
            }
            batcher
                .pending
                .push((page.number, chunk_index, chunk.to_string()));
            chunk_index += 1;
            if batcher.pending.len() >= settings.embed_batch_size {
                batcher.flush().await?;
            }
        }
        batcher.flush().await?;
    }

    info!(
        filename = upload.filename,
        pages = indexed_pages,
        chunks = batcher.written,
        "Document indexed"
    );
    Ok(IngestSummary {
        pages: indexed_pages,
        chunks: batcher.written,
    })
}
