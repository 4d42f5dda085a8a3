//! PDF text extraction with a per-page time budget.

use alloc::sync::Arc;
use core::time::Duration;

use lopdf::Document;
use thiserror::Error as ThisError;
use tokio::{task, time};
use tracing::{debug, warn};

#[derive(Debug, ThisError)]
pub enum PdfError {
    #[error("not a readable PDF: {0}")]
    Parse(#[from] lopdf::Error),
    #[error("PDF parser task failed: {0}")]
    Join(#[from] task::JoinError),
}

/// Text of one page; pages are numbered from 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

/// Parses `bytes` and extracts the text of every page in order.
///
/// A page whose extraction fails or exceeds `page_timeout` yields empty text.
///
/// # Errors
///
/// Returns an error if the document itself cannot be parsed.
pub async fn extract_pages(bytes: Vec<u8>, page_timeout: Duration) -> Result<Vec<PageText>, PdfError> {
    let document = task::spawn_blocking(move || Document::load_mem(&bytes)).await??;
    let document = Arc::new(document);
    let numbers: Vec<u32> = document.get_pages().into_keys().collect();
    debug!(pages = numbers.len(), "Parsed PDF");

    let mut pages = Vec::with_capacity(numbers.len());
    for number in numbers {
        let doc = Arc::clone(&document);
        let extraction = task::spawn_blocking(move || doc.extract_text(&[number]));
        let text = match time::timeout(page_timeout, extraction).await {
            Ok(Ok(Ok(text))) => {
                debug!(page = number, "Page text extracted");
                text
            }
            Ok(Ok(Err(err))) => {
                warn!(page = number, error = %err, "Page text extraction failed, using empty text");
                String::new()
            }
            Ok(Err(err)) => {
                warn!(page = number, error = %err, "Page extraction task failed, using empty text");
                String::new()
            }
            Err(_) => {
                // The blocking task keeps running to completion; its result is discarded.
                warn!(page = number, timeout = ?page_timeout, "Page text extraction timed out, using empty text");
                String::new()
            }
        };
        pages.push(PageText { number, text });
    }
    Ok(pages)
}
