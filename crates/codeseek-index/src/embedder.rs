//! Validated embedding calls.

use std::sync::Arc;

use codeseek_llm::LlmProvider;

use crate::error::{IndexError, Result};

/// Text used to discover the vector dimension when creating a table.
pub(crate) const PROBE_TEXT: &str = "dummy text";

#[derive(Debug)]
pub struct Embedder<P> {
    provider: Arc<P>,
}

impl<P> Clone for Embedder<P> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
        }
    }
}

impl<P: LlmProvider> Embedder<P> {
    #[must_use]
    pub fn new(provider: Arc<P>) -> Self {
        Self { provider }
    }

    #[must_use]
    pub fn provider(&self) -> &Arc<P> {
        &self.provider
    }

    /// # Errors
    ///
    /// Returns [`IndexError::Embedding`] if the service fails or the vector is empty
    /// or contains non-finite values.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let vector = self.provider.embed(text).await?;
        validate_embedding(&vector, None)?;
        Ok(vector)
    }

    /// Embed texts one after another, preserving order.
    ///
    /// # Errors
    ///
    /// Fails on the first service error or on a vector whose length differs from
    /// `dimension` (when given) or from the first vector of the batch.
    pub async fn embed_batch(
        &self,
        texts: &[String],
        dimension: Option<usize>,
    ) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        let mut expected = dimension;
        for text in texts {
            let vector = self.provider.embed(text).await?;
            validate_embedding(&vector, expected)?;
            expected.get_or_insert(vector.len());
            vectors.push(vector);
        }
        Ok(vectors)
    }
}

/// # Errors
///
/// Returns [`IndexError::Embedding`] describing the first problem found.
pub fn validate_embedding(vector: &[f32], expected_dim: Option<usize>) -> Result<()> {
    if vector.is_empty() {
        return Err(IndexError::Embedding("empty embedding vector".into()));
    }
    if let Some(dim) = expected_dim
        && vector.len() != dim
    {
        return Err(IndexError::Embedding(format!(
            "embedding has {} dimensions, expected {dim}",
            vector.len()
        )));
    }
    if let Some(pos) = vector.iter().position(|v| !v.is_finite()) {
        return Err(IndexError::Embedding(format!(
            "embedding contains a non-finite value at index {pos}"
        )));
    }
    Ok(())
}
