use async_trait::async_trait;
use serde_json::json;
use sha2::{Digest, Sha256};

#[async_trait]
pub trait Embedder: Send + Sync {
    fn model_id(&self) -> String;
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;
}

pub struct OpenAiEmbedder {
    pub model: String,
    pub api_key: String,
    pub client: reqwest::Client,
}

impl OpenAiEmbedder {
    pub fn new(model: String, api_key: String) -> Self {
        Self {
            model,
            api_key,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_id(&self) -> String {
        format!("openai:{}", self.model)
    }

    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let url = "https://api.openai.com/v1/embeddings";
        let body = json!({ "model": self.model, "input": text });

        let resp = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let error_text = resp.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI embeddings API error: {}", error_text);
        }

        let json: serde_json::Value = resp.json().await?;
        let arr = json
            .pointer("/data/0/embedding")
            .and_then(|v| v.as_array())
            .ok_or_else(|| anyhow::anyhow!("embeddings response missing vector"))?;

        let mut out = Vec::with_capacity(arr.len());
        for v in arr {
            out.push(
                v.as_f64()
                    .ok_or_else(|| anyhow::anyhow!("non-numeric embedding component"))?
                    as f32,
            );
        }
        Ok(out)
    }
}

/// Deterministic embedder for tests and offline runs: hashes the text into a
/// fixed-dimension vector. Not semantically meaningful, only plumbing.
pub struct FakeEmbedder {
    pub dims: usize,
}

impl Default for FakeEmbedder {
    fn default() -> Self {
        Self { dims: 32 }
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    fn model_id(&self) -> String {
        format!("fake-{}", self.dims)
    }

    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let mut h = Sha256::new();
        h.update(text.as_bytes());
        let digest = h.finalize();
        let mut out = Vec::with_capacity(self.dims);
        for i in 0..self.dims {
            let byte = digest[i % digest.len()];
            out.push((byte as f32 / 255.0) - 0.5 + (i as f32 * 1e-3));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_embedder_is_deterministic() -> anyhow::Result<()> {
        let e = FakeEmbedder::default();
        let a = e.embed("photosynthesis").await?;
        let b = e.embed("photosynthesis").await?;
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
        Ok(())
    }
}
