use futures_util::future::BoxFuture;
use reqwest::header::USER_AGENT;
use serde_json::Value;

use crate::config::Config;
use crate::error::TranslateError;

/// Source text in, translated text out. One independent request per call.
pub trait Translate: Send + Sync + 'static {
    fn translate<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<String, TranslateError>>;
}

/// Client for the public `translate_a/single` endpoint in plain-text mode.
pub struct WebTranslator {
    client: reqwest::Client,
    endpoint: String,
    client_id: String,
    source_lang: String,
    target_lang: String,
    user_agent: String,
}

impl WebTranslator {
    pub fn new(cfg: &Config) -> Result<Self, TranslateError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = cfg.request_timeout() {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            endpoint: cfg.endpoint.clone(),
            client_id: cfg.client_id.clone(),
            source_lang: cfg.source_lang.clone(),
            target_lang: cfg.target_lang.clone(),
            user_agent: cfg.user_agent.clone(),
        })
    }

    /// `dt=t` selects the sentence-translation block only. Query values are percent-encoded by reqwest.
    pub fn request(&self, text: &str) -> reqwest::RequestBuilder {
        self.client
            .get(&self.endpoint)
            .query(&[
                ("client", self.client_id.as_str()),
                ("sl", self.source_lang.as_str()),
                ("tl", self.target_lang.as_str()),
                ("dt", "t"),
                ("q", text),
            ])
            .header(USER_AGENT, &self.user_agent)
    }

    async fn fetch(&self, text: &str) -> Result<String, TranslateError> {
        let resp = self.request(text).send().await?.error_for_status()?;
        let body = resp.text().await?;
        parse_response(&body)
    }
}

impl Translate for WebTranslator {
    fn translate<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<String, TranslateError>> {
        Box::pin(self.fetch(text))
    }
}

/// Concatenates the first element of every sentence entry in `body[0]`, in order.
///
/// The body looks like `[[["Hello", "안녕", null, null], ...], null, "ko", ...]`.
/// Entries whose first element is missing or null are skipped; a null sentence
/// block yields an empty string.
pub fn parse_response(body: &str) -> Result<String, TranslateError> {
    let data: Value = serde_json::from_str(body)?;
    let outer = data
        .as_array()
        .ok_or_else(|| TranslateError::Parse("expected a top-level array".into()))?;

    let sentences = match outer.first() {
        None | Some(Value::Null) => return Ok(String::new()),
        Some(Value::Array(sentences)) => sentences,
        Some(other) => {
            return Err(TranslateError::Parse(format!(
                "expected a sentence list, found {}",
                other
            )))
        }
    };

    Ok(sentences
        .iter()
        .filter_map(|s| s.as_array()?.first()?.as_str())
        .collect())
}
