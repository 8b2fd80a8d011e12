#![warn(missing_docs)]
//! Reqwest transport adapter for Courier.
//!
//! [`ReqwestTransport`] implements [`Transport`] over a
//! [`reqwest::Client`]. The adapter is deliberately thin: it maps the
//! request descriptor onto the wire and decodes the body according to
//! the response-kind hint. HTTP error statuses are *not* turned into
//! transport failures — the response (status, headers, decoded body) is
//! returned as-is so the pipeline's code-based stages can interpret it;
//! only network and decode failures become errors.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use courier::{Courier, CourierConfig};
//! use courier_reqwest::ReqwestTransport;
//!
//! let transport = Arc::new(ReqwestTransport::new(reqwest::Client::new()));
//! let client = Courier::new(transport, CourierConfig::default());
//! ```

use async_trait::async_trait;

use courier_core::{
    Body, Error, FormPart, Request, Response, ResponseBody, ResponseKind, Result, Transport,
};

/// [`Transport`] implementation over [`reqwest::Client`].
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Wraps an existing client, inheriting its pool and defaults.
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: Request) -> Result<Response> {
        let progress = request.upload_progress.clone();
        let body_len = body_length(request.body.as_ref());
        let response_kind = request.response_kind;

        let wire = build(&self.client, request);
        let response = wire
            .send()
            .await
            .map_err(|error| Error::transport(error.to_string()))?;

        // Streamed per-byte progress needs a wrapped body stream; the
        // settled request is reported as fully sent.
        if let (Some(progress), Some(len)) = (progress, body_len) {
            progress(len, len);
        }

        decode(response, response_kind).await
    }
}

fn body_length(body: Option<&Body>) -> Option<u64> {
    match body? {
        Body::Json(value) => Some(value.to_string().len() as u64),
        Body::Bytes(bytes) => Some(bytes.len() as u64),
        Body::Form(form) => Some(
            form.parts()
                .iter()
                .map(|part| match part {
                    FormPart::Text { value, .. } => value.len() as u64,
                    FormPart::Blob { data, .. } => data.len() as u64,
                })
                .sum(),
        ),
    }
}

fn build(client: &reqwest::Client, request: Request) -> reqwest::RequestBuilder {
    let mut builder = client.request(request.method, &request.url);

    if !request.params.is_empty() {
        let query: Vec<(String, String)> = request
            .params
            .into_iter()
            .map(|(key, value)| (key, query_value(&value)))
            .collect();
        builder = builder.query(&query);
    }

    builder = builder.headers(request.headers);

    match request.body {
        None => {}
        Some(Body::Json(value)) => builder = builder.json(&value),
        Some(Body::Bytes(bytes)) => builder = builder.body(bytes),
        Some(Body::Form(form)) => {
            let mut multipart = reqwest::multipart::Form::new();
            for part in form.parts().iter().cloned() {
                multipart = match part {
                    FormPart::Text { name, value } => multipart.text(name.to_string(), value),
                    FormPart::Blob {
                        name,
                        data,
                        filename,
                    } => {
                        let mut blob = reqwest::multipart::Part::bytes(data.to_vec());
                        if let Some(filename) = filename {
                            blob = blob.file_name(filename);
                        }
                        multipart.part(name.to_string(), blob)
                    }
                };
            }
            builder = builder.multipart(multipart);
        }
    }
    builder
}

/// Query rendering: strings go bare, other scalars and structures use
/// their JSON form.
fn query_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

async fn decode(response: reqwest::Response, kind: ResponseKind) -> Result<Response> {
    let status = response.status();
    let headers = response.headers().clone();
    let body = match kind {
        ResponseKind::Json => ResponseBody::Json(
            response
                .json()
                .await
                .map_err(|error| Error::transport_status(error.to_string(), status))?,
        ),
        ResponseKind::Bytes => ResponseBody::Bytes(
            response
                .bytes()
                .await
                .map_err(|error| Error::transport_status(error.to_string(), status))?,
        ),
        ResponseKind::Text => ResponseBody::Text(
            response
                .text()
                .await
                .map_err(|error| Error::transport_status(error.to_string(), status))?,
        ),
    };
    Ok(Response::new(status, headers, body))
}
