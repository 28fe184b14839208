use anyhow::Context;
use axum::{
    Json,
    body::Bytes,
    extract::{State, rejection::BytesRejection},
    http::{HeaderMap, header},
    response::{IntoResponse, Response},
};
use base64::{Engine as _, engine::general_purpose};
use futures::StreamExt;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::Instrument;

use crate::{
    AppState,
    cnfg::AppConfig,
    error::{HttpError, InputError},
    pdf_options::{PdfOptions, PdfOptionsInput},
};

#[derive(Deserialize)]
pub struct ConvertRequest {
    pub html: Option<String>,
    #[serde(flatten)]
    pub options: PdfOptionsInput,
}

#[derive(Deserialize)]
pub struct RawConvertRequest {
    pub html_content: Option<String>,
}

#[derive(Deserialize)]
pub struct BatchConvertRequest {
    #[serde(default)]
    pub html_list: Vec<String>,
    #[serde(flatten)]
    pub options: PdfOptionsInput,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct BatchItem {
    pub index: usize,
    pub pdf_base64: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct BatchConvertResponse {
    pub results: Vec<BatchItem>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "html-to-pdf-microservice",
    })
}

/// `POST /convert`: JSON with options, or a raw `text/html` body.
pub async fn convert(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, HttpError> {
    let body = body.map_err(HttpError::Rejected)?;
    let (html, options) =
        normalize_convert(&headers, &body, &state.config).map_err(HttpError::bad_request)?;

    let pdf_bytes = state.renderer.render(&html, &options).await?;

    Ok(pdf_response(pdf_bytes))
}

/// `POST /convert-raw`: `{"html_content": "..."}` rendered with default options.
pub async fn convert_raw(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, HttpError> {
    let body = body.map_err(HttpError::Rejected)?;
    let payload: RawConvertRequest = parse_json(&body).map_err(HttpError::bad_request)?;
    let html = payload.html_content.unwrap_or_default();
    validate_html(&html, state.config.max_html_size).map_err(HttpError::bad_request)?;

    let options = with_configured_templates(PdfOptions::default(), &state.config);
    let pdf_bytes = state.renderer.render(&html, &options).await?;

    Ok(pdf_response(pdf_bytes))
}

/// `POST /convert/batch`: every document rendered with the same options,
/// returned base64-encoded in input order. One failure fails the batch.
pub async fn convert_batch(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<BatchConvertResponse>, HttpError> {
    let body = body.map_err(HttpError::Rejected)?;
    let payload: BatchConvertRequest = parse_json(&body).map_err(HttpError::bad_request)?;
    validate_batch(&payload.html_list, &state.config).map_err(HttpError::bad_request)?;

    let options = payload.options.resolve().map_err(HttpError::bad_request)?;
    let options = with_configured_templates(options, &state.config);

    tracing::info!("Converting batch of {} documents", payload.html_list.len());

    let renderer = &state.renderer;
    let options = &options;
    // Collect everything before looking at errors so no render is dropped
    // mid-flight with its page still open.
    let outcomes: Vec<anyhow::Result<BatchItem>> =
        futures::stream::iter(payload.html_list.into_iter().enumerate())
            .map(|(index, html)| async move {
                let pdf = renderer
                    .render(&html, options)
                    .instrument(tracing::info_span!("batch_item", index))
                    .await
                    .with_context(|| format!("item at index {}", index))?;
                Ok::<_, anyhow::Error>(BatchItem {
                    index,
                    pdf_base64: general_purpose::STANDARD.encode(pdf),
                })
            })
            .buffer_unordered(state.config.batch_concurrency)
            .collect()
            .await;

    let mut results = outcomes.into_iter().collect::<anyhow::Result<Vec<_>>>()?;
    results.sort_by_key(|item| item.index);

    Ok(Json(BatchConvertResponse { results }))
}

/// Splits a `/convert` body into the HTML to render and the options to use.
/// JSON bodies (`application/json`, any `application/*+json`, or no
/// `Content-Type` at all) carry their own options; raw HTML always gets the
/// defaults.
pub fn normalize_convert(
    headers: &HeaderMap,
    body: &[u8],
    config: &AppConfig,
) -> Result<(String, PdfOptions), InputError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(mime_essence);

    let (html, options) = match content_type.as_deref() {
        None | Some("application/json") => json_body(body, config)?,
        Some("text/html") => {
            let html = std::str::from_utf8(body)
                .map_err(|_| InputError::InvalidUtf8)?
                .to_string();
            validate_html(&html, config.max_html_size)?;
            (html, PdfOptions::default())
        }
        Some(json) if json.starts_with("application/") && json.ends_with("+json") => {
            json_body(body, config)?
        }
        Some(other) => return Err(InputError::UnsupportedContentType(other.to_string())),
    };

    Ok((html, with_configured_templates(options, config)))
}

fn json_body(body: &[u8], config: &AppConfig) -> Result<(String, PdfOptions), InputError> {
    let payload: ConvertRequest = parse_json(body)?;
    let html = payload.html.unwrap_or_default();
    validate_html(&html, config.max_html_size)?;
    Ok((html, payload.options.resolve()?))
}

fn with_configured_templates(options: PdfOptions, config: &AppConfig) -> PdfOptions {
    options.with_templates(
        config.header_template.as_deref(),
        config.footer_template.as_deref(),
    )
}

fn validate_html(html: &str, max_html_size: usize) -> Result<(), InputError> {
    if html.trim().is_empty() {
        return Err(InputError::MissingHtml);
    }
    if html.len() > max_html_size {
        return Err(InputError::HtmlTooLarge {
            limit: max_html_size,
        });
    }
    Ok(())
}

fn validate_batch(html_list: &[String], config: &AppConfig) -> Result<(), InputError> {
    if html_list.is_empty() {
        return Err(InputError::EmptyBatch);
    }
    if html_list.len() > config.max_batch_size {
        return Err(InputError::BatchTooLarge {
            limit: config.max_batch_size,
        });
    }
    for (index, html) in html_list.iter().enumerate() {
        if html.trim().is_empty() {
            return Err(InputError::EmptyHtmlAt { index });
        }
        if html.len() > config.max_html_size {
            return Err(InputError::HtmlTooLargeAt {
                index,
                limit: config.max_html_size,
            });
        }
    }
    Ok(())
}

fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, InputError> {
    Ok(serde_json::from_slice(body)?)
}

// "text/html; charset=utf-8" -> "text/html"
fn mime_essence(value: &str) -> String {
    value
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn pdf_response(pdf_bytes: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, "application/pdf"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=document.pdf",
            ),
        ],
        pdf_bytes,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn headers(content_type: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_str(content_type).unwrap(),
        );
        headers
    }

    #[test]
    fn json_body_with_options() {
        let body = br#"{"html": "<p>hi</p>", "format": "A3", "margin": {"top": "2cm"}}"#;
        let (html, options) =
            normalize_convert(&headers("application/json"), body, &AppConfig::default()).unwrap();

        assert_eq!(html, "<p>hi</p>");
        assert_eq!(options.format, crate::pdf_options::PaperFormat::A3);
        assert!((options.margin.top - 2.0 / 2.54).abs() < 1e-9);
    }

    #[test]
    fn raw_html_is_taken_verbatim() {
        let body = br#"{"html": "not json parsing"}"#;
        let (html, options) = normalize_convert(
            &headers("text/html; charset=utf-8"),
            body,
            &AppConfig::default(),
        )
        .unwrap();

        assert_eq!(html.as_bytes(), body);
        assert_eq!(options, PdfOptions::default());
    }

    #[test]
    fn missing_or_blank_html() {
        let config = AppConfig::default();
        for body in [
            &b"{}"[..],
            &br#"{"html": ""}"#[..],
            &br#"{"html": "  \n "}"#[..],
        ] {
            let err = normalize_convert(&headers("application/json"), body, &config).unwrap_err();
            assert!(matches!(err, InputError::MissingHtml));
        }

        let err = normalize_convert(&headers("text/html"), b"", &config).unwrap_err();
        assert_eq!(err.to_string(), "HTML content is required");
    }

    #[test]
    fn rejects_unusable_bodies() {
        let config = AppConfig::default();

        let err = normalize_convert(&headers("application/json"), b"{not json", &config);
        assert!(matches!(err, Err(InputError::InvalidJson(_))));

        let err = normalize_convert(&headers("text/html"), &[0xff, 0xfe, 0x00], &config);
        assert!(matches!(err, Err(InputError::InvalidUtf8)));

        let err = normalize_convert(&headers("text/plain"), b"<p>x</p>", &config);
        assert!(matches!(err, Err(InputError::UnsupportedContentType(ct)) if ct == "text/plain"));

        // Without a Content-Type the body is read as JSON.
        let err = normalize_convert(&HeaderMap::new(), b"<p>x</p>", &config);
        assert!(matches!(err, Err(InputError::InvalidJson(_))));

        let err = normalize_convert(&headers("application/xml+json-ish"), b"{}", &config);
        assert!(matches!(err, Err(InputError::UnsupportedContentType(_))));
    }

    #[test]
    fn json_without_content_type_or_with_json_suffix() {
        let config = AppConfig::default();
        let body = br#"{"html": "<p>x</p>", "landscape": true}"#;

        let (html, options) = normalize_convert(&HeaderMap::new(), body, &config).unwrap();
        assert_eq!(html, "<p>x</p>");
        assert!(options.landscape);

        let (html, _) = normalize_convert(
            &headers("application/merge-patch+json; charset=utf-8"),
            body,
            &config,
        )
        .unwrap();
        assert_eq!(html, "<p>x</p>");
    }

    #[test]
    fn enforces_html_size_limit() {
        let config = AppConfig {
            max_html_size: 8,
            ..AppConfig::default()
        };
        let err = normalize_convert(&headers("text/html"), b"<p>too long</p>", &config);
        assert!(matches!(err, Err(InputError::HtmlTooLarge { limit: 8 })));
    }

    #[test]
    fn configured_templates_apply_to_both_shapes() {
        let config = AppConfig {
            footer_template: Some("<span class=pageNumber></span>".to_string()),
            ..AppConfig::default()
        };
        let (_, options) = normalize_convert(&headers("text/html"), b"<p>x</p>", &config).unwrap();
        assert!(options.displays_header_footer());

        let (_, options) =
            normalize_convert(&headers("application/json"), br#"{"html": "x"}"#, &config).unwrap();
        assert_eq!(
            options.footer_template.as_deref(),
            Some("<span class=pageNumber></span>")
        );
    }

    #[test]
    fn batch_validation_names_the_index() {
        let config = AppConfig {
            max_batch_size: 2,
            ..AppConfig::default()
        };

        assert!(matches!(
            validate_batch(&[], &config),
            Err(InputError::EmptyBatch)
        ));

        let list = vec!["<p>a</p>".to_string(), " ".to_string()];
        let err = validate_batch(&list, &config).unwrap_err();
        assert_eq!(err.to_string(), "HTML content at index 1 is empty");

        let list = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        assert!(matches!(
            validate_batch(&list, &config),
            Err(InputError::BatchTooLarge { limit: 2 })
        ));
    }
}
