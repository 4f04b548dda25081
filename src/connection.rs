use crate::CanvasCredentials;
use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;

/// Error raised for any non-2xx response from the Canvas API.
///
/// Carries the HTTP status code and the raw response body so callers can
/// surface the backend's own explanation. Requests are single-shot: a failed
/// call aborts the current operation and is never retried automatically.
#[derive(Debug, Clone)]
pub struct HttpError {
    pub status: u16,
    pub body: String,
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP {}: {}", self.status, self.body)
    }
}

impl Error for HttpError {}

/// HTTP request methods understood by the Canvas API layer.
///
/// Mutating variants carry their JSON body so a single dispatch point can
/// build the full request.
#[derive(Clone)]
pub enum HttpMethod {
    Get,
    Put(Value),
    Post(Value),
    Delete,
}

lazy_static! {
    // One `Link` header entry: <https://...>; rel="next"
    static ref LINK_RELATION: Regex = Regex::new(r#"<([^<>]+)>\s*;\s*rel="([a-z]+)""#).unwrap();
}

/// Parses an RFC 5988 `Link` header into a rel -> URL map.
pub(crate) fn parse_link_header(header: &str) -> HashMap<String, String> {
    LINK_RELATION
        .captures_iter(header)
        .map(|caps| (caps[2].to_string(), caps[1].to_string()))
        .collect()
}

/// Decides whether pagination continues and where the next page lives.
///
/// Pagination stops when the caller asked for the first page only, when the
/// response carries no "current" or "last" relation, or when "current" and
/// "last" point at the same URL. Otherwise the walk follows the "next"
/// relation verbatim (Canvas emits absolute URLs there).
pub(crate) fn next_page_url(links: &HashMap<String, String>, stop_at_first: bool) -> Option<String> {
    if stop_at_first {
        return None;
    }
    let current = links.get("current")?;
    let last = links.get("last")?;
    if current == last {
        return None;
    }
    links.get("next").cloned()
}

/// Sends one HTTP request to an absolute URL, single attempt.
///
/// Every request carries the bearer token from the credentials. A non-2xx
/// status is converted into [`HttpError`] with the response body attached.
pub fn send_http_request(
    method: &HttpMethod,
    url: &str,
    canvas_info: &CanvasCredentials,
    params: &[(String, String)],
) -> Result<reqwest::blocking::Response, Box<dyn Error>> {
    let request_builder = match method {
        HttpMethod::Get => canvas_info
            .client
            .get(url)
            .bearer_auth(&canvas_info.token_canvas)
            .query(params),
        HttpMethod::Put(body) => canvas_info
            .client
            .put(url)
            .bearer_auth(&canvas_info.token_canvas)
            .json(body),
        HttpMethod::Post(body) => canvas_info
            .client
            .post(url)
            .bearer_auth(&canvas_info.token_canvas)
            .json(body),
        HttpMethod::Delete => canvas_info
            .client
            .delete(url)
            .bearer_auth(&canvas_info.token_canvas)
            .query(params),
    };

    let response = request_builder.send()?;
    if response.status().is_success() {
        Ok(response)
    } else {
        let status = response.status().as_u16();
        let body = response.text().unwrap_or_default();
        Err(Box::new(HttpError { status, body }))
    }
}

/// Fetches every page of a paginated endpoint, in server order.
///
/// `path` is relative to the API root in the credentials; follow-up pages use
/// the absolute URL from the `Link` header. Each decoded page body is
/// appended as-is: collection endpoints yield one JSON array per page,
/// single-resource endpoints yield a single one-object page. Callers flatten.
pub fn request_paginated(
    canvas_info: &CanvasCredentials,
    path: &str,
    stop_at_first: bool,
) -> Result<Vec<Value>, Box<dyn Error>> {
    let mut pages = Vec::new();
    let mut url = format!("{}{}", canvas_info.url_canvas, path);
    loop {
        debug!("GET {}", url);
        let response = send_http_request(&HttpMethod::Get, &url, canvas_info, &[])?;
        let links = response
            .headers()
            .get(reqwest::header::LINK)
            .and_then(|value| value.to_str().ok())
            .map(parse_link_header)
            .unwrap_or_default();
        pages.push(response.json::<Value>()?);
        match next_page_url(&links, stop_at_first) {
            Some(next) => url = next,
            None => break,
        }
    }
    debug!("fetched {} page(s) for {}", pages.len(), path);
    Ok(pages)
}

/// True when an error is an [`HttpError`] for a missing resource.
///
/// Lookup paths treat 404 as "not found" rather than a failure.
pub fn is_not_found(error: &Box<dyn Error>) -> bool {
    matches!(
        error.downcast_ref::<HttpError>(),
        Some(HttpError { status: 404, .. })
    )
}

fn decode_mutation_response(
    response: reqwest::blocking::Response,
) -> Result<Option<Value>, Box<dyn Error>> {
    if response.status() == reqwest::StatusCode::NO_CONTENT {
        return Ok(None);
    }
    let text = response.text()?;
    if text.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(&text)?))
}

/// PUT `body` to `path`; returns the decoded response, or `None` on 204.
pub fn put_json(
    canvas_info: &CanvasCredentials,
    path: &str,
    body: Value,
) -> Result<Option<Value>, Box<dyn Error>> {
    let url = format!("{}{}", canvas_info.url_canvas, path);
    debug!("PUT {}", url);
    let response = send_http_request(&HttpMethod::Put(body), &url, canvas_info, &[])?;
    decode_mutation_response(response)
}

/// POST `body` to `path`; returns the decoded response, or `None` on 204.
pub fn post_json(
    canvas_info: &CanvasCredentials,
    path: &str,
    body: Value,
) -> Result<Option<Value>, Box<dyn Error>> {
    let url = format!("{}{}", canvas_info.url_canvas, path);
    debug!("POST {}", url);
    let response = send_http_request(&HttpMethod::Post(body), &url, canvas_info, &[])?;
    decode_mutation_response(response)
}

/// DELETE `path`; returns the decoded response, or `None` on 204.
pub fn delete_json(
    canvas_info: &CanvasCredentials,
    path: &str,
) -> Result<Option<Value>, Box<dyn Error>> {
    let url = format!("{}{}", canvas_info.url_canvas, path);
    debug!("DELETE {}", url);
    let response = send_http_request(&HttpMethod::Delete, &url, canvas_info, &[])?;
    decode_mutation_response(response)
}
