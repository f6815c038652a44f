//! Response headers for documents and single-fetch payloads, merged from
//! the matched routes.
//!
//! # Responsibilities
//! - Stop at the route whose boundary renders the error
//! - Hand the boundary route the headers of the route that failed
//! - Run each route's `headers` function with its parent's result
//! - Carry `Set-Cookie` from every loader and action up to the response

use axum::http::header::{HeaderMap, SET_COOKIE};

use crate::build::HeadersArgs;
use crate::data::StaticHandlerContext;

/// Append the parent's cookies the child does not already set.
fn prepend_cookies(parent: &HeaderMap, child: &mut HeaderMap) {
    let existing: Vec<_> = child.get_all(SET_COOKIE).iter().cloned().collect();
    for cookie in parent.get_all(SET_COOKIE) {
        if !existing.contains(cookie) {
            child.append(SET_COOKIE, cookie.clone());
        }
    }
}

pub fn document_headers(context: &StaticHandlerContext) -> HeaderMap {
    let boundary_idx = context.errors.as_ref().and_then(|errors| {
        context
            .matches
            .iter()
            .position(|m| errors.contains_key(&m.route.id))
    });
    let matches = match boundary_idx {
        Some(idx) => &context.matches[..=idx],
        None => &context.matches[..],
    };

    // Headers of the failing route at or below the boundary, and its id.
    let error_headers = boundary_idx.and_then(|idx| {
        context.matches[idx..].iter().find_map(|m| {
            let id = &m.route.id;
            let action_failed = context
                .action_data
                .as_ref()
                .map(|data| !data.contains_key(id))
                .unwrap_or(true);
            match (context.action_headers.get(id), context.loader_headers.get(id)) {
                (Some(headers), _) if action_failed => Some((id.as_str(), headers)),
                (_, Some(headers)) if !context.loader_data.contains_key(id) => Some((id.as_str(), headers)),
                _ => None,
            }
        })
    });

    let empty = HeaderMap::new();
    let mut parent_headers = HeaderMap::new();
    for (idx, m) in matches.iter().enumerate() {
        let id = &m.route.id;
        let loader_headers = context.loader_headers.get(id).unwrap_or(&empty);
        let action_headers = context.action_headers.get(id).unwrap_or(&empty);
        let boundary_error = error_headers.filter(|_| idx == matches.len() - 1);
        // The failing route's own headers are merged below anyway.
        let error_cookies = boundary_error
            .filter(|(source, _)| *source != id.as_str())
            .map(|(_, headers)| headers);

        let mut headers = match &m.route.module.headers {
            None => parent_headers.clone(),
            Some(headers_fn) => headers_fn(&HeadersArgs {
                loader_headers,
                parent_headers: &parent_headers,
                action_headers,
                error_headers: boundary_error.map(|(_, headers)| headers),
            }),
        };

        if let Some(error_headers) = error_cookies {
            prepend_cookies(error_headers, &mut headers);
        }
        prepend_cookies(action_headers, &mut headers);
        prepend_cookies(loader_headers, &mut headers);
        if m.route.module.headers.is_some() {
            prepend_cookies(&parent_headers, &mut headers);
        }
        parent_headers = headers;
    }
    parent_headers
}
