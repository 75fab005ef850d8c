//! SSE live tail
//!
//! Subscribes the connection to the broadcast hub and relays matching
//! entries as `log` events. The subscription handle lives inside the stream,
//! so a dropped connection unsubscribes automatically. Filter parse errors
//! fail the request before the stream starts.

use crate::error::AppError;
use crate::handlers::AppState;
use crate::logs::{Severity, Source, StreamFilter};
use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{self, Stream};
use serde::Deserialize;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Default, Deserialize)]
pub struct StreamParams {
    /// CSV of severities to receive; empty means all
    pub levels: Option<String>,
    /// CSV of sources to receive; empty means all
    pub sources: Option<String>,
}

/// GET /logs/stream - live tail over Server-Sent Events
pub async fn stream_logs(
    State(state): State<AppState>,
    Query(params): Query<StreamParams>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, AppError> {
    let filter = build_stream_filter(&params)?;
    let subscription = state.hub.subscribe(filter);

    let stream = stream::unfold(subscription, |mut sub| async move {
        let entry = sub.recv().await?;
        Some((Event::default().event("log").json_data(&entry), sub))
    });

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("ping"),
    ))
}

fn build_stream_filter(params: &StreamParams) -> Result<StreamFilter, AppError> {
    let mut filter = StreamFilter::default();
    if let Some(levels) = &params.levels {
        filter.levels = parse_csv::<Severity>(levels, "levels")?;
    }
    if let Some(sources) = &params.sources {
        filter.sources = parse_csv::<Source>(sources, "sources")?;
    }
    Ok(filter)
}

fn parse_csv<T>(value: &str, param: &'static str) -> Result<Vec<T>, AppError>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|token| {
            token
                .parse::<T>()
                .map_err(|e| AppError::invalid_filter(param, e.to_string()))
        })
        .collect()
}
