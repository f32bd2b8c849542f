//! Request builder and response protocol for the TeamUp events API.
//!
//! # Design
//! `TeamUpClient` holds the immutable configuration and a transport. Each
//! operation is split into a `build_*` method that produces an `HttpRequest`
//! and a public call that sends it and runs the shared response protocol:
//!
//! 1. transport error: upstream `error.message` if the body carries one,
//!    else the transport's own text;
//! 2. 200/201: the decoded JSON body;
//! 3. 204: `{"result": true}`;
//! 4. 5xx: upstream `error.message` if present, else `Uncategorized Exception`;
//! 5. anything else: `Uncategorized Exception`.

use serde::Serialize;
use serde_json::{json, Value};

use crate::config::TeamUpConfig;
use crate::error::TeamUpError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse, Transport, TransportError, UreqTransport};

pub const TOKEN_HEADER: &str = "Teamup-Token";

/// Query and body attached to a request. Requests that carry params also
/// negotiate JSON content.
struct Params {
    query: Vec<(String, String)>,
    body: Option<String>,
}

impl Params {
    fn query(pairs: &[(&str, &str)]) -> Self {
        Self {
            query: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body: None,
        }
    }

    fn body(mut self, body: Option<String>) -> Self {
        self.body = body;
        self
    }
}

/// Synchronous client for the TeamUp events API.
#[derive(Debug, Clone)]
pub struct TeamUpClient<T = UreqTransport> {
    config: TeamUpConfig,
    transport: T,
}

impl TeamUpClient<UreqTransport> {
    pub fn new(config: TeamUpConfig) -> Self {
        Self::with_transport(config, UreqTransport::new())
    }
}

impl<T: Transport> TeamUpClient<T> {
    pub fn with_transport(config: TeamUpConfig, transport: T) -> Self {
        Self { config, transport }
    }

    pub fn config(&self) -> &TeamUpConfig {
        &self.config
    }

    fn tz<'a>(&'a self, tz: Option<&'a str>) -> &'a str {
        tz.unwrap_or(self.config.default_tz())
    }

    fn request(&self, method: HttpMethod, path: &str, params: Option<Params>) -> HttpRequest {
        let mut headers = vec![(TOKEN_HEADER.to_string(), self.config.api_token().to_string())];
        let (query, body) = match params {
            Some(params) => {
                headers.push(("Content-Type".to_string(), "application/json".to_string()));
                headers.push(("Accept".to_string(), "application/json".to_string()));
                (params.query, params.body)
            }
            None => (Vec::new(), None),
        };

        HttpRequest {
            method,
            path: format!("{}/{path}", self.config.base_url()),
            query,
            headers,
            body,
        }
    }

    pub fn build_list_events(
        &self,
        calendar_id: &str,
        start_date: &str,
        end_date: &str,
        tz: Option<&str>,
    ) -> HttpRequest {
        let params = Params::query(&[
            ("startDate", start_date),
            ("endDate", end_date),
            ("tz", self.tz(tz)),
        ]);
        self.request(HttpMethod::Get, &format!("{calendar_id}/events"), Some(params))
    }

    pub fn build_get_event(&self, calendar_id: &str, event_id: &str, tz: Option<&str>) -> HttpRequest {
        let params = Params::query(&[("tz", self.tz(tz))]);
        self.request(
            HttpMethod::Get,
            &format!("{calendar_id}/events/{event_id}"),
            Some(params),
        )
    }

    pub fn build_create_event<B: Serialize + ?Sized>(
        &self,
        calendar_id: &str,
        body: &B,
        tz: Option<&str>,
    ) -> Result<HttpRequest, TeamUpError> {
        let params = Params::query(&[("tz", self.tz(tz))]).body(encode_body(body)?);
        Ok(self.request(HttpMethod::Post, &format!("{calendar_id}/events"), Some(params)))
    }

    pub fn build_update_event<B: Serialize + ?Sized>(
        &self,
        calendar_id: &str,
        event_id: &str,
        body: &B,
        tz: Option<&str>,
    ) -> Result<HttpRequest, TeamUpError> {
        let params = Params::query(&[("tz", self.tz(tz))]).body(encode_body(body)?);
        Ok(self.request(
            HttpMethod::Put,
            &format!("{calendar_id}/events/{event_id}"),
            Some(params),
        ))
    }

    pub fn build_delete_event(&self, calendar_id: &str, event_id: &str) -> HttpRequest {
        self.request(HttpMethod::Delete, &format!("{calendar_id}/events/{event_id}"), None)
    }

    pub fn build_event_history(&self, calendar_id: &str, event_id: &str, tz: Option<&str>) -> HttpRequest {
        let params = Params::query(&[("tz", self.tz(tz))]);
        self.request(
            HttpMethod::Get,
            &format!("{calendar_id}/events/{event_id}/history"),
            Some(params),
        )
    }

    pub fn build_event_aux_info(&self, calendar_id: &str, event_id: &str, tz: Option<&str>) -> HttpRequest {
        let params = Params::query(&[("tz", self.tz(tz))]);
        self.request(
            HttpMethod::Get,
            &format!("{calendar_id}/events/{event_id}/aux"),
            Some(params),
        )
    }

    pub fn build_event_share_url(&self, calendar_id: &str, event_id: &str, tz: Option<&str>) -> HttpRequest {
        let params = Params::query(&[("tz", self.tz(tz))]);
        self.request(
            HttpMethod::Post,
            &format!("{calendar_id}/events/{event_id}/pointer"),
            Some(params),
        )
    }

    pub fn build_recent_changes(
        &self,
        calendar_id: &str,
        modified_since: &str,
        tz: Option<&str>,
    ) -> HttpRequest {
        let params = Params::query(&[("tz", self.tz(tz)), ("modifiedSince", modified_since)]);
        self.request(HttpMethod::Get, &format!("{calendar_id}/events/"), Some(params))
    }

    pub fn build_undo_action(&self, calendar_id: &str, undo_code: &str) -> HttpRequest {
        self.request(HttpMethod::Put, &format!("{calendar_id}/events/undo/{undo_code}"), None)
    }

    /// Events between `start_date` and `end_date` (`YYYY-MM-DD`).
    pub fn list_events(
        &self,
        calendar_id: &str,
        start_date: &str,
        end_date: &str,
        tz: Option<&str>,
    ) -> Result<Value, TeamUpError> {
        self.send(self.build_list_events(calendar_id, start_date, end_date, tz))
    }

    pub fn get_event(&self, calendar_id: &str, event_id: &str, tz: Option<&str>) -> Result<Value, TeamUpError> {
        self.send(self.build_get_event(calendar_id, event_id, tz))
    }

    pub fn create_event<B: Serialize + ?Sized>(
        &self,
        calendar_id: &str,
        body: &B,
        tz: Option<&str>,
    ) -> Result<Value, TeamUpError> {
        self.send(self.build_create_event(calendar_id, body, tz)?)
    }

    pub fn update_event<B: Serialize + ?Sized>(
        &self,
        calendar_id: &str,
        event_id: &str,
        body: &B,
        tz: Option<&str>,
    ) -> Result<Value, TeamUpError> {
        self.send(self.build_update_event(calendar_id, event_id, body, tz)?)
    }

    pub fn delete_event(&self, calendar_id: &str, event_id: &str) -> Result<Value, TeamUpError> {
        self.send(self.build_delete_event(calendar_id, event_id))
    }

    pub fn event_history(&self, calendar_id: &str, event_id: &str, tz: Option<&str>) -> Result<Value, TeamUpError> {
        self.send(self.build_event_history(calendar_id, event_id, tz))
    }

    pub fn event_aux_info(&self, calendar_id: &str, event_id: &str, tz: Option<&str>) -> Result<Value, TeamUpError> {
        self.send(self.build_event_aux_info(calendar_id, event_id, tz))
    }

    /// Ask the API for a shareable link pointing at the event.
    pub fn event_share_url(&self, calendar_id: &str, event_id: &str, tz: Option<&str>) -> Result<Value, TeamUpError> {
        self.send(self.build_event_share_url(calendar_id, event_id, tz))
    }

    /// Events changed since `modified_since` (unix timestamp).
    pub fn recent_changes(
        &self,
        calendar_id: &str,
        modified_since: &str,
        tz: Option<&str>,
    ) -> Result<Value, TeamUpError> {
        self.send(self.build_recent_changes(calendar_id, modified_since, tz))
    }

    pub fn undo_action(&self, calendar_id: &str, undo_code: &str) -> Result<Value, TeamUpError> {
        self.send(self.build_undo_action(calendar_id, undo_code))
    }

    fn send(&self, request: HttpRequest) -> Result<Value, TeamUpError> {
        tracing::debug!(method = %request.method, path = %request.path, "sending teamup request");

        let result = handle_response(self.transport.execute(&request));
        if let Err(err) = &result {
            tracing::warn!(method = %request.method, path = %request.path, error = %err, "teamup request failed");
        }
        result
    }
}

/// Apply the response protocol to one transport result.
pub fn handle_response(result: Result<HttpResponse, TransportError>) -> Result<Value, TeamUpError> {
    let response = match result {
        Ok(response) => response,
        Err(err) => {
            let message = err
                .body()
                .and_then(upstream_message)
                .unwrap_or_else(|| err.to_string());
            return Err(TeamUpError::new(message));
        }
    };

    match response.status {
        200 | 201 => decode_body(&response.body),
        204 => Ok(json!({ "result": true })),
        status if status >= 500 => Err(upstream_message(&response.body)
            .map(TeamUpError::new)
            .unwrap_or_else(TeamUpError::uncategorized)),
        _ => Err(TeamUpError::uncategorized()),
    }
}

/// Pull `error.message` out of an upstream error payload.
fn upstream_message(body: &str) -> Option<String> {
    let payload: Value = serde_json::from_str(body).ok()?;
    payload
        .get("error")?
        .get("message")?
        .as_str()
        .map(str::to_string)
}

fn decode_body(body: &str) -> Result<Value, TeamUpError> {
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(body).map_err(|e| TeamUpError::new(format!("invalid JSON response: {e}")))
}

/// Encode a request body, or `None` when it is empty.
fn encode_body<B: Serialize + ?Sized>(body: &B) -> Result<Option<String>, TeamUpError> {
    let value = serde_json::to_value(body)
        .map_err(|e| TeamUpError::new(format!("failed to encode request body: {e}")))?;

    let empty = match &value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    };
    if empty {
        return Ok(None);
    }
    Ok(Some(value.to_string()))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::types::EventDraft;

    const BASE_URL: &str = "https://api.teamup.com";

    /// Returns one canned result and records every request it sees.
    struct Canned {
        result: Result<HttpResponse, TransportError>,
        seen: Mutex<Vec<HttpRequest>>,
    }

    impl Canned {
        fn new(result: Result<HttpResponse, TransportError>) -> Self {
            Self {
                result,
                seen: Mutex::new(Vec::new()),
            }
        }

        fn status(status: u16, body: &str) -> Self {
            Self::new(Ok(HttpResponse {
                status,
                headers: Vec::new(),
                body: body.to_string(),
            }))
        }

        fn last(&self) -> HttpRequest {
            self.seen.lock().unwrap().last().cloned().unwrap()
        }
    }

    impl Transport for Canned {
        fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
            self.seen.lock().unwrap().push(request.clone());
            self.result.clone()
        }
    }

    fn config() -> TeamUpConfig {
        TeamUpConfig::new("tok-123", BASE_URL)
    }

    fn client() -> TeamUpClient<Canned> {
        TeamUpClient::with_transport(config(), Canned::status(200, "{}"))
    }

    fn client_with(transport: Canned) -> TeamUpClient<Canned> {
        TeamUpClient::with_transport(config(), transport)
    }

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn paths_follow_the_events_layout() {
        let c = client();
        let draft = EventDraft::new("t", "s", "e");
        let cases = vec![
            (c.build_list_events("ks1", "2024-01-01", "2024-01-31", None), HttpMethod::Get, "ks1/events"),
            (c.build_get_event("ks1", "e9", None), HttpMethod::Get, "ks1/events/e9"),
            (c.build_create_event("ks1", &draft, None).unwrap(), HttpMethod::Post, "ks1/events"),
            (c.build_update_event("ks1", "e9", &draft, None).unwrap(), HttpMethod::Put, "ks1/events/e9"),
            (c.build_delete_event("ks1", "e9"), HttpMethod::Delete, "ks1/events/e9"),
            (c.build_event_history("ks1", "e9", None), HttpMethod::Get, "ks1/events/e9/history"),
            (c.build_event_aux_info("ks1", "e9", None), HttpMethod::Get, "ks1/events/e9/aux"),
            (c.build_event_share_url("ks1", "e9", None), HttpMethod::Post, "ks1/events/e9/pointer"),
            (c.build_recent_changes("ks1", "1700000000", None), HttpMethod::Get, "ks1/events/"),
            (c.build_undo_action("ks1", "u42"), HttpMethod::Put, "ks1/events/undo/u42"),
        ];

        for (req, method, path) in cases {
            assert_eq!(req.method, method, "{path}: method");
            assert_eq!(req.path, format!("{BASE_URL}/{path}"));
        }
    }

    #[test]
    fn every_request_carries_the_token() {
        let c = client();
        for req in [c.build_get_event("ks1", "e1", None), c.build_delete_event("ks1", "e1")] {
            assert_eq!(req.header("Teamup-Token"), Some("tok-123"));
        }
    }

    #[test]
    fn list_events_query_order() {
        let req = client().build_list_events("ks1", "2024-01-01", "2024-01-31", Some("Europe/Paris"));
        assert_eq!(
            req.query,
            pairs(&[("startDate", "2024-01-01"), ("endDate", "2024-01-31"), ("tz", "Europe/Paris")])
        );
        assert_eq!(req.header("Content-Type"), Some("application/json"));
        assert_eq!(req.header("Accept"), Some("application/json"));
        assert!(req.body.is_none());
    }

    #[test]
    fn tz_falls_back_to_configured_default() {
        let req = client().build_get_event("ks1", "e1", None);
        assert_eq!(req.query, pairs(&[("tz", "America/London")]));

        let c = TeamUpClient::with_transport(
            config().with_default_tz("Asia/Tokyo"),
            Canned::status(200, "{}"),
        );
        let req = c.build_event_history("ks1", "e1", None);
        assert_eq!(req.query_param("tz"), Some("Asia/Tokyo"));
    }

    #[test]
    fn recent_changes_sends_modified_since() {
        let req = client().build_recent_changes("ks1", "1700000000", None);
        assert_eq!(
            req.query,
            pairs(&[("tz", "America/London"), ("modifiedSince", "1700000000")])
        );
    }

    #[test]
    fn delete_and_undo_carry_no_params() {
        let c = client();
        for req in [c.build_delete_event("ks1", "e1"), c.build_undo_action("ks1", "u1")] {
            assert!(req.query.is_empty());
            assert!(req.body.is_none());
            assert_eq!(req.headers, pairs(&[("Teamup-Token", "tok-123")]));
        }
    }

    #[test]
    fn create_with_body_encodes_json() {
        let draft = EventDraft::new("Standup", "2024-05-01T09:00:00", "2024-05-01T09:15:00").subcalendar(3);
        let req = client().build_create_event("ks1", &draft, None).unwrap();
        let body: Value = serde_json::from_str(req.body.as_deref().unwrap()).unwrap();
        assert_eq!(body["title"], "Standup");
        assert_eq!(body["subcalendar_ids"], json!([3]));
    }

    #[test]
    fn update_accepts_raw_json_body() {
        let body = json!({ "id": "e1", "title": "Moved" });
        let req = client().build_update_event("ks1", "e1", &body, Some("UTC")).unwrap();
        let sent: Value = serde_json::from_str(req.body.as_deref().unwrap()).unwrap();
        assert_eq!(sent, body);
        assert_eq!(req.query_param("tz"), Some("UTC"));
    }

    #[test]
    fn empty_body_is_not_attached() {
        let c = client();
        let req = c.build_create_event("ks1", &json!({}), None).unwrap();
        assert!(req.body.is_none());
        let req = c.build_update_event("ks1", "e1", &EventDraft::default(), None).unwrap();
        assert!(req.body.is_none());
        assert_eq!(req.header("Content-Type"), Some("application/json"));
    }

    #[test]
    fn ok_body_is_returned_unchanged() {
        let c = client_with(Canned::status(200, r#"{"id":"e1"}"#));
        assert_eq!(c.get_event("ks1", "e1", None).unwrap(), json!({ "id": "e1" }));
        assert_eq!(c.transport.last().path, format!("{BASE_URL}/ks1/events/e1"));
    }

    #[test]
    fn created_body_is_returned() {
        let c = client_with(Canned::status(201, r#"{"event":{"id":"e2"},"undo_id":"u1"}"#));
        let created = c.create_event("ks1", &EventDraft::new("t", "s", "e"), None).unwrap();
        assert_eq!(created["undo_id"], "u1");
    }

    #[test]
    fn no_content_yields_result_marker() {
        let c = client_with(Canned::status(204, ""));
        assert_eq!(c.delete_event("ks1", "e1").unwrap(), json!({ "result": true }));
        assert_eq!(c.undo_action("ks1", "u1").unwrap(), json!({ "result": true }));
        assert_eq!(c.event_share_url("ks1", "e1", None).unwrap(), json!({ "result": true }));
    }

    #[test]
    fn upstream_error_message_is_used() {
        let c = client_with(Canned::new(Err(TransportError::Status {
            status: 422,
            body: r#"{"error":{"id":"validation_error","message":"Invalid date"}}"#.to_string(),
        })));
        let err = c.list_events("ks1", "bad", "bad", None).unwrap_err();
        assert_eq!(err.message(), "Invalid date");
    }

    #[test]
    fn unparseable_error_body_falls_back_to_transport_text() {
        let c = client_with(Canned::new(Err(TransportError::Status {
            status: 404,
            body: "<html>not found</html>".to_string(),
        })));
        let err = c.get_event("ks1", "e1", None).unwrap_err();
        assert_eq!(err.message(), "http status: 404");
    }

    #[test]
    fn error_body_without_message_falls_back_to_transport_text() {
        let c = client_with(Canned::new(Err(TransportError::Status {
            status: 401,
            body: r#"{"error":{"id":"no_permission"}}"#.to_string(),
        })));
        let err = c.event_aux_info("ks1", "e1", None).unwrap_err();
        assert_eq!(err.message(), "http status: 401");
    }

    #[test]
    fn io_failure_uses_transport_text() {
        let c = client_with(Canned::new(Err(TransportError::Io("connection refused".to_string()))));
        let err = c.recent_changes("ks1", "0", None).unwrap_err();
        assert_eq!(err.message(), "connection refused");
    }

    #[test]
    fn unrecognised_status_is_uncategorized() {
        for status in [500, 202, 302] {
            let c = client_with(Canned::status(status, "oops"));
            let err = c.event_history("ks1", "e1", None).unwrap_err();
            assert_eq!(err.message(), "Uncategorized Exception", "status {status}");
        }
    }

    #[test]
    fn server_error_with_message_surfaces_it() {
        let c = client_with(Canned::status(500, r#"{"error":{"id":"x","message":"Backend down"}}"#));
        let err = c.get_event("ks1", "e1", None).unwrap_err();
        assert_eq!(err.message(), "Backend down");
    }

    #[test]
    fn server_error_without_structure_is_uncategorized() {
        for body in ["down", "", r#"{"error":"down"}"#] {
            let c = client_with(Canned::status(503, body));
            let err = c.get_event("ks1", "e1", None).unwrap_err();
            assert_eq!(err.message(), "Uncategorized Exception", "body {body:?}");
        }
    }

    #[test]
    fn ok_with_invalid_json_is_an_error() {
        let c = client_with(Canned::status(200, "not json"));
        let err = c.get_event("ks1", "e1", None).unwrap_err();
        assert!(err.message().starts_with("invalid JSON response"));
    }

    #[test]
    fn ok_with_empty_body_is_null() {
        let c = client_with(Canned::status(200, ""));
        assert_eq!(c.get_event("ks1", "e1", None).unwrap(), Value::Null);
    }

    #[test]
    fn update_sends_the_built_request() {
        let c = client_with(Canned::status(200, r#"{"event":{"id":"e1"}}"#));
        c.update_event("ks1", "e1", &json!({ "title": "x" }), None).unwrap();
        let sent = c.transport.last();
        assert_eq!(sent.method, HttpMethod::Put);
        assert_eq!(sent.body.as_deref(), Some(r#"{"title":"x"}"#));
    }
}
