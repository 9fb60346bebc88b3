use super::store::{HistoryStore, MAX_HISTORY_LIMIT};
use super::{HistoryError, HistoryRecord, NewHistoryRecord, UserContext};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use std::time::Duration;
use tracing::instrument;
use uuid::Uuid;

const TABLE: &str = "scan_history";

/// `scan_history` table behind a PostgREST endpoint.
///
/// Requests carry the project `apikey` and the user's bearer token, so row
/// level security scopes every query to the signed-in user.
#[derive(Debug, Clone)]
pub struct RestHistoryStore {
    http: Client,
    table_url: String,
    api_key: String,
}

impl RestHistoryStore {
    pub fn new(rest_url: &str, api_key: &str, timeout: Duration) -> Result<Self, HistoryError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HistoryError::Fetch(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            table_url: format!("{}/{}", rest_url.trim_end_matches('/'), TABLE),
            api_key: api_key.to_string(),
        })
    }

    fn authorized(&self, request: RequestBuilder, user: &UserContext) -> RequestBuilder {
        let token = user.access_token.as_deref().unwrap_or(&self.api_key);
        request.header("apikey", &self.api_key).bearer_auth(token)
    }
}

fn user_filter(user: &UserContext) -> String {
    format!("eq.{}", user.user_id)
}

#[async_trait]
impl HistoryStore for RestHistoryStore {
    #[instrument(skip(self, record))]
    async fn insert(
        &self,
        user: &UserContext,
        record: NewHistoryRecord,
    ) -> Result<HistoryRecord, HistoryError> {
        let request = self
            .http
            .post(&self.table_url)
            .header("Prefer", "return=representation")
            .json(&record);

        let rows = self
            .authorized(request, user)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| HistoryError::Write(e.to_string()))?
            .json::<Vec<HistoryRecord>>()
            .await
            .map_err(|e| HistoryError::Write(format!("unexpected insert response: {}", e)))?;

        rows.into_iter()
            .next()
            .ok_or_else(|| HistoryError::Write("insert returned no rows".to_string()))
    }

    #[instrument(skip(self))]
    async fn list(
        &self,
        user: &UserContext,
        limit: usize,
    ) -> Result<Vec<HistoryRecord>, HistoryError> {
        let limit = limit.min(MAX_HISTORY_LIMIT).to_string();
        let request = self.http.get(&self.table_url).query(&[
            ("select", "*"),
            ("user_id", user_filter(user).as_str()),
            ("order", "created_at.desc"),
            ("limit", limit.as_str()),
        ]);

        self.authorized(request, user)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| HistoryError::Fetch(e.to_string()))?
            .json::<Vec<HistoryRecord>>()
            .await
            .map_err(|e| HistoryError::Fetch(format!("unexpected list response: {}", e)))
    }

    #[instrument(skip(self))]
    async fn delete(&self, user: &UserContext, id: Uuid) -> Result<bool, HistoryError> {
        let request = self
            .http
            .delete(&self.table_url)
            .header("Prefer", "return=representation")
            .query(&[
                ("id", format!("eq.{}", id)),
                ("user_id", user_filter(user)),
            ]);

        let removed = self
            .authorized(request, user)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| HistoryError::Delete(e.to_string()))?
            .json::<Vec<serde_json::Value>>()
            .await
            .map_err(|e| HistoryError::Delete(format!("unexpected delete response: {}", e)))?;

        Ok(!removed.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::ScanType;
    use crate::ranking::Prediction;
    use axum::{
        extract::{Query, State},
        http::{HeaderMap, StatusCode},
        routing::get,
        Json, Router,
    };
    use chrono::Utc;
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::net::TcpListener;

    type Rows = Arc<Mutex<Vec<Value>>>;

    fn authorized(headers: &HeaderMap) -> bool {
        headers.get("apikey").is_some_and(|v| v == "anon-key")
            && headers
                .get("authorization")
                .is_some_and(|v| v == "Bearer user-jwt")
    }

    fn eq_param<'a>(params: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
        params.get(key).and_then(|v| v.strip_prefix("eq."))
    }

    async fn select_rows(
        State(rows): State<Rows>,
        headers: HeaderMap,
        Query(params): Query<HashMap<String, String>>,
    ) -> Result<Json<Vec<Value>>, StatusCode> {
        if !authorized(&headers) {
            return Err(StatusCode::UNAUTHORIZED);
        }
        assert_eq!(params.get("order").map(String::as_str), Some("created_at.desc"));
        let limit: usize = params["limit"].parse().unwrap();
        let user = eq_param(&params, "user_id").unwrap();

        let rows = rows.lock();
        Ok(Json(
            rows.iter()
                .rev()
                .filter(|row| row["user_id"] == user)
                .take(limit)
                .cloned()
                .collect(),
        ))
    }

    async fn insert_row(
        State(rows): State<Rows>,
        headers: HeaderMap,
        Json(mut row): Json<Value>,
    ) -> Result<(StatusCode, Json<Vec<Value>>), StatusCode> {
        if !authorized(&headers) {
            return Err(StatusCode::UNAUTHORIZED);
        }
        assert_eq!(
            headers.get("prefer").and_then(|v| v.to_str().ok()),
            Some("return=representation")
        );
        row["id"] = json!(Uuid::new_v4());
        row["created_at"] = json!(Utc::now());
        rows.lock().push(row.clone());
        Ok((StatusCode::CREATED, Json(vec![row])))
    }

    async fn delete_rows(
        State(rows): State<Rows>,
        headers: HeaderMap,
        Query(params): Query<HashMap<String, String>>,
    ) -> Result<Json<Vec<Value>>, StatusCode> {
        if !authorized(&headers) {
            return Err(StatusCode::UNAUTHORIZED);
        }
        let id = eq_param(&params, "id").unwrap().to_string();

        let mut rows = rows.lock();
        let (removed, kept): (Vec<Value>, Vec<Value>) =
            rows.drain(..).partition(|row| row["id"] == id.as_str());
        *rows = kept;
        Ok(Json(removed))
    }

    async fn spawn_postgrest() -> String {
        let rows: Rows = Arc::new(Mutex::new(Vec::new()));
        let router = Router::new()
            .route(
                "/rest/v1/scan_history",
                get(select_rows).post(insert_row).delete(delete_rows),
            )
            .with_state(rows);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await });
        format!("http://{}/rest/v1", addr)
    }

    fn new_record(label: &str) -> NewHistoryRecord {
        let predictions = vec![Prediction {
            label: label.to_string(),
            probability: 0.9,
        }];
        NewHistoryRecord::from_predictions("user-1", &predictions, ScanType::Upload, None).unwrap()
    }

    #[tokio::test]
    async fn test_insert_list_delete_roundtrip() {
        let rest_url = spawn_postgrest().await;
        let store = RestHistoryStore::new(&rest_url, "anon-key", Duration::from_secs(5)).unwrap();
        let user = UserContext::new("user-1").with_access_token("user-jwt");

        let first = store.insert(&user, new_record("first")).await.unwrap();
        let second = store.insert(&user, new_record("second")).await.unwrap();
        assert_eq!(first.top_label, "first");

        let listed = store.list(&user, 50).await.unwrap();
        assert_eq!(listed, vec![second.clone(), first.clone()]);

        assert!(store.delete(&user, first.id).await.unwrap());
        assert!(!store.delete(&user, first.id).await.unwrap());
        assert_eq!(store.list(&user, 50).await.unwrap(), vec![second]);
    }

    #[tokio::test]
    async fn test_rejected_credentials_surface_as_errors() {
        let rest_url = spawn_postgrest().await;
        let store = RestHistoryStore::new(&rest_url, "wrong-key", Duration::from_secs(5)).unwrap();
        let user = UserContext::new("user-1").with_access_token("user-jwt");

        assert!(matches!(
            store.insert(&user, new_record("x")).await,
            Err(HistoryError::Write(_))
        ));
        assert!(matches!(
            store.list(&user, 10).await,
            Err(HistoryError::Fetch(_))
        ));
        assert!(matches!(
            store.delete(&user, Uuid::new_v4()).await,
            Err(HistoryError::Delete(_))
        ));
    }
}
