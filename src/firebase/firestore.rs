//! Firestore REST client for the `users` and `interviews` collections.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::ExposeSecret;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, instrument};
use url::Url;

use super::{
    credentials::AccessTokens,
    value::{fields_from_firestore, fields_to_firestore},
};
use crate::provider::{
    Interview, InterviewQuery, InterviewStore, OwnerFilter, ProviderError, UserProfile, UserStore,
};

const USERS: &str = "users";
const INTERVIEWS: &str = "interviews";

pub struct FirestoreStore {
    client: Client,
    /// `.../v1/projects/{project}/databases/(default)/documents`
    documents: Url,
    tokens: Arc<AccessTokens>,
}

impl std::fmt::Debug for FirestoreStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirestoreStore")
            .field("documents", &self.documents.as_str())
            .finish_non_exhaustive()
    }
}

impl FirestoreStore {
    /// # Errors
    /// Returns `ProviderError::Credentials` if `base_url` is not a valid URL.
    pub fn new(
        client: Client,
        base_url: &str,
        project_id: &str,
        tokens: Arc<AccessTokens>,
    ) -> Result<Self, ProviderError> {
        let invalid = |err: &dyn std::fmt::Display| {
            ProviderError::Credentials(format!("invalid firestore URL {base_url}: {err}"))
        };
        let mut documents = Url::parse(base_url).map_err(|err| invalid(&err))?;
        documents
            .path_segments_mut()
            .map_err(|()| invalid(&"cannot be a base"))?
            .pop_if_empty()
            .extend(["v1", "projects", project_id, "databases", "(default)", "documents"]);
        Ok(Self {
            client,
            documents,
            tokens,
        })
    }

    /// URL of `{collection}` or `{collection}/{id}`; ids are escaped as one path segment.
    fn collection_url(&self, collection: &str, id: Option<&str>) -> Result<Url, ProviderError> {
        let mut url = self.documents.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| ProviderError::Decode("firestore URL cannot be a base".to_string()))?;
            segments.push(collection);
            if let Some(id) = id {
                segments.push(id);
            }
        }
        Ok(url)
    }

    async fn bearer(&self) -> Result<String, ProviderError> {
        Ok(self.tokens.bearer().await?.expose_secret().to_string())
    }
}

/// `runQuery` body for an interview query.
fn structured_query(query: &InterviewQuery) -> Value {
    let mut filters = vec![match &query.owner {
        OwnerFilter::Is(user_id) => field_filter("userId", "EQUAL", json!({ "stringValue": user_id })),
        OwnerFilter::IsNot(user_id) => {
            field_filter("userId", "NOT_EQUAL", json!({ "stringValue": user_id }))
        }
    }];
    if let Some(finalized) = query.finalized {
        filters.push(field_filter(
            "finalized",
            "EQUAL",
            json!({ "booleanValue": finalized }),
        ));
    }
    let filter = if filters.len() == 1 {
        filters.remove(0)
    } else {
        json!({ "compositeFilter": { "op": "AND", "filters": filters } })
    };

    let mut structured = json!({
        "from": [{ "collectionId": INTERVIEWS }],
        "where": filter,
        "orderBy": [{ "field": { "fieldPath": "createdAt" }, "direction": "DESCENDING" }],
    });
    if let Some(limit) = query.limit {
        structured["limit"] = json!(limit);
    }
    json!({ "structuredQuery": structured })
}

fn field_filter(field: &str, op: &str, value: Value) -> Value {
    json!({ "fieldFilter": { "field": { "fieldPath": field }, "op": op, "value": value } })
}

/// Decoded document fields and the document id (last segment of `name`).
fn decode_document(document: &Value) -> Result<(String, Map<String, Value>), ProviderError> {
    let id = document["name"]
        .as_str()
        .and_then(|name| name.rsplit('/').next())
        .ok_or_else(|| ProviderError::Decode("document without name".to_string()))?
        .to_string();
    let fields = match document["fields"].as_object() {
        Some(fields) => fields_from_firestore(fields)?,
        None => Map::new(),
    };
    Ok((id, fields))
}

fn decode_interview(document: &Value) -> Result<Interview, ProviderError> {
    let (id, mut fields) = decode_document(document)?;
    fields.insert("id".to_string(), Value::String(id));
    serde_json::from_value(Value::Object(fields))
        .map_err(|err| ProviderError::Decode(format!("interview: {err}")))
}

#[async_trait]
impl UserStore for FirestoreStore {
    #[instrument(skip(self))]
    async fn get(&self, uid: &str) -> Result<Option<UserProfile>, ProviderError> {
        let url = self.collection_url(USERS, Some(uid))?;
        let response = self
            .client
            .get(url)
            .bearer_auth(self.bearer().await?)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let (status, message) = super::error_message(response).await;
            return Err(ProviderError::Api { status, message });
        }

        let document: Value = response.json().await?;
        let (_, fields) = decode_document(&document)?;
        let profile = serde_json::from_value(Value::Object(fields))
            .map_err(|err| ProviderError::Decode(format!("user record: {err}")))?;
        Ok(Some(profile))
    }

    #[instrument(skip(self, profile))]
    async fn create(&self, uid: &str, profile: &UserProfile) -> Result<(), ProviderError> {
        let mut url = self.collection_url(USERS, None)?;
        url.query_pairs_mut().append_pair("documentId", uid);

        let fields = match serde_json::to_value(profile) {
            Ok(Value::Object(map)) => fields_to_firestore(&map),
            Ok(_) | Err(_) => {
                return Err(ProviderError::Decode("user record is not an object".to_string()))
            }
        };

        let response = self
            .client
            .post(url)
            .bearer_auth(self.bearer().await?)
            .json(&json!({ "fields": fields }))
            .send()
            .await?;

        // Creating with an explicit documentId fails instead of overwriting.
        if response.status() == StatusCode::CONFLICT {
            return Err(ProviderError::AlreadyExists);
        }
        if !response.status().is_success() {
            let (status, message) = super::error_message(response).await;
            return Err(ProviderError::Api { status, message });
        }
        debug!("user document created");
        Ok(())
    }
}

#[async_trait]
impl InterviewStore for FirestoreStore {
    #[instrument(skip(self))]
    async fn query(&self, query: &InterviewQuery) -> Result<Vec<Interview>, ProviderError> {
        let url = format!("{}:runQuery", self.documents.as_str());
        let response = self
            .client
            .post(url)
            .bearer_auth(self.bearer().await?)
            .json(&structured_query(query))
            .send()
            .await?;

        if !response.status().is_success() {
            let (status, message) = super::error_message(response).await;
            return Err(ProviderError::Api { status, message });
        }

        // One entry per result; entries without `document` only carry a readTime.
        let results: Vec<Value> = response.json().await?;
        let mut found = results
            .iter()
            .filter(|result| result.get("document").is_some())
            .map(|result| decode_interview(&result["document"]))
            .collect::<Result<Vec<_>, _>>()?;
        // The store orders `createdAt` as text; reorder the page by instant.
        found.sort_by(Interview::newest_first);
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firebase::{credentials::TokenSource, test_support::can_bind_localhost};
    use anyhow::Result;
    use secrecy::SecretString;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DOCUMENTS: &str = "/v1/projects/prepwise-test/databases/(default)/documents";

    fn store(server: &MockServer) -> Result<FirestoreStore> {
        let client = Client::new();
        let tokens = Arc::new(AccessTokens::new(
            TokenSource::Static(SecretString::from("owner".to_string())),
            client.clone(),
        ));
        Ok(FirestoreStore::new(client, &server.uri(), "prepwise-test", tokens)?)
    }

    #[test]
    fn latest_query_filters_orders_and_limits() {
        let body = structured_query(&InterviewQuery::finalized_not_owned_by("u1", 5));
        assert_eq!(
            body,
            json!({ "structuredQuery": {
                "from": [{ "collectionId": "interviews" }],
                "where": { "compositeFilter": { "op": "AND", "filters": [
                    { "fieldFilter": { "field": { "fieldPath": "userId" }, "op": "NOT_EQUAL", "value": { "stringValue": "u1" } } },
                    { "fieldFilter": { "field": { "fieldPath": "finalized" }, "op": "EQUAL", "value": { "booleanValue": true } } }
                ] } },
                "orderBy": [{ "field": { "fieldPath": "createdAt" }, "direction": "DESCENDING" }],
                "limit": 5
            } })
        );
    }

    #[test]
    fn owner_query_has_single_filter_and_no_limit() {
        let body = structured_query(&InterviewQuery::owned_by("u1"));
        let query = &body["structuredQuery"];
        assert_eq!(query["where"]["fieldFilter"]["op"], "EQUAL");
        assert!(query.get("limit").is_none());
    }

    #[tokio::test]
    async fn get_missing_user_is_none() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{DOCUMENTS}/users/nobody")))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": { "code": 404, "status": "NOT_FOUND", "message": "Document not found" }
            })))
            .mount(&server)
            .await;

        assert_eq!(store(&server)?.get("nobody").await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn get_decodes_user_fields() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{DOCUMENTS}/users/abc")))
            .and(header("Authorization", "Bearer owner"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "projects/prepwise-test/databases/(default)/documents/users/abc",
                "fields": {
                    "name": { "stringValue": "Ann" },
                    "email": { "stringValue": "ann@x.com" }
                }
            })))
            .mount(&server)
            .await;

        let profile = store(&server)?.get("abc").await?;
        assert_eq!(
            profile,
            Some(UserProfile {
                name: "Ann".to_string(),
                email: "ann@x.com".to_string(),
            })
        );
        Ok(())
    }

    #[tokio::test]
    async fn create_conflict_is_already_exists() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("{DOCUMENTS}/users")))
            .and(query_param("documentId", "abc"))
            .and(body_json(json!({ "fields": {
                "name": { "stringValue": "Ann" },
                "email": { "stringValue": "ann@x.com" }
            } })))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "error": { "code": 409, "status": "ALREADY_EXISTS", "message": "Document already exists" }
            })))
            .mount(&server)
            .await;

        let profile = UserProfile {
            name: "Ann".to_string(),
            email: "ann@x.com".to_string(),
        };
        let result = store(&server)?.create("abc", &profile).await;
        assert!(matches!(result, Err(ProviderError::AlreadyExists)));
        Ok(())
    }

    #[tokio::test]
    async fn query_decodes_documents_and_skips_read_time_entries() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("{DOCUMENTS}:runQuery")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "document": {
                    "name": "projects/prepwise-test/databases/(default)/documents/interviews/i2",
                    "fields": {
                        "userId": { "stringValue": "u2" },
                        "finalized": { "booleanValue": true },
                        "createdAt": { "stringValue": "2025-03-02T10:00:00.000Z" },
                        "role": { "stringValue": "Frontend Developer" }
                    }
                }, "readTime": "2025-03-03T00:00:00Z" },
                { "readTime": "2025-03-03T00:00:00Z" }
            ])))
            .mount(&server)
            .await;

        let found = store(&server)?
            .query(&InterviewQuery::finalized_not_owned_by("u1", 20))
            .await?;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "i2");
        assert_eq!(found[0].user_id, "u2");
        assert_eq!(found[0].extra.get("role"), Some(&json!("Frontend Developer")));
        Ok(())
    }

    #[tokio::test]
    async fn query_page_is_ordered_by_instant() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        let doc = |id: &str, created_at: &str| {
            json!({ "document": {
                "name": format!("projects/prepwise-test/databases/(default)/documents/interviews/{id}"),
                "fields": {
                    "userId": { "stringValue": "u1" },
                    "finalized": { "booleanValue": false },
                    "createdAt": { "stringValue": created_at }
                }
            }})
        };
        Mock::given(method("POST"))
            .and(path(format!("{DOCUMENTS}:runQuery")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                doc("whole", "2025-03-02T10:00:00Z"),
                doc("fraction", "2025-03-02T10:00:00.250Z")
            ])))
            .mount(&server)
            .await;

        let found = store(&server)?.query(&InterviewQuery::owned_by("u1")).await?;
        let ids: Vec<&str> = found.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, ["fraction", "whole"]);
        Ok(())
    }

    #[tokio::test]
    async fn query_failure_is_api_error() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("{DOCUMENTS}:runQuery")))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!([
                { "error": { "code": 400, "message": "The query requires an index." } }
            ])))
            .mount(&server)
            .await;

        let result = store(&server)?
            .query(&InterviewQuery::finalized_not_owned_by("u1", 20))
            .await;
        assert!(matches!(
            result,
            Err(ProviderError::Api { status: 400, ref message }) if message.contains("index")
        ));
        Ok(())
    }
}
