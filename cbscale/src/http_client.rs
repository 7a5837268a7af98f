//! Document client over the Couchbase query and search REST services
//!
//! Key-value operations are expressed as N1QL statements with named
//! parameters and a per-request `durability_level`, so the benchmark needs no
//! native SDK. Searches go to the search service's index query endpoint.

use std::time::Duration;

use cbscale_common::{
    constants::{QUERY_PORT, SEARCH_PORT},
    DurabilityLevel,
};
use log::{debug, trace};
use reqwest::blocking::{Client, Response};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::{
    control::{DocumentClient, Keyspace},
    error::{Error, Result},
};

/// Query service error code for an insert on an existing key
const DUPLICATE_KEY_CODE: i64 = 12009;

/// Query service error code for a statement that ran past its timeout
const QUERY_TIMEOUT_CODE: i64 = 1080;

#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    results: Vec<Value>,
    #[serde(default)]
    errors: Vec<QueryErrorEntry>,
    #[serde(default)]
    metrics: Option<QueryMetrics>,
}

#[derive(Debug, Deserialize)]
struct QueryErrorEntry {
    code: i64,
    msg: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryMetrics {
    #[serde(default)]
    mutation_count: u64,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    total_hits: u64,
}

/// Blocking HTTP client for one cluster node
#[derive(Debug, Clone)]
pub struct QueryServiceClient {
    http: Client,
    host: String,
    username: String,
    password: String,
}

impl QueryServiceClient {
    #[must_use]
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            http: Client::new(),
            host: host.into(),
            username: username.into(),
            password: password.into(),
        }
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    fn query_url(&self) -> String {
        format!("http://{}:{QUERY_PORT}/query/service", self.host)
    }

    fn search_url(&self, index: &str) -> String {
        format!("http://{}:{SEARCH_PORT}/api/index/{index}/query", self.host)
    }

    /// Send a statement and decode the response envelope.
    ///
    /// `operation` names the call in timeout errors; `key` is reported on
    /// duplicate-key conflicts.
    fn execute(
        &self,
        operation: &str,
        key: Option<&str>,
        body: Value,
        timeout: Duration,
    ) -> Result<QueryResponse> {
        trace!("POST {} {body}", self.query_url());
        let response = self
            .http
            .post(self.query_url())
            .basic_auth(&self.username, Some(&self.password))
            .timeout(timeout)
            .json(&body)
            .send()
            .map_err(|e| map_transport_error(operation, timeout, e))?;

        let decoded: QueryResponse = response
            .json()
            .map_err(|e| map_transport_error(operation, timeout, e))?;

        if decoded.status == "success" {
            return Ok(decoded);
        }

        debug!("{operation} returned status {}: {:?}", decoded.status, decoded.errors);
        Err(classify_query_errors(operation, key, timeout, &decoded.errors))
    }

    fn statement_body(
        statement: &str,
        params: &Map<String, Value>,
        durability: Option<DurabilityLevel>,
        timeout: Duration,
    ) -> Value {
        let mut body = Map::new();
        body.insert("statement".to_string(), Value::from(statement));
        body.insert(
            "timeout".to_string(),
            Value::from(format!("{}ms", timeout.as_millis())),
        );
        if let Some(level) = durability {
            body.insert(
                "durability_level".to_string(),
                Value::from(level.server_level()),
            );
        }
        for (name, value) in params {
            body.insert(format!("${name}"), value.clone());
        }
        Value::Object(body)
    }

    /// Create the primary index for a bucket's default keyspace
    pub fn create_primary_index(&self, bucket: &str, timeout: Duration) -> Result<String> {
        let statement = format!("CREATE PRIMARY INDEX ON `default`:`{bucket}`");
        let body = Self::statement_body(&statement, &Map::new(), None, timeout);
        let response = self.execute("create primary index", None, body, timeout)?;
        Ok(format!("{statement}: {}", response.status))
    }
}

fn map_transport_error(operation: &str, timeout: Duration, e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::timeout(operation, millis(timeout))
    } else {
        Error::Http(e)
    }
}

fn classify_query_errors(
    operation: &str,
    key: Option<&str>,
    timeout: Duration,
    errors: &[QueryErrorEntry],
) -> Error {
    if errors
        .iter()
        .any(|e| e.code == DUPLICATE_KEY_CODE || e.msg.contains("Duplicate Key"))
    {
        return Error::conflict(key.unwrap_or_default());
    }
    if errors.iter().any(|e| e.code == QUERY_TIMEOUT_CODE) {
        return Error::timeout(operation, millis(timeout));
    }
    let message = errors
        .iter()
        .map(|e| format!("[{}] {}", e.code, e.msg))
        .collect::<Vec<_>>()
        .join("; ");
    Error::external(operation, message)
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn key_params(key: &str, document: Option<&Value>) -> Map<String, Value> {
    let mut params = Map::new();
    params.insert("key".to_string(), Value::from(key));
    if let Some(document) = document {
        params.insert("document".to_string(), document.clone());
    }
    params
}

fn insert_statement(keyspace: &Keyspace) -> String {
    format!(
        "INSERT INTO {} (KEY, VALUE) VALUES ($key, $document)",
        keyspace.path()
    )
}

/// Replace only touches an existing document: the select yields no row for a
/// missing key, so nothing is written.
fn replace_statement(keyspace: &Keyspace) -> String {
    let path = keyspace.path();
    format!(
        "UPSERT INTO {path} (KEY k, VALUE v) \
         SELECT META(d).id AS k, $document AS v FROM {path} AS d USE KEYS $key"
    )
}

fn remove_statement(keyspace: &Keyspace) -> String {
    format!("DELETE FROM {} USE KEYS $key", keyspace.path())
}

impl DocumentClient for QueryServiceClient {
    fn insert(
        &mut self,
        keyspace: &Keyspace,
        key: &str,
        document: &Value,
        durability: DurabilityLevel,
        timeout: Duration,
    ) -> Result<()> {
        let body = Self::statement_body(
            &insert_statement(keyspace),
            &key_params(key, Some(document)),
            Some(durability),
            timeout,
        );
        self.execute(&format!("insert {key}"), Some(key), body, timeout)?;
        Ok(())
    }

    fn replace(
        &mut self,
        keyspace: &Keyspace,
        key: &str,
        document: &Value,
        durability: DurabilityLevel,
        timeout: Duration,
    ) -> Result<()> {
        let body = Self::statement_body(
            &replace_statement(keyspace),
            &key_params(key, Some(document)),
            Some(durability),
            timeout,
        );
        let response = self.execute(&format!("replace {key}"), Some(key), body, timeout)?;
        match response.metrics {
            Some(metrics) if metrics.mutation_count == 0 => Err(Error::external(
                format!("replace {key}"),
                "document not found",
            )),
            _ => Ok(()),
        }
    }

    fn remove(
        &mut self,
        keyspace: &Keyspace,
        key: &str,
        durability: DurabilityLevel,
        timeout: Duration,
    ) -> Result<()> {
        let body = Self::statement_body(
            &remove_statement(keyspace),
            &key_params(key, None),
            Some(durability),
            timeout,
        );
        self.execute(&format!("remove {key}"), Some(key), body, timeout)?;
        Ok(())
    }

    fn query(
        &mut self,
        statement: &str,
        params: &Map<String, Value>,
        timeout: Duration,
    ) -> Result<Vec<Value>> {
        let body = Self::statement_body(statement, params, None, timeout);
        Ok(self.execute("query", None, body, timeout)?.results)
    }

    fn search(&mut self, index: &str, text: &str, timeout: Duration) -> Result<u64> {
        let body = json!({
            "query": { "query": text },
            "ctl": { "timeout": millis(timeout) },
        });
        let response: Response = self
            .http
            .post(self.search_url(index))
            .basic_auth(&self.username, Some(&self.password))
            .timeout(timeout)
            .json(&body)
            .send()
            .map_err(|e| map_transport_error("search", timeout, e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            return Err(Error::external(
                format!("search {index}"),
                format!("{status}: {text}"),
            ));
        }

        let decoded: SearchResponse = response
            .json()
            .map_err(|e| map_transport_error("search", timeout, e))?;
        Ok(decoded.total_hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(code: i64, msg: &str) -> QueryErrorEntry {
        QueryErrorEntry {
            code,
            msg: msg.to_string(),
        }
    }

    #[test]
    fn test_statement_body_carries_params_and_durability() {
        let body = QueryServiceClient::statement_body(
            "INSERT ...",
            &key_params("7", Some(&json!({"a": "b"}))),
            Some(DurabilityLevel::High),
            Duration::from_secs(10),
        );
        assert_eq!(body["statement"], "INSERT ...");
        assert_eq!(body["timeout"], "10000ms");
        assert_eq!(body["durability_level"], "persistToMajority");
        assert_eq!(body["$key"], "7");
        assert_eq!(body["$document"]["a"], "b");
    }

    #[test]
    fn test_reads_carry_no_durability() {
        let body = QueryServiceClient::statement_body(
            "SELECT 1",
            &Map::new(),
            None,
            Duration::from_secs(1),
        );
        assert!(body.get("durability_level").is_none());
    }

    #[test]
    fn test_duplicate_key_is_a_conflict() {
        let err = classify_query_errors(
            "insert 0",
            Some("0"),
            Duration::from_secs(10),
            &[entry(12009, "DML Error, possibly partially executed: Duplicate Key: 0")],
        );
        assert!(matches!(err, Error::DocumentConflict { ref key } if key == "0"));
    }

    #[test]
    fn test_query_timeout_code_is_a_timeout() {
        let err = classify_query_errors(
            "query",
            None,
            Duration::from_secs(10),
            &[entry(1080, "Timeout 10s exceeded")],
        );
        assert!(matches!(
            err,
            Error::OperationTimeout {
                timeout_ms: 10_000,
                ..
            }
        ));
    }

    #[test]
    fn test_other_errors_are_external_calls() {
        let err = classify_query_errors(
            "query",
            None,
            Duration::from_secs(10),
            &[entry(12003, "Keyspace not found"), entry(5000, "boom")],
        );
        assert_eq!(
            err.to_string(),
            "External call `query` failed: [12003] Keyspace not found; [5000] boom"
        );
    }

    #[test]
    fn test_statements() {
        let ks = Keyspace::in_bucket("b");
        assert_eq!(
            insert_statement(&ks),
            "INSERT INTO `b`.`default_scope`.`default_collection` (KEY, VALUE) VALUES ($key, $document)"
        );
        assert_eq!(
            remove_statement(&ks),
            "DELETE FROM `b`.`default_scope`.`default_collection` USE KEYS $key"
        );
        assert!(replace_statement(&ks).contains("USE KEYS $key"));
    }

    #[test]
    fn test_response_decoding() {
        let decoded: QueryResponse = serde_json::from_str(
            r#"{"requestID": "x", "status": "success", "results": [{"n": 1}],
                "metrics": {"elapsedTime": "1ms", "mutationCount": 1}}"#,
        )
        .unwrap();
        assert_eq!(decoded.results.len(), 1);
        assert_eq!(decoded.metrics.unwrap().mutation_count, 1);
    }
}
