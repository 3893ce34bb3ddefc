//! Common test utilities and helpers

use std::collections::HashMap;
use std::path::Path;

use serde_json::{Map, Value, json};
use turborally::Rally;
use wiremock::{MockServer, Request, Respond, ResponseTemplate};

/// WSAPI root path the client resolves requests against
#[allow(dead_code)]
pub const WSAPI: &str = "/slm/webservice/v2.0";

/// Load a response fixture, substituting `{{base}}` with the WSAPI root URL.
#[allow(dead_code)]
pub fn load_response_fixture(name: &str, server: &MockServer) -> String {
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    let path = Path::new(manifest_dir)
        .join("tests")
        .join("fixtures")
        .join("responses")
        .join(format!("{}.json", name));

    std::fs::read_to_string(&path)
        .unwrap_or_else(|e| {
            panic!(
                "Failed to load response fixture '{}' from {:?}: {}",
                name, path, e
            )
        })
        .replace("{{base}}", &wsapi_root(server))
}

/// Create a test API key
#[allow(dead_code)]
pub fn test_api_key() -> String {
    "_test0123456789abcdefghijklmnopqrstuvwxyz".to_string()
}

/// `http://127.0.0.1:<port>/slm/webservice/v2.0`
#[allow(dead_code)]
pub fn wsapi_root(server: &MockServer) -> String {
    format!("{}{}", server.uri(), WSAPI)
}

/// Client pointed at the mock server, without retries.
#[allow(dead_code)]
pub fn rally_for(server: &MockServer) -> Rally {
    Rally::builder()
        .server(server.uri())
        .api_key(test_api_key())
        .max_retries(0)
        .build()
        .expect("Failed to build client")
}

/// A query envelope around `results`.
#[allow(dead_code)]
pub fn query_page(total: usize, start: usize, results: Vec<Value>) -> Value {
    json!({
        "QueryResult": {
            "_rallyAPIMajor": "2",
            "_rallyAPIMinor": "0",
            "Errors": [],
            "Warnings": [],
            "TotalResultCount": total,
            "StartIndex": start,
            "PageSize": results.len(),
            "Results": results
        }
    })
}

/// A query envelope carrying service errors.
#[allow(dead_code)]
pub fn error_page(errors: &[&str]) -> Value {
    json!({
        "QueryResult": {
            "Errors": errors,
            "Warnings": [],
            "TotalResultCount": 0,
            "StartIndex": 0,
            "PageSize": 0,
            "Results": []
        }
    })
}

/// A full defect record.
#[allow(dead_code)]
pub fn defect(root: &str, oid: u64, state: &str) -> Value {
    json!({
        "_rallyAPIMajor": "2",
        "_rallyAPIMinor": "0",
        "_ref": format!("{}/defect/{}", root, oid),
        "_refObjectName": format!("Defect {}", oid),
        "_type": "Defect",
        "ObjectID": oid,
        "FormattedID": format!("DE{}", oid),
        "Name": format!("Defect {}", oid),
        "State": state,
        "Priority": "High Attention",
        "CreationDate": "2024-03-01T12:00:00.000Z",
        "Owner": {
            "_ref": format!("{}/user/77", root),
            "_refObjectName": "Ada Lovelace",
            "_type": "User"
        },
        "Project": {
            "_ref": format!("{}/project/42", root),
            "_refObjectName": "Rockets",
            "_type": "Project"
        },
        "RevisionHistory": {
            "_ref": format!("{}/revisionhistory/{}", root, oid + 9000),
            "_type": "RevisionHistory"
        },
        "Tasks": {
            "_ref": format!("{}/Defect/{}/Tasks", root, oid),
            "_type": "Task",
            "Count": 0
        }
    })
}

/// Serves a fixed set of records the way the WSAPI query endpoint does:
/// honors `start`, `pagesize` and `fetch`.
#[allow(dead_code)]
pub struct PagedDataset {
    records: Vec<Value>,
    reported_total: Option<usize>,
}

#[allow(dead_code)]
impl PagedDataset {
    pub fn new(records: Vec<Value>) -> Self {
        Self {
            records,
            reported_total: None,
        }
    }

    /// Report a `TotalResultCount` different from the records served.
    pub fn reporting_total(mut self, total: usize) -> Self {
        self.reported_total = Some(total);
        self
    }
}

impl Respond for PagedDataset {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let params: HashMap<String, String> = request.url.query_pairs().into_owned().collect();
        let start = params
            .get("start")
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(1)
            .max(1);
        let page_size = params
            .get("pagesize")
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(200);
        let fetch = params.get("fetch").map(String::as_str).unwrap_or("false");

        let results = self
            .records
            .iter()
            .skip(start - 1)
            .take(page_size)
            .map(|record| apply_fetch(record, fetch))
            .collect();

        let total = self.reported_total.unwrap_or(self.records.len());
        ResponseTemplate::new(200).set_body_json(query_page(total, start, results))
    }
}

/// Trim a full record down to what `fetch` asks for.
fn apply_fetch(record: &Value, fetch: &str) -> Value {
    if fetch.eq_ignore_ascii_case("true") {
        return record.clone();
    }

    let Value::Object(full) = record else {
        return record.clone();
    };
    let wanted: Vec<&str> = if fetch.eq_ignore_ascii_case("false") {
        Vec::new()
    } else {
        fetch.split(',').map(str::trim).collect()
    };

    let trimmed: Map<String, Value> = full
        .iter()
        .filter(|(key, _)| key.starts_with('_') || wanted.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    Value::Object(trimmed)
}
