//! In-memory fake of the RoseStudio server

use crate::fixtures::zip_archive;
use parking_lot::Mutex;
use rose_record::{
    decode_record, encode_request_fields, field, interpret_response, RawResponse, Record, RemoteError,
    ResponseBody, ScenarioRecord,
};
use rose_remote::{ApiRequest, Method, Payload, Transport};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// A request as seen by the fake server
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    /// JSON body, as sent (still codec-encoded)
    pub body: Option<Value>,
}

impl RecordedCall {
    /// `"POST binary/zip/<uuid>"` style label
    #[must_use]
    pub fn label(&self) -> String {
        format!("{} {}", self.method.as_str(), self.path)
    }
}

#[derive(Debug, Default)]
struct ServerState {
    /// Entity name -> records in insertion order (decoded form)
    records: BTreeMap<String, Vec<Record>>,
    /// Code served by `git/createzip`, keyed by instance or class uuid
    archives: HashMap<Uuid, Vec<u8>>,
    uploads: Vec<(Uuid, Vec<u8>)>,
    calls: Vec<RecordedCall>,
    /// Path prefix -> (status, message) answered instead of the real route
    failures: Vec<(String, u16, String)>,
}

/// Fake server implementing [`Transport`]
///
/// Records are kept decoded and encoded again on the way out, so every
/// response passes through the real record codec.
#[derive(Debug)]
pub struct MockTransport {
    server_url: String,
    user: Value,
    state: Mutex<ServerState>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    #[must_use]
    pub fn new() -> Self {
        Self {
            server_url: "http://rose.test".to_string(),
            user: json!({ "email": "dev@rose.test", "name": "Test Developer" }),
            state: Mutex::new(ServerState::default()),
        }
    }

    /// Store a raw record in an entity collection
    pub fn insert(&self, entity: &str, record: Record) {
        self.state
            .lock()
            .records
            .entry(entity.to_string())
            .or_default()
            .push(record);
    }

    /// Add a scenario class
    pub fn add_class(&self, name: &str, is_local: bool) -> ScenarioRecord {
        let mut record = Record::new();
        record.insert(field::UUID.to_string(), Value::String(Uuid::new_v4().to_string()));
        record.insert(field::NAME.to_string(), Value::String(name.to_string()));
        record.insert(field::IS_LOCAL.to_string(), Value::Bool(is_local));
        record.insert(field::CLASS_UUID.to_string(), Value::Null);
        if !is_local {
            record.insert(
                field::GIT_CLONE_URL.to_string(),
                Value::String(format!("https://git.rose.test/{name}.git")),
            );
        }
        self.insert("connections", record.clone());
        ScenarioRecord::try_from(record).expect("fixture class record")
    }

    /// Add an instance of a class
    pub fn add_instance(&self, class: &ScenarioRecord, name: &str) -> ScenarioRecord {
        let mut record = Record::new();
        record.insert(field::UUID.to_string(), Value::String(Uuid::new_v4().to_string()));
        record.insert(field::NAME.to_string(), Value::String(name.to_string()));
        record.insert(field::IS_LOCAL.to_string(), Value::Bool(class.is_local()));
        record.insert(field::CLASS_UUID.to_string(), Value::String(class.uuid().to_string()));
        self.insert("connections", record.clone());
        ScenarioRecord::try_from(record).expect("fixture instance record")
    }

    /// Change one field of a stored scenario
    pub fn set_field(&self, uuid: Uuid, key: &str, value: Value) {
        let mut state = self.state.lock();
        if let Some(record) = find_mut(&mut state, "connections", &uuid.to_string()) {
            record.insert(key.to_string(), value);
        }
    }

    /// Delete a scenario; later lookups answer "no record found"
    pub fn remove(&self, uuid: Uuid) {
        let id = uuid.to_string();
        if let Some(list) = self.state.lock().records.get_mut("connections") {
            list.retain(|r| r.get(field::UUID).and_then(Value::as_str) != Some(id.as_str()));
        }
    }

    /// Current server copy of a scenario
    #[must_use]
    pub fn scenario(&self, uuid: Uuid) -> Option<ScenarioRecord> {
        let mut state = self.state.lock();
        find_mut(&mut state, "connections", &uuid.to_string())
            .and_then(|r| ScenarioRecord::try_from(r.clone()).ok())
    }

    /// Number of stored scenarios
    #[must_use]
    pub fn scenario_count(&self) -> usize {
        self.state.lock().records.get("connections").map_or(0, Vec::len)
    }

    /// Serve this archive for code generation of `uuid`
    pub fn set_code_archive(&self, uuid: Uuid, archive: Vec<u8>) {
        self.state.lock().archives.insert(uuid, archive);
    }

    /// Answer requests whose path starts with `prefix` with an error
    pub fn fail_path(&self, prefix: &str, status: u16, message: &str) {
        self.state
            .lock()
            .failures
            .push((prefix.to_string(), status, message.to_string()));
    }

    /// Uploaded archives in arrival order
    #[must_use]
    pub fn uploads(&self) -> Vec<(Uuid, Vec<u8>)> {
        self.state.lock().uploads.clone()
    }

    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().calls.clone()
    }

    /// Labels of all calls, e.g. `["GET rest/connections/..", ..]`
    #[must_use]
    pub fn call_labels(&self) -> Vec<String> {
        self.calls().iter().map(RecordedCall::label).collect()
    }

    /// Number of mutating calls (POST/PUT) other than code generation
    #[must_use]
    pub fn mutation_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.method != Method::Get && c.path != "git/createzip")
            .count()
    }

    fn route(&self, request: &ApiRequest) -> RawResponse {
        let mut state = self.state.lock();
        state.calls.push(RecordedCall {
            method: request.method,
            path: request.path.clone(),
            query: request.query.clone(),
            body: match &request.payload {
                Payload::Json(value) => Some(value.clone()),
                _ => None,
            },
        });
        if let Some((_, status, message)) = state
            .failures
            .iter()
            .find(|(prefix, _, _)| request.path.starts_with(prefix.as_str()))
        {
            return RawResponse::new(*status, json!({ "error": message }).to_string());
        }

        let segments: Vec<&str> = request.path.split('/').collect();
        match (request.method, segments.as_slice()) {
            (Method::Get, ["user"]) => ok_json(&self.user),
            (Method::Get, ["rest", entity]) => {
                let filter = match request.query_value("filterCondition") {
                    Some(text) => match serde_json::from_str::<Value>(text) {
                        Ok(Value::Object(map)) => map,
                        _ => return RawResponse::new(400, "bad filterCondition"),
                    },
                    None => Record::new(),
                };
                let list: Vec<Value> = state
                    .records
                    .get(*entity)
                    .into_iter()
                    .flatten()
                    .filter(|r| matches_filter(r, &filter))
                    .map(|r| Value::Object(encode_request_fields(r)))
                    .collect();
                ok_json(&Value::Array(list))
            }
            (Method::Get, ["rest", entity, id]) => match find_mut(&mut state, entity, id) {
                Some(record) => ok_json(&Value::Object(encode_request_fields(record))),
                None => not_found(id),
            },
            (Method::Post, ["rest", entity]) => {
                let Some(Value::Object(body)) = payload_json(request) else {
                    return RawResponse::new(400, "record expected");
                };
                let mut record = decode_record(body);
                record
                    .entry(field::UUID.to_string())
                    .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
                fill_git_url(&mut record);
                let response = Value::Object(encode_request_fields(&record));
                state.records.entry((*entity).to_string()).or_default().push(record);
                ok_json(&response)
            }
            (Method::Put, ["rest", entity, id]) => {
                let Some(Value::Object(body)) = payload_json(request) else {
                    return RawResponse::new(400, "record expected");
                };
                match find_mut(&mut state, entity, id) {
                    Some(record) => {
                        for (key, value) in decode_record(body) {
                            record.insert(key, value);
                        }
                        ok_json(&Value::Object(encode_request_fields(record)))
                    }
                    None => not_found(id),
                }
            }
            (Method::Post, ["git", "createzip"]) => {
                let body = payload_json(request).unwrap_or(Value::Null);
                let key = body
                    .get("instanceUuid")
                    .and_then(Value::as_str)
                    .or_else(|| body.get("uuid").and_then(Value::as_str))
                    .and_then(|s| Uuid::parse_str(s).ok());
                let archive = key
                    .and_then(|uuid| state.archives.get(&uuid).cloned())
                    .unwrap_or_else(|| zip_archive(&[]));
                RawResponse::new(200, archive)
            }
            (Method::Post, ["binary", "zip", id]) => {
                let Ok(uuid) = Uuid::parse_str(id) else {
                    return not_found(id);
                };
                let bytes = match &request.payload {
                    Payload::Bytes(bytes) => bytes.clone(),
                    _ => Vec::new(),
                };
                state.uploads.push((uuid, bytes));
                RawResponse::new(200, "{}")
            }
            (Method::Get, ["instantiate", id]) => {
                let Some(placeholder) = request.query_value("placeholderId").map(str::to_string) else {
                    return RawResponse::new(400, json!({ "error": "placeholderId missing" }).to_string());
                };
                let with = request
                    .query_value("withUuid")
                    .map_or_else(|| Uuid::new_v4().to_string(), str::to_string);
                match find_mut(&mut state, "connections", id) {
                    Some(_) => ok_json(&json!({ "placeholderId": placeholder, "instantiatedObject": with })),
                    None => not_found(id),
                }
            }
            _ => RawResponse::new(404, json!({ "error": format!("no route for {}", request.path) }).to_string()),
        }
    }
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    async fn invoke(&self, request: ApiRequest) -> Result<ResponseBody, RemoteError> {
        let raw = self.route(&request);
        interpret_response(raw, request.mode)
    }

    fn server_url(&self) -> String {
        self.server_url.clone()
    }
}

fn ok_json(value: &Value) -> RawResponse {
    RawResponse::new(200, value.to_string())
}

fn not_found(id: &str) -> RawResponse {
    RawResponse::new(500, json!({ "error": format!("no record found with id {id}") }).to_string())
}

fn payload_json(request: &ApiRequest) -> Option<Value> {
    match &request.payload {
        Payload::Json(value) => Some(value.clone()),
        _ => None,
    }
}

fn find_mut<'a>(state: &'a mut ServerState, entity: &str, id: &str) -> Option<&'a mut Record> {
    state
        .records
        .get_mut(entity)?
        .iter_mut()
        .find(|r| r.get(field::UUID).and_then(Value::as_str) == Some(id))
}

/// Non-local classes get a generated git location, as the real server does
fn fill_git_url(record: &mut Record) {
    let is_class = matches!(record.get(field::CLASS_UUID), None | Some(Value::Null));
    let is_local = record.get(field::IS_LOCAL).is_some_and(rose_record::truthy);
    let has_url = record
        .get(field::GIT_CLONE_URL)
        .and_then(Value::as_str)
        .is_some_and(|s| !s.is_empty());
    if is_class && !is_local && !has_url {
        let name = record.get(field::NAME).and_then(Value::as_str).unwrap_or("scenario");
        let url = format!("https://git.rose.test/{name}.git");
        record.insert(field::GIT_CLONE_URL.to_string(), Value::String(url));
    }
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn matches_filter(record: &Record, filter: &Record) -> bool {
    filter.iter().all(|(key, condition)| {
        let actual = record.get(key).and_then(text_of).filter(|s| !s.is_empty());
        match condition {
            Value::String(s) if s == "$isnull" => actual.is_none(),
            Value::Object(op) => {
                if let Some(pattern) = op.get("$like").and_then(Value::as_str) {
                    actual.is_some_and(|a| like_match(pattern, &a))
                } else if let Some(pattern) = op.get("$ilike").and_then(Value::as_str) {
                    actual.is_some_and(|a| like_match(&pattern.to_lowercase(), &a.to_lowercase()))
                } else {
                    false
                }
            }
            other => actual == text_of(other),
        }
    })
}

/// SQL `LIKE` with `%` and `_`
fn like_match(pattern: &str, text: &str) -> bool {
    fn go(p: &[char], t: &[char]) -> bool {
        match p.split_first() {
            None => t.is_empty(),
            Some(('%', rest)) => (0..=t.len()).any(|i| go(rest, &t[i..])),
            Some(('_', rest)) => !t.is_empty() && go(rest, &t[1..]),
            Some((c, rest)) => t.first() == Some(c) && go(rest, &t[1..]),
        }
    }
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    go(&p, &t)
}
