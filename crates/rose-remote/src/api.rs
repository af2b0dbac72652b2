//! Typed scenario API
//!
//! Thin, sequential wrappers over the REST interface. Every call goes
//! through the [`Transport`]; nothing here retries or caches.

use crate::entity::Entity;
use crate::error::ApiError;
use crate::transport::{ApiRequest, Transport};
use rose_record::{field, Placeholder, Query, Record, ScenarioMetadata, ScenarioRecord};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Fields never copied from a class into a new instance
pub const DEFAULT_SYSTEM_FIELDS: [&str; 5] = [
    "UUID",
    "CLASS_UUID",
    "CREATION_TIMESTAMP",
    "MODIFIED_TIMESTAMP",
    "ID",
];

/// Client for scenario and entity operations
#[derive(Clone)]
pub struct ScenarioApi {
    transport: Arc<dyn Transport>,
    system_fields: Vec<String>,
}

impl fmt::Debug for ScenarioApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScenarioApi")
            .field("server_url", &self.transport.server_url())
            .field("system_fields", &self.system_fields)
            .finish()
    }
}

impl ScenarioApi {
    /// Create API over a transport
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            system_fields: DEFAULT_SYSTEM_FIELDS.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    /// Override the system field list
    #[must_use]
    pub fn with_system_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.system_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn server_url(&self) -> String {
        self.transport.server_url()
    }

    /// Studio page for a record
    #[must_use]
    pub fn entity_page_url(&self, entity: Entity, uuid: &str) -> String {
        let base = self.server_url();
        match entity {
            Entity::Connections => format!("{base}/#/connectionobject/CONNECTIONS/{uuid}"),
            other => format!("{base}/#/databaseobject/{}/{uuid}", other.as_str().to_uppercase()),
        }
    }

    async fn call(&self, request: ApiRequest) -> Result<Value, ApiError> {
        debug!(method = request.method.as_str(), path = %request.path, "remote call");
        let body = self.transport.invoke(request).await?;
        Ok(body.into_json()?)
    }

    async fn call_raw(&self, request: ApiRequest) -> Result<Vec<u8>, ApiError> {
        debug!(method = request.method.as_str(), path = %request.path, "remote call (raw)");
        let body = self.transport.invoke(request.raw_response()).await?;
        Ok(body.into_bytes())
    }

    // ------------------------------------------------------------------
    // Generic entity access

    /// Current user information
    pub async fn user(&self) -> Result<Value, ApiError> {
        self.call(ApiRequest::get("user")).await
    }

    /// All records of a collection
    pub async fn list(&self, entity: Entity) -> Result<Vec<Record>, ApiError> {
        let value = self.call(ApiRequest::get(format!("rest/{entity}"))).await?;
        into_records(value)
    }

    /// One record by id
    pub async fn get(&self, entity: Entity, uuid: &str) -> Result<Record, ApiError> {
        let value = self.call(ApiRequest::get(format!("rest/{entity}/{uuid}"))).await?;
        into_record(value)
    }

    /// Records matching a predicate
    pub async fn find(&self, entity: Entity, query: &Query) -> Result<Vec<Record>, ApiError> {
        let request = ApiRequest::get(format!("rest/{entity}"))
            .with_query("filterCondition", query.to_filter_condition());
        into_records(self.call(request).await?)
    }

    /// The single record matching a predicate
    pub async fn find_one(&self, entity: Entity, query: &Query) -> Result<Record, ApiError> {
        let mut records = self.find(entity, query).await?;
        match records.len() {
            0 => Err(ApiError::NoMatch(query.to_filter_condition())),
            1 => Ok(records.remove(0)),
            _ => Err(ApiError::NotUnique(query.to_filter_condition())),
        }
    }

    /// Look up records by name pattern across all collections
    ///
    /// Returns the first collection with a successful answer.
    pub async fn find_in_any(&self, name_glob: &str) -> Result<(Entity, Vec<Record>), ApiError> {
        let query = Query::new().name_glob(name_glob);
        for entity in Entity::ALL {
            match self.find(entity, &query).await {
                Ok(records) => return Ok((entity, records)),
                Err(err) => debug!(%entity, error = %err, "not found in collection"),
            }
        }
        Err(ApiError::invalid(format!("no entity matching \"{name_glob}\" found.")))
    }

    /// Create a record
    pub async fn create(&self, entity: Entity, record: &Record) -> Result<Value, ApiError> {
        self.call(ApiRequest::post_record(format!("rest/{entity}"), record)).await
    }

    /// Update fields of a record
    pub async fn update(&self, entity: Entity, uuid: &str, record: &Record) -> Result<Value, ApiError> {
        self.call(ApiRequest::put_record(format!("rest/{entity}/{uuid}"), record))
            .await
    }

    // ------------------------------------------------------------------
    // Scenarios

    /// Fetch a scenario by id
    pub async fn scenario(&self, uuid: Uuid) -> Result<ScenarioRecord, ApiError> {
        let record = self.get(Entity::Connections, &uuid.to_string()).await?;
        Ok(ScenarioRecord::try_from(record)?)
    }

    /// Scenarios matching a predicate
    pub async fn find_scenarios(&self, query: &Query) -> Result<Vec<ScenarioRecord>, ApiError> {
        self.find(Entity::Connections, query)
            .await?
            .into_iter()
            .map(|r| ScenarioRecord::try_from(r).map_err(ApiError::from))
            .collect()
    }

    /// Classes matching a predicate (all classes for an empty query)
    pub async fn find_classes(&self, query: Query) -> Result<Vec<ScenarioRecord>, ApiError> {
        self.find_scenarios(&query.is_null(field::CLASS_UUID)).await
    }

    /// All scenario classes
    pub async fn scenario_classes(&self) -> Result<Vec<ScenarioRecord>, ApiError> {
        self.find_classes(Query::new()).await
    }

    /// The single class matching a predicate
    pub async fn find_one_class(&self, query: Query) -> Result<ScenarioRecord, ApiError> {
        let record = self
            .find_one(Entity::Connections, &query.is_null(field::CLASS_UUID))
            .await?;
        Ok(ScenarioRecord::try_from(record)?)
    }

    /// All instances of a class
    pub async fn instances_of(&self, class_uuid: Uuid) -> Result<Vec<ScenarioRecord>, ApiError> {
        self.find_instances(class_uuid, Query::new()).await
    }

    /// Instances of a class matching a predicate
    pub async fn find_instances(&self, class_uuid: Uuid, query: Query) -> Result<Vec<ScenarioRecord>, ApiError> {
        self.find_scenarios(&query.eq(field::CLASS_UUID, class_uuid.to_string()))
            .await
    }

    /// The single instance of a class matching a predicate
    pub async fn find_one_instance(&self, class_uuid: Uuid, query: Query) -> Result<ScenarioRecord, ApiError> {
        let record = self
            .find_one(
                Entity::Connections,
                &query.eq(field::CLASS_UUID, class_uuid.to_string()),
            )
            .await?;
        Ok(ScenarioRecord::try_from(record)?)
    }

    /// Create a scenario class
    pub async fn create_class(&self, record: &Record) -> Result<ScenarioRecord, ApiError> {
        let name = record
            .get(field::NAME)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let response = self.create(Entity::Connections, record).await?;
        match ScenarioRecord::from_value(response) {
            Ok(created) => Ok(created),
            Err(_) => self.find_one_class(Query::new().eq(field::NAME, name)).await,
        }
    }

    /// Create an instance of a class
    ///
    /// Copies every class field except the system fields and `NAME`, links the
    /// new record to the class and clears the git location.
    pub async fn create_instance(
        &self,
        class_uuid: Uuid,
        name: &str,
        mut extra: Record,
    ) -> Result<ScenarioRecord, ApiError> {
        if name.trim().is_empty() {
            return Err(ApiError::invalid("\"NAME\" field not specified for new instance"));
        }
        let class = self.scenario(class_uuid).await?;
        if class.is_instance() {
            return Err(ApiError::invalid(format!(
                "Can't create instance of an instance (uuid: \"{class_uuid}\", name: \"{}\")",
                class.name()
            )));
        }
        for (key, value) in class.fields() {
            if key == field::NAME || self.system_fields.iter().any(|f| f == key) {
                continue;
            }
            extra.insert(key.clone(), value.clone());
        }
        extra.insert(field::NAME.to_string(), Value::String(name.to_string()));
        extra.insert(field::CLASS_UUID.to_string(), Value::String(class_uuid.to_string()));
        extra.insert(field::GIT_CLONE_URL.to_string(), Value::String(String::new()));
        extra.insert(field::GIT_SUBFOLDER.to_string(), Value::String(String::new()));

        let response = self.create(Entity::Connections, &extra).await?;
        match ScenarioRecord::from_value(response) {
            Ok(created) => Ok(created),
            Err(_) => {
                self.find_one_instance(class_uuid, Query::new().eq(field::NAME, name))
                    .await
            }
        }
    }

    /// Class of a scenario (the scenario itself for a class)
    pub async fn class_of(&self, scenario: &ScenarioRecord) -> Result<ScenarioRecord, ApiError> {
        match scenario.class_uuid() {
            None => Ok(scenario.clone()),
            Some(class_uuid) => self.scenario(class_uuid).await,
        }
    }

    // ------------------------------------------------------------------
    // Metadata

    /// `configJsonObj` of a scenario, `{}` when unset
    pub async fn config_json(&self, uuid: Uuid) -> Result<Value, ApiError> {
        Ok(self.scenario(uuid).await?.metadata().config())
    }

    /// Replace `configJsonObj`, keeping the rest of `__JSON`
    pub async fn update_config_json(&self, uuid: Uuid, config: Value) -> Result<Value, ApiError> {
        let metadata: ScenarioMetadata = self.scenario(uuid).await?.metadata().with_config(config);
        let mut record = Record::new();
        record.insert(field::JSON.to_string(), metadata.to_field_value());
        self.update(Entity::Connections, &uuid.to_string(), &record).await
    }

    /// `placeholderObjects` of a scenario
    pub async fn placeholders(&self, uuid: Uuid) -> Result<BTreeMap<String, Placeholder>, ApiError> {
        Ok(self.scenario(uuid).await?.metadata().placeholders())
    }

    /// Instantiate a placeholder, optionally with a given object
    pub async fn instantiate_placeholder(
        &self,
        uuid: Uuid,
        placeholder_id: &str,
        with_uuid: Option<&str>,
    ) -> Result<Value, ApiError> {
        let mut request =
            ApiRequest::get(format!("instantiate/{uuid}")).with_query("placeholderId", placeholder_id);
        if let Some(with) = with_uuid {
            request = request.with_query("withUuid", with);
        }
        self.call(request).await
    }

    // ------------------------------------------------------------------
    // Code transfer

    /// Generate and fetch the code archive of a class or instance
    pub async fn fetch_code_archive(&self, uuid: Uuid) -> Result<Vec<u8>, ApiError> {
        let scenario = self.scenario(uuid).await?;
        let class = self.class_of(&scenario).await?;
        let instance_uuid = scenario.is_instance().then(|| scenario.uuid());
        self.request_code_archive(&class, instance_uuid).await
    }

    /// Generate and fetch code for a known class
    ///
    /// The server clones the class's git location unless the class is local.
    pub async fn request_code_archive(
        &self,
        class: &ScenarioRecord,
        instance_uuid: Option<Uuid>,
    ) -> Result<Vec<u8>, ApiError> {
        let git_url = class.git_clone_url();
        if !class.is_local() && git_url.is_none() {
            return Err(ApiError::invalid(format!(
                "no gitUrl found in class object with uuid {}",
                class.uuid()
            )));
        }
        let body = json!({
            "instanceUuid": instance_uuid.map(|u| u.to_string()),
            "gitUrl": git_url,
            "gitSubfolder": class.git_subfolder(),
            "uuid": class.uuid().to_string(),
            "name": class.name(),
            "isLocal": class.is_local(),
        });
        self.call_raw(ApiRequest::post_json_unprocessed("git/createzip", body))
            .await
    }

    /// Upload a code archive for a class
    pub async fn upload_code_archive(&self, uuid: Uuid, archive: Vec<u8>) -> Result<(), ApiError> {
        self.call_raw(ApiRequest::post_bytes(format!("binary/zip/{uuid}"), archive))
            .await?;
        Ok(())
    }
}

fn into_record(value: Value) -> Result<Record, ApiError> {
    match value {
        Value::Object(record) => Ok(record),
        other => Err(ApiError::UnexpectedResponse(type_name(&other).to_string())),
    }
}

fn into_records(value: Value) -> Result<Vec<Record>, ApiError> {
    match value {
        Value::Array(items) => items.into_iter().map(into_record).collect(),
        Value::Null => Ok(Vec::new()),
        other => Err(ApiError::UnexpectedResponse(type_name(&other).to_string())),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{Method, Payload};
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use rose_record::{RemoteError, ResponseBody};

    const CLASS: &str = "586f14db-e121-8f74-b30f-8b070579ad51";

    /// Replays canned answers in order and records every request
    struct Replay {
        answers: Mutex<Vec<Result<ResponseBody, RemoteError>>>,
        seen: Mutex<Vec<ApiRequest>>,
    }

    impl Replay {
        fn new(answers: Vec<Result<ResponseBody, RemoteError>>) -> Arc<Self> {
            Arc::new(Self {
                answers: Mutex::new(answers),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait::async_trait]
    impl Transport for Replay {
        async fn invoke(&self, request: ApiRequest) -> Result<ResponseBody, RemoteError> {
            self.seen.lock().push(request);
            self.answers.lock().remove(0)
        }

        fn server_url(&self) -> String {
            "https://studio.test".to_string()
        }
    }

    fn class_json() -> Value {
        json!({
            "UUID": CLASS, "NAME": "Demo", "ISLOCAL": false,
            "Git Clone URL": "https://git.test/demo.git", "Git Subfolder": "src",
            "CREATION_TIMESTAMP": "2020-01-01", "Manufacturer": "ACME"
        })
    }

    #[tokio::test]
    async fn find_one_rejects_multiple_matches() {
        let transport = Replay::new(vec![Ok(ResponseBody::Json(json!([
            { "UUID": "a", "NAME": "x" }, { "UUID": "b", "NAME": "x" }
        ])))]);
        let api = ScenarioApi::new(transport.clone());
        let err = api
            .find_one(Entity::Robots, &Query::new().eq("NAME", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotUnique(_)));
        let seen = transport.seen.lock();
        assert_eq!(seen[0].path, "rest/robots");
        assert_eq!(seen[0].query_value("filterCondition"), Some("{\"NAME\":\"x\"}"));
    }

    #[tokio::test]
    async fn find_one_reports_no_match() {
        let transport = Replay::new(vec![Ok(ResponseBody::Json(json!([])))]);
        let api = ScenarioApi::new(transport);
        let err = api.find_one(Entity::Connections, &Query::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "found no record that matches the given query {}");
    }

    #[tokio::test]
    async fn create_instance_copies_class_fields() {
        let created = json!({ "UUID": "b4e9c8bf-de02-6f68-00ab-b7da1adb45bb", "NAME": "Demo01", "CLASS_UUID": CLASS });
        let transport = Replay::new(vec![
            Ok(ResponseBody::Json(class_json())),
            Ok(ResponseBody::Json(created)),
        ]);
        let api = ScenarioApi::new(transport.clone());
        let instance = api
            .create_instance(Uuid::parse_str(CLASS).unwrap(), "Demo01", Record::new())
            .await
            .unwrap();
        assert_eq!(instance.class_uuid(), Some(Uuid::parse_str(CLASS).unwrap()));

        let seen = transport.seen.lock();
        assert_eq!(seen[1].method, Method::Post);
        let Payload::Json(Value::Object(body)) = &seen[1].payload else {
            panic!("expected json payload");
        };
        assert_eq!(body.get("NAME"), Some(&json!("Demo01")));
        assert_eq!(body.get("Manufacturer"), Some(&json!("ACME")));
        assert_eq!(body.get("CLASS_UUID"), Some(&json!(CLASS)));
        assert_eq!(body.get("Git Clone URL"), Some(&json!("")));
        assert!(body.get("CREATION_TIMESTAMP").is_none());
    }

    #[tokio::test]
    async fn create_instance_requires_name() {
        let api = ScenarioApi::new(Replay::new(Vec::new()));
        let err = api
            .create_instance(Uuid::parse_str(CLASS).unwrap(), "  ", Record::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Invalid(_)));
    }

    #[tokio::test]
    async fn code_archive_needs_git_url_for_server_classes() {
        let api = ScenarioApi::new(Replay::new(Vec::new()));
        let class = ScenarioRecord::from_value(json!({ "UUID": CLASS, "NAME": "Demo" })).unwrap();
        let err = api.request_code_archive(&class, None).await.unwrap_err();
        assert!(err.to_string().starts_with("no gitUrl found"));
    }

    #[tokio::test]
    async fn code_archive_is_fetched_raw() {
        let transport = Replay::new(vec![Ok(ResponseBody::Raw(vec![1, 2, 3]))]);
        let api = ScenarioApi::new(transport.clone());
        let class = ScenarioRecord::from_value(class_json()).unwrap();
        let bytes = api.request_code_archive(&class, None).await.unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
        let seen = transport.seen.lock();
        assert_eq!(seen[0].path, "git/createzip");
        assert_eq!(seen[0].mode, rose_record::ResponseMode::Raw);
    }

    #[test]
    fn page_urls() {
        let api = ScenarioApi::new(Replay::new(Vec::new()));
        assert_eq!(
            api.entity_page_url(Entity::Connections, "u1"),
            "https://studio.test/#/connectionobject/CONNECTIONS/u1"
        );
        assert_eq!(
            api.entity_page_url(Entity::Robots, "u2"),
            "https://studio.test/#/databaseobject/ROBOTS/u2"
        );
    }
}
