//! Tool surface: one executor call per tool, rendered as display text.

use std::sync::Arc;

use apibridge_core::RequestResult;
use serde_json::{Map, Value, json};

use crate::executor::{ApiExecutor, ApiRequest, is_empty_payload};
use crate::util::{
    ToolError, arg_optional_string, arg_string, arg_u32, field_text, required_string, value_text,
};

pub const DEFAULT_SEARCH_LIMIT: u32 = 10;
pub const NO_UPDATES_MESSAGE: &str = "No updates provided. Please specify title or description.";

#[derive(Debug)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

pub fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "get_user_info",
            description: "Get user information from the API.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "user_id": {
                        "type": "string",
                        "description": "The unique identifier for the user"
                    }
                },
                "required": ["user_id"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "search_items",
            description: "Search for items using the API.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Search query string" },
                    "limit": {
                        "type": "integer",
                        "minimum": 0,
                        "default": DEFAULT_SEARCH_LIMIT,
                        "description": "Maximum number of results to return"
                    }
                },
                "required": ["query"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "create_item",
            description: "Create a new item via the API.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "title": { "type": "string", "description": "Title of the item to create" },
                    "description": {
                        "type": "string",
                        "default": "",
                        "description": "Optional description of the item"
                    }
                },
                "required": ["title"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "update_item",
            description: "Update an existing item via the API.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "item_id": { "type": "string", "description": "ID of the item to update" },
                    "title": { "type": ["string", "null"], "description": "New title (optional)" },
                    "description": {
                        "type": ["string", "null"],
                        "description": "New description (optional)"
                    }
                },
                "required": ["item_id"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "delete_item",
            description: "Delete an item via the API.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "item_id": { "type": "string", "description": "ID of the item to delete" }
                },
                "required": ["item_id"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "get_api_status",
            description: "Check the API status and health.",
            input_schema: json!({
                "type": "object",
                "properties": {},
                "additionalProperties": false
            }),
        },
    ]
}

/// What a handler does with an executor result.
enum Outcome {
    Data(Value),
    Failed(String),
    Absent,
}

fn classify(result: RequestResult) -> Outcome {
    match result {
        Err(err) => Outcome::Failed(err.to_string()),
        Ok(payload) if is_empty_payload(&payload) => Outcome::Absent,
        // The remote API may report an error inside a 2xx body.
        Ok(payload) => match payload.get("error") {
            Some(error) => Outcome::Failed(value_text(error)),
            None => Outcome::Data(payload),
        },
    }
}

#[derive(Clone)]
pub struct ToolHandlers {
    executor: Arc<dyn ApiExecutor>,
}

impl ToolHandlers {
    pub fn new(executor: Arc<dyn ApiExecutor>) -> Self {
        Self { executor }
    }

    /// Parses `args` for the named tool and runs it.
    pub async fn call(&self, name: &str, args: &Map<String, Value>) -> Result<String, ToolError> {
        match name {
            "get_user_info" => {
                let user_id = required_string(args, "user_id")?;
                Ok(self.get_user_info(&user_id).await)
            }
            "search_items" => {
                let query = required_string(args, "query")?;
                let limit = arg_u32(args, "limit", DEFAULT_SEARCH_LIMIT)?;
                Ok(self.search_items(&query, limit).await)
            }
            "create_item" => {
                let title = required_string(args, "title")?;
                let description = arg_string(args, "description", "")?;
                Ok(self.create_item(&title, &description).await)
            }
            "update_item" => {
                let item_id = required_string(args, "item_id")?;
                let title = arg_optional_string(args, "title")?;
                let description = arg_optional_string(args, "description")?;
                Ok(self
                    .update_item(&item_id, title.as_deref(), description.as_deref())
                    .await)
            }
            "delete_item" => {
                let item_id = required_string(args, "item_id")?;
                Ok(self.delete_item(&item_id).await)
            }
            "get_api_status" => Ok(self.get_api_status().await),
            other => Err(
                ToolError::new("unknown_tool", format!("Unknown tool: {other}")).with_field("name"),
            ),
        }
    }

    pub async fn get_user_info(&self, user_id: &str) -> String {
        let result = self
            .executor
            .execute(ApiRequest::get(format!("users/{user_id}")))
            .await;
        match classify(result) {
            Outcome::Absent => "Unable to fetch user information.".to_string(),
            Outcome::Failed(message) => format!("Error: {message}"),
            Outcome::Data(data) => format!(
                "User ID: {}\nName: {}\nEmail: {}\nStatus: {}\nCreated: {}",
                field_text(&data, "id", "Unknown"),
                field_text(&data, "name", "Unknown"),
                field_text(&data, "email", "Unknown"),
                field_text(&data, "status", "Unknown"),
                field_text(&data, "created_at", "Unknown"),
            ),
        }
    }

    pub async fn search_items(&self, query: &str, limit: u32) -> String {
        let request = ApiRequest::get("search")
            .query("q", query)
            .query("limit", limit);
        let data = match classify(self.executor.execute(request).await) {
            Outcome::Absent => return "Unable to perform search.".to_string(),
            Outcome::Failed(message) => return format!("Error: {message}"),
            Outcome::Data(data) => data,
        };

        let items = data
            .get("items")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        if items.is_empty() {
            return "No items found for the given query.".to_string();
        }
        items
            .iter()
            .map(|item| {
                format!(
                    "ID: {}\nTitle: {}\nDescription: {}",
                    field_text(item, "id", "Unknown"),
                    field_text(item, "title", "Unknown"),
                    field_text(item, "description", "No description"),
                )
            })
            .collect::<Vec<_>>()
            .join("\n---\n")
    }

    pub async fn create_item(&self, title: &str, description: &str) -> String {
        let request = ApiRequest::post("items").json(json!({
            "title": title,
            "description": description,
        }));
        match classify(self.executor.execute(request).await) {
            Outcome::Absent => "Unable to create item.".to_string(),
            Outcome::Failed(message) => format!("Error: {message}"),
            Outcome::Data(data) => format!(
                "Item created successfully!\nID: {}\nTitle: {}\nDescription: {}\nCreated: {}",
                field_text(&data, "id", "Unknown"),
                field_text(&data, "title", title),
                field_text(&data, "description", description),
                field_text(&data, "created_at", "Unknown"),
            ),
        }
    }

    /// Sends only the fields that are present and non-empty. With neither,
    /// returns [`NO_UPDATES_MESSAGE`] without touching the executor.
    pub async fn update_item(
        &self,
        item_id: &str,
        title: Option<&str>,
        description: Option<&str>,
    ) -> String {
        let mut changes = Map::new();
        if let Some(title) = title.filter(|t| !t.is_empty()) {
            changes.insert("title".to_string(), Value::from(title));
        }
        if let Some(description) = description.filter(|d| !d.is_empty()) {
            changes.insert("description".to_string(), Value::from(description));
        }
        if changes.is_empty() {
            return NO_UPDATES_MESSAGE.to_string();
        }

        let request = ApiRequest::put(format!("items/{item_id}")).json(Value::Object(changes));
        match classify(self.executor.execute(request).await) {
            Outcome::Absent => "Unable to update item.".to_string(),
            Outcome::Failed(message) => format!("Error: {message}"),
            Outcome::Data(data) => format!(
                "Item updated successfully!\nID: {}\nTitle: {}\nDescription: {}\nUpdated: {}",
                field_text(&data, "id", item_id),
                field_text(&data, "title", "Unknown"),
                field_text(&data, "description", "Unknown"),
                field_text(&data, "updated_at", "Unknown"),
            ),
        }
    }

    pub async fn delete_item(&self, item_id: &str) -> String {
        let request = ApiRequest::delete(format!("items/{item_id}"));
        match classify(self.executor.execute(request).await) {
            Outcome::Absent => "Unable to delete item.".to_string(),
            Outcome::Failed(message) => format!("Error: {message}"),
            Outcome::Data(_) => format!("Item {item_id} deleted successfully."),
        }
    }

    pub async fn get_api_status(&self) -> String {
        let result = self.executor.execute(ApiRequest::get("health")).await;
        match classify(result) {
            Outcome::Absent => "API appears to be down or unreachable.".to_string(),
            Outcome::Failed(message) => format!("API Status: Error - {message}"),
            Outcome::Data(data) => format!(
                "API Status: {}\nVersion: {}\nUptime: {}\nCache entries: {}",
                field_text(&data, "status", "unknown"),
                field_text(&data, "version", "unknown"),
                field_text(&data, "uptime", "unknown"),
                self.executor.cache_entries(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apibridge_core::{QueryValue, RequestError};
    use async_trait::async_trait;
    use std::sync::Mutex;

    use crate::executor::HttpMethod;

    /// Replays canned results and records every request it sees.
    struct ScriptedExecutor {
        results: Mutex<Vec<RequestResult>>,
        seen: Mutex<Vec<ApiRequest>>,
        cache_entries: usize,
    }

    impl ScriptedExecutor {
        fn new(results: Vec<RequestResult>) -> Arc<Self> {
            Arc::new(Self {
                results: Mutex::new(results),
                seen: Mutex::new(Vec::new()),
                cache_entries: 3,
            })
        }

        fn returning(payload: Value) -> Arc<Self> {
            Self::new(vec![Ok(payload)])
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }

        fn last(&self) -> ApiRequest {
            self.seen.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl ApiExecutor for ScriptedExecutor {
        async fn execute(&self, request: ApiRequest) -> RequestResult {
            self.seen.lock().unwrap().push(request);
            let mut results = self.results.lock().unwrap();
            if results.is_empty() {
                Ok(Value::Null)
            } else {
                results.remove(0)
            }
        }

        fn cache_entries(&self) -> usize {
            self.cache_entries
        }
    }

    fn handlers(executor: &Arc<ScriptedExecutor>) -> ToolHandlers {
        ToolHandlers::new(executor.clone())
    }

    #[tokio::test]
    async fn user_info_renders_fields_with_unknown_fallback() {
        let exec = ScriptedExecutor::returning(json!({
            "id": "u1", "name": "Ada", "email": "ada@example.com"
        }));
        let text = handlers(&exec).get_user_info("u1").await;
        assert_eq!(
            text,
            "User ID: u1\nName: Ada\nEmail: ada@example.com\nStatus: Unknown\nCreated: Unknown"
        );
        let request = exec.last();
        assert_eq!(request.endpoint, "users/u1");
        assert_eq!(request.method, HttpMethod::Get);
    }

    #[tokio::test]
    async fn failures_render_with_error_prefix() {
        let exec = ScriptedExecutor::new(vec![Err(RequestError::HttpStatus {
            status: 404,
            body: "Not Found".to_string(),
        })]);
        let text = handlers(&exec).get_user_info("nope").await;
        assert_eq!(text, "Error: HTTP 404: Not Found");
    }

    #[tokio::test]
    async fn error_field_in_success_body_renders_as_error() {
        let exec = ScriptedExecutor::returning(json!({"error": "user suspended"}));
        let text = handlers(&exec).get_user_info("u1").await;
        assert_eq!(text, "Error: user suspended");
    }

    #[tokio::test]
    async fn null_error_field_still_counts_as_error() {
        let exec = ScriptedExecutor::returning(json!({"error": null, "id": "u1"}));
        let text = handlers(&exec).get_user_info("u1").await;
        assert_eq!(text, "Error: null");
    }

    #[tokio::test]
    async fn falsy_scalar_payloads_render_unable_message() {
        for payload in [json!(false), json!(0), json!(""), json!(0.0)] {
            let exec = ScriptedExecutor::returning(payload);
            assert_eq!(
                handlers(&exec).delete_item("i-1").await,
                "Unable to delete item."
            );
        }
    }

    #[tokio::test]
    async fn whitespace_update_fields_are_sent_as_given() {
        let exec = ScriptedExecutor::new(vec![Ok(json!({"id": "i-1"})), Ok(json!({"id": "i-1"}))]);
        let tools = handlers(&exec);

        let args = json!({"item_id": "i-1", "title": "  "});
        let text = tools
            .call("update_item", args.as_object().unwrap())
            .await
            .unwrap();
        assert!(text.starts_with("Item updated successfully!"));
        assert_eq!(exec.last().body, Some(json!({"title": "  "})));

        let args = json!({"item_id": "i-1", "title": "New", "description": "   "});
        tools
            .call("update_item", args.as_object().unwrap())
            .await
            .unwrap();
        assert_eq!(
            exec.last().body,
            Some(json!({"title": "New", "description": "   "}))
        );
        assert_eq!(exec.calls(), 2);
    }

    #[tokio::test]
    async fn blank_query_is_forwarded() {
        let exec = ScriptedExecutor::returning(json!({"items": []}));
        let args = json!({"query": " "});
        handlers(&exec)
            .call("search_items", args.as_object().unwrap())
            .await
            .unwrap();
        assert_eq!(exec.last().query[0], ("q".to_string(), QueryValue::from(" ")));
    }

    #[tokio::test]
    async fn empty_payload_renders_unable_message() {
        let exec = ScriptedExecutor::returning(json!({}));
        assert_eq!(
            handlers(&exec).get_user_info("u1").await,
            "Unable to fetch user information."
        );
        let exec = ScriptedExecutor::returning(Value::Null);
        assert_eq!(
            handlers(&exec).search_items("x", 10).await,
            "Unable to perform search."
        );
    }

    #[tokio::test]
    async fn search_flattens_items_and_sends_query() {
        let exec = ScriptedExecutor::returning(json!({
            "items": [
                {"id": 1, "title": "Lamp", "description": "Desk lamp"},
                {"id": 2, "title": "Chair"}
            ]
        }));
        let text = handlers(&exec).search_items("lamp", 5).await;
        assert_eq!(
            text,
            "ID: 1\nTitle: Lamp\nDescription: Desk lamp\n---\nID: 2\nTitle: Chair\nDescription: No description"
        );
        let request = exec.last();
        assert_eq!(request.endpoint, "search");
        assert_eq!(
            request.query,
            vec![
                ("q".to_string(), QueryValue::from("lamp")),
                ("limit".to_string(), QueryValue::from(5u32)),
            ]
        );
    }

    #[tokio::test]
    async fn search_with_no_items_says_so() {
        for payload in [json!({"items": []}), json!({"total": 0})] {
            let exec = ScriptedExecutor::returning(payload);
            assert_eq!(
                handlers(&exec).search_items("zzz", 10).await,
                "No items found for the given query."
            );
        }
    }

    #[tokio::test]
    async fn create_falls_back_to_submitted_values() {
        let exec = ScriptedExecutor::returning(json!({"id": "i-9", "created_at": "2026-01-01"}));
        let text = handlers(&exec).create_item("Lamp", "Bright").await;
        assert_eq!(
            text,
            "Item created successfully!\nID: i-9\nTitle: Lamp\nDescription: Bright\nCreated: 2026-01-01"
        );
        let request = exec.last();
        assert_eq!(request.method, HttpMethod::Post);
        assert_eq!(
            request.body,
            Some(json!({"title": "Lamp", "description": "Bright"}))
        );
    }

    #[tokio::test]
    async fn update_without_changes_never_calls_executor() {
        let exec = ScriptedExecutor::new(vec![]);
        let tools = handlers(&exec);
        assert_eq!(tools.update_item("i-1", None, None).await, NO_UPDATES_MESSAGE);
        assert_eq!(
            tools.update_item("i-1", Some(""), Some("")).await,
            NO_UPDATES_MESSAGE
        );
        assert!(NO_UPDATES_MESSAGE.starts_with("No updates provided"));
        assert_eq!(exec.calls(), 0);
    }

    #[tokio::test]
    async fn update_sends_only_provided_fields() {
        let exec = ScriptedExecutor::returning(json!({"title": "New", "updated_at": "now"}));
        let text = handlers(&exec).update_item("i-1", Some("New"), None).await;
        assert_eq!(
            text,
            "Item updated successfully!\nID: i-1\nTitle: New\nDescription: Unknown\nUpdated: now"
        );
        let request = exec.last();
        assert_eq!(request.endpoint, "items/i-1");
        assert_eq!(request.method, HttpMethod::Put);
        assert_eq!(request.body, Some(json!({"title": "New"})));
        assert_eq!(exec.calls(), 1);
    }

    #[tokio::test]
    async fn delete_reports_item_id() {
        let exec = ScriptedExecutor::returning(json!({
            "success": true, "message": "Operation completed successfully"
        }));
        assert_eq!(
            handlers(&exec).delete_item("i-4").await,
            "Item i-4 deleted successfully."
        );
        assert_eq!(exec.last().method, HttpMethod::Delete);
    }

    #[tokio::test]
    async fn status_includes_cache_entries() {
        let exec = ScriptedExecutor::returning(json!({"status": "ok", "version": "2.1"}));
        assert_eq!(
            handlers(&exec).get_api_status().await,
            "API Status: ok\nVersion: 2.1\nUptime: unknown\nCache entries: 3"
        );
    }

    #[tokio::test]
    async fn status_failure_and_absent_messages() {
        let exec = ScriptedExecutor::new(vec![Err(RequestError::RateLimited)]);
        assert_eq!(
            handlers(&exec).get_api_status().await,
            "API Status: Error - Rate limit exceeded. Please try again later."
        );
        let exec = ScriptedExecutor::returning(json!({}));
        assert_eq!(
            handlers(&exec).get_api_status().await,
            "API appears to be down or unreachable."
        );
    }

    #[tokio::test]
    async fn call_validates_arguments_before_executing() {
        let exec = ScriptedExecutor::new(vec![]);
        let tools = handlers(&exec);

        let err = tools.call("get_user_info", &Map::new()).await.unwrap_err();
        assert_eq!(err.field.as_deref(), Some("user_id"));

        let args = json!({"query": "x", "limit": "ten"});
        let err = tools
            .call("search_items", args.as_object().unwrap())
            .await
            .unwrap_err();
        assert_eq!(err.field.as_deref(), Some("limit"));

        let err = tools.call("drop_tables", &Map::new()).await.unwrap_err();
        assert_eq!(err.code, "unknown_tool");
        assert_eq!(exec.calls(), 0);
    }

    #[tokio::test]
    async fn call_applies_defaults() {
        let exec = ScriptedExecutor::new(vec![Ok(json!({"items": []})), Ok(json!({"id": 1}))]);
        let tools = handlers(&exec);

        let args = json!({"query": "lamp"});
        tools
            .call("search_items", args.as_object().unwrap())
            .await
            .unwrap();
        assert!(exec.last().query.contains(&("limit".to_string(), 10u32.into())));

        let args = json!({"title": "Lamp"});
        tools
            .call("create_item", args.as_object().unwrap())
            .await
            .unwrap();
        assert_eq!(
            exec.last().body,
            Some(json!({"title": "Lamp", "description": ""}))
        );
    }

    #[test]
    fn definitions_cover_every_dispatched_tool() {
        let names: Vec<_> = tool_definitions().iter().map(|t| t.name).collect();
        assert_eq!(
            names,
            [
                "get_user_info",
                "search_items",
                "create_item",
                "update_item",
                "delete_item",
                "get_api_status"
            ]
        );
        let search = tool_definitions()
            .into_iter()
            .find(|t| t.name == "search_items")
            .unwrap();
        assert_eq!(search.input_schema["properties"]["limit"]["default"], 10);
    }
}
