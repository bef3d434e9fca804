//! MCP Tool definitions and handlers
//!
//! Defines the reminder tools and their implementations. Every tool answers
//! with a pretty-printed JSON document carrying a `success` flag.

use std::sync::Arc;

use chrono::{Local, NaiveDateTime};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::info;

use crate::error::{McpError, ReminderError};
use crate::mcp::types::{CallToolResult, Tool};
use crate::reminders::utils::{parse_flag, parse_hours};
use crate::reminders::ReminderBook;

/// Source of the current local time
pub type Clock = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

/// Tool handler
pub struct ToolHandler {
    book: Arc<RwLock<ReminderBook>>,
    clock: Clock,
}

impl Default for ToolHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolHandler {
    /// Create a tool handler over an empty book, using the local wall clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(|| Local::now().naive_local()))
    }

    /// Create a tool handler with a custom clock
    pub fn with_clock(clock: Clock) -> Self {
        Self {
            book: Arc::new(RwLock::new(ReminderBook::new())),
            clock,
        }
    }

    /// List all available tools
    pub fn list_tools(&self) -> Vec<Tool> {
        vec![
            tool_def("add_reminder", "Add a new reminder with title, datetime (YYYY-MM-DD HH:MM), and optional description", add_reminder_schema()),
            tool_def("list_reminders", "List all reminders, optionally include completed ones (true/false)", list_reminders_schema()),
            tool_def("get_upcoming_reminders", "Get reminders due within the next N hours (default 24)", upcoming_reminders_schema()),
            tool_def("check_overdue_reminders", "Check for overdue reminders that need immediate attention", empty_schema()),
            tool_def("complete_reminder", "Mark a reminder as completed by its ID", reminder_id_schema("ID of the reminder to complete")),
            tool_def("delete_reminder", "Delete a reminder by its ID", reminder_id_schema("ID of the reminder to delete")),
            tool_def("search_reminders", "Search reminders by title or description", search_reminders_schema()),
            tool_def("get_reminder_stats", "Get statistics about all reminders", empty_schema()),
        ]
    }

    /// Call a tool by name
    pub async fn call_tool(&self, name: &str, args: Value) -> CallToolResult {
        // Clients may omit `arguments` entirely for parameterless tools.
        let args = if args.is_null() { json!({}) } else { args };

        match name {
            "add_reminder" => self.handle_add_reminder(args).await,
            "list_reminders" => self.handle_list_reminders(args).await,
            "get_upcoming_reminders" => self.handle_upcoming_reminders(args).await,
            "check_overdue_reminders" => self.handle_overdue_reminders().await,
            "complete_reminder" => self.handle_complete_reminder(args).await,
            "delete_reminder" => self.handle_delete_reminder(args).await,
            "search_reminders" => self.handle_search_reminders(args).await,
            "get_reminder_stats" => self.handle_reminder_stats().await,
            _ => CallToolResult::error(
                McpError::UnknownTool {
                    name: name.to_string(),
                }
                .to_string(),
            ),
        }
    }

    fn now(&self) -> NaiveDateTime {
        (self.clock)()
    }

    // ==================== Tool Handlers ====================

    async fn handle_add_reminder(&self, args: Value) -> CallToolResult {
        #[derive(Deserialize)]
        struct Args {
            title: String,
            datetime_str: String,
            #[serde(default)]
            description: Option<String>,
        }

        let args: Args = match parse_args(args) {
            Ok(a) => a,
            Err(result) => return result,
        };

        let now = self.now();
        let mut book = self.book.write().await;
        let added = book.add(
            &args.title,
            &args.datetime_str,
            args.description.as_deref().unwrap_or_default(),
            now,
        );

        match added {
            Ok(reminder) => {
                info!(
                    "Added reminder: {} - {} ({} in book)",
                    reminder.id,
                    reminder.title,
                    book.len()
                );
                CallToolResult::json(&json!({
                    "success": true,
                    "message": "Reminder added successfully",
                    "reminder": reminder,
                }))
            }
            Err(e) => failure(&e),
        }
    }

    async fn handle_list_reminders(&self, args: Value) -> CallToolResult {
        #[derive(Deserialize)]
        struct Args {
            #[serde(default)]
            include_completed: Option<LooseText>,
        }

        let args: Args = match parse_args(args) {
            Ok(a) => a,
            Err(result) => return result,
        };

        let include_completed = args
            .include_completed
            .map(|flag| parse_flag(&flag.into_text()))
            .unwrap_or(false);

        let reminders = self.book.read().await.list(include_completed);
        if reminders.is_empty() {
            return CallToolResult::json(&json!({
                "success": true,
                "message": "No reminders found",
                "reminders": [],
            }));
        }

        CallToolResult::json(&json!({
            "success": true,
            "count": reminders.len(),
            "reminders": reminders,
        }))
    }

    async fn handle_upcoming_reminders(&self, args: Value) -> CallToolResult {
        #[derive(Deserialize)]
        struct Args {
            #[serde(default)]
            hours: Option<LooseText>,
        }

        let args: Args = match parse_args(args) {
            Ok(a) => a,
            Err(result) => return result,
        };

        let hours = match args.hours {
            Some(hours) => match parse_hours(&hours.into_text()) {
                Ok(h) => h,
                Err(e) => return failure(&e),
            },
            None => 24,
        };

        let now = self.now();
        match self.book.read().await.upcoming(hours, now) {
            Ok(upcoming) => CallToolResult::json(&json!({
                "success": true,
                "count": upcoming.len(),
                "time_window_hours": hours,
                "reminders": upcoming,
            })),
            Err(e) => failure(&e),
        }
    }

    async fn handle_overdue_reminders(&self) -> CallToolResult {
        let now = self.now();
        let overdue = self.book.read().await.overdue(now);

        if overdue.is_empty() {
            return CallToolResult::json(&json!({
                "success": true,
                "message": "No overdue reminders",
                "reminders": [],
            }));
        }

        CallToolResult::json(&json!({
            "success": true,
            "count": overdue.len(),
            "message": format!("ALERT: You have {} overdue reminder(s)!", overdue.len()),
            "reminders": overdue,
        }))
    }

    async fn handle_complete_reminder(&self, args: Value) -> CallToolResult {
        let id = match parse_args::<ReminderIdArgs>(args) {
            Ok(a) => a.reminder_id.into_text(),
            Err(result) => return result,
        };

        let now = self.now();
        match self.book.write().await.complete(&id, now) {
            Ok(reminder) => {
                info!("Completed reminder: {}", id);
                CallToolResult::json(&json!({
                    "success": true,
                    "message": "Reminder marked as completed",
                    "reminder": reminder,
                }))
            }
            Err(e) => failure(&e),
        }
    }

    async fn handle_delete_reminder(&self, args: Value) -> CallToolResult {
        let id = match parse_args::<ReminderIdArgs>(args) {
            Ok(a) => a.reminder_id.into_text(),
            Err(result) => return result,
        };

        match self.book.write().await.delete(&id) {
            Ok(reminder) => {
                info!("Deleted reminder: {}", id);
                CallToolResult::json(&json!({
                    "success": true,
                    "message": "Reminder deleted successfully",
                    "deleted_reminder": reminder,
                }))
            }
            Err(e) => failure(&e),
        }
    }

    async fn handle_search_reminders(&self, args: Value) -> CallToolResult {
        #[derive(Deserialize)]
        struct Args {
            query: String,
        }

        let args: Args = match parse_args(args) {
            Ok(a) => a,
            Err(result) => return result,
        };

        let results = self.book.read().await.search(&args.query);
        if results.is_empty() {
            return CallToolResult::json(&json!({
                "success": true,
                "message": format!("No reminders found matching '{}'", args.query),
                "reminders": [],
            }));
        }

        CallToolResult::json(&json!({
            "success": true,
            "count": results.len(),
            "query": args.query,
            "reminders": results,
        }))
    }

    async fn handle_reminder_stats(&self) -> CallToolResult {
        let now = self.now();
        let stats = self.book.read().await.stats(now);

        CallToolResult::json(&json!({
            "success": true,
            "stats": stats,
        }))
    }
}

/// `reminder_id` argument shared by complete/delete
#[derive(Deserialize)]
struct ReminderIdArgs {
    reminder_id: LooseText,
}

/// Scalar argument that assistants send either as text or as a bare JSON value
#[derive(Deserialize)]
#[serde(untagged)]
enum LooseText {
    Text(String),
    Bool(bool),
    Number(serde_json::Number),
}

impl LooseText {
    fn into_text(self) -> String {
        match self {
            LooseText::Text(s) => s,
            LooseText::Bool(b) => b.to_string(),
            LooseText::Number(n) => n.to_string(),
        }
    }
}

fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T, CallToolResult> {
    serde_json::from_value(args).map_err(|e| {
        CallToolResult::error(
            McpError::InvalidArguments {
                message: e.to_string(),
            }
            .to_string(),
        )
    })
}

fn failure(err: &ReminderError) -> CallToolResult {
    CallToolResult::json(&json!({
        "success": false,
        "error": err.to_string(),
    }))
}

// ==================== Tool Schemas ====================

fn tool_def(name: &str, description: &str, input_schema: Value) -> Tool {
    Tool {
        name: name.to_string(),
        description: Some(description.to_string()),
        input_schema,
    }
}

fn empty_schema() -> Value {
    json!({"type": "object", "properties": {}})
}

fn add_reminder_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "title": {
                "type": "string",
                "description": "Short title of the reminder"
            },
            "datetime_str": {
                "type": "string",
                "description": "When to remind, e.g. 2025-01-31 09:30 (YYYY-MM-DD HH:MM)"
            },
            "description": {
                "type": "string",
                "description": "Optional details",
                "default": ""
            }
        },
        "required": ["title", "datetime_str"]
    })
}

fn list_reminders_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "include_completed": {
                "type": "string",
                "description": "Include completed reminders (true/false)",
                "default": "false"
            }
        }
    })
}

fn upcoming_reminders_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "hours": {
                "type": "string",
                "description": "Size of the look-ahead window in hours",
                "default": "24"
            }
        }
    })
}

fn reminder_id_schema(description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "reminder_id": {
                "type": "string",
                "description": description
            }
        },
        "required": ["reminder_id"]
    })
}

fn search_reminders_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "query": {
                "type": "string",
                "description": "Text to look for in titles and descriptions"
            }
        },
        "required": ["query"]
    })
}
