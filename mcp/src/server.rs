//! MCP server runtime: owns registered tools and answers `tools/list` and
//! `tools/call` over any rmcp transport.

use std::sync::Arc;

use dashmap::DashMap;
use rmcp::{
    model::{
        CallToolRequestParam, CallToolResult, JsonObject, ListToolsResult,
        PaginatedRequestParam, ServerCapabilities, ServerInfo, Tool,
    },
    service::RequestContext,
    ErrorData, RoleServer, ServerHandler,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    error::{McpError, McpResult},
    pipeline::{ToolHandler, ToolRequest},
    toolkit::ToolRuntime,
};

const DEFAULT_INSTRUCTIONS: &str = "Object storage tools. Every tool accepts an optional \
    `connection` argument naming the storage connection; the default connection is used when \
    it is omitted.";

#[derive(Clone)]
struct RegisteredTool {
    tool: Tool,
    handler: ToolHandler,
}

/// Tool table behind the MCP protocol handler.
#[derive(Clone)]
pub struct ToolServer {
    name: String,
    version: String,
    instructions: String,
    tools: Arc<DashMap<String, RegisteredTool>>,
}

impl ToolServer {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            tools: Arc::new(DashMap::new()),
        }
    }

    #[must_use]
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn tool(&self, name: &str) -> Option<Tool> {
        self.tools.get(name).map(|entry| entry.tool.clone())
    }

    /// Registered tools sorted by name.
    pub fn tools(&self) -> Vec<Tool> {
        let mut tools: Vec<Tool> = self.tools.iter().map(|e| e.tool.clone()).collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    /// Invoke a tool. Handler errors come back as error-result envelopes; only
    /// an unknown tool name is an `Err`.
    pub async fn call(
        &self,
        ct: CancellationToken,
        name: &str,
        arguments: JsonObject,
    ) -> McpResult<CallToolResult> {
        let handler = self
            .tools
            .get(name)
            .map(|entry| Arc::clone(&entry.handler))
            .ok_or_else(|| McpError::ToolNotFound(name.to_string()))?;

        match handler(ct, ToolRequest::new(name, arguments)).await {
            Ok(result) => Ok(result),
            Err(err) => {
                debug!(tool = %name, error = %err, "Tool call returned an error");
                Ok(err.to_call_result())
            }
        }
    }
}

impl ToolRuntime for ToolServer {
    fn add_tool(&self, tool: Tool, handler: ToolHandler) {
        let name = tool.name.to_string();
        if self
            .tools
            .insert(name.clone(), RegisteredTool { tool, handler })
            .is_some()
        {
            warn!(tool = %name, "Replacing previously registered tool");
        }
    }
}

impl ServerHandler for ToolServer {
    fn get_info(&self) -> ServerInfo {
        let mut info = ServerInfo::default();
        info.capabilities = ServerCapabilities::builder().enable_tools().build();
        info.server_info.name = self.name.clone();
        info.server_info.version = self.version.clone();
        info.instructions = Some(self.instructions.clone());
        info
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        Ok(ListToolsResult::with_all_items(self.tools()))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        let arguments = request.arguments.unwrap_or_default();
        self.call(context.ct, &request.name, arguments)
            .await
            .map_err(|e| ErrorData::invalid_params(e.to_string(), None))
    }
}
