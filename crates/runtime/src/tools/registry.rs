//! Catalog of discovered tools.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use mcp::Tool;

use super::errors::ToolError;
use super::schema::{self, InvocationContract, SchemaError};
use super::transport::ToolTransport;
use crate::model::ToolSpec;

/// Something discovery noticed but did not fail on.
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// The tool's schema could not be translated, so it is not callable.
    Excluded { tool: String, reason: SchemaError },
    /// A second tool with an already registered name. The first one wins.
    SchemaConflict { tool: String },
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Excluded { tool, reason } => write!(f, "{tool} excluded: {reason}"),
            Self::SchemaConflict { tool } => {
                write!(f, "{tool} listed twice, keeping the first definition")
            }
        }
    }
}

/// Immutable result of one discovery pass.
#[derive(Debug, Default)]
pub struct Catalog {
    contracts: Vec<Arc<InvocationContract>>,
    index: HashMap<String, usize>,
    diagnostics: Vec<Diagnostic>,
}

impl Catalog {
    /// Translate every tool, recording the ones that cannot be registered.
    pub fn build(tools: &[Tool]) -> Self {
        let mut catalog = Self::default();

        for tool in tools {
            if catalog.index.contains_key(&tool.name) {
                tracing::warn!(tool = %tool.name, "duplicate tool name, keeping the first");
                catalog.diagnostics.push(Diagnostic::SchemaConflict {
                    tool: tool.name.clone(),
                });
                continue;
            }

            match schema::translate(tool) {
                Ok(contract) => {
                    catalog
                        .index
                        .insert(contract.name().to_string(), catalog.contracts.len());
                    catalog.contracts.push(Arc::new(contract));
                }
                Err(reason) => {
                    tracing::warn!(tool = %tool.name, error = %reason, "excluding tool");
                    catalog.diagnostics.push(Diagnostic::Excluded {
                        tool: tool.name.clone(),
                        reason,
                    });
                }
            }
        }

        catalog
    }

    pub fn get(&self, name: &str) -> Option<&Arc<InvocationContract>> {
        self.index.get(name).map(|&i| &self.contracts[i])
    }

    /// Contracts in discovery order.
    pub fn contracts(&self) -> &[Arc<InvocationContract>] {
        &self.contracts
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.contracts.iter().map(|c| c.spec()).collect()
    }

    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }
}

/// Name-addressed tool contracts, replaceable as a whole.
///
/// Readers always see one complete catalog: rediscovery builds the new one
/// off to the side and swaps it in.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    catalog: RwLock<Arc<Catalog>>,
}

impl ToolRegistry {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog: RwLock::new(Arc::new(catalog)),
        }
    }

    /// List the transport's tools and build a registry from them.
    pub async fn discover<T: ToolTransport>(transport: &T) -> mcp::Result<Self> {
        let tools = transport.list_tools().await?;
        let registry = Self::new(Catalog::build(&tools));
        tracing::info!(tools = registry.snapshot().len(), "discovered tools");
        Ok(registry)
    }

    /// Rediscover and replace the catalog. On failure the old one stays.
    pub async fn rediscover<T: ToolTransport>(&self, transport: &T) -> mcp::Result<Arc<Catalog>> {
        let tools = transport.list_tools().await?;
        let catalog = Arc::new(Catalog::build(&tools));
        *self.catalog.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&catalog);
        tracing::info!(tools = catalog.len(), "rediscovered tools");
        Ok(catalog)
    }

    /// The catalog as of now.
    pub fn snapshot(&self) -> Arc<Catalog> {
        Arc::clone(&self.catalog.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn get(&self, name: &str) -> Result<Arc<InvocationContract>, ToolError> {
        self.snapshot()
            .get(name)
            .cloned()
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.snapshot().specs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{StubTransport, add_tool, tool};
    use serde_json::json;

    #[test]
    fn malformed_tools_are_excluded_not_fatal() {
        let catalog = Catalog::build(&[
            add_tool(),
            tool("broken", json!({"properties": "nope"})),
            tool("echo", json!({"properties": {"text": {"type": "string"}}})),
        ]);

        assert_eq!(catalog.len(), 2);
        assert!(catalog.get("broken").is_none());
        assert_eq!(
            catalog.diagnostics(),
            &[Diagnostic::Excluded {
                tool: "broken".into(),
                reason: SchemaError::InvalidProperties,
            }]
        );
    }

    #[test]
    fn first_definition_wins_on_name_conflict() {
        let catalog = Catalog::build(&[
            add_tool(),
            tool("add", json!({"properties": {"x": {"type": "string"}}})),
        ]);

        assert_eq!(catalog.len(), 1);
        assert!(catalog.get("add").unwrap().parameter("a").is_some());
        assert_eq!(
            catalog.diagnostics(),
            &[Diagnostic::SchemaConflict { tool: "add".into() }]
        );
    }

    #[test]
    fn specs_keep_discovery_order() {
        let catalog = Catalog::build(&[
            tool("zeta", json!({})),
            add_tool(),
            tool("alpha", json!({})),
        ]);
        let names: Vec<_> = catalog.specs().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["zeta", "add", "alpha"]);
    }

    #[tokio::test]
    async fn unknown_lookup_is_an_error() {
        let transport = StubTransport::new().with_tool(add_tool(), |_| Ok(String::new()));
        let registry = ToolRegistry::discover(&transport).await.unwrap();

        assert!(registry.get("add").is_ok());
        assert!(matches!(
            registry.get("nonexistent_tool"),
            Err(ToolError::UnknownTool(name)) if name == "nonexistent_tool"
        ));
    }

    #[tokio::test]
    async fn rediscovery_swaps_the_whole_catalog() {
        let transport = StubTransport::new().with_tool(add_tool(), |_| Ok(String::new()));
        let registry = ToolRegistry::discover(&transport).await.unwrap();
        let before = registry.snapshot();

        transport.set_tools(vec![tool("echo", json!({}))]);
        registry.rediscover(&transport).await.unwrap();

        // Old snapshots stay intact for whoever still holds them.
        assert!(before.get("add").is_some());
        assert!(registry.get("add").is_err());
        assert!(registry.get("echo").is_ok());
    }

    #[tokio::test]
    async fn discovery_is_idempotent() {
        let transport = StubTransport::new().with_tool(add_tool(), |_| Ok(String::new()));
        let first = ToolRegistry::discover(&transport).await.unwrap();
        let second = ToolRegistry::discover(&transport).await.unwrap();
        assert_eq!(first.specs(), second.specs());
        assert_eq!(
            first.get("add").unwrap().as_ref(),
            second.get("add").unwrap().as_ref()
        );
    }
}
