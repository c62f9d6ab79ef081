//! Navigation and script evaluation on the main frame.

use serde_json::Value;

use crate::error::Result;

use super::core::Page;

// ============================================================================
// Page - Navigation
// ============================================================================

impl Page {
    /// Navigates the main frame and waits for the load to complete.
    pub async fn goto(&self, url: &str) -> Result<()> {
        self.main_frame()?.navigate(url).await
    }

    /// Reloads the main frame.
    pub async fn reload(&self) -> Result<()> {
        self.main_frame()?.reload().await
    }

    /// Returns the main frame's last known URL.
    pub fn url(&self) -> Result<String> {
        Ok(self.main_frame()?.url())
    }
}

// ============================================================================
// Page - Script
// ============================================================================

impl Page {
    /// Evaluates an expression in the main frame.
    ///
    /// Returns the serialized remote value.
    pub async fn evaluate(&self, expression: &str) -> Result<Value> {
        self.main_frame()?.evaluate(expression).await
    }

    /// Calls a function declaration in the main frame.
    pub async fn call_function(&self, declaration: &str, arguments: Vec<Value>) -> Result<Value> {
        self.main_frame()?.call_function(declaration, arguments).await
    }
}

// ============================================================================
// Tests
// ============================================================================
