//! TestProject builder
//!
//! Source files are C# unless a test says otherwise: one namespace per
//! domain keeps domain contexts and relationships easy to predict.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use context_gateway::config::STATE_DIR_NAME;
use context_gateway::{Collaborators, Gateway, GatewayConfig};

pub struct TestProject {
    dir: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn path_str(&self) -> String {
        self.dir.path().to_string_lossy().to_string()
    }

    pub fn file(&self, relative_path: &str) -> PathBuf {
        self.dir.path().join(relative_path)
    }

    /// Add a file with the given content
    pub fn add_file(&self, relative_path: &str, content: &str) -> &Self {
        let full_path = self.file(relative_path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent dirs");
        }
        fs::write(&full_path, content).expect("Failed to write file");
        self
    }

    /// Add a C# class in namespace `domain`, optionally holding fields of other types
    pub fn add_class(&self, relative_path: &str, domain: &str, class: &str, uses: &[&str]) -> &Self {
        let fields: String = uses
            .iter()
            .enumerate()
            .map(|(i, ty)| format!("        private {} dep{};\n", ty, i))
            .collect();
        self.add_file(
            relative_path,
            &format!(
                "namespace {} {{\n    public class {} {{\n{}    }}\n}}\n",
                domain, class, fields
            ),
        )
    }

    // ========================================================================
    // PRE-BUILT PROJECT STRUCTURES
    // ========================================================================

    /// Billing <- Orders: an order holds an invoice
    pub fn with_billing_and_orders(&self) -> &Self {
        self.add_class("Billing/Invoice.cs", "Billing", "Invoice", &[])
            .add_class("Orders/Order.cs", "Orders", "Order", &["Invoice"])
    }

    /// Billing <- Orders <- Reports <- Audit
    pub fn with_dependency_chain(&self) -> &Self {
        self.with_billing_and_orders()
            .add_class("Reports/SalesReport.cs", "Reports", "SalesReport", &["Order"])
            .add_class("Audit/AuditTrail.cs", "Audit", "AuditTrail", &["SalesReport"])
    }

    /// Three domains that reference nothing outside themselves
    pub fn with_unrelated_domains(&self) -> &Self {
        self.add_class("Billing/Invoice.cs", "Billing", "Invoice", &[])
            .add_class("Shipping/Parcel.cs", "Shipping", "Parcel", &[])
            .add_class("Catalog/Product.cs", "Catalog", "Product", &[])
    }

    // ========================================================================
    // GATEWAY
    // ========================================================================

    /// Defaults with the on-disk analysis cache off
    pub fn config(&self) -> GatewayConfig {
        let mut config = GatewayConfig::default();
        config.analysis_cache.enabled = false;
        config
    }

    pub async fn gateway(&self) -> Arc<Gateway> {
        Arc::new(
            Gateway::open(self.path(), self.config())
                .await
                .expect("Failed to open gateway"),
        )
    }

    pub async fn gateway_with(&self, collaborators: Collaborators) -> Arc<Gateway> {
        Arc::new(
            Gateway::with_collaborators(self.path(), self.config(), collaborators)
                .await
                .expect("Failed to open gateway"),
        )
    }

    /// Default collaborators for this project
    pub fn collaborators(&self) -> Collaborators {
        let config = self.config();
        Collaborators::defaults(&config, &config.resolve_paths(self.path()))
    }

    pub fn context_file(&self, domain_path: &str) -> PathBuf {
        self.file(&format!(".context/{}/CONTEXT.md", domain_path))
    }

    pub fn read_context(&self, domain_path: &str) -> Option<String> {
        fs::read_to_string(self.context_file(domain_path)).ok()
    }

    /// Every regular file outside the gateway's state directory, with its bytes
    pub fn file_tree(&self) -> BTreeMap<String, Vec<u8>> {
        let mut out = BTreeMap::new();
        let mut stack = vec![self.path().to_path_buf()];
        while let Some(dir) = stack.pop() {
            for entry in fs::read_dir(&dir).expect("Failed to read dir") {
                let path = entry.expect("Failed to read entry").path();
                let rel = path
                    .strip_prefix(self.path())
                    .expect("entry under root")
                    .to_string_lossy()
                    .replace('\\', "/");
                if rel == STATE_DIR_NAME {
                    continue;
                }
                if path.is_dir() {
                    stack.push(path);
                } else {
                    out.insert(rel, fs::read(&path).expect("Failed to read file"));
                }
            }
        }
        out
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}
