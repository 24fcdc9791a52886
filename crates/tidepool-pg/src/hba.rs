// crates/tidepool-pg/src/hba.rs
// ============================================================================
// Module: Host-Based Authentication Rules
// Description: Ruleset rendering and atomic rule-file replacement.
// Purpose: Rebuild the engine's HBA file from the registry each pass.
// Dependencies: tempfile, tidepool-core
// ============================================================================

//! ## Overview
//! The reconciler regenerates the engine's host-based authentication file
//! from scratch on every pass: fixed local and loopback rules, one
//! administrative rule for the platform network, then one rule per
//! allow-list entry (active and pending alike). The file is written to a
//! sibling temp file and atomically renamed into place, so the engine
//! never observes a half-written ruleset. Rebuilding from the registry
//! rather than patching makes the whole operation idempotent.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt::Write as _;
use std::io::Write as _;
use std::path::Path;
use std::path::PathBuf;

use tidepool_core::CidrRule;
use tidepool_core::EngineError;
use tidepool_core::RuleBinding;

// ============================================================================
// SECTION: Settings
// ============================================================================

/// Fixed inputs for ruleset rendering.
///
/// # Invariants
/// - `platform_cidr` covers the platform's own services; it is rendered
///   as one administrative rule ahead of tenant rules.
#[derive(Debug, Clone)]
pub struct HbaSettings {
    /// Privileged role granted from the platform network.
    pub admin_user: String,
    /// Platform network source.
    pub platform_cidr: CidrRule,
    /// Authentication method written into generated rules.
    pub auth_method: String,
}

// ============================================================================
// SECTION: Rendering
// ============================================================================

/// Renders the complete ruleset for the given allow-list bindings.
///
/// A bare `0.0.0.0` stored before normalization existed is still widened
/// to the open CIDR here, so the rendered file never carries a bare
/// address.
#[must_use]
pub fn render_ruleset(bindings: &[RuleBinding], settings: &HbaSettings) -> String {
    let method = &settings.auth_method;
    let mut out = String::new();
    out.push_str("# Managed by tidepool; regenerated on every reconciliation pass.\n");
    out.push_str("# TYPE  DATABASE        USER            ADDRESS                 METHOD\n");
    out.push_str("local   all             all                                     trust\n");
    out.push_str("host    all             all             127.0.0.1/32            trust\n");
    out.push_str("host    all             all             ::1/128                 trust\n");
    let _ = writeln!(
        out,
        "host    all             {:<15} {:<23} {method}",
        settings.admin_user,
        settings.platform_cidr.as_str(),
    );
    for binding in bindings {
        let cidr = normalize_rendered_cidr(binding.rule.cidr.as_str());
        let _ = writeln!(
            out,
            "host    {:<15} {:<15} {:<23} {method}",
            binding.rule.database_name.as_str(),
            binding.role.as_str(),
            cidr,
        );
    }
    out
}

/// Widens a bare unspecified address into the open CIDR.
fn normalize_rendered_cidr(cidr: &str) -> &str {
    if cidr == "0.0.0.0" { "0.0.0.0/0" } else { cidr }
}

// ============================================================================
// SECTION: File Replacement
// ============================================================================

/// Handle to the engine's host-based authentication file.
///
/// # Invariants
/// - Replacement is atomic: the new ruleset is persisted via rename.
#[derive(Debug, Clone)]
pub struct HbaFile {
    /// Target file path.
    path: PathBuf,
}

impl HbaFile {
    /// Creates a handle for the given path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
        }
    }

    /// Returns the target path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Atomically replaces the rule file with the rendered ruleset.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Transient`] when the write or rename fails;
    /// the previous ruleset stays in place in that case.
    pub fn replace(&self, ruleset: &str) -> Result<(), EngineError> {
        let parent = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut staged = tempfile::Builder::new()
            .prefix(".pg_hba-staged-")
            .tempfile_in(parent)
            .map_err(|err| EngineError::Transient(err.to_string()))?;
        staged
            .write_all(ruleset.as_bytes())
            .map_err(|err| EngineError::Transient(err.to_string()))?;
        staged
            .flush()
            .map_err(|err| EngineError::Transient(err.to_string()))?;
        staged
            .persist(&self.path)
            .map_err(|err| EngineError::Transient(err.to_string()))?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only panic-based assertions are permitted."
    )]

    use super::HbaFile;
    use super::HbaSettings;
    use super::render_ruleset;
    use tidepool_core::CidrRule;
    use tidepool_core::DatabaseName;
    use tidepool_core::ProjectId;
    use tidepool_core::RoleName;
    use tidepool_core::RuleBinding;
    use tidepool_core::WhitelistRule;
    use tidepool_core::WhitelistRuleId;

    fn settings() -> HbaSettings {
        HbaSettings {
            admin_user: "tidepool_admin".to_string(),
            platform_cidr: CidrRule::parse("10.0.0.0/8").expect("cidr"),
            auth_method: "scram-sha-256".to_string(),
        }
    }

    fn binding(database: &str, role: &str, cidr: &str, active: bool) -> RuleBinding {
        RuleBinding {
            rule: WhitelistRule {
                id: WhitelistRuleId::new(1),
                project_id: ProjectId::new("p1"),
                database_name: DatabaseName::new(database),
                cidr: CidrRule::parse(cidr).expect("cidr"),
                is_active: active,
            },
            role: RoleName::new(role),
        }
    }

    #[test]
    fn ruleset_carries_fixed_rules_and_admin_rule() {
        let rendered = render_ruleset(&[], &settings());
        assert!(rendered.contains("local   all             all"));
        assert!(rendered.contains("127.0.0.1/32"));
        assert!(rendered.contains("::1/128"));
        assert!(rendered.contains("tidepool_admin"));
        assert!(rendered.contains("10.0.0.0/8"));
    }

    #[test]
    fn pending_and_active_rules_both_render() {
        let bindings = vec![
            binding("acme_db", "u1_acme", "203.0.113.9/32", true),
            binding("beta_db", "u2_beta", "198.51.100.0/24", false),
        ];
        let rendered = render_ruleset(&bindings, &settings());
        assert!(rendered.contains("acme_db"));
        assert!(rendered.contains("beta_db"));
        assert!(rendered.contains("203.0.113.9/32"));
        assert!(rendered.contains("198.51.100.0/24"));
    }

    #[test]
    fn open_entry_renders_as_open_cidr() {
        let bindings = vec![binding("acme_db", "u1_acme", "0.0.0.0", false)];
        let rendered = render_ruleset(&bindings, &settings());
        assert!(rendered.contains("0.0.0.0/0"));
        assert!(!rendered.contains("0.0.0.0     "), "bare address must not render");
    }

    #[test]
    fn replace_writes_atomically() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("pg_hba.conf");
        std::fs::write(&path, "old").expect("seed");
        let file = HbaFile::new(&path);
        file.replace("new contents\n").expect("replace");
        assert_eq!(std::fs::read_to_string(&path).expect("read"), "new contents\n");
    }
}
