//! Guard rails — heuristic re-scan of machine-generated fixes
//!
//! This is NOT a security boundary. The sandbox is the boundary; these
//! patterns exist so that a fix which plainly reaches for dynamic code
//! evaluation, the prototype chain or module loading is rejected before we
//! bother spinning up an isolate for it. The set is pluggable so it can be
//! tightened without touching pipeline logic.

use regex::Regex;

/// One named rejection pattern
#[derive(Debug)]
pub struct GuardRail {
    /// Short identifier used in rejection messages
    pub name: &'static str,
    pattern: Regex,
}

impl GuardRail {
    pub fn new(name: &'static str, pattern: &str) -> Self {
        Self {
            name,
            pattern: Regex::new(pattern).expect("static guard-rail regex"),
        }
    }

    pub fn matches(&self, code: &str) -> bool {
        self.pattern.is_match(code)
    }
}

/// Pluggable set of guard rails applied to candidate fixes
#[derive(Debug)]
pub struct GuardRailSet {
    rails: Vec<GuardRail>,
}

impl Default for GuardRailSet {
    /// The strict default set: dynamic evaluation, prototype-chain
    /// manipulation, module loading and process access are all flagged.
    fn default() -> Self {
        Self {
            rails: vec![
                GuardRail::new("dynamic-eval", r"\beval\s*\("),
                GuardRail::new("function-constructor", r"\bnew\s+Function\s*\("),
                GuardRail::new("prototype-chain", r"__proto__|\bconstructor\s*\.\s*constructor\b"),
                GuardRail::new("module-load", r"\brequire\s*\(|\bimport\s*\(|\bimport\s+[\w{*]"),
                GuardRail::new("process-access", r"\bprocess\s*\.|child_process"),
            ],
        }
    }
}

impl GuardRailSet {
    /// Build a custom set (used by tests and by deployments that tighten
    /// the defaults).
    pub fn new(rails: Vec<GuardRail>) -> Self {
        Self { rails }
    }

    /// Scan code; returns the name of the first matching rail.
    pub fn scan(&self, code: &str) -> Option<&'static str> {
        self.rails
            .iter()
            .find(|rail| rail.matches(code))
            .map(|rail| rail.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_code_passes() {
        let rails = GuardRailSet::default();
        let code = "function f(n) { if (n === 0) return 1; return n * f(n - 1); }\nconsole.log(f(5));";
        assert_eq!(rails.scan(code), None);
    }

    #[test]
    fn test_dynamic_eval_is_flagged() {
        let rails = GuardRailSet::default();
        assert_eq!(rails.scan("eval(\"1+1\")"), Some("dynamic-eval"));
        assert_eq!(
            rails.scan("const F = new Function(\"return 1\");"),
            Some("function-constructor")
        );
    }

    #[test]
    fn test_prototype_chain_is_flagged() {
        let rails = GuardRailSet::default();
        assert_eq!(rails.scan("({}).__proto__.x = 1;"), Some("prototype-chain"));
        assert_eq!(
            rails.scan("this.constructor.constructor(\"return 1\")()"),
            Some("prototype-chain")
        );
    }

    #[test]
    fn test_module_loading_is_flagged() {
        let rails = GuardRailSet::default();
        assert_eq!(rails.scan("const fs = require(\"fs\");"), Some("module-load"));
        assert_eq!(rails.scan("await import(\"fs\");"), Some("module-load"));
        assert_eq!(rails.scan("import fs from \"fs\";"), Some("module-load"));
    }

    #[test]
    fn test_process_access_is_flagged() {
        let rails = GuardRailSet::default();
        assert_eq!(rails.scan("process.env.SECRET"), Some("process-access"));
    }

    #[test]
    fn test_identifier_substrings_do_not_match() {
        let rails = GuardRailSet::default();
        // "medieval(" contains "eval(" but not as a word
        assert_eq!(rails.scan("medieval(1); const reprocess = 2;"), None);
    }
}
