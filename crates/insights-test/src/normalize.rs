//! Diagnostic normalization.
//!
//! Captured stderr is rewritten by an ordered table of `(pattern, replacement)` rules so
//! it can be compared byte-for-byte with a stored baseline across machines, toolchain
//! installs and runs. Each comparison strategy picks an ordered subset of the table.
//! Every strategy is idempotent.

use anyhow::{Context, Result};
use insights_contracts::{TMP_FILE_PLACEHOLDER, TMP_STEM_PLACEHOLDER};
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleId {
    /// `<anything>.cpp:` → `.tmp:`
    TmpStem,
    /// `<anything>.cpp<any char>` → `.tmp:` (linker output names the temp object, not the source)
    TmpStemLoose,
    /// `/abs/dir/file.h:12:` → `... file.h:12:`
    PathPrefix,
    /// `RecoveryExpr 0x55d0c8a1b2c8 ` → `RecoveryExpr `
    NodeAddress,
    /// Drops the `Error while processing /x/y.cpp.` trailer the tool prints on refusal.
    ProcessingTrailer,
}

#[derive(Debug, Clone, Copy)]
pub struct RewriteRule {
    pub id: RuleId,
    pub pattern: &'static str,
    pub replacement: &'static str,
}

/// Versioned as `insights_contracts::NORMALIZE_RULES_VERSION`.
pub const RULES: &[RewriteRule] = &[
    RewriteRule {
        id: RuleId::ProcessingTrailer,
        pattern: r"Error while processing.*\.cpp.",
        replacement: "",
    },
    RewriteRule {
        id: RuleId::TmpStem,
        pattern: r".*\.cpp:",
        replacement: TMP_STEM_PLACEHOLDER,
    },
    RewriteRule {
        id: RuleId::TmpStemLoose,
        pattern: r".*\.cpp.",
        replacement: TMP_STEM_PLACEHOLDER,
    },
    RewriteRule {
        id: RuleId::PathPrefix,
        pattern: r"/(.*)/(.*?:[0-9]+):",
        replacement: "... ${2}:",
    },
    RewriteRule {
        id: RuleId::NodeAddress,
        pattern: r"\b([A-Z][A-Za-z]*(?:Expr|Stmt|Decl|Type)) 0x[0-9a-fA-F]+ ",
        replacement: "${1} ",
    },
];

const COMPILER_RULES: &[RuleId] = &[RuleId::PathPrefix, RuleId::NodeAddress];
const ANONYMOUS_COMPILER_RULES: &[RuleId] =
    &[RuleId::TmpStem, RuleId::PathPrefix, RuleId::NodeAddress];
const REFUSAL_RULES: &[RuleId] = &[
    RuleId::ProcessingTrailer,
    RuleId::TmpStem,
    RuleId::PathPrefix,
    RuleId::NodeAddress,
];
const REFUSAL_BASELINE_RULES: &[RuleId] = &[RuleId::TmpStem, RuleId::TmpStemLoose];

#[derive(Debug)]
struct CompiledRule {
    id: RuleId,
    regex: Regex,
    replacement: &'static str,
}

#[derive(Debug)]
pub struct Normalizer {
    rules: Vec<CompiledRule>,
}

impl Normalizer {
    pub fn new() -> Result<Self> {
        let mut rules = Vec::with_capacity(RULES.len());
        for rule in RULES {
            let regex = Regex::new(rule.pattern)
                .with_context(|| format!("compile normalization rule {:?}", rule.id))?;
            rules.push(CompiledRule {
                id: rule.id,
                regex,
                replacement: rule.replacement,
            });
        }
        Ok(Self { rules })
    }

    pub fn apply_rule(&self, id: RuleId, text: &str) -> String {
        match self.rules.iter().find(|r| r.id == id) {
            Some(rule) => rule.regex.replace_all(text, rule.replacement).into_owned(),
            None => text.to_string(),
        }
    }

    fn apply(&self, ids: &[RuleId], text: &str) -> String {
        let mut out = text.to_string();
        for &id in ids {
            out = self.apply_rule(id, &out);
        }
        out
    }

    /// Full normalization for compiler stderr (`.cerr`). With a temp file name the literal
    /// name is replaced; without one any `<name>.cpp:` collapses to `.tmp:`.
    pub fn compiler_diagnostics(&self, stderr: &str, tmp_file: Option<&str>) -> String {
        match tmp_file.filter(|s| !s.is_empty()) {
            Some(name) => self.apply(COMPILER_RULES, &stderr.replace(name, TMP_FILE_PLACEHOLDER)),
            None => self.apply(ANONYMOUS_COMPILER_RULES, stderr),
        }
    }

    /// Temp-file substitution only (`.ccerr`).
    pub fn filename_only(&self, stderr: &str, tmp_file: &str) -> String {
        if tmp_file.is_empty() {
            return stderr.to_string();
        }
        stderr.replace(tmp_file, TMP_FILE_PLACEHOLDER)
    }

    /// Transformer stderr when it refuses its input. Compared against
    /// [`Normalizer::refusal_baseline`] of the stored `.cerr`.
    pub fn tool_refusal(&self, stderr: &str) -> String {
        self.refusal_baseline(&self.apply(REFUSAL_RULES, stderr))
    }

    /// Baselines for transformer refusals may name the original source or a linker object;
    /// both collapse to `.tmp:`.
    pub fn refusal_baseline(&self, text: &str) -> String {
        self.apply(REFUSAL_BASELINE_RULES, text)
    }
}
