//! Shared, version-pinned protocol identifiers.
//!
//! These constants are the single source of truth for schema/version strings and
//! on-disk names that appear in machine-readable I/O or in a test directory layout.

pub const INSIGHTS_TEST_REPORT_SCHEMA_VERSION: &str = "insights.test.report@0.1.0";

/// Version of the diagnostic normalization rule table. Bump whenever a rule changes in a
/// way that can alter stored `.cerr`/`.ccerr` baselines.
pub const NORMALIZE_RULES_VERSION: &str = "insights.normalize@1";

pub const SOURCE_EXTENSION: &str = "cpp";
pub const EXPECT_EXTENSION: &str = "expect";
pub const IGNORE_EXTENSION: &str = "ignore";
pub const PRIMARY_ERROR_EXTENSION: &str = "cerr";
pub const SECONDARY_ERROR_EXTENSION: &str = "ccerr";

pub const DIRECTIVE_STANDARD: &str = "cmdline";
pub const DIRECTIVE_TOOL_OPTIONS: &str = "cmdlineinsights";

/// Exit code the transformation tool uses for "the input has a source error", as opposed
/// to a crash.
pub const TOOL_SOURCE_ERROR_EXIT_CODE: i32 = 1;

pub const TMP_FILE_PLACEHOLDER: &str = ".tmp.cpp";
pub const TMP_STEM_PLACEHOLDER: &str = ".tmp:";

pub const ENV_CXX: &str = "INSIGHTS_CXX";
pub const ENV_CXX_ARGS: &str = "INSIGHTS_CXX_ARGS";
