//! Configuration for the agent core.
//!
//! This struct is intentionally minimal and users construct it however they
//! want. No TOML, YAML, or other config-file parsing dependency is
//! introduced — see [`AgentCoreConfig::from_env`] for the one place
//! environment variables are consulted, and only when the caller asks for
//! it explicitly.

use std::path::PathBuf;

/// Global configuration for the agent core.
///
/// # Example
///
/// ```rust
/// use agentcore::AgentCoreConfig;
/// use std::path::PathBuf;
///
/// let config = AgentCoreConfig {
///     context_dir: PathBuf::from("/var/data/agent_threads"),
///     summarization_tail_len: 5,
/// };
/// ```
pub struct AgentCoreConfig {
    /// Directory where [`FileConversationStore`](crate::FileConversationStore)
    /// writes one `{thread_id}.json` file per thread.
    pub context_dir: PathBuf,
    /// Number of most-recent events kept after summarization, alongside the
    /// single `context_summary` event that replaces everything older.
    pub summarization_tail_len: usize,
}

impl AgentCoreConfig {
    /// Build a config from environment variables, falling back to
    /// [`Default`] for anything unset.
    ///
    /// Reads `HICA_CONTEXT_DIR` for [`context_dir`](Self::context_dir).
    /// Never called implicitly by any other part of this crate.
    pub fn from_env() -> Self {
        let context_dir = std::env::var("HICA_CONTEXT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::default().context_dir);
        Self {
            context_dir,
            ..Self::default()
        }
    }
}

impl Default for AgentCoreConfig {
    /// Points at `"agent_threads"` in the current working directory, with a
    /// 5-event summarization tail.
    fn default() -> Self {
        Self {
            context_dir: PathBuf::from("agent_threads"),
            summarization_tail_len: 5,
        }
    }
}
