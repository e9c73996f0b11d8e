use chrono::{DateTime, Utc};
use serde::Serialize;

/// Build identification served by `GET /version`.
///
/// `build_date` and `commit_hash` are injected at compile time via the
/// `OFFERGATE_BUILD_DATE` / `OFFERGATE_COMMIT_HASH` env vars (set by the
/// release pipeline); local builds fall back to process start time and an
/// empty hash.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    pub version: String,
    pub build_date: DateTime<Utc>,
    pub commit_hash: String,
}

impl VersionInfo {
    #[must_use]
    pub fn from_build_env() -> Self {
        let build_date = option_env!("OFFERGATE_BUILD_DATE")
            .and_then(|raw| raw.parse::<DateTime<Utc>>().ok())
            .unwrap_or_else(Utc::now);

        VersionInfo {
            version: env!("CARGO_PKG_VERSION").to_string(),
            build_date,
            commit_hash: option_env!("OFFERGATE_COMMIT_HASH")
                .unwrap_or_default()
                .to_string(),
        }
    }
}
