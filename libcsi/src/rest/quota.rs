//! Directory quotas, keyed by entry ID.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Connection, RestError, decode, encode, escape};

/// Error class returned when creating a quota on an entry that has one.
pub const QUOTA_ALREADY_SET_ERROR: &str = "api_quotas_quota_limit_already_set_error";

const QUOTAS_URI: &str = "/v1/files/quotas/";

/// The appliance transports limits as decimal strings.
#[derive(Serialize, Deserialize)]
struct QuotaBody {
    id: String,
    limit: String,
}

impl QuotaBody {
    fn new(id: &str, limit: u64) -> Self {
        Self {
            id: id.to_owned(),
            limit: limit.to_string(),
        }
    }
}

impl Connection {
    /// Current quota limit of an entry, in bytes.
    pub async fn get_quota(&mut self, id: &str) -> Result<u64, RestError> {
        let response = self.get(&format!("{QUOTAS_URI}{}", escape(id))).await?;
        let body: QuotaBody = decode(&response)?;
        body.limit
            .parse()
            .map_err(|e| RestError::Decode(format!("quota limit {:?}: {e}", body.limit)))
    }

    /// Create a quota on an entry that has none.
    pub async fn create_quota(&mut self, id: &str, limit: u64) -> Result<(), RestError> {
        let body = encode(&QuotaBody::new(id, limit))?;
        self.post(QUOTAS_URI, &body).await?;
        Ok(())
    }

    /// Replace the limit of an existing quota.
    pub async fn update_quota(&mut self, id: &str, limit: u64) -> Result<(), RestError> {
        let body = encode(&QuotaBody::new(id, limit))?;
        self.put(&format!("{QUOTAS_URI}{}", escape(id)), &body).await?;
        Ok(())
    }

    /// Set the quota of an entry to `limit`, creating or updating as needed.
    pub async fn ensure_quota(&mut self, id: &str, limit: u64) -> Result<(), RestError> {
        match self.create_quota(id, limit).await {
            Err(RestError::Appliance(e)) if e.is(409, QUOTA_ALREADY_SET_ERROR) => {
                debug!(%id, limit, "quota exists, updating");
                self.update_quota(id, limit).await
            }
            other => other,
        }
    }
}
